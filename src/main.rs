mod app;
mod config;
mod domain;
mod errors;
mod infra;
mod platform;
mod ui;
mod usecase;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{default_asset_dir, default_db_path, project_dirs, AppConfig, StoreConfig, LOG_ENV};
use crate::infra::http::client::HttpStore;
use crate::infra::sqlite::repo::SqliteRepo;
use crate::usecase::ports::store::ComplianceStore;
use crate::usecase::services::table_service::ComplianceTable;

fn main() {
    init_tracing();

    let webview_data_dir = match default_webview_data_dir() {
        Ok(dir) => dir,
        Err(err) => {
            report_startup_failure(&format!("failed to prepare the WebView data directory: {err}"));
            return;
        }
    };

    dioxus::LaunchBuilder::desktop()
        .with_cfg(
            dioxus::desktop::Config::new()
                .with_window(
                    dioxus::desktop::WindowBuilder::new().with_title("Compliance Desk"),
                )
                .with_data_directory(webview_data_dir),
        )
        .launch(app::App);
}

fn init_tracing() {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("handlebars=off,{filter}")))
        .without_time()
        .init();
}

#[cfg(windows)]
fn report_startup_failure(message: &str) {
    use windows_sys::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_ICONERROR, MB_OK};

    let wide = |text: &str| -> Vec<u16> { text.encode_utf16().chain(std::iter::once(0)).collect() };
    let text = wide(message);
    let caption = wide("Compliance Desk");
    // SAFETY: both buffers are NUL-terminated and outlive the call.
    unsafe {
        MessageBoxW(
            0,
            text.as_ptr(),
            caption.as_ptr(),
            MB_OK | MB_ICONERROR,
        );
    }
}

#[cfg(not(windows))]
fn report_startup_failure(message: &str) {
    tracing::error!("{message}");
}

fn ensure_webview_data_dir(base_data_dir: &Path) -> Result<PathBuf> {
    let webview_data_dir = base_data_dir.join("webview2");
    std::fs::create_dir_all(&webview_data_dir).with_context(|| {
        format!(
            "failed to create webview dir: {}",
            webview_data_dir.display()
        )
    })?;
    Ok(webview_data_dir)
}

fn default_webview_data_dir() -> Result<PathBuf> {
    let project_dirs = project_dirs().ok_or_else(|| anyhow!("unable to resolve data directory"))?;
    ensure_webview_data_dir(project_dirs.data_local_dir())
}

pub fn open_store(config: &AppConfig) -> Result<Arc<dyn ComplianceStore>> {
    match &config.store {
        StoreConfig::Sqlite { path } => {
            let db_path = match path {
                Some(path) => path.clone(),
                None => default_db_path()?,
            };
            let asset_dir = match db_path.parent() {
                Some(parent) if path.is_some() => parent.join("assets"),
                _ => default_asset_dir()?,
            };
            info!(db = %db_path.display(), "using sqlite store");
            let repo = SqliteRepo::open(db_path, asset_dir)?;
            Ok(Arc::new(repo))
        }
        StoreConfig::Http {
            base_url,
            timeout_secs,
        } => {
            info!(%base_url, "using http store");
            let store = HttpStore::new(base_url, timeout_secs.map(Duration::from_secs))?;
            Ok(Arc::new(store))
        }
    }
}

/// Loads config, opens the store, and reads the configured table.
pub fn bootstrap() -> Result<(AppConfig, ComplianceTable)> {
    let config = AppConfig::load()?;
    let store = open_store(&config)?;
    let mut table = ComplianceTable::new(
        config.target(),
        config.profile(),
        config.user.clone(),
        store,
    );
    table.load()?;
    Ok((config, table))
}
