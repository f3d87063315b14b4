use anyhow::{Context, Result};

/// Runs store and file work on the runtime's blocking pool so the UI thread
/// keeps handling events while it waits. A panic in `f` comes back as an
/// error.
pub async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("background task failed")
}
