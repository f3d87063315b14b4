pub mod assets;
pub mod http;
pub mod import;
pub mod report;
pub mod sqlite;
