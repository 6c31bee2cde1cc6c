pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Database, DatabaseImpl};

/// Run migrations against a freshly opened connection.
pub async fn initialize_database(conn: &libsql::Connection) -> anyhow::Result<()> {
    migrations::run_migrations(conn).await
}
