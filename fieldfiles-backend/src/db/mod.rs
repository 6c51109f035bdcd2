//! Database access for attachments and their association rows
//!

mod assoc;
mod attachment;

pub use attachment::AttachmentQuery;

use std::path::PathBuf;

use fieldfiles_shared::AttachmentError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::debug;

use crate::migration::Migrator;

/// Opens the database at `db_path` (or in memory when `None`) and applies
/// all pending migrations.
pub async fn start_db(db_path: Option<&PathBuf>) -> Result<DatabaseConnection, AttachmentError> {
    let db_url = match db_path {
        Some(path) => format!("sqlite://{}?mode=rwc", path.display()),
        None => "sqlite::memory:".to_string(),
    };
    debug!("Opening Database: {db_url}");

    let mut options = ConnectOptions::new(db_url);
    options
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Trace);
    if db_path.is_none() {
        // every pooled connection would otherwise get its own empty database
        options.max_connections(1).min_connections(1);
    }

    let conn = Database::connect(options).await?;
    Migrator::up(&conn, None).await?;
    Ok(conn)
}

/// Entity and association persistence over one connection.
#[derive(Clone, Debug)]
pub struct AttachmentStore {
    conn: DatabaseConnection,
}

impl AttachmentStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }
}
