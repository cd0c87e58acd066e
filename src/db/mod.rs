mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::email::EmailService;
use crate::payments::StripeClient;
use crate::session::SessionKeys;
use crate::vision::VisionClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool, keys, and the external
/// collaborator clients.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Base URL for redirect targets (e.g. https://atelier.example.com)
    pub base_url: String,
    pub sessions: SessionKeys,
    pub stripe: StripeClient,
    pub vision: VisionClient,
    pub email: EmailService,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // WAL + a busy timeout keep concurrent request handlers from tripping
    // over SQLITE_BUSY on the write paths (credit debits, webhook updates).
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(10).build(manager)
}
