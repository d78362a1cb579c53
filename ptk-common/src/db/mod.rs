//! Record store: SQLite schema, migrations and queries

pub mod init;
pub mod migrations;
pub mod store;

pub use init::*;
pub use migrations::run_migrations;
pub use store::*;
