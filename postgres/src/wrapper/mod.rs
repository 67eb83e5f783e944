pub mod pg_dump;
pub mod pg_restore;

// Re-export for convenience
pub use pg_dump::{PgDump, PgDumpFormat, PgDumpOptions};
pub use pg_restore::PgRestore;
