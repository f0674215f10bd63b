//! Database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary at build time using include_str!.
//! Each migration is a tuple of (name, sql_content), applied in order.

/// Name of the migration that creates the tracking table
pub const BOOTSTRAP: &str = "000_migrations.sql";

/// All migrations, embedded at compile time.
///
/// New migrations get the next NNN_ prefix and an entry at the end.
pub const MIGRATIONS: &[(&str, &str)] = &[
    (BOOTSTRAP, include_str!("000_migrations.sql")),
    ("001_transactions.sql", include_str!("001_transactions.sql")),
    ("002_raw_transactions.sql", include_str!("002_raw_transactions.sql")),
];
