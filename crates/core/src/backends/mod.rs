//! Backend implementations for the job/scenario/content repositories
//!
//! - `sqlite`: SQLite-based backend (default, requires the `sqlite` feature)

#[cfg(feature = "sqlite")]
pub mod sqlite;
