//! Database layer for the banter core.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. The message log table is created through
//! versioned migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: the conversation log is append-only and
//!   read-many; WAL allows concurrent readers with a single serialized
//!   writer, which is exactly the contention profile of the polling
//!   protocol.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, ensuring migrations ship with the server and cannot
//!   drift from the code that depends on them.

mod migrations;
mod pool;

pub use migrations::run_migrations;
pub use pool::{create_pool, DbPool, DbRuntimeSettings};
