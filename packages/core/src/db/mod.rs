//! Database Layer
//!
//! Persistence for career-history nodes using libsql/Turso:
//!
//! - [`DatabaseService`] — connection management, schema initialization,
//!   and the extracted SQL operations (including the recursive traversal
//!   CTEs and the transactional move)
//! - [`NodeStore`] — the abstraction the services layer programs against
//! - [`TursoStore`] — the libsql-backed implementation
//! - [`DatabaseError`] — connection/initialization/query failures

mod database;
mod error;
mod node_store;
mod turso_store;

pub use database::{DatabaseService, DbCreateNodeParams, DbCreateResult, DbMoveResult};
pub use error::DatabaseError;
pub use node_store::NodeStore;
pub use turso_store::TursoStore;
