//! CareerCanvas Core Hierarchy Engine
//!
//! This crate maintains, per owning user, a forest of typed career-history
//! nodes (career transitions, jobs, education, projects, events, actions)
//! connected by parent-child edges whose validity is constrained by a fixed
//! type-compatibility table.
//!
//! # Architecture
//!
//! - **Flat node table**: hierarchy as plain `parent_id` values in
//!   libsql/Turso, never live object references
//! - **Validate before write**: metadata shape, edge rules, then
//!   cycle-freedom — mutations never partially apply
//! - **Transactional moves**: re-validation plus a version compare-and-swap
//!   inside one immediate transaction closes the check-then-write race
//! - **Diagnostics**: whole-forest cycle/orphan/depth analysis with repair
//!   suggestions for data corrupted outside the engine
//!
//! # Modules
//!
//! - [`models`] - data structures (Node, NodeType, metadata shapes, forest)
//! - [`services`] - type rules, CycleGuard, HierarchyService orchestrator
//! - [`db`] - database layer with libsql integration

pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use models::*;
pub use services::*;
