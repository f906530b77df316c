//! Persistence backends

pub mod postgres;

pub use postgres::{PgWorkflowStore, TableSet};
