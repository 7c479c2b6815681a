//! # `kraken-core`
//!
//! The addressable graph model that drives a kraken build: addresses, lazily evaluated
//! properties, tasks, projects, and the task graph assembled from them. The executor that walks
//! that graph lives in the separate `kraken-executor` crate.

#![deny(rustdoc::broken_intra_doc_links)]

#[macro_use]
extern crate static_assertions;

#[macro_use]
extern crate log;

pub mod address;
pub mod context;
pub mod error;
pub mod graph;
pub mod lazy_evaluation;
pub mod logging;
pub mod project;
pub mod property;
pub mod task;

// Re-exports
pub use address::Address;
pub use context::Context;
pub use error::{KrakenError, Result};
pub use project::Project;
pub use task::Task;

pub mod prelude {
    //! Commonly used types, re-exported for convenient glob-importing.

    pub use crate::address::Address;
    pub use crate::context::Context;
    pub use crate::error::{KrakenError, Result};
    pub use crate::lazy_evaluation::{Supplier, SupplierExt};
    pub use crate::project::Project;
    pub use crate::property::Property;
    pub use crate::task::{Task, TaskStatus, TaskStatusType};
}
