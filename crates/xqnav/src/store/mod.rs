//! In-memory node store with the statistics and indexes the optimizer consults.

mod build;
mod catalog;
mod data;
mod index;
mod node;
mod summary;

pub use build::{DataBuilder, NodeSpec, comment, doc, elem, elem_ns, pi, text};
pub use catalog::Catalog;
pub use data::Data;
pub use index::{IndexKind, ValueIndexEstimator, ValueLookup};
pub use node::{ChildNodes, DbNode, NodeRun};
pub use summary::PathSummary;
