//! Path-expression compiler, optimizer and evaluator for an embedded XML store.
//!
//! Paths are built from [`Step`]s (axis, node [`Test`], predicates), rewritten by the
//! [`optimize`](optimize::optimize) pipeline against whatever statistics and indexes the
//! store offers, and evaluated lazily against any [`XdmNode`] implementation.
//!
//! ```
//! use xqnav::store::{Catalog, Data};
//! use xqnav::{CompileContextBuilder, DynamicContextBuilder, XdmItem, compile};
//! use std::sync::Arc;
//!
//! let data = Data::from_xml("<a><b>1</b><b>2</b></a>").unwrap();
//! let doc = data.document(0).unwrap();
//! let cx = CompileContextBuilder::new()
//!     .with_context_value(vec![XdmItem::Node(doc.clone())])
//!     .with_catalog(Arc::new(Catalog::new().with(data.clone())))
//!     .build();
//! let expr = compile("//b", &cx).unwrap();
//! let dcx = DynamicContextBuilder::new().with_context_item(doc).build();
//! let out = expr.evaluate_vec(&dcx, &dcx.initial_focus()).unwrap();
//! assert_eq!(out.len(), 2);
//! ```

pub mod axis;
pub mod context;
pub mod error;
pub mod expr;
pub mod model;
pub mod optimize;
pub mod order;
pub mod parser;
pub mod path;
pub mod stats;
pub mod step;
pub mod store;
pub mod test;
pub mod xdm;

pub use axis::Axis;
pub use context::{
    CompileContext, CompileContextBuilder, ContextValue, DynamicContext, DynamicContextBuilder,
    Focus, OptimizerOptions, StaticFocus,
};
pub use error::{Error, ErrorCode};
pub use expr::{Builtin, CompareOp, Expr, ExternalExpr};
pub use model::{NodeKind, QName, XdmNode};
pub use optimize::{Pass, optimize, optimize_path};
pub use parser::{compile, parse};
pub use path::cache::CacheState;
pub use path::{Path, PathStrategy};
pub use stats::{
    DataStatistics, IndexCandidate, IndexCostEstimator, PathNode, PathNodeId, PathStats,
    StoreCatalog, StoreId, StructuralSummary,
};
pub use step::{PredicateClass, Step, StepStrategy};
pub use test::{NameMode, NameTest, Test};
pub use xdm::{ItemType, Occurrence, SeqType, XdmAtomicValue, XdmItem, XdmSequence, XdmStream};
