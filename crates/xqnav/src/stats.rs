//! Capabilities the optimizer reads from a storage backend.
//!
//! All of them are optional at compile time: a missing or stale source of information
//! simply means the corresponding rewrite is skipped.

use core::fmt;
use std::sync::Arc;

use compact_str::CompactString;

use crate::expr::Expr;
use crate::model::{NodeKind, QName, XdmNode};
use crate::step::Step;

/// Identity of one storage instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(pub u32);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

pub type PathNodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathStats {
    /// Number of instances of this path in the data.
    pub count: u64,
    /// Elements only: no instance has element children, and each has at most one text child.
    pub leaf: bool,
}

/// One node of the structural summary: all data nodes reached by the same
/// sequence of kinds and names from a document root.
#[derive(Debug, Clone)]
pub struct PathNode {
    pub kind: NodeKind,
    pub name: Option<QName>,
    pub level: u32,
    pub parent: Option<PathNodeId>,
    pub children: Vec<PathNodeId>,
    pub stats: PathStats,
}

pub trait StructuralSummary: Send + Sync + fmt::Debug {
    /// Path nodes of the document roots (level 0).
    fn root_path_nodes(&self) -> &[PathNodeId];
    fn node(&self, id: PathNodeId) -> &PathNode;

    /// All path nodes strictly below `id`, in pre-order.
    fn descendants(&self, id: PathNodeId) -> Vec<PathNodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<PathNodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.node(n).children.iter().rev().copied());
        }
        out
    }
}

/// Static facts about one storage instance.
pub trait DataStatistics: Send + Sync + fmt::Debug {
    fn store_id(&self) -> StoreId;
    /// Total number of nodes.
    fn size(&self) -> u64;
    fn document_count(&self) -> usize;
    /// Whether the summary reflects the current data.
    fn up_to_date(&self) -> bool;
    fn summary(&self) -> Option<&dyn StructuralSummary>;
    /// Whether an element or attribute with the given local name exists.
    fn has_name(&self, kind: NodeKind, local: &str) -> bool;
    /// `Some(None)` when no namespaces are used, `Some(Some(uri))` when every element
    /// lives in the one namespace `uri`, `None` when several namespaces occur.
    fn global_namespace(&self) -> Option<Option<CompactString>>;
    /// Namespace used by attributes: same encoding as [`Self::global_namespace`].
    fn attribute_namespace(&self) -> Option<Option<CompactString>> {
        self.global_namespace()
            .filter(Option::is_none)
            .map(|_| None)
    }
}

/// Resolves store identities to their statistics.
pub trait StoreCatalog: Send + Sync {
    fn statistics(&self, id: StoreId) -> Option<Arc<dyn DataStatistics>>;
}

/// Outcome of a successful index cost estimate.
#[derive(Debug, Clone)]
pub struct IndexCandidate<N: XdmNode> {
    /// Exact or estimated number of index hits.
    pub result_count: u64,
    /// Expression yielding, in document order and without duplicates, the nodes of the
    /// candidate step that satisfy the predicate, independent of any context node.
    pub access: Expr<N>,
}

impl<N: XdmNode> IndexCandidate<N> {
    #[allow(clippy::cast_precision_loss)]
    pub fn too_expensive(&self, data_size: u64, ratio: f64) -> bool {
        self.result_count as f64 > data_size as f64 * ratio
    }
}

/// Pluggable cost function over a value index.
pub trait IndexCostEstimator<N: XdmNode>: Send + Sync {
    /// Returns `None` when the predicate cannot be answered by an index for this step.
    fn estimate(
        &self,
        stats: &dyn DataStatistics,
        predicate: &Expr<N>,
        step: &Step<N>,
    ) -> Option<IndexCandidate<N>>;
}
