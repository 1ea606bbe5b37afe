//! Compile-time and evaluation-time contexts.

use core::cell::RefCell;
use core::fmt;
use core::num::NonZeroUsize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use compact_str::CompactString;
use lru::LruCache;

use crate::error::Error;
use crate::model::{NodeKind, XdmNode};
use crate::path::PathStrategy;
use crate::path::cache::{PathCache, PathId};
use crate::stats::{DataStatistics, IndexCostEstimator, StoreCatalog, StoreId};
use crate::step::StepStrategy;
use crate::xdm::{XdmItem, XdmSequence};

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Value bound to the focus.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue<N> {
    Absent,
    Item(XdmItem<N>),
    /// A sequence used as context value, e.g. several documents of one database.
    Sequence(Arc<[XdmItem<N>]>),
}

impl<N: XdmNode> ContextValue<N> {
    pub fn from_sequence(mut seq: XdmSequence<N>) -> Self {
        match seq.len() {
            0 => ContextValue::Sequence(Arc::from(Vec::new())),
            1 => seq.pop().map_or(ContextValue::Absent, ContextValue::Item),
            _ => ContextValue::Sequence(seq.into()),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ContextValue::Absent)
    }

    pub fn items(&self) -> Vec<XdmItem<N>> {
        match self {
            ContextValue::Absent => Vec::new(),
            ContextValue::Item(i) => vec![i.clone()],
            ContextValue::Sequence(s) => s.to_vec(),
        }
    }

    /// Equality used to decide whether a cached path result still applies: identical
    /// items, or nodes of the same storage-backed document.
    pub fn same_input(&self, other: &ContextValue<N>) -> bool {
        fn same_item<N: XdmNode>(a: &XdmItem<N>, b: &XdmItem<N>) -> bool {
            match (a, b) {
                (XdmItem::Node(x), XdmItem::Node(y)) => {
                    x == y
                        || (x.store_id().is_some()
                            && x.store_id() == y.store_id()
                            && x.kind() == NodeKind::Document
                            && y.kind() == NodeKind::Document
                            && x.root() == y.root())
                }
                (XdmItem::Atomic(x), XdmItem::Atomic(y)) => x == y,
                _ => false,
            }
        }
        match (self, other) {
            (ContextValue::Absent, ContextValue::Absent) => true,
            (ContextValue::Item(a), ContextValue::Item(b)) => same_item(a, b),
            (ContextValue::Sequence(a), ContextValue::Sequence(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| same_item(x, y)))
            }
            _ => false,
        }
    }
}

/// Focus of one evaluation: context value, position and size.
///
/// Passed by value into every nested evaluation, so the caller's focus is restored
/// simply by dropping the inner one. A size of 0 means "not known".
#[derive(Debug, Clone)]
pub struct Focus<N> {
    pub value: ContextValue<N>,
    pub position: usize,
    pub size: usize,
}

impl<N: XdmNode> Focus<N> {
    pub fn absent() -> Self {
        Self {
            value: ContextValue::Absent,
            position: 0,
            size: 0,
        }
    }

    pub fn item(item: XdmItem<N>, position: usize, size: usize) -> Self {
        Self {
            value: ContextValue::Item(item),
            position,
            size,
        }
    }

    pub fn node(node: N) -> Self {
        Self::item(XdmItem::Node(node), 1, 1)
    }
}

/// Per-evaluation state: variable bindings, the cancellation flag and the path caches.
///
/// Not `Sync`: each thread evaluating a shared compiled plan uses its own context, which
/// keeps path caches strictly thread-local.
pub struct DynamicContext<N: XdmNode> {
    pub context_value: ContextValue<N>,
    pub variables: HashMap<CompactString, XdmSequence<N>>,
    cancel_flag: Option<Arc<AtomicBool>>,
    caches: Option<RefCell<LruCache<PathId, PathCache<N>>>>,
}

impl<N: XdmNode> DynamicContext<N> {
    pub fn initial_focus(&self) -> Focus<N> {
        Focus {
            value: self.context_value.clone(),
            position: 1,
            size: 1,
        }
    }

    pub fn variable(&self, name: &str) -> Option<&XdmSequence<N>> {
        self.variables.get(name)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Cooperative cancellation check, polled by long-running traversals.
    #[inline]
    pub fn check_cancelled(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            return Err(Error::cancelled());
        }
        Ok(())
    }

    /// Runs `f` on the cache entry of path `id`, creating it on first use.
    /// Returns `None` when path caching is switched off for this context.
    pub(crate) fn with_path_cache<R>(
        &self,
        id: PathId,
        f: impl FnOnce(&mut PathCache<N>) -> R,
    ) -> Option<R> {
        let cell = self.caches.as_ref()?;
        let mut caches = cell.borrow_mut();
        let entry = caches.get_or_insert_mut(id, PathCache::new);
        Some(f(entry))
    }

    /// Cache state of one compiled path on this context, mainly for diagnostics.
    pub fn path_cache_state(&self, id: PathId) -> Option<crate::path::cache::CacheState> {
        let cell = self.caches.as_ref()?;
        cell.borrow().peek(&id).map(PathCache::state)
    }
}

impl<N: XdmNode> fmt::Debug for DynamicContext<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicContext")
            .field("context_value", &self.context_value)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("cancellable", &self.cancel_flag.is_some())
            .finish_non_exhaustive()
    }
}

pub const DEFAULT_PATH_CACHE_CAPACITY: usize = 256;

pub struct DynamicContextBuilder<N: XdmNode> {
    context_value: ContextValue<N>,
    variables: HashMap<CompactString, XdmSequence<N>>,
    cancel_flag: Option<Arc<AtomicBool>>,
    cache_capacity: usize,
}

impl<N: XdmNode> Default for DynamicContextBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode> DynamicContextBuilder<N> {
    pub fn new() -> Self {
        Self {
            context_value: ContextValue::Absent,
            variables: HashMap::new(),
            cancel_flag: None,
            cache_capacity: DEFAULT_PATH_CACHE_CAPACITY,
        }
    }

    pub fn with_context_item(mut self, item: impl Into<XdmItem<N>>) -> Self {
        self.context_value = ContextValue::Item(item.into());
        self
    }

    pub fn with_context_sequence(mut self, seq: XdmSequence<N>) -> Self {
        self.context_value = ContextValue::from_sequence(seq);
        self
    }

    pub fn with_variable(mut self, name: &str, value: impl Into<XdmSequence<N>>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    /// Number of compiled paths whose cache state is remembered; 0 disables path caching.
    pub fn with_path_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn build(self) -> DynamicContext<N> {
        DynamicContext {
            context_value: self.context_value,
            variables: self.variables,
            cancel_flag: self.cancel_flag,
            caches: NonZeroUsize::new(self.cache_capacity).map(|c| RefCell::new(LruCache::new(c))),
        }
    }
}

/// Tunables of the path optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerOptions {
    /// An index access is too expensive when its result count exceeds
    /// `index_cost_ratio * data size`.
    pub index_cost_ratio: f64,
    /// Upper bound for the restart-from-top rewrite loop.
    pub max_rewrite_rounds: usize,
    pub enable_index_rewrite: bool,
    pub enable_child_rewrite: bool,
    /// Override the per-step strategy where the predicate shape allows it.
    pub force_step_strategy: Option<StepStrategy>,
    /// Override the path strategy where the step sequence allows it.
    pub force_path_strategy: Option<PathStrategy>,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            index_cost_ratio: 1.0,
            max_rewrite_rounds: 64,
            enable_index_rewrite: true,
            enable_child_rewrite: true,
            force_step_strategy: None,
            force_path_strategy: None,
        }
    }
}

impl OptimizerOptions {
    pub fn with_index_cost_ratio(mut self, ratio: f64) -> Self {
        self.index_cost_ratio = ratio;
        self
    }

    pub fn with_max_rewrite_rounds(mut self, rounds: usize) -> Self {
        self.max_rewrite_rounds = rounds;
        self
    }

    pub fn with_index_rewrite(mut self, enabled: bool) -> Self {
        self.enable_index_rewrite = enabled;
        self
    }

    pub fn with_child_rewrite(mut self, enabled: bool) -> Self {
        self.enable_child_rewrite = enabled;
        self
    }

    pub fn with_step_strategy(mut self, strategy: StepStrategy) -> Self {
        self.force_step_strategy = Some(strategy);
        self
    }

    pub fn with_path_strategy(mut self, strategy: PathStrategy) -> Self {
        self.force_path_strategy = Some(strategy);
        self
    }
}

/// What is statically known about the focus an expression is compiled against.
#[derive(Debug, Clone)]
pub struct StaticFocus<N> {
    /// Compile-time constant context value.
    pub value: Option<XdmSequence<N>>,
    /// Store every focus node is known to come from.
    pub store: Option<StoreId>,
}

impl<N> Default for StaticFocus<N> {
    fn default() -> Self {
        Self {
            value: None,
            store: None,
        }
    }
}

impl<N: XdmNode> StaticFocus<N> {
    pub fn of_value(value: XdmSequence<N>) -> Self {
        let store = common_store(&value);
        Self {
            value: Some(value),
            store,
        }
    }

    /// Focus of nodes reached by navigation from this one: same store, unknown value.
    pub fn navigated(&self) -> Self {
        Self {
            value: None,
            store: self.store,
        }
    }
}

/// Store shared by every item, if all items are store-backed nodes of one store.
pub fn common_store<N: XdmNode>(items: &[XdmItem<N>]) -> Option<StoreId> {
    let mut store = None;
    for item in items {
        let id = item.as_node()?.store_id()?;
        match store {
            None => store = Some(id),
            Some(s) if s != id => return None,
            Some(_) => {}
        }
    }
    store
}

/// Everything the optimizer may consult while compiling.
pub struct CompileContext<N: XdmNode> {
    pub focus: StaticFocus<N>,
    pub catalog: Option<Arc<dyn StoreCatalog>>,
    pub index: Option<Arc<dyn IndexCostEstimator<N>>>,
    pub options: OptimizerOptions,
    /// Statically known prefixes; `xml` is always bound.
    pub namespaces: HashMap<CompactString, CompactString>,
}

impl<N: XdmNode> Clone for CompileContext<N> {
    fn clone(&self) -> Self {
        Self {
            focus: self.focus.clone(),
            catalog: self.catalog.clone(),
            index: self.index.clone(),
            options: self.options.clone(),
            namespaces: self.namespaces.clone(),
        }
    }
}

impl<N: XdmNode> Default for CompileContext<N> {
    fn default() -> Self {
        CompileContextBuilder::new().build()
    }
}

impl<N: XdmNode> fmt::Debug for CompileContext<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileContext")
            .field("focus", &self.focus)
            .field("catalog", &self.catalog.is_some())
            .field("index", &self.index.is_some())
            .field("options", &self.options)
            .field("namespaces", &self.namespaces)
            .finish()
    }
}

impl<N: XdmNode> CompileContext<N> {
    /// Same resources, different static focus.
    pub fn with_focus(&self, focus: StaticFocus<N>) -> Self {
        Self {
            focus,
            ..self.clone()
        }
    }

    pub fn statistics(&self, store: StoreId) -> Option<Arc<dyn DataStatistics>> {
        self.catalog.as_ref()?.statistics(store)
    }
}

pub struct CompileContextBuilder<N: XdmNode> {
    ctx: CompileContext<N>,
}

impl<N: XdmNode> Default for CompileContextBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode> CompileContextBuilder<N> {
    pub fn new() -> Self {
        Self {
            ctx: CompileContext {
                focus: StaticFocus::default(),
                catalog: None,
                index: None,
                options: OptimizerOptions::default(),
                namespaces: HashMap::new(),
            },
        }
    }

    /// Context value known at compile time (e.g. the documents of an opened database).
    pub fn with_context_value(mut self, value: XdmSequence<N>) -> Self {
        self.ctx.focus = StaticFocus::of_value(value);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn StoreCatalog>) -> Self {
        self.ctx.catalog = Some(catalog);
        self
    }

    pub fn with_index_estimator(mut self, index: Arc<dyn IndexCostEstimator<N>>) -> Self {
        self.ctx.index = Some(index);
        self
    }

    pub fn with_options(mut self, options: OptimizerOptions) -> Self {
        self.ctx.options = options;
        self
    }

    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.ctx.namespaces.insert(prefix.into(), uri.into());
        self
    }

    pub fn build(self) -> CompileContext<N> {
        self.ctx
    }
}
