//! Per-context cache of one compiled path.
//!
//! A path evaluated again and again against the same input (typically inside a loop of
//! the enclosing query) is traversed twice, then served from a buffer. Any change of the
//! input switches caching off for good.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::ContextValue;
use crate::model::XdmNode;
use crate::xdm::XdmItem;

/// Identity of a compiled path; clones of a path share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(u64);

impl PathId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        PathId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheState {
    /// Never evaluated.
    Init,
    /// Evaluated once; caching is allowed.
    Enabled,
    /// Evaluated twice; the input of the second call is remembered.
    Ready,
    /// The result for the remembered input is buffered.
    Cached,
    /// Terminal: every call evaluates afresh.
    Disabled,
}

/// What the caller has to do for one evaluation.
pub(crate) enum CacheAction<N> {
    /// Evaluate normally.
    Evaluate,
    /// Evaluate fully and hand the result to [`PathCache::store`].
    Store,
    /// Return the buffered result.
    Serve(Arc<[XdmItem<N>]>),
}

#[derive(Debug)]
pub struct PathCache<N> {
    state: CacheState,
    input: Option<ContextValue<N>>,
    result: Option<Arc<[XdmItem<N>]>>,
}

impl<N: XdmNode> Default for PathCache<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode> PathCache<N> {
    pub fn new() -> Self {
        Self {
            state: CacheState::Init,
            input: None,
            result: None,
        }
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    fn transition(&mut self, id: PathId, to: CacheState) {
        if self.state != to {
            tracing::trace!(path_id = id.get(), from = ?self.state, to = ?to, "path cache");
            self.state = to;
        }
        if to == CacheState::Disabled {
            self.input = None;
            self.result = None;
        }
    }

    /// Advances the state machine for one evaluation against `input`.
    ///
    /// `eligible` is consulted on the first call only: paths with free variables or
    /// non-deterministic parts are never cached.
    pub(crate) fn advance(
        &mut self,
        id: PathId,
        eligible: bool,
        input: &ContextValue<N>,
    ) -> CacheAction<N> {
        match self.state {
            CacheState::Init => {
                let to = if eligible {
                    CacheState::Enabled
                } else {
                    CacheState::Disabled
                };
                self.transition(id, to);
                CacheAction::Evaluate
            }
            CacheState::Enabled => {
                self.input = Some(input.clone());
                self.transition(id, CacheState::Ready);
                CacheAction::Evaluate
            }
            CacheState::Ready => {
                if self.matches(input) {
                    CacheAction::Store
                } else {
                    self.transition(id, CacheState::Disabled);
                    CacheAction::Evaluate
                }
            }
            CacheState::Cached => match (&self.result, self.matches(input)) {
                (Some(result), true) => CacheAction::Serve(result.clone()),
                _ => {
                    self.transition(id, CacheState::Disabled);
                    CacheAction::Evaluate
                }
            },
            CacheState::Disabled => CacheAction::Evaluate,
        }
    }

    /// Buffers the result computed after [`CacheAction::Store`].
    pub(crate) fn store(&mut self, id: PathId, result: Arc<[XdmItem<N>]>) {
        if self.state == CacheState::Ready {
            self.result = Some(result);
            self.transition(id, CacheState::Cached);
        }
    }

    fn matches(&self, input: &ContextValue<N>) -> bool {
        self.input.as_ref().is_some_and(|c| c.same_input(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DataBuilder, DbNode, doc, elem};

    fn input() -> ContextValue<DbNode> {
        let data = DataBuilder::new().document(doc().child(elem("a"))).build();
        ContextValue::Item(XdmItem::Node(data.document(0).expect("document")))
    }

    #[test]
    fn walks_to_cached_and_serves() {
        let id = PathId::next();
        let mut cache = PathCache::new();
        let cv = input();
        assert!(matches!(cache.advance(id, true, &cv), CacheAction::Evaluate));
        assert_eq!(cache.state(), CacheState::Enabled);
        assert!(matches!(cache.advance(id, true, &cv), CacheAction::Evaluate));
        assert_eq!(cache.state(), CacheState::Ready);
        assert!(matches!(cache.advance(id, true, &cv), CacheAction::Store));
        cache.store(id, Arc::from(Vec::new()));
        assert_eq!(cache.state(), CacheState::Cached);
        assert!(matches!(cache.advance(id, true, &cv), CacheAction::Serve(_)));
    }

    #[test]
    fn ineligible_path_is_disabled_immediately() {
        let id = PathId::next();
        let mut cache = PathCache::new();
        let cv = input();
        cache.advance(id, false, &cv);
        assert_eq!(cache.state(), CacheState::Disabled);
        cache.advance(id, true, &cv);
        assert_eq!(cache.state(), CacheState::Disabled);
    }

    #[test]
    fn changed_input_disables() {
        let id = PathId::next();
        let mut cache = PathCache::new();
        cache.advance(id, true, &input());
        cache.advance(id, true, &input());
        cache.advance(id, true, &ContextValue::Absent);
        assert_eq!(cache.state(), CacheState::Disabled);
    }
}
