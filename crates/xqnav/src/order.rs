//! Document-order utilities.

use core::cmp::Ordering;

use smallvec::SmallVec;

use crate::error::Error;
use crate::model::{XdmNode, node_compare};

/// Sort and deduplicate a node vector by document order.
///
/// Nodes exposing `doc_order_key` are sorted by key; the rest fall back to the
/// adapter's comparator. Comparator errors (nodes of unrelated trees without keys)
/// are propagated rather than guessed.
pub fn sorted_distinct_nodes<N: XdmNode>(nodes: Vec<N>) -> Result<Vec<N>, Error> {
    if nodes.len() < 2 {
        return Ok(nodes);
    }
    let mut keyed: Vec<(u64, N)> = Vec::with_capacity(nodes.len());
    let mut fallback: SmallVec<[N; 16]> = SmallVec::new();
    for n in nodes {
        if let Some(k) = n.doc_order_key() {
            keyed.push((k, n));
        } else {
            fallback.push(n);
        }
    }
    if fallback.is_empty() {
        keyed.sort_by_key(|(k, _)| *k);
        keyed.dedup_by(|a, b| a.0 == b.0);
        return Ok(keyed.into_iter().map(|(_, n)| n).collect());
    }
    let mut merged: Vec<N> = Vec::with_capacity(fallback.len() + keyed.len());
    merged.extend(fallback);
    merged.extend(keyed.into_iter().map(|(_, n)| n));
    let mut failure: Option<Error> = None;
    merged.sort_by(|a, b| {
        node_compare(a, b).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        })
    });
    if let Some(e) = failure {
        return Err(e);
    }
    merged.dedup();
    Ok(merged)
}

/// Whether `nodes` is strictly increasing in document order.
pub fn is_sorted_distinct<N: XdmNode>(nodes: &[N]) -> Result<bool, Error> {
    for w in nodes.windows(2) {
        if node_compare(&w[0], &w[1])? != Ordering::Less {
            return Ok(false);
        }
    }
    Ok(true)
}
