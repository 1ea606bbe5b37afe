use std::collections::HashMap;

use crate::model::{NodeKind, QName};
use crate::stats::{PathNode, PathNodeId, PathStats, StructuralSummary};

/// Structural summary: one node per distinct (parent path, kind, name) in the data.
///
/// All documents of a store share the single document path node.
#[derive(Debug, Clone, Default)]
pub struct PathSummary {
    nodes: Vec<PathNode>,
    roots: Vec<PathNodeId>,
    lookup: HashMap<(Option<PathNodeId>, NodeKind, Option<u32>), PathNodeId>,
}

impl PathSummary {
    /// Registers one data node below `parent` and returns its path node.
    pub(crate) fn enter(
        &mut self,
        parent: Option<PathNodeId>,
        kind: NodeKind,
        name_id: Option<u32>,
        name: Option<&QName>,
    ) -> PathNodeId {
        let id = match self.lookup.get(&(parent, kind, name_id)) {
            Some(id) => *id,
            None => {
                let id = self.nodes.len();
                let level = parent.map_or(0, |p| self.nodes[p].level + 1);
                self.nodes.push(PathNode {
                    kind,
                    name: name.cloned(),
                    level,
                    parent,
                    children: Vec::new(),
                    stats: PathStats {
                        count: 0,
                        leaf: kind == NodeKind::Element,
                    },
                });
                match parent {
                    Some(p) => self.nodes[p].children.push(id),
                    None => self.roots.push(id),
                }
                self.lookup.insert((parent, kind, name_id), id);
                id
            }
        };
        self.nodes[id].stats.count += 1;
        id
    }

    /// Records the shape of one element instance; a single non-leaf instance makes the
    /// whole path node non-leaf.
    pub(crate) fn record_shape(&mut self, id: PathNodeId, element_children: usize, text_children: usize) {
        if element_children > 0 || text_children > 1 {
            self.nodes[id].stats.leaf = false;
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl StructuralSummary for PathSummary {
    fn root_path_nodes(&self) -> &[PathNodeId] {
        &self.roots
    }

    fn node(&self, id: PathNodeId) -> &PathNode {
        &self.nodes[id]
    }
}
