use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

use super::data::Data;
use crate::error::Error;
use crate::model::{NodeKind, QName, XdmNode};
use crate::stats::StoreId;

/// Node reference into a [`Data`] table.
#[derive(Clone)]
pub struct DbNode {
    data: Arc<Data>,
    pre: u32,
}

impl DbNode {
    pub(crate) fn new(data: Arc<Data>, pre: u32) -> Self {
        Self { data, pre }
    }

    pub fn pre(&self) -> u32 {
        self.pre
    }

    pub fn data(&self) -> &Arc<Data> {
        &self.data
    }

    fn at(&self, pre: u32) -> Self {
        Self::new(self.data.clone(), pre)
    }
}

impl PartialEq for DbNode {
    fn eq(&self, other: &Self) -> bool {
        self.pre == other.pre && Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for DbNode {}

impl Hash for DbNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.id.hash(state);
        self.pre.hash(state);
    }
}

impl fmt::Debug for DbNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DbNode({}:{} {:?}", self.data.id, self.pre, self.kind())?;
        if let Some(name) = self.data.qname(self.pre) {
            write!(f, " {name}")?;
        }
        f.write_str(")")
    }
}

/// Contiguous run of attribute or namespace nodes.
pub struct NodeRun {
    data: Arc<Data>,
    next: u32,
    end: u32,
}

impl Iterator for NodeRun {
    type Item = DbNode;

    fn next(&mut self) -> Option<DbNode> {
        (self.next < self.end).then(|| {
            let node = DbNode::new(self.data.clone(), self.next);
            self.next += 1;
            node
        })
    }
}

/// Children of one node, skipping over each child's subtree.
pub struct ChildNodes {
    data: Arc<Data>,
    next: u32,
    end: u32,
}

impl Iterator for ChildNodes {
    type Item = DbNode;

    fn next(&mut self) -> Option<DbNode> {
        if self.next >= self.end {
            return None;
        }
        let pre = self.next;
        self.next += self.data.size(pre);
        Some(DbNode::new(self.data.clone(), pre))
    }
}

impl XdmNode for DbNode {
    type Children<'a> = ChildNodes;
    type Attributes<'a> = NodeRun;
    type Namespaces<'a> = NodeRun;

    fn kind(&self) -> NodeKind {
        self.data.kind(self.pre)
    }

    fn name(&self) -> Option<QName> {
        self.data.qname(self.pre).cloned()
    }

    fn string_value(&self) -> String {
        match self.kind() {
            NodeKind::Document | NodeKind::Element => {
                let end = self.pre + self.data.size(self.pre);
                (self.pre + 1..end)
                    .filter(|p| self.data.kind(*p) == NodeKind::Text)
                    .filter_map(|p| self.data.value(p))
                    .collect()
            }
            _ => self.data.value(self.pre).unwrap_or_default().to_string(),
        }
    }

    fn parent(&self) -> Option<Self> {
        self.data.parent(self.pre).map(|p| self.at(p))
    }

    fn children(&self) -> ChildNodes {
        let (next, end) = match self.kind() {
            NodeKind::Document | NodeKind::Element => (
                self.data.content_start(self.pre),
                self.pre + self.data.size(self.pre),
            ),
            _ => (0, 0),
        };
        ChildNodes {
            data: self.data.clone(),
            next,
            end,
        }
    }

    fn attributes(&self) -> NodeRun {
        let next = self.pre + 1;
        NodeRun {
            data: self.data.clone(),
            next,
            end: next + self.data.attr_count(self.pre),
        }
    }

    fn namespaces(&self) -> NodeRun {
        let next = self.pre + 1 + self.data.attr_count(self.pre);
        NodeRun {
            data: self.data.clone(),
            next,
            end: next + self.data.ns_count(self.pre),
        }
    }

    fn doc_order_key(&self) -> Option<u64> {
        Some((u64::from(self.data.id.0) << 40) | u64::from(self.pre))
    }

    fn store_id(&self) -> Option<StoreId> {
        Some(self.data.id)
    }

    fn compare_document_order(&self, other: &Self) -> Result<Ordering, Error> {
        Ok(self
            .data
            .id
            .cmp(&other.data.id)
            .then(self.pre.cmp(&other.pre)))
    }

    fn root(&self) -> Self {
        let docs = &self.data.documents;
        let idx = docs.partition_point(|d| *d <= self.pre);
        match idx.checked_sub(1) {
            Some(i) => self.at(docs[i]),
            None => self.clone(),
        }
    }

    fn next_sibling(&self) -> Option<Self> {
        if matches!(self.kind(), NodeKind::Attribute | NodeKind::Namespace) {
            return None;
        }
        let parent = self.data.parent(self.pre)?;
        let next = self.pre + self.data.size(self.pre);
        (next < parent + self.data.size(parent)).then(|| self.at(next))
    }
}
