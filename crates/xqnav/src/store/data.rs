use core::fmt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use compact_str::CompactString;
use string_cache::DefaultAtom;

use super::node::DbNode;
use super::summary::PathSummary;
use crate::error::Error;
use crate::model::{NodeKind, QName};
use crate::stats::{DataStatistics, StoreId, StructuralSummary};

static NEXT_STORE_ID: AtomicU32 = AtomicU32::new(1);

pub(crate) fn next_store_id() -> StoreId {
    StoreId(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Dictionary entry of an element, attribute or processing-instruction name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NameEntry {
    pub local: DefaultAtom,
    pub prefix: Option<DefaultAtom>,
    pub uri: Option<DefaultAtom>,
}

impl NameEntry {
    fn qname(&self) -> QName {
        QName::new(self.prefix.as_deref(), &self.local, self.uri.as_deref())
    }
}

/// Immutable node table of one or more documents in pre-order.
///
/// The attributes of an element, then its namespace nodes, directly follow the element;
/// its children come after them. `sizes[pre]` spans the whole subtree including those.
#[derive(Clone)]
pub struct Data {
    pub(crate) id: StoreId,
    pub(crate) kinds: Vec<NodeKind>,
    pub(crate) names: Vec<Option<u32>>,
    pub(crate) parents: Vec<Option<u32>>,
    pub(crate) sizes: Vec<u32>,
    /// Number of attribute nodes directly following each element.
    pub(crate) attr_counts: Vec<u32>,
    pub(crate) ns_counts: Vec<u32>,
    pub(crate) values: Vec<Option<Box<str>>>,
    pub(crate) documents: Vec<u32>,

    pub(crate) dictionary: Vec<NameEntry>,
    pub(crate) qnames: Vec<QName>,
    pub(crate) element_names: HashSet<DefaultAtom>,
    pub(crate) attribute_names: HashSet<DefaultAtom>,
    pub(crate) element_ns: Option<Option<CompactString>>,
    pub(crate) attribute_ns: Option<Option<CompactString>>,

    pub(crate) summary: PathSummary,
    pub(crate) up_to_date: bool,

    /// Text value to the sorted `pre`s of text nodes with that value.
    pub(crate) text_index: HashMap<Box<str>, Vec<u32>>,
    /// Attribute value to the sorted `pre`s of attributes with that value.
    pub(crate) attribute_index: HashMap<Box<str>, Vec<u32>>,
}

impl Data {
    /// Single-document store parsed from XML text.
    pub fn from_xml(xml: &str) -> Result<Arc<Data>, Error> {
        Ok(super::DataBuilder::new().xml(xml)?.build())
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Copy of this data whose structural summary no longer counts as current. The copy
    /// is a store of its own.
    pub fn with_stale_summary(&self) -> Arc<Data> {
        let mut copy = self.clone();
        copy.id = next_store_id();
        copy.up_to_date = false;
        Arc::new(copy)
    }

    pub fn document(self: &Arc<Self>, index: usize) -> Option<DbNode> {
        let pre = *self.documents.get(index)?;
        Some(DbNode::new(self.clone(), pre))
    }

    pub fn documents(self: &Arc<Self>) -> Vec<DbNode> {
        self.documents
            .iter()
            .map(|pre| DbNode::new(self.clone(), *pre))
            .collect()
    }

    pub fn node(self: &Arc<Self>, pre: u32) -> Option<DbNode> {
        (usize::try_from(pre).ok()? < self.len()).then(|| DbNode::new(self.clone(), pre))
    }

    pub(crate) fn kind(&self, pre: u32) -> NodeKind {
        self.kinds[pre as usize]
    }

    pub(crate) fn qname(&self, pre: u32) -> Option<&QName> {
        self.names[pre as usize].map(|id| &self.qnames[id as usize])
    }

    pub(crate) fn value(&self, pre: u32) -> Option<&str> {
        self.values[pre as usize].as_deref()
    }

    pub(crate) fn parent(&self, pre: u32) -> Option<u32> {
        self.parents[pre as usize]
    }

    pub(crate) fn size(&self, pre: u32) -> u32 {
        self.sizes[pre as usize]
    }

    pub(crate) fn attr_count(&self, pre: u32) -> u32 {
        self.attr_counts[pre as usize]
    }

    pub(crate) fn ns_count(&self, pre: u32) -> u32 {
        self.ns_counts[pre as usize]
    }

    /// First `pre` after the attributes and namespaces of `pre`.
    pub(crate) fn content_start(&self, pre: u32) -> u32 {
        pre + 1 + self.attr_count(pre) + self.ns_count(pre)
    }

    /// Sorted `pre`s of the text nodes whose value is `value`.
    pub fn text_hits(&self, value: &str) -> &[u32] {
        self.text_index.get(value).map_or(&[][..], Vec::as_slice)
    }

    /// Sorted `pre`s of the attributes whose value is `value`.
    pub fn attribute_hits(&self, value: &str) -> &[u32] {
        self.attribute_index.get(value).map_or(&[][..], Vec::as_slice)
    }

    pub(crate) fn intern(
        dictionary: &mut Vec<NameEntry>,
        lookup: &mut HashMap<NameEntry, u32>,
        name: &QName,
    ) -> u32 {
        let entry = NameEntry {
            local: DefaultAtom::from(name.local.as_str()),
            prefix: name.prefix.as_deref().map(DefaultAtom::from),
            uri: name.ns_uri.as_deref().map(DefaultAtom::from),
        };
        if let Some(id) = lookup.get(&entry) {
            return *id;
        }
        let id = u32::try_from(dictionary.len()).unwrap_or(u32::MAX);
        dictionary.push(entry.clone());
        lookup.insert(entry, id);
        id
    }

    pub(crate) fn resolve_names(dictionary: &[NameEntry]) -> Vec<QName> {
        dictionary.iter().map(NameEntry::qname).collect()
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("id", &self.id)
            .field("nodes", &self.kinds.len())
            .field("documents", &self.documents.len())
            .field("names", &self.dictionary.len())
            .field("path_nodes", &self.summary.len())
            .field("up_to_date", &self.up_to_date)
            .finish_non_exhaustive()
    }
}

impl DataStatistics for Data {
    fn store_id(&self) -> StoreId {
        self.id
    }

    fn size(&self) -> u64 {
        self.kinds.len() as u64
    }

    fn document_count(&self) -> usize {
        self.documents.len()
    }

    fn up_to_date(&self) -> bool {
        self.up_to_date
    }

    fn summary(&self) -> Option<&dyn StructuralSummary> {
        Some(&self.summary)
    }

    fn has_name(&self, kind: NodeKind, local: &str) -> bool {
        let atom = DefaultAtom::from(local);
        match kind {
            NodeKind::Element => self.element_names.contains(&atom),
            NodeKind::Attribute => self.attribute_names.contains(&atom),
            _ => true,
        }
    }

    fn global_namespace(&self) -> Option<Option<CompactString>> {
        self.element_ns.clone()
    }

    fn attribute_namespace(&self) -> Option<Option<CompactString>> {
        self.attribute_ns.clone()
    }
}
