//! Construction of [`Data`] from node trees or XML text.
//!
//! ```
//! use xqnav::store::{DataBuilder, doc, elem};
//!
//! let data = DataBuilder::new()
//!     .document(doc().child(elem("a").attr("id", "1").text("x")))
//!     .build();
//! assert_eq!(data.documents().len(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use compact_str::CompactString;
use string_cache::DefaultAtom;

use super::data::{Data, NameEntry, next_store_id};
use super::summary::PathSummary;
use crate::error::Error;
use crate::model::{NodeKind, QName};
use crate::stats::PathNodeId;

/// Node tree awaiting insertion into a store.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    attributes: Vec<(QName, String)>,
    namespaces: Vec<(CompactString, CompactString)>,
    children: Vec<NodeSpec>,
}

impl NodeSpec {
    fn new(kind: NodeKind, name: Option<QName>, value: Option<String>) -> Self {
        Self {
            kind,
            name,
            value,
            attributes: Vec::new(),
            namespaces: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn text(self, value: &str) -> Self {
        self.child(text(value))
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((QName::local(name), value.to_string()));
        self
    }

    pub fn attr_ns(mut self, name: QName, value: &str) -> Self {
        self.attributes.push((name, value.to_string()));
        self
    }

    /// Declares a namespace; an empty prefix declares the default namespace.
    pub fn ns(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }
}

pub fn doc() -> NodeSpec {
    NodeSpec::new(NodeKind::Document, None, None)
}

pub fn elem(name: &str) -> NodeSpec {
    NodeSpec::new(NodeKind::Element, Some(QName::local(name)), None)
}

pub fn elem_ns(name: QName) -> NodeSpec {
    NodeSpec::new(NodeKind::Element, Some(name), None)
}

pub fn text(value: &str) -> NodeSpec {
    NodeSpec::new(NodeKind::Text, None, Some(value.to_string()))
}

pub fn comment(value: &str) -> NodeSpec {
    NodeSpec::new(NodeKind::Comment, None, Some(value.to_string()))
}

pub fn pi(target: &str, value: &str) -> NodeSpec {
    NodeSpec::new(
        NodeKind::ProcessingInstruction,
        Some(QName::local(target)),
        Some(value.to_string()),
    )
}

/// Collects documents and produces an immutable [`Data`] with a fresh store id.
#[derive(Debug, Default)]
pub struct DataBuilder {
    documents: Vec<NodeSpec>,
}

impl DataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document. A non-document root is wrapped into one.
    pub fn document(mut self, root: NodeSpec) -> Self {
        let root = if root.kind == NodeKind::Document {
            root
        } else {
            doc().child(root)
        };
        self.documents.push(root);
        self
    }

    /// Adds a document parsed from XML text. Whitespace-only text nodes are dropped.
    pub fn xml(self, xml: &str) -> Result<Self, Error> {
        let parsed = roxmltree::Document::parse(xml)?;
        let root = convert(parsed.root(), None);
        Ok(self.document(root))
    }

    pub fn build(self) -> Arc<Data> {
        let mut table = Table::default();
        for d in &self.documents {
            table.push(d, None, None);
        }
        let id = next_store_id();
        tracing::debug!(store = %id, nodes = table.kinds.len(), documents = table.documents.len(), "store built");
        Arc::new(table.finish(id))
    }
}

fn convert(node: roxmltree::Node<'_, '_>, parent: Option<roxmltree::Node<'_, '_>>) -> NodeSpec {
    match node.node_type() {
        roxmltree::NodeType::Root => doc().children(
            node.children()
                .filter_map(|c| keep(c).then(|| convert(c, Some(node)))),
        ),
        roxmltree::NodeType::Element => {
            let tag = node.tag_name();
            let prefix = tag.namespace().and_then(|uri| node.lookup_prefix(uri));
            let mut spec = elem_ns(QName::new(prefix, tag.name(), tag.namespace()));
            let inherited: HashSet<(Option<&str>, &str)> = parent
                .filter(roxmltree::Node::is_element)
                .map(|p| p.namespaces().map(|n| (n.name(), n.uri())).collect())
                .unwrap_or_default();
            for n in node.namespaces() {
                if !inherited.contains(&(n.name(), n.uri())) && n.name() != Some("xml") {
                    spec = spec.ns(n.name().unwrap_or(""), n.uri());
                }
            }
            for a in node.attributes() {
                let prefix = a.namespace().and_then(|uri| node.lookup_prefix(uri));
                spec = spec.attr_ns(QName::new(prefix, a.name(), a.namespace()), a.value());
            }
            spec.children(
                node.children()
                    .filter_map(|c| keep(c).then(|| convert(c, Some(node)))),
            )
        }
        roxmltree::NodeType::Text => text(node.text().unwrap_or_default()),
        roxmltree::NodeType::Comment => comment(node.text().unwrap_or_default()),
        roxmltree::NodeType::PI => match node.pi() {
            Some(p) => pi(p.target, p.value.unwrap_or_default()),
            None => comment(""),
        },
    }
}

fn keep(node: roxmltree::Node<'_, '_>) -> bool {
    !node.is_text() || node.text().is_some_and(|t| !t.trim().is_empty())
}

/// Names used by one kind of node; `None` once several namespaces have been seen.
#[derive(Default)]
struct NamespaceUse {
    seen: Option<Option<CompactString>>,
    mixed: bool,
}

impl NamespaceUse {
    fn record(&mut self, uri: Option<&CompactString>) {
        match &self.seen {
            None => self.seen = Some(uri.cloned()),
            Some(s) if s.as_ref() != uri => self.mixed = true,
            Some(_) => {}
        }
    }

    fn finish(self) -> Option<Option<CompactString>> {
        if self.mixed {
            None
        } else {
            Some(self.seen.unwrap_or(None))
        }
    }
}

#[derive(Default)]
struct Table {
    kinds: Vec<NodeKind>,
    names: Vec<Option<u32>>,
    parents: Vec<Option<u32>>,
    sizes: Vec<u32>,
    attr_counts: Vec<u32>,
    ns_counts: Vec<u32>,
    values: Vec<Option<Box<str>>>,
    documents: Vec<u32>,
    dictionary: Vec<NameEntry>,
    lookup: HashMap<NameEntry, u32>,
    element_names: HashSet<DefaultAtom>,
    attribute_names: HashSet<DefaultAtom>,
    element_ns: NamespaceUse,
    attribute_ns: NamespaceUse,
    summary: PathSummary,
    text_index: HashMap<Box<str>, Vec<u32>>,
    attribute_index: HashMap<Box<str>, Vec<u32>>,
}

impl Table {
    fn next_pre(&self) -> u32 {
        u32::try_from(self.kinds.len()).unwrap_or(u32::MAX)
    }

    fn add(
        &mut self,
        kind: NodeKind,
        name: Option<&QName>,
        value: Option<&str>,
        parent: Option<u32>,
    ) -> (u32, Option<u32>) {
        let pre = self.next_pre();
        let name_id = name.map(|n| Data::intern(&mut self.dictionary, &mut self.lookup, n));
        self.kinds.push(kind);
        self.names.push(name_id);
        self.parents.push(parent);
        self.sizes.push(1);
        self.attr_counts.push(0);
        self.ns_counts.push(0);
        self.values.push(value.map(Into::into));
        (pre, name_id)
    }

    fn push(&mut self, spec: &NodeSpec, parent: Option<u32>, parent_path: Option<PathNodeId>) {
        let (pre, name_id) = self.add(spec.kind, spec.name.as_ref(), spec.value.as_deref(), parent);
        let path = self
            .summary
            .enter(parent_path, spec.kind, name_id, spec.name.as_ref());
        match spec.kind {
            NodeKind::Document => self.documents.push(pre),
            NodeKind::Element => {
                if let Some(name) = &spec.name {
                    self.element_names.insert(DefaultAtom::from(name.local.as_str()));
                    self.element_ns.record(name.ns_uri.as_ref());
                }
            }
            NodeKind::Text => {
                let value: Box<str> = spec.value.as_deref().unwrap_or_default().into();
                self.text_index.entry(value).or_default().push(pre);
            }
            _ => {}
        }

        for (name, value) in &spec.attributes {
            let (apre, aname) = self.add(NodeKind::Attribute, Some(name), Some(value), Some(pre));
            self.summary
                .enter(Some(path), NodeKind::Attribute, aname, Some(name));
            self.attribute_names.insert(DefaultAtom::from(name.local.as_str()));
            self.attribute_ns.record(name.ns_uri.as_ref());
            self.attribute_index
                .entry(value.as_str().into())
                .or_default()
                .push(apre);
        }
        for (prefix, uri) in &spec.namespaces {
            let name = QName::local(prefix);
            self.add(NodeKind::Namespace, Some(&name), Some(uri), Some(pre));
        }
        let pre_idx = pre as usize;
        self.attr_counts[pre_idx] = u32::try_from(spec.attributes.len()).unwrap_or(u32::MAX);
        self.ns_counts[pre_idx] = u32::try_from(spec.namespaces.len()).unwrap_or(u32::MAX);

        for child in &spec.children {
            self.push(child, Some(pre), Some(path));
        }
        self.sizes[pre_idx] = self.next_pre() - pre;

        if spec.kind == NodeKind::Element {
            let elements = spec.children.iter().filter(|c| c.kind == NodeKind::Element).count();
            let texts = spec.children.iter().filter(|c| c.kind == NodeKind::Text).count();
            self.summary.record_shape(path, elements, texts);
        }
    }

    fn finish(self, id: crate::stats::StoreId) -> Data {
        Data {
            id,
            kinds: self.kinds,
            names: self.names,
            parents: self.parents,
            sizes: self.sizes,
            attr_counts: self.attr_counts,
            ns_counts: self.ns_counts,
            values: self.values,
            documents: self.documents,
            qnames: Data::resolve_names(&self.dictionary),
            dictionary: self.dictionary,
            element_names: self.element_names,
            attribute_names: self.attribute_names,
            element_ns: self.element_ns.finish(),
            attribute_ns: self.attribute_ns.finish(),
            summary: self.summary,
            up_to_date: true,
            text_index: self.text_index,
            attribute_index: self.attribute_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{DataStatistics, StructuralSummary};

    #[test]
    fn attributes_precede_children() {
        let data = DataBuilder::new()
            .document(elem("a").attr("x", "1").child(elem("b")))
            .build();
        assert_eq!(data.kinds, [
            NodeKind::Document,
            NodeKind::Element,
            NodeKind::Attribute,
            NodeKind::Element
        ]);
        assert_eq!(data.sizes, [4, 3, 1, 1]);
        assert_eq!(data.content_start(1), 3);
    }

    #[test]
    fn summary_counts_and_leaves() {
        let data = Data::from_xml("<a><b>1</b><b>2</b><c><b>3</b></c></a>").expect("xml");
        let summary = data.summary().expect("summary");
        let root = summary.root_path_nodes()[0];
        let a = summary.node(root).children[0];
        let b = summary.node(a).children[0];
        assert_eq!(summary.node(b).stats.count, 2);
        assert!(summary.node(b).stats.leaf);
        assert!(!summary.node(a).stats.leaf);
        assert_eq!(data.global_namespace(), Some(None));
    }

    #[test]
    fn mixed_namespaces_have_no_global_namespace() {
        let data = Data::from_xml(r#"<a xmlns:p="urn:p"><p:b/></a>"#).expect("xml");
        assert_eq!(data.global_namespace(), None);
    }
}
