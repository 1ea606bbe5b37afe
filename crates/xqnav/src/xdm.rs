use core::fmt;

use crate::error::Error;
use crate::model::{NodeKind, XdmNode};

/// Atomic values the navigational sublanguage works with.
#[derive(Debug, Clone, PartialEq)]
pub enum XdmAtomicValue {
    Boolean(bool),
    String(String),
    Integer(i64),
    Double(f64),
    UntypedAtomic(String),
}

impl XdmAtomicValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            XdmAtomicValue::Boolean(_) => "xs:boolean",
            XdmAtomicValue::String(_) => "xs:string",
            XdmAtomicValue::Integer(_) => "xs:integer",
            XdmAtomicValue::Double(_) => "xs:double",
            XdmAtomicValue::UntypedAtomic(_) => "xs:untypedAtomic",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, XdmAtomicValue::Integer(_) | XdmAtomicValue::Double(_))
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            XdmAtomicValue::Integer(i) => Some(*i as f64),
            XdmAtomicValue::Double(d) => Some(*d),
            XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::String(s) => {
                s.trim().parse::<f64>().ok()
            }
            XdmAtomicValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            XdmAtomicValue::Boolean(_) => ItemType::Boolean,
            XdmAtomicValue::String(_) | XdmAtomicValue::UntypedAtomic(_) => ItemType::String,
            XdmAtomicValue::Integer(_) | XdmAtomicValue::Double(_) => ItemType::Numeric,
        }
    }
}

impl fmt::Display for XdmAtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmAtomicValue::Boolean(b) => write!(f, "{b}"),
            XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) => f.write_str(s),
            XdmAtomicValue::Integer(i) => write!(f, "{i}"),
            XdmAtomicValue::Double(d) => write!(f, "{d}"),
        }
    }
}

pub type XdmSequence<N> = Vec<XdmItem<N>>;

/// Lazily produced item sequence.
pub type XdmStream<'a, N> = Box<dyn Iterator<Item = Result<XdmItem<N>, Error>> + 'a>;

/// Lazily produced node sequence.
pub type NodeStream<'a, N> = Box<dyn Iterator<Item = Result<N, Error>> + 'a>;

#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem<N> {
    Node(N),
    Atomic(XdmAtomicValue),
}

impl<N> From<N> for XdmItem<N> {
    fn from(n: N) -> Self {
        XdmItem::Node(n)
    }
}

impl<N: XdmNode> XdmItem<N> {
    pub fn as_node(&self) -> Option<&N> {
        match self {
            XdmItem::Node(n) => Some(n),
            XdmItem::Atomic(_) => None,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            XdmItem::Node(n) => ItemType::Node(Some(n.kind())),
            XdmItem::Atomic(a) => a.item_type(),
        }
    }

    /// Atomization of a single item.
    pub fn atomize(&self) -> XdmAtomicValue {
        match self {
            XdmItem::Node(n) => XdmAtomicValue::UntypedAtomic(n.string_value()),
            XdmItem::Atomic(a) => a.clone(),
        }
    }

    /// Short description used in type error messages.
    pub fn type_label(&self) -> String {
        match self {
            XdmItem::Node(n) => n.kind().test_name().to_string(),
            XdmItem::Atomic(a) => a.type_name().to_string(),
        }
    }
}

impl<N> fmt::Display for XdmItem<N>
where
    N: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmItem::Node(_) => write!(f, "<node>"),
            XdmItem::Atomic(a) => write!(f, "{a}"),
        }
    }
}

/// Static item type, coarse enough for the decisions the optimizer makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// Node of the given kind, or any node.
    Node(Option<NodeKind>),
    Boolean,
    String,
    Numeric,
    AnyAtomic,
    Item,
}

impl ItemType {
    pub fn is_node(self) -> bool {
        matches!(self, ItemType::Node(_))
    }

    pub fn is_atomic(self) -> bool {
        matches!(
            self,
            ItemType::Boolean | ItemType::String | ItemType::Numeric | ItemType::AnyAtomic
        )
    }

    /// Whether a value of this type could be numeric at runtime.
    pub fn may_be_numeric(self) -> bool {
        matches!(self, ItemType::Numeric | ItemType::AnyAtomic | ItemType::Item)
    }

    /// Least common supertype.
    pub fn union(self, other: ItemType) -> ItemType {
        match (self, other) {
            (a, b) if a == b => a,
            (ItemType::Node(_), ItemType::Node(_)) => ItemType::Node(None),
            (a, b) if a.is_atomic() && b.is_atomic() => ItemType::AnyAtomic,
            _ => ItemType::Item,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Node(Some(k)) => f.write_str(k.test_name()),
            ItemType::Node(None) => f.write_str("node()"),
            ItemType::Boolean => f.write_str("xs:boolean"),
            ItemType::String => f.write_str("xs:string"),
            ItemType::Numeric => f.write_str("xs:numeric"),
            ItemType::AnyAtomic => f.write_str("xs:anyAtomicType"),
            ItemType::Item => f.write_str("item()"),
        }
    }
}

/// Occurrence indicator of a static sequence type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    Zero,
    ZeroOrOne,
    ExactlyOne,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn min(self) -> u8 {
        match self {
            Occurrence::ExactlyOne | Occurrence::OneOrMore => 1,
            _ => 0,
        }
    }

    /// Upper bound: 0, 1 or 2 (standing for "many").
    pub fn max(self) -> u8 {
        match self {
            Occurrence::Zero => 0,
            Occurrence::ZeroOrOne | Occurrence::ExactlyOne => 1,
            Occurrence::ZeroOrMore | Occurrence::OneOrMore => 2,
        }
    }

    fn from_bounds(min: u8, max: u8) -> Self {
        match (min.min(1), max.min(2)) {
            (_, 0) => Occurrence::Zero,
            (0, 1) => Occurrence::ZeroOrOne,
            (_, 1) => Occurrence::ExactlyOne,
            (0, _) => Occurrence::ZeroOrMore,
            _ => Occurrence::OneOrMore,
        }
    }

    pub fn zero_or_one(self) -> bool {
        self.max() <= 1
    }

    /// Occurrence of `e1/e2` given the occurrences of both operands.
    pub fn then(self, next: Occurrence) -> Occurrence {
        Self::from_bounds(
            self.min() * next.min(),
            (self.max() * next.max()).min(2),
        )
    }

    /// Occurrence of the concatenation `(e1, e2)`.
    pub fn concat(self, other: Occurrence) -> Occurrence {
        Self::from_bounds(self.min() + other.min(), self.max() + other.max())
    }

    /// Occurrence after a filter that may drop items.
    pub fn optional(self) -> Occurrence {
        Self::from_bounds(0, self.max())
    }

    pub fn from_count(count: u64) -> Occurrence {
        match count {
            0 => Occurrence::Zero,
            1 => Occurrence::ExactlyOne,
            _ => Occurrence::OneOrMore,
        }
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Occurrence::Zero => "0",
            Occurrence::ZeroOrOne => "?",
            Occurrence::ExactlyOne => "",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqType {
    pub item: ItemType,
    pub occ: Occurrence,
}

impl SeqType {
    pub const EMPTY: SeqType = SeqType {
        item: ItemType::Item,
        occ: Occurrence::Zero,
    };
    pub const BOOLEAN: SeqType = SeqType {
        item: ItemType::Boolean,
        occ: Occurrence::ExactlyOne,
    };
    pub const INTEGER: SeqType = SeqType {
        item: ItemType::Numeric,
        occ: Occurrence::ExactlyOne,
    };
    pub const STRING: SeqType = SeqType {
        item: ItemType::String,
        occ: Occurrence::ExactlyOne,
    };
    pub const ITEMS: SeqType = SeqType {
        item: ItemType::Item,
        occ: Occurrence::ZeroOrMore,
    };

    pub fn new(item: ItemType, occ: Occurrence) -> Self {
        Self { item, occ }
    }

    pub fn nodes(kind: Option<NodeKind>, occ: Occurrence) -> Self {
        Self {
            item: ItemType::Node(kind),
            occ,
        }
    }

    pub fn is_empty(self) -> bool {
        self.occ == Occurrence::Zero
    }

    pub fn is_nodes(self) -> bool {
        self.item.is_node() || self.is_empty()
    }
}

impl fmt::Display for SeqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("empty-sequence()");
        }
        write!(f, "{}{}", self.item, self.occ)
    }
}
