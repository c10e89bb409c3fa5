//! Items, atomic values, and sequences.

use std::fmt;

use crate::error::{DynamicError, codes};
use crate::node::NodeRef;

/// An atomic value in the data model.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Double(f64),
    /// Untyped atomic data, e.g. extracted from unvalidated nodes. Coerces
    /// more freely than a typed value at required-type boundaries.
    Untyped(String),
}

impl AtomicValue {
    pub fn string_value(&self) -> String {
        match self {
            AtomicValue::String(s) | AtomicValue::Untyped(s) => s.clone(),
            AtomicValue::Boolean(b) => b.to_string(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Double(d) => {
                if is_integral_i64(*d) {
                    format!("{}", *d as i64)
                } else {
                    d.to_string()
                }
            }
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AtomicValue::Integer(i) => Some(*i),
            AtomicValue::Double(d) if is_integral_i64(*d) => Some(*d as i64),
            AtomicValue::Double(_) => None,
            AtomicValue::String(s) | AtomicValue::Untyped(s) => s.trim().parse().ok(),
            AtomicValue::Boolean(_) => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            AtomicValue::Integer(i) => Some(*i as f64),
            AtomicValue::Double(d) => Some(*d),
            AtomicValue::String(s) | AtomicValue::Untyped(s) => s.trim().parse().ok(),
            AtomicValue::Boolean(_) => None,
        }
    }

    fn boolean_value(&self) -> bool {
        match self {
            AtomicValue::Boolean(b) => *b,
            AtomicValue::String(s) | AtomicValue::Untyped(s) => !s.is_empty(),
            AtomicValue::Integer(i) => *i != 0,
            AtomicValue::Double(d) => *d != 0.0 && !d.is_nan(),
        }
    }
}

/// Whether `d` is a whole number that `as i64` converts without
/// saturating. The upper bound is exclusive: `i64::MAX as f64` rounds up
/// to 2^63, which is already out of range.
fn is_integral_i64(d: f64) -> bool {
    d.fract() == 0.0 && d >= i64::MIN as f64 && d < i64::MAX as f64
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.string_value())
    }
}

/// One item of a sequence: a node or an atomic value.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Node(NodeRef),
    Atomic(AtomicValue),
}

impl Item {
    pub fn string(s: impl Into<String>) -> Item {
        Item::Atomic(AtomicValue::String(s.into()))
    }

    pub fn integer(i: i64) -> Item {
        Item::Atomic(AtomicValue::Integer(i))
    }

    pub fn boolean(b: bool) -> Item {
        Item::Atomic(AtomicValue::Boolean(b))
    }

    pub fn string_value(&self) -> String {
        match self {
            Item::Node(n) => n.string_value(),
            Item::Atomic(a) => a.string_value(),
        }
    }

    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Item::Node(n) => Some(n),
            Item::Atomic(_) => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            Item::Node(_) => None,
        }
    }
}

/// An ordered, eagerly materialized sequence of items.
///
/// Deferred evaluation in the engine goes through [`SequenceIterator`]; a
/// `Sequence` is the resting form once a value has been computed (a cached
/// global, a bound parameter, a stack slot).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence {
    items: Vec<Item>,
}

impl Sequence {
    pub fn empty() -> Sequence {
        Sequence { items: Vec::new() }
    }

    pub fn one(item: Item) -> Sequence {
        Sequence { items: vec![item] }
    }

    pub fn from_items(items: Vec<Item>) -> Sequence {
        Sequence { items }
    }

    /// Drains a [`SequenceIterator`] to completion.
    pub fn from_iterator(
        mut iter: Box<dyn SequenceIterator>,
    ) -> Result<Sequence, DynamicError> {
        let mut items = Vec::new();
        while let Some(item) = iter.next()? {
            items.push(item);
        }
        Ok(Sequence { items })
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    /// The single item of a singleton sequence.
    pub fn as_item(&self) -> Option<&Item> {
        if self.items.len() == 1 {
            self.items.first()
        } else {
            None
        }
    }

    /// String values of all items joined with `separator`.
    pub fn string_join(&self, separator: &str) -> String {
        self.items
            .iter()
            .map(Item::string_value)
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// The XPath effective boolean value.
    pub fn effective_boolean(&self) -> Result<bool, DynamicError> {
        match self.items.as_slice() {
            [] => Ok(false),
            [Item::Node(_), ..] => Ok(true),
            [Item::Atomic(a)] => Ok(a.boolean_value()),
            _ => Err(DynamicError::fatal(
                codes::NO_BOOLEAN_VALUE,
                "effective boolean value is undefined for a sequence of multiple atomic values",
            )),
        }
    }
}

impl From<Item> for Sequence {
    fn from(item: Item) -> Self {
        Sequence::one(item)
    }
}

/// Pull protocol for lazily produced sequences.
pub trait SequenceIterator {
    fn next(&mut self) -> Result<Option<Item>, DynamicError>;
}

/// Iterator over nothing.
pub struct EmptyIterator;

impl SequenceIterator for EmptyIterator {
    fn next(&mut self) -> Result<Option<Item>, DynamicError> {
        Ok(None)
    }
}

/// Iterator over exactly one item.
pub struct SingletonIterator {
    item: Option<Item>,
}

impl SingletonIterator {
    pub fn new(item: Item) -> Self {
        SingletonIterator { item: Some(item) }
    }
}

impl SequenceIterator for SingletonIterator {
    fn next(&mut self) -> Result<Option<Item>, DynamicError> {
        Ok(self.item.take())
    }
}

/// Iterator over a buffered list of items.
pub struct ListIterator {
    items: std::vec::IntoIter<Item>,
}

impl ListIterator {
    pub fn new(items: Vec<Item>) -> Self {
        ListIterator {
            items: items.into_iter(),
        }
    }
}

impl From<Sequence> for ListIterator {
    fn from(seq: Sequence) -> Self {
        ListIterator::new(seq.into_items())
    }
}

impl SequenceIterator for ListIterator {
    fn next(&mut self) -> Result<Option<Item>, DynamicError> {
        Ok(self.items.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_boolean_rules() {
        assert!(!Sequence::empty().effective_boolean().unwrap());
        assert!(Sequence::one(Item::boolean(true)).effective_boolean().unwrap());
        assert!(!Sequence::one(Item::string("")).effective_boolean().unwrap());
        assert!(Sequence::one(Item::integer(7)).effective_boolean().unwrap());
        let many = Sequence::from_items(vec![Item::integer(1), Item::integer(2)]);
        assert!(many.effective_boolean().is_err());
    }

    #[test]
    fn atomic_coercions() {
        assert_eq!(AtomicValue::Untyped(" 42 ".into()).as_integer(), Some(42));
        assert_eq!(AtomicValue::Double(3.0).as_integer(), Some(3));
        assert_eq!(AtomicValue::Double(3.5).as_integer(), None);
        assert_eq!(AtomicValue::Integer(2).as_double(), Some(2.0));
        assert_eq!(AtomicValue::Double(3.0).string_value(), "3");
    }

    #[test]
    fn doubles_beyond_i64_never_saturate() {
        assert_eq!(
            AtomicValue::Double(1e19).string_value(),
            "10000000000000000000"
        );
        assert_eq!(AtomicValue::Double(1e19).as_integer(), None);
        assert_eq!(AtomicValue::Double(-1e19).as_integer(), None);
        assert_eq!(AtomicValue::Double(f64::INFINITY).as_integer(), None);
        assert_eq!(AtomicValue::Double(i64::MIN as f64).as_integer(), Some(i64::MIN));
    }

    #[test]
    fn iterator_drain() {
        let seq = Sequence::from_items(vec![Item::string("a"), Item::string("b")]);
        let collected =
            Sequence::from_iterator(Box::new(ListIterator::from(seq.clone()))).unwrap();
        assert_eq!(collected, seq);
    }
}
