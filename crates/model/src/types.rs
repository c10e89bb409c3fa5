//! Sequence types and the required-type checker seam.
//!
//! The full static type system lives outside this core; what remains here
//! is the run-time boundary check applied to global-parameter and
//! local-parameter values: atomic values are coerced toward the declared
//! type, non-atomic values must already conform, and cardinality is
//! enforced.

use std::fmt;

use crate::error::{DynamicError, codes};
use crate::item::{AtomicValue, Item, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Cardinality {
    pub fn allows_empty(&self) -> bool {
        matches!(self, Cardinality::ZeroOrOne | Cardinality::ZeroOrMore)
    }

    pub fn allows_many(&self) -> bool {
        matches!(self, Cardinality::ZeroOrMore | Cardinality::OneOrMore)
    }

    fn indicator(&self) -> &'static str {
        match self {
            Cardinality::ExactlyOne => "",
            Cardinality::ZeroOrOne => "?",
            Cardinality::ZeroOrMore => "*",
            Cardinality::OneOrMore => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    AnyItem,
    AnyNode,
    AnyAtomic,
    String,
    Boolean,
    Integer,
    Double,
}

impl ItemType {
    fn name(&self) -> &'static str {
        match self {
            ItemType::AnyItem => "item()",
            ItemType::AnyNode => "node()",
            ItemType::AnyAtomic => "xs:anyAtomicType",
            ItemType::String => "xs:string",
            ItemType::Boolean => "xs:boolean",
            ItemType::Integer => "xs:integer",
            ItemType::Double => "xs:double",
        }
    }

    fn matches(&self, item: &Item) -> bool {
        match (self, item) {
            (ItemType::AnyItem, _) => true,
            (ItemType::AnyNode, Item::Node(_)) => true,
            (ItemType::AnyAtomic, Item::Atomic(_)) => true,
            (ItemType::String, Item::Atomic(AtomicValue::String(_))) => true,
            (ItemType::Boolean, Item::Atomic(AtomicValue::Boolean(_))) => true,
            (ItemType::Integer, Item::Atomic(AtomicValue::Integer(_))) => true,
            (ItemType::Double, Item::Atomic(AtomicValue::Double(_))) => true,
            _ => false,
        }
    }
}

/// A declared required type: item type plus occurrence indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceType {
    pub item_type: ItemType,
    pub cardinality: Cardinality,
}

impl SequenceType {
    pub const ANY: SequenceType = SequenceType {
        item_type: ItemType::AnyItem,
        cardinality: Cardinality::ZeroOrMore,
    };

    pub fn new(item_type: ItemType, cardinality: Cardinality) -> Self {
        SequenceType {
            item_type,
            cardinality,
        }
    }

    pub fn single(item_type: ItemType) -> Self {
        SequenceType::new(item_type, Cardinality::ExactlyOne)
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.item_type.name(), self.cardinality.indicator())
    }
}

/// The external required-type checker/converter.
///
/// `role` names the value being checked (for diagnostics), e.g.
/// `"parameter $depth"`.
pub trait TypeChecker: Send + Sync + fmt::Debug {
    fn check(
        &self,
        value: Sequence,
        required: &SequenceType,
        role: &str,
    ) -> Result<Sequence, DynamicError>;
}

/// Default checker: coerces atomic values (untyped data casts freely,
/// integers promote to doubles, anything has a string value), requires
/// nodes to already conform, and enforces cardinality.
#[derive(Debug, Default)]
pub struct BasicTypeChecker;

impl BasicTypeChecker {
    fn coerce(item: &Item, target: ItemType, role: &str) -> Result<Item, DynamicError> {
        if target.matches(item) {
            return Ok(item.clone());
        }
        let atomic = item.as_atomic().ok_or_else(|| mismatch(item, target, role))?;
        let coerced = match target {
            ItemType::String => Some(AtomicValue::String(atomic.string_value())),
            ItemType::Integer => atomic.as_integer().map(AtomicValue::Integer),
            ItemType::Double => atomic.as_double().map(AtomicValue::Double),
            ItemType::Boolean => match atomic.string_value().as_str() {
                "true" | "1" => Some(AtomicValue::Boolean(true)),
                "false" | "0" => Some(AtomicValue::Boolean(false)),
                _ => None,
            },
            ItemType::AnyAtomic => Some(atomic.clone()),
            ItemType::AnyItem | ItemType::AnyNode => None,
        };
        coerced
            .map(Item::Atomic)
            .ok_or_else(|| mismatch(item, target, role))
    }
}

fn mismatch(item: &Item, target: ItemType, role: &str) -> DynamicError {
    DynamicError::fatal(
        codes::PARAM_TYPE_MISMATCH,
        format!(
            "{}: value '{}' cannot be converted to {}",
            role,
            item.string_value(),
            target.name()
        ),
    )
}

impl TypeChecker for BasicTypeChecker {
    fn check(
        &self,
        value: Sequence,
        required: &SequenceType,
        role: &str,
    ) -> Result<Sequence, DynamicError> {
        if value.is_empty() && !required.cardinality.allows_empty() {
            return Err(DynamicError::fatal(
                codes::PARAM_TYPE_MISMATCH,
                format!("{}: empty sequence where {} is required", role, required),
            ));
        }
        if value.len() > 1 && !required.cardinality.allows_many() {
            return Err(DynamicError::fatal(
                codes::PARAM_TYPE_MISMATCH,
                format!(
                    "{}: sequence of {} items where {} is required",
                    role,
                    value.len(),
                    required
                ),
            ));
        }
        let items = value
            .into_items()
            .iter()
            .map(|item| Self::coerce(item, required.item_type, role))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Sequence::from_items(items))
    }
}
