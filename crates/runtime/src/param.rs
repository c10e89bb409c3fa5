//! Parameter sets: the values a caller hands to a template or function.
//!
//! A [`ParameterSet`] is immutable once assembled; callees look values up
//! by compile-time [`ParamId`], never by name. Tunnel parameter sets are
//! shared down the call chain by `Rc` and copied only when a call actually
//! adds tunnel bindings.

use std::rc::Rc;

use arbor_model::{DynamicError, Location, Sequence};

use crate::context::Context;
use crate::expr::{Expression, evaluate_to_sequence};

/// Compile-time identity of a parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamId(pub u32);

/// An immutable name→value map keyed by [`ParamId`].
#[derive(Debug, Default)]
pub struct ParameterSet {
    entries: Vec<(ParamId, Sequence)>,
}

impl ParameterSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ParamId) -> Option<&Sequence> {
        // Later entries shadow earlier ones.
        self.entries
            .iter()
            .rev()
            .find(|(entry, _)| *entry == id)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A new set with `entries` appended; the original is untouched.
    pub fn extended(&self, entries: Vec<(ParamId, Sequence)>) -> ParameterSet {
        let mut all = self.entries.clone();
        all.extend(entries);
        ParameterSet { entries: all }
    }

    pub fn from_entries(entries: Vec<(ParamId, Sequence)>) -> ParameterSet {
        ParameterSet { entries }
    }
}

/// A `with-param` at a call site: the value expression for one actual
/// parameter.
#[derive(Debug)]
pub struct WithParam {
    pub id: ParamId,
    pub name: arbor_model::QName,
    pub select: Box<dyn Expression>,
    pub location: Location,
}

impl WithParam {
    pub fn new(id: ParamId, name: arbor_model::QName, select: Box<dyn Expression>) -> Self {
        WithParam {
            id,
            name,
            select,
            location: Location::UNKNOWN,
        }
    }
}

/// Evaluates a call site's actual parameters in the caller's context.
pub fn assemble(
    params: &[WithParam],
    ctx: &mut Context<'_>,
) -> Result<Rc<ParameterSet>, DynamicError> {
    if params.is_empty() {
        return Ok(Rc::new(ParameterSet::empty()));
    }
    let mut entries = Vec::with_capacity(params.len());
    for param in params {
        let value = evaluate_to_sequence(param.select.as_ref(), ctx)
            .map_err(|e| e.with_location(param.location))?;
        entries.push((param.id, value));
    }
    Ok(Rc::new(ParameterSet::from_entries(entries)))
}

/// Evaluates a call site's tunnel parameters, layered over the caller's.
/// When the call adds none, the caller's set is passed through unchanged.
pub fn assemble_tunnel(
    params: &[WithParam],
    ctx: &mut Context<'_>,
) -> Result<Rc<ParameterSet>, DynamicError> {
    if params.is_empty() {
        return Ok(ctx.tunnel_params());
    }
    let mut entries = Vec::with_capacity(params.len());
    for param in params {
        let value = evaluate_to_sequence(param.select.as_ref(), ctx)
            .map_err(|e| e.with_location(param.location))?;
        entries.push((param.id, value));
    }
    Ok(Rc::new(ctx.tunnel_params().extended(entries)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_model::Item;

    #[test]
    fn later_entries_shadow_earlier() {
        let base = ParameterSet::from_entries(vec![(ParamId(1), Sequence::one(Item::integer(1)))]);
        let layered = base.extended(vec![(ParamId(1), Sequence::one(Item::integer(2)))]);
        assert_eq!(
            layered.get(ParamId(1)).unwrap().as_item(),
            Some(&Item::integer(2))
        );
        assert_eq!(
            base.get(ParamId(1)).unwrap().as_item(),
            Some(&Item::integer(1))
        );
    }

    #[test]
    fn missing_id_is_none() {
        let set = ParameterSet::empty();
        assert!(set.get(ParamId(9)).is_none());
    }
}
