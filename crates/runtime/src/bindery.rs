//! Global variables and parameters: slots, lazy evaluation, and
//! circularity detection.
//!
//! Globals are evaluated on first demand and cached for the remainder of
//! the run. Each slot carries a tri-state flag: while a slot's initializer
//! is running the slot is marked busy, so a re-entrant demand for the same
//! slot (a circular definition) is caught immediately instead of
//! overflowing the stack.

use std::cell::RefCell;
use std::sync::Arc;

use arbor_model::{DynamicError, Location, Sequence, SequenceType, codes};

use crate::context::Context;
use crate::expr::Expression;

/// State of one global slot.
#[derive(Debug, Clone)]
enum GlobalSlot {
    Unstarted,
    Busy,
    Done(Sequence),
}

/// A compiled global variable or stylesheet parameter.
#[derive(Debug)]
pub struct GlobalVariable {
    pub slot: usize,
    pub name: arbor_model::QName,
    pub select: Box<dyn Expression>,
    pub required_type: Option<SequenceType>,
    pub is_param: bool,
    pub required: bool,
    pub location: Location,
}

impl GlobalVariable {
    pub fn variable(
        slot: usize,
        name: arbor_model::QName,
        select: Box<dyn Expression>,
    ) -> Self {
        GlobalVariable {
            slot,
            name,
            select,
            required_type: None,
            is_param: false,
            required: false,
            location: Location::UNKNOWN,
        }
    }

    /// A stylesheet parameter: externally suppliable, with `select` as its
    /// default initializer.
    pub fn parameter(
        slot: usize,
        name: arbor_model::QName,
        select: Box<dyn Expression>,
    ) -> Self {
        GlobalVariable {
            is_param: true,
            ..Self::variable(slot, name, select)
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_required_type(mut self, required_type: SequenceType) -> Self {
        self.required_type = Some(required_type);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

/// The run-scoped store of global slot values.
///
/// Interior mutability via `RefCell` keeps the bindery usable behind the
/// shared `&Controller` reference every context carries; the `RefCell`
/// also makes the type `!Sync`, which matches the one-bindery-per-run
/// threading rule.
#[derive(Debug)]
pub struct Bindery {
    slots: RefCell<Vec<GlobalSlot>>,
}

impl Bindery {
    pub fn new(size: usize) -> Self {
        Bindery {
            slots: RefCell::new(vec![GlobalSlot::Unstarted; size]),
        }
    }

    /// The cached value of a slot, if its initializer has completed.
    pub fn get(&self, slot: usize) -> Option<Sequence> {
        match &self.slots.borrow()[slot] {
            GlobalSlot::Done(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Stores a value directly, e.g. from an assignment instruction.
    pub fn assign(&self, slot: usize, value: Sequence) {
        self.slots.borrow_mut()[slot] = GlobalSlot::Done(value);
    }

    /// Returns the slot's value, evaluating the initializer on first
    /// demand. Detects circular definitions via the busy flag.
    pub fn evaluate(
        &self,
        binding: &Arc<GlobalVariable>,
        ctx: &Context<'_>,
    ) -> Result<Sequence, DynamicError> {
        {
            let slots = self.slots.borrow();
            match &slots[binding.slot] {
                GlobalSlot::Done(value) => return Ok(value.clone()),
                GlobalSlot::Busy => {
                    return Err(DynamicError::circularity(format!(
                        "circular definition of global variable ${}",
                        binding.name
                    ))
                    .with_location(binding.location));
                }
                GlobalSlot::Unstarted => {}
            }
        }

        let controller = ctx.controller();

        if binding.is_param {
            if let Some(supplied) = controller.supplied_parameter(&binding.name) {
                let mut value = supplied.clone();
                if let Some(required) = &binding.required_type {
                    value = controller
                        .checker()
                        .check(value, required, &format!("parameter ${}", binding.name))
                        .map_err(|e| e.with_location(binding.location))?;
                }
                self.slots.borrow_mut()[binding.slot] = GlobalSlot::Done(value.clone());
                return Ok(value);
            }
            if binding.required {
                return Err(DynamicError::fatal(
                    codes::REQUIRED_GLOBAL_PARAM,
                    format!("required parameter ${} was not supplied", binding.name),
                )
                .with_location(binding.location));
            }
        }

        self.slots.borrow_mut()[binding.slot] = GlobalSlot::Busy;
        let result = self.run_initializer(binding, ctx);
        match result {
            Ok(value) => {
                self.slots.borrow_mut()[binding.slot] = GlobalSlot::Done(value.clone());
                Ok(value)
            }
            Err(err) => {
                // Reset so a later attempt re-evaluates instead of seeing a
                // stale busy flag.
                self.slots.borrow_mut()[binding.slot] = GlobalSlot::Unstarted;
                Err(err.with_location(binding.location))
            }
        }
    }

    fn run_initializer(
        &self,
        binding: &Arc<GlobalVariable>,
        ctx: &Context<'_>,
    ) -> Result<Sequence, DynamicError> {
        let controller = ctx.controller();
        // Initializers see the principal document, not the demanding
        // expression's focus or frame.
        let mut clean = controller.clean_context(ctx.receiver());
        let mut iter = binding.select.iterate(&mut clean)?;
        let mut value = Sequence::empty();
        while let Some(item) = iter.next()? {
            value.push(item);
        }
        if let Some(required) = &binding.required_type {
            value = controller.checker().check(
                value,
                required,
                &format!("variable ${}", binding.name),
            )?;
        }
        Ok(value)
    }
}

/// An instruction that stores an already-computed value into a global
/// slot, used by drivers that pre-bind globals before the run proper.
#[derive(Debug)]
pub struct Assign {
    pub slot: usize,
    pub select: Box<dyn Expression>,
    pub location: Location,
}

impl Expression for Assign {
    fn location(&self) -> Location {
        self.location
    }

    fn is_vacuous(&self) -> bool {
        true
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let mut iter = self.select.iterate(ctx)?;
        let mut value = Sequence::empty();
        while let Some(item) = iter.next()? {
            value.push(item);
        }
        ctx.controller().bindery().assign(self.slot, value);
        Ok(())
    }
}
