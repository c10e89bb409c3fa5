//! A transparent tracing wrapper around any instruction.
//!
//! `Trace` logs entry on each evaluation strategy and otherwise delegates
//! unchanged, including the tail-call hook, so wrapping an instruction
//! never alters its semantics.

use arbor_model::{DynamicError, Item, Location, SequenceIterator};

use crate::context::Context;
use crate::expr::Expression;
use crate::template::PendingCall;

#[derive(Debug)]
pub struct Trace {
    pub label: String,
    pub child: Box<dyn Expression>,
}

impl Trace {
    pub fn new(label: impl Into<String>, child: Box<dyn Expression>) -> Self {
        Trace {
            label: label.into(),
            child,
        }
    }
}

impl Expression for Trace {
    fn location(&self) -> Location {
        self.child.location()
    }

    fn can_return_tail_call(&self) -> bool {
        self.child.can_return_tail_call()
    }

    fn is_vacuous(&self) -> bool {
        self.child.is_vacuous()
    }

    fn is_inert(&self) -> bool {
        self.child.is_inert()
    }

    fn evaluate_item(&self, ctx: &mut Context<'_>) -> Result<Option<Item>, DynamicError> {
        log::debug!("evaluate {}", self.label);
        self.child.evaluate_item(ctx)
    }

    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        log::debug!("iterate {}", self.label);
        self.child.iterate(ctx)
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        log::debug!("process {}", self.label);
        self.child.process(ctx)
    }

    fn process_leaving_tail<'c>(
        &self,
        ctx: &mut Context<'c>,
    ) -> Result<Option<PendingCall<'c>>, DynamicError> {
        log::debug!("process {}", self.label);
        self.child.process_leaving_tail(ctx)
    }
}
