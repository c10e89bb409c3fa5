//! The expression/instruction protocol: one polymorphic tree, three
//! evaluation strategies.
//!
//! Every node of a compiled tree implements [`Expression`]. A caller picks
//! the strategy that fits its need: [`Expression::evaluate_item`] for a
//! single value, [`Expression::iterate`] for a pull stream,
//! [`Expression::process`] for push output. The default adapters bridge
//! whichever strategy the node implements natively to the other two. Implementations must override at least one of `iterate` or
//! `process`; the defaults are defined in terms of each other.
//!
//! [`Expression::process_leaving_tail`] is the tail-call hook: instead of
//! growing the native stack, an instruction in tail position hands back a
//! [`PendingCall`] for the trampoline in [`crate::template`] to run.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use arbor_model::{
    DynamicError, Item, ListIterator, Location, Sequence, SequenceCollector, SequenceIterator,
    SingletonIterator, codes,
};

use crate::context::Context;
use crate::template::PendingCall;

pub trait Expression: fmt::Debug + Send + Sync {
    /// Source position of this construct, for error decoration.
    fn location(&self) -> Location {
        Location::UNKNOWN
    }

    /// Whether `process_leaving_tail` can ever return a pending call.
    /// Callers that cannot host a trampoline check this to decide between
    /// `process` and the tail-aware entry point.
    fn can_return_tail_call(&self) -> bool {
        false
    }

    /// Whether this instruction never contributes output. Vacuous
    /// instructions may still have effects (slot writes, diagnostics,
    /// termination).
    fn is_vacuous(&self) -> bool {
        false
    }

    /// Whether evaluating this instruction is a no-op: no output and no
    /// effects. Only inert bodies may be skipped entirely.
    fn is_inert(&self) -> bool {
        false
    }

    /// Evaluates to a single item, or `None` for the empty sequence.
    fn evaluate_item(&self, ctx: &mut Context<'_>) -> Result<Option<Item>, DynamicError> {
        let mut iter = self.iterate(ctx)?;
        iter.next()
    }

    /// Evaluates to a pull stream of items.
    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        // Push into a collector, then replay. Native iterators avoid the
        // buffering; this adapter keeps push-only instructions usable in
        // value position.
        let collector = Rc::new(RefCell::new(SequenceCollector::new(
            ctx.controller().pool(),
        )));
        let sink = Rc::clone(&collector);
        ctx.with_receiver(sink, |ctx| self.process(ctx))?;
        let seq = collector.borrow_mut().take();
        Ok(Box::new(ListIterator::from(seq)))
    }

    /// Evaluates in push mode, sending output events to the context's
    /// receiver.
    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let location = self.location();
        let mut iter = self.iterate(ctx).map_err(|e| e.with_location(location))?;
        while let Some(item) = iter.next().map_err(|e| e.with_location(location))? {
            ctx.emit(|r| r.append_item(&item, location))
                .map_err(|e| e.with_location(location))?;
        }
        Ok(())
    }

    /// Push evaluation that may leave its final call for the caller's
    /// trampoline instead of making it. The default runs `process` and
    /// leaves nothing.
    fn process_leaving_tail<'c>(
        &self,
        ctx: &mut Context<'c>,
    ) -> Result<Option<PendingCall<'c>>, DynamicError> {
        self.process(ctx)?;
        Ok(None)
    }

    /// The XPath effective boolean value of this expression.
    fn effective_boolean(&self, ctx: &mut Context<'_>) -> Result<bool, DynamicError> {
        let mut iter = self.iterate(ctx)?;
        let first = match iter.next()? {
            None => return Ok(false),
            Some(item) => item,
        };
        if first.as_node().is_some() {
            return Ok(true);
        }
        if iter.next()?.is_some() {
            return Err(DynamicError::fatal(
                codes::NO_BOOLEAN_VALUE,
                "effective boolean value is undefined for a sequence of multiple atomic values",
            )
            .with_location(self.location()));
        }
        Sequence::one(first).effective_boolean()
    }
}

/// Drains `expr` into a materialized sequence.
pub fn evaluate_to_sequence(
    expr: &dyn Expression,
    ctx: &mut Context<'_>,
) -> Result<Sequence, DynamicError> {
    let mut iter = expr.iterate(ctx)?;
    let mut seq = Sequence::empty();
    while let Some(item) = iter.next()? {
        seq.push(item);
    }
    Ok(seq)
}

/// A compile-time constant sequence.
#[derive(Debug)]
pub struct Literal {
    pub value: Sequence,
    pub location: Location,
}

impl Literal {
    pub fn new(value: Sequence) -> Self {
        Literal {
            value,
            location: Location::UNKNOWN,
        }
    }

    pub fn item(item: Item) -> Self {
        Literal::new(Sequence::one(item))
    }

    pub fn empty() -> Self {
        Literal::new(Sequence::empty())
    }
}

impl Expression for Literal {
    fn location(&self) -> Location {
        self.location
    }

    fn is_vacuous(&self) -> bool {
        self.value.is_empty()
    }

    fn is_inert(&self) -> bool {
        self.value.is_empty()
    }

    fn evaluate_item(&self, _ctx: &mut Context<'_>) -> Result<Option<Item>, DynamicError> {
        Ok(self.value.items().first().cloned())
    }

    fn iterate<'a>(
        &'a self,
        _ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        Ok(Box::new(ListIterator::from(self.value.clone())))
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        for item in self.value.items() {
            ctx.emit(|r| r.append_item(item, self.location))?;
        }
        Ok(())
    }
}

/// The context item, `.`.
#[derive(Debug)]
pub struct ContextItemExpr {
    pub location: Location,
}

impl ContextItemExpr {
    pub fn new() -> Self {
        ContextItemExpr {
            location: Location::UNKNOWN,
        }
    }
}

impl Default for ContextItemExpr {
    fn default() -> Self {
        Self::new()
    }
}

impl Expression for ContextItemExpr {
    fn location(&self) -> Location {
        self.location
    }

    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        match ctx.item() {
            Some(item) => Ok(Box::new(SingletonIterator::new(item.clone()))),
            None => Err(DynamicError::fatal(
                codes::ABSENT_CONTEXT_ITEM,
                "the context item is absent",
            )
            .with_location(self.location)),
        }
    }
}

/// A reference to a local variable slot in the current frame.
#[derive(Debug)]
pub struct LocalVariableReference {
    pub name: arbor_model::QName,
    pub slot: usize,
    pub location: Location,
}

impl LocalVariableReference {
    pub fn new(name: arbor_model::QName, slot: usize) -> Self {
        LocalVariableReference {
            name,
            slot,
            location: Location::UNKNOWN,
        }
    }
}

impl Expression for LocalVariableReference {
    fn location(&self) -> Location {
        self.location
    }

    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        let value = ctx.frame().get(self.slot).clone();
        Ok(Box::new(ListIterator::from(value)))
    }
}

/// A reference to a global variable, demanding its value from the bindery.
#[derive(Debug)]
pub struct GlobalVariableReference {
    pub name: arbor_model::QName,
    pub slot: usize,
    pub location: Location,
}

impl GlobalVariableReference {
    pub fn new(name: arbor_model::QName, slot: usize) -> Self {
        GlobalVariableReference {
            name,
            slot,
            location: Location::UNKNOWN,
        }
    }
}

impl Expression for GlobalVariableReference {
    fn location(&self) -> Location {
        self.location
    }

    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        let controller = ctx.controller();
        let binding = controller.executable().global(self.slot)?;
        let value = controller
            .bindery()
            .evaluate(&binding, ctx)
            .map_err(|e| e.with_location(self.location))?;
        Ok(Box::new(ListIterator::from(value)))
    }
}
