//! User-defined functions: value-returning procedures with optional
//! memoization.
//!
//! A function call is a value computation, so its body runs against a
//! buffering receiver and the buffered sequence is the result. Tail calls
//! inside the body still trampoline: the buffering receiver stays in
//! place across trampoline hops, so a self-recursive function runs in
//! constant native stack too.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use arbor_model::{
    AtomicValue, DynamicError, ListIterator, Location, Sequence, SequenceCollector,
    SequenceIterator,
};

use crate::context::Context;
use crate::executable::FunctionId;
use crate::expr::{Expression, evaluate_to_sequence};
use crate::template::{PendingCall, Procedure, drive};

#[derive(Debug)]
pub struct UserFunction {
    name: arbor_model::QName,
    body: Box<dyn Expression>,
    arity: usize,
    frame_size: usize,
    memoize: bool,
    returns_tail_calls: bool,
    empty: bool,
    location: Location,
}

impl UserFunction {
    pub fn new(
        name: arbor_model::QName,
        body: Box<dyn Expression>,
        arity: usize,
        frame_size: usize,
    ) -> Self {
        debug_assert!(frame_size >= arity, "arguments occupy the first slots");
        let returns_tail_calls = body.can_return_tail_call();
        let empty = body.is_inert();
        UserFunction {
            name,
            body,
            arity,
            frame_size,
            memoize: false,
            returns_tail_calls,
            empty,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn name(&self) -> &arbor_model::QName {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Calls the function with already-evaluated arguments.
    pub fn call(
        self: &Arc<Self>,
        ctx: &mut Context<'_>,
        id: FunctionId,
        args: Vec<Sequence>,
    ) -> Result<Sequence, DynamicError> {
        debug_assert_eq!(args.len(), self.arity);
        let key = if self.memoize { memo_key(&args) } else { None };
        if let Some(key) = &key {
            if let Some(cached) = ctx.controller().memo_get(id, key) {
                return Ok(cached);
            }
        }
        if self.empty {
            return Ok(Sequence::empty());
        }

        let collector = Rc::new(RefCell::new(SequenceCollector::new(
            ctx.controller().pool(),
        )));
        let mut callee = ctx.new_major(self.frame_size);
        callee.set_receiver(Rc::clone(&collector) as crate::context::SharedReceiver);
        for (slot, arg) in args.into_iter().enumerate() {
            callee.frame_mut().set(slot, arg);
        }
        let first = PendingCall::new(Arc::clone(self) as Arc<dyn Procedure>, callee);
        drive(Some(first)).map_err(|e| e.with_location(self.location))?;

        let result = collector.borrow_mut().take();
        if let Some(key) = key {
            ctx.controller().memo_store(id, key, result.clone());
        }
        Ok(result)
    }
}

impl Procedure for UserFunction {
    fn body(&self) -> &dyn Expression {
        self.body.as_ref()
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn returns_tail_calls(&self) -> bool {
        self.returns_tail_calls
    }

    fn is_empty(&self) -> bool {
        self.empty
    }

    fn location(&self) -> Location {
        self.location
    }
}

/// Cache key for a memoized call: a type tag plus the lexical form of
/// every argument item, so `f(1)` and `f("1")` key differently.
/// Node-bearing arguments have identity the lexical form cannot capture,
/// so such calls are never cached.
fn memo_key(args: &[Sequence]) -> Option<String> {
    let mut key = String::new();
    for arg in args {
        for item in arg.items() {
            let tag = match item.as_atomic() {
                None => return None,
                Some(AtomicValue::String(_)) => 's',
                Some(AtomicValue::Boolean(_)) => 'b',
                Some(AtomicValue::Integer(_)) => 'i',
                Some(AtomicValue::Double(_)) => 'd',
                Some(AtomicValue::Untyped(_)) => 'u',
            };
            key.push(tag);
            key.push_str(&item.string_value());
            key.push('\u{1}');
        }
        key.push('\u{2}');
    }
    Some(key)
}

/// A call site for a user function.
#[derive(Debug)]
pub struct UserFunctionCall {
    pub function: FunctionId,
    pub args: Vec<Box<dyn Expression>>,
    /// True when this call is in tail position within a function body.
    pub tail: bool,
    pub location: Location,
}

impl UserFunctionCall {
    pub fn new(function: FunctionId, args: Vec<Box<dyn Expression>>) -> Self {
        UserFunctionCall {
            function,
            args,
            tail: false,
            location: Location::UNKNOWN,
        }
    }

    pub fn as_tail_call(mut self) -> Self {
        self.tail = true;
        self
    }

    fn evaluate_args(&self, ctx: &mut Context<'_>) -> Result<Vec<Sequence>, DynamicError> {
        self.args
            .iter()
            .map(|arg| {
                evaluate_to_sequence(arg.as_ref(), ctx).map_err(|e| e.with_location(self.location))
            })
            .collect()
    }
}

impl Expression for UserFunctionCall {
    fn location(&self) -> Location {
        self.location
    }

    fn can_return_tail_call(&self) -> bool {
        self.tail
    }

    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        let args = self.evaluate_args(ctx)?;
        let function = ctx.controller().executable().function(self.function)?;
        let result = function
            .call(ctx, self.function, args)
            .map_err(|e| e.with_location(self.location))?;
        Ok(Box::new(ListIterator::from(result)))
    }

    fn process_leaving_tail<'c>(
        &self,
        ctx: &mut Context<'c>,
    ) -> Result<Option<PendingCall<'c>>, DynamicError> {
        if !self.tail {
            self.process(ctx)?;
            return Ok(None);
        }
        let args = self.evaluate_args(ctx)?;
        let function = ctx.controller().executable().function(self.function)?;
        // Memoized calls must run eagerly so their result reaches the cache.
        if function.memoize() {
            let result = function
                .call(ctx, self.function, args)
                .map_err(|e| e.with_location(self.location))?;
            for item in result.items() {
                ctx.emit(|r| r.append_item(item, self.location))?;
            }
            return Ok(None);
        }
        if function.is_empty() {
            return Ok(None);
        }
        let mut callee = ctx.new_major(function.frame_size());
        for (slot, arg) in args.into_iter().enumerate() {
            callee.frame_mut().set(slot, arg);
        }
        Ok(Some(PendingCall::new(function as Arc<dyn Procedure>, callee)))
    }
}

impl UserFunction {
    pub(crate) fn memoize(&self) -> bool {
        self.memoize
    }
}
