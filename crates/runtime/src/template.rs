//! Templates, procedures, and the tail-call trampoline.
//!
//! A [`Template`] is a compiled template rule or named template. Both
//! templates and user functions implement [`Procedure`], the callable
//! surface the trampoline drives: a callee in tail position returns a
//! [`PendingCall`] instead of recursing, and [`drive`] loops until a call
//! completes without leaving another. Deep tail recursion therefore runs
//! in constant native stack.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use arbor_model::{DynamicError, Item, Location};

use crate::context::Context;
use crate::expr::Expression;
use crate::param::ParameterSet;

/// A callable compiled body: a template or a user function.
pub trait Procedure: Send + Sync + fmt::Debug {
    fn body(&self) -> &dyn Expression;

    /// Stack frame size the body needs.
    fn frame_size(&self) -> usize;

    /// Whether the body can leave a tail call for the caller's trampoline.
    fn returns_tail_calls(&self) -> bool;

    /// Whether the body is known to produce nothing.
    fn is_empty(&self) -> bool;

    fn location(&self) -> Location {
        Location::UNKNOWN
    }
}

/// A compiled template rule or named template.
#[derive(Debug)]
pub struct Template {
    body: Box<dyn Expression>,
    frame_size: usize,
    name: Option<arbor_model::QName>,
    mode: Option<String>,
    precedence: u32,
    min_import_precedence: u32,
    priority: f64,
    returns_tail_calls: bool,
    empty: bool,
    location: Location,
}

impl Template {
    pub fn new(body: Box<dyn Expression>, frame_size: usize) -> Self {
        let returns_tail_calls = body.can_return_tail_call();
        // Vacuous is not enough: a body of only slot writes or diagnostics
        // still has to run.
        let empty = body.is_inert();
        Template {
            body,
            frame_size,
            name: None,
            mode: None,
            precedence: 0,
            min_import_precedence: 0,
            priority: 0.0,
            returns_tail_calls,
            empty,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_name(mut self, name: arbor_model::QName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Import precedence of the rule, and the lowest precedence of the
    /// stylesheet module it was declared in. The latter bounds the window
    /// `apply-imports` searches.
    pub fn with_precedence(mut self, precedence: u32, min_import_precedence: u32) -> Self {
        self.precedence = precedence;
        self.min_import_precedence = min_import_precedence;
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn name(&self) -> Option<&arbor_model::QName> {
        self.name.as_ref()
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    pub fn precedence(&self) -> u32 {
        self.precedence
    }

    pub fn min_import_precedence(&self) -> u32 {
        self.min_import_precedence
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Invokes the template as a template rule: the context item becomes
    /// `item`, the current template and mode are updated, and the body's
    /// tail call (if any) is handed back for the caller's trampoline.
    pub fn apply<'c>(
        self: &Arc<Self>,
        ctx: &Context<'c>,
        item: Item,
        position: usize,
        size: usize,
        local_params: Rc<ParameterSet>,
        tunnel_params: Rc<ParameterSet>,
    ) -> Result<Option<PendingCall<'c>>, DynamicError> {
        if self.empty {
            return Ok(None);
        }
        let mut callee = ctx.new_major(self.frame_size);
        callee.set_item(item, position, size);
        callee.set_current_template(Arc::clone(self));
        callee.set_mode(self.mode.clone());
        callee.set_param_sets(local_params, tunnel_params);
        Ok(Some(PendingCall::new(
            Arc::clone(self) as Arc<dyn Procedure>,
            callee,
        )))
    }

    /// Invokes the template as a named template: the focus and current
    /// template rule are left as the caller's.
    pub fn expand<'c>(
        self: &Arc<Self>,
        ctx: &Context<'c>,
        local_params: Rc<ParameterSet>,
        tunnel_params: Rc<ParameterSet>,
    ) -> Result<Option<PendingCall<'c>>, DynamicError> {
        if self.empty {
            return Ok(None);
        }
        let mut callee = ctx.new_major(self.frame_size);
        callee.set_param_sets(local_params, tunnel_params);
        Ok(Some(PendingCall::new(
            Arc::clone(self) as Arc<dyn Procedure>,
            callee,
        )))
    }
}

impl Procedure for Template {
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

/// A call the callee chose not to make itself. Owns the callee's context,
/// keeping its frame and parameter sets alive until the trampoline runs it.
pub struct PendingCall<'c> {
    target: Arc<dyn Procedure>,
    context: Context<'c>,
}

impl<'c> PendingCall<'c> {
    pub fn new(target: Arc<dyn Procedure>, context: Context<'c>) -> Self {
        PendingCall { target, context }
    }

    /// Runs the call body once. Returns the next pending call if the body
    /// ended in tail position.
    pub fn process(mut self) -> Result<Option<PendingCall<'c>>, DynamicError> {
        let location = self.target.location();
        if self.target.returns_tail_calls() {
            self.target
                .body()
                .process_leaving_tail(&mut self.context)
                .map_err(|e| e.with_location(location))
        } else {
            self.target
                .body()
                .process(&mut self.context)
                .map_err(|e| e.with_location(location))?;
            Ok(None)
        }
    }
}

impl fmt::Debug for PendingCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// The trampoline: runs `call`, then whatever call it leaves, until the
/// chain bottoms out. Native stack depth stays constant regardless of
/// tail-recursion depth.
pub fn drive(call: Option<PendingCall<'_>>) -> Result<(), DynamicError> {
    let mut next = call;
    while let Some(pending) = next {
        next = pending.process()?;
    }
    Ok(())
}
