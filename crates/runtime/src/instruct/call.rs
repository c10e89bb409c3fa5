//! `call-template`: invocation of a named template with actual and tunnel
//! parameters.

use arbor_model::{DynamicError, Location};

use crate::context::Context;
use crate::executable::ProcedureId;
use crate::expr::Expression;
use crate::param::{WithParam, assemble, assemble_tunnel};
use crate::template::{PendingCall, drive};

#[derive(Debug)]
pub struct CallTemplate {
    pub target: ProcedureId,
    pub actual_params: Vec<WithParam>,
    pub tunnel_params: Vec<WithParam>,
    /// False when the call sits in a position that cannot host a
    /// trampoline, e.g. inside a value computation.
    pub use_tail_calls: bool,
    pub location: Location,
}

impl CallTemplate {
    pub fn new(target: ProcedureId) -> Self {
        CallTemplate {
            target,
            actual_params: Vec::new(),
            tunnel_params: Vec::new(),
            use_tail_calls: true,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_param(mut self, param: WithParam) -> Self {
        self.actual_params.push(param);
        self
    }

    pub fn with_tunnel_param(mut self, param: WithParam) -> Self {
        self.tunnel_params.push(param);
        self
    }

    pub fn without_tail_calls(mut self) -> Self {
        self.use_tail_calls = false;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    fn invoke<'c>(
        &self,
        ctx: &mut Context<'c>,
    ) -> Result<Option<PendingCall<'c>>, DynamicError> {
        let template = ctx.controller().executable().procedure(self.target)?;
        let local = assemble(&self.actual_params, ctx)?;
        let tunnel = assemble_tunnel(&self.tunnel_params, ctx)?;
        template
            .expand(ctx, local, tunnel)
            .map_err(|e| e.with_location(self.location))
    }
}

impl Expression for CallTemplate {
    fn location(&self) -> Location {
        self.location
    }

    fn can_return_tail_call(&self) -> bool {
        self.use_tail_calls
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let pending = self.invoke(ctx)?;
        drive(pending).map_err(|e| e.with_location(self.location))
    }

    fn process_leaving_tail<'c>(
        &self,
        ctx: &mut Context<'c>,
    ) -> Result<Option<PendingCall<'c>>, DynamicError> {
        if !self.use_tail_calls {
            self.process(ctx)?;
            return Ok(None);
        }
        self.invoke(ctx)
    }
}
