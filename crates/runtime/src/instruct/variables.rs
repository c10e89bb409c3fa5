//! Local variable and parameter declarations.
//!
//! Both bind a stack slot in the current frame. A `LocalParam` first looks
//! for a value supplied by the caller (in the ordinary or tunnel set,
//! depending on its kind) and only evaluates its default when nothing was
//! supplied.

use arbor_model::{DynamicError, Location, SequenceType, codes};

use crate::context::Context;
use crate::expr::{Expression, evaluate_to_sequence};
use crate::param::ParamId;

/// `xsl:param` inside a template or function body.
#[derive(Debug)]
pub struct LocalParam {
    pub id: ParamId,
    pub name: arbor_model::QName,
    pub slot: usize,
    pub required: bool,
    pub tunnel: bool,
    pub required_type: Option<SequenceType>,
    pub default: Box<dyn Expression>,
    pub location: Location,
}

impl LocalParam {
    pub fn new(
        id: ParamId,
        name: arbor_model::QName,
        slot: usize,
        default: Box<dyn Expression>,
    ) -> Self {
        LocalParam {
            id,
            name,
            slot,
            required: false,
            tunnel: false,
            required_type: None,
            default,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_tunnel(mut self, tunnel: bool) -> Self {
        self.tunnel = tunnel;
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

impl Expression for LocalParam {
    fn location(&self) -> Location {
        self.location
    }

    fn is_vacuous(&self) -> bool {
        true
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let supplied = if self.tunnel {
            ctx.tunnel_param(self.id).cloned()
        } else {
            ctx.local_param(self.id).cloned()
        };
        let value = match supplied {
            Some(value) => match &self.required_type {
                Some(required) => ctx
                    .controller()
                    .checker()
                    .check(value, required, &format!("parameter ${}", self.name))
                    .map_err(|e| e.with_location(self.location))?,
                None => value,
            },
            None if self.required => {
                return Err(DynamicError::fatal(
                    codes::REQUIRED_LOCAL_PARAM,
                    format!("required parameter ${} was not supplied", self.name),
                )
                .with_location(self.location));
            }
            None => {
                let value = evaluate_to_sequence(self.default.as_ref(), ctx)
                    .map_err(|e| e.with_location(self.location))?;
                match &self.required_type {
                    Some(required) => ctx
                        .controller()
                        .checker()
                        .check(value, required, &format!("parameter ${}", self.name))
                        .map_err(|e| e.with_location(self.location))?,
                    None => value,
                }
            }
        };
        ctx.frame_mut().set(self.slot, value);
        Ok(())
    }
}

/// `xsl:variable` inside a template or function body.
#[derive(Debug)]
pub struct LocalVariable {
    pub name: arbor_model::QName,
    pub slot: usize,
    pub select: Box<dyn Expression>,
    pub location: Location,
}

impl LocalVariable {
    pub fn new(name: arbor_model::QName, slot: usize, select: Box<dyn Expression>) -> Self {
        LocalVariable {
            name,
            slot,
            select,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl Expression for LocalVariable {
    fn location(&self) -> Location {
        self.location
    }

    fn is_vacuous(&self) -> bool {
        true
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let value = evaluate_to_sequence(self.select.as_ref(), ctx)
            .map_err(|e| e.with_location(self.location))?;
        ctx.frame_mut().set(self.slot, value);
        Ok(())
    }
}
