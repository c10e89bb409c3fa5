//! `xsl:message`: diagnostics out-of-band of the result tree, with an
//! optional terminate.

use arbor_model::{DynamicError, Location, codes};

use crate::context::Context;
use crate::expr::{Expression, evaluate_to_sequence};

#[derive(Debug)]
pub struct Message {
    pub select: Box<dyn Expression>,
    pub terminate: bool,
    pub location: Location,
}

impl Message {
    pub fn new(select: Box<dyn Expression>) -> Self {
        Message {
            select,
            terminate: false,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_terminate(mut self, terminate: bool) -> Self {
        self.terminate = terminate;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl Expression for Message {
    fn location(&self) -> Location {
        self.location
    }

    fn is_vacuous(&self) -> bool {
        true
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let text = evaluate_to_sequence(self.select.as_ref(), ctx)
            .map_err(|e| e.with_location(self.location))?
            .string_join("");
        if self.terminate {
            log::error!("{}", text);
            // Termination is never caught by the recovery policy.
            return Err(
                DynamicError::terminated(codes::TERMINATED, text).with_location(self.location)
            );
        }
        log::info!("{}", text);
        Ok(())
    }
}
