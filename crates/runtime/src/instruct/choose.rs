//! Conditional instruction: the first branch whose condition is true
//! fires; later conditions are not evaluated.

use arbor_model::{DynamicError, Location, SequenceIterator};

use crate::context::Context;
use crate::expr::{Expression, Literal};
use crate::template::PendingCall;

#[derive(Debug)]
pub struct Choose {
    conditions: Vec<Box<dyn Expression>>,
    actions: Vec<Box<dyn Expression>>,
    location: Location,
}

impl Choose {
    /// `conditions` and `actions` are parallel; an `otherwise` branch is a
    /// condition that is a true literal.
    pub fn new(conditions: Vec<Box<dyn Expression>>, actions: Vec<Box<dyn Expression>>) -> Self {
        debug_assert_eq!(conditions.len(), actions.len());
        Choose {
            conditions,
            actions,
            location: Location::UNKNOWN,
        }
    }

    /// A single `if`/`then` with no otherwise.
    pub fn when(condition: Box<dyn Expression>, action: Box<dyn Expression>) -> Self {
        Choose::new(vec![condition], vec![action])
    }

    pub fn with_otherwise(mut self, action: Box<dyn Expression>) -> Self {
        self.conditions
            .push(Box::new(Literal::item(arbor_model::Item::boolean(true))));
        self.actions.push(action);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    fn chosen(&self, ctx: &mut Context<'_>) -> Result<Option<&dyn Expression>, DynamicError> {
        for (condition, action) in self.conditions.iter().zip(&self.actions) {
            let test = condition
                .effective_boolean(ctx)
                .map_err(|e| e.with_location(condition.location()))?;
            if test {
                return Ok(Some(action.as_ref()));
            }
        }
        Ok(None)
    }
}

impl Expression for Choose {
    fn location(&self) -> Location {
        self.location
    }

    fn can_return_tail_call(&self) -> bool {
        // Every branch is in tail position.
        self.actions
            .iter()
            .any(|action| action.can_return_tail_call())
    }

    fn is_vacuous(&self) -> bool {
        self.actions.iter().all(|action| action.is_vacuous())
    }

    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        match self.chosen(ctx)? {
            Some(action) => action.iterate(ctx),
            None => Ok(Box::new(arbor_model::EmptyIterator)),
        }
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        match self.chosen(ctx)? {
            Some(action) => action
                .process(ctx)
                .map_err(|e| e.with_location(action.location())),
            None => Ok(()),
        }
    }

    fn process_leaving_tail<'c>(
        &self,
        ctx: &mut Context<'c>,
    ) -> Result<Option<PendingCall<'c>>, DynamicError> {
        match self.chosen(ctx)? {
            Some(action) => action
                .process_leaving_tail(ctx)
                .map_err(|e| e.with_location(action.location())),
            None => Ok(None),
        }
    }
}
