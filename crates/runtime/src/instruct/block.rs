//! Sequence constructor: children evaluated in order, outputs
//! concatenated.

use arbor_model::{
    DynamicError, ListIterator, Location, Sequence, SequenceIterator,
};

use crate::context::Context;
use crate::expr::{Expression, evaluate_to_sequence};
use crate::template::PendingCall;

#[derive(Debug)]
pub struct Block {
    children: Vec<Box<dyn Expression>>,
    location: Location,
}

impl Block {
    pub fn new(children: Vec<Box<dyn Expression>>) -> Self {
        Block {
            children,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Collapses trivial blocks: an empty block becomes an empty literal,
    /// a one-child block becomes the child.
    pub fn simplify(mut children: Vec<Box<dyn Expression>>) -> Box<dyn Expression> {
        match children.len() {
            0 => Box::new(crate::expr::Literal::empty()),
            1 => children.remove(0),
            _ => Box::new(Block::new(children)),
        }
    }

    pub fn children(&self) -> &[Box<dyn Expression>] {
        &self.children
    }
}

impl Expression for Block {
    fn location(&self) -> Location {
        self.location
    }

    fn can_return_tail_call(&self) -> bool {
        // Only the last child is in tail position.
        self.children
            .last()
            .is_some_and(|child| child.can_return_tail_call())
    }

    fn is_vacuous(&self) -> bool {
        self.children.iter().all(|child| child.is_vacuous())
    }

    fn is_inert(&self) -> bool {
        self.children.iter().all(|child| child.is_inert())
    }

    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        let mut all = Sequence::empty();
        for child in &self.children {
            let part = evaluate_to_sequence(child.as_ref(), ctx)?;
            for item in part.into_items() {
                all.push(item);
            }
        }
        Ok(Box::new(ListIterator::from(all)))
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        for child in &self.children {
            child
                .process(ctx)
                .map_err(|e| e.with_location(child.location()))?;
        }
        Ok(())
    }

    fn process_leaving_tail<'c>(
        &self,
        ctx: &mut Context<'c>,
    ) -> Result<Option<PendingCall<'c>>, DynamicError> {
        let Some((last, init)) = self.children.split_last() else {
            return Ok(None);
        };
        for child in init {
            child
                .process(ctx)
                .map_err(|e| e.with_location(child.location()))?;
        }
        last.process_leaving_tail(ctx)
            .map_err(|e| e.with_location(last.location()))
    }
}
