//! The dynamic context threaded through instruction evaluation.
//!
//! A [`Context`] bundles the current item with its position and size, the
//! local stack frame, the current output receiver, current-template and
//! mode bookkeeping, and the local/tunnel parameter sets, plus a
//! back-reference to the per-run [`Controller`].
//!
//! Contexts are plain owned values with stack-like lifetimes:
//!
//! - a **major** context ([`Context::new_major`]) opens a fresh stack frame
//!   and a fresh local-parameter scope, inheriting everything else;
//! - a **minor** context, a change of output destination only, is
//!   expressed by [`Context::with_receiver`], which swaps the receiver for
//!   the duration of a closure and restores it afterwards.
//!
//! A frame lives exactly as long as the instruction invocation that opened
//! it; a [`PendingCall`](crate::template::PendingCall) keeps its callee
//! context alive across trampoline iterations by owning it.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use arbor_model::{Item, Receiver, Sequence};

use crate::controller::Controller;
use crate::param::{ParamId, ParameterSet};
use crate::template::Template;

/// The receiver handle shared along one run's context chain. Runs are
/// single-threaded, so an `Rc<RefCell<..>>` is all the sharing needed.
pub type SharedReceiver = Rc<RefCell<dyn Receiver>>;

/// Local variable slots, indexed by compile-time-allocated slot numbers.
#[derive(Debug, Clone)]
pub struct StackFrame {
    slots: Vec<Sequence>,
}

impl StackFrame {
    pub fn new(size: usize) -> Self {
        StackFrame {
            slots: vec![Sequence::empty(); size],
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, slot: usize) -> &Sequence {
        &self.slots[slot]
    }

    pub fn set(&mut self, slot: usize, value: Sequence) {
        self.slots[slot] = value;
    }
}

pub struct Context<'c> {
    controller: &'c Controller,
    receiver: SharedReceiver,
    frame: StackFrame,
    item: Option<Item>,
    position: usize,
    size: usize,
    current_template: Option<Arc<Template>>,
    mode: Option<String>,
    local_params: Rc<ParameterSet>,
    tunnel_params: Rc<ParameterSet>,
}

impl<'c> Context<'c> {
    pub(crate) fn new(
        controller: &'c Controller,
        receiver: SharedReceiver,
        frame_size: usize,
    ) -> Self {
        Context {
            controller,
            receiver,
            frame: StackFrame::new(frame_size),
            item: None,
            position: 0,
            size: 0,
            current_template: None,
            mode: None,
            local_params: Rc::new(ParameterSet::empty()),
            tunnel_params: Rc::new(ParameterSet::empty()),
        }
    }

    /// Opens a child context with a fresh stack frame and parameter scope.
    /// Focus, receiver, current template, and tunnel parameters are
    /// inherited; callers override them as needed.
    pub fn new_major(&self, frame_size: usize) -> Context<'c> {
        Context {
            controller: self.controller,
            receiver: Rc::clone(&self.receiver),
            frame: StackFrame::new(frame_size),
            item: self.item.clone(),
            position: self.position,
            size: self.size,
            current_template: self.current_template.clone(),
            mode: self.mode.clone(),
            local_params: Rc::new(ParameterSet::empty()),
            tunnel_params: Rc::clone(&self.tunnel_params),
        }
    }

    pub fn controller(&self) -> &'c Controller {
        self.controller
    }

    pub fn receiver(&self) -> SharedReceiver {
        Rc::clone(&self.receiver)
    }

    pub fn set_receiver(&mut self, receiver: SharedReceiver) {
        self.receiver = receiver;
    }

    /// Runs `f` with the receiver swapped: the "minor context" used by the
    /// buffered evaluation adapters and by result-capturing instructions.
    pub fn with_receiver<R>(
        &mut self,
        receiver: SharedReceiver,
        f: impl FnOnce(&mut Context<'c>) -> R,
    ) -> R {
        let saved = std::mem::replace(&mut self.receiver, receiver);
        let out = f(self);
        self.receiver = saved;
        out
    }

    /// Borrows the current receiver for one event.
    pub fn emit<R>(&mut self, f: impl FnOnce(&mut dyn Receiver) -> R) -> R {
        let receiver = Rc::clone(&self.receiver);
        let mut guard = receiver.borrow_mut();
        f(&mut *guard)
    }

    pub fn item(&self) -> Option<&Item> {
        self.item.as_ref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn set_item(&mut self, item: Item, position: usize, size: usize) {
        self.item = Some(item);
        self.position = position;
        self.size = size;
    }

    pub fn frame(&self) -> &StackFrame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut StackFrame {
        &mut self.frame
    }

    pub fn current_template(&self) -> Option<&Arc<Template>> {
        self.current_template.as_ref()
    }

    pub fn set_current_template(&mut self, template: Arc<Template>) {
        self.current_template = Some(template);
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    pub fn set_mode(&mut self, mode: Option<String>) {
        self.mode = mode;
    }

    pub fn local_param(&self, id: ParamId) -> Option<&Sequence> {
        self.local_params.get(id)
    }

    pub fn tunnel_param(&self, id: ParamId) -> Option<&Sequence> {
        self.tunnel_params.get(id)
    }

    pub fn tunnel_params(&self) -> Rc<ParameterSet> {
        Rc::clone(&self.tunnel_params)
    }

    pub fn set_param_sets(&mut self, local: Rc<ParameterSet>, tunnel: Rc<ParameterSet>) {
        self.local_params = local;
        self.tunnel_params = tunnel;
    }
}
