//! The compiled program: registries of global bindings, templates, and
//! user functions, indexed by compile-time-assigned ids.
//!
//! An [`Executable`] is built once by the compiler front end and shared
//! read-only across any number of concurrent runs. Instructions refer to
//! their targets by index (a `ProcedureId`, `FunctionId`, or global slot
//! number), which keeps compiled trees acyclic even for self-recursive
//! templates and variables.

use std::sync::Arc;

use arbor_model::DynamicError;

use crate::bindery::GlobalVariable;
use crate::function::UserFunction;
use crate::template::Template;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcedureId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub usize);

#[derive(Debug, Default)]
pub struct Executable {
    globals: Vec<Arc<GlobalVariable>>,
    procedures: Vec<Arc<Template>>,
    functions: Vec<Arc<UserFunction>>,
}

impl Executable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a global binding. The binding's compile-time slot number
    /// must match its registration order.
    pub fn add_global(&mut self, binding: GlobalVariable) -> usize {
        debug_assert_eq!(
            binding.slot,
            self.globals.len(),
            "global slot numbers must be allocated in registration order"
        );
        let slot = self.globals.len();
        self.globals.push(Arc::new(binding));
        slot
    }

    pub fn add_procedure(&mut self, template: Arc<Template>) -> ProcedureId {
        let id = ProcedureId(self.procedures.len());
        self.procedures.push(template);
        id
    }

    pub fn add_function(&mut self, function: Arc<UserFunction>) -> FunctionId {
        let id = FunctionId(self.functions.len());
        self.functions.push(function);
        id
    }

    pub fn globals_len(&self) -> usize {
        self.globals.len()
    }

    pub fn global(&self, slot: usize) -> Result<Arc<GlobalVariable>, DynamicError> {
        self.globals.get(slot).cloned().ok_or_else(|| {
            DynamicError::fatal("XPST0008", format!("no global binding at slot {}", slot))
        })
    }

    pub fn procedure(&self, id: ProcedureId) -> Result<Arc<Template>, DynamicError> {
        self.procedures.get(id.0).cloned().ok_or_else(|| {
            DynamicError::fatal("XTDE0040", format!("no template registered at {:?}", id))
        })
    }

    pub fn function(&self, id: FunctionId) -> Result<Arc<UserFunction>, DynamicError> {
        self.functions.get(id.0).cloned().ok_or_else(|| {
            DynamicError::fatal("XPST0017", format!("no function registered at {:?}", id))
        })
    }
}
