//! Per-run orchestration state.
//!
//! One [`Controller`] exists per transformation run. It owns everything
//! mutable within the run (the global-variable [`Bindery`] and the function
//! memo cache) alongside the shared read-only [`Executable`] and the
//! pluggable seams (name pool, rule matcher, type checker, recovery
//! policy). A fresh controller means a fresh run: concurrent runs over the
//! same executable each build their own.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use arbor_model::{
    BasicTypeChecker, DynamicError, ErrorKind, Item, NamePool, NodeRef, QName, Sequence,
    TypeChecker,
};

use crate::context::{Context, SharedReceiver};
use crate::executable::{Executable, FunctionId};
use crate::rules::RuleMatcher;

/// Decides whether a recoverable dynamic error may be repaired and ignored.
pub trait RecoveryPolicy: Send + Sync + fmt::Debug {
    fn allow(&self, error: &DynamicError) -> bool;
}

/// Treats every dynamic error as fatal.
#[derive(Debug, Default)]
pub struct StrictPolicy;

impl RecoveryPolicy for StrictPolicy {
    fn allow(&self, _error: &DynamicError) -> bool {
        false
    }
}

/// Repairs and continues past any recoverable error. Fatal, circularity,
/// and termination errors still abort.
#[derive(Debug, Default)]
pub struct LenientPolicy;

impl RecoveryPolicy for LenientPolicy {
    fn allow(&self, error: &DynamicError) -> bool {
        error.kind == ErrorKind::Recoverable
    }
}

pub struct Controller {
    executable: Arc<Executable>,
    bindery: crate::bindery::Bindery,
    supplied: HashMap<QName, Sequence>,
    principal_root: Option<NodeRef>,
    pool: Arc<dyn NamePool>,
    rules: Arc<dyn RuleMatcher>,
    checker: Arc<dyn TypeChecker>,
    policy: Box<dyn RecoveryPolicy>,
    memo: RefCell<HashMap<(FunctionId, String), Sequence>>,
}

impl Controller {
    pub fn new(
        executable: Arc<Executable>,
        pool: Arc<dyn NamePool>,
        rules: Arc<dyn RuleMatcher>,
    ) -> Self {
        let bindery = crate::bindery::Bindery::new(executable.globals_len());
        Controller {
            executable,
            bindery,
            supplied: HashMap::new(),
            principal_root: None,
            pool,
            rules,
            checker: Arc::new(BasicTypeChecker),
            policy: Box::new(StrictPolicy),
            memo: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_principal_root(mut self, root: NodeRef) -> Self {
        self.principal_root = Some(root);
        self
    }

    /// Supplies an externally provided value for a global parameter.
    pub fn with_supplied_parameter(mut self, name: QName, value: Sequence) -> Self {
        self.supplied.insert(name, value);
        self
    }

    pub fn with_policy(mut self, policy: Box<dyn RecoveryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_checker(mut self, checker: Arc<dyn TypeChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn executable(&self) -> &Executable {
        &self.executable
    }

    pub fn bindery(&self) -> &crate::bindery::Bindery {
        &self.bindery
    }

    pub fn supplied_parameter(&self, name: &QName) -> Option<&Sequence> {
        self.supplied.get(name)
    }

    pub fn principal_root(&self) -> Option<&NodeRef> {
        self.principal_root.as_ref()
    }

    pub fn pool(&self) -> Arc<dyn NamePool> {
        Arc::clone(&self.pool)
    }

    pub fn rules(&self) -> &dyn RuleMatcher {
        self.rules.as_ref()
    }

    pub fn checker(&self) -> &dyn TypeChecker {
        self.checker.as_ref()
    }

    /// Opens the run's initial context.
    pub fn new_context(&self, receiver: SharedReceiver, frame_size: usize) -> Context<'_> {
        let mut ctx = Context::new(self, receiver, frame_size);
        if let Some(root) = &self.principal_root {
            ctx.set_item(Item::Node(root.clone()), 1, 1);
        }
        ctx
    }

    /// A context rooted at the principal document with no local bindings in
    /// scope. Global variable initializers are evaluated here so they cannot
    /// observe the focus or frame of whatever expression demanded them.
    pub fn clean_context(&self, receiver: SharedReceiver) -> Context<'_> {
        self.new_context(receiver, 0)
    }

    /// Applies the recovery policy to `error`. Recoverable errors the
    /// policy accepts are logged and swallowed; everything else is raised,
    /// escalated to fatal.
    pub fn recover_or_raise(&self, error: DynamicError) -> Result<(), DynamicError> {
        if error.kind == ErrorKind::Recoverable && self.policy.allow(&error) {
            log::warn!("recovered: {}", error);
            Ok(())
        } else {
            Err(error.escalated())
        }
    }

    pub(crate) fn memo_get(&self, id: FunctionId, key: &str) -> Option<Sequence> {
        self.memo.borrow().get(&(id, key.to_string())).cloned()
    }

    pub(crate) fn memo_store(&self, id: FunctionId, key: String, value: Sequence) {
        self.memo.borrow_mut().insert((id, key), value);
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("globals", &self.executable.globals_len())
            .field("principal_root", &self.principal_root)
            .finish_non_exhaustive()
    }
}

/// Convenience for wiring a receiver into the shared handle contexts use.
pub fn shared_receiver<R: arbor_model::Receiver + 'static>(receiver: R) -> SharedReceiver {
    Rc::new(RefCell::new(receiver))
}
