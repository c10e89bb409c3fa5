//! # arbor-runtime
//!
//! The instruction-evaluation core of the arbor transformation engine.
//!
//! A compiled program is an [`Executable`](executable::Executable): an
//! immutable, `Arc`-shared bundle of instruction trees, templates, user
//! functions, and global bindings. Each run builds one
//! [`Controller`](controller::Controller), the per-run mutable island
//! holding the global-variable [`Bindery`](bindery::Bindery), the function
//! memo cache, supplied parameters, and the pluggable seams, and threads
//! a [`Context`](context::Context) through the tree.
//!
//! Every instruction implements [`Expression`](expr::Expression), which
//! offers three interchangeable evaluation strategies (single item, pull
//! iterator, push to receiver) bridged by default adapters. Calls in tail
//! position do not recurse: they return a
//! [`PendingCall`](template::PendingCall) that the trampoline in
//! [`template`] drives iteratively, so tail-recursive templates and
//! functions run in constant native stack.

pub mod bindery;
pub mod context;
pub mod controller;
pub mod executable;
pub mod expr;
pub mod function;
pub mod instruct;
pub mod param;
pub mod rules;
pub mod template;

pub use bindery::{Assign, Bindery, GlobalVariable};
pub use context::{Context, SharedReceiver, StackFrame};
pub use controller::{Controller, LenientPolicy, RecoveryPolicy, StrictPolicy, shared_receiver};
pub use executable::{Executable, FunctionId, ProcedureId};
pub use expr::{
    ContextItemExpr, Expression, GlobalVariableReference, Literal, LocalVariableReference,
    evaluate_to_sequence,
};
pub use function::{UserFunction, UserFunctionCall};
pub use instruct::{
    ApplyImports, ApplyTemplates, Block, CallTemplate, Choose, CommentCtor, ComputedAttribute,
    FixedAttribute, FixedElement, LocalParam, LocalVariable, Message, NamespaceCtor, PiCtor,
    TextLiteral, Trace, ValueOf,
};
pub use param::{ParamId, ParameterSet, WithParam};
pub use rules::{BasicRuleSet, PrecedenceWindow, RuleMatcher};
pub use template::{PendingCall, Procedure, Template, drive};

#[cfg(test)]
mod tests;
