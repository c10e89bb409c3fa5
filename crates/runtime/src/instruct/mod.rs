//! The compiled instruction set.

pub mod apply;
pub mod block;
pub mod call;
pub mod choose;
pub mod constructors;
pub mod message;
pub mod trace;
pub mod variables;

pub use apply::{ApplyImports, ApplyTemplates};
pub use block::Block;
pub use call::CallTemplate;
pub use choose::Choose;
pub use constructors::{
    CommentCtor, ComputedAttribute, FixedAttribute, FixedElement, NamespaceCtor, PiCtor,
    TextLiteral, ValueOf,
};
pub use message::Message;
pub use trace::Trace;
pub use variables::{LocalParam, LocalVariable};
