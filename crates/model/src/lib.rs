//! # arbor-model
//!
//! Foundation data model for the arbor transformation runtime.
//!
//! This crate defines the values and seams the execution core is built on:
//!
//! - [`item`]: atomic values, items, sequences, and the pull-based
//!   [`SequenceIterator`](item::SequenceIterator) protocol
//! - [`node`]: the arena-backed document model ([`Document`](node::Document),
//!   [`NodeRef`](node::NodeRef), [`DocumentBuilder`](node::DocumentBuilder))
//! - [`name`]: qualified names and the [`NamePool`](name::NamePool)
//!   allocator seam
//! - [`receiver`]: the append-only output event sink
//!   ([`Receiver`](receiver::Receiver)) and buffering implementations
//! - [`types`]: required sequence types and the
//!   [`TypeChecker`](types::TypeChecker) conversion seam
//! - [`error`]: immutable dynamic-error values with locations and the
//!   recoverable/fatal/circularity/termination taxonomy
//!
//! The crate has no opinion about evaluation; that lives in
//! `arbor-runtime`.

pub mod error;
pub mod item;
pub mod name;
pub mod node;
pub mod receiver;
pub mod types;

pub use error::{DynamicError, ErrorKind, Location, codes};
pub use item::{
    AtomicValue, EmptyIterator, Item, ListIterator, Sequence, SequenceIterator,
    SingletonIterator,
};
pub use name::{NameCode, NamePool, QName, SimpleNamePool};
pub use node::{Document, DocumentBuilder, NodeKind, NodeRef};
pub use receiver::{Receiver, SequenceCollector, TextCapture, options};
pub use types::{BasicTypeChecker, Cardinality, ItemType, SequenceType, TypeChecker};
