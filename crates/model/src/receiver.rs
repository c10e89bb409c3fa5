//! The receiver seam: an append-only sink for constructed output events.
//!
//! The execution core emits start/end element, attribute, namespace,
//! comment, processing-instruction, text, and generic append-item events in
//! well-formed nesting order. Everything downstream of that (escaping,
//! buffering, serialization) is the receiver's business.

use std::sync::Arc;

use crate::error::{DynamicError, Location};
use crate::item::{AtomicValue, Item, Sequence};
use crate::name::{NameCode, NamePool};
use crate::node::DocumentBuilder;

/// Per-event option flags.
pub mod options {
    pub const NONE: u32 = 0;
    /// Text must be written through without escaping.
    pub const DISABLE_ESCAPING: u32 = 1;
    /// The sink should check for duplicate attribute/namespace names.
    pub const CHECK_DUPLICATES: u32 = 1 << 1;
    /// The value was repaired by the lenient error policy.
    pub const REPAIRED: u32 = 1 << 2;
}

/// An append-only event sink.
///
/// Callers guarantee well-formed nesting: every `start_element` is closed by
/// a matching `end_element`, and `attribute`/`namespace` events arrive only
/// between an element's start and its first child event.
pub trait Receiver {
    fn open(&mut self) -> Result<(), DynamicError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), DynamicError> {
        Ok(())
    }

    fn start_element(
        &mut self,
        name: NameCode,
        location: Location,
        options: u32,
    ) -> Result<(), DynamicError>;

    fn end_element(&mut self) -> Result<(), DynamicError>;

    fn attribute(
        &mut self,
        name: NameCode,
        value: &str,
        location: Location,
        options: u32,
    ) -> Result<(), DynamicError>;

    fn namespace(&mut self, prefix: &str, uri: &str, options: u32) -> Result<(), DynamicError>;

    fn characters(
        &mut self,
        text: &str,
        location: Location,
        options: u32,
    ) -> Result<(), DynamicError>;

    fn comment(
        &mut self,
        text: &str,
        location: Location,
        options: u32,
    ) -> Result<(), DynamicError>;

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        location: Location,
        options: u32,
    ) -> Result<(), DynamicError>;

    /// Appends a whole item. The default renders the item's string value as
    /// text; sinks that keep item identity override this.
    fn append_item(&mut self, item: &Item, location: Location) -> Result<(), DynamicError> {
        self.characters(&item.string_value(), location, options::NONE)
    }
}

/// A receiver that buffers its input back into a [`Sequence`].
///
/// Top-level text becomes string items, top-level element events grow a
/// fragment tree that is appended as a node item when it closes. This is
/// the push-to-iterate adapter target.
pub struct SequenceCollector {
    pool: Arc<dyn NamePool>,
    items: Vec<Item>,
    builder: Option<DocumentBuilder>,
    depth: usize,
}

impl SequenceCollector {
    pub fn new(pool: Arc<dyn NamePool>) -> Self {
        SequenceCollector {
            pool,
            items: Vec::new(),
            builder: None,
            depth: 0,
        }
    }

    /// Takes the collected sequence, resetting the collector.
    pub fn take(&mut self) -> Sequence {
        debug_assert!(self.builder.is_none(), "unclosed element in collector");
        Sequence::from_items(std::mem::take(&mut self.items))
    }

    fn lookup(&self, code: NameCode) -> Result<crate::name::QName, DynamicError> {
        self.pool.name_for(code).ok_or_else(|| {
            DynamicError::fatal(
                "XTDE0000",
                format!("name code {:?} was not issued by this pool", code),
            )
        })
    }
}

impl Receiver for SequenceCollector {
    fn start_element(
        &mut self,
        name: NameCode,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        let qname = self.lookup(name)?;
        self.builder
            .get_or_insert_with(DocumentBuilder::new)
            .start_element(qname);
        self.depth += 1;
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), DynamicError> {
        let builder = self
            .builder
            .as_mut()
            .expect("end_element without start_element");
        builder.end_element();
        self.depth -= 1;
        if self.depth == 0 {
            let root = self.builder.take().expect("builder present").build();
            if let Some(elem) = root.children().next() {
                self.items.push(Item::Node(elem));
            }
        }
        Ok(())
    }

    fn attribute(
        &mut self,
        name: NameCode,
        value: &str,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        let qname = self.lookup(name)?;
        match self.builder.as_mut() {
            Some(builder) => {
                builder.attribute(qname, value);
            }
            None => {
                // A parentless attribute becomes a one-node fragment.
                let mut b = DocumentBuilder::new();
                b.start_element(crate::name::QName::local("#attr"))
                    .attribute(qname, value)
                    .end_element();
                let root = b.build();
                let elem = root.children().next().expect("fragment element");
                if let Some(attr) = elem.attributes().next() {
                    self.items.push(Item::Node(attr));
                }
            }
        }
        Ok(())
    }

    fn namespace(&mut self, prefix: &str, uri: &str, _options: u32) -> Result<(), DynamicError> {
        if let Some(builder) = self.builder.as_mut() {
            builder.namespace(prefix, uri);
        }
        Ok(())
    }

    fn characters(
        &mut self,
        text: &str,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        match self.builder.as_mut() {
            Some(builder) => {
                builder.text(text);
            }
            None => self
                .items
                .push(Item::Atomic(AtomicValue::String(text.to_string()))),
        }
        Ok(())
    }

    fn comment(
        &mut self,
        text: &str,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        if let Some(builder) = self.builder.as_mut() {
            builder.comment(text);
        }
        Ok(())
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        if let Some(builder) = self.builder.as_mut() {
            builder.processing_instruction(target, data);
        }
        Ok(())
    }

    fn append_item(&mut self, item: &Item, location: Location) -> Result<(), DynamicError> {
        match self.builder.as_mut() {
            Some(_) => self.characters(&item.string_value(), location, options::NONE),
            None => {
                self.items.push(item.clone());
                Ok(())
            }
        }
    }
}

/// A receiver that captures only the text content pushed through it.
/// Useful for drivers that want a flat string rendition, and for tests.
#[derive(Debug, Default)]
pub struct TextCapture {
    text: String,
}

impl TextCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl Receiver for TextCapture {
    fn start_element(
        &mut self,
        _name: NameCode,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), DynamicError> {
        Ok(())
    }

    fn attribute(
        &mut self,
        _name: NameCode,
        _value: &str,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        Ok(())
    }

    fn namespace(&mut self, _prefix: &str, _uri: &str, _options: u32) -> Result<(), DynamicError> {
        Ok(())
    }

    fn characters(
        &mut self,
        text: &str,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        self.text.push_str(text);
        Ok(())
    }

    fn comment(
        &mut self,
        _text: &str,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        Ok(())
    }

    fn processing_instruction(
        &mut self,
        _target: &str,
        _data: &str,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        Ok(())
    }
}
