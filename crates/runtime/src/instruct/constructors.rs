//! Node constructor instructions.
//!
//! Constructors emit receiver events in well-formed order. Malformed
//! computed content raises recoverable errors; under a lenient recovery
//! policy the value is repaired (or the event skipped) and the repaired
//! event is flagged with [`options::REPAIRED`].

use arbor_model::{DynamicError, Location, QName, codes, options};

use crate::context::Context;
use crate::expr::{Expression, evaluate_to_sequence};

/// An element with a compile-time name.
#[derive(Debug)]
pub struct FixedElement {
    pub name: QName,
    pub content: Box<dyn Expression>,
    pub location: Location,
}

impl FixedElement {
    pub fn new(name: QName, content: Box<dyn Expression>) -> Self {
        FixedElement {
            name,
            content,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl Expression for FixedElement {
    fn location(&self) -> Location {
        self.location
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let code = ctx.controller().pool().allocate(&self.name);
        ctx.emit(|r| r.start_element(code, self.location, options::NONE))?;
        self.content
            .process(ctx)
            .map_err(|e| e.with_location(self.location))?;
        ctx.emit(|r| r.end_element())
    }
}

/// An attribute with a compile-time name.
#[derive(Debug)]
pub struct FixedAttribute {
    pub name: QName,
    pub select: Box<dyn Expression>,
    pub location: Location,
}

impl FixedAttribute {
    pub fn new(name: QName, select: Box<dyn Expression>) -> Self {
        FixedAttribute {
            name,
            select,
            location: Location::UNKNOWN,
        }
    }
}

impl Expression for FixedAttribute {
    fn location(&self) -> Location {
        self.location
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let value = evaluate_to_sequence(self.select.as_ref(), ctx)?.string_join(" ");
        let code = ctx.controller().pool().allocate(&self.name);
        ctx.emit(|r| r.attribute(code, &value, self.location, options::NONE))
    }
}

/// An attribute whose name is computed at run time. A malformed name is a
/// recoverable error; under a lenient policy the attribute is skipped.
#[derive(Debug)]
pub struct ComputedAttribute {
    pub name: Box<dyn Expression>,
    pub select: Box<dyn Expression>,
    pub location: Location,
}

impl ComputedAttribute {
    pub fn new(name: Box<dyn Expression>, select: Box<dyn Expression>) -> Self {
        ComputedAttribute {
            name,
            select,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl Expression for ComputedAttribute {
    fn location(&self) -> Location {
        self.location
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let lexical = evaluate_to_sequence(self.name.as_ref(), ctx)?.string_join("");
        if !is_valid_name(&lexical) {
            let err = DynamicError::recoverable(
                codes::BAD_ATTRIBUTE_NAME,
                format!("'{}' is not a valid attribute name", lexical),
            )
            .with_location(self.location);
            // Recovery skips the attribute entirely.
            return ctx.controller().recover_or_raise(err);
        }
        let value = evaluate_to_sequence(self.select.as_ref(), ctx)?.string_join(" ");
        let code = ctx.controller().pool().allocate(&QName::local(lexical));
        ctx.emit(|r| r.attribute(code, &value, self.location, options::NONE))
    }
}

/// A comment constructor. XML forbids `--` inside and `-` at the end of a
/// comment; under a lenient policy the content is repaired by inserting a
/// space, under strict it is an error.
#[derive(Debug)]
pub struct CommentCtor {
    pub select: Box<dyn Expression>,
    pub location: Location,
}

impl CommentCtor {
    pub fn new(select: Box<dyn Expression>) -> Self {
        CommentCtor {
            select,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl Expression for CommentCtor {
    fn location(&self) -> Location {
        self.location
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let text = evaluate_to_sequence(self.select.as_ref(), ctx)?.string_join("");
        let mut flags = options::NONE;
        let text = if text.contains("--") || text.ends_with('-') {
            let err = DynamicError::recoverable(
                codes::BAD_COMMENT_CONTENT,
                "comment content must not contain '--' or end with '-'",
            )
            .with_location(self.location);
            ctx.controller().recover_or_raise(err)?;
            flags |= options::REPAIRED;
            repair_comment(&text)
        } else {
            text
        };
        ctx.emit(|r| r.comment(&text, self.location, flags))
    }
}

fn repair_comment(text: &str) -> String {
    let mut repaired = String::with_capacity(text.len());
    let mut prev_dash = false;
    for c in text.chars() {
        if c == '-' && prev_dash {
            repaired.push(' ');
        }
        repaired.push(c);
        prev_dash = c == '-';
    }
    if prev_dash {
        repaired.push(' ');
    }
    repaired
}

/// A processing-instruction constructor. The target name must be a valid
/// name other than `xml`; the data must not contain `?>`.
#[derive(Debug)]
pub struct PiCtor {
    pub target: Box<dyn Expression>,
    pub select: Box<dyn Expression>,
    pub location: Location,
}

impl PiCtor {
    pub fn new(target: Box<dyn Expression>, select: Box<dyn Expression>) -> Self {
        PiCtor {
            target,
            select,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl Expression for PiCtor {
    fn location(&self) -> Location {
        self.location
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let target = evaluate_to_sequence(self.target.as_ref(), ctx)?.string_join("");
        if !is_valid_name(&target) || target.eq_ignore_ascii_case("xml") {
            let err = DynamicError::recoverable(
                codes::BAD_PI_NAME,
                format!("'{}' is not a valid processing-instruction target", target),
            )
            .with_location(self.location);
            return ctx.controller().recover_or_raise(err);
        }
        let data = evaluate_to_sequence(self.select.as_ref(), ctx)?.string_join("");
        let mut flags = options::NONE;
        let data = if data.contains("?>") {
            let err = DynamicError::recoverable(
                codes::BAD_PI_CONTENT,
                "processing-instruction data must not contain '?>'",
            )
            .with_location(self.location);
            ctx.controller().recover_or_raise(err)?;
            flags |= options::REPAIRED;
            data.replace("?>", "? >")
        } else {
            data
        };
        ctx.emit(|r| r.processing_instruction(&target, &data, self.location, flags))
    }
}

/// A namespace node constructor.
#[derive(Debug)]
pub struct NamespaceCtor {
    pub prefix: String,
    pub uri: Box<dyn Expression>,
    pub location: Location,
}

impl NamespaceCtor {
    pub fn new(prefix: impl Into<String>, uri: Box<dyn Expression>) -> Self {
        NamespaceCtor {
            prefix: prefix.into(),
            uri,
            location: Location::UNKNOWN,
        }
    }
}

impl Expression for NamespaceCtor {
    fn location(&self) -> Location {
        self.location
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let uri = evaluate_to_sequence(self.uri.as_ref(), ctx)?.string_join("");
        ctx.emit(|r| r.namespace(&self.prefix, &uri, options::NONE))
    }
}

/// A compile-time text node.
#[derive(Debug)]
pub struct TextLiteral {
    pub text: String,
    pub location: Location,
}

impl TextLiteral {
    pub fn new(text: impl Into<String>) -> Self {
        TextLiteral {
            text: text.into(),
            location: Location::UNKNOWN,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl Expression for TextLiteral {
    fn location(&self) -> Location {
        self.location
    }

    fn is_vacuous(&self) -> bool {
        self.text.is_empty()
    }

    fn is_inert(&self) -> bool {
        self.text.is_empty()
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        if self.text.is_empty() {
            return Ok(());
        }
        ctx.emit(|r| r.characters(&self.text, self.location, options::NONE))
    }
}

/// `value-of`: the string values of the selected items, joined with a
/// separator, emitted as one text event.
#[derive(Debug)]
pub struct ValueOf {
    pub select: Box<dyn Expression>,
    pub separator: String,
    pub disable_escaping: bool,
    pub location: Location,
}

impl ValueOf {
    pub fn new(select: Box<dyn Expression>) -> Self {
        ValueOf {
            select,
            separator: " ".to_string(),
            disable_escaping: false,
            location: Location::UNKNOWN,
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_disable_escaping(mut self, disable: bool) -> Self {
        self.disable_escaping = disable;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl Expression for ValueOf {
    fn location(&self) -> Location {
        self.location
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let text = evaluate_to_sequence(self.select.as_ref(), ctx)?.string_join(&self.separator);
        let flags = if self.disable_escaping {
            options::DISABLE_ESCAPING
        } else {
            options::NONE
        };
        ctx.emit(|r| r.characters(&text, self.location, flags))
    }
}

/// Name validity for computed attribute and PI names: an NCName-shaped
/// check without the full XML character tables.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_repair_inserts_spaces() {
        assert_eq!(repair_comment("a--b"), "a- -b");
        assert_eq!(repair_comment("ends-"), "ends- ");
        assert_eq!(repair_comment("a---b"), "a- - -b");
        assert!(!repair_comment("x----y").contains("--"));
    }

    #[test]
    fn name_validity() {
        assert!(is_valid_name("ok-name"));
        assert!(is_valid_name("_x1"));
        assert!(!is_valid_name("1bad"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("has space"));
    }
}
