//! `apply-templates` and `apply-imports`: rule-driven evaluation over a
//! selected node sequence.

use std::rc::Rc;

use arbor_model::{
    DynamicError, Item, Location, NodeKind, NodeRef, Sequence, codes, options,
};

use crate::context::Context;
use crate::expr::{Expression, evaluate_to_sequence};
use crate::param::{ParameterSet, WithParam, assemble, assemble_tunnel};
use crate::rules::PrecedenceWindow;
use crate::template::drive;

#[derive(Debug)]
pub struct ApplyTemplates {
    pub select: Box<dyn Expression>,
    /// `None` applies templates in the unnamed mode.
    pub mode: Option<String>,
    pub actual_params: Vec<WithParam>,
    pub tunnel_params: Vec<WithParam>,
    pub location: Location,
}

impl ApplyTemplates {
    pub fn new(select: Box<dyn Expression>) -> Self {
        ApplyTemplates {
            select,
            mode: None,
            actual_params: Vec::new(),
            tunnel_params: Vec::new(),
            location: Location::UNKNOWN,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_param(mut self, param: WithParam) -> Self {
        self.actual_params.push(param);
        self
    }

    pub fn with_tunnel_param(mut self, param: WithParam) -> Self {
        self.tunnel_params.push(param);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl Expression for ApplyTemplates {
    fn location(&self) -> Location {
        self.location
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let selected = evaluate_to_sequence(self.select.as_ref(), ctx)
            .map_err(|e| e.with_location(self.location))?;
        let local = assemble(&self.actual_params, ctx)?;
        let tunnel = assemble_tunnel(&self.tunnel_params, ctx)?;
        apply_rule_sequence(
            ctx,
            selected,
            self.mode.as_deref(),
            PrecedenceWindow::any(),
            local,
            tunnel,
            self.location,
        )
    }
}

/// Fires the best rule for each item of `selected` in order. Nodes with no
/// matching rule in the window fall back to the builtin rules.
pub(crate) fn apply_rule_sequence(
    ctx: &mut Context<'_>,
    selected: Sequence,
    mode: Option<&str>,
    window: PrecedenceWindow,
    local: Rc<ParameterSet>,
    tunnel: Rc<ParameterSet>,
    location: Location,
) -> Result<(), DynamicError> {
    let size = selected.len();
    for (index, item) in selected.into_items().into_iter().enumerate() {
        let position = index + 1;
        let node = item.as_node().cloned();
        match node {
            Some(node) => {
                let rule = ctx
                    .controller()
                    .rules()
                    .match_rule(&node, mode, window)
                    .map_err(|e| e.with_location(location))?;
                match rule {
                    Some(template) => {
                        let pending = template.apply(
                            ctx,
                            Item::Node(node),
                            position,
                            size,
                            Rc::clone(&local),
                            Rc::clone(&tunnel),
                        )?;
                        drive(pending).map_err(|e| e.with_location(location))?;
                    }
                    None => builtin_rule(ctx, &node, mode, &tunnel, location)?,
                }
            }
            None => {
                // Atomic items have no rules; the builtin behavior is to
                // emit their string value.
                ctx.emit(|r| r.append_item(&item, location))?;
            }
        }
    }
    Ok(())
}

/// The builtin template rules: documents and elements recurse into their
/// children in the same mode, text and attribute nodes emit their string
/// value, comments and processing instructions produce nothing.
fn builtin_rule(
    ctx: &mut Context<'_>,
    node: &NodeRef,
    mode: Option<&str>,
    tunnel: &Rc<ParameterSet>,
    location: Location,
) -> Result<(), DynamicError> {
    match node.kind() {
        NodeKind::Document | NodeKind::Element => {
            let children = Sequence::from_items(
                node.children().map(Item::Node).collect(),
            );
            apply_rule_sequence(
                ctx,
                children,
                mode,
                PrecedenceWindow::any(),
                Rc::new(ParameterSet::empty()),
                Rc::clone(tunnel),
                location,
            )
        }
        NodeKind::Text | NodeKind::Attribute => {
            ctx.emit(|r| r.characters(&node.string_value(), location, options::NONE))
        }
        NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => Ok(()),
    }
}

/// `apply-imports`: re-matches the current context node against rules of
/// strictly lower import precedence than the current template's.
#[derive(Debug)]
pub struct ApplyImports {
    pub actual_params: Vec<WithParam>,
    pub tunnel_params: Vec<WithParam>,
    pub location: Location,
}

impl ApplyImports {
    pub fn new() -> Self {
        ApplyImports {
            actual_params: Vec::new(),
            tunnel_params: Vec::new(),
            location: Location::UNKNOWN,
        }
    }

    pub fn with_param(mut self, param: WithParam) -> Self {
        self.actual_params.push(param);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl Default for ApplyImports {
    fn default() -> Self {
        Self::new()
    }
}

impl Expression for ApplyImports {
    fn location(&self) -> Location {
        self.location
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        let current = ctx.current_template().cloned().ok_or_else(|| {
            DynamicError::fatal(
                codes::NO_CURRENT_TEMPLATE,
                "apply-imports requires a current template rule",
            )
            .with_location(self.location)
        })?;
        let item = ctx.item().cloned().ok_or_else(|| {
            DynamicError::fatal(codes::ABSENT_CONTEXT_ITEM, "the context item is absent")
                .with_location(self.location)
        })?;
        let node = item.as_node().cloned().ok_or_else(|| {
            DynamicError::fatal(
                codes::TYPE_MISMATCH,
                "apply-imports requires a node as the context item",
            )
            .with_location(self.location)
        })?;

        let window =
            PrecedenceWindow::below(current.min_import_precedence(), current.precedence());
        let mode = ctx.mode().map(str::to_string);
        let local = assemble(&self.actual_params, ctx)?;
        let tunnel = assemble_tunnel(&self.tunnel_params, ctx)?;

        let rule = ctx
            .controller()
            .rules()
            .match_rule(&node, mode.as_deref(), window)
            .map_err(|e| e.with_location(self.location))?;
        match rule {
            Some(template) => {
                // Position and size carry over from the invoking rule.
                let pending = template.apply(
                    ctx,
                    Item::Node(node),
                    ctx.position(),
                    ctx.size(),
                    local,
                    tunnel,
                )?;
                drive(pending).map_err(|e| e.with_location(self.location))
            }
            None => builtin_rule(ctx, &node, mode.as_deref(), &tunnel, self.location),
        }
    }
}
