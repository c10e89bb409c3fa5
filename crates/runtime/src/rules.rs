//! Template rule matching: modes, precedence windows, and a basic
//! pattern-driven rule set.
//!
//! The matcher seam keeps the execution core independent of pattern
//! compilation: `apply-templates` asks for the best rule for a node in a
//! mode within a precedence window, and `apply-imports` narrows the window
//! to rules of strictly lower import precedence than the current one.

use std::fmt;
use std::sync::Arc;

use arbor_model::{DynamicError, NodeRef};

use crate::template::Template;

/// An inclusive import-precedence range a rule search is confined to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecedenceWindow {
    pub min: u32,
    pub max: u32,
}

impl PrecedenceWindow {
    /// The unconstrained window.
    pub fn any() -> Self {
        PrecedenceWindow {
            min: 0,
            max: u32::MAX,
        }
    }

    /// The window `apply-imports` searches: rules imported below the
    /// current template's module, i.e. precedence in
    /// `[min_import, current - 1]`. Empty when the current template sits
    /// at precedence 0.
    pub fn below(min_import: u32, current: u32) -> Self {
        match current.checked_sub(1) {
            Some(max) => PrecedenceWindow {
                min: min_import,
                max,
            },
            None => PrecedenceWindow { min: 1, max: 0 },
        }
    }

    pub fn contains(&self, precedence: u32) -> bool {
        self.min <= precedence && precedence <= self.max
    }
}

/// Finds the template rule to fire for a node.
pub trait RuleMatcher: Send + Sync + fmt::Debug {
    /// The best matching rule for `node` in `mode` whose import precedence
    /// lies inside `window`, or `None` when only a builtin rule applies.
    fn match_rule(
        &self,
        node: &NodeRef,
        mode: Option<&str>,
        window: PrecedenceWindow,
    ) -> Result<Option<Arc<Template>>, DynamicError>;
}

type Pattern = Box<dyn Fn(&NodeRef) -> bool + Send + Sync>;

struct Rule {
    pattern: Pattern,
    mode: Option<String>,
    template: Arc<Template>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("mode", &self.mode)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

/// A rule set over boxed node predicates. Conflicts resolve by import
/// precedence, then declared priority, then declaration order (last wins).
#[derive(Debug, Default)]
pub struct BasicRuleSet {
    rules: Vec<Rule>,
}

impl BasicRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(
        &mut self,
        pattern: impl Fn(&NodeRef) -> bool + Send + Sync + 'static,
        mode: Option<&str>,
        template: Arc<Template>,
    ) {
        self.rules.push(Rule {
            pattern: Box::new(pattern),
            mode: mode.map(str::to_string),
            template,
        });
    }
}

impl RuleMatcher for BasicRuleSet {
    fn match_rule(
        &self,
        node: &NodeRef,
        mode: Option<&str>,
        window: PrecedenceWindow,
    ) -> Result<Option<Arc<Template>>, DynamicError> {
        let mut best: Option<&Rule> = None;
        for rule in &self.rules {
            if rule.mode.as_deref() != mode {
                continue;
            }
            if !window.contains(rule.template.precedence()) {
                continue;
            }
            if !(rule.pattern)(node) {
                continue;
            }
            let wins = match best {
                None => true,
                Some(current) => {
                    let (p, q) = (rule.template.precedence(), current.template.precedence());
                    p > q
                        || (p == q && rule.template.priority() >= current.template.priority())
                }
            };
            if wins {
                best = Some(rule);
            }
        }
        Ok(best.map(|rule| Arc::clone(&rule.template)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_window_is_empty_at_precedence_zero() {
        let window = PrecedenceWindow::below(0, 0);
        assert!(!window.contains(0));
        assert!(!window.contains(1));
    }

    #[test]
    fn below_window_excludes_current_level() {
        let window = PrecedenceWindow::below(1, 3);
        assert!(window.contains(1));
        assert!(window.contains(2));
        assert!(!window.contains(3));
    }

    #[test]
    fn any_window_contains_everything() {
        assert!(PrecedenceWindow::any().contains(0));
        assert!(PrecedenceWindow::any().contains(u32::MAX));
    }
}
