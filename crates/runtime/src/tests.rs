//! Behavioral tests for the execution core: evaluation-strategy agreement,
//! the trampoline, the bindery, parameters, rule dispatch, and recovery.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arbor_model::{
    AtomicValue, DynamicError, DocumentBuilder, ErrorKind, Item, ItemType, Location, NameCode,
    NodeKind, NodeRef, QName, Receiver, Sequence, SequenceIterator, SequenceType,
    SimpleNamePool, SingletonIterator, TextCapture, codes, options,
};

use crate::bindery::{Assign, GlobalVariable};
use crate::context::{Context, SharedReceiver};
use crate::controller::{Controller, LenientPolicy, StrictPolicy};
use crate::executable::{Executable, FunctionId, ProcedureId};
use crate::expr::{
    ContextItemExpr, Expression, GlobalVariableReference, Literal, LocalVariableReference,
    evaluate_to_sequence,
};
use crate::function::{UserFunction, UserFunctionCall};
use crate::instruct::{
    ApplyImports, ApplyTemplates, Block, CallTemplate, Choose, CommentCtor, ComputedAttribute,
    FixedElement, LocalParam, Message, PiCtor, TextLiteral, ValueOf,
};
use crate::param::{ParamId, WithParam};
use crate::rules::BasicRuleSet;
use crate::template::Template;

fn pool() -> Arc<SimpleNamePool> {
    Arc::new(SimpleNamePool::new())
}

fn controller(executable: Executable) -> Controller {
    Controller::new(
        Arc::new(executable),
        pool(),
        Arc::new(BasicRuleSet::new()),
    )
}

fn run_push(controller: &Controller, expr: &dyn Expression) -> Result<String, DynamicError> {
    let capture = Rc::new(RefCell::new(TextCapture::new()));
    let shared: SharedReceiver = capture.clone();
    let mut ctx = controller.new_context(shared, 0);
    expr.process(&mut ctx)?;
    let text = capture.borrow().text().to_string();
    Ok(text)
}

fn text(s: &str) -> Box<dyn Expression> {
    Box::new(TextLiteral::new(s))
}

fn lit_int(i: i64) -> Box<dyn Expression> {
    Box::new(Literal::item(Item::integer(i)))
}

fn lit_bool(b: bool) -> Box<dyn Expression> {
    Box::new(Literal::item(Item::boolean(b)))
}

fn lit_str(s: &str) -> Box<dyn Expression> {
    Box::new(Literal::item(Item::string(s)))
}

fn slot_ref(slot: usize) -> Box<dyn Expression> {
    Box::new(LocalVariableReference::new(QName::local("v"), slot))
}

fn emit_slot(slot: usize) -> Box<dyn Expression> {
    Box::new(ValueOf::new(slot_ref(slot)))
}

/// Wraps an expression and counts how many times it is evaluated.
#[derive(Debug)]
struct Counter {
    hits: Arc<AtomicUsize>,
    inner: Box<dyn Expression>,
}

impl Counter {
    fn new(hits: &Arc<AtomicUsize>, inner: Box<dyn Expression>) -> Box<dyn Expression> {
        Box::new(Counter {
            hits: Arc::clone(hits),
            inner,
        })
    }
}

impl Expression for Counter {
    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.inner.iterate(ctx)
    }

    fn process(&self, ctx: &mut Context<'_>) -> Result<(), DynamicError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.inner.process(ctx)
    }
}

/// Reads a local slot as an integer and adds a constant.
#[derive(Debug)]
struct SlotPlus {
    slot: usize,
    delta: i64,
}

impl Expression for SlotPlus {
    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        let current = ctx
            .frame()
            .get(self.slot)
            .as_item()
            .and_then(|item| item.as_atomic())
            .and_then(|atomic| atomic.as_integer())
            .unwrap_or(0);
        Ok(Box::new(SingletonIterator::new(Item::integer(
            current + self.delta,
        ))))
    }
}

/// Tests a local slot's integer value against a bound.
#[derive(Debug)]
struct SlotLessThan {
    slot: usize,
    than: i64,
}

impl Expression for SlotLessThan {
    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        let current = ctx
            .frame()
            .get(self.slot)
            .as_item()
            .and_then(|item| item.as_atomic())
            .and_then(|atomic| atomic.as_integer())
            .unwrap_or(0);
        Ok(Box::new(SingletonIterator::new(Item::boolean(
            current < self.than,
        ))))
    }
}

/// Evaluates the inner expression's first item as an integer and adds one.
#[derive(Debug)]
struct PlusOne {
    inner: Box<dyn Expression>,
}

impl Expression for PlusOne {
    fn iterate<'a>(
        &'a self,
        ctx: &mut Context<'_>,
    ) -> Result<Box<dyn SequenceIterator + 'a>, DynamicError> {
        let mut iter = self.inner.iterate(ctx)?;
        let value = iter
            .next()?
            .and_then(|item| item.as_atomic().and_then(AtomicValue::as_integer))
            .unwrap_or(0);
        Ok(Box::new(SingletonIterator::new(Item::integer(value + 1))))
    }
}

/// Records every receiver event for inspection.
#[derive(Debug, Default)]
struct RecordingReceiver {
    events: Vec<Event>,
}

#[derive(Debug, PartialEq)]
enum Event {
    Start(NameCode),
    End,
    Attribute(NameCode, String, u32),
    Namespace(String, String),
    Text(String, u32),
    Comment(String, u32),
    Pi(String, String, u32),
}

impl Receiver for RecordingReceiver {
    fn start_element(
        &mut self,
        name: NameCode,
        _location: Location,
        _options: u32,
    ) -> Result<(), DynamicError> {
        self.events.push(Event::Start(name));
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), DynamicError> {
        self.events.push(Event::End);
        Ok(())
    }

    fn attribute(
        &mut self,
        name: NameCode,
        value: &str,
        _location: Location,
        options: u32,
    ) -> Result<(), DynamicError> {
        self.events
            .push(Event::Attribute(name, value.to_string(), options));
        Ok(())
    }

    fn namespace(&mut self, prefix: &str, uri: &str, _options: u32) -> Result<(), DynamicError> {
        self.events
            .push(Event::Namespace(prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn characters(
        &mut self,
        text: &str,
        _location: Location,
        options: u32,
    ) -> Result<(), DynamicError> {
        self.events.push(Event::Text(text.to_string(), options));
        Ok(())
    }

    fn comment(
        &mut self,
        text: &str,
        _location: Location,
        options: u32,
    ) -> Result<(), DynamicError> {
        self.events.push(Event::Comment(text.to_string(), options));
        Ok(())
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        _location: Location,
        options: u32,
    ) -> Result<(), DynamicError> {
        self.events
            .push(Event::Pi(target.to_string(), data.to_string(), options));
        Ok(())
    }
}

fn run_recorded(
    controller: &Controller,
    expr: &dyn Expression,
) -> Result<Vec<Event>, DynamicError> {
    let recorder = Rc::new(RefCell::new(RecordingReceiver::default()));
    let shared: SharedReceiver = recorder.clone();
    let mut ctx = controller.new_context(shared, 0);
    expr.process(&mut ctx)?;
    let events = std::mem::take(&mut recorder.borrow_mut().events);
    Ok(events)
}

mod blocks {
    use super::*;

    #[test]
    fn children_concatenate_in_order() {
        let block = Block::new(vec![text("a"), text("b"), text("c")]);
        let controller = controller(Executable::new());
        assert_eq!(run_push(&controller, &block).unwrap(), "abc");
    }

    #[test]
    fn push_and_iterate_agree() {
        let block = Block::new(vec![lit_str("a"), lit_str("b"), lit_str("c")]);
        let controller = controller(Executable::new());
        let pushed = run_push(&controller, &block).unwrap();

        let capture = Rc::new(RefCell::new(TextCapture::new()));
        let shared: SharedReceiver = capture.clone();
        let mut ctx = controller.new_context(shared, 0);
        let pulled = evaluate_to_sequence(&block, &mut ctx).unwrap();
        assert_eq!(pulled.string_join(""), pushed);
    }

    #[test]
    fn conditional_inside_block_picks_otherwise() {
        // "a", then a conditional whose test fails, then "d".
        let cond = Choose::when(lit_bool(false), text("c")).with_otherwise(text("b"));
        let block = Block::new(vec![text("a"), Box::new(cond), text("d")]);
        let controller = controller(Executable::new());
        assert_eq!(run_push(&controller, &block).unwrap(), "abd");
    }

    #[test]
    fn simplify_collapses_trivial_blocks() {
        assert!(Block::simplify(Vec::new()).is_vacuous());
        let single = Block::simplify(vec![text("x")]);
        let controller = controller(Executable::new());
        assert_eq!(run_push(&controller, single.as_ref()).unwrap(), "x");
    }

    #[test]
    fn empty_children_produce_empty_sequence() {
        let block = Block::new(vec![Box::new(Literal::empty()), Box::new(Literal::empty())]);
        let controller = controller(Executable::new());
        let capture = Rc::new(RefCell::new(TextCapture::new()));
        let shared: SharedReceiver = capture.clone();
        let mut ctx = controller.new_context(shared, 0);
        assert!(evaluate_to_sequence(&block, &mut ctx).unwrap().is_empty());
    }
}

mod conditional {
    use super::*;

    #[test]
    fn first_true_condition_wins_and_later_ones_are_not_evaluated() {
        let c1 = Arc::new(AtomicUsize::new(0));
        let c2 = Arc::new(AtomicUsize::new(0));
        let c3 = Arc::new(AtomicUsize::new(0));
        let a1 = Arc::new(AtomicUsize::new(0));
        let a2 = Arc::new(AtomicUsize::new(0));

        let choose = Choose::new(
            vec![
                Counter::new(&c1, lit_bool(false)),
                Counter::new(&c2, lit_bool(true)),
                Counter::new(&c3, lit_bool(true)),
            ],
            vec![
                Counter::new(&a1, text("x")),
                Counter::new(&a2, text("y")),
                text("z"),
            ],
        );
        let controller = controller(Executable::new());
        assert_eq!(run_push(&controller, &choose).unwrap(), "y");
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
        assert_eq!(c3.load(Ordering::SeqCst), 0);
        assert_eq!(a1.load(Ordering::SeqCst), 0);
        assert_eq!(a2.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_matching_branch_is_a_no_op() {
        let choose = Choose::new(vec![lit_bool(false)], vec![text("x")]);
        let controller = controller(Executable::new());
        assert_eq!(run_push(&controller, &choose).unwrap(), "");
    }
}

mod trampoline {
    use super::*;

    /// Builds a counting template: with $n below `limit` it tail-calls
    /// itself with $n + 1, otherwise it emits $n.
    fn counting_template(limit: i64) -> (Executable, CallTemplate) {
        let id = ParamId(0);
        let body = Block::new(vec![
            Box::new(LocalParam::new(id, QName::local("n"), 0, lit_int(0))),
            Box::new(
                Choose::when(
                    Box::new(SlotLessThan { slot: 0, than: limit }),
                    Box::new(CallTemplate::new(ProcedureId(0)).with_param(WithParam::new(
                        id,
                        QName::local("n"),
                        Box::new(SlotPlus { slot: 0, delta: 1 }),
                    ))),
                )
                .with_otherwise(emit_slot(0)),
            ),
        ]);
        let mut executable = Executable::new();
        executable.add_procedure(Arc::new(
            Template::new(Box::new(body), 1).with_name(QName::local("count")),
        ));
        let call = CallTemplate::new(ProcedureId(0)).with_param(WithParam::new(
            id,
            QName::local("n"),
            lit_int(0),
        ));
        (executable, call)
    }

    #[test]
    fn deep_tail_recursion_stays_within_native_stack() {
        let (executable, call) = counting_template(100_000);
        let controller = controller(executable);
        assert_eq!(run_push(&controller, &call).unwrap(), "100000");
    }

    #[test]
    fn non_tail_invocation_still_completes() {
        let (executable, call) = counting_template(50);
        let call = call.without_tail_calls();
        let controller = controller(executable);
        assert_eq!(run_push(&controller, &call).unwrap(), "50");
    }

    #[test]
    fn template_location_decorates_errors() {
        let loc = Location::new(1, 5);
        let body = ValueOf::new(Box::new(ContextItemExpr::new()));
        let mut executable = Executable::new();
        executable.add_procedure(Arc::new(
            Template::new(Box::new(body), 0).with_location(loc),
        ));
        let controller = controller(executable);
        // No principal root, so the context item is absent.
        let err = run_push(&controller, &CallTemplate::new(ProcedureId(0))).unwrap_err();
        assert_eq!(err.code, codes::ABSENT_CONTEXT_ITEM);
        assert_eq!(err.location, Some(loc));
    }

    #[test]
    fn inner_location_is_never_overwritten() {
        let inner = Location::new(2, 7);
        let body = ValueOf::new(Box::new(ContextItemExpr {
            location: inner,
        }));
        let mut executable = Executable::new();
        executable.add_procedure(Arc::new(
            Template::new(Box::new(body), 0).with_location(Location::new(1, 5)),
        ));
        let controller = controller(executable);
        let err = run_push(&controller, &CallTemplate::new(ProcedureId(0))).unwrap_err();
        assert_eq!(err.location, Some(inner));
    }
}

mod globals {
    use super::*;

    fn x() -> QName {
        QName::local("x")
    }

    #[test]
    fn global_is_evaluated_once_per_run() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut executable = Executable::new();
        executable.add_global(GlobalVariable::variable(
            0,
            x(),
            Counter::new(&hits, lit_int(42)),
        ));
        let executable = Arc::new(executable);

        let controller =
            Controller::new(Arc::clone(&executable), pool(), Arc::new(BasicRuleSet::new()));
        let reference = GlobalVariableReference::new(x(), 0);
        let first = run_push(&controller, &ValueOf::new(Box::new(reference))).unwrap();
        let reference = GlobalVariableReference::new(x(), 0);
        let second = run_push(&controller, &ValueOf::new(Box::new(reference))).unwrap();
        assert_eq!(first, "42");
        assert_eq!(second, "42");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A fresh controller means a fresh bindery, so the initializer runs
        // again.
        let fresh = Controller::new(executable, pool(), Arc::new(BasicRuleSet::new()));
        let reference = GlobalVariableReference::new(x(), 0);
        run_push(&fresh, &ValueOf::new(Box::new(reference))).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn direct_circularity_is_detected_without_overflow() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut executable = Executable::new();
        // $x = $x + 1
        executable.add_global(GlobalVariable::variable(
            0,
            x(),
            Counter::new(
                &hits,
                Box::new(PlusOne {
                    inner: Box::new(GlobalVariableReference::new(x(), 0)),
                }),
            ),
        ));
        let controller = controller(executable);

        let err = run_push(
            &controller,
            &ValueOf::new(Box::new(GlobalVariableReference::new(x(), 0))),
        )
        .unwrap_err();
        assert!(err.is_circularity());
        assert_eq!(err.code, codes::CIRCULAR_DEFINITION);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The busy flag is cleared on failure, so a second attempt fails the
        // same way rather than seeing a stale flag.
        let err = run_push(
            &controller,
            &ValueOf::new(Box::new(GlobalVariableReference::new(x(), 0))),
        )
        .unwrap_err();
        assert!(err.is_circularity());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn transitive_circularity_is_detected() {
        let y = QName::local("y");
        let mut executable = Executable::new();
        executable.add_global(GlobalVariable::variable(
            0,
            x(),
            Box::new(PlusOne {
                inner: Box::new(GlobalVariableReference::new(y.clone(), 1)),
            }),
        ));
        executable.add_global(GlobalVariable::variable(
            1,
            y,
            Box::new(PlusOne {
                inner: Box::new(GlobalVariableReference::new(x(), 0)),
            }),
        ));
        let controller = controller(executable);
        let err = run_push(
            &controller,
            &ValueOf::new(Box::new(GlobalVariableReference::new(x(), 0))),
        )
        .unwrap_err();
        assert!(err.is_circularity());
    }

    #[test]
    fn supplied_parameter_overrides_default_and_converts() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut executable = Executable::new();
        executable.add_global(
            GlobalVariable::parameter(0, x(), Counter::new(&hits, lit_int(9)))
                .with_required_type(SequenceType::single(ItemType::Integer)),
        );
        let controller = controller(executable)
            .with_supplied_parameter(x(), Sequence::one(Item::string("5")));

        let capture = Rc::new(RefCell::new(TextCapture::new()));
        let shared: SharedReceiver = capture.clone();
        let ctx = controller.new_context(shared, 0);
        let binding = controller.executable().global(0).unwrap();
        let value = controller.bindery().evaluate(&binding, &ctx).unwrap();
        assert_eq!(value.items(), &[Item::integer(5)]);
        // The default initializer never ran.
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn required_parameter_must_be_supplied() {
        let mut executable = Executable::new();
        executable.add_global(
            GlobalVariable::parameter(0, x(), lit_int(0)).with_required(true),
        );
        let controller = controller(executable);
        let err = run_push(
            &controller,
            &ValueOf::new(Box::new(GlobalVariableReference::new(x(), 0))),
        )
        .unwrap_err();
        assert_eq!(err.code, codes::REQUIRED_GLOBAL_PARAM);
    }

    #[test]
    fn default_failing_required_type_is_a_type_error() {
        let mut executable = Executable::new();
        executable.add_global(
            GlobalVariable::parameter(0, x(), lit_str("not-a-number"))
                .with_required_type(SequenceType::single(ItemType::Integer)),
        );
        let controller = controller(executable);
        let err = run_push(
            &controller,
            &ValueOf::new(Box::new(GlobalVariableReference::new(x(), 0))),
        )
        .unwrap_err();
        assert_eq!(err.code, codes::PARAM_TYPE_MISMATCH);
    }

    #[test]
    fn assign_overwrites_a_slot() {
        let mut executable = Executable::new();
        executable.add_global(GlobalVariable::variable(0, x(), lit_int(1)));
        let controller = controller(executable);
        let assign = Assign {
            slot: 0,
            select: lit_int(7),
            location: Location::UNKNOWN,
        };
        run_push(&controller, &assign).unwrap();
        assert_eq!(
            controller.bindery().get(0),
            Some(Sequence::one(Item::integer(7)))
        );
    }

    #[test]
    fn assign_only_template_body_still_assigns() {
        let mut executable = Executable::new();
        executable.add_global(GlobalVariable::variable(0, x(), lit_int(1)));
        let body = Assign {
            slot: 0,
            select: lit_int(7),
            location: Location::UNKNOWN,
        };
        let target = executable.add_procedure(Arc::new(Template::new(Box::new(body), 0)));
        let controller = controller(executable);
        run_push(&controller, &CallTemplate::new(target)).unwrap();
        assert_eq!(
            controller.bindery().get(0),
            Some(Sequence::one(Item::integer(7)))
        );
    }
}

mod params {
    use super::*;

    fn param_template(param: LocalParam) -> Executable {
        let body = Block::new(vec![Box::new(param), emit_slot(0)]);
        let mut executable = Executable::new();
        executable.add_procedure(Arc::new(Template::new(Box::new(body), 1)));
        executable
    }

    #[test]
    fn missing_required_parameter_fails() {
        let executable = param_template(
            LocalParam::new(ParamId(0), QName::local("p"), 0, lit_int(0)).with_required(true),
        );
        let controller = controller(executable);
        let err = run_push(&controller, &CallTemplate::new(ProcedureId(0))).unwrap_err();
        assert_eq!(err.code, codes::REQUIRED_LOCAL_PARAM);
    }

    #[test]
    fn supplied_value_skips_the_default() {
        let hits = Arc::new(AtomicUsize::new(0));
        let executable = param_template(LocalParam::new(
            ParamId(0),
            QName::local("p"),
            0,
            Counter::new(&hits, lit_int(9)),
        ));
        let controller = controller(executable);
        let call = CallTemplate::new(ProcedureId(0)).with_param(WithParam::new(
            ParamId(0),
            QName::local("p"),
            lit_int(3),
        ));
        assert_eq!(run_push(&controller, &call).unwrap(), "3");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsupplied_parameter_evaluates_the_default() {
        let executable =
            param_template(LocalParam::new(ParamId(0), QName::local("p"), 0, lit_int(9)));
        let controller = controller(executable);
        assert_eq!(
            run_push(&controller, &CallTemplate::new(ProcedureId(0))).unwrap(),
            "9"
        );
    }

    #[test]
    fn supplied_value_is_converted_to_the_required_type() {
        let executable = param_template(
            LocalParam::new(ParamId(0), QName::local("p"), 0, lit_int(0))
                .with_required_type(SequenceType::single(ItemType::Integer)),
        );
        let controller = controller(executable);
        let call = CallTemplate::new(ProcedureId(0)).with_param(WithParam::new(
            ParamId(0),
            QName::local("p"),
            lit_str("5"),
        ));
        assert_eq!(run_push(&controller, &call).unwrap(), "5");
    }

    #[test]
    fn unconvertible_supplied_value_fails() {
        let executable = param_template(
            LocalParam::new(ParamId(0), QName::local("p"), 0, lit_int(0))
                .with_required_type(SequenceType::single(ItemType::Integer)),
        );
        let controller = controller(executable);
        let call = CallTemplate::new(ProcedureId(0)).with_param(WithParam::new(
            ParamId(0),
            QName::local("p"),
            lit_str("abc"),
        ));
        let err = run_push(&controller, &call).unwrap_err();
        assert_eq!(err.code, codes::PARAM_TYPE_MISMATCH);
    }

    #[test]
    fn tunnel_parameters_pass_through_unaware_templates() {
        let id = ParamId(7);
        // Innermost template declares the tunnel parameter.
        let inner_body = Block::new(vec![
            Box::new(
                LocalParam::new(id, QName::local("depth"), 0, lit_str("missing"))
                    .with_tunnel(true),
            ),
            emit_slot(0),
        ]);
        let mut executable = Executable::new();
        let inner = executable.add_procedure(Arc::new(Template::new(Box::new(inner_body), 1)));
        // Two intermediate templates that know nothing about the parameter.
        let mid = executable
            .add_procedure(Arc::new(Template::new(Box::new(CallTemplate::new(inner)), 0)));
        let outer = executable
            .add_procedure(Arc::new(Template::new(Box::new(CallTemplate::new(mid)), 0)));

        let controller = controller(executable);
        let call = CallTemplate::new(outer).with_tunnel_param(WithParam::new(
            id,
            QName::local("depth"),
            lit_str("deep"),
        ));
        assert_eq!(run_push(&controller, &call).unwrap(), "deep");
    }

    #[test]
    fn tunnel_values_are_invisible_to_ordinary_params() {
        let id = ParamId(7);
        let body = Block::new(vec![
            // Not marked tunnel, so the tunnel value must not bind here.
            Box::new(LocalParam::new(id, QName::local("depth"), 0, lit_str("default"))),
            emit_slot(0),
        ]);
        let mut executable = Executable::new();
        let target = executable.add_procedure(Arc::new(Template::new(Box::new(body), 1)));
        let controller = controller(executable);
        let call = CallTemplate::new(target).with_tunnel_param(WithParam::new(
            id,
            QName::local("depth"),
            lit_str("deep"),
        ));
        assert_eq!(run_push(&controller, &call).unwrap(), "default");
    }
}

mod apply {
    use super::*;

    fn item_doc() -> NodeRef {
        let mut b = DocumentBuilder::new();
        b.start_element(QName::local("doc"))
            .start_element(QName::local("item"))
            .text("one")
            .end_element()
            .text("-")
            .start_element(QName::local("item"))
            .text("two")
            .end_element()
            .end_element();
        b.build()
    }

    fn is_item(node: &NodeRef) -> bool {
        node.kind() == NodeKind::Element
            && node.name().is_some_and(|name| name.local == "item")
    }

    #[test]
    fn builtin_rules_walk_the_tree() {
        let root = item_doc();
        let controller = controller(Executable::new());
        let apply = ApplyTemplates::new(Box::new(Literal::item(Item::Node(root))));
        assert_eq!(run_push(&controller, &apply).unwrap(), "one-two");
    }

    #[test]
    fn matching_rule_fires_instead_of_builtin() {
        let root = item_doc();
        let template = Arc::new(Template::new(
            Box::new(Block::new(vec![
                text("["),
                Box::new(ValueOf::new(Box::new(ContextItemExpr::new()))),
                text("]"),
            ])),
            0,
        ));
        let mut rules = BasicRuleSet::new();
        rules.add_rule(is_item, None, template);

        let controller = Controller::new(Arc::new(Executable::new()), pool(), Arc::new(rules));
        let apply = ApplyTemplates::new(Box::new(Literal::item(Item::Node(root))));
        assert_eq!(run_push(&controller, &apply).unwrap(), "[one]-[two]");
    }

    #[test]
    fn apply_imports_dispatches_to_lower_precedence() {
        let root = item_doc();
        let low = Arc::new(
            Template::new(
                Box::new(Block::new(vec![
                    text("low:"),
                    Box::new(ValueOf::new(Box::new(ContextItemExpr::new()))),
                ])),
                0,
            )
            .with_precedence(1, 0),
        );
        let high = Arc::new(
            Template::new(
                Box::new(Block::new(vec![
                    text("<"),
                    Box::new(ApplyImports::new()),
                    text(">"),
                ])),
                0,
            )
            .with_precedence(2, 0),
        );
        let mut rules = BasicRuleSet::new();
        rules.add_rule(is_item, None, low);
        rules.add_rule(is_item, None, high);

        let controller = Controller::new(Arc::new(Executable::new()), pool(), Arc::new(rules));
        let apply = ApplyTemplates::new(Box::new(Literal::item(Item::Node(root))));
        assert_eq!(
            run_push(&controller, &apply).unwrap(),
            "<low:one>-<low:two>"
        );
    }

    #[test]
    fn apply_imports_falls_back_to_builtin_rules() {
        let root = item_doc();
        // The only rule sits at precedence 0, so the import window is empty
        // and the builtin rule (string value of children) takes over.
        let high = Arc::new(Template::new(
            Box::new(Block::new(vec![
                text("("),
                Box::new(ApplyImports::new()),
                text(")"),
            ])),
            0,
        ));
        let mut rules = BasicRuleSet::new();
        rules.add_rule(is_item, None, high);

        let controller = Controller::new(Arc::new(Executable::new()), pool(), Arc::new(rules));
        let apply = ApplyTemplates::new(Box::new(Literal::item(Item::Node(root))));
        assert_eq!(run_push(&controller, &apply).unwrap(), "(one)-(two)");
    }

    #[test]
    fn apply_imports_requires_a_current_template() {
        let controller = controller(Executable::new());
        let err = run_push(&controller, &ApplyImports::new()).unwrap_err();
        assert_eq!(err.code, codes::NO_CURRENT_TEMPLATE);
    }

    #[test]
    fn atomic_items_emit_their_string_value() {
        let controller = controller(Executable::new());
        let apply = ApplyTemplates::new(Box::new(Literal::new(Sequence::from_items(vec![
            Item::integer(1),
            Item::string("x"),
        ]))));
        assert_eq!(run_push(&controller, &apply).unwrap(), "1x");
    }

    #[test]
    fn mode_restricts_matching() {
        let root = item_doc();
        let template = Arc::new(Template::new(text("matched"), 0).with_mode("special"));
        let mut rules = BasicRuleSet::new();
        rules.add_rule(is_item, Some("special"), template);
        let controller = Controller::new(Arc::new(Executable::new()), pool(), Arc::new(rules));

        // Unnamed mode: no rule matches, builtin rules walk the tree.
        let apply = ApplyTemplates::new(Box::new(Literal::item(Item::Node(root.clone()))));
        assert_eq!(run_push(&controller, &apply).unwrap(), "one-two");

        // The builtin walk stays in the mode, so the text child between the
        // two items still comes through.
        let apply = ApplyTemplates::new(Box::new(Literal::item(Item::Node(root))))
            .with_mode("special");
        assert_eq!(run_push(&controller, &apply).unwrap(), "matched-matched");
    }
}

mod functions {
    use super::*;

    fn call_in_context<R>(
        controller: &Controller,
        f: impl FnOnce(&mut Context<'_>) -> R,
    ) -> R {
        let capture = Rc::new(RefCell::new(TextCapture::new()));
        let shared: SharedReceiver = capture.clone();
        let mut ctx = controller.new_context(shared, 0);
        f(&mut ctx)
    }

    #[test]
    fn function_result_is_the_collected_sequence() {
        let body = Block::new(vec![emit_slot(0), text("!")]);
        let function = Arc::new(UserFunction::new(
            QName::local("greet"),
            Box::new(body),
            1,
            1,
        ));
        let mut executable = Executable::new();
        let id = executable.add_function(Arc::clone(&function));
        let controller = controller(executable);

        let result = call_in_context(&controller, |ctx| {
            function.call(ctx, id, vec![Sequence::one(Item::string("hi"))])
        })
        .unwrap();
        assert_eq!(result.string_join(""), "hi!");
    }

    #[test]
    fn memoized_function_body_runs_once_per_argument_key() {
        let hits = Arc::new(AtomicUsize::new(0));
        let body = Counter::new(&hits, emit_slot(0));
        let function = Arc::new(
            UserFunction::new(QName::local("f"), body, 1, 1).with_memoize(true),
        );
        let mut executable = Executable::new();
        let id = executable.add_function(Arc::clone(&function));
        let controller = controller(executable);

        call_in_context(&controller, |ctx| {
            let arg = || vec![Sequence::one(Item::string("a"))];
            function.call(ctx, id, arg()).unwrap();
            function.call(ctx, id, arg()).unwrap();
            function
                .call(ctx, id, vec![Sequence::one(Item::string("b"))])
                .unwrap();
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn equal_lexical_forms_of_different_types_key_separately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let body = Counter::new(&hits, emit_slot(0));
        let function = Arc::new(
            UserFunction::new(QName::local("f"), body, 1, 1).with_memoize(true),
        );
        let mut executable = Executable::new();
        let id = executable.add_function(Arc::clone(&function));
        let controller = controller(executable);

        call_in_context(&controller, |ctx| {
            function
                .call(ctx, id, vec![Sequence::one(Item::integer(1))])
                .unwrap();
            function
                .call(ctx, id, vec![Sequence::one(Item::string("1"))])
                .unwrap();
            function
                .call(
                    ctx,
                    id,
                    vec![Sequence::one(Item::Atomic(AtomicValue::Untyped("1".into())))],
                )
                .unwrap();
            // Same type and lexical form as the first call: cached.
            function
                .call(ctx, id, vec![Sequence::one(Item::integer(1))])
                .unwrap();
        });
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn node_arguments_are_never_memoized() {
        let hits = Arc::new(AtomicUsize::new(0));
        let body = Counter::new(&hits, emit_slot(0));
        let function = Arc::new(
            UserFunction::new(QName::local("f"), body, 1, 1).with_memoize(true),
        );
        let mut executable = Executable::new();
        let id = executable.add_function(Arc::clone(&function));
        let controller = controller(executable);

        let mut b = DocumentBuilder::new();
        b.start_element(QName::local("n")).text("v").end_element();
        let node = b.build();

        call_in_context(&controller, |ctx| {
            let arg = || vec![Sequence::one(Item::Node(node.clone()))];
            function.call(ctx, id, arg()).unwrap();
            function.call(ctx, id, arg()).unwrap();
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tail_recursive_function_runs_in_bounded_stack() {
        // f($n) = if $n < 50000 then f($n + 1) else $n
        let body = Choose::when(
            Box::new(SlotLessThan {
                slot: 0,
                than: 50_000,
            }),
            Box::new(
                UserFunctionCall::new(
                    FunctionId(0),
                    vec![Box::new(SlotPlus { slot: 0, delta: 1 })],
                )
                .as_tail_call(),
            ),
        )
        .with_otherwise(emit_slot(0));
        let function = Arc::new(UserFunction::new(
            QName::local("f"),
            Box::new(body),
            1,
            1,
        ));
        let mut executable = Executable::new();
        let id = executable.add_function(Arc::clone(&function));
        let controller = controller(executable);

        let result = call_in_context(&controller, |ctx| {
            function.call(ctx, id, vec![Sequence::one(Item::integer(0))])
        })
        .unwrap();
        assert_eq!(result.string_join(""), "50000");
    }

    #[test]
    fn function_call_expression_yields_the_result_sequence() {
        let body = Block::new(vec![text("a"), text("b")]);
        let mut executable = Executable::new();
        let id = executable.add_function(Arc::new(UserFunction::new(
            QName::local("f"),
            Box::new(body),
            0,
            0,
        )));
        let controller = controller(executable);
        let call = UserFunctionCall::new(id, Vec::new());
        assert_eq!(run_push(&controller, &call).unwrap(), "ab");
    }
}

mod recovery {
    use super::*;

    #[test]
    fn comment_content_is_repaired_under_lenient_policy() {
        let controller =
            controller(Executable::new()).with_policy(Box::new(LenientPolicy));
        let ctor = CommentCtor::new(lit_str("a--b-"));
        let events = run_recorded(&controller, &ctor).unwrap();
        assert_eq!(
            events,
            vec![Event::Comment("a- -b- ".to_string(), options::REPAIRED)]
        );
    }

    #[test]
    fn comment_content_is_an_error_under_strict_policy() {
        let controller = controller(Executable::new()).with_policy(Box::new(StrictPolicy));
        let ctor = CommentCtor::new(lit_str("a--b"));
        let err = run_push(&controller, &ctor).unwrap_err();
        assert_eq!(err.code, codes::BAD_COMMENT_CONTENT);
        // The recoverable error is escalated when the policy declines.
        assert_eq!(err.kind, ErrorKind::Fatal);
    }

    #[test]
    fn well_formed_comment_is_untouched() {
        let controller = controller(Executable::new());
        let ctor = CommentCtor::new(lit_str("fine"));
        let events = run_recorded(&controller, &ctor).unwrap();
        assert_eq!(events, vec![Event::Comment("fine".to_string(), options::NONE)]);
    }

    #[test]
    fn bad_computed_attribute_name_is_skipped_under_lenient_policy() {
        let controller =
            controller(Executable::new()).with_policy(Box::new(LenientPolicy));
        let ctor = ComputedAttribute::new(lit_str("1bad"), lit_str("v"));
        let events = run_recorded(&controller, &ctor).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn bad_computed_attribute_name_fails_under_strict_policy() {
        let controller = controller(Executable::new());
        let ctor = ComputedAttribute::new(lit_str("1bad"), lit_str("v"));
        let err = run_push(&controller, &ctor).unwrap_err();
        assert_eq!(err.code, codes::BAD_ATTRIBUTE_NAME);
    }

    #[test]
    fn pi_data_is_repaired_under_lenient_policy() {
        let controller =
            controller(Executable::new()).with_policy(Box::new(LenientPolicy));
        let ctor = PiCtor::new(lit_str("target"), lit_str("a?>b"));
        let events = run_recorded(&controller, &ctor).unwrap();
        assert_eq!(
            events,
            vec![Event::Pi(
                "target".to_string(),
                "a? >b".to_string(),
                options::REPAIRED
            )]
        );
    }

    #[test]
    fn termination_bypasses_the_lenient_policy() {
        let controller =
            controller(Executable::new()).with_policy(Box::new(LenientPolicy));
        let message = Message::new(lit_str("stop here")).with_terminate(true);
        let err = run_push(&controller, &message).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Termination);
        assert_eq!(err.code, codes::TERMINATED);
        assert!(err.is_termination());
    }

    #[test]
    fn terminate_only_template_body_still_terminates() {
        // The body produces no output, but it must still run.
        let body = Message::new(lit_str("halt")).with_terminate(true);
        let mut executable = Executable::new();
        let target = executable.add_procedure(Arc::new(Template::new(Box::new(body), 0)));
        let controller = controller(executable);
        let err = run_push(&controller, &CallTemplate::new(target)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Termination);
    }

    #[test]
    fn plain_message_does_not_interrupt_evaluation() {
        let controller = controller(Executable::new());
        let block = Block::new(vec![
            text("a"),
            Box::new(Message::new(lit_str("just logging"))),
            text("b"),
        ]);
        assert_eq!(run_push(&controller, &block).unwrap(), "ab");
    }
}

mod adapters {
    use super::*;

    #[test]
    fn push_native_element_constructor_iterates_to_a_node_item() {
        let ctor = FixedElement::new(QName::local("out"), text("x"));
        let controller = controller(Executable::new());
        let capture = Rc::new(RefCell::new(TextCapture::new()));
        let shared: SharedReceiver = capture.clone();
        let mut ctx = controller.new_context(shared, 0);

        let seq = evaluate_to_sequence(&ctor, &mut ctx).unwrap();
        assert_eq!(seq.len(), 1);
        let node = seq.items()[0].as_node().expect("node item");
        assert_eq!(node.kind(), NodeKind::Element);
        assert_eq!(node.name().unwrap().local, "out");
        assert_eq!(node.string_value(), "x");
        // The buffering detour must not leak into the real output.
        assert_eq!(capture.borrow().text(), "");
    }

    #[test]
    fn evaluate_item_returns_the_first_item() {
        let block = Block::new(vec![lit_str("first"), lit_str("second")]);
        let controller = controller(Executable::new());
        let capture = Rc::new(RefCell::new(TextCapture::new()));
        let shared: SharedReceiver = capture.clone();
        let mut ctx = controller.new_context(shared, 0);
        let item = block.evaluate_item(&mut ctx).unwrap();
        assert_eq!(item, Some(Item::string("first")));
    }

    #[test]
    fn value_of_joins_with_separator() {
        let select = Box::new(Literal::new(Sequence::from_items(vec![
            Item::integer(1),
            Item::integer(2),
            Item::integer(3),
        ])));
        let value_of = ValueOf::new(select).with_separator(", ");
        let controller = controller(Executable::new());
        assert_eq!(run_push(&controller, &value_of).unwrap(), "1, 2, 3");
    }

    #[test]
    fn element_events_nest_well_formed() {
        let ctor = FixedElement::new(
            QName::local("outer"),
            Box::new(FixedElement::new(QName::local("inner"), text("x"))),
        );
        let controller = controller(Executable::new());
        let events = run_recorded(&controller, &ctor).unwrap();
        let outer = controller.pool().allocate(&QName::local("outer"));
        let inner = controller.pool().allocate(&QName::local("inner"));
        assert_eq!(
            events,
            vec![
                Event::Start(outer),
                Event::Start(inner),
                Event::Text("x".to_string(), options::NONE),
                Event::End,
                Event::End,
            ]
        );
    }
}
