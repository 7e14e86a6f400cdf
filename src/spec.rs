//! Raw, declarative test descriptions.
//!
//! A [`TestSpec`] is what callers write: a tree of assertions and groups with
//! optional fields, built up with chaining methods. Specs stay inert until
//! [`TestNode::new`](crate::node::TestNode::new) normalizes them into the
//! canonical tree with inheritance resolved.

use crate::check::{Check, CheckOptions};
use crate::fault::{Fault, Throws};
use crate::mappers::Mapper;
use crate::value::Value;
use im::HashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A test body: takes the run context, answers an [`Outcome`].
pub type TestFn = Arc<dyn Fn(&RunContext) -> Outcome + Send + Sync>;

/// A deferred second phase, standing in for an awaited result. The engine
/// measures the time until it answers separately from the synchronous phase.
pub type Deferred = Box<dyn FnOnce(&RunContext) -> Result<Value, Fault> + Send>;

/// A lifecycle hook.
pub type HookFn = Arc<dyn Fn() + Send + Sync>;

/// A deferred name resolver, applied to the test's arguments.
pub type NameFn = Arc<dyn Fn(&[Value]) -> String + Send + Sync>;

/// Where construction-time warnings go.
pub type WarnFn = Arc<dyn Fn(&str) + Send + Sync>;

/// What a test body produced.
pub enum Outcome {
    /// A plain value, compared against the expectation.
    Value(Value),
    /// A raised fault.
    Fault(Fault),
    /// Work that completes later; the engine awaits it and records the
    /// asynchronous completion time.
    Deferred(Deferred),
}

impl Outcome {
    pub fn value(v: impl Into<Value>) -> Self {
        Outcome::Value(v.into())
    }

    pub fn fault(f: Fault) -> Self {
        Outcome::Fault(f)
    }

    pub fn deferred(
        f: impl FnOnce(&RunContext) -> Result<Value, Fault> + Send + 'static,
    ) -> Self {
        Outcome::Deferred(Box::new(f))
    }
}

impl From<Result<Value, Fault>> for Outcome {
    fn from(r: Result<Value, Fault>) -> Self {
        match r {
            Ok(v) => Outcome::Value(v),
            Err(f) => Outcome::Fault(f),
        }
    }
}

/// Best-effort cancellation signal handed to test bodies. The engine sets it
/// when the timeout wins the race; a body that never looks simply keeps
/// running in the background and its result is discarded.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which channel an intercepted message went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Log,
    Warn,
    Error,
}

impl MessageLevel {
    pub fn name(&self) -> &'static str {
        match self {
            MessageLevel::Log => "log",
            MessageLevel::Warn => "warn",
            MessageLevel::Error => "error",
        }
    }
}

/// Console output intercepted during a test body, reattached to the result
/// node that produced it so concurrent tests never interleave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

/// What a running test body sees: its arguments, the cancellation signal, and
/// the intercepted output channel.
pub struct RunContext {
    args: Vec<Value>,
    cancel: CancelToken,
    messages: Mutex<Vec<Message>>,
}

static NIL: Value = Value::Nil;

impl RunContext {
    pub(crate) fn new(args: Vec<Value>, cancel: CancelToken) -> Self {
        Self {
            args,
            cancel,
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The argument at `index`, or Nil past the end.
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&NIL)
    }

    /// The argument at `index` as a number; NaN when missing or non-numeric.
    pub fn number(&self, index: usize) -> f64 {
        self.arg(index).as_number().unwrap_or(f64::NAN)
    }

    /// True once the engine has stopped waiting for this body.
    pub fn cancelled(&self) -> bool {
        self.cancel.is_set()
    }

    pub fn log(&self, text: impl ToString) {
        self.push(MessageLevel::Log, text);
    }

    pub fn warn(&self, text: impl ToString) {
        self.push(MessageLevel::Warn, text);
    }

    pub fn error(&self, text: impl ToString) {
        self.push(MessageLevel::Error, text);
    }

    fn push(&self, level: MessageLevel, text: impl ToString) {
        self.messages.lock().unwrap().push(Message {
            level,
            text: text.to_string(),
        });
    }

    pub(crate) fn into_messages(self) -> Vec<Message> {
        self.messages.into_inner().unwrap_or_default()
    }
}

/// A display name: either a literal or a function of the arguments.
#[derive(Clone)]
pub enum NameSpec {
    Literal(String),
    Derived(NameFn),
}

/// Raw argument forms. A single `arg` becomes a one-element sequence at
/// normalization time.
#[derive(Debug, Clone)]
pub enum ArgsSpec {
    One(Value),
    Many(Vec<Value>),
}

/// A comparator, either ready-made or as options compiled at normalization.
#[derive(Clone)]
pub enum CheckSpec {
    Fn(Check),
    Options(CheckOptions),
}

/// A raw description of one test or group of tests.
///
/// Present fields win over inherited ones; absent fields fall back to the
/// parent's resolved values for the inheritable set. A spec with child
/// `tests` is a group; without, a leaf assertion.
#[derive(Clone, Default)]
pub struct TestSpec {
    pub name: Option<NameSpec>,
    pub id: Option<String>,
    pub description: Option<String>,
    pub args: Option<ArgsSpec>,
    pub run: Option<TestFn>,
    pub setup: Option<HookFn>,
    pub teardown: Option<HookFn>,
    pub expect: Option<Value>,
    pub throws: Option<Throws>,
    pub check: Option<CheckSpec>,
    pub map: Option<Mapper>,
    pub max_time: Option<Duration>,
    pub max_time_async: Option<Duration>,
    pub skip: Option<bool>,
    pub data: HashMap<String, Value>,
    pub before_all: Option<HookFn>,
    pub after_all: Option<HookFn>,
    pub before_each: Option<HookFn>,
    pub after_each: Option<HookFn>,
    pub tests: Vec<TestSpec>,
}

impl TestSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// A group seeded with children.
    pub fn group<I: IntoIterator<Item = TestSpec>>(tests: I) -> Self {
        Self {
            tests: tests.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(NameSpec::Literal(name.into()));
        self
    }

    /// Derive the display name from the arguments at normalization time.
    pub fn name_fn(mut self, f: impl Fn(&[Value]) -> String + Send + Sync + 'static) -> Self {
        self.name = Some(NameSpec::Derived(Arc::new(f)));
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// A single argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args = Some(ArgsSpec::One(value.into()));
        self
    }

    pub fn args<I, T>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.args = Some(ArgsSpec::Many(
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn run(mut self, f: impl Fn(&RunContext) -> Outcome + Send + Sync + 'static) -> Self {
        self.run = Some(Arc::new(f));
        self
    }

    pub fn setup(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.setup = Some(Arc::new(f));
        self
    }

    pub fn teardown(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.teardown = Some(Arc::new(f));
        self
    }

    pub fn expect(mut self, value: impl Into<Value>) -> Self {
        self.expect = Some(value.into());
        self
    }

    pub fn throws(mut self, throws: impl Into<Throws>) -> Self {
        self.throws = Some(throws.into());
        self
    }

    pub fn check_fn(mut self, check: Check) -> Self {
        self.check = Some(CheckSpec::Fn(check));
        self
    }

    pub fn check(mut self, options: CheckOptions) -> Self {
        self.check = Some(CheckSpec::Options(options));
        self
    }

    pub fn map(mut self, mapper: Mapper) -> Self {
        self.map = Some(mapper);
        self
    }

    pub fn max_time(mut self, budget: Duration) -> Self {
        self.max_time = Some(budget);
        self
    }

    pub fn max_time_async(mut self, budget: Duration) -> Self {
        self.max_time_async = Some(budget);
        self
    }

    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn datum(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn before_all(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_all = Some(Arc::new(f));
        self
    }

    pub fn after_all(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.after_all = Some(Arc::new(f));
        self
    }

    pub fn before_each(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_each = Some(Arc::new(f));
        self
    }

    pub fn after_each(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.after_each = Some(Arc::new(f));
        self
    }

    pub fn test(mut self, child: TestSpec) -> Self {
        self.tests.push(child);
        self
    }

    pub fn tests<I: IntoIterator<Item = TestSpec>>(mut self, children: I) -> Self {
        self.tests.extend(children);
        self
    }

    /// True when nothing at all was described.
    pub(crate) fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.args.is_none()
            && self.run.is_none()
            && self.expect.is_none()
            && self.throws.is_none()
            && self.tests.is_empty()
    }
}
