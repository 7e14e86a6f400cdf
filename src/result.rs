//! Execution and aggregation.
//!
//! A [`ResultNode`] tree mirrors the test tree one-to-one for a single run.
//! Leaves race their body against a timeout and evaluate the outcome under
//! the policies their test declares; completion notifications walk the parent
//! chain directly, every ancestor accumulating statistics independently until
//! its own `pending` count reaches zero and its `finish` latch fires. A
//! failing subtree never aborts its siblings.

use crate::fault::{Fault, Throws};
use crate::mappers::Mapper;
use crate::node::{Policy, TestNode};
use crate::runner::{EventKind, RunEvent, RunOptions};
use crate::spec::{CancelToken, Message, Outcome, RunContext};
use crate::value::{stringify, Value};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a test gets to run before the engine stops waiting for it. For
/// result- and throws-based tests a declared `max_time` replaces this; for
/// time-based tests `max_time` is the pass criterion, not the abort budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Values longer than this (stringified) push the failure diff onto separate
/// lines.
const INLINE_DIFF_LIMIT: usize = 40;

/// Aggregate counters, meaningful on group nodes. `total` is the leaf count
/// of the subtree; `pending` starts there and reaches zero exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub pass: usize,
    pub fail: usize,
    pub skipped: usize,
    pub total: usize,
    pub pending: usize,
    pub messages: usize,
    #[serde(skip)]
    initialized: bool,
}

impl Stats {
    /// Every leaf settled without a failure.
    pub fn is_success(&self) -> bool {
        self.fail == 0 && self.pending == 0
    }

    /// All leaves have reported.
    pub fn is_settled(&self) -> bool {
        self.initialized && self.pending == 0
    }
}

#[derive(Default)]
pub(crate) struct RunState {
    pub(crate) pass: Option<bool>,
    pub(crate) details: Vec<String>,
    pub(crate) actual: Option<Value>,
    pub(crate) error: Option<Fault>,
    pub(crate) mapped: Option<(Value, Value)>,
    pub(crate) time_taken: Duration,
    pub(crate) time_taken_async: Option<Duration>,
    pub(crate) messages: Vec<Message>,
}

#[derive(Default)]
struct FinishLatch {
    fired: Mutex<bool>,
    cv: Condvar,
}

impl FinishLatch {
    fn fire(&self) -> bool {
        let mut fired = self.fired.lock().unwrap();
        if *fired {
            false
        } else {
            *fired = true;
            self.cv.notify_all();
            true
        }
    }

    fn wait(&self) {
        let mut fired = self.fired.lock().unwrap();
        while !*fired {
            fired = self.cv.wait(fired).unwrap();
        }
    }

    fn is_fired(&self) -> bool {
        *self.fired.lock().unwrap()
    }
}

/// What a leaf's body thread reports back across the timeout race.
struct BodyReport {
    actual: Option<Value>,
    error: Option<Fault>,
    time_taken: Duration,
    time_taken_async: Option<Duration>,
    messages: Vec<Message>,
}

/// Snapshot of a settled leaf, carried up the parent chain.
struct DoneInfo {
    is_test: bool,
    skipped: bool,
    pass: Option<bool>,
    messages: usize,
    time_taken: Duration,
    time_taken_async: Option<Duration>,
}

/// The per-run, mutable counterpart of a [`TestNode`].
pub struct ResultNode {
    me: Weak<ResultNode>,
    test: Arc<TestNode>,
    parent: Weak<ResultNode>,
    options: RunOptions,
    pub(crate) state: Mutex<RunState>,
    stats: Mutex<Stats>,
    children: Mutex<Vec<Arc<ResultNode>>>,
    finish: FinishLatch,
    orchestration: Mutex<Option<JoinHandle<()>>>,
}

impl ResultNode {
    pub fn root(test: Arc<TestNode>, options: RunOptions) -> Arc<Self> {
        Self::with_parent(test, Weak::new(), options)
    }

    fn child(test: Arc<TestNode>, parent: &Arc<Self>, options: RunOptions) -> Arc<Self> {
        Self::with_parent(test, Arc::downgrade(parent), options)
    }

    fn with_parent(test: Arc<TestNode>, parent: Weak<Self>, options: RunOptions) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            test,
            parent,
            options,
            state: Mutex::new(RunState::default()),
            stats: Mutex::new(Stats::default()),
            children: Mutex::new(Vec::new()),
            finish: FinishLatch::default(),
            orchestration: Mutex::new(None),
        })
    }

    fn arc(&self) -> Arc<Self> {
        self.me.upgrade().expect("result node outlived its owner")
    }

    pub fn test(&self) -> &Arc<TestNode> {
        &self.test
    }

    pub fn name(&self) -> Option<String> {
        self.test.name.clone()
    }

    /// Tri-state verdict: None until evaluated.
    pub fn pass(&self) -> Option<bool> {
        self.state.lock().unwrap().pass
    }

    /// Failure explanations, rendered in the given format.
    pub fn details(&self, format: crate::render::Format) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .details
            .iter()
            .map(|d| crate::render::render_markup(d, format))
            .collect()
    }

    pub fn error(&self) -> Option<Fault> {
        self.state.lock().unwrap().error.clone()
    }

    pub fn actual(&self) -> Option<Value> {
        self.state.lock().unwrap().actual.clone()
    }

    /// The post-`map` pair `(actual, expect)`, when mapping ran.
    pub fn mapped(&self) -> Option<(Value, Value)> {
        self.state.lock().unwrap().mapped.clone()
    }

    pub fn time_taken(&self) -> Duration {
        self.state.lock().unwrap().time_taken
    }

    pub fn time_taken_async(&self) -> Option<Duration> {
        self.state.lock().unwrap().time_taken_async
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn stats(&self) -> Stats {
        *self.stats.lock().unwrap()
    }

    pub fn children(&self) -> Vec<Arc<ResultNode>> {
        self.children.lock().unwrap().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finish.is_fired()
    }

    /// Block until this subtree has finished, lifecycle hooks included, then
    /// return its statistics.
    pub fn wait(&self) -> Stats {
        self.finish.wait();
        let handle = self.orchestration.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.stats()
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Execute this leaf: race the body against its timeout, then evaluate.
    ///
    /// The body runs on its own thread. When the timer wins, the cancellation
    /// token is set and the body's eventual result is discarded; the node
    /// records a timeout fault with `time_taken` pinned to the budget.
    pub fn run(&self) {
        let test = self.test.clone();
        let has_criteria = test.expect.is_some() || test.throws.is_some();
        let timeout = match test.max_time {
            Some(budget) if has_criteria => budget,
            _ => DEFAULT_TIMEOUT,
        };

        let cancel = CancelToken::new();
        let isolated = self.parent.upgrade().is_none();
        let (tx, rx) = mpsc::channel::<BodyReport>();
        {
            let test = test.clone();
            let cancel = cancel.clone();
            thread::spawn(move || {
                let report =
                    catch_unwind(AssertUnwindSafe(|| execute_body(&test, cancel, isolated)))
                        .unwrap_or_else(|payload| BodyReport {
                            actual: None,
                            error: Some(Fault::other(format!(
                                "panicked: {}",
                                panic_message(payload)
                            ))),
                            time_taken: Duration::ZERO,
                            time_taken_async: None,
                            messages: Vec::new(),
                        });
                let _ = tx.send(report);
            });
        }

        let raced = rx.recv_timeout(timeout);
        drop(rx);
        {
            let mut state = self.state.lock().unwrap();
            match raced {
                Ok(report) => {
                    state.actual = report.actual;
                    state.error = report.error;
                    state.time_taken = report.time_taken;
                    state.time_taken_async = report.time_taken_async;
                    state.messages = report.messages;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    cancel.set();
                    state.error = Some(Fault::timeout(timeout));
                    state.time_taken = timeout;
                    state.messages = Vec::new();
                }
            }
        }

        self.evaluate();

        // A leaf run in isolation has no initialized stats; settle the latch
        // so wait() still returns.
        if !self.stats.lock().unwrap().initialized {
            self.fire_finish();
        }
    }

    /// Mark this leaf done without evaluating it.
    pub fn skip(&self) {
        Self::dispatch_done(&self.arc());
    }

    /// Run this whole subtree. Returns immediately; use [`ResultNode::wait`]
    /// to block until the tree settles.
    pub fn run_all(&self) {
        let this = self.arc();
        let handle = thread::spawn(move || this.run_all_blocking(false));
        *self.orchestration.lock().unwrap() = Some(handle);
    }

    pub(crate) fn run_all_blocking(&self, forced_skip: bool) {
        {
            let total = self.test.test_count();
            let mut stats = self.stats.lock().unwrap();
            *stats = Stats {
                total,
                pending: total,
                initialized: true,
                ..Stats::default()
            };
        }

        if let Some(on_start) = &self.options.on_start {
            on_start(&RunEvent {
                kind: EventKind::Start,
                origin: self.arc(),
            });
        }

        // The `only` subset protocol: a leading numeric token is consumed as
        // a positional path segment; an identifier token is consumed only if
        // a child carries that id, and otherwise stays available for deeper
        // matching.
        let mut child_options = self.options.clone();
        let mut selected_index: Option<usize> = None;
        let mut selected_id: Option<String> = None;
        if let Some(first) = self.options.only.first() {
            if first.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                selected_index = first.parse().ok();
                child_options.only = self.options.only[1..].to_vec();
            } else if self
                .test
                .tests
                .iter()
                .any(|t| t.id.as_deref() == Some(first.as_str()))
            {
                selected_id = Some(first.clone());
                child_options.only = self.options.only[1..].to_vec();
            }
        }

        let children: Vec<Arc<ResultNode>> = self
            .test
            .tests
            .iter()
            .map(|t| Self::child(t.clone(), &self.arc(), child_options.clone()))
            .collect();
        *self.children.lock().unwrap() = children.clone();

        if let Some(hook) = &self.test.before_all {
            hook();
        }

        if self.test.is_test() {
            if forced_skip || self.test.skipped() {
                self.skip();
            } else {
                self.run();
            }
        }

        let mut handles = Vec::new();
        for (i, child) in children.into_iter().enumerate() {
            let excluded = selected_index.is_some_and(|sel| sel != i)
                || selected_id
                    .as_ref()
                    .is_some_and(|id| child.test.id.as_deref() != Some(id.as_str()));
            let child_skip = forced_skip || excluded;
            handles.push(thread::spawn(move || child.run_all_blocking(child_skip)));
        }
        for handle in handles {
            let _ = handle.join();
        }

        // A subtree without leaf tests settles as soon as its children do.
        let already_settled = {
            let stats = self.stats.lock().unwrap();
            stats.pending == 0
        };
        if already_settled {
            self.fire_finish();
        }

        self.finish.wait();

        if let Some(hook) = &self.test.after_all {
            hook();
        }
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    fn evaluate(&self) {
        {
            let mut state = self.state.lock().unwrap();
            let mut details = std::mem::take(&mut state.details);
            let mut pass: Option<bool> = None;

            for policy in self.test.policies() {
                let ok = match policy {
                    Policy::Timing => evaluate_timing(&self.test, &state, &mut details),
                    Policy::Throws => evaluate_thrown(&self.test, &state, &mut details),
                    Policy::Result => evaluate_result(&self.test, &mut state, &mut details),
                };
                pass = Some(pass.unwrap_or(true) && ok);
            }

            state.pass = pass;
            state.details = details;
        }

        Self::dispatch_done(&self.arc());
    }

    // ------------------------------------------------------------------
    // Aggregation
    // ------------------------------------------------------------------

    /// Walk the parent chain, letting every ancestor (and the origin itself)
    /// observe that a leaf settled.
    fn dispatch_done(origin: &Arc<Self>) {
        let info = {
            let state = origin.state.lock().unwrap();
            DoneInfo {
                is_test: origin.test.is_test(),
                skipped: origin.test.skipped(),
                pass: state.pass,
                messages: state.messages.len(),
                time_taken: state.time_taken,
                time_taken_async: state.time_taken_async,
            }
        };

        let mut current = Some(origin.clone());
        while let Some(node) = current {
            let is_origin = Arc::ptr_eq(&node, origin);
            node.observe_done(&info, is_origin);
            current = node.parent.upgrade();
        }

        if let Some(on_done) = &origin.options.on_done {
            on_done(&RunEvent {
                kind: EventKind::Done,
                origin: origin.clone(),
            });
        }
    }

    fn observe_done(&self, info: &DoneInfo, is_origin: bool) {
        if !info.is_test {
            return;
        }

        let settled = {
            let mut stats = self.stats.lock().unwrap();
            if stats.initialized {
                if info.skipped {
                    stats.skipped += 1;
                } else if info.pass == Some(true) {
                    stats.pass += 1;
                } else {
                    stats.fail += 1;
                }
                stats.messages += info.messages;
                stats.pending = stats.pending.saturating_sub(1);
                stats.pending == 0
            } else {
                false
            }
        };

        // Times roll up into the ancestors' running totals.
        if !is_origin {
            let mut state = self.state.lock().unwrap();
            state.time_taken += info.time_taken;
            if let Some(t) = info.time_taken_async {
                state.time_taken_async = Some(state.time_taken_async.unwrap_or_default() + t);
            }
        }

        if settled {
            self.fire_finish();
        }
    }

    fn fire_finish(&self) {
        if self.finish.fire() {
            if let Some(on_finish) = &self.options.on_finish {
                on_finish(&RunEvent {
                    kind: EventKind::Finish,
                    origin: self.arc(),
                });
            }
        }
    }
}

impl std::fmt::Debug for ResultNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pass = self.pass();
        f.debug_struct("ResultNode")
            .field("name", &self.test.name)
            .field("pass", &pass)
            .field("stats", &self.stats())
            .finish()
    }
}

// ----------------------------------------------------------------------
// Body execution
// ----------------------------------------------------------------------

fn execute_body(test: &TestNode, cancel: CancelToken, isolated: bool) -> BodyReport {
    let ctx = RunContext::new(test.args.clone(), cancel);

    if isolated {
        if let Some(hook) = &test.before_all {
            hook();
        }
    }
    if let Some(hook) = &test.before_each {
        hook();
    }
    if let Some(hook) = &test.setup {
        hook();
    }

    let start = Instant::now();
    let (actual, error, time_taken, time_taken_async) = match &test.run {
        Some(run) => match run(&ctx) {
            Outcome::Value(v) => (Some(v), None, start.elapsed(), None),
            Outcome::Fault(f) => (None, Some(f), start.elapsed(), None),
            Outcome::Deferred(thunk) => {
                let sync_elapsed = start.elapsed();
                match thunk(&ctx) {
                    Ok(v) => (Some(v), None, sync_elapsed, Some(start.elapsed())),
                    Err(f) => (None, Some(f), sync_elapsed, None),
                }
            }
        },
        // No body: the first argument stands in for the result.
        None => (test.args.first().cloned(), None, start.elapsed(), None),
    };

    if let Some(hook) = &test.teardown {
        hook();
    }
    if let Some(hook) = &test.after_each {
        hook();
    }
    if isolated {
        if let Some(hook) = &test.after_all {
            hook();
        }
    }

    BodyReport {
        actual,
        error,
        time_taken,
        time_taken_async,
        messages: ctx.into_messages(),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test body panicked".to_string()
    }
}

// ----------------------------------------------------------------------
// Pass/fail policies
// ----------------------------------------------------------------------

fn evaluate_timing(test: &TestNode, state: &RunState, details: &mut Vec<String>) -> bool {
    let mut pass = true;

    if let Some(max) = test.max_time {
        if state.time_taken > max {
            pass = false;
            details.push(format!(
                "Exceeded max time of {}ms (took {}ms)",
                max.as_millis(),
                state.time_taken.as_millis()
            ));
        }
    }

    if let Some(max) = test.max_time_async {
        let within = state.time_taken_async.is_some_and(|t| t <= max);
        if !within {
            pass = false;
            details.push(format!(
                "Exceeded max async time of {}ms (took {}ms)",
                max.as_millis(),
                state
                    .time_taken_async
                    .unwrap_or(state.time_taken)
                    .as_millis()
            ));
        }
    }

    pass
}

fn evaluate_thrown(test: &TestNode, state: &RunState, details: &mut Vec<String>) -> bool {
    let Some(throws) = test.throws.as_ref() else {
        return true;
    };

    match (&state.error, throws) {
        (Some(error), Throws::Forbidden) => {
            details.push(format!("Expected no error, but got {}", error));
            false
        }
        (None, Throws::Forbidden) => true,
        (Some(_), Throws::Any) => true,
        (Some(error), Throws::Kind(kind)) => {
            if error.kind == *kind {
                true
            } else {
                details.push(format!(
                    "Got error {}, but was not a subclass of {}",
                    error, kind
                ));
                false
            }
        }
        (Some(error), Throws::Predicate(predicate)) => {
            if predicate(error) {
                true
            } else {
                details.push(format!(
                    "Got error {}, but didn't pass the provided test",
                    error
                ));
                false
            }
        }
        (None, _) => {
            details.push(match &state.actual {
                Some(actual) => format!("Expected error but got {}", stringify(actual)),
                None => "Expected error but none was thrown".to_string(),
            });
            false
        }
    }
}

fn evaluate_result(test: &TestNode, state: &mut RunState, details: &mut Vec<String>) -> bool {
    // A prior error, the timeout included, fails the test outright.
    if let Some(error) = &state.error {
        details.push(format!("Got error {}", error));
        return false;
    }

    let Some(expect) = test.expect.clone() else {
        return true;
    };
    let actual = state.actual.clone().unwrap_or_default();

    let (mapped_actual, mapped_expect) = match &test.map {
        Some(mapper) => {
            let mapped = apply_map(mapper, &actual)
                .and_then(|a| apply_map(mapper, &expect).map(|e| (a, e)));
            match mapped {
                Ok(pair) => {
                    state.mapped = Some(pair.clone());
                    pair
                }
                Err(fault) => {
                    let fault = Fault::map_failed(&fault);
                    details.push(format!("Got error {}", fault));
                    state.error = Some(fault);
                    return false;
                }
            }
        }
        None => (actual.clone(), expect.clone()),
    };

    let pass = match (test.check)(&mapped_actual, &mapped_expect) {
        Ok(pass) => pass,
        Err(fault) => {
            let fault = Fault::check_failed(&fault, test.map.is_some());
            details.push(format!("Got error {}", fault));
            state.error = Some(fault);
            return false;
        }
    };

    if !pass {
        details.push(mismatch_detail(
            &actual,
            &expect,
            &mapped_actual,
            &mapped_expect,
            test.map.is_some(),
        ));
    }

    pass
}

/// Apply a mapper to one side; lists map element-wise, preserving order.
fn apply_map(mapper: &Mapper, value: &Value) -> Result<Value, Fault> {
    match value {
        Value::List(items) => {
            let mut mapped = Vec::with_capacity(items.len());
            for item in items {
                mapped.push(mapper(item)?);
            }
            Ok(Value::List(mapped))
        }
        other => mapper(other),
    }
}

/// Build the diff-style mismatch message: short values inline, long values on
/// separate lines, with the unmapped originals annotated when mapping changed
/// them.
fn mismatch_detail(
    actual: &Value,
    expect: &Value,
    mapped_actual: &Value,
    mapped_expect: &Value,
    mapped: bool,
) -> String {
    let actual_string = stringify(mapped_actual);
    let expect_string = stringify(mapped_expect);
    let (actual_diff, expect_diff) = crate::render::diff_sides(&actual_string, &expect_string);

    let actual_changed = mapped && mapped_actual != actual;
    let expect_changed = mapped && mapped_expect != expect;

    let mut actual_len = actual_string.len();
    if actual_changed {
        actual_len += stringify(actual).len();
    }
    let mut expect_len = expect_string.len();
    if expect_changed {
        expect_len += stringify(expect).len();
    }

    if actual_len.max(expect_len) <= INLINE_DIFF_LIMIT {
        let mut message = format!("Got {}", actual_diff);
        if actual_changed {
            message.push_str(&format!(" <dim>({} unmapped)</dim>", stringify(actual)));
        }
        message.push_str(&format!(", expected {}", expect_diff));
        if expect_changed {
            message.push_str(&format!(" <dim>({} unmapped)</dim>", stringify(expect)));
        }
        message
    } else {
        let mut message = format!("\n Actual:   {}", actual_diff);
        if actual_changed {
            message.push_str(&format!(
                "\n           <dim>{} unmapped</dim>",
                stringify(actual)
            ));
        }
        message.push_str(&format!("\n Expected: {}", expect_diff));
        if expect_changed {
            message.push_str(&format!(
                "\n           <dim>{} unmapped</dim>",
                stringify(expect)
            ));
        }
        message
    }
}
