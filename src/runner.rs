//! The front door: build a tree from a raw description and run it.
//!
//! `run` is environment-agnostic. Collaborators (console reporters, terminal
//! UIs, DOM harnesses) subscribe to the `start`/`done`/`finish` events
//! through [`RunOptions`] and consume the result tree through the render
//! contract.

use crate::node::{self, BuildOptions, TestNode};
use crate::render::Format;
use crate::result::ResultNode;
use crate::spec::{TestSpec, WarnFn};
use std::sync::Arc;

/// An event observer.
pub type EventFn = Arc<dyn Fn(&RunEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A subtree began running.
    Start,
    /// A node settled; `origin` is the node that triggered the event, which
    /// for bubbled completions is the settled leaf itself.
    Done,
    /// A subtree exhausted its pending count.
    Finish,
}

/// A progress notification delivered to observers.
#[derive(Clone)]
pub struct RunEvent {
    pub kind: EventKind,
    pub origin: Arc<ResultNode>,
}

/// Options for a run.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Only run a subset of tests: numeric tokens are positional path
    /// segments, identifier tokens match child `id`s wherever they appear.
    pub only: Vec<String>,
    /// Path expression applied to the tree before running, marking off-path
    /// siblings as skipped.
    pub path: Option<String>,
    /// Show all tests in rendered output, not just failed ones.
    pub verbose: bool,
    /// Output format for rendered trees.
    pub format: Format,
    /// Warning sink for tree construction.
    pub warn: Option<WarnFn>,
    pub on_start: Option<EventFn>,
    pub on_done: Option<EventFn>,
    pub on_finish: Option<EventFn>,
}

impl RunOptions {
    pub fn on_start(mut self, f: impl Fn(&RunEvent) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn on_done(mut self, f: impl Fn(&RunEvent) + Send + Sync + 'static) -> Self {
        self.on_done = Some(Arc::new(f));
        self
    }

    pub fn on_finish(mut self, f: impl Fn(&RunEvent) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Arc::new(f));
        self
    }
}

/// Run a raw test description.
///
/// Returns None, after a warning, when the description holds no tests at
/// all, or when the requested path selects none. The returned root is already
/// running; call [`ResultNode::wait`] to block until it settles.
pub fn run(spec: TestSpec, options: RunOptions) -> Option<Arc<ResultNode>> {
    let build = BuildOptions {
        warn: options.warn.clone(),
    };

    let inert = spec.tests.is_empty()
        && spec.run.is_none()
        && spec.args.is_none()
        && spec.expect.is_none()
        && spec.throws.is_none();
    if inert {
        node::emit_warning(&build, "No tests found");
        return None;
    }

    let test = TestNode::new(spec, &build);

    if let Some(path) = &options.path {
        if node::subset_tests(&test, path) == 0 {
            node::emit_warning(&build, &format!("Path {} produced no tests", path));
            return None;
        }
    }

    Some(run_tree(test, options))
}

/// Run an already-normalized tree.
pub fn run_tree(test: Arc<TestNode>, options: RunOptions) -> Arc<ResultNode> {
    let result = ResultNode::root(test, options);
    result.run_all();
    result
}

/// Run a raw description and block until it settles.
pub fn run_to_completion(spec: TestSpec, options: RunOptions) -> Option<Arc<ResultNode>> {
    let result = run(spec, options)?;
    result.wait();
    Some(result)
}
