//! The canonical test tree.
//!
//! [`TestNode::new`] normalizes a raw [`TestSpec`] into an immutable tree,
//! resolving inheritance top-down: a parent's own fields are fully resolved
//! before any child inherits from it, so inheritance works recursively with a
//! single linear copy per node. Only the `skip` flag stays mutable afterward,
//! so callers can select subsets of an already-built tree.

use crate::check::{self, Check};
use crate::fault::Throws;
use crate::mappers::Mapper;
use crate::spec::{ArgsSpec, CheckSpec, HookFn, NameFn, NameSpec, TestSpec, WarnFn};
use crate::value::{stringify, Value};
use im::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The fields a child copies from its parent when it does not define them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritedField {
    Setup,
    Run,
    Teardown,
    Map,
    Check,
    GetName,
    Args,
    Expect,
    Skip,
}

/// The complete inheritable-field set, in the order it is applied.
pub const INHERITED_FIELDS: [InheritedField; 9] = [
    InheritedField::Setup,
    InheritedField::Run,
    InheritedField::Teardown,
    InheritedField::Map,
    InheritedField::Check,
    InheritedField::GetName,
    InheritedField::Args,
    InheritedField::Expect,
    InheritedField::Skip,
];

/// Which pass/fail policies apply to a leaf, decided at construction time
/// from which fields are present and evaluated in order, ANDing the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Policy {
    Timing,
    Throws,
    Result,
}

/// Options for tree construction.
#[derive(Clone, Default)]
pub struct BuildOptions {
    /// Warning sink for malformed descriptions. Defaults to stderr.
    pub warn: Option<WarnFn>,
}

impl BuildOptions {
    /// Swallow warnings entirely.
    pub fn silent() -> Self {
        Self {
            warn: Some(Arc::new(|_| {})),
        }
    }
}

pub(crate) fn emit_warning(options: &BuildOptions, message: &str) {
    match &options.warn {
        Some(warn) => warn(message),
        None => eprintln!("[verdict] {}", message),
    }
}

/// One normalized test or group of tests. Immutable once built, except for
/// the `skip` flag.
pub struct TestNode {
    pub name: Option<String>,
    /// The raw name before any derivation.
    pub original_name: Option<String>,
    pub id: Option<String>,
    pub description: Option<String>,
    /// Depth from the root; the root is 0.
    pub level: usize,
    pub args: Vec<Value>,
    pub run: Option<crate::spec::TestFn>,
    pub setup: Option<HookFn>,
    pub teardown: Option<HookFn>,
    pub expect: Option<Value>,
    pub throws: Option<Throws>,
    pub check: Check,
    pub map: Option<Mapper>,
    pub max_time: Option<Duration>,
    pub max_time_async: Option<Duration>,
    pub data: HashMap<String, Value>,
    pub before_all: Option<HookFn>,
    pub after_all: Option<HookFn>,
    pub before_each: Option<HookFn>,
    pub after_each: Option<HookFn>,
    pub tests: Vec<Arc<TestNode>>,
    pub warnings: Vec<String>,
    skip: AtomicBool,
    get_name: Option<NameFn>,
    policies: Vec<Policy>,
}

impl TestNode {
    /// Normalize a raw description into a canonical tree.
    pub fn new(spec: TestSpec, options: &BuildOptions) -> Arc<Self> {
        Arc::new(Self::build(spec, None, options))
    }

    fn build(spec: TestSpec, parent: Option<&TestNode>, options: &BuildOptions) -> Self {
        let mut spec = spec;
        let mut warnings = Vec::new();

        if spec.is_empty() {
            let message = "Empty test description".to_string();
            emit_warning(options, &message);
            warnings.push(message);
        }

        let level = parent.map_or(0, |p| p.level + 1);
        let child_specs = std::mem::take(&mut spec.tests);
        let is_group = !child_specs.is_empty();

        // Merge data, child keys winning. im's union keeps self's entries on
        // collision.
        let data = match parent {
            Some(p) => spec.data.clone().union(p.data.clone()),
            None => spec.data.clone(),
        };

        let (mut name, mut get_name) = match spec.name.take() {
            Some(NameSpec::Literal(s)) => (Some(s), None),
            Some(NameSpec::Derived(f)) => (None, Some(f)),
            None => (None, None),
        };
        let original_name = name.clone();

        // Inherit-if-unset, over the fixed field list. Parents are fully
        // resolved before children are built, so one linear pass suffices.
        let mut setup = spec.setup.take();
        let mut run = spec.run.take();
        let mut teardown = spec.teardown.take();
        let mut map = spec.map.take();
        let mut check_spec = spec.check.take();
        let mut inherited_check: Option<Check> = None;
        let mut args_spec = spec.args.take();
        let mut expect = spec.expect.take();
        let mut skip = spec.skip.take();

        if let Some(p) = parent {
            for field in INHERITED_FIELDS {
                match field {
                    InheritedField::Setup => {
                        if setup.is_none() {
                            setup = p.setup.clone();
                        }
                    }
                    InheritedField::Run => {
                        if run.is_none() {
                            run = p.run.clone();
                        }
                    }
                    InheritedField::Teardown => {
                        if teardown.is_none() {
                            teardown = p.teardown.clone();
                        }
                    }
                    InheritedField::Map => {
                        if map.is_none() {
                            map = p.map.clone();
                        }
                    }
                    InheritedField::Check => {
                        if check_spec.is_none() {
                            inherited_check = Some(p.check.clone());
                        }
                    }
                    InheritedField::GetName => {
                        if get_name.is_none() {
                            get_name = p.get_name.clone();
                        }
                    }
                    InheritedField::Args => {
                        if args_spec.is_none() {
                            args_spec = Some(ArgsSpec::Many(p.args.clone()));
                        }
                    }
                    InheritedField::Expect => {
                        if expect.is_none() {
                            expect = p.expect.clone();
                        }
                    }
                    InheritedField::Skip => {
                        if skip.is_none() {
                            skip = Some(p.skipped());
                        }
                    }
                }
            }
        }

        // Resolve the comparator: explicit function wins, options compile,
        // inherited comes next, deep equality is the default.
        let check: Check = match check_spec {
            Some(CheckSpec::Fn(c)) => c,
            Some(CheckSpec::Options(o)) => check::compile(o),
            None => inherited_check.unwrap_or_else(check::equals),
        };

        let args: Vec<Value> = match args_spec {
            Some(ArgsSpec::One(v)) => vec![v],
            Some(ArgsSpec::Many(vs)) => vs,
            None => Vec::new(),
        };

        // Resolve the final name: derived names apply to the arguments; leaf
        // tests fall back to their first argument.
        if name.is_none() {
            if let Some(f) = &get_name {
                name = Some(f(&args));
            } else if !is_group {
                name = Some(if args.is_empty() {
                    "(No args)".to_string()
                } else {
                    stringify(&args[0])
                });
            }
        }

        let throws = spec.throws.take();
        let max_time = spec.max_time;
        let max_time_async = spec.max_time_async;

        let mut policies = Vec::new();
        if max_time.is_some() || max_time_async.is_some() {
            policies.push(Policy::Timing);
        }
        if throws.is_some() {
            policies.push(Policy::Throws);
        } else if expect.is_some() {
            policies.push(Policy::Result);
        }

        let mut node = TestNode {
            name,
            original_name,
            id: spec.id.take(),
            description: spec.description.take(),
            level,
            args,
            run,
            setup,
            teardown,
            expect,
            throws,
            check,
            map,
            max_time,
            max_time_async,
            data,
            before_all: spec.before_all.take(),
            after_all: spec.after_all.take(),
            before_each: spec.before_each.take(),
            after_each: spec.after_each.take(),
            tests: Vec::new(),
            warnings,
            skip: AtomicBool::new(skip.unwrap_or(false)),
            get_name,
            policies,
        };

        let children: Vec<Arc<TestNode>> = child_specs
            .into_iter()
            .map(|child| Arc::new(Self::build(child, Some(&node), options)))
            .collect();
        node.tests = children;
        node
    }

    /// A leaf assertion, as opposed to a group.
    pub fn is_test(&self) -> bool {
        !self.is_group()
    }

    /// Whether this node holds child tests.
    pub fn is_group(&self) -> bool {
        !self.tests.is_empty()
    }

    /// The number of leaf tests in this subtree, skipped ones included.
    pub fn test_count(&self) -> usize {
        let own = if self.is_test() { 1 } else { 0 };
        own + self.tests.iter().map(|t| t.test_count()).sum::<usize>()
    }

    pub fn skipped(&self) -> bool {
        self.skip.load(Ordering::SeqCst)
    }

    /// Toggle the skip flag; the one mutation allowed after construction.
    pub fn set_skip(&self, skip: bool) {
        self.skip.store(skip, Ordering::SeqCst);
    }

    pub(crate) fn policies(&self) -> &[Policy] {
        &self.policies
    }
}

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestNode")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("args", &self.args)
            .field("tests", &self.tests.len())
            .field("skip", &self.skipped())
            .finish()
    }
}

/// Select a subset of an already-built tree by a path expression.
///
/// Each segment is either a numeric index (a positional step through nested
/// `tests`) or an identifier matched against child `id`s at the current
/// level. Off-path siblings get their `skip` flag set instead of being pruned
/// from the tree, so totals stay intact for reporting. Returns the number of
/// leaf tests in the selected subtree.
pub fn subset_tests(root: &TestNode, path: &str) -> usize {
    let segments = path
        .split(|c: char| c == '/' || c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty());

    let mut current = root;
    for segment in segments {
        let index = if segment.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            match segment.parse::<usize>() {
                Ok(i) if i < current.tests.len() => Some(i),
                _ => return 0,
            }
        } else {
            current
                .tests
                .iter()
                .position(|t| t.id.as_deref() == Some(segment))
        };

        let Some(index) = index else {
            // No match at this level; leave the rest of the tree as-is.
            break;
        };

        for (i, sibling) in current.tests.iter().enumerate() {
            if i != index {
                sibling.set_skip(true);
            }
        }
        current = &current.tests[index];
    }

    current.test_count()
}
