//! verdict: a declarative test-tree execution and evaluation engine.
//!
//! Raw descriptions of individual assertions and nested groups normalize
//! into a canonical [`TestNode`] tree with inheritance resolved. A run builds
//! a parallel [`ResultNode`] tree, executes every leaf concurrently under its
//! own timeout, judges each one with pluggable comparison strategies, and
//! aggregates statistics bottom-up until the root settles. Renderers consume
//! the live tree through the [`render`] contract.
//!
//! ```rust
//! use verdict::{run_to_completion, Outcome, RunOptions, TestSpec};
//!
//! let suite = TestSpec::new()
//!     .name("division")
//!     .run(|cx| Outcome::value(cx.number(0) / cx.number(1)))
//!     .test(TestSpec::new().args([10, 2]).expect(5))
//!     .test(TestSpec::new().args([9, 3]).expect(3));
//!
//! let result = run_to_completion(suite, RunOptions::default()).unwrap();
//! assert!(result.stats().is_success());
//! ```

pub mod check;
pub mod fault;
pub mod mappers;
pub mod node;
pub mod render;
pub mod report;
pub mod result;
pub mod runner;
pub mod spec;
pub mod value;

pub use fault::{Fault, FaultKind, Throws};
pub use node::{subset_tests, BuildOptions, InheritedField, TestNode, INHERITED_FIELDS};
pub use render::{Format, RenderOptions, Rendered};
pub use report::ConsoleReporter;
pub use result::{ResultNode, Stats, DEFAULT_TIMEOUT};
pub use runner::{run, run_to_completion, run_tree, EventKind, RunEvent, RunOptions};
pub use spec::{CancelToken, Message, MessageLevel, Outcome, RunContext, TestSpec};
pub use value::{stringify, Value};
