//! Tree normalization: inheritance, defaulting, name derivation, data
//! merging, and path-based subsetting.

use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use verdict::check::CheckOptions;
use verdict::node::{subset_tests, BuildOptions, InheritedField, TestNode, INHERITED_FIELDS};
use verdict::spec::{Outcome, TestSpec};
use verdict::value::Value;

fn build(spec: TestSpec) -> Arc<TestNode> {
    TestNode::new(spec, &BuildOptions::silent())
}

#[test]
fn levels_are_derived_from_depth() {
    let tree = build(
        TestSpec::new()
            .name("root")
            .test(TestSpec::group([TestSpec::new().arg(1).expect(1)])),
    );
    assert_eq!(tree.level, 0);
    assert_eq!(tree.tests[0].level, 1);
    assert_eq!(tree.tests[0].tests[0].level, 2);
}

#[test]
fn groups_and_leaves_are_distinguished_by_children() {
    let tree = build(TestSpec::new().name("g").test(TestSpec::new().arg(1).expect(1)));
    assert!(tree.is_group());
    assert!(!tree.is_test());
    assert!(tree.tests[0].is_test());
}

#[test]
fn test_count_counts_leaves_only() {
    let tree = build(TestSpec::new().name("root").tests([
        TestSpec::new().arg(1).expect(1),
        TestSpec::group([
            TestSpec::new().arg(2).expect(2),
            TestSpec::new().arg(3).expect(3).skip(true),
        ]),
    ]));
    // Skipped leaves still count toward the total.
    assert_eq!(tree.test_count(), 3);
}

#[test]
fn children_inherit_unset_fields_from_the_parent() {
    let tree = build(
        TestSpec::new()
            .name("inherit")
            .run(|cx| Outcome::value(cx.number(0) + cx.number(1)))
            .expect(3)
            .test(TestSpec::new().args([1, 2]))
            .test(TestSpec::new().args([1, 1]).expect(2)),
    );

    let first = &tree.tests[0];
    let second = &tree.tests[1];
    assert!(first.run.is_some());
    assert_eq!(first.expect, Some(Value::from(3)));
    // A child's own field wins over the inherited one.
    assert_eq!(second.expect, Some(Value::from(2)));
}

#[test]
fn skip_is_inherited_at_construction_time() {
    let tree = build(
        TestSpec::new()
            .name("skipped group")
            .skip(true)
            .test(TestSpec::new().arg(1).expect(1))
            .test(TestSpec::new().arg(2).expect(2).skip(false)),
    );
    assert!(tree.tests[0].skipped());
    assert!(!tree.tests[1].skipped());
}

#[test]
fn inheritance_works_recursively_top_down() {
    let tree = build(
        TestSpec::new()
            .name("grandparent")
            .run(|cx| Outcome::value(cx.arg(0).clone()))
            .test(TestSpec::group([TestSpec::new().arg("x").expect("x")])),
    );
    // The middle group inherited run from the root, and the grandchild from
    // the already-resolved middle group.
    let leaf = &tree.tests[0].tests[0];
    assert!(leaf.run.is_some());
}

#[test]
fn data_merges_with_child_keys_winning() {
    let tree = build(
        TestSpec::new()
            .name("data")
            .datum("shared", 1)
            .datum("overridden", "parent")
            .test(TestSpec::new().arg(1).expect(1).datum("overridden", "child")),
    );
    let leaf = &tree.tests[0];
    assert_eq!(leaf.data.get("shared"), Some(&Value::from(1)));
    assert_eq!(leaf.data.get("overridden"), Some(&Value::from("child")));
}

#[test]
fn leaf_names_fall_back_to_the_first_argument() {
    let tree = build(TestSpec::new().name("names").tests([
        TestSpec::new().args(["foo", "bar"]).expect("foo"),
        TestSpec::new().expect(Value::Nil),
        TestSpec::new().name("explicit").arg(1).expect(1),
    ]));
    assert_eq!(tree.tests[0].name.as_deref(), Some(r#""foo""#));
    assert_eq!(tree.tests[1].name.as_deref(), Some("(No args)"));
    assert_eq!(tree.tests[2].name.as_deref(), Some("explicit"));
}

#[test]
fn derived_names_apply_to_each_childs_arguments() {
    let tree = build(
        TestSpec::new()
            .name_fn(|args| format!("case of {}", args.len()))
            .run(|_| Outcome::value(true))
            .expect(true)
            .test(TestSpec::new().args([1, 2]))
            .test(TestSpec::new().args([1, 2, 3])),
    );
    // The naming function itself resolves the group's name too.
    assert_eq!(tree.name.as_deref(), Some("case of 0"));
    assert_eq!(tree.tests[0].name.as_deref(), Some("case of 2"));
    assert_eq!(tree.tests[1].name.as_deref(), Some("case of 3"));
    assert_eq!(tree.original_name, None);
}

#[test]
fn original_name_survives_derivation() {
    let tree = build(TestSpec::new().name("literal").test(TestSpec::new().arg(1).expect(1)));
    assert_eq!(tree.original_name.as_deref(), Some("literal"));
}

#[test]
fn single_arg_normalizes_to_a_one_element_sequence() {
    let tree = build(TestSpec::new().name("args").tests([
        TestSpec::new().arg(5).expect(5),
        TestSpec::new().args([1, 2]).expect(3),
        TestSpec::new().expect(Value::Nil),
    ]));
    assert_eq!(tree.tests[0].args, vec![Value::from(5)]);
    assert_eq!(tree.tests[1].args, vec![Value::from(1), Value::from(2)]);
    assert!(tree.tests[2].args.is_empty());
}

#[test]
fn check_options_compile_into_a_comparator() {
    let tree = build(
        TestSpec::new()
            .name("compiled")
            .check(CheckOptions {
                deep: true,
                epsilon: 0.1,
                ..CheckOptions::default()
            })
            .test(TestSpec::new().arg(1).expect(1)),
    );
    let leaf = &tree.tests[0];
    // The inherited comparator is the compiled one.
    assert!((leaf.check)(&Value::list([1.05]), &Value::list([1.0])).unwrap());
    assert!(!(leaf.check)(&Value::list([1.5]), &Value::list([1.0])).unwrap());
}

#[test]
fn the_default_comparator_is_deep_equality() {
    let tree = build(TestSpec::new().name("default").test(TestSpec::new().arg(1).expect(1)));
    let leaf = &tree.tests[0];
    assert!((leaf.check)(&Value::list([1, 2]), &Value::list([1, 2])).unwrap());
    assert!(!(leaf.check)(&Value::from("1"), &Value::from(1)).unwrap());
}

#[test]
fn construction_is_idempotent_over_the_same_description() {
    let spec = TestSpec::new()
        .name("twice")
        .run(|cx| Outcome::value(cx.arg(0).clone()))
        .tests([
            TestSpec::new().arg("a").expect("a"),
            TestSpec::group([TestSpec::new().arg("b").expect("b")]),
        ]);

    let first = build(spec.clone());
    let second = build(spec);

    fn shape(node: &TestNode) -> (Option<String>, Vec<Value>, usize) {
        (node.name.clone(), node.args.clone(), node.tests.len())
    }

    assert_eq!(shape(&first), shape(&second));
    assert_eq!(first.test_count(), second.test_count());
    for (a, b) in first.tests.iter().zip(&second.tests) {
        assert_eq!(shape(a), shape(b));
    }
}

#[test]
fn empty_descriptions_warn_but_do_not_fail() {
    let warnings: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = warnings.clone();
    let options = BuildOptions {
        warn: Some(Arc::new(move |msg: &str| {
            sink.lock().unwrap().push(msg.to_string())
        })),
    };

    let node = TestNode::new(TestSpec::new(), &options);
    assert_eq!(warnings.lock().unwrap().len(), 1);
    assert!(!node.warnings.is_empty());
    assert!(node.is_test());
}

#[test]
fn the_inheritable_field_list_is_fixed() {
    assert_eq!(
        INHERITED_FIELDS,
        [
            InheritedField::Setup,
            InheritedField::Run,
            InheritedField::Teardown,
            InheritedField::Map,
            InheritedField::Check,
            InheritedField::GetName,
            InheritedField::Args,
            InheritedField::Expect,
            InheritedField::Skip,
        ]
    );
}

#[test]
fn subset_tests_marks_off_path_siblings_as_skipped() {
    let tree = build(TestSpec::new().name("root").tests([
        TestSpec::new().id("alpha").arg(1).expect(1),
        TestSpec::group([
            TestSpec::new().arg(2).expect(2),
            TestSpec::new().arg(3).expect(3),
        ]),
    ]));

    let remaining = subset_tests(&tree, "1/0");
    assert_eq!(remaining, 1);
    // Siblings along the path are skipped, not pruned.
    assert!(tree.tests[0].skipped());
    assert!(!tree.tests[1].skipped());
    assert!(!tree.tests[1].tests[0].skipped());
    assert!(tree.tests[1].tests[1].skipped());
    // Totals stay intact for reporting.
    assert_eq!(tree.test_count(), 3);
}

#[test]
fn subset_tests_matches_identifiers_at_the_current_level() {
    let tree = build(TestSpec::new().name("root").tests([
        TestSpec::new().id("alpha").arg(1).expect(1),
        TestSpec::new().id("beta").arg(2).expect(2),
    ]));

    let remaining = subset_tests(&tree, "beta");
    assert_eq!(remaining, 1);
    assert!(tree.tests[0].skipped());
    assert!(!tree.tests[1].skipped());
}
