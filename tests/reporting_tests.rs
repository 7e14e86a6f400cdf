//! The output contract: result lines, group summaries, tree rendering with
//! its failure-focused filtering, and the serialization hooks.

use std::sync::Arc;
use verdict::render::{Format, RenderOptions};
use verdict::report::ConsoleReporter;
use verdict::result::ResultNode;
use verdict::runner::{run_to_completion, RunOptions};
use verdict::spec::{Outcome, TestSpec};

fn silent_options() -> RunOptions {
    RunOptions {
        warn: Some(Arc::new(|_| {})),
        ..RunOptions::default()
    }
}

fn mixed_suite() -> Arc<ResultNode> {
    let spec = TestSpec::new()
        .name("suite")
        .run(|cx| Outcome::value(cx.arg(0).clone()))
        .tests([
            TestSpec::new().name("passing").arg(1).expect(1),
            TestSpec::new().name("failing").arg(2).expect(3),
            TestSpec::new().name("skipped one").arg(4).expect(4).skip(true),
        ]);
    run_to_completion(spec, silent_options()).unwrap()
}

#[test]
fn result_lines_carry_badge_name_and_duration() {
    let result = mixed_suite();
    let failing = &result.children()[1];

    let line = failing.result_line(Format::Plain);
    assert!(line.contains(" FAIL "));
    assert!(line.contains("failing"));
    assert!(line.contains("Got 2"));
    assert!(line.contains("expected 3"));
    // A duration in some unit.
    assert!(line.contains("s)") || line.contains("ms)") || line.contains("µs)"));

    let passing = &result.children()[0];
    assert!(passing.result_line(Format::Plain).contains(" PASS "));
}

#[test]
fn rich_lines_embed_ansi_plain_lines_do_not() {
    let result = mixed_suite();
    let failing = &result.children()[1];
    assert!(failing.result_line(Format::Rich).contains('\u{1b}'));
    assert!(!failing.result_line(Format::Plain).contains('\u{1b}'));
}

#[test]
fn group_summaries_report_every_counter() {
    let result = mixed_suite();
    let summary = result.summary_line(Format::Plain);
    assert!(summary.contains("suite"));
    assert!(summary.contains("❌"));
    assert!(summary.contains("1/3 PASS"));
    assert!(summary.contains("1/3 FAIL"));
    assert!(summary.contains("1/3 skipped"));
    assert!(!summary.contains("remaining"));
}

#[test]
fn all_green_summaries_get_the_checkmark() {
    let spec = TestSpec::new()
        .name("green")
        .run(|cx| Outcome::value(cx.arg(0).clone()))
        .tests([TestSpec::new().arg(1).expect(1)]);
    let result = run_to_completion(spec, silent_options()).unwrap();
    let summary = result.summary_line(Format::Plain);
    assert!(summary.contains("✅"));
    assert!(summary.contains("1/1 PASS"));
}

#[test]
fn rendering_elides_quiet_children_by_default() {
    let result = mixed_suite();
    let rendered = result.render(&RenderOptions {
        format: Format::Plain,
        verbose: false,
    });

    assert!(rendered.text.contains("suite"));
    let texts: Vec<&str> = rendered.children.iter().map(|c| c.text.as_str()).collect();
    assert!(texts.iter().any(|t| t.contains("failing")));
    assert!(!texts.iter().any(|t| t.contains("passing")));
}

#[test]
fn verbose_rendering_shows_everything() {
    let result = mixed_suite();
    let rendered = result.render(&RenderOptions {
        format: Format::Plain,
        verbose: true,
    });
    let texts: Vec<&str> = rendered.children.iter().map(|c| c.text.as_str()).collect();
    assert!(texts.iter().any(|t| t.contains("passing")));
    assert!(texts.iter().any(|t| t.contains("failing")));
}

#[test]
fn message_blocks_attach_under_their_node() {
    let spec = TestSpec::new().name("chatty suite").tests([TestSpec::new()
        .name("talker")
        .run(|cx| {
            cx.log("hello from the test");
            Outcome::value(1)
        })
        .expect(1)]);
    let result = run_to_completion(spec, silent_options()).unwrap();

    let rendered = result.render(&RenderOptions {
        format: Format::Plain,
        verbose: false,
    });

    // The passing-but-chatty leaf is kept, with a messages block under it.
    let leaf = &rendered.children[0];
    assert!(leaf.text.contains("talker"));
    assert!(leaf.text.contains("1 message"));
    let block = &leaf.children[0];
    assert!(block.text.contains("(Messages)"));
    assert!(block.children[0].text.contains("(log) hello from the test"));
}

#[test]
fn rendered_trees_serialize_for_external_consumers() {
    let result = mixed_suite();
    let rendered = result.render(&RenderOptions {
        format: Format::Plain,
        verbose: false,
    });

    let json = serde_json::to_value(&rendered).unwrap();
    assert!(json.get("text").is_some());
    assert!(json.get("children").unwrap().is_array());
    // Groups carry their stats mapping; leaves do not.
    assert_eq!(json["stats"]["total"], 3);
    let first_child = &json["children"][0];
    assert!(first_child.get("stats").is_none());
}

#[test]
fn stats_serialize_with_the_contract_keys() {
    let result = mixed_suite();
    let json = serde_json::to_value(result.stats()).unwrap();
    for key in ["pass", "fail", "skipped", "total", "pending", "messages"] {
        assert!(json.get(key).is_some(), "missing stats key {}", key);
    }
    assert_eq!(json["total"], 3);
    assert_eq!(json["pending"], 0);
}

#[test]
fn the_console_reporter_maps_stats_to_an_exit_status() {
    let result = mixed_suite();
    // Printing must not panic in either format.
    ConsoleReporter::with_format(Format::Plain).print(&result);
    ConsoleReporter::with_format(Format::Rich).verbose(true).print(&result);

    assert_eq!(ConsoleReporter::exit_code(&result.stats()), 1);

    let green = run_to_completion(
        TestSpec::new()
            .name("ok")
            .run(|_| Outcome::value(1))
            .test(TestSpec::new().expect(1)),
        silent_options(),
    )
    .unwrap();
    assert_eq!(ConsoleReporter::exit_code(&green.stats()), 0);
}

#[test]
fn displaying_a_rendered_tree_indents_children() {
    let result = mixed_suite();
    let rendered = result.render(&RenderOptions {
        format: Format::Plain,
        verbose: false,
    });
    let printed = rendered.to_string();
    let mut lines = printed.lines();
    let first = lines.next().unwrap();
    assert!(first.starts_with("suite"));
    let second = lines.next().unwrap();
    assert!(second.starts_with("  "));
}
