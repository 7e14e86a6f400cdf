//! The output contract.
//!
//! Rendered text uses small inline markup tags (`<b>`, `<dim>`, `<i>`,
//! `<c color>`, `<bg color>`) that the `rich` format converts to ANSI escape
//! codes and the `plain` format strips. [`ResultNode::render`] produces a
//! [`Rendered`] tree (text plus children) that external renderers walk, or
//! serialize to JSON for non-terminal targets.

use crate::result::ResultNode;
use difference::{Changeset, Difference};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::time::Duration;
use termcolor::{Ansi, Color, ColorSpec, WriteColor};

/// Output format for rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Inline style markup becomes ANSI escape codes.
    #[default]
    Rich,
    /// Markup is stripped.
    Plain,
}

/// Options for rendering a result tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub format: Format,
    /// Show all tests, not just failed ones.
    pub verbose: bool,
}

/// A renderable node: one line of text, the lines nested under it, and, for
/// groups, the aggregate statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rendered {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<crate::result::Stats>,
    pub children: Vec<Rendered>,
}

impl Rendered {
    pub fn leaf(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stats: None,
            children: Vec::new(),
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let child_depth = if self.text.is_empty() {
            depth
        } else {
            writeln!(f, "{:indent$}{}", "", self.text, indent = depth * 2)?;
            depth + 1
        };
        for child in &self.children {
            child.write_indented(f, child_depth)?;
        }
        Ok(())
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

// ----------------------------------------------------------------------
// Markup
// ----------------------------------------------------------------------

static TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?b>|</?dim>|</?i>|<c\s+[a-z]+>|</c>|<bg\s+[a-z]+>|</bg>").unwrap());

/// Convert markup to the requested format.
pub fn render_markup(text: &str, format: Format) -> String {
    match format {
        Format::Rich => markup_to_ansi(text),
        Format::Plain => TAG_REGEX.replace_all(text, "").into_owned(),
    }
}

#[derive(Default)]
struct MarkupState {
    bold: usize,
    dim: usize,
    italic: usize,
    fg: Vec<(Color, bool)>,
    bg: Vec<(Color, bool)>,
}

impl MarkupState {
    fn apply(&mut self, tag: &str) {
        match tag {
            "<b>" => self.bold += 1,
            "</b>" => self.bold = self.bold.saturating_sub(1),
            "<dim>" => self.dim += 1,
            "</dim>" => self.dim = self.dim.saturating_sub(1),
            "<i>" => self.italic += 1,
            "</i>" => self.italic = self.italic.saturating_sub(1),
            "</c>" => {
                self.fg.pop();
            }
            "</bg>" => {
                self.bg.pop();
            }
            _ if tag.starts_with("<c") => {
                if let Some(color) = parse_color(tag_argument(tag)) {
                    self.fg.push(color);
                }
            }
            _ if tag.starts_with("<bg") => {
                if let Some(color) = parse_color(tag_argument(tag)) {
                    self.bg.push(color);
                }
            }
            _ => {}
        }
    }

    fn is_plain(&self) -> bool {
        self.bold == 0
            && self.dim == 0
            && self.italic == 0
            && self.fg.is_empty()
            && self.bg.is_empty()
    }

    fn spec(&self) -> ColorSpec {
        let mut spec = ColorSpec::new();
        spec.set_bold(self.bold > 0);
        spec.set_dimmed(self.dim > 0);
        spec.set_italic(self.italic > 0);
        if let Some((color, intense)) = self.fg.last() {
            spec.set_fg(Some(*color));
            spec.set_intense(*intense);
        }
        if let Some((color, _)) = self.bg.last() {
            spec.set_bg(Some(*color));
        }
        spec
    }
}

fn tag_argument(tag: &str) -> &str {
    tag.trim_start_matches("<c")
        .trim_start_matches("<bg")
        .trim_end_matches('>')
        .trim()
}

fn parse_color(name: &str) -> Option<(Color, bool)> {
    let (name, intense) = match name.strip_prefix("light") {
        Some(rest) => (rest, true),
        None => (name, false),
    };
    let color = match name {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "white" => Color::White,
        _ => return None,
    };
    Some((color, intense))
}

fn markup_to_ansi(text: &str) -> String {
    let mut out = Ansi::new(Vec::new());
    let mut state = MarkupState::default();
    let mut last = 0;

    for m in TAG_REGEX.find_iter(text) {
        let _ = out.write_all(text[last..m.start()].as_bytes());
        last = m.end();
        state.apply(m.as_str());
        if state.is_plain() {
            let _ = out.reset();
        } else {
            let _ = out.set_color(&state.spec());
        }
    }
    let _ = out.write_all(text[last..].as_bytes());
    if !state.is_plain() {
        let _ = out.reset();
    }

    String::from_utf8(out.into_inner()).unwrap_or_else(|_| text.to_string())
}

/// Char-level diff of the two sides of a failed comparison. The actual side
/// highlights what the expectation lacks, the expected side what the actual
/// value lacks; stripped of markup both reduce to the raw strings.
pub(crate) fn diff_sides(actual: &str, expect: &str) -> (String, String) {
    let changeset = Changeset::new(actual, expect, "");
    let mut actual_out = String::new();
    let mut expect_out = String::new();
    for diff in &changeset.diffs {
        match diff {
            Difference::Same(s) => {
                actual_out.push_str(s);
                expect_out.push_str(s);
            }
            Difference::Rem(s) => {
                actual_out.push_str("<c red>");
                actual_out.push_str(s);
                actual_out.push_str("</c>");
            }
            Difference::Add(s) => {
                expect_out.push_str("<c green>");
                expect_out.push_str(s);
                expect_out.push_str("</c>");
            }
        }
    }
    (actual_out, expect_out)
}

// ----------------------------------------------------------------------
// Formatting helpers
// ----------------------------------------------------------------------

pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_secs_f64() * 1000.0;
    if ms >= 1000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else if ms >= 1.0 {
        format!("{:.0}ms", ms)
    } else {
        format!("{:.0}µs", ms * 1000.0)
    }
}

pub fn pluralize(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        one.to_string()
    } else {
        many.to_string()
    }
}

// ----------------------------------------------------------------------
// Result tree rendering
// ----------------------------------------------------------------------

impl ResultNode {
    /// One line for a settled leaf: badge, name, message count, duration, and
    /// any failure details.
    pub fn result_line(&self, format: Format) -> String {
        let state = self.state.lock().unwrap();
        let (badge, color) = if state.pass == Some(true) {
            (" PASS ", "green")
        } else {
            (" FAIL ", "red")
        };
        let name = self
            .test()
            .name
            .clone()
            .unwrap_or_else(|| "(Anonymous)".to_string());

        let mut line =
            format!("<b><bg {color}><c white>{badge}</c></bg></b> <c light{color}>{name}</c>");

        if !state.messages.is_empty() {
            let count = state.messages.len();
            line.push_str(&format!(
                " <dim><b>{}</b> {}</dim>",
                count,
                pluralize(count, "message", "messages")
            ));
        }

        line.push_str(&format!(" <dim>({})</dim>", format_duration(state.time_taken)));

        if !state.details.is_empty() {
            line.push_str(": ");
            line.push_str(&state.details.join(", "));
        }

        render_markup(&line, format)
    }

    /// One line summarizing a group's current status.
    pub fn summary_line(&self, format: Format) -> String {
        let stats = self.stats();
        let name = match (&self.test().name, self.test().level) {
            (Some(name), _) => name.clone(),
            (None, 0) => "<i>(All tests)</i>".to_string(),
            (None, _) => String::new(),
        };

        let icon = if stats.fail > 0 {
            "❌"
        } else if stats.pending > 0 {
            "⏳"
        } else {
            "✅"
        };

        let mut parts = vec![name, icon.to_string()];

        if stats.pass > 0 {
            parts.push(format!("<c green><b>{}</b>/{} PASS</c>", stats.pass, stats.total));
        }
        if stats.fail > 0 {
            parts.push(format!("<c red><b>{}</b>/{} FAIL</c>", stats.fail, stats.total));
        }
        if stats.pending > 0 {
            parts.push(format!("<b>{}</b>/{} remaining", stats.pending, stats.total));
        }
        if stats.skipped > 0 {
            parts.push(format!(
                "<dim><b>{}</b>/{} skipped</dim>",
                stats.skipped, stats.total
            ));
        }
        if stats.messages > 0 {
            parts.push(format!(
                "<dim><b>{}</b> {}</dim>",
                stats.messages,
                pluralize(stats.messages, "message", "messages")
            ));
        }

        let time = self.time_taken();
        if !time.is_zero() {
            parts.push(format!("<dim>({})</dim>", format_duration(time)));
        }

        render_markup(&parts.join(" "), format)
    }

    /// The intercepted console messages, as a renderable block.
    pub fn messages_block(&self, format: Format) -> Rendered {
        let children = self
            .messages()
            .iter()
            .map(|m| {
                Rendered::leaf(render_markup(
                    &format!("<dim>({})</dim> {}", m.level.name(), m.text),
                    format,
                ))
            })
            .collect();
        Rendered {
            text: render_markup("<c yellow><b><i>(Messages)</i></b></c>", format),
            stats: None,
            children,
        }
    }

    /// The renderable representation of this subtree. Groups show their
    /// summary; leaves show their result line when they failed, produced
    /// messages, or `verbose` is set. Children without failures, pending
    /// work, skips, or messages are elided unless `verbose`.
    pub fn render(&self, options: &RenderOptions) -> Rendered {
        let text = if self.test().is_group() {
            self.summary_line(options.format)
        } else if self.pass() == Some(false) || !self.messages().is_empty() || options.verbose {
            self.result_line(options.format)
        } else {
            String::new()
        };

        let mut children: Vec<Rendered> = self
            .children()
            .iter()
            .filter(|child| {
                if options.verbose {
                    return true;
                }
                let s = child.stats();
                s.fail + s.pending + s.skipped + s.messages > 0
            })
            .map(|child| child.render(options))
            .filter(|rendered| !(rendered.text.is_empty() && rendered.children.is_empty()))
            .collect();

        if !self.messages().is_empty() {
            children.push(self.messages_block(options.format));
        }

        let stats = if self.test().is_group() {
            Some(self.stats())
        } else {
            None
        };

        Rendered {
            text,
            stats,
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_strips_markup() {
        let s = "<b><bg green><c white> PASS </c></bg></b> <c lightgreen>ok</c>";
        assert_eq!(render_markup(s, Format::Plain), " PASS  ok");
    }

    #[test]
    fn rich_emits_ansi() {
        let out = render_markup("<c red>no</c>", Format::Rich);
        assert!(out.contains('\u{1b}'));
        assert!(out.contains("no"));
    }

    #[test]
    fn diff_sides_reduce_to_raw_strings_when_stripped() {
        let (a, e) = diff_sides("foo", "fob");
        assert_eq!(render_markup(&a, Format::Plain), "foo");
        assert_eq!(render_markup(&e, Format::Plain), "fob");
    }

    #[test]
    fn durations_pick_sensible_units() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_millis(12)), "12ms");
        assert_eq!(format_duration(Duration::from_micros(250)), "250µs");
    }
}
