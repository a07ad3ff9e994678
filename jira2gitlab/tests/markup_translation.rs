//! End-to-end markup translation over a realistic issue description.

use jira2gitlab::{MarkupTranslator, Replacement};
use regex::Regex;

fn translator() -> MarkupTranslator {
    MarkupTranslator::new("https://jira.example.com", false)
}

#[test]
fn translates_a_full_description() {
    let description = "h2. Steps to reproduce\n\
\n\
# Open the login page\n\
# Click *Submit*\n\
\n\
See [~bob] and [details|https://wiki.example.com/page].\n\
Related: PROJ-7\n\
\n\
{code:java}\n\
int x = 1;\n\
{code}\n\
\n\
||Browser||Result||\n\
|Firefox|(x)|\n\
|Chrome|(/)|\n";

    let out = translator().translate("PROJ", Some(description), &[]);

    // Heading and ordered list
    assert!(out.contains("## Steps to reproduce"), "out: {out}");
    assert!(out.contains("\n 1. Open the login page"), "out: {out}");
    assert!(out.contains("**Submit**"), "out: {out}");

    // Links: user mention, aliased link, same-project issue key
    assert!(out.contains("@bob"), "out: {out}");
    assert!(
        out.contains("[details](https://wiki.example.com/page)"),
        "out: {out}"
    );
    assert!(
        out.contains("[PROJ-7](https://jira.example.com/browse/PROJ-7)"),
        "out: {out}"
    );

    // Fenced code block with language
    assert!(out.contains("```java"), "out: {out}");
    assert!(out.contains("int x = 1;"), "out: {out}");

    // Table header, separator and emoji cells
    assert!(out.contains("|Browser|Result|"), "out: {out}");
    assert!(out.contains("| --- | --- |"), "out: {out}");
    assert!(out.contains("|Firefox|:x:|"), "out: {out}");
    assert!(out.contains("|Chrome|:white_check_mark:|"), "out: {out}");
}

#[test]
fn attachment_references_are_rewritten() {
    let replacement = Replacement {
        pattern: Regex::new(&format!("!{}[^!]*!", regex::escape("screenshot.png"))).unwrap(),
        markup: "![screenshot.png](https://gitlab.example.com/uploads/1a2b/screenshot.png)"
            .to_string(),
    };

    let out = translator().translate(
        "PROJ",
        Some("Before:\n!screenshot.png|width=300!\nAfter fix it works."),
        &[replacement],
    );

    assert!(
        out.contains("![screenshot.png](https://gitlab.example.com/uploads/1a2b/screenshot.png)"),
        "out: {out}"
    );
    assert!(!out.contains("!screenshot.png|"), "out: {out}");
}

#[test]
fn other_project_keys_are_left_alone() {
    let out = translator().translate("PROJ", Some("see OTHER-12 and PROJ-12"), &[]);
    assert!(out.contains("see OTHER-12"), "out: {out}");
    assert!(
        out.contains("[PROJ-12](https://jira.example.com/browse/PROJ-12)"),
        "out: {out}"
    );
}
