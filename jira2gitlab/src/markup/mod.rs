//! Jira wiki markup to GitLab markdown translation.
//!
//! The translator is a fixed, ordered chain of pure text rewrites.
//! Order matters: later rules assume the output shape of earlier ones
//! (e.g. list rules run before emphasis so a leading `*` is consumed as
//! a bullet, not bold), and the caller-supplied attachment replacements
//! run last so their output is never mangled by another rule.
//!
//! Jira notation reference: the "Text Formatting Notation Help" of the
//! source instance. GitLab markdown: <https://docs.gitlab.com/ee/user/markdown.html>

mod tables;

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

/// A literal replacement applied after all markup rules.
///
/// The pattern matches the original attachment reference as it appears
/// embedded in Jira text (e.g. `!photo.png|thumbnail!`); the markup is
/// the ready-to-embed GitLab image/link pointing at the new upload.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub pattern: Regex,
    pub markup: String,
}

static RE_LINE_BREAK: Lazy<Regex> = Lazy::new(|| re(r"(\r?\n)"));
static RE_CODE_SIMPLE: Lazy<Regex> = Lazy::new(|| re(r"\{code}\s*"));
static RE_CODE_LANG: Lazy<Regex> = Lazy::new(|| re(r"\{code:(\w+)(?:\|\w+=[\w.\-]+)*}\s*"));
static RE_CODE_ANY: Lazy<Regex> = Lazy::new(|| re(r"\{code:[^}]*}\s*"));
static RE_BLOCK_QUOTE: Lazy<Regex> = Lazy::new(|| re(r"\n\s*bq\. (.*)\n"));
static RE_QUOTE_TAG: Lazy<Regex> = Lazy::new(|| re(r"\{quote}"));
static RE_COLOR: Lazy<Regex> = Lazy::new(|| re(r"\{color:[#\w]+}(.*)\{color}"));
static RE_RULER: Lazy<Regex> = Lazy::new(|| re(r"\n-{4,}\n"));
static RE_USER_LINK: Lazy<Regex> = Lazy::new(|| re(r"\[~([a-z]+)]"));
static RE_BARE_LINK: Lazy<Regex> = Lazy::new(|| re(r"\[([^|\]]*)]"));
static RE_ALIASED_LINK: Lazy<Regex> = Lazy::new(|| re(r"\[(.+)\|([a-z]+://.+)]"));
static RE_ORDERED: Lazy<Regex> = Lazy::new(|| re(r"\n *# "));
static RE_ORDERED_SUB: Lazy<Regex> = Lazy::new(|| re(r"\n *[*\-#]# "));
static RE_ORDERED_SUBSUB: Lazy<Regex> = Lazy::new(|| re(r"\n *[*\-#]{2}# "));
static RE_UNORDERED: Lazy<Regex> = Lazy::new(|| re(r"\n *\* "));
static RE_UNORDERED_SUB: Lazy<Regex> = Lazy::new(|| re(r"\n *[*\-#][*\-] "));
static RE_UNORDERED_SUBSUB: Lazy<Regex> = Lazy::new(|| re(r"\n *[*\-#]{2}[*\-] "));
static RE_BOLD: Lazy<Regex> = Lazy::new(|| re(r"(^|\W)\*(\S.*\S)\*(\W|$)"));
static RE_EMPHASIS: Lazy<Regex> = Lazy::new(|| re(r"(^|\W)_(\S.*\S)_(\W|$)"));
static RE_STRIKE: Lazy<Regex> = Lazy::new(|| re(r"(^|\W)-([^\s\-|].*[^\s\-|])-(\W|$)"));
static RE_UNDERLINE: Lazy<Regex> = Lazy::new(|| re(r"(^|\W)\+(\S.*\S)\+(\W|$)"));
static RE_INLINE_CODE: Lazy<Regex> = Lazy::new(|| re(r"(^|\W)\{\{([^}]*)}}(\W|$)"));

static HEADINGS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r"\n?\bh1\. "), "\n# "),
        (re(r"\n?\bh2\. "), "\n## "),
        (re(r"\n?\bh3\. "), "\n### "),
        (re(r"\n?\bh4\. "), "\n#### "),
        (re(r"\n?\bh5\. "), "\n##### "),
        (re(r"\n?\bh6\. "), "\n###### "),
    ]
});

// Fixed emoji shortcode table. Jira's graphical emoticons map onto
// GitLab's :shortcode: set; unmatched ones pass through untouched.
static EMOJIS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (re(r":\)"), ":smiley:"),
        (re(r":\("), ":disappointed:"),
        (re(r":P"), ":yum:"),
        (re(r":D"), ":grin:"),
        (re(r";\)"), ":wink:"),
        (re(r"\(y\)"), ":thumbsup:"),
        (re(r"\(n\)"), ":thumbsdown:"),
        (re(r"\(i\)"), ":information_source:"),
        (re(r"\(/\)"), ":white_check_mark:"),
        (re(r"\(x\)"), ":x:"),
        (re(r"\(!\)"), ":warning:"),
        (re(r"\(\+\)"), ":heavy_plus_sign:"),
        (re(r"\(-\)"), ":heavy_minus_sign:"),
        (re(r"\(\?\)"), ":grey_question:"),
        (re(r"\(on\)"), ":bulb:"),
        (re(r"\(\*[rgby]?\)"), ":star:"),
    ]
});

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("hardcoded pattern compiles")
}

/// Translates Jira wiki markup into GitLab markdown.
///
/// Rules are applied in a fixed order. Each rule is a pure rewrite that
/// degrades gracefully: malformed input simply fails to match and is
/// passed through unchanged. There are no error paths.
pub struct MarkupTranslator {
    jira_url: String,
    force_repair_tables: bool,
}

impl MarkupTranslator {
    /// Creates a translator.
    ///
    /// `jira_url` is used to rewrite same-project issue-key references
    /// into absolute links back to the source instance.
    #[must_use]
    pub fn new(jira_url: impl Into<String>, force_repair_tables: bool) -> Self {
        Self {
            jira_url: jira_url.into(),
            force_repair_tables,
        }
    }

    /// Translates a text blob. `None` input yields an empty string.
    #[must_use]
    pub fn translate(
        &self,
        jira_project: &str,
        text: Option<&str>,
        replacements: &[Replacement],
    ) -> String {
        let Some(text) = text else {
            return String::new();
        };

        // Tables
        let t = tables::convert_tables(text, self.force_repair_tables);

        // Sections and links
        let t = RE_LINE_BREAK.replace_all(&t, "  ${1}");
        let t = RE_CODE_SIMPLE.replace_all(&t, "\n```\n");
        let t = RE_CODE_LANG.replace_all(&t, "\n```${1}\n");
        let t = RE_CODE_ANY.replace_all(&t, "\n```\n");
        let t = RE_BLOCK_QUOTE.replace_all(&t, "\n> ${1}\n");
        let t = RE_QUOTE_TAG.replace_all(&t, "\n>>>\n");
        let t = RE_COLOR.replace_all(&t, "> **${1}**");
        let t = RE_RULER.replace_all(&t, "---");
        let t = RE_USER_LINK.replace_all(&t, "@${1}");
        let t = RE_BARE_LINK.replace_all(&t, "${1}");
        let t = RE_ALIASED_LINK.replace_all(&t, "[${1}](${2})");
        let t = self.link_issue_keys(&t, jira_project);

        // Lists
        let t = RE_ORDERED.replace_all(&t, "\n 1. ");
        let t = RE_ORDERED_SUB.replace_all(&t, "\n   1. ");
        let t = RE_ORDERED_SUBSUB.replace_all(&t, "\n     1. ");
        let t = RE_UNORDERED.replace_all(&t, "\n - ");
        let t = RE_UNORDERED_SUB.replace_all(&t, "\n   - ");
        let t = RE_UNORDERED_SUBSUB.replace_all(&t, "\n     - ");

        // Text effects
        let t = RE_BOLD.replace_all(&t, "${1}**${2}**${3}");
        let t = RE_EMPHASIS.replace_all(&t, "${1}*${2}*${3}");
        let t = RE_STRIKE.replace_all(&t, "${1}~~${2}~~${3}");
        let t = RE_UNDERLINE.replace_all(&t, "${1}__${2}__${3}");
        let t = RE_INLINE_CODE.replace_all(&t, "${1}`${2}`${3}");

        // Headings
        let mut t = t.into_owned();
        for (pattern, markdown) in HEADINGS.iter() {
            t = pattern.replace_all(&t, *markdown).into_owned();
        }

        // Emojis
        for (pattern, shortcode) in EMOJIS.iter() {
            t = pattern.replace_all(&t, *shortcode).into_owned();
        }

        // Attachment replacements go last so earlier rules cannot
        // rewrite the generated markup.
        for replacement in replacements {
            t = replacement
                .pattern
                .replace_all(&t, NoExpand(&replacement.markup))
                .into_owned();
        }

        t
    }

    /// Rewrites bare same-project issue keys (e.g. `PROJ-12`) into
    /// absolute links back to the Jira instance.
    fn link_issue_keys<'a>(&self, text: &'a str, jira_project: &str) -> std::borrow::Cow<'a, str> {
        let Ok(pattern) = Regex::new(&format!(r"\b({}-\d+)\b", regex::escape(jira_project))) else {
            return std::borrow::Cow::Borrowed(text);
        };
        let link = format!("[${{1}}]({}/browse/${{1}})", self.jira_url);
        match pattern.replace_all(text, link.as_str()) {
            std::borrow::Cow::Borrowed(_) => std::borrow::Cow::Borrowed(text),
            std::borrow::Cow::Owned(s) => std::borrow::Cow::Owned(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> MarkupTranslator {
        MarkupTranslator::new("https://jira.example.com", false)
    }

    fn convert(text: &str) -> String {
        translator().translate("PROJ", Some(text), &[])
    }

    #[test]
    fn absent_text_yields_empty_string() {
        assert_eq!(translator().translate("PROJ", None, &[]), "");
    }

    #[test]
    fn converts_headings() {
        assert_eq!(convert("h1. Title"), "\n# Title");
        assert_eq!(convert("h3. Deep"), "\n### Deep");
    }

    #[test]
    fn converts_code_blocks() {
        assert_eq!(convert("{code}x = 1{code}"), "\n```\nx = 1\n```\n");
        assert_eq!(convert("{code:java}x;{code}"), "\n```java\nx;\n```\n");
        // Unknown properties bail out to a plain fence.
        assert_eq!(convert("{code:title=Foo.java}x;{code}"), "\n```\nx;\n```\n");
    }

    #[test]
    fn converts_text_effects() {
        assert_eq!(convert("a *bold* b"), "a **bold** b");
        assert_eq!(convert("a _soft_ b"), "a *soft* b");
        assert_eq!(convert("a -gone- b"), "a ~~gone~~ b");
        assert_eq!(convert("a +under+ b"), "a __under__ b");
        assert_eq!(convert("a {{code}} b"), "a `code` b");
    }

    #[test]
    fn converts_links() {
        assert_eq!(convert("ping [~alice]"), "ping @alice");
        assert_eq!(convert("see [http://x.io]"), "see http://x.io");
        assert_eq!(
            convert("see [docs|https://x.io/docs]"),
            "see [docs](https://x.io/docs)"
        );
    }

    #[test]
    fn rewrites_same_project_issue_keys() {
        assert_eq!(
            convert("relates to PROJ-42, see there"),
            "relates to [PROJ-42](https://jira.example.com/browse/PROJ-42), see there"
        );
        // Other projects are left alone.
        assert_eq!(convert("see OTHER-7"), "see OTHER-7");
    }

    #[test]
    fn converts_lists() {
        assert_eq!(convert("\n# first\n# second"), "  \n 1. first  \n 1. second");
        assert_eq!(convert("\n* bullet"), "  \n - bullet");
        assert_eq!(convert("\n** nested"), "  \n   - nested");
    }

    #[test]
    fn converts_emoji_shortcodes() {
        assert_eq!(convert("ok :) (y)"), "ok :smiley: :thumbsup:");
        assert_eq!(convert("warn (!) star (*r)"), "warn :warning: star :star:");
    }

    #[test]
    fn adds_markdown_line_breaks() {
        assert_eq!(convert("one\ntwo"), "one  \ntwo");
    }

    #[test]
    fn converts_block_quotes_and_colors() {
        assert_eq!(convert("x\nbq. quoted\ny"), "x  \n> quoted  \ny");
        assert_eq!(convert("{color:red}hot{color}"), "> **hot**");
    }

    #[test]
    fn applies_replacements_last_and_literally() {
        let replacement = Replacement {
            pattern: Regex::new(&format!("!{}[^!]*!", regex::escape("shot.png"))).unwrap(),
            markup: "![shot.png](https://gitlab.example.com/uploads/abc/shot.png)".to_string(),
        };
        let out = translator().translate("PROJ", Some("see !shot.png|thumbnail!"), &[replacement]);
        assert_eq!(
            out,
            "see ![shot.png](https://gitlab.example.com/uploads/abc/shot.png)"
        );
    }

    #[test]
    fn malformed_markup_degrades_gracefully() {
        // An unterminated effect simply doesn't match.
        assert_eq!(convert("a *halfbold"), "a *halfbold");
        assert_eq!(convert("{color:red}unclosed"), "{color:red}unclosed");
    }

    #[test]
    fn table_conversion_is_wired_in() {
        let out = convert("||a||b||\n|1|2|");
        assert!(out.contains("|a|b|"));
        assert!(out.contains("| --- | --- |"));
    }
}
