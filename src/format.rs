//! Markdown stripping for plain-text output.
//!
//! Models answer in markdown regardless of what the caller wants; when the
//! requested output format is plain text, the registry runs the buffered
//! content through this stripper before delivery.

use regex::Regex;
use std::sync::LazyLock;

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[\s\S]*?```").expect("valid regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("valid regex"));
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.*)$").expect("valid regex"));
static BOLD_STARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));
static BOLD_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__(.*?)__").expect("valid regex"));
static ITALIC_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("valid regex"));
static ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(.*?)_").expect("valid regex"));
static STRIKETHROUGH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~(.*?)~~").expect("valid regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"));
static HORIZONTAL_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[-*]{3,}$").expect("valid regex"));
static BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^>\s*").expect("valid regex"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[\s]*[-*+]\s+").expect("valid regex"));
static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[\s]*\d+\.\s+").expect("valid regex"));
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Strip markdown formatting, keeping the underlying text.
pub fn strip_markdown(text: &str) -> String {
    if text.is_empty() {
        return text.to_string();
    }

    // Fenced blocks keep their inner lines, losing the fences and the
    // language tag.
    let mut result = CODE_BLOCK
        .replace_all(text, |caps: &regex::Captures| {
            let lines: Vec<&str> = caps[0].split('\n').collect();
            if lines.len() > 2 {
                lines[1..lines.len() - 1].join("\n")
            } else {
                String::new()
            }
        })
        .to_string();

    result = INLINE_CODE.replace_all(&result, "$1").to_string();
    result = HEADER.replace_all(&result, "$1").to_string();
    result = BOLD_STARS.replace_all(&result, "$1").to_string();
    result = BOLD_UNDERSCORES.replace_all(&result, "$1").to_string();
    result = ITALIC_STAR.replace_all(&result, "$1").to_string();
    result = ITALIC_UNDERSCORE.replace_all(&result, "$1").to_string();
    result = STRIKETHROUGH.replace_all(&result, "$1").to_string();
    result = LINK.replace_all(&result, "$1").to_string();
    result = HORIZONTAL_RULE.replace_all(&result, "").to_string();
    result = BLOCKQUOTE.replace_all(&result, "").to_string();
    result = BULLET.replace_all(&result, "").to_string();
    result = NUMBERED.replace_all(&result, "").to_string();
    result = EXCESS_NEWLINES.replace_all(&result, "\n\n").to_string();

    result.trim().to_string()
}
