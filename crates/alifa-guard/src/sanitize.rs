//! Content and filename sanitization.

use std::collections::{HashMap, HashSet};

/// Inline markup kept in user content. Everything else is stripped.
pub const ALLOWED_TAGS: &[&str] = &["p", "br", "strong", "em", "u", "a"];

/// The only attribute kept, and only on links.
pub const LINK_ATTRIBUTES: &[&str] = &["href"];

const MAX_FILENAME_CHARS: usize = 255;

fn content_policy() -> ammonia::Builder<'static> {
    let mut builder = ammonia::Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .tag_attributes(HashMap::from([("a", LINK_ATTRIBUTES.iter().copied().collect())]))
        .generic_attributes(HashSet::new())
        .link_rel(None);
    builder
}

/// Upper bound on cleaning passes. Tree repair settles within two or three.
const MAX_CLEAN_PASSES: usize = 8;

/// Strips markup outside the allow-list and every attribute except a link's
/// `href`. Text is kept, `<script>` and `<style>` bodies are dropped.
///
/// The parser repairs malformed trees (e.g. `<a>` nested in `<a>`) into
/// markup that a second parse restructures again, so cleaning is repeated
/// until the output is stable.
pub fn sanitize_content(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let policy = content_policy();
    let mut current = policy.clean(text).to_string();
    for _ in 1..MAX_CLEAN_PASSES {
        let next = policy.clean(&current).to_string();
        if next == current {
            return current;
        }
        current = next;
    }
    tracing::warn!(passes = MAX_CLEAN_PASSES, "sanitized content did not settle");
    current
}

/// Maps every char outside `[A-Za-z0-9.-]` to `_`, collapses `_` runs and
/// truncates to 255 chars.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len().min(MAX_FILENAME_CHARS));
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.truncate(MAX_FILENAME_CHARS);
    out
}
