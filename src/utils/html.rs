//! Text-level HTML helpers: alias references and tag injection.
//!
//! Rendered documents are never parsed into a tree. References are found by
//! attribute pattern and rewritten in place; tags are spliced in before the
//! closing `</head>` / `</body>`.

use regex::{Captures, Regex};
use std::{borrow::Cow, sync::LazyLock};

/// `src="@…"`, `href='@…'`, `poster=…`, `data-src=…`
static ATTR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\s(?:src|href|poster|data-src)\s*=\s*)(["'])(@[^"']*)(["'])"#).unwrap()
});

/// `url(@…)` with optional quotes, used inside stylesheets.
static CSS_URL_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*(["']?)(@[^"')\s]+)(["']?)\s*\)"#).unwrap());

/// Split a reference into path and suffix (`?query` / `#fragment`).
pub fn split_suffix(reference: &str) -> (&str, &str) {
    match reference.find(['?', '#']) {
        Some(pos) => reference.split_at(pos),
        None => (reference, ""),
    }
}

/// All alias references in attribute values, in document order, without
/// their `?query`/`#fragment` suffix.
pub fn attribute_references(html: &str) -> Vec<String> {
    ATTR_REFERENCE
        .captures_iter(html)
        .map(|c| split_suffix(&c[3]).0.to_owned())
        .collect()
}

/// All alias references inside `url(...)` in a stylesheet.
pub fn css_references(css: &str) -> Vec<String> {
    CSS_URL_REFERENCE
        .captures_iter(css)
        .map(|c| split_suffix(&c[2]).0.to_owned())
        .collect()
}

/// Rewrite attribute references with `resolve`; unresolved ones are kept.
pub fn rewrite_attribute_references(
    html: &str,
    resolve: impl Fn(&str) -> Option<String>,
) -> Cow<'_, str> {
    ATTR_REFERENCE.replace_all(html, |c: &Captures| {
        let (path, suffix) = split_suffix(&c[3]);
        match resolve(path) {
            Some(url) => format!("{}{}{url}{suffix}{}", &c[1], &c[2], &c[4]),
            None => c[0].to_owned(),
        }
    })
}

/// Rewrite `url(@…)` references with `resolve`; unresolved ones are kept.
pub fn rewrite_css_references(
    css: &str,
    resolve: impl Fn(&str) -> Option<String>,
) -> Cow<'_, str> {
    CSS_URL_REFERENCE.replace_all(css, |c: &Captures| {
        let (path, suffix) = split_suffix(&c[2]);
        match resolve(path) {
            Some(url) => format!("url({}{url}{suffix}{})", &c[1], &c[3]),
            None => c[0].to_owned(),
        }
    })
}

/// Insert `tags` right before `</head>`; without a head, at the very start.
pub fn inject_head(html: &str, tags: &str) -> String {
    if tags.is_empty() {
        return html.to_owned();
    }
    match find_ignore_case(html, "</head>") {
        Some(pos) => splice(html, pos, tags),
        None => format!("{tags}{html}"),
    }
}

/// Insert `tags` right before `</body>`; without a body, at the very end.
pub fn inject_body_end(html: &str, tags: &str) -> String {
    match find_ignore_case(html, "</body>") {
        Some(pos) => splice(html, pos, tags),
        None => format!("{html}{tags}"),
    }
}

fn splice(html: &str, pos: usize, tags: &str) -> String {
    let mut out = String::with_capacity(html.len() + tags.len());
    out.push_str(&html[..pos]);
    out.push_str(tags);
    out.push_str(&html[pos..]);
    out
}

/// Byte offset of the last case-insensitive match of an ASCII `needle`.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len())
        .rev()
        .find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_references() {
        let html = r#"<img src="@images/logo.png" alt="x"><a href='@/docs/a.pdf#p2'>a</a><a href="/about.html">b</a>"#;
        assert_eq!(
            attribute_references(html),
            vec!["@images/logo.png".to_string(), "@/docs/a.pdf".to_string()]
        );
    }

    #[test]
    fn test_rewrite_keeps_suffix_and_quotes() {
        let html = r#"<use href='@images/icons.svg#home'/>"#;
        let out = rewrite_attribute_references(html, |p| {
            (p == "@images/icons.svg").then(|| "/images/icons.abc.svg".to_string())
        });
        assert_eq!(out, r#"<use href='/images/icons.abc.svg#home'/>"#);
    }

    #[test]
    fn test_rewrite_unresolved_is_untouched() {
        let html = r#"<img src="@images/missing.png">"#;
        assert_eq!(rewrite_attribute_references(html, |_| None), html);
    }

    #[test]
    fn test_css_references_and_rewrite() {
        let css = r#"a{background:url("@images/bg.png")} @font-face{src:url(@fonts/x.woff2?v=1)}"#;
        assert_eq!(
            css_references(css),
            vec!["@images/bg.png".to_string(), "@fonts/x.woff2".to_string()]
        );
        let out = rewrite_css_references(css, |p| Some(p.replace('@', "/")));
        assert!(out.contains(r#"url("/images/bg.png")"#));
        assert!(out.contains("url(/fonts/x.woff2?v=1)"));
    }

    #[test]
    fn test_inject_head() {
        let html = "<html><HEAD><title>t</title></HEAD><body></body></html>";
        let out = inject_head(html, "<link>");
        assert_eq!(out, "<html><HEAD><title>t</title><link></HEAD><body></body></html>");
    }

    #[test]
    fn test_inject_without_head_or_body() {
        assert_eq!(inject_head("<p>x</p>", "<script></script>"), "<script></script><p>x</p>");
        assert_eq!(inject_body_end("<p>x</p>", "<s>"), "<p>x</p><s>");
    }

    #[test]
    fn test_inject_body_end() {
        let out = inject_body_end("<body><p>x</p></body>", "<script>r()</script>");
        assert_eq!(out, "<body><p>x</p><script>r()</script></body>");
    }
}
