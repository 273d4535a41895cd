//! Minification for emitted documents, stylesheets and scripts.
//!
//! Everything here is lossy-safe: whitespace and comments go, structure and
//! attribute semantics stay. Each entry point takes the [`BuildMode`] and is
//! the identity transform in development.

use crate::{log, mode::BuildMode};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use regex::Regex;
use std::{borrow::Cow, sync::LazyLock};

/// Start of a `console.*(` call; the argument list is matched by hand.
static CONSOLE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bconsole\.(?:log|debug|info|warn|error|trace|dir|table|time|timeEnd|group|groupEnd)\s*\(")
        .unwrap()
});

// ============================================================================
// HTML
// ============================================================================

/// Minify an HTML document.
///
/// Returns `Cow::Borrowed` in development, `Cow::Owned` in production.
pub fn minify_html(html: &[u8], mode: BuildMode) -> Cow<'_, [u8]> {
    if !mode.minify() {
        return Cow::Borrowed(html);
    }

    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_input_type_text_attr = true;
    cfg.keep_comments = false;
    cfg.minify_doctype = true;
    cfg.minify_css = true;
    cfg.minify_js = true;
    Cow::Owned(minify_html::minify(html, &cfg))
}

// ============================================================================
// CSS
// ============================================================================

/// Minify a stylesheet with `lightningcss`.
///
/// A stylesheet it cannot parse is returned unchanged with a warning.
pub fn minify_css(css: &str, mode: BuildMode) -> Cow<'_, str> {
    if !mode.minify() {
        return Cow::Borrowed(css);
    }

    match try_minify_css(css) {
        Ok(min) => Cow::Owned(min),
        Err(err) => {
            log!("warn"; "stylesheet left unminified: {err}");
            Cow::Borrowed(css)
        }
    }
}

fn try_minify_css(css: &str) -> Result<String, String> {
    let mut sheet = StyleSheet::parse(css, ParserOptions::default()).map_err(|e| e.to_string())?;
    sheet
        .minify(MinifyOptions::default())
        .map_err(|e| e.to_string())?;
    let printer = PrinterOptions {
        minify: true,
        ..PrinterOptions::default()
    };
    sheet
        .to_css(printer)
        .map(|out| out.code)
        .map_err(|e| e.to_string())
}

// ============================================================================
// JS
// ============================================================================

/// Remove `console.*(...)` expression statements.
///
/// Only a call that starts a statement, has balanced parentheses and ends
/// the statement (`;`, newline, `}` or end of input) is removed; code after
/// it on the same line stays. Newlines inside the call are kept so line-level
/// source maps stay exact.
pub fn drop_console(js: &str, mode: BuildMode) -> Cow<'_, str> {
    if !mode.drop_console() {
        return Cow::Borrowed(js);
    }

    let mut out = String::new();
    let mut cursor = 0;
    for call in CONSOLE_CALL.find_iter(js) {
        if call.start() < cursor || !starts_statement(&js[..call.start()]) {
            continue;
        }
        let Some(end) = closing_paren(js, call.end()).and_then(|close| statement_end(js, close)) else {
            continue;
        };
        out.push_str(&js[cursor..call.start()]);
        out.extend(js[call.start()..end].matches('\n').map(|_| '\n'));
        cursor = end;
    }

    if cursor == 0 {
        return Cow::Borrowed(js);
    }
    out.push_str(&js[cursor..]);
    Cow::Owned(out)
}

/// Whether code ending in `before` leaves us at the start of a statement.
fn starts_statement(before: &str) -> bool {
    before
        .trim_end_matches([' ', '\t'])
        .chars()
        .last()
        .is_none_or(|c| matches!(c, '\n' | ';' | '{' | '}'))
}

/// Byte offset just past the `)` closing the call opened before `from`.
fn closing_paren(js: &str, from: usize) -> Option<usize> {
    let bytes = js.as_bytes();
    let mut depth = 1usize;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// End of the statement whose call closed at `close`, or `None` if the
/// expression continues (`console.log(x) || y`).
fn statement_end(js: &str, close: usize) -> Option<usize> {
    let rest = &js[close..];
    let trimmed = rest.trim_start_matches([' ', '\t']);
    let ws = rest.len() - trimmed.len();
    match trimmed.chars().next() {
        Some(';') => Some(close + ws + 1),
        None | Some('\n' | '\r' | '}') => Some(close + ws),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
