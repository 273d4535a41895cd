//! Module syntax.
//!
//! Finds the dependencies of a script (`import`, `export … from`,
//! `require()`) and lowers its ES module syntax to calls into the chunk
//! registry, so a module body can run inside a plain function wrapper.
//!
//! Lowering is line-preserving: every replaced statement keeps the number of
//! newlines it spanned, which keeps line-level source maps exact. Only
//! top-level statement forms are recognized; anything else passes through
//! untouched.

use regex::{Captures, Regex};
use serde_json::Value;
use std::{ops::Range, sync::LazyLock};

/// Global registry object shared by all chunks on a page.
pub const REGISTRY: &str = "__pagewright__";

/// `import "x";`
static SIDE_EFFECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*import[ \t]*["']([^"'\n]+)["'][ \t]*;?"#).unwrap()
});

/// `import a, { b as c } from "x";`, `import * as ns from "x";`
static IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+([\w$*{][^'";]*?)\s*from\s*["']([^"'\n]+)["'][ \t]*;?"#)
        .unwrap()
});

/// `export * from "x";`, `export * as ns from "x";`, `export { a } from "x";`
static EXPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*export\s*(\*(?:\s*as\s+[\w$]+)?|\{[^}]*\})\s*from\s*["']([^"'\n]+)["'][ \t]*;?"#,
    )
    .unwrap()
});

/// `require("x")` anywhere.
static REQUIRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\brequire\(\s*["']([^"'\n]+)["']\s*\)"#).unwrap());

static EXPORT_DEFAULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)export\s+default\s+").unwrap());

static EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+((?:async\s+)?function\*?|class|const|let|var)\s+([\w$]+)")
        .unwrap()
});

static EXPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*export\s*\{([^}]*)\}[ \t]*;?").unwrap());

static RENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\w$]+)\s+as\s+([\w$]+)").unwrap());

/// Statement shape of one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportForm {
    /// `import "x"`
    SideEffect,
    /// `import <clause> from "x"`
    Bindings(String),
    /// `export <clause> from "x"`
    ReExport(String),
    /// `require("x")`
    Require,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSite {
    pub range: Range<usize>,
    pub specifier: String,
    pub form: ImportForm,
}

/// Dependencies of `source` in order of appearance. Matches starting inside
/// a comment or string literal are ignored.
pub fn find_imports(source: &str) -> Vec<ImportSite> {
    let inert = inert_ranges(source);
    let mut sites: Vec<ImportSite> = Vec::new();
    let mut collect = |re: &Regex, form: fn(&Captures) -> ImportForm, spec: usize| {
        for caps in re.captures_iter(source) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            if inert.iter().any(|r| r.contains(&whole.start)) {
                continue;
            }
            sites.push(ImportSite {
                range: whole,
                specifier: caps[spec].to_owned(),
                form: form(&caps),
            });
        }
    };

    collect(&SIDE_EFFECT, |_| ImportForm::SideEffect, 1);
    collect(&IMPORT_FROM, |c| ImportForm::Bindings(c[1].trim().to_owned()), 2);
    collect(&EXPORT_FROM, |c| ImportForm::ReExport(c[1].trim().to_owned()), 2);
    collect(&REQUIRE, |_| ImportForm::Require, 1);

    sites.sort_by_key(|site| (site.range.start, std::cmp::Reverse(site.range.end)));
    let mut end = 0;
    sites.retain(|site| {
        let keep = site.range.start >= end;
        if keep {
            end = site.range.end;
        }
        keep
    });
    sites
}

/// Byte ranges of comments and string literals, in order.
///
/// A lexical pass only: regular expression literals are not recognized.
fn inert_ranges(source: &str) -> Vec<Range<usize>> {
    let bytes = source.as_bytes();
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        match (bytes[i], bytes.get(i + 1)) {
            (b'/', Some(b'/')) => {
                i = source[i..].find('\n').map_or(bytes.len(), |n| i + n);
            }
            (b'/', Some(b'*')) => {
                i = source[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
            }
            (quote @ (b'"' | b'\'' | b'`'), _) => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    // plain strings end at the line
                    if bytes[i] == b'\n' && quote != b'`' {
                        break;
                    }
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
            }
            _ => {
                i += 1;
                continue;
            }
        }
        ranges.push(start..i);
    }
    ranges
}

/// What a dependency resolved to, as far as lowering cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// A script module registered under this id.
    Module(String),
    /// Handled outside the script registry (stylesheets).
    Detached,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lowered {
    /// Single-line export bindings, placed on the wrapper's opening line.
    pub prologue: String,
    pub body: String,
}

/// Lower `source` for the registry. Unresolved specifiers are left as-is.
pub fn lower(source: &str, target: impl Fn(&str) -> Option<ImportTarget>) -> Lowered {
    let sites = find_imports(source);
    let mut is_module = false;
    let mut body = String::with_capacity(source.len());
    let mut cursor = 0;

    for site in &sites {
        let original = &source[site.range.clone()];
        let Some(target) = target(&site.specifier) else {
            continue;
        };
        if site.form != ImportForm::Require {
            is_module = true;
        }
        body.push_str(&source[cursor..site.range.start]);
        body.push_str(&lower_site(site, &target, original));
        cursor = site.range.end;
    }
    body.push_str(&source[cursor..]);

    let (body, exports) = lower_exports(&body);
    is_module |= !exports.is_empty() || EXPORT_DEFAULT.is_match(&body);
    let body = EXPORT_DEFAULT
        .replace_all(&body, "${1}exports.default = ")
        .into_owned();

    let mut prologue = String::new();
    if is_module {
        prologue.push_str(r#"Object.defineProperty(exports, "__esModule", { value: true });"#);
        for (exported, local) in &exports {
            prologue.push_str(&format!(
                " {REGISTRY}.e(exports, {}, function () {{ return {local}; }});",
                quote(exported)
            ));
        }
    }
    Lowered { prologue, body }
}

fn lower_site(site: &ImportSite, target: &ImportTarget, original: &str) -> String {
    let id = match target {
        ImportTarget::Module(id) => id,
        ImportTarget::Detached => return keep_lines(String::new(), original),
    };
    let require = format!("require({})", quote(id));
    let indent: String = original
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect();

    let code = match &site.form {
        ImportForm::Require => require,
        ImportForm::SideEffect => format!("{indent}{require};"),
        ImportForm::Bindings(clause) => {
            format!("{indent}{}", import_bindings(&collapse(clause), &require))
        }
        ImportForm::ReExport(clause) => format!("{indent}{}", re_export(&collapse(clause), &require)),
    };
    keep_lines(code, original)
}

/// `a, { b as c }` → `const a = __pagewright__.d(R), { b: c } = R;`
fn import_bindings(clause: &str, require: &str) -> String {
    let (default, rest) = match clause.find(['{', '*']) {
        Some(0) => (None, clause),
        Some(i) => (Some(clause[..i].trim().trim_end_matches(',').trim()), &clause[i..]),
        None => (Some(clause.trim()), ""),
    };

    let mut decls = Vec::new();
    if let Some(ns) = rest.strip_prefix('*') {
        let ns = ns.trim().trim_start_matches("as").trim();
        decls.push(format!("{ns} = {require}"));
        if let Some(default) = default {
            decls.push(format!("{default} = {REGISTRY}.d({ns})"));
        }
    } else {
        if let Some(default) = default {
            decls.push(format!("{default} = {REGISTRY}.d({require})"));
        }
        let named = rest.trim();
        if named.starts_with('{') {
            decls.push(format!("{} = {require}", RENAME.replace_all(named, "$1: $2")));
        }
    }
    format!("const {};", decls.join(", "))
}

fn re_export(clause: &str, require: &str) -> String {
    if let Some(ns) = clause.strip_prefix('*') {
        let ns = ns.trim().trim_start_matches("as").trim();
        return if ns.is_empty() {
            format!("{REGISTRY}.star(exports, {require});")
        } else {
            format!("exports.{ns} = {require};")
        };
    }
    specifiers(clause)
        .map(|(local, exported)| format!("exports.{exported} = {require}.{local};"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip `export` from declarations and lists; return `(exported, local)`.
fn lower_exports(body: &str) -> (String, Vec<(String, String)>) {
    let mut exports = Vec::new();

    for caps in EXPORT_DECL.captures_iter(body) {
        exports.push((caps[3].to_owned(), caps[3].to_owned()));
    }
    let body = EXPORT_DECL.replace_all(body, "${1}${2} ${3}");

    for caps in EXPORT_LIST.captures_iter(&body) {
        exports.extend(specifiers(&caps[1]).map(|(local, exported)| (exported, local)));
    }
    let body = EXPORT_LIST.replace_all(&body, |caps: &Captures| keep_lines(String::new(), &caps[0]));

    (body.into_owned(), exports)
}

/// `{ a, b as c }` → `(a, a), (b, c)`
fn specifiers(clause: &str) -> impl Iterator<Item = (String, String)> + '_ {
    clause
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|spec| match spec.split_once(" as ") {
            Some((local, exported)) => (local.trim().to_owned(), exported.trim().to_owned()),
            None => (spec.to_owned(), spec.to_owned()),
        })
}

/// Multi-line clauses become one line; `keep_lines` restores the count.
fn collapse(clause: &str) -> String {
    clause.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pad `code` with the newlines `original` spanned.
fn keep_lines(mut code: String, original: &str) -> String {
    code.extend(std::iter::repeat_n('\n', original.matches('\n').count()));
    code
}

fn quote(s: &str) -> String {
    Value::String(s.to_owned()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(source: &str) -> Vec<String> {
        find_imports(source).into_iter().map(|s| s.specifier).collect()
    }

    fn module(spec: &str) -> Option<ImportTarget> {
        match spec {
            s if s.ends_with(".scss") => Some(ImportTarget::Detached),
            "missing" => None,
            s => Some(ImportTarget::Module(format!("src/{s}.js"))),
        }
    }

    #[test]
    fn test_find_imports_in_order() {
        let source = r#"import '../scss/main.scss';
import { a, b as c } from "./lib";
import def, * as ns from './ns';
export * from './reexport';
const legacy = require('legacy');
"#;
        assert_eq!(
            specs(source),
            ["../scss/main.scss", "./lib", "./ns", "./reexport", "legacy"]
        );
    }

    #[test]
    fn test_find_multiline_import() {
        let source = "import {\n  one,\n  two,\n} from './many';\nrun();\n";
        let sites = find_imports(source);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].form, ImportForm::Bindings("{\n  one,\n  two,\n}".into()));
    }

    #[test]
    fn test_comments_and_strings_are_not_dependencies() {
        let source = r#"// see require('fs')
/* import x from 'commented';
   import 'also-commented'; */
const hint = "call require('nope') yourself";
const tpl = `
import y from 'templated';
`;
const real = require('dep'); // require('trailing')
import z from './z';
"#;
        assert_eq!(specs(source), ["dep", "./z"]);
    }

    #[test]
    fn test_dynamic_import_is_not_a_dependency() {
        assert!(specs("const m = import('./lazy');").is_empty());
    }

    #[test]
    fn test_lower_imports() {
        let source = "import '../scss/main.scss';\nimport nav from 'nav';\nimport { a, b as c } from 'lib';\nimport * as ns from 'ns';\n";
        let lowered = lower(source, module);
        assert_eq!(
            lowered.body,
            "\nconst nav = __pagewright__.d(require(\"src/nav.js\"));\nconst { a, b: c } = require(\"src/lib.js\");\nconst ns = require(\"src/ns.js\");\n"
        );
        assert!(lowered.prologue.contains("__esModule"));
    }

    #[test]
    fn test_lower_preserves_line_count() {
        let source = "import {\n  one,\n  two,\n} from './many';\nexport {\n  one,\n};\nrun();\n";
        let lowered = lower(source, module);
        assert_eq!(lowered.body.lines().count(), source.lines().count());
        assert!(lowered.body.ends_with("run();\n"));
        assert!(lowered.prologue.contains(r#"__pagewright__.e(exports, "one""#));
    }

    #[test]
    fn test_lower_exports() {
        let source = "export const x = 1;\nexport function f() {}\nexport default class Widget {}\nconst y = 2;\nexport { y as why };\n";
        let lowered = lower(source, module);

        assert!(lowered.body.starts_with("const x = 1;\nfunction f() {}\nexports.default = class Widget {}\n"));
        for (name, local) in [("x", "x"), ("f", "f"), ("why", "y")] {
            assert!(
                lowered.prologue.contains(&format!(
                    "__pagewright__.e(exports, \"{name}\", function () {{ return {local}; }});"
                )),
                "{}",
                lowered.prologue
            );
        }
    }

    #[test]
    fn test_re_exports() {
        let lowered = lower("export * from 'a';\nexport { k as key } from 'b';\n", module);
        assert_eq!(
            lowered.body,
            "__pagewright__.star(exports, require(\"src/a.js\"));\nexports.key = require(\"src/b.js\").k;\n"
        );
    }

    #[test]
    fn test_commonjs_untouched_except_specifier() {
        let source = "const x = require('dep');\nmodule.exports = x;\n";
        let lowered = lower(source, module);
        assert_eq!(lowered.body, "const x = require(\"src/dep.js\");\nmodule.exports = x;\n");
        assert!(lowered.prologue.is_empty());
    }

    #[test]
    fn test_unresolved_left_verbatim() {
        let source = "import x from 'missing';\n";
        assert_eq!(lower(source, module).body, source);
    }
}
