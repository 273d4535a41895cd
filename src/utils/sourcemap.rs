//! Line-level source maps (revision 3).
//!
//! Chunks are built by concatenating module sources verbatim, so every
//! generated line either maps to column 0 of one original line or to
//! nothing (runtime and wrapper lines).

use crate::mode::SourceMapPolicy;
use serde::Serialize;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    sources: Vec<String>,
    contents: Vec<String>,
    /// One entry per generated line: `(source index, original line)`.
    lines: Vec<Option<(usize, usize)>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceMapJson<'a> {
    version: u8,
    file: &'a str,
    sources: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    sources_content: Option<&'a [String]>,
    names: [&'a str; 0],
    mappings: String,
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for generated lines that have no original.
    pub fn add_unmapped(&mut self, text: &str) {
        self.lines.extend(std::iter::repeat_n(None, line_count(text)));
    }

    /// Account for `text`, copied line for line from `source`.
    pub fn add_source(&mut self, source: &str, original: &str, text: &str) {
        let index = self.sources.len();
        self.sources.push(source.to_owned());
        self.contents.push(original.to_owned());
        self.lines
            .extend((0..line_count(text)).map(|line| Some((index, line))));
    }

    /// Number of generated lines accounted for so far.
    pub fn generated_lines(&self) -> usize {
        self.lines.len()
    }

    /// Serialize the map for the generated file `file`.
    pub fn to_json(&self, file: &str, policy: SourceMapPolicy) -> String {
        let map = SourceMapJson {
            version: 3,
            file,
            sources: &self.sources,
            sources_content: matches!(policy, SourceMapPolicy::Verbose).then_some(&self.contents[..]),
            names: [],
            mappings: self.mappings(),
        };
        serde_json::to_string(&map).unwrap_or_default()
    }

    /// `;`-separated lines, each holding at most one `[0, src, line, 0]` segment.
    fn mappings(&self) -> String {
        let mut out = String::new();
        let (mut prev_source, mut prev_line) = (0i64, 0i64);

        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            if let Some((source, original)) = *line {
                let (source, original) = (source as i64, original as i64);
                encode_vlq(&mut out, 0);
                encode_vlq(&mut out, source - prev_source);
                encode_vlq(&mut out, original - prev_line);
                encode_vlq(&mut out, 0);
                prev_source = source;
                prev_line = original;
            }
        }
        out
    }
}

/// Lines `text` will occupy once followed by a newline.
fn line_count(text: &str) -> usize {
    text.lines().count().max(1)
}

fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (vlq & 0b1_1111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(value: i64) -> String {
        let mut s = String::new();
        encode_vlq(&mut s, value);
        s
    }

    #[test]
    fn test_vlq_known_values() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(-17), "jB");
    }

    #[test]
    fn test_mappings_skip_unmapped_lines() {
        let mut map = SourceMapBuilder::new();
        map.add_unmapped("runtime();");
        map.add_source("a.js", "x\ny", "x\ny");
        map.add_unmapped("});");
        map.add_source("b.js", "z", "z");

        assert_eq!(map.generated_lines(), 5);
        // line 2 starts a.js@0, line 3 is a.js@1, line 5 jumps to b.js@0
        assert_eq!(map.mappings(), ";AAAA;AACA;;ACDA");
    }

    #[test]
    fn test_policy_controls_sources_content() {
        let mut map = SourceMapBuilder::new();
        map.add_source("src/js/main.js", "go()", "go()");

        let verbose = map.to_json("main.js", SourceMapPolicy::Verbose);
        let standard = map.to_json("main.js", SourceMapPolicy::Standard);

        assert!(verbose.contains(r#""sourcesContent":["go()"]"#));
        assert!(!standard.contains("sourcesContent"));
        assert!(standard.contains(r#""sources":["src/js/main.js"]"#));
        assert!(standard.contains(r#""version":3"#));
    }
}
