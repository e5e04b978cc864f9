//! Single-name block matching over raw post content.
//!
//! A block is written as
//! ```text
//! <!-- wp:acme/card {"size":"large"} -->inner html<!-- /wp:acme/card -->
//! ```
//! or, with no inner content, `<!-- wp:acme/card {"size":"large"} /-->`.
//!
//! Pairing is non-greedy: the first close marker carrying the same name ends
//! the block. Nested blocks of the *same* name therefore mis-pair, the outer
//! open is closed by the inner close and the trailing outer close is left
//! behind as plain text. Blocks of other names nested inside are untouched
//! and show up in the body.

use std::ops::Range;

use regex::{CaptureMatches, Regex};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// Compiled matcher for one block name.
#[derive(Debug, Clone)]
pub struct BlockMarker {
    name: String,
    re: Regex,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedBlock<'t> {
    pub name: &'t str,
    pub attributes: Option<Map<String, Value>>,
    /// Raw text between the open and close markers; empty for void blocks.
    pub body: &'t str,
    /// Byte range of the whole block, markers included.
    pub span: Range<usize>,
}

/// Result of stripping every block of one name from a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub content: String,
    pub removed: usize,
}

impl BlockMarker {
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::MissingMarkerName);
        }
        if name.chars().any(char::is_whitespace) || name.contains("-->") {
            return Err(Error::InvalidMarkerName(name.to_string()));
        }

        let n = regex::escape(name);
        let pattern = format!(
            r"(?s)<!-- wp:{n}\s*(\{{.*?\}})?\s*(?:/-->|-->(.*?)<!-- /wp:{n} -->)",
            n = n
        );
        let re = Regex::new(&pattern).map_err(|_| Error::InvalidMarkerName(name.to_string()))?;
        Ok(BlockMarker {
            name: name.to_string(),
            re,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cheap literal used to pre-filter rows before running the regex.
    pub fn search_needle(&self) -> String {
        format!("wp:{}", self.name)
    }

    /// The literal open marker prefix, `<!-- wp:<name>`.
    pub fn open_marker(&self) -> String {
        format!("<!-- wp:{}", self.name)
    }

    /// Lazily yields every block of this name in document order.
    pub fn extract<'m, 't>(&'m self, text: &'t str) -> Blocks<'m, 't> {
        Blocks {
            name: &self.name,
            inner: self.re.captures_iter(text),
        }
    }

    /// Deletes every block of this name. Text outside the matched spans is
    /// kept byte for byte. Passes repeat until nothing matches, so text that
    /// joins into a new block once its neighbour is cut goes too.
    pub fn remove_all(&self, text: &str) -> Removal {
        let mut removal = self.remove_pass(text);
        let mut removed = removal.removed;
        while removal.removed > 0 {
            removal = self.remove_pass(&removal.content);
            removed += removal.removed;
        }
        Removal {
            content: removal.content,
            removed,
        }
    }

    fn remove_pass(&self, text: &str) -> Removal {
        let mut content = String::with_capacity(text.len());
        let mut last = 0;
        let mut removed = 0;
        for m in self.re.find_iter(text) {
            content.push_str(&text[last..m.start()]);
            last = m.end();
            removed += 1;
        }
        content.push_str(&text[last..]);
        Removal { content, removed }
    }
}

pub struct Blocks<'m, 't> {
    name: &'m str,
    inner: CaptureMatches<'m, 't>,
}

impl<'m, 't> Iterator for Blocks<'m, 't> {
    type Item = ExtractedBlock<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let caps = self.inner.next()?;
        let whole = caps.get(0)?;
        let text = whole.as_str();
        // Borrow the name out of the haystack so the block outlives the matcher.
        let name_start = "<!-- wp:".len();
        let name = &text[name_start..name_start + self.name.len()];
        let attributes = caps.get(1).and_then(|m| decode_attributes(m.as_str()));
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        Some(ExtractedBlock {
            name,
            attributes,
            body,
            span: whole.range(),
        })
    }
}

fn decode_attributes(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "block attributes are not valid JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(name: &str) -> BlockMarker {
        BlockMarker::new(name).unwrap()
    }

    #[test]
    fn extracts_name_attributes_and_body() {
        let text = r#"<p>intro</p><!-- wp:acme/card {"a":1} --><div>inside</div><!-- /wp:acme/card --><p>outro</p>"#;
        let blocks: Vec<_> = marker("acme/card").extract(text).collect();
        assert_eq!(blocks.len(), 1);
        let b = &blocks[0];
        assert_eq!(b.name, "acme/card");
        assert_eq!(b.attributes.as_ref().unwrap()["a"], serde_json::json!(1));
        assert_eq!(b.body, "<div>inside</div>");
        assert_eq!(&text[b.span.clone()], r#"<!-- wp:acme/card {"a":1} --><div>inside</div><!-- /wp:acme/card -->"#);
    }

    #[test]
    fn sequential_blocks_are_disjoint() {
        let text = "<!-- wp:x -->one<!-- /wp:x -->\n<!-- wp:x -->two<!-- /wp:x -->";
        let blocks: Vec<_> = marker("x").extract(text).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].body, "one");
        assert_eq!(blocks[1].body, "two");
        assert!(blocks[0].span.end <= blocks[1].span.start);
        assert!(blocks[0].attributes.is_none());
    }

    #[test]
    fn body_spans_lines() {
        let text = "<!-- wp:core/list -->\n<ul>\n<li>a</li>\n</ul>\n<!-- /wp:core/list -->";
        let b = marker("core/list").extract(text).next().unwrap();
        assert_eq!(b.body, "\n<ul>\n<li>a</li>\n</ul>\n");
    }

    #[test]
    fn nested_attribute_object() {
        let text = r#"<!-- wp:x {"style":{"color":{"text":"red"}},"n":2} -->b<!-- /wp:x -->"#;
        let b = marker("x").extract(text).next().unwrap();
        let attrs = b.attributes.unwrap();
        assert_eq!(attrs["style"]["color"]["text"], "red");
        assert_eq!(attrs["n"], 2);
    }

    #[test]
    fn void_block_has_empty_body() {
        let text = r#"a<!-- wp:core/spacer {"height":"20px"} /-->b"#;
        let b = marker("core/spacer").extract(text).next().unwrap();
        assert_eq!(b.body, "");
        assert_eq!(b.attributes.unwrap()["height"], "20px");
    }

    #[test]
    fn name_prefix_does_not_match_longer_name() {
        let text = "<!-- wp:core/image-gallery -->g<!-- /wp:core/image-gallery -->";
        assert_eq!(marker("core/image").extract(text).count(), 0);
    }

    #[test]
    fn unmatched_open_yields_nothing() {
        let text = "<!-- wp:x -->never closed";
        assert_eq!(marker("x").extract(text).count(), 0);
    }

    #[test]
    fn name_is_matched_literally() {
        let text = "<!-- wp:acme/a+b -->ok<!-- /wp:acme/a+b --><!-- wp:acme/aab -->no<!-- /wp:acme/aab -->";
        let blocks: Vec<_> = marker("acme/a+b").extract(text).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "ok");
    }

    #[test]
    fn invalid_json_attributes_are_dropped() {
        let text = "<!-- wp:x {not json} -->body<!-- /wp:x -->";
        let b = marker("x").extract(text).next().unwrap();
        assert!(b.attributes.is_none());
        assert_eq!(b.body, "body");
    }

    #[test]
    fn same_name_nesting_mis_pairs() {
        let text = "<!-- wp:x -->A<!-- wp:x -->B<!-- /wp:x -->C<!-- /wp:x -->";
        let blocks: Vec<_> = marker("x").extract(text).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "A<!-- wp:x -->B");
        let removal = marker("x").remove_all(text);
        assert_eq!(removal.content, "C<!-- /wp:x -->");
    }

    #[test]
    fn removal_catches_blocks_formed_by_a_cut() {
        let m = marker("x");
        let text = "<!-- wp:<!-- wp:x -->y<!-- /wp:x -->x -->z<!-- /wp:x -->";
        let once = m.remove_all(text);
        assert_eq!(once.content, "");
        assert_eq!(once.removed, 2);
        assert_eq!(m.remove_all(&once.content).removed, 0);
    }

    #[test]
    fn removal_keeps_surrounding_text() {
        let removal = marker("x").remove_all(r#"A<!-- wp:x {"k":"v"} -->inner<!-- /wp:x -->B"#);
        assert_eq!(removal.content, "AB");
        assert_eq!(removal.removed, 1);
    }

    #[test]
    fn removal_is_idempotent() {
        let m = marker("core/quote");
        let text = "<!-- wp:core/paragraph --><p>p</p><!-- /wp:core/paragraph -->\n\
                    <!-- wp:core/quote --><blockquote>q1</blockquote><!-- /wp:core/quote -->\n\
                    <!-- wp:core/quote /-->\n\
                    <!-- wp:core/quote --><blockquote>q2</blockquote><!-- /wp:core/quote -->";
        let once = m.remove_all(text);
        assert_eq!(once.removed, 3);
        assert!(!once.content.contains(&m.open_marker()));
        let twice = m.remove_all(&once.content);
        assert_eq!(twice.removed, 0);
        assert_eq!(twice.content, once.content);
        assert!(once.content.contains("<p>p</p>"));
    }

    #[test]
    fn fixture_post_extraction() {
        let content = std::fs::read_to_string("tests/fixtures/post_with_cards.html").unwrap();
        let blocks: Vec<_> = marker("acme/card").extract(&content).collect();
        assert_eq!(blocks.len(), 3);
        assert!(blocks.windows(2).all(|w| w[0].span.end <= w[1].span.start));
        assert_eq!(blocks[2].attributes, None);
    }

    #[test]
    fn empty_and_spaced_names_rejected() {
        assert!(matches!(BlockMarker::new("  "), Err(Error::MissingMarkerName)));
        assert!(matches!(BlockMarker::new("a b"), Err(Error::InvalidMarkerName(_))));
    }
}
