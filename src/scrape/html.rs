//! Tolerant scanning over rendered DOM text.
//!
//! The pages are React output with hashed class names
//! (`order-book-table_sellTable__Dxd2s`), so lookups match on class-name
//! fragments and tag nesting rather than full selectors.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Any opening or closing tag: (slash, name, attributes).
    static ref TAG: Regex = Regex::new(r"(?is)<(/?)([a-z][a-z0-9]*)\b([^>]*)>").unwrap();

    /// One quoted attribute: (name, double-quoted value, single-quoted value).
    static ref ATTR: Regex =
        Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();

    static ref TITLE: Regex = Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").unwrap();

    /// Tags whose boundaries become line breaks in extracted text.
    static ref BLOCK_BREAK: Regex =
        Regex::new(r"(?i)<br\s*/?>|</(?:div|p|li|tr|td|th|span|button|a|h[1-6])\s*>").unwrap();

    static ref ANY_TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();

    static ref SCRIPT_OR_STYLE: Regex =
        Regex::new(r"(?is)<(script|style)\b.*?</(?:script|style)\s*>").unwrap();
}

/// One element located in a document. Offsets are byte positions in the
/// searched string.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    pub attrs: &'a str,
    pub inner: &'a str,
    /// Start of the opening tag.
    pub start: usize,
    /// End of the closing tag (or of the input when unclosed).
    pub end: usize,
}

impl<'a> Element<'a> {
    pub fn has_class(&self, fragment: &str) -> bool {
        self.attr("class").is_some_and(|c| c.contains(fragment))
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        attr(self.attrs, name)
    }

    pub fn text(&self) -> String {
        text(self.inner)
    }
}

/// Value of a quoted attribute. Names compare case-insensitively.
pub fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    ATTR.captures_iter(attrs)
        .find(|cap| cap.get(1).is_some_and(|n| n.as_str().eq_ignore_ascii_case(name)))
        .and_then(|cap| cap.get(2).or_else(|| cap.get(3)))
        .map(|m| m.as_str())
}

/// Index just past the tag that closes an element whose content starts at
/// `from`, honouring nesting of the same tag.
fn closing_end(html: &str, tag: &str, from: usize) -> (usize, usize) {
    let mut depth = 1usize;
    for cap in TAG.captures_iter(&html[from..]) {
        let (Some(m), Some(name)) = (cap.get(0), cap.get(2)) else { continue };
        if !name.as_str().eq_ignore_ascii_case(tag) {
            continue;
        }
        let closing = cap.get(1).is_some_and(|c| !c.as_str().is_empty());
        if closing {
            depth -= 1;
            if depth == 0 {
                return (from + m.start(), from + m.end());
            }
        } else if !m.as_str().ends_with("/>") {
            depth += 1;
        }
    }
    (html.len(), html.len())
}

/// Outermost `<tag>` elements of `html`, in document order.
pub fn elements<'a>(html: &'a str, tag: &str) -> Vec<Element<'a>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < html.len() {
        let Some(cap) = TAG.captures_at(html, pos) else { break };
        let (Some(m), Some(name), Some(attrs)) = (cap.get(0), cap.get(2), cap.get(3)) else { break };
        let closing = cap.get(1).is_some_and(|c| !c.as_str().is_empty());
        if closing || !name.as_str().eq_ignore_ascii_case(tag) || m.as_str().ends_with("/>") {
            pos = m.end();
            continue;
        }
        let (inner_end, end) = closing_end(html, tag, m.end());
        out.push(Element {
            attrs: attrs.as_str(),
            inner: &html[m.end()..inner_end],
            start: m.start(),
            end,
        });
        pos = end.max(m.end());
    }
    out
}

/// First element of any tag whose class attribute contains `fragment`.
pub fn find_by_class<'a>(html: &'a str, fragment: &str) -> Option<Element<'a>> {
    for cap in TAG.captures_iter(html) {
        let (Some(m), Some(tag), Some(attrs)) = (cap.get(0), cap.get(2), cap.get(3)) else {
            continue;
        };
        if cap.get(1).is_some_and(|c| !c.as_str().is_empty()) {
            continue;
        }
        if !attr(attrs.as_str(), "class").is_some_and(|c| c.contains(fragment)) {
            continue;
        }
        let (inner_end, end) = if m.as_str().ends_with("/>") {
            (m.end(), m.end())
        } else {
            closing_end(html, tag.as_str(), m.end())
        };
        return Some(Element {
            attrs: attrs.as_str(),
            inner: &html[m.end()..inner_end],
            start: m.start(),
            end,
        });
    }
    None
}

pub fn page_title(html: &str) -> Option<String> {
    TITLE.captures(html).and_then(|c| c.get(1)).map(|m| text(m.as_str()))
}

/// Visible text split the way a browser lays out block elements: one entry
/// per non-empty line, whitespace collapsed.
pub fn text_lines(fragment: &str) -> Vec<String> {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(fragment, "");
    let broken = BLOCK_BREAK.replace_all(&without_scripts, "\n");
    let stripped = ANY_TAG.replace_all(&broken, "");
    decode_entities(&stripped)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

pub fn text(fragment: &str) -> String {
    text_lines(fragment).join(" ")
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_respect_nesting() {
        let html = r#"<ul><li class="a"><ul><li>inner</li></ul></li><li class="b">two</li></ul>"#;
        let outer = elements(html, "ul");
        assert_eq!(outer.len(), 1);
        let items = elements(outer[0].inner, "li");
        assert_eq!(items.len(), 2);
        assert!(items[0].has_class("a"));
        assert_eq!(items[0].text(), "inner");
        assert_eq!(items[1].text(), "two");
    }

    #[test]
    fn find_by_class_matches_hashed_names() {
        let html = r#"<div><div class="order-book-table_sellTable__Dxd2s x"><div>nested</div>rows</div><p>after</p></div>"#;
        let el = find_by_class(html, "sellTable").unwrap();
        assert_eq!(el.inner, "<div>nested</div>rows");
        assert!(html[el.end..].starts_with("<p>after"));
        assert!(find_by_class(html, "buyTable").is_none());
    }

    #[test]
    fn text_lines_follow_block_layout() {
        let html = "<div><span>MENTO</span><span>Mento&nbsp;Protocol</span></div><script>var x = 1;</script><div>Giá: <b>1,2</b></div>";
        assert_eq!(text_lines(html), vec!["MENTO", "Mento Protocol", "Giá: 1,2"]);
    }

    #[test]
    fn attributes_and_title() {
        let html = r#"<html><head><title> 404 | Not found </title></head><li title='3' aria-disabled="true"></li></html>"#;
        assert_eq!(page_title(html).as_deref(), Some("404 | Not found"));
        let li = elements(html, "li");
        assert_eq!(li[0].attr("title"), Some("3"));
        assert_eq!(li[0].attr("aria-disabled"), Some("true"));
        assert_eq!(li[0].attr("class"), None);
    }

    #[test]
    fn attribute_names_match_whole_and_ignore_case() {
        let attrs = r#" data-class="decoy" CLASS='pagination-item' title="a class=&quot;x&quot;""#;
        assert_eq!(attr(attrs, "class"), Some("pagination-item"));
        assert_eq!(attr(attrs, "data-class"), Some("decoy"));
        assert_eq!(attr(attrs, "title"), Some("a class=&quot;x&quot;"));
        assert_eq!(attr(attrs, "lass"), None);
    }
}
