//! Permissive markup parser.
//!
//! Parses fetched (and already URL-rewritten) fragment text into a detached
//! subtree of the host document. Good-enough HTML, not a conformant one:
//!
//! - doctype, comments, and processing instructions are skipped;
//! - unknown and mismatched close tags are ignored rather than rejected;
//! - `script` and `style` bodies are raw text (no nested tag scanning);
//! - void elements (`link`, `img`, …) and `/>` never push onto the stack;
//! - entities are carried through undecoded;
//! - whitespace-only text runs are dropped.
//!
//! Malformed input degrades to "whatever was recoverable", possibly an empty
//! container, and the loader grafts whatever came out.

use crate::dom::{Document, NodeId, is_void_tag};

/// Tag of the container element wrapping every parsed fragment.
pub(crate) const FRAGMENT_CONTAINER_TAG: &str = "graft-fragment";

/// Parse `html` into a detached container element owned by `document`.
///
/// Nothing is connected to the live tree; the caller grafts the returned
/// container in a single `append_child`.
pub(crate) fn parse_fragment(document: &Document, html: &str) -> NodeId {
    let container = document.create_element(FRAGMENT_CONTAINER_TAG);
    let mut stack = vec![container];
    let mut cursor = Cursor::new(html);

    while !cursor.at_end() {
        let text = cursor.take_until(b'<');
        if !text.trim().is_empty() {
            let parent = *stack.last().unwrap_or(&container);
            document.append_child(parent, document.create_text(text));
        }
        if cursor.at_end() {
            break;
        }

        if cursor.eat("<!--") {
            cursor.skip_past("-->");
        } else if cursor.peek_is("<!") || cursor.peek_is("<?") {
            cursor.skip_past(">");
        } else if cursor.eat("</") {
            let name = cursor.take_tag_name();
            cursor.skip_past(">");
            close_tag(document, &mut stack, &name);
        } else if cursor.eat("<") {
            open_tag(document, &mut stack, &mut cursor);
        }
    }

    container
}

fn close_tag(document: &Document, stack: &mut Vec<NodeId>, name: &str) {
    // Pop to the nearest matching open element; a stray close tag pops nothing
    let position = stack
        .iter()
        .skip(1) // never pop the container itself
        .rposition(|id| document.tag_name(*id).as_deref() == Some(name));
    if let Some(pos) = position {
        stack.truncate(pos + 1);
    }
}

fn open_tag(document: &Document, stack: &mut Vec<NodeId>, cursor: &mut Cursor<'_>) {
    let tag = cursor.take_tag_name();
    if tag.is_empty() {
        // "<" followed by garbage, treat as text and move on
        cursor.skip_past(">");
        return;
    }

    let element = document.create_element(&tag);
    loop {
        cursor.skip_whitespace();
        if cursor.at_end() {
            break;
        }
        if cursor.eat("/>") {
            append(document, stack, element);
            return;
        }
        if cursor.eat(">") {
            break;
        }
        let (name, value) = cursor.take_attribute();
        if !name.is_empty() {
            document.set_attribute(element, &name, &value);
        }
    }

    append(document, stack, element);

    if tag == "script" || tag == "style" {
        let raw = cursor.take_raw_text(&tag);
        if !raw.is_empty() {
            document.append_child(element, document.create_text(raw));
        }
    } else if !is_void_tag(&tag) {
        stack.push(element);
    }
}

fn append(document: &Document, stack: &[NodeId], element: NodeId) {
    if let Some(parent) = stack.last() {
        document.append_child(*parent, element);
    }
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    // Safe at any byte offset, unlike rest(); the scanning loops below may
    // hold a pos inside a multi-byte character.
    fn peek_byte(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn peek_is(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.peek_is(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    /// Advance to the next `byte`, returning the text skipped over.
    fn take_until(&mut self, byte: u8) -> &'a str {
        let start = self.pos;
        match self.rest().as_bytes().iter().position(|b| *b == byte) {
            Some(offset) => self.pos += offset,
            None => self.pos = self.input.len(),
        }
        &self.input[start..self.pos]
    }

    /// Advance just past the next occurrence of `marker` (or to the end).
    fn skip_past(&mut self, marker: &str) {
        match self.rest().find(marker) {
            Some(offset) => self.pos += offset + marker.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek_byte() {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    fn take_tag_name(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_alphanumeric() || b == b'-' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_ascii_lowercase()
    }

    /// One attribute: `name`, `name=value`, `name="value"`, `name='value'`.
    fn take_attribute(&mut self) -> (String, String) {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/') {
                break;
            }
            self.pos += 1;
        }
        let name = self.input[start..self.pos].to_ascii_lowercase();
        if name.is_empty() {
            // Stray "=" or "/" that is not part of "/>"; step over it
            self.pos += 1;
            return (name, String::new());
        }

        self.skip_whitespace();
        if !self.eat("=") {
            return (name, String::new());
        }
        self.skip_whitespace();

        let value = if self.eat("\"") {
            let v = self.take_until(b'"');
            self.eat("\"");
            v
        } else if self.eat("'") {
            let v = self.take_until(b'\'');
            self.eat("'");
            v
        } else {
            let start = self.pos;
            while let Some(b) = self.peek_byte() {
                if b.is_ascii_whitespace() || b == b'>' {
                    break;
                }
                self.pos += 1;
            }
            &self.input[start..self.pos]
        };
        (name, value.to_string())
    }

    /// Raw text content up to the matching close tag of `tag`.
    fn take_raw_text(&mut self, tag: &str) -> &'a str {
        let close = format!("</{tag}");
        let rest = self.rest();
        let lower = rest.to_ascii_lowercase();
        match lower.find(&close) {
            Some(offset) => {
                let raw = &rest[..offset];
                self.pos += offset;
                self.skip_past(">");
                raw
            }
            None => {
                self.pos = self.input.len();
                rest
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> (Document, NodeId) {
        let doc = Document::new();
        let container = parse_fragment(&doc, html);
        (doc, container)
    }

    #[test]
    fn parses_nested_elements_and_text() {
        let (doc, container) = parse(r#"<div id="app"><p>hello <b>there</b></p></div>"#);
        assert_eq!(
            doc.outer_html(container),
            r#"<graft-fragment><div id="app"><p>hello <b>there</b></p></div></graft-fragment>"#
        );
    }

    #[test]
    fn container_is_detached() {
        let (doc, container) = parse("<div></div>");
        assert!(!doc.is_connected(container));
    }

    #[test]
    fn skips_doctype_and_comments() {
        let (doc, container) = parse("<!DOCTYPE html><!-- note --><span>x</span>");
        assert_eq!(
            doc.outer_html(container),
            "<graft-fragment><span>x</span></graft-fragment>"
        );
    }

    #[test]
    fn void_elements_do_not_swallow_siblings() {
        let (doc, container) = parse(r#"<link rel="stylesheet" href="a.css"><p>after</p>"#);
        assert_eq!(doc.children(container).len(), 2);
        assert_eq!(
            doc.tag_name(doc.children(container)[1]).as_deref(),
            Some("p")
        );
    }

    #[test]
    fn self_closing_tag_does_not_nest() {
        let (doc, container) = parse("<div/><span>x</span>");
        assert_eq!(doc.children(container).len(), 2);
    }

    #[test]
    fn script_body_is_raw_text() {
        let (doc, container) = parse("<script>if (a < b) { run(); }</script>");
        let script = doc.children(container)[0];
        assert_eq!(doc.tag_name(script).as_deref(), Some("script"));
        assert_eq!(doc.text_content(script), "if (a < b) { run(); }");
    }

    #[test]
    fn attributes_parse_in_all_quote_styles() {
        let (doc, container) = parse(r#"<img src="a.png" alt='logo' width=40 hidden>"#);
        let img = doc.children(container)[0];
        assert_eq!(doc.attribute(img, "src").as_deref(), Some("a.png"));
        assert_eq!(doc.attribute(img, "alt").as_deref(), Some("logo"));
        assert_eq!(doc.attribute(img, "width").as_deref(), Some("40"));
        assert_eq!(doc.attribute(img, "hidden").as_deref(), Some(""));
    }

    #[test]
    fn tag_names_are_case_insensitive() {
        let (doc, container) = parse("<DIV><SPAN>x</span></DIV>");
        let div = doc.children(container)[0];
        assert_eq!(doc.tag_name(div).as_deref(), Some("div"));
        assert_eq!(doc.children(div).len(), 1);
    }

    #[test]
    fn stray_close_tag_is_ignored() {
        let (doc, container) = parse("</b><p>still here</p>");
        assert_eq!(doc.children(container).len(), 1);
        assert_eq!(doc.text_content(container), "still here");
    }

    #[test]
    fn unclosed_elements_stay_attached() {
        let (doc, container) = parse("<div><p>dangling");
        assert_eq!(doc.text_content(container), "dangling");
    }

    #[test]
    fn non_ascii_text_and_attributes_parse() {
        let (doc, container) = parse("<div title=naïve lang=\"fr\">café • menü</div>");
        let div = doc.children(container)[0];
        assert_eq!(doc.attribute(div, "title").as_deref(), Some("naïve"));
        assert_eq!(doc.attribute(div, "lang").as_deref(), Some("fr"));
        assert_eq!(doc.text_content(div), "café • menü");
    }

    #[test]
    fn non_ascii_attribute_name_does_not_derail_the_parse() {
        let (doc, container) = parse("<div dätä=1><p>after</p></div>");
        let div = doc.children(container)[0];
        assert_eq!(doc.attribute(div, "dätä").as_deref(), Some("1"));
        assert_eq!(doc.children(div).len(), 1);
    }

    #[test]
    fn empty_input_yields_empty_container() {
        let (doc, container) = parse("");
        assert!(doc.children(container).is_empty());
    }

    #[test]
    fn full_document_keeps_head_and_body_structure() {
        let html = concat!(
            "<!DOCTYPE html><html><head>",
            r#"<link rel="stylesheet" href="http://localhost:5003/app.css">"#,
            "</head><body><div id=\"app\">ui</div>",
            r#"<script src="http://localhost:5003/bundle.js"></script>"#,
            "</body></html>",
        );
        let (doc, container) = parse(html);
        assert_eq!(doc.elements_by_tag_in(container, "link").len(), 1);
        assert_eq!(doc.elements_by_tag_in(container, "script").len(), 1);
        assert_eq!(doc.text_content(container), "ui");
    }
}
