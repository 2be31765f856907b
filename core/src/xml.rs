//! Owned XML element tree and a quick-xml based parser.
//!
//! # Design
//! The tree keeps child elements and text in document order. Positional
//! lookups (`child(1)`) count elements only, which is how the query engine's
//! response envelope is addressed. Namespace prefixes are kept verbatim but
//! not resolved; names are compared by local name.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use quick_xml::errors::IllFormedError;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;

/// A single piece of element content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Unescaped character data. Adjacent text and CDATA sections are merged.
    Text(String),
}

/// An XML element with its attributes and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    prefix: Option<String>,
    attributes: Vec<(String, String)>,
    nodes: Vec<Node>,
}

impl Element {
    /// Local name, without the namespace prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Name as written in the source, e.g. `soap:Body`.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Attribute value by its name as written (`xmlns:s`, `id`).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// All content nodes, text included.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// The child element at `index`, counting elements only.
    pub fn child(&self, index: usize) -> Option<&Element> {
        self.children().nth(index)
    }

    /// First direct child with the given local name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children().find(|child| child.name == name)
    }

    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children().filter(move |child| child.name == name)
    }

    /// Text preceding the first child element, if any.
    ///
    /// Returns `None` for an element that starts with a child element or has
    /// no content at all.
    pub fn text(&self) -> Option<&str> {
        match self.nodes.first() {
            Some(Node::Text(text)) if !text.is_empty() => Some(text),
            _ => None,
        }
    }

    /// Concatenated text of this element and all its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(child) => collect_text(child, out),
        }
    }
}

/// Parse an XML document and return its root element.
///
/// The text is taken as already decoded, so an `encoding` named in the XML
/// declaration is ignored. Comments, processing instructions, the XML
/// declaration and DOCTYPE are skipped. Whitespace is preserved.
pub fn parse(content: &str) -> Result<Element, ParseError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    TreeBuilder::new(Reader::from_str(content)).build()
}

/// Read `path` and parse it as an XML document.
///
/// The file is decoded like [`parse_bytes`].
pub fn parse_file(path: impl AsRef<Path>) -> Result<Element, ParseError> {
    let path = path.as_ref();
    let content = fs::read(path).map_err(|source| ParseError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_bytes(&content)
}

/// Parse raw bytes in the encoding named by the XML declaration.
///
/// Without a declaration the input must be UTF-8.
pub fn parse_bytes(content: &[u8]) -> Result<Element, ParseError> {
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    TreeBuilder::new(Reader::from_reader(content)).build()
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

struct TreeBuilder<'a> {
    reader: Reader<&'a [u8]>,
    /// Elements opened but not yet closed.
    stack: Vec<Element>,
    root: Option<Element>,
}

impl<'a> TreeBuilder<'a> {
    fn new(mut reader: Reader<&'a [u8]>) -> Self {
        reader.config_mut().trim_text(false);
        reader.config_mut().check_end_names = true;
        Self {
            reader,
            stack: Vec::new(),
            root: None,
        }
    }

    fn build(mut self) -> Result<Element, ParseError> {
        loop {
            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let element = self.open(&e)?;
                    self.stack.push(element);
                }
                Ok(Event::End(e)) => {
                    let Some(element) = self.stack.pop() else {
                        let qname = e.name();
                        let name = self.decode(qname.as_ref())?;
                        return Err(ParseError::Syntax {
                            message: format!("unexpected closing tag </{name}>"),
                            position: self.reader.buffer_position(),
                        });
                    };
                    self.attach(element)?;
                }
                Ok(Event::Empty(e)) => {
                    let element = self.open(&e)?;
                    self.attach(element)?;
                }
                Ok(Event::Text(e)) => {
                    let raw = self.decode(&e)?;
                    let text = unescape(&raw).map_err(|err| ParseError::Syntax {
                        message: format!("invalid text content: {err}"),
                        position: self.reader.buffer_position(),
                    })?;
                    self.push_text(&text)?;
                }
                Ok(Event::CData(e)) => {
                    let text = self.decode(&e)?.into_owned();
                    self.push_text(&text)?;
                }
                Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(quick_xml::Error::IllFormed(IllFormedError::MismatchedEndTag {
                    expected,
                    found,
                })) => return Err(ParseError::MismatchedEndTag { expected, found }),
                Err(err) => {
                    return Err(ParseError::Syntax {
                        message: err.to_string(),
                        position: self.reader.error_position(),
                    })
                }
            }
        }

        if let Some(open) = self.stack.last() {
            return Err(ParseError::UnexpectedEof {
                expected: format!("closing tag </{}>", open.qualified_name()),
            });
        }
        self.root.ok_or(ParseError::EmptyDocument)
    }

    /// Decode raw bytes with the document's current encoding.
    fn decode<'b>(&self, bytes: &'b [u8]) -> Result<Cow<'b, str>, ParseError> {
        self.reader
            .decoder()
            .decode(bytes)
            .map_err(|err| ParseError::Encoding(err.to_string()))
    }

    fn open(&self, e: &BytesStart<'_>) -> Result<Element, ParseError> {
        let (name, prefix) = split_name(&self.decode(e.name().as_ref())?);

        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| ParseError::Syntax {
                message: format!("attribute error: {err}"),
                position: self.reader.buffer_position(),
            })?;
            let key = self.decode(attr.key.as_ref())?.into_owned();
            let raw = self.decode(&attr.value)?;
            let value = unescape(&raw).map_err(|err| ParseError::Syntax {
                message: format!("invalid attribute value: {err}"),
                position: self.reader.buffer_position(),
            })?;
            attributes.push((key, value.into_owned()));
        }

        Ok(Element {
            name,
            prefix,
            attributes,
            nodes: Vec::new(),
        })
    }

    fn attach(&mut self, element: Element) -> Result<(), ParseError> {
        if let Some(parent) = self.stack.last_mut() {
            parent.nodes.push(Node::Element(element));
            return Ok(());
        }
        if self.root.is_some() {
            return Err(ParseError::MultipleRoots);
        }
        self.root = Some(element);
        Ok(())
    }

    fn push_text(&mut self, text: &str) -> Result<(), ParseError> {
        let Some(parent) = self.stack.last_mut() else {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(ParseError::Syntax {
                message: "text outside the root element".to_string(),
                position: self.reader.buffer_position(),
            });
        };
        match parent.nodes.last_mut() {
            Some(Node::Text(last)) => last.push_str(text),
            _ => parent.nodes.push(Node::Text(text.to_string())),
        }
        Ok(())
    }
}

fn split_name(full: &str) -> (String, Option<String>) {
    match full.split_once(':') {
        Some((prefix, local)) => (local.to_string(), Some(prefix.to_string())),
        None => (full.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_in_order() {
        let root = parse("<root><a/><b>two</b><a>three</a></root>").unwrap();
        assert_eq!(root.name(), "root");
        let names: Vec<&str> = root.children().map(Element::name).collect();
        assert_eq!(names, ["a", "b", "a"]);
        assert_eq!(root.child(1).unwrap().text(), Some("two"));
        assert!(root.child(3).is_none());
        assert_eq!(root.find_all("a").count(), 2);
    }

    #[test]
    fn positional_lookup_skips_text_nodes() {
        let root = parse("<root>\n  <first/>\n  <second>x</second>\n</root>").unwrap();
        assert_eq!(root.child(0).unwrap().name(), "first");
        assert_eq!(root.child(1).unwrap().name(), "second");
        assert_eq!(root.text(), Some("\n  "));
    }

    #[test]
    fn keeps_prefix_and_attributes() {
        let root = parse(r#"<s:Envelope xmlns:s="urn:env" id="7"><s:Body/></s:Envelope>"#).unwrap();
        assert_eq!(root.name(), "Envelope");
        assert_eq!(root.prefix(), Some("s"));
        assert_eq!(root.qualified_name(), "s:Envelope");
        assert_eq!(root.attribute("xmlns:s"), Some("urn:env"));
        assert_eq!(root.attribute("id"), Some("7"));
        assert_eq!(root.find("Body").unwrap().prefix(), Some("s"));
    }

    #[test]
    fn unescapes_entities_and_keeps_cdata() {
        let root = parse("<r>&lt;a&gt; &amp; <![CDATA[<raw>]]></r>").unwrap();
        assert_eq!(root.text(), Some("<a> & <raw>"));
    }

    #[test]
    fn escaped_payload_parses_as_second_document() {
        let outer = parse("<r>&lt;root&gt;&lt;child&gt;ok&lt;/child&gt;&lt;/root&gt;</r>").unwrap();
        let inner = parse(outer.text().unwrap()).unwrap();
        assert_eq!(inner.name(), "root");
        assert_eq!(inner.find("child").unwrap().text(), Some("ok"));
    }

    #[test]
    fn empty_element_has_no_text() {
        let root = parse("<r><e></e><f/></r>").unwrap();
        assert_eq!(root.child(0).unwrap().text(), None);
        assert_eq!(root.child(1).unwrap().text(), None);
        assert_eq!(root.text(), None);
    }

    #[test]
    fn text_content_collects_descendants() {
        let root = parse("<r>a<b>b<c>c</c></b>d</r>").unwrap();
        assert_eq!(root.text_content(), "abcd");
        assert_eq!(root.text(), Some("a"));
    }

    #[test]
    fn skips_declaration_comments_and_bom() {
        let root = parse("\u{feff}<?xml version=\"1.0\"?>\n<!-- note -->\n<root/>\n").unwrap();
        assert_eq!(root.name(), "root");
    }

    #[test]
    fn rejects_empty_document() {
        assert!(matches!(parse(""), Err(ParseError::EmptyDocument)));
        assert!(matches!(parse("  \n"), Err(ParseError::EmptyDocument)));
    }

    #[test]
    fn rejects_multiple_roots() {
        assert!(matches!(parse("<a/><b/>"), Err(ParseError::MultipleRoots)));
    }

    #[test]
    fn rejects_mismatched_end_tag() {
        let err = parse("<a><b></a></b>").unwrap_err();
        assert!(matches!(err, ParseError::MismatchedEndTag { .. }), "{err:?}");
    }

    #[test]
    fn rejects_unclosed_element() {
        let err = parse("<a><b>").unwrap_err();
        assert!(
            matches!(err, ParseError::UnexpectedEof { .. } | ParseError::Syntax { .. }),
            "{err:?}"
        );
    }

    #[test]
    fn rejects_text_outside_root() {
        assert!(matches!(parse("hello"), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn rejects_non_utf8_bytes() {
        assert!(matches!(parse_bytes(&[0x3c, 0xff, 0x3e]), Err(ParseError::Encoding(_))));
    }

    #[test]
    fn decodes_bytes_in_declared_encoding() {
        let latin1 = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r a=\"\xE5\">Malm\xF6</r>";
        let root = parse_bytes(latin1).unwrap();
        assert_eq!(root.text(), Some("Malm\u{f6}"));
        assert_eq!(root.attribute("a"), Some("\u{e5}"));
    }

    #[test]
    fn undeclared_bytes_default_to_utf8() {
        let root = parse_bytes("\u{feff}<r>Malm\u{f6}</r>".as_bytes()).unwrap();
        assert_eq!(root.text(), Some("Malm\u{f6}"));
        assert!(matches!(parse_bytes(b"<r>Malm\xF6</r>"), Err(ParseError::Encoding(_))));
    }

    #[test]
    fn decoded_text_ignores_declared_encoding() {
        let root = parse("<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r>Malm\u{f6}</r>").unwrap();
        assert_eq!(root.text(), Some("Malm\u{f6}"));
    }

    #[test]
    fn identical_documents_compare_equal() {
        let xml = r#"<r a="1"><c>x</c></r>"#;
        assert_eq!(parse(xml).unwrap(), parse(xml).unwrap());
        assert_ne!(parse(xml).unwrap(), parse("<r a=\"1\"><c>y</c></r>").unwrap());
    }
}
