//! Namespace-stripped XML element tree.
//!
//! Package, container and NCX documents come from many producers that disagree
//! on prefixes (`opf:metadata`, `dc:title`, bare `metadata`). Elements and
//! attributes are stored under their local names only, so lookups never care
//! which prefix a producer chose.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;

use crate::error::SecurityError;
use crate::security::{self, SecurityLimits};

#[derive(Debug, thiserror::Error)]
pub enum XmlTreeError {
    #[error("XML syntax error at byte {position}: {detail}")]
    Syntax { position: u64, detail: String },

    #[error("Document has no root element")]
    NoRoot,

    #[error(transparent)]
    Security(#[from] SecurityError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Local name, prefix removed.
    pub name: String,
    /// Attributes keyed by local name, in document order. Namespace
    /// declarations are not kept.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Parse `content` and return its root element.
    pub fn parse(content: &str, limits: &SecurityLimits) -> Result<XmlElement, XmlTreeError> {
        let mut reader = XmlReader::from_str(content);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    security::check_nesting_depth(stack.len() as u32 + 1, limits)?;
                    stack.push(element_from_start(e));
                }
                Ok(Event::Empty(ref e)) => {
                    security::check_nesting_depth(stack.len() as u32 + 1, limits)?;
                    attach(&mut stack, &mut root, element_from_start(e));
                }
                Ok(Event::End(_)) => {
                    if let Some(done) = stack.pop() {
                        attach(&mut stack, &mut root, done);
                    }
                }
                Ok(Event::Text(ref e)) => {
                    let text = match e.unescape() {
                        Ok(t) => t.into_owned(),
                        // Entities that are neither XML nor HTML5 named entities.
                        Err(_) => String::from_utf8_lossy(e).into_owned(),
                    };
                    push_text(&mut stack, text);
                }
                Ok(Event::CData(ref e)) => {
                    push_text(&mut stack, String::from_utf8_lossy(e).into_owned());
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(XmlTreeError::Syntax {
                        position: reader.error_position(),
                        detail: e.to_string(),
                    });
                }
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlTreeError::Syntax {
                position: reader.buffer_position(),
                detail: format!("unclosed element <{}>", open.name),
            });
        }

        root.ok_or(XmlTreeError::NoRoot)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    /// Walk a chain of child names, taking the first match at every step.
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        names.iter().try_fold(self, |el, name| el.child(name))
    }

    /// Direct text children, untrimmed.
    pub fn text_segments(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Text(t) => Some(t.as_str()),
            XmlNode::Element(_) => None,
        })
    }

    /// Direct text content, trimmed.
    pub fn own_text(&self) -> String {
        self.text_segments().collect::<String>().trim().to_string()
    }

    /// All descendant text in document order.
    pub fn deep_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

/// Coerce a possibly repeated, possibly structured field to one piece of text.
///
/// A repeated field uses its first occurrence. That element's own text wins;
/// if it has none, the text of its first child element that carries any is
/// used instead. Returns `None` when nothing non-blank is found.
pub fn first_text<'a, I>(nodes: I) -> Option<String>
where
    I: IntoIterator<Item = &'a XmlElement>,
{
    let first = nodes.into_iter().next()?;
    let own = first.own_text();
    if !own.is_empty() {
        return Some(own);
    }
    first
        .elements()
        .map(XmlElement::own_text)
        .find(|t| !t.is_empty())
}

fn element_from_start(e: &BytesStart<'_>) -> XmlElement {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
    let mut attributes = Vec::new();
    for attr in e.attributes().flatten() {
        let full_key = attr.key.as_ref();
        if full_key == b"xmlns" || full_key.starts_with(b"xmlns:") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }
    XmlElement {
        name,
        attributes,
        children: Vec::new(),
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
    } else if root.is_none() {
        *root = Some(element);
    }
}

/// Whitespace-only runs are kept so that descendant text keeps its word
/// breaks (`<span>A</span> <em>B</em>`).
fn push_text(stack: &mut [XmlElement], text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(top) = stack.last_mut() {
        top.children.push(XmlNode::Text(text));
    }
}

fn collect_text(el: &XmlElement, out: &mut String) {
    for child in &el.children {
        match child {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Element(e) => collect_text(e, out),
        }
    }
}
