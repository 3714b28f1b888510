//! Minimal element tree built from the quick-xml event stream

use quick_xml::events::Event;
use quick_xml::Reader;

use super::escape::unescape;
use crate::codec::DecodeError;

/// Deepest element nesting accepted. Decoding and dropping the tree recurse
/// once per level, so the bound keeps both off the end of the stack.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    /// Concatenated, unescaped character data
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn new(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    /// First child with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }
}

fn malformed(message: impl Into<String>) -> DecodeError {
    DecodeError::Malformed(message.into())
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), DecodeError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(malformed("multiple root elements")),
    }
    Ok(())
}

/// Parse a document into its root element
pub fn parse(input: &str) -> Result<Element, DecodeError> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(malformed(format!(
                        "elements nested deeper than {} levels",
                        MAX_DEPTH
                    )));
                }
                stack.push(Element::new(start.name().as_ref()))
            }
            Ok(Event::Empty(start)) => {
                attach(&mut stack, &mut root, Element::new(start.name().as_ref()))?
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("unexpected closing tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                let raw = std::str::from_utf8(&text).map_err(|e| malformed(e.to_string()))?;
                match stack.last_mut() {
                    Some(current) => current.text.push_str(&unescape(raw)?),
                    None if raw.trim().is_empty() => {}
                    None => return Err(malformed("text outside of root element")),
                }
            }
            Ok(Event::CData(data)) => {
                let raw = std::str::from_utf8(&data).map_err(|e| malformed(e.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(raw);
                }
            }
            Ok(Event::Eof) => break,
            // Declarations, comments, processing instructions, doctype
            Ok(_) => {}
            Err(e) => return Err(malformed(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(malformed("unexpected end of document"));
    }

    root.ok_or_else(|| malformed("empty document"))
}
