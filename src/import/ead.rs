//! Finding-aid XML document model
//!
//! Streams the file through `quick-xml` once and builds a small element tree
//! with namespace prefixes stripped. The tree walker needs parent/child
//! navigation (`did/unittitle`, `c[@level='file']`), which a pure event stream
//! cannot give it.

use super::source::ImportError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Level attribute value of leaf records
pub const LEVEL_FILE: &str = "file";

/// Level attribute value of hierarchy roots
pub const LEVEL_FONDS: &str = "fonds";

/// Type attribute value of importable descriptions
pub const TYPE_INVENTORY: &str = "inventory";

/// An XML element with its attributes, text and child elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Text and CDATA appearing directly inside this element
    pub own_text: String,
    /// Text nodes and child elements in document order, used to rebuild the full text content
    content: Vec<Content>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Content {
    Text(usize, usize),
    Child(usize),
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            ..Default::default()
        }
    }

    /// Attribute value by local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First element reached by following a slash-separated path of child names
    pub fn at(&self, path: &str) -> Option<&Element> {
        path.split('/')
            .try_fold(self, |element, segment| element.child(segment))
    }

    /// All elements reached by following a path; every segment may branch
    pub fn all<'a>(&'a self, path: &str) -> Vec<&'a Element> {
        let mut current = vec![self];
        for segment in path.split('/') {
            current = current
                .into_iter()
                .flat_map(|e| e.children.iter().filter(|c| c.name == segment))
                .collect();
        }
        current
    }

    /// Concatenated text of this element and all descendants, in document order
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for part in &self.content {
            match *part {
                Content::Text(start, end) => out.push_str(&self.own_text[start..end]),
                Content::Child(index) => self.children[index].collect_text(out),
            }
        }
    }

    /// Trimmed text at `path`, `None` when missing or blank
    pub fn text_at(&self, path: &str) -> Option<String> {
        self.at(path)
            .map(|e| e.text().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Whether this element is an archival component (`c`, `c01` … `c12`)
    pub fn is_component(&self) -> bool {
        match self.name.strip_prefix('c') {
            Some("") => true,
            Some(rest) => rest.len() == 2 && rest.bytes().all(|b| b.is_ascii_digit()),
            None => false,
        }
    }

    /// Level attribute, empty when absent
    pub fn level(&self) -> &str {
        self.attr("level").unwrap_or("")
    }

    /// Child components at file level
    pub fn file_components(&self) -> impl Iterator<Item = &Element> + '_ {
        self.children
            .iter()
            .filter(|c| c.is_component() && c.level() == LEVEL_FILE)
    }

    /// Child components above file level
    pub fn group_components(&self) -> impl Iterator<Item = &Element> + '_ {
        self.children
            .iter()
            .filter(|c| c.is_component() && c.level() != LEVEL_FILE)
    }

    /// Outermost fonds components below this element, in document order
    pub fn fonds_components(&self) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_fonds(&mut found);
        found
    }

    fn collect_fonds<'a>(&'a self, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.is_component() && child.level() == LEVEL_FONDS {
                found.push(child);
            } else {
                child.collect_fonds(found);
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let start = self.own_text.len();
        self.own_text.push_str(text);
        self.content.push(Content::Text(start, self.own_text.len()));
    }

    fn push_child(&mut self, child: Element) {
        self.content.push(Content::Child(self.children.len()));
        self.children.push(child);
    }
}

/// A parsed finding aid
#[derive(Debug, Clone)]
pub struct EadDocument {
    root: Element,
}

impl EadDocument {
    /// Parse a finding aid from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::with_capacity(1024 * 1024, file))
    }

    /// Parse a finding aid held in memory
    pub fn parse_str(xml: &str) -> Result<Self, ImportError> {
        Self::from_reader(xml.as_bytes())
    }

    fn from_reader<R: BufRead>(reader: R) -> Result<Self, ImportError> {
        let mut reader = Reader::from_reader(reader);
        let mut buf = Vec::with_capacity(8192);
        let mut stack: Vec<Element> = vec![Element::new(String::new(), Vec::new())];

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    stack.push(start_element(e));
                }
                Event::Empty(ref e) => {
                    let element = start_element(e);
                    if let Some(parent) = stack.last_mut() {
                        parent.push_child(element);
                    }
                }
                Event::End(_) => {
                    // The synthetic document node at the bottom is never closed here
                    if stack.len() > 1 {
                        if let Some(element) = stack.pop() {
                            if let Some(parent) = stack.last_mut() {
                                parent.push_child(element);
                            }
                        }
                    }
                }
                Event::Text(ref e) => {
                    // Undecodable entities degrade to the raw bytes
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e.to_vec()).into_owned(),
                    };
                    if let Some(current) = stack.last_mut() {
                        current.push_text(&text);
                    }
                }
                Event::CData(ref e) => {
                    let text = String::from_utf8_lossy(&e.to_vec()).into_owned();
                    if let Some(current) = stack.last_mut() {
                        current.push_text(&text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        // Unclosed elements at EOF are attached to their parents as-is
        while stack.len() > 1 {
            if let Some(element) = stack.pop() {
                if let Some(parent) = stack.last_mut() {
                    parent.push_child(element);
                }
            }
        }

        let root = stack
            .pop()
            .ok_or_else(|| ImportError::InvalidFormat("empty document".to_string()))?;
        Ok(Self { root })
    }

    /// The top-level description element (`ead/archdesc`)
    pub fn archdesc(&self) -> Option<&Element> {
        self.root
            .child("ead")
            .and_then(|ead| ead.child("archdesc"))
            .or_else(|| self.root.child("archdesc"))
    }

    /// Whether the description is an inventory and should be imported
    pub fn is_inventory(&self) -> bool {
        self.archdesc()
            .and_then(|a| a.attr("type"))
            .map(|t| t == TYPE_INVENTORY)
            .unwrap_or(false)
    }

    /// Value of the description's `type` attribute
    pub fn description_type(&self) -> Option<&str> {
        self.archdesc().and_then(|a| a.attr("type"))
    }

    /// Hierarchy roots: the outermost fonds components, or the description
    /// itself when it is declared at fonds level without nested fonds
    pub fn fonds(&self) -> Vec<&Element> {
        let Some(archdesc) = self.archdesc() else {
            return Vec::new();
        };
        let fonds = archdesc.fonds_components();
        if fonds.is_empty() && archdesc.level() == LEVEL_FONDS {
            vec![archdesc]
        } else {
            fonds
        }
    }
}

fn start_element(e: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let attributes = e
        .attributes()
        .filter_map(Result::ok)
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
            let value = match a.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
            };
            (key, value)
        })
        .collect();
    Element::new(name, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ead xmlns="urn:isbn:1-931666-22-9" xmlns:xlink="http://www.w3.org/1999/xlink">
  <archdesc level="collection" type="inventory">
    <dsc>
      <c level="fonds" id="DE-1958_f1">
        <did><unittitle>Bundesministerium <emph>für</emph> Familie</unittitle><unitid>B 153</unitid></did>
        <c level="file" id="DE-1958_a"><did><unittitle>Akte A</unittitle></did></c>
        <c02 level="series"><did><unittitle>Haushalt</unittitle></did></c02>
        <c level="file" id="DE-1958_b"/>
      </c>
    </dsc>
  </archdesc>
</ead>"#;

    #[test]
    fn test_parses_structure_without_namespaces() {
        let doc = EadDocument::parse_str(SAMPLE).unwrap();
        assert!(doc.is_inventory());

        let fonds = doc.fonds();
        assert_eq!(fonds.len(), 1);
        let f = fonds[0];
        assert_eq!(f.attr("id"), Some("DE-1958_f1"));
        assert_eq!(f.text_at("did/unittitle").as_deref(), Some("Bundesministerium für Familie"));
        assert_eq!(f.file_components().count(), 2);
        assert_eq!(f.group_components().count(), 1);
    }

    #[test]
    fn test_missing_fields_degrade_to_none() {
        let doc = EadDocument::parse_str(SAMPLE).unwrap();
        let f = doc.fonds()[0];
        let empty_file = f.file_components().nth(1).unwrap();
        assert_eq!(empty_file.text_at("did/unittitle"), None);
        assert!(empty_file.all("did/origination").is_empty());
    }

    #[test]
    fn test_non_inventory_description() {
        let doc = EadDocument::parse_str(
            r#"<ead><archdesc type="findbuch" level="fonds"><did/></archdesc></ead>"#,
        )
        .unwrap();
        assert!(!doc.is_inventory());
        assert_eq!(doc.description_type(), Some("findbuch"));
    }

    #[test]
    fn test_component_names() {
        for (name, expected) in [("c", true), ("c01", true), ("c12", true), ("chronlist", false), ("did", false)] {
            let e = Element::new(name.to_string(), Vec::new());
            assert_eq!(e.is_component(), expected, "{name}");
        }
    }
}
