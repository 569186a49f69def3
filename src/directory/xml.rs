//! XML parsing utilities for directory replies.
//!
//! Replies are read into a small owned element tree. Namespaces are dropped
//! (only local names are kept) since SOAP envelopes and plain documents are
//! navigated the same way.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// An element with its local name, concatenated text, and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// True when the element holds text only.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Depth-first search for the first descendant (or self) with the given name.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// A malformed document, located by line and column.
#[derive(Debug, thiserror::Error)]
#[error("{message} (line {line} col {column})\n{snippet}")]
pub struct XmlError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub snippet: String,
}

impl XmlError {
    fn at(body: &str, position: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_column(body, position);
        Self {
            message: message.into(),
            line,
            column,
            snippet: build_error_snippet(body, line, column, 20),
        }
    }
}

/// Parse a whole document and return its root element.
pub fn parse_document(body: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::at(body, reader.error_position() as usize, e.to_string()))?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(XmlNode::new(name));
            }
            Event::Empty(e) => {
                let node = XmlNode::new(String::from_utf8_lossy(e.local_name().as_ref()));
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| {
                    XmlError::at(body, reader.buffer_position() as usize, e.to_string())
                })?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::at(
            body,
            body.len(),
            format!("unexpected end of document inside <{}>", stack[stack.len() - 1].name),
        ));
    }

    root.ok_or_else(|| XmlError::at(body, 0, "document has no root element"))
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

/// 1-based line and column of a byte offset.
fn line_column(body: &str, position: usize) -> (usize, usize) {
    let bytes = body.as_bytes();
    let end = position.min(bytes.len());
    let before = &bytes[..end];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    (line, end - line_start + 1)
}

fn build_error_snippet(body: &str, line: usize, column: usize, context_len: usize) -> String {
    let target_line = body.lines().nth(line.saturating_sub(1)).unwrap_or("");
    if target_line.is_empty() {
        return "(empty line)".to_string();
    }

    // column is a 1-based byte offset; snap it to a char boundary before slicing
    let mut error_idx = column.saturating_sub(1).min(target_line.len());
    while !target_line.is_char_boundary(error_idx) {
        error_idx -= 1;
    }

    let half_len = context_len / 2;
    let mut start = error_idx.saturating_sub(half_len);
    while !target_line.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (error_idx + half_len).min(target_line.len());
    while !target_line.is_char_boundary(end) {
        end += 1;
    }

    let slice = &target_line[start..end];
    let indicator = " ".repeat(target_line[start..error_idx].chars().count()) + "^";

    format!("...{slice}...\n   {indicator}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_soap_envelope_drops_namespaces() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <GetServicesResponse xmlns="http://tempuri.org/">
      <GetServicesResult>
        <Service><ServiceID>3</ServiceID><ServiceName>Dialysis</ServiceName></Service>
      </GetServicesResult>
    </GetServicesResponse>
  </soap:Body>
</soap:Envelope>"#;

        let root = parse_document(body).unwrap();
        assert_eq!(root.name, "Envelope");
        let result = root.find("GetServicesResult").unwrap();
        let service = result.child("Service").unwrap();
        assert_eq!(service.child("ServiceName").unwrap().text, "Dialysis");
    }

    #[test]
    fn test_parse_unescapes_entities_and_cdata() {
        let root =
            parse_document("<Item><Name>Smith &amp; Sons</Name><Note><![CDATA[a < b]]></Note></Item>")
                .unwrap();
        assert_eq!(root.child("Name").unwrap().text, "Smith & Sons");
        assert_eq!(root.child("Note").unwrap().text, "a < b");
    }

    #[test]
    fn test_empty_elements_are_leaves() {
        let root = parse_document("<Item><Address2/><City>Dayton</City></Item>").unwrap();
        let address2 = root.child("Address2").unwrap();
        assert!(address2.is_leaf());
        assert_eq!(address2.text, "");
    }

    #[test]
    fn test_mismatched_tag_reports_location() {
        let body = "<Items>\n  <Item><City>Akron</Town></Item>\n</Items>";
        let err = parse_document(body).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.snippet.contains('^'));
    }

    #[test]
    fn test_truncated_document_is_an_error() {
        assert!(parse_document("<Items><Item>").is_err());
        assert!(parse_document("").is_err());
    }

    #[test]
    fn test_line_column() {
        assert_eq!(line_column("abc\ndef", 5), (2, 2));
        assert_eq!(line_column("abc", 0), (1, 1));
    }
}
