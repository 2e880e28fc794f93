//! Body tokenization for both OFX wire forms.
//!
//! The reader consumes a single stream of [`Token`] events regardless of
//! version. OFX 2.x bodies are well-formed XML and are driven through
//! `quick-xml`; OFX 1.x bodies are SGML-flavored tag soup where leaf
//! elements may omit their closing tags, so the 1.x scanner infers closure
//! with one token of lookahead: a tag followed by non-blank text is a leaf,
//! implicitly closed by the next tag at the same or shallower level. Both
//! front ends emit explicit `Close` events, so the reader never needs to
//! know which form it is consuming.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::OfxVersion;

/// Upper bound on element nesting, guarding against adversarial input.
pub const MAX_NESTING: usize = 32;

/// A tag-level event in an OFX body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Open(String),
    Text(String),
    Close(String),
}

/// Tokenize an OFX body in the given wire mode.
pub fn tokenize(body: &str, version: OfxVersion) -> Result<Vec<Token>> {
    match version {
        OfxVersion::V1 => tokenize_sgml(body),
        OfxVersion::V2 => tokenize_xml(body),
    }
}

/// Decode the standard character entities in element text.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Escape element text for emission.
pub fn escape_text(text: &str) -> String {
    if !text.contains(['&', '<', '>']) {
        return text.to_string();
    }
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

struct OpenElement {
    name: String,
    text: String,
    has_children: bool,
}

fn syntax(message: impl Into<String>, stack: &[OpenElement]) -> Error {
    let path = stack
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join("/");
    Error::Syntax {
        message: message.into(),
        path: if path.is_empty() { "/".to_string() } else { path },
    }
}

fn tokenize_sgml(body: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut rest = body;

    // Emits the pending leaf (text + implicit close) of the innermost open
    // element, if it has one.
    fn flush_leaf(stack: &mut Vec<OpenElement>, tokens: &mut Vec<Token>) {
        let is_leaf = stack
            .last()
            .is_some_and(|top| !top.has_children && !top.text.trim().is_empty());
        if is_leaf {
            if let Some(leaf) = stack.pop() {
                tokens.push(Token::Text(decode_entities(leaf.text.trim())));
                tokens.push(Token::Close(leaf.name));
            }
        }
    }

    while !rest.is_empty() {
        match rest.find('<') {
            None => {
                // Trailing text after the last tag.
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(rest);
                } else if !rest.trim().is_empty() {
                    return Err(syntax("text outside of any element", &stack));
                }
                rest = "";
            }
            Some(lt) => {
                let (text, from_tag) = rest.split_at(lt);
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(text);
                } else if !text.trim().is_empty() {
                    return Err(syntax("text outside of any element", &stack));
                }

                let gt = from_tag
                    .find('>')
                    .ok_or_else(|| syntax("unterminated tag", &stack))?;
                let inside = from_tag[1..gt].trim();
                rest = &from_tag[gt + 1..];

                if let Some(name) = inside.strip_prefix('/') {
                    let name = name.trim();
                    flush_leaf(&mut stack, &mut tokens);
                    match stack.pop() {
                        Some(top) if top.name == name => {
                            tokens.push(Token::Close(top.name));
                        }
                        Some(top) => {
                            return Err(syntax(
                                format!(
                                    "unexpected </{name}> while <{0}> is open (perhaps <{0}> \
                                     is an element with an empty value)",
                                    top.name
                                ),
                                &stack,
                            ));
                        }
                        None => {
                            return Err(syntax(format!("unmatched closing tag </{name}>"), &stack));
                        }
                    }
                    if let Some(parent) = stack.last_mut() {
                        parent.has_children = true;
                        parent.text.clear();
                    }
                } else if inside.starts_with('!') || inside.starts_with('?') {
                    // Comments and processing instructions carry no content.
                } else {
                    let name = inside.split_whitespace().next().unwrap_or(inside);
                    if name.is_empty() {
                        return Err(syntax("empty tag name", &stack));
                    }
                    flush_leaf(&mut stack, &mut tokens);
                    if let Some(parent) = stack.last_mut() {
                        parent.has_children = true;
                        parent.text.clear();
                    }
                    if stack.len() >= MAX_NESTING {
                        return Err(Error::DepthExceeded { limit: MAX_NESTING });
                    }
                    tokens.push(Token::Open(name.to_string()));
                    stack.push(OpenElement {
                        name: name.to_string(),
                        text: String::new(),
                        has_children: false,
                    });
                }
            }
        }
    }

    if !stack.is_empty() {
        return Err(syntax("truncated document: unclosed elements", &stack));
    }

    Ok(tokens)
}

fn tokenize_xml(body: &str) -> Result<Vec<Token>> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut tokens = Vec::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(Error::DepthExceeded { limit: MAX_NESTING });
                }
                tokens.push(Token::Open(
                    String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ));
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                tokens.push(Token::Open(name.clone()));
                tokens.push(Token::Close(name));
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| Error::Xml(e.to_string()))?;
                if !text.trim().is_empty() {
                    tokens.push(Token::Text(text.trim().to_string()));
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                tokens.push(Token::Close(
                    String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ));
            }
            Event::Eof => break,
            // Declarations, PIs, comments, doctypes carry no aggregate data.
            _ => {}
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn open(s: &str) -> Token {
        Token::Open(s.to_string())
    }
    fn text(s: &str) -> Token {
        Token::Text(s.to_string())
    }
    fn close(s: &str) -> Token {
        Token::Close(s.to_string())
    }

    #[test]
    fn test_sgml_implicit_close() {
        let tokens =
            tokenize_sgml("<INVTRAN><FITID>123<DTTRADE>20230101</INVTRAN>").unwrap();
        assert_eq!(
            tokens,
            vec![
                open("INVTRAN"),
                open("FITID"),
                text("123"),
                close("FITID"),
                open("DTTRADE"),
                text("20230101"),
                close("DTTRADE"),
                close("INVTRAN"),
            ]
        );
    }

    #[test]
    fn test_sgml_explicit_leaf_close() {
        let tokens = tokenize_sgml("<INVTRAN><FITID>123</FITID></INVTRAN>").unwrap();
        assert_eq!(
            tokens,
            vec![
                open("INVTRAN"),
                open("FITID"),
                text("123"),
                close("FITID"),
                close("INVTRAN"),
            ]
        );
    }

    #[test]
    fn test_sgml_matches_xml_equivalent() {
        let sgml = tokenize_sgml("<A><B>1<C>2</A>").unwrap();
        let xml = tokenize_xml("<A><B>1</B><C>2</C></A>").unwrap();
        assert_eq!(sgml, xml);
    }

    #[test]
    fn test_sgml_entity_decoding() {
        let tokens = tokenize_sgml("<MEMO>AT&amp;T &lt;stock&gt;</MEMO>").unwrap();
        assert_eq!(tokens[1], text("AT&T <stock>"));
    }

    #[test]
    fn test_sgml_unbalanced_close() {
        assert!(tokenize_sgml("<A><B></C></A>").is_err());
        assert!(tokenize_sgml("</A>").is_err());
    }

    #[test]
    fn test_sgml_truncated() {
        assert!(tokenize_sgml("<A><B>1").is_err());
    }

    #[test]
    fn test_sgml_depth_bound() {
        let mut doc = String::new();
        for i in 0..(MAX_NESTING + 1) {
            doc.push_str(&format!("<T{i}>"));
        }
        assert!(matches!(
            tokenize_sgml(&doc),
            Err(Error::DepthExceeded { .. })
        ));
    }

    #[test]
    fn test_xml_tokens() {
        let tokens =
            tokenize_xml("<SECID><UNIQUEID>123456789</UNIQUEID><UNIQUEIDTYPE>CUSIP</UNIQUEIDTYPE></SECID>")
                .unwrap();
        assert_eq!(
            tokens,
            vec![
                open("SECID"),
                open("UNIQUEID"),
                text("123456789"),
                close("UNIQUEID"),
                open("UNIQUEIDTYPE"),
                text("CUSIP"),
                close("UNIQUEIDTYPE"),
                close("SECID"),
            ]
        );
    }

    #[test]
    fn test_escape_round_trip() {
        let raw = "AT&T <got> 5%";
        assert_eq!(decode_entities(&escape_text(raw)), raw);
    }
}
