//! Unmarshalling: OFX bytes to a typed object graph.
//!
//! The reader splits off the header block, tokenizes the body in the
//! detected wire mode, and drives object construction from a stack of
//! partially built aggregates. Each open tag is matched against the current
//! aggregate's field descriptors; leaf text is coerced to the declared
//! scalar kind; close tags verify required fields and attach the finished
//! child through its real setter. Unknown tags nested inside a known
//! aggregate are skipped for forward compatibility.

use std::collections::HashSet;
use std::io::Read;
use std::marker::PhantomData;

use crate::coerce;
use crate::error::{Error, Result};
use crate::header;
use crate::meta::{Aggregate, AggregateDescriptor, FieldKind, Registry};
use crate::tokenizer::{self, Token};

/// Unmarshaller for a statically known root aggregate type.
pub struct AggregateUnmarshaller<'r, A> {
    registry: &'r Registry,
    _marker: PhantomData<fn() -> A>,
}

impl<'r, A: Aggregate> AggregateUnmarshaller<'r, A> {
    pub fn new(registry: &'r Registry) -> Self {
        AggregateUnmarshaller {
            registry,
            _marker: PhantomData,
        }
    }

    /// Unmarshal a complete OFX document (header block plus body).
    pub fn unmarshal(&self, bytes: &[u8]) -> Result<A> {
        self.unmarshal_str(std::str::from_utf8(bytes)?)
    }

    pub fn unmarshal_str(&self, input: &str) -> Result<A> {
        let expected = self.registry.describe::<A>()?.tag();
        let (_, root) = unmarshal_root(self.registry, input, Some(expected))?;
        match root.into_any().downcast::<A>() {
            Ok(value) => Ok(*value),
            // Tag uniqueness makes this unreachable in practice.
            Err(_) => Err(Error::Config(format!(
                "root <{expected}> did not produce the expected type"
            ))),
        }
    }

    /// Unmarshal from any source implementing `Read`.
    pub fn from_read<R: Read>(&self, reader: &mut R) -> Result<A> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        self.unmarshal_str(&text)
    }
}

/// Unmarshal a document whose root type is not known ahead of time. The
/// root tag is resolved through the registry; an unrecognized top-level tag
/// is an error.
pub fn unmarshal_any(registry: &Registry, bytes: &[u8]) -> Result<(String, Box<dyn Aggregate>)> {
    unmarshal_root(registry, std::str::from_utf8(bytes)?, None)
}

fn unmarshal_root(
    registry: &Registry,
    input: &str,
    expected_tag: Option<&str>,
) -> Result<(String, Box<dyn Aggregate>)> {
    let (ofx_header, version, body) = header::split_document(input)?;
    tracing::debug!(version = %ofx_header.version, "parsing OFX document");
    let tokens = tokenizer::tokenize(body, version)?;
    parse_tokens(registry, &tokens, expected_tag)
}

/// An element leaf currently buffering its text.
struct PendingElement {
    field: usize,
    tag: String,
    text: String,
}

struct NodeFrame<'r> {
    tag: String,
    desc: &'r AggregateDescriptor,
    object: Box<dyn Aggregate>,
    seen: HashSet<u32>,
    /// Field index in the parent aggregate to attach to on close; `None`
    /// for the root.
    attach_to: Option<usize>,
    pending: Option<PendingElement>,
}

enum Frame<'r> {
    Node(NodeFrame<'r>),
    /// An unrecognized subtree being skipped for forward compatibility.
    Skip { tag: String },
}

enum Binding {
    Element(usize),
    Child(usize),
    ListEntry(usize),
    Unknown,
}

/// Match an open tag against the aggregate's declared fields: elements and
/// singular children by their wire tag, homogeneous lists by their element
/// tag, and heterogeneous lists by resolving the tag through the registry.
fn find_binding(desc: &AggregateDescriptor, name: &str, registry: &Registry) -> Binding {
    for (index, field) in desc.fields().iter().enumerate() {
        if field.tag() != Some(name) {
            continue;
        }
        match &field.kind {
            FieldKind::Element { .. } => return Binding::Element(index),
            FieldKind::Child { .. } => return Binding::Child(index),
            FieldKind::ChildList { .. } => return Binding::ListEntry(index),
        }
    }
    if registry.resolve(name).is_some() {
        for (index, field) in desc.fields().iter().enumerate() {
            if let FieldKind::ChildList { element: None, .. } = &field.kind {
                return Binding::ListEntry(index);
            }
        }
    }
    Binding::Unknown
}

fn path_of(stack: &[Frame<'_>]) -> String {
    let tags: Vec<&str> = stack
        .iter()
        .map(|frame| match frame {
            Frame::Node(node) => node.tag.as_str(),
            Frame::Skip { tag } => tag.as_str(),
        })
        .collect();
    if tags.is_empty() {
        "/".to_string()
    } else {
        tags.join("/")
    }
}

fn parse_tokens(
    registry: &Registry,
    tokens: &[Token],
    expected_tag: Option<&str>,
) -> Result<(String, Box<dyn Aggregate>)> {
    let mut stack: Vec<Frame<'_>> = Vec::new();
    let mut finished: Option<(String, Box<dyn Aggregate>)> = None;

    for token in tokens {
        match token {
            Token::Open(name) => {
                if finished.is_some() {
                    return Err(Error::Syntax {
                        message: format!("content after root element: <{name}>"),
                        path: "/".to_string(),
                    });
                }
                match stack.last_mut() {
                    None => {
                        if let Some(expected) = expected_tag {
                            if name != expected {
                                return Err(Error::UnexpectedRoot {
                                    expected: expected.to_string(),
                                    found: name.clone(),
                                });
                            }
                        }
                        let desc = registry
                            .resolve(name)
                            .ok_or_else(|| Error::UnknownRoot { tag: name.clone() })?;
                        stack.push(Frame::Node(NodeFrame {
                            tag: name.clone(),
                            desc,
                            object: desc.instantiate(),
                            seen: HashSet::new(),
                            attach_to: None,
                            pending: None,
                        }));
                    }
                    Some(Frame::Skip { .. }) => {
                        stack.push(Frame::Skip { tag: name.clone() });
                    }
                    Some(Frame::Node(node)) => {
                        if node.pending.is_some() {
                            tracing::warn!(tag = %name, "unexpected tag inside element, skipping");
                            stack.push(Frame::Skip { tag: name.clone() });
                            continue;
                        }
                        match find_binding(node.desc, name, registry) {
                            Binding::Element(index) => {
                                node.pending = Some(PendingElement {
                                    field: index,
                                    tag: name.clone(),
                                    text: String::new(),
                                });
                            }
                            Binding::Child(index) | Binding::ListEntry(index) => {
                                // Tag uniqueness: the open tag names the
                                // concrete child type.
                                match registry.resolve(name) {
                                    Some(child_desc) => {
                                        stack.push(Frame::Node(NodeFrame {
                                            tag: name.clone(),
                                            desc: child_desc,
                                            object: child_desc.instantiate(),
                                            seen: HashSet::new(),
                                            attach_to: Some(index),
                                            pending: None,
                                        }));
                                    }
                                    None => {
                                        tracing::warn!(
                                            tag = %name,
                                            aggregate = node.desc.tag(),
                                            "child tag has no registered type, skipping"
                                        );
                                        stack.push(Frame::Skip { tag: name.clone() });
                                    }
                                }
                            }
                            Binding::Unknown => {
                                tracing::warn!(
                                    tag = %name,
                                    aggregate = node.desc.tag(),
                                    "unknown tag, skipping for forward compatibility"
                                );
                                stack.push(Frame::Skip { tag: name.clone() });
                            }
                        }
                    }
                }
            }
            Token::Text(text) => {
                if let Some(Frame::Node(node)) = stack.last_mut() {
                    match node.pending.as_mut() {
                        Some(pending) => pending.text.push_str(text),
                        None => {
                            tracing::debug!(aggregate = node.desc.tag(), "ignoring stray text")
                        }
                    }
                }
            }
            Token::Close(name) => {
                match stack.last_mut() {
                    Some(Frame::Skip { tag }) if tag == name => {
                        stack.pop();
                    }
                    Some(Frame::Node(node)) if node.pending.is_some() => {
                        // The tokenizer closes leaves before anything else,
                        // so a mismatch here is structurally impossible in
                        // well-formed input.
                        let pending = match node.pending.take() {
                            Some(p) if &p.tag == name => p,
                            _ => {
                                return Err(Error::Syntax {
                                    message: format!("unexpected closing tag </{name}>"),
                                    path: path_of(&stack),
                                });
                            }
                        };
                        let raw = pending.text.trim();
                        if raw.is_empty() {
                            // An explicitly empty element carries no value.
                            tracing::debug!(tag = %name, "ignoring empty element");
                            continue;
                        }
                        let field = &node.desc.fields()[pending.field];
                        if let FieldKind::Element { scalar, set, .. } = &field.kind {
                            let value = match coerce::parse(*scalar, raw) {
                                Ok(value) => value,
                                Err(cause) => {
                                    let path = path_of(&stack);
                                    return Err(Error::Coercion {
                                        tag: name.clone(),
                                        path,
                                        cause,
                                    });
                                }
                            };
                            let order = field.order();
                            set(node.object.as_mut(), value);
                            node.seen.insert(order);
                        }
                    }
                    Some(Frame::Node(node)) if node.tag == *name => {
                        let frame = match stack.pop() {
                            Some(Frame::Node(node)) => node,
                            _ => unreachable!("top of stack was just matched"),
                        };
                        for field in frame.desc.fields() {
                            if field.required() && !frame.seen.contains(&field.order()) {
                                return Err(Error::MissingField {
                                    tag: field.tag().unwrap_or("(list)").to_string(),
                                    aggregate: frame.desc.tag().to_string(),
                                    path: path_of(&stack),
                                });
                            }
                        }
                        match frame.attach_to {
                            None => finished = Some((frame.tag, frame.object)),
                            Some(index) => {
                                if let Some(Frame::Node(parent)) = stack.last_mut() {
                                    let field = &parent.desc.fields()[index];
                                    let order = field.order();
                                    let accepted = match &field.kind {
                                        FieldKind::Child { set, .. } => {
                                            set(parent.object.as_mut(), frame.object)
                                        }
                                        FieldKind::ChildList { push, .. } => {
                                            push(parent.object.as_mut(), frame.object)
                                        }
                                        FieldKind::Element { .. } => false,
                                    };
                                    if accepted {
                                        parent.seen.insert(order);
                                    } else {
                                        tracing::warn!(
                                            tag = %name,
                                            aggregate = parent.desc.tag(),
                                            "aggregate not accepted here, dropped"
                                        );
                                    }
                                }
                            }
                        }
                    }
                    _ => {
                        return Err(Error::Syntax {
                            message: format!("unexpected closing tag </{name}>"),
                            path: path_of(&stack),
                        });
                    }
                }
            }
        }
    }

    finished.ok_or_else(|| Error::Syntax {
        message: "document contains no root aggregate".to_string(),
        path: "/".to_string(),
    })
}
