//! Response parsing.
//!
//! # Design
//! The XML body is first read into a small owned element tree, independent
//! of any particular document shape. Translation into typed results then
//! happens per action against that tree, producing a `Payload` variant. The
//! error check always runs before payload extraction, so a fault document
//! never triggers a secondary parse error.
//!
//! A missing result element, or an empty body, is an empty result rather
//! than a failure.

use std::borrow::Cow;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::attributes::AttributeSet;
use crate::error::{Fault, Result, SdbError};
use crate::http::HttpResponse;
use crate::request::Action;
use crate::types::{NextToken, Page, ResponseMetadata, Row};

/// Typed success payload, one variant per result shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Actions that return nothing but metadata.
    Empty,
    DomainNames(Page<String>),
    Attributes(AttributeSet),
    ItemNames(Page<String>),
    Rows(Page<Row>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success {
        payload: Payload,
        metadata: ResponseMetadata,
    },
    Fault(Fault),
}

/// Minimal owned XML element. Names are local (namespace prefixes dropped).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(malformed)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(malformed)?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attrs,
            ..Self::default()
        })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Depth-first search including `self`.
    fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Leaf text, base64-decoded when the element says so.
    fn value(&self) -> Result<String> {
        match self.attr("encoding") {
            Some(enc) if enc.eq_ignore_ascii_case("base64") => {
                let bytes = STANDARD
                    .decode(self.text.trim())
                    .map_err(|e| malformed(format!("<{}> base64: {e}", self.name)))?;
                String::from_utf8(bytes)
                    .map_err(|e| malformed(format!("<{}> is not UTF-8: {e}", self.name)))
            }
            _ => Ok(self.text.clone()),
        }
    }
}

fn malformed(e: impl ToString) -> SdbError {
    SdbError::MalformedResponse(e.to_string())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn read_tree(xml: &str) -> Result<Option<Element>> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => stack.push(Element::open(&e)?),
            Event::Empty(e) => {
                let element = Element::open(&e)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("unbalanced closing tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape().map_err(malformed)?);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    let text: Cow<'_, str> = c.decode().map_err(malformed)?;
                    top.text.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        return Err(malformed(format!("unclosed element <{}>", open.name)));
    }
    Ok(root)
}

fn extract_fault(root: &Element) -> Option<Fault> {
    let error = match root.find("Errors") {
        Some(errors) => errors.child("Error")?,
        None => root.find("Error")?,
    };
    let request_id = root
        .child_text("RequestID")
        .or_else(|| root.child_text("RequestId"))
        .or_else(|| error.child_text("RequestId"))
        .map(str::to_string);
    Some(Fault {
        code: error.child_text("Code").unwrap_or_default().to_string(),
        message: error.child_text("Message").unwrap_or_default().to_string(),
        request_id,
        box_usage: error.child_text("BoxUsage").map(str::to_string),
    })
}

fn extract_metadata(root: &Element) -> ResponseMetadata {
    match root.find("ResponseMetadata") {
        Some(meta) => ResponseMetadata {
            request_id: meta.child_text("RequestId").map(str::to_string),
            box_usage: meta.child_text("BoxUsage").map(str::to_string),
        },
        None => ResponseMetadata::default(),
    }
}

fn next_token(result: &Element) -> Option<NextToken> {
    result
        .child_text("NextToken")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(NextToken::new)
}

fn names_page(result: Option<&Element>, element: &str) -> Result<Page<String>> {
    let Some(result) = result else {
        return Ok(Page::empty());
    };
    Ok(Page {
        items: result
            .children_named(element)
            .map(Element::value)
            .collect::<Result<_>>()?,
        next_token: next_token(result),
    })
}

/// Folds every `<Attribute><Name/><Value/></Attribute>` child of `parent`.
fn attribute_set(parent: &Element) -> Result<AttributeSet> {
    let mut set = AttributeSet::new();
    for attribute in parent.children_named("Attribute") {
        let name = attribute
            .child("Name")
            .ok_or_else(|| malformed("<Attribute> without <Name>"))?
            .value()?;
        let value = match attribute.child("Value") {
            Some(v) => v.value()?,
            None => String::new(),
        };
        set.push(name, value);
    }
    Ok(set)
}

fn rows_page(result: Option<&Element>) -> Result<Page<Row>> {
    let Some(result) = result else {
        return Ok(Page::empty());
    };
    let mut rows = Vec::new();
    for item in result.children_named("Item") {
        let name = item
            .child("Name")
            .ok_or_else(|| malformed("<Item> without <Name>"))?
            .value()?;
        rows.push(Row {
            name,
            attributes: attribute_set(item)?,
        });
    }
    Ok(Page {
        items: rows,
        next_token: next_token(result),
    })
}

fn extract_payload(action: Action, root: &Element) -> Result<Payload> {
    Ok(match action {
        Action::CreateDomain
        | Action::DeleteDomain
        | Action::PutAttributes
        | Action::DeleteAttributes => Payload::Empty,
        Action::ListDomains => {
            Payload::DomainNames(names_page(root.find("ListDomainsResult"), "DomainName")?)
        }
        Action::GetAttributes => match root.find("GetAttributesResult") {
            Some(result) => Payload::Attributes(attribute_set(result)?),
            None => Payload::Attributes(AttributeSet::new()),
        },
        Action::Query => Payload::ItemNames(names_page(root.find("QueryResult"), "ItemName")?),
        Action::Select => Payload::Rows(rows_page(root.find("SelectResult"))?),
    })
}

fn empty_payload(action: Action) -> Payload {
    match action {
        Action::ListDomains => Payload::DomainNames(Page::empty()),
        Action::GetAttributes => Payload::Attributes(AttributeSet::new()),
        Action::Query => Payload::ItemNames(Page::empty()),
        Action::Select => Payload::Rows(Page::empty()),
        _ => Payload::Empty,
    }
}

/// Parses a response document for `action`. Malformed XML, or a success
/// document for some other action, is an `Err`; a service error document
/// becomes `Outcome::Fault`.
pub fn parse_xml(action: Action, xml: &str) -> Result<Outcome> {
    let Some(root) = read_tree(xml)? else {
        return Ok(Outcome::Success {
            payload: empty_payload(action),
            metadata: ResponseMetadata::default(),
        });
    };
    if let Some(fault) = extract_fault(&root) {
        return Ok(Outcome::Fault(fault));
    }
    let expected = format!("{}Response", action.as_str());
    if root.name != expected {
        return Err(malformed(format!(
            "expected <{expected}> document, got <{}>",
            root.name
        )));
    }
    Ok(Outcome::Success {
        payload: extract_payload(action, &root)?,
        metadata: extract_metadata(&root),
    })
}

/// Interprets a full HTTP response: faults become the mapped `SdbError`,
/// non-2xx responses without an error document are classified by status.
pub fn parse_response(
    action: Action,
    response: &HttpResponse,
) -> Result<(Payload, ResponseMetadata)> {
    let outcome = match parse_xml(action, &response.body) {
        Ok(outcome) => outcome,
        Err(SdbError::MalformedResponse(_)) if !response.is_success() => {
            return Err(status_error(response));
        }
        Err(e) => return Err(e),
    };
    match outcome {
        Outcome::Fault(fault) => Err(SdbError::from(fault)),
        Outcome::Success { .. } if !response.is_success() => Err(status_error(response)),
        Outcome::Success { payload, metadata } => Ok((payload, metadata)),
    }
}

fn status_error(response: &HttpResponse) -> SdbError {
    match response.status {
        503 => SdbError::ServiceUnavailable(Fault::new("ServiceUnavailable", response.body.clone())),
        500 => SdbError::Internal(Fault::new("InternalError", response.body.clone())),
        status => SdbError::Http {
            status,
            body: response.body.clone(),
        },
    }
}
