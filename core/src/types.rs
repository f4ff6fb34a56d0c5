//! Result DTOs and pagination types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeSet;

/// Opaque continuation token returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NextToken(String);

impl NextToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which page to fetch. `PageRequest::default()` is the first page with the
/// service's default page size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: Option<u32>,
    pub next_token: Option<NextToken>,
}

impl PageRequest {
    pub fn first() -> Self {
        Self::default()
    }

    pub fn resume(token: NextToken) -> Self {
        Self {
            limit: None,
            next_token: Some(token),
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of results. `next_token` is `None` on the final page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<NextToken>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_token: None,
        }
    }

    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }

    /// Request for the following page, keeping `limit`. `None` on the last page.
    pub fn next_request(&self, limit: Option<u32>) -> Option<PageRequest> {
        self.next_token.clone().map(|token| PageRequest {
            limit,
            next_token: Some(token),
        })
    }
}

/// An item returned by `select`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub name: String,
    pub attributes: AttributeSet,
}

/// Metadata the service attaches to every successful response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
    pub request_id: Option<String>,
    pub box_usage: Option<String>,
}
