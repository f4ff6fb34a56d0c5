//! Client core for a signed HTTP/XML key/attribute store.
//!
//! # Overview
//! Domains hold items, items hold multi-valued attribute sets. This crate
//! builds signed requests, parses the XML responses into typed results and
//! maps service faults into `SdbError`. The HTTP exchange itself is supplied
//! by the caller through the `Transport` trait (host-does-IO pattern).
//!
//! # Design
//! - `RequestBuilder` and `response::parse_response` are I/O free and can be
//!   used directly; `SdbClient` composes them with a transport.
//! - `SdbClient` is stateless apart from immutable credentials and config:
//!   no caching, no session, no retries. The store is eventually consistent
//!   and the client does not pretend otherwise.
//! - Signing takes an explicit timestamp so it is deterministic.

pub mod attributes;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod signer;
pub mod types;
pub mod validate;

pub use attributes::{AttributeSet, AttributeValue, Attributes};
pub use client::SdbClient;
pub use config::ClientConfig;
pub use error::{Fault, FaultKind, Result, SdbError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError, TransportErrorKind};
pub use request::{Action, Params, RequestBuilder};
pub use response::{Outcome, Payload};
pub use signer::{Clock, Credentials, FixedClock, Signer, SystemClock};
pub use types::{NextToken, Page, PageRequest, ResponseMetadata, Row};
pub use validate::validate_domain_name;
