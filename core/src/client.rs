//! Orchestrating client for the attribute store.
//!
//! # Design
//! `SdbClient` holds immutable configuration, credentials, a clock and the
//! caller's transport. It keeps no cache, session or "current domain": every
//! call re-submits or re-fetches state. Each operation runs the same
//! pipeline: validate locally, build, sign, execute, parse, map faults.
//!
//! Paginated operations come in two forms. The single-page form returns one
//! `Page` whose `next_token` resumes the listing later. The `*_all` form
//! loops on continuation tokens until the service stops returning one, and
//! is all-or-nothing: any failure discards the pages already collected.
//!
//! Nothing is retried here. Idempotent "already in the desired state"
//! outcomes (creating an existing domain, deleting a missing one) are plain
//! successes from the service and surface as `Ok`.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::attributes::{AttributeSet, Attributes};
use crate::config::ClientConfig;
use crate::error::{Result, SdbError};
use crate::http::Transport;
use crate::request::{Params, RequestBuilder};
use crate::response::{parse_response, Payload};
use crate::signer::{Clock, Credentials, SystemClock};
use crate::types::{NextToken, Page, PageRequest, Row};

pub struct SdbClient<T> {
    builder: RequestBuilder,
    clock: Arc<dyn Clock>,
    transport: T,
}

impl<T: Transport> SdbClient<T> {
    pub fn new(credentials: Credentials, transport: T) -> Self {
        Self::with_config(ClientConfig::default(), credentials, transport)
    }

    pub fn with_config(config: ClientConfig, credentials: Credentials, transport: T) -> Self {
        Self {
            builder: RequestBuilder::new(config, credentials),
            clock: Arc::new(SystemClock),
            transport,
        }
    }

    /// Replaces the timestamp source, e.g. with a `FixedClock` in tests.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn call(&self, params: Params) -> Result<Payload> {
        let action = params.action();
        let request = self.builder.sign(params, self.clock.now())?;
        debug!(
            action = action.as_str(),
            method = request.method.as_str(),
            endpoint = %self.builder.config().endpoint,
            "sending request"
        );
        let response = self.transport.execute(request).map_err(|e| {
            debug!(action = action.as_str(), error = %e, "transport failure");
            SdbError::Transport(e)
        })?;
        match parse_response(action, &response) {
            Ok((payload, metadata)) => {
                trace!(
                    action = action.as_str(),
                    request_id = metadata.request_id.as_deref().unwrap_or("-"),
                    box_usage = metadata.box_usage.as_deref().unwrap_or("-"),
                    "request succeeded"
                );
                Ok(payload)
            }
            Err(e) => {
                if let Some(fault) = e.fault() {
                    debug!(
                        action = action.as_str(),
                        code = %fault.code,
                        request_id = fault.request_id.as_deref().unwrap_or("-"),
                        "service fault"
                    );
                }
                Err(e)
            }
        }
    }

    fn unexpected(payload: &Payload) -> SdbError {
        SdbError::MalformedResponse(format!("unexpected payload {payload:?}"))
    }

    /// Creates `domain`. Succeeds if it already exists.
    pub fn create_domain(&self, domain: &str) -> Result<()> {
        let params = self.builder.create_domain(domain)?;
        self.call(params).map(drop)
    }

    /// Deletes `domain`. Succeeds if it does not exist.
    pub fn delete_domain(&self, domain: &str) -> Result<()> {
        let params = self.builder.delete_domain(domain)?;
        self.call(params).map(drop)
    }

    pub fn list_domains(&self, page: &PageRequest) -> Result<Page<String>> {
        let params = self.builder.list_domains(page)?;
        match self.call(params)? {
            Payload::DomainNames(page) => Ok(page),
            other => Err(Self::unexpected(&other)),
        }
    }

    /// Every domain name, following continuation tokens.
    pub fn list_all_domains(&self, page_size: Option<u32>) -> Result<Vec<String>> {
        collect_pages(page_size, |page| self.list_domains(page))
    }

    /// Stores `attributes` on `item`, creating it if needed. With `replace`
    /// every submitted name overwrites its stored values; otherwise values
    /// are appended unless marked with `Attributes::replace`.
    pub fn put_attributes(
        &self,
        domain: &str,
        item: &str,
        attributes: &Attributes,
        replace: bool,
    ) -> Result<()> {
        let params = self.builder.put_attributes(domain, item, attributes, replace)?;
        self.call(params).map(drop)
    }

    /// All attributes of `item`; empty when the item does not exist.
    pub fn get_attributes(&self, domain: &str, item: &str) -> Result<AttributeSet> {
        self.get_attributes_named(domain, item, &[])
    }

    /// Attributes of `item` restricted to `names` (all when empty).
    pub fn get_attributes_named(
        &self,
        domain: &str,
        item: &str,
        names: &[&str],
    ) -> Result<AttributeSet> {
        let params = self.builder.get_attributes(domain, item, names)?;
        match self.call(params)? {
            Payload::Attributes(set) => Ok(set),
            other => Err(Self::unexpected(&other)),
        }
    }

    /// Deletes the named attributes, or the whole item when `names` is
    /// `None`. Deleting from a missing item succeeds.
    pub fn delete_attributes(
        &self,
        domain: &str,
        item: &str,
        names: Option<&[&str]>,
    ) -> Result<()> {
        let params = self.builder.delete_attributes(domain, item, names)?;
        self.call(params).map(drop)
    }

    /// Deletes only the listed name/value pairs.
    pub fn delete_attribute_values(
        &self,
        domain: &str,
        item: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        let params = self.builder.delete_attribute_values(domain, item, attributes)?;
        self.call(params).map(drop)
    }

    /// Item names in `domain` matching `expression`, sent verbatim.
    pub fn query(
        &self,
        domain: &str,
        expression: &str,
        page: &PageRequest,
    ) -> Result<Page<String>> {
        let params = self.builder.query(domain, expression, page)?;
        match self.call(params)? {
            Payload::ItemNames(page) => Ok(page),
            other => Err(Self::unexpected(&other)),
        }
    }

    pub fn query_all(
        &self,
        domain: &str,
        expression: &str,
        page_size: Option<u32>,
    ) -> Result<Vec<String>> {
        collect_pages(page_size, |page| self.query(domain, expression, page))
    }

    /// Rows matching a select `expression`, sent verbatim. The page size is
    /// controlled by a `limit` clause in the expression itself.
    pub fn select(&self, expression: &str, next_token: Option<&NextToken>) -> Result<Page<Row>> {
        let params = self.builder.select(expression, next_token)?;
        match self.call(params)? {
            Payload::Rows(page) => Ok(page),
            other => Err(Self::unexpected(&other)),
        }
    }

    pub fn select_all(&self, expression: &str) -> Result<Vec<Row>> {
        collect_pages(None, |page| self.select(expression, page.next_token.as_ref()))
    }
}

/// Drives the START -> FETCHING -> (MORE | DONE) loop for one aggregated
/// call. Stops with `RepeatedNextToken` if the service hands back a token it
/// already returned.
fn collect_pages<I, F>(page_size: Option<u32>, mut fetch: F) -> Result<Vec<I>>
where
    F: FnMut(&PageRequest) -> Result<Page<I>>,
{
    let mut items = Vec::new();
    let mut seen: HashSet<NextToken> = HashSet::new();
    let mut request = PageRequest {
        limit: page_size,
        next_token: None,
    };
    let mut pages = 0usize;
    loop {
        let page = fetch(&request)?;
        pages += 1;
        trace!(page = pages, items = page.items.len(), more = !page.is_last(), "fetched page");
        let next = page.next_token.clone();
        items.extend(page.items);
        match next {
            None => return Ok(items),
            Some(token) => {
                if !seen.insert(token.clone()) {
                    warn!(page = pages, "continuation token repeated; aborting listing");
                    return Err(SdbError::RepeatedNextToken(token.to_string()));
                }
                request.next_token = Some(token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::error::FaultKind;
    use crate::http::{HttpRequest, HttpResponse, TransportError};
    use crate::signer::FixedClock;

    /// Replays canned responses and records every request it receives.
    struct Scripted {
        responses: RefCell<VecDeque<std::result::Result<HttpResponse, TransportError>>>,
        requests: RefCell<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<std::result::Result<HttpResponse, TransportError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                requests: RefCell::new(Vec::new()),
            }
        }

        fn ok(bodies: &[&str]) -> Self {
            Self::new(bodies.iter().map(|b| Ok(HttpResponse::new(200, *b))).collect())
        }

        fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl Transport for Scripted {
        fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
            self.requests.borrow_mut().push(request);
            self.responses
                .borrow_mut()
                .pop_front()
                .expect("script exhausted")
        }
    }

    fn client(transport: Scripted) -> SdbClient<Scripted> {
        SdbClient::new(Credentials::new("AKID", "secret"), transport)
            .with_clock(FixedClock(Utc.with_ymd_and_hms(2010, 1, 25, 15, 1, 28).unwrap()))
    }

    fn domains_page(names: &[&str], token: Option<&str>) -> String {
        let mut xml = String::from("<ListDomainsResponse><ListDomainsResult>");
        for n in names {
            xml.push_str(&format!("<DomainName>{n}</DomainName>"));
        }
        if let Some(t) = token {
            xml.push_str(&format!("<NextToken>{t}</NextToken>"));
        }
        xml.push_str("</ListDomainsResult></ListDomainsResponse>");
        xml
    }

    const FAULT: &str = "<Response><Errors><Error><Code>ServiceUnavailable</Code><Message>busy</Message></Error></Errors><RequestID>r-9</RequestID></Response>";

    #[test]
    fn invalid_domain_never_reaches_transport() {
        let c = client(Scripted::ok(&[]));
        for name in ["", "   ", "xx", "@$^*()"] {
            assert!(matches!(c.create_domain(name), Err(SdbError::InvalidParameterValue(_))));
        }
        assert_eq!(c.transport().request_count(), 0);
    }

    #[test]
    fn empty_delete_list_never_reaches_transport() {
        let c = client(Scripted::ok(&[]));
        assert!(matches!(
            c.delete_attributes("foo", "bar", Some(&[])),
            Err(SdbError::InvalidParameterValue(_))
        ));
        assert_eq!(c.transport().request_count(), 0);
    }

    #[test]
    fn list_all_domains_concatenates_pages_in_order() {
        let pages = [
            domains_page(&["a1", "a2"], Some("t1")),
            domains_page(&["b1"], Some("t2")),
            domains_page(&["c1", "c2"], None),
        ];
        let c = client(Scripted::ok(&pages.iter().map(String::as_str).collect::<Vec<_>>()));
        let all = c.list_all_domains(Some(2)).unwrap();
        assert_eq!(all, vec!["a1", "a2", "b1", "c1", "c2"]);

        let requests = c.transport().requests.borrow();
        assert_eq!(requests.len(), 3);
        assert!(!requests[0].url.contains("NextToken"));
        assert!(requests[1].url.contains("NextToken=t1"));
        assert!(requests[2].url.contains("NextToken=t2"));
        assert!(requests.iter().all(|r| r.url.contains("MaxNumberOfDomains=2")));
    }

    #[test]
    fn single_page_returns_resumable_token() {
        let c = client(Scripted::ok(&[&domains_page(&["a"], Some("more"))]));
        let page = c.list_domains(&PageRequest::first()).unwrap();
        assert_eq!(page.items, vec!["a"]);
        assert_eq!(page.next_token, Some(NextToken::new("more")));
        assert_eq!(c.transport().request_count(), 1);
    }

    #[test]
    fn repeated_token_terminates_the_loop() {
        let pages = [
            domains_page(&["a"], Some("same")),
            domains_page(&["b"], Some("same")),
        ];
        let c = client(Scripted::ok(&pages.iter().map(String::as_str).collect::<Vec<_>>()));
        assert!(matches!(
            c.list_all_domains(None),
            Err(SdbError::RepeatedNextToken(t)) if t == "same"
        ));
        assert_eq!(c.transport().request_count(), 2);
    }

    #[test]
    fn fault_mid_listing_discards_partial_results() {
        let c = client(Scripted::new(vec![
            Ok(HttpResponse::new(200, domains_page(&["a"], Some("t1")))),
            Ok(HttpResponse::new(503, FAULT)),
        ]));
        match c.list_all_domains(None) {
            Err(SdbError::ServiceUnavailable(f)) => {
                assert_eq!(f.message, "busy");
                assert_eq!(f.request_id.as_deref(), Some("r-9"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn timeout_surfaces_as_transport_error() {
        let c = client(Scripted::new(vec![
            Ok(HttpResponse::new(200, domains_page(&["a"], Some("t1")))),
            Err(TransportError::timeout("page 2")),
        ]));
        match c.list_all_domains(None) {
            Err(SdbError::Transport(e)) => assert!(e.is_timeout()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn query_with_empty_document_is_empty() {
        let c = client(Scripted::ok(&[""]));
        let page = c
            .query("foo", "[ 'answer' = '42' ]", &PageRequest::first())
            .unwrap();
        assert!(page.items.is_empty());
        assert!(page.is_last());
        let requests = c.transport().requests.borrow();
        assert!(requests[0].url.contains("Action=Query&"));
        assert!(requests[0].url.contains("DomainName=foo&"));
        assert!(requests[0]
            .url
            .contains("QueryExpression=%5B%20%27answer%27%20%3D%20%2742%27%20%5D&"));
    }

    #[test]
    fn select_all_follows_tokens() {
        let first = "<SelectResponse><SelectResult><Item><Name>i1</Name><Attribute><Name>k</Name><Value>v</Value></Attribute></Item><NextToken>n1</NextToken></SelectResult></SelectResponse>";
        let second = "<SelectResponse><SelectResult><Item><Name>i2</Name></Item></SelectResult></SelectResponse>";
        let c = client(Scripted::ok(&[first, second]));
        let rows = c.select_all("select * from foo").unwrap();
        assert_eq!(rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["i1", "i2"]);
        assert_eq!(rows[0].attributes.first("k"), Some("v"));
    }

    #[test]
    fn no_such_domain_maps_to_variant() {
        let body = "<Response><Errors><Error><Code>NoSuchDomain</Code><Message>missing</Message></Error></Errors><RequestID>r-1</RequestID></Response>";
        let c = client(Scripted::new(vec![Ok(HttpResponse::new(400, body))]));
        let err = c.get_attributes("nothere", "item").unwrap_err();
        assert_eq!(err.kind(), Some(FaultKind::NoSuchDomain));
    }

    #[test]
    fn mutating_calls_are_not_retried() {
        let c = client(Scripted::new(vec![Ok(HttpResponse::new(503, FAULT))]));
        let attrs = Attributes::new().add("k", "v");
        assert!(c.put_attributes("foo", "bar", &attrs, false).is_err());
        assert_eq!(c.transport().request_count(), 1);
    }
}
