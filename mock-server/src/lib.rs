//! In-memory stand-in for the attribute store service.
//!
//! Speaks the signed query protocol (GET query string or POST form body on
//! `/`) and answers with the service's XML documents. Signatures are
//! verified independently of the client crate so the two implementations
//! check each other. The query and select languages are only understood in
//! their simplest single-predicate form.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use quick_xml::escape::escape;
use sha2::Sha256;
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const ACCESS_KEY: &str = "0PN5J17HBGZHT7JJ3X82";
pub const SECRET_KEY: &str = "uV3F3YluFJax1cknvbcGwgjvx4QpvB+leU8dUj2o";

const XMLNS: &str = "http://sdb.amazonaws.com/doc/2007-11-07/";
const BOX_USAGE: &str = "0.0000219907";
const DEFAULT_MAX_DOMAINS: usize = 100;
const DEFAULT_MAX_ITEMS: usize = 100;
const SELECT_PAGE_SIZE: usize = 100;

const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Item name to its `(name, value)` pairs.
pub type Domain = BTreeMap<String, Vec<(String, String)>>;
pub type Db = Arc<RwLock<BTreeMap<String, Domain>>>;

#[derive(Clone)]
pub struct AppState {
    db: Db,
    access_key: Arc<str>,
    secret_key: Arc<str>,
}

pub fn app() -> Router {
    app_with_credentials(ACCESS_KEY, SECRET_KEY)
}

pub fn app_with_credentials(access_key: &str, secret_key: &str) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(BTreeMap::new())),
        access_key: access_key.into(),
        secret_key: secret_key.into(),
    };
    Router::new()
        .route("/", get(handle_get).post(handle_post))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Signature the service expects for `params` (which must not include
/// `Signature` itself).
pub fn expected_signature(
    secret_key: &str,
    method: &str,
    host: &str,
    path: &str,
    params: &[(String, String)],
) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let query = sorted
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, UNRESERVED),
                utf8_percent_encode(v, UNRESERVED)
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    let to_sign = format!("{method}\n{}\n{path}\n{query}", host.to_ascii_lowercase());
    let mut mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// A protocol-level error document.
#[derive(Debug)]
struct ServiceError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ServiceError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    fn missing(name: &str) -> Self {
        Self::bad_request(
            "MissingParameter",
            format!("The request must contain the parameter {name}"),
        )
    }

    fn no_such_domain() -> Self {
        Self::bad_request("NoSuchDomain", "The specified domain does not exist.")
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = format!(
            "<?xml version=\"1.0\"?>\n<Response><Errors><Error><Code>{}</Code><Message>{}</Message><BoxUsage>{BOX_USAGE}</BoxUsage></Error></Errors><RequestID>{}</RequestID></Response>",
            self.code,
            escape(self.message.as_str()),
            Uuid::new_v4()
        );
        (self.status, [(header::CONTENT_TYPE, "text/xml")], body).into_response()
    }
}

fn success(action: &str, result: Option<String>) -> Response {
    let result = match result {
        Some(inner) => format!("<{action}Result>{inner}</{action}Result>"),
        None => String::new(),
    };
    let body = format!(
        "<?xml version=\"1.0\"?>\n<{action}Response xmlns=\"{XMLNS}\">{result}<ResponseMetadata><RequestId>{}</RequestId><BoxUsage>{BOX_USAGE}</BoxUsage></ResponseMetadata></{action}Response>",
        Uuid::new_v4()
    );
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

fn parse_params(raw: &str) -> Result<Vec<(String, String)>, ServiceError> {
    let decode = |s: &str| {
        percent_decode_str(s)
            .decode_utf8()
            .map(|c| c.into_owned())
            .map_err(|_| {
                ServiceError::bad_request("InvalidParameterValue", "parameters are not UTF-8")
            })
    };
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((decode(k)?, decode(v)?))
        })
        .collect()
}

async fn handle_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    dispatch(&state, "GET", &headers, query.as_deref().unwrap_or_default()).await
}

async fn handle_post(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    dispatch(&state, "POST", &headers, &body).await
}

async fn dispatch(state: &AppState, method: &str, headers: &HeaderMap, raw: &str) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let result = match parse_params(raw) {
        Ok(params) => match authenticate(state, method, host, params) {
            Ok(params) => execute(state, Params(params)).await,
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };
    result.unwrap_or_else(|e| {
        tracing::debug!(code = e.code, "request rejected");
        e.into_response()
    })
}

fn authenticate(
    state: &AppState,
    method: &str,
    host: &str,
    mut params: Vec<(String, String)>,
) -> Result<Vec<(String, String)>, ServiceError> {
    let position = params
        .iter()
        .position(|(k, _)| k == "Signature")
        .ok_or_else(|| ServiceError::missing("Signature"))?;
    let (_, signature) = params.remove(position);
    let access_key =
        lookup(&params, "AWSAccessKeyId").ok_or_else(|| ServiceError::missing("AWSAccessKeyId"))?;
    if lookup(&params, "Timestamp").is_none() {
        return Err(ServiceError::missing("Timestamp"));
    }
    if access_key != &*state.access_key {
        return Err(ServiceError::new(
            StatusCode::FORBIDDEN,
            "InvalidClientTokenId",
            "The AWS Access Key Id you provided does not exist in our records.",
        ));
    }
    if signature != expected_signature(&state.secret_key, method, host, "/", &params) {
        return Err(ServiceError::new(
            StatusCode::FORBIDDEN,
            "SignatureDoesNotMatch",
            "The request signature we calculated does not match the signature you provided.",
        ));
    }
    Ok(params)
}

fn lookup<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

struct Params(Vec<(String, String)>);

impl Params {
    fn get(&self, name: &str) -> Option<&str> {
        lookup(&self.0, name)
    }

    fn require(&self, name: &str) -> Result<&str, ServiceError> {
        self.get(name).ok_or_else(|| ServiceError::missing(name))
    }

    fn limit(&self, name: &str, default: usize) -> Result<usize, ServiceError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    ServiceError::bad_request(
                        "InvalidParameterValue",
                        format!("Value ({v}) for parameter {name} is invalid."),
                    )
                }),
        }
    }

    /// `Attribute.N.*` entries ordered by N.
    fn attributes(&self) -> Vec<SubmittedAttribute> {
        let mut by_index: BTreeMap<usize, SubmittedAttribute> = BTreeMap::new();
        for (key, value) in &self.0 {
            let Some(rest) = key.strip_prefix("Attribute.") else {
                continue;
            };
            let Some((index, field)) = rest.split_once('.') else {
                continue;
            };
            let Ok(index) = index.parse::<usize>() else {
                continue;
            };
            let entry = by_index.entry(index).or_default();
            match field {
                "Name" => entry.name = value.clone(),
                "Value" => entry.value = Some(value.clone()),
                "Replace" => entry.replace = value == "true",
                _ => {}
            }
        }
        by_index.into_values().collect()
    }

    /// `AttributeName.N` values.
    fn attribute_names(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k.starts_with("AttributeName."))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[derive(Debug, Default)]
struct SubmittedAttribute {
    name: String,
    value: Option<String>,
    replace: bool,
}

fn valid_domain_name(name: &str) -> bool {
    (3..=255).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn encode_token(offset: usize) -> String {
    STANDARD.encode(offset.to_string())
}

fn decode_token(token: Option<&str>) -> Result<usize, ServiceError> {
    let Some(token) = token else {
        return Ok(0);
    };
    STANDARD
        .decode(token)
        .ok()
        .and_then(|b| String::from_utf8(b).ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            ServiceError::bad_request("InvalidNextToken", "The specified next token is not valid.")
        })
}

/// Slices `items` at the token's offset and renders the next token, if any.
fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> (Vec<T>, Option<String>) {
    let total = items.len();
    let page: Vec<T> = items.into_iter().skip(offset).take(limit).collect();
    let end = offset.saturating_add(limit);
    let next = (end < total).then(|| encode_token(end));
    (page, next)
}

fn next_token_xml(token: Option<String>) -> String {
    token
        .map(|t| format!("<NextToken>{t}</NextToken>"))
        .unwrap_or_default()
}

fn attribute_xml(name: &str, value: &str) -> String {
    format!(
        "<Attribute><Name>{}</Name><Value>{}</Value></Attribute>",
        escape(name),
        escape(value)
    )
}

/// `['name' = 'value']` or `attr = 'value'`; `None` means "match all".
fn parse_predicate(expr: &str) -> Result<Option<(String, String)>, ServiceError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    let invalid = || {
        ServiceError::bad_request(
            "InvalidQueryExpression",
            format!("The specified query expression syntax is not valid: {expr}"),
        )
    };
    let (name, value) = inner.split_once('=').ok_or_else(invalid)?;
    let unquote = |s: &str| {
        let s = s.trim();
        s.strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| s.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
            .unwrap_or(s)
            .to_string()
    };
    let name = unquote(name);
    if name.is_empty() {
        return Err(invalid());
    }
    Ok(Some((name, unquote(value))))
}

fn satisfies(pairs: &[(String, String)], predicate: &Option<(String, String)>) -> bool {
    match predicate {
        None => true,
        Some((name, value)) => pairs.iter().any(|(n, v)| n == name && v == value),
    }
}

async fn execute(state: &AppState, params: Params) -> Result<Response, ServiceError> {
    let action = params.require("Action")?.to_string();
    tracing::debug!(action = %action, "handling request");
    match action.as_str() {
        "CreateDomain" => {
            let domain = params.require("DomainName")?;
            if !valid_domain_name(domain) {
                return Err(ServiceError::bad_request(
                    "InvalidParameterValue",
                    format!("Value ({domain}) for parameter DomainName is invalid."),
                ));
            }
            state.db.write().await.entry(domain.to_string()).or_default();
            Ok(success(&action, None))
        }
        "DeleteDomain" => {
            let domain = params.require("DomainName")?;
            state.db.write().await.remove(domain);
            Ok(success(&action, None))
        }
        "ListDomains" => {
            let limit = params.limit("MaxNumberOfDomains", DEFAULT_MAX_DOMAINS)?;
            let offset = decode_token(params.get("NextToken"))?;
            let names: Vec<String> = state.db.read().await.keys().cloned().collect();
            let (page, next) = paginate(names, offset, limit);
            let mut xml: String = page
                .iter()
                .map(|n| format!("<DomainName>{}</DomainName>", escape(n.as_str())))
                .collect();
            xml.push_str(&next_token_xml(next));
            Ok(success(&action, Some(xml)))
        }
        "PutAttributes" => {
            let domain = params.require("DomainName")?;
            let item = params.require("ItemName")?;
            let submitted = params.attributes();
            if submitted.is_empty() {
                return Err(ServiceError::missing("Attribute.0.Name"));
            }
            if submitted.iter().any(|a| a.value.is_none()) {
                return Err(ServiceError::missing("Attribute.Value"));
            }
            let mut db = state.db.write().await;
            let pairs = db
                .get_mut(domain)
                .ok_or_else(ServiceError::no_such_domain)?
                .entry(item.to_string())
                .or_default();
            for attr in submitted.iter().filter(|a| a.replace) {
                pairs.retain(|(n, _)| *n != attr.name);
            }
            for attr in submitted {
                let value = attr.value.unwrap_or_default();
                if !pairs.iter().any(|(n, v)| *n == attr.name && *v == value) {
                    pairs.push((attr.name, value));
                }
            }
            Ok(success(&action, None))
        }
        "GetAttributes" => {
            let domain = params.require("DomainName")?;
            let item = params.require("ItemName")?;
            let wanted = params.attribute_names();
            let db = state.db.read().await;
            let items = db.get(domain).ok_or_else(ServiceError::no_such_domain)?;
            let xml: String = items
                .get(item)
                .into_iter()
                .flatten()
                .filter(|(n, _)| wanted.is_empty() || wanted.contains(&n.as_str()))
                .map(|(n, v)| attribute_xml(n, v))
                .collect();
            Ok(success(&action, Some(xml)))
        }
        "DeleteAttributes" => {
            let domain = params.require("DomainName")?;
            let item = params.require("ItemName")?;
            let targets = params.attributes();
            let mut db = state.db.write().await;
            let items = db.get_mut(domain).ok_or_else(ServiceError::no_such_domain)?;
            if targets.is_empty() {
                items.remove(item);
            } else if let Some(pairs) = items.get_mut(item) {
                pairs.retain(|(n, v)| {
                    !targets.iter().any(|t| {
                        t.name == *n && t.value.as_ref().map_or(true, |tv| tv == v)
                    })
                });
                if pairs.is_empty() {
                    items.remove(item);
                }
            }
            Ok(success(&action, None))
        }
        "Query" => {
            let domain = params.require("DomainName")?;
            let predicate = parse_predicate(params.get("QueryExpression").unwrap_or_default())?;
            let limit = params.limit("MaxNumberOfItems", DEFAULT_MAX_ITEMS)?;
            let offset = decode_token(params.get("NextToken"))?;
            let db = state.db.read().await;
            let items = db.get(domain).ok_or_else(ServiceError::no_such_domain)?;
            let names: Vec<&String> = items
                .iter()
                .filter(|(_, pairs)| satisfies(pairs, &predicate))
                .map(|(name, _)| name)
                .collect();
            let (page, next) = paginate(names, offset, limit);
            let mut xml: String = page
                .iter()
                .map(|n| format!("<ItemName>{}</ItemName>", escape(n.as_str())))
                .collect();
            xml.push_str(&next_token_xml(next));
            Ok(success(&action, Some(xml)))
        }
        "Select" => {
            let expression = params.require("SelectExpression")?;
            let (domain, predicate) = parse_select(expression)?;
            let offset = decode_token(params.get("NextToken"))?;
            let db = state.db.read().await;
            let items = db.get(&domain).ok_or_else(ServiceError::no_such_domain)?;
            let rows: Vec<(&String, &Vec<(String, String)>)> = items
                .iter()
                .filter(|(_, pairs)| satisfies(pairs, &predicate))
                .collect();
            let (page, next) = paginate(rows, offset, SELECT_PAGE_SIZE);
            let mut xml = String::new();
            for (name, pairs) in page {
                xml.push_str(&format!("<Item><Name>{}</Name>", escape(name.as_str())));
                for (n, v) in pairs {
                    xml.push_str(&attribute_xml(n, v));
                }
                xml.push_str("</Item>");
            }
            xml.push_str(&next_token_xml(next));
            Ok(success(&action, Some(xml)))
        }
        other => Err(ServiceError::bad_request(
            "InvalidAction",
            format!("The action {other} is not valid for this web service."),
        )),
    }
}

/// `select * from <domain> [where <predicate>]`
fn parse_select(expression: &str) -> Result<(String, Option<(String, String)>), ServiceError> {
    let invalid = || {
        ServiceError::bad_request(
            "InvalidQueryExpression",
            format!("The specified query expression syntax is not valid: {expression}"),
        )
    };
    let lower = expression.to_ascii_lowercase();
    let from = lower.find(" from ").ok_or_else(invalid)?;
    let rest = expression[from + " from ".len()..].trim();
    let (domain, predicate) = match rest.to_ascii_lowercase().find(" where ") {
        Some(at) => (&rest[..at], Some(&rest[at + " where ".len()..])),
        None => (rest, None),
    };
    let domain = domain.trim().trim_matches('`').to_string();
    let predicate = match predicate {
        Some(p) => parse_predicate(p)?,
        None => None,
    };
    Ok((domain, predicate))
}
