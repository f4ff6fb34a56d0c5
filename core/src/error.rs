//! Error types for the attribute store client.
//!
//! # Design
//! Service faults are mapped into a closed set of variants keyed on the
//! service's error code, never on message text. Each variant still carries
//! the service `Fault` so the code, message and request id reach the caller
//! unmodified. Transport failures stay separate because they carry no
//! structured fault at all.

use std::fmt;

use thiserror::Error;

use crate::http::TransportError;

/// A structured error reported by the service, or detected locally before
/// a request was sent (in which case `request_id` is `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
    pub box_usage: Option<String>,
}

impl Fault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
            box_usage: None,
        }
    }

    pub fn kind(&self) -> FaultKind {
        FaultKind::from_code(&self.code)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(id) = &self.request_id {
            write!(f, " (request id {id})")?;
        }
        Ok(())
    }
}

/// Enumerated fault taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    InvalidParameterValue,
    Authentication,
    NoSuchDomain,
    NumberDomainsExceeded,
    /// Attribute, item or storage limits other than the domain count.
    QuotaExceeded,
    ServiceUnavailable,
    Internal,
    /// A code this client does not recognise.
    Other,
}

impl FaultKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "InvalidParameterValue"
            | "InvalidParameterCombination"
            | "MissingParameter"
            | "InvalidNextToken"
            | "InvalidQueryExpression"
            | "InvalidSortExpression"
            | "InvalidNumberPredicates"
            | "InvalidNumberValueTests" => FaultKind::InvalidParameterValue,
            "AuthFailure"
            | "SignatureDoesNotMatch"
            | "InvalidClientTokenId"
            | "RequestExpired"
            | "AccessFailure"
            | "OptInRequired"
            | "MissingAuthenticationToken" => FaultKind::Authentication,
            "NoSuchDomain" => FaultKind::NoSuchDomain,
            "NumberDomainsExceeded" => FaultKind::NumberDomainsExceeded,
            "NumberDomainAttributesExceeded"
            | "NumberDomainBytesExceeded"
            | "NumberItemAttributesExceeded"
            | "NumberSubmittedAttributesExceeded"
            | "NumberSubmittedItemsExceeded"
            | "TooManyRequestedAttributes" => FaultKind::QuotaExceeded,
            "ServiceUnavailable" | "ServiceOverload" | "RequestTimeout" => {
                FaultKind::ServiceUnavailable
            }
            "InternalError" => FaultKind::Internal,
            _ => FaultKind::Other,
        }
    }
}

/// Errors returned by `SdbClient` operations.
#[derive(Debug, Error)]
pub enum SdbError {
    #[error("invalid parameter value: {0}")]
    InvalidParameterValue(Fault),

    #[error("authentication failed: {0}")]
    Authentication(Fault),

    #[error("no such domain: {0}")]
    NoSuchDomain(Fault),

    #[error("domain limit exceeded: {0}")]
    NumberDomainsExceeded(Fault),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(Fault),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(Fault),

    #[error("internal service error: {0}")]
    Internal(Fault),

    #[error("service fault: {0}")]
    Service(Fault),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A non-2xx response whose body is not a service error document.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("service repeated continuation token {0:?}")]
    RepeatedNextToken(String),
}

impl SdbError {
    /// Local validation failure; no request was sent.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        SdbError::InvalidParameterValue(Fault::new("InvalidParameterValue", message))
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            SdbError::InvalidParameterValue(f)
            | SdbError::Authentication(f)
            | SdbError::NoSuchDomain(f)
            | SdbError::NumberDomainsExceeded(f)
            | SdbError::QuotaExceeded(f)
            | SdbError::ServiceUnavailable(f)
            | SdbError::Internal(f)
            | SdbError::Service(f) => Some(f),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<FaultKind> {
        self.fault().map(Fault::kind)
    }

    /// Whether an external retry policy may reasonably retry this error.
    /// The client itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            SdbError::ServiceUnavailable(_) | SdbError::Internal(_) => true,
            SdbError::Transport(e) => e.is_timeout(),
            SdbError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<Fault> for SdbError {
    fn from(fault: Fault) -> Self {
        match fault.kind() {
            FaultKind::InvalidParameterValue => SdbError::InvalidParameterValue(fault),
            FaultKind::Authentication => SdbError::Authentication(fault),
            FaultKind::NoSuchDomain => SdbError::NoSuchDomain(fault),
            FaultKind::NumberDomainsExceeded => SdbError::NumberDomainsExceeded(fault),
            FaultKind::QuotaExceeded => SdbError::QuotaExceeded(fault),
            FaultKind::ServiceUnavailable => SdbError::ServiceUnavailable(fault),
            FaultKind::Internal => SdbError::Internal(fault),
            FaultKind::Other => SdbError::Service(fault),
        }
    }
}

pub type Result<T> = std::result::Result<T, SdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_kinds() {
        assert_eq!(FaultKind::from_code("NoSuchDomain"), FaultKind::NoSuchDomain);
        assert_eq!(FaultKind::from_code("SignatureDoesNotMatch"), FaultKind::Authentication);
        assert_eq!(FaultKind::from_code("RequestExpired"), FaultKind::Authentication);
        assert_eq!(
            FaultKind::from_code("NumberItemAttributesExceeded"),
            FaultKind::QuotaExceeded
        );
        assert_eq!(FaultKind::from_code("InternalError"), FaultKind::Internal);
        assert_eq!(FaultKind::from_code("SomethingNew"), FaultKind::Other);
    }

    #[test]
    fn fault_converts_to_matching_variant() {
        let mut fault = Fault::new("NumberDomainsExceeded", "too many");
        fault.request_id = Some("abc".to_string());
        let err = SdbError::from(fault.clone());
        assert!(matches!(&err, SdbError::NumberDomainsExceeded(f) if *f == fault));
        assert_eq!(err.kind(), Some(FaultKind::NumberDomainsExceeded));
    }

    #[test]
    fn unknown_code_is_preserved() {
        let err = SdbError::from(Fault::new("Weird", "?"));
        match err {
            SdbError::Service(f) => assert_eq!(f.code, "Weird"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn retryable_classification() {
        assert!(SdbError::from(Fault::new("ServiceUnavailable", "")).is_retryable());
        assert!(SdbError::Transport(TransportError::timeout("slow")).is_retryable());
        assert!(!SdbError::invalid_parameter("bad").is_retryable());
        assert!(!SdbError::from(Fault::new("NoSuchDomain", "")).is_retryable());
    }

    #[test]
    fn display_includes_request_id() {
        let mut fault = Fault::new("AuthFailure", "bad key");
        fault.request_id = Some("r-1".to_string());
        assert_eq!(
            SdbError::from(fault).to_string(),
            "authentication failed: AuthFailure: bad key (request id r-1)"
        );
    }
}
