//! Request signing (signature version 2, HMAC-SHA256).
//!
//! # Design
//! Signing is a pure function of its inputs: credentials, HTTP method,
//! host, path, the parameter set and an explicit timestamp. The wall clock
//! is only read through the `Clock` trait by the client, so the signer
//! itself is fully deterministic and can be pinned by golden values.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;

use crate::error::{Result, SdbError};
use crate::http::HttpMethod;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_VERSION: &str = "2";
pub const SIGNATURE_METHOD: &str = "HmacSHA256";

/// RFC 3986 unreserved characters stay literal; everything else is `%XX`.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Access key / secret key pair. The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Source of request timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// `2010-01-25T15:01:28.000Z`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, UNRESERVED).to_string()
}

/// Sorts parameters by name and joins them as `name=value` pairs, both
/// sides percent-encoded.
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(
    method: HttpMethod,
    host: &str,
    path: &str,
    params: &[(String, String)],
) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        method.as_str(),
        host.to_ascii_lowercase(),
        path,
        canonical_query(params)
    )
}

#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Base64 HMAC-SHA256 of the string to sign. `params` must already hold
    /// every parameter except `Signature`.
    pub fn signature(
        &self,
        method: HttpMethod,
        host: &str,
        path: &str,
        params: &[(String, String)],
    ) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret_key.as_bytes())
            .map_err(|e| SdbError::invalid_parameter(format!("unusable secret key: {e}")))?;
        mac.update(string_to_sign(method, host, path, params).as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Adds the authentication parameters and the resulting `Signature` to
    /// `params`.
    pub fn authorize(
        &self,
        method: HttpMethod,
        host: &str,
        path: &str,
        params: &mut Vec<(String, String)>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        params.push(("AWSAccessKeyId".into(), self.credentials.access_key().to_string()));
        params.push(("SignatureMethod".into(), SIGNATURE_METHOD.into()));
        params.push(("SignatureVersion".into(), SIGNATURE_VERSION.into()));
        params.push(("Timestamp".into(), format_timestamp(timestamp)));
        let signature = self.signature(method, host, path, params)?;
        params.push(("Signature".into(), signature));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn signer() -> Signer {
        Signer::new(Credentials::new(
            "0PN5J17HBGZHT7JJ3X82",
            "uV3F3YluFJax1cknvbcGwgjvx4QpvB+leU8dUj2o",
        ))
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 1, 25, 15, 1, 28).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn timestamp_has_millisecond_precision_and_zulu_suffix() {
        assert_eq!(format_timestamp(timestamp()), "2010-01-25T15:01:28.000Z");
    }

    #[test]
    fn percent_encoding_keeps_only_unreserved() {
        assert_eq!(percent_encode("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(percent_encode("[ 'x' = '42' ]"), "%5B%20%27x%27%20%3D%20%2742%27%20%5D");
        assert_eq!(percent_encode("*+/"), "%2A%2B%2F");
        assert_eq!(percent_encode("\u{e9}"), "%C3%A9");
    }

    #[test]
    fn canonical_query_sorts_by_byte_order() {
        let p = params(&[("Version", "1"), ("Action", "Query"), ("AWSAccessKeyId", "k")]);
        assert_eq!(canonical_query(&p), "AWSAccessKeyId=k&Action=Query&Version=1");
    }

    #[test]
    fn query_signature_matches_golden_value() {
        let mut p = params(&[
            ("Action", "Query"),
            ("QueryExpression", "[ 'answer' = '42' ]"),
            ("DomainName", "foo"),
            ("Version", "2007-11-07"),
        ]);
        signer()
            .authorize(HttpMethod::Get, "sdb.amazonaws.com", "/", &mut p, timestamp())
            .unwrap();
        let (name, signature) = p.last().unwrap();
        assert_eq!(name, "Signature");
        assert_eq!(signature, "KskwrbXA9tZbJ8ZfTmPFTh5be2wfc0wGU8H3SsRqgvI=");
    }

    #[test]
    fn signature_is_deterministic_and_order_independent() {
        let a = params(&[("Action", "ListDomains"), ("Version", "2007-11-07")]);
        let b = params(&[("Version", "2007-11-07"), ("Action", "ListDomains")]);
        let s = signer();
        assert_eq!(
            s.signature(HttpMethod::Get, "sdb.amazonaws.com", "/", &a).unwrap(),
            s.signature(HttpMethod::Get, "sdb.amazonaws.com", "/", &b).unwrap()
        );
    }

    #[test]
    fn method_is_part_of_signature() {
        let p = params(&[("Action", "ListDomains")]);
        let s = signer();
        assert_ne!(
            s.signature(HttpMethod::Get, "sdb.amazonaws.com", "/", &p).unwrap(),
            s.signature(HttpMethod::Post, "sdb.amazonaws.com", "/", &p).unwrap()
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let out = format!("{:?}", signer());
        assert!(out.contains("0PN5J17HBGZHT7JJ3X82"));
        assert!(!out.contains("uV3F3Ylu"));
    }
}
