//! Client configuration.
//!
//! Loading configuration from files or the environment is left to the
//! application; `ClientConfig` only derives serde so it can be embedded in
//! whatever config format the caller uses.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SdbError};
use crate::http::HttpMethod;

pub const DEFAULT_ENDPOINT: &str = "https://sdb.amazonaws.com/";
pub const DEFAULT_VERSION: &str = "2007-11-07";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: Url,
    pub version: String,
    pub http_method: HttpMethod,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL"),
            version: DEFAULT_VERSION.to_string(),
            http_method: HttpMethod::Get,
        }
    }
}

impl ClientConfig {
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| SdbError::invalid_parameter(format!("endpoint {endpoint:?}: {e}")))?;
        if url.host_str().is_none() {
            return Err(SdbError::invalid_parameter(format!(
                "endpoint {endpoint:?} has no host"
            )));
        }
        self.endpoint = url;
        Ok(self)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_http_method(mut self, method: HttpMethod) -> Self {
        self.http_method = method;
        self
    }

    /// Host as it appears in the string to sign: lower-case, with the port
    /// only when it differs from the scheme default.
    pub fn signing_host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default().to_ascii_lowercase();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        }
    }

    pub fn signing_path(&self) -> &str {
        match self.endpoint.path() {
            "" => "/",
            path => path,
        }
    }
}
