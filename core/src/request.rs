//! Request construction.
//!
//! # Design
//! Building happens in two steps. The per-operation methods validate their
//! arguments and return the action-specific `Params`; `sign` then adds the
//! protocol version and authentication parameters and renders a transport
//! ready `HttpRequest`. Splitting the steps keeps the action parameters
//! inspectable in tests without a signature in the way.

use chrono::{DateTime, Utc};

use crate::attributes::{Attributes, WirePair};
use crate::config::ClientConfig;
use crate::error::{Result, SdbError};
use crate::http::{HttpMethod, HttpRequest};
use crate::signer::{canonical_query, Credentials, Signer};
use crate::types::{NextToken, PageRequest};
use crate::validate::{
    validate_attribute_values, validate_domain_name, validate_expression, validate_item_name,
    validate_page_size,
};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateDomain,
    DeleteDomain,
    ListDomains,
    PutAttributes,
    GetAttributes,
    DeleteAttributes,
    Query,
    Select,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateDomain => "CreateDomain",
            Action::DeleteDomain => "DeleteDomain",
            Action::ListDomains => "ListDomains",
            Action::PutAttributes => "PutAttributes",
            Action::GetAttributes => "GetAttributes",
            Action::DeleteAttributes => "DeleteAttributes",
            Action::Query => "Query",
            Action::Select => "Select",
        }
    }
}

/// Action-specific parameters in insertion order, before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    action: Action,
    pairs: Vec<(String, String)>,
}

impl Params {
    fn new(action: Action) -> Self {
        Self {
            action,
            pairs: vec![("Action".to_string(), action.as_str().to_string())],
        }
    }

    fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((name.into(), value.into()));
        self
    }

    fn with_opt(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.with(name, v),
            None => self,
        }
    }

    /// `Replace` is only a `PutAttributes` parameter; deletes pass `false`.
    fn with_pairs(mut self, pairs: &[WirePair], emit_replace: bool) -> Self {
        for pair in pairs {
            let prefix = format!("Attribute.{}", pair.index);
            self.pairs.push((format!("{prefix}.Name"), pair.name.clone()));
            self.pairs.push((format!("{prefix}.Value"), pair.value.clone()));
            if emit_replace && pair.replace {
                self.pairs.push((format!("{prefix}.Replace"), "true".to_string()));
            }
        }
        self
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Validates arguments and produces signed requests. Holds only immutable
/// configuration and credentials.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    config: ClientConfig,
    signer: Signer,
}

impl RequestBuilder {
    pub fn new(config: ClientConfig, credentials: Credentials) -> Self {
        Self {
            config,
            signer: Signer::new(credentials),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn create_domain(&self, domain: &str) -> Result<Params> {
        validate_domain_name(domain)?;
        Ok(Params::new(Action::CreateDomain).with("DomainName", domain))
    }

    pub fn delete_domain(&self, domain: &str) -> Result<Params> {
        validate_domain_name(domain)?;
        Ok(Params::new(Action::DeleteDomain).with("DomainName", domain))
    }

    pub fn list_domains(&self, page: &PageRequest) -> Result<Params> {
        validate_page_size(page.limit)?;
        Ok(Params::new(Action::ListDomains)
            .with_opt("MaxNumberOfDomains", page.limit.map(|n| n.to_string()))
            .with_opt("NextToken", page.next_token.as_ref().map(NextToken::as_str)))
    }

    pub fn put_attributes(
        &self,
        domain: &str,
        item: &str,
        attributes: &Attributes,
        replace: bool,
    ) -> Result<Params> {
        validate_domain_name(domain)?;
        validate_item_name(item)?;
        if attributes.is_empty() {
            return Err(SdbError::invalid_parameter(
                "put_attributes needs at least one attribute",
            ));
        }
        validate_attribute_values(attributes)?;
        Ok(Params::new(Action::PutAttributes)
            .with("DomainName", domain)
            .with("ItemName", item)
            .with_pairs(&attributes.encode(replace), true))
    }

    pub fn get_attributes(&self, domain: &str, item: &str, names: &[&str]) -> Result<Params> {
        validate_domain_name(domain)?;
        validate_item_name(item)?;
        let mut params = Params::new(Action::GetAttributes)
            .with("DomainName", domain)
            .with("ItemName", item);
        for (i, name) in names.iter().enumerate() {
            params = params.with(format!("AttributeName.{i}"), *name);
        }
        Ok(params)
    }

    /// Deletes the named attributes, or the whole item when `names` is `None`.
    /// An empty list is rejected rather than widened to the whole item.
    pub fn delete_attributes(
        &self,
        domain: &str,
        item: &str,
        names: Option<&[&str]>,
    ) -> Result<Params> {
        validate_domain_name(domain)?;
        validate_item_name(item)?;
        if names.is_some_and(|n| n.is_empty()) {
            return Err(SdbError::invalid_parameter(
                "delete_attributes needs at least one name; pass None to delete the item",
            ));
        }
        let mut params = Params::new(Action::DeleteAttributes)
            .with("DomainName", domain)
            .with("ItemName", item);
        for (i, name) in names.unwrap_or_default().iter().enumerate() {
            params = params.with(format!("Attribute.{i}.Name"), *name);
        }
        Ok(params)
    }

    /// Deletes only the listed name/value pairs.
    pub fn delete_attribute_values(
        &self,
        domain: &str,
        item: &str,
        attributes: &Attributes,
    ) -> Result<Params> {
        validate_domain_name(domain)?;
        validate_item_name(item)?;
        if attributes.is_empty() {
            return Err(SdbError::invalid_parameter(
                "delete_attribute_values needs at least one pair",
            ));
        }
        validate_attribute_values(attributes)?;
        Ok(Params::new(Action::DeleteAttributes)
            .with("DomainName", domain)
            .with("ItemName", item)
            .with_pairs(&attributes.encode(false), false))
    }

    pub fn query(&self, domain: &str, expression: &str, page: &PageRequest) -> Result<Params> {
        validate_domain_name(domain)?;
        validate_page_size(page.limit)?;
        let params = Params::new(Action::Query).with("DomainName", domain);
        // An empty expression matches every item.
        let params = if expression.is_empty() {
            params
        } else {
            params.with("QueryExpression", expression)
        };
        Ok(params
            .with_opt("MaxNumberOfItems", page.limit.map(|n| n.to_string()))
            .with_opt("NextToken", page.next_token.as_ref().map(NextToken::as_str)))
    }

    pub fn select(&self, expression: &str, next_token: Option<&NextToken>) -> Result<Params> {
        validate_expression(expression)?;
        Ok(Params::new(Action::Select)
            .with("SelectExpression", expression)
            .with_opt("NextToken", next_token.map(NextToken::as_str)))
    }

    /// Adds version and authentication parameters and renders the request.
    pub fn sign(&self, params: Params, timestamp: DateTime<Utc>) -> Result<HttpRequest> {
        let method = self.config.http_method;
        let mut pairs = params.pairs;
        pairs.push(("Version".to_string(), self.config.version.clone()));
        self.signer.authorize(
            method,
            &self.config.signing_host(),
            self.config.signing_path(),
            &mut pairs,
            timestamp,
        )?;
        let query = canonical_query(&pairs);
        let endpoint = self.config.endpoint.as_str();
        Ok(match method {
            HttpMethod::Get => HttpRequest {
                method,
                url: format!("{endpoint}?{query}"),
                headers: Vec::new(),
                body: None,
            },
            HttpMethod::Post => HttpRequest {
                method,
                url: endpoint.to_string(),
                headers: vec![("content-type".to_string(), FORM_CONTENT_TYPE.to_string())],
                body: Some(query),
            },
        })
    }
}
