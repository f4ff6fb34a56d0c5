//! Verify request signing and response parsing against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Signing vectors pin the exact parameters each operation emits and the
//! signature a conforming service computes for them. Response vectors feed
//! recorded documents through `parse_response` and compare the typed result
//! as JSON, so field ordering never causes false negatives.

use chrono::{DateTime, Utc};
use sdb_core::response::parse_response;
use sdb_core::{
    Action, AttributeSet, Attributes, ClientConfig, Credentials, HttpMethod, HttpResponse, Page,
    PageRequest, Payload, RequestBuilder, Row,
};
use url::Url;

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        other => panic!("unknown method: {other}"),
    }
}

fn parse_action(s: &str) -> Action {
    match s {
        "CreateDomain" => Action::CreateDomain,
        "DeleteDomain" => Action::DeleteDomain,
        "ListDomains" => Action::ListDomains,
        "PutAttributes" => Action::PutAttributes,
        "GetAttributes" => Action::GetAttributes,
        "DeleteAttributes" => Action::DeleteAttributes,
        "Query" => Action::Query,
        "Select" => Action::Select,
        other => panic!("unknown action: {other}"),
    }
}

fn string_pairs(value: &serde_json::Value) -> Vec<(String, String)> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|pair| {
            let arr = pair.as_array().unwrap();
            (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

#[test]
fn signing_test_vectors() {
    let raw = include_str!("../../test-vectors/signing.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();
    let credentials = Credentials::new(
        vectors["credentials"]["access_key"].as_str().unwrap(),
        vectors["credentials"]["secret_key"].as_str().unwrap(),
    );
    let timestamp: DateTime<Utc> = vectors["timestamp"].as_str().unwrap().parse().unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let method = parse_method(case["method"].as_str().unwrap());
        let config = ClientConfig::default()
            .with_endpoint(case["endpoint"].as_str().unwrap())
            .unwrap()
            .with_http_method(method);
        let builder = RequestBuilder::new(config, credentials.clone());
        let args = &case["args"];
        let arg = |key: &str| args[key].as_str().unwrap();

        let params = match case["operation"].as_str().unwrap() {
            "query" => builder.query(arg("domain"), arg("expression"), &PageRequest::first()),
            "select" => builder.select(arg("expression"), None),
            "list_domains" => builder.list_domains(&PageRequest::first()),
            "create_domain" => builder.create_domain(arg("domain")),
            "get_attributes" => builder.get_attributes(arg("domain"), arg("item"), &[arg("name")]),
            "put_attributes" => {
                let attrs = Attributes::new().add(arg("name"), arg("value"));
                builder.put_attributes(
                    arg("domain"),
                    arg("item"),
                    &attrs,
                    args["replace"].as_bool().unwrap(),
                )
            }
            other => panic!("unknown operation: {other}"),
        }
        .unwrap();
        assert_eq!(params.pairs(), string_pairs(&case["expected_params"]), "{name}: params");

        let request = builder.sign(params, timestamp).unwrap();
        assert_eq!(request.method, method, "{name}: method");
        let query = match method {
            HttpMethod::Get => {
                assert!(request.body.is_none(), "{name}: GET has no body");
                Url::parse(&request.url).unwrap().query().unwrap().to_string()
            }
            HttpMethod::Post => {
                assert_eq!(request.url, case["endpoint"].as_str().unwrap(), "{name}: url");
                request.body.clone().unwrap()
            }
        };
        let sent: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        let signature = sent
            .iter()
            .find(|(k, _)| k == "Signature")
            .map(|(_, v)| v.as_str());
        assert_eq!(
            signature,
            case["expected_signature"].as_str(),
            "{name}: signature"
        );
        let keys: Vec<&str> = sent.iter().map(|(k, _)| k.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted, "{name}: parameters are emitted in canonical order");
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[test]
fn response_test_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let action = parse_action(case["action"].as_str().unwrap());
        let response = HttpResponse::new(
            case["status"].as_u64().unwrap() as u16,
            case["body"].as_str().unwrap(),
        );
        let expected = &case["expected"];
        let result = parse_response(action, &response);

        if let Some(error) = expected.get("error") {
            let err = result.expect_err(name);
            let fault = err.fault().unwrap_or_else(|| panic!("{name}: no fault in {err:?}"));
            assert_eq!(
                format!("{:?}", fault.kind()),
                error["kind"].as_str().unwrap(),
                "{name}: kind"
            );
            assert_eq!(fault.code, error["code"].as_str().unwrap(), "{name}: code");
            assert_eq!(
                fault.request_id.as_deref(),
                error["request_id"].as_str(),
                "{name}: request id"
            );
            continue;
        }

        let (payload, metadata) = result.unwrap_or_else(|e| panic!("{name}: {e}"));
        if let Some(id) = case.get("expected_request_id") {
            assert_eq!(metadata.request_id.as_deref(), id.as_str(), "{name}: request id");
        }
        match payload {
            Payload::Empty => assert!(expected.get("empty").is_some(), "{name}: payload"),
            Payload::DomainNames(page) => {
                let want: Page<String> =
                    serde_json::from_value(expected["domain_names"].clone()).unwrap();
                assert_eq!(page, want, "{name}: domain names");
            }
            Payload::ItemNames(page) => {
                let want: Page<String> =
                    serde_json::from_value(expected["item_names"].clone()).unwrap();
                assert_eq!(page, want, "{name}: item names");
            }
            Payload::Attributes(set) => {
                let want: AttributeSet =
                    serde_json::from_value(expected["attributes"].clone()).unwrap();
                assert_eq!(set, want, "{name}: attributes");
            }
            Payload::Rows(page) => {
                let want: Page<Row> = serde_json::from_value(expected["rows"].clone()).unwrap();
                assert_eq!(page, want, "{name}: rows");
            }
        }
    }
}
