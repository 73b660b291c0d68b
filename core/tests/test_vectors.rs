//! Verify request building and response classification against JSON test
//! vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs and the expected request or outcome.
//! Comparing parsed JSON (not raw strings) avoids false negatives from
//! field-ordering differences.

use hubspot_core::recovery::interpret_validation_error;
use hubspot_core::{
    ApiError, ChunkOutcome, ClientConfig, CrmClient, CrmObject, HttpMethod, HttpResponse,
    ListObjectsQuery, ObjectType, ValidationFailure,
};
use serde_json::Value;

const BASE_URL: &str = "http://localhost:3000";

fn client() -> CrmClient {
    CrmClient::new(&ClientConfig::new(BASE_URL))
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        other => panic!("unknown method: {other}"),
    }
}

fn parse_object_type(s: &str) -> ObjectType {
    match s {
        "contacts" => ObjectType::Contacts,
        "companies" => ObjectType::Companies,
        "deals" => ObjectType::Deals,
        "tickets" => ObjectType::Tickets,
        "courses" => ObjectType::Courses,
        other => ObjectType::Custom(other.to_string()),
    }
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_query(value: &Value) -> ListObjectsQuery {
    ListObjectsQuery {
        limit: value["limit"].as_u64().map(|l| l as u32),
        after: None,
        properties: strings(&value["properties"]),
        properties_with_history: strings(&value["propertiesWithHistory"]),
        associations: strings(&value["associations"]),
        archived: value["archived"].as_bool(),
    }
}

fn response(value: &Value) -> HttpResponse {
    let body = match &value["body"] {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    HttpResponse {
        status: value["status"].as_u64().unwrap() as u16,
        headers: Vec::new(),
        body,
    }
}

// ---------------------------------------------------------------------------
// List requests
// ---------------------------------------------------------------------------

#[test]
fn list_request_vectors() {
    let raw = include_str!("../../test-vectors/list_requests.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let object_type = parse_object_type(case["object_type"].as_str().unwrap());
        let query = parse_query(&case["query"]);
        let expected = &case["expected_request"];

        let req = c.build_list_objects(&object_type, &query, case["after"].as_str());
        assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.path, format!("{BASE_URL}{}", expected["path"].as_str().unwrap()), "{name}: path");
        assert_eq!(req.headers.len(), expected["headers"].as_array().unwrap().len(), "{name}: headers");
        assert!(req.body.is_none(), "{name}: body");
    }
}

// ---------------------------------------------------------------------------
// Validation messages
// ---------------------------------------------------------------------------

#[test]
fn validation_error_vectors() {
    let raw = include_str!("../../test-vectors/validation_errors.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let expected = &case["expected"];
        let failure = interpret_validation_error(case["message"].as_str().unwrap());

        match (expected["kind"].as_str().unwrap(), failure) {
            ("invalid_emails", ValidationFailure::InvalidEmails { emails, errors }) => {
                assert_eq!(emails, strings(&expected["emails"]), "{name}: emails");
                let expected_errors = expected["errors"].as_u64().unwrap_or(emails.len() as u64);
                assert_eq!(errors.len() as u64, expected_errors, "{name}: errors");
            }
            ("other", ValidationFailure::OtherValidation(errors)) => {
                let codes: Vec<String> = errors.into_iter().map(|e| e.error).collect();
                assert_eq!(codes, strings(&expected["codes"]), "{name}: codes");
            }
            ("malformed", ValidationFailure::Malformed(_)) => {}
            ("unrecognized", ValidationFailure::Unrecognized) => {}
            (kind, other) => panic!("{name}: expected {kind}, got {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch responses
// ---------------------------------------------------------------------------

#[test]
fn batch_response_vectors() {
    let raw = include_str!("../../test-vectors/batch_responses.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let expected = &case["expected"];
        let outcome = c.classify_batch_write::<CrmObject>(response(&case["response"]));

        match (expected["outcome"].as_str().unwrap(), outcome) {
            ("accepted", ChunkOutcome::Accepted(results)) => {
                assert_eq!(results.len() as u64, expected["results"].as_u64().unwrap(), "{name}: results");
            }
            ("accepted_with_errors", ChunkOutcome::AcceptedWithErrors { results, errors }) => {
                assert_eq!(results.len() as u64, expected["results"].as_u64().unwrap(), "{name}: results");
                assert_eq!(errors.len() as u64, expected["errors"].as_u64().unwrap(), "{name}: errors");
            }
            ("invalid_emails", ChunkOutcome::InvalidEmails { emails, .. }) => {
                assert_eq!(emails, strings(&expected["emails"]), "{name}: emails");
            }
            ("fatal", ChunkOutcome::Fatal(err)) => match (expected["error"].as_str().unwrap(), err) {
                ("invalid_properties", ApiError::InvalidProperties { .. }) => {}
                ("malformed", ApiError::MalformedValidationError(_)) => {}
                ("http", ApiError::Http { status, message, .. }) => {
                    assert_eq!(u64::from(status), expected["status"].as_u64().unwrap(), "{name}: status");
                    assert_eq!(message, expected["message"].as_str().unwrap(), "{name}: message");
                }
                (kind, other) => panic!("{name}: expected {kind} error, got {other:?}"),
            },
            (kind, other) => panic!("{name}: expected {kind}, got {other:?}"),
        }
    }
}
