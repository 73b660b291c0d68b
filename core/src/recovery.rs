//! Interpretation of batch-write responses and invalid-email repair.
//!
//! # Design
//! The server rejects a whole batch with HTTP 400 when a single record's
//! `email` fails validation. The reason is only available as natural-language
//! text: a fixed prefix followed by a JSON array of [`PropertyError`], each
//! of which names the address inside a localized sentence. All of that string
//! matching lives in [`interpret_validation_error`] and
//! [`invalid_email_address`]; the engine only sees the typed
//! [`ValidationFailure`] and [`ChunkOutcome`].

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::batch::Batch;
use crate::error::{decode_envelope, ApiError};
use crate::http::HttpResponse;
use crate::types::{BatchInput, BatchItemError, BatchResponse, PropertyError, EMAIL_PROPERTY};

pub const VALIDATION_ERROR_PREFIX: &str = "Property values were not valid: ";
pub const INVALID_EMAIL_CODE: &str = "INVALID_EMAIL";

/// Known phrasings of the invalid-email message, as (prefix, suffix).
const INVALID_EMAIL_PHRASINGS: &[(&str, &str)] = &[
    ("Email address ", " is invalid"),
    ("E-mailadres ", " is ongeldig"),
];

/// What a 400 error message says about property validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Every entry (possibly none) carries the `INVALID_EMAIL` code.
    /// `emails` holds the addresses whose phrasing was recognized.
    InvalidEmails {
        emails: Vec<String>,
        errors: Vec<PropertyError>,
    },
    /// At least one entry is something the email repair cannot fix.
    OtherValidation(Vec<PropertyError>),
    /// The prefix matched but the embedded array did not parse.
    Malformed(String),
    /// Not a property-validation message.
    Unrecognized,
}

/// Classify a top-level error message.
pub fn interpret_validation_error(message: &str) -> ValidationFailure {
    let Some(embedded) = message.strip_prefix(VALIDATION_ERROR_PREFIX) else {
        return ValidationFailure::Unrecognized;
    };
    let errors: Vec<PropertyError> = match serde_json::from_str(embedded) {
        Ok(errors) => errors,
        Err(e) => return ValidationFailure::Malformed(e.to_string()),
    };

    if errors.iter().any(|error| error.error != INVALID_EMAIL_CODE) {
        return ValidationFailure::OtherValidation(errors);
    }
    // Unknown phrasings still count as email failures; only their address is lost.
    let emails = errors
        .iter()
        .filter_map(invalid_email_address)
        .map(str::to_owned)
        .collect();
    ValidationFailure::InvalidEmails { emails, errors }
}

/// The offending address of an `INVALID_EMAIL` entry, if its message uses a
/// known phrasing.
pub fn invalid_email_address(error: &PropertyError) -> Option<&str> {
    if error.error != INVALID_EMAIL_CODE {
        return None;
    }
    INVALID_EMAIL_PHRASINGS.iter().find_map(|(prefix, suffix)| {
        error
            .message
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
            .filter(|email| !email.is_empty())
    })
}

/// Blank `email` on every item inside `batch` whose address is listed, and
/// copy the address to `invalid_email_property` when one is configured.
/// Items outside the batch are never touched. Returns the number of items
/// changed.
pub fn quarantine_invalid_emails(
    items: &mut [BatchInput],
    batch: Batch,
    emails: &[String],
    invalid_email_property: Option<&str>,
) -> usize {
    let mut changed = 0;
    for (offset, item) in items[batch.range()].iter_mut().enumerate() {
        let Some(current) = item.properties.get_mut(EMAIL_PROPERTY) else {
            continue;
        };
        if current.is_empty() || !emails.iter().any(|e| e.as_str() == current.as_str()) {
            continue;
        }
        let address = std::mem::take(current);
        warn!(
            index = batch.start + offset,
            email = %address,
            "blanking invalid email before resubmitting batch"
        );
        if let Some(property) = invalid_email_property {
            item.properties.insert(property.to_string(), address);
        }
        changed += 1;
    }
    changed
}

/// Result of one chunk submission.
#[derive(Debug)]
pub enum ChunkOutcome<T> {
    /// Normal success.
    Accepted(Vec<T>),
    /// 207: some items failed; the successful ones are still returned.
    AcceptedWithErrors {
        results: Vec<T>,
        errors: Vec<BatchItemError>,
    },
    /// 400 caused only by invalid emails; repairable once.
    InvalidEmails {
        emails: Vec<String>,
        errors: Vec<PropertyError>,
        message: String,
    },
    Fatal(ApiError),
}

/// Classify a batch-write response by status and error envelope.
pub fn classify_batch_response<T: DeserializeOwned>(response: HttpResponse) -> ChunkOutcome<T> {
    match response.status {
        200 | 201 => match parse_batch_body::<T>(&response.body) {
            Ok(parsed) => ChunkOutcome::Accepted(parsed.results),
            Err(e) => ChunkOutcome::Fatal(e),
        },
        207 => match parse_batch_body::<T>(&response.body) {
            Ok(parsed) => ChunkOutcome::AcceptedWithErrors {
                results: parsed.results,
                errors: parsed.errors,
            },
            Err(e) => ChunkOutcome::Fatal(e),
        },
        400 => classify_bad_request(&response),
        _ => ChunkOutcome::Fatal(ApiError::from_response(&response)),
    }
}

fn classify_bad_request<T>(response: &HttpResponse) -> ChunkOutcome<T> {
    let Some(envelope) = decode_envelope(&response.body) else {
        return ChunkOutcome::Fatal(ApiError::from_response(response));
    };
    match interpret_validation_error(&envelope.message) {
        ValidationFailure::InvalidEmails { emails, errors } => ChunkOutcome::InvalidEmails {
            emails,
            errors,
            message: envelope.message,
        },
        ValidationFailure::OtherValidation(errors) => {
            ChunkOutcome::Fatal(ApiError::InvalidProperties {
                message: envelope.message,
                errors,
            })
        }
        ValidationFailure::Malformed(reason) => {
            ChunkOutcome::Fatal(ApiError::MalformedValidationError(reason))
        }
        ValidationFailure::Unrecognized => ChunkOutcome::Fatal(ApiError::from_response(response)),
    }
}

fn parse_batch_body<T: DeserializeOwned>(body: &str) -> Result<BatchResponse<T>, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CrmObject;

    fn invalid_email(message: &str) -> PropertyError {
        PropertyError {
            is_valid: false,
            message: message.to_string(),
            error: INVALID_EMAIL_CODE.to_string(),
            name: "email".to_string(),
        }
    }

    fn contact(email: &str) -> BatchInput {
        BatchInput::create()
            .with_property("email", email)
            .with_property("firstname", "Ada")
    }

    fn bad_request(message: &str) -> HttpResponse {
        let body = serde_json::json!({
            "status": "error",
            "message": message,
            "correlationId": "4f1c",
            "category": "VALIDATION_ERROR"
        });
        HttpResponse {
            status: 400,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn extracts_english_and_dutch_addresses() {
        assert_eq!(
            invalid_email_address(&invalid_email("Email address x@y.com is invalid")),
            Some("x@y.com")
        );
        assert_eq!(
            invalid_email_address(&invalid_email("E-mailadres jan@voorbeeld is ongeldig")),
            Some("jan@voorbeeld")
        );
        assert_eq!(
            invalid_email_address(&invalid_email("Adresse e-mail x@y.com invalide")),
            None
        );
    }

    #[test]
    fn non_email_codes_never_yield_an_address() {
        let mut error = invalid_email("Email address x@y.com is invalid");
        error.error = "INVALID_NUMBER".to_string();
        assert_eq!(invalid_email_address(&error), None);
    }

    #[test]
    fn interprets_email_only_failures() {
        let message = r#"Property values were not valid: [{"isValid":false,"message":"Email address x@y.com is invalid","error":"INVALID_EMAIL","name":"email"}]"#;
        match interpret_validation_error(message) {
            ValidationFailure::InvalidEmails { emails, errors } => {
                assert_eq!(emails, vec!["x@y.com".to_string()]);
                assert_eq!(errors.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn any_other_code_makes_the_failure_unrepairable() {
        let message = r#"Property values were not valid: [{"isValid":false,"message":"Email address x@y.com is invalid","error":"INVALID_EMAIL","name":"email"},{"isValid":false,"message":"abc is not a number","error":"INVALID_NUMBER","name":"numberofemployees"}]"#;
        assert!(matches!(
            interpret_validation_error(message),
            ValidationFailure::OtherValidation(errors) if errors.len() == 2
        ));
    }

    #[test]
    fn email_failures_are_classified_by_code_not_phrasing() {
        let german = r#"Property values were not valid: [{"isValid":false,"message":"E-Mail-Adresse x@y ist ungültig","error":"INVALID_EMAIL","name":"email"},{"isValid":false,"message":"Email address a@ is invalid","error":"INVALID_EMAIL","name":"email"}]"#;
        match interpret_validation_error(german) {
            ValidationFailure::InvalidEmails { emails, errors } => {
                assert_eq!(emails, vec!["a@".to_string()]);
                assert_eq!(errors.len(), 2);
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert_eq!(
            interpret_validation_error("Property values were not valid: []"),
            ValidationFailure::InvalidEmails {
                emails: Vec::new(),
                errors: Vec::new()
            }
        );
    }

    #[test]
    fn unknown_prefix_is_unrecognized_and_bad_json_is_malformed() {
        assert_eq!(
            interpret_validation_error("Invalid input JSON on line 1"),
            ValidationFailure::Unrecognized
        );
        assert!(matches!(
            interpret_validation_error("Property values were not valid: [{oops"),
            ValidationFailure::Malformed(_)
        ));
    }

    #[test]
    fn quarantine_only_touches_the_current_batch() {
        let mut items = vec![
            contact("x@y.com"),
            contact("ok@example.com"),
            contact("x@y.com"),
            contact("x@y.com"),
        ];
        let changed = quarantine_invalid_emails(
            &mut items,
            Batch { start: 1, end: 3 },
            &["x@y.com".to_string()],
            None,
        );
        assert_eq!(changed, 1);
        assert_eq!(items[0].email(), Some("x@y.com"));
        assert_eq!(items[1].email(), Some("ok@example.com"));
        assert_eq!(items[2].email(), Some(""));
        assert_eq!(items[3].email(), Some("x@y.com"));
    }

    #[test]
    fn quarantine_copies_address_to_alternate_property() {
        let mut items = vec![contact("x@y.com")];
        quarantine_invalid_emails(
            &mut items,
            Batch { start: 0, end: 1 },
            &["x@y.com".to_string()],
            Some("invalid_email"),
        );
        assert_eq!(items[0].email(), Some(""));
        assert_eq!(
            items[0].properties.get("invalid_email").map(String::as_str),
            Some("x@y.com")
        );
        assert_eq!(items[0].properties.get("firstname").map(String::as_str), Some("Ada"));
    }

    #[test]
    fn classifies_success_and_multi_status() {
        let ok = HttpResponse {
            status: 201,
            headers: Vec::new(),
            body: r#"{"status":"COMPLETE","results":[{"id":"1","properties":{}}]}"#.to_string(),
        };
        assert!(matches!(
            classify_batch_response::<CrmObject>(ok),
            ChunkOutcome::Accepted(results) if results.len() == 1
        ));

        let partial = HttpResponse {
            status: 207,
            headers: Vec::new(),
            body: r#"{"status":"COMPLETE","numErrors":1,"results":[{"id":"1","properties":{}}],"errors":[{"status":"error","category":"OBJECT_NOT_FOUND","message":"Object not found","context":{"ids":["9"]}}]}"#.to_string(),
        };
        match classify_batch_response::<CrmObject>(partial) {
            ChunkOutcome::AcceptedWithErrors { results, errors } => {
                assert_eq!(results.len(), 1);
                assert_eq!(errors[0].category, "OBJECT_NOT_FOUND");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn classifies_bad_requests() {
        let email = bad_request(
            r#"Property values were not valid: [{"isValid":false,"message":"Email address x@y.com is invalid","error":"INVALID_EMAIL","name":"email"}]"#,
        );
        assert!(matches!(
            classify_batch_response::<CrmObject>(email),
            ChunkOutcome::InvalidEmails { emails, .. } if emails == vec!["x@y.com".to_string()]
        ));

        let other = bad_request(
            r#"Property values were not valid: [{"isValid":false,"message":"abc","error":"INVALID_NUMBER","name":"numberofemployees"}]"#,
        );
        assert!(matches!(
            classify_batch_response::<CrmObject>(other),
            ChunkOutcome::Fatal(ApiError::InvalidProperties { .. })
        ));

        let unrelated = bad_request("Invalid input JSON");
        assert!(matches!(
            classify_batch_response::<CrmObject>(unrelated),
            ChunkOutcome::Fatal(ApiError::Http { status: 400, .. })
        ));
    }

    #[test]
    fn server_errors_are_fatal() {
        let response = HttpResponse {
            status: 500,
            headers: Vec::new(),
            body: "boom".to_string(),
        };
        assert!(matches!(
            classify_batch_response::<CrmObject>(response),
            ChunkOutcome::Fatal(ApiError::Http { status: 500, .. })
        ));
    }
}
