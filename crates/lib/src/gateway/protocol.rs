//! Webhook protocol: query parameters, delivery classification, and rejection statuses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;

use crate::channels::{self, InboundEvent, PAGE_OBJECT};

/// Body Messenger expects back for an accepted delivery.
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook verification failed")]
    VerificationMismatch,
    #[error("unrecognized subscription object: {0:?}")]
    UnrecognizedSubscription(Option<String>),
    #[error("invalid webhook body: {0}")]
    InvalidBody(String),
    #[error("request has neither verification parameters nor an authorization code")]
    MissingParameters,
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::VerificationMismatch => StatusCode::FORBIDDEN,
            Self::UnrecognizedSubscription(_) => StatusCode::NOT_FOUND,
            Self::InvalidBody(_) | Self::MissingParameters => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        log::debug!("webhook rejected ({}): {}", status, self);
        (status, status.canonical_reason().unwrap_or_default()).into_response()
    }
}

/// GET /webhook query: either the subscription handshake or the SafeTrek OAuth redirect.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(rename = "hub.mode")]
    pub hub_mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub hub_verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub hub_challenge: Option<String>,
    pub code: Option<String>,
}

/// What a GET /webhook is asking for.
#[derive(Debug, PartialEq, Eq)]
pub enum GetRequest {
    Verify,
    Authorize { code: String },
}

impl WebhookQuery {
    /// Verification wins whenever any hub parameter is present.
    pub fn classify(&self) -> Result<GetRequest, WebhookError> {
        if self.hub_mode.is_some() || self.hub_verify_token.is_some() {
            return Ok(GetRequest::Verify);
        }
        match self.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Ok(GetRequest::Authorize {
                code: code.to_string(),
            }),
            _ => Err(WebhookError::MissingParameters),
        }
    }

    /// Returns the challenge to echo when mode is "subscribe" and the token matches.
    /// An unconfigured secret never matches.
    pub fn verify(&self, expected_token: Option<&str>) -> Result<String, WebhookError> {
        let expected = expected_token.unwrap_or("");
        let mode = self.hub_mode.as_deref().unwrap_or("");
        let token = self.hub_verify_token.as_deref().unwrap_or("");
        if mode == "subscribe" && !expected.is_empty() && token == expected {
            Ok(self.hub_challenge.clone().unwrap_or_default())
        } else {
            Err(WebhookError::VerificationMismatch)
        }
    }
}

/// Parse a delivery and classify its entries. Only unparsable JSON is a bad request; any body
/// whose `object` is not the string "page" is rejected before `entry` is looked at.
pub fn classify_delivery(body: &[u8]) -> Result<Vec<InboundEvent>, WebhookError> {
    let body: Value =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidBody(e.to_string()))?;
    if body.get("object").and_then(Value::as_str) != Some(PAGE_OBJECT) {
        let object = body.get("object").filter(|v| !v.is_null()).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        return Err(WebhookError::UnrecognizedSubscription(object));
    }
    Ok(channels::delivery_entries(body)
        .into_iter()
        .filter_map(channels::parse_entry)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(mode: Option<&str>, token: Option<&str>, challenge: Option<&str>) -> WebhookQuery {
        WebhookQuery {
            hub_mode: mode.map(str::to_string),
            hub_verify_token: token.map(str::to_string),
            hub_challenge: challenge.map(str::to_string),
            code: None,
        }
    }

    #[test]
    fn verify_echoes_challenge_on_match() {
        let q = query(Some("subscribe"), Some("s3cret"), Some("1158201444"));
        assert_eq!(q.verify(Some("s3cret")).unwrap(), "1158201444");
    }

    #[test]
    fn verify_rejects_mismatches() {
        let cases = [
            (query(Some("subscribe"), Some("wrong"), Some("c")), Some("s3cret")),
            (query(Some("unsubscribe"), Some("s3cret"), Some("c")), Some("s3cret")),
            (query(None, Some("s3cret"), Some("c")), Some("s3cret")),
            (query(Some("subscribe"), Some(""), Some("c")), None),
            (query(Some("subscribe"), Some("S3CRET"), Some("c")), Some("s3cret")),
        ];
        for (q, expected) in cases {
            let err = q.verify(expected).unwrap_err();
            assert_eq!(err.status(), StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn classify_get_requests() {
        let mut q = WebhookQuery::default();
        assert!(matches!(q.classify(), Err(WebhookError::MissingParameters)));
        q.code = Some("abc".to_string());
        assert_eq!(
            q.classify().unwrap(),
            GetRequest::Authorize {
                code: "abc".to_string()
            }
        );
        q.hub_mode = Some("subscribe".to_string());
        assert_eq!(q.classify().unwrap(), GetRequest::Verify);

        let blank = WebhookQuery {
            code: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(blank.classify().is_err());
    }

    #[test]
    fn non_page_delivery_yields_no_events() {
        let body = br#"{"object":"user","entry":[{"messaging":[{"sender":{"id":"1"},"message":{"text":"hi"}}]}]}"#;
        let err = classify_delivery(body).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = classify_delivery(br#"{"entry":[]}"#).unwrap_err();
        assert!(matches!(err, WebhookError::UnrecognizedSubscription(None)));

        // `object` decides before `entry` is read, whatever shape either has.
        let bodies: [&[u8]; 5] = [
            br#"{"object":"user","entry":{}}"#,
            br#"{"object":5}"#,
            br#"{"object":5,"entry":[]}"#,
            br#"{"object":null}"#,
            br#"[]"#,
        ];
        for body in bodies {
            let err = classify_delivery(body).unwrap_err();
            assert_eq!(err.status(), StatusCode::NOT_FOUND, "{}", String::from_utf8_lossy(body));
        }
        assert!(matches!(
            classify_delivery(br#"{"object":5}"#).unwrap_err(),
            WebhookError::UnrecognizedSubscription(Some(ref o)) if o == "5"
        ));
    }

    #[test]
    fn page_delivery_without_entry_array_is_empty() {
        let bodies: [&[u8]; 3] = [
            br#"{"object":"page"}"#,
            br#"{"object":"page","entry":null}"#,
            br#"{"object":"page","entry":{}}"#,
        ];
        for body in bodies {
            assert_eq!(classify_delivery(body).unwrap(), Vec::new());
        }
    }

    #[test]
    fn invalid_json_is_bad_request() {
        let err = classify_delivery(b"not json").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn page_delivery_classifies_each_entry() {
        let body = br#"{
            "object": "page",
            "entry": [
                {"messaging": [{"sender": {"id": "a"}, "message": {"text": "help"}}]},
                {"messaging": [{"sender": {"id": "b"}, "postback": {"payload": "yes"}}]},
                {"messaging": [{"sender": {"id": "c"}, "delivery": {"watermark": 1}}]},
                {"unexpected": true},
                {"messaging": "garbage"}
            ]
        }"#;
        let events = classify_delivery(body).unwrap();
        assert_eq!(
            events,
            vec![
                InboundEvent::text("a", "help"),
                InboundEvent::postback("b", "yes"),
            ]
        );
    }
}
