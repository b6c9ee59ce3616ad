//! Client for the third-party consent registry.
//!
//! A [`ConsentRequest`] describes the data subject, their preferences and the
//! legal notices they accepted. [`HttpConsentClient`] posts it to the
//! registry's `consent` endpoint and returns the registry's JSON answer.

use std::time::Duration;

use async_trait::async_trait;
use formflow_core::config::ConsentConfig;
use formflow_core::ConfigMap;
use serde::Serialize;
use serde_json::{json, Value};

use crate::condition::is_empty;
use crate::error::ConsentError;
use crate::handler::is_valid_email;
use crate::settings::{as_bool, flag};

const DEFAULT_LEGAL_NOTICES: [&str; 2] = ["privacy_policy", "cookie_policy"];

/// The person giving consent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsentSubject {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub verified: bool,
}

/// A consent record to register.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsentRequest {
    subject: ConsentSubject,
    preferences: ConfigMap,
    legal_notices: Vec<Value>,
}

impl Default for ConsentRequest {
    fn default() -> Self {
        Self {
            subject: ConsentSubject::default(),
            preferences: ConfigMap::new(),
            legal_notices: DEFAULT_LEGAL_NOTICES
                .iter()
                .map(|id| json!({ "identifier": id }))
                .collect(),
        }
    }
}

impl ConsentRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored lower-cased and trimmed.
    pub fn email(mut self, email: &str) -> Self {
        self.subject.email = email.trim().to_lowercase();
        self
    }

    pub fn first_name(mut self, first_name: &str) -> Self {
        self.subject.first_name = first_name.trim().to_string();
        self
    }

    pub fn last_name(mut self, last_name: Option<&str>) -> Self {
        self.subject.last_name = last_name.map(str::trim).unwrap_or_default().to_string();
        self
    }

    pub fn full_name(mut self, full_name: &str) -> Self {
        self.subject.full_name = full_name.trim().to_string();
        self
    }

    pub fn verified(mut self) -> Self {
        self.subject.verified = true;
        self
    }

    pub fn preferences(mut self, preferences: ConfigMap) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn legal_notices(mut self, legal_notices: Vec<Value>) -> Self {
        self.legal_notices = legal_notices;
        self
    }

    pub fn subject(&self) -> &ConsentSubject {
        &self.subject
    }

    /// Check the email before anything is sent.
    pub fn validate(&self) -> Result<(), ConsentError> {
        if self.subject.email.is_empty() {
            return Err(ConsentError::MissingEmail);
        }
        if !is_valid_email(&self.subject.email) {
            return Err(ConsentError::InvalidEmail(self.subject.email.clone()));
        }
        Ok(())
    }

    /// JSON body for the registry. The full name defaults to first + last.
    pub fn payload(&self) -> Value {
        let mut subject = self.subject.clone();
        if subject.full_name.is_empty() {
            subject.full_name = format!("{} {}", subject.first_name, subject.last_name)
                .trim()
                .to_string();
        }
        json!({
            "subject": subject,
            "preferences": self.preferences,
            "legal_notices": self.legal_notices,
        })
    }
}

/// Legal notices from an action config.
///
/// A `legal_notices` list is used as given. A map of `name -> bool` becomes
/// one `{identifier}` entry per truthy name. Without `legal_notices`, the
/// privacy and cookie policies are included unless `privacy_policy` /
/// `cookie_policy` turn them off.
pub fn legal_notices_from_config(config: &ConfigMap) -> Vec<Value> {
    match config.get("legal_notices") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, accepted)| as_bool(accepted))
            .map(|(name, _)| json!({ "identifier": name }))
            .collect(),
        _ => DEFAULT_LEGAL_NOTICES
            .iter()
            .filter(|name| flag(config, name, true))
            .map(|name| json!({ "identifier": name }))
            .collect(),
    }
}

/// Registers consent records.
#[async_trait]
pub trait ConsentRegistry: Send + Sync {
    /// Returns the registry's response body, which carries the consent `id`.
    async fn create_consent(&self, request: &ConsentRequest) -> Result<Value, ConsentError>;
}

/// HTTP client for the consent registry API.
#[derive(Debug, Clone)]
pub struct HttpConsentClient {
    client: reqwest::Client,
    base_uri: String,
    api_key: Option<String>,
}

impl HttpConsentClient {
    pub fn new(
        base_uri: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConsentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_uri: base_uri.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(config: &ConsentConfig) -> Result<Self, ConsentError> {
        Self::new(
            config.base_uri.clone(),
            config.public_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/consent", self.base_uri.trim_end_matches('/'))
    }
}

#[async_trait]
impl ConsentRegistry for HttpConsentClient {
    async fn create_consent(&self, request: &ConsentRequest) -> Result<Value, ConsentError> {
        request.validate()?;
        let api_key = self.api_key.as_deref().ok_or(ConsentError::MissingApiKey)?;
        let email = request.subject().email.as_str();

        tracing::info!(email = %email, "Sending consent to registry");
        let payload = request.payload();
        tracing::debug!(payload = %payload, "Consent request");

        let response = self
            .client
            .post(self.endpoint())
            .header("ApiKey", api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(email = %email, error = %e, "Consent request failed");
                ConsentError::Request(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| match v.get("error") {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(other) if !other.is_null() => Some(other.to_string()),
                    _ => None,
                })
                .unwrap_or(body);
            tracing::error!(status = status.as_u16(), error = %message, email = %email, "Consent registry returned an error");
            return Err(ConsentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        match body.get("id") {
            Some(id) if !is_empty(id) => {
                tracing::info!(consent_id = %id, email = %email, "Consent registered");
                Ok(body)
            }
            _ => {
                tracing::error!(response = %body, email = %email, "Consent id missing in response");
                Err(ConsentError::MissingConsentId)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> ConfigMap {
        value.as_object().cloned().unwrap()
    }

    fn request() -> ConsentRequest {
        ConsentRequest::new()
            .email("  Jane.Doe@Example.COM ")
            .first_name(" Jane ")
            .last_name(Some("Doe"))
    }

    fn client(url: &str, key: Option<&str>) -> HttpConsentClient {
        HttpConsentClient::new(url, key.map(str::to_string), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_payload_shape() {
        let payload = request()
            .preferences(config(json!({"newsletter": false})))
            .payload();
        assert_eq!(
            payload,
            json!({
                "subject": {
                    "email": "jane.doe@example.com",
                    "first_name": "Jane",
                    "last_name": "Doe",
                    "full_name": "Jane Doe",
                    "verified": false
                },
                "preferences": {"newsletter": false},
                "legal_notices": [
                    {"identifier": "privacy_policy"},
                    {"identifier": "cookie_policy"}
                ]
            })
        );
    }

    #[test]
    fn test_explicit_full_name_kept() {
        let payload = request().full_name("Dr. Jane Doe").verified().payload();
        assert_eq!(payload["subject"]["full_name"], "Dr. Jane Doe");
        assert_eq!(payload["subject"]["verified"], true);
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            ConsentRequest::new().validate(),
            Err(ConsentError::MissingEmail)
        ));
        assert!(matches!(
            ConsentRequest::new().email("not-an-email").validate(),
            Err(ConsentError::InvalidEmail(_))
        ));
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_legal_notices_from_config() {
        assert_eq!(
            legal_notices_from_config(&ConfigMap::new()),
            vec![
                json!({"identifier": "privacy_policy"}),
                json!({"identifier": "cookie_policy"})
            ]
        );
        assert_eq!(
            legal_notices_from_config(&config(json!({"cookie_policy": false}))),
            vec![json!({"identifier": "privacy_policy"})]
        );
        assert_eq!(
            legal_notices_from_config(&config(json!({
                "legal_notices": {"terms": true, "marketing": false}
            }))),
            vec![json!({"identifier": "terms"})]
        );
        let list = json!([{"identifier": "terms", "version": "2"}]);
        assert_eq!(
            legal_notices_from_config(&config(json!({"legal_notices": list.clone()}))),
            list.as_array().unwrap().clone()
        );
    }

    #[tokio::test]
    async fn test_create_consent_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/consent")
            .match_header("ApiKey", "secret")
            .match_body(mockito::Matcher::PartialJson(json!({
                "subject": {"email": "jane.doe@example.com", "full_name": "Jane Doe"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"cons_123","timestamp":"2024-01-01T00:00:00Z"}"#)
            .create_async()
            .await;

        let response = client(&format!("{}/", server.url()), Some("secret"))
            .create_consent(&request())
            .await
            .unwrap();
        assert_eq!(response["id"], "cons_123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_consent_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/consent")
            .with_status(422)
            .with_body(r#"{"error":"invalid subject"}"#)
            .create_async()
            .await;

        let err = client(&server.url(), Some("secret"))
            .create_consent(&request())
            .await
            .unwrap_err();
        match err {
            ConsentError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "invalid subject");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_consent_raw_error_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/consent")
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        let err = client(&server.url(), Some("secret"))
            .create_consent(&request())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Consent API returned error (status 500): upstream down"
        );
    }

    #[tokio::test]
    async fn test_create_consent_missing_id() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/consent")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let err = client(&server.url(), Some("secret"))
            .create_consent(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsentError::MissingConsentId));
    }

    #[tokio::test]
    async fn test_create_consent_requires_api_key() {
        let err = client("http://127.0.0.1:9", None)
            .create_consent(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsentError::MissingApiKey));
    }
}
