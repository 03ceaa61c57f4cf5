//! REST client for the Voxlate service.
//!
//! Thin glue over the non-streaming endpoints: text translation, document
//! translation (upload / poll / download), glossary management, and the
//! voice session negotiation calls that hand back WebSocket credentials.
//! No retry or rate-limit logic lives here.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{VoiceError, VoiceResult};
use crate::voice::{
    ConnectionCredential, NegotiatedSession, SessionNegotiator, VoiceSession, VoiceSessionOptions,
};

/// Default service endpoint.
pub const DEFAULT_API_URL: &str = "https://api.voxlate.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── Data models ──────────────────────────────────────────────────

/// One translated text with the language the service detected.
#[derive(Debug, Clone, Deserialize)]
pub struct TextTranslation {
    pub text: String,
    #[serde(default)]
    pub detected_source_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<TextTranslation>,
}

/// Handle returned by a document upload; the key authorizes status polls
/// and the download.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentHandle {
    pub document_id: String,
    pub document_key: String,
}

/// Server-side document translation state.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentStatus {
    pub status: String,
    #[serde(default)]
    pub seconds_remaining: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl DocumentStatus {
    pub fn is_done(&self) -> bool {
        self.status == "done"
    }

    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

/// A stored glossary.
#[derive(Debug, Clone, Deserialize)]
pub struct Glossary {
    pub glossary_id: String,
    pub name: String,
    pub source_language: String,
    pub target_language: String,
    #[serde(default)]
    pub entry_count: u64,
}

#[derive(Debug, Deserialize)]
struct GlossaryList {
    glossaries: Vec<Glossary>,
}

#[derive(Debug, Serialize)]
struct CreateVoiceSessionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source_language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_language_mode: Option<&'a str>,
    target_languages: &'a [String],
    content_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    formality: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    glossary_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateVoiceSessionResponse {
    streaming_url: String,
    token: String,
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct RenewCredentialResponse {
    streaming_url: String,
    token: String,
}

// ── Client ───────────────────────────────────────────────────────

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_key: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, auth_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_key: auth_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn auth_header(&self) -> String {
        format!("ApiKey {}", self.auth_key)
    }

    // ── Text translation ─────────────────────────────────────────

    pub async fn translate_text(
        &self,
        text: &[String],
        target_language: &str,
        source_language: Option<&str>,
        formality: Option<&str>,
        glossary_id: Option<&str>,
    ) -> anyhow::Result<Vec<TextTranslation>> {
        let body = serde_json::json!({
            "text": text,
            "target_language": target_language,
            "source_language": source_language,
            "formality": formality,
            "glossary_id": glossary_id,
        });
        let response = self
            .http
            .post(self.endpoint("/translate"))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .context("translate request failed")?;
        let response = Self::check(response).await?;
        let parsed: TranslateResponse = response
            .json()
            .await
            .context("malformed translate response")?;
        Ok(parsed.translations)
    }

    // ── Document translation ─────────────────────────────────────

    pub async fn upload_document(
        &self,
        filename: &str,
        contents: Vec<u8>,
        target_language: &str,
    ) -> anyhow::Result<DocumentHandle> {
        let response = self
            .http
            .post(self.endpoint("/documents"))
            .header("Authorization", self.auth_header())
            .header("X-Filename", filename)
            .query(&[("target_language", target_language)])
            .body(contents)
            .send()
            .await
            .context("document upload failed")?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .context("malformed document upload response")
    }

    pub async fn document_status(&self, handle: &DocumentHandle) -> anyhow::Result<DocumentStatus> {
        let response = self
            .http
            .get(self.endpoint(&format!("/documents/{}/status", handle.document_id)))
            .header("Authorization", self.auth_header())
            .query(&[("document_key", handle.document_key.as_str())])
            .send()
            .await
            .context("document status request failed")?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .context("malformed document status response")
    }

    pub async fn download_document(&self, handle: &DocumentHandle) -> anyhow::Result<Vec<u8>> {
        let response = self
            .http
            .get(self.endpoint(&format!("/documents/{}/result", handle.document_id)))
            .header("Authorization", self.auth_header())
            .query(&[("document_key", handle.document_key.as_str())])
            .send()
            .await
            .context("document download failed")?;
        let response = Self::check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ── Glossaries ───────────────────────────────────────────────

    pub async fn list_glossaries(&self) -> anyhow::Result<Vec<Glossary>> {
        let response = self
            .http
            .get(self.endpoint("/glossaries"))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .context("glossary list request failed")?;
        let response = Self::check(response).await?;
        let parsed: GlossaryList = response
            .json()
            .await
            .context("malformed glossary list response")?;
        Ok(parsed.glossaries)
    }

    pub async fn create_glossary(
        &self,
        name: &str,
        source_language: &str,
        target_language: &str,
        entries: &BTreeMap<String, String>,
    ) -> anyhow::Result<Glossary> {
        let body = serde_json::json!({
            "name": name,
            "source_language": source_language,
            "target_language": target_language,
            "entries": entries,
        });
        let response = self
            .http
            .post(self.endpoint("/glossaries"))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .context("glossary create request failed")?;
        let response = Self::check(response).await?;
        response.json().await.context("malformed glossary response")
    }

    pub async fn delete_glossary(&self, glossary_id: &str) -> anyhow::Result<()> {
        let response = self
            .http
            .delete(self.endpoint(&format!("/glossaries/{glossary_id}")))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .context("glossary delete request failed")?;
        Self::check(response).await?;
        Ok(())
    }

    async fn check(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        bail!("service returned {status}: {body}");
    }
}

// ── Voice session negotiation ────────────────────────────────────

#[async_trait]
impl SessionNegotiator for ApiClient {
    async fn open_session(&self, options: &VoiceSessionOptions) -> VoiceResult<NegotiatedSession> {
        let request = CreateVoiceSessionRequest {
            source_language: options.source_language.as_deref(),
            source_language_mode: options.source_language_mode.as_deref(),
            target_languages: &options.target_languages,
            content_type: &options.content_type,
            formality: options.formality.map(|f| f.as_str()),
            glossary_id: options.glossary_id.as_deref(),
        };
        let response = self
            .http
            .post(self.endpoint("/voice/sessions"))
            .header("Authorization", self.auth_header())
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::Negotiation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Negotiation(format!("{status}: {body}")));
        }
        let parsed: CreateVoiceSessionResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Negotiation(format!("malformed response: {e}")))?;

        Ok(NegotiatedSession {
            session: VoiceSession {
                session_id: parsed.session_id,
                source_language: options.source_language.clone(),
                target_languages: options.target_languages.clone(),
                content_type: options.content_type.clone(),
            },
            credential: ConnectionCredential {
                streaming_url: parsed.streaming_url,
                token: parsed.token,
            },
        })
    }

    async fn renew_credential(&self, token: &str) -> VoiceResult<ConnectionCredential> {
        let response = self
            .http
            .post(self.endpoint("/voice/sessions/renew"))
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| VoiceError::Negotiation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Negotiation(format!("{status}: {body}")));
        }
        let parsed: RenewCredentialResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Negotiation(format!("malformed response: {e}")))?;
        Ok(ConnectionCredential {
            streaming_url: parsed.streaming_url,
            token: parsed.token,
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::ReconnectPolicy;
    use wiremock::matchers::{body_json_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn voice_options() -> VoiceSessionOptions {
        VoiceSessionOptions {
            source_language: Some("en".into()),
            source_language_mode: None,
            target_languages: vec!["de".into()],
            content_type: "audio/wav".into(),
            formality: None,
            glossary_id: None,
            reconnect: ReconnectPolicy::default(),
        }
    }

    #[tokio::test]
    async fn open_session_parses_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/voice/sessions"))
            .and(header("Authorization", "ApiKey test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"streaming_url":"wss://stream.voxlate.com/v1","token":"tok-1","session_id":"sess-1"}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "test-key");
        let negotiated = client.open_session(&voice_options()).await.unwrap();
        assert_eq!(negotiated.session.session_id, "sess-1");
        assert_eq!(negotiated.credential.token, "tok-1");
        assert_eq!(negotiated.session.target_languages, vec!["de"]);
    }

    #[tokio::test]
    async fn open_session_maps_rest_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/voice/sessions"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_raw(r#"{"message":"plan not eligible"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "test-key");
        let err = client.open_session(&voice_options()).await.unwrap_err();
        let VoiceError::Negotiation(message) = err else {
            panic!("expected negotiation error, got {err:?}");
        };
        assert!(message.contains("403"));
    }

    #[tokio::test]
    async fn renew_uses_current_token_and_returns_rotated_one() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/voice/sessions/renew"))
            .and(body_json_string(r#"{"token":"tok-old"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"streaming_url":"wss://stream.voxlate.com/v1","token":"tok-new"}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "test-key");
        let credential = client.renew_credential("tok-old").await.unwrap();
        assert_eq!(credential.token, "tok-new");
    }

    #[tokio::test]
    async fn translate_text_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"translations":[{"text":"hallo welt","detected_source_language":"en"}]}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "test-key");
        let translations = client
            .translate_text(&["hello world".into()], "de", None, None, None)
            .await
            .unwrap();
        assert_eq!(translations.len(), 1);
        assert_eq!(translations[0].text, "hallo welt");
    }
}
