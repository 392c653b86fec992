//! HTTP client for the hosted platform (auth, REST table, object storage).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{GedError, Result};
use crate::models::{NewDocument, Session, StoredDocument, User};
use crate::services::platform::{
    Credentials, IdentityProvider, ListQuery, ObjectStore, Order, RecordStore, SignUpOutcome, UrlDisposition,
};

pub struct HostedPlatform {
    client: Client,
    base_url: Url,
    api_key: String,
    bucket: String,
    table: String,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

#[derive(Serialize)]
struct SignRequest {
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    prefixes: Vec<&'a str>,
}

impl HostedPlatform {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(&config.platform_url)
            .map_err(|e| GedError::Config(format!("invalid platform URL: {}", e)))?;
        Ok(HostedPlatform {
            client: Client::new(),
            base_url,
            api_key: config.api_key.clone(),
            bucket: config.bucket.clone(),
            table: config.table.clone(),
        })
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GedError::Config("platform URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_endpoint(&self, prefix: &[&str], key: &str) -> Result<Url> {
        let segments = prefix
            .iter()
            .copied()
            .chain(std::iter::once(self.bucket.as_str()))
            .chain(key.split('/').filter(|s| !s.is_empty()));
        self.endpoint(segments)
    }

    fn anon(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    fn authed(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
    }

    /// Checks that the platform answers with the configured key.
    pub async fn probe(&self) -> Result<bool> {
        let url = self.endpoint(["auth", "v1", "settings"])?;
        let response = self.anon(self.client.get(url)).send().await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl IdentityProvider for HostedPlatform {
    async fn sign_up(&self, credentials: &Credentials) -> Result<SignUpOutcome> {
        let url = self.endpoint(["auth", "v1", "signup"])?;
        let response = self
            .anon(self.client.post(url))
            .json(&PasswordGrant {
                email: &credentials.email,
                password: &credentials.password,
            })
            .send()
            .await?;
        let body = auth_body(response).await?;
        parse_sign_up(body, now_secs())
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let mut url = self.endpoint(["auth", "v1", "token"])?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let response = self
            .anon(self.client.post(url))
            .json(&PasswordGrant {
                email: &credentials.email,
                password: &credentials.password,
            })
            .send()
            .await?;
        let body = auth_body(response).await?;
        let token: TokenResponse = serde_json::from_value(body)?;
        Ok(session_from_token(token, now_secs()))
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let url = self.endpoint(["auth", "v1", "logout"])?;
        let response = self.authed(self.client.post(url), session).send().await?;
        // an already-invalid token is as good as signed out
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        check(response).await.map(|_| ())
    }

    async fn current_user(&self, session: &Session) -> Result<User> {
        let url = self.endpoint(["auth", "v1", "user"])?;
        let response = self.authed(self.client.get(url), session).send().await?;
        let response = check(response).await?;
        Ok(response.json::<User>().await?)
    }
}

#[async_trait]
impl RecordStore for HostedPlatform {
    async fn create(&self, session: &Session, record: &NewDocument) -> Result<StoredDocument> {
        let url = self.endpoint(["rest", "v1", self.table.as_str()])?;
        let response = self
            .authed(self.client.post(url), session)
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await?;
        let response = check(response).await?;
        let mut rows: Vec<StoredDocument> = response.json().await?;
        rows.pop()
            .ok_or_else(|| GedError::Internal("insert returned no row".to_string()))
    }

    async fn list(&self, session: &Session, query: &ListQuery) -> Result<Vec<StoredDocument>> {
        let mut url = self.endpoint(["rest", "v1", self.table.as_str()])?;
        url.query_pairs_mut()
            .extend_pairs(list_query_pairs(query));
        let response = self.authed(self.client.get(url), session).send().await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, session: &Session, id: &str) -> Result<()> {
        let mut url = self.endpoint(["rest", "v1", self.table.as_str()])?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));
        let response = self.authed(self.client.delete(url), session).send().await?;
        check(response).await.map(|_| ())
    }
}

#[async_trait]
impl ObjectStore for HostedPlatform {
    async fn upload(&self, session: &Session, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.object_endpoint(&["storage", "v1", "object"], key)?;
        let response = self
            .authed(self.client.post(url), session)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    async fn remove(&self, session: &Session, key: &str) -> Result<()> {
        let url = self.endpoint(["storage", "v1", "object", self.bucket.as_str()])?;
        let response = self
            .authed(self.client.delete(url), session)
            .json(&RemoveRequest { prefixes: vec![key] })
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    async fn signed_url(
        &self,
        session: &Session,
        key: &str,
        ttl: Duration,
        disposition: &UrlDisposition,
    ) -> Result<String> {
        let url = self.object_endpoint(&["storage", "v1", "object", "sign"], key)?;
        let response = self
            .authed(self.client.post(url), session)
            .json(&SignRequest {
                expires_in: ttl.as_secs(),
            })
            .send()
            .await?;
        let response = check(response).await?;
        let signed: SignResponse = response.json().await?;
        absolute_signed_url(&self.base_url, &signed.signed_url, disposition)
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn list_query_pairs(query: &ListQuery) -> Vec<(&'static str, String)> {
    let order = match query.order {
        Order::NewestFirst => "created_at.desc",
        Order::OldestFirst => "created_at.asc",
    };
    let mut pairs = vec![("select", "*".to_string()), ("order", order.to_string())];
    if let Some(status) = query.status {
        pairs.push(("status", format!("eq.{}", status.as_str())));
    }
    pairs
}

/// The storage API answers with a path relative to `/storage/v1`.
fn absolute_signed_url(base: &Url, relative: &str, disposition: &UrlDisposition) -> Result<String> {
    let joined = format!(
        "{}/storage/v1/{}",
        base.as_str().trim_end_matches('/'),
        relative.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined).map_err(|e| GedError::Internal(format!("bad signed URL: {}", e)))?;
    if let UrlDisposition::Attachment(name) = disposition {
        url.query_pairs_mut().append_pair("download", name);
    }
    Ok(url.to_string())
}

fn session_from_token(token: TokenResponse, now: i64) -> Session {
    let expires_at = token
        .expires_at
        .or_else(|| token.expires_in.map(|secs| now + secs));
    Session {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at,
        user: token.user,
    }
}

/// Sign-up returns a token when e-mail confirmation is off, the bare user otherwise.
fn parse_sign_up(body: Value, now: i64) -> Result<SignUpOutcome> {
    if body.get("access_token").is_some() {
        let token: TokenResponse = serde_json::from_value(body)?;
        return Ok(SignUpOutcome::SignedIn(session_from_token(token, now)));
    }
    let user = match body.get("user") {
        Some(user) => serde_json::from_value(user.clone())?,
        None => serde_json::from_value(body)?,
    };
    Ok(SignUpOutcome::ConfirmationRequired(user))
}

/// Pulls a human-readable message out of the various error shapes the platform returns.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for field in ["error_description", "msg", "message", "error"] {
            if let Some(text) = value.get(field).and_then(Value::as_str) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body.trim().to_string()
    }
}

async fn auth_body(response: Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GedError::Auth(error_message(status, &body)));
    }
    Ok(response.json().await?)
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), "platform request failed: {}", body);
    if status == StatusCode::UNAUTHORIZED {
        return Err(GedError::NotAuthenticated);
    }
    Err(GedError::Platform {
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentStatus;
    use serde_json::json;

    fn platform() -> HostedPlatform {
        let mut config = AppConfig::local("/tmp/unused");
        config.platform_url = "https://demo.example.co".to_string();
        config.api_key = "anon".to_string();
        HostedPlatform::new(&config).unwrap()
    }

    #[test]
    fn endpoints_are_built_from_segments() {
        let p = platform();
        assert_eq!(
            p.endpoint(["rest", "v1", "documents"]).unwrap().as_str(),
            "https://demo.example.co/rest/v1/documents"
        );
        assert_eq!(
            p.object_endpoint(&["storage", "v1", "object", "sign"], "user-1/17_FACTURE.pdf")
                .unwrap()
                .as_str(),
            "https://demo.example.co/storage/v1/object/sign/documents/user-1/17_FACTURE.pdf"
        );
    }

    #[test]
    fn list_query_uses_postgrest_filters() {
        let pairs = list_query_pairs(&ListQuery {
            status: Some(DocumentStatus::Validated),
            order: Order::NewestFirst,
        });
        assert!(pairs.contains(&("order", "created_at.desc".to_string())));
        assert!(pairs.contains(&("status", "eq.Validé".to_string())));
    }

    #[test]
    fn signed_url_is_absolute_and_carries_download_name() {
        let base = Url::parse("https://demo.example.co").unwrap();
        let inline = absolute_signed_url(&base, "/object/sign/documents/u/1.pdf?token=abc", &UrlDisposition::Inline).unwrap();
        assert_eq!(inline, "https://demo.example.co/storage/v1/object/sign/documents/u/1.pdf?token=abc");

        let attachment = absolute_signed_url(
            &base,
            "/object/sign/documents/u/1.pdf?token=abc",
            &UrlDisposition::Attachment("Facture_12.pdf".to_string()),
        )
        .unwrap();
        assert!(attachment.ends_with("?token=abc&download=Facture_12.pdf"));
    }

    #[test]
    fn sign_up_with_confirmation_returns_user() {
        let outcome = parse_sign_up(json!({ "id": "u1", "email": "a@b.c", "confirmation_sent_at": "x" }), 0).unwrap();
        match outcome {
            SignUpOutcome::ConfirmationRequired(user) => assert_eq!(user.id, "u1"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sign_up_with_autoconfirm_returns_session() {
        let body = json!({
            "access_token": "jwt",
            "refresh_token": "r",
            "expires_in": 3600,
            "user": { "id": "u1", "email": "a@b.c" }
        });
        match parse_sign_up(body, 1_000).unwrap() {
            SignUpOutcome::SignedIn(session) => {
                assert_eq!(session.access_token, "jwt");
                assert_eq!(session.expires_at, Some(4_600));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn error_messages_are_extracted() {
        assert_eq!(
            error_message(
                StatusCode::BAD_REQUEST,
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#
            ),
            "Invalid login credentials"
        );
        assert_eq!(error_message(StatusCode::BAD_REQUEST, r#"{"msg":"User already registered"}"#), "User already registered");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }
}
