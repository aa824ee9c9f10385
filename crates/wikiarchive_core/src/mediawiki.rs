use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::{Client, multipart};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::ArchiveConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiPage {
    pub title: String,
    pub content: Option<String>,
    pub timestamp: Option<String>,
}

impl WikiPage {
    pub fn missing(&self) -> bool {
        self.content.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveMode {
    CreateOnly,
    UpdateExisting { base_timestamp: Option<String> },
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub title: String,
    pub text: String,
    pub summary: String,
    pub minor: bool,
    pub mode: SaveMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    NoChange,
    Save {
        text: String,
        summary: String,
        minor: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("MediaWiki login failed for {username}: {reason}")]
pub struct LoginError {
    pub username: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("MediaWiki API error [{code}]: {info}")]
pub struct ApiError {
    pub code: String,
    pub info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page does not exist: {title}")]
pub struct MissingPageError {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Text fields and an optional binary part of a multipart API call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadForm {
    pub fields: Vec<(String, String)>,
    pub chunk: Option<FilePart>,
}

impl UploadForm {
    pub fn text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

pub trait WikiPageApi {
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn read_page(&mut self, title: &str) -> Result<WikiPage>;
    fn save_page(&mut self, request: &SaveRequest) -> Result<()>;
    fn request_count(&self) -> usize;

    fn create_page(&mut self, title: &str, text: &str, summary: &str) -> Result<()> {
        self.save_page(&SaveRequest {
            title: title.to_string(),
            text: text.to_string(),
            summary: summary.to_string(),
            minor: false,
            mode: SaveMode::CreateOnly,
        })
    }

    /// Read-modify-write of an existing page. Returns `true` when a new
    /// revision was saved.
    fn edit_page<F>(&mut self, title: &str, transform: F) -> Result<bool>
    where
        Self: Sized,
        F: FnOnce(&str) -> Result<EditOutcome>,
    {
        let page = self.read_page(title)?;
        let Some(content) = page.content.as_deref() else {
            return Err(MissingPageError {
                title: title.to_string(),
            }
            .into());
        };
        match transform(content)? {
            EditOutcome::NoChange => Ok(false),
            EditOutcome::Save {
                text,
                summary,
                minor,
            } => {
                self.save_page(&SaveRequest {
                    title: title.to_string(),
                    text,
                    summary,
                    minor,
                    mode: SaveMode::UpdateExisting {
                        base_timestamp: page.timestamp.clone(),
                    },
                })?;
                Ok(true)
            }
        }
    }
}

pub trait WikiUploadApi: WikiPageApi {
    fn csrf_token(&mut self) -> Result<String>;
    /// Raw authenticated multipart POST; returns the decoded JSON body
    /// without interpreting it.
    fn post_multipart(&mut self, form: UploadForm, timeout: Duration) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn sources(config: &ArchiveConfig) -> Self {
        Self::with_api_url(config, config.sources_api_url())
    }

    pub fn commons(config: &ArchiveConfig) -> Self {
        Self::with_api_url(config, config.commons_api_url())
    }

    fn with_api_url(config: &ArchiveConfig, api_url: String) -> Self {
        Self {
            api_url,
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            rate_limit_read_ms: config.http.rate_limit_read_ms.unwrap_or(0),
            rate_limit_write_ms: config.http.rate_limit_write_ms.unwrap_or(0),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        Url::parse(&config.api_url)
            .with_context(|| format!("invalid MediaWiki API URL: {}", config.api_url))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
            csrf_token: None,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let pairs = api_pairs(params);
        self.apply_rate_limit(false);
        let response = self
            .client
            .get(&self.config.api_url)
            .header("User-Agent", self.config.user_agent.clone())
            .query(&pairs)
            .send()
            .context("failed to call MediaWiki API")?;
        decode_api_response(response)
    }

    fn request_json_post(&mut self, params: &[(&str, String)], is_write: bool) -> Result<Value> {
        let pairs = api_pairs(params);
        self.apply_rate_limit(is_write);
        let response = self
            .client
            .post(&self.config.api_url)
            .header("User-Agent", self.config.user_agent.clone())
            .form(&pairs)
            .send()
            .context("failed to call MediaWiki API")?;
        decode_api_response(response)
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }
}

impl WikiPageApi for MediaWikiClient {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token_response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json_post(
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                debug!(api_url = %self.config.api_url, username, "logged in");
                self.csrf_token = None;
                Ok(())
            }
            other => Err(LoginError {
                username: username.to_string(),
                reason: login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string()),
            }
            .into()),
        }
    }

    fn read_page(&mut self, title: &str) -> Result<WikiPage> {
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content|timestamp".to_string()),
            ("rvslots", "main".to_string()),
        ])?;
        let parsed: QueryResponse = serde_json::from_value(response)
            .with_context(|| format!("failed to decode page content response for {title}"))?;
        let page = parsed
            .query
            .pages
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("page not returned by API: {title}"))?;

        if page.missing.unwrap_or(false) || page.invalid.unwrap_or(false) {
            return Ok(WikiPage {
                title: page.title,
                content: None,
                timestamp: None,
            });
        }
        let revision = page.revisions.into_iter().next();
        let timestamp = revision.as_ref().map(|revision| revision.timestamp.clone());
        let content = revision
            .and_then(|revision| revision.slots)
            .and_then(|slots| slots.main)
            .map(|slot| slot.content)
            .unwrap_or_default();
        Ok(WikiPage {
            title: page.title,
            content: Some(content),
            timestamp,
        })
    }

    fn save_page(&mut self, request: &SaveRequest) -> Result<()> {
        let token = self.ensure_csrf_token()?;
        let mut params = vec![
            ("action", "edit".to_string()),
            ("title", request.title.clone()),
            ("text", request.text.clone()),
            ("summary", request.summary.clone()),
            ("bot", "1".to_string()),
        ];
        if request.minor {
            params.push(("minor", "1".to_string()));
        }
        match &request.mode {
            SaveMode::CreateOnly => params.push(("createonly", "1".to_string())),
            SaveMode::UpdateExisting { base_timestamp } => {
                params.push(("nocreate", "1".to_string()));
                if let Some(timestamp) = base_timestamp {
                    params.push(("basetimestamp", timestamp.clone()));
                    params.push(("starttimestamp", timestamp.clone()));
                }
            }
            SaveMode::Overwrite => {}
        }
        params.push(("token", token));

        let response = self
            .request_json_post(&params, true)
            .with_context(|| format!("MediaWiki edit failed for {}", request.title))?;
        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let edit = edit_payload
            .edit
            .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
        if edit.result.as_deref() != Some("Success") {
            bail!(
                "MediaWiki edit failed for {}: {}",
                request.title,
                edit.result.unwrap_or_else(|| "unknown".to_string())
            );
        }
        debug!(title = %request.title, "saved page");
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl WikiUploadApi for MediaWikiClient {
    fn csrf_token(&mut self) -> Result<String> {
        self.ensure_csrf_token()
    }

    fn post_multipart(&mut self, form: UploadForm, timeout: Duration) -> Result<Value> {
        let mut multipart_form = multipart::Form::new();
        for (key, value) in form.fields {
            multipart_form = multipart_form.text(key, value);
        }
        if let Some(chunk) = form.chunk {
            let part = multipart::Part::bytes(chunk.bytes)
                .file_name(chunk.file_name)
                .mime_str("application/octet-stream")
                .context("invalid chunk content type")?;
            multipart_form = multipart_form.part("chunk", part);
        }

        self.apply_rate_limit(true);
        let response = self
            .client
            .post(&self.config.api_url)
            .header("User-Agent", self.config.user_agent.clone())
            .timeout(timeout)
            .multipart(multipart_form)
            .send()
            .context("failed to send multipart request to MediaWiki API")?;
        let status = response.status();
        let body = response
            .text()
            .context("failed to read multipart response body")?;
        if !status.is_success() {
            bail!("MediaWiki API request failed with HTTP {status}: {body}");
        }
        serde_json::from_str(&body)
            .with_context(|| format!("MediaWiki API returned a non-JSON body: {body}"))
    }
}

fn api_pairs(params: &[(&str, String)]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len() + 2);
    pairs.push(("format".to_string(), "json".to_string()));
    pairs.push(("formatversion".to_string(), "2".to_string()));
    for (key, value) in params {
        if !value.is_empty() {
            pairs.push(((*key).to_string(), value.clone()));
        }
    }
    pairs
}

fn decode_api_response(response: reqwest::blocking::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        bail!("MediaWiki API request failed with HTTP {status}");
    }
    let payload: Value = response
        .json()
        .context("failed to decode MediaWiki API JSON response")?;
    if let Some(error) = api_error(&payload) {
        return Err(error.into());
    }
    Ok(payload)
}

fn api_error(payload: &Value) -> Option<ApiError> {
    let error = payload.get("error")?;
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error");
    let info = error
        .get("info")
        .and_then(Value::as_str)
        .unwrap_or("unknown info");
    Some(ApiError {
        code: code.to_string(),
        info: info.to_string(),
    })
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    title: String,
    missing: Option<bool>,
    invalid: Option<bool>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    timestamp: String,
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
}
