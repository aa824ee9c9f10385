use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Result, bail};
use serde_json::{Value, json};

use crate::mediawiki::{
    ApiError, LoginError, SaveMode, SaveRequest, UploadForm, WikiPage, WikiPageApi, WikiUploadApi,
};

/// In-memory wiki that follows the page and stash-upload protocols closely
/// enough for unit tests.
#[derive(Debug, Default)]
pub struct MockWiki {
    pub pages: BTreeMap<String, String>,
    pub created: Vec<String>,
    pub saves: Vec<SaveRequest>,
    pub forms: Vec<UploadForm>,
    pub timeouts: Vec<Duration>,
    pub logins: Vec<String>,
    pub reject_login: bool,
    /// Index of the chunk request answered with a `Warning` result.
    pub reject_chunk: Option<usize>,
    pub reject_finalize: bool,
    pub requests: usize,
    pub chunk_requests: usize,
    pub stashed_bytes: usize,
}

impl MockWiki {
    pub fn insert_page(&mut self, title: &str, text: &str) {
        self.pages.insert(title.to_string(), text.to_string());
    }

    pub fn page(&self, title: &str) -> Option<&str> {
        self.pages.get(title).map(String::as_str)
    }

    pub fn chunk_forms(&self) -> Vec<&UploadForm> {
        self.forms
            .iter()
            .filter(|form| form.field("stash") == Some("1"))
            .collect()
    }

    pub fn finalize_forms(&self) -> Vec<&UploadForm> {
        self.forms
            .iter()
            .filter(|form| form.field("stash").is_none())
            .collect()
    }

    fn answer_chunk(&mut self, form: &UploadForm) -> Value {
        let index = self.chunk_requests;
        self.chunk_requests += 1;
        if self.reject_chunk == Some(index) {
            return json!({"upload": {"result": "Warning", "warnings": {"duplicate": ["Other.pdf"]}}});
        }
        self.stashed_bytes += form.chunk.as_ref().map_or(0, |chunk| chunk.bytes.len());
        let file_size = form
            .field("filesize")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(0);
        let result = if self.stashed_bytes >= file_size {
            "Success"
        } else {
            "Continue"
        };
        json!({
            "upload": {
                "result": result,
                "filekey": format!("key-{index}"),
                "offset": self.stashed_bytes,
            }
        })
    }

    fn answer_finalize(&mut self, form: &UploadForm) -> Value {
        if self.reject_finalize {
            return json!({"upload": {"result": "Failure", "error": "stashfailed"}});
        }
        let file_name = form.field("filename").unwrap_or_default();
        json!({
            "upload": {
                "result": "Success",
                "filename": file_name,
                "imageinfo": {
                    "url": format!("https://upload.example.org/{}", file_name.replace(' ', "_")),
                }
            }
        })
    }
}

impl WikiPageApi for MockWiki {
    fn login(&mut self, username: &str, _password: &str) -> Result<()> {
        self.requests += 1;
        if self.reject_login {
            return Err(LoginError {
                username: username.to_string(),
                reason: "WrongPass".to_string(),
            }
            .into());
        }
        self.logins.push(username.to_string());
        Ok(())
    }

    fn read_page(&mut self, title: &str) -> Result<WikiPage> {
        self.requests += 1;
        Ok(WikiPage {
            title: title.to_string(),
            content: self.pages.get(title).cloned(),
            timestamp: self
                .pages
                .contains_key(title)
                .then(|| "2026-01-01T00:00:00Z".to_string()),
        })
    }

    fn save_page(&mut self, request: &SaveRequest) -> Result<()> {
        self.requests += 1;
        let exists = self.pages.contains_key(&request.title);
        match &request.mode {
            SaveMode::CreateOnly if exists => {
                return Err(ApiError {
                    code: "articleexists".to_string(),
                    info: "The article you tried to create has been created already.".to_string(),
                }
                .into());
            }
            SaveMode::UpdateExisting { .. } if !exists => {
                return Err(ApiError {
                    code: "missingtitle".to_string(),
                    info: "The page you specified doesn't exist.".to_string(),
                }
                .into());
            }
            SaveMode::CreateOnly => self.created.push(request.title.clone()),
            _ => {}
        }
        self.pages
            .insert(request.title.clone(), request.text.clone());
        self.saves.push(request.clone());
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.requests
    }
}

impl WikiUploadApi for MockWiki {
    fn csrf_token(&mut self) -> Result<String> {
        self.requests += 1;
        Ok("token+\\".to_string())
    }

    fn post_multipart(&mut self, form: UploadForm, timeout: Duration) -> Result<Value> {
        self.requests += 1;
        if form.field("action") != Some("upload") {
            bail!("unexpected multipart action");
        }
        self.timeouts.push(timeout);
        let response = if form.field("stash") == Some("1") {
            self.answer_chunk(&form)
        } else {
            self.answer_finalize(&form)
        };
        self.forms.push(form);
        Ok(response)
    }
}
