use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::config::{
    ArchiveConfig, DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_UPLOAD_COMMENT, DEFAULT_UPLOAD_TIMEOUT_MS,
};
use crate::filename::ParsedFileName;
use crate::mediawiki::{FilePart, SaveMode, SaveRequest, UploadForm, WikiUploadApi};
use crate::templates;

pub const CHUNK_SIZE: usize = DEFAULT_CHUNK_SIZE_BYTES;

type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures of the stash protocol. Transport failures (timeouts included)
/// are wrapped here too so they surface as upload failures.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("refusing to upload empty file {}", .path.display())]
    EmptyFile { path: PathBuf },
    #[error("chunk upload at offset {offset} failed")]
    ChunkFailed {
        offset: u64,
        #[source]
        source: TransportError,
    },
    #[error("chunk at offset {offset} was rejected: {body}")]
    ChunkRejected { offset: u64, body: String },
    #[error("chunk at offset {offset} was accepted without a file key")]
    MissingFileKey { offset: u64 },
    #[error("final upload request failed")]
    FinalizeFailed {
        #[source]
        source: TransportError,
    },
    #[error("final upload failed: {body}")]
    FinalizeRejected { body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub chunk_size: usize,
    pub timeout: Duration,
    pub comment: String,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            timeout: Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS),
            comment: DEFAULT_UPLOAD_COMMENT.to_string(),
        }
    }
}

impl UploadOptions {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            chunk_size: config.chunk_size_bytes(),
            timeout: Duration::from_millis(config.upload_timeout_ms()),
            comment: config.upload_comment(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub file_name: String,
    pub file_size: u64,
    pub chunk_count: usize,
    pub file_key: String,
    pub source_url: Option<String>,
}

/// Stash state of one upload: bytes accepted so far and the server-side
/// key that later chunks and the finalize call must carry.
#[derive(Debug, Default)]
struct UploadSession {
    offset: u64,
    file_key: Option<String>,
    chunk_count: usize,
}

impl UploadSession {
    fn chunk_form(&self, base: &UploadForm, file_name: &str, bytes: Vec<u8>) -> UploadForm {
        let mut form = base
            .clone()
            .text("stash", "1")
            .text("offset", self.offset.to_string());
        if let Some(file_key) = &self.file_key {
            form = form.text("filekey", file_key.clone());
        }
        form.chunk = Some(FilePart {
            file_name: file_name.to_string(),
            bytes,
        });
        form
    }

    fn accept_chunk(&mut self, response: &Value, length: usize) -> Result<(), UploadError> {
        let result = upload_result(response);
        if result != Some("Continue") && result != Some("Success") {
            return Err(UploadError::ChunkRejected {
                offset: self.offset,
                body: response.to_string(),
            });
        }
        let file_key = response
            .pointer("/upload/filekey")
            .and_then(Value::as_str)
            .ok_or(UploadError::MissingFileKey {
                offset: self.offset,
            })?;
        self.file_key = Some(file_key.to_string());
        self.offset += length as u64;
        self.chunk_count += 1;
        Ok(())
    }
}

/// Stash-uploads `path` in chunks, promotes it to a file named after
/// `parsed` and writes the file description page.
pub fn upload_file<A, P>(
    api: &mut A,
    path: &Path,
    parsed: &ParsedFileName,
    options: &UploadOptions,
    mut on_progress: P,
) -> Result<UploadReport>
where
    A: WikiUploadApi,
    P: FnMut(u8),
{
    let file_name = parsed.file_name.as_str();
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let file_size = file
        .metadata()
        .with_context(|| format!("failed to inspect {}", path.display()))?
        .len();
    if file_size == 0 {
        return Err(UploadError::EmptyFile {
            path: path.to_path_buf(),
        }
        .into());
    }

    let token = api.csrf_token()?;
    let base = UploadForm::default()
        .text("action", "upload")
        .text("filename", file_name)
        .text("filesize", file_size.to_string())
        .text("format", "json")
        .text("token", token);

    let chunk_size = options.chunk_size.max(1);
    let mut session = UploadSession::default();
    loop {
        let bytes = read_chunk(&mut file, chunk_size)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if bytes.is_empty() {
            break;
        }
        let length = bytes.len();
        let form = session.chunk_form(&base, file_name, bytes);
        let response = api
            .post_multipart(form, options.timeout)
            .map_err(|error| UploadError::ChunkFailed {
                offset: session.offset,
                source: error.into(),
            })?;
        session.accept_chunk(&response, length)?;

        let percent = progress_percent(session.offset, file_size);
        on_progress(percent);
        info!(
            offset = session.offset,
            file_key = session.file_key.as_deref().unwrap_or_default(),
            percent,
            "chunk uploaded"
        );
    }

    let file_key = session.file_key.clone().ok_or(UploadError::MissingFileKey {
        offset: session.offset,
    })?;
    let finalize = base
        .text("filekey", file_key.clone())
        .text("ignorewarnings", "1")
        .text("comment", options.comment.clone());
    let response = api
        .post_multipart(finalize, options.timeout)
        .map_err(|error| UploadError::FinalizeFailed {
            source: error.into(),
        })?;
    if upload_result(&response) != Some("Success") {
        return Err(UploadError::FinalizeRejected {
            body: response.to_string(),
        }
        .into());
    }
    let source_url = response
        .pointer("/upload/imageinfo/url")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    info!(
        file = file_name,
        url = source_url.as_deref().unwrap_or_default(),
        "file uploaded"
    );

    api.save_page(&SaveRequest {
        title: parsed.file_page(),
        text: templates::file_description(parsed),
        summary: templates::FILE_DESCRIPTION_SUMMARY.to_string(),
        minor: false,
        mode: SaveMode::Overwrite,
    })?;

    Ok(UploadReport {
        file_name: file_name.to_string(),
        file_size,
        chunk_count: session.chunk_count,
        file_key,
        source_url,
    })
}

/// Whole percent of `offset` in `file_size`, capped at 100.
pub fn progress_percent(offset: u64, file_size: u64) -> u8 {
    if file_size == 0 {
        return 100;
    }
    (offset.saturating_mul(100) / file_size).min(100) as u8
}

fn upload_result(response: &Value) -> Option<&str> {
    response.pointer("/upload/result").and_then(Value::as_str)
}

fn read_chunk(file: &mut File, chunk_size: usize) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(chunk_size);
    file.by_ref().take(chunk_size as u64).read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::net::TcpListener;

    use anyhow::bail;
    use tempfile::tempdir;

    use super::*;
    use crate::error::{ErrorKind, classify};
    use crate::filename::parse_file_name;
    use crate::mediawiki::{MediaWikiClient, MediaWikiClientConfig, WikiPage, WikiPageApi};
    use crate::testing::MockWiki;

    /// Sends multipart requests through a real client; page calls are unused.
    struct HttpCommons {
        client: MediaWikiClient,
    }

    impl WikiPageApi for HttpCommons {
        fn login(&mut self, _username: &str, _password: &str) -> Result<()> {
            Ok(())
        }

        fn read_page(&mut self, title: &str) -> Result<WikiPage> {
            bail!("unexpected read of {title}")
        }

        fn save_page(&mut self, request: &SaveRequest) -> Result<()> {
            bail!("unexpected save of {}", request.title)
        }

        fn request_count(&self) -> usize {
            self.client.request_count()
        }
    }

    impl WikiUploadApi for HttpCommons {
        fn csrf_token(&mut self) -> Result<String> {
            Ok("+\\".to_string())
        }

        fn post_multipart(&mut self, form: UploadForm, timeout: Duration) -> Result<Value> {
            self.client.post_multipart(form, timeout)
        }
    }

    const NAME: &str = "ЦДАВО Р1-2-3. 1920. Протокол засідання.pdf";

    fn options(chunk_size: usize) -> UploadOptions {
        UploadOptions {
            chunk_size,
            ..UploadOptions::default()
        }
    }

    fn write_file(dir: &Path, size: usize) -> PathBuf {
        let path = dir.join(NAME);
        let bytes = (0..size).map(|index| (index % 251) as u8).collect::<Vec<_>>();
        fs::write(&path, bytes).expect("write upload fixture");
        path
    }

    #[test]
    fn uploads_in_chunks_and_chains_file_keys() {
        let temp = tempdir().expect("tempdir");
        let path = write_file(temp.path(), 2_500);
        let parsed = parse_file_name(NAME).expect("parse");
        let mut wiki = MockWiki::default();
        let mut progress = Vec::new();

        let report = upload_file(&mut wiki, &path, &parsed, &options(1_000), |percent| {
            progress.push(percent)
        })
        .expect("upload");

        let chunks = wiki.chunk_forms();
        assert_eq!(chunks.len(), 3);
        let sizes = chunks
            .iter()
            .map(|form| form.chunk.as_ref().expect("chunk").bytes.len())
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![1_000, 1_000, 500]);
        let offsets = chunks
            .iter()
            .map(|form| form.field("offset").expect("offset"))
            .collect::<Vec<_>>();
        assert_eq!(offsets, vec!["0", "1000", "2000"]);
        assert_eq!(chunks[0].field("filekey"), None);
        assert_eq!(chunks[1].field("filekey"), Some("key-0"));
        assert_eq!(chunks[2].field("filekey"), Some("key-1"));
        for form in &chunks {
            assert_eq!(form.field("filename"), Some(NAME));
            assert_eq!(form.field("filesize"), Some("2500"));
            assert_eq!(form.field("token"), Some("token+\\"));
            assert_eq!(form.field("format"), Some("json"));
        }

        let finalize = wiki.finalize_forms();
        assert_eq!(finalize.len(), 1);
        assert_eq!(finalize[0].field("filekey"), Some("key-2"));
        assert_eq!(finalize[0].field("ignorewarnings"), Some("1"));
        assert_eq!(finalize[0].field("comment"), Some("Uploaded via script"));
        assert!(finalize[0].chunk.is_none());

        assert_eq!(progress, vec![40, 80, 100]);
        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.file_size, 2_500);
        assert_eq!(report.file_key, "key-2");
        assert_eq!(
            report.source_url.as_deref(),
            Some("https://upload.example.org/ЦДАВО_Р1-2-3._1920._Протокол_засідання.pdf")
        );
        assert!(wiki.timeouts.iter().all(|timeout| *timeout == Duration::from_secs(180)));
    }

    #[test]
    fn writes_file_description_after_finalize() {
        let temp = tempdir().expect("tempdir");
        let path = write_file(temp.path(), 10);
        let parsed = parse_file_name(NAME).expect("parse");
        let mut wiki = MockWiki::default();

        upload_file(&mut wiki, &path, &parsed, &UploadOptions::default(), |_| {}).expect("upload");

        assert_eq!(wiki.chunk_forms().len(), 1);
        let save = wiki.saves.last().expect("file page");
        assert_eq!(save.title, format!("File:{NAME}"));
        assert_eq!(save.summary, "Add file description and license");
        assert_eq!(save.mode, SaveMode::Overwrite);
        assert!(save.text.contains("{{PD-Ukraine}}"));
    }

    #[test]
    fn rejected_chunk_keeps_raw_response() {
        let temp = tempdir().expect("tempdir");
        let path = write_file(temp.path(), 2_500);
        let parsed = parse_file_name(NAME).expect("parse");
        let mut wiki = MockWiki {
            reject_chunk: Some(1),
            ..MockWiki::default()
        };

        let error = upload_file(&mut wiki, &path, &parsed, &options(1_000), |_| {})
            .expect_err("must fail");
        match error.downcast_ref::<UploadError>() {
            Some(UploadError::ChunkRejected { offset, body }) => {
                assert_eq!(*offset, 1_000);
                assert!(body.contains("duplicate"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(classify(&error), ErrorKind::UploadProtocol);
        assert!(wiki.finalize_forms().is_empty());
        assert!(wiki.saves.is_empty());
    }

    #[test]
    fn rejected_finalize_fails_without_description_page() {
        let temp = tempdir().expect("tempdir");
        let path = write_file(temp.path(), 100);
        let parsed = parse_file_name(NAME).expect("parse");
        let mut wiki = MockWiki {
            reject_finalize: true,
            ..MockWiki::default()
        };

        let error = upload_file(&mut wiki, &path, &parsed, &options(1_000), |_| {})
            .expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<UploadError>(),
            Some(UploadError::FinalizeRejected { body }) if body.contains("stashfailed")
        ));
        assert!(wiki.saves.is_empty());
    }

    #[test]
    fn empty_file_is_rejected_before_any_request() {
        let temp = tempdir().expect("tempdir");
        let path = write_file(temp.path(), 0);
        let parsed = parse_file_name(NAME).expect("parse");
        let mut wiki = MockWiki::default();

        let error = upload_file(&mut wiki, &path, &parsed, &UploadOptions::default(), |_| {})
            .expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<UploadError>(),
            Some(UploadError::EmptyFile { .. })
        ));
        assert_eq!(wiki.requests, 0);
    }

    #[test]
    fn chunk_timeout_is_an_upload_failure() {
        // Connections queue in the backlog but never get an answer.
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let address = listener.local_addr().expect("listener address");
        let client = MediaWikiClient::new(MediaWikiClientConfig {
            api_url: format!("http://{address}/w/api.php"),
            user_agent: "wikiarchive-test".to_string(),
            timeout_ms: 5_000,
            rate_limit_read_ms: 0,
            rate_limit_write_ms: 0,
        })
        .expect("client");
        let mut commons = HttpCommons { client };
        let temp = tempdir().expect("tempdir");
        let path = write_file(temp.path(), 100);
        let parsed = parse_file_name(NAME).expect("parse");
        let options = UploadOptions {
            timeout: Duration::from_millis(300),
            ..options(1_000)
        };

        let error = upload_file(&mut commons, &path, &parsed, &options, |_| {})
            .expect_err("must time out");

        assert_eq!(classify(&error), ErrorKind::UploadProtocol);
        assert!(matches!(
            error.downcast_ref::<UploadError>(),
            Some(UploadError::ChunkFailed { offset: 0, .. })
        ));
        assert!(format!("{error:#}").contains("failed to send multipart request"));
        drop(listener);
    }

    #[test]
    fn progress_percent_is_floored_and_capped() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(5, 3), 100);
        assert_eq!(progress_percent(0, 0), 100);
    }
}
