use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::config::ArchiveConfig;
use crate::credentials::Credentials;
use crate::error::{ErrorKind, classify};
use crate::filename::{PageTitles, parse_file_path};
use crate::mediawiki::{MediaWikiClient, MediaWikiClientConfig, WikiPageApi, WikiUploadApi};
use crate::pages;
use crate::progress::{ProgressReporter, PublishStage};
use crate::table::TableChange;
use crate::upload::{UploadOptions, UploadReport, upload_file};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("wiki bot credentials are missing")]
    MissingCredentials,
    #[error("file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// Article base URL of the sources wiki, e.g. `https://uk.wikisource.org/wiki/`.
    pub sources_url: String,
    pub upload: UploadOptions,
}

impl PublishOptions {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            sources_url: config.sources_url(),
            upload: UploadOptions::from_config(config),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableUpdate {
    pub page: String,
    pub child: String,
    pub change: TableChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    #[serde(flatten)]
    pub titles: PageTitles,
    pub case_page_url: String,
    pub file_name: String,
    pub created_pages: Vec<String>,
    pub table_updates: Vec<TableUpdate>,
    pub upload: UploadReport,
}

/// Publishes one file using the configured wikis. Each call opens its own
/// sessions.
pub fn publish<R: ProgressReporter>(
    path: &Path,
    credentials: &Credentials,
    config: &ArchiveConfig,
    progress: &mut R,
) -> Result<PublishReport> {
    let mut sources = MediaWikiClient::new(MediaWikiClientConfig::sources(config))?;
    let mut commons = MediaWikiClient::new(MediaWikiClientConfig::commons(config))?;
    publish_with_api(
        path,
        credentials,
        &mut sources,
        &mut commons,
        &PublishOptions::from_config(config),
        progress,
    )
}

pub fn publish_with_api<S, C, R>(
    path: &Path,
    credentials: &Credentials,
    sources: &mut S,
    commons: &mut C,
    options: &PublishOptions,
    progress: &mut R,
) -> Result<PublishReport>
where
    S: WikiPageApi,
    C: WikiUploadApi,
    R: ProgressReporter,
{
    progress.report(PublishStage::Initializing);
    let parsed = parse_file_path(path)?;
    if !credentials.has_credentials() {
        return Err(PublishError::MissingCredentials.into());
    }
    progress.report(PublishStage::Parsed);
    if !path.is_file() {
        return Err(PublishError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    let titles = parsed.page_titles();
    info!(file = %parsed.file_name, case_page = %titles.case_page, "publishing");

    progress.report(PublishStage::Connecting);
    sources
        .login(&credentials.username, &credentials.password)
        .context("failed to log in to the sources wiki")?;

    progress.report(PublishStage::CreatingStructure);
    let mut created_pages = Vec::new();
    progress.report(PublishStage::FundPage);
    if pages::ensure_fund_page(sources, &titles, &parsed)? {
        created_pages.push(titles.fund_page.clone());
    }
    progress.report(PublishStage::DescriptionPage);
    if pages::ensure_description_page(sources, &titles, &parsed)? {
        created_pages.push(titles.description_page.clone());
    }
    progress.report(PublishStage::CasePage);
    if pages::ensure_case_page(sources, &titles, &parsed)? {
        created_pages.push(titles.case_page.clone());
    }

    let mut table_updates = Vec::with_capacity(3);
    progress.report(PublishStage::ArchiveTable);
    table_updates.push(TableUpdate {
        page: titles.archive_list_page.clone(),
        child: parsed.fund.clone(),
        change: pages::upsert_fund_into_archive(sources, &titles, &parsed)?,
    });
    progress.report(PublishStage::FundTable);
    table_updates.push(TableUpdate {
        page: titles.fund_page.clone(),
        child: parsed.description.clone(),
        change: pages::upsert_description_into_fund(sources, &titles, &parsed)?,
    });
    progress.report(PublishStage::DescriptionTable);
    table_updates.push(TableUpdate {
        page: titles.description_page.clone(),
        child: parsed.case_name.clone(),
        change: pages::upsert_case_into_description(sources, &titles, &parsed)?,
    });

    progress.report(PublishStage::UploadStarted);
    commons
        .login(&credentials.username, &credentials.password)
        .context("failed to log in to the media wiki")?;
    let upload = upload_file(commons, path, &parsed, &options.upload, |percent| {
        progress.report(PublishStage::Uploading(percent))
    })?;

    progress.report(PublishStage::Done);
    let case_page_url = page_url(&options.sources_url, &titles.case_page);
    info!(url = %case_page_url, "published");

    Ok(PublishReport {
        case_page_url,
        file_name: parsed.file_name.clone(),
        titles,
        created_pages,
        table_updates,
        upload,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published {
        path: PathBuf,
        report: Box<PublishReport>,
    },
    Failed {
        path: PathBuf,
        kind: ErrorKind,
        detail: String,
    },
}

impl PublishOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Published { path, .. } | Self::Failed { path, .. } => path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// Publishes `paths` strictly in order. A failure is recorded and the
/// batch moves on to the next file.
pub fn publish_batch_with<F>(paths: &[PathBuf], mut publish_one: F) -> Vec<PublishOutcome>
where
    F: FnMut(&Path) -> Result<PublishReport>,
{
    paths
        .iter()
        .map(|path| match publish_one(path.as_path()) {
            Ok(report) => PublishOutcome::Published {
                path: path.clone(),
                report: Box::new(report),
            },
            Err(failure) => {
                let kind = classify(&failure);
                error!(path = %path.display(), kind = kind.as_str(), "publish failed: {failure:#}");
                PublishOutcome::Failed {
                    path: path.clone(),
                    kind,
                    detail: format!("{failure:#}"),
                }
            }
        })
        .collect()
}

pub fn publish_batch<R: ProgressReporter>(
    paths: &[PathBuf],
    credentials: &Credentials,
    config: &ArchiveConfig,
    progress: &mut R,
) -> Vec<PublishOutcome> {
    publish_batch_with(paths, |path| {
        publish(path, credentials, config, &mut *progress)
    })
}

/// Browsable URL of `title` under `base`, encoded like JavaScript's
/// `encodeURIComponent`.
pub fn page_url(base: &str, title: &str) -> String {
    let separator = if base.ends_with('/') { "" } else { "/" };
    format!("{base}{separator}{}", encode_uri_component(title))
}

fn encode_uri_component(value: &str) -> String {
    urlencoding::encode(value)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}
