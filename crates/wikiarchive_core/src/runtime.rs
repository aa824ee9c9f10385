use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const STATE_DIR_NAME: &str = ".wikiarchive";
pub const CONFIG_FILENAME: &str = "config.toml";
pub const CREDENTIALS_FILENAME: &str = "credentials.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub config: Option<PathBuf>,
    pub credentials: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub user_config_dir: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self {
            cwd,
            user_config_dir: dirs::config_dir(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub config_path: PathBuf,
    pub credentials_path: PathBuf,
    pub config_source: ValueSource,
    pub credentials_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "config_path={} ({}) exists={}\ncredentials_path={} ({}) exists={}",
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            self.config_path.exists(),
            normalize_for_display(&self.credentials_path),
            self.credentials_source.as_str(),
            self.credentials_path.exists(),
        )
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = lookup_env("WIKIARCHIVE_CONFIG") {
        (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        )
    } else {
        (
            context.cwd.join(STATE_DIR_NAME).join(CONFIG_FILENAME),
            ValueSource::Default,
        )
    };

    let (credentials_path, credentials_source) =
        if let Some(path) = overrides.credentials.as_deref() {
            (absolutize(path, &context.cwd), ValueSource::Flag)
        } else if let Some(value) = lookup_env("WIKIARCHIVE_CREDENTIALS") {
            (
                absolutize(Path::new(value.trim()), &context.cwd),
                ValueSource::Env,
            )
        } else if let Some(dir) = context.user_config_dir.as_deref() {
            (
                dir.join("wikiarchive").join(CREDENTIALS_FILENAME),
                ValueSource::Heuristic,
            )
        } else {
            (
                context.cwd.join(STATE_DIR_NAME).join(CREDENTIALS_FILENAME),
                ValueSource::Default,
            )
        };

    Ok(ResolvedPaths {
        config_path,
        credentials_path,
        config_source,
        credentials_source,
    })
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub(crate) fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
