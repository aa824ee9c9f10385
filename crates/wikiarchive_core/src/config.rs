use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SOURCES_API_URL: &str = "https://uk.wikisource.org/w/api.php";
pub const DEFAULT_SOURCES_URL: &str = "https://uk.wikisource.org/wiki/";
pub const DEFAULT_COMMONS_API_URL: &str = "https://commons.wikimedia.org/w/api.php";
pub const DEFAULT_USER_AGENT: &str = "wikiarchive/0.1";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 180_000;
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_UPLOAD_COMMENT: &str = "Uploaded via script";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub sources: WikiSection,
    #[serde(default)]
    pub commons: WikiSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub upload: UploadSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub url: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub upload_timeout_ms: Option<u64>,
    pub rate_limit_read_ms: Option<u64>,
    pub rate_limit_write_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct UploadSection {
    pub chunk_size_bytes: Option<usize>,
    pub comment: Option<String>,
}

impl ArchiveConfig {
    /// Resolve the Wikisource API URL: env SOURCES_API_URL > config > default.
    pub fn sources_api_url(&self) -> String {
        self.sources_api_url_with(&process_env)
    }

    /// Resolve the base article URL used to build case page links:
    /// env SOURCES_URL > config > derived from the API URL > default.
    pub fn sources_url(&self) -> String {
        self.sources_url_with(&process_env)
    }

    /// Resolve the Commons API URL: env COMMONS_API_URL > config > default.
    pub fn commons_api_url(&self) -> String {
        self.commons_api_url_with(&process_env)
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        lookup_trimmed(&process_env, "WIKI_USER_AGENT")
            .or_else(|| self.http.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        lookup_u64(&process_env, "WIKI_HTTP_TIMEOUT_MS")
            .or(self.http.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn upload_timeout_ms(&self) -> u64 {
        lookup_u64(&process_env, "WIKI_UPLOAD_TIMEOUT_MS")
            .or(self.http.upload_timeout_ms)
            .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_MS)
    }

    pub fn chunk_size_bytes(&self) -> usize {
        self.upload
            .chunk_size_bytes
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_CHUNK_SIZE_BYTES)
    }

    pub fn upload_comment(&self) -> String {
        self.upload
            .comment
            .clone()
            .unwrap_or_else(|| DEFAULT_UPLOAD_COMMENT.to_string())
    }

    fn sources_api_url_with<F>(&self, lookup_env: &F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup_trimmed(lookup_env, "SOURCES_API_URL")
            .or_else(|| self.sources.api_url.clone())
            .unwrap_or_else(|| DEFAULT_SOURCES_API_URL.to_string())
    }

    fn sources_url_with<F>(&self, lookup_env: &F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup_trimmed(lookup_env, "SOURCES_URL") {
            return url;
        }
        if let Some(url) = &self.sources.url {
            return url.clone();
        }
        // A custom API endpoint implies the matching /wiki/ article path.
        if (self.sources.api_url.is_some()
            || lookup_trimmed(lookup_env, "SOURCES_API_URL").is_some())
            && let Some(base) = derive_wiki_url(&self.sources_api_url_with(lookup_env))
        {
            return format!("{base}/wiki/");
        }
        DEFAULT_SOURCES_URL.to_string()
    }

    fn commons_api_url_with<F>(&self, lookup_env: &F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup_trimmed(lookup_env, "COMMONS_API_URL")
            .or_else(|| self.commons.api_url.clone())
            .unwrap_or_else(|| DEFAULT_COMMONS_API_URL.to_string())
    }
}

/// Load and parse an ArchiveConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ArchiveConfig> {
    if !config_path.exists() {
        return Ok(ArchiveConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ArchiveConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Derive the site root from an API URL by stripping `/w/api.php` or `/api.php`.
pub fn derive_wiki_url(api_url: &str) -> Option<String> {
    let trimmed = api_url.trim();
    let stripped = trimmed
        .strip_suffix("/w/api.php")
        .or_else(|| trimmed.strip_suffix("/api.php"))
        .unwrap_or(trimmed);
    let result = stripped.trim_end_matches('/').to_string();
    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn lookup_trimmed<F>(lookup_env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn lookup_u64<F>(lookup_env: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_trimmed(lookup_env, key).and_then(|value| value.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_points_at_public_wikis() {
        let config = ArchiveConfig::default();
        assert_eq!(config.sources_api_url_with(&no_env), DEFAULT_SOURCES_API_URL);
        assert_eq!(config.commons_api_url_with(&no_env), DEFAULT_COMMONS_API_URL);
        assert_eq!(config.sources_url_with(&no_env), DEFAULT_SOURCES_URL);
        assert_eq!(config.chunk_size_bytes(), 5 * 1024 * 1024);
        assert_eq!(config.upload_comment(), "Uploaded via script");
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, ArchiveConfig::default());
    }

    #[test]
    fn load_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[sources]
api_url = "https://test.wikisource.org/w/api.php"

[commons]
api_url = "https://test.commons.org/w/api.php"

[http]
user_agent = "archive-bot/2.0"
timeout_ms = 5000
upload_timeout_ms = 60000

[upload]
chunk_size_bytes = 1048576
comment = "Batch upload"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.sources_api_url_with(&no_env),
            "https://test.wikisource.org/w/api.php"
        );
        assert_eq!(
            config.sources_url_with(&no_env),
            "https://test.wikisource.org/wiki/"
        );
        assert_eq!(
            config.commons_api_url_with(&no_env),
            "https://test.commons.org/w/api.php"
        );
        assert_eq!(config.http.user_agent.as_deref(), Some("archive-bot/2.0"));
        assert_eq!(config.http.timeout_ms, Some(5000));
        assert_eq!(config.http.upload_timeout_ms, Some(60000));
        assert_eq!(config.chunk_size_bytes(), 1_048_576);
        assert_eq!(config.upload_comment(), "Batch upload");
    }

    #[test]
    fn env_overrides_config_values() {
        let config = ArchiveConfig {
            sources: WikiSection {
                url: Some("https://config.example/wiki/".to_string()),
                api_url: Some("https://config.example/w/api.php".to_string()),
            },
            ..ArchiveConfig::default()
        };
        let env = HashMap::from([
            (
                "SOURCES_API_URL".to_string(),
                " https://env.example/w/api.php ".to_string(),
            ),
            ("COMMONS_API_URL".to_string(), String::new()),
        ]);
        let lookup = |key: &str| env.get(key).cloned();
        assert_eq!(
            config.sources_api_url_with(&lookup),
            "https://env.example/w/api.php"
        );
        assert_eq!(config.sources_url_with(&lookup), "https://config.example/wiki/");
        assert_eq!(config.commons_api_url_with(&lookup), DEFAULT_COMMONS_API_URL);
    }

    #[test]
    fn zero_chunk_size_falls_back_to_default() {
        let config = ArchiveConfig {
            upload: UploadSection {
                chunk_size_bytes: Some(0),
                comment: None,
            },
            ..ArchiveConfig::default()
        };
        assert_eq!(config.chunk_size_bytes(), DEFAULT_CHUNK_SIZE_BYTES);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[sources\napi_url = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn derive_wiki_url_strips_api_php() {
        assert_eq!(
            derive_wiki_url("https://uk.wikisource.org/w/api.php"),
            Some("https://uk.wikisource.org".to_string())
        );
        assert_eq!(
            derive_wiki_url("https://wiki.example.org/api.php"),
            Some("https://wiki.example.org".to_string())
        );
        assert_eq!(derive_wiki_url("/api.php"), None);
    }
}
