use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Locale;

pub const ENV_USERNAME: &str = "WIKI_BOT_USER";
pub const ENV_PASSWORD: &str = "WIKI_BOT_PASS";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait CredentialStore {
    /// Returns blank credentials when the store holds nothing.
    fn load(&self) -> Result<Credentials>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialStore for EnvCredentials {
    fn load(&self) -> Result<Credentials> {
        Ok(Credentials {
            username: env::var(ENV_USERNAME).unwrap_or_default(),
            password: env::var(ENV_PASSWORD).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    encrypted: bool,
    timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub encrypted: bool,
    pub timestamp: Option<u64>,
}

/// Credentials file with base64-obfuscated fields. Obfuscation only, not
/// encryption.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let stored = StoredCredentials {
            username: encode_field(&credentials.username),
            password: encode_field(&credentials.password),
            encrypted: false,
            timestamp: Some(unix_timestamp_ms()?),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let rendered =
            serde_json::to_string_pretty(&stored).context("failed to serialize credentials")?;
        fs::write(&self.path, rendered)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        info!(path = %self.path.display(), "saved credentials");
        Ok(())
    }

    /// Returns `true` when a file was removed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("failed to remove {}", self.path.display()))?;
        info!(path = %self.path.display(), "cleared credentials");
        Ok(true)
    }

    pub fn storage_info(&self) -> StorageInfo {
        match self.read_stored() {
            Ok(Some(stored)) => StorageInfo {
                path: self.path.clone(),
                exists: true,
                encrypted: stored.encrypted,
                timestamp: stored.timestamp,
            },
            Ok(None) | Err(_) => StorageInfo {
                path: self.path.clone(),
                exists: false,
                encrypted: false,
                timestamp: None,
            },
        }
    }

    fn read_stored(&self) -> Result<Option<StoredCredentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let stored = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(Some(stored))
    }
}

impl CredentialStore for FileCredentials {
    fn load(&self) -> Result<Credentials> {
        let Some(stored) = self.read_stored()? else {
            return Ok(Credentials::default());
        };
        Ok(Credentials {
            username: decode_field(&stored.username)
                .with_context(|| format!("invalid username field in {}", self.path.display()))?,
            password: decode_field(&stored.password)
                .with_context(|| format!("invalid password field in {}", self.path.display()))?,
        })
    }
}

/// Environment first, then the credentials file.
#[derive(Debug, Clone)]
pub struct ChainedCredentials {
    pub env: EnvCredentials,
    pub file: FileCredentials,
}

impl ChainedCredentials {
    pub fn new(file: FileCredentials) -> Self {
        Self {
            env: EnvCredentials,
            file,
        }
    }
}

impl CredentialStore for ChainedCredentials {
    fn load(&self) -> Result<Credentials> {
        let from_env = self.env.load()?;
        if from_env.has_credentials() {
            debug!("using credentials from environment");
            return Ok(from_env);
        }
        self.file.load()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialCheck {
    Valid,
    NotBotAccount,
    MissingFields,
    UsernameTooShort,
    PasswordTooShort,
}

impl CredentialCheck {
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid | Self::NotBotAccount)
    }

    pub fn message(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::Valid, Locale::Uk) => "Облікові дані виглядають коректно",
            (Self::Valid, Locale::En) => "Credentials look valid",
            (Self::NotBotAccount, Locale::Uk) => {
                "Попередження: Схоже, це не бот-акаунт. Переконайтеся, що ви використовуєте облікові дані бота."
            }
            (Self::NotBotAccount, Locale::En) => {
                "Warning: this does not look like a bot account. Make sure you use bot credentials."
            }
            (Self::MissingFields, Locale::Uk) => "Потрібно вказати ім'я користувача та пароль",
            (Self::MissingFields, Locale::En) => "Username and password are required",
            (Self::UsernameTooShort, Locale::Uk) => {
                "Ім'я користувача має містити щонайменше 3 символи"
            }
            (Self::UsernameTooShort, Locale::En) => "Username must be at least 3 characters",
            (Self::PasswordTooShort, Locale::Uk) => "Пароль має містити щонайменше 8 символів",
            (Self::PasswordTooShort, Locale::En) => "Password must be at least 8 characters",
        }
    }
}

pub fn validate_credentials(credentials: &Credentials) -> CredentialCheck {
    if credentials.username.is_empty() || credentials.password.is_empty() {
        return CredentialCheck::MissingFields;
    }
    if credentials.username.chars().count() < 3 {
        return CredentialCheck::UsernameTooShort;
    }
    if credentials.password.chars().count() < 8 {
        return CredentialCheck::PasswordTooShort;
    }
    // Bot passwords look like `Account@BotName`.
    if !credentials.username.contains('@') && !credentials.username.to_lowercase().contains("bot")
    {
        return CredentialCheck::NotBotAccount;
    }
    CredentialCheck::Valid
}

fn encode_field(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        STANDARD.encode(value.as_bytes())
    }
}

fn decode_field(value: &str) -> Result<String> {
    if value.is_empty() {
        return Ok(String::new());
    }
    let bytes = STANDARD.decode(value).context("field is not valid base64")?;
    String::from_utf8(bytes).context("field is not valid UTF-8")
}

fn unix_timestamp_ms() -> Result<u64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")?;
    Ok(duration.as_millis() as u64)
}
