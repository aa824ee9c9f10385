use std::str::FromStr;

use anyhow::bail;
use serde::Serialize;

use crate::filename::FileNameError;
use crate::mediawiki::{ApiError, LoginError, MissingPageError};
use crate::pages::TableIntegrityError;
use crate::publish::PublishError;
use crate::table::TableError;
use crate::upload::UploadError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Uk,
    En,
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uk" | "ua" => Ok(Self::Uk),
            "en" => Ok(Self::En),
            other => bail!("unsupported locale: {other} (expected uk or en)"),
        }
    }
}

/// Coarse failure category used for presentation and batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidFileName,
    FileNotFound,
    MissingCredentials,
    Authentication,
    TableIntegrity,
    UploadProtocol,
    RemoteApi,
    Network,
    Other,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidFileName => "invalid_file_name",
            Self::FileNotFound => "file_not_found",
            Self::MissingCredentials => "missing_credentials",
            Self::Authentication => "authentication",
            Self::TableIntegrity => "table_integrity",
            Self::UploadProtocol => "upload_protocol",
            Self::RemoteApi => "remote_api",
            Self::Network => "network",
            Self::Other => "other",
        }
    }

    pub fn message(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::InvalidFileName, Locale::Uk) => {
                "Не вдалося проаналізувати назву файлу. Будь ласка, переконайтеся, що назва файлу відповідає необхідному формату."
            }
            (Self::InvalidFileName, Locale::En) => {
                "The file name does not match the expected format."
            }
            (Self::FileNotFound, Locale::Uk) => "Файл не знайдено",
            (Self::FileNotFound, Locale::En) => "File not found",
            (Self::MissingCredentials, Locale::Uk) => {
                "Облікові дані відсутні! Будь ласка, налаштуйте свої облікові дані Вікімедіа-бота в налаштуваннях програми."
            }
            (Self::MissingCredentials, Locale::En) => {
                "Credentials are missing! Configure your Wikimedia bot credentials first."
            }
            (Self::Authentication, Locale::Uk) => {
                "Не вдалося увійти до вікі. Перевірте облікові дані бота."
            }
            (Self::Authentication, Locale::En) => {
                "Login to the wiki failed. Check the bot credentials."
            }
            (Self::TableIntegrity, Locale::Uk) => {
                "Таблицю на сторінці неможливо розібрати. Виправте сторінку вручну та повторіть спробу."
            }
            (Self::TableIntegrity, Locale::En) => {
                "A navigation table could not be parsed. Repair the page by hand and try again."
            }
            (Self::UploadProtocol, Locale::Uk) => "Вікісховище відхилило завантаження файлу.",
            (Self::UploadProtocol, Locale::En) => "The media wiki rejected the file upload.",
            (Self::RemoteApi, Locale::Uk) => "Вікі повернула помилку.",
            (Self::RemoteApi, Locale::En) => "The wiki API returned an error.",
            (Self::Network, Locale::Uk) => "Помилка мережі під час звернення до вікі.",
            (Self::Network, Locale::En) => "Network error while talking to the wiki.",
            (Self::Other, Locale::Uk) => "Невідома помилка",
            (Self::Other, Locale::En) => "Unknown error occurred",
        }
    }
}

/// Walks the error chain and returns the first recognised category.
pub fn classify(error: &anyhow::Error) -> ErrorKind {
    for cause in error.chain() {
        if cause.is::<FileNameError>() {
            return ErrorKind::InvalidFileName;
        }
        if let Some(publish) = cause.downcast_ref::<PublishError>() {
            return match publish {
                PublishError::MissingCredentials => ErrorKind::MissingCredentials,
                PublishError::FileNotFound { .. } => ErrorKind::FileNotFound,
            };
        }
        if cause.is::<LoginError>() {
            return ErrorKind::Authentication;
        }
        if cause.is::<TableIntegrityError>() || cause.is::<TableError>() {
            return ErrorKind::TableIntegrity;
        }
        if cause.is::<UploadError>() {
            return ErrorKind::UploadProtocol;
        }
        if cause.is::<ApiError>() || cause.is::<MissingPageError>() {
            return ErrorKind::RemoteApi;
        }
        if cause.is::<reqwest::Error>() {
            return ErrorKind::Network;
        }
    }
    ErrorKind::Other
}
