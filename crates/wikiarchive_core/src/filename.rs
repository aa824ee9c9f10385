use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub const ARCHIVE_NAMESPACE: &str = "Архів:";
pub const FILE_NAMESPACE: &str = "File:";

/// Archive codes accepted in file names, with the display name used on
/// file description pages.
pub const ARCHIVES: &[(&str, &str)] = &[
    (
        "ЦДАВО",
        "Центральний державний архів вищих органів влади та управління України",
    ),
    (
        "ЦДІАК",
        "Центральний державний історичний архів України, м. Київ",
    ),
    (
        "ЦДІАЛ",
        "Центральний державний історичний архів України, м. Львів",
    ),
    (
        "ЦДАГО",
        "Центральний державний архів громадських об'єднань та україніки",
    ),
    (
        "ЦДКФФА",
        "Центральний державний кінофотофоноархів України імені Г. С. Пшеничного",
    ),
    (
        "ЦДАМЛМ",
        "Центральний державний архів-музей літератури і мистецтва України",
    ),
    (
        "ЦДНТА",
        "Центральний державний науково-технічний архів України",
    ),
    ("ЦДЕА", "Центральний державний електронний архів України"),
    ("ДААРК", "Державний архів в Автономній Республіці Крим"),
    ("ДАВіО", "Державний архів Вінницької області"),
    ("ДАВО", "Державний архів Волинської області"),
    ("ДАДнО", "Державний архів Дніпропетровської області"),
    ("ДАДО", "Державний архів Донецької області"),
    ("ДАЖО", "Державний архів Житомирської області"),
    ("ДАЗкО", "Державний архів Закарпатської області"),
    ("ДАЗО", "Державний архів Запорізької області"),
    ("ДАІФО", "Державний архів Івано-Франківської області"),
    ("ДАКО", "Державний архів Київської області"),
    ("ДАКрО", "Державний архів Кіровоградської області"),
    ("ДАЛуО", "Державний архів Луганської області"),
    ("ДАЛО", "Державний архів Львівської області"),
    ("ДАМО", "Державний архів Миколаївської області"),
    ("ДАОО", "Державний архів Одеської області"),
    ("ДАПО", "Державний архів Полтавської області"),
    ("ДАРО", "Державний архів Рівненської області"),
    ("ДАСО", "Державний архів Сумської області"),
    ("ДАТО", "Державний архів Тернопільської області"),
    ("ДАХО", "Державний архів Харківської області"),
    ("ДАХеО", "Державний архів Херсонської області"),
    ("ДАХмО", "Державний архів Хмельницької області"),
    ("ДАЧкО", "Державний архів Черкаської області"),
    ("ДАЧвО", "Державний архів Чернівецької області"),
    ("ДАЧО", "Державний архів Чернігівської області"),
    ("ДАК", "Державний архів міста Києва"),
    ("ДАС", "Державний архів міста Севастополя"),
];

// <archive> <fund>-<description>-<case>. <year[-year]>. <title>[.<ext>]
static FILE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<archive>\p{Cyrillic}+) ",
        r"(?P<fund>\p{Cyrillic}?[0-9][\p{Cyrillic}0-9]*)-",
        r"(?P<description>\p{Cyrillic}?[0-9][\p{Cyrillic}0-9]*)-",
        r"(?P<case>\p{Cyrillic}?[0-9][\p{Cyrillic}0-9]*)\. ",
        r"(?P<start>[0-9]{4})(?:-(?P<end>[0-9]{4}))?\. ",
        r"(?P<title>[^.\s].*?)(?:\.[A-Za-z][A-Za-z0-9]{0,4})?$",
    ))
    .expect("file name pattern must compile")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "file name \"{file_name}\" does not match the expected format \
     `<archive> <fund>-<description>-<case>. <year[-year]>. <title>.<ext>`"
)]
pub struct FileNameError {
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFileName {
    pub archive_code: String,
    pub archive_full_name: String,
    pub fund: String,
    pub description: String,
    pub case_name: String,
    pub date_range: String,
    pub title: String,
    pub file_name: String,
}

/// Titles of the four hierarchy pages derived from a parsed file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageTitles {
    pub archive_page: String,
    pub archive_list_page: String,
    pub fund_page: String,
    pub description_page: String,
    pub case_page: String,
}

impl ParsedFileName {
    pub fn page_titles(&self) -> PageTitles {
        let archive_page = format!("{ARCHIVE_NAMESPACE}{}", self.archive_code);
        let archive_list_page = archive_list_page(&archive_page, &self.fund);
        let fund_page = format!("{archive_page}/{}", self.fund);
        let description_page = format!("{fund_page}/{}", self.description);
        let case_page = format!("{description_page}/{}", self.case_name);
        PageTitles {
            archive_page,
            archive_list_page,
            fund_page,
            description_page,
            case_page,
        }
    }

    pub fn file_page(&self) -> String {
        format!("{FILE_NAMESPACE}{}", self.file_name)
    }
}

/// Page that lists the funds of an archive. Large archives keep separate
/// lists for Soviet-era (`Р`), party (`П`) and pre-1917 (`Д`) funds; central
/// archives keep a single list.
pub fn archive_list_page(archive_page: &str, fund: &str) -> String {
    if fund.starts_with('Р') {
        format!("{archive_page}/Р")
    } else if fund.starts_with('П') {
        format!("{archive_page}/П")
    } else if archive_page.contains(":ЦД") {
        archive_page.to_string()
    } else {
        format!("{archive_page}/Д")
    }
}

pub fn archive_full_name(code: &str) -> Option<&'static str> {
    ARCHIVES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, full_name)| *full_name)
}

pub fn parse_file_name(file_name: &str) -> Result<ParsedFileName, FileNameError> {
    let reject = |reason: &str| {
        debug!(file_name, reason, "file name rejected");
        FileNameError {
            file_name: file_name.to_string(),
        }
    };

    let captures = FILE_NAME_PATTERN
        .captures(file_name)
        .ok_or_else(|| reject("pattern mismatch"))?;
    let group = |name: &str| {
        captures
            .name(name)
            .map(|value| value.as_str().trim())
            .unwrap_or("")
    };

    let archive_code = group("archive");
    let archive_full_name =
        archive_full_name(archive_code).ok_or_else(|| reject("unknown archive code"))?;

    let start = group("start");
    let end = group("end");
    let date_range = if end.is_empty() {
        start.to_string()
    } else if start == end {
        return Err(reject("year range starts and ends in the same year"));
    } else {
        format!("{start}-{end}")
    };

    let (fund, description, case_name, title) = (
        group("fund"),
        group("description"),
        group("case"),
        group("title"),
    );
    if [fund, description, case_name, title]
        .iter()
        .any(|value| value.is_empty())
    {
        return Err(reject("empty field"));
    }

    Ok(ParsedFileName {
        archive_code: archive_code.to_string(),
        archive_full_name: archive_full_name.to_string(),
        fund: fund.to_string(),
        description: description.to_string(),
        case_name: case_name.to_string(),
        date_range,
        title: title.to_string(),
        file_name: file_name.to_string(),
    })
}

pub fn parse_file_path(path: &Path) -> Result<ParsedFileName, FileNameError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    parse_file_name(&file_name)
}

#[derive(Debug, Clone, Default)]
pub struct FileNameParts {
    pub archive: String,
    pub fund: String,
    pub description: String,
    pub case_name: String,
    pub years: String,
    pub title: String,
    pub extension: Option<String>,
}

/// Builds a file name from its parts and checks that it parses back.
pub fn compose_file_name(parts: &FileNameParts) -> Result<String, FileNameError> {
    let mut file_name = format!(
        "{} {}-{}-{}. {}. {}",
        parts.archive.trim(),
        parts.fund.trim(),
        parts.description.trim(),
        parts.case_name.trim(),
        parts.years.trim(),
        parts.title.trim()
    );
    if let Some(extension) = parts.extension.as_deref().map(str::trim)
        && !extension.is_empty()
    {
        file_name.push('.');
        file_name.push_str(extension.trim_start_matches('.'));
    }
    parse_file_name(&file_name)?;
    Ok(file_name)
}
