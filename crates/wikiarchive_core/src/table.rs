use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{NoExpand, Regex};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub const TABLE_START: &str = "{| class=\"wikitable";
pub const TABLE_END: &str = "|}";
const LINK_MARKER: &str = "[[";
const RENDERED_TABLE_START: &str = "{| class=\"wikitable sortable\"";

pub const TITLE_COLUMN: &str = "Назва";
pub const DATE_COLUMNS: &[&str] = &["Рік", "Роки", "Дата"];

static LOOSE_TABLE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{\|\s*class="wikitable"#).expect("table start pattern"));
static TRAILING_ROW_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|-\s*$").expect("row separator pattern"));
static FRONT_MATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\{\|.*$(?:(?:\n\|-)?\n\|\+.*$)?(?:\n\|-)?").expect("front matter pattern")
});
static CLOSING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\|\}$").expect("closing line pattern"));
static ROW_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\|-").expect("row separator pattern"));
static CELL_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\|").expect("cell start pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("page contains no `{{| class=\"wikitable` table")]
    MissingTable,
    #[error("wikitable is not terminated by `|}}`")]
    Unterminated,
    #[error("wikitable has no `!` header row")]
    MissingHeader,
    #[error("wikitable block is malformed: {0}")]
    Malformed(String),
    #[error("wikitable has no rows and no fallback table is available")]
    NoRows,
    #[error("wikitable has no column containing a `[[` link")]
    NoLinkColumn,
}

/// The first wikitable of a page: `raw` exactly as it appears in the page,
/// `normalized` with the trailing row separator dropped and a `!`-delimited
/// header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    pub raw: String,
    pub normalized: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WikiTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl WikiTable {
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.rows
            .get(row)
            .and_then(|cells| cells.get(index))
            .map(String::as_str)
    }

    /// Index of the first column whose cell in the first row holds a link.
    pub fn link_column(&self) -> Option<usize> {
        self.rows
            .first()?
            .iter()
            .position(|cell| cell.contains(LINK_MARKER))
    }

    pub fn child_identifiers(&self) -> Vec<String> {
        let Some(link) = self.link_column() else {
            return Vec::new();
        };
        self.rows
            .iter()
            .map(|row| child_identifier(row.get(link).map(String::as_str).unwrap_or("")).to_string())
            .collect()
    }
}

/// Values for the named columns of a newly inserted row.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowFields<'a> {
    pub title: Option<&'a str>,
    pub date_range: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpsert {
    pub table: WikiTable,
    pub row_count_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableChange {
    Unchanged,
    Reformatted,
    RowAdded,
}

impl TableChange {
    pub fn summary(self) -> Option<&'static str> {
        match self {
            Self::Unchanged => None,
            Self::Reformatted => Some("Відформатовано таблицю."),
            Self::RowAdded => Some("Додано новий елемент до таблиці та відформатовано."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTableUpdate {
    pub text: String,
    pub change: TableChange,
}

pub fn normalize_table_start(body: &str) -> Cow<'_, str> {
    LOOSE_TABLE_START.replace(body, NoExpand(TABLE_START))
}

pub fn extract_table(body: &str) -> Result<TableBlock, TableError> {
    let start = body.find(TABLE_START).ok_or(TableError::MissingTable)?;
    let after = &body[start + TABLE_START.len()..];
    let end = after.find(TABLE_END).ok_or(TableError::Unterminated)?;
    let inner = &after[..end];

    let raw = format!("{TABLE_START}{inner}{TABLE_END}");
    let trimmed = TRAILING_ROW_SEPARATOR.replace(inner, "");
    let table = format!("{TABLE_START}{trimmed}{TABLE_END}");

    let header_start = table.find("\n!").ok_or(TableError::MissingHeader)? + 2;
    let header_end = table[header_start..]
        .find('\n')
        .map(|offset| header_start + offset)
        .unwrap_or(table.len());
    let header = table[header_start..header_end].replace('|', "!");
    let normalized = format!(
        "{}{}{}",
        &table[..header_start],
        header,
        &table[header_end..]
    );

    Ok(TableBlock { raw, normalized })
}

pub fn parse_rows(block: &str) -> Result<WikiTable, TableError> {
    let text = block.trim();
    if !text.starts_with("{|") || !text.ends_with(TABLE_END) {
        return Err(TableError::Malformed(
            "expected the block to start with `{|` and end with `|}`".to_string(),
        ));
    }
    let text = FRONT_MATTER.replace(text, "");
    let text = CLOSING_LINE.replace(&text, "");

    let mut sections = ROW_SEPARATOR.split(&text).map(str::trim);
    let header = sections.next().unwrap_or("");
    if !header.starts_with('!') {
        return Err(TableError::MissingHeader);
    }

    let mut columns = header
        .lines()
        .map(|line| line.strip_prefix('!').unwrap_or(line))
        .collect::<Vec<_>>();
    if columns.len() == 1 {
        columns = columns[0].split("!!").collect();
    }
    let columns = columns.into_iter().map(cell_data).collect::<Vec<_>>();
    if columns.iter().all(String::is_empty) {
        return Err(TableError::Malformed("header row has no column names".to_string()));
    }

    let mut rows = Vec::new();
    for section in sections {
        if section.is_empty() {
            continue;
        }
        let mut cells = CELL_START.split(section).skip(1).collect::<Vec<_>>();
        if cells.len() == 1 {
            let line = cells[0].strip_prefix('|').unwrap_or(cells[0]);
            cells = line.split("||").collect();
        }
        let cells = cells.into_iter().map(cell_data).collect::<Vec<_>>();
        rows.push(
            (0..columns.len())
                .map(|index| cells.get(index).cloned().unwrap_or_default())
                .collect(),
        );
    }

    Ok(WikiTable { columns, rows })
}

pub fn render(table: &WikiTable) -> String {
    if table.rows.is_empty() {
        return String::new();
    }
    let mut lines = Vec::with_capacity(table.rows.len() * 2 + 3);
    lines.push(RENDERED_TABLE_START.to_string());
    lines.push(format!("! {}", table.columns.join(" !! ")));
    for row in &table.rows {
        let cells = (0..table.columns.len())
            .map(|index| row.get(index).map(String::as_str).unwrap_or(""))
            .collect::<Vec<_>>();
        lines.push("|-".to_string());
        lines.push(format!("| {}", cells.join(" || ")));
    }
    lines.push(TABLE_END.to_string());
    lines.join("\n")
}

/// Inserts a row for `child` or merges it into the row already listing it,
/// then orders rows by the first number in their child identifier.
pub fn upsert_row(
    table: &WikiTable,
    child: &str,
    fields: &RowFields<'_>,
) -> Result<RowUpsert, TableError> {
    if table.rows.is_empty() {
        return Err(TableError::NoRows);
    }
    let link = table.link_column().ok_or(TableError::NoLinkColumn)?;
    let new_row = build_row(table, link, child, fields);
    let key = child_identifier(&new_row[link]).to_string();

    let mut seen = BTreeSet::new();
    let mut merged = false;
    let mut rows = Vec::with_capacity(table.rows.len() + 1);
    for row in &table.rows {
        let identifier = child_identifier(row.get(link).map(String::as_str).unwrap_or(""));
        if !seen.insert(identifier.to_string()) {
            continue;
        }
        if identifier == key {
            rows.push(merge_row(row, &new_row, link));
            merged = true;
        } else {
            rows.push(row.clone());
        }
    }
    if !merged {
        rows.push(new_row);
    }
    rows.sort_by_key(|row| numeric_key(child_identifier(&row[link])));

    Ok(RowUpsert {
        row_count_changed: rows.len() != table.rows.len(),
        table: WikiTable {
            columns: table.columns.clone(),
            rows,
        },
    })
}

/// Runs extract, parse, upsert and render against a page body. When the
/// page table has no rows, `fallback` replaces it once before retrying.
pub fn upsert_into_page(
    body: &str,
    child: &str,
    fallback: Option<&str>,
    fields: &RowFields<'_>,
) -> Result<PageTableUpdate, TableError> {
    let (text, row_count_changed) = rewrite_table(body, child, fallback, fields)?;
    let change = if text == body {
        info!(child, "table is already up to date");
        TableChange::Unchanged
    } else if row_count_changed {
        info!(child, "added new item to table");
        TableChange::RowAdded
    } else {
        info!(child, "reformatted table");
        TableChange::Reformatted
    };
    Ok(PageTableUpdate { text, change })
}

fn rewrite_table(
    body: &str,
    child: &str,
    fallback: Option<&str>,
    fields: &RowFields<'_>,
) -> Result<(String, bool), TableError> {
    let content = normalize_table_start(body);
    let block = extract_table(&content)?;
    let table = parse_rows(&block.normalized)?;

    if table.rows.is_empty() {
        return match fallback {
            Some(fallback) => {
                warn!(child, "no rows found in the table, using fallback table");
                let replaced = content.replacen(&block.raw, fallback, 1);
                rewrite_table(&replaced, child, None, fields)
            }
            None => Err(TableError::NoRows),
        };
    }

    let upsert = upsert_row(&table, child, fields)?;
    let rendered = render(&upsert.table);
    Ok((
        content.replacen(&block.raw, &rendered, 1),
        upsert.row_count_changed,
    ))
}

/// Middle segment of a `prefix/<child>/suffix` link cell.
pub fn child_identifier(link_cell: &str) -> &str {
    link_cell.split('/').nth(1).unwrap_or("").trim()
}

fn build_row(table: &WikiTable, link: usize, child: &str, fields: &RowFields<'_>) -> Vec<String> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            if index == link {
                let template = &table.rows[0][link];
                let mut segments = template.split('/');
                let prefix = segments.next().unwrap_or("");
                let suffix = segments.nth(1).unwrap_or("");
                format!("{prefix}/{child}/{suffix}")
            } else if column == TITLE_COLUMN {
                fields.title.unwrap_or("").to_string()
            } else if DATE_COLUMNS.contains(&column.as_str()) {
                fields.date_range.unwrap_or("").to_string()
            } else {
                String::new()
            }
        })
        .collect()
}

// Existing cells win unless the new row supplies a value; the link cell is kept.
fn merge_row(existing: &[String], incoming: &[String], link: usize) -> Vec<String> {
    existing
        .iter()
        .zip(incoming)
        .enumerate()
        .map(|(index, (current, new))| {
            if index != link && !new.is_empty() {
                new.clone()
            } else {
                current.clone()
            }
        })
        .collect()
}

fn numeric_key(identifier: &str) -> u64 {
    let digits = identifier
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect::<String>();
    if digits.is_empty() {
        0
    } else {
        digits.parse().unwrap_or(u64::MAX)
    }
}

// Content of a cell after its attribute section (`attrs | value`), ignoring
// pipes nested in links and templates.
fn cell_data(cell: &str) -> String {
    let bytes = cell.as_bytes();
    let (mut templates, mut links) = (0i32, 0i32);
    let mut index = 0;
    let mut pipe = None;
    while index < bytes.len() {
        let pair = (bytes[index], bytes.get(index + 1).copied());
        match pair {
            (b'{', Some(b'{')) => {
                templates += 1;
                index += 1;
            }
            (b'[', Some(b'[')) => {
                links += 1;
                index += 1;
            }
            (b'}', Some(b'}')) => {
                templates -= 1;
                index += 1;
            }
            (b']', Some(b']')) => {
                links -= 1;
                index += 1;
            }
            (b'|', _) if templates == 0 && links == 0 => {
                pipe = Some(index);
                break;
            }
            _ => {}
        }
        index += 1;
    }
    match pipe {
        Some(position) => cell[position + 1..].trim().to_string(),
        None => cell.trim().to_string(),
    }
}
