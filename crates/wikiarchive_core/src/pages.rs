use anyhow::Result;
use thiserror::Error;
use tracing::{error, info};

use crate::filename::{PageTitles, ParsedFileName};
use crate::mediawiki::{EditOutcome, WikiPageApi};
use crate::table::{RowFields, TableChange, TableError, upsert_into_page};
use crate::templates;

/// A navigation table on an existing page could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("navigation table on page {page} is broken: {source}")]
pub struct TableIntegrityError {
    pub page: String,
    pub source: TableError,
}

/// Creates `title` when it is missing. Existing pages are never touched.
/// Returns `true` when the page was created.
pub fn ensure_page<A: WikiPageApi>(
    api: &mut A,
    title: &str,
    text: &str,
    summary: &str,
) -> Result<bool> {
    let page = api.read_page(title)?;
    if !page.missing() {
        return Ok(false);
    }
    api.create_page(title, text, summary)?;
    info!(page = title, "created page");
    Ok(true)
}

pub fn ensure_fund_page<A: WikiPageApi>(
    api: &mut A,
    titles: &PageTitles,
    parsed: &ParsedFileName,
) -> Result<bool> {
    ensure_page(
        api,
        &titles.fund_page,
        &templates::fund_page(&parsed.title, &parsed.date_range),
        &templates::fund_page_summary(&parsed.fund),
    )
}

pub fn ensure_description_page<A: WikiPageApi>(
    api: &mut A,
    titles: &PageTitles,
    parsed: &ParsedFileName,
) -> Result<bool> {
    // Description pages start with blank fields; editors fill them in later.
    ensure_page(
        api,
        &titles.description_page,
        &templates::description_page("", ""),
        &templates::description_page_summary(&parsed.description),
    )
}

pub fn ensure_case_page<A: WikiPageApi>(
    api: &mut A,
    titles: &PageTitles,
    parsed: &ParsedFileName,
) -> Result<bool> {
    ensure_page(
        api,
        &titles.case_page,
        &templates::case_page(parsed),
        &templates::case_page_summary(&parsed.case_name),
    )
}

/// Adds `child` to the navigation table of `parent`, saving a minor edit
/// only when the page text changes.
pub fn upsert_child_into_parent<A: WikiPageApi>(
    api: &mut A,
    parent: &str,
    child: &str,
    fallback: Option<&str>,
    fields: &RowFields<'_>,
) -> Result<TableChange> {
    let mut change = TableChange::Unchanged;
    api.edit_page(parent, |content| {
        let update = upsert_into_page(content, child, fallback, fields).map_err(|source| {
            error!(page = parent, content, %source, "failed to parse navigation table");
            TableIntegrityError {
                page: parent.to_string(),
                source,
            }
        })?;
        change = update.change;
        Ok(match update.change.summary() {
            None => EditOutcome::NoChange,
            Some(summary) => EditOutcome::Save {
                text: update.text,
                summary: summary.to_string(),
                minor: true,
            },
        })
    })?;
    Ok(change)
}

pub fn upsert_fund_into_archive<A: WikiPageApi>(
    api: &mut A,
    titles: &PageTitles,
    parsed: &ParsedFileName,
) -> Result<TableChange> {
    upsert_child_into_parent(
        api,
        &titles.archive_list_page,
        &parsed.fund,
        Some(templates::ARCHIVE_LIST_TABLE),
        &RowFields::default(),
    )
}

pub fn upsert_description_into_fund<A: WikiPageApi>(
    api: &mut A,
    titles: &PageTitles,
    parsed: &ParsedFileName,
) -> Result<TableChange> {
    upsert_child_into_parent(
        api,
        &titles.fund_page,
        &parsed.description,
        Some(templates::FUND_TABLE),
        &RowFields::default(),
    )
}

pub fn upsert_case_into_description<A: WikiPageApi>(
    api: &mut A,
    titles: &PageTitles,
    parsed: &ParsedFileName,
) -> Result<TableChange> {
    upsert_child_into_parent(
        api,
        &titles.description_page,
        &parsed.case_name,
        Some(templates::DESCRIPTION_TABLE),
        &RowFields {
            title: Some(&parsed.title),
            date_range: Some(&parsed.date_range),
        },
    )
}

/// Replaces the page body with a speedy-deletion request. The bot account
/// has no delete right, so this is the closest it can get to a deletion.
pub fn soft_delete_page<A: WikiPageApi>(api: &mut A, title: &str) -> Result<bool> {
    let saved = api.edit_page(title, |content| {
        if content.trim() == templates::SOFT_DELETE_TEXT {
            return Ok(EditOutcome::NoChange);
        }
        Ok(EditOutcome::Save {
            text: templates::SOFT_DELETE_TEXT.to_string(),
            summary: templates::SOFT_DELETE_SUMMARY.to_string(),
            minor: true,
        })
    })?;
    if saved {
        info!(page = title, "requested page deletion");
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, classify};
    use crate::filename::parse_file_name;
    use crate::mediawiki::{MissingPageError, SaveMode};
    use crate::testing::MockWiki;

    const ARCHIVE_LIST: &str = "Перелік фондів.\n{| class=\"wikitable sortable\"\n!Фонд!!Назва!!Роки!!Описів\n|-\n|[[/Р2/]]|| Друга || ||\n|}\n";

    fn parsed() -> ParsedFileName {
        parse_file_name("ЦДАВО Р1-2-3. 1920. Протокол засідання.pdf").expect("parse")
    }

    #[test]
    fn ensure_page_creates_only_missing_pages() {
        let parsed = parsed();
        let titles = parsed.page_titles();
        let mut wiki = MockWiki::default();
        wiki.insert_page(&titles.description_page, "hand-written");

        assert!(ensure_fund_page(&mut wiki, &titles, &parsed).expect("fund"));
        assert!(!ensure_description_page(&mut wiki, &titles, &parsed).expect("description"));
        assert!(ensure_case_page(&mut wiki, &titles, &parsed).expect("case"));

        assert_eq!(wiki.created, vec![titles.fund_page.clone(), titles.case_page.clone()]);
        assert_eq!(wiki.page(&titles.description_page), Some("hand-written"));
        assert!(
            wiki.page(&titles.case_page)
                .expect("case page")
                .contains("link_commons = File:ЦДАВО Р1-2-3. 1920. Протокол засідання.pdf")
        );
        assert!(
            wiki.saves
                .iter()
                .all(|save| save.mode == SaveMode::CreateOnly && !save.minor)
        );
        assert_eq!(wiki.saves[0].summary, "Створення сторінки фонду Р1");
    }

    #[test]
    fn fund_row_goes_to_suffixed_archive_list() {
        let parsed = parsed();
        let titles = parsed.page_titles();
        assert_eq!(titles.archive_list_page, "Архів:ЦДАВО/Р");
        let mut wiki = MockWiki::default();
        wiki.insert_page(&titles.archive_list_page, ARCHIVE_LIST);

        let change = upsert_fund_into_archive(&mut wiki, &titles, &parsed).expect("upsert");
        assert_eq!(change, TableChange::RowAdded);
        let text = wiki.page(&titles.archive_list_page).expect("page");
        let first = text.find("[[/Р1/]]").expect("new row");
        let second = text.find("[[/Р2/]]").expect("old row");
        assert!(first < second);
        assert!(text.starts_with("Перелік фондів.\n"));

        let save = wiki.saves.last().expect("save");
        assert!(save.minor);
        assert_eq!(
            save.summary,
            "Додано новий елемент до таблиці та відформатовано."
        );
        assert!(matches!(save.mode, SaveMode::UpdateExisting { .. }));

        let saves = wiki.saves.len();
        let change = upsert_fund_into_archive(&mut wiki, &titles, &parsed).expect("upsert");
        assert_eq!(change, TableChange::Unchanged);
        assert_eq!(wiki.saves.len(), saves);
    }

    #[test]
    fn case_row_carries_title_and_years() {
        let parsed = parsed();
        let titles = parsed.page_titles();
        let mut wiki = MockWiki::default();
        wiki.insert_page(&titles.description_page, &templates::description_page("", ""));

        let change = upsert_case_into_description(&mut wiki, &titles, &parsed).expect("upsert");
        assert_eq!(change, TableChange::RowAdded);
        let text = wiki.page(&titles.description_page).expect("page");
        assert!(text.contains("| [[/3/]] || Протокол засідання || 1920 || "));
    }

    #[test]
    fn skeleton_placeholder_row_is_kept_next_to_new_child() {
        let parsed = parsed();
        let titles = parsed.page_titles();
        let mut wiki = MockWiki::default();
        wiki.insert_page(&titles.fund_page, &templates::fund_page("", ""));

        upsert_description_into_fund(&mut wiki, &titles, &parsed).expect("upsert");
        let text = wiki.page(&titles.fund_page).expect("page");
        assert!(text.contains("| [[/1/]] ||  ||  || \n|-\n| [[/2/]] ||  ||  || "));
    }

    #[test]
    fn broken_table_is_reported_with_page_title() {
        let parsed = parsed();
        let titles = parsed.page_titles();
        let mut wiki = MockWiki::default();
        wiki.insert_page(&titles.fund_page, "no table at all");

        let error = upsert_description_into_fund(&mut wiki, &titles, &parsed).expect_err("fail");
        let integrity = error
            .downcast_ref::<TableIntegrityError>()
            .expect("integrity error");
        assert_eq!(integrity.page, "Архів:ЦДАВО/Р1");
        assert_eq!(integrity.source, TableError::MissingTable);
        assert_eq!(classify(&error), ErrorKind::TableIntegrity);
        assert!(wiki.saves.is_empty());
    }

    #[test]
    fn missing_parent_page_is_not_created() {
        let parsed = parsed();
        let titles = parsed.page_titles();
        let mut wiki = MockWiki::default();
        let error = upsert_fund_into_archive(&mut wiki, &titles, &parsed).expect_err("fail");
        assert!(error.downcast_ref::<MissingPageError>().is_some());
        assert!(wiki.page(&titles.archive_list_page).is_none());
    }

    #[test]
    fn soft_delete_replaces_body_once() {
        let mut wiki = MockWiki::default();
        wiki.insert_page("Архів:ДАДнО/Р-6508/4/501", "#REDIRECT [[Десь]]");

        assert!(soft_delete_page(&mut wiki, "Архів:ДАДнО/Р-6508/4/501").expect("delete"));
        assert_eq!(
            wiki.page("Архів:ДАДнО/Р-6508/4/501"),
            Some(templates::SOFT_DELETE_TEXT)
        );
        let save = wiki.saves.last().expect("save");
        assert_eq!(save.summary, "Видалення сторінки");
        assert!(save.minor);

        assert!(!soft_delete_page(&mut wiki, "Архів:ДАДнО/Р-6508/4/501").expect("again"));
    }
}
