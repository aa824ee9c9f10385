use crate::filename::{FILE_NAMESPACE, ParsedFileName};

pub const FUND_TABLE: &str = r#"{| class="wikitable sortable"
!Опис!!Назва!!Роки!!Справ
|-
|[[/1/]]|| || ||
|}"#;

pub const DESCRIPTION_TABLE: &str = r#"{| class="wikitable sortable"
!№!!Назва!!Роки!!Сторінки
|-
|[[/1/]]|| || ||
|}"#;

pub const ARCHIVE_LIST_TABLE: &str = r#"{| class="wikitable sortable"
!Фонд!!Назва!!Роки!!Описів
|-
|[[/1/]]|| || ||
|}"#;

pub const SOFT_DELETE_TEXT: &str = "{{швидко|видалення сторінки перенаправлення}}";
pub const SOFT_DELETE_SUMMARY: &str = "Видалення сторінки";
pub const FILE_DESCRIPTION_SUMMARY: &str = "Add file description and license";

pub fn fund_page(title: &str, date_range: &str) -> String {
    format!(
        "{{{{Архіви/фонд
  | назва = {title}
  | рік = {date_range}
  | примітки =
}}}}

== Описи ==
{FUND_TABLE}"
    )
}

pub fn description_page(title: &str, date_range: &str) -> String {
    format!(
        "{{{{Архіви/опис
  | назва = {title}
  | рік = {date_range}
  | примітки =
}}}}
== Справи ==
{DESCRIPTION_TABLE}"
    )
}

pub fn case_page(parsed: &ParsedFileName) -> String {
    format!(
        "{{{{Архіви/справа
 | назва = {}
 | рік = {}
 | link_commons = {FILE_NAMESPACE}{}
 | примітки =
}}}}
",
        parsed.title, parsed.date_range, parsed.file_name
    )
}

pub fn file_description(parsed: &ParsedFileName) -> String {
    format!(
        "=={{{{int:filedesc}}}}==
{{{{Information
|description={{{{uk|1={} {}-{} {}}}}}
|date={}
|source={}
|author={}
|permission=
|other versions=
}}}}

=={{{{int:license-header}}}}==
{{{{PD-Ukraine}}}}{{{{PD-scan|PD-old-assumed-expired}}}}",
        parsed.archive_code,
        parsed.fund,
        parsed.description,
        parsed.case_name,
        parsed.date_range,
        parsed.archive_full_name,
        parsed.archive_full_name
    )
}

pub fn fund_page_summary(fund: &str) -> String {
    format!("Створення сторінки фонду {fund}")
}

pub fn description_page_summary(description: &str) -> String {
    format!("Створення сторінки опису {description}")
}

pub fn case_page_summary(case_name: &str) -> String {
    format!("Створення сторінки справи {case_name}")
}
