use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use gastos_core::controller::{ExpenseRow, ViewState};
use gastos_core::models::UserId;

pub(crate) const NOT_SIGNED_IN: &str =
    "Not signed in. Run `gastos account login <user>` or pass --user <user>";

pub(crate) fn require_user(user: Option<UserId>) -> Result<UserId> {
    user.context(NOT_SIGNED_IN)
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" | "hoje" => Ok(Local::now().date_naive()),
            "yesterday" | "ontem" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(&s, "%d/%m/%Y"))
                .with_context(|| {
                    format!("Invalid date '{s}'. Use YYYY-MM-DD, DD/MM/YYYY, or today/yesterday")
                }),
        },
    }
}

/// Parse a 1-based row number as shown in the list table.
pub(crate) fn parse_row_number(s: &str, rows: usize) -> Result<usize> {
    let n: usize = s
        .trim()
        .parse()
        .with_context(|| format!("Invalid row number '{}'", s.trim()))?;
    if n < 1 || n > rows {
        bail!("Row {n} out of range (1-{rows})");
    }
    Ok(n - 1)
}

pub(crate) fn print_expense_table(rows: &[ExpenseRow]) {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Descrição")]
        description: String,
        #[tabled(rename = "Data")]
        date: String,
        #[tabled(rename = "Valor")]
        value: String,
    }

    let table_rows: Vec<Row> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| Row {
            idx: i + 1,
            id: r.id.as_deref().map(|id| truncate(id, 11)).unwrap_or_default(),
            description: truncate(&r.description, 40),
            date: r.date.clone(),
            value: r.value.clone(),
        })
        .collect();

    let table = Table::new(&table_rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_view(view: &ViewState) {
    if view.list.is_empty() {
        println!("No expenses yet. Use `gastos add` to record one.");
    } else {
        print_expense_table(&view.rows());
    }
    println!("Total de Gastos: {}", view.formatted_total());
}

#[derive(Serialize)]
pub(crate) struct ViewJson {
    pub expenses: Vec<ExpenseRow>,
    pub total: f64,
    pub formatted_total: String,
}

impl From<&ViewState> for ViewJson {
    fn from(view: &ViewState) -> Self {
        Self {
            expenses: view.rows(),
            total: view.total,
            formatted_total: view.formatted_total(),
        }
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gastos_core::models::{ExpenseRecord, Snapshot};

    #[test]
    fn test_parse_date_none() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(parse_date(Some("hoje".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date(Some("2024-01-15".to_string())).unwrap(), expected);
        assert_eq!(parse_date(Some("15/01/2024".to_string())).unwrap(), expected);
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_parse_row_number() {
        assert_eq!(parse_row_number("1", 3).unwrap(), 0);
        assert_eq!(parse_row_number(" 3 ", 3).unwrap(), 2);
        assert!(parse_row_number("0", 3).is_err());
        assert!(parse_row_number("4", 3).is_err());
        assert!(parse_row_number("x", 3).is_err());
    }

    #[test]
    fn test_require_user() {
        assert!(require_user(None).is_err());
        let user = UserId::parse("alice").unwrap();
        assert_eq!(require_user(Some(user.clone())).unwrap(), user);
    }

    #[test]
    fn test_view_json() {
        let doc = serde_json::json!({"description": "Café", "value": 4.5})
            .as_object()
            .cloned()
            .unwrap();
        let view = ViewState::from_snapshot(Snapshot::new(vec![ExpenseRecord::from_document(
            Some("a".to_string()),
            &doc,
        )]));
        let json = serde_json::to_value(ViewJson::from(&view)).unwrap();
        assert_eq!(json["formatted_total"], "R$ 4.50");
        assert_eq!(json["expenses"][0]["date"], "Sem data");
        assert_eq!(json["expenses"][0]["id"], "a");
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("boom"), r#"{"error":"boom"}"#);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Pão de queijo e café", 10), "Pão de ...");
        assert_eq!(truncate("Açaí", 10), "Açaí");
    }
}
