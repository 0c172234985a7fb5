use std::fmt;

use anyhow::{Result, bail};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shown in place of a date when a record has none, or one we cannot read.
pub const NO_DATE_MARKER: &str = "Sem data";

pub const CURRENCY_SYMBOL: &str = "R$";

pub const MAX_DESCRIPTION_LEN: usize = 200;

/// A raw expense document as kept by the store.
pub type ExpenseDocument = Map<String, Value>;

/// Identity of the signed-in user. Every store path is scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("User id must not be empty");
        }
        if trimmed.contains('/') {
            bail!("Invalid user id '{trimmed}': must not contain '/'");
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Collection path of this user's expenses, e.g. `users/alice/expenses`.
    #[must_use]
    pub fn expenses_path(&self) -> String {
        format!("users/{}/expenses", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `date` field of an expense document.
///
/// Documents written by different clients carry either a plain date/time
/// string or the store's timestamp wrapper (`{"seconds": .., "nanoseconds": ..}`).
/// Anything else is kept as `Unrecognized` and displayed as [`NO_DATE_MARKER`].
///
/// Date/time strings keep the offset they were written with, so the calendar
/// day shown is the writer's day. Timestamps carry no offset and show in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpenseDate {
    Native(DateTime<FixedOffset>),
    Timestamp { seconds: i64, nanoseconds: u32 },
    Unrecognized,
    Missing,
}

impl ExpenseDate {
    #[must_use]
    pub fn from_field(field: Option<&Value>) -> Self {
        match field {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::String(s)) => parse_native(s).map_or(Self::Unrecognized, Self::Native),
            Some(Value::Object(map)) => timestamp_parts(map)
                .map_or(Self::Unrecognized, |(seconds, nanoseconds)| Self::Timestamp {
                    seconds,
                    nanoseconds,
                }),
            Some(_) => Self::Unrecognized,
        }
    }

    /// Timestamp wrapper value for a calendar date, at midnight UTC.
    #[must_use]
    pub fn timestamp_value(date: NaiveDate) -> Value {
        let seconds = date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        serde_json::json!({ "seconds": seconds, "nanoseconds": 0 })
    }

    #[must_use]
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Native(dt) => Some(dt.with_timezone(&Utc)),
            Self::Timestamp {
                seconds,
                nanoseconds,
            } => DateTime::from_timestamp(*seconds, *nanoseconds),
            Self::Unrecognized | Self::Missing => None,
        }
    }

    #[must_use]
    pub fn calendar_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Native(dt) => Some(dt.date_naive()),
            _ => self.to_utc().map(|dt| dt.date_naive()),
        }
    }

    /// Milliseconds since the epoch, used as the store's ordering key.
    #[must_use]
    pub fn sort_key(&self) -> Option<i64> {
        self.to_utc().map(|dt| dt.timestamp_millis())
    }

    #[must_use]
    pub fn display(&self) -> String {
        self.calendar_date().map_or_else(
            || NO_DATE_MARKER.to_string(),
            |d| d.format("%d/%m/%Y").to_string(),
        )
    }
}

fn parse_native(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc().fixed_offset())
}

fn timestamp_parts(map: &Map<String, Value>) -> Option<(i64, u32)> {
    let seconds = map
        .get("seconds")
        .or_else(|| map.get("_seconds"))
        .and_then(Value::as_i64)?;
    let nanoseconds = match map.get("nanoseconds").or_else(|| map.get("_nanoseconds")) {
        None => 0,
        Some(v) => u32::try_from(v.as_u64()?).ok()?,
    };
    if nanoseconds >= 1_000_000_000 {
        return None;
    }
    Some((seconds, nanoseconds))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseRecord {
    pub id: Option<String>,
    pub description: String,
    pub value: Option<f64>,
    pub date: ExpenseDate,
}

impl ExpenseRecord {
    /// Decode a stored document. Never fails: unreadable fields degrade to
    /// an empty description, no value, or an unrecognized date.
    #[must_use]
    pub fn from_document(id: Option<String>, doc: &ExpenseDocument) -> Self {
        let description = doc
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let value = doc
            .get("value")
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite());
        Self {
            id: id.filter(|id| !id.trim().is_empty()),
            description,
            value,
            date: ExpenseDate::from_field(doc.get("date")),
        }
    }

    #[must_use]
    pub fn amount(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

/// One complete, ordered result set delivered by a live subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub records: Vec<ExpenseRecord>,
}

impl Snapshot {
    #[must_use]
    pub fn new(records: Vec<ExpenseRecord>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        total(&self.records)
    }
}

/// Sum of `value` over `records`; absent values count as zero.
#[must_use]
pub fn total(records: &[ExpenseRecord]) -> f64 {
    records.iter().map(ExpenseRecord::amount).sum()
}

#[must_use]
pub fn format_amount(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{CURRENCY_SYMBOL} {rounded:.2}")
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub description: String,
    pub value: f64,
    pub date: NaiveDate,
}

impl NewExpense {
    #[must_use]
    pub fn to_document(&self) -> ExpenseDocument {
        let mut doc = Map::new();
        doc.insert(
            "description".to_string(),
            Value::String(self.description.clone()),
        );
        doc.insert("value".to_string(), serde_json::json!(self.value));
        doc.insert("date".to_string(), ExpenseDate::timestamp_value(self.date));
        doc
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateExpense {
    pub description: Option<String>,
    pub value: Option<f64>,
    pub date: Option<NaiveDate>,
}

impl UpdateExpense {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.value.is_none() && self.date.is_none()
    }

    /// Overwrite the given fields, leaving everything else in the document alone.
    pub fn apply_to(&self, doc: &mut ExpenseDocument) {
        if let Some(ref description) = self.description {
            doc.insert(
                "description".to_string(),
                Value::String(description.clone()),
            );
        }
        if let Some(value) = self.value {
            doc.insert("value".to_string(), serde_json::json!(value));
        }
        if let Some(date) = self.date {
            doc.insert("date".to_string(), ExpenseDate::timestamp_value(date));
        }
    }
}

pub fn validate_description(description: &str) -> Result<String> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        bail!("Description must not be empty");
    }
    if trimmed.chars().count() > MAX_DESCRIPTION_LEN {
        bail!("Description must be at most {MAX_DESCRIPTION_LEN} characters");
    }
    Ok(trimmed.to_string())
}

pub fn validate_value(value: f64) -> Result<f64> {
    if !value.is_finite() {
        bail!("Value must be a finite number");
    }
    Ok(value)
}
