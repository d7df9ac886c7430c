//! The canonical expense record as stored remotely, and the payload used to create or update it.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter};

/// Which household ledger an expense belongs to: shared by both members, or one member's own.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseType {
    #[default]
    Both,
    Hodol,
    Doldol,
}

serde_plain::derive_display_from_serialize!(ExpenseType);
serde_plain::derive_fromstr_from_deserialize!(ExpenseType);

impl ExpenseType {
    /// All expense types in tab order.
    pub const ALL: [ExpenseType; 3] = [ExpenseType::Both, ExpenseType::Hodol, ExpenseType::Doldol];

    /// The human-readable label shown for the pane.
    pub fn label(&self) -> &'static str {
        match self {
            ExpenseType::Both => "Hodol & Doldol",
            ExpenseType::Hodol => "Hodol",
            ExpenseType::Doldol => "Doldol",
        }
    }
}

/// The opaque identifier assigned by the remote store on first create.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(String);

impl ExpenseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ExpenseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One expense as it exists in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExpenseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ExpenseId>,
    pub month: u8,
    #[serde(rename = "type")]
    pub expense_type: ExpenseType,
    #[serde(default, deserialize_with = "wire_date")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub major_category: Option<String>,
    #[serde(default)]
    pub minor_category: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub note: String,
}

impl ExpenseRecord {
    /// Builds the record that results from applying `payload` to the expense with `id`.
    pub fn from_payload(id: ExpenseId, payload: &ExpensePayload) -> Self {
        Self {
            id: Some(id),
            month: payload.month,
            expense_type: payload.expense_type,
            date: payload.date,
            amount: Some(payload.amount),
            major_category: Some(payload.major_category.clone()),
            minor_category: Some(payload.minor_category.clone()),
            note: payload.note.clone(),
        }
    }
}

/// The body sent on create and update. Mirrors `ExpenseRecord` without the `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExpensePayload {
    pub month: u8,
    #[serde(rename = "type")]
    pub expense_type: ExpenseType,
    pub date: Option<NaiveDate>,
    pub amount: i64,
    pub major_category: String,
    pub minor_category: String,
    pub note: String,
}

/// Accepts `YYYY-MM-DD`, a full timestamp whose date part comes first, `""` or `null`.
pub(crate) fn wire_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let day = raw.split('T').next().unwrap_or_default().trim();
    if day.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map(Some)
        .map_err(serde::de::Error::custom)
}

pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
