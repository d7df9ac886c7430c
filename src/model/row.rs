//! The editable row that backs one line of an expense table, and the conversions between it and
//! the wire representation.

use crate::formula::resolve_amount;
use crate::model::{ExpenseId, ExpensePayload, ExpenseRecord, ExpenseType};
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// A stable identity for a row. Unsaved rows are known by a client-generated key, persisted rows
/// by their server id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    Local(Uuid),
    Persisted(ExpenseId),
}

/// A single edit to one field of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    Date(Option<NaiveDate>),
    Amount(String),
    MajorCategory(String),
    MinorCategory(String),
    Note(String),
}

impl FieldEdit {
    pub fn is_note(&self) -> bool {
        matches!(self, FieldEdit::Note(_))
    }

    pub fn is_date(&self) -> bool {
        matches!(self, FieldEdit::Date(_))
    }
}

/// One row of an expense table as the user edits it. `amount` is kept as typed, so it may be a
/// digit string, a digit string with separators, or a `=` formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditableRow {
    pub id: Option<ExpenseId>,
    #[serde(skip)]
    local_key: Uuid,
    pub date: Option<NaiveDate>,
    pub amount: String,
    pub major_category: String,
    pub minor_category: String,
    pub note: String,
}

impl EditableRow {
    /// A new, unsaved row dated `today` with every other field empty.
    pub fn blank(today: NaiveDate) -> Self {
        Self {
            id: None,
            local_key: Uuid::new_v4(),
            date: Some(today),
            amount: String::new(),
            major_category: String::new(),
            minor_category: String::new(),
            note: String::new(),
        }
    }

    /// Converts a stored record into its editable form.
    pub fn from_record(record: &ExpenseRecord) -> Self {
        Self {
            id: record.id.clone(),
            local_key: Uuid::new_v4(),
            date: record.date,
            amount: record.amount.map(|a| a.to_string()).unwrap_or_default(),
            major_category: record.major_category.clone().unwrap_or_default(),
            minor_category: record.minor_category.clone().unwrap_or_default(),
            note: record.note.clone(),
        }
    }

    pub fn key(&self) -> RowKey {
        match &self.id {
            Some(id) => RowKey::Persisted(id.clone()),
            None => RowKey::Local(self.local_key),
        }
    }

    /// The client-generated key, which never changes for the life of the row.
    pub fn local_key(&self) -> Uuid {
        self.local_key
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn resolved_amount(&self) -> Option<f64> {
        resolve_amount(&self.amount)
    }

    /// The whole amount that would be stored for this row, i.e. the resolved amount rounded.
    pub fn saved_amount(&self) -> Option<i64> {
        self.resolved_amount().map(|a| a.round() as i64)
    }

    /// A row is save-eligible when it has a date, a resolvable amount and both categories.
    /// A zero amount still counts as resolvable here; callers reject it separately.
    pub fn is_complete(&self) -> bool {
        self.date.is_some()
            && self.resolved_amount().is_some()
            && !self.major_category.is_empty()
            && !self.minor_category.is_empty()
    }

    pub fn apply(&mut self, edit: FieldEdit) {
        match edit {
            FieldEdit::Date(date) => self.date = date,
            FieldEdit::Amount(amount) => self.amount = amount,
            FieldEdit::MajorCategory(major) => self.major_category = major,
            FieldEdit::MinorCategory(minor) => self.minor_category = minor,
            FieldEdit::Note(note) => self.note = note,
        }
    }

    /// Builds the create/update body for this row in the given pane. An unresolvable amount is
    /// sent as `0`; callers are expected to have checked the amount first.
    pub fn to_payload(&self, month: u8, expense_type: ExpenseType) -> ExpensePayload {
        let amount = self.saved_amount().unwrap_or_default();
        ExpensePayload {
            month,
            expense_type,
            date: self.date,
            amount,
            major_category: self.major_category.clone(),
            minor_category: self.minor_category.clone(),
            note: self.note.clone(),
        }
    }

    /// Converts this row back into the record shape held by the parent.
    pub fn to_record(&self, month: u8, expense_type: ExpenseType) -> ExpenseRecord {
        ExpenseRecord {
            id: self.id.clone(),
            month,
            expense_type,
            date: self.date,
            amount: self.saved_amount(),
            major_category: non_empty(&self.major_category),
            minor_category: non_empty(&self.minor_category),
            note: self.note.clone(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
