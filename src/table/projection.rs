//! Display ordering for an expense table and the targets a row can be moved to.
//!
//! Sorting by amount never touches the stored row order. Instead each displayed row is paired
//! with its index in storage so edits and deletes still reach the right row.

use crate::model::{EditableRow, ExpenseRecord, ExpenseType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How a table is displayed. Cycled in declaration order by a single control.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortMode {
    #[default]
    #[serde(rename = "date")]
    ByDate,
    #[serde(rename = "amount_desc")]
    ByAmountDesc,
    #[serde(rename = "amount_asc")]
    ByAmountAsc,
}

serde_plain::derive_display_from_serialize!(SortMode);
serde_plain::derive_fromstr_from_deserialize!(SortMode);

impl SortMode {
    /// The next mode in the cycle `date -> amount_desc -> amount_asc -> date`.
    pub fn next(self) -> Self {
        match self {
            SortMode::ByDate => SortMode::ByAmountDesc,
            SortMode::ByAmountDesc => SortMode::ByAmountAsc,
            SortMode::ByAmountAsc => SortMode::ByDate,
        }
    }
}

/// A row as displayed, along with where it lives in storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRow<'a> {
    pub original_index: usize,
    pub row: &'a EditableRow,
}

/// Projects `rows` into display order for `mode`.
///
/// Amount modes are stable and put rows whose amount does not resolve at the end.
pub fn displayed_rows(rows: &[EditableRow], mode: SortMode) -> Vec<DisplayRow<'_>> {
    let mut displayed: Vec<DisplayRow<'_>> = rows
        .iter()
        .enumerate()
        .map(|(original_index, row)| DisplayRow {
            original_index,
            row,
        })
        .collect();
    let descending = match mode {
        SortMode::ByDate => return displayed,
        SortMode::ByAmountDesc => true,
        SortMode::ByAmountAsc => false,
    };
    displayed.sort_by(|a, b| {
        match (a.row.resolved_amount(), b.row.resolved_amount()) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
    displayed
}

/// The panes a row in `current` may be moved to: every other expense type.
pub fn move_targets(current: ExpenseType) -> Vec<ExpenseType> {
    ExpenseType::ALL
        .into_iter()
        .filter(|t| *t != current)
        .collect()
}

/// Newest first; undated rows go last. Stable, so rows on the same day keep their order.
pub fn sort_rows_by_date(rows: &mut [EditableRow]) {
    rows.sort_by(|a, b| newest_first(a.date, b.date));
}

/// Same ordering as [`sort_rows_by_date`], for records.
pub fn sort_records_by_date(records: &mut [ExpenseRecord]) {
    records.sort_by(|a, b| newest_first(a.date, b.date));
}

fn newest_first<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
