//! The parent side of the expense tables: every record of the year grouped by month and type.
//!
//! Tables report their changes as [`PaneEvent`]s; the book applies them so that each table can be
//! handed its current records again, and so that a row moved out of one table shows up in another.

use crate::model::{EditableRow, ExpenseRecord, ExpenseType};
use crate::table::pane::{PaneEvent, PaneKey};
use crate::table::projection::sort_records_by_date;
use std::collections::BTreeMap;
use tracing::debug;

/// The three lists of one month.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MonthLists {
    pub both: Vec<ExpenseRecord>,
    pub hodol: Vec<ExpenseRecord>,
    pub doldol: Vec<ExpenseRecord>,
}

impl MonthLists {
    pub fn get(&self, expense_type: ExpenseType) -> &[ExpenseRecord] {
        match expense_type {
            ExpenseType::Both => &self.both,
            ExpenseType::Hodol => &self.hodol,
            ExpenseType::Doldol => &self.doldol,
        }
    }

    fn get_mut(&mut self, expense_type: ExpenseType) -> &mut Vec<ExpenseRecord> {
        match expense_type {
            ExpenseType::Both => &mut self.both,
            ExpenseType::Hodol => &mut self.hodol,
            ExpenseType::Doldol => &mut self.doldol,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MonthBook {
    months: BTreeMap<u8, MonthLists>,
}

impl MonthBook {
    /// Groups `records` by month and then by type, each list newest first.
    pub fn group_by_type(records: Vec<ExpenseRecord>) -> Self {
        let mut book = Self::default();
        for record in records {
            book.months
                .entry(record.month)
                .or_default()
                .get_mut(record.expense_type)
                .push(record);
        }
        for lists in book.months.values_mut() {
            for expense_type in ExpenseType::ALL {
                sort_records_by_date(lists.get_mut(expense_type));
            }
        }
        book
    }

    /// Months that have at least one list, in ascending order.
    pub fn months(&self) -> impl Iterator<Item = u8> + '_ {
        self.months.keys().copied()
    }

    pub fn lists(&self, month: u8) -> Option<&MonthLists> {
        self.months.get(&month)
    }

    /// The records for one table; empty when the month has none.
    pub fn records(&self, key: PaneKey) -> Vec<ExpenseRecord> {
        self.lists(key.month)
            .map(|lists| lists.get(key.expense_type).to_vec())
            .unwrap_or_default()
    }

    /// Replaces one table's list with the table's current rows.
    pub fn set(&mut self, key: PaneKey, rows: &[EditableRow]) {
        let records = rows
            .iter()
            .map(|row| row.to_record(key.month, key.expense_type))
            .collect();
        *self
            .months
            .entry(key.month)
            .or_default()
            .get_mut(key.expense_type) = records;
    }

    /// Moves `record` from the `from` list to the `to` list of its month. The destination is
    /// re-sorted by date.
    pub fn apply_move(&mut self, record: ExpenseRecord, from: ExpenseType, to: ExpenseType) {
        debug!(
            "Moving expense {:?} from {from} to {to} in month {}",
            record.id, record.month
        );
        let lists = self.months.entry(record.month).or_default();
        if record.id.is_some() {
            lists.get_mut(from).retain(|r| r.id != record.id);
            lists.get_mut(to).retain(|r| r.id != record.id);
        }
        let destination = lists.get_mut(to);
        destination.push(record);
        sort_records_by_date(destination);
    }

    /// Applies one event reported by the table `key`.
    pub fn apply(&mut self, key: PaneKey, event: &PaneEvent) {
        match event {
            PaneEvent::RowsChanged(rows) => self.set(key, rows),
            PaneEvent::Moved { record, from, to } => self.apply_move(record.clone(), *from, *to),
            PaneEvent::Notice(_) => {}
        }
    }

    /// Every record in the book, month by month.
    pub fn all_records(&self) -> Vec<ExpenseRecord> {
        self.months
            .values()
            .flat_map(|lists| {
                ExpenseType::ALL
                    .into_iter()
                    .flat_map(move |t| lists.get(t).iter().cloned())
            })
            .collect()
    }
}
