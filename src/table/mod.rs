//! Expense tables: the per-pane reconciler, its display projection, and the month book that
//! holds every pane's records on the parent side.

mod book;
mod pane;
mod projection;

pub use book::{MonthBook, MonthLists};
pub use pane::{
    ExpenseTable, Notice, PaneEvent, PaneKey, TableError, DEBOUNCE, ZERO_AMOUNT_MESSAGE,
};
pub use projection::{
    displayed_rows, move_targets, sort_records_by_date, sort_rows_by_date, DisplayRow, SortMode,
};
