//! Types that represent the core data model: expenses, categories and editable table rows.
mod category;
mod expense;
mod row;

pub use category::{Category, CategoryId};
pub use expense::{ExpenseId, ExpensePayload, ExpenseRecord, ExpenseType};
pub(crate) use expense::wire_date;
pub use row::{EditableRow, FieldEdit, RowKey};
