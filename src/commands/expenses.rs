//! Expense commands.
//!
//! `add`, `move` and `delete` go through the same [`ExpenseTable`] a pane uses: the command loads
//! the table for one month and type, edits it, and waits for the table to report the outcome.

use crate::api::{self, ExpenseStore, Mode, DEFAULT_TIMEOUT};
use crate::args::{AddArgs, DeleteArgs, ExpensesArgs, MoveArgs};
use crate::auth::AuthGate;
use crate::commands::Out;
use crate::formula::{format_amount, resolve_amount};
use crate::model::{EditableRow, ExpenseId, ExpenseRecord, ExpenseType, FieldEdit};
use crate::table::{displayed_rows, ExpenseTable, MonthBook, Notice, PaneEvent, PaneKey};
use crate::{Config, Result};
use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::debug;
use uuid::Uuid;

/// How long a command waits for the table to hear back from the store.
const SETTLE_TIMEOUT: Duration = DEFAULT_TIMEOUT.saturating_add(Duration::from_secs(1));

/// Lists expenses grouped by month and table.
pub async fn list_expenses(
    config: Config,
    mode: Mode,
    args: &ExpensesArgs,
) -> Result<Out<Vec<ExpenseRecord>>> {
    let store = api::store(&config, mode)?;
    let records = store
        .list_expenses(args.month(), args.expense_type())
        .await?;
    if records.is_empty() {
        return Ok(Out::new("No expenses found", records));
    }

    let book = MonthBook::group_by_type(records.clone());
    let mut message = format!("{} expenses", records.len());
    for month in book.months() {
        let Some(lists) = book.lists(month) else {
            continue;
        };
        for expense_type in ExpenseType::ALL {
            let list = lists.get(expense_type);
            if list.is_empty() {
                continue;
            }
            let total: i64 = list.iter().filter_map(|r| r.amount).sum();
            message.push_str(&format!(
                "\n{month:>2}/{:<6} {:>3} expenses {:>12}",
                expense_type.to_string(),
                list.len(),
                format_amount(total)
            ));
            let rows: Vec<EditableRow> = list.iter().map(EditableRow::from_record).collect();
            for shown in displayed_rows(&rows, args.sort()) {
                message.push_str("\n    ");
                message.push_str(&line(&list[shown.original_index]));
            }
        }
    }
    Ok(Out::new(message, records))
}

/// Adds one expense to a table. Editing the table's new row fills it in; the table saves it as
/// soon as it is complete.
pub async fn add_expense(config: Config, mode: Mode, args: &AddArgs) -> Result<Out<ExpenseRecord>> {
    if resolve_amount(args.amount()).is_none() {
        bail!("'{}' is not a valid amount", args.amount());
    }
    let key = PaneKey::new(args.month(), args.expense_type());
    let (table, mut events) = open(&config, mode, key).await?;

    table.add_row()?;
    let local = table
        .rows()
        .first()
        .map(|r| r.local_key())
        .context("The new row is missing")?;
    if let Some(date) = args.date() {
        table.edit_field(index_of(&table, local)?, FieldEdit::Date(Some(date)))?;
    }
    table.edit_field(
        index_of(&table, local)?,
        FieldEdit::Note(args.note().to_string()),
    )?;
    table.edit_field(
        index_of(&table, local)?,
        FieldEdit::Amount(args.amount().to_string()),
    )?;
    table.edit_category(index_of(&table, local)?, args.major(), args.minor())?;

    let saved = settle(&mut events, |event| match event {
        PaneEvent::RowsChanged(rows) => rows
            .iter()
            .find(|r| r.local_key() == local && r.is_persisted())
            .map(|r| r.to_record(key.month, key.expense_type)),
        _ => None,
    })
    .await?;
    let id = saved.id.as_ref().map(ExpenseId::as_str).unwrap_or_default();
    Ok(Out::new(format!("Added expense {id} to {key}"), saved))
}

/// Moves an expense to another table of the same month.
pub async fn move_expense(
    config: Config,
    mode: Mode,
    args: &MoveArgs,
) -> Result<Out<ExpenseRecord>> {
    let key = PaneKey::new(args.month(), args.from());
    let (table, mut events) = open(&config, mode, key).await?;
    let id = ExpenseId::new(args.id());
    table.move_row(&id, args.to()).await?;

    let moved = settle(&mut events, |event| match event {
        PaneEvent::Moved { record, .. } => Some(record),
        _ => None,
    })
    .await?;
    Ok(Out::new(
        format!("Moved expense {id} from {key} to {}", args.to()),
        moved,
    ))
}

/// Deletes an expense from a table.
pub async fn delete_expense(config: Config, mode: Mode, args: &DeleteArgs) -> Result<Out<()>> {
    let key = PaneKey::new(args.month(), args.expense_type());
    let (table, _events) = open(&config, mode, key).await?;
    let id = ExpenseId::new(args.id());
    let index = table
        .rows()
        .iter()
        .position(|r| r.id.as_ref() == Some(&id))
        .with_context(|| format!("Expense '{id}' is not in the {key} table"))?;
    table.delete_row(index).await?;
    Ok(format!("Deleted expense {id} from {key}").into())
}

/// Builds the table for `key` and loads it with the store's records.
async fn open(
    config: &Config,
    mode: Mode,
    key: PaneKey,
) -> Result<(ExpenseTable, UnboundedReceiver<PaneEvent>)> {
    let store: Arc<dyn ExpenseStore> = api::store(config, mode)?;
    let records = store
        .list_expenses(Some(key.month), Some(key.expense_type))
        .await?;
    debug!("Loaded {} expenses for {key}", records.len());
    let (sender, receiver) = mpsc::unbounded_channel();
    let table = ExpenseTable::new(key, store, AuthGate::new(config.token()), sender);
    table.load_rows(records);
    Ok((table, receiver))
}

fn index_of(table: &ExpenseTable, local: Uuid) -> Result<usize> {
    table
        .rows()
        .iter()
        .position(|r| r.local_key() == local)
        .context("The new row is missing")
}

/// Waits for the first event `done` accepts. Any notice from the table ends the wait with an
/// error.
async fn settle<T>(
    events: &mut UnboundedReceiver<PaneEvent>,
    mut done: impl FnMut(PaneEvent) -> Option<T>,
) -> Result<T> {
    let wait = async {
        while let Some(event) = events.recv().await {
            if let PaneEvent::Notice(notice) = event {
                return Err(notice);
            }
            if let Some(value) = done(event) {
                return Ok(value);
            }
        }
        Err(Notice::Failed {
            action: "saving",
            error: api::ApiError::Remote("the table was closed".into()),
        })
    };
    match tokio::time::timeout(SETTLE_TIMEOUT, wait).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(notice)) => bail!("{notice}"),
        Err(_) => bail!("Timed out waiting for the store"),
    }
}

fn line(record: &ExpenseRecord) -> String {
    format!(
        "{:<10} {:>12}  {} > {}  {}  [{}]",
        record.date.map(|d| d.to_string()).unwrap_or_default(),
        record.amount.map(format_amount).unwrap_or_default(),
        record.major_category.as_deref().unwrap_or("-"),
        record.minor_category.as_deref().unwrap_or("-"),
        record.note,
        record.id.as_ref().map(ExpenseId::as_str).unwrap_or_default(),
    )
}
