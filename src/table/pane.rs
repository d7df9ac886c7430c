//! The reconciler behind one (month, type) expense table.
//!
//! An `ExpenseTable` mirrors the records its parent hands it into editable rows and decides, on
//! every edit, whether the remote store needs a create, a debounced update, or nothing at all.
//! Work that has to wait on the network runs on spawned tokio tasks; results come back to the
//! parent as [`PaneEvent`]s.
//!
//! Rules that hold for the life of a table:
//! - a row is created at most once, and while any create is in flight only notes may be edited,
//! - updates are coalesced per row until the row has been quiet for [`DEBOUNCE`],
//! - an authentication failure throws away local edits and goes back to what the parent last
//!   provided.

use crate::api::{ApiError, ExpenseStore, AUTH_REQUIRED_MESSAGE};
use crate::auth::AuthGate;
use crate::model::{
    EditableRow, ExpenseId, ExpensePayload, ExpenseRecord, ExpenseType, FieldEdit, RowKey,
};
use crate::table::projection::{self, SortMode};
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// How long a persisted row must go without edits before its update is sent.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

pub const ZERO_AMOUNT_MESSAGE: &str = "The amount must be greater than 0.";

/// Identifies the pane a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaneKey {
    pub month: u8,
    pub expense_type: ExpenseType,
}

impl PaneKey {
    pub fn new(month: u8, expense_type: ExpenseType) -> Self {
        Self {
            month,
            expense_type,
        }
    }
}

impl Display for PaneKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.month, self.expense_type)
    }
}

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ZeroAmount,
    AuthRequired,
    /// A remote call failed. `action` is what was being attempted, e.g. `"saving"`.
    Failed {
        action: &'static str,
        error: ApiError,
    },
}

impl Display for Notice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::ZeroAmount => f.write_str(ZERO_AMOUNT_MESSAGE),
            Notice::AuthRequired => f.write_str(AUTH_REQUIRED_MESSAGE),
            Notice::Failed { error, .. } if error.is_auth() => f.write_str(AUTH_REQUIRED_MESSAGE),
            Notice::Failed { action, .. } => {
                write!(f, "An error occurred while {action} the expense.")
            }
        }
    }
}

/// What a table reports to its parent.
#[derive(Debug, Clone, PartialEq)]
pub enum PaneEvent {
    /// The table's rows changed; the parent should replace its copy.
    RowsChanged(Vec<EditableRow>),
    Notice(Notice),
    /// A row was moved out of this table. The parent inserts `record` into the `to` list.
    Moved {
        record: ExpenseRecord,
        from: ExpenseType,
        to: ExpenseType,
    },
}

/// Why an operation on a table was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("An expense is being saved; only notes can be edited until it finishes.")]
    Busy,
    #[error("{}", AUTH_REQUIRED_MESSAGE)]
    ReadOnly,
    #[error("There is no row {0}")]
    NoSuchRow(usize),
    #[error("Expense '{0}' is not in this table")]
    UnknownExpense(ExpenseId),
    #[error("The expense is already in the '{0}' table")]
    SameTable(ExpenseType),
    #[error(transparent)]
    Remote(#[from] ApiError),
}

struct PendingUpdate {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Default)]
struct PaneState {
    rows: Vec<EditableRow>,
    /// The id sequence of the last records accepted from the parent. `None` before the first load.
    applied_ids: Option<Vec<Option<ExpenseId>>>,
    last_from_parent: Vec<ExpenseRecord>,
    creating: HashSet<Uuid>,
    pending: HashMap<RowKey, PendingUpdate>,
    generation: u64,
    sort_mode: SortMode,
}

impl PaneState {
    /// Returns whether an update was waiting.
    fn cancel_pending(&mut self, key: &RowKey) -> bool {
        match self.pending.remove(key) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    fn cancel_all_pending(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
    }

    fn reseed_if_empty(&mut self) {
        if self.rows.is_empty() {
            self.rows.push(EditableRow::blank(today()));
        }
    }
}

struct Shared {
    key: PaneKey,
    store: Arc<dyn ExpenseStore>,
    gate: AuthGate,
    events: UnboundedSender<PaneEvent>,
    debounce: Duration,
    state: Mutex<PaneState>,
}

/// The reconciler for one pane. Dropping it cancels every pending debounced update without
/// sending it; creates that are already in flight run to completion.
///
/// Mutating methods spawn tokio tasks and must be called from within a tokio runtime.
pub struct ExpenseTable {
    shared: Arc<Shared>,
}

impl ExpenseTable {
    pub fn new(
        key: PaneKey,
        store: Arc<dyn ExpenseStore>,
        gate: AuthGate,
        events: UnboundedSender<PaneEvent>,
    ) -> Self {
        Self::with_debounce(key, store, gate, events, DEBOUNCE)
    }

    pub fn with_debounce(
        key: PaneKey,
        store: Arc<dyn ExpenseStore>,
        gate: AuthGate,
        events: UnboundedSender<PaneEvent>,
        debounce: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                key,
                store,
                gate,
                events,
                debounce,
                state: Mutex::new(PaneState::default()),
            }),
        }
    }

    pub fn key(&self) -> PaneKey {
        self.shared.key
    }

    /// Takes the parent's records for this pane. The local rows are only replaced when the
    /// ordered id sequence differs from both the last one applied and the one the table holds,
    /// so an echo of the table's own changes does not clobber edits in progress. Either way the
    /// records become the state a revert goes back to. Returns whether the rows were replaced.
    pub fn load_rows(&self, records: Vec<ExpenseRecord>) -> bool {
        let ids: Vec<Option<ExpenseId>> = records.iter().map(|r| r.id.clone()).collect();
        let mut state = self.shared.lock();
        if let Some(applied) = &state.applied_ids {
            let echo = state.rows.iter().map(|r| &r.id).eq(ids.iter());
            if *applied == ids || echo {
                trace!("{}: parent data unchanged, keeping local rows", self.shared.key);
                state.applied_ids = Some(ids);
                state.last_from_parent = records;
                return false;
            }
        }
        debug!("{}: loading {} rows", self.shared.key, records.len());
        state.rows = rows_from(&records);
        state.applied_ids = Some(ids);
        state.last_from_parent = records;
        true
    }

    /// Applies one field edit to the row at `index` (storage order).
    pub fn edit_field(&self, index: usize, edit: FieldEdit) -> Result<(), TableError> {
        let shared = &self.shared;
        let mut state = shared.lock();
        let is_note = edit.is_note();
        let creating = !state.creating.is_empty();
        if creating && !is_note {
            return Err(TableError::Busy);
        }
        let row = state
            .rows
            .get_mut(index)
            .ok_or(TableError::NoSuchRow(index))?;
        let is_date = edit.is_date();
        row.apply(edit);
        let row = row.clone();
        if is_date {
            projection::sort_rows_by_date(&mut state.rows);
        }
        shared.process(&mut state, &row);
        if !is_note || row.is_complete() {
            shared.emit(PaneEvent::RowsChanged(state.rows.clone()));
        }
        Ok(())
    }

    /// Sets both categories of the row at `index` in one step.
    pub fn edit_category(&self, index: usize, major: &str, minor: &str) -> Result<(), TableError> {
        let shared = &self.shared;
        let mut state = shared.lock();
        if !state.creating.is_empty() {
            return Err(TableError::Busy);
        }
        let row = state
            .rows
            .get_mut(index)
            .ok_or(TableError::NoSuchRow(index))?;
        row.apply(FieldEdit::MajorCategory(major.to_string()));
        row.apply(FieldEdit::MinorCategory(minor.to_string()));
        let row = row.clone();
        shared.process(&mut state, &row);
        shared.emit(PaneEvent::RowsChanged(state.rows.clone()));
        Ok(())
    }

    /// Puts a blank row dated today at the top of the table.
    pub fn add_row(&self) -> Result<(), TableError> {
        self.shared.require_write()?;
        let mut state = self.shared.lock();
        state.rows.insert(0, EditableRow::blank(today()));
        self.shared.emit(PaneEvent::RowsChanged(state.rows.clone()));
        Ok(())
    }

    /// Deletes the row at `index`. Persisted rows are deleted remotely first; if that fails the
    /// row stays, unless the failure was an authentication failure, in which case the whole table
    /// goes back to the parent's data.
    pub async fn delete_row(&self, index: usize) -> Result<(), TableError> {
        let shared = &self.shared;
        shared.require_write()?;
        let row = shared
            .lock()
            .rows
            .get(index)
            .cloned()
            .ok_or(TableError::NoSuchRow(index))?;

        if let Some(id) = &row.id {
            // A queued update must not fire against the id while it is being deleted.
            let had_pending = shared.lock().cancel_pending(&row.key());
            debug!("{}: deleting expense {id}", shared.key);
            if let Err(e) = shared.store.delete_expense(id).await {
                let is_auth = e.is_auth();
                shared.fail("deleting", e.clone());
                if had_pending && !is_auth {
                    shared.reschedule(id);
                }
                return Err(e.into());
            }
        }

        let mut state = shared.lock();
        state.cancel_pending(&row.key());
        state.rows.retain(|r| !same_row(r, &row));
        state.reseed_if_empty();
        shared.emit(PaneEvent::RowsChanged(state.rows.clone()));
        Ok(())
    }

    /// Moves the persisted row `id` to the `target` table of the same month.
    pub async fn move_row(&self, id: &ExpenseId, target: ExpenseType) -> Result<(), TableError> {
        let shared = &self.shared;
        shared.require_write()?;
        if target == shared.key.expense_type {
            return Err(TableError::SameTable(target));
        }
        let payload = {
            let mut state = shared.lock();
            let row = state
                .rows
                .iter()
                .find(|r| r.id.as_ref() == Some(id))
                .ok_or_else(|| TableError::UnknownExpense(id.clone()))?;
            let payload = row.to_payload(shared.key.month, target);
            // The move carries the latest values, so a queued update would only undo it.
            state.cancel_pending(&RowKey::Persisted(id.clone()));
            payload
        };

        debug!("{}: moving expense {id} to {target}", shared.key);
        let record = match shared.store.update_expense(id, &payload).await {
            Ok(record) => record,
            Err(e) => {
                shared.fail("moving", e.clone());
                return Err(e.into());
            }
        };

        let mut state = shared.lock();
        state.rows.retain(|r| r.id.as_ref() != Some(id));
        state.reseed_if_empty();
        shared.emit(PaneEvent::RowsChanged(state.rows.clone()));
        shared.emit(PaneEvent::Moved {
            record,
            from: shared.key.expense_type,
            to: target,
        });
        Ok(())
    }

    /// A snapshot of the rows in storage order.
    pub fn rows(&self) -> Vec<EditableRow> {
        self.shared.lock().rows.clone()
    }

    /// The rows in display order, each paired with its storage index.
    pub fn displayed(&self) -> Vec<(usize, EditableRow)> {
        let state = self.shared.lock();
        projection::displayed_rows(&state.rows, state.sort_mode)
            .into_iter()
            .map(|d| (d.original_index, d.row.clone()))
            .collect()
    }

    pub fn sort_mode(&self) -> SortMode {
        self.shared.lock().sort_mode
    }

    /// Advances to the next sort mode and returns it.
    pub fn cycle_sort(&self) -> SortMode {
        let mut state = self.shared.lock();
        state.sort_mode = state.sort_mode.next();
        state.sort_mode
    }

    pub fn move_targets(&self) -> Vec<ExpenseType> {
        projection::move_targets(self.shared.key.expense_type)
    }

    /// True while a create is in flight for any row.
    pub fn is_pending(&self) -> bool {
        !self.shared.lock().creating.is_empty()
    }

    /// The number of rows with a debounced update waiting to be sent.
    pub fn pending_updates(&self) -> usize {
        self.shared.lock().pending.len()
    }
}

impl Drop for ExpenseTable {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if !state.pending.is_empty() {
            debug!(
                "{}: dropping {} pending updates",
                self.shared.key,
                state.pending.len()
            );
        }
        state.cancel_all_pending();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PaneState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: PaneEvent) {
        if self.events.send(event).is_err() {
            trace!("{}: event receiver is gone", self.key);
        }
    }

    fn require_write(&self) -> Result<(), TableError> {
        if self.gate.can_write() {
            return Ok(());
        }
        self.emit(PaneEvent::Notice(Notice::AuthRequired));
        Err(TableError::ReadOnly)
    }

    /// Decides what the remote store needs after `row` was edited.
    fn process(self: &Arc<Self>, state: &mut PaneState, row: &EditableRow) {
        if !self.gate.can_write() {
            trace!("{}: read-only, not saving", self.key);
            return;
        }
        match &row.id {
            None if row.is_complete() => self.start_create(state, row),
            None => {}
            Some(id) => match row.saved_amount() {
                None => {
                    state.cancel_pending(&row.key());
                }
                Some(0) => {
                    state.cancel_pending(&row.key());
                    self.emit(PaneEvent::Notice(Notice::ZeroAmount));
                }
                Some(_) => {
                    let payload = row.to_payload(self.key.month, self.key.expense_type);
                    self.schedule_update(state, id.clone(), payload);
                }
            },
        }
    }

    fn start_create(self: &Arc<Self>, state: &mut PaneState, row: &EditableRow) {
        if row.saved_amount() == Some(0) {
            self.emit(PaneEvent::Notice(Notice::ZeroAmount));
            return;
        }
        let local = row.local_key();
        if !state.creating.insert(local) {
            trace!("{}: create already in flight for {local}", self.key);
            return;
        }
        let payload = row.to_payload(self.key.month, self.key.expense_type);
        debug!("{}: creating expense for row {local}", self.key);
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.finish_create(local, payload).await });
    }

    async fn finish_create(self: Arc<Self>, local: Uuid, sent: ExpensePayload) {
        let result = self.store.create_expense(&sent).await;
        let repair = {
            let mut state = self.lock();
            state.creating.remove(&local);
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    drop(state);
                    self.fail("saving", e);
                    return;
                }
            };
            let Some(id) = record.id else {
                warn!("{}: the store returned an expense without an id", self.key);
                return;
            };
            let Some(row) = state.rows.iter_mut().find(|r| r.local_key() == local) else {
                debug!("{}: row {local} is gone, not merging id {id}", self.key);
                return;
            };
            row.id = Some(id.clone());
            let repair = (row.note != sent.note).then(|| {
                (
                    id,
                    ExpensePayload {
                        note: row.note.clone(),
                        ..sent
                    },
                )
            });
            self.emit(PaneEvent::RowsChanged(state.rows.clone()));
            repair
        };

        if let Some((id, payload)) = repair {
            debug!("{}: note changed during create, updating {id}", self.key);
            if let Err(e) = self.store.update_expense(&id, &payload).await {
                warn!("{}: unable to update the note of {id}: {e}", self.key);
            }
        }
    }

    /// Queues an update for `id` again from the row's current values, if the row is still here.
    fn reschedule(self: &Arc<Self>, id: &ExpenseId) {
        let mut state = self.lock();
        let Some(row) = state.rows.iter().find(|r| r.id.as_ref() == Some(id)).cloned() else {
            return;
        };
        self.process(&mut state, &row);
    }

    /// Restarts the quiet period for `id` with the latest `payload`.
    fn schedule_update(
        self: &Arc<Self>,
        state: &mut PaneState,
        id: ExpenseId,
        payload: ExpensePayload,
    ) {
        let key = RowKey::Persisted(id.clone());
        state.cancel_pending(&key);
        state.generation += 1;
        let generation = state.generation;
        let shared = Arc::clone(self);
        let delay = self.debounce;
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.flush_update(task_key, generation, id, payload).await;
        });
        state.pending.insert(
            key,
            PendingUpdate {
                generation,
                handle: handle.abort_handle(),
            },
        );
    }

    async fn flush_update(
        &self,
        key: RowKey,
        generation: u64,
        id: ExpenseId,
        payload: ExpensePayload,
    ) {
        {
            let mut state = self.lock();
            match state.pending.get(&key) {
                Some(pending) if pending.generation == generation => {
                    state.pending.remove(&key);
                }
                // Superseded or cancelled after the timer fired.
                _ => return,
            }
        }
        debug!("{}: updating expense {id}", self.key);
        if let Err(e) = self.store.update_expense(&id, &payload).await {
            self.fail("updating", e);
        }
    }

    /// Surfaces a remote failure; an authentication failure also reverts the table.
    fn fail(&self, action: &'static str, error: ApiError) {
        warn!("{}: error {action} expense: {error}", self.key);
        let is_auth = error.is_auth();
        self.emit(PaneEvent::Notice(Notice::Failed { action, error }));
        if is_auth {
            self.revert();
        }
    }

    fn revert(&self) {
        let mut state = self.lock();
        debug!("{}: reverting to the last data from the parent", self.key);
        state.cancel_all_pending();
        state.rows = rows_from(&state.last_from_parent);
        self.emit(PaneEvent::RowsChanged(state.rows.clone()));
    }
}

fn rows_from(records: &[ExpenseRecord]) -> Vec<EditableRow> {
    if records.is_empty() {
        return vec![EditableRow::blank(today())];
    }
    records.iter().map(EditableRow::from_record).collect()
}

fn same_row(a: &EditableRow, b: &EditableRow) -> bool {
    a.local_key() == b.local_key() || (b.id.is_some() && a.id == b.id)
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}
