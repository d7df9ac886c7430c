//! The SQLite store behind the REST server: the `expenses` and `categories` tables.

mod migrations;

use crate::model::{Category, CategoryId, ExpenseId, ExpensePayload, ExpenseRecord, ExpenseType};
use crate::Result;
use anyhow::{bail, Context};
use chrono::{NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A new expense as received by the server. Everything except the pane is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub month: u8,
    pub expense_type: ExpenseType,
    pub date: Option<NaiveDate>,
    pub amount: Option<i64>,
    pub major_category: Option<String>,
    pub minor_category: Option<String>,
    pub note: Option<String>,
}

impl From<&ExpensePayload> for NewExpense {
    fn from(payload: &ExpensePayload) -> Self {
        Self {
            month: payload.month,
            expense_type: payload.expense_type,
            date: payload.date,
            amount: Some(payload.amount),
            major_category: Some(payload.major_category.clone()),
            minor_category: Some(payload.minor_category.clone()),
            note: Some(payload.note.clone()),
        }
    }
}

/// A partial update of an expense. `None` leaves a column alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpensePatch {
    pub expense_type: Option<ExpenseType>,
    pub date: Option<Option<NaiveDate>>,
    pub amount: Option<Option<i64>>,
    pub major_category: Option<Option<String>>,
    pub minor_category: Option<Option<String>>,
    pub note: Option<Option<String>>,
}

impl ExpensePatch {
    fn apply(self, record: &mut ExpenseRecord) {
        if let Some(expense_type) = self.expense_type {
            record.expense_type = expense_type;
        }
        if let Some(date) = self.date {
            record.date = date;
        }
        if let Some(amount) = self.amount {
            record.amount = amount;
        }
        if let Some(major) = self.major_category {
            record.major_category = major;
        }
        if let Some(minor) = self.minor_category {
            record.minor_category = minor;
        }
        if let Some(note) = self.note {
            record.note = note.unwrap_or_default();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Creates a new database file at `path` (which must not exist yet) and builds the schema.
    pub async fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A database already exists at {}", path.display());
        }
        let pool = connect(path, true).await?;
        migrations::bootstrap(&pool).await?;
        migrations::run(&pool, 0, migrations::CURRENT_VERSION).await?;
        info!("Created the database at {}", path.display());
        Ok(Self { pool })
    }

    /// Opens the existing database at `path`, migrating its schema forward if it is behind.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!(
                "There is no database at {}; run 'hodol init' first",
                path.display()
            );
        }
        let pool = connect(path, false).await?;
        migrations::bootstrap(&pool).await?;
        let version = migrations::version(&pool).await?;
        if version > migrations::CURRENT_VERSION {
            bail!(
                "The database schema is at version {version}, newer than this program understands ({})",
                migrations::CURRENT_VERSION
            );
        }
        migrations::run(&pool, version, migrations::CURRENT_VERSION).await?;
        debug!("Opened the database at {}", path.display());
        Ok(Self { pool })
    }

    pub async fn schema_version(&self) -> Result<i32> {
        migrations::version(&self.pool).await
    }

    /// Expenses, newest first, optionally limited to one month and/or type.
    pub async fn list_expenses(
        &self,
        month: Option<u8>,
        expense_type: Option<ExpenseType>,
    ) -> Result<Vec<ExpenseRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, month, type, date, amount, major_category, minor_category, note
            FROM expenses
            WHERE (?1 IS NULL OR month = ?1) AND (?2 IS NULL OR type = ?2)
            ORDER BY date DESC, created_at DESC, rowid DESC
            "#,
        )
        .bind(month.map(i64::from))
        .bind(expense_type.map(|t| t.to_string()))
        .fetch_all(&self.pool)
        .await
        .context("Unable to list expenses")?;
        rows.iter().map(expense_from_row).collect()
    }

    pub async fn get_expense(&self, id: &ExpenseId) -> Result<Option<ExpenseRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, month, type, date, amount, major_category, minor_category, note
            FROM expenses
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Unable to read expense '{id}'"))?;
        row.as_ref().map(expense_from_row).transpose()
    }

    pub async fn insert_expense(&self, expense: &NewExpense) -> Result<ExpenseRecord> {
        let mut tx = self.pool.begin().await?;
        let record = insert_expense(&mut tx, expense).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Inserts every expense or none of them.
    pub async fn insert_expenses(&self, expenses: &[NewExpense]) -> Result<Vec<ExpenseRecord>> {
        let mut tx = self.pool.begin().await?;
        let mut records = Vec::with_capacity(expenses.len());
        for expense in expenses {
            records.push(insert_expense(&mut tx, expense).await?);
        }
        tx.commit().await?;
        Ok(records)
    }

    /// Applies `patch` and returns the updated expense, or `None` if there is no such expense.
    pub async fn update_expense(
        &self,
        id: &ExpenseId,
        patch: ExpensePatch,
    ) -> Result<Option<ExpenseRecord>> {
        let Some(mut record) = self.get_expense(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut record);
        sqlx::query(
            r#"
            UPDATE expenses
            SET type = ?, date = ?, amount = ?, major_category = ?, minor_category = ?, note = ?
            WHERE id = ?
            "#,
        )
        .bind(record.expense_type.to_string())
        .bind(record.date.map(|d| d.format(DATE_FORMAT).to_string()))
        .bind(record.amount)
        .bind(&record.major_category)
        .bind(&record.minor_category)
        .bind(&record.note)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Unable to update expense '{id}'"))?;
        Ok(Some(record))
    }

    /// Returns whether an expense was deleted.
    pub async fn delete_expense(&self, id: &ExpenseId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Unable to delete expense '{id}'"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Categories ordered by major name, each with the number of expenses using its pair.
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.main_category, c.sub_category,
                (SELECT COUNT(*) FROM expenses e
                 WHERE e.major_category = c.main_category
                   AND e.minor_category = c.sub_category) AS count
            FROM categories c
            ORDER BY c.main_category ASC, c.created_at ASC, c.rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Unable to list categories")?;
        rows.iter().map(category_from_row).collect()
    }

    pub async fn get_category(&self, id: &CategoryId) -> Result<Option<Category>> {
        let row = sqlx::query(
            r#"
            SELECT c.id, c.main_category, c.sub_category,
                (SELECT COUNT(*) FROM expenses e
                 WHERE e.major_category = c.main_category
                   AND e.minor_category = c.sub_category) AS count
            FROM categories c
            WHERE c.id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Unable to read category '{id}'"))?;
        row.as_ref().map(category_from_row).transpose()
    }

    pub async fn insert_category(&self, main: &str, sub: &str) -> Result<Category> {
        let id = CategoryId::new(Uuid::new_v4().to_string());
        sqlx::query(
            r#"
            INSERT INTO categories (id, main_category, sub_category, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(main)
        .bind(sub)
        .bind(now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Unable to add category '{main} > {sub}'"))?;
        self.get_category(&id)
            .await?
            .with_context(|| format!("Category '{id}' vanished after it was added"))
    }

    /// Renames a category. Every expense filed under the old pair moves to the new one.
    pub async fn update_category(
        &self,
        id: &CategoryId,
        main: &str,
        sub: &str,
    ) -> Result<Option<Category>> {
        let Some(existing) = self.get_category(id).await? else {
            return Ok(None);
        };
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE categories SET main_category = ?, sub_category = ? WHERE id = ?")
            .bind(main)
            .bind(sub)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Unable to update category '{id}'"))?;
        if !existing.is_pair(main, sub) {
            let moved = sqlx::query(
                r#"
                UPDATE expenses SET major_category = ?, minor_category = ?
                WHERE major_category = ? AND minor_category = ?
                "#,
            )
            .bind(main)
            .bind(sub)
            .bind(&existing.main_category)
            .bind(&existing.sub_category)
            .execute(&mut *tx)
            .await
            .context("Unable to rename the category on its expenses")?;
            debug!(
                "Renamed '{} > {}' on {} expenses",
                existing.main_category,
                existing.sub_category,
                moved.rows_affected()
            );
        }
        tx.commit().await?;
        self.get_category(id).await
    }

    /// Deletes a category and clears it from every expense filed under it. Returns whether a
    /// category was deleted.
    pub async fn delete_category(&self, id: &CategoryId) -> Result<bool> {
        let Some(existing) = self.get_category(id).await? else {
            return Ok(false);
        };
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Unable to delete category '{id}'"))?;
        sqlx::query(
            r#"
            UPDATE expenses SET major_category = NULL, minor_category = NULL
            WHERE major_category = ? AND minor_category = ?
            "#,
        )
        .bind(&existing.main_category)
        .bind(&existing.sub_category)
        .execute(&mut *tx)
        .await
        .context("Unable to clear the category from its expenses")?;
        tx.commit().await?;
        Ok(true)
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Unable to open the database at {}", path.display()))
}

async fn insert_expense(
    tx: &mut Transaction<'_, Sqlite>,
    expense: &NewExpense,
) -> Result<ExpenseRecord> {
    let id = ExpenseId::new(Uuid::new_v4().to_string());
    sqlx::query(
        r#"
        INSERT INTO expenses
            (id, month, type, date, amount, major_category, minor_category, note, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.as_str())
    .bind(i64::from(expense.month))
    .bind(expense.expense_type.to_string())
    .bind(expense.date.map(|d| d.format(DATE_FORMAT).to_string()))
    .bind(expense.amount)
    .bind(&expense.major_category)
    .bind(&expense.minor_category)
    .bind(&expense.note)
    .bind(now())
    .execute(&mut **tx)
    .await
    .context("Unable to add an expense")?;
    Ok(ExpenseRecord {
        id: Some(id),
        month: expense.month,
        expense_type: expense.expense_type,
        date: expense.date,
        amount: expense.amount,
        major_category: expense.major_category.clone(),
        minor_category: expense.minor_category.clone(),
        note: expense.note.clone().unwrap_or_default(),
    })
}

fn expense_from_row(row: &SqliteRow) -> Result<ExpenseRecord> {
    let id: String = row.try_get("id")?;
    let month: i64 = row.try_get("month")?;
    let expense_type: String = row.try_get("type")?;
    let date: Option<String> = row.try_get("date")?;
    let note: Option<String> = row.try_get("note")?;
    Ok(ExpenseRecord {
        month: u8::try_from(month)
            .with_context(|| format!("Expense '{id}' has an invalid month {month}"))?,
        expense_type: expense_type
            .parse()
            .with_context(|| format!("Expense '{id}' has an invalid type '{expense_type}'"))?,
        date: date
            .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
            .transpose()
            .with_context(|| format!("Expense '{id}' has an invalid date"))?,
        amount: row.try_get("amount")?,
        major_category: row.try_get("major_category")?,
        minor_category: row.try_get("minor_category")?,
        note: note.unwrap_or_default(),
        id: Some(ExpenseId::new(id)),
    })
}

fn category_from_row(row: &SqliteRow) -> Result<Category> {
    Ok(Category {
        id: CategoryId::new(row.try_get::<String, _>("id")?),
        main_category: row.try_get("main_category")?,
        sub_category: row.try_get("sub_category")?,
        count: row.try_get("count")?,
    })
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn db() -> (TempDir, Db) {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("hodol.sqlite")).await.unwrap();
        (dir, db)
    }

    fn expense(month: u8, day: u32, major: &str, minor: &str) -> NewExpense {
        NewExpense {
            month,
            expense_type: ExpenseType::Both,
            date: NaiveDate::from_ymd_opt(2024, month as u32, day),
            amount: Some(1000),
            major_category: Some(major.into()),
            minor_category: Some(minor.into()),
            note: None,
        }
    }

    #[tokio::test]
    async fn test_init_refuses_existing_file_and_load_reopens() {
        let (dir, db) = db().await;
        assert_eq!(db.schema_version().await.unwrap(), 1);
        drop(db);
        let path = dir.path().join("hodol.sqlite");
        assert!(Db::init(&path).await.is_err());
        let db = Db::load(&path).await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), 1);
        assert!(Db::load(dir.path().join("missing.sqlite")).await.is_err());
    }

    #[tokio::test]
    async fn test_expenses_filter_and_order() {
        let (_dir, db) = db().await;
        db.insert_expense(&expense(5, 1, "Food", "Cafe")).await.unwrap();
        let newest = db.insert_expense(&expense(5, 20, "Food", "Cafe")).await.unwrap();
        let mut undated = expense(5, 1, "Food", "Cafe");
        undated.date = None;
        db.insert_expense(&undated).await.unwrap();
        let mut hodol = expense(5, 3, "Food", "Cafe");
        hodol.expense_type = ExpenseType::Hodol;
        db.insert_expense(&hodol).await.unwrap();
        db.insert_expense(&expense(6, 3, "Food", "Cafe")).await.unwrap();

        let may_both = db
            .list_expenses(Some(5), Some(ExpenseType::Both))
            .await
            .unwrap();
        assert_eq!(may_both.len(), 3);
        assert_eq!(may_both[0].id, newest.id);
        assert!(may_both[2].date.is_none());
        assert_eq!(db.list_expenses(None, None).await.unwrap().len(), 5);
        assert_eq!(db.list_expenses(Some(6), None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_patch_expense() {
        let (_dir, db) = db().await;
        let created = db.insert_expense(&expense(5, 1, "Food", "Cafe")).await.unwrap();
        let id = created.id.unwrap();
        let patch = ExpensePatch {
            expense_type: Some(ExpenseType::Doldol),
            note: Some(Some("moved".into())),
            amount: Some(None),
            ..ExpensePatch::default()
        };
        let updated = db.update_expense(&id, patch).await.unwrap().unwrap();
        assert_eq!(updated.expense_type, ExpenseType::Doldol);
        assert_eq!(updated.note, "moved");
        assert_eq!(updated.amount, None);
        assert_eq!(updated.major_category.as_deref(), Some("Food"));
        assert_eq!(db.get_expense(&id).await.unwrap(), Some(updated));

        let missing = ExpenseId::new("missing");
        assert!(db
            .update_expense(&missing, ExpensePatch::default())
            .await
            .unwrap()
            .is_none());
        assert!(db.delete_expense(&id).await.unwrap());
        assert!(!db.delete_expense(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_category_counts_rename_and_delete() {
        let (_dir, db) = db().await;
        let cafe = db.insert_category("Food", "Cafe").await.unwrap();
        db.insert_category("Food", "Groceries").await.unwrap();
        db.insert_expenses(&[expense(5, 1, "Food", "Cafe"), expense(5, 2, "Food", "Cafe")])
            .await
            .unwrap();

        let listed = db.list_categories().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].count, 2);
        assert_eq!(listed[1].count, 0);

        let renamed = db
            .update_category(&cafe.id, "Food", "Coffee")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.count, 2);
        let expenses = db.list_expenses(None, None).await.unwrap();
        assert!(expenses
            .iter()
            .all(|e| e.minor_category.as_deref() == Some("Coffee")));

        assert!(db.delete_category(&cafe.id).await.unwrap());
        let expenses = db.list_expenses(None, None).await.unwrap();
        assert!(expenses
            .iter()
            .all(|e| e.major_category.is_none() && e.minor_category.is_none()));
        assert!(!db.delete_category(&cafe.id).await.unwrap());
        assert_eq!(db.list_categories().await.unwrap().len(), 1);
    }
}
