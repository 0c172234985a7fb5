use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{
    ExpenseDate, ExpenseDocument, ExpenseRecord, NewExpense, Snapshot, UpdateExpense, UserId,
};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS expenses (
                    id TEXT PRIMARY KEY NOT NULL,
                    user_id TEXT NOT NULL,
                    data TEXT NOT NULL,
                    sort_at INTEGER,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_expenses_user_sort
                    ON expenses(user_id, sort_at DESC);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Changes whenever another connection commits to the database file.
    pub fn data_version(&self) -> Result<i64> {
        Ok(self
            .conn
            .pragma_query_value(None, "data_version", |row| row.get(0))?)
    }

    // --- Row mapping helpers ---

    // Expects columns: 0: id, 1: data
    fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<ExpenseRecord> {
        let id: String = row.get(0)?;
        let data: String = row.get(1)?;
        let doc = parse_document(&data);
        Ok(ExpenseRecord::from_document(Some(id), &doc))
    }

    // --- Expenses ---

    pub fn insert_expense(&self, user: &UserId, expense: &NewExpense) -> Result<ExpenseRecord> {
        let id = Uuid::new_v4().to_string();
        self.insert_document(user, &id, &expense.to_document())?;
        self.get_expense(user, &id)
    }

    /// Store a raw document under `id`, replacing any document with the same id
    /// owned by the same user.
    pub fn insert_document(&self, user: &UserId, id: &str, doc: &ExpenseDocument) -> Result<()> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT user_id FROM expenses WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if owner.is_some_and(|o| o != user.as_str()) {
            bail!("Expense id {id} is already in use");
        }

        let now = Local::now().to_rfc3339();
        let data = serde_json::to_string(doc)?;
        let sort_at = ExpenseDate::from_field(doc.get("date")).sort_key();
        self.conn.execute(
            "INSERT INTO expenses (id, user_id, data, sort_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                sort_at = excluded.sort_at,
                updated_at = excluded.updated_at",
            params![id, user.as_str(), data, sort_at, now],
        )?;
        Ok(())
    }

    /// Store several documents in one transaction. If any of them fails,
    /// none are kept.
    pub fn insert_documents(
        &self,
        user: &UserId,
        docs: &[(String, ExpenseDocument)],
    ) -> Result<usize> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to start import transaction")?;
        for (id, doc) in docs {
            self.insert_document(user, id, doc)?;
        }
        tx.commit().context("Failed to commit import")?;
        Ok(docs.len())
    }

    pub fn get_expense(&self, user: &UserId, id: &str) -> Result<ExpenseRecord> {
        self.conn
            .query_row(
                "SELECT id, data FROM expenses WHERE id = ?1 AND user_id = ?2",
                params![id, user.as_str()],
                Self::record_from_row,
            )
            .with_context(|| format!("Expense {id} not found"))
    }

    fn get_document(&self, user: &UserId, id: &str) -> Result<ExpenseDocument> {
        let data: String = self
            .conn
            .query_row(
                "SELECT data FROM expenses WHERE id = ?1 AND user_id = ?2",
                params![id, user.as_str()],
                |row| row.get(0),
            )
            .with_context(|| format!("Expense {id} not found"))?;
        Ok(parse_document(&data))
    }

    pub fn update_expense(
        &self,
        user: &UserId,
        id: &str,
        update: &UpdateExpense,
    ) -> Result<ExpenseRecord> {
        let mut doc = self.get_document(user, id)?;
        update.apply_to(&mut doc);
        self.insert_document(user, id, &doc)?;
        self.get_expense(user, id)
    }

    pub fn delete_expense(&self, user: &UserId, id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM expenses WHERE id = ?1 AND user_id = ?2",
            params![id, user.as_str()],
        )?;
        Ok(rows > 0)
    }

    /// All of the user's expenses, most recent first; undated ones last.
    pub fn list_expenses(&self, user: &UserId) -> Result<Vec<ExpenseRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, data FROM expenses
             WHERE user_id = ?1
             ORDER BY sort_at IS NULL, sort_at DESC, id",
        )?;
        let records = stmt
            .query_map(params![user.as_str()], Self::record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn snapshot(&self, user: &UserId) -> Result<Snapshot> {
        Ok(Snapshot::new(self.list_expenses(user)?))
    }
}

// A document that no longer parses is shown as an empty record rather than
// hiding the whole list.
fn parse_document(data: &str) -> ExpenseDocument {
    serde_json::from_str(data).unwrap_or_default()
}
