use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::db::Database;
use crate::live::{Subscription, SubscriptionHub};
use crate::models::{
    ExpenseDocument, ExpenseRecord, NewExpense, UpdateExpense, UserId, validate_description,
    validate_value,
};

/// The system of record for a user's expenses.
///
/// `subscribe` yields the complete collection at `users/{user}/expenses`,
/// ordered by date descending, once immediately and again after every change.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn subscribe(&self, user: &UserId) -> Result<Subscription>;
    async fn delete(&self, user: &UserId, id: &str) -> Result<()>;
}

struct StoreInner {
    db: Mutex<Database>,
    hub: SubscriptionHub,
}

/// SQLite-backed [`ExpenseStore`].
///
/// Mutations made through this handle are published to subscribers right
/// away; commits from other connections are picked up by
/// [`SqliteStore::watch_external_changes`].
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<StoreInner>,
}

impl SqliteStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                db: Mutex::new(db),
                hub: SubscriptionHub::new(),
            }),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        lock_db(&self.inner)
    }

    /// Republish the user's collection. Must be called with the database lock
    /// held so subscribers see snapshots in commit order.
    fn publish_locked(inner: &StoreInner, db: &Database, user: &UserId) -> Result<()> {
        if inner.hub.is_empty() {
            return Ok(());
        }
        let snapshot = db.snapshot(user)?;
        let delivered = inner.hub.publish(user, &snapshot);
        debug!(
            path = %user.expenses_path(),
            records = snapshot.records.len(),
            delivered,
            "snapshot published"
        );
        Ok(())
    }

    pub fn add_expense(&self, user: &UserId, expense: &NewExpense) -> Result<ExpenseRecord> {
        let expense = NewExpense {
            description: validate_description(&expense.description)?,
            value: validate_value(expense.value)?,
            date: expense.date,
        };
        let db = self.db()?;
        let record = db.insert_expense(user, &expense)?;
        Self::publish_locked(&self.inner, &db, user)?;
        Ok(record)
    }

    pub fn update_expense(
        &self,
        user: &UserId,
        id: &str,
        update: &UpdateExpense,
    ) -> Result<ExpenseRecord> {
        if update.is_empty() {
            bail!("Nothing to update. Provide at least one of description, value, or date");
        }
        let update = UpdateExpense {
            description: update
                .description
                .as_deref()
                .map(validate_description)
                .transpose()?,
            value: update.value.map(validate_value).transpose()?,
            date: update.date,
        };
        let db = self.db()?;
        let record = db.update_expense(user, id, &update)?;
        Self::publish_locked(&self.inner, &db, user)?;
        Ok(record)
    }

    pub fn get_expense(&self, user: &UserId, id: &str) -> Result<ExpenseRecord> {
        self.db()?.get_expense(user, id)
    }

    pub fn list_expenses(&self, user: &UserId) -> Result<Vec<ExpenseRecord>> {
        self.db()?.list_expenses(user)
    }

    /// Store raw documents as-is, all or nothing. Documents carrying a string
    /// `id` keep it; the rest get a fresh one. Returns the number written.
    pub fn import_documents(&self, user: &UserId, docs: &[ExpenseDocument]) -> Result<usize> {
        let entries: Vec<(String, ExpenseDocument)> = docs
            .iter()
            .map(|doc| {
                let id = doc
                    .get("id")
                    .and_then(serde_json::Value::as_str)
                    .filter(|id| !id.trim().is_empty())
                    .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
                let mut doc = doc.clone();
                doc.remove("id");
                (id, doc)
            })
            .collect();

        let db = self.db()?;
        let count = db.insert_documents(user, &entries)?;
        Self::publish_locked(&self.inner, &db, user)?;
        info!(path = %user.expenses_path(), count, "documents imported");
        Ok(count)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.hub.len()
    }

    /// Poll `PRAGMA data_version` every `period` and republish every
    /// subscribed user's collection when another connection has committed.
    /// The task ends once the last handle to this store is dropped.
    pub fn watch_external_changes(&self, period: Duration) -> Result<JoinHandle<()>> {
        // Baseline is taken now so commits landing before the first tick
        // still count as changes.
        let baseline = self.db()?.data_version()?;
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut last_version = baseline;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("store dropped, external change watcher stopping");
                    break;
                };
                if let Err(e) = Self::check_external_changes(&inner, &mut last_version) {
                    error!("external change check failed: {e:#}");
                }
            }
        }))
    }

    fn check_external_changes(inner: &StoreInner, last_version: &mut i64) -> Result<()> {
        let db = lock_db(inner)?;
        let version = db.data_version()?;
        if version == *last_version {
            return Ok(());
        }
        *last_version = version;
        debug!(version, "external commit detected");
        for user in inner.hub.subscribed_users() {
            Self::publish_locked(inner, &db, &user)?;
        }
        Ok(())
    }
}

fn lock_db(inner: &StoreInner) -> Result<MutexGuard<'_, Database>> {
    inner
        .db
        .lock()
        .map_err(|_| anyhow!("Database lock poisoned"))
}

#[async_trait]
impl ExpenseStore for SqliteStore {
    async fn subscribe(&self, user: &UserId) -> Result<Subscription> {
        let db = self.db()?;
        let snapshot = db.snapshot(user)?;
        let records = snapshot.records.len();
        // Initial load is queued under the same lock as later mutations.
        let subscription = self.inner.hub.register_with_snapshot(user, snapshot);
        debug!(path = %user.expenses_path(), records, "subscribed");
        Ok(subscription)
    }

    async fn delete(&self, user: &UserId, id: &str) -> Result<()> {
        let db = self.db()?;
        if !db.delete_expense(user, id)? {
            bail!("Expense {id} not found");
        }
        Self::publish_locked(&self.inner, &db, user)?;
        info!(path = %user.expenses_path(), id, "expense deleted");
        Ok(())
    }
}
