//! The expense list: a live, ordered view of one user's expenses with a
//! running total, plus the delete/edit/add/account intents offered on it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::ListError;
use crate::live::Subscription;
use crate::models::{ExpenseRecord, Snapshot, UserId, format_amount, total};
use crate::store::ExpenseStore;

pub const ERROR_TITLE: &str = "Erro";
pub const DELETE_FAILED: &str = "Não foi possível excluir o gasto.";
pub const LOAD_FAILED: &str = "Não foi possível carregar os gastos.";
pub const EDIT_MISSING_ID: &str = "Este item não possui um ID válido e não pode ser editado.";
pub const DELETE_MISSING_ID: &str = "Este item não possui um ID válido e não pode ser excluído.";

/// Screens reachable from the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Add,
    Edit { id: String },
    Account,
}

impl Route {
    #[must_use]
    pub fn screen_name(&self) -> &'static str {
        match self {
            Route::Add => "Add",
            Route::Edit { .. } => "Edit",
            Route::Account => "Account",
        }
    }
}

/// Fire-and-forget screen transitions.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self {
            title: ERROR_TITLE.to_string(),
            message: message.to_string(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub list: Vec<ExpenseRecord>,
    pub total: f64,
}

impl ViewState {
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let total = total(&snapshot.records);
        Self {
            list: snapshot.records,
            total,
        }
    }

    #[must_use]
    pub fn rows(&self) -> Vec<ExpenseRow> {
        self.list.iter().map(ExpenseRow::from_record).collect()
    }

    #[must_use]
    pub fn formatted_total(&self) -> String {
        format_amount(self.total)
    }
}

/// What the view renders for a single list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpenseRow {
    pub id: Option<String>,
    pub description: String,
    pub date: String,
    pub value: String,
}

impl ExpenseRow {
    #[must_use]
    pub fn from_record(record: &ExpenseRecord) -> Self {
        Self {
            id: record.id.clone(),
            description: record.description.clone(),
            date: record.date.display(),
            value: format_amount(record.amount()),
        }
    }
}

pub struct ExpenseListController {
    store: Arc<dyn ExpenseStore>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    user: Option<UserId>,
    subscription: Option<Subscription>,
    view: ViewState,
}

impl ExpenseListController {
    #[must_use]
    pub fn new(
        store: Arc<dyn ExpenseStore>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            navigator,
            notifier,
            user: None,
            subscription: None,
            view: ViewState::default(),
        }
    }

    #[must_use]
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    #[must_use]
    pub fn rows(&self) -> Vec<ExpenseRow> {
        self.view.rows()
    }

    #[must_use]
    pub fn formatted_total(&self) -> String {
        self.view.formatted_total()
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// Start following `user`'s expenses. Without a user the controller stays
    /// inert: no store call, empty list.
    pub async fn subscribe(&mut self, user: Option<UserId>) -> Result<(), ListError> {
        self.unsubscribe();
        self.view = ViewState::default();
        self.user = user;

        let Some(user) = self.user.as_ref() else {
            debug!("no signed-in user, list stays empty");
            return Ok(());
        };

        match self.store.subscribe(user).await {
            Ok(subscription) => {
                debug!(path = %user.expenses_path(), "list subscribed");
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(e) => {
                error!(path = %user.expenses_path(), "subscribe failed: {e:#}");
                self.notifier.notify(Notice::error(LOAD_FAILED));
                Err(ListError::store("load expenses", e))
            }
        }
    }

    /// Wait for the next snapshot and apply it. `None` when not subscribed or
    /// when the store has closed the subscription.
    pub async fn next_update(&mut self) -> Option<&ViewState> {
        let subscription = self.subscription.as_mut()?;
        match subscription.next().await {
            Some(snapshot) => {
                self.apply_snapshot(snapshot);
                Some(&self.view)
            }
            None => {
                debug!("subscription closed by store");
                self.subscription = None;
                None
            }
        }
    }

    /// Replace the whole list with `snapshot` and recompute the total.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.view = ViewState::from_snapshot(snapshot);
        debug!(
            records = self.view.list.len(),
            total = self.view.total,
            "snapshot applied"
        );
    }

    /// Release the live subscription. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
            debug!("list unsubscribed");
        }
    }

    /// Ask the store to remove a record. The list itself only changes when
    /// the store's next snapshot arrives.
    pub async fn delete(&self, record_id: Option<&str>) -> Result<(), ListError> {
        let Some(user) = self.user.as_ref() else {
            debug!("delete ignored, no signed-in user");
            return Err(ListError::Unauthenticated);
        };
        let Some(id) = record_id.filter(|id| !id.trim().is_empty()) else {
            self.notifier.notify(Notice::error(DELETE_MISSING_ID));
            return Err(ListError::MissingIdentifier);
        };

        match self.store.delete(user, id).await {
            Ok(()) => {
                info!(path = %user.expenses_path(), id, "delete requested");
                Ok(())
            }
            Err(e) => {
                error!(path = %user.expenses_path(), id, "delete failed: {e:#}");
                self.notifier.notify(Notice::error(DELETE_FAILED));
                Err(ListError::store("delete expense", e))
            }
        }
    }

    pub fn edit(&self, record: &ExpenseRecord) -> Result<(), ListError> {
        match record.id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                self.navigator.navigate(Route::Edit { id: id.to_string() });
                Ok(())
            }
            None => {
                self.notifier.notify(Notice::error(EDIT_MISSING_ID));
                Err(ListError::MissingIdentifier)
            }
        }
    }

    pub fn add(&self) {
        self.navigator.navigate(Route::Add);
    }

    pub fn open_account(&self) {
        self.navigator.navigate(Route::Account);
    }
}

impl Drop for ExpenseListController {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::SubscriptionHub;
    use crate::models::ExpenseDocument;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        hub: SubscriptionHub,
        subscribe_calls: Mutex<u32>,
        deletes: Mutex<Vec<String>>,
        fail_delete: Option<String>,
        fail_subscribe: bool,
    }

    impl FakeStore {
        fn failing_delete(reason: &str) -> Self {
            Self {
                fail_delete: Some(reason.to_string()),
                ..Default::default()
            }
        }

        fn interactions(&self) -> usize {
            *self.subscribe_calls.lock().unwrap() as usize + self.deletes.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ExpenseStore for FakeStore {
        async fn subscribe(&self, user: &UserId) -> Result<Subscription> {
            *self.subscribe_calls.lock().unwrap() += 1;
            if self.fail_subscribe {
                return Err(anyhow!("offline"));
            }
            Ok(self.hub.register(user))
        }

        async fn delete(&self, _user: &UserId, id: &str) -> Result<()> {
            self.deletes.lock().unwrap().push(id.to_string());
            match &self.fail_delete {
                Some(reason) => Err(anyhow!("{reason}")),
                None => Ok(()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        routes: Mutex<Vec<Route>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, route: Route) {
            self.routes.lock().unwrap().push(route);
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<Notice>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }
    }

    struct Harness {
        store: Arc<FakeStore>,
        navigator: Arc<RecordingNavigator>,
        notifier: Arc<RecordingNotifier>,
        controller: ExpenseListController,
    }

    fn harness_with(store: FakeStore) -> Harness {
        let store = Arc::new(store);
        let navigator = Arc::new(RecordingNavigator::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let controller = ExpenseListController::new(
            store.clone(),
            navigator.clone(),
            notifier.clone(),
        );
        Harness {
            store,
            navigator,
            notifier,
            controller,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeStore::default())
    }

    fn alice() -> UserId {
        UserId::parse("alice").unwrap()
    }

    fn record(id: Option<&str>, doc: serde_json::Value) -> ExpenseRecord {
        let doc: ExpenseDocument = doc.as_object().cloned().unwrap();
        ExpenseRecord::from_document(id.map(str::to_string), &doc)
    }

    fn sample_snapshot() -> Snapshot {
        Snapshot::new(vec![
            record(
                Some("a"),
                json!({"description": "Mercado", "value": 10, "date": {"seconds": 1_718_452_800, "nanoseconds": 0}}),
            ),
            record(
                Some("b"),
                json!({"description": "Padaria", "value": 5.5, "date": "2024-06-14"}),
            ),
        ])
    }

    #[tokio::test]
    async fn test_snapshot_sets_list_and_total() {
        let mut h = harness();
        h.controller.subscribe(Some(alice())).await.unwrap();
        h.store.hub.publish(&alice(), &sample_snapshot());

        let view = h.controller.next_update().await.unwrap();
        assert!((view.total - 15.5).abs() < f64::EPSILON);
        let ids: Vec<_> = view.list.iter().map(|r| r.id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(h.controller.formatted_total(), "R$ 15.50");
    }

    #[tokio::test]
    async fn test_total_is_recomputed_for_each_snapshot() {
        let mut h = harness();
        h.controller.subscribe(Some(alice())).await.unwrap();
        let snapshots = vec![
            sample_snapshot(),
            Snapshot::new(vec![record(Some("c"), json!({"value": 99.9}))]),
            Snapshot::default(),
            Snapshot::new(vec![
                record(Some("d"), json!({"value": -2})),
                record(Some("e"), json!({"value": 7})),
            ]),
        ];
        for snapshot in &snapshots {
            h.store.hub.publish(&alice(), snapshot);
        }
        for snapshot in &snapshots {
            let view = h.controller.next_update().await.unwrap();
            assert_eq!(view.list, snapshot.records);
            assert!((view.total - snapshot.total()).abs() < 1e-9);
        }
        assert!((h.controller.view().total - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_user_means_no_store_interaction() {
        let mut h = harness();
        h.controller.subscribe(None).await.unwrap();

        assert!(!h.controller.is_subscribed());
        assert!(h.controller.view().list.is_empty());
        assert_eq!(h.controller.view().total, 0.0);
        assert!(h.controller.next_update().await.is_none());
        assert!(matches!(
            h.controller.delete(Some("a")).await,
            Err(ListError::Unauthenticated)
        ));
        assert_eq!(h.store.interactions(), 0);
        assert!(h.notifier.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_twice_is_same_as_once() {
        let mut h = harness();
        h.controller.subscribe(Some(alice())).await.unwrap();
        assert_eq!(h.store.hub.len(), 1);

        h.controller.unsubscribe();
        let after_once = (h.controller.is_subscribed(), h.store.hub.len(), h.controller.view().clone());
        h.controller.unsubscribe();
        let after_twice = (h.controller.is_subscribed(), h.store.hub.len(), h.controller.view().clone());

        assert_eq!(after_once, after_twice);
        assert_eq!(h.store.hub.len(), 0);
        assert_eq!(h.store.hub.publish(&alice(), &sample_snapshot()), 0);
        assert!(h.controller.next_update().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_controller_releases_subscription() {
        let mut h = harness();
        h.controller.subscribe(Some(alice())).await.unwrap();
        let hub = h.store.hub.clone();
        assert_eq!(hub.len(), 1);
        drop(h.controller);
        assert_eq!(hub.len(), 0);
    }

    #[tokio::test]
    async fn test_resubscribe_releases_previous_subscription() {
        let mut h = harness();
        h.controller.subscribe(Some(alice())).await.unwrap();
        h.controller
            .subscribe(Some(UserId::parse("bob").unwrap()))
            .await
            .unwrap();
        assert_eq!(h.store.hub.len(), 1);
        assert_eq!(h.store.hub.subscribed_users(), vec![UserId::parse("bob").unwrap()]);
    }

    #[tokio::test]
    async fn test_delete_issues_one_remove_and_leaves_list_alone() {
        let mut h = harness();
        h.controller.subscribe(Some(alice())).await.unwrap();
        h.store.hub.publish(&alice(), &sample_snapshot());
        h.controller.next_update().await.unwrap();

        h.controller.delete(Some("a")).await.unwrap();
        assert_eq!(*h.store.deletes.lock().unwrap(), vec!["a".to_string()]);
        assert_eq!(h.controller.view().list.len(), 2);

        h.store.hub.publish(
            &alice(),
            &Snapshot::new(vec![sample_snapshot().records[1].clone()]),
        );
        let view = h.controller.next_update().await.unwrap();
        assert_eq!(view.list.len(), 1);
        assert!((view.total - 5.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_delete_without_id_notifies_and_skips_store() {
        let mut h = harness();
        h.controller.subscribe(Some(alice())).await.unwrap();

        for id in [None, Some(""), Some("   ")] {
            assert!(matches!(
                h.controller.delete(id).await,
                Err(ListError::MissingIdentifier)
            ));
        }
        assert!(h.store.deletes.lock().unwrap().is_empty());
        let notices = h.notifier.notices.lock().unwrap();
        assert_eq!(notices.len(), 3);
        assert_eq!(notices[0], Notice::error(DELETE_MISSING_ID));
    }

    #[tokio::test]
    async fn test_failed_delete_notifies_without_retry() {
        let mut h = harness_with(FakeStore::failing_delete("network down"));
        h.controller.subscribe(Some(alice())).await.unwrap();
        h.store.hub.publish(&alice(), &sample_snapshot());
        h.controller.next_update().await.unwrap();

        let err = h.controller.delete(Some("b")).await.unwrap_err();
        assert!(matches!(err, ListError::StoreOperationFailure { .. }));
        assert!(err.to_string().contains("network down"));
        assert_eq!(h.store.deletes.lock().unwrap().len(), 1);
        assert_eq!(
            *h.notifier.notices.lock().unwrap(),
            vec![Notice::error(DELETE_FAILED)]
        );
        assert_eq!(h.controller.view().list.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_subscribe_notifies_and_stays_unsubscribed() {
        let mut h = harness_with(FakeStore {
            fail_subscribe: true,
            ..Default::default()
        });
        let err = h.controller.subscribe(Some(alice())).await.unwrap_err();
        assert!(matches!(err, ListError::StoreOperationFailure { .. }));
        assert!(!h.controller.is_subscribed());
        assert_eq!(
            *h.notifier.notices.lock().unwrap(),
            vec![Notice::error(LOAD_FAILED)]
        );
    }

    #[test]
    fn test_edit_navigates_with_id() {
        let h = harness();
        h.controller
            .edit(&record(Some("a"), json!({"value": 1})))
            .unwrap();
        assert_eq!(
            *h.navigator.routes.lock().unwrap(),
            vec![Route::Edit { id: "a".to_string() }]
        );
    }

    #[test]
    fn test_edit_without_id_notifies() {
        let h = harness();
        let result = h.controller.edit(&record(None, json!({"value": 1})));
        assert!(matches!(result, Err(ListError::MissingIdentifier)));
        assert!(h.navigator.routes.lock().unwrap().is_empty());
        assert_eq!(
            *h.notifier.notices.lock().unwrap(),
            vec![Notice::error(EDIT_MISSING_ID)]
        );
    }

    #[test]
    fn test_add_and_account_navigation() {
        let h = harness();
        h.controller.add();
        h.controller.open_account();
        let routes = h.navigator.routes.lock().unwrap();
        assert_eq!(*routes, vec![Route::Add, Route::Account]);
        assert_eq!(routes[1].screen_name(), "Account");
    }

    #[test]
    fn test_rows_render_without_value_or_date() {
        let mut h = harness();
        h.controller.apply_snapshot(Snapshot::new(vec![
            record(Some("a"), json!({"description": "Sem valor", "date": "2024-06-15"})),
            record(Some("b"), json!({"description": "Data estranha", "value": 3, "date": [2024, 6, 15]})),
        ]));

        let rows = h.controller.rows();
        assert_eq!(
            rows[0],
            ExpenseRow {
                id: Some("a".to_string()),
                description: "Sem valor".to_string(),
                date: "15/06/2024".to_string(),
                value: "R$ 0.00".to_string(),
            }
        );
        assert_eq!(rows[1].date, "Sem data");
        assert_eq!(rows[1].value, "R$ 3.00");
        assert!((h.controller.view().total - 3.0).abs() < f64::EPSILON);
    }
}
