//! Full sync cycles against an in-memory remote store double.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_types::{
    ChangeOp, EntityKind, PullRequest, PullResponse, PushRequest, PushResponse, RemoteChange,
};
use async_trait::async_trait;
use chrono::Utc;
use ledger::{BudgetPeriod, Category, Currency, LocalStore, SyncState, Transaction};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use sync::{BackoffConfig, RemoteError, RemoteStore, SyncConfig, SyncEngine, SyncError};
use uuid::Uuid;

/// Scripted remote: acks the first `ack_limit` pushed seqs (all when `None`)
/// and serves a fixed pull batch.
#[derive(Default)]
struct MockRemote {
    ack_limit: Option<usize>,
    pull_changes: Vec<RemoteChange>,
    next_cursor: i64,
    always_timeout: bool,
    pushes: Mutex<Vec<PushRequest>>,
    attempts: AtomicUsize,
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn push(&self, request: PushRequest) -> Result<PushResponse, RemoteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.always_timeout {
            return Err(RemoteError::Timeout);
        }
        let take = self.ack_limit.unwrap_or(request.seqs.len());
        let acked_seqs = request.seqs.iter().copied().take(take).collect();
        self.pushes.lock().unwrap().push(request);
        Ok(PushResponse { acked_seqs })
    }

    async fn pull(&self, _request: PullRequest) -> Result<PullResponse, RemoteError> {
        if self.always_timeout {
            return Err(RemoteError::Timeout);
        }
        Ok(PullResponse {
            changes: self.pull_changes.clone(),
            next_cursor: self.next_cursor,
        })
    }
}

async fn new_store() -> LocalStore {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    LocalStore::new(db)
}

fn engine_for(store: LocalStore, remote: Arc<MockRemote>, backoff: BackoffConfig) -> SyncEngine {
    let config = SyncConfig {
        user_id: "user-1".to_string(),
        device_id: "device-a".to_string(),
        batch_limit: 100,
        backoff,
    };
    SyncEngine::new(store, remote, config)
}

async fn seed_category(store: &LocalStore, name: &str, limit: Option<i64>) -> Category {
    let category = Category::new(name, limit, BudgetPeriod::Monthly, Utc::now()).unwrap();
    store
        .put_category(category, None, Utc::now())
        .await
        .unwrap()
}

#[tokio::test]
async fn full_ack_prunes_journal_and_marks_entities_synced() {
    let store = new_store().await;
    let food = seed_category(&store, "food", None).await;
    let now = Utc::now();
    let tx = Transaction::new(food.id, -1_500, Currency::Usd, now, None, now).unwrap();
    let tx = store.put_transaction(tx, None, now).await.unwrap();

    let remote = Arc::new(MockRemote {
        next_cursor: 2,
        ..Default::default()
    });
    let mut engine = engine_for(store.clone(), remote.clone(), BackoffConfig::default());

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.pushed, 2);
    assert_eq!(report.acked, 2);

    assert_eq!(store.change_log().pending_count().await.unwrap(), 0);
    assert_eq!(
        store.transaction(tx.id).await.unwrap().sync_state,
        SyncState::Synced
    );
    assert_eq!(store.sync_cursor("device-a").await.unwrap(), 2);

    // Pushed changes went out oldest-first with matching seqs.
    let pushes = remote.pushes.lock().unwrap();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].seqs, vec![1, 2]);
    assert_eq!(pushes[0].changes[1].entity_id, tx.id);
    assert_eq!(pushes[0].changes[1].op, ChangeOp::Create);
}

#[tokio::test]
async fn partial_ack_keeps_unconfirmed_records_pending() {
    let store = new_store().await;
    let food = seed_category(&store, "food", None).await;
    let now = Utc::now();
    let tx = Transaction::new(food.id, -900, Currency::Usd, now, None, now).unwrap();
    let tx = store.put_transaction(tx, None, now).await.unwrap();

    // Remote persisted only the category create before the connection died.
    let remote = Arc::new(MockRemote {
        ack_limit: Some(1),
        ..Default::default()
    });
    let mut engine = engine_for(store.clone(), remote, BackoffConfig::default());

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.pushed, 2);
    assert_eq!(report.acked, 1);

    // The transaction's record survives for the next cycle.
    let remaining = store.change_log().drain(100).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].entity_id, tx.id);
    assert_eq!(
        store.transaction(tx.id).await.unwrap().sync_state,
        SyncState::Pending
    );
    assert_eq!(
        store.category(food.id).await.unwrap().sync_state,
        SyncState::Synced
    );
}

#[tokio::test]
async fn pulled_changes_from_other_devices_are_applied() {
    let store = new_store().await;
    let food = seed_category(&store, "food", None).await;

    // Flush local state so the pull is the only thing happening.
    let mut engine = engine_for(
        store.clone(),
        Arc::new(MockRemote::default()),
        BackoffConfig::default(),
    );
    engine.run_cycle().await.unwrap();

    let now = Utc::now();
    let remote_id = Uuid::new_v4();
    let remote_tx = Transaction {
        id: remote_id,
        category_id: food.id,
        amount_minor: -3_000,
        currency: Currency::Usd,
        occurred_at: now,
        note: None,
        revision: 1,
        sync_state: SyncState::Synced,
        updated_at: now,
    };
    let remote = Arc::new(MockRemote {
        pull_changes: vec![RemoteChange {
            entity_kind: EntityKind::Transaction,
            entity_id: remote_id,
            op: ChangeOp::Create,
            payload: serde_json::to_value(&remote_tx).unwrap(),
            base_revision: 0,
            revision: 1,
            updated_at: now,
            device_id: "device-b".to_string(),
        }],
        next_cursor: 5,
        ..Default::default()
    });
    let mut engine = engine_for(store.clone(), remote, BackoffConfig::default());

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.pulled, 1);
    assert_eq!(report.merge.applied, 1);

    let applied = store.transaction(remote_id).await.unwrap();
    assert_eq!(applied.amount_minor, -3_000);
    assert_eq!(applied.sync_state, SyncState::Synced);
    assert_eq!(store.sync_cursor("device-a").await.unwrap(), 5);
}

#[tokio::test]
async fn concurrent_edit_of_same_category_is_flagged_not_overwritten() {
    let store = new_store().await;
    let food = seed_category(&store, "food", Some(10_000)).await;

    // Device B lowered the same budget from the same base while our edit is
    // still unacknowledged.
    let now = Utc::now();
    let mut theirs = food.clone();
    theirs.budget_limit_minor = Some(2_500);
    let remote = Arc::new(MockRemote {
        ack_limit: Some(0),
        pull_changes: vec![RemoteChange {
            entity_kind: EntityKind::Category,
            entity_id: food.id,
            op: ChangeOp::Update,
            payload: serde_json::to_value(&theirs).unwrap(),
            base_revision: 0,
            revision: 1,
            updated_at: now,
            device_id: "device-b".to_string(),
        }],
        next_cursor: 9,
        ..Default::default()
    });
    let mut engine = engine_for(store.clone(), remote, BackoffConfig::default());

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.merge.conflicted, vec![food.id]);
    assert_eq!(report.merge.applied, 0);

    let local = store.category(food.id).await.unwrap();
    assert_eq!(local.sync_state, SyncState::Conflicted);
    assert_eq!(local.budget_limit_minor, Some(10_000));

    let status = engine.status().await.unwrap();
    assert_eq!(status.conflicted, vec![food.id]);
    assert_eq!(status.cursor, 9);
}

#[tokio::test]
async fn repeated_timeouts_surface_unavailable_without_blocking_writes() {
    let store = new_store().await;
    let food = seed_category(&store, "food", None).await;

    let remote = Arc::new(MockRemote {
        always_timeout: true,
        ..Default::default()
    });
    let backoff = BackoffConfig {
        initial: Duration::from_millis(1),
        max: Duration::from_millis(4),
        max_retries: 2,
    };
    let mut engine = engine_for(store.clone(), remote.clone(), backoff);

    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, SyncError::Unavailable(_)));
    assert_eq!(remote.attempts.load(Ordering::SeqCst), 3);

    // Journal untouched, local writes still go through.
    assert_eq!(store.change_log().pending_count().await.unwrap(), 1);
    let now = Utc::now();
    let tx = Transaction::new(food.id, -400, Currency::Usd, now, None, now).unwrap();
    store.put_transaction(tx, None, now).await.unwrap();
    assert_eq!(store.change_log().pending_count().await.unwrap(), 2);
}
