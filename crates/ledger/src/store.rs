//! The Local Store: durable on-device storage for transactions and
//! categories.
//!
//! Every write commits the entity row and its change-log record in one
//! database transaction, so a mutation is durable if and only if it is
//! journaled. Reads return the latest locally-known revision. Optimistic
//! concurrency: updates and deletes carry the revision the caller last saw
//! and fail with `Conflict` when it no longer matches.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, DatabaseTransaction, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
    prelude::*,
};
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::{
    Category, ChangeLog, ChangeRecord, LedgerError, ResultLedger, SyncState, Transaction,
    categories, change_log,
    change_log::{ChangeOp, EntityKind},
    sync_cursor, transactions,
};

/// Run a block inside a DB transaction, committing on success.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

/// One remote change handed to [`LocalStore::merge_remote_batch`].
///
/// The sync crate maps wire records into this shape so the ledger stays
/// ignorant of transport types.
#[derive(Clone, Debug)]
pub struct IncomingChange {
    pub op: ChangeOp,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub payload: serde_json::Value,
    pub base_revision: i64,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
    pub origin_device: String,
}

/// Result of merging one pulled batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub applied: usize,
    /// Entities flagged `conflicted` for the user to resolve.
    pub conflicted: Vec<Uuid>,
    /// Own-device echoes and changes older than local state.
    pub skipped: usize,
}

#[derive(Clone, Debug)]
pub struct LocalStore {
    database: DatabaseConnection,
}

impl LocalStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    /// Journal view over the same database.
    pub fn change_log(&self) -> ChangeLog {
        ChangeLog::new(self.database.clone())
    }

    // ───────────────────────────────────────────────────────────────────
    // Transactions
    // ───────────────────────────────────────────────────────────────────

    /// Creates (`expected_revision = None`) or updates a transaction.
    ///
    /// On update the stored revision must equal `expected_revision`,
    /// otherwise `Conflict` is returned and nothing is written. The stored
    /// entity comes back with its new revision and `Pending` sync state.
    pub async fn put_transaction(
        &self,
        tx: Transaction,
        expected_revision: Option<i64>,
        now: DateTime<Utc>,
    ) -> ResultLedger<Transaction> {
        with_tx!(self, |db_tx| {
            let existing = transactions::Entity::find_by_id(tx.id.to_string())
                .one(&db_tx)
                .await?;

            let (base_revision, op) = match (expected_revision, existing) {
                (None, None) => (0, ChangeOp::Create),
                (None, Some(row)) => {
                    return Err(LedgerError::Conflict {
                        expected: 0,
                        found: row.revision,
                    });
                }
                (Some(_), None) => {
                    return Err(LedgerError::NotFound(tx.id.to_string()));
                }
                (Some(expected), Some(row)) => {
                    if row.revision != expected {
                        return Err(LedgerError::Conflict {
                            expected,
                            found: row.revision,
                        });
                    }
                    (expected, ChangeOp::Update)
                }
            };

            let mut stored = tx;
            stored.revision = base_revision + 1;
            stored.sync_state = SyncState::Pending;
            stored.updated_at = now;

            let payload = serde_json::to_value(&stored)
                .map_err(|err| LedgerError::DataCorruption(format!("encode transaction: {err}")))?;

            let model = transactions::ActiveModel::from(&stored);
            match op {
                ChangeOp::Create => {
                    model.insert(&db_tx).await?;
                }
                _ => {
                    model.update(&db_tx).await?;
                }
            }

            change_log::append(
                &db_tx,
                op,
                EntityKind::Transaction,
                stored.id,
                base_revision,
                stored.revision,
                &payload,
                now,
            )
            .await?;

            Ok(stored)
        })
    }

    /// Deletes a transaction, journaling a tombstone.
    pub async fn delete_transaction(
        &self,
        id: Uuid,
        expected_revision: i64,
        now: DateTime<Utc>,
    ) -> ResultLedger<()> {
        with_tx!(self, |db_tx| {
            let row = transactions::Entity::find_by_id(id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
            if row.revision != expected_revision {
                return Err(LedgerError::Conflict {
                    expected: expected_revision,
                    found: row.revision,
                });
            }

            transactions::Entity::delete_by_id(id.to_string())
                .exec(&db_tx)
                .await?;

            change_log::append(
                &db_tx,
                ChangeOp::Delete,
                EntityKind::Transaction,
                id,
                expected_revision,
                expected_revision + 1,
                &serde_json::json!({}),
                now,
            )
            .await?;

            Ok(())
        })
    }

    pub async fn transaction(&self, id: Uuid) -> ResultLedger<Transaction> {
        let model = transactions::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        Transaction::try_from(model)
    }

    /// All transactions, newest-first by occurrence.
    pub async fn transactions(&self) -> ResultLedger<Vec<Transaction>> {
        let models = transactions::Entity::find()
            .order_by_desc(transactions::Column::OccurredAt)
            .all(&self.database)
            .await?;
        models.into_iter().map(Transaction::try_from).collect()
    }

    pub async fn transactions_for_category(
        &self,
        category_id: Uuid,
    ) -> ResultLedger<Vec<Transaction>> {
        let models = transactions::Entity::find()
            .filter(transactions::Column::CategoryId.eq(category_id.to_string()))
            .order_by_desc(transactions::Column::OccurredAt)
            .all(&self.database)
            .await?;
        models.into_iter().map(Transaction::try_from).collect()
    }

    // ───────────────────────────────────────────────────────────────────
    // Categories
    // ───────────────────────────────────────────────────────────────────

    /// Creates (`expected_revision = None`) or updates a category.
    pub async fn put_category(
        &self,
        category: Category,
        expected_revision: Option<i64>,
        now: DateTime<Utc>,
    ) -> ResultLedger<Category> {
        with_tx!(self, |db_tx| {
            let existing = categories::Entity::find_by_id(category.id.to_string())
                .one(&db_tx)
                .await?;

            let (base_revision, op) = match (expected_revision, existing) {
                (None, None) => (0, ChangeOp::Create),
                (None, Some(row)) => {
                    return Err(LedgerError::Conflict {
                        expected: 0,
                        found: row.revision,
                    });
                }
                (Some(_), None) => {
                    return Err(LedgerError::NotFound(category.id.to_string()));
                }
                (Some(expected), Some(row)) => {
                    if row.revision != expected {
                        return Err(LedgerError::Conflict {
                            expected,
                            found: row.revision,
                        });
                    }
                    (expected, ChangeOp::Update)
                }
            };

            let mut stored = category;
            stored.revision = base_revision + 1;
            stored.sync_state = SyncState::Pending;
            stored.updated_at = now;

            let payload = serde_json::to_value(&stored)
                .map_err(|err| LedgerError::DataCorruption(format!("encode category: {err}")))?;

            let model = categories::ActiveModel::from(&stored);
            match op {
                ChangeOp::Create => {
                    model.insert(&db_tx).await?;
                }
                _ => {
                    model.update(&db_tx).await?;
                }
            }

            change_log::append(
                &db_tx,
                op,
                EntityKind::Category,
                stored.id,
                base_revision,
                stored.revision,
                &payload,
                now,
            )
            .await?;

            Ok(stored)
        })
    }

    /// Deletes a category, journaling a tombstone.
    ///
    /// Refused while transactions still reference it.
    pub async fn delete_category(
        &self,
        id: Uuid,
        expected_revision: i64,
        now: DateTime<Utc>,
    ) -> ResultLedger<()> {
        with_tx!(self, |db_tx| {
            let row = categories::Entity::find_by_id(id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
            if row.revision != expected_revision {
                return Err(LedgerError::Conflict {
                    expected: expected_revision,
                    found: row.revision,
                });
            }

            let in_use = transactions::Entity::find()
                .filter(transactions::Column::CategoryId.eq(id.to_string()))
                .count(&db_tx)
                .await?;
            if in_use > 0 {
                return Err(LedgerError::InvalidInput(format!(
                    "category {id} still has {in_use} transactions"
                )));
            }

            categories::Entity::delete_by_id(id.to_string())
                .exec(&db_tx)
                .await?;

            change_log::append(
                &db_tx,
                ChangeOp::Delete,
                EntityKind::Category,
                id,
                expected_revision,
                expected_revision + 1,
                &serde_json::json!({}),
                now,
            )
            .await?;

            Ok(())
        })
    }

    pub async fn category(&self, id: Uuid) -> ResultLedger<Category> {
        let model = categories::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        Category::try_from(model)
    }

    pub async fn category_by_name(&self, name: &str) -> ResultLedger<Category> {
        let model = categories::Entity::find()
            .filter(categories::Column::Name.eq(name))
            .one(&self.database)
            .await?
            .ok_or_else(|| LedgerError::NotFound(name.to_string()))?;
        Category::try_from(model)
    }

    pub async fn categories(&self) -> ResultLedger<Vec<Category>> {
        let models = categories::Entity::find()
            .order_by_asc(categories::Column::Name)
            .all(&self.database)
            .await?;
        models.into_iter().map(Category::try_from).collect()
    }

    /// Entities currently flagged `conflicted`, for the status surface.
    pub async fn conflicted_ids(&self) -> ResultLedger<Vec<Uuid>> {
        let mut out = Vec::new();
        let tx_models = transactions::Entity::find()
            .filter(transactions::Column::SyncState.eq(SyncState::Conflicted.as_str()))
            .all(&self.database)
            .await?;
        for model in tx_models {
            out.push(Uuid::parse_str(&model.id).map_err(|_| {
                LedgerError::DataCorruption(format!("bad transaction id: {}", model.id))
            })?);
        }
        let cat_models = categories::Entity::find()
            .filter(categories::Column::SyncState.eq(SyncState::Conflicted.as_str()))
            .all(&self.database)
            .await?;
        for model in cat_models {
            out.push(Uuid::parse_str(&model.id).map_err(|_| {
                LedgerError::DataCorruption(format!("bad category id: {}", model.id))
            })?);
        }
        out.sort_unstable();
        Ok(out)
    }

    // ───────────────────────────────────────────────────────────────────
    // Sync support
    // ───────────────────────────────────────────────────────────────────

    /// Marks entities `synced` once their journal records were acknowledged
    /// and nothing newer is pending for them. `Conflicted` rows keep their
    /// flag until the user resolves them.
    pub async fn finalize_acked(&self, acked: &[ChangeRecord]) -> ResultLedger<()> {
        let mut seen: Vec<(EntityKind, Uuid)> = Vec::new();
        for record in acked {
            let key = (record.entity_kind, record.entity_id);
            if !seen.contains(&key) {
                seen.push(key);
            }
        }

        for (kind, id) in seen {
            let remaining = change_log::Entity::find()
                .filter(change_log::Column::EntityKind.eq(kind.as_str()))
                .filter(change_log::Column::EntityId.eq(id.to_string()))
                .count(&self.database)
                .await?;
            if remaining > 0 {
                continue;
            }

            match kind {
                EntityKind::Transaction => {
                    let Some(row) = transactions::Entity::find_by_id(id.to_string())
                        .one(&self.database)
                        .await?
                    else {
                        continue; // deleted entity, tombstone acked
                    };
                    if row.sync_state == SyncState::Pending.as_str() {
                        let model = transactions::ActiveModel {
                            id: ActiveValue::Set(id.to_string()),
                            sync_state: ActiveValue::Set(SyncState::Synced.as_str().to_string()),
                            ..Default::default()
                        };
                        model.update(&self.database).await?;
                    }
                }
                EntityKind::Category => {
                    let Some(row) = categories::Entity::find_by_id(id.to_string())
                        .one(&self.database)
                        .await?
                    else {
                        continue;
                    };
                    if row.sync_state == SyncState::Pending.as_str() {
                        let model = categories::ActiveModel {
                            id: ActiveValue::Set(id.to_string()),
                            sync_state: ActiveValue::Set(SyncState::Synced.as_str().to_string()),
                            ..Default::default()
                        };
                        model.update(&self.database).await?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Applies one pulled batch and advances the cursor, all-or-nothing.
    ///
    /// Per change:
    /// - own-device echoes are skipped;
    /// - an entity with unacknowledged local records and a divergent
    ///   revision base is flagged `conflicted`, never overwritten — if the
    ///   entity was deleted locally the remote snapshot is re-inserted with
    ///   the flag (a remote delete meeting a local delete is no conflict);
    /// - otherwise last-writer-wins by `updated_at`.
    pub async fn merge_remote_batch(
        &self,
        changes: &[IncomingChange],
        device_id: &str,
        next_cursor: i64,
        now: DateTime<Utc>,
    ) -> ResultLedger<MergeOutcome> {
        with_tx!(self, |db_tx| {
            let mut outcome = MergeOutcome::default();

            for change in changes {
                if change.origin_device == device_id {
                    outcome.skipped += 1;
                    continue;
                }

                let local_revision = self
                    .local_revision(&db_tx, change.entity_kind, change.entity_id)
                    .await?;
                let has_pending = self
                    .pending_exists(&db_tx, change.entity_kind, change.entity_id)
                    .await?;

                if has_pending && change.base_revision < local_revision.unwrap_or(i64::MAX) {
                    if local_revision.is_none() && change.op == ChangeOp::Delete {
                        // Deleted on both sides; nothing left to disagree about.
                        outcome.skipped += 1;
                        continue;
                    }
                    self.flag_conflicted(&db_tx, change).await?;
                    if !outcome.conflicted.contains(&change.entity_id) {
                        outcome.conflicted.push(change.entity_id);
                    }
                    continue;
                }

                if self.apply_change(&db_tx, change).await? {
                    outcome.applied += 1;
                } else {
                    outcome.skipped += 1;
                }
            }

            sync_cursor::set(&db_tx, device_id, next_cursor, now).await?;

            Ok(outcome)
        })
    }

    /// Persisted high-water mark into the remote change stream for a device.
    pub async fn sync_cursor(&self, device_id: &str) -> ResultLedger<i64> {
        sync_cursor::get(&self.database, device_id).await
    }

    /// Rebuilds store state by applying change records oldest-first.
    ///
    /// Intended for an empty store; snapshots are written verbatim without
    /// journaling, so replaying a journal reproduces exactly the state that
    /// produced it.
    pub async fn replay_records(&self, records: &[ChangeRecord]) -> ResultLedger<()> {
        with_tx!(self, |db_tx| {
            for record in records {
                match (record.entity_kind, record.op) {
                    (EntityKind::Transaction, ChangeOp::Delete) => {
                        transactions::Entity::delete_by_id(record.entity_id.to_string())
                            .exec(&db_tx)
                            .await?;
                    }
                    (EntityKind::Transaction, _) => {
                        let tx: Transaction = serde_json::from_value(record.payload.clone())
                            .map_err(|err| {
                                LedgerError::DataCorruption(format!("replay transaction: {err}"))
                            })?;
                        upsert_transaction_row(&db_tx, &tx).await?;
                    }
                    (EntityKind::Category, ChangeOp::Delete) => {
                        categories::Entity::delete_by_id(record.entity_id.to_string())
                            .exec(&db_tx)
                            .await?;
                    }
                    (EntityKind::Category, _) => {
                        let category: Category = serde_json::from_value(record.payload.clone())
                            .map_err(|err| {
                                LedgerError::DataCorruption(format!("replay category: {err}"))
                            })?;
                        upsert_category_row(&db_tx, &category).await?;
                    }
                }
            }
            Ok(())
        })
    }

    async fn local_revision(
        &self,
        db_tx: &DatabaseTransaction,
        kind: EntityKind,
        id: Uuid,
    ) -> ResultLedger<Option<i64>> {
        let revision = match kind {
            EntityKind::Transaction => transactions::Entity::find_by_id(id.to_string())
                .one(db_tx)
                .await?
                .map(|row| row.revision),
            EntityKind::Category => categories::Entity::find_by_id(id.to_string())
                .one(db_tx)
                .await?
                .map(|row| row.revision),
        };
        Ok(revision)
    }

    async fn pending_exists(
        &self,
        db_tx: &DatabaseTransaction,
        kind: EntityKind,
        id: Uuid,
    ) -> ResultLedger<bool> {
        let count = change_log::Entity::find()
            .filter(change_log::Column::EntityKind.eq(kind.as_str()))
            .filter(change_log::Column::EntityId.eq(id.to_string()))
            .count(db_tx)
            .await?;
        Ok(count > 0)
    }

    /// Marks the entity `conflicted` so it stays on the status surface until
    /// the user resolves it.
    ///
    /// When the local row was deleted (tombstone still in the journal) the
    /// remote snapshot is re-inserted flagged `conflicted`, so the conflict
    /// survives the cycle instead of the delete silently winning.
    async fn flag_conflicted(
        &self,
        db_tx: &DatabaseTransaction,
        change: &IncomingChange,
    ) -> ResultLedger<()> {
        match change.entity_kind {
            EntityKind::Transaction => {
                if transactions::Entity::find_by_id(change.entity_id.to_string())
                    .one(db_tx)
                    .await?
                    .is_some()
                {
                    let model = transactions::ActiveModel {
                        id: ActiveValue::Set(change.entity_id.to_string()),
                        sync_state: ActiveValue::Set(SyncState::Conflicted.as_str().to_string()),
                        ..Default::default()
                    };
                    model.update(db_tx).await?;
                } else {
                    let mut tx: Transaction = serde_json::from_value(change.payload.clone())
                        .map_err(|err| {
                            LedgerError::DataCorruption(format!(
                                "decode conflicting transaction: {err}"
                            ))
                        })?;
                    tx.revision = change.revision;
                    tx.sync_state = SyncState::Conflicted;
                    tx.updated_at = change.updated_at;
                    transactions::ActiveModel::from(&tx).insert(db_tx).await?;
                }
            }
            EntityKind::Category => {
                if categories::Entity::find_by_id(change.entity_id.to_string())
                    .one(db_tx)
                    .await?
                    .is_some()
                {
                    let model = categories::ActiveModel {
                        id: ActiveValue::Set(change.entity_id.to_string()),
                        sync_state: ActiveValue::Set(SyncState::Conflicted.as_str().to_string()),
                        ..Default::default()
                    };
                    model.update(db_tx).await?;
                } else {
                    let mut category: Category = serde_json::from_value(change.payload.clone())
                        .map_err(|err| {
                            LedgerError::DataCorruption(format!(
                                "decode conflicting category: {err}"
                            ))
                        })?;
                    category.revision = change.revision;
                    category.sync_state = SyncState::Conflicted;
                    category.updated_at = change.updated_at;
                    categories::ActiveModel::from(&category).insert(db_tx).await?;
                }
            }
        }
        Ok(())
    }

    /// Applies one non-conflicting change. Returns `false` when the change
    /// lost last-writer-wins against newer local state.
    async fn apply_change(
        &self,
        db_tx: &DatabaseTransaction,
        change: &IncomingChange,
    ) -> ResultLedger<bool> {
        match change.entity_kind {
            EntityKind::Transaction => {
                let existing = transactions::Entity::find_by_id(change.entity_id.to_string())
                    .one(db_tx)
                    .await?;
                if let Some(row) = &existing
                    && row.updated_at > change.updated_at
                {
                    return Ok(false);
                }

                if change.op == ChangeOp::Delete {
                    transactions::Entity::delete_by_id(change.entity_id.to_string())
                        .exec(db_tx)
                        .await?;
                    return Ok(true);
                }

                let mut tx: Transaction = serde_json::from_value(change.payload.clone())
                    .map_err(|err| {
                        LedgerError::DataCorruption(format!("decode remote transaction: {err}"))
                    })?;
                tx.revision = change.revision;
                tx.sync_state = SyncState::Synced;
                tx.updated_at = change.updated_at;
                upsert_transaction_row(db_tx, &tx).await?;
                Ok(true)
            }
            EntityKind::Category => {
                let existing = categories::Entity::find_by_id(change.entity_id.to_string())
                    .one(db_tx)
                    .await?;
                if let Some(row) = &existing
                    && row.updated_at > change.updated_at
                {
                    return Ok(false);
                }

                if change.op == ChangeOp::Delete {
                    categories::Entity::delete_by_id(change.entity_id.to_string())
                        .exec(db_tx)
                        .await?;
                    return Ok(true);
                }

                let mut category: Category = serde_json::from_value(change.payload.clone())
                    .map_err(|err| {
                        LedgerError::DataCorruption(format!("decode remote category: {err}"))
                    })?;
                category.revision = change.revision;
                category.sync_state = SyncState::Synced;
                category.updated_at = change.updated_at;
                upsert_category_row(db_tx, &category).await?;
                Ok(true)
            }
        }
    }
}

async fn upsert_transaction_row(
    db_tx: &DatabaseTransaction,
    tx: &Transaction,
) -> ResultLedger<()> {
    let exists = transactions::Entity::find_by_id(tx.id.to_string())
        .one(db_tx)
        .await?
        .is_some();
    let model = transactions::ActiveModel::from(tx);
    if exists {
        model.update(db_tx).await?;
    } else {
        model.insert(db_tx).await?;
    }
    Ok(())
}

async fn upsert_category_row(
    db_tx: &DatabaseTransaction,
    category: &Category,
) -> ResultLedger<()> {
    let exists = categories::Entity::find_by_id(category.id.to_string())
        .one(db_tx)
        .await?
        .is_some();
    let model = categories::ActiveModel::from(category);
    if exists {
        model.update(db_tx).await?;
    } else {
        model.insert(db_tx).await?;
    }
    Ok(())
}
