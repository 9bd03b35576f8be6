//! Append-only journal of local mutations.
//!
//! Every Local Store write commits exactly one `ChangeRecord` in the same
//! database transaction as the entity row. The sync engine drains records
//! oldest-first, pushes them to the remote store and acknowledges the
//! sequence numbers the remote made durable; only acknowledged records are
//! ever deleted, which gives at-least-once delivery.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, DatabaseConnection, DatabaseTransaction, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, entity::prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LedgerError, ResultLedger};

/// Kind of entity a change record targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Transaction,
    Category,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Category => "category",
        }
    }
}

impl TryFrom<&str> for EntityKind {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "transaction" => Ok(Self::Transaction),
            "category" => Ok(Self::Category),
            other => Err(LedgerError::DataCorruption(format!(
                "invalid entity kind: {other}"
            ))),
        }
    }
}

/// Operation recorded by a change record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl TryFrom<&str> for ChangeOp {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(LedgerError::DataCorruption(format!(
                "invalid change op: {other}"
            ))),
        }
    }
}

/// A durable, ordered description of one local mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeRecord {
    /// Device-local sequence number (monotonic, sqlite rowid).
    pub seq: i64,
    pub op: ChangeOp,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    /// Revision the mutation was built on (0 for creates).
    pub base_revision: i64,
    /// Revision produced by the mutation.
    pub revision: i64,
    /// Full entity snapshot after the mutation; empty object for deletes.
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "change_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub seq: i64,
    pub op: String,
    pub entity_kind: String,
    pub entity_id: String,
    pub base_revision: i64,
    pub revision: i64,
    pub payload: String,
    pub recorded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for ChangeRecord {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            seq: model.seq,
            op: ChangeOp::try_from(model.op.as_str())?,
            entity_kind: EntityKind::try_from(model.entity_kind.as_str())?,
            entity_id: Uuid::parse_str(&model.entity_id).map_err(|_| {
                LedgerError::DataCorruption(format!("bad change entity id: {}", model.entity_id))
            })?,
            base_revision: model.base_revision,
            revision: model.revision,
            payload: serde_json::from_str(&model.payload).map_err(|err| {
                LedgerError::DataCorruption(format!("bad change payload: {err}"))
            })?,
            recorded_at: model.recorded_at,
        })
    }
}

/// Appends a record inside the caller's open database transaction.
///
/// Returns the assigned sequence number.
pub(crate) async fn append(
    db_tx: &DatabaseTransaction,
    op: ChangeOp,
    entity_kind: EntityKind,
    entity_id: Uuid,
    base_revision: i64,
    revision: i64,
    payload: &serde_json::Value,
    recorded_at: DateTime<Utc>,
) -> ResultLedger<i64> {
    let model = ActiveModel {
        seq: ActiveValue::NotSet,
        op: ActiveValue::Set(op.as_str().to_string()),
        entity_kind: ActiveValue::Set(entity_kind.as_str().to_string()),
        entity_id: ActiveValue::Set(entity_id.to_string()),
        base_revision: ActiveValue::Set(base_revision),
        revision: ActiveValue::Set(revision),
        payload: ActiveValue::Set(payload.to_string()),
        recorded_at: ActiveValue::Set(recorded_at),
    };
    let inserted = model.insert(db_tx).await?;
    Ok(inserted.seq)
}

/// Read/prune interface over the journal, used by the sync engine.
#[derive(Clone, Debug)]
pub struct ChangeLog {
    database: DatabaseConnection,
}

impl ChangeLog {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    /// Returns up to `limit` unacknowledged records, oldest-first.
    ///
    /// Records must be applied to the remote store in this order per entity
    /// to preserve causal history.
    pub async fn drain(&self, limit: u64) -> ResultLedger<Vec<ChangeRecord>> {
        let models = Entity::find()
            .order_by_asc(Column::Seq)
            .limit(limit)
            .all(&self.database)
            .await?;

        models.into_iter().map(ChangeRecord::try_from).collect()
    }

    /// Deletes the records the remote store confirmed, nothing else.
    pub async fn acknowledge(&self, seqs: &[i64]) -> ResultLedger<u64> {
        if seqs.is_empty() {
            return Ok(0);
        }
        let res = Entity::delete_many()
            .filter(Column::Seq.is_in(seqs.to_vec()))
            .exec(&self.database)
            .await?;
        Ok(res.rows_affected)
    }

    /// Unacknowledged records touching one entity, oldest-first.
    pub async fn pending_for(
        &self,
        entity_kind: EntityKind,
        entity_id: Uuid,
    ) -> ResultLedger<Vec<ChangeRecord>> {
        let models = Entity::find()
            .filter(Column::EntityKind.eq(entity_kind.as_str()))
            .filter(Column::EntityId.eq(entity_id.to_string()))
            .order_by_asc(Column::Seq)
            .all(&self.database)
            .await?;

        models.into_iter().map(ChangeRecord::try_from).collect()
    }

    /// Number of records still awaiting remote acknowledgment.
    pub async fn pending_count(&self) -> ResultLedger<u64> {
        Ok(Entity::find().count(&self.database).await?)
    }
}
