//! Transaction primitives.
//!
//! A `Transaction` is a single signed ledger entry attributed to a category.
//! Once synced it is never mutated in place; every edit produces a new
//! revision journaled in the change log.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, LedgerError, ResultLedger, SyncState};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub category_id: Uuid,
    /// Signed amount in minor units: negative = spend, positive = income.
    pub amount_minor: i64,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
    /// Per-entity version counter for optimistic concurrency.
    pub revision: i64,
    pub sync_state: SyncState,
    /// Last local mutation time; last-writer-wins tiebreaker during merge.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        category_id: Uuid,
        amount_minor: i64,
        currency: Currency,
        occurred_at: DateTime<Utc>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> ResultLedger<Self> {
        if amount_minor == 0 {
            return Err(LedgerError::InvalidAmount(
                "amount_minor must not be 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            category_id,
            amount_minor,
            currency,
            occurred_at,
            note,
            revision: 1,
            sync_state: SyncState::LocalOnly,
            updated_at: now,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub category_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub occurred_at: DateTimeUtc,
    pub note: Option<String>,
    pub revision: i64,
    pub sync_state: String,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::categories::Entity",
        from = "Column::CategoryId",
        to = "super::categories::Column::Id"
    )]
    Categories,
}

impl Related<super::categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Categories.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            category_id: ActiveValue::Set(tx.category_id.to_string()),
            amount_minor: ActiveValue::Set(tx.amount_minor),
            currency: ActiveValue::Set(tx.currency.code().to_string()),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            note: ActiveValue::Set(tx.note.clone()),
            revision: ActiveValue::Set(tx.revision),
            sync_state: ActiveValue::Set(tx.sync_state.as_str().to_string()),
            updated_at: ActiveValue::Set(tx.updated_at),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| LedgerError::DataCorruption(format!("bad transaction id: {}", model.id)))?,
            category_id: Uuid::parse_str(&model.category_id).map_err(|_| {
                LedgerError::DataCorruption(format!("bad category id: {}", model.category_id))
            })?,
            amount_minor: model.amount_minor,
            currency: Currency::try_from(model.currency.as_str())?,
            occurred_at: model.occurred_at,
            note: model.note,
            revision: model.revision,
            sync_state: SyncState::try_from(model.sync_state.as_str())?,
            updated_at: model.updated_at,
        })
    }
}
