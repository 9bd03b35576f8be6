//! Budget categories.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LedgerError, ResultLedger, SyncState};

/// How often a category's budget limit resets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    Weekly,
    #[default]
    Monthly,
    Yearly,
}

impl BudgetPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl TryFrom<&str> for BudgetPeriod {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(LedgerError::InvalidInput(format!(
                "invalid budget period: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    /// Spending cap per period in minor units; `None` = untracked.
    pub budget_limit_minor: Option<i64>,
    pub period: BudgetPeriod,
    pub revision: i64,
    pub sync_state: SyncState,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(
        name: &str,
        budget_limit_minor: Option<i64>,
        period: BudgetPeriod,
        now: DateTime<Utc>,
    ) -> ResultLedger<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidInput(
                "category name must not be empty".to_string(),
            ));
        }
        if budget_limit_minor.is_some_and(|limit| limit < 0) {
            return Err(LedgerError::InvalidAmount(
                "budget limit must be >= 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            budget_limit_minor,
            period,
            revision: 1,
            sync_state: SyncState::LocalOnly,
            updated_at: now,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub budget_limit_minor: Option<i64>,
    pub period: String,
    pub revision: i64,
    pub sync_state: String,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Category> for ActiveModel {
    fn from(category: &Category) -> Self {
        Self {
            id: ActiveValue::Set(category.id.to_string()),
            name: ActiveValue::Set(category.name.clone()),
            budget_limit_minor: ActiveValue::Set(category.budget_limit_minor),
            period: ActiveValue::Set(category.period.as_str().to_string()),
            revision: ActiveValue::Set(category.revision),
            sync_state: ActiveValue::Set(category.sync_state.as_str().to_string()),
            updated_at: ActiveValue::Set(category.updated_at),
        }
    }
}

impl TryFrom<Model> for Category {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| LedgerError::DataCorruption(format!("bad category id: {}", model.id)))?,
            name: model.name,
            budget_limit_minor: model.budget_limit_minor,
            period: BudgetPeriod::try_from(model.period.as_str())
                .map_err(|_| LedgerError::DataCorruption(format!("bad period: {}", model.period)))?,
            revision: model.revision,
            sync_state: SyncState::try_from(model.sync_state.as_str())?,
            updated_at: model.updated_at,
        })
    }
}
