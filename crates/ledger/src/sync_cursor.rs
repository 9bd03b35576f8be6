//! Per-device bookmark into the remote change stream.
//!
//! Advanced only inside a successfully committed merge batch, so a crash
//! mid-merge re-pulls the same window instead of skipping it.

use sea_orm::{ActiveValue, DatabaseConnection, DatabaseTransaction, entity::prelude::*};

use crate::ResultLedger;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_cursors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub device_id: String,
    pub cursor: i64,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Returns the persisted cursor for a device, 0 if the device never synced.
pub async fn get(database: &DatabaseConnection, device_id: &str) -> ResultLedger<i64> {
    let model = Entity::find_by_id(device_id.to_string())
        .one(database)
        .await?;
    Ok(model.map(|m| m.cursor).unwrap_or(0))
}

/// Upserts the cursor inside the caller's open merge transaction.
pub(crate) async fn set(
    db_tx: &DatabaseTransaction,
    device_id: &str,
    cursor: i64,
    now: chrono::DateTime<chrono::Utc>,
) -> ResultLedger<()> {
    let existing = Entity::find_by_id(device_id.to_string()).one(db_tx).await?;
    match existing {
        Some(_) => {
            let model = ActiveModel {
                device_id: ActiveValue::Set(device_id.to_string()),
                cursor: ActiveValue::Set(cursor),
                updated_at: ActiveValue::Set(now),
            };
            model.update(db_tx).await?;
        }
        None => {
            let model = ActiveModel {
                device_id: ActiveValue::Set(device_id.to_string()),
                cursor: ActiveValue::Set(cursor),
                updated_at: ActiveValue::Set(now),
            };
            model.insert(db_tx).await?;
        }
    }
    Ok(())
}
