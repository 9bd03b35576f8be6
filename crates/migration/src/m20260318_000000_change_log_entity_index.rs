//! Adds a composite index on the change log's entity columns.
//!
//! Conflict detection during merge looks up pending journal entries per
//! entity; without this index that lookup scans the whole journal.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum ChangeLog {
    Table,
    EntityKind,
    EntityId,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx-change_log-entity")
                    .table(ChangeLog::Table)
                    .col(ChangeLog::EntityKind)
                    .col(ChangeLog::EntityId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx-change_log-entity")
                    .table(ChangeLog::Table)
                    .to_owned(),
            )
            .await
    }
}
