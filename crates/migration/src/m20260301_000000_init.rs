//! Initial schema migration - creates all tables from scratch.
//!
//! One on-device sqlite file holds the whole ledger state:
//!
//! - `categories`: budget buckets with optional per-period limits
//! - `transactions`: signed ledger entries attributed to a category
//! - `change_log`: append-only journal of local mutations driving sync
//! - `sync_cursors`: per-device high-water mark into the remote stream

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Categories {
    Table,
    Id,
    Name,
    BudgetLimitMinor,
    Period,
    Revision,
    SyncState,
    UpdatedAt,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    CategoryId,
    AmountMinor,
    Currency,
    OccurredAt,
    Note,
    Revision,
    SyncState,
    UpdatedAt,
}

#[derive(Iden)]
enum ChangeLog {
    Table,
    Seq,
    Op,
    EntityKind,
    EntityId,
    BaseRevision,
    Revision,
    Payload,
    RecordedAt,
}

#[derive(Iden)]
enum SyncCursors {
    Table,
    DeviceId,
    Cursor,
    UpdatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Categories
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Categories::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Categories::Name).string().not_null())
                    .col(ColumnDef::new(Categories::BudgetLimitMinor).big_integer())
                    .col(
                        ColumnDef::new(Categories::Period)
                            .string()
                            .not_null()
                            .default("monthly"),
                    )
                    .col(ColumnDef::new(Categories::Revision).big_integer().not_null())
                    .col(ColumnDef::new(Categories::SyncState).string().not_null())
                    .col(ColumnDef::new(Categories::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-categories-name-unique")
                    .table(Categories::Table)
                    .col(Categories::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::CategoryId).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Currency).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Note).string())
                    .col(
                        ColumnDef::new(Transactions::Revision)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::SyncState).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-category_id")
                            .from(Transactions::Table, Transactions::CategoryId)
                            .to(Categories::Table, Categories::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-occurred_at")
                    .table(Transactions::Table)
                    .col(Transactions::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-category_id")
                    .table(Transactions::Table)
                    .col(Transactions::CategoryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-sync_state")
                    .table(Transactions::Table)
                    .col(Transactions::SyncState)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Change log
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(ChangeLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChangeLog::Seq)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChangeLog::Op).string().not_null())
                    .col(ColumnDef::new(ChangeLog::EntityKind).string().not_null())
                    .col(ColumnDef::new(ChangeLog::EntityId).string().not_null())
                    .col(
                        ColumnDef::new(ChangeLog::BaseRevision)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChangeLog::Revision).big_integer().not_null())
                    .col(ColumnDef::new(ChangeLog::Payload).text().not_null())
                    .col(ColumnDef::new(ChangeLog::RecordedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Sync cursors
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(SyncCursors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncCursors::DeviceId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncCursors::Cursor).big_integer().not_null())
                    .col(ColumnDef::new(SyncCursors::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(SyncCursors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ChangeLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Categories::Table).to_owned())
            .await?;
        Ok(())
    }
}
