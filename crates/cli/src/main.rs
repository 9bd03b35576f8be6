use std::{error::Error, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use ledger::{BudgetPeriod, Category, Currency, LocalStore, Money, Transaction};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use sync::{BackoffConfig, HttpRemote, SyncConfig, SyncEngine};

mod settings;

#[derive(Parser, Debug)]
#[command(name = "budget_zen")]
#[command(about = "Local-first budgeting ledger with remote sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or migrate the local database.
    Init,
    Category(CategoryCmd),
    /// Record a spend (positive amount, stored negative).
    Expense(EntryArgs),
    /// Record an income (stored positive).
    Income(EntryArgs),
    /// Show spend vs. budget per category for the current period.
    Budgets,
    Sync(SyncArgs),
    /// Show pending changes, cursor and conflicted entities.
    Status,
}

#[derive(Args, Debug)]
struct CategoryCmd {
    #[command(subcommand)]
    command: CategoryCommand,
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    Add(CategoryAddArgs),
    List,
    /// Change a category's budget limit (optimistic, may report a conflict).
    SetLimit(CategorySetLimitArgs),
}

#[derive(Args, Debug)]
struct CategoryAddArgs {
    name: String,
    /// Budget limit in major units, e.g. "250" or "250.50".
    #[arg(long)]
    limit: Option<String>,
    #[arg(long, default_value = "monthly")]
    period: String,
}

#[derive(Args, Debug)]
struct CategorySetLimitArgs {
    name: String,
    /// New limit in major units; omit to untrack the category.
    #[arg(long)]
    limit: Option<String>,
}

#[derive(Args, Debug)]
struct EntryArgs {
    /// Amount in major units, e.g. "12.50".
    amount: String,
    category: String,
    #[arg(long)]
    note: Option<String>,
    /// RFC3339 timestamp; defaults to now.
    #[arg(long)]
    date: Option<String>,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Keep syncing on the configured period instead of one cycle.
    #[arg(long)]
    watch: bool,
}

type MainResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

async fn connect_db(path: &str) -> MainResult<DatabaseConnection> {
    let url = format!("sqlite:{path}?mode=rwc");
    let db = Database::connect(&url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::debug!(path, "database ready");
    Ok(db)
}

fn parse_occurred_at(raw: Option<&str>) -> MainResult<DateTime<Utc>> {
    match raw {
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn parse_positive_amount(raw: &str) -> MainResult<Money> {
    let amount: Money = raw.parse()?;
    if !amount.is_positive() {
        return Err(format!("amount must be > 0, got {raw}").into());
    }
    Ok(amount)
}

fn build_engine(store: LocalStore, remote: &settings::Remote) -> MainResult<SyncEngine> {
    let timeout = Duration::from_secs(remote.timeout_secs.unwrap_or(10));
    let http = HttpRemote::new(&remote.base_url, &remote.token, timeout)?;
    let config = SyncConfig {
        user_id: remote.user_id.clone(),
        device_id: remote.device_id.clone(),
        batch_limit: 200,
        backoff: BackoffConfig::default(),
    };
    Ok(SyncEngine::new(store, Arc::new(http), config))
}

async fn record_entry(
    store: &LocalStore,
    currency: Currency,
    args: &EntryArgs,
    sign: i64,
) -> MainResult<Transaction> {
    let category = store.category_by_name(&args.category).await?;
    let amount = parse_positive_amount(&args.amount)?;
    let occurred_at = parse_occurred_at(args.date.as_deref())?;

    let tx = Transaction::new(
        category.id,
        sign * amount.minor(),
        currency,
        occurred_at,
        args.note.clone(),
        Utc::now(),
    )?;
    Ok(store.put_transaction(tx, None, Utc::now()).await?)
}

#[tokio::main]
async fn main() -> MainResult<()> {
    let settings = settings::Settings::new()?;
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "budget_zen={level},ledger={level},sync={level}",
            level = settings.app.level
        ))
        .init();

    let currency = Currency::try_from(settings.app.currency.as_str())?;
    let db = connect_db(&settings.database.path).await?;
    let store = LocalStore::new(db);

    match cli.command {
        Command::Init => {
            println!("database ready at {}", settings.database.path);
        }
        Command::Category(CategoryCmd { command }) => match command {
            CategoryCommand::Add(args) => {
                let limit = args
                    .limit
                    .as_deref()
                    .map(parse_positive_amount)
                    .transpose()?
                    .map(|m| m.minor());
                let period = BudgetPeriod::try_from(args.period.as_str())?;
                let category = Category::new(&args.name, limit, period, Utc::now())?;
                let stored = store.put_category(category, None, Utc::now()).await?;
                println!("created category: {} ({})", stored.name, stored.id);
            }
            CategoryCommand::List => {
                for category in store.categories().await? {
                    let limit = category
                        .budget_limit_minor
                        .map(|l| Money::new(l).to_string())
                        .unwrap_or_else(|| "untracked".to_string());
                    println!(
                        "{}  {}  limit={limit}  [{}]",
                        category.id,
                        category.name,
                        category.period.as_str()
                    );
                }
            }
            CategoryCommand::SetLimit(args) => {
                let mut category = store.category_by_name(&args.name).await?;
                let revision = category.revision;
                category.budget_limit_minor = args
                    .limit
                    .as_deref()
                    .map(parse_positive_amount)
                    .transpose()?
                    .map(|m| m.minor());
                let stored = store
                    .put_category(category, Some(revision), Utc::now())
                    .await?;
                println!("updated {} to revision {}", stored.name, stored.revision);
            }
        },
        Command::Expense(args) => {
            let stored = record_entry(&store, currency, &args, -1).await?;
            println!(
                "recorded expense {} in {} ({})",
                Money::new(-stored.amount_minor),
                args.category,
                stored.id
            );
        }
        Command::Income(args) => {
            let stored = record_entry(&store, currency, &args, 1).await?;
            println!(
                "recorded income {} in {} ({})",
                Money::new(stored.amount_minor),
                args.category,
                stored.id
            );
        }
        Command::Budgets => {
            let categories = store.categories().await?;
            let transactions = store.transactions().await?;
            for row in ledger::summarize(&categories, &transactions, Utc::now()) {
                let limit = row
                    .limit_minor
                    .map(|l| Money::new(l).to_string())
                    .unwrap_or_else(|| "-".to_string());
                let flag = if row.over_budget { "  OVER" } else { "" };
                println!(
                    "{:<20} spent={:<10} limit={limit}{flag}",
                    row.name,
                    Money::new(row.spent_minor).to_string()
                );
            }
        }
        Command::Sync(args) => {
            let Some(remote) = settings.remote.as_ref() else {
                eprintln!("no [remote] section in budget_zen.toml");
                std::process::exit(1);
            };
            let mut engine = build_engine(store, remote)?;
            if args.watch {
                let period = Duration::from_secs(remote.period_secs.unwrap_or(60));
                engine.run(period).await;
            } else {
                let report = engine.run_cycle().await?;
                println!(
                    "pushed {} (acked {}), pulled {}, applied {}, conflicted {}",
                    report.pushed,
                    report.acked,
                    report.pulled,
                    report.merge.applied,
                    report.merge.conflicted.len()
                );
            }
        }
        Command::Status => {
            let device_id = settings
                .remote
                .as_ref()
                .map(|r| r.device_id.clone())
                .unwrap_or_default();
            let pending = store.change_log().pending_count().await?;
            let cursor = store.sync_cursor(&device_id).await?;
            let conflicted = store.conflicted_ids().await?;
            println!("pending changes: {pending}");
            println!("cursor: {cursor}");
            if conflicted.is_empty() {
                println!("no conflicts");
            } else {
                for id in conflicted {
                    println!("conflicted: {id}");
                }
            }
        }
    }

    Ok(())
}
