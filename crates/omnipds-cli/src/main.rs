//! OmniPDS CLI - A local-first personal data store with an embedded ledger
//!
//! This is the command-line interface for OmniPDS. It boots a ledger session
//! (remote > local cache > cold start), exposes the typed surfaces and the
//! raw SQL console, and hosts the conversational agent.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use omnipds_agent::{
    personal_insights, sovereign_roadmap, AgentBridge, GeminiProvider, DEFAULT_MODEL,
};
use omnipds_core::model::{
    ledger_id, Asset, Contact, HealthMetric, LedgerTransaction, Message, Note, QueryOutcome,
    SocialPost, Task, TaskPriority, TaskStatus, TxKind, WorkflowRule,
};
use omnipds_core::{LedgerSession, LocalCache, PersistenceCoordinator, RemoteStore, VERSION};

/// OmniPDS - A local-first personal data store with an embedded ledger
#[derive(Parser)]
#[command(name = "omnipds")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the local snapshot cache
    #[arg(long, global = true, env = "OMNIPDS_CACHE", default_value = "omnipds.cache.json")]
    cache: String,

    /// Base URL of the remote snapshot store
    #[arg(long, global = true, env = "OMNIPDS_REMOTE")]
    remote: Option<String>,

    /// Remote request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a fresh ledger and write the first snapshot
    Init,

    /// Show hydration source, balances, row counts and snapshot write log
    Status,

    /// Add a record to the ledger
    Add {
        #[command(subcommand)]
        record: AddCommands,
    },

    /// Move a task to a new status
    Task {
        /// Task ID
        #[arg(value_name = "ID")]
        id: String,

        /// New status (todo, doing, done)
        #[arg(value_name = "STATUS")]
        status: String,
    },

    /// List rows of a ledger table
    List {
        /// Table name (posts, transactions, tasks, notes, balances, ...)
        #[arg(value_name = "TABLE")]
        table: String,

        /// Output as pretty-printed JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the unified recent-activity feed
    Feed,

    /// Free-text search across all indexed tables
    Search {
        /// Search term
        #[arg(value_name = "TERM")]
        term: String,

        /// Output as pretty-printed JSON
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the search index from the primary tables
    Reindex,

    /// Execute raw SQL against the ledger
    Sql {
        /// SQL statement or script
        #[arg(value_name = "STATEMENT")]
        statement: String,

        /// Reject anything that is not a plain query
        #[arg(long)]
        read_only: bool,
    },

    /// Ask the ledger agent a question
    Chat {
        /// The message to send
        #[arg(value_name = "MESSAGE")]
        message: String,
    },

    /// Generate strategic insights from the ledger
    Insights,

    /// Generate a 30-day roadmap from the ledger
    Roadmap,
}

#[derive(Subcommand)]
enum AddCommands {
    /// Add a social post
    Post {
        /// Post author
        #[arg(long, default_value = "me")]
        author: String,

        /// Post body
        #[arg(value_name = "BODY")]
        body: String,
    },

    /// Add a financial transaction and apply it to the balance
    Tx {
        /// Amount (always positive; direction comes from --kind)
        #[arg(value_name = "AMOUNT")]
        amount: f64,

        /// Transaction description
        #[arg(value_name = "DESCRIPTION")]
        description: String,

        /// income or expense
        #[arg(long, default_value = "expense")]
        kind: String,

        /// Currency code
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Spending category
        #[arg(long, default_value = "general")]
        category: String,

        /// Transaction date (ISO-8601)
        #[arg(long)]
        date: Option<String>,
    },

    /// Add a project task
    Task {
        /// Task title
        #[arg(value_name = "TITLE")]
        title: String,

        /// low, medium or high
        #[arg(long, default_value = "medium")]
        priority: String,
    },

    /// Add a vault note
    Note {
        /// Note title
        #[arg(value_name = "TITLE")]
        title: String,

        /// Note content
        #[arg(value_name = "CONTENT")]
        content: String,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },

    /// Add an identity contact
    Contact {
        /// Contact name
        #[arg(value_name = "NAME")]
        name: String,

        /// Network handle
        #[arg(long)]
        handle: Option<String>,

        /// Contact category
        #[arg(long, default_value = "personal")]
        category: String,
    },

    /// Add an inventory asset
    Asset {
        /// Asset name
        #[arg(value_name = "NAME")]
        name: String,

        /// Estimated value
        #[arg(value_name = "VALUE")]
        value: f64,

        /// Asset category
        #[arg(long, default_value = "general")]
        category: String,

        /// Serial number
        #[arg(long)]
        serial: Option<String>,

        /// Storage location
        #[arg(long)]
        location: Option<String>,
    },

    /// Add a health metric sample
    Health {
        /// Metric name (e.g. weight, sleep)
        #[arg(value_name = "METRIC")]
        metric: String,

        /// Sample value
        #[arg(value_name = "VALUE")]
        value: f64,

        /// Unit of measure
        #[arg(long, default_value = "count")]
        unit: String,
    },

    /// Add an automation rule
    Workflow {
        /// Rule name
        #[arg(value_name = "NAME")]
        name: String,

        /// Trigger kind (e.g. schedule, threshold)
        #[arg(long, default_value = "event")]
        trigger: String,

        /// Trigger condition
        #[arg(long)]
        condition: String,

        /// Action to run when the rule fires
        #[arg(long)]
        action: String,

        /// Create the rule disabled
        #[arg(long)]
        inactive: bool,
    },

    /// Add a comms message
    Message {
        /// Sender
        #[arg(long, default_value = "me")]
        sender: String,

        /// Receiver
        #[arg(long)]
        receiver: String,

        /// Message body
        #[arg(value_name = "BODY")]
        body: String,

        /// Mark the message as encrypted
        #[arg(long)]
        encrypted: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut cli = Cli::parse();

    let command = match cli.command.take() {
        Some(command) => command,
        None => {
            println!("OmniPDS v{}", VERSION);
            println!("\nRun `omnipds --help` for usage information.");
            return Ok(());
        }
    };

    let coordinator = build_coordinator(&cli)?;

    match command {
        Commands::Init => {
            let mut session = LedgerSession::cold_start(coordinator)?;
            session.persist().await;
            if !cli.quiet {
                println!("Initialized fresh ledger (cache: {})", cli.cache);
            }
        }
        Commands::Status => {
            let session = LedgerSession::open(coordinator).await?;
            println!("Hydrated from: {}", session.hydration_source().as_str());

            println!("\nBalances:");
            for balance in session.gateway().balances()? {
                println!(
                    "  {} {}{:.2}",
                    balance.currency, balance.symbol, balance.amount
                );
            }

            println!("\nRow counts:");
            for table in omnipds_core::engine::PRIMARY_TABLES {
                println!("  {:<16} {}", table, session.gateway().table_row_count(table)?);
            }

            let log = session.write_log();
            if !log.is_empty() {
                println!("\nSnapshot writes:");
                for record in log {
                    match &record.detail {
                        Some(detail) => println!(
                            "  {} {:?} at {} ({})",
                            record.sink, record.status, record.at, detail
                        ),
                        None => println!("  {} {:?} at {}", record.sink, record.status, record.at),
                    }
                }
            }
        }
        Commands::Add { record } => {
            let mut session = LedgerSession::open(coordinator).await?;
            let id = add_record(&mut session, record).await?;
            if !cli.quiet {
                println!("Added {}", id);
            }
        }
        Commands::Task { id, status } => {
            let mut session = LedgerSession::open(coordinator).await?;
            let status = TaskStatus::from_str(&status)?;
            session.update_task_status(&id, status).await?;
            if !cli.quiet {
                println!("Task {} is now {}", id, status);
            }
        }
        Commands::List { table, json } => {
            let session = LedgerSession::open(coordinator).await?;
            let rows = list_table(&session, &table)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                if !cli.quiet {
                    println!("{} ({} rows)", table, rows.len());
                }
                for row in rows {
                    println!("{}", serde_json::to_string(&row)?);
                }
            }
        }
        Commands::Feed => {
            let session = LedgerSession::open(coordinator).await?;
            for item in session.gateway().unified_feed()? {
                println!("[{}] {} {}", item.origin, item.date, item.title);
            }
        }
        Commands::Search { term, json } => {
            let session = LedgerSession::open(coordinator).await?;
            let hits = session.search(&term)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                if !cli.quiet {
                    println!("{} hits", hits.len());
                }
                for hit in hits {
                    println!("[{}] {} {}", hit.origin, hit.id, hit.content);
                }
            }
        }
        Commands::Reindex => {
            let mut session = LedgerSession::open(coordinator).await?;
            session.gateway().rebuild_index()?;
            session.persist().await;
            if !cli.quiet {
                println!("Search index rebuilt");
            }
        }
        Commands::Sql {
            statement,
            read_only,
        } => {
            let mut session = LedgerSession::open(coordinator).await?;
            if read_only && !session.gateway().engine().is_read_only(&statement)? {
                return Err(anyhow::anyhow!(
                    "--read-only rejects statements that can write"
                ));
            }
            let outcome = session.raw_query(&statement).await;
            println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
            if let QueryOutcome::Failed { .. } = outcome {
                return Err(anyhow::anyhow!("Statement failed"));
            }
        }
        Commands::Chat { message } => {
            let provider = build_provider(&cli)?;
            let mut session = LedgerSession::open(coordinator).await?;
            let mut bridge = AgentBridge::new(provider);
            let answer = bridge.take_turn(&mut session, &message).await?;
            println!("{}", answer);
        }
        Commands::Insights => {
            let provider = build_provider(&cli)?;
            let session = LedgerSession::open(coordinator).await?;
            let context = session.context_snapshot()?;
            for insight in personal_insights(&provider, &context).await? {
                println!(
                    "[urgency {}] {} ({})",
                    insight.urgency, insight.title, insight.category
                );
                println!("  {}", insight.description);
                println!("  impact: {}", insight.impact);
            }
        }
        Commands::Roadmap => {
            let provider = build_provider(&cli)?;
            let session = LedgerSession::open(coordinator).await?;
            let context = session.context_snapshot()?;
            for week in sovereign_roadmap(&provider, &context).await? {
                println!("Week {}: {}", week.week, week.focus);
                for task in &week.tasks {
                    println!("  - {}", task);
                }
                if !week.financial_goal.is_empty() {
                    println!("  financial goal: {}", week.financial_goal);
                }
            }
        }
    }

    Ok(())
}

fn build_provider(cli: &Cli) -> anyhow::Result<GeminiProvider> {
    let api_key = std::env::var("GEMINI_API_KEY")
        .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;
    let model = std::env::var("OMNIPDS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let provider =
        GeminiProvider::with_model(api_key, model, Duration::from_secs(cli.timeout.max(30)))?;
    Ok(provider)
}

fn build_coordinator(cli: &Cli) -> anyhow::Result<PersistenceCoordinator> {
    let local = Box::new(LocalCache::new(&cli.cache));
    let remote = match &cli.remote {
        Some(url) => Some(Box::new(RemoteStore::new(
            url.clone(),
            Duration::from_secs(cli.timeout),
        )?) as Box<dyn omnipds_core::SnapshotSink>),
        None => None,
    };
    Ok(PersistenceCoordinator::new(local, remote))
}

async fn add_record(session: &mut LedgerSession, record: AddCommands) -> anyhow::Result<String> {
    match record {
        AddCommands::Post { author, body } => {
            let post = SocialPost {
                id: ledger_id(),
                author,
                body,
                likes: 0,
                created_at: Utc::now(),
            };
            session.add_post(&post).await?;
            Ok(post.id)
        }
        AddCommands::Tx {
            amount,
            description,
            kind,
            currency,
            category,
            date,
        } => {
            if amount <= 0.0 {
                return Err(anyhow::anyhow!(
                    "Amount must be positive; use --kind expense for outflows"
                ));
            }
            let occurred_at = match date {
                Some(value) => parse_datetime(&value)?,
                None => Utc::now(),
            };
            let tx = LedgerTransaction {
                id: ledger_id(),
                amount,
                currency,
                category,
                kind: TxKind::from_str(&kind)?,
                occurred_at,
                description,
            };
            session.add_transaction(&tx).await?;
            Ok(tx.id)
        }
        AddCommands::Task { title, priority } => {
            let task = Task {
                id: ledger_id(),
                title,
                status: TaskStatus::Todo,
                priority: TaskPriority::from_str(&priority)?,
            };
            session.add_task(&task).await?;
            Ok(task.id)
        }
        AddCommands::Note {
            title,
            content,
            tags,
        } => {
            let note = Note {
                id: ledger_id(),
                title,
                content,
                tags,
                updated_at: Utc::now(),
            };
            session.add_note(&note).await?;
            Ok(note.id)
        }
        AddCommands::Contact {
            name,
            handle,
            category,
        } => {
            let contact = Contact {
                id: ledger_id(),
                name,
                handle,
                category,
                last_contacted: Utc::now(),
                notes: None,
            };
            session.add_contact(&contact).await?;
            Ok(contact.id)
        }
        AddCommands::Asset {
            name,
            value,
            category,
            serial,
            location,
        } => {
            let asset = Asset {
                id: ledger_id(),
                name,
                serial,
                value,
                category,
                location,
                purchased_at: Utc::now(),
            };
            session.add_asset(&asset).await?;
            Ok(asset.id)
        }
        AddCommands::Health {
            metric,
            value,
            unit,
        } => {
            let sample = HealthMetric {
                id: ledger_id(),
                recorded_at: Utc::now(),
                metric,
                value,
                unit,
            };
            session.add_health_metric(&sample).await?;
            Ok(sample.id)
        }
        AddCommands::Workflow {
            name,
            trigger,
            condition,
            action,
            inactive,
        } => {
            let rule = WorkflowRule {
                id: ledger_id(),
                name,
                trigger_kind: trigger,
                condition,
                action,
                active: !inactive,
            };
            session.add_workflow(&rule).await?;
            Ok(rule.id)
        }
        AddCommands::Message {
            sender,
            receiver,
            body,
            encrypted,
        } => {
            let message = Message {
                id: ledger_id(),
                sender,
                receiver,
                body,
                sent_at: Utc::now(),
                encrypted,
            };
            session.add_message(&message).await?;
            Ok(message.id)
        }
    }
}

fn list_table(session: &LedgerSession, table: &str) -> anyhow::Result<Vec<serde_json::Value>> {
    let gateway = session.gateway();
    let rows = match table {
        "posts" => serde_json::to_value(gateway.posts()?)?,
        "transactions" => serde_json::to_value(gateway.transactions()?)?,
        "tasks" => serde_json::to_value(gateway.tasks()?)?,
        "balances" => serde_json::to_value(gateway.balances()?)?,
        "notes" => serde_json::to_value(gateway.notes()?)?,
        "contacts" => serde_json::to_value(gateway.contacts()?)?,
        "assets" => serde_json::to_value(gateway.assets()?)?,
        "messages" => serde_json::to_value(gateway.messages()?)?,
        "health_metrics" => serde_json::to_value(gateway.health_metrics()?)?,
        "workflows" => serde_json::to_value(gateway.workflows()?)?,
        other => {
            return Err(anyhow::anyhow!(
                "Unknown table: {} (see `omnipds status` for the table list)",
                other
            ))
        }
    };
    match rows {
        serde_json::Value::Array(items) => Ok(items),
        _ => Ok(Vec::new()),
    }
}

fn parse_datetime(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("Invalid date value: {}", value))?;
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }

    Err(anyhow::anyhow!(
        "Invalid date/time (expected ISO-8601 or YYYY-MM-DD): {}",
        value
    ))
}
