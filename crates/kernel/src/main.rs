//! Pagecraft maintenance CLI
//!
//! Applies migrations and inspects or reverts page layouts.
//!
//! Usage:
//!   pagecraft migrate
//!   pagecraft tree <PAGE_ID> --visibility published-subtrees
//!   pagecraft revision revert <PAGE_ID> <REVISION_ID>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pagecraft_kernel::config::Config;
use pagecraft_kernel::store::DefinitionQuery;
use pagecraft_kernel::{LayoutEngine, Visibility, db};

/// Page layout engine maintenance.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,

    /// Print a page's block tree as JSON.
    Tree {
        page_id: Uuid,

        /// Which nodes to include.
        #[arg(long, value_enum, default_value = "all")]
        visibility: TreeVisibility,
    },

    /// Page revisions.
    #[command(subcommand)]
    Revision(RevisionCommand),

    /// Reusable component definitions.
    #[command(subcommand)]
    Component(ComponentCommand),
}

#[derive(Subcommand, Debug)]
enum RevisionCommand {
    /// Snapshot a page's current layout.
    Create {
        page_id: Uuid,

        #[arg(long)]
        label: Option<String>,
    },

    /// List a page's revisions, newest first.
    List { page_id: Uuid },

    /// Replace a page's layout with a stored revision.
    Revert {
        page_id: Uuid,
        revision_id: Uuid,

        /// Skip the backup revision taken before reverting.
        #[arg(long)]
        no_backup: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ComponentCommand {
    /// List component definitions.
    List {
        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        search: Option<String>,

        #[arg(long, default_value = "20")]
        limit: u64,

        #[arg(long, default_value = "0")]
        offset: u64,
    },

    /// Show how many instances a definition has.
    Usage { definition_id: Uuid },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TreeVisibility {
    All,
    Published,
    PublishedSubtrees,
}

impl From<TreeVisibility> for Visibility {
    fn from(v: TreeVisibility) -> Self {
        match v {
            TreeVisibility::All => Visibility::All,
            TreeVisibility::Published => Visibility::PublishedOnly,
            TreeVisibility::PublishedSubtrees => Visibility::PublishedSubtrees,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let pool = db::create_pool(&config).await?;
    if !db::check_health(&pool).await {
        anyhow::bail!("database health check failed");
    }

    if let Command::Migrate = args.command {
        let applied = db::run_migrations(&pool).await?;
        info!(count = applied.len(), "migrations complete");
        return print_json(&applied);
    }

    let engine = LayoutEngine::from_pool(pool, &config)?;

    match args.command {
        Command::Migrate => Ok(()),
        Command::Tree {
            page_id,
            visibility,
        } => {
            let forest = engine.tree().build_tree(page_id, visibility.into()).await?;
            print_json(&forest)
        }
        Command::Revision(cmd) => run_revision(&engine, cmd).await,
        Command::Component(cmd) => run_component(&engine, cmd).await,
    }
}

async fn run_revision(engine: &LayoutEngine, cmd: RevisionCommand) -> Result<()> {
    let revisions = engine.revisions();
    match cmd {
        RevisionCommand::Create { page_id, label } => {
            let revision = revisions.create_revision(page_id, label, None).await?;
            let pruned = engine.prune_revisions(page_id).await?;
            if pruned > 0 {
                info!(%page_id, pruned, "old revisions pruned");
            }
            print_json(&revision)
        }
        RevisionCommand::List { page_id } => {
            print_json(&revisions.list_revisions(page_id).await?)
        }
        RevisionCommand::Revert {
            page_id,
            revision_id,
            no_backup,
        } => {
            if !no_backup {
                let backup = revisions
                    .create_revision(page_id, Some(format!("before revert to {revision_id}")), None)
                    .await?;
                info!(backup_id = %backup.id, "backup revision created");
            }
            let nodes = revisions.revert(page_id, revision_id).await?;
            print_json(&nodes)
        }
    }
}

async fn run_component(engine: &LayoutEngine, cmd: ComponentCommand) -> Result<()> {
    let components = engine.components();
    match cmd {
        ComponentCommand::List {
            category,
            search,
            limit,
            offset,
        } => {
            let query = DefinitionQuery {
                category,
                search,
                limit,
                offset,
                ..Default::default()
            };
            print_json(&components.list_definitions(&query).await?)
        }
        ComponentCommand::Usage { definition_id } => {
            #[derive(Serialize)]
            struct Usage {
                definition_id: Uuid,
                instances: u64,
            }
            let instances = components.usage_count(definition_id).await?;
            print_json(&Usage {
                definition_id,
                instances,
            })
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// Initialize tracing with environment filter.
///
/// Logs go to stderr so stdout stays clean JSON.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
