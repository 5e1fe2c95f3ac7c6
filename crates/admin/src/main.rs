//! factgate-admin: operator tool for the fact store.
//!
//! Reseeds the store from a relational snapshot and answers ad-hoc
//! authorization questions. Store settings come from `FACTGATE_*` variables;
//! flags override them.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use factgate_auth::RequestContext;
use factgate_core::{Action, DomainSnapshot, EntityRef, ResourceKind, UserId};
use factgate_infra::sync::BatchSynchronizer;
use factgate_infra::{AuthorizationResolver, FactgateConfig, HttpFactStore, Reconciler};
use factgate_observability::ObservabilityConfig;

/// factgate-admin - relationship fact store operations
#[derive(Parser, Debug)]
#[command(name = "factgate-admin")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Fact store base URL
    #[arg(long, env = "FACTGATE_STORE_URL")]
    store_url: Option<String>,

    /// Chunk size for bulk writes
    #[arg(long, env = "FACTGATE_BATCH_SIZE")]
    batch_size: Option<NonZeroUsize>,

    /// Concurrent chunk calls
    #[arg(long, env = "FACTGATE_MAX_IN_FLIGHT")]
    max_in_flight: Option<NonZeroUsize>,

    /// Overall deadline for the command, in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Identity recorded as the subject of `reset` and `members`
    #[arg(long = "as-user", env = "FACTGATE_OPERATOR", default_value = "factgate-admin")]
    operator: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    text_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replace all domain-derived facts with those encoded from a snapshot file
    Reset {
        /// JSON file with organizations, repositories, org_roles and repo_roles
        snapshot: PathBuf,
    },

    /// Point authorization check
    Check {
        user: UserId,
        action: String,
        /// Resource as `Type:id`
        resource: EntityRef,
    },

    /// Resources of a type the user may perform an action on
    List {
        user: UserId,
        action: String,
        kind: ResourceKind,
    },

    /// Every action the user may perform on a resource
    Actions {
        user: UserId,
        /// Resource as `Type:id`
        resource: EntityRef,
    },

    /// Users holding a role on a resource
    Members {
        /// Resource as `Type:id`
        resource: EntityRef,
    },
}

impl Cli {
    fn config(&self) -> Result<FactgateConfig> {
        let mut config = FactgateConfig::from_env().context("invalid FACTGATE_* configuration")?;
        if let Some(url) = &self.store_url {
            config.store_url = url.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.sync.batch_size = batch_size;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.sync.max_in_flight = max_in_flight;
        }
        Ok(config)
    }

    fn context_for(&self, user: UserId) -> RequestContext {
        self.bounded(RequestContext::new(user))
    }

    fn operator_context(&self) -> RequestContext {
        self.bounded(RequestContext::for_subject(EntityRef::user(&self.operator)))
    }

    fn bounded(&self, ctx: RequestContext) -> RequestContext {
        match self.deadline_ms {
            Some(ms) => ctx.with_timeout(Duration::from_millis(ms)),
            None => ctx,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let logging = if cli.text_logs {
        ObservabilityConfig::text()
    } else {
        ObservabilityConfig::default()
    };
    factgate_observability::init_with(&logging.with_default_directive(cli.log_level.clone()));

    let config = cli.config()?;
    let store = Arc::new(config.http_store().context("failed to build fact store client")?);
    tracing::debug!(store_url = %config.store_url, "fact store client ready");

    match &cli.command {
        Commands::Reset { snapshot } => reset(&cli, store, &config, snapshot).await,
        Commands::Check { user, action, resource } => {
            let resolver = AuthorizationResolver::new(store);
            let allowed = resolver
                .authorize(&cli.context_for(*user), &Action::new(action.clone()), resource)
                .await
                .context("authorization check failed")?;
            println!("{}", if allowed { "allowed" } else { "denied" });
            Ok(if allowed { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
        Commands::List { user, action, kind } => {
            let resolver = AuthorizationResolver::new(store);
            let decision = resolver
                .list_authorized_resources(&cli.context_for(*user), &Action::new(action.clone()), *kind)
                .await
                .context("listing failed")?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Actions { user, resource } => {
            let resolver = AuthorizationResolver::new(store);
            let actions = resolver
                .list_actions(&cli.context_for(*user), resource)
                .await
                .context("action query failed")?;
            println!("{}", serde_json::to_string_pretty(&actions)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Members { resource } => {
            let resolver = AuthorizationResolver::new(store);
            let grants = resolver
                .role_assignments(&cli.operator_context(), resource)
                .await
                .context("member lookup failed")?;
            println!("{}", serde_json::to_string_pretty(&grants)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn reset(cli: &Cli, store: Arc<HttpFactStore>, config: &FactgateConfig, path: &Path) -> Result<ExitCode> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot: DomainSnapshot =
        serde_json::from_str(&raw).with_context(|| format!("invalid snapshot in {}", path.display()))?;

    let reconciler = Reconciler::new(BatchSynchronizer::new(store, config.sync));
    let report = reconciler
        .reset(&snapshot, &cli.operator_context())
        .await
        .context("failed to encode snapshot")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.all_applied() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}
