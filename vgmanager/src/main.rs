use adapter::DevOpsClient;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use engine::audit::{AuditRecorder, AuditSink, JsonlAuditSink, MemoryAuditSink};
use engine::predicate::PredicateCompiler;
use engine::{Credential, FilterRequest, Operation, Request, VariableManager};
use metrics_exporter_statsd::StatsdBuilder;
use serde::Serialize;
use shared::metrics_defs::describe_metrics;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod config;
mod logging;

use config::{Config, MetricsConfig};

#[derive(Parser)]
#[command(about = "Bulk query and edit of pipeline variable groups")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Personal access token used against the remote service.
    #[arg(long, env = "VGMANAGER_PAT", hide_env_values = true, global = true)]
    pat: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// List matching variables.
    Get {
        #[command(flatten)]
        filter: FilterArgs,
        /// Also report entries of vault-backed groups.
        #[arg(long)]
        include_secrets: bool,
    },
    /// Add a variable to every matching group.
    Add {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
    /// Set a new value on every matching variable.
    Update {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        new_value: String,
    },
    /// Remove every matching variable.
    Delete {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show audited changes within a time range.
    Changes {
        #[arg(long)]
        from: DateTime<Utc>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    organization: String,
    /// A project name, or "All" for every project of the organization.
    #[arg(long)]
    project: String,
    /// Recorded as the author of audited changes.
    #[arg(long, env = "USER", default_value = "unknown")]
    user: String,
    /// Regex over variable group names.
    #[arg(long)]
    group_filter: String,
    #[arg(long)]
    key_filter: Option<String>,
    /// Treat the key filter as a regex instead of a literal.
    #[arg(long)]
    key_is_regex: bool,
    /// Regex over variable values.
    #[arg(long)]
    value_filter: Option<String>,
}

impl FilterArgs {
    fn into_filter(self, credential: Credential, include_secrets: bool) -> FilterRequest {
        FilterRequest {
            organization: self.organization,
            project: self.project,
            user: self.user,
            credential,
            group_filter: self.group_filter,
            key_filter: self.key_filter,
            key_is_regex: self.key_is_regex,
            value_filter: self.value_filter,
            include_secrets,
        }
    }
}

fn init_metrics(config: &MetricsConfig) -> Result<(), Box<dyn Error>> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(&config.prefix))?;
    metrics::set_global_recorder(recorder)?;

    describe_metrics(engine::metrics_defs::ALL_METRICS);
    describe_metrics(adapter::metrics_defs::ALL_METRICS);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let _sentry = logging::init(&config.logging);
    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }

    let sink: Arc<dyn AuditSink> = match &config.audit.path {
        Some(path) => Arc::new(JsonlAuditSink::new(path)),
        None => Arc::new(MemoryAuditSink::new()),
    };
    let audit = AuditRecorder::new(sink, config.audit.organizations.clone());
    let client = Arc::new(DevOpsClient::new(config.devops.clone()));
    let manager = VariableManager::new(
        client.clone(),
        client,
        Arc::new(PredicateCompiler::new(&config.predicates)),
        audit,
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight calls");
            ctrl_c.cancel();
        }
    });

    let credential = || -> Result<Credential, Box<dyn Error>> {
        cli.pat
            .clone()
            .map(Credential::new)
            .ok_or_else(|| "a personal access token is required (--pat or VGMANAGER_PAT)".into())
    };

    let (filter, operation) = match cli.command {
        CliCommand::Changes { from, to, user } => {
            let entries = manager
                .history(from, to.unwrap_or_else(Utc::now), user.as_deref())
                .await?;
            return print_json(&entries);
        }
        CliCommand::Get {
            filter,
            include_secrets,
        } => (filter.into_filter(credential()?, include_secrets), Operation::Get),
        CliCommand::Add { filter, key, value } => (
            filter.into_filter(credential()?, false),
            Operation::Add { key, value },
        ),
        CliCommand::Update { filter, new_value } => (
            filter.into_filter(credential()?, false),
            Operation::Update { new_value },
        ),
        CliCommand::Delete { filter } => (filter.into_filter(credential()?, false), Operation::Delete),
    };

    let result = manager.execute(&Request::new(filter, operation), &cancel).await?;
    if !result.status.is_success() {
        tracing::warn!(status = %result.status, "Operation did not fully succeed");
    }
    print_json(&result)
}
