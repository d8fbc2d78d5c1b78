use anyhow::Context;
use auditor_core::config::default_config_path;
use auditor_core::{AuditConfig, AuditMode, AuditReport, IgnorePatterns, MalformedPolicy, ResourceKind};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use reconcile_engine::{Auditor, InventorySnapshot, InventorySource};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "auditor")]
#[command(about = "Auditor CLI - Reservation coverage audits")]
#[command(version = auditor_core::VERSION)]
struct Cli {
    /// Config file (defaults to ~/.aws_auditor.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit an inventory snapshot and print the reports as JSON
    Audit(AuditArgs),
    /// Group running resources of a region by owning stack
    Stacks {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        region: String,
        #[arg(long, value_enum, default_value = "ec2")]
        kind: KindArg,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct AuditArgs {
    /// JSON inventory snapshot
    #[arg(long)]
    snapshot: PathBuf,
    /// Comma separated regions; defaults to config, then every snapshot region
    #[arg(long)]
    region: Option<String>,
    #[arg(long = "kind", value_enum)]
    kinds: Vec<KindArg>,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Watched expiration tag
    #[arg(long)]
    tag: Option<String>,
    #[arg(long)]
    no_tag: bool,
    /// Comma separated ignore patterns
    #[arg(long)]
    ignore: Option<String>,
    #[arg(long)]
    window_days: Option<u32>,
    /// Fail a unit on the first malformed payload
    #[arg(long)]
    strict: bool,
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Ec2,
    Rds,
    Cache,
}

impl From<KindArg> for ResourceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Ec2 => ResourceKind::Ec2,
            KindArg::Rds => ResourceKind::Rds,
            KindArg::Cache => ResourceKind::Cache,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Instances,
    Reserved,
    All,
}

impl From<ModeArg> for AuditMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Instances => AuditMode::Instances,
            ModeArg::Reserved => AuditMode::Reserved,
            ModeArg::All => AuditMode::All,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Audit(args) => handle_audit(config, args).await,
        Commands::Stacks {
            snapshot,
            region,
            kind,
        } => handle_stacks(config, snapshot, region, kind.into()),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AuditConfig> {
    match path.cloned().or_else(default_config_path) {
        Some(path) => AuditConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(AuditConfig::default()),
    }
}

/// Layer command-line flags over the file configuration.
fn apply_overrides(mut config: AuditConfig, args: &AuditArgs) -> AuditConfig {
    if let Some(regions) = &args.region {
        config.regions = regions
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();
    }
    if !args.kinds.is_empty() {
        config.kinds = args.kinds.iter().copied().map(ResourceKind::from).collect();
    }
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    if let Some(tag) = &args.tag {
        config.tag_name = Some(tag.clone());
    }
    if args.no_tag {
        config.no_tag = true;
    }
    if let Some(ignore) = &args.ignore {
        config.ignore_instances_patterns = IgnorePatterns::split_list(ignore);
    }
    if let Some(days) = args.window_days {
        config.retirement_window_days = days;
    }
    if args.strict {
        config.on_malformed = MalformedPolicy::Abort;
    }
    config
}

async fn handle_audit(config: AuditConfig, args: AuditArgs) -> anyhow::Result<()> {
    let config = apply_overrides(config, &args);
    let snapshot = InventorySnapshot::load(&args.snapshot)
        .with_context(|| format!("reading snapshot {}", args.snapshot.display()))?;

    let reports = run_audit(&config, Arc::new(snapshot)).await?;

    let output = if args.pretty {
        serde_json::to_string_pretty(&reports)?
    } else {
        serde_json::to_string(&reports)?
    };
    println!("{}", output);
    Ok(())
}

/// Audit every (region, kind) unit in parallel; reports come back in
/// (region, kind) order.
async fn run_audit(
    config: &AuditConfig,
    source: Arc<dyn InventorySource>,
) -> anyhow::Result<Vec<AuditReport>> {
    let compiled = config.compile().context("invalid audit configuration")?;
    let regions = if compiled.regions.is_empty() {
        source.regions()
    } else {
        compiled.regions.clone()
    };
    let kinds = compiled.kinds.clone();
    let auditor = Auditor::new(compiled);
    let now = Utc::now();

    info!(
        display = config.display_name.as_deref().unwrap_or("default"),
        regions = regions.len(),
        kinds = kinds.len(),
        "Starting audit"
    );

    let mut units = JoinSet::new();
    for (region_index, region) in regions.iter().enumerate() {
        for (kind_index, kind) in kinds.iter().copied().enumerate() {
            let auditor = auditor.clone();
            let source = Arc::clone(&source);
            let region = region.clone();
            units.spawn_blocking(move || {
                let report = auditor.audit_source(source.as_ref(), &region, kind, now);
                ((region_index, kind_index), report)
            });
        }
    }

    let mut reports = Vec::new();
    while let Some(joined) = units.join_next().await {
        let (order, report) = joined.context("audit task panicked")?;
        let report = report.context("audit unit failed")?;
        if !report.clock_skew.is_empty() {
            warn!(
                region = %report.region,
                kind = %report.kind,
                count = report.clock_skew.len(),
                "Reservations retire in the future"
            );
        }
        reports.push((order, report));
    }

    reports.sort_by_key(|(order, _)| *order);
    Ok(reports.into_iter().map(|(_, report)| report).collect())
}

fn handle_stacks(
    config: AuditConfig,
    snapshot: PathBuf,
    region: String,
    kind: ResourceKind,
) -> anyhow::Result<()> {
    let snapshot = InventorySnapshot::load(&snapshot)
        .with_context(|| format!("reading snapshot {}", snapshot.display()))?;
    let auditor = Auditor::new(config.compile()?);
    let inventory = snapshot.fetch(&region, kind)?;

    let (buckets, skipped) = auditor.running_by_stack(&inventory)?;
    if !skipped.is_empty() {
        warn!(region = %region, kind = %kind, skipped = skipped.len(), "Some payloads were not grouped");
    }
    for (stack, records) in buckets {
        println!("{} ({})", stack, records.len());
        for record in records {
            println!("  {} {}", record.id, record.label());
        }
    }
    Ok(())
}
