//! Price Harvester command-line entry point

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use price_harvester_lib::application::{
    CheckpointManager, HarvestRun, LaunchHarvester, ModelProcessor, PriceHarvester, QueryGenerator, ResumeMode,
    RunSignals, SessionSupervisor, load_models,
};
use price_harvester_lib::domain::ListingClassifier;
use price_harvester_lib::infrastructure::checkpoint_store::FileProgressStore;
use price_harvester_lib::infrastructure::signals::spawn_listeners;
use price_harvester_lib::infrastructure::tabular::TabularRecord;
use price_harvester_lib::infrastructure::{
    AppConfig, ConfigManager, HtmlPageSource, HttpClientConfig, SiteProfile, get_log_directory,
    init_logging_with_config, log_system_info,
};

#[derive(Parser, Debug)]
#[command(name = "price-harvester", version, about = "Per-model phone price and launch-date harvester")]
struct Cli {
    /// Configuration file (JSON or TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Render pages invisibly (browser-backed sources only)
    #[arg(long, global = true)]
    headless: bool,

    /// Process only the first N pending models
    #[arg(long, global = true, value_name = "N")]
    test_limit: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest selling and reference prices from a retail site
    Prices {
        #[arg(long, value_enum)]
        site: RetailSite,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Look up launch dates on the specification reference site
    LaunchDates {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Write the default configuration file and print its path
    InitConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RetailSite {
    Flipkart,
    Amazon,
}

impl RetailSite {
    const fn name(self) -> &'static str {
        match self {
            Self::Flipkart => "flipkart",
            Self::Amazon => "amazon",
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Model list (CSV, TSV or one name per line)
    #[arg(long)]
    input: PathBuf,

    /// Result table
    #[arg(long)]
    output: PathBuf,

    /// Checkpoint file; defaults to `<output stem>.checkpoint.json`
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Ignore any previous progress
    #[arg(long)]
    fresh: bool,

    /// Re-run only the models named in this list
    #[arg(long, value_name = "FILE")]
    error_list: Option<PathBuf>,
}

impl RunArgs {
    fn resume_mode(&self) -> ResumeMode {
        match (&self.error_list, self.fresh) {
            (Some(_), _) => ResumeMode::Retry,
            (None, true) => ResumeMode::Fresh,
            (None, false) => ResumeMode::Resume,
        }
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint
            .clone()
            .unwrap_or_else(|| FileProgressStore::<()>::default_checkpoint_for(&self.output))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Command::InitConfig) {
        let manager = match &cli.config {
            Some(path) => ConfigManager::with_path(path),
            None => ConfigManager::new()?,
        };
        manager.initialize_default().await?;
        println!("{}", manager.config_path().display());
        return Ok(());
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if cli.headless {
        config.harvest.headless = true;
    }
    if let Some(limit) = cli.test_limit {
        config.harvest.test_mode = true;
        config.harvest.test_limit = limit;
    }
    config.validate()?;

    init_logging_with_config(&config.logging)?;
    log_system_info();
    if config.harvest.headless {
        info!("Headless mode requested; the HTTP page source never renders a window");
    }

    match cli.command {
        Command::Prices { site, run } => {
            let profile = resolve_profile(&config, site.name())?;
            let processor = PriceHarvester::new(profile.clone(), &config);
            harvest(processor, profile, &config, &run).await
        }
        Command::LaunchDates { run } => {
            let profile = resolve_profile(&config, "gsmarena")?;
            let processor = LaunchHarvester::new(profile.clone(), &config.matching);
            harvest(processor, profile, &config, &run).await
        }
        Command::InitConfig => Ok(()),
    }
}

/// Configured override first, then the built-in profile.
fn resolve_profile(config: &AppConfig, name: &str) -> Result<SiteProfile> {
    config
        .sites
        .get(name)
        .cloned()
        .or_else(|| SiteProfile::builtin(name))
        .ok_or_else(|| anyhow!("Unknown site '{}' (built-in: {:?})", name, SiteProfile::builtin_names()))
}

async fn harvest<P>(processor: P, profile: SiteProfile, config: &AppConfig, run: &RunArgs) -> Result<()>
where
    P: ModelProcessor,
    P::Output: TabularRecord + 'static,
{
    let generator = QueryGenerator::new(config.harvest.search_hint.clone());
    let models = load_models(&run.input, Some(&profile.name), run.error_list.as_deref(), &generator)
        .await
        .with_context(|| format!("Failed to load model list {}", run.input.display()))?;
    if models.models.is_empty() {
        warn!("⚠️ No models to process in {}", run.input.display());
        return Ok(());
    }

    let checkpoint_path = run.checkpoint_path();
    info!("💾 Checkpoint: {}", checkpoint_path.display());
    let store = FileProgressStore::<P::Output>::new(&checkpoint_path).with_output(&run.output);
    let checkpoint = CheckpointManager::open(
        store,
        &models.models,
        models.already_processed.clone(),
        run.resume_mode(),
        config.harvest.checkpoint_interval,
    )
    .await?;

    let matching = &config.matching;
    let classifier = ListingClassifier::new(
        matching.accessory_keywords.clone(),
        matching.category_keywords.clone(),
        matching.foreign_category_keywords.clone(),
    );
    let mut source = HtmlPageSource::new(
        profile,
        HttpClientConfig::from_settings(&config.network, &config.session),
        classifier,
    )?;
    if config.harvest.debug_snapshots {
        source = source.with_snapshot_dir(get_log_directory(&config.logging).join("snapshots"));
    }
    let supervisor = SessionSupervisor::new(Box::new(source), &config.session, config.harvest.session_refresh_interval);

    let test_limit = config.harvest.test_mode.then_some(config.harvest.test_limit);
    let mut harvest_run = HarvestRun::new(processor, supervisor, checkpoint, generator).with_test_limit(test_limit);

    let (sender, mut signals) = RunSignals::channel();
    let listeners = spawn_listeners(&sender);
    info!("Type 's' + Enter to save progress, 'q' + Enter or Ctrl-C to stop");

    let outcome = harvest_run.execute(&mut signals).await;
    for listener in listeners {
        listener.abort();
    }

    let summary = outcome?;
    info!("📋 {} row(s) written to {}", harvest_run.checkpoint().results().len(), run.output.display());
    if summary.interrupted {
        info!("Run interrupted; start again without --fresh to resume");
    }
    Ok(())
}
