use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::Path;
use std::sync::Arc;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;
use earbot::domain::{Event, OpenAction};
use earbot::host::GithubHost;
use earbot::notify::WebhookNotifier;
use earbot::report::{CommandExtractor, CommandRenderer, CommandTemplate};
use earbot::roster::{Ledger, RosterStore};
use earbot::selection::SelectionRequest;
use earbot::storage::{JsonlStorage, RequestStore};
use earbot::summary::{self, TAG_PREFIX, TagFilter};
use earbot::workflow::Engine;
use earbot::workflow::engine::ReportTools;

fn setup_logging(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.log_level.clone().unwrap_or_else(|| "info".to_string())
    };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    if let Some(log_file) = &config.log_file {
        if let Some(log_dir) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(log_dir).context("Failed to create log directory")?;
        }
        let target = Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .context("Failed to open log file")?,
        );
        builder.target(env_logger::Target::Pipe(target));
    } else {
        builder.target(env_logger::Target::Stderr);
    }

    builder.init();
    info!("Logging initialized");
    Ok(())
}

fn build_engine(config: &Config) -> Result<Engine> {
    let host = GithubHost::new(config.github()?).context("Failed to create GitHub client")?;
    let storage = JsonlStorage::new(&config.roster.state_dir)
        .with_context(|| format!("Failed to open state directory {}", config.roster.state_dir.display()))?;
    let roster = RosterStore::new(&config.roster.roster_path, config.store_options());
    let ledger = Ledger::new(&config.roster.ledger_path);

    let mut engine = Engine::new(Arc::new(host), roster, ledger, storage)
        .with_rules(config.rules())
        .with_selector(config.selector())
        .with_deadline(config.deadline());

    if let Some(bot) = &config.github.bot_login {
        engine = engine.with_bot_login(bot);
    }

    let timeout = std::time::Duration::from_secs(config.report.timeout_secs);
    match (&config.report.extract_command, &config.report.render_command) {
        (Some(extract), Some(render)) => {
            engine = engine.with_reports(ReportTools {
                extractor: Box::new(CommandExtractor::new(CommandTemplate::new(extract).with_timeout(timeout))),
                renderer: Box::new(CommandRenderer::new(CommandTemplate::new(render).with_timeout(timeout))),
                workspace: config.report.workspace_dir.clone(),
            });
        }
        (None, None) => {}
        _ => warn!("Report regeneration needs both extract_command and render_command; disabled"),
    }

    if let Some(url) = &config.notify.webhook_url {
        engine = engine.with_notifier(Box::new(WebhookNotifier::new(url)?));
    }

    Ok(engine)
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        eprintln!("{}", "Verbose mode enabled".yellow());
    }
    if cli.command.needs_host() {
        info!(
            "Repository: {}",
            config.github.repository.as_deref().unwrap_or("<not configured>")
        );
    }

    match &cli.command {
        Commands::OnOpen { number, action } => match OpenAction::parse(action) {
            Some(action) => handle_event(config, *number, Event::Opened { action }).await,
            None => {
                info!("Ignoring request action '{}'", action);
                Ok(())
            }
        },
        Commands::OnComment { number, author, text } => {
            let event = Event::Commented {
                author: author.clone(),
                text: text.clone(),
            };
            handle_event(config, *number, event).await
        }
        Commands::OnReview { number, reviewer } => {
            let event = Event::ReviewSubmitted {
                reviewer: reviewer.clone(),
            };
            handle_event(config, *number, event).await
        }
        Commands::OnClose { number, merged } => handle_event(config, *number, Event::Closed { merged: *merged }).await,
        Commands::OnSweep => handle_sweep(config).await,
        Commands::SelectReviewer {
            institution,
            project,
            exclude,
        } => handle_select_reviewer(config, institution, project.as_deref(), exclude),
        Commands::Summary { tag, all_tags, root } => handle_summary(tag.as_deref(), *all_tags, root),
        Commands::CompactState => handle_compact_state(config),
    }
}

async fn handle_event(config: &Config, number: u64, event: Event) -> Result<()> {
    info!("Handling {} event for request #{}", event.name(), number);
    let mut engine = build_engine(config)?;
    let outcome = engine
        .handle(number, &event)
        .await
        .with_context(|| format!("Failed to handle {} event for request #{}", event.name(), number))?;

    println!(
        "{} #{} {} ({} actions)",
        "Request".green(),
        number,
        outcome.state.phase.name().cyan(),
        outcome.effects.len()
    );
    Ok(())
}

async fn handle_sweep(config: &Config) -> Result<()> {
    let mut engine = build_engine(config)?;
    let report = engine.sweep().await.context("Sweep failed")?;

    println!(
        "{} checked {}, acted on {}",
        "Sweep:".green(),
        report.checked,
        report.acted.len()
    );
    for number in &report.halted {
        println!("  {} #{} needs a human", "Halted:".yellow(), number);
    }
    for (number, error) in &report.failed {
        println!("  {} #{} {}", "Failed:".red(), number, error);
    }

    if !report.is_success() {
        return Err(eyre!("{} of {} requests failed", report.failed.len(), report.checked));
    }
    Ok(())
}

fn handle_select_reviewer(config: &Config, institution: &str, project: Option<&str>, exclude: &[String]) -> Result<()> {
    let store = RosterStore::new(&config.roster.roster_path, config.store_options());
    let roster = store.load().context("Failed to load roster")?.value;

    let mut request = SelectionRequest::new(institution).excluding(exclude.iter().cloned());
    if let Some(project) = project {
        request = request.with_project(project);
    }

    let mut rng = StdRng::from_os_rng();
    let selection = config.selector().select_reviewer(&roster, &request, &mut rng)?;
    println!("{}", selection.table());
    println!();
    println!(
        "{} {} ({})",
        "Selected reviewer:".green(),
        selection.chosen.record.full_name.bold(),
        selection.chosen_id()
    );
    println!("  - {}", selection.reason());
    Ok(())
}

fn handle_compact_state(config: &Config) -> Result<()> {
    let state_dir = &config.roster.state_dir;
    let storage = JsonlStorage::new(state_dir)
        .with_context(|| format!("Failed to open state directory {}", state_dir.display()))?;
    let requests = RequestStore::new(&storage);
    let dropped = requests.compact().context("Failed to compact request state")?;
    let kept = requests.list_all()?.len();

    println!(
        "{} kept {} requests, dropped {} superseded lines",
        "Compacted:".green(),
        kept,
        dropped
    );
    Ok(())
}

fn handle_summary(tag: Option<&str>, all_tags: bool, root: &Path) -> Result<()> {
    let filter = match (tag, all_tags) {
        (Some(tag), _) => TagFilter::Tag(tag.to_string()),
        (None, true) => TagFilter::Prefixed(TAG_PREFIX.to_string()),
        (None, false) => {
            println!("Usage: earbot summary [--tag TAG | --all-tags]");
            return Ok(());
        }
    };

    let totals = summary::collect(root, &filter).context("Failed to read assembly reports")?;
    for tag in totals.tags() {
        println!("{} {}", "EAR tag:".cyan(), tag);
    }

    println!("\n{}", "Summary:".green());
    println!("Total EARs processed: {}", totals.entries.len());
    println!("Total observed haploid size: {} bp", summary::thousands(totals.total_size()));

    if all_tags {
        for (tag, (count, size)) in totals.per_tag() {
            println!("  {:<20} {:>4} EARs {:>20} bp", tag, count, summary::thousands(size));
        }
    }

    if !totals.entries.is_empty() {
        println!("\n{}", "Detailed Results:".green());
        println!("{:<30} {:<15} Observed Size (bp)", "Species", "ToLID");
        println!("{}", "-".repeat(65));
        for entry in totals.sorted() {
            let species: String = entry.species.chars().take(30).collect();
            println!(
                "{:<30} {:<15} {}",
                species,
                entry.tolid,
                summary::thousands(entry.haploid_size)
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&config, cli.is_verbose()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
