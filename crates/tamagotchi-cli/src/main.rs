//! GitHub Tamagotchi CLI
//!
//! The `tamagotchi` command keeps a virtual pet for each GitHub repository.
//!
//! ## Commands
//!
//! - `register`: hatch a pet for a repository
//! - `status` / `list` / `history`: inspect pets
//! - `feed` / `refresh` / `revive`: manual cycles
//! - `check`: evaluate a repository once without saving anything
//! - `watch`: poll every registered pet until interrupted

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tamagotchi_core::{
    apply_cycle, CycleOutcome, EvolutionEngine, EvolutionStage, HealthEvaluator, MetricSource,
    PetError, PetId, PetService, PetState, PetStateStore, RepoRef, StageProgress,
    TamagotchiConfig,
};
use tamagotchi_github::{GitHubConfig, GitHubMetricSource};
use tamagotchi_state::SurrealPetStore;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "tamagotchi")]
#[command(author = "GitHub Tamagotchi Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Keep your repositories' pets alive", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON and emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "TAMAGOTCHI_CONFIG")]
    config: Option<PathBuf>,

    /// Database directory, or `mem` for a throwaway in-memory database
    #[arg(long, global = true, env = "TAMAGOTCHI_DB", default_value = ".tamagotchi/db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hatch a pet for a repository (owner/name)
    Register {
        repo: String,

        /// Pet name (default: repository name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show one pet (by id or owner/name)
    Status { pet: String },

    /// List all pets
    List,

    /// Show a pet's recent events
    History {
        pet: String,

        /// Maximum number of events to show, newest last
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Feed a pet as if a fresh commit had been merged
    Feed { pet: String },

    /// Fetch repository metrics and update the pet now
    Refresh { pet: String },

    /// Bring a dormant pet back as a baby
    Revive { pet: String },

    /// Stop polling a pet (its state is kept)
    Deregister { pet: String },

    /// Evaluate a repository once and print the result without saving
    Check { repo: String },

    /// Poll every registered pet until Ctrl-C
    Watch {
        /// Repositories to register before watching
        repos: Vec<String>,
    },
}

/// Configuration file layout: engine sections plus `[github]`.
#[derive(Debug, Default, Deserialize, Serialize)]
struct FileConfig {
    #[serde(flatten)]
    engine: TamagotchiConfig,
    #[serde(default)]
    github: GitHubConfig,
}

impl FileConfig {
    fn parse(raw: &str) -> Result<Self> {
        let mut config: FileConfig = toml::from_str(raw).context("Invalid configuration file")?;
        config.engine.validate()?;
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                config.github.token = Some(token);
            }
        }
        Ok(config)
    }

    fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::parse(&raw)
            }
            None => Ok(FileConfig::default()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tamagotchi_core::telemetry::init_tracing(cli.json, level);

    let config = FileConfig::load(cli.config.as_deref())?;
    let store = open_store(&cli.db).await?;
    let source: Arc<dyn MetricSource> = Arc::new(
        GitHubMetricSource::new(config.github.clone()).context("Failed to set up GitHub client")?,
    );
    let service = PetService::new(Arc::clone(&store), Arc::clone(&source), config.engine.clone());
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Register { repo, name } => cmd_register(&service, &out, &repo, name).await,
        Commands::Status { pet } => cmd_status(&service, &out, &pet).await,
        Commands::List => cmd_list(&service, &out).await,
        Commands::History { pet, limit } => cmd_history(&service, &out, &pet, limit).await,
        Commands::Feed { pet } => cmd_feed(&service, &out, &pet).await,
        Commands::Refresh { pet } => cmd_refresh(&service, &out, &pet).await,
        Commands::Revive { pet } => cmd_revive(&service, &out, &pet).await,
        Commands::Deregister { pet } => cmd_deregister(&service, &out, &pet).await,
        Commands::Check { repo } => {
            cmd_check(store.as_ref(), source.as_ref(), &config.engine, &out, &repo).await
        }
        Commands::Watch { repos } => cmd_watch(&service, &repos).await,
    }
}

/// Open the SurrealDB-backed store at `db`.
async fn open_store(db: &str) -> Result<Arc<dyn PetStateStore>> {
    let store = if db == "mem" {
        SurrealPetStore::in_memory().await
    } else {
        SurrealPetStore::local(db).await
    }
    .with_context(|| format!("Failed to open pet database at '{db}'"))?;
    Ok(Arc::new(store))
}

/// Text or JSON printer for command results.
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}

fn parse_repo(input: &str) -> Result<RepoRef> {
    input
        .parse::<RepoRef>()
        .with_context(|| format!("Expected a repository as owner/name, got '{input}'"))
}

/// Resolve a pet argument: `owner/name` looks up by repository, anything
/// else is taken as a pet id.
async fn resolve_pet(service: &PetService, arg: &str) -> Result<PetId> {
    if arg.contains('/') {
        let repo = parse_repo(arg)?;
        let pet = service
            .find_pet(&repo)
            .await
            .with_context(|| format!("No pet registered for {repo}"))?;
        Ok(pet.id)
    } else {
        Ok(PetId(arg.to_string()))
    }
}

fn render_pet(pet: &PetState) -> String {
    let mut lines = vec![
        format!("{} \"{}\" [{}]  mood: {}", pet.repo, pet.name, pet.stage, pet.mood),
        format!(
            "  happiness {:>3}  hunger {:>3}  sick: {}",
            pet.happiness,
            pet.hunger,
            if pet.sick { "yes" } else { "no" }
        ),
        format!("  growth {}  version {}  id {}", pet.growth_score, pet.version, pet.id),
    ];
    if let Some(at) = pet.last_evaluated_at {
        lines.push(format!("  last evaluated {}", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if let Some(at) = pet.last_fed_at {
        lines.push(format!("  last fed       {}", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    lines.join("\n")
}

fn render_progress(progress: &StageProgress) -> String {
    fn stages(list: &[EvolutionStage]) -> String {
        list.iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" > ")
    }

    let next = match (progress.next_stage, progress.growth_needed) {
        (Some(next), Some(needed)) => format!(
            "{}% to {next} ({}/{needed})",
            progress.percent, progress.growth_score
        ),
        _ if progress.stage.is_dormant() => "dormant, revive to grow again".to_string(),
        _ => "fully grown".to_string(),
    };
    format!(
        "  {next}, age {} day(s)\n  reached: {}\n  ahead:   {}",
        progress.age_days,
        stages(&progress.stages_completed),
        stages(&progress.stages_remaining)
    )
}

fn outcome_json(outcome: &CycleOutcome) -> serde_json::Value {
    serde_json::json!({
        "state": outcome.state,
        "delta": outcome.delta,
        "transition": outcome.transition,
        "attempts": outcome.attempts,
    })
}

fn render_outcome(outcome: &CycleOutcome) -> String {
    let mut text = render_pet(&outcome.state);
    if let Some(delta) = &outcome.delta {
        let events: Vec<&str> = delta.events.iter().map(|e| e.as_str()).collect();
        text.push_str(&format!(
            "\n  delta: happiness {:+}, hunger {:+}, events [{}]",
            delta.happiness,
            delta.hunger,
            events.join(", ")
        ));
    }
    if let Some(t) = outcome.transition {
        text.push_str(&format!("\n  evolved: {} -> {}", t.from, t.to));
    }
    text
}

/// Register a repository
async fn cmd_register(
    service: &PetService,
    out: &Output,
    repo: &str,
    name: Option<String>,
) -> Result<()> {
    let repo = parse_repo(repo)?;
    let pet = service.register_pet(repo, name).await?;
    out.emit(&pet, || format!("Hatched a new egg!\n{}", render_pet(&pet)))
}

async fn cmd_status(service: &PetService, out: &Output, arg: &str) -> Result<()> {
    let id = resolve_pet(service, arg).await?;
    let pet = service.get_pet_state(&id).await?;
    let progress = service.get_pet_progress(&id).await?;
    let value = serde_json::json!({ "pet": pet, "progress": progress });
    out.emit(&value, || {
        format!("{}\n{}", render_pet(&pet), render_progress(&progress))
    })
}

async fn cmd_list(service: &PetService, out: &Output) -> Result<()> {
    let pets = service.list_pets().await?;
    out.emit(&pets, || {
        if pets.is_empty() {
            return "No pets yet. Run 'tamagotchi register owner/name' first.".to_string();
        }
        pets.iter()
            .map(|p| {
                format!(
                    "{:<36}  {:<30} {:<8} {:<8} happy {:>3} hunger {:>3}{}",
                    p.id,
                    p.repo.to_string(),
                    p.stage.as_str(),
                    p.mood.to_string(),
                    p.happiness,
                    p.hunger,
                    if p.sick { "  sick" } else { "" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

async fn cmd_history(service: &PetService, out: &Output, arg: &str, limit: usize) -> Result<()> {
    let id = resolve_pet(service, arg).await?;
    let history = service.get_pet_history(&id).await?;
    let progress = service.get_pet_progress(&id).await?;
    let recent = &history[history.len().saturating_sub(limit)..];
    let value = serde_json::json!({ "progress": progress, "events": recent });
    out.emit(&value, || {
        let mut lines = vec![render_progress(&progress)];
        if recent.is_empty() {
            lines.push("Nothing has happened yet.".to_string());
        }
        lines.extend(
            recent
                .iter()
                .map(|e| format!("{}  {}", e.at.format("%Y-%m-%d %H:%M:%S UTC"), e.tag)),
        );
        lines.join("\n")
    })
}

async fn cmd_feed(service: &PetService, out: &Output, arg: &str) -> Result<()> {
    let id = resolve_pet(service, arg).await?;
    let pet = service.feed_pet(&id).await?;
    out.emit(&pet, || format!("Yum!\n{}", render_pet(&pet)))
}

async fn cmd_refresh(service: &PetService, out: &Output, arg: &str) -> Result<()> {
    let id = resolve_pet(service, arg).await?;
    let outcome = service.refresh_pet(&id).await?;
    out.emit(&outcome_json(&outcome), || render_outcome(&outcome))
}

async fn cmd_revive(service: &PetService, out: &Output, arg: &str) -> Result<()> {
    let id = resolve_pet(service, arg).await?;
    let pet = service.revive_pet(&id).await?;
    out.emit(&pet, || format!("Welcome back!\n{}", render_pet(&pet)))
}

async fn cmd_deregister(service: &PetService, out: &Output, arg: &str) -> Result<()> {
    let id = resolve_pet(service, arg).await?;
    service.deregister_pet(&id).await?;
    out.emit(&serde_json::json!({ "deregistered": id.as_str() }), || {
        format!("Stopped polling pet {id}")
    })
}

/// Evaluate once against the stored pet (or a fresh egg) without saving.
async fn cmd_check(
    store: &dyn PetStateStore,
    source: &dyn MetricSource,
    config: &TamagotchiConfig,
    out: &Output,
    repo: &str,
) -> Result<()> {
    let repo = parse_repo(repo)?;
    let current = match store.find_by_repo(&repo).await? {
        Some(pet) => pet,
        None => PetState::hatch(
            repo.clone(),
            repo.name.clone(),
            config.vitals.initial_happiness,
            config.vitals.initial_hunger,
        ),
    };
    let snapshot = source
        .fetch_snapshot(&repo)
        .await
        .map_err(|err| PetError::SourceUnavailable {
            repo: repo.to_string(),
            source: err,
        })?;

    let (next, report) = apply_cycle(
        &current,
        &snapshot,
        &HealthEvaluator::new(config.health.clone()),
        &EvolutionEngine::new(config.evolution.clone()),
        &config.vitals,
    );
    let outcome = CycleOutcome {
        state: next,
        delta: Some(report.delta),
        transition: report.transition,
        attempts: 0,
    };
    let value = serde_json::json!({
        "snapshot": snapshot,
        "outcome": outcome_json(&outcome),
    });
    out.emit(&value, || {
        let unknown = snapshot.unknown_fields();
        let mut text = render_outcome(&outcome);
        if !unknown.is_empty() {
            text.push_str(&format!("\n  unknown: {}", unknown.join(", ")));
        }
        format!("{text}\n  (dry run, nothing saved)")
    })
}

/// Register `repos`, then poll every pet until interrupted.
async fn cmd_watch(service: &PetService, repos: &[String]) -> Result<()> {
    let resumed = service.resume().await?;
    for repo in repos {
        match service.register_pet(parse_repo(repo)?, None).await {
            Ok(pet) => println!("Hatched {} for {}", pet.id, pet.repo),
            Err(PetError::AlreadyRegistered(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    let tracked = service.scheduler().tracked().len();
    info!(resumed, tracked, started_at = %Utc::now(), "watching pets");
    println!("Watching {tracked} pet(s). Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    service.shutdown().await;
    println!("Stopped.");
    Ok(())
}
