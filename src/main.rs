use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use herald_core::campaign::Campaign;
use herald_core::config::{expand_home, AppConfig, ModelConfig};
use herald_core::event::EventBus;
use herald_core::types::{FeedbackInput, FeedbackStatus, WorkflowEvent};

use herald_agent::{
    CallPolicy, CampaignOrchestrator, CampaignRun, Collaborators, DirectoryPublisher, GraphEngine,
    RunOutcome, SnapshotStore, SqliteSnapshotStore,
};
use herald_knowledge::KnowledgeBase;
use herald_llm::LlmCollaborator;

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "Plan, draft, review and publish marketing campaigns"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "herald.toml", env = "HERALD_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a campaign and run it until drafts are ready for review
    Start {
        /// Campaign goal, e.g. "Launch our new eco-friendly sneaker line"
        #[arg(trailing_var_arg = true, required = true)]
        goal: Vec<String>,
    },
    /// Resume a campaign waiting for feedback
    Resume {
        /// Campaign id printed by `start`
        id: String,
        /// Approve every pending draft
        #[arg(long, conflicts_with_all = ["approve", "revise"])]
        approve_all: bool,
        /// Approve the draft at this index (repeatable)
        #[arg(long)]
        approve: Vec<usize>,
        /// Request a revision, as INDEX=NOTE (repeatable)
        #[arg(long, value_parser = parse_revision)]
        revise: Vec<(usize, String)>,
    },
    /// Show a campaign, or list campaigns when no id is given
    Show {
        id: Option<String>,
    },
    /// Load .txt/.md files from a directory into the knowledge base
    Ingest {
        dir: PathBuf,
        /// Drop existing chunks first
        #[arg(long)]
        clear: bool,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn parse_revision(raw: &str) -> Result<(usize, String), String> {
    let (index, note) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=NOTE, got '{}'", raw))?;
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("bad index '{}': {}", index, e))?;
    let note = note.trim();
    if note.is_empty() {
        return Err(format!("revision note for asset {} is empty", index));
    }
    Ok((index, note.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("herald=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "herald", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Ingest { dir, clear } => {
            let kb = KnowledgeBase::open(&config.knowledge_path())?;
            if clear {
                kb.clear()?;
            }
            let report = herald_knowledge::ingest_dir(
                &kb,
                &dir,
                config.knowledge.chunk_size,
                config.knowledge.chunk_overlap,
            )?;
            println!(
                "Ingested {} chunks from {} documents into {}.",
                report.chunks,
                report.documents,
                config.knowledge_path().display()
            );
            for source in report.skipped {
                println!("  skipped (no text): {}", source);
            }
        }
        Commands::Show { id } => {
            let store = SqliteSnapshotStore::open(&config.store_path())?;
            match id {
                Some(id) => {
                    let snapshot = store
                        .load_latest(&id)?
                        .with_context(|| format!("no campaign with id {}", id))?;
                    print_campaign(&snapshot.restore()?);
                }
                None => {
                    let campaigns = store.list()?;
                    if campaigns.is_empty() {
                        println!("No campaigns yet. Start one with `herald start <goal>`.");
                    }
                    for (id, status) in campaigns {
                        println!("{}  {}", id, status);
                    }
                }
            }
        }
        Commands::Start { goal } => {
            let orchestrator = build_orchestrator(&config)?;
            let run = orchestrator.start_campaign(&goal.join(" ")).await?;
            print_run(&run);
        }
        Commands::Resume {
            id,
            approve_all,
            approve,
            revise,
        } => {
            let orchestrator = build_orchestrator(&config)?;
            let input = if approve_all {
                let campaign = orchestrator
                    .load(&id)?
                    .with_context(|| format!("no campaign with id {}", id))?;
                approve_all_pending(&campaign)?
            } else {
                let mut input = FeedbackInput::new();
                for index in approve {
                    input = input.approve(index);
                }
                for (index, note) in revise {
                    input = input.revise(index, note);
                }
                input
            };
            if input.is_empty() {
                bail!("nothing to resume with: pass --approve-all, --approve N or --revise N=note");
            }
            let run = orchestrator.resume_latest(&id, input).await?;
            print_run(&run);
        }
        // Handled before config loading
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Approve every draft the suspended campaign is waiting on.
fn approve_all_pending(campaign: &Campaign) -> anyhow::Result<FeedbackInput> {
    match &campaign.suspension {
        Some(suspension) if campaign.is_suspended() => {
            Ok(FeedbackInput::approve_all(suspension.pending.iter().copied()))
        }
        _ => bail!(
            "campaign {} is not awaiting feedback (status {}, stage {})",
            campaign.id,
            campaign.status,
            campaign.current_stage
        ),
    }
}

/// Load config from the given path, the home directory, or the environment.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    let home_config = expand_home("~/.herald/config.toml");
    if home_config.exists() {
        info!(path = %home_config.display(), "Loading config from home directory");
        return Ok(AppConfig::load(&home_config)?);
    }
    warn!("No config file found, using OPENAI_API_KEY or a local Ollama model");
    create_env_config()
}

fn create_env_config() -> anyhow::Result<AppConfig> {
    let (provider, model_id, api_key) = match std::env::var("OPENAI_API_KEY") {
        Ok(key) => ("openai", "gpt-4o-mini", Some(key)),
        Err(_) => ("ollama", "llama3.2", None),
    };
    let config = AppConfig {
        model: ModelConfig {
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            api_key,
            base_url: None,
            max_tokens: 4096,
            temperature: 0.0,
            retry: None,
        },
        fallback_models: vec![],
        workflow: Default::default(),
        collaborators: Default::default(),
        store: Default::default(),
        knowledge: Default::default(),
        publish: Default::default(),
    };
    config.validate()?;
    Ok(config)
}

fn build_orchestrator(config: &AppConfig) -> anyhow::Result<CampaignOrchestrator> {
    let llm: Arc<dyn herald_core::traits::LlmClient> =
        Arc::from(herald_llm::client_from_config(config));
    let model = Arc::new(LlmCollaborator::new(llm, config.model.clone()));
    let knowledge = Arc::new(
        KnowledgeBase::open(&config.knowledge_path())
            .context("failed to open knowledge base")?,
    );
    if knowledge.count()? == 0 {
        warn!("Knowledge base is empty; run `herald ingest <dir>` for grounded drafts");
    }
    let publisher = Arc::new(DirectoryPublisher::new(config.output_dir()));
    let store = Arc::new(
        SqliteSnapshotStore::open(&config.store_path()).context("failed to open campaign store")?,
    );

    let collaborators = Collaborators::new(model.clone(), knowledge, model, publisher);
    let events = Arc::new(EventBus::default());
    let engine = GraphEngine::new(collaborators, config.workflow.clone())
        .with_policy(CallPolicy::from_config(&config.collaborators))
        .with_events(events.clone());

    spawn_progress_printer(&events);

    // Cancel between stages on Ctrl-C
    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling after the current stage...");
            cancel.cancel();
        }
    });

    Ok(CampaignOrchestrator::new(engine, store))
}

fn spawn_progress_printer(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                WorkflowEvent::StageEntered {
                    stage, asset_index, ..
                } => match asset_index {
                    Some(i) => eprintln!("  \x1b[2m> {} [asset {}]\x1b[0m", stage, i),
                    None => eprintln!("  \x1b[2m> {}\x1b[0m", stage),
                },
                WorkflowEvent::BudgetExhausted {
                    asset_index,
                    loop_kind,
                    ..
                } => eprintln!(
                    "  \x1b[33m! {} retries exhausted for asset {}, continuing\x1b[0m",
                    loop_kind, asset_index
                ),
                _ => {}
            }
        }
    });
}

fn print_run(run: &CampaignRun) {
    println!();
    match &run.outcome {
        RunOutcome::Suspended(request) => {
            println!("Campaign {} is waiting for feedback.\n", run.campaign_id);
            for pending in &request.pending {
                let flag = if pending.degraded { " (degraded)" } else { "" };
                println!("--- [{}] {}{} ---", pending.index, pending.asset_type, flag);
                println!("{}\n", pending.draft);
            }
            println!(
                "Approve with `herald resume {} --approve-all`, or revise with --revise N=\"note\".",
                run.campaign_id
            );
        }
        RunOutcome::Completed => {
            println!("Campaign {} finished ({}).", run.campaign_id, run.campaign.status);
            for task in &run.campaign.plan {
                if let Some(doc) = &task.document {
                    println!("  {}: {}", task.asset_type, doc.url);
                }
            }
            if let Some(critique) = &run.campaign.critique {
                println!("\n{}", critique);
            }
        }
        RunOutcome::Failed(reason) => {
            println!("Campaign {} aborted: {}", run.campaign_id, reason);
            println!("Inspect it with `herald show {}`.", run.campaign_id);
        }
    }
}

fn print_campaign(campaign: &Campaign) {
    println!("Campaign: {}", campaign.id);
    println!("Goal:     {}", campaign.goal());
    println!("Status:   {} (stage {})", campaign.status, campaign.current_stage);
    println!("Created:  {}", campaign.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(failure) = &campaign.failure {
        println!("Failure:  {}", failure);
    }

    for (i, task) in campaign.plan.iter().enumerate() {
        let status = match task.feedback_status {
            FeedbackStatus::Pending => "pending",
            FeedbackStatus::Approved => "approved",
            FeedbackStatus::RevisionRequested => "revision requested",
        };
        println!("\n--- [{}] {} ({}) ---", i, task.asset_type, status);
        for marker in &task.degraded {
            println!(
                "  degraded: {} loop forced after {} attempts ({})",
                marker.loop_kind, marker.attempts, marker.overridden
            );
        }
        if let Some(doc) = &task.document {
            println!("  published: {}", doc.url);
        }
        match &task.draft {
            Some(draft) => println!("{}", draft),
            None => println!("(no draft yet)"),
        }
    }

    if let Some(critique) = &campaign.critique {
        println!("\n{}", critique);
    }
}
