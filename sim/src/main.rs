// ABOUTME: Tarot-deck regeneration simulation with two agents and a human.
// ABOUTME: Demonstrates the task queue, file locks, and conflict resolution in huddle.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{debug, info, warn};

use huddle::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "huddle-sim", about = "Simulate two agents and a human regenerating a tarot deck")]
struct Args {
    /// Number of cards to regenerate, starting from The Fool.
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(1..=22))]
    cards: u32,

    /// Stage a lost update on the deck file and resolve it as the user.
    #[arg(long)]
    seed_conflict: bool,

    /// Write a snapshot of the final state to this path.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

const DECK_PATH: &str = "deck.json";
const MAJOR_ARCANA: [&str; 22] = [
    "The Fool",
    "The Magician",
    "The High Priestess",
    "The Empress",
    "The Emperor",
    "The Hierophant",
    "The Lovers",
    "The Chariot",
    "Strength",
    "The Hermit",
    "Wheel of Fortune",
    "Justice",
    "The Hanged Man",
    "Death",
    "Temperance",
    "The Devil",
    "The Tower",
    "The Star",
    "The Moon",
    "The Sun",
    "Judgement",
    "The World",
];
const LOCK_TTL: Duration = Duration::from_secs(5);

/// Extract a result from an outcome, turning a failure into an error.
fn expect_ok<T>(outcome: Outcome<T>, what: &str) -> Result<Option<T>> {
    outcome
        .into_result()
        .map_err(|e| anyhow!("{what} failed: {} ({})", e.message, e.code))
}

// ============================================================================
// Agent loop
// ============================================================================

async fn run_agent(coordinator: Coordinator, actor: Actor) -> Result<u32> {
    let mut regenerated = 0;

    while let Some(task) = expect_ok(coordinator.dequeue_task(actor).await, "dequeue")? {
        let card = task
            .metadata
            .get("card")
            .and_then(MetaValue::as_f64)
            .context("task has no card number")? as u32;
        let path = format!("cards/card-{card}.json");

        while expect_ok(
            coordinator.acquire_lock(&path, actor, Some(LOCK_TTL)).await,
            "acquire",
        )? != Some(true)
        {
            debug!(actor = %actor, path = %path, "Lock busy, backing off");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let name = MAJOR_ARCANA.get(card as usize).copied().unwrap_or("Unknown");
        let body = serde_json::json!({
            "card": card,
            "name": name,
            "style": "art nouveau",
            "generated_by": actor.as_str(),
        });
        let written = coordinator
            .write_file(actor, &path, &serde_json::to_string_pretty(&body)?)
            .await;
        let status = if written.success {
            regenerated += 1;
            TaskStatus::Completed
        } else {
            warn!(actor = %actor, path = %path, error = ?written.error, "Card write failed");
            TaskStatus::Failed
        };

        expect_ok(coordinator.release_lock(&path, actor).await, "release")?;
        expect_ok(
            coordinator.update_task_status(task.id, status).await,
            "update status",
        )?;
        info!(actor = %actor, card, status = %status, "Task finished");
    }

    Ok(regenerated)
}

// ============================================================================
// Conflict staging
// ============================================================================

/// Both agents rewrite the deck index from the same stale base.
async fn stage_conflict(coordinator: &Coordinator) -> Result<()> {
    let base = coordinator
        .read_file(DECK_PATH, Actor::User)
        .await
        .data
        .unwrap_or_default();

    expect_ok(
        coordinator
            .apply_edit(
                Actor::Claude,
                FileEdit::write(DECK_PATH, format!("{base}claude: gold borders\n"))
                    .based_on(base.clone())
                    .describe("restyle borders"),
            )
            .await,
        "claude edit",
    )?;
    expect_ok(
        coordinator
            .apply_edit(
                Actor::Copilot,
                FileEdit::write(DECK_PATH, format!("{base}copilot: reversed meanings\n"))
                    .based_on(base.clone())
                    .describe("add reversed meanings"),
            )
            .await,
        "copilot edit",
    )?;

    let conflicts = expect_ok(coordinator.detect_conflicts().await, "detect")?.unwrap_or_default();
    for conflict in conflicts {
        let merged = format!("{base}claude: gold borders\ncopilot: reversed meanings\n");
        let request = ResolutionRequest::new(ResolutionStrategy::Merge, Actor::User).final_content(merged);
        expect_ok(
            coordinator.resolve_conflict(conflict.id, request).await,
            "resolve",
        )?;
        println!("Resolved conflict on {} by merging", conflict.path);
    }
    Ok(())
}

// ============================================================================
// Report
// ============================================================================

async fn print_report(coordinator: &Coordinator) -> Result<()> {
    let tasks = expect_ok(coordinator.list_tasks().await, "list tasks")?.unwrap_or_default();
    let changes = expect_ok(coordinator.list_changes().await, "list changes")?.unwrap_or_default();
    let conflicts =
        expect_ok(coordinator.list_conflicts().await, "list conflicts")?.unwrap_or_default();

    println!("\n=== Session report ===");
    for status in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Pending] {
        let count = tasks.iter().filter(|t| t.status == status).count();
        println!("Tasks {status}: {count}");
    }
    for actor in Actor::ALL {
        let count = changes.iter().filter(|c| c.changed_by == actor).count();
        println!("Changes by {actor}: {count}");
    }
    let unfinished = tasks.iter().filter(|t| !t.status.is_terminal()).count();
    println!("Tasks unfinished: {unfinished}");
    let open = conflicts.iter().filter(|c| !c.resolved).count();
    println!("Conflicts: {} ({} unresolved)", conflicts.len(), open);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let coordinator = Coordinator::with_config(
        CoordinatorConfig::new()
            .default_lock_ttl(LOCK_TTL)
            .enforce_locks(true),
    );

    expect_ok(
        coordinator
            .set_context("deck", "major-arcana", Actor::User, true)
            .await,
        "set deck",
    )?;
    expect_ok(
        coordinator
            .set_context("style", "art nouveau", Actor::User, false)
            .await,
        "set style",
    )?;
    expect_ok(
        coordinator
            .create_file(Actor::User, DECK_PATH, "deck: major-arcana\n")
            .await,
        "create deck",
    )?;

    for card in 0..args.cards {
        let priority = if card % 7 == 0 {
            Priority::High
        } else {
            Priority::Medium
        };
        expect_ok(
            coordinator
                .enqueue_task(
                    NewTask::new(format!("regenerate card {card}"))
                        .priority(priority)
                        .meta("card", card),
                )
                .await,
            "enqueue",
        )?;
    }

    let claude = tokio::spawn(run_agent(coordinator.clone(), Actor::Claude));
    let copilot = tokio::spawn(run_agent(coordinator.clone(), Actor::Copilot));
    let by_claude = claude.await??;
    let by_copilot = copilot.await??;
    println!("Claude regenerated {by_claude} cards, Copilot regenerated {by_copilot}");

    if args.seed_conflict {
        stage_conflict(&coordinator).await?;
    }

    expect_ok(
        coordinator.clear_non_persistent_state().await,
        "clear session",
    )?;
    print_report(&coordinator).await?;

    if let Some(path) = args.snapshot {
        expect_ok(coordinator.save_snapshot(&path).await, "save snapshot")?;
        println!("Snapshot written to {}", path.display());
    }

    Ok(())
}
