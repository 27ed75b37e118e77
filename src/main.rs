//! Taskmind - Entry Point
//!
//! Interactive terminal front end for the action pipeline. Free text is
//! handled by the assistant; proposed changes are listed and only run after
//! they are accepted and confirmed with `go`.

use clap::Parser;
use taskmind::command::{ActionStatus, ConversationTurn, Decision, DecisionOutcome};
use taskmind::core::config::{load_config, PipelineConfig};
use taskmind::core::error::Result;
use taskmind::core::types::{EntityType, UserId};
use taskmind::llm::{IntentExtractor, LlmClient, ModelExtractor, RuleExtractor};
use taskmind::store::{EntityFields, EntityStore, InMemoryStore};
use taskmind::{Assistant, Conversation};

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "taskmind", about = "Manage tasks and events in plain language")]
struct Args {
    /// Pipeline configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// User the session acts for
    #[arg(long, default_value = "local")]
    user: String,

    /// Use the keyword extractor even when a model is configured
    #[arg(long)]
    offline: bool,

    /// Start with a few example tasks and events
    #[arg(long)]
    demo: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskmind=info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };

    let rt = Runtime::new()?;
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::new(args.user.clone());

    if args.demo {
        rt.block_on(seed_demo_data(&store, &user))?;
    }

    let extractor: Arc<dyn IntentExtractor> = match (args.offline, LlmClient::from_env()) {
        (false, Ok(client)) => {
            tracing::info!(model = client.model(), "using language model extractor");
            Arc::new(ModelExtractor::new(Arc::new(client), config.clone()))
        }
        (false, Err(_)) => {
            tracing::warn!("LLM_API_KEY not set - falling back to keyword extraction");
            Arc::new(RuleExtractor::new())
        }
        (true, _) => Arc::new(RuleExtractor::new()),
    };

    let assistant = Assistant::new(store.clone(), extractor, config);
    let mut conversation = Conversation::new(user.clone());

    println!("\n=== TASKMIND ===");
    print_help();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "q" => break,
            "help" | "h" => {
                print_help();
                continue;
            }
            "list" | "l" => {
                let entities = rt.block_on(store.all(&user));
                if entities.is_empty() {
                    println!("Nothing stored yet.");
                }
                for entity in entities {
                    println!("  [{}] {}", entity.entity_type, entity.summary_line());
                }
                continue;
            }
            "accept all" | "reject all" => {
                let decision = if input.starts_with("accept") {
                    Decision::Accept
                } else {
                    Decision::Reject
                };
                let changed = conversation.decide_all(decision);
                println!("{} action(s) updated.", changed);
                if let Some(turn) = conversation.pending() {
                    print_actions(turn);
                }
                continue;
            }
            "go" | "confirm" => {
                let results = rt.block_on(assistant.confirm(&mut conversation));
                if results.is_empty() {
                    println!("Nothing accepted to run.");
                } else if let Some(message) = conversation.history().last() {
                    println!("{}", message.content);
                }
                continue;
            }
            _ => {}
        }

        if let Some((decision, n)) = parse_decision(input) {
            match conversation.decide_nth(n, decision) {
                DecisionOutcome::Applied(status) => println!("Action {} is now {}.", n, status),
                DecisionOutcome::Skipped(status) => println!("Action {} is already {}.", n, status),
                DecisionOutcome::NotFound => println!("There is no action {}.", n),
            }
            continue;
        }

        let turn = rt.block_on(assistant.handle_message(&mut conversation, input));
        println!();
        println!("{}", turn.render_summary());
        if turn.needs_confirmation {
            print_actions(turn);
            println!("(accept <n> / reject <n> / accept all / reject all, then go)");
        }
        println!();
    }

    println!("\nGoodbye!");
    Ok(())
}

/// `accept <n>` / `reject <n>`; anything else is a request for the assistant
fn parse_decision(input: &str) -> Option<(Decision, usize)> {
    let (decision, rest) = if let Some(rest) = input.strip_prefix("accept ") {
        (Decision::Accept, rest)
    } else if let Some(rest) = input.strip_prefix("reject ") {
        (Decision::Reject, rest)
    } else {
        return None;
    };
    rest.trim().parse().ok().map(|n| (decision, n))
}

fn print_help() {
    println!("Commands:");
    println!("  <any text>         - Ask for something (\"add a task to call mom tomorrow\")");
    println!("  accept <n>         - Accept proposed action n");
    println!("  reject <n>         - Reject proposed action n");
    println!("  accept all         - Accept every pending action");
    println!("  reject all         - Reject every pending action");
    println!("  go                 - Run the accepted actions");
    println!("  list / l           - Show everything stored");
    println!("  quit / q           - Exit");
    println!();
}

fn print_actions(turn: &ConversationTurn) {
    for (i, action) in turn.actions.iter().enumerate() {
        if action.is_read() {
            continue;
        }
        let marker = match action.status {
            ActionStatus::Pending => " ",
            ActionStatus::Accepted => "+",
            ActionStatus::Rejected => "-",
            ActionStatus::Executed => "✓",
            ActionStatus::Failed => "✗",
        };
        println!("  {:>2}. [{}] {} ({})", i + 1, marker, action.description, action.status);
    }
}

async fn seed_demo_data(store: &InMemoryStore, user: &UserId) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let tasks = [
        ("File quarterly taxes", Some("urgent")),
        ("Call the plumber", Some("urgent")),
        ("Renew passport", Some("urgent")),
        ("Water the plants", None),
    ];
    for (title, tag) in tasks {
        let fields = EntityFields {
            due_date: Some(today),
            tags: tag.map(|t| vec![t.to_string()]),
            ..EntityFields::titled(title)
        };
        store.create(user, EntityType::Task, &fields).await?;
    }

    let standup = EntityFields {
        start: today.and_hms_opt(9, 30, 0),
        end: today.and_hms_opt(9, 45, 0),
        location: Some("Room 2".into()),
        ..EntityFields::titled("Team standup")
    };
    store.create(user, EntityType::Event, &standup).await?;

    tracing::info!("seeded demo data");
    Ok(())
}
