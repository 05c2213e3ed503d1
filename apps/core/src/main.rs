// CodeFlow terminal front-end
// One-shot question or interactive multi-turn session over the core supervisor

use anyhow::{Context, Result};
use clap::Parser;
use codeflow_core::telemetry::{init_tracing, LogFormat};
use codeflow_core::{AppConfig, ModelEntry, SupervisorHandle, TurnOutcome};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "codeflow")]
#[command(about = "Code assistant: chat, generate, optimize and review code from the terminal")]
struct Args {
    /// Question to ask; omit for interactive mode
    question: Option<String>,

    /// Interactive multi-turn mode
    #[arg(short, long)]
    interactive: bool,

    /// Model display name or id
    #[arg(short, long)]
    model: Option<String>,

    /// Print the configured models and exit
    #[arg(long)]
    list_models: bool,

    /// Session identifier; a fresh one is generated when omitted
    #[arg(long)]
    session: Option<String>,
}

const RULE: &str = "============================================================";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_tracing("codeflow", "warn", LogFormat::from_env())?;

    let mut config = AppConfig::from_env().context("Invalid configuration")?;

    if args.list_models {
        println!("Available models:");
        print_models(&config.models(), None);
        return Ok(());
    }

    if let Some(name) = &args.model {
        config.default_model = config.resolve_model(name)?;
    }
    let model = config.default_model.clone();
    let session = args.session.unwrap_or_else(|| Uuid::new_v4().to_string());

    let supervisor = SupervisorHandle::new(config)
        .context("Set OPENAI_API_KEY in the environment or in a .env file")?;
    info!(model = %model, session = %session, "CodeFlow ready");
    println!("Using model: {}", model);

    match args.question {
        Some(question) if !args.interactive => {
            let outcome = supervisor.process_turn(session, question, None).await?;
            print_outcome(&outcome);
        }
        _ => interactive(&supervisor, &session, model).await?,
    }

    supervisor.shutdown().await?;
    Ok(())
}

async fn interactive(supervisor: &SupervisorHandle, session: &str, mut model: String) -> Result<()> {
    println!("{}", RULE);
    println!("CodeFlow - interactive mode");
    println!("Current model: {}", model);
    println!("'exit' or 'quit' to leave, 'clear' to forget the conversation");
    println!("'model <name>' to switch models, 'models' to list them");
    println!("{}", RULE);
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "exit" | "quit" | "退出" => break,
            "clear" | "清除" => {
                supervisor.clear_session(session.to_string()).await?;
                println!("Conversation cleared\n");
                continue;
            }
            "models" | "list-models" => {
                println!("\nAvailable models:");
                print_models(&supervisor.list_models(), Some(&model));
                println!();
                continue;
            }
            _ => {}
        }

        if let Some(name) = input.strip_prefix("model ") {
            match supervisor.switch_model(session.to_string(), name.trim().to_string()).await {
                Ok(switched) => {
                    model = switched;
                    println!("Switched to model: {} (conversation cleared)\n", model);
                }
                Err(e) => println!("Error: {}\nUse 'models' to see the configured models\n", e),
            }
            continue;
        }

        match supervisor.process_turn(session.to_string(), input.to_string(), None).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => println!("\nError: {}", e),
        }
        println!("\n{}\n", "-".repeat(RULE.len()));
    }

    println!("Bye!");
    Ok(())
}

fn print_models(models: &[ModelEntry], current: Option<&str>) {
    println!("{}", RULE);
    for entry in models {
        let marker = if current == Some(entry.model_id.as_str()) { " <- current" } else { "" };
        println!("  {:30} -> {}{}", entry.display_name, entry.model_id, marker);
    }
    println!("{}", RULE);
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("\nAssistant [{}]: {}", outcome.action, outcome.response_text);
}
