use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use form_workflow::demo::SalesOrderService;
use form_workflow::{
    init_telemetry, spawn_workflow, FormWorkflow, FormWorkflowConfig, WorkflowHandle,
    WorkflowSnapshot,
};

#[derive(Parser)]
#[command(name = "form-workflow")]
#[command(about = "Drive a sample order form through its edit/submit lifecycle")]
#[command(long_about = "Reads commands from stdin and feeds them to a form workflow backed by a \
                       sample sales-order service. Type 'help' once running for the command list.")]
struct Cli {
    /// Configuration file to use instead of form-workflow.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive form session (default)
    Run {
        /// Print every snapshot as JSON instead of a summary
        #[arg(long, help = "Render snapshots as JSON for machine consumption")]
        json: bool,
    },
    /// Write the effective configuration as TOML
    Config {
        /// Destination file
        #[arg(long)]
        write: PathBuf,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Set { key: String, value: String },
    Submit,
    Again,
    Show,
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let input = match command.to_ascii_lowercase().as_str() {
        "set" => match rest.trim().split_once(char::is_whitespace) {
            Some((key, value)) => Input::Set {
                key: key.to_string(),
                value: value.trim().to_string(),
            },
            None if !rest.trim().is_empty() => Input::Set {
                key: rest.trim().to_string(),
                value: String::new(),
            },
            None => Input::Unknown(line.to_string()),
        },
        "submit" => Input::Submit,
        "again" => Input::Again,
        "show" => Input::Show,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    };
    Some(input)
}

fn render(snapshot: &WorkflowSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    println!("state: {}", snapshot.state);
    let mut values: Vec<_> = snapshot.context.values.iter().collect();
    values.sort();
    for (key, value) in values {
        println!("  {key} = {value}");
    }
    if snapshot.state.is_editing() && !snapshot.context.errors.is_empty() {
        println!("errors: {}", snapshot.context.errors);
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  set <field> <value>   change a field (name, reams, company, ...)");
    println!("  submit                send the order");
    println!("  again                 start a new order after a successful one");
    println!("  show                  print the current state and values");
    println!("  quit                  leave");
}

async fn run_session(handle: WorkflowHandle, json: bool) -> Result<()> {
    print_help();
    render(&handle.snapshot(), json)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(input) = parse_input(&line) else {
            continue;
        };

        match input {
            Input::Set { key, value } => {
                if !handle.current_state().is_editing() {
                    println!("The form is not editable right now");
                    continue;
                }
                handle.change(key.clone(), value.clone()).await?;
                handle
                    .wait_until(|snapshot| snapshot.context.value(&key) == Some(value.as_str()))
                    .await?;
            }
            Input::Submit => {
                if !handle.current_state().is_editing() {
                    println!("Nothing to submit right now");
                    continue;
                }
                // Fast services can settle before we look, so follow every update
                let mut updates = handle.subscribe();
                let _ = updates.borrow_and_update();
                handle.submit().await?;
                let settled = loop {
                    updates.changed().await?;
                    let snapshot = updates.borrow_and_update().clone();
                    if !snapshot.state.matches("submitting") {
                        break snapshot;
                    }
                    println!("Submitting...");
                };
                render(&settled, json)?;
            }
            Input::Again => {
                if !handle.current_state().matches("success") {
                    println!("'again' is only available after a successful submission");
                    continue;
                }
                handle.again().await?;
                let fresh = handle.wait_for_state("editing.pristine").await?;
                render(&fresh, json)?;
            }
            Input::Show => render(&handle.snapshot(), json)?,
            Input::Help => print_help(),
            Input::Quit => break,
            Input::Unknown(text) => println!("Unknown command: {text} (try 'help')"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    FormWorkflowConfig::load_env_file()?;
    let config = match &cli.config {
        Some(path) => FormWorkflowConfig::load_from(path)?,
        None => form_workflow::config()?.clone(),
    };
    init_telemetry(&config.observability)?;

    match cli.command.unwrap_or(Commands::Run { json: false }) {
        Commands::Run { json } => {
            let workflow = FormWorkflow::with_context(config.workflow.initial_context())
                .with_history_limit(config.workflow.history_limit);
            let runtime = spawn_workflow(
                workflow,
                SalesOrderService::from_config(&config.demo),
                config.workflow.runtime_options(),
            );

            let session = run_session(runtime.handle(), json).await;
            let workflow = runtime.shutdown().await?;
            tracing::info!(
                transitions = workflow.history().count(),
                final_state = %workflow.current_state(),
                "Session finished"
            );
            session?;
        }
        Commands::Config { write } => {
            config.save_to_file(&write)?;
            println!("Configuration written to {}", write.display());
        }
    }

    Ok(())
}
