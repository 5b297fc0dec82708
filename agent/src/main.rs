//! Autonomous step-loop task agent CLI.
//!
//! Keeps its state under `.agent/` in the chosen root: a TOML config, one
//! JSON document per task, and a per-task workspace subtree.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use agent::abilities::AbilityRegistry;
use agent::exit_codes;
use agent::io::chat::CommandChatCompletion;
use agent::io::config::load_config;
use agent::io::init::{AgentPaths, InitOptions, init_agent};
use agent::io::store::{FsTaskStore, Step, StepRequest, StepStatus};
use agent::io::verify::PytestVerifier;
use agent::io::workspace::Workspace;
use agent::looping::{TaskStop, run_task};
use agent::step::TaskAgent;

#[derive(Parser)]
#[command(name = "agent", version, about = "Autonomous step-loop task agent")]
struct Cli {
    /// Directory holding the `.agent/` state.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.agent/` scaffolding and a default config if missing.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Create a task without executing it.
    New {
        /// Natural-language task description.
        input: String,
    },
    /// Advance one task by exactly one step.
    Step {
        /// Task id, e.g. `task-0001`.
        task_id: String,
    },
    /// Create a task and drive it until it terminates or a step fails.
    Run {
        /// Natural-language task description.
        input: String,
    },
    /// List known tasks.
    Tasks,
}

type DefaultAgent = TaskAgent<FsTaskStore, CommandChatCompletion, PytestVerifier>;

fn main() {
    agent::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => {
            init_agent(&cli.root, &InitOptions { force })?;
            Ok(exit_codes::OK)
        }
        Command::New { input } => {
            let agent = build_agent(&cli.root)?;
            let task = agent.create_task(&input)?;
            println!("{}", task.task_id);
            Ok(exit_codes::OK)
        }
        Command::Step { task_id } => {
            let agent = build_agent(&cli.root)?;
            let step = agent.execute_step(&task_id, StepRequest::default())?;
            print_step(&step);
            Ok(match step.status {
                StepStatus::Failed => exit_codes::FAILED,
                _ => exit_codes::OK,
            })
        }
        Command::Run { input } => {
            let agent = build_agent(&cli.root)?;
            let task = agent.create_task(&input)?;
            let outcome = run_task(&agent, &task.task_id, print_step)?;
            println!(
                "{}: {} step(s), {}",
                outcome.task_id,
                outcome.steps_executed,
                describe_stop(&outcome.stop)
            );
            Ok(match outcome.stop {
                TaskStop::Completed => exit_codes::OK,
                TaskStop::Failed { .. } => exit_codes::FAILED,
                TaskStop::GaveUp => exit_codes::GAVE_UP,
            })
        }
        Command::Tasks => {
            let paths = AgentPaths::new(&cli.root);
            let store = FsTaskStore::new(&paths.tasks_dir);
            for task in store.list_tasks()? {
                println!("{}\t{}", task.task_id, task.input);
            }
            Ok(exit_codes::OK)
        }
    }
}

fn build_agent(root: &Path) -> Result<DefaultAgent> {
    let paths = AgentPaths::new(root);
    let config = load_config(&paths.config_path)?;
    Ok(TaskAgent::new(
        FsTaskStore::new(&paths.tasks_dir),
        Workspace::new(&paths.workspace_dir),
        AbilityRegistry::builtin(),
        CommandChatCompletion::from_config(&config.chat),
        PytestVerifier::from_config(&config.verify),
        config,
    ))
}

fn describe_stop(stop: &TaskStop) -> String {
    match stop {
        TaskStop::Completed => "completed".to_string(),
        TaskStop::GaveUp => "gave up".to_string(),
        TaskStop::Failed { step_id } => format!("failed at {step_id}"),
    }
}

fn print_step(step: &Step) {
    let status = match step.status {
        StepStatus::Pending => "pending",
        StepStatus::Completed => "completed",
        StepStatus::Failed => "failed",
    };
    println!("[{}] {} ({status})", step.step_id, step.name);
    if let Some(output) = step.output.as_deref().filter(|output| !output.is_empty()) {
        println!("{output}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["agent", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_with_root() {
        let cli = Cli::parse_from(["agent", "--root", "/tmp/x", "run", "write hello.py"]);
        assert_eq!(cli.root, PathBuf::from("/tmp/x"));
        assert!(matches!(cli.command, Command::Run { input } if input == "write hello.py"));
    }
}
