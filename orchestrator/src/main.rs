//! The Last Algorithm orchestrator CLI.
//!
//! State lives under `.claude/` in the current directory. Every command prints
//! one directive to stdout; the exit code tells the driving session whether to
//! continue (0), fix its input (1), wait for user answers (2) or stop for user
//! review (3).

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::Value;

use orchestrator::core::algorithm::AlgorithmPhase;
use orchestrator::core::chain_state::ChainContext;
use orchestrator::core::complexity::RubricClassifier;
use orchestrator::core::dynamic::{DYNAMIC_PREFIX, create_dynamic_flow, preset};
use orchestrator::core::flow_defs::{FLOW_IDS, predefined};
use orchestrator::core::scaffold::ScaffoldMode;
use orchestrator::core::types::Complexity;
use orchestrator::exit_codes;
use orchestrator::flow::{ChainOrchestrator, NeverSkip, SkipAgents, SkipDecider, render_status};
use orchestrator::io::chain_store::{persisted_flows, resolve_flow, save_flow};
use orchestrator::io::config::{OrchestratorConfig, load_config};
use orchestrator::io::init::{InitOptions, OrchestratorPaths, init_orchestrator};
use orchestrator::io::session_store::random_hex;
use orchestrator::{
    decompose, flow, interview, logging, phase, questions, route, scaffold, tdd, verify,
};

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Deterministic orchestrator for The Last Algorithm"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.claude/` state directories and the default config.
    Init {
        /// Overwrite the existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Route a task by complexity. Without a category, print the assessment prompt.
    Route {
        /// trivial, simple, moderate, complex or very_complex.
        #[arg(long)]
        complexity: Option<String>,
        /// Free-text assessment to extract the category from.
        #[arg(long, conflicts_with = "complexity")]
        assessment: Option<String>,
        query: String,
    },
    /// Record the current phase's output and enter PHASE.
    Phase {
        phase: String,
        #[arg(long)]
        state: String,
        /// JSON output of the phase being left.
        #[arg(long)]
        output: Option<String>,
        /// Print static phase content instead of starting the agent flow.
        #[arg(long)]
        no_flow: bool,
    },
    /// LEARN -> COMPLETED; notifies a decomposed parent.
    Complete {
        #[arg(long)]
        state: String,
    },
    /// Agent chain commands.
    Flow {
        #[command(subcommand)]
        command: FlowCommand,
    },
    /// Decompose protocol for COMPLEX and VERY_COMPLEX tasks.
    Decompose {
        #[command(subcommand)]
        command: DecomposeCommand,
    },
    /// Perform-TDD skill: RED -> GREEN -> REFACTOR -> DOC.
    Tdd {
        #[command(subcommand)]
        command: TddCommand,
    },
    /// Scaffold-docs skill.
    Scaffold {
        #[command(subcommand)]
        command: ScaffoldCommand,
    },
    /// Score phase outputs at VERIFY and loop back, proceed or escalate.
    Verify {
        #[arg(long)]
        state: String,
    },
    /// Evaluate an ideal state document at INTERVIEW.
    Interview {
        #[arg(long)]
        state: String,
        #[arg(long)]
        ideal: PathBuf,
        #[arg(long)]
        no_flow: bool,
    },
    /// List open questions raised in a task's memory files.
    Questions {
        #[arg(long)]
        state: String,
    },
}

#[derive(Subcommand)]
enum FlowCommand {
    /// Start FLOW for a task (resumes an unfinished chain of the same flow).
    Start {
        #[arg(long)]
        flow: String,
        #[arg(long)]
        state: String,
        /// Conditional agents to skip.
        #[arg(long)]
        skip: Vec<String>,
        #[arg(long)]
        skill: Option<String>,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        domain: Option<String>,
    },
    /// Register a dynamic flow from agent names or a preset.
    Create {
        #[arg(long)]
        name: Option<String>,
        /// Comma-separated agent names, in order.
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,
        #[arg(long)]
        id: Option<String>,
        #[arg(long, conflicts_with = "agents")]
        preset: Option<String>,
    },
    /// Report COMPLETED for an agent and print the next directive.
    Continue {
        #[arg(long)]
        state: String,
        #[arg(long)]
        completed: String,
    },
    /// Redeliver the current step, lifting a clarification halt.
    Resume {
        #[arg(long)]
        state: String,
    },
    /// Show chain progress and liveness.
    Status {
        #[arg(long)]
        state: String,
    },
    /// List predefined and registered flows.
    List,
}

#[derive(Subcommand)]
enum DecomposeCommand {
    Start {
        #[arg(long)]
        state: String,
        #[arg(long)]
        no_flow: bool,
        #[arg(long)]
        skip_clarification: bool,
    },
    /// Review the subtasks and create sessions on GO.
    Complete {
        #[arg(long)]
        state: String,
        /// Subtask JSON; defaults to the synthesis agent's memory file.
        #[arg(long)]
        subtasks: Option<PathBuf>,
    },
    /// Subtask progress of a decomposed parent; reroutes whatever it waits on.
    Status {
        #[arg(long)]
        state: String,
    },
}

#[derive(Subcommand)]
enum TddCommand {
    Start {
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        test: Option<String>,
        /// Algorithm session this TDD session works for.
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        no_flow: bool,
    },
    Advance {
        #[arg(long)]
        state: String,
        #[arg(long)]
        output: Option<String>,
        /// DOC -> RED: start another cycle.
        #[arg(long = "loop")]
        restart_cycle: bool,
        #[arg(long)]
        no_flow: bool,
    },
}

#[derive(Subcommand)]
enum ScaffoldCommand {
    Start {
        /// scaffold or update.
        #[arg(long, default_value = "scaffold")]
        mode: String,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        no_flow: bool,
    },
    Advance {
        #[arg(long)]
        state: String,
        #[arg(long)]
        created: Vec<String>,
        #[arg(long)]
        updated: Vec<String>,
        #[arg(long)]
        no_flow: bool,
    },
}

fn main() {
    match run() {
        Ok(exit_codes::OK) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    logging::init();
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve current directory")?;
    let paths = OrchestratorPaths::new(root);
    if let Command::Init { force } = cli.command {
        init_orchestrator(&paths.root, &InitOptions { force })?;
        println!("Initialized {}", paths.claude_dir.display());
        return Ok(exit_codes::OK);
    }
    let config = load_config(&paths.config_path)?;
    dispatch(cli.command, &paths, &config)
}

fn dispatch(command: Command, paths: &OrchestratorPaths, config: &OrchestratorConfig) -> Result<i32> {
    match command {
        Command::Init { .. } => Ok(exit_codes::OK),
        Command::Route {
            complexity,
            assessment,
            query,
        } => {
            let outcome = match (complexity, assessment) {
                (Some(raw), _) => route::route(paths, config, &query, parse_complexity(&raw)?)?,
                (None, Some(text)) => route::route_from_assessment(paths, config, &query, &text)?,
                (None, None) => route::assess(&query, &RubricClassifier)?,
            };
            println!("{}", outcome.render());
            Ok(exit_codes::OK)
        }
        Command::Phase {
            phase: name,
            state,
            output,
            no_flow,
        } => {
            let target = AlgorithmPhase::parse(&name)
                .with_context(|| format!("unknown phase {name:?}"))?;
            if target == AlgorithmPhase::Completed {
                bail!("use `orchestrator complete --state {state}` to finish a session");
            }
            let output = output.as_deref().map(parse_output).transpose()?;
            let outcome = phase::enter_phase(paths, config, &state, target, output, !no_flow)?;
            println!("{}", outcome.render());
            Ok(outcome.exit_code)
        }
        Command::Complete { state } => {
            let outcome = phase::complete_session(paths, config, &state)?;
            println!("{}", outcome.render());
            Ok(outcome.exit_code())
        }
        Command::Flow { command } => cmd_flow(command, paths, config),
        Command::Decompose { command } => match command {
            DecomposeCommand::Start {
                state,
                no_flow,
                skip_clarification,
            } => {
                let text =
                    decompose::start_decompose(paths, config, &state, !no_flow, skip_clarification)?;
                println!("{text}");
                Ok(exit_codes::OK)
            }
            DecomposeCommand::Complete { state, subtasks } => {
                let outcome =
                    decompose::complete_decompose(paths, config, &state, subtasks.as_deref())?;
                println!("{}", outcome.render());
                Ok(outcome.exit_code())
            }
            DecomposeCommand::Status { state } => {
                println!("{}", decompose::decompose_status(paths, config, &state)?);
                Ok(exit_codes::OK)
            }
        },
        Command::Tdd { command } => {
            let outcome = match command {
                TddCommand::Start {
                    target,
                    test,
                    parent,
                    no_flow,
                } => tdd::start_tdd(paths, config, target, test, parent, !no_flow)?,
                TddCommand::Advance {
                    state,
                    output,
                    restart_cycle,
                    no_flow,
                } => {
                    let output = output.as_deref().map(parse_output).transpose()?;
                    tdd::advance_tdd(paths, config, &state, output, restart_cycle, !no_flow)?
                }
            };
            println!("{}", outcome.render());
            Ok(exit_codes::OK)
        }
        Command::Scaffold { command } => {
            let outcome = match command {
                ScaffoldCommand::Start {
                    mode,
                    language,
                    no_flow,
                } => {
                    let mode = ScaffoldMode::parse(&mode)
                        .with_context(|| format!("unknown scaffold mode {mode:?}; expected scaffold or update"))?;
                    scaffold::start_scaffold(paths, config, mode, language, !no_flow)?
                }
                ScaffoldCommand::Advance {
                    state,
                    created,
                    updated,
                    no_flow,
                } => scaffold::advance_scaffold(paths, &state, &created, &updated, !no_flow)?,
            };
            println!("{}", outcome.render());
            Ok(exit_codes::OK)
        }
        Command::Verify { state } => {
            let outcome = verify::run_verify(paths, &state)?;
            println!("{}", outcome.render());
            Ok(outcome.exit_code())
        }
        Command::Interview {
            state,
            ideal,
            no_flow,
        } => {
            let outcome = interview::run_interview(paths, config, &state, &ideal, !no_flow)?;
            println!("{}", outcome.render());
            Ok(exit_codes::OK)
        }
        Command::Questions { state } => {
            let aggregated = questions::collect_questions(paths, &state)?;
            println!("{}", questions::render_open_questions(&state, &aggregated));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_flow(command: FlowCommand, paths: &OrchestratorPaths, config: &OrchestratorConfig) -> Result<i32> {
    match command {
        FlowCommand::Start {
            flow: flow_id,
            state,
            skip,
            skill,
            phase,
            task,
            domain,
        } => {
            let agent_flow = resolve_flow(paths, &flow_id)?;
            let context = ChainContext {
                skill_name: skill,
                phase_id: phase,
                domain: domain.unwrap_or_else(|| config.default_domain.clone()),
                task_description: task.unwrap_or_else(|| agent_flow.name.clone()),
            };
            let skipper = SkipAgents::new(&skip);
            let decider: &dyn SkipDecider = if skip.is_empty() { &NeverSkip } else { &skipper };
            let next = flow::start_flow(paths, config, agent_flow, &state, context, decider)?;
            println!("{}", next.render());
            Ok(next.exit_code())
        }
        FlowCommand::Create {
            name,
            agents,
            id,
            preset: preset_name,
        } => {
            let flow_id = id.unwrap_or_else(|| format!("{DYNAMIC_PREFIX}{}", random_hex(8)));
            if predefined(&flow_id).is_some() {
                bail!("flow id {flow_id} is reserved for a predefined flow");
            }
            let created = match preset_name {
                Some(preset_name) => preset(&preset_name, &flow_id)?,
                None => {
                    if agents.is_empty() {
                        bail!("flow create needs --agents or --preset");
                    }
                    let names: Vec<&str> = agents.iter().map(String::as_str).collect();
                    let display = name.unwrap_or_else(|| format!("Dynamic: {}", names.join(" -> ")));
                    create_dynamic_flow(&display, &names, &flow_id)?
                }
            };
            save_flow(paths, &created)?;
            println!(
                "Created flow {flow_id}\n\n{}\n\nStart it with `orchestrator flow start --flow {flow_id} --state <task-id>`.",
                created.display_info()
            );
            Ok(exit_codes::OK)
        }
        FlowCommand::Continue { state, completed } => {
            let mut chain = ChainOrchestrator::load(paths, config, &state)?;
            let next = chain.get_next_directive(&completed)?;
            println!("{}", next.render());
            Ok(next.exit_code())
        }
        FlowCommand::Resume { state } => {
            let mut chain = ChainOrchestrator::load(paths, config, &state)?;
            let next = chain.resume()?;
            println!("{}", next.render());
            Ok(next.exit_code())
        }
        FlowCommand::Status { state } => {
            let chain = ChainOrchestrator::load(paths, config, &state)?;
            println!("{}", render_status(&chain, Utc::now()));
            Ok(exit_codes::OK)
        }
        FlowCommand::List => {
            let mut sections: Vec<String> = FLOW_IDS
                .iter()
                .filter_map(|id| predefined(id))
                .map(|f| f.display_info())
                .collect();
            sections.extend(persisted_flows(paths)?.iter().map(|f| f.display_info()));
            println!("## Flows\n\n{}", sections.join("\n\n"));
            Ok(exit_codes::OK)
        }
    }
}

fn parse_complexity(raw: &str) -> Result<Complexity> {
    let normalized = raw.trim().replace(['-', ' '], "_");
    Complexity::parse(&normalized).with_context(|| {
        format!("unknown complexity {raw:?}; expected trivial, simple, moderate, complex or very_complex")
    })
}

fn parse_output(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("parse --output as JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["orchestrator", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_route_with_complexity() {
        let cli = Cli::parse_from(["orchestrator", "route", "--complexity", "simple", "Add login"]);
        let Command::Route {
            complexity, query, ..
        } = cli.command
        else {
            panic!("expected route");
        };
        assert_eq!(complexity.as_deref(), Some("simple"));
        assert_eq!(query, "Add login");
    }

    #[test]
    fn parse_flow_create_splits_agents() {
        let cli = Cli::parse_from([
            "orchestrator",
            "flow",
            "create",
            "--agents",
            "research,synthesis",
        ]);
        let Command::Flow {
            command: FlowCommand::Create { agents, preset, .. },
        } = cli.command
        else {
            panic!("expected flow create");
        };
        assert_eq!(agents, vec!["research", "synthesis"]);
        assert!(preset.is_none());
    }

    #[test]
    fn parse_tdd_advance_loop_flag() {
        let cli = Cli::parse_from(["orchestrator", "tdd", "advance", "--state", "abc", "--loop"]);
        assert!(matches!(
            cli.command,
            Command::Tdd {
                command: TddCommand::Advance {
                    restart_cycle: true,
                    no_flow: false,
                    ..
                }
            }
        ));
    }

    #[test]
    fn complexity_accepts_common_spellings() {
        assert_eq!(parse_complexity("VERY-COMPLEX").expect("parse"), Complexity::VeryComplex);
        assert_eq!(parse_complexity("very complex").expect("parse"), Complexity::VeryComplex);
        assert!(parse_complexity("huge").is_err());
    }

    #[test]
    fn scaffold_advance_collects_repeated_flags() {
        let cli = Cli::parse_from([
            "orchestrator",
            "scaffold",
            "advance",
            "--state",
            "abc",
            "--updated",
            "README.md",
            "--updated",
            "docs/api.md",
        ]);
        let Command::Scaffold {
            command: ScaffoldCommand::Advance { updated, .. },
        } = cli.command
        else {
            panic!("expected scaffold advance");
        };
        assert_eq!(updated, vec!["README.md", "docs/api.md"]);
    }
}
