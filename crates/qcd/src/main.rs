use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use qc_core::config::{load_quality_config, QualityConfig};
use qc_core::types::{
    ExecutionMode, LatencyProfile, RolloutId, RunConfig, RunId, SoulRollout, TestSuite,
};
use qc_core::validation::{Validate, ValidationLevel};
use qc_exec::{CaseExecutor, EchoAgent, JudgeScorer, UnavailableJudge};
use qcd::{
    EventBus, InMemorySuites, IssueGenerator, JsonlEventLog, LogTracker, QualityService,
    RunOrchestrator, SqliteStore,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const DEFAULT_CONFIG_PATH: &str = "config/quality.toml";
const DEFAULT_SQLITE_PATH: &str = ".qc/state.sqlite";
const DEFAULT_EVENT_LOG_ROOT: &str = ".qc/events";

#[derive(Debug, Parser)]
#[command(name = "qcd", about = "Agent quality runs and canary rollout governance")]
struct Cli {
    /// Engine configuration. Defaults apply when the file is absent.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long, default_value = DEFAULT_SQLITE_PATH)]
    db: PathBuf,
    #[arg(long, default_value = DEFAULT_EVENT_LOG_ROOT)]
    events: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute every enabled case in a suite definition.
    Run {
        /// Suite definition (TOML).
        #[arg(long)]
        suite: PathBuf,
        #[arg(long, default_value = "dry_run")]
        mode: String,
        /// Per-case deadline override in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Synthetic delays as `tool_min,tool_max,resp_min,resp_max[,jitter]`.
        #[arg(long)]
        latency_profile: Option<String>,
        /// Drop transcripts from stored results.
        #[arg(long)]
        discard_artifacts: bool,
    },
    /// Print a stored run and its per-case results.
    ShowRun { run_id: String },
    /// Check a suite definition without running it.
    ValidateSuite { suite: PathBuf },
    /// Canary rollout governance.
    Rollout {
        #[command(subcommand)]
        command: RolloutCommand,
    },
}

#[derive(Debug, Subcommand)]
enum RolloutCommand {
    /// Store or update a rollout and its metrics snapshot from TOML.
    Ingest { rollout: PathBuf },
    /// Run the decision policy against one rollout.
    Evaluate {
        id: String,
        /// Apply the resulting transition instead of reporting it.
        #[arg(long)]
        apply: bool,
    },
    Promote {
        id: String,
        #[arg(long)]
        reason: String,
    },
    Rollback {
        id: String,
        #[arg(long)]
        reason: String,
    },
    Cancel {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Run the decision policy against every active rollout.
    EvaluateAll {
        #[arg(long)]
        apply: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let paths = StatePaths {
        db: cli.db,
        events: cli.events,
    };

    match cli.command {
        Command::Run {
            suite,
            mode,
            timeout_ms,
            latency_profile,
            discard_artifacts,
        } => {
            let suite = load_suite(&suite)?;
            require_valid(&suite)?;
            let run_config = RunConfig {
                execution_mode: mode.parse::<ExecutionMode>().map_err(anyhow::Error::msg)?,
                case_timeout_ms: timeout_ms,
                latency_profile: latency_profile
                    .as_deref()
                    .map(parse_latency_profile)
                    .transpose()?,
                keep_conversation_artifacts: !discard_artifacts
                    && config.engine.keep_artifacts,
            };

            let suite_id = suite.id.clone();
            let service = build_service(&paths, &config, Some(suite))?;
            let run = service.start_run(&suite_id, run_config)?;
            print_run(&service, &run.id)?;
        }
        Command::ShowRun { run_id } => {
            let service = build_service(&paths, &config, None)?;
            print_run(&service, &RunId::new(run_id))?;
        }
        Command::ValidateSuite { suite } => {
            let suite = load_suite(&suite)?;
            let issues = suite.validate();
            if issues.is_empty() {
                println!("suite {} is valid ({} cases)", suite.id, suite.cases.len());
                return Ok(());
            }
            for issue in &issues {
                let level = match issue.level {
                    ValidationLevel::Error => "error",
                    ValidationLevel::Warning => "warning",
                };
                println!("{level}: [{}] {}", issue.code, issue.message);
            }
            if issues.iter().any(|i| i.level == ValidationLevel::Error) {
                std::process::exit(1);
            }
        }
        Command::Rollout { command } => {
            let service = build_service(&paths, &config, None)?;
            run_rollout_command(&service, command)?;
        }
    }
    Ok(())
}

fn run_rollout_command(service: &QualityService, command: RolloutCommand) -> Result<()> {
    match command {
        RolloutCommand::Ingest { rollout } => {
            let body = fs::read_to_string(&rollout)
                .with_context(|| format!("failed to read rollout file {}", rollout.display()))?;
            let rollout: SoulRollout = toml::from_str(&body)
                .with_context(|| "failed to parse rollout definition".to_string())?;
            service.upsert_rollout(&rollout)?;
            println!("stored rollout {} ({})", rollout.id, rollout.status.as_str());
        }
        RolloutCommand::Evaluate { id, apply } => {
            let decision = service.evaluate_rollout(&RolloutId::new(id), apply)?;
            println!("{}: {}", decision.action.as_str(), decision.reason);
        }
        RolloutCommand::Promote { id, reason } => {
            let rollout = service.promote_rollout(&RolloutId::new(id), &reason)?;
            print_rollout(&rollout);
        }
        RolloutCommand::Rollback { id, reason } => {
            let rollout = service.rollback_rollout(&RolloutId::new(id), &reason)?;
            print_rollout(&rollout);
        }
        RolloutCommand::Cancel { id, reason } => {
            let rollout = service.cancel_rollout(&RolloutId::new(id), &reason)?;
            print_rollout(&rollout);
        }
        RolloutCommand::EvaluateAll { apply } => {
            let sweep = service.evaluate_all_rollouts(apply)?;
            if sweep.is_empty() {
                println!("no active rollouts");
            }
            for evaluation in sweep {
                match evaluation.outcome {
                    Ok(decision) => println!(
                        "{}: {} ({})",
                        evaluation.rollout_id,
                        decision.action.as_str(),
                        decision.reason
                    ),
                    Err(err) => println!("{}: error: {err}", evaluation.rollout_id),
                }
            }
        }
    }
    Ok(())
}

struct StatePaths {
    db: PathBuf,
    events: PathBuf,
}

fn build_service(
    paths: &StatePaths,
    config: &QualityConfig,
    suite: Option<TestSuite>,
) -> Result<QualityService> {
    if let Some(parent) = paths.db.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create state directory {}", parent.display()))?;
    }
    let store = SqliteStore::open(&paths.db)
        .with_context(|| format!("failed to open state db {}", paths.db.display()))?;
    store.migrate().context("failed to run sqlite migrations")?;
    let store = Arc::new(Mutex::new(store));

    let suites = InMemorySuites::new();
    if let Some(suite) = suite {
        suites.insert(suite);
    }

    // Real agent and judge transports plug in behind these seams; the CLI
    // ships with an echo agent and an unconfigured judge.
    let executor = CaseExecutor::with_timeout(
        Arc::new(EchoAgent),
        config.engine.default_case_timeout_ms,
    );
    let judge = if config.judge.enabled {
        JudgeScorer::new(Arc::new(UnavailableJudge))
    } else {
        JudgeScorer::disabled(Arc::new(UnavailableJudge))
    };

    let bus = EventBus::new();
    let event_log = JsonlEventLog::new(&paths.events);

    let orchestrator = RunOrchestrator::new(
        executor,
        judge,
        Arc::new(suites),
        Arc::clone(&store),
        bus.clone(),
        event_log.clone(),
        IssueGenerator::new(Arc::new(LogTracker)),
        config.clone(),
    );
    Ok(QualityService::new(
        orchestrator,
        store,
        bus,
        event_log,
        config,
    ))
}

fn load_config(path: &Path) -> Result<QualityConfig> {
    if !path.exists() {
        return Ok(QualityConfig::default());
    }
    let config = load_quality_config(path)?;
    let errors: Vec<_> = config
        .validate()
        .into_iter()
        .filter(|issue| issue.level == ValidationLevel::Error)
        .collect();
    if let Some(first) = errors.first() {
        bail!("invalid config {}: {}", path.display(), first.message);
    }
    Ok(config)
}

fn load_suite(path: &Path) -> Result<TestSuite> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read suite file {}", path.display()))?;
    toml::from_str(&body)
        .with_context(|| format!("failed to parse suite definition {}", path.display()))
}

fn require_valid(suite: &TestSuite) -> Result<()> {
    let issues = suite.validate();
    for issue in issues
        .iter()
        .filter(|i| i.level == ValidationLevel::Warning)
    {
        eprintln!("[suite] warning [{}] {}", issue.code, issue.message);
    }
    if let Some(error) = issues.iter().find(|i| i.level == ValidationLevel::Error) {
        bail!(
            "suite {} failed validation: [{}] {}",
            suite.id,
            error.code,
            error.message
        );
    }
    Ok(())
}

fn parse_latency_profile(value: &str) -> Result<LatencyProfile> {
    let parts: Vec<u64> = value
        .split(',')
        .map(|part| part.trim().parse::<u64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid latency profile '{value}'"))?;
    match parts.as_slice() {
        [tool_min, tool_max, resp_min, resp_max] => Ok(LatencyProfile {
            tool_min_ms: *tool_min,
            tool_max_ms: *tool_max,
            response_min_ms: *resp_min,
            response_max_ms: *resp_max,
            jitter_ms: 0,
        }),
        [tool_min, tool_max, resp_min, resp_max, jitter] => Ok(LatencyProfile {
            tool_min_ms: *tool_min,
            tool_max_ms: *tool_max,
            response_min_ms: *resp_min,
            response_max_ms: *resp_max,
            jitter_ms: *jitter,
        }),
        _ => bail!(
            "invalid latency profile '{value}': expected tool_min,tool_max,resp_min,resp_max[,jitter]"
        ),
    }
}

fn print_rollout(rollout: &SoulRollout) {
    println!(
        "rollout {} [{}] soul {} at {:.1}% traffic",
        rollout.id,
        rollout.status.as_str(),
        rollout.soul_version,
        rollout.traffic_percent
    );
    if let Some(reason) = &rollout.decision_reason {
        println!("  reason: {reason}");
    }
    if let Some(ended_at) = rollout.ended_at {
        println!("  ended: {}", ended_at.to_rfc3339());
    }
}

fn print_run(service: &QualityService, run_id: &RunId) -> Result<()> {
    let (run, results) = service.run_with_results(run_id)?;
    println!("run {} [{}]", run.id, run.status.as_str());
    println!("  suite: {}  agent: {}", run.suite_id, run.agent_id);
    println!(
        "  cases: {} total, {} passed, {} failed, {} errored",
        run.total_cases, run.passed, run.failed, run.errored
    );
    println!(
        "  latency: {}ms total  cost: ${:.4}",
        run.total_latency_ms, run.total_cost_usd
    );
    if let Some(avg) = run.avg_quality {
        println!("  avg quality: {avg:.2}");
    }
    if let Some(reason) = &run.failure_reason {
        println!("  failure: {reason}");
    }
    for result in &results {
        let mut line = format!(
            "  {} {} ({}ms)",
            result.status.as_str(),
            result.case_name,
            result.latency_ms
        );
        if let Some(reason) = &result.error_reason {
            line.push_str(&format!(" [{reason}]"));
        }
        println!("{line}");
        for detail in &result.rule_check.details {
            println!("      {detail}");
        }
    }
    Ok(())
}
