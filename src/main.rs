use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use tribunal_core::{OutputFormat, TribunalConfig};
use tribunal_ir::source::FsSource;
use tribunal_review::assessor::ResilientLlm;
use tribunal_review::orchestrator::Orchestrator;

const CONFIG_FILE: &str = ".tribunal.toml";
const API_KEY_ENV: &str = "TRIBUNAL_API_KEY";
/// Exit code when the safety gate withheld an automated verdict.
const EXIT_DEFERRED: i32 = 2;

#[derive(Parser)]
#[command(
    name = "tribunal",
    version,
    about = "Risk-aware multi-agent code review",
    long_about = "Tribunal reviews a code snapshot with bounded security, logic and quality\n\
                   specialists, then issues one calibrated verdict or defers to a human.\n\n\
                   Examples:\n  \
                     tribunal analyze                      Review the current directory\n  \
                     tribunal analyze --path repo --format json\n  \
                     tribunal analyze --offline            Pattern analysis only, no LLM\n  \
                     tribunal init                         Write a default .tribunal.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .tribunal.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a repository and print the final report
    #[command(long_about = "Analyze a repository and print the final report.\n\n\
        Exit status is 0 when an automated verdict was issued and 2 when the\n\
        analysis was deferred to human review.\n\n\
        Examples:\n  tribunal analyze --path .\n  tribunal analyze --format markdown --repo-id org/service")]
    Analyze {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Identifier recorded in the report (default: the path)
        #[arg(long)]
        repo_id: Option<String>,

        /// Output format: text, json or markdown
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Skip the LLM and use deterministic pattern analysis
        #[arg(long)]
        offline: bool,
    },
    /// Create a default .tribunal.toml in the current directory
    Init,
}

const DEFAULT_CONFIG: &str = r#"# Tribunal Configuration

[llm]
# OpenAI-compatible endpoint. Without api_key or base_url, specialists use
# deterministic pattern analysis. The key may also come from TRIBUNAL_API_KEY.
# provider = "openai"
# model = "gpt-4o-mini"
# base_url = "https://api.openai.com"
# timeout_secs = 30
# enabled = true

[routing]
# max_snippets_per_agent = 5
# max_snippet_chars = 500
# context_lookback_lines = 20
# security_file_keywords = ["password", "token", "auth", "sql", "exec", "eval", "crypto"]

[reliability]
# min_confidence = 0.70
# critical_confidence = 0.80
# history_capacity = 100

[reliability.weights]
# security_analysis = 1.0
# logic_analysis = 1.0
# code_quality = 1.0

[conflicts]
# risk_gap = 2
# contradiction_level = 0.8
# antonym_pairs = [["safe", "vulnerable"], ["correct", "incorrect"], ["valid", "invalid"]]

[quality]
# max_function_length = 50
# max_complexity = 10
# long_file_loc = 200
# high_nesting_depth = 4
# confidence = 0.9

[specialists]
# timeout_secs = 90
# empty_security_confidence = 0.5
# empty_logic_confidence = 0.6
# default_security_confidence = 0.7
# default_logic_confidence = 0.6

[source]
# max_file_bytes = 10485760
"#;

fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}

fn load_config(explicit: Option<&Path>) -> Result<TribunalConfig> {
    let mut config = match explicit {
        Some(path) => TribunalConfig::from_file(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                TribunalConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err("failed to load .tribunal.toml")?
            } else {
                TribunalConfig::default()
            }
        }
    };
    if config.llm.api_key.is_none() {
        config.llm.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
    }
    config.validate().into_diagnostic()?;
    Ok(config)
}

async fn run_analyze(
    config: TribunalConfig,
    path: PathBuf,
    repo_id: Option<String>,
    format: OutputFormat,
    offline: bool,
) -> Result<i32> {
    let source = FsSource::new(&path, config.source.max_file_bytes);
    let repo_id = repo_id.unwrap_or_else(|| path.display().to_string());

    let orchestrator = if offline {
        let llm = ResilientLlm::offline(&config.specialists);
        Orchestrator::with_llm(config, std::sync::Arc::new(llm)).into_diagnostic()?
    } else {
        Orchestrator::from_config(config).into_diagnostic()?
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling analysis");
            on_interrupt.cancel();
        }
    });

    let report = orchestrator
        .analyze_with_cancellation(&repo_id, &source, &cancel)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("analysis of {} did not complete", path.display()))?;

    match format {
        OutputFormat::Text => print!("{report}"),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
            println!("{json}");
        }
        OutputFormat::Markdown => print!("{}", report.to_markdown()),
    }

    Ok(if report.deferred { EXIT_DEFERRED } else { 0 })
}

fn run_init() -> Result<()> {
    let path = Path::new(CONFIG_FILE);
    if path.exists() {
        miette::bail!("{CONFIG_FILE} already exists");
    }
    std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
    println!("Created {CONFIG_FILE} with default configuration");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(
        cli.json_logs,
        if cli.verbose { Level::DEBUG } else { Level::WARN },
    );

    match cli.command {
        Command::Init => run_init()?,
        Command::Analyze {
            path,
            repo_id,
            format,
            offline,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let code = run_analyze(config, path, repo_id, format, offline).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
