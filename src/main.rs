//! Codex CLI Provider - drive `codex exec` as a language model.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use codex_cli_provider::config::{ConfigLoader, ReasoningEffort, Settings};
use codex_cli_provider::display;
use codex_cli_provider::provider::{
    AbortSignal, CallOptions, CodexProvider, LanguageModel, ProviderError,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EffortArg {
    Minimal,
    Low,
    Medium,
    High,
}

impl From<EffortArg> for ReasoningEffort {
    fn from(arg: EffortArg) -> Self {
        match arg {
            EffortArg::Minimal => ReasoningEffort::Minimal,
            EffortArg::Low => ReasoningEffort::Low,
            EffortArg::Medium => ReasoningEffort::Medium,
            EffortArg::High => ReasoningEffort::High,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "codex-provider",
    about = "Run Codex CLI requests through the provider",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file with provider-default settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RequestArgs {
    /// The prompt to send.
    prompt: String,
    /// Model identifier.
    #[arg(short, long, default_value = "gpt-5")]
    model: String,
    /// Working directory for codex.
    #[arg(long)]
    cwd: Option<PathBuf>,
    /// JSON schema file for structured output.
    #[arg(long)]
    schema: Option<PathBuf>,
    /// Reasoning effort.
    #[arg(long, value_enum)]
    effort: Option<EffortArg>,
    /// Let codex run without approvals inside its sandbox.
    #[arg(long)]
    full_auto: bool,
    /// Print values without truncation.
    #[arg(long)]
    raw: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a request and print the aggregated result.
    Generate(RequestArgs),
    /// Run a request and print parts as they arrive.
    Stream(RequestArgs),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn build_options(args: &RequestArgs, verbose: bool) -> Result<CallOptions, ProviderError> {
    let settings = Settings {
        cwd: args.cwd.clone(),
        reasoning_effort: args.effort.map(Into::into),
        full_auto: args.full_auto.then_some(true),
        verbose: verbose.then_some(true),
        ..Settings::default()
    };
    let mut options = CallOptions::from_text(args.prompt.clone()).with_settings(settings);
    if let Some(path) = &args.schema {
        let raw = std::fs::read_to_string(path)?;
        options = options.with_json_schema(serde_json::from_str(&raw)?);
    }
    Ok(options)
}

/// Abort `signal` on Ctrl-C.
fn abort_on_ctrl_c(signal: AbortSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, aborting request");
            signal.abort("Interrupted by user");
        }
    });
}

async fn run(cli: Cli) -> Result<(), ProviderError> {
    let loader = cli
        .config
        .clone()
        .map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let provider = CodexProvider::from_loader(&loader)
        .map_err(|e| ProviderError::Configuration { message: e.to_string() })?;

    let (args, streaming) = match &cli.command {
        Commands::Generate(args) => (args, false),
        Commands::Stream(args) => (args, true),
    };

    let model = provider.language_model(args.model.clone(), Settings::default())?;
    let signal = AbortSignal::new();
    abort_on_ctrl_c(signal.clone());
    let options = build_options(args, cli.verbose > 0)?.with_abort(signal);

    tracing::info!(model = %args.model, streaming, "Starting codex request");
    if streaming {
        let mut stream = model.stream(options).await?;
        while let Some(part) = stream.next().await {
            display::print_stream_part(&part?, args.raw);
        }
    } else {
        let result = model.generate(options).await?;
        display::print_generate_result(&result, args.raw);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            display::print_error(&err);
            ExitCode::FAILURE
        }
    }
}
