use atomic_apply::config::{self, ApplyConfig, ClientConfig};
use atomic_apply::progress::ProgressReporter;
use atomic_apply::runner::{run_apply_with_client, ApplyOutcome};
use atomic_apply::source::read_sources;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};

use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "katomik",
    version,
    about = "All-or-nothing manifest application with automatic rollback"
)]
struct Cli {
    /// Increases log verbosity; pass multiple times for more detail
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Applies manifests as a single transaction, rolling everything back on failure
    Apply(ApplyArgs),
}

#[derive(Args)]
struct ApplyArgs {
    /// Manifest file, directory, url, or '-' for stdin. May be repeated
    #[arg(short = 'f', long = "filename", required = true)]
    filename: Vec<String>,

    /// Recurses into subdirectories of any directory inputs
    #[arg(short = 'R', long = "recursive")]
    recursive: bool,

    /// Namespace for namespaced manifests that do not declare one
    #[arg(short = 'n', long = "namespace")]
    namespace: Option<String>,

    /// How long to wait for resources to converge, e.g. 90s or 5m
    #[arg(long = "timeout", value_parser = parse_duration, default_value = "30s")]
    timeout: Duration,

    /// Interval between status polls while waiting
    #[arg(long = "poll-interval", value_parser = parse_duration, default_value = "2s")]
    poll_interval: Duration,

    /// Path to a kubeconfig file. Defaults to $KUBECONFIG or ~/.kube/config
    #[arg(long = "kubeconfig")]
    kubeconfig: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            1
        }
    };
    std::process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env = env_logger::Env::default().default_filter_or(default_level);
    env_logger::Builder::from_env(env).init();
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    match cli.command {
        Command::Apply(args) => runtime.block_on(apply_command(args)),
    }
}

async fn apply_command(args: ApplyArgs) -> anyhow::Result<i32> {
    let desired = read_sources(&args.filename, args.recursive).await?;
    let client_config = load_client_config(args.kubeconfig.as_deref())?;

    let mut config = ApplyConfig::default().with_timeout(args.timeout);
    config.poll_interval = args.poll_interval;
    config.default_namespace = args.namespace;

    let mut reporter = ProgressReporter::stdout();
    let outcome = run_apply_with_client(&config, client_config, desired, &mut reporter).await?;
    match outcome {
        ApplyOutcome::Success { .. } | ApplyOutcome::NothingToApply => Ok(0),
        ApplyOutcome::RolledBack { cause } => {
            eprintln!("apply abandoned: {}", cause);
            Ok(1)
        }
    }
}

/// An explicit `--kubeconfig` must load; otherwise the default kubeconfig is tried
/// first, falling back to the in-cluster service account.
fn load_client_config(kubeconfig: Option<&std::path::Path>) -> anyhow::Result<ClientConfig> {
    let user_agent = format!("katomik/{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = kubeconfig {
        return config::kubeconfig::load_kubeconfig(user_agent, path)
            .with_context(|| format!("failed to load kubeconfig from '{}'", path.display()));
    }
    match ClientConfig::from_kubeconfig(user_agent.clone()) {
        Ok(config) => Ok(config),
        Err(kubeconfig_err) => ClientConfig::from_service_account(user_agent).map_err(|_| {
            anyhow::Error::new(kubeconfig_err).context("failed to load cluster connection config")
        }),
    }
}

fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let split_at = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split_at);
    let quantity: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: '{}'", input))?;
    match unit {
        "ms" => Ok(Duration::from_millis(quantity)),
        "s" | "" => Ok(Duration::from_secs(quantity)),
        "m" => Ok(Duration::from_secs(quantity * 60)),
        "h" => Ok(Duration::from_secs(quantity * 60 * 60)),
        other => Err(format!("invalid duration unit: '{}'", other)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_durations_with_units() {
        assert_eq!(Ok(Duration::from_millis(250)), parse_duration("250ms"));
        assert_eq!(Ok(Duration::from_secs(90)), parse_duration("90s"));
        assert_eq!(Ok(Duration::from_secs(300)), parse_duration("5m"));
        assert_eq!(Ok(Duration::from_secs(7200)), parse_duration("2h"));
    }

    #[test]
    fn bare_numbers_are_seconds() {
        assert_eq!(Ok(Duration::from_secs(30)), parse_duration("30"));
    }

    #[test]
    fn rejects_unknown_units_and_garbage() {
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }
}
