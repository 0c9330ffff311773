//! certchecker - 檢查憑證距離到期的天數

use std::{path::PathBuf, process::ExitCode, thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::{
    consts::signal::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use certchecker::{
    cancel::CancellationToken,
    expiration::SystemClock,
    extractor::Extractor,
    monitor::{Monitor, MonitorConfig},
    notifier::{CommandNotifier, FanoutNotifier, LogNotifier, WebhookNotifier},
    runner::{check_once, FAILURE_EXIT_CODE},
    source::{CertificateSource, DEFAULT_PORT},
    status::{JsonFileSink, LineSink, StatusBoard},
};

/// Check how many days remain before an X.509 certificate expires
#[derive(Parser, Debug)]
#[command(name = "certchecker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run continuously, re-checking on a fixed interval
    #[arg(short = 'd', long = "daemon")]
    daemon: bool,

    /// Path to local certificate file to verify (PEM or DER)
    #[arg(
        short = 'f',
        long = "file",
        conflicts_with = "host",
        required_unless_present = "host"
    )]
    file: Option<PathBuf>,

    /// Host with certificate to verify
    #[arg(short = 't', long = "host")]
    host: Option<String>,

    /// Port on host with certificate
    #[arg(
        short = 'p',
        long = "port",
        default_value_t = DEFAULT_PORT,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    port: u16,

    /// Seconds between checks in daemon mode
    #[arg(
        long = "interval",
        env = "CERTCHECKER_INTERVAL",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,

    /// Connect and handshake timeout in seconds
    #[arg(
        long = "timeout",
        env = "CERTCHECKER_TIMEOUT",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Notify after this many consecutive failed checks (0 disables)
    #[arg(
        long = "alert-after-failures",
        env = "CERTCHECKER_ALERT_AFTER_FAILURES",
        default_value_t = 0
    )]
    alert_after_failures: u32,

    /// Command receiving each notification as its last argument, e.g. "notify-send"
    #[arg(long = "notify-command", env = "CERTCHECKER_NOTIFY_COMMAND")]
    notify_command: Option<String>,

    /// Webhook URL receiving each notification as JSON
    #[arg(long = "webhook", env = "CERTCHECKER_WEBHOOK")]
    webhook: Option<String>,

    /// JSON file rewritten with the latest results in daemon mode
    #[arg(long = "status-file", env = "CERTCHECKER_STATUS_FILE")]
    status_file: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    ExitCode::from(exit_code(run(&cli)))
}

/// 任何無法完成檢查的錯誤都對應到 [`FAILURE_EXIT_CODE`]，1 只代表憑證已過期。
fn exit_code(result: Result<u8>) -> u8 {
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            FAILURE_EXIT_CODE
        }
    }
}

fn run(cli: &Cli) -> Result<u8> {
    let source = CertificateSource::from_parts(cli.file.clone(), cli.host.clone(), Some(cli.port))
        .context("Invalid certificate source")?;
    let extractor = Extractor::with_timeout(Duration::from_secs(cli.timeout));

    if cli.daemon {
        run_daemon(cli, source, extractor)?;
        return Ok(0);
    }

    let report = check_once(&extractor, &source, &SystemClock).context("Certificate check failed")?;
    println!("{}", report.days_remaining);
    Ok(report.exit_code())
}

/// 日誌輸出到 stderr，stdout 保留給檢查結果。
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_daemon(cli: &Cli, source: CertificateSource, extractor: Extractor) -> Result<()> {
    let mut notifier = FanoutNotifier::new().with(LogNotifier);
    if let Some(command_line) = &cli.notify_command {
        let command = CommandNotifier::from_command_line(command_line)
            .context("Notify command is empty")?;
        notifier = notifier.with(command);
    }
    if let Some(url) = &cli.webhook {
        notifier = notifier.with(WebhookNotifier::new(url).context("Failed to build webhook client")?);
    }

    let config = MonitorConfig::new()
        .interval(Duration::from_secs(cli.interval))
        .failure_alert_threshold(cli.alert_after_failures);

    let mut builder = Monitor::builder(source, extractor)
        .config(config)
        .notifier(notifier)
        .sink(LineSink::stdout());
    if let Some(path) = &cli.status_file {
        builder = builder.sink(JsonFileSink::new(path, StatusBoard::new()));
    }
    let mut monitor = builder.build();

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone())?;

    monitor.run(&token);
    info!("Monitor stopped");
    Ok(())
}

/// SIGTERM 與 SIGINT 轉為取消監控，而不是直接結束行程。
fn spawn_signal_handler(token: CancellationToken) -> Result<()> {
    let mut signals =
        Signals::new([SIGTERM, SIGINT]).context("Failed to register signal handlers")?;

    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("Received signal {}, shutting down", signal);
            token.cancel();
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    const CERT_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/src/testdata/cert.pem");

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("certchecker").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_blank_host_exits_with_failure_code() {
        for host in ["", "   "] {
            let result = run(&cli(&["--host", host]));
            assert!(result.is_err(), "host {:?}", host);
            assert_eq!(exit_code(result), FAILURE_EXIT_CODE);
        }
    }

    #[test]
    fn test_missing_file_exits_with_failure_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.pem");
        let result = run(&cli(&["--file", path.to_str().unwrap()]));
        assert_eq!(exit_code(result), FAILURE_EXIT_CODE);
    }

    #[test]
    fn test_expired_file_exits_one() {
        assert_eq!(exit_code(run(&cli(&["--file", CERT_PATH]))), 1);
    }

    #[test]
    fn test_startup_error_is_not_expired() {
        assert_eq!(exit_code(Err(anyhow!("Failed to register signal handlers"))), FAILURE_EXIT_CODE);
        assert_eq!(exit_code(Ok(0)), 0);
    }

    #[test]
    fn test_file_and_host_conflict() {
        let parsed = Cli::try_parse_from(["certchecker", "--file", CERT_PATH, "--host", "example.com"]);
        assert!(parsed.is_err());
    }
}
