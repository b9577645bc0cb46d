use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jats_validator::watch::FileWatcher;
use jats_validator::{
    Cli, Config, ConfigManager, ErrorReporter, HttpValidationClient, Output, OutputFormat, Phase,
    TextBuffer, ValidationClient, ValidationError, VerbosityLevel, Workbench, WorkbenchConfig,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        return ExitCode::from(2);
    }

    let config = match ConfigManager::load_config(&cli).await {
        Ok(config) => config,
        Err(error) => {
            ErrorReporter::new(cli.verbosity()).report_config_error(&error);
            return ExitCode::from(2);
        }
    };

    let verbosity = verbosity(&cli, &config);
    init_tracing(verbosity);
    debug!(?config, "configuration loaded");

    match run(&cli, &config, verbosity).await {
        Ok(code) => code,
        Err(error) => {
            match error.downcast_ref::<ValidationError>() {
                Some(root) => {
                    if verbosity != VerbosityLevel::Quiet {
                        eprintln!("{}", error);
                    }
                    ErrorReporter::new(verbosity).report_validation_error(root);
                }
                None => eprintln!("Error: {:#}", error),
            }
            ExitCode::FAILURE
        }
    }
}

fn verbosity(cli: &Cli, config: &Config) -> VerbosityLevel {
    if config.output.quiet {
        VerbosityLevel::Quiet
    } else if cli.debug {
        VerbosityLevel::Debug
    } else if config.output.verbose {
        VerbosityLevel::Verbose
    } else {
        VerbosityLevel::Normal
    }
}

fn init_tracing(verbosity: VerbosityLevel) {
    let default_filter = match verbosity {
        VerbosityLevel::Quiet => "error",
        VerbosityLevel::Normal => "warn",
        VerbosityLevel::Verbose => "warn,jats_validator=info",
        VerbosityLevel::Debug => "warn,jats_validator=debug",
    };
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: &Cli, config: &Config, verbosity: VerbosityLevel) -> anyhow::Result<ExitCode> {
    let client = HttpValidationClient::new(ConfigManager::http_client_config(config))
        .context("Failed to create HTTP client")?;
    let client: Arc<dyn ValidationClient> = Arc::new(client);

    let mut orchestrator = ConfigManager::orchestrator_config(config);
    if !cli.watch {
        // Nothing else will edit the document in a one-shot run
        orchestrator.debounce = Duration::ZERO;
    }
    let mut workbench = Workbench::start(
        TextBuffer::new(),
        client,
        WorkbenchConfig {
            format_on_load: config.validation.format_on_load,
            orchestrator,
        },
    );
    let output = Output::new(verbosity, OutputFormat::from(config.output.format));

    let started = Instant::now();
    if let Some(path) = &cli.file {
        workbench
            .load_file(path)
            .await
            .with_context(|| format!("Failed to load {}", path.display()))?;
    } else if let Some(url) = &cli.url {
        workbench
            .load_url(url)
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
    } else {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("Failed to read standard input")?;
        workbench.load_text(&text);
    }

    let mut code = ExitCode::SUCCESS;
    if workbench.editor().text().is_empty() {
        if verbosity != VerbosityLevel::Quiet {
            eprintln!("Document is empty; nothing to validate");
        }
    } else {
        workbench
            .settled()
            .await
            .context("Validation stopped before completing")?;
        let view = workbench.sidebar();
        print!("{}", output.render(&view, Some(started.elapsed())));
        code = exit_code(view.has_failures());
    }

    if let Some(path) = cli.file.as_deref().filter(|_| cli.watch) {
        code = watch(&mut workbench, path, &output, verbosity).await?;
    }

    workbench.shutdown().await;
    Ok(code)
}

async fn watch(
    workbench: &mut Workbench<TextBuffer>,
    path: &Path,
    output: &Output,
    verbosity: VerbosityLevel,
) -> anyhow::Result<ExitCode> {
    let mut watcher =
        FileWatcher::new(path).with_context(|| format!("Failed to watch {}", path.display()))?;
    let mut snapshots = workbench.subscribe();
    let reporter = ErrorReporter::with_timestamps(verbosity, true);
    let mut code = exit_code(workbench.sidebar().has_failures());
    let mut cycle_started = Instant::now();

    info!(path = %path.display(), "watching for changes");
    loop {
        tokio::select! {
            changed = watcher.changed() => {
                if changed.is_none() {
                    break;
                }
                cycle_started = Instant::now();
                if let Err(error) = workbench.load_file(path).await {
                    reporter.report_validation_error(&error);
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let settled = snapshot.phase.is_terminal() || snapshot.phase == Phase::Idle;
                if settled && workbench.apply(&snapshot) {
                    let view = workbench.sidebar();
                    if output.format() == OutputFormat::Human {
                        println!();
                    }
                    print!("{}", output.render(&view, Some(cycle_started.elapsed())));
                    code = exit_code(view.has_failures());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
        }
    }

    Ok(code)
}

fn exit_code(failed: bool) -> ExitCode {
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
