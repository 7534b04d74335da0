use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use video_mindmap::cli::{Cli, Commands, OutputFormat};
use video_mindmap::config::Config;
use video_mindmap::extractors::AcquirerRegistry;
use video_mindmap::outline::OutlineBuilder;
use video_mindmap::pipeline::{
    Collaborators, JobId, JobRegistry, PipelineOrchestrator, PipelineResult, PipelineSettings,
};
use video_mindmap::utils;

/// Exit code for configuration and usage errors
const USAGE_EXIT_CODE: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version are reported through the same error path
            return if err.use_stderr() {
                ExitCode::from(USAGE_EXIT_CODE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(&cli);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            ExitCode::from(USAGE_EXIT_CODE)
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "video_mindmap=debug"
    } else if cli.quiet {
        "video_mindmap=warn"
    } else {
        "video_mindmap=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Convert {
            urls,
            output_dir,
            format,
            language,
            max_retries,
            stage_timeout,
            max_depth,
            save_transcript,
        } => {
            warn_missing_dependencies().await;

            let mut config = Config::load().await?;
            if let Some(dir) = output_dir {
                config.app.output_dir = dir;
            }
            if let Some(max_retries) = max_retries {
                config.pipeline.max_retries = max_retries;
            }
            if let Some(seconds) = stage_timeout {
                config.pipeline.stage_timeout_seconds = seconds;
            }
            if let Some(depth) = max_depth {
                config.outline.max_depth = depth;
            }
            if save_transcript {
                config.app.save_transcript = true;
            }
            config.validate().context("Invalid configuration")?;

            convert(config, urls, format, language, cli.quiet).await
        }
        Commands::Config { show, init } => {
            if init {
                let path = Config::config_path()?;
                if path.exists() {
                    anyhow::bail!("Configuration file already exists at {}", path.display());
                }
                let path = Config::default().save().await?;
                println!("Configuration written to {}", path.display());
            }
            if show || !init {
                Config::load().await?.display();
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Platforms => {
            println!("Supported platforms:");
            for (name, example) in AcquirerRegistry::new().list_platforms() {
                println!("  • {} (e.g. {})", name, example);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn warn_missing_dependencies() {
    let missing = utils::check_dependencies().await;
    if missing.is_empty() {
        return;
    }

    eprintln!("{}", style("⚠️  Dependency check warnings:").yellow());
    for dep in missing {
        eprintln!("   • {}", dep);
    }
    eprintln!("   (Continuing anyway - tools may be available)");
}

async fn convert(
    config: Config,
    urls: Vec<String>,
    format: OutputFormat,
    language: Option<String>,
    quiet: bool,
) -> Result<ExitCode> {
    let collaborators = Collaborators::from_config(&config, format).await?;
    let orchestrator = PipelineOrchestrator::new(
        collaborators,
        PipelineSettings::from_config(&config),
        OutlineBuilder::new(config.outline.clone()),
    );
    let registry = JobRegistry::new(
        orchestrator,
        config.app.max_concurrent_jobs,
        config.pipeline.job_retention(),
    );

    let mut ids = Vec::with_capacity(urls.len());
    for url in &urls {
        ids.push(registry.submit(url.clone(), language.clone()).await);
    }

    let interrupt = {
        let registry = registry.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", style("Interrupted, cancelling jobs...").yellow());
                registry.cancel_all().await;
            }
        })
    };

    let progress = if quiet {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    } else {
        MultiProgress::new()
    };
    let spinners = track_jobs(&registry, &ids, &progress).await?;

    let mut results = Vec::with_capacity(ids.len());
    for id in &ids {
        results.push(registry.wait(*id).await);
    }
    for spinner in spinners {
        let _ = spinner.await;
    }
    interrupt.abort();

    let mut exit_code = 0;
    for (url, result) in urls.iter().zip(results) {
        let code = result.as_ref().map_or(i32::from(USAGE_EXIT_CODE), PipelineResult::exit_code);
        match result {
            Some(PipelineResult::Succeeded(output)) => {
                println!("{} {}", style("✓").green().bold(), output.output_path.display());
                if let Some(path) = &output.transcript_path {
                    println!("  transcript: {}", path.display());
                }
            }
            Some(PipelineResult::Failed(failure)) => {
                eprintln!("{} {}: {}", style("✗").red().bold(), url, failure);
            }
            None => {
                eprintln!("{} {}: job status was lost", style("✗").red().bold(), url);
            }
        }

        if exit_code == 0 {
            exit_code = code;
        }
    }

    Ok(ExitCode::from(u8::try_from(exit_code).unwrap_or(USAGE_EXIT_CODE)))
}

/// One spinner per job, following the job's status channel until it finishes
async fn track_jobs(
    registry: &JobRegistry,
    ids: &[JobId],
    progress: &MultiProgress,
) -> Result<Vec<tokio::task::JoinHandle<()>>> {
    let spinner_style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .context("Invalid progress template")?;

    let mut handles = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(mut status) = registry.subscribe(*id).await else {
            continue;
        };

        let spinner = progress.add(ProgressBar::new_spinner());
        spinner.set_style(spinner_style.clone());
        spinner.enable_steady_tick(Duration::from_millis(120));

        handles.push(tokio::spawn(async move {
            loop {
                let (message, finished) = {
                    let current = status.borrow_and_update();
                    (format!("{} {}", current.url, current.state), current.is_finished())
                };

                if finished {
                    spinner.finish_with_message(message);
                    break;
                }
                spinner.set_message(message);

                if status.changed().await.is_err() {
                    spinner.abandon();
                    break;
                }
            }
        }));
    }

    Ok(handles)
}
