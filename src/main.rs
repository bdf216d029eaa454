use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelscribe::cli::{Cli, Commands, LogFormat};
use reelscribe::config::Config;
use reelscribe::pipeline::{OutputRecord, PipelineInput, ReelPipeline};
use reelscribe::{output, utils};

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "reelscribe=debug"
    } else if cli.quiet {
        "reelscribe=warn"
    } else {
        "reelscribe=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());
    let registry = tracing_subscriber::registry().with(filter);

    match cli.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn build_input(
    urls: Vec<String>,
    input: Option<&std::path::Path>,
    no_transcript: bool,
) -> Result<PipelineInput> {
    let mut job = match input {
        Some(path) => {
            let content = fs_err::read_to_string(path).context("Failed to read input file")?;
            let mut job = PipelineInput::from_json(&content)?;
            job.reel_urls.extend(urls);
            job
        }
        None => PipelineInput::new(urls, true),
    };

    if no_transcript {
        job.include_transcript = false;
    }
    job.validate()?;
    Ok(job)
}

fn print_summary(records: &[OutputRecord]) {
    let succeeded = records.iter().filter(|r| r.success).count();
    let transcribed = records
        .iter()
        .filter(|r| r.success && !r.transcript.is_empty())
        .count();

    eprintln!();
    for record in records {
        if record.success {
            eprintln!("{} {}", style("✓").green(), record.url);
        } else {
            eprintln!(
                "{} {} ({})",
                style("✗").red(),
                record.url,
                record.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    eprintln!(
        "{} of {} reels extracted, {} transcribed",
        style(succeeded).bold(),
        records.len(),
        style(transcribed).bold()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Commands::Config { init: true, .. } = cli.command {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => Config::config_path()?,
        };
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        Config::default().save(&path)?;
        println!("Configuration written to: {}", path.display());
    }

    let mut config = Config::load(cli.config.as_deref())?.with_credentials(cli.keys.credentials());
    if cli.keys.use_proxy {
        config.proxy.enabled = true;
    }
    if let Some(url) = &cli.keys.proxy_url {
        config.proxy.url = Some(url.clone());
    }

    match cli.command {
        Commands::Run {
            urls,
            input,
            output,
            format,
            no_transcript,
        } => {
            let job = build_input(urls, input.as_deref(), no_transcript)?;

            if job.include_transcript {
                // Non-fatal: a missing tool still fails each transcript individually
                let missing_deps = utils::check_dependencies(&config.media.ffmpeg_path).await;
                if !missing_deps.is_empty() {
                    eprintln!("{}", style("⚠️  Dependency check warnings:").yellow());
                    for dep in missing_deps {
                        eprintln!("   • {}", dep);
                    }
                }
            }

            let pipeline = ReelPipeline::from_config(&config, job.include_transcript, !cli.quiet)?;
            tracing::info!(
                urls = job.reel_urls.len(),
                transcript = job.include_transcript,
                strategies = ?pipeline.strategy_names(),
                "Starting batch"
            );

            let records = pipeline.run(&job).await?;

            match output {
                Some(path) => {
                    output::save_to_file(&records, &path, &format)?;
                    eprintln!("Results saved to: {}", path.display());
                }
                None => output::print_to_console(&records, &format)?,
            }

            if !cli.quiet {
                print_summary(&records);
            }
        }
        Commands::Config { show, init } => {
            if show || !init {
                config.display();
            }
        }
        Commands::Strategies => {
            let extraction = &config.extraction;
            let remote_reason = if extraction.remote_api.enabled {
                "needs RAPIDAPI_KEY"
            } else {
                "disabled in config"
            };
            let rows = [
                (
                    "remote_api",
                    extraction.remote_api.enabled && config.credentials.has_rapidapi(),
                    remote_reason,
                ),
                ("browser", extraction.browser.enabled, "disabled in config"),
                ("embed", extraction.embed.enabled, "disabled in config"),
            ];

            println!("Extraction strategies (waterfall order):");
            for (i, (name, active, reason)) in rows.iter().enumerate() {
                if *active {
                    println!("  {}. {} {}", i + 1, name, style("enabled").green());
                } else {
                    println!("  {}. {} {} ({})", i + 1, name, style("skipped").yellow(), reason);
                }
            }
        }
    }

    Ok(())
}
