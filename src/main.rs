mod cli;

use reelhunt::{
    bandwidth::MeasurementTrigger,
    config,
    playback::ApiClient,
    resolver::ContentRequest,
    server::{self, AppContext},
};
use reelhunt_common::MediaType;
use reelhunt_parser::{audio, quality, variants, ReleaseName};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, MediaTypeArg, TriggerArg};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    // Data directory defaults to the config file's directory
    if config.server.data_dir.is_none() {
        config.server.data_dir = config_path.and_then(|p| p.parent()).map(|p| p.to_path_buf());
    }
    if let Some(dir) = &config.server.data_dir {
        let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
        config.server.data_dir = Some(expanded.into());
    }

    config::validate_config(&config)?;

    tracing::info!("Starting reelhunt server");
    tracing::info!(
        libraries = config.local_index.libraries.len(),
        cloud = config.cloud.enabled,
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let ctx = AppContext::from_config(config)?;
    server::start_server(ctx, CancellationToken::new()).await
}

#[allow(clippy::too_many_arguments)]
async fn resolve_title(
    server: &str,
    content_id: String,
    title: String,
    year: Option<u16>,
    media_type: MediaTypeArg,
    season: Option<u32>,
    episode: Option<u32>,
    runtime_minutes: Option<u32>,
    timeout: u64,
) -> Result<()> {
    let request = ContentRequest {
        content_id,
        media_type: match media_type {
            MediaTypeArg::Movie => MediaType::Movie,
            MediaTypeArg::Episode => MediaType::Episode,
        },
        title,
        year,
        season,
        episode,
        runtime_minutes,
    };
    request.validate()?;

    let client = ApiClient::new(server, Duration::from_secs(30));
    let source = client
        .resolve_and_wait(&request, Duration::from_secs(2), Duration::from_secs(timeout))
        .await
        .with_context(|| format!("Failed to resolve '{}'", request.title))?;

    println!("Source:  {}", source.source_kind);
    println!("File:    {}", source.file_name);
    println!("Stream:  {}", source.stream_url);
    Ok(())
}

async fn measure(
    server: &str,
    duration: Option<u64>,
    trigger: TriggerArg,
    user: Option<String>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let trigger = match trigger {
        TriggerArg::Startup => MeasurementTrigger::Startup,
        TriggerArg::EpisodeEnd => MeasurementTrigger::EpisodeEnd,
        TriggerArg::BandwidthRetest => MeasurementTrigger::BandwidthRetest,
        TriggerArg::Manual => MeasurementTrigger::Manual,
    };
    let duration = measure_duration(duration, &config.playback);

    let mut client = ApiClient::new(server, Duration::from_secs(10));
    if let Some(user) = user {
        client = client.with_user(user);
    }

    println!("Measuring for {}s against {}...", duration, client.base_url());
    let (measurement, outcome) = client
        .measure_and_report(duration, trigger, config.bandwidth.min_reliable_bytes)
        .await
        .context("Bandwidth measurement failed")?;

    println!("Throughput: {:.2} Mbps", measurement.mbps);
    println!("Received:   {} bytes in {} ms", measurement.bytes, measurement.duration_ms());
    println!("Reliable:   {}", measurement.reliable);
    match outcome {
        Some(outcome) => {
            println!("Recorded:   {}", outcome.recorded);
            println!("Needs test: {}", outcome.needs_test);
            println!("Retest:     {}", outcome.suggest_retest);
        }
        None => println!("Report could not be delivered"),
    }
    Ok(())
}

/// `--duration` when given, else the configured test duration, in 1..=10.
fn measure_duration(flag: Option<u64>, playback: &config::PlaybackConfig) -> u64 {
    flag.unwrap_or(playback.test_duration_secs).clamp(1, 10)
}

fn print_variants(title: &str, year: Option<u16>) -> Result<()> {
    for (i, variant) in variants::title_variants(title, year).iter().enumerate() {
        println!("{:>2}. {}", i + 1, variant);
    }
    Ok(())
}

fn inspect(name: &str, size: Option<u64>, runtime: Option<u32>) -> Result<()> {
    let release = ReleaseName::parse(name);
    let tier = quality::classify_resolution(name);

    println!("Name:        {}", name);
    println!("Tier:        {}", tier);
    println!("Audio score: {}", audio::score(name));
    println!("Tokens:      {}", release.tokens().join(" "));
    if let Some((season, episodes)) = release.episode_marker() {
        let episodes: Vec<String> = episodes.iter().map(|e| format!("E{:02}", e)).collect();
        println!("Episode:     S{:02}{}", season, episodes.join(""));
    }
    if let Some(density) = quality::mb_per_minute(size, runtime) {
        println!(
            "Density:     {:.1} MB/min (minimum {:.1})",
            density,
            quality::min_mb_per_minute(tier)
        );
    }
    if let Some(bitrate) = quality::estimated_bitrate(size, runtime) {
        println!("Bitrate:     {:.2} Mbps", bitrate as f64 / 1_000_000.0);
    }
    println!(
        "Quality gate: {}",
        if quality::is_valid_source(size, tier, runtime) {
            "pass"
        } else {
            "FAIL"
        }
    );
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Public URL: {}", config.server.public_url);
            println!("  Libraries: {}", config.local_index.libraries.len());
            for library in &config.local_index.libraries {
                println!("    {} -> {}", library.name, library.path.display());
            }
            println!("  Cloud backend enabled: {}", config.cloud.enabled);
            println!("  Cache TTL: {}h", config.cache.ttl_hours);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelhunt=trace,reelhunt_db=debug,reelhunt_parser=debug,tower_http=debug".to_string()
        } else {
            "reelhunt=debug,reelhunt_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Resolve {
            server,
            content_id,
            title,
            year,
            media_type,
            season,
            episode,
            runtime,
            timeout,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(resolve_title(
                &server, content_id, title, year, media_type, season, episode, runtime, timeout,
            ))
        }
        Commands::Measure {
            server,
            duration,
            trigger,
            user,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(measure(&server, duration, trigger, user, cli.config.as_deref()))
        }
        Commands::Variants { title, year } => print_variants(&title, year),
        Commands::Inspect { name, size, runtime } => inspect(&name, size, runtime),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("reelhunt {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
