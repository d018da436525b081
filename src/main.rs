mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

use hf_convert::{Converter, ImageConverter};
use hf_core::config::Config;
use hf_core::SourceFormat;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    // CLI flags win over the config file.
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting heicforge");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    hf_server::start(config).await?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "heicforge=trace,hf_server=debug,hf_convert=debug,hf_core=debug,tower_http=debug"
                .to_string()
        } else {
            "heicforge=info,hf_server=info,hf_convert=info,tower_http=info".to_string()
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
        Commands::Convert {
            input,
            format,
            quality,
            output,
        } => convert_file(&input, format, quality, output, cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("heicforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn convert_file(
    input: &Path,
    format: Option<String>,
    quality: Option<u8>,
    output: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load_or_default(config_path);

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let format = format.unwrap_or_else(|| config.batch.default_format.clone());
    let target = hf_convert::parse_target(&format)?;
    if quality.is_some() && !target.uses_quality() {
        eprintln!("Note: --quality has no effect on {target} output");
    }
    let quality = quality.unwrap_or(config.batch.default_quality);

    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output = output.unwrap_or_else(|| {
        input.with_file_name(format!(
            "{}.{}",
            hf_core::format::file_stem(&name),
            target.extension()
        ))
    });

    let data = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    tracing::info!("Converting {:?} to {}", input, target);

    let converted = ImageConverter::new().convert(
        &data,
        SourceFormat::from_filename(&name),
        target,
        quality,
    )?;

    std::fs::write(&output, &converted)
        .with_context(|| format!("Failed to write {:?}", output))?;
    println!("Wrote {} ({} bytes)", output.display(), converted.len());
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = Config::load(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Temp dir: {}", config.storage.temp_dir.display());
    println!(
        "  Batch: max {} files, default {} @ quality {}",
        config.batch.max_files, config.batch.default_format, config.batch.default_quality
    );
    println!(
        "  Retention: {} (ttl {}s, sweep every {}s)",
        if config.retention.enabled { "enabled" } else { "disabled" },
        config.retention.job_ttl_secs,
        config.retention.sweep_interval_secs
    );

    for warning in config.validate() {
        println!("  ⚠ {warning}");
    }

    Ok(())
}
