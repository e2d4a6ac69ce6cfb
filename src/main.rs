use anyhow::Result;
use clap::{CommandFactory, Parser};
use dbucks::app::{
    MeterOptions, print_devices, print_tiers, run_analyze_command, run_meter_command,
    run_tone_command,
};
use dbucks::cli::{Cli, Commands, ConfigAction};
use dbucks::config::Config;
use owo_colors::OwoColorize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose >= 1 {
        eprintln!("dbucks {}", dbucks::version_string());
    }

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            run_meter(config, cli.device, cli.quiet, cli.verbose, false, false).await?;
        }
        Some(Commands::Meter { json }) => {
            let config = load_config(cli.config.as_deref())?;
            run_meter(config, cli.device, cli.quiet, cli.verbose, json, false).await?;
        }
        Some(Commands::Earn) => {
            let config = load_config(cli.config.as_deref())?;
            run_meter(config, cli.device, cli.quiet, cli.verbose, false, true).await?;
        }
        Some(Commands::Tone {
            frequency,
            duration,
            amplitude,
            output,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            run_tone_command(
                &config,
                frequency,
                duration,
                amplitude,
                output,
                cli.quiet,
                cli.verbose,
            )
            .await?;
        }
        Some(Commands::Analyze { file, json }) => {
            let config = load_config(cli.config.as_deref())?;
            run_analyze_command(&config, &file, json)?;
        }
        Some(Commands::Tiers) => {
            let config = load_config(cli.config.as_deref())?;
            print_tiers(&config);
        }
        Some(Commands::Devices) => {
            if let Err(e) = print_devices() {
                eprintln!("{}", e.to_string().red());
                std::process::exit(1);
            }
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "dbucks", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/dbucks/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides apply on top of all three.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides()?)
}

async fn run_meter(
    config: Config,
    device: Option<String>,
    quiet: bool,
    verbosity: u8,
    json: bool,
    earn: bool,
) -> Result<()> {
    let options = MeterOptions {
        quiet,
        verbosity,
        json,
        earn,
    };
    let summary = run_meter_command(config, device, options).await?;
    if summary.is_error() {
        if quiet || json {
            eprintln!("{}", summary.status.red());
        }
        std::process::exit(1);
    }
    Ok(())
}

fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(std::path::PathBuf::from)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
