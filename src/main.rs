use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use contract_vault::backup::BackupService;
use contract_vault::cli::{format_config, handle_backup_command, handle_init, resolve_secret};
use contract_vault::config::{Settings, VaultPaths};

#[derive(Parser)]
#[command(
    name = "cvault",
    version,
    about = "Backup lifecycle for the contract and license manager",
    long_about = "cvault snapshots the contract manager's state store and uploaded \
                  documents, verifies and restores those snapshots, packages them \
                  for export and enforces retention."
)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Prompt for the encryption passphrase instead of reading CVAULT_ENCRYPTION_KEY
    #[arg(long, global = true)]
    ask_key: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup lifecycle commands
    #[command(subcommand, alias = "b")]
    Backup(contract_vault::cli::BackupCommands),

    /// Write the settings file and generate encryption key parameters
    Init,

    /// Show current configuration and paths
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    contract_vault::logging::init(cli.verbose);

    let paths = VaultPaths::new()?;
    let mut settings = Settings::load_or_create(&paths)?;
    settings.apply_env_overrides(|k| std::env::var(k).ok())?;

    match cli.command {
        Some(Commands::Backup(cmd)) => {
            let secret = resolve_secret(cli.ask_key)?;
            let service = BackupService::open(&paths, &settings, secret.as_ref())
                .context("Failed to open backup storage")?;
            handle_backup_command(&service, cmd)?;
        }
        Some(Commands::Init) => {
            println!("Initializing contract-vault at: {}", paths.base_dir().display());
            // Persist the file as stored, without environment overrides
            let mut stored = Settings::load_or_create(&paths)?;
            let generated = handle_init(&paths, &mut stored)?;
            if generated {
                println!("Generated new encryption key parameters.");
            }
            println!("Initialization complete!");
            println!();
            println!("Set CVAULT_ENCRYPTION_KEY (or pass --ask-key) to use encrypted backups.");
        }
        Some(Commands::Config) => {
            print!("{}", format_config(&paths, &settings));
        }
        None => {
            println!("cvault - backup lifecycle for the contract manager");
            println!();
            println!("Run 'cvault --help' for usage information.");
        }
    }

    Ok(())
}
