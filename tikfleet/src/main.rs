//! tikfleet command-line interface.
//!
//! # Usage
//!
//! Check every router discovered from `router*.rsc` files:
//! ```bash
//! TIKFLEET_SSH_PASSWORD=secret tikfleet updates
//! ```
//!
//! Enroll a factory-fresh device:
//! ```bash
//! tikfleet --host 192.168.88.1 enroll --identity router1 --pre-script base.rsc
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::debug;

use tikfleet::enroll::StepOutcome;
use tikfleet::error::ConfigError;
use tikfleet::host::{check_unique_short_names, discover_hosts, parse_hosts};
use tikfleet::{
    BatchReport, ConfigExporter, CredentialVault, EnrollOptions, EnrollmentOrchestrator,
    ExportOptions, HostAddress, KeyRotation, Result, Script, SshSessionFactory, TrustMode,
    UpdateOptions, UpdateOrchestrator,
};

/// Host-key pinning, update and enrollment automation for MikroTik routers
#[derive(Parser)]
#[command(name = "tikfleet", version, about)]
struct Cli {
    /// Comma-separated routers; defaults to <name>.home for each router*.rsc file
    #[arg(long, global = true)]
    host: Option<String>,

    /// SSH user
    #[arg(long, default_value = "admin", global = true)]
    ssh_user: String,

    /// SSH password
    #[arg(long, env = "TIKFLEET_SSH_PASSWORD", hide_env_values = true, global = true)]
    ssh_password: Option<String>,

    /// Passphrase of the SSH private key
    #[arg(long, env = "TIKFLEET_SSH_PASSPHRASE", hide_env_values = true, global = true)]
    ssh_passphrase: Option<String>,

    /// Debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Accept any host key without pinning it (insecure)
    #[arg(long, global = true)]
    insecure_skip_host_key_check: bool,

    /// Directory holding .hostkey files
    #[arg(long, default_value = ".", global = true)]
    hostkey_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check RouterOS and RouterBoard updates
    Updates {
        /// Install pending updates, rebooting the routers
        #[arg(long)]
        apply: bool,
    },

    /// Export router configuration to <name>.rsc
    Export {
        /// Include sensitive values in the export
        #[arg(long)]
        show_sensitive: bool,

        /// Directory where to save the exported configuration
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Enroll a bare router with initial configuration
    Enroll {
        /// Router identity to set (e.g. router1)
        #[arg(long)]
        identity: String,

        /// RouterOS commands applied before the identity is set
        #[arg(long)]
        pre_script: Option<PathBuf>,

        /// RouterOS commands applied last
        #[arg(long)]
        post_script: Option<PathBuf>,

        /// Skip checking and applying updates
        #[arg(long)]
        skip_updates: bool,

        /// Skip exporting the configuration
        #[arg(long)]
        skip_export: bool,

        /// Directory where to save the exported configuration
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Manage pinned host keys
    Hostkey {
        #[command(subcommand)]
        action: HostkeyCommand,
    },
}

#[derive(Subcommand)]
enum HostkeyCommand {
    /// Print the pinned key
    Show,
    /// Remove the pinned key
    Delete,
    /// Copy the pinned key to <name>.hostkey.backup
    Backup,
    /// Re-pin the key presented by the router, restoring the backup on failure
    Rotate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let hosts = resolve_hosts(cli.host.as_deref(), Path::new("."))?;
    debug!("hosts: {:?}", hosts);

    let trust = if cli.insecure_skip_host_key_check {
        TrustMode::insecure()
    } else {
        TrustMode::strict()
    };
    let credentials = CredentialVault::new(
        cli.ssh_user,
        cli.ssh_password.unwrap_or_default(),
        cli.ssh_passphrase.unwrap_or_default(),
    );
    let factory = SshSessionFactory::builder(credentials)
        .hostkey_dir(cli.hostkey_dir)
        .trust_mode(trust)
        .build();

    match cli.command {
        Commands::Updates { apply } => {
            let orchestrator = UpdateOrchestrator::new(factory, UpdateOptions { apply });
            let batch = orchestrator.update_hosts(&hosts).await;
            for (host, result) in batch.entries() {
                match result {
                    Ok(report) => {
                        println!("{}", report);
                        for warning in &report.warnings {
                            println!("⚠️  {}: {}", host, warning);
                        }
                    }
                    Err(e) => println!("❓ {} is unreachable: {}", host, e),
                }
            }
            batch.require_all()?;
        }

        Commands::Export {
            show_sensitive,
            output_dir,
        } => {
            let exporter = ConfigExporter::new(
                factory,
                ExportOptions {
                    show_sensitive,
                    output_dir,
                },
            );
            let batch = exporter.export_hosts(&hosts).await;
            for (host, result) in batch.entries() {
                match result {
                    Ok(path) => println!("✅ {} configuration exported to {}", host, path.display()),
                    Err(e) => println!("⚠️  {} export failed: {}", host, e),
                }
            }
            batch.require_all()?;
        }

        Commands::Enroll {
            identity,
            pre_script,
            post_script,
            skip_updates,
            skip_export,
            output_dir,
        } => {
            let host = single_host(&hosts, "enroll")?;
            let options = EnrollOptions {
                identity,
                pre_script: pre_script.as_deref().map(Script::load).transpose()?,
                post_script: post_script.as_deref().map(Script::load).transpose()?,
                skip_updates,
                skip_export,
            };
            enroll(factory, host, &options, output_dir).await?;
        }

        Commands::Hostkey { action } => hostkey(factory, &hosts, action).await?,
    }

    Ok(())
}

fn resolve_hosts(host: Option<&str>, dir: &Path) -> Result<Vec<String>> {
    let hosts = match host {
        Some(list) => parse_hosts(list),
        None => discover_hosts(dir)?,
    };
    if hosts.is_empty() {
        return Err(ConfigError::NoHosts.into());
    }
    check_unique_short_names(&hosts)?;
    Ok(hosts)
}

fn single_host<'a>(hosts: &'a [String], command: &str) -> Result<&'a str> {
    match hosts {
        [host] => Ok(host),
        _ => Err(ConfigError::SingleHostRequired {
            command: command.to_string(),
            count: hosts.len(),
        }
        .into()),
    }
}

/// Trust mode for flows that pin new keys. The insecure flag still wins.
fn enrolling(factory: &SshSessionFactory) -> SshSessionFactory {
    if factory.trust_mode().skip_verification {
        factory.clone()
    } else {
        factory.with_trust_mode(TrustMode::enrollment())
    }
}

async fn enroll(
    factory: SshSessionFactory,
    host: &str,
    options: &EnrollOptions,
    output_dir: PathBuf,
) -> Result<()> {
    println!("🚀 Starting enrollment for router at {}", host);

    let orchestrator = EnrollmentOrchestrator::new(
        enrolling(&factory),
        UpdateOrchestrator::new(factory.clone(), UpdateOptions { apply: true }),
        ConfigExporter::new(
            factory,
            ExportOptions {
                show_sensitive: false,
                output_dir,
            },
        ),
    );
    let report = orchestrator.enroll(host, options).await?;

    println!("✅ Router identity set to: {}", report.identity);
    match &report.update {
        StepOutcome::Done(update) => println!("{}", update),
        StepOutcome::Skipped => println!("⏭️  Skipping updates"),
        StepOutcome::Failed(e) => println!("⚠️  Update check failed (non-fatal): {}", e),
    }
    match &report.export {
        StepOutcome::Done(path) => println!("✅ {} configuration exported to {}", host, path.display()),
        StepOutcome::Skipped => println!("⏭️  Skipping export"),
        StepOutcome::Failed(e) => println!("⚠️  Export failed (non-fatal): {}", e),
    }
    println!("\n🎉 Enrollment completed successfully for {}", host);
    Ok(())
}

async fn hostkey(factory: SshSessionFactory, hosts: &[String], action: HostkeyCommand) -> Result<()> {
    let store = factory.store().clone();

    match action {
        HostkeyCommand::Rotate => {
            if factory.trust_mode().skip_verification {
                return Err(ConfigError::InsecureRotation.into());
            }
            let rotation = KeyRotation::new(enrolling(&factory), store);
            let batch = rotation.rotate_hosts(hosts).await;
            print_rotation(&batch);
            batch.require_any()?;
        }
        HostkeyCommand::Show => {
            for host in hosts {
                let short_name = HostAddress::parse(host).short_name;
                let record = store.load_record(&short_name)?;
                println!("🔑 {} ({})", host, store.path(&short_name).display());
                println!("   algorithm:   {}", record.algorithm);
                println!("   fingerprint: {}", record.fingerprint);
                println!("   captured at: {}", record.captured_at.to_rfc3339());
            }
        }
        HostkeyCommand::Delete => {
            for host in hosts {
                store.delete(&HostAddress::parse(host).short_name)?;
                println!("✅ host key for {} deleted", host);
            }
        }
        HostkeyCommand::Backup => {
            for host in hosts {
                let backup = store.backup(&HostAddress::parse(host).short_name)?;
                println!("✅ host key for {} backed up to {}", host, backup.display());
            }
        }
    }
    Ok(())
}

fn print_rotation(batch: &BatchReport<tikfleet::HostKeyRecord>) {
    for (host, result) in batch.entries() {
        match result {
            Ok(record) => println!("✅ {} re-enrolled ({} {})", host, record.algorithm, record.fingerprint),
            Err(e) => println!("⚠️  {} rotation failed: {}", host, e),
        }
    }
    println!(
        "{} of {} host(s) rotated",
        batch.total() - batch.failed_count(),
        batch.total()
    );
}
