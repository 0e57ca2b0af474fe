//! seqctl: provision and tear down the Sequencer's tagged cloud resources
//!
//! One subcommand per lifecycle operation: compute instances, key pairs, and
//! DNS A records, all scoped to the deployment ownership tag.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use seqctl::aws::{AwsContext, Ec2Client, Route53Client};
use seqctl::config::{self, Config, ConfigError, ConfigFile, Overrides};
use seqctl::dns;
use seqctl::instance::{self, Instance, InstanceKind};
use seqctl::key::{self, Key, KeyFileStore};
use seqctl::wait::Barrier;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "seqctl")]
#[command(about = "Tagged lifecycle manager for Sequencer cloud resources")]
#[command(version)]
struct Args {
    /// Config file path (default: the user config directory)
    #[arg(long, env = "SEQCTL_CONFIG_FILE", global = true)]
    config_file: Option<PathBuf>,

    /// AWS region
    #[arg(long, env = "SEQCTL_REGION", global = true)]
    region: Option<String>,

    /// AWS profile to use (overrides the default credential chain)
    #[arg(long, env = "SEQCTL_PROFILE", global = true)]
    profile: Option<String>,

    /// Folder holding private key files
    #[arg(long, env = "SEQCTL_KEY_FOLDER", global = true)]
    key_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage compute instances
    Instance(InstanceArgs),

    /// Manage key pairs and their private key files
    Key(KeyArgs),

    /// Manage DNS A records
    Dns(DnsArgs),
}

#[derive(clap::Args, Debug)]
struct InstanceArgs {
    /// Instance name
    #[arg(short = 'i', long, env = "SEQCTL_INSTANCE_NAME", global = true)]
    instance_name: Option<String>,

    /// Key pair the instance boots with
    #[arg(short = 'k', long, env = "SEQCTL_KEY_NAME", global = true)]
    key_name: Option<String>,

    /// Security group id for the instance
    #[arg(short = 's', long, env = "SEQCTL_SECURITY_GROUP", global = true)]
    security_group: Option<String>,

    #[command(subcommand)]
    action: InstanceAction,
}

#[derive(Subcommand, Debug)]
enum InstanceAction {
    /// Launch a new instance and wait for it to run
    Create {
        /// Hardware flavor: standard or nitro
        #[arg(long, default_value = "standard")]
        kind: String,

        /// Return as soon as the launch call is acknowledged
        #[arg(long)]
        no_wait: bool,
    },

    /// List owned instances
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Terminate an instance
    Terminate,
}

#[derive(clap::Args, Debug)]
struct KeyArgs {
    /// Key pair name
    #[arg(short = 'k', long, env = "SEQCTL_KEY_NAME", global = true)]
    key_name: Option<String>,

    #[command(subcommand)]
    action: KeyAction,
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Create a key pair and store its private key file
    Create,

    /// Delete a key pair and its private key file
    Delete,

    /// List owned key pairs
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },
}

#[derive(clap::Args, Debug)]
struct DnsArgs {
    /// Fully qualified record name, without a trailing stop
    #[arg(long, env = "SEQCTL_FQDN", global = true)]
    fqdn: Option<String>,

    #[command(subcommand)]
    action: DnsAction,
}

#[derive(Subcommand, Debug)]
enum DnsAction {
    /// Create an A record
    Create {
        /// Address the record points at
        #[arg(long)]
        ip: String,
    },

    /// Delete an A record
    Delete,

    /// List A records under the record's zone
    List {
        /// Fail if the zone has more records than this
        #[arg(long, default_value_t = dns::DEFAULT_MAX_ITEMS)]
        max_items: i32,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show the single A record for the name
    Describe,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let (path, explicit) = match &args.config_file {
        Some(path) => (path.clone(), true),
        None => (config::default_config_path()?, false),
    };
    let file = ConfigFile::load(&path, explicit)?;
    let config = Config::resolve(overrides(&args), file)?;

    if let Some(profile) = &config.profile {
        info!(profile = %profile, "Using AWS profile");
    }

    let aws = AwsContext::with_profile(&config.region, config.profile.as_deref()).await;

    match args.command {
        Command::Instance(cmd) => handle_instance(cmd.action, &config, &aws).await,
        Command::Key(cmd) => handle_key(cmd.action, &config, &aws).await,
        Command::Dns(cmd) => handle_dns(cmd.action, cmd.fqdn, &aws).await,
    }
}

/// Collect per-invocation overrides from the parsed arguments.
fn overrides(args: &Args) -> Overrides {
    let mut overrides = Overrides {
        region: args.region.clone(),
        profile: args.profile.clone(),
        key_folder: args.key_folder.clone(),
        ..Default::default()
    };

    match &args.command {
        Command::Instance(cmd) => {
            overrides.instance_name = cmd.instance_name.clone();
            overrides.key_name = cmd.key_name.clone();
            overrides.security_group = cmd.security_group.clone();
        }
        Command::Key(cmd) => {
            overrides.key_name = cmd.key_name.clone();
        }
        Command::Dns(_) => {}
    }

    overrides
}

async fn handle_instance(action: InstanceAction, config: &Config, aws: &AwsContext) -> Result<()> {
    let ec2 = Ec2Client::from_context(aws);

    match action {
        InstanceAction::Create { kind, no_wait } => {
            let kind: InstanceKind = kind.parse()?;
            let barrier = if no_wait {
                Barrier::Noop
            } else {
                Barrier::until_running()
            };

            let instance = instance::create_instance(
                &ec2,
                kind,
                config.instance_name()?,
                config.key_name()?,
                config.security_group()?,
                &barrier,
            )
            .await?;
            println!(
                "Created instance {} with id {}",
                instance.name.as_deref().unwrap_or("<unnamed>"),
                instance.id
            );
        }

        InstanceAction::List { format } => {
            let instances = instance::list_instances(&ec2).await?;
            print_instances(&instances, &format)?;
        }

        InstanceAction::Terminate => {
            let instance = instance::terminate_instance(&ec2, config.instance_name()?).await?;
            println!(
                "Terminated instance {} with id {}",
                instance.name.as_deref().unwrap_or("<unnamed>"),
                instance.id
            );
        }
    }

    Ok(())
}

async fn handle_key(action: KeyAction, config: &Config, aws: &AwsContext) -> Result<()> {
    let ec2 = Ec2Client::from_context(aws);
    let store = KeyFileStore::new(&config.key_folder);

    match action {
        KeyAction::Create => {
            std::fs::create_dir_all(&config.key_folder)?;
            let key = key::create_key_pair(&ec2, &store, config.key_name()?).await?;
            println!("Created key {}", key.name);
        }

        KeyAction::Delete => {
            let key = key::delete_key_pair(&ec2, &store, config.key_name()?).await?;
            println!("Deleted key {}", key.name);
        }

        KeyAction::List { format } => {
            let keys = key::list_key_pairs(&ec2).await?;
            print_keys(&keys, &format)?;
        }
    }

    Ok(())
}

async fn handle_dns(action: DnsAction, fqdn: Option<String>, aws: &AwsContext) -> Result<()> {
    let r53 = Route53Client::from_context(aws);
    let fqdn = fqdn.ok_or(ConfigError::Missing {
        setting: "record name",
        flag: "--fqdn",
    })?;

    match action {
        DnsAction::Create { ip } => {
            dns::create_a_record(&r53, &fqdn, &ip).await?;
            println!("Created A record {fqdn} -> {ip}");
        }

        DnsAction::Delete => {
            let record = dns::delete_a_record(&r53, &fqdn).await?;
            println!("Deleted A record {} -> {}", record.fqdn, record.ip);
        }

        DnsAction::List { max_items, format } => {
            let records = dns::list_a_records(&r53, &fqdn, max_items).await?;
            print_records(&records, &format)?;
        }

        DnsAction::Describe => {
            let record = dns::describe_a_record(&r53, &fqdn).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}

fn print_instances(instances: &[Instance], format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(instances)?);
        return Ok(());
    }

    if instances.is_empty() {
        println!("No instances found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<22} {:<14} {:<16}",
        "NAME", "ID", "STATE", "PUBLIC_IP"
    );
    println!("{}", "-".repeat(74));
    for inst in instances {
        println!(
            "{:<20} {:<22} {:<14} {:<16}",
            inst.name.as_deref().unwrap_or("-"),
            inst.id,
            inst.state,
            inst.public_ip_address.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}

fn print_keys(keys: &[Key], format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(keys)?);
        return Ok(());
    }

    if keys.is_empty() {
        println!("No keys found.");
        return Ok(());
    }

    println!("Found keys");
    for key in keys {
        println!("  {}", key.name);
    }

    Ok(())
}

fn print_records(records: &[dns::ResourceRecord], format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records found.");
        return Ok(());
    }

    println!("{:<40} {:<6} {:<16}", "NAME", "TYPE", "VALUE");
    println!("{}", "-".repeat(64));
    for record in records {
        println!(
            "{:<40} {:<6} {:<16}",
            record.fqdn, record.record_type, record.ip
        );
    }

    Ok(())
}
