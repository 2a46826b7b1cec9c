//! Quotegate terminal gate
//!
//! Checks, grants and clears the subscription that unlocks Quotegate on
//! this machine, and exposes the administrator console.
//!
//! Usage:
//!   quotegate --directory-url https://quotes.example.com/ activate --name Sara --code ABCD
//!   quotegate watch
//!   quotegate admin set-duration --value 30 --unit days

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use quotegate_license::{
    describe_remaining, AdminConsole, AdminStatus, Countdown, DeviceInfo, DirectoryConfig,
    DurationPolicy, DurationTerm, DurationUnit, FileStorage, Gate, HttpDirectory,
    LicenseValidator, LockReason, NewUser, SubscriptionRecord, TimeLeft,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "quotegate")]
#[command(about = "Quotegate subscription gate")]
struct Args {
    /// Base URL of the deployment hosting the subscription endpoint
    #[arg(long, env = "QUOTEGATE_DIRECTORY_URL", default_value = "http://localhost/")]
    directory_url: String,

    /// Path of the local state file
    #[arg(long, env = "QUOTEGATE_STATE")]
    state: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-check the stored subscription and report the result
    Status,
    /// Validate a name and code and unlock this device
    Activate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: String,
        /// Accept the code even when no directory user matches
        #[arg(long)]
        force: bool,
    },
    /// Clear the subscription on this device
    Logout,
    /// Unlock and count down until the subscription ends
    Watch,
    /// Print this device's id and host details
    Device,
    /// Administrator console
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    /// Show the local subscription and disabled codes
    Status,
    /// Re-enable a disabled code
    Enable { code: String },
    /// List directory users
    Users,
    /// Add a directory user
    AddUser {
        #[arg(long)]
        id: u32,
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a directory user
    RemoveUser { id: u32 },
    /// Set the global subscription duration
    SetDuration {
        #[arg(long, conflicts_with_all = ["value", "unit"])]
        no_expiry: bool,
        #[arg(long, requires = "unit")]
        value: Option<u32>,
        #[arg(long, requires = "value")]
        unit: Option<DurationUnit>,
    },
}

/// Gate that prints lock and unlock banners.
struct TerminalGate;

impl Gate for TerminalGate {
    fn unlock(&self, record: &SubscriptionRecord) {
        println!("\n========================================");
        println!("  Quotegate Unlocked");
        println!("========================================");
        println!("  User:    {}", record.user_name);
        println!("  Code:    {}", record.code);
        match record.expiry {
            Some(expiry) => println!("  Expires: {}", expiry.to_rfc3339()),
            None => println!("  Expires: never"),
        }
        println!("========================================\n");
    }

    fn lock(&self, reason: Option<LockReason>) {
        let message = match reason {
            None => "no subscription on this device",
            Some(LockReason::Disabled) => "this code has been disabled",
            Some(LockReason::Violation) => "this code is in use on another device and has been disabled",
            Some(LockReason::Expired) => "your subscription has expired",
            Some(LockReason::SettingsDrifted) => "subscription settings changed, please activate again",
            Some(LockReason::ManuallyCleared) => "subscription cleared",
        };
        println!("Quotegate locked: {message}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let state = args.state.clone().unwrap_or_else(FileStorage::default_path);
    let storage = FileStorage::open(&state)
        .with_context(|| format!("opening state file {}", state.display()))?;
    debug!(path = %state.display(), "using state file");

    let directory = HttpDirectory::new(DirectoryConfig::with_base_url(&args.directory_url))
        .context("building directory client")?;
    let validator = Arc::new(
        LicenseValidator::builder(Arc::new(storage), Arc::new(directory))
            .gate(Arc::new(TerminalGate))
            .build(),
    );

    match args.command {
        Command::Status => {
            validator.initialize().await?;
            match validator.record()? {
                Some(record) => {
                    println!("State:     {}", validator.state().await);
                    match record.expiry {
                        Some(expiry) => {
                            println!("Remaining: {}", describe_remaining(expiry, Utc::now()))
                        }
                        None => println!("Remaining: no expiry"),
                    }
                }
                None => println!("State:     {}", validator.state().await),
            }
        }
        Command::Activate { name, code, force } => {
            let grant = validator.validate(&name, &code, force).await?;
            if grant.user.is_none() {
                println!("Accepted without a matching directory user.");
            }
        }
        Command::Logout => validator.manual_clear().await?,
        Command::Watch => {
            if !validator.initialize().await?.is_active() {
                bail!("no active subscription");
            }
            if validator.record()?.and_then(|r| r.expiry).is_none() {
                println!("Subscription never expires. Press Ctrl-C to exit.");
                tokio::signal::ctrl_c().await?;
                return Ok(());
            }
            let interval = validator.config().tick_interval;
            let mut countdown = Countdown::start(Arc::clone(&validator), interval, |remaining| {
                if !remaining.exhausted {
                    println!("Time remaining: {remaining}");
                }
            })
            .await;
            tokio::select! {
                _ = countdown.finished() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Command::Device => {
            let info = DeviceInfo::collect();
            println!("Device ID: {}", validator.device_id());
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Admin(command) => run_admin(AdminConsole::new(validator), command).await?,
    }

    Ok(())
}

async fn run_admin(admin: AdminConsole, command: AdminCommand) -> Result<()> {
    match command {
        AdminCommand::Status => print_status(&admin.status(Utc::now())?),
        AdminCommand::Enable { code } => {
            if admin.re_enable(&code)? {
                println!("Code {} re-enabled.", code.trim().to_uppercase());
            } else {
                println!("Code {} was not disabled.", code.trim().to_uppercase());
            }
        }
        AdminCommand::Users => {
            let users = admin.users().await?;
            if users.is_empty() {
                println!("No users.");
            }
            for user in users {
                println!("{:>5}  {:<12}  {}", user.id, user.code, user.name);
            }
        }
        AdminCommand::AddUser { id, code, name } => {
            let user = admin.add_user(NewUser { id, code, name }).await?;
            println!("Added user {} ({}) with code {}.", user.id, user.name, user.code);
        }
        AdminCommand::RemoveUser { id } => {
            admin.remove_user(id).await?;
            println!("Removed user {id}.");
        }
        AdminCommand::SetDuration {
            no_expiry,
            value,
            unit,
        } => {
            let policy = match (no_expiry, value, unit) {
                (true, _, _) => DurationPolicy::NoExpiry,
                (false, Some(value), Some(unit)) => {
                    DurationPolicy::from_term(Some(DurationTerm::new(value, unit)))
                }
                _ => bail!("pass --no-expiry or both --value and --unit"),
            };
            admin.save_duration_policy(policy).await?;
            println!("Duration set to {policy}.");
        }
    }
    Ok(())
}

fn print_status(status: &AdminStatus) {
    println!("Device ID: {}", status.device_id);
    match &status.record {
        Some(record) => {
            println!("Active:    {} ({})", record.code, record.user_name);
            println!("Granted:   {}", record.granted_at.to_rfc3339());
            if status.code_disabled {
                println!("Warning:   this code is disabled");
            }
        }
        None => println!("Active:    none"),
    }
    match status.time_left {
        Some(TimeLeft::Remaining {
            days,
            hours,
            minutes,
        }) => println!("Remaining: {days}d {hours}h {minutes}m"),
        Some(TimeLeft::Expired) => println!("Remaining: expired"),
        Some(TimeLeft::NoExpiry) => println!("Remaining: no expiry"),
        None => {}
    }
    if status.disabled_codes.is_empty() {
        println!("Disabled:  none");
    } else {
        println!("Disabled:  {}", status.disabled_codes.join(", "));
    }
}
