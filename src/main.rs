//! # BillMinder — daily reminders for recurring monthly bills
//!
//! Usage:
//!   billminder add --name Netflix --amount 15.99 --due-day 5
//!   billminder recipient me@example.com
//!   billminder due                    # What needs attention today
//!   billminder check                  # One dispatch pass right now
//!   billminder run                    # Daemon: daily check at 06:00 local

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use billminder_channels::notifier_from_config;
use billminder_core::{BillMinderConfig, Obligation};
use billminder_scheduler::{
    Clock, DispatchEngine, DispatchScheduler, JsonStateStore, SqliteStateStore, StateStore,
    SystemClock, due, watch_ledger,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "billminder",
    version,
    about = "🔔 BillMinder — daily reminders for recurring monthly bills"
)]
struct Cli {
    /// Config file (default: ~/.billminder/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Add a recurring bill
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        amount: f64,
        /// Day of month, 1-31
        #[arg(long)]
        due_day: u32,
    },
    /// Remove a bill
    Remove { id: String },
    /// List all bills
    List,
    /// Show bills that need attention today
    Due,
    /// Mark a bill as paid for this month
    Settle { id: String },
    /// Undo a settlement
    Unsettle { id: String },
    /// Set the reminder recipient address
    Recipient { address: String },
    /// Show recent dispatch attempts
    Log {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Run one dispatch pass now
    Check,
    /// Run the daily scheduler until Ctrl-C
    Run {
        /// How often to look for ledger changes
        #[arg(long, default_value = "60")]
        poll_secs: u64,
    },
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .as_deref()
        .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
        .unwrap_or_else(BillMinderConfig::default_path)
}

fn open_store(config: &BillMinderConfig) -> Result<Arc<dyn StateStore>> {
    let path = config.storage.resolved_path();
    let store: Arc<dyn StateStore> = match config.storage.backend.as_str() {
        "json" => Arc::new(JsonStateStore::new(&path)),
        _ => Arc::new(
            SqliteStateStore::open(&path)
                .with_context(|| format!("opening {}", path.display()))?,
        ),
    };
    tracing::debug!("🗄️ Ledger: {} ({})", path.display(), config.storage.backend);
    Ok(store)
}

fn build_engine(config: &BillMinderConfig, store: Arc<dyn StateStore>) -> Arc<DispatchEngine> {
    let notifier = notifier_from_config(&config.notify);
    Arc::new(
        DispatchEngine::new(store, notifier, Arc::new(SystemClock))
            .with_send_delay(Duration::from_millis(config.schedule.send_delay_ms)),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "billminder=debug,billminder_scheduler=debug,billminder_channels=debug"
    } else {
        "billminder=info,billminder_scheduler=info,billminder_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let path = config_path(&cli);

    if let Command::Init { force } = cli.command {
        if path.exists() && !force {
            println!("⚠️  {} already exists (use --force to overwrite)", path.display());
            return Ok(());
        }
        BillMinderConfig::default().save_to(&path)?;
        println!("✅ Wrote {}", path.display());
        return Ok(());
    }

    let config = if path.exists() {
        BillMinderConfig::load_from(&path)?
    } else {
        BillMinderConfig::default()
    };
    let store = open_store(&config)?;
    let now = SystemClock.now();

    match cli.command {
        Command::Init { .. } => {}
        Command::Add {
            name,
            amount,
            due_day,
        } => {
            let ob = Obligation::new(&name, amount, due_day)?;
            let mut state = store.load()?;
            println!("✅ Added {} ({:.2}, day {}) → {}", ob.name, ob.amount, ob.due_day, ob.id);
            state.obligations.push(ob);
            store.save(&state)?;
        }
        Command::Remove { id } => {
            let mut state = store.load()?;
            let removed = state.remove_obligation(&id)?;
            store.save(&state)?;
            println!("🗑️  Removed {}", removed.name);
        }
        Command::List => {
            let state = store.load()?;
            if state.obligations.is_empty() {
                println!("No bills yet. Add one with `billminder add`.");
            }
            for ob in &state.obligations {
                let mark = if ob.is_settled(now) { "✅" } else { "  " };
                println!(
                    "{mark} {:<24} {:>10.2}  day {:>2}  {}",
                    ob.name, ob.amount, ob.due_day, ob.id
                );
            }
        }
        Command::Due => {
            let state = store.load()?;
            let reminders = due::reminders(&state.obligations, now);
            if reminders.is_empty() {
                println!("🎉 Nothing due.");
            }
            for r in &reminders {
                println!(
                    "🔔 {:<24} {:>10.2}  {}",
                    r.obligation.name, r.obligation.amount, r.reason
                );
            }
        }
        Command::Settle { id } => {
            let mut state = store.load()?;
            let ob = state.obligation_mut(&id)?;
            ob.settle(now);
            println!("✅ {} marked paid for {}", ob.name, now.format("%B %Y"));
            store.save(&state)?;
        }
        Command::Unsettle { id } => {
            let mut state = store.load()?;
            let ob = state.obligation_mut(&id)?;
            ob.unsettle();
            println!("↩️  {} marked unpaid", ob.name);
            store.save(&state)?;
        }
        Command::Recipient { address } => {
            let mut state = store.load()?;
            let address = address.trim().to_string();
            state.recipient = (!address.is_empty()).then_some(address);
            store.save(&state)?;
            match &state.recipient {
                Some(addr) => println!("📮 Reminders go to {addr}"),
                None => println!("📮 Recipient cleared"),
            }
        }
        Command::Log { limit } => {
            let state = store.load()?;
            for entry in state.dispatch_log.iter().rev().take(limit) {
                println!(
                    "{}  {:<7}  {:<24} {:>10.2}",
                    entry.sent_at.format("%Y-%m-%d %H:%M"),
                    entry.status.as_str(),
                    entry.name,
                    entry.amount
                );
            }
        }
        Command::Check => {
            let engine = build_engine(&config, store);
            let report = engine.run_check().await?;
            println!(
                "📬 Status: {} ({} delivered, {} failed)",
                report.status, report.delivered, report.failed
            );
        }
        Command::Run { poll_secs } => {
            let engine = build_engine(&config, store.clone());
            let mut status = engine.subscribe();
            tokio::spawn(async move {
                while status.changed().await.is_ok() {
                    let current = *status.borrow_and_update();
                    tracing::info!("📊 Dispatch status: {current}");
                }
            });

            println!("🔔 BillMinder v{}", env!("CARGO_PKG_VERSION"));
            println!("   ⏰ Daily check:  {:02}:00 local", config.schedule.dispatch_hour);
            println!("   📡 Channel:      {}", config.notify.channel);
            println!("   🗄️  Ledger:       {}", config.storage.resolved_path().display());
            println!();

            let handle = DispatchScheduler::new(engine, config.schedule.dispatch_hour).spawn();
            tokio::select! {
                _ = watch_ledger(store, &handle, Duration::from_secs(poll_secs.max(1))) => {}
                res = tokio::signal::ctrl_c() => {
                    res.context("waiting for Ctrl-C")?;
                    tracing::info!("👋 Shutting down");
                }
            }
            handle.shutdown().await;
        }
    }

    Ok(())
}
