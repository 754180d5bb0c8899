use calis_core::*;
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "calis")]
#[command(about = "Daily calisthenics tracker with automatic morning reset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's exercises and progress (default)
    List,

    /// Mark an exercise done and raise its target
    Complete {
        /// Position in the list (1-based)
        position: usize,
    },

    /// Undo a completion without touching progression
    Uncomplete {
        /// Position in the list (1-based)
        position: usize,
    },

    /// Complete or uncomplete depending on the current state
    Toggle {
        /// Position in the list (1-based)
        position: usize,
    },

    /// Clear today's progress on every exercise
    ResetToday,

    /// Restore the default exercises, discarding all progression
    ResetProgression,

    /// Show when the next daily reset is due
    NextReset,

    /// Deliver a due deferred wake-up (run from cron or a systemd timer)
    Wake,

    /// Clear every completion in the saved data, ignoring the reset rules
    ForceReset,

    /// Drop the pending wake-up (e.g. before removing the systemd timer)
    ///
    /// Any later command that opens the exercises registers it again.
    Unschedule,

    /// Run the recurring reset check in the foreground
    Watch {
        /// Stop after this many seconds instead of running until killed
        #[arg(long)]
        duration: Option<u64>,
    },
}

/// Prints the reset notification to the terminal
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, body: &str) {
        println!("🔔 {}", title);
        println!("   {}", body);
    }
}

/// Services constructed once per process and shared by the commands
struct Host {
    config: Config,
    gateway: Arc<JsonFileGateway>,
    registry: Arc<FileWakeRegistry>,
    scheduler: ResetScheduler,
}

impl Host {
    fn new(config: Config, data_dir: &Path) -> Result<Self> {
        let gateway = Arc::new(JsonFileGateway::in_dir(data_dir));
        let registry = Arc::new(FileWakeRegistry::in_dir(data_dir));
        let scheduler = ResetScheduler::new(
            gateway.clone(),
            registry.clone(),
            Arc::new(ConsoleNotifier),
            &config.reset,
        )?;

        Ok(Self {
            config,
            gateway,
            registry,
            scheduler,
        })
    }

    /// Open the store the way the app does on becoming active
    ///
    /// Stale completions are cleared and the next wake-up re-registered.
    fn open_store(&self) -> Result<ExerciseStore> {
        let now = Local::now();
        let mut store = ExerciseStore::open(self.gateway.clone(), self.config.reset.policy()?);
        store.reset_exercises_if_needed(&now);
        self.scheduler.schedule_deferred_reset(&now);

        for warning in store.warnings() {
            eprintln!("⚠ {}", warning);
        }
        Ok(store)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    calis_core::logging::init_with_level(if cli.verbose { "debug" } else { "warn" });

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());

    let host = Host::new(config, &data_dir)?;

    match cli.command.unwrap_or(Commands::List) {
        Commands::List => {
            let store = host.open_store()?;
            display_exercises(&store, &host);
        }
        Commands::Complete { position } => {
            cmd_at_position(&host, position, ExerciseStore::complete_exercise)?
        }
        Commands::Uncomplete { position } => {
            cmd_at_position(&host, position, ExerciseStore::uncomplete_exercise)?
        }
        Commands::Toggle { position } => {
            cmd_at_position(&host, position, ExerciseStore::toggle_exercise)?
        }
        Commands::ResetToday => {
            let mut store = host.open_store()?;
            store.reset_all_exercises();
            finish_mutation(&store);
            println!("✓ Today's progress cleared");
            display_exercises(&store, &host);
        }
        Commands::ResetProgression => {
            let mut store = host.open_store()?;
            store.reset_progression();
            finish_mutation(&store);
            println!("✓ Progression reset to defaults");
            display_exercises(&store, &host);
        }
        Commands::NextReset => {
            let next = host.scheduler.next_trigger_instant(&Local::now());
            println!("Next reset: {}", format_instant(&next));
        }
        Commands::Wake => cmd_wake(&host)?,
        Commands::ForceReset => {
            let cleared = host.scheduler.manual_reset();
            println!("✓ Force reset cleared {} exercises", cleared);
        }
        Commands::Unschedule => {
            if host.registry.revoke(RESET_TASK_IDENTIFIER)? {
                println!("✓ Pending wake-up removed");
            } else {
                println!("No wake-up registered.");
            }
        }
        Commands::Watch { duration } => cmd_watch(&host, duration),
    }

    Ok(())
}

fn cmd_at_position(
    host: &Host,
    position: usize,
    action: fn(&mut ExerciseStore, usize),
) -> Result<()> {
    let mut store = host.open_store()?;

    match position.checked_sub(1).filter(|&index| index < store.len()) {
        Some(index) => {
            action(&mut store, index);
            finish_mutation(&store);
        }
        None => eprintln!("No exercise #{}; nothing changed.", position),
    }

    display_exercises(&store, host);
    Ok(())
}

fn cmd_wake(host: &Host) -> Result<()> {
    let now = Local::now();

    match host
        .registry
        .take_due(RESET_TASK_IDENTIFIER, now.with_timezone(&Utc))?
    {
        Some(registered) => {
            tracing::info!("Delivering wake-up registered for {}", registered);
            let cleared = host.scheduler.handle_wake_up(&now);
            println!("✓ Daily reset pass complete ({} exercises reset)", cleared);
        }
        None => match host.registry.pending(RESET_TASK_IDENTIFIER)? {
            Some(at) => {
                println!(
                    "No wake-up due. Next at {}",
                    format_instant(&at.with_timezone(&Local))
                );
            }
            None => {
                // Registration lost or never made: put it back
                if let Some(at) = host.scheduler.schedule_deferred_reset(&now) {
                    println!(
                        "No wake-up registered. Scheduled for {}",
                        format_instant(&at.with_timezone(&Local))
                    );
                }
            }
        },
    }

    Ok(())
}

fn cmd_watch(host: &Host, duration: Option<u64>) {
    println!(
        "Watching for the daily reset at {:02}:00 (checking every {}s)",
        host.config.reset.trigger_hour, host.config.reset.check_interval_secs
    );
    host.scheduler.start();

    match duration {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => loop {
            std::thread::park();
        },
    }

    host.scheduler.shutdown();
}

fn finish_mutation(store: &ExerciseStore) {
    if !store.persistence_healthy() {
        eprintln!("⚠ Changes could not be saved; they will be retried on the next change.");
    }
}

fn format_instant(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

fn display_exercises(store: &ExerciseStore, host: &Host) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  TODAY'S EXERCISES");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!(
        "  {:.0}% Complete    {}/{} Exercises",
        store.completion_percentage() * 100.0,
        store.completed_count(),
        store.len()
    );
    println!();

    for (i, exercise) in store.exercises().iter().enumerate() {
        let mark = if exercise.is_completed { "✓" } else { " " };
        let ceiling = if exercise.progresses() && exercise.current_target < exercise.max_target {
            format!("  (→ {})", exercise.max_target)
        } else {
            String::new()
        };
        println!(
            "  {}. [{}] {:<14} {:>5} {}{}",
            i + 1,
            mark,
            exercise.name,
            exercise.target_display(),
            exercise.units(),
            ceiling
        );
    }

    let next = host.scheduler.next_trigger_instant(&Local::now());
    println!();
    println!(
        "  Progress automatically resets at {:02}:00",
        host.config.reset.trigger_hour
    );
    println!("  Next reset: {}", format_instant(&next));
    println!();
}
