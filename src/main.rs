use chrono::{DateTime, Local};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use habit_sync::backend::Backend;
use habit_sync::cache::CacheSource;
use habit_sync::storage::KeyValueStore;
use habit_sync::sync::MutationError;
use habit_sync::{
  CacheKey, CachedBackend, Config, ConnectivityObserver, HttpBackend, Mutation, MutationInterceptor,
  MutationOutcome, Session, SqliteStorage, SyncContext, SyncCoordinator, SyncNotice,
};

#[derive(Parser, Debug)]
#[command(name = "habit-sync")]
#[command(about = "Log habits against the tracking service, with offline queueing")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/habit-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Act as this principal instead of the configured one
  #[arg(short, long)]
  principal: Option<String>,

  /// Treat the backend as unreachable
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Record water intake in millilitres
  Intake { amount: f64 },
  /// Record hours slept
  Sleep { hours: f64 },
  /// Record a run
  Run {
    /// Kilometres
    #[arg(long)]
    distance: f64,
    #[arg(long)]
    minutes: f64,
    /// Minutes per kilometre
    #[arg(long)]
    pace: f64,
    #[arg(long)]
    completed: bool,
  },
  /// Update hydration settings
  Settings {
    /// Daily goal in millilitres
    #[arg(long)]
    goal: f64,
    /// Cup size in millilitres
    #[arg(long)]
    cup: f64,
  },
  /// Show a read view (e.g. todays-intake, sleep-history, user-settings)
  Show { view: CacheKey },
  /// List actions waiting to be synced
  Queue,
  /// Replay queued actions now
  Sync,
  /// Stay running and sync whenever the backend becomes reachable
  Watch,
  /// Turn offline saving on or off
  Offline { mode: OfflineMode },
  /// Delete all cached data and queued actions for the principal
  Forget,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OfflineMode {
  On,
  Off,
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging()?;
  let config = Config::load(args.config.as_deref())?;

  let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&config.backend)?);

  let db_path = match &config.database {
    Some(path) => path.clone(),
    None => SqliteStorage::default_path()?,
  };
  let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStorage::open(&db_path)?);

  let online = !args.offline && needs_network(&args.command) && backend.ping().await.is_ok();
  let principal = args.principal.or(config.principal.clone());

  let ctx = SyncContext::new(
    backend,
    store,
    ConnectivityObserver::new(online),
    Session::new(principal),
  );

  let coordinator = Arc::new(
    SyncCoordinator::new(ctx.clone())
      .with_call_timeout(config.sync.call_timeout())
      .with_failure_policy(config.sync.failure_policy()),
  );

  match args.command {
    Command::Intake { amount } => {
      require_positive("amount", amount)?;
      submit(&ctx, &coordinator, Mutation::add_daily_intake(amount)).await
    }
    Command::Sleep { hours } => {
      require_positive("hours", hours)?;
      submit(&ctx, &coordinator, Mutation::add_sleep_log(hours)).await
    }
    Command::Run {
      distance,
      minutes,
      pace,
      completed,
    } => {
      require_positive("distance", distance)?;
      require_positive("minutes", minutes)?;
      require_positive("pace", pace)?;
      let nanos = (minutes * 60.0 * 1e9).round() as i64;
      submit(
        &ctx,
        &coordinator,
        Mutation::log_run(distance, nanos, pace, completed),
      )
      .await
    }
    Command::Settings { goal, cup } => {
      require_positive("goal", goal)?;
      require_positive("cup", cup)?;
      submit(&ctx, &coordinator, Mutation::update_user_settings(goal, cup)).await
    }
    Command::Show { view } => show(&ctx, view).await,
    Command::Queue => list_queue(&ctx),
    Command::Sync => sync_now(&ctx, &coordinator).await,
    Command::Watch => watch(&ctx, coordinator, &config).await,
    Command::Offline { mode } => offline(&ctx, mode),
    Command::Forget => forget(&ctx),
  }
}

fn init_logging() -> Result<Option<WorkerGuard>> {
  let Some(dir) = dirs::data_dir().map(|d| d.join("habit-sync").join("logs")) else {
    return Ok(None);
  };
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
    &dir,
    "habit-sync.log",
  ));
  let filter = EnvFilter::try_from_env("HABIT_SYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(Some(guard))
}

fn needs_network(command: &Command) -> bool {
  !matches!(
    command,
    Command::Queue | Command::Offline { .. } | Command::Forget
  )
}

fn require_positive(name: &str, value: f64) -> Result<()> {
  if value.is_finite() && value > 0.0 {
    Ok(())
  } else {
    Err(eyre!("{} must be a positive number", name))
  }
}

fn require_principal(ctx: &SyncContext) -> Result<String> {
  ctx
    .session
    .principal()
    .ok_or_else(|| {
      eyre!("No principal configured. Set `principal` in the config or pass --principal")
    })
}

async fn submit(
  ctx: &SyncContext,
  coordinator: &SyncCoordinator,
  mutation: Mutation,
) -> Result<()> {
  // Older queued changes go first
  if let Some(report) = coordinator.try_sync().await {
    if report.synced > 0 {
      println!("Synced {} earlier offline change(s)", report.synced);
    }
  }

  match MutationInterceptor::new(ctx.clone()).submit(mutation).await {
    Ok(MutationOutcome::Queued) => {
      println!("Saved offline. It will sync when you're back online.");
      Ok(())
    }
    Ok(MutationOutcome::Applied(())) => {
      println!("Saved.");
      Ok(())
    }
    Err(MutationError::Backend(e)) => Err(eyre!(e.user_message())),
    Err(e) => Err(eyre!(e)),
  }
}

async fn show(ctx: &SyncContext, view: CacheKey) -> Result<()> {
  let result = CachedBackend::new(ctx.clone())
    .fetch_json(view)
    .await
    .map_err(|e| eyre!(e.user_message()))?;

  let Some(result) = result else {
    println!("No offline data for {} yet", view);
    return Ok(());
  };

  match result.source {
    CacheSource::Network => {}
    CacheSource::Offline => println!("(offline, saved {})", result.age_label().unwrap_or_default()),
    CacheSource::OfflineInvalidated => println!(
      "(offline, saved {}; may be out of date)",
      result.age_label().unwrap_or_default()
    ),
  }

  let rendered = serde_json::to_string_pretty(&result.data)
    .map_err(|e| eyre!("Failed to render {}: {}", view, e))?;
  println!("{}", rendered);
  Ok(())
}

fn list_queue(ctx: &SyncContext) -> Result<()> {
  let principal = require_principal(ctx)?;
  let actions = ctx.queue(&principal).actions();

  if actions.is_empty() {
    println!("Nothing waiting to sync");
    return Ok(());
  }

  for action in actions {
    let created = DateTime::from_timestamp_millis(action.timestamp)
      .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
      .unwrap_or_else(|| action.timestamp.to_string());
    let payload = serde_json::to_value(&action)
      .ok()
      .and_then(|v| v.get("payload").cloned())
      .unwrap_or_default();
    println!("{}  {}  {:?}  {}", created, action.id, action.action_type(), payload);
  }
  Ok(())
}

async fn sync_now(ctx: &SyncContext, coordinator: &SyncCoordinator) -> Result<()> {
  let principal = require_principal(ctx)?;
  if !ctx.connectivity.is_online() {
    return Err(eyre!("The backend is not reachable"));
  }

  let mut notices = coordinator.subscribe();
  let Some(report) = coordinator.try_sync().await else {
    return Err(eyre!("Offline saving is turned off; nothing to sync"));
  };

  while let Ok(notice) = notices.try_recv() {
    print_notice(&notice);
  }
  if report.synced == 0 && report.discarded == 0 && !report.halted {
    println!("Nothing waiting to sync for {}", principal);
  } else if report.remaining > 0 {
    println!("{} change(s) still waiting", report.remaining);
  }
  Ok(())
}

async fn watch(
  ctx: &SyncContext,
  coordinator: Arc<SyncCoordinator>,
  config: &Config,
) -> Result<()> {
  let interval = Duration::from_secs(config.connectivity.probe_interval_secs.max(1));
  let probe = ctx.connectivity.spawn_probe(ctx.backend.clone(), interval);
  let mut notices = coordinator.subscribe();
  let driver = coordinator.spawn();

  println!("Watching for connectivity changes. Press Ctrl-C to stop.");
  loop {
    tokio::select! {
      notice = notices.recv() => match notice {
        Ok(notice) => print_notice(&notice),
        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
      },
      signal = tokio::signal::ctrl_c() => {
        signal.map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
        break;
      }
    }
  }

  probe.abort();
  driver.abort();
  Ok(())
}

fn offline(ctx: &SyncContext, mode: OfflineMode) -> Result<()> {
  match mode {
    OfflineMode::On => ctx.preference.set_enabled(true),
    OfflineMode::Off => ctx.preference.set_enabled(false),
    OfflineMode::Status => {}
  }

  let state = if ctx.preference.is_enabled() { "on" } else { "off" };
  match ctx.current_queue() {
    Some(queue) => println!("Offline saving is {} ({} change(s) waiting)", state, queue.size()),
    None => println!("Offline saving is {}", state),
  }
  Ok(())
}

fn forget(ctx: &SyncContext) -> Result<()> {
  let principal = require_principal(ctx)?;
  ctx.forget_device_data();
  println!("Removed offline data for {}", principal);
  Ok(())
}

fn print_notice(notice: &SyncNotice) {
  match notice {
    SyncNotice::Failed { .. } | SyncNotice::Discarded { .. } => eprintln!("{}", notice),
    _ => println!("{}", notice),
  }
}
