//! sabbathcache - Sabbath start and end times from the command line.
//!
//! Looks up Friday and Saturday sunsets for a location, caches them locally
//! so later queries work offline, and can stay running to announce the
//! start of the Sabbath.

mod config;

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sabbathcache_core::api::ApiClient;
use sabbathcache_core::cache::SabbathCache;
use sabbathcache_core::calendar::{Clock, SabbathCalendar, SystemClock};
use sabbathcache_core::geocode::{Geocoder, NominatimGeocoder, OfflineGeocoder};
use sabbathcache_core::notify::{LogNotifier, Permission};
use sabbathcache_core::preferences::Preferences;
use sabbathcache_core::scheduler::{BackoffPolicy, WorkScheduler};
use sabbathcache_core::worker::{
    RefreshWorker, RoutineCheckWorker, SabbathStartWorker, REFRESH_JOB, ROUTINE_CHECK_JOB,
};
use sabbathcache_core::{
    CachedSabbathRepository, Coordinates, RepositoryContext, SabbathInfo, SabbathRepository,
    SabbathWeek, SyncingSabbathRepository,
};

use config::Config;

// ============================================================================
// Constants
// ============================================================================

/// Rolling log file written in watch mode
const LOG_FILE: &str = "sabbathcache.log";

/// Timestamp format for printed Sabbath times
const TIME_FORMAT: &str = "%a %b %d %Y %H:%M %:z";

#[derive(Parser)]
#[command(name = "sabbathcache", version, about = "Sabbath start and end times, cached for offline use")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show when the current or upcoming Sabbath starts and ends
    Info {
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Only use cached times, never the network
        #[arg(long)]
        offline: bool,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the Friday/Saturday dates bounding a Sabbath
    Week {
        /// Any date in the week (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Keep the cache fresh and announce the Sabbath start until interrupted
    Watch {
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// List cached Sabbath times
    Cache,
    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Set the default location
    SetLocation {
        #[arg(allow_hyphen_values = true)]
        latitude: f64,
        #[arg(allow_hyphen_values = true)]
        longitude: f64,
        /// IANA timezone, e.g. America/New_York
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Turn Sabbath start notifications on or off
    Notifications { state: Toggle },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

/// Initialize the tracing subscriber for logging.
/// Returns the file writer guard when a log directory is given.
fn init_tracing(default_level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;

    let _guard = match cli.command {
        Command::Watch { .. } => {
            let log_dir = config.cache_dir()?;
            std::fs::create_dir_all(&log_dir)?;
            init_tracing("info", Some(&log_dir))
        }
        _ => init_tracing("warn", None),
    };

    match cli.command {
        Command::Info { lat, lon, offline, json } => run_info(&config, lat, lon, offline, json).await,
        Command::Week { date } => run_week(&config, date),
        Command::Watch { lat, lon } => run_watch(&config, lat, lon).await,
        Command::Cache => run_cache(&config).await,
        Command::Config { action } => run_config(config, action),
    }
}

// ============================================================================
// Wiring
// ============================================================================

fn open_preferences(config: &Config) -> Result<Arc<Preferences>> {
    Ok(Arc::new(Preferences::load(config.cache_dir()?)?))
}

fn open_cache(config: &Config) -> Result<SabbathCache> {
    SabbathCache::open(&config.cache_db_path()?)
}

fn build_context(config: &Config, clock: Arc<dyn Clock>, offline: bool) -> Result<RepositoryContext> {
    let geocoder: Arc<dyn Geocoder> = if offline {
        Arc::new(OfflineGeocoder)
    } else {
        Arc::new(NominatimGeocoder::new(&config.geocoder_api_url)?)
    };

    Ok(RepositoryContext {
        cache: open_cache(config)?,
        geocoder,
        preferences: open_preferences(config)?,
        calendar: SabbathCalendar::new(config.tz()?, clock),
    })
}

fn syncing_repository(config: &Config, ctx: RepositoryContext) -> Result<SyncingSabbathRepository> {
    let client = ApiClient::with_base_url(&config.sunset_api_url)?;
    Ok(SyncingSabbathRepository::new(ctx, Arc::new(client)))
}

/// Coordinates from the command line, then the config file, then the last used ones.
fn resolve_coordinates(
    config: &Config,
    preferences: &Preferences,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<Coordinates> {
    match (lat, lon) {
        (Some(lat), Some(lon)) => return Coordinates::new(lat, lon),
        (None, None) => {}
        _ => bail!("Both --lat and --lon are required"),
    }

    if let Some(coords) = config.coordinates()? {
        return Ok(coords);
    }

    preferences.last_coordinates().ok_or_else(|| {
        anyhow!("No location configured. Run `sabbathcache config set-location <lat> <lon>` or pass --lat/--lon")
    })
}

fn print_info(info: &SabbathInfo, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(info)?);
        return Ok(());
    }

    println!("Sabbath for the week of {} ({})", info.week_key, info.location);
    println!("  Begins: {}", info.start.format(TIME_FORMAT));
    println!("  Ends:   {}", info.end.format(TIME_FORMAT));
    if info.is_sabbath {
        println!("  It is the Sabbath now ({})", info.countdown_display(Utc::now()));
    } else {
        println!("  Status: {}", info.countdown_display(Utc::now()));
    }
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn run_info(
    config: &Config,
    lat: Option<f64>,
    lon: Option<f64>,
    offline: bool,
    json: bool,
) -> Result<()> {
    let ctx = build_context(config, Arc::new(SystemClock), offline)?;
    let coords = resolve_coordinates(config, &ctx.preferences, lat, lon)?;

    let repository: Box<dyn SabbathRepository> = if offline {
        Box::new(CachedSabbathRepository::new(ctx))
    } else {
        Box::new(syncing_repository(config, ctx)?)
    };

    let mut last_error = None;
    let mut results = repository.get_sabbath_info(coords);
    while let Some(result) = results.next().await {
        match result {
            Ok(info) => {
                print_info(&info, json)?;
                last_error = None;
            }
            Err(e) => {
                error!(error = %e, "Failed to resolve Sabbath info");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Week containing `date`, or the week an `info` query would use now.
fn week_to_show(
    calendar: &SabbathCalendar,
    preferences: &Preferences,
    date: Option<NaiveDate>,
) -> Result<SabbathWeek> {
    let week = match date {
        Some(date) => calendar.week_of(date)?,
        None => calendar.week_for_query(preferences.last_sabbath_end().as_ref())?,
    };
    Ok(week)
}

fn run_week(config: &Config, date: Option<NaiveDate>) -> Result<()> {
    let calendar = SabbathCalendar::system(config.tz()?);
    let week = week_to_show(&calendar, &*open_preferences(config)?, date)?;

    println!("Week key: {}", week.key());
    println!("Friday:   {}", week.friday.format("%a %b %d %Y"));
    println!("Saturday: {}", week.saturday.format("%a %b %d %Y"));
    Ok(())
}

async fn run_watch(config: &Config, lat: Option<f64>, lon: Option<f64>) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ctx = build_context(config, Arc::clone(&clock), false)?;
    let cache = ctx.cache.clone();
    let preferences = Arc::clone(&ctx.preferences);
    let coords = resolve_coordinates(config, &preferences, lat, lon)?;
    let repository: Arc<dyn SabbathRepository> = Arc::new(syncing_repository(config, ctx)?);

    // Resolve once up front so the notification carries the location label
    let mut location = None;
    {
        let mut results = repository.get_sabbath_info(coords);
        while let Some(result) = results.next().await {
            match result {
                Ok(info) => {
                    print_info(&info, false)?;
                    location = Some(info.location);
                }
                Err(e) => warn!(error = %e, "Initial Sabbath lookup failed, will retry"),
            }
        }
    }

    let permission = if preferences.notifications_enabled() {
        Permission::Granted
    } else {
        Permission::Denied
    };
    let start_worker = Arc::new(SabbathStartWorker::new(
        Arc::new(LogNotifier::new(permission)),
        location,
    ));

    let interval = Duration::from_secs(config.routine_check_hours.max(1) * 60 * 60);
    let scheduler = Arc::new(WorkScheduler::new());
    scheduler.enqueue_unique_periodic(
        REFRESH_JOB,
        interval,
        BackoffPolicy::default(),
        Arc::new(RefreshWorker::new(repository, coords)),
    );
    scheduler.enqueue_unique_periodic(
        ROUTINE_CHECK_JOB,
        interval,
        BackoffPolicy::default(),
        Arc::new(RoutineCheckWorker::new(
            cache,
            clock,
            Arc::downgrade(&scheduler),
            start_worker,
        )),
    );

    info!(jobs = ?scheduler.scheduled(), "Watching for the Sabbath, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    scheduler.shutdown();
    info!("sabbathcache watch shutting down");
    Ok(())
}

async fn run_cache(config: &Config) -> Result<()> {
    let cache = open_cache(config)?;
    let rows = cache.all().await?;
    if rows.is_empty() {
        println!("No cached Sabbath times");
        return Ok(());
    }

    for row in rows {
        match row.to_times() {
            Ok(times) => println!(
                "{}  {}  ->  {}",
                row.id,
                times.friday.format(TIME_FORMAT),
                times.saturday.format(TIME_FORMAT)
            ),
            Err(e) => println!("{}  (unreadable: {})", row.id, e),
        }
    }
    Ok(())
}

/// Point the config at a new location. The remembered Sabbath end belonged
/// to the old one and is dropped.
fn set_location(
    config: &mut Config,
    preferences: &Preferences,
    latitude: f64,
    longitude: f64,
    timezone: Option<String>,
) -> Result<()> {
    let coords = Coordinates::new(latitude, longitude)?;
    let timezone = timezone.unwrap_or_else(|| config.timezone.clone());
    timezone
        .parse::<chrono_tz::Tz>()
        .map_err(|e| anyhow!("Invalid timezone {}: {}", timezone, e))?;

    config.latitude = Some(coords.latitude);
    config.longitude = Some(coords.longitude);
    config.timezone = timezone;
    preferences.forget_sabbath_end()
}

fn run_config(mut config: Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("Config file: {}", Config::config_path()?.display());
        }
        ConfigAction::SetLocation { latitude, longitude, timezone } => {
            let preferences = open_preferences(&config)?;
            set_location(&mut config, &preferences, latitude, longitude, timezone)?;
            config.save()?;
            println!("Location set to {}, {} ({})", latitude, longitude, config.timezone);
        }
        ConfigAction::Notifications { state } => {
            let enabled = matches!(state, Toggle::On);
            open_preferences(&config)?.set_notifications_enabled(enabled)?;
            println!("Sabbath notifications {}", if enabled { "on" } else { "off" });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_with_negative_longitude() {
        let cli = Cli::try_parse_from([
            "sabbathcache", "info", "--lat", "40.7128", "--lon", "-74.006", "--offline",
        ])
        .unwrap();
        match cli.command {
            Command::Info { lat, lon, offline, json } => {
                assert_eq!(lat, Some(40.7128));
                assert_eq!(lon, Some(-74.006));
                assert!(offline);
                assert!(!json);
            }
            _ => panic!("expected info command"),
        }
    }

    #[test]
    fn test_parse_week_date() {
        let cli = Cli::try_parse_from(["sabbathcache", "week", "--date", "2025-09-25"]).unwrap();
        match cli.command {
            Command::Week { date } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 9, 25));
            }
            _ => panic!("expected week command"),
        }
        assert!(Cli::try_parse_from(["sabbathcache", "week", "--date", "not-a-date"]).is_err());
    }

    #[test]
    fn test_parse_set_location() {
        let cli = Cli::try_parse_from([
            "sabbathcache", "config", "set-location", "-33.8688", "151.2093",
            "--timezone", "Australia/Sydney",
        ])
        .unwrap();
        match cli.command {
            Command::Config {
                action: ConfigAction::SetLocation { latitude, longitude, timezone },
            } => {
                assert_eq!(latitude, -33.8688);
                assert_eq!(longitude, 151.2093);
                assert_eq!(timezone.as_deref(), Some("Australia/Sydney"));
            }
            _ => panic!("expected config set-location"),
        }
    }

    #[test]
    fn test_resolve_coordinates_precedence() {
        let preferences = Preferences::in_memory();
        let mut config = Config::default();

        assert!(resolve_coordinates(&config, &preferences, None, None).is_err());
        assert!(resolve_coordinates(&config, &preferences, Some(1.0), None).is_err());

        preferences
            .set_last_coordinates(Coordinates::new(10.0, 20.0).unwrap())
            .unwrap();
        let coords = resolve_coordinates(&config, &preferences, None, None).unwrap();
        assert_eq!(coords.latitude, 10.0);

        config.latitude = Some(30.0);
        config.longitude = Some(40.0);
        let coords = resolve_coordinates(&config, &preferences, None, None).unwrap();
        assert_eq!(coords.longitude, 40.0);

        let coords = resolve_coordinates(&config, &preferences, Some(-5.0), Some(-6.0)).unwrap();
        assert_eq!((coords.latitude, coords.longitude), (-5.0, -6.0));

        assert!(resolve_coordinates(&config, &preferences, Some(95.0), Some(0.0)).is_err());
    }

    #[test]
    fn test_week_to_show() {
        let calendar = SabbathCalendar::system(chrono_tz::America::New_York);
        let preferences = Preferences::in_memory();

        let week = week_to_show(&calendar, &preferences, NaiveDate::from_ymd_opt(2025, 9, 25)).unwrap();
        assert_eq!(week.key(), "2025-09-26");

        let err = week_to_show(&calendar, &preferences, Some(NaiveDate::MAX)).unwrap_err();
        assert!(err.to_string().contains("supported calendar range"));
    }

    #[test]
    fn test_set_location_forgets_known_end() {
        let preferences = Preferences::in_memory();
        let end = chrono::DateTime::parse_from_rfc3339("2025-09-27T19:00:00-04:00").unwrap();
        preferences
            .record_sabbath(end, Coordinates::new(40.7128, -74.006).unwrap())
            .unwrap();

        let mut config = Config::default();
        set_location(&mut config, &preferences, 34.0522, -118.2437, Some("America/Los_Angeles".to_string()))
            .unwrap();
        assert_eq!(config.latitude, Some(34.0522));
        assert_eq!(config.timezone, "America/Los_Angeles");
        assert!(preferences.last_sabbath_end().is_none());

        let mut untouched = Config::default();
        preferences.record_sabbath(end, Coordinates::new(40.7128, -74.006).unwrap()).unwrap();
        assert!(set_location(&mut untouched, &preferences, 34.0, -118.0, Some("Mars/Base".to_string())).is_err());
        assert_eq!(untouched, Config::default());
        assert_eq!(preferences.last_sabbath_end(), Some(end));
    }
}
