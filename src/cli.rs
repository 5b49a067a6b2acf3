/// CLI argument parsing and command handling
///
/// Every command except `serve` runs against the signed-in user's data, and
/// every data command needs a session that has passed the passcode gate.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use habitflow::{
    parse_date, AppError, BackendConfig, CalendarCell, Clock, Config, DocumentServer, HabitColor,
    HabitDraft, HabitFilter, HabitFlow, HabitIcon, HabitId, HabitRepository, IdentityProvider,
    Lang, LocalIdentity, ReminderTime, Session, StatsEngine, StorageError, Toggled, TracingSink,
    User, YearMonth,
};

/// Command line arguments for HabitFlow
#[derive(Parser, Debug)]
#[command(name = "habitflow", author, version, about = "HabitFlow - daily habit tracker", long_about = None)]
pub struct Args {
    /// Path to a JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file
    /// If not provided, uses a default location in the user's home directory
    #[arg(long, global = true, conflicts_with = "remote")]
    pub database: Option<PathBuf>,

    /// Address of a document server (host:port) to sync through
    #[arg(long, global = true)]
    pub remote: Option<String>,

    /// User to sign in as
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Display language (en or id)
    #[arg(long, global = true)]
    pub lang: Option<Lang>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the local database to remote sessions
    Serve {
        #[arg(long, default_value = "127.0.0.1:7878")]
        listen: String,
    },
    /// Pass the passcode gate for the current user
    Unlock { passcode: String },
    Habit {
        #[command(subcommand)]
        command: HabitCommand,
    },
    Log {
        #[command(subcommand)]
        command: LogCommand,
    },
    /// Dashboard figures and charts
    Stats {
        /// Month to chart (YYYY-MM), defaults to the current month
        #[arg(long)]
        month: Option<YearMonth>,
    },
    /// Month calendar of completions
    Calendar {
        #[arg(long)]
        month: Option<YearMonth>,
        /// Only show this habit
        #[arg(long)]
        habit: Option<String>,
    },
    /// Run the reminder check until interrupted
    Remind,
}

#[derive(ClapArgs, Debug, Default)]
pub struct HabitFields {
    /// Hex color such as #3b82f6
    #[arg(long)]
    pub color: Option<String>,
    /// Daily reminder time (HH:MM)
    #[arg(long)]
    pub reminder: Option<ReminderTime>,
    /// Icon tag such as Droplets or BookOpen
    #[arg(long)]
    pub icon: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum HabitCommand {
    Add {
        name: String,
        #[command(flatten)]
        fields: HabitFields,
    },
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: HabitFields,
        /// Remove the reminder
        #[arg(long, conflicts_with = "reminder")]
        no_reminder: bool,
    },
    Delete { id: String },
    List,
}

#[derive(Subcommand, Debug)]
pub enum LogCommand {
    /// Mark a habit done for a day, or undo it
    Toggle {
        habit: String,
        /// Day to toggle (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Record a completion at a given day and time
    Backfill {
        habit: String,
        #[arg(long)]
        date: String,
        /// Time of completion (HH:MM)
        #[arg(long)]
        time: ReminderTime,
    },
}

impl Args {
    /// Merge command line overrides into the loaded configuration
    pub fn resolve_config(&self) -> Result<Config, AppError> {
        let mut config = Config::discover(self.config.as_deref())?;

        if let Some(path) = &self.database {
            config.backend = BackendConfig::Local { path: Some(path.clone()) };
        }
        if let Some(addr) = &self.remote {
            config.backend = BackendConfig::Remote { addr: addr.clone() };
        }
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        if let Some(lang) = self.lang {
            config.language = lang;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Execute one command
pub async fn run(command: Command, config: Config) -> Result<(), AppError> {
    if let Command::Serve { listen } = &command {
        return serve(config, listen).await;
    }

    let app = HabitFlow::open(config).await?;
    let identity = LocalIdentity::new(User::new(app.config().user.clone()));
    identity.sign_in().await?;
    let mut session = app.start_session(&identity).await?;

    match command {
        Command::Serve { .. } => Ok(()),
        Command::Unlock { passcode } => {
            session.authorize(&passcode).await?;
            println!("Unlocked for {}", session.user().id);
            Ok(())
        }
        Command::Habit { command } => {
            let repository = open_repository(&app, &session).await?;
            run_habit(command, &repository).await
        }
        Command::Log { command } => {
            let repository = open_repository(&app, &session).await?;
            run_log(command, &app, &repository).await
        }
        Command::Stats { month } => {
            let repository = open_repository(&app, &session).await?;
            print_stats(&app, &repository, month)
        }
        Command::Calendar { month, habit } => {
            let repository = open_repository(&app, &session).await?;
            print_calendar(&app, &repository, month, habit)
        }
        Command::Remind => {
            let repository = open_repository(&app, &session).await?;
            let scheduler = app.reminders(&repository, Arc::new(TracingSink));
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let handle = tokio::spawn(scheduler.run(shutdown_rx));
            tokio::signal::ctrl_c().await?;
            let _ = shutdown_tx.send(true);
            let _ = handle.await;
            identity.sign_out().await?;
            Ok(())
        }
    }
}

async fn open_repository(app: &HabitFlow, session: &Session) -> Result<HabitRepository, AppError> {
    let repository = app.repository(session).await?;
    repository.loaded().await?;
    Ok(repository)
}

async fn serve(config: Config, listen: &str) -> Result<(), AppError> {
    if matches!(config.backend, BackendConfig::Remote { .. }) {
        return Err(StorageError::Connection(
            "serve needs a local database, not a remote backend".to_string(),
        )
        .into());
    }

    let app = HabitFlow::open(config).await?;
    let listener = TcpListener::bind(listen).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    DocumentServer::new(app.store()).run(listener, shutdown_rx).await?;
    info!("Document server shutdown complete");
    Ok(())
}

fn draft_fields(mut draft: HabitDraft, fields: HabitFields) -> Result<HabitDraft, AppError> {
    if let Some(color) = fields.color {
        draft = draft.with_color(HabitColor::parse(&color)?);
    }
    if let Some(time) = fields.reminder {
        draft = draft.with_reminder(time);
    }
    if let Some(tag) = fields.icon {
        draft = draft.with_icon(HabitIcon::from_tag(Some(&tag)));
    }
    Ok(draft)
}

async fn run_habit(command: HabitCommand, repository: &HabitRepository) -> Result<(), AppError> {
    match command {
        HabitCommand::Add { name, fields } => {
            let habit = repository
                .add_habit(draft_fields(HabitDraft::named(name), fields)?)
                .await?;
            println!("Created habit '{}' ({})", habit.name, habit.id);
        }
        HabitCommand::Edit {
            id,
            name,
            fields,
            no_reminder,
        } => {
            let id = HabitId::from(id.as_str());
            let data = repository.data();
            let current = data
                .habit(&id)
                .ok_or_else(|| habitflow::RepositoryError::HabitNotFound(id.clone()))?;

            let mut draft = current.draft();
            if let Some(name) = name {
                draft.name = name;
            }
            if no_reminder {
                draft.reminder_time = None;
            }
            let habit = repository.edit_habit(&id, draft_fields(draft, fields)?).await?;
            println!("Updated habit '{}' ({})", habit.name, habit.id);
        }
        HabitCommand::Delete { id } => {
            repository.delete_habit(&HabitId::from(id.as_str())).await?;
            println!("Deleted habit {}", id);
        }
        HabitCommand::List => {
            let data = repository.data();
            if data.habits.is_empty() {
                println!("No habits found. Create your first habit to get started!");
            }
            for habit in &data.habits {
                let reminder = habit
                    .reminder_time
                    .map(|time| format!(" ⏰ {}", time))
                    .unwrap_or_default();
                println!(
                    "{}  {} [{} {}]{}",
                    habit.id,
                    habit.name,
                    habit.icon().tag(),
                    habit.color,
                    reminder
                );
            }
        }
    }
    Ok(())
}

async fn run_log(
    command: LogCommand,
    app: &HabitFlow,
    repository: &HabitRepository,
) -> Result<(), AppError> {
    match command {
        LogCommand::Toggle { habit, date } => {
            let date = match date {
                Some(date) => parse_date(&date)?,
                None => app.clock().today(),
            };
            let habit = HabitId::from(habit.as_str());
            match repository.toggle_log(&habit, date).await? {
                Toggled::Created => println!("✅ {} done on {}", habit, date),
                Toggled::Removed => println!("↩️  {} undone on {}", habit, date),
            }
        }
        LogCommand::Backfill { habit, date, time } => {
            let date: NaiveDate = parse_date(&date)?;
            let time: NaiveTime = time.as_time();
            let log = repository
                .add_custom_log(&HabitId::from(habit.as_str()), date, time)
                .await?;
            println!("Logged {} on {} at {}", log.habit_id, log.date, log.timestamp);
        }
    }
    Ok(())
}

fn print_stats(
    app: &HabitFlow,
    repository: &HabitRepository,
    month: Option<YearMonth>,
) -> Result<(), AppError> {
    let data = repository.data();
    let today = app.clock().today();
    let stats = StatsEngine::new(&data, today);
    let summary = stats.summary();
    let lang = app.config().language;

    println!(
        "📊 Today: {}/{} done ({}%) | This month: {} | Best current streak: {} days",
        summary.today_completed,
        summary.habit_count,
        summary.rate,
        summary.total_month,
        summary.max_streak
    );

    for habit in &data.habits {
        println!("🎯 {}: {} day streak", habit.name, stats.current_streak(&habit.id));
    }

    println!();
    for day in stats.weekly_counts(lang) {
        println!("{} {}  {}", day.label, day.date, "#".repeat(day.count));
    }

    let month = month.unwrap_or_else(|| YearMonth::of(today));
    println!();
    println!("{} ({} total)", month, stats.monthly_total(month));
    for day in stats.per_day_counts(month) {
        println!("{:>2}  {}", day.day, "#".repeat(day.count));
    }
    Ok(())
}

fn print_calendar(
    app: &HabitFlow,
    repository: &HabitRepository,
    month: Option<YearMonth>,
    habit: Option<String>,
) -> Result<(), AppError> {
    let data = repository.data();
    let today = app.clock().today();
    let stats = StatsEngine::new(&data, today);
    let month = month.unwrap_or_else(|| YearMonth::of(today));
    let filter = match habit {
        Some(id) => HabitFilter::Habit(HabitId::from(id.as_str())),
        None => HabitFilter::All,
    };

    let lang = app.config().language;
    println!("{}", month);
    let header: Vec<&str> = [
        chrono::Weekday::Sun,
        chrono::Weekday::Mon,
        chrono::Weekday::Tue,
        chrono::Weekday::Wed,
        chrono::Weekday::Thu,
        chrono::Weekday::Fri,
        chrono::Weekday::Sat,
    ]
    .iter()
    .map(|weekday| lang.weekday_short(*weekday))
    .collect();
    println!("{}", header.iter().map(|name| format!("{:>5}", name)).collect::<String>());

    let cells = stats.calendar_month_grid(month, &filter);
    for week in cells.chunks(7) {
        let row: String = week
            .iter()
            .map(|cell| match cell {
                CalendarCell::Padding => format!("{:>5}", ""),
                CalendarCell::Day { date, logs } if logs.is_empty() => {
                    format!("{:>5}", chrono::Datelike::day(date))
                }
                CalendarCell::Day { date, logs } => {
                    format!("{:>3}*{}", chrono::Datelike::day(date), logs.len())
                }
            })
            .collect();
        println!("{}", row);
    }
    Ok(())
}
