use almanac_core::calendar::{self, ddmmyyyy_text, month_grid, normalize_time, parse_user_date};
use almanac_core::edits::{self, OccurrenceEdit, OriginalFate, ScheduleRequest};
use almanac_core::export::export_csv;
use almanac_core::*;
use chrono::{Datelike, Duration, Local, NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "almanac")]
#[command(about = "Recurring events calendar", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use a specific config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct RepeatArgs {
    /// Repeat frequency (none, daily, monthly, quarterly)
    #[arg(long, default_value = "none")]
    repeat: RepeatFrequency,

    /// Week of the month to repeat on (1-4), may be given several times
    #[arg(long = "week")]
    weeks: Vec<WeekSelector>,
}

#[derive(Args)]
struct TimeArgs {
    /// Start time (HH:MM)
    #[arg(long)]
    start: Option<String>,

    /// End time (HH:MM)
    #[arg(long)]
    end: Option<String>,

    /// Leave both times empty instead of using the default slot
    #[arg(long, conflicts_with_all = ["start", "end"])]
    untimed: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new series
    Add {
        #[arg(long)]
        name: String,

        /// First date (DD/MM/YYYY or YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,

        #[command(flatten)]
        times: TimeArgs,

        #[command(flatten)]
        repeat: RepeatArgs,
    },

    /// List every stored series
    List,

    /// Show the agenda for a month
    Month {
        #[arg(long)]
        year: Option<i32>,

        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,

        /// Also print a calendar grid
        #[arg(long)]
        grid: bool,
    },

    /// Show every month of a year
    Year {
        #[arg(long)]
        year: Option<i32>,
    },

    /// Show the occurrences on one date
    Day {
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Skip one date of a series
    Exclude {
        id: String,
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Set the last date of a series (inclusive)
    End {
        id: String,
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Remove a series from a date onward
    StopFrom {
        id: String,
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Delete a whole series
    Delete { id: String },

    /// Move one occurrence to another date
    Move {
        id: String,
        #[arg(value_parser = parse_date)]
        from: NaiveDate,
        #[arg(value_parser = parse_date)]
        to: NaiveDate,
    },

    /// Change one occurrence, splitting it off the series
    Edit {
        id: String,
        #[arg(value_parser = parse_date)]
        date: NaiveDate,

        #[arg(long)]
        name: Option<String>,

        /// New date for the occurrence
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },

    /// Manage items waiting to be scheduled
    #[command(subcommand)]
    Unscheduled(UnscheduledCommands),

    /// Export occurrences to CSV
    Export {
        #[arg(long)]
        year: i32,

        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,

        #[arg(long)]
        output: PathBuf,
    },

    /// Suggest names for new events
    Names,
}

#[derive(Subcommand)]
enum UnscheduledCommands {
    /// Add an unscheduled item
    Add { name: String },

    /// List unscheduled items
    List,

    /// Delete an unscheduled item
    Delete {
        id: String,

        /// Also delete every series with the same name
        #[arg(long)]
        cascade: bool,
    },

    /// Put an unscheduled item on the calendar
    Schedule {
        id: String,

        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,

        /// Name for the new series (defaults to the item's name)
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        times: TimeArgs,

        #[command(flatten)]
        repeat: RepeatArgs,
    },
}

fn parse_date(text: &str) -> std::result::Result<NaiveDate, String> {
    parse_user_date(text).ok_or_else(|| format!("invalid date {:?} (use DD/MM/YYYY or YYYY-MM-DD)", text))
}

fn main() -> ExitCode {
    // Warnings only, so listings on stdout stay clean
    almanac_core::logging::init_with_level("warn");

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    tracing::debug!("Using data directory {:?}", data_dir);

    let mut series_store = JsonSeriesStore::in_dir(&data_dir);
    let mut unscheduled_store = JsonUnscheduledStore::in_dir(&data_dir);

    match cli.command {
        Commands::Add {
            name,
            date,
            times,
            repeat,
        } => {
            let (start, end) = resolve_times(times, &config);
            let series = Series::new(name, date)
                .with_times(start, end)
                .with_repeat(repeat.repeat, repeat.weeks);
            let created = series_store.create(series)?;
            println!("Created series {}", created.id);
            print_series(&created);
            Ok(())
        }
        Commands::List => cmd_list(&series_store),
        Commands::Month { year, month, grid } => {
            let today = Local::now().date_naive();
            cmd_month(
                &series_store,
                year.unwrap_or(today.year()),
                month.unwrap_or(today.month()),
                grid,
            )
        }
        Commands::Year { year } => {
            cmd_year(&series_store, year.unwrap_or(Local::now().date_naive().year()))
        }
        Commands::Day { date } => {
            let occurrences = occurrences_on(&series_store.list()?, date);
            if occurrences.is_empty() {
                println!("No events on {}", ddmmyyyy_text(date));
            }
            for occurrence in &occurrences {
                print_occurrence(occurrence);
            }
            Ok(())
        }
        Commands::Exclude { id, date } => {
            series_store.add_exclusion(&id, date)?;
            println!("Excluded {} from {}", ddmmyyyy_text(date), id);
            Ok(())
        }
        Commands::End { id, date } => {
            series_store.set_end_date(&id, date)?;
            println!("Series {} ends on {}", id, ddmmyyyy_text(date));
            Ok(())
        }
        Commands::StopFrom { id, date } => {
            let updated = edits::stop_series_from(&mut series_store, &id, date)?;
            if let Some(end) = updated.end_date {
                println!("Series {} now ends on {}", id, ddmmyyyy_text(end));
            }
            Ok(())
        }
        Commands::Delete { id } => {
            let removed = series_store.delete(&id)?;
            println!("Deleted series {} ({})", removed.id, removed.name);
            Ok(())
        }
        Commands::Move { id, from, to } => {
            match edits::move_occurrence(&mut series_store, &id, from, to)? {
                Some(created) => println!(
                    "Moved {} to {} as series {}",
                    ddmmyyyy_text(from),
                    ddmmyyyy_text(to),
                    created.id
                ),
                None => println!("Nothing to move"),
            }
            Ok(())
        }
        Commands::Edit {
            id,
            date,
            name,
            to,
            start,
            end,
        } => {
            let edit = OccurrenceEdit {
                name,
                date: to,
                start_time: start,
                end_time: end,
            };
            let outcome = edits::edit_occurrence(&mut series_store, &id, date, edit)?;
            println!("Created series {}", outcome.created.id);
            match outcome.original {
                OriginalFate::Deleted(series) => println!("Deleted one-off series {}", series.id),
                OriginalFate::Excluded(series) => {
                    println!("Excluded {} from {}", ddmmyyyy_text(date), series.id)
                }
            }
            Ok(())
        }
        Commands::Unscheduled(command) => {
            cmd_unscheduled(command, &mut series_store, &mut unscheduled_store, &config)
        }
        Commands::Export {
            year,
            month,
            output,
        } => {
            let series = series_store.list()?;
            let occurrences: Vec<Occurrence> = match month {
                Some(month) => month_agenda(&series, year, month),
                None => year_overview(&series, year).into_iter().flatten().collect(),
            };
            let count = export_csv(&occurrences, &output)?;
            println!("Exported {} occurrences to {}", count, output.display());
            Ok(())
        }
        Commands::Names => {
            let names = recent_names(
                &series_store.list()?,
                &unscheduled_store.list()?,
                config.agenda.recent_names_limit,
            );
            for name in names {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn cmd_unscheduled(
    command: UnscheduledCommands,
    series_store: &mut JsonSeriesStore,
    unscheduled_store: &mut JsonUnscheduledStore,
    config: &Config,
) -> Result<()> {
    match command {
        UnscheduledCommands::Add { name } => {
            let item = UnscheduledItem::new(name);
            match unscheduled_store.add(item)? {
                AddOutcome::Added(item) => println!("Added unscheduled item {} ({})", item.id, item.name),
                AddOutcome::AlreadyPresent => println!("Item already present"),
            }
        }
        UnscheduledCommands::List => {
            let items = unscheduled_store.list()?;
            if items.is_empty() {
                println!("No unscheduled items");
            }
            for item in items {
                println!("{}  {}", item.id, item.name);
            }
        }
        UnscheduledCommands::Delete { id, cascade } => {
            if cascade {
                let outcome = edits::delete_unscheduled_cascade(series_store, unscheduled_store, &id)?;
                match outcome.item {
                    Some(item) => println!(
                        "Deleted unscheduled item {} and {} series",
                        item.id,
                        outcome.series.len()
                    ),
                    None => println!("No unscheduled item {}", id),
                }
            } else {
                match unscheduled_store.delete(&id)? {
                    Some(item) => println!("Deleted unscheduled item {}", item.id),
                    None => println!("No unscheduled item {}", id),
                }
            }
        }
        UnscheduledCommands::Schedule {
            id,
            date,
            name,
            times,
            repeat,
        } => {
            let (start_time, end_time) = resolve_times(times, config);
            let request = ScheduleRequest {
                name,
                date,
                start_time,
                end_time,
                frequency: repeat.repeat,
                weeks: repeat.weeks,
            };
            let created = edits::schedule_unscheduled(series_store, &*unscheduled_store, &id, request)?;
            println!("Created series {}", created.id);
            print_series(&created);
        }
    }
    Ok(())
}

/// Fill in missing times from the configured slot
///
/// Without any time the event takes the next free slot after now. A start
/// without an end lasts one slot.
fn resolve_times(times: TimeArgs, config: &Config) -> (String, String) {
    if times.untimed {
        return (String::new(), String::new());
    }

    let slot = config.schedule.slot_minutes;
    match (times.start, times.end) {
        (Some(start), Some(end)) => (start, end),
        (Some(start), None) => {
            let start = normalize_time(&start);
            let end = NaiveTime::parse_from_str(&start, "%H:%M")
                .map(|t| {
                    let (end, _) = t.overflowing_add_signed(Duration::minutes(i64::from(slot)));
                    end.format("%H:%M").to_string()
                })
                .unwrap_or_default();
            (start, end)
        }
        (None, end) => {
            let (start, slot_end) = calendar::default_slot(Local::now().time(), slot);
            (start, end.unwrap_or(slot_end))
        }
    }
}

fn cmd_list(store: &JsonSeriesStore) -> Result<()> {
    let series = store.list()?;
    if series.is_empty() {
        println!("No series stored");
    }
    for s in &series {
        print_series(s);
    }
    Ok(())
}

fn cmd_month(store: &JsonSeriesStore, year: i32, month: u32, grid: bool) -> Result<()> {
    let series = store.list()?;
    let mut occurrences = month_agenda(&series, year, month);

    println!("{}", month_title(year, month));
    if grid {
        print_grid(year, month, &occurrences);
    }

    if occurrences.is_empty() {
        println!("No events");
        return Ok(());
    }

    // Agenda order is by time; keep it within each day
    occurrences.sort_by_key(|o| o.date);
    for occurrence in &occurrences {
        print_occurrence(occurrence);
    }
    Ok(())
}

fn cmd_year(store: &JsonSeriesStore, year: i32) -> Result<()> {
    let series = store.list()?;
    for (index, occurrences) in year_overview(&series, year).iter().enumerate() {
        let month = index as u32 + 1;
        println!("{}: {} events", month_title(year, month), occurrences.len());
        for occurrence in occurrences {
            print!("  ");
            print_occurrence(occurrence);
        }
    }
    Ok(())
}

fn month_title(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_else(|| format!("{}-{:02}", year, month))
}

fn time_span(start: &str, end: &str) -> String {
    match (start.is_empty(), end.is_empty()) {
        (true, true) => "all day".to_string(),
        (false, true) => start.to_string(),
        (true, false) => format!("until {}", end),
        (false, false) => format!("{}-{}", start, end),
    }
}

fn print_occurrence(occurrence: &Occurrence) {
    let repeat = if occurrence.repeat.is_repeating() {
        format!("  [{}]", occurrence.repeat)
    } else {
        String::new()
    };
    println!(
        "{}  {:<11}  {}{}  ({})",
        ddmmyyyy_text(occurrence.date),
        time_span(&occurrence.start_time, &occurrence.end_time),
        occurrence.name,
        repeat,
        occurrence.series_id
    );
}

fn print_series(series: &Series) {
    let rule = normalize(series);
    let weeks: Vec<String> = rule.weeks.iter().map(|w| w.to_string()).collect();
    let mut pattern = rule.frequency.to_string();
    if !weeks.is_empty() {
        pattern = format!("{} {}", weeks.join(", "), pattern);
    }

    print!(
        "{}  {}  {:<11}  {}  [{}]",
        series.id,
        ddmmyyyy_text(series.start_date),
        time_span(&series.start_time, &series.end_time),
        series.name,
        pattern
    );
    if let Some(end) = series.end_date {
        print!("  ends {}", ddmmyyyy_text(end));
    }
    if !series.exclusions.is_empty() {
        print!("  skips {}", series.exclusions.len());
    }
    println!();
}

fn print_grid(year: i32, month: u32, occurrences: &[Occurrence]) {
    println!(" Su  Mo  Tu  We  Th  Fr  Sa");
    for week in month_grid(year, month) {
        let row: Vec<String> = week
            .iter()
            .map(|cell| match cell {
                Some(day) => {
                    let busy = occurrences.iter().any(|o| o.date == *day);
                    format!("{:>3}{}", day.day(), if busy { "*" } else { " " })
                }
                None => "    ".to_string(),
            })
            .collect();
        println!("{}", row.join("").trim_end());
    }
}
