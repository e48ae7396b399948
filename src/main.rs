mod app;
mod cli;
mod config;
mod db;
mod dispatch;
mod domain;
mod jobs;
mod loader;
mod notify;
mod provider;
mod reminders;
mod resource;
mod ui;

use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use tracing_subscriber::EnvFilter;

use domain::task::now_millis;

const LOG_ENV: &str = "TASKMAKER_LOG";

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization should work")
    );
}

fn due_date_millis(date: Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp() * 1000
}

fn format_instant(millis: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|at| at.format(&Rfc3339).ok())
        .unwrap_or_else(|| millis.to_string())
}

fn run() -> Result<(), app::AppError> {
    use clap::Parser;
    use cli::{Commands, ConfigSubcommands};

    let cli = cli::Cli::parse();
    let mut app = app::App::open(&cli.db, &cli.config)?;
    if let db::SchemaOutcome::Upgraded { from } = app.schema_outcome() {
        eprintln!("warning: task database upgraded from version {from}; existing tasks were reset");
    }

    match cli.command {
        Commands::Add(args) => {
            let task = app.add_task(
                &args.description,
                args.priority,
                args.due.map(due_date_millis),
            )?;
            println!("added #{} {}", task.id, task.description);
        }
        Commands::Ls(args) => {
            let sort = args.sort.unwrap_or(app.config().sort_order);
            let tasks = app.list_tasks(Some(sort))?;
            if args.json {
                print_json(&tasks);
            } else {
                ui::print_task_list(&tasks, sort, now_millis());
            }
        }
        Commands::Show(args) => {
            let task = app
                .show_task(args.id)?
                .ok_or(app::AppError::NotFound(args.id))?;
            if args.json {
                print_json(&task);
            } else {
                ui::print_task_detail(&task, now_millis());
            }
        }
        Commands::Done(args) => {
            let task = app.set_complete(args.id, true)?;
            println!("completed #{} {}", task.id, task.description);
        }
        Commands::Undone(args) => {
            let task = app.set_complete(args.id, false)?;
            println!("reopened #{} {}", task.id, task.description);
        }
        Commands::Rm(args) => {
            let task = app.delete_task(args.id)?;
            println!("deleted #{} {}", task.id, task.description);
        }
        Commands::Clear(args) => {
            let deleted = app.clear(args.completed)?;
            println!("deleted {deleted} task(s)");
        }
        Commands::Remind(args) => {
            let alarm = app.remind(args.id, args.date, OffsetDateTime::now_utc())?;
            println!(
                "reminder for #{} set for {}",
                alarm.task_id,
                format_instant(alarm.trigger_at_millis)
            );
        }
        Commands::Cleanup => {
            let purged = app.run_cleanup(now_millis())?;
            println!("purged {purged} stale task(s)");
        }
        Commands::Run(args) => {
            let pending = app.pending_reminders()?;
            println!("watching {} pending reminder(s)", pending.len());
            if !app.cleanup_registered() {
                println!("cleanup job not registered; run `taskmaker cleanup` manually");
            }
            let sort = app.config().sort_order;
            let summary = app.run(
                args.seconds.map(Duration::from_secs),
                Duration::from_millis(args.tick_ms.max(1)),
                &ui::TerminalReminderSink,
                &mut |tasks| ui::print_task_list(tasks, sort, now_millis()),
            )?;
            println!("fired {} reminder(s)", summary.reminders_fired);
        }
        Commands::Config(args) => match args.command {
            ConfigSubcommands::Show => {
                print!("{}", app.config().to_toml()?);
            }
            ConfigSubcommands::Sort(sort) => {
                app.set_sort_order(sort.order)?;
                println!("sort order set to {}", sort.order);
            }
        },
    }
    Ok(())
}
