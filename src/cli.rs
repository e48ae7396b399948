use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};
use time::Date;

use crate::domain::sort::SortOrder;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "taskmaker")]
#[command(bin_name = "taskmaker")]
#[command(version)]
#[command(about = "A local to-do list with reminders and automatic cleanup")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'd',
        long,
        env = "TASKMAKER_DB_PATH",
        default_value = ".taskmaker/tasks.db",
        help = "Path to the task database."
    )]
    pub db: String,

    #[arg(
        short = 'c',
        long,
        env = "TASKMAKER_CONFIG",
        default_value = ".taskmaker/config.toml",
        help = "Path to the preferences file."
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Add a new task.")]
    Add(AddArgs),
    #[command(about = "List tasks.")]
    Ls(ListArgs),
    #[command(about = "Show one task.")]
    Show(ShowArgs),
    #[command(about = "Mark a task complete.")]
    Done(IdArgs),
    #[command(about = "Mark a task incomplete.")]
    Undone(IdArgs),
    #[command(about = "Delete a task.")]
    Rm(IdArgs),
    #[command(about = "Delete every task, or only completed ones.")]
    Clear(ClearArgs),
    #[command(about = "Schedule a reminder for a task.")]
    Remind(RemindArgs),
    #[command(about = "Purge stale completed tasks now.")]
    Cleanup,
    #[command(about = "Fire reminders and run the periodic cleanup job.")]
    Run(RunArgs),
    #[command(about = "Inspect or change preferences.")]
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(help = "Task description.")]
    pub description: String,

    #[arg(short = 'p', long, help = "Flag the task as priority.")]
    pub priority: bool,

    #[arg(
        long,
        value_parser = parse_date,
        help = "Due date (YYYY-MM-DD)."
    )]
    pub due: Option<Date>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(
        short = 's',
        long,
        help = "Sort order: default or date. Defaults to the stored preference."
    )]
    pub sort: Option<SortOrder>,

    #[arg(long, help = "Emit JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(help = "Task id.")]
    pub id: i64,

    #[arg(long, help = "Emit JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    #[arg(help = "Task id.")]
    pub id: i64,
}

#[derive(Debug, Args)]
pub struct ClearArgs {
    #[arg(long, help = "Only delete completed tasks.")]
    pub completed: bool,
}

#[derive(Debug, Args)]
pub struct RemindArgs {
    #[arg(help = "Task id.")]
    pub id: i64,

    #[arg(
        long,
        value_parser = parse_date,
        help = "Day to be reminded on (YYYY-MM-DD); fires at noon UTC."
    )]
    pub date: Date,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(
        long,
        help = "Stop after this many seconds instead of running until interrupted."
    )]
    pub seconds: Option<u64>,

    #[arg(long, default_value_t = 1000, help = "Reminder poll interval in milliseconds.")]
    pub tick_ms: u64,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommands {
    #[command(about = "Print the effective preferences.")]
    Show,
    #[command(about = "Set the default list order (default or date).")]
    Sort(SortArgs),
}

#[derive(Debug, Args)]
pub struct SortArgs {
    #[arg(help = "default or date.")]
    pub order: SortOrder,
}

pub fn parse_date(raw: &str) -> Result<Date, String> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(raw.trim(), &format).map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}
