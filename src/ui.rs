use std::io::{self, IsTerminal};

use crate::domain::sort::SortOrder;
use crate::domain::task::{format_due_date, DisplayState, Task};
use crate::reminders::{Reminder, ReminderSink};

pub fn print_task_list(tasks: &[Task], sort: SortOrder, now_millis: i64) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Tasks"));
    println!("{}", palette.dim(&format!("sort: {sort}")));

    if tasks.is_empty() {
        println!("{}", palette.dim("no tasks"));
        return;
    }

    for task in tasks {
        println!("{}", format_task_row(task, now_millis, &palette));
    }
    println!("{}", palette.dim(&format!("{} task(s)", tasks.len())));
}

pub fn print_task_detail(task: &Task, now_millis: i64) {
    let palette = Palette::auto();
    let state = task.display_state(now_millis);
    println!(
        "{} {}",
        palette.id(&format!("#{}", task.id)),
        palette.title(&task.description, state)
    );
    println!("state:    {}", palette.state(state));
    println!("priority: {}", if task.is_priority { "yes" } else { "no" });
    println!("due date: {}", format_due_date(task.due_date_millis, now_millis));
}

fn format_task_row(task: &Task, now_millis: i64, palette: &Palette) -> String {
    let state = task.display_state(now_millis);
    let checkbox = if task.is_complete { "[x]" } else { "[ ]" };
    format!(
        "{} {} {} {} {}",
        palette.id(&format!("#{:<4}", task.id)),
        checkbox,
        palette.priority(task.is_priority),
        palette.title(&task.description, state),
        palette.dim(&format!("({})", format_due_date(task.due_date_millis, now_millis)))
    )
}

/// Prints fired reminders to stdout.
pub struct TerminalReminderSink;

impl ReminderSink for TerminalReminderSink {
    fn notify(&self, reminder: &Reminder) {
        let palette = Palette::auto();
        println!(
            "{} {} {}",
            palette.heading("reminder"),
            palette.id(&format!("#{}", reminder.task.id)),
            reminder.task.description
        );
    }
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn priority(&self, is_priority: bool) -> String {
        if is_priority {
            self.paint("1;33", "!")
        } else {
            " ".to_string()
        }
    }

    fn title(&self, text: &str, state: DisplayState) -> String {
        match state {
            // strike-through
            DisplayState::Done => self.paint("9;2", text),
            DisplayState::Overdue => self.paint("31", text),
            DisplayState::Normal => text.to_string(),
        }
    }

    fn state(&self, state: DisplayState) -> String {
        let upper = state.as_str().to_ascii_uppercase();
        self.paint(state_color_code(state), &format!("[{upper}]"))
    }
}

fn state_color_code(state: DisplayState) -> &'static str {
    match state {
        DisplayState::Done => "32",
        DisplayState::Overdue => "31",
        DisplayState::Normal => "37",
    }
}
