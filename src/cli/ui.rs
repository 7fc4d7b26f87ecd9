use std::io::stdout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::{
    execute,
    style::{Color as CtColor, Print, ResetColor, SetForegroundColor},
};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};

use crate::error::PackError;

static COLOR: AtomicBool = AtomicBool::new(true);

/// Enable or disable colored output for everything printed through this module
pub fn set_color(enabled: bool) {
    COLOR.store(enabled, Ordering::Relaxed);
    crossterm::style::force_color_output(enabled);
}

fn color_enabled() -> bool {
    COLOR.load(Ordering::Relaxed)
}

/// Print success message
pub fn print_success(message: &str) {
    print_line(CtColor::Green, "✅ ", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    print_line(CtColor::Yellow, "⚠️  ", message);
}

/// Print error message
pub fn print_error(error: &PackError) {
    print_line(CtColor::Red, "❌ ", &error.to_string());
}

/// Print info message
pub fn print_info(message: &str) {
    print_line(CtColor::Blue, "ℹ️  ", message);
}

fn print_line(color: CtColor, icon: &str, message: &str) {
    let _ = execute!(
        stdout(),
        SetForegroundColor(color),
        Print(icon),
        Print(message),
        Print("\n"),
        ResetColor
    );
}

/// Bold cyan, for names and paths inside messages
pub fn highlight(text: &str) -> String {
    if color_enabled() {
        text.cyan().bold().to_string()
    } else {
        text.to_string()
    }
}

/// Dimmed, for secondary details
pub fn dim(text: &str) -> String {
    if color_enabled() {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Print a unified line diff between two texts
pub fn print_text_diff(label: &str, left: &str, right: &str) {
    let diff = TextDiff::from_lines(left, right);
    let mut out = stdout();

    let _ = execute!(out, SetForegroundColor(CtColor::DarkGrey), Print(format!("--- a/{}\n+++ b/{}\n", label, label)), ResetColor);
    for hunk in diff.unified_diff().context_radius(2).iter_hunks() {
        let _ = execute!(out, SetForegroundColor(CtColor::Cyan), Print(format!("{}\n", hunk.header())), ResetColor);
        for change in hunk.iter_changes() {
            let (sign, color) = match change.tag() {
                ChangeTag::Delete => ("-", CtColor::Red),
                ChangeTag::Insert => ("+", CtColor::Green),
                ChangeTag::Equal => (" ", CtColor::Reset),
            };
            let mut line = format!("{}{}", sign, change.value());
            if change.missing_newline() {
                line.push('\n');
            }
            let _ = execute!(out, SetForegroundColor(color), Print(line), ResetColor);
        }
    }
}

/// Create a progress bar with a specific style
pub fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(80));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos}/{len} {wide_msg}") {
        pb.set_style(style.tick_strings(&[
            "▰▱▱▱▱",
            "▰▰▱▱▱",
            "▰▰▰▱▱",
            "▰▰▰▰▱",
            "▰▰▰▰▰",
        ]));
    }
    pb.set_message(message.to_string());
    pb
}
