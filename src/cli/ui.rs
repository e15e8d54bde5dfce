use std::io::stdout;
use std::time::Duration;

use colored::Colorize;
use crossterm::{
    execute,
    style::{Color as CtColor, Print, ResetColor, SetForegroundColor},
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::core::builder::BuildOutcome;
use crate::core::manifest::Status;
use crate::core::verify::VerifyReport;
use crate::error::SnapError;

fn colorize() -> bool {
    colored::control::SHOULD_COLORIZE.should_colorize()
}

fn print_line(color: CtColor, prefix: &str, message: &str) {
    if colorize() {
        let _ = execute!(
            stdout(),
            SetForegroundColor(color),
            Print(prefix),
            Print(message),
            Print("\n"),
            ResetColor
        );
    } else {
        println!("{}{}", prefix, message);
    }
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
pub fn print_error(error: &SnapError) {
    print_line(CtColor::Red, "❌ ", &error.to_string());
}

pub fn print_error_message(message: &str) {
    print_line(CtColor::Red, "❌ ", message);
}

/// Print info message
pub fn print_info(message: &str) {
    print_line(CtColor::Blue, "ℹ️  ", message);
}

/// Create a progress bar with a specific style
pub fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(80));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {wide_msg}") {
        pb.set_style(style.tick_strings(&[
            "▰▱▱▱▱",
            "▰▰▱▱▱",
            "▰▰▰▱▱",
            "▰▰▰▰▱",
            "▰▰▰▰▰",
            "▰▰▰▰▰",
        ]));
    }
    pb.set_message(message.to_string());
    pb
}

pub fn print_build_summary(outcome: &BuildOutcome) {
    print_success(&format!(
        "Published snapshot {} ({} files, {} chunks, {} bytes)",
        outcome.snapshot_id.bold(),
        outcome.status.files,
        outcome.status.chunks,
        outcome.status.bytes
    ));

    for warning in &outcome.warnings {
        print_warning(warning);
    }

    if outcome.is_partial() {
        print_warning(&format!(
            "{} file(s) could not be read and were skipped:",
            outcome.skipped.len()
        ));
        for skipped in &outcome.skipped {
            println!("    {} {}", skipped.path.yellow(), format!("({})", skipped.reason).dimmed());
        }
    }

    if !outcome.pruned.is_empty() {
        print_info(&format!("Removed {} old snapshot(s)", outcome.pruned.len()));
    }
}

pub fn print_verify_report(report: &VerifyReport) {
    for failure in &report.failures {
        print_error_message(&failure.to_string());
    }

    let summary = format!(
        "Checked {} of {} chunks in {}",
        report.sampled,
        report.total_chunks,
        report.site.display()
    );
    if report.passed() {
        print_success(&format!("Signature valid. {}: all match", summary));
    } else {
        print_error_message(&format!(
            "Signature valid. {}: {} failed",
            summary,
            report.failures.len().to_string().red()
        ));
    }
}

pub fn print_status(status: &Status, snapshot: Option<&str>) {
    if let Some(id) = snapshot {
        println!("{} {}", "Snapshot:".bold(), id.cyan());
    }
    println!("{} {}", "Built at:".bold(), status.built_at.to_rfc3339());
    println!("{}    {}", "Files:".bold(), status.files);
    println!("{}   {}", "Chunks:".bold(), status.chunks);
    println!("{}    {}", "Bytes:".bold(), status.bytes);
}

