//! Common display utilities for CLI commands.

use colored::Colorize;

const MAX_DISPLAY_ITEMS: usize = 10;

/// Print skipped-line warnings from a snapshot load.
pub fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    eprintln!(
        "{}: skipped {} snapshot line(s)",
        "warning".yellow().bold(),
        warnings.len()
    );
    for warning in warnings.iter().take(MAX_DISPLAY_ITEMS) {
        eprintln!("    {} {warning}", "•".dimmed());
    }
    if warnings.len() > MAX_DISPLAY_ITEMS {
        eprintln!("    {} ... and {} more", "•".dimmed(), warnings.len() - MAX_DISPLAY_ITEMS);
    }
}

/// Print a bulleted list with truncation.
///
/// Shows up to `MAX_DISPLAY_ITEMS` items. If there are more, shows
/// "... and N more". If empty, shows `empty_message`.
pub fn print_list<T: std::fmt::Display>(items: &[T], empty_message: &str) {
    if items.is_empty() {
        println!("    {}", empty_message.dimmed());
        return;
    }

    for item in items.iter().take(MAX_DISPLAY_ITEMS) {
        println!("    {} {item}", "•".dimmed());
    }

    if items.len() > MAX_DISPLAY_ITEMS {
        println!(
            "    {} ... and {} more",
            "•".dimmed(),
            items.len() - MAX_DISPLAY_ITEMS
        );
    }
}

/// Display a cycle as `a → b → a`.
pub fn format_cycle(labels: &[String]) -> String {
    let mut path = labels.join(" → ");
    if let Some(first) = labels.first() {
        path.push_str(" → ");
        path.push_str(first);
    }
    path
}

/// Rank as a percentage with one decimal.
pub fn format_rank(rank: f64) -> String {
    format!("{:.1}%", rank * 100.0)
}
