//! Output formatting utilities

use crate::sync::CompletionReport;
use std::time::Duration;

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    format_duration_secs(secs)
}

/// Format duration from seconds
pub fn format_duration_secs(secs: f64) -> String {
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining = secs - mins * 60.0;
        format!("{}m {:.0}s", mins as u64, remaining)
    } else {
        let hours = (secs / 3600.0).floor();
        let remaining = secs - hours * 3600.0;
        let mins = (remaining / 60.0).floor();
        format!("{}h {}m", hours as u64, mins as u64)
    }
}

/// Format transfer rate in human-readable format
pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", human_bytes::human_bytes(bytes_per_sec))
}

/// Format percentage
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Format the summary of a finished synchronization
pub fn format_report(target: &str, report: &CompletionReport) -> String {
    let mut lines = Vec::new();

    lines.push(format!("=== {} ===", target));
    lines.push(String::new());

    if report.full_download {
        lines.push("No usable local data, fetched the whole file".to_string());
    } else {
        lines.push(format!(
            "Blocks matched:    {}/{} ({})",
            report.blocks_found,
            report.blocks_total,
            format_percent(report.percent_complete())
        ));
    }

    lines.push(format!("Used local:        {}", format_size(report.bytes_local)));
    lines.push(format!(
        "Fetched:           {} in {} request(s)",
        format_size(report.bytes_fetched),
        report.range_requests
    ));
    if report.recipe_bytes > 0 {
        lines.push(format!("Recipe:            {}", format_size(report.recipe_bytes)));
    }
    lines.push(format!("Really downloaded: {}", format_size(report.bytes_received)));

    if let Some(overhead) = report.overhead_percent() {
        lines.push(format!("Overhead:          {}", format_percent(overhead)));
    }
    if report.bytes_local > 0 {
        lines.push(format!(
            "Bandwidth saved:   {}",
            format_percent(report.savings_percent())
        ));
    }

    lines.push(String::new());
    lines.push(format!("Duration:          {}", format_duration(report.elapsed)));
    let secs = report.elapsed.as_secs_f64();
    if secs > 0.0 && report.bytes_received > 0 {
        lines.push(format!(
            "Transfer rate:     {}",
            format_rate(report.bytes_received as f64 / secs)
        ));
    }
    if let Some(backup) = &report.backup {
        lines.push(format!("Previous version:  {}", backup.display()));
    }
    lines.push("Checksum verified OK".to_string());

    lines.join("\n")
}

/// Print the summary of a finished synchronization to stdout
pub fn print_report(target: &str, report: &CompletionReport) {
    println!("{}", format_report(target, report));
}
