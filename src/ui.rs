use colored::Colorize;
use ingestion::{AuditEvent, RunReport, RunSummary};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Run Output
// ============================================================================

/// Print the summary of a finished run followed by its failures.
pub fn print_report(report: &RunReport) {
    print_summary(&report.summary);

    let failures: Vec<&AuditEvent> = report.failures().collect();
    if !failures.is_empty() {
        section("Failed entities");
        for event in failures {
            let reason = event
                .failure
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            println!("  {} {}", "✗".red(), event.key());
            dim(&reason);
        }
    }

    if !report.summary.discovery_errors.is_empty() {
        section("Discovery errors");
        for message in &report.summary.discovery_errors {
            println!("  {} {}", "✗".red(), message);
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    match (summary.is_success(), summary.dry_run) {
        (true, true) => {
            println!("  {} Dry run finished, nothing was written", "✓".green().bold());
        }
        (true, false) => println!("  {} Ingestion finished successfully", "✓".green().bold()),
        (false, _) => println!("  {} Ingestion finished with errors", "⚠".yellow().bold()),
    }

    let counts = [
        ("created", summary.created),
        ("updated", summary.updated),
        ("would be written", summary.previewed),
        ("skipped", summary.skipped),
        ("failed", summary.failed),
    ];
    for (label, count) in counts {
        if count > 0 {
            println!("    • {count} entities {label}");
        }
    }
    if summary.blocked > 0 {
        println!("      ({} never attempted: missing dependency)", summary.blocked);
    }

    dim(&format!(
        "{} entities, {} attempted, {:.2}s",
        summary.total,
        summary.attempted,
        summary.elapsed.as_secs_f64()
    ));
    if let Some(path) = &summary.audit_log {
        dim(&format!("audit log: {}", path.display()));
    }
}
