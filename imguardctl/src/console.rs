//! Human-facing output on stdout and stderr.

use std::path::Path;

use colored::{ColoredString, Colorize};
use imguard_core::{
    OutcomeReporter, RunSummary, TransformOutcome, report::status_and_details,
};

/// Prints one colored line per file to stdout, failures to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleReporter;

impl OutcomeReporter for ConsoleReporter {
    fn file_finished(
        &self,
        path: &Path,
        outcome: &TransformOutcome,
        dry_run: bool,
    ) {
        let line = render_line(path, outcome, dry_run);
        if matches!(outcome, TransformOutcome::Failed { .. }) {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

/// One report line, colored by outcome.
pub fn render_line(
    path: &Path,
    outcome: &TransformOutcome,
    dry_run: bool,
) -> ColoredString {
    let (status, details) = status_and_details(outcome);
    let prefix = if dry_run { "Dry run: " } else { "" };
    let text = format!("{prefix}{status} {} ({details})", path.display());
    match outcome {
        TransformOutcome::Compressed { .. } => text.green(),
        TransformOutcome::SkippedAlreadyOptimal { before, after }
            if after > before =>
        {
            text.blue()
        }
        TransformOutcome::SkippedAlreadyOptimal { .. } => text.normal(),
        TransformOutcome::Failed { .. } => text.red(),
        _ => text.yellow(),
    }
}

/// The extension list, before any work starts.
pub fn print_search_pattern(extensions: &[String]) {
    println!("(Search pattern: {})\n", extensions.join(", "));
}

/// The closing line, in bold.
pub fn print_summary(summary: &RunSummary) {
    if summary.is_empty_run() {
        println!("{}", summary.message().bold());
    } else {
        println!("\n{}", summary.message().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_carries_dry_run_prefix_and_path() {
        colored::control::set_override(false);
        let outcome = TransformOutcome::Compressed {
            before: 4096,
            after: 1024,
        };
        let line = render_line(Path::new("img/a.png"), &outcome, true);
        assert_eq!(
            line.to_string(),
            "Dry run: Compressed img/a.png (4.00 KB → 1.00 KB)"
        );

        let skipped = render_line(
            Path::new("b.gif"),
            &TransformOutcome::SkippedCorrupt {
                reason: "bad header".into(),
            },
            false,
        );
        assert_eq!(skipped.to_string(), "Skipped b.gif (corrupt file)");
    }
}
