//! Terminal progress over the dates of a run.

use indicatif::{ProgressBar, ProgressStyle};
use wacollect_probav::{DateOutcome, DateReport};

/// Bar counting finished dates.
pub fn date_progress_bar(len: u64, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template(
        "{msg} ({pos}/{len})\n[{bar:40.cyan/blue}] {percent}% • {elapsed_precise} (ETA: {eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-");
    ProgressBar::new(len)
        .with_message("Collecting dates")
        .with_style(style)
}

/// Advance `bar` for one finished date.
pub fn record(bar: &ProgressBar, report: &DateReport) {
    if let DateOutcome::Failed { failures, .. } = &report.outcome {
        let bands: Vec<&str> = failures.iter().map(|f| f.band.as_str()).collect();
        bar.println(format!("{}: failed {}", report.date, bands.join(",")));
    }
    bar.inc(1);
}
