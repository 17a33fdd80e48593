use std::fmt::Write;

use super::aggregate::Aggregate;
use crate::probe::Stats;

const RED: &str = "\x1b[0;31m";
const RESET: &str = "\x1b[0m";

/// One line per attempt, plus an indented detail line when the probe attached extra info.
pub fn format_line(target: &str, stats: &Stats, colored: bool) -> String {
    let outcome = match &stats.error {
        Some(err) if !stats.connected => format!("Failed({})", err.reason()),
        _ if !stats.connected => "Failed(unknown)".to_string(),
        _ => "connected".to_string(),
    };

    let mut line = format!(
        "Ping {target}({}) {outcome} - time={:.3?} dns={:.3?}",
        stats.address, stats.duration, stats.dns_duration
    );
    let meta = stats.format_meta();
    if !meta.is_empty() {
        line.push(' ');
        line.push_str(&meta);
    }
    if colored && !stats.connected {
        line = format!("{RED}{line}{RESET}");
    }

    if let Some(extra) = &stats.extra {
        let _ = write!(line, "\n {}", extra.to_string().trim());
    }
    line
}

pub fn format_summary(target: &str, agg: &Aggregate) -> String {
    format!(
        "\nPing statistics {target}\n\t{} probes sent.\n\t{} successful, {} failed.\nApproximate trip times:\n\tMinimum = {:.3?}, Maximum = {:.3?}, Average = {:.3?}",
        agg.total(),
        agg.succeeded(),
        agg.failed(),
        agg.minimum(),
        agg.maximum(),
        agg.average(),
    )
}
