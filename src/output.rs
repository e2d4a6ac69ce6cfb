//! Terminal rendering for the live meter and reports.

use crate::audio::analyze::AnalysisReport;
use crate::rewards::{RewardTier, format_tokens};
use crate::session::SessionSnapshot;
use std::io::{self, Write};

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Level bar spans 0 dB to this value.
const BAR_FULL_SCALE_DB: f64 = 100.0;
const BAR_WIDTH: usize = 30;

/// Clear the current terminal line.
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// Remaining time as `MM:SS`.
pub fn format_time(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// `"43.2 dB SPL"`, or `"--"` with no reading or silence.
pub fn format_level(db: Option<f64>) -> String {
    match db {
        Some(db) if db != 0.0 => format!("{:.1} dB SPL", db),
        _ => "--".to_string(),
    }
}

fn level_color(db: f64) -> &'static str {
    if db < 50.0 {
        GREEN
    } else if db < 70.0 {
        YELLOW
    } else {
        RED
    }
}

/// Horizontal bar for a reading, colored by loudness.
pub fn format_level_bar(db: Option<f64>) -> String {
    let db = db.unwrap_or(0.0).clamp(0.0, BAR_FULL_SCALE_DB);
    let filled = ((db / BAR_FULL_SCALE_DB) * BAR_WIDTH as f64).round() as usize;
    format!(
        "{}{}{}{DIM}{}{RESET}",
        level_color(db),
        "█".repeat(filled),
        RESET,
        "░".repeat(BAR_WIDTH - filled)
    )
}

/// One status line for a snapshot.
pub fn format_snapshot(snapshot: &SessionSnapshot) -> String {
    let mut line = format!(
        "{} {:>12}  {}  {}",
        format_level_bar(snapshot.db_level),
        format_level(snapshot.db_level),
        format_time(snapshot.remaining_time_seconds),
        snapshot.status
    );
    if snapshot.is_muted {
        line.push_str(&format!("  {YELLOW}microphone muted{RESET}"));
    }
    line
}

/// Current tier and balance.
pub fn format_reward_line(tier: Option<&RewardTier>, total_tokens: f64) -> String {
    match tier {
        Some(tier) => format!(
            "{} ({}/h)  balance {}",
            tier.name,
            tier.tokens_per_hour,
            format_tokens(total_tokens)
        ),
        None => format!(
            "{DIM}not earning{RESET}  balance {}",
            format_tokens(total_tokens)
        ),
    }
}

/// Redraw the live meter line on stderr.
pub fn render_snapshot(snapshot: &SessionSnapshot, reward: Option<&str>) {
    clear_line();
    match reward {
        Some(reward) => eprint!("{}  {}", format_snapshot(snapshot), reward),
        None => eprint!("{}", format_snapshot(snapshot)),
    }
    io::stderr().flush().unwrap_or(());
}

pub fn format_tier_table(tiers: &[RewardTier]) -> String {
    let mut out = String::new();
    for tier in tiers {
        out.push_str(&format!(
            "{:<14} {:>5.0}-{:<5.0} dB  {:>6} tokens/h",
            tier.name, tier.min_db, tier.max_db, tier.tokens_per_hour
        ));
        if !tier.description.is_empty() {
            out.push_str(&format!("  {DIM}{}{RESET}", tier.description));
        }
        out.push('\n');
    }
    out
}

pub fn format_analysis(report: &AnalysisReport) -> String {
    format!(
        "Duration:   {:.2}s ({} samples, {} Hz, {} ch)\n\
         RMS:        {:.6}\n\
         Raw level:  {:.1} dB SPL\n\
         Calibrated: {}\n",
        report.duration_secs,
        report.samples,
        report.sample_rate,
        report.channels,
        report.rms,
        report.raw_db,
        format_level(Some(report.calibrated_db)),
    )
}
