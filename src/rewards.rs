//! Reward tiers and token accrual.
//!
//! A tier is a closed dB band with an hourly token rate. Lookup is a linear
//! scan where the first matching band wins; readings between bands (30.5 with
//! the default table) earn nothing.

use crate::error::{DbucksError, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A dB band mapped to a token rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardTier {
    pub name: String,
    /// Inclusive lower bound.
    pub min_db: f64,
    /// Inclusive upper bound.
    pub max_db: f64,
    pub tokens_per_hour: f64,
    #[serde(default)]
    pub description: String,
}

impl RewardTier {
    pub fn new(name: &str, min_db: f64, max_db: f64, tokens_per_hour: f64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            min_db,
            max_db,
            tokens_per_hour,
            description: description.to_string(),
        }
    }

    /// True when `db` lies within `[min_db, max_db]`.
    pub fn contains(&self, db: f64) -> bool {
        self.min_db <= db && db <= self.max_db
    }
}

/// The built-in tier table, quietest first.
pub fn default_tiers() -> Vec<RewardTier> {
    vec![
        RewardTier::new(
            "Library Mode",
            0.0,
            30.0,
            50.0,
            "Perfect for deep focus and meditation. Earn tokens in quiet environments.",
        ),
        RewardTier::new(
            "Study Hall",
            31.0,
            50.0,
            75.0,
            "Ideal for focused learning and reading. Moderate background noise.",
        ),
        RewardTier::new(
            "Classroom",
            51.0,
            70.0,
            100.0,
            "Active learning environment with discussions and collaboration.",
        ),
        RewardTier::new(
            "Workshop",
            71.0,
            90.0,
            150.0,
            "High-energy environment for practical learning and group work.",
        ),
    ]
}

/// First tier whose band contains `db`, or `None` when not earning.
///
/// NaN matches nothing.
pub fn find_tier(db: f64, tiers: &[RewardTier]) -> Option<&RewardTier> {
    tiers.iter().find(|tier| tier.contains(db))
}

/// Reject tables that would make lookup ambiguous.
///
/// Every band must have `min_db <= max_db`, a finite non-negative rate, and
/// must not intersect any other band.
pub fn validate_tiers(tiers: &[RewardTier]) -> Result<()> {
    let invalid = |message: String| DbucksError::ConfigInvalidValue {
        key: "rewards.tiers".to_string(),
        message,
    };

    for tier in tiers {
        if !(tier.min_db <= tier.max_db) {
            return Err(invalid(format!(
                "tier '{}' has min_db {} above max_db {}",
                tier.name, tier.min_db, tier.max_db
            )));
        }
        if !tier.tokens_per_hour.is_finite() || tier.tokens_per_hour < 0.0 {
            return Err(invalid(format!(
                "tier '{}' has invalid rate {}",
                tier.name, tier.tokens_per_hour
            )));
        }
    }

    for (i, a) in tiers.iter().enumerate() {
        for b in &tiers[i + 1..] {
            if a.min_db <= b.max_db && b.min_db <= a.max_db {
                return Err(invalid(format!(
                    "tiers '{}' and '{}' overlap",
                    a.name, b.name
                )));
            }
        }
    }

    Ok(())
}

/// Running token balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccrualState {
    /// Never decreases while tracking.
    pub total_tokens: f64,
    pub last_update: Instant,
}

impl AccrualState {
    pub fn new(now: Instant) -> Self {
        Self {
            total_tokens: 0.0,
            last_update: now,
        }
    }
}

/// Advance the balance to `now` at the rate of `tier`.
///
/// Without a tier only the timestamp moves. A `now` earlier than the last
/// update accrues nothing.
pub fn accrue(state: AccrualState, tier: Option<&RewardTier>, now: Instant) -> AccrualState {
    let elapsed = now.saturating_duration_since(state.last_update).as_secs_f64();
    let earned = tier.map_or(0.0, |t| t.tokens_per_hour / 3600.0 * elapsed);
    AccrualState {
        total_tokens: state.total_tokens + earned,
        last_update: now,
    }
}

/// Tracks the current tier and balance while reward tracking is on.
#[derive(Debug, Clone)]
pub struct RewardTracker {
    tiers: Vec<RewardTier>,
    accrual: Option<AccrualState>,
    total_tokens: f64,
    current_db: f64,
}

impl RewardTracker {
    pub fn new(tiers: Vec<RewardTier>) -> Self {
        Self {
            tiers,
            accrual: None,
            total_tokens: 0.0,
            current_db: 0.0,
        }
    }

    pub fn tiers(&self) -> &[RewardTier] {
        &self.tiers
    }

    /// Begin tracking; the accrual clock starts at `now`.
    ///
    /// The balance carries over from earlier tracking periods.
    pub fn start(&mut self, now: Instant) {
        if self.accrual.is_none() {
            self.accrual = Some(AccrualState {
                total_tokens: self.total_tokens,
                last_update: now,
            });
        }
    }

    /// Stop tracking. Time until the next `start` is not rewarded.
    pub fn stop(&mut self) {
        if let Some(state) = self.accrual.take() {
            self.total_tokens = state.total_tokens;
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.accrual.is_some()
    }

    /// Record the latest displayed level.
    pub fn set_level(&mut self, db: f64) {
        self.current_db = db;
    }

    pub fn current_tier(&self) -> Option<&RewardTier> {
        find_tier(self.current_db, &self.tiers)
    }

    /// Accrue up to `now` with the tier of the latest level.
    ///
    /// Call once per second while tracking.
    pub fn tick(&mut self, now: Instant) {
        if let Some(state) = self.accrual {
            let tier = find_tier(self.current_db, &self.tiers);
            let next = accrue(state, tier, now);
            self.total_tokens = next.total_tokens;
            self.accrual = Some(next);
        }
    }

    pub fn total_tokens(&self) -> f64 {
        self.total_tokens
    }
}

/// Whole tokens with thousands separators, e.g. `1,234`.
pub fn format_tokens(tokens: f64) -> String {
    let whole = tokens.max(0.0).floor() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
