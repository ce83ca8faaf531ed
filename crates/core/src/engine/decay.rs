/// Oldest age (in whole days) that still carries weight.
pub const MAX_WEIGHTED_AGE_DAYS: i64 = 6;

const DAILY_DECAY: f64 = 0.15;

/// Recency weight: `1 - 0.15 * age` for ages 0..=6, otherwise 0 (future-dated or too old).
pub fn decay_weight(age_days: i64) -> f64 {
    if (0..=MAX_WEIGHTED_AGE_DAYS).contains(&age_days) {
        1.0 - DAILY_DECAY * age_days as f64
    } else {
        0.0
    }
}
