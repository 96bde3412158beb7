use chrono::{DateTime, Utc};

use crate::models::{ActionKind, Content, SourceRef};

/// Word count beyond this contributes nothing to the base score.
const WORD_COUNT_CAP: u32 = 5000;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Ranking weights. Configuration, not fixed law.
#[derive(Debug, Clone, Copy)]
pub struct ScoreFactors {
    /// Days until a score halves.
    pub half_life_days: f64,
    pub voteup_weight: f64,
    pub comment_weight: f64,
    pub word_count_weight: f64,
    /// Source bonus when a tracked user authored the content.
    pub create_bonus: f64,
    /// Source bonus when a tracked user liked the content.
    pub like_bonus: f64,
    /// Extra bonus per additional recommending user beyond the first.
    pub multi_source_bonus: f64,
}

impl Default for ScoreFactors {
    fn default() -> Self {
        Self {
            half_life_days: 7.0,
            voteup_weight: 1.0,
            comment_weight: 0.5,
            word_count_weight: 0.01,
            create_bonus: 1.5,
            like_bonus: 1.0,
            multi_source_bonus: 0.2,
        }
    }
}

/// Pure ranking function: engagement base, source multiplier, exponential
/// half-life decay. Deterministic for a given evaluation time, rounded to
/// two decimals.
pub struct ScoreCalculator {
    factors: ScoreFactors,
}

impl ScoreCalculator {
    pub fn new() -> Self {
        Self {
            factors: ScoreFactors::default(),
        }
    }

    pub fn with_factors(factors: ScoreFactors) -> Self {
        Self { factors }
    }

    pub fn score(&self, content: &Content, sources: &[SourceRef], now: DateTime<Utc>) -> f64 {
        let f = &self.factors;

        let base = f64::from(content.voteup_count) * f.voteup_weight
            + f64::from(content.comment_count) * f.comment_weight
            + f64::from(content.word_count.min(WORD_COUNT_CAP)) * f.word_count_weight;

        let mut multiplier: f64 = sources
            .iter()
            .map(|source| match source.action_kind {
                ActionKind::Create => f.create_bonus,
                ActionKind::Like => f.like_bonus,
            })
            .sum();
        if sources.len() > 1 {
            multiplier += (sources.len() - 1) as f64 * f.multi_source_bonus;
        }
        // Content with no recorded source still scores.
        multiplier = multiplier.max(1.0);

        let age_days = (now.timestamp() - content.created_time) as f64 / SECONDS_PER_DAY;
        let decay = 0.5f64.powf(age_days / f.half_life_days);

        round2(base * multiplier * decay)
    }
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
