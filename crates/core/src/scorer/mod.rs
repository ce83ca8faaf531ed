pub mod error;
pub mod http;

use serde::{Deserialize, Serialize};

/// Turns raw text into a sentiment score, roughly in [-2, 2].
///
/// Implementations are expensive to build and read-only per call: build one per sweep and share
/// it behind an `Arc` across ticker tasks.
#[async_trait::async_trait]
pub trait SentimentScorer: Send + Sync {
    fn scorer_name(&self) -> &'static str;

    async fn score(&self, text: &str) -> anyhow::Result<f64>;
}

/// Class probabilities of a three-way (positive/negative/neutral) classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dominant {
    Positive,
    Negative,
    Neutral,
}

impl ClassProbabilities {
    /// Highest class; ties go to the earlier of positive, negative, neutral.
    pub fn dominant(&self) -> Dominant {
        if self.positive >= self.negative && self.positive >= self.neutral {
            Dominant::Positive
        } else if self.negative >= self.neutral {
            Dominant::Negative
        } else {
            Dominant::Neutral
        }
    }

    pub fn sentiment_score(&self) -> f64 {
        let Self {
            positive: p,
            negative: n,
            neutral: u,
        } = *self;

        match self.dominant() {
            Dominant::Positive => p - n - u / 2.0,
            Dominant::Negative => -n + p + u / 2.0,
            Dominant::Neutral => (p - n) / 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probs(positive: f64, negative: f64, neutral: f64) -> ClassProbabilities {
        ClassProbabilities {
            positive,
            negative,
            neutral,
        }
    }

    #[test]
    fn dominant_positive() {
        let p = probs(0.8, 0.1, 0.1);
        assert_eq!(p.dominant(), Dominant::Positive);
        assert!((p.sentiment_score() - 0.65).abs() < 1e-12);
    }

    #[test]
    fn dominant_negative() {
        let p = probs(0.1, 0.7, 0.2);
        assert_eq!(p.dominant(), Dominant::Negative);
        assert!((p.sentiment_score() - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn dominant_neutral_is_halved_spread() {
        let p = probs(0.2, 0.1, 0.7);
        assert_eq!(p.dominant(), Dominant::Neutral);
        assert!((p.sentiment_score() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn ties_prefer_positive_then_negative() {
        assert_eq!(probs(0.4, 0.4, 0.2).dominant(), Dominant::Positive);
        assert_eq!(probs(0.2, 0.4, 0.4).dominant(), Dominant::Negative);
    }
}
