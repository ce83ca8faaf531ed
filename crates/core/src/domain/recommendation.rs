use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTicker {
    pub ticker: String,
    pub weighted_average: f64,
}

/// Best and worst tickers of one ranking run. Rebuilt from scratch every time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub top_5_best: Vec<RankedTicker>,
    pub top_5_worst: Vec<RankedTicker>,
}
