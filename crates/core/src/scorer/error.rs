use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct ScorerDiagnosticsError {
    pub scorer: &'static str,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl fmt::Display for ScorerDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scorer error (scorer={}, stage={}): {}",
            self.scorer, self.stage, self.detail
        )
    }
}

impl std::error::Error for ScorerDiagnosticsError {}
