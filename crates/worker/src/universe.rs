use anyhow::Context;
use magnifier_core::domain::news::TickerEntry;
use magnifier_core::storage::{is_valid_ticker, normalize_ticker};
use std::collections::HashSet;
use std::path::Path;

/// Reads the ticker universe (`[{"ticker": .., "name": ..}, ..]`). Any failure here is fatal for
/// the cycle: there is nothing to iterate over.
pub fn load_universe(path: &Path) -> anyhow::Result<Vec<TickerEntry>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read ticker universe {}", path.display()))?;
    let entries = serde_json::from_slice::<Vec<TickerEntry>>(&bytes)
        .with_context(|| format!("ticker universe {} is not a list of tickers", path.display()))?;

    let universe = normalize_universe(entries);
    anyhow::ensure!(
        !universe.is_empty(),
        "ticker universe {} is empty",
        path.display()
    );
    Ok(universe)
}

/// Trims and uppercases symbols, drops blanks and invalid symbols, and keeps the first
/// occurrence of each ticker so that no ticker is ingested twice in one sweep.
pub fn normalize_universe(entries: Vec<TickerEntry>) -> Vec<TickerEntry> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(entries.len());

    for entry in entries {
        let ticker = normalize_ticker(&entry.ticker);
        if ticker.is_empty() {
            tracing::warn!(name = %entry.name, "universe entry without ticker; skipping");
            continue;
        }
        if !is_valid_ticker(&ticker) {
            tracing::warn!(%ticker, "universe entry is not a valid ticker symbol; skipping");
            continue;
        }
        if !seen.insert(ticker.clone()) {
            tracing::warn!(%ticker, "duplicate universe ticker; skipping");
            continue;
        }
        out.push(TickerEntry {
            ticker,
            name: entry.name.trim().to_string(),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ticker: &str, name: &str) -> TickerEntry {
        TickerEntry {
            ticker: ticker.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn normalizes_and_dedupes() {
        let out = normalize_universe(vec![
            entry(" aapl", "Apple"),
            entry("MSFT", "Microsoft "),
            entry("AAPL", "Apple again"),
            entry("  ", "Nameless"),
            entry("../etc", "Not a symbol"),
        ]);
        assert_eq!(out, vec![entry("AAPL", "Apple"), entry("MSFT", "Microsoft")]);
    }

    #[test]
    fn loads_stocklist_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stocklist.json");
        std::fs::write(
            &path,
            r#"[{"ticker": "AAPL", "name": "Apple Inc."}, {"ticker": "nvda", "name": "NVIDIA"}]"#,
        )
        .unwrap();

        let universe = load_universe(&path).unwrap();
        assert_eq!(universe.len(), 2);
        assert_eq!(universe[1].ticker, "NVDA");
    }

    #[test]
    fn missing_or_malformed_universe_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_universe(&dir.path().join("absent.json")).is_err());

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"ticker\": \"AAPL\"}").unwrap();
        assert!(load_universe(&path).is_err());

        std::fs::write(&path, "[]").unwrap();
        assert!(load_universe(&path).is_err());
    }
}
