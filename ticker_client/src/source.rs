//! Base ticker list: filters and the sources that answer them.
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use ticker_common::tickers::TickerParser;
use ticker_common::{Result, SyncError, Ticker};

/// Dashboard filter applied to the ticker universe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerFilter {
    /// Exact exchange, case-insensitive.
    pub exchange: Option<String>,
    /// Symbol prefix or name substring, case-insensitive.
    pub query: Option<String>,
}

impl TickerFilter {
    pub fn matches(&self, ticker: &Ticker) -> bool {
        let exchange_ok = match &self.exchange {
            Some(wanted) => ticker
                .exchange
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(wanted.trim())),
            None => true,
        };
        let query_ok = match self.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => {
                let query = query.to_uppercase();
                ticker.symbol.as_str().starts_with(&query)
                    || ticker
                        .name
                        .as_deref()
                        .is_some_and(|n| n.to_uppercase().contains(&query))
            }
            _ => true,
        };
        exchange_ok && query_ok
    }
}

/// Something that returns the tickers matching a filter.
pub trait TickerSource {
    fn fetch(&self, filter: &TickerFilter) -> Result<Vec<Ticker>>;
}

impl<F> TickerSource for F
where
    F: Fn(&TickerFilter) -> Result<Vec<Ticker>>,
{
    fn fetch(&self, filter: &TickerFilter) -> Result<Vec<Ticker>> {
        self(filter)
    }
}

/// Reads the ticker universe from a file on every fetch, so edits to the file show
/// up on the next refetch.
pub struct FileTickerSource {
    path: PathBuf,
}

impl FileTickerSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TickerSource for FileTickerSource {
    fn fetch(&self, filter: &TickerFilter) -> Result<Vec<Ticker>> {
        let file = File::open(&self.path).map_err(|e| {
            SyncError::Format(format!("Failed to open {}: {}", self.path.display(), e))
        })?;
        let tickers = Ticker::parse_from_file(BufReader::new(file))?;
        Ok(tickers.into_iter().filter(|t| filter.matches(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Vec<Ticker> {
        [
            "AAPL,Apple Inc.,NASDAQ",
            "AMZN,Amazon.com Inc.,NASDAQ",
            "IBM,International Business Machines,NYSE",
            "SAP",
        ]
        .iter()
        .map(|line| line.parse().unwrap())
        .collect()
    }

    fn symbols(filter: &TickerFilter) -> Vec<String> {
        universe()
            .into_iter()
            .filter(|t| filter.matches(t))
            .map(|t| t.symbol.to_string())
            .collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(symbols(&TickerFilter::default()).len(), 4);
    }

    #[test]
    fn exchange_filter_is_case_insensitive_and_skips_unknown_exchange() {
        let filter = TickerFilter {
            exchange: Some("nasdaq".into()),
            query: None,
        };
        assert_eq!(symbols(&filter), vec!["AAPL", "AMZN"]);
    }

    #[test]
    fn query_matches_symbol_prefix_or_name() {
        let by_prefix = TickerFilter {
            exchange: None,
            query: Some("aa".into()),
        };
        assert_eq!(symbols(&by_prefix), vec!["AAPL"]);

        let by_name = TickerFilter {
            exchange: None,
            query: Some("business".into()),
        };
        assert_eq!(symbols(&by_name), vec!["IBM"]);
    }

    #[test]
    fn file_source_reports_missing_file() {
        let source = FileTickerSource::new("/nonexistent/tickers.txt");
        assert!(matches!(
            source.fetch(&TickerFilter::default()),
            Err(SyncError::Format(_))
        ));
    }
}
