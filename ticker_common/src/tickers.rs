//! Ticker symbols, quote snapshots and helpers shared between hub and client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use crate::error::SyncError;

/// Trait providing file parsing for tickers.
pub trait TickerParser {
    /// Parses tickers from a buffered reader.
    ///
    /// Each non-empty line that does not start with `#` is parsed as a single
    /// `Ticker` value using `FromStr`. Returns an error if any line cannot be parsed.
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Ticker>, SyncError>;
}

impl TickerParser for Ticker {
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Self>, SyncError> {
        let mut tickers = Vec::new();

        for (number, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(SyncError::Io)?;
            let trimmed_line = line.trim();
            if trimmed_line.is_empty() || trimmed_line.starts_with('#') {
                continue;
            }

            match trimmed_line.parse::<Self>() {
                Ok(ticker) => tickers.push(ticker),
                Err(e) => {
                    return Err(SyncError::ParseTickersFile(format!(
                        "line {}: {}",
                        number + 1,
                        e
                    )));
                }
            }
        }
        Ok(tickers)
    }
}

/// Canonical ticker symbol: trimmed and upper-cased.
///
/// Two symbols that differ only in case or surrounding whitespace compare equal
/// once constructed, so every map keyed by `Symbol` is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Canonicalizes `raw` into a symbol.
    pub fn new(raw: &str) -> Result<Self, SyncError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed
                .chars()
                .any(|c| c == ',' || c.is_whitespace() || c.is_control())
        {
            return Err(SyncError::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// Upper-cased symbol text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Latest quote snapshot for a single instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    /// Canonical symbol; the row identity.
    pub symbol: Symbol,
    /// Instrument display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Listing exchange (e.g. `NASDAQ`).
    #[serde(default)]
    pub exchange: Option<String>,
    /// Last traded price.
    #[serde(default)]
    pub price: Option<f64>,
    /// Absolute change against the previous close.
    #[serde(default)]
    pub change: Option<f64>,
    /// Relative change against the previous close, in percent.
    #[serde(default)]
    pub change_percent: Option<f64>,
    /// Traded volume for the session.
    #[serde(default)]
    pub volume: Option<u64>,
    /// Traded value for the session.
    #[serde(default)]
    pub value: Option<f64>,
}

impl Ticker {
    /// Creates a ticker with metadata only and no quote fields yet.
    pub fn new(symbol: Symbol, name: Option<String>, exchange: Option<String>) -> Self {
        Self {
            symbol,
            name,
            exchange,
            price: None,
            change: None,
            change_percent: None,
            volume: None,
            value: None,
        }
    }

    /// Returns a copy of this ticker with every field present in `update` applied.
    ///
    /// Fields absent from the update keep their current value.
    pub fn merged(&self, update: &TickerUpdate) -> Ticker {
        Ticker {
            symbol: self.symbol.clone(),
            name: update.name.clone().or_else(|| self.name.clone()),
            exchange: update.exchange.clone().or_else(|| self.exchange.clone()),
            price: update.price.or(self.price),
            change: update.change.or(self.change),
            change_percent: update.change_percent.or(self.change_percent),
            volume: update.volume.or(self.volume),
            value: update.value.or(self.value),
        }
    }
}

/// Parses `SYMBOL[,NAME[,EXCHANGE]]`.
impl FromStr for Ticker {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ',').map(str::trim);
        let symbol = Symbol::new(parts.next().unwrap_or_default())?;
        let non_empty = |part: Option<&str>| part.filter(|p| !p.is_empty()).map(String::from);
        let name = non_empty(parts.next());
        let exchange = non_empty(parts.next());
        Ok(Ticker::new(symbol, name, exchange))
    }
}

/// Full or partial ticker snapshot delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerUpdate {
    /// Symbol the update refers to, in any case.
    pub symbol: String,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl TickerUpdate {
    /// Canonical symbol of the update, if the raw text is a valid symbol.
    pub fn symbol(&self) -> Option<Symbol> {
        Symbol::new(&self.symbol).ok()
    }
}
