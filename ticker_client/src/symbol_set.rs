//! Canonical symbol sets derived from ticker lists.
//!
//! Price ticks rewrite ticker fields but never the set of symbols, so membership
//! work is gated on the *set*: `SymbolSetTracker::observe` reports a new
//! `SymbolSet` only when its key differs from the last one seen.
use std::collections::BTreeSet;
use ticker_common::{Symbol, Ticker};

/// Sorted, deduplicated set of canonical symbols plus its comma-joined key.
///
/// Equality is structural: two sets built from lists with the same symbols, in any
/// order, with any duplicates or casing, compare equal and share a key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SymbolSet {
    symbols: BTreeSet<Symbol>,
    key: String,
}

impl SymbolSet {
    pub fn from_symbols<'a, I>(symbols: I) -> Self
    where
        I: IntoIterator<Item = &'a Symbol>,
    {
        let symbols: BTreeSet<Symbol> = symbols.into_iter().cloned().collect();
        let key = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        Self { symbols, key }
    }

    pub fn from_tickers<'a, I>(tickers: I) -> Self
    where
        I: IntoIterator<Item = &'a Ticker>,
    {
        Self::from_symbols(tickers.into_iter().map(|t| &t.symbol))
    }

    /// Comma-joined, sorted symbols; empty for an empty set.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }

    /// Symbols in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Remembers the last observed symbol set.
#[derive(Debug, Default)]
pub struct SymbolSetTracker {
    current: SymbolSet,
}

impl SymbolSetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes the set for `tickers`. Returns the new set only when it differs
    /// from the previous observation.
    pub fn observe<'a, I>(&mut self, tickers: I) -> Option<&SymbolSet>
    where
        I: IntoIterator<Item = &'a Ticker>,
    {
        let next = SymbolSet::from_tickers(tickers);
        if next == self.current {
            return None;
        }
        self.current = next;
        Some(&self.current)
    }

    pub fn current(&self) -> &SymbolSet {
        &self.current
    }
}
