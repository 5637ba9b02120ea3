//! Merging push updates into the held ticker rows.
//!
//! Rows are held as `Arc<Ticker>`. Merging an update swaps in a new `Arc` for the
//! matching row(s) only, so every other row keeps its pointer identity and a
//! renderer can skip it.
use log::debug;
use std::sync::Arc;
use ticker_common::{Ticker, TickerUpdate};

/// Result of applying one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// At least one row changed.
    Applied,
    /// The symbol is held but the update carried no new values.
    Unchanged,
    /// No held row has this symbol; the update was dropped.
    UnknownSymbol,
    /// The update's symbol is not a valid symbol.
    Invalid,
}

/// Applies last-write-wins ticker updates by symbol.
pub struct UpdateMerger;

impl UpdateMerger {
    pub fn apply(rows: &mut [Arc<Ticker>], update: &TickerUpdate) -> MergeOutcome {
        let Some(symbol) = update.symbol() else {
            debug!("Dropping update with invalid symbol {:?}", update.symbol);
            return MergeOutcome::Invalid;
        };

        let mut outcome = MergeOutcome::UnknownSymbol;
        for row in rows.iter_mut().filter(|row| row.symbol == symbol) {
            let merged = row.merged(update);
            if merged == **row {
                if outcome == MergeOutcome::UnknownSymbol {
                    outcome = MergeOutcome::Unchanged;
                }
                continue;
            }
            *row = Arc::new(merged);
            outcome = MergeOutcome::Applied;
        }

        if outcome == MergeOutcome::UnknownSymbol {
            debug!("Dropping update for {symbol}: not in the held collection");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(symbols: &[&str]) -> Vec<Arc<Ticker>> {
        symbols
            .iter()
            .map(|s| Arc::new(s.parse::<Ticker>().unwrap()))
            .collect()
    }

    fn price_update(symbol: &str, price: f64) -> TickerUpdate {
        TickerUpdate {
            symbol: symbol.into(),
            price: Some(price),
            ..Default::default()
        }
    }

    #[test]
    fn only_matching_row_is_replaced() {
        let mut held = rows(&["AAA", "BBB", "CCC"]);
        let before = held.clone();

        let outcome = UpdateMerger::apply(&mut held, &price_update("bbb", 42.0));

        assert_eq!(outcome, MergeOutcome::Applied);
        assert!(Arc::ptr_eq(&held[0], &before[0]));
        assert!(!Arc::ptr_eq(&held[1], &before[1]));
        assert!(Arc::ptr_eq(&held[2], &before[2]));
        assert_eq!(held[1].price, Some(42.0));
        assert_eq!(before[1].price, None);
    }

    #[test]
    fn unknown_symbol_leaves_collection_untouched() {
        let mut held = rows(&["AAA"]);
        let before = held.clone();

        let outcome = UpdateMerger::apply(&mut held, &price_update("ZZZ", 1.0));

        assert_eq!(outcome, MergeOutcome::UnknownSymbol);
        assert_eq!(held.len(), 1);
        assert!(Arc::ptr_eq(&held[0], &before[0]));
    }

    #[test]
    fn repeated_values_keep_row_identity() {
        let mut held = rows(&["AAA"]);
        UpdateMerger::apply(&mut held, &price_update("AAA", 5.0));
        let before = Arc::clone(&held[0]);

        let outcome = UpdateMerger::apply(&mut held, &price_update("AAA", 5.0));

        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert!(Arc::ptr_eq(&held[0], &before));
    }

    #[test]
    fn last_applied_update_wins() {
        let mut held = rows(&["AAA"]);
        UpdateMerger::apply(&mut held, &price_update("AAA", 11.0));
        UpdateMerger::apply(&mut held, &price_update("AAA", 10.0));
        assert_eq!(held[0].price, Some(10.0));
    }

    #[test]
    fn invalid_symbol_is_dropped() {
        let mut held = rows(&["AAA"]);
        assert_eq!(
            UpdateMerger::apply(&mut held, &price_update(" ", 1.0)),
            MergeOutcome::Invalid
        );
    }
}
