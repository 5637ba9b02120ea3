//! Synthetic quotes.
//!
//! `QuoteGenerator` keeps the last quote of every symbol it has been asked about and
//! moves prices with a small random walk on each tick. A symbol's opening price is
//! picked at random the first time it is seen; `change` and `changePercent` are
//! measured against it.

use rand::Rng;
use std::collections::HashMap;
use ticker_common::{Symbol, TickerUpdate};

struct QuoteState {
    open: f64,
    price: f64,
    volume: u64,
}

#[derive(Default)]
pub struct QuoteGenerator {
    quotes: HashMap<Symbol, QuoteState>,
}

impl QuoteGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate the next synthetic price using a small random walk around `current_price`.
    ///
    /// The change is sampled uniformly from `[-1%, +1%)` and the result is clamped to
    /// a minimum positive value.
    pub fn next_price(current_price: f64) -> f64 {
        let mut rng = rand::rng();
        let change: f64 = rng.random_range(-0.01..0.01);
        let new_price = current_price * (1.0 + change);
        new_price.max(0.01)
    }

    /// Current quote of `symbol` without moving it.
    pub fn snapshot(&mut self, symbol: &Symbol) -> TickerUpdate {
        let state = self.state(symbol);
        to_update(symbol, state)
    }

    /// Moves `symbol` one tick and returns the new quote.
    pub fn tick(&mut self, symbol: &Symbol) -> TickerUpdate {
        let traded: u64 = rand::rng().random_range(100..5000);
        let state = self.state(symbol);
        state.price = Self::next_price(state.price);
        state.volume += traded;
        to_update(symbol, state)
    }

    fn state(&mut self, symbol: &Symbol) -> &mut QuoteState {
        self.quotes.entry(symbol.clone()).or_insert_with(|| {
            let open = round_cents(rand::rng().random_range(20.0..500.0));
            QuoteState {
                open,
                price: open,
                volume: 0,
            }
        })
    }
}

fn to_update(symbol: &Symbol, state: &QuoteState) -> TickerUpdate {
    let price = round_cents(state.price);
    let change = round_cents(price - state.open);
    TickerUpdate {
        symbol: symbol.to_string(),
        price: Some(price),
        change: Some(change),
        change_percent: Some(round_cents(change / state.open * 100.0)),
        volume: Some(state.volume),
        value: Some(round_cents(price * state.volume as f64)),
        ..Default::default()
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
