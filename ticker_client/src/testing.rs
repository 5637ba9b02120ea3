//! In-memory push channel for unit tests.
use crate::reconciler::MembershipReconciler;
use crate::session::{Completion, PushChannel};
use crate::symbol_set::SymbolSet;
use std::sync::Mutex;
use ticker_common::{HubMethod, Result, Symbol, SyncError};

pub(crate) type Call = (u64, HubMethod, Symbol);

struct FakeState {
    connected: bool,
    epoch: u64,
    calls: Vec<Call>,
    outstanding: Vec<Call>,
}

/// Records invocations; completions are produced on demand by the test.
pub(crate) struct FakeChannel {
    state: Mutex<FakeState>,
}

impl FakeChannel {
    pub(crate) fn connected(epoch: u64) -> Self {
        Self {
            state: Mutex::new(FakeState {
                connected: true,
                epoch,
                calls: Vec::new(),
                outstanding: Vec::new(),
            }),
        }
    }

    pub(crate) fn drop_connection(&self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.outstanding.clear();
    }

    pub(crate) fn reconnect(&self, epoch: u64) {
        let mut state = self.state.lock().unwrap();
        state.connected = true;
        state.epoch = epoch;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Invocations dispatched but not yet completed.
    pub(crate) fn outstanding(&self) -> Vec<Call> {
        self.state.lock().unwrap().outstanding.clone()
    }

    pub(crate) fn success(&self, method: HubMethod, symbol: &str) -> Completion {
        self.completion(method, symbol, Ok(()))
    }

    pub(crate) fn failure(&self, method: HubMethod, symbol: &str) -> Completion {
        self.completion(method, symbol, Err("rejected".into()))
    }

    fn completion(
        &self,
        method: HubMethod,
        symbol: &str,
        outcome: std::result::Result<(), String>,
    ) -> Completion {
        let symbol = sym(symbol);
        let mut state = self.state.lock().unwrap();
        state
            .outstanding
            .retain(|(_, m, s)| !(*m == method && *s == symbol));
        Completion {
            epoch: state.epoch,
            method,
            symbol,
            outcome,
        }
    }

    /// Takes every outstanding invocation, leaving it for the caller to complete.
    pub(crate) fn take_outstanding(&self) -> Vec<Completion> {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.outstanding)
            .into_iter()
            .map(|(epoch, method, symbol)| Completion {
                epoch,
                method,
                symbol,
                outcome: Ok(()),
            })
            .collect()
    }

    /// Puts back invocations taken with `take_outstanding` that the test did not
    /// complete.
    pub(crate) fn restore_outstanding(&self, completions: Vec<Completion>) {
        let mut state = self.state.lock().unwrap();
        state.outstanding.extend(
            completions
                .into_iter()
                .map(|c| (c.epoch, c.method, c.symbol)),
        );
    }

    /// Completes outstanding invocations successfully, including any issued by
    /// follow-up passes, until none remain.
    pub(crate) fn complete_all(&self, reconciler: &mut MembershipReconciler) {
        loop {
            let batch = self.take_outstanding();
            if batch.is_empty() {
                break;
            }
            for completion in batch {
                reconciler.on_completion(self, completion);
            }
        }
    }
}

impl PushChannel for FakeChannel {
    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn epoch(&self) -> u64 {
        self.state.lock().unwrap().epoch
    }

    fn invoke(&self, epoch: u64, method: HubMethod, symbol: &Symbol) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(SyncError::NotConnected);
        }
        if state.epoch != epoch {
            return Err(SyncError::StaleEpoch {
                requested: epoch,
                current: state.epoch,
            });
        }
        let call = (epoch, method, symbol.clone());
        state.calls.push(call.clone());
        state.outstanding.push(call);
        Ok(())
    }
}

pub(crate) fn sym(symbol: &str) -> Symbol {
    Symbol::new(symbol).unwrap()
}

pub(crate) fn set(symbols: &[&str]) -> SymbolSet {
    let symbols: Vec<Symbol> = symbols.iter().map(|s| sym(s)).collect();
    SymbolSet::from_symbols(&symbols)
}
