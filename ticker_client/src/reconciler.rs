//! Group membership reconciliation.
//!
//! `MembershipReconciler` keeps the hub's group memberships for this connection in
//! line with the desired `SymbolSet`. Each symbol moves through
//!
//! ```text
//! Unjoined -> Joining -> Joined -> Leaving -> (removed)
//!               |                     |
//!               +-- join failed ------+--> (removed)
//! ```
//!
//! `Unjoined` is never stored: a symbol absent from the map is unjoined.
//!
//! A pass is synchronous. It decides every join and leave first, marks the symbols
//! `Joining`/`Leaving`, and only then dispatches the invocations. A symbol with an
//! operation in flight is never picked again: a symbol still `Joining` that is no
//! longer wanted is left once its join completes, and a symbol still `Leaving` that
//! is wanted again is rejoined once its leave completes.
//!
//! Memberships belong to one connection epoch. Leaving `Connected` clears them
//! without any leave calls, and completions from an earlier epoch are ignored.
use crate::session::{Completion, PushChannel};
use crate::symbol_set::SymbolSet;
use log::{debug, info, warn};
use std::collections::HashMap;
use strum_macros::Display;
use ticker_common::{HubMethod, Symbol};

/// Membership of this connection in one symbol's update group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MembershipState {
    Unjoined,
    Joining,
    Joined,
    Leaving,
}

/// Invocations dispatched by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePass {
    pub joined: Vec<Symbol>,
    pub left: Vec<Symbol>,
}

impl ReconcilePass {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MembershipReconciler {
    memberships: HashMap<Symbol, MembershipState>,
    desired: SymbolSet,
    /// Epoch of the live connection, `None` while not connected.
    epoch: Option<u64>,
}

impl MembershipReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_of(&self, symbol: &Symbol) -> MembershipState {
        self.memberships
            .get(symbol)
            .copied()
            .unwrap_or(MembershipState::Unjoined)
    }

    /// Tracked symbols with their state, sorted by symbol.
    pub fn tracked(&self) -> Vec<(Symbol, MembershipState)> {
        let mut tracked: Vec<_> = self
            .memberships
            .iter()
            .map(|(symbol, state)| (symbol.clone(), *state))
            .collect();
        tracked.sort_by(|a, b| a.0.cmp(&b.0));
        tracked
    }

    pub fn desired(&self) -> &SymbolSet {
        &self.desired
    }

    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    /// Whether a pass over `desired` would dispatch anything right now.
    ///
    /// True after a failed join left a wanted symbol untracked, which lets a refresh
    /// that did not change the symbol set still retry it.
    pub fn needs_pass(&self, desired: &SymbolSet) -> bool {
        self.epoch.is_some()
            && (desired.iter().any(|s| !self.memberships.contains_key(s))
                || self
                    .memberships
                    .iter()
                    .any(|(s, st)| *st == MembershipState::Joined && !desired.contains(s)))
    }

    /// Replaces the desired set and reconciles against it.
    pub fn set_desired<C>(&mut self, channel: &C, desired: SymbolSet) -> ReconcilePass
    where
        C: PushChannel + ?Sized,
    {
        debug!("Desired symbol set is now [{}]", desired.key());
        self.desired = desired;
        self.reconcile(channel)
    }

    /// Starts tracking a fresh connection epoch and joins every desired symbol.
    pub fn on_connected<C>(&mut self, channel: &C, epoch: u64) -> ReconcilePass
    where
        C: PushChannel + ?Sized,
    {
        if self.epoch.is_some_and(|current| current >= epoch) {
            debug!("Ignoring stale connect notification for epoch {epoch}");
            return ReconcilePass::default();
        }
        self.memberships.clear();
        self.epoch = Some(epoch);
        info!(
            "Connection epoch {epoch} started, joining {} symbol(s)",
            self.desired.len()
        );
        self.reconcile(channel)
    }

    /// Forgets every membership of `epoch` without issuing leaves; the hub has
    /// already dropped them along with the connection.
    pub fn on_disconnected(&mut self, epoch: u64) {
        match self.epoch {
            Some(current) if current > epoch => {
                debug!("Ignoring stale disconnect notification for epoch {epoch}");
                return;
            }
            None if self.memberships.is_empty() => return,
            _ => {}
        }
        if !self.memberships.is_empty() {
            info!(
                "Connection epoch {epoch} ended, dropping {} membership(s)",
                self.memberships.len()
            );
        }
        self.memberships.clear();
        self.epoch = None;
    }

    /// One reconciliation pass against the current desired set.
    pub fn reconcile<C>(&mut self, channel: &C) -> ReconcilePass
    where
        C: PushChannel + ?Sized,
    {
        let Some(epoch) = self.epoch else {
            return ReconcilePass::default();
        };

        let to_join: Vec<Symbol> = self
            .desired
            .iter()
            .filter(|s| !self.memberships.contains_key(*s))
            .cloned()
            .collect();
        let mut to_leave: Vec<Symbol> = self
            .memberships
            .iter()
            .filter(|(s, st)| **st == MembershipState::Joined && !self.desired.contains(s))
            .map(|(s, _)| s.clone())
            .collect();
        to_leave.sort();

        for symbol in &to_join {
            self.memberships
                .insert(symbol.clone(), MembershipState::Joining);
        }
        for symbol in &to_leave {
            self.memberships
                .insert(symbol.clone(), MembershipState::Leaving);
        }

        let mut pass = ReconcilePass::default();
        for symbol in to_join {
            match channel.invoke(epoch, HubMethod::JoinTickerGroup, &symbol) {
                Ok(()) => pass.joined.push(symbol),
                Err(e) => {
                    debug!("Join {symbol} not dispatched: {e}");
                    self.memberships.remove(&symbol);
                }
            }
        }
        for symbol in to_leave {
            match channel.invoke(epoch, HubMethod::LeaveTickerGroup, &symbol) {
                Ok(()) => pass.left.push(symbol),
                Err(e) => {
                    debug!("Leave {symbol} not dispatched: {e}");
                    self.memberships.remove(&symbol);
                }
            }
        }
        pass
    }

    /// Applies the outcome of an earlier join or leave.
    ///
    /// Runs a follow-up pass when the completed symbol has deferred work (wanted
    /// again after a leave, or unwanted after a join). A failed join does not
    /// trigger a pass, so a persistently failing join is not hammered.
    pub fn on_completion<C>(&mut self, channel: &C, completion: Completion) -> ReconcilePass
    where
        C: PushChannel + ?Sized,
    {
        let Completion {
            epoch,
            method,
            symbol,
            outcome,
        } = completion;

        if self.epoch != Some(epoch) || !channel.is_connected() {
            debug!("Ignoring {method}({symbol}) completion from stale epoch {epoch}");
            return ReconcilePass::default();
        }

        match (method, self.state_of(&symbol), outcome) {
            (HubMethod::JoinTickerGroup, MembershipState::Joining, Ok(())) => {
                debug!("Joined {symbol}");
                self.memberships.insert(symbol.clone(), MembershipState::Joined);
                if !self.desired.contains(&symbol) {
                    return self.reconcile(channel);
                }
            }
            (HubMethod::JoinTickerGroup, MembershipState::Joining, Err(reason)) => {
                warn!("Join {symbol} failed, will retry on next pass: {reason}");
                self.memberships.remove(&symbol);
            }
            (HubMethod::LeaveTickerGroup, MembershipState::Leaving, outcome) => {
                if let Err(reason) = outcome {
                    debug!("Leave {symbol} failed, ignoring: {reason}");
                } else {
                    debug!("Left {symbol}");
                }
                self.memberships.remove(&symbol);
                if self.desired.contains(&symbol) {
                    return self.reconcile(channel);
                }
            }
            (method, state, _) => {
                debug!("Unexpected {method}({symbol}) completion while {state}");
            }
        }
        ReconcilePass::default()
    }

    /// Takes every tracked membership and detaches from the current epoch.
    ///
    /// Returns the epoch the memberships belonged to, if connected.
    pub(crate) fn drain(&mut self) -> (Option<u64>, Vec<(Symbol, MembershipState)>) {
        let tracked = self.tracked();
        self.memberships.clear();
        self.desired = SymbolSet::default();
        (self.epoch.take(), tracked)
    }
}
