//! Symbol group memberships.
//!
//! A group is the set of connections that receive updates for one symbol. The
//! registry is indexed both ways so that dropping a connection forgets all of its
//! memberships at once.

use super::ConnectionId;
use std::collections::{BTreeMap, HashMap, HashSet};
use ticker_common::Symbol;

#[derive(Debug, Default)]
pub struct GroupRegistry {
    members: BTreeMap<Symbol, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<Symbol>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `conn` to the group of `symbol`. Returns `false` if it was already a member.
    pub fn join(&mut self, conn: ConnectionId, symbol: Symbol) -> bool {
        let added = self
            .members
            .entry(symbol.clone())
            .or_default()
            .insert(conn);
        self.by_connection.entry(conn).or_default().insert(symbol);
        added
    }

    /// Removes `conn` from the group of `symbol`. Returns `false` if it was not a member.
    pub fn leave(&mut self, conn: ConnectionId, symbol: &Symbol) -> bool {
        let removed = match self.members.get_mut(symbol) {
            Some(members) => {
                let removed = members.remove(&conn);
                if members.is_empty() {
                    self.members.remove(symbol);
                }
                removed
            }
            None => false,
        };
        if let Some(symbols) = self.by_connection.get_mut(&conn) {
            symbols.remove(symbol);
            if symbols.is_empty() {
                self.by_connection.remove(&conn);
            }
        }
        removed
    }

    /// Drops every membership of `conn` and returns the symbols it was in.
    pub fn remove_connection(&mut self, conn: ConnectionId) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .by_connection
            .remove(&conn)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        symbols.sort();
        for symbol in &symbols {
            if let Some(members) = self.members.get_mut(symbol) {
                members.remove(&conn);
                if members.is_empty() {
                    self.members.remove(symbol);
                }
            }
        }
        symbols
    }

    pub fn members(&self, symbol: &Symbol) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .members
            .get(symbol)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        members.sort_unstable();
        members
    }

    /// Symbols with at least one member, sorted.
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.members.keys().cloned().collect()
    }
}
