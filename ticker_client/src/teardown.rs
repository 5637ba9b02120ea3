//! Leaving every group when the consuming view goes away.
use crate::reconciler::{MembershipReconciler, MembershipState};
use crate::session::PushChannel;
use log::{info, warn};
use ticker_common::{HubMethod, Symbol};

/// What a teardown did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Symbols a leave was dispatched for.
    pub left: Vec<Symbol>,
    /// Symbols whose leave could not be dispatched.
    pub failed: Vec<Symbol>,
}

pub struct TeardownCoordinator;

impl TeardownCoordinator {
    /// Issues a best-effort `LeaveTickerGroup` for every `Joined` or `Joining`
    /// symbol and clears all tracked state.
    ///
    /// Nothing is issued when the connection is already gone, since the hub dropped
    /// the memberships with it. Failures are logged, never returned. Completions for
    /// these leaves arrive after the reconciler has detached from the epoch and are
    /// ignored.
    pub fn teardown<C>(reconciler: &mut MembershipReconciler, channel: &C) -> TeardownReport
    where
        C: PushChannel + ?Sized,
    {
        let (epoch, tracked) = reconciler.drain();
        let mut report = TeardownReport::default();
        let Some(epoch) = epoch else {
            return report;
        };
        if !channel.is_connected() {
            return report;
        }

        for (symbol, state) in tracked {
            if !matches!(state, MembershipState::Joined | MembershipState::Joining) {
                continue;
            }
            match channel.invoke(epoch, HubMethod::LeaveTickerGroup, &symbol) {
                Ok(()) => report.left.push(symbol),
                Err(e) => {
                    warn!("Teardown leave {symbol} failed: {e}");
                    report.failed.push(symbol);
                }
            }
        }
        info!(
            "Teardown left {} group(s), {} failed",
            report.left.len(),
            report.failed.len()
        );
        report
    }
}
