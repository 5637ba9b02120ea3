//! Consumer-facing ticker feed.
//!
//! `TickerFeed` is the single owner of the held ticker rows and of the membership
//! reconciler. Everything that touches them runs on the feed's thread, one trigger
//! at a time:
//!
//! - a filter change or refetch reloads the base list, and a changed symbol set
//!   (or a wanted symbol left unjoined by a failed join) starts a reconciliation
//!   pass;
//! - connection state changes and invocation completions from the session go to
//!   the reconciler;
//! - ticker updates go through `UpdateMerger`;
//! - shutdown, or dropping the feed, runs the teardown.
//!
//! After each change the current [`FeedView`] is handed to the [`SnapshotSink`].
use crate::merger::{MergeOutcome, UpdateMerger};
use crate::reconciler::{MembershipReconciler, ReconcilePass};
use crate::session::{ConnectionState, PushChannel, SessionEvent, Subscription};
use crate::source::{TickerFilter, TickerSource};
use crate::symbol_set::SymbolSetTracker;
use crate::teardown::{TeardownCoordinator, TeardownReport};
use crossbeam_channel::{Receiver, select};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use ticker_common::{Symbol, Ticker, TickerUpdate};

/// Snapshot handed to the renderer.
#[derive(Debug, Clone, Default)]
pub struct FeedView {
    pub tickers: Vec<Arc<Ticker>>,
    pub is_loading: bool,
    /// Last fetch error, cleared by the next successful fetch.
    pub error: Option<String>,
}

/// Receives every new [`FeedView`].
pub trait SnapshotSink {
    fn publish(&mut self, view: &FeedView);
}

impl<F> SnapshotSink for F
where
    F: FnMut(&FeedView),
{
    fn publish(&mut self, view: &FeedView) {
        self(view)
    }
}

/// Requests accepted by [`TickerFeed::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum FeedCommand {
    SetFilter(TickerFilter),
    Refetch,
    Shutdown,
}

pub struct TickerFeed<S, C, K>
where
    S: TickerSource,
    C: PushChannel,
    K: SnapshotSink,
{
    source: S,
    channel: C,
    sink: K,
    filter: TickerFilter,
    view: FeedView,
    tracker: SymbolSetTracker,
    reconciler: MembershipReconciler,
    subscriptions: Vec<Subscription>,
    torn_down: bool,
}

impl<S, C, K> TickerFeed<S, C, K>
where
    S: TickerSource,
    C: PushChannel,
    K: SnapshotSink,
{
    /// Creates an empty feed. Call [`Self::refetch`] to load the first list.
    pub fn new(source: S, channel: C, sink: K, filter: TickerFilter) -> Self {
        let mut reconciler = MembershipReconciler::new();
        if channel.is_connected() {
            reconciler.on_connected(&channel, channel.epoch());
        }
        Self {
            source,
            channel,
            sink,
            filter,
            view: FeedView::default(),
            tracker: SymbolSetTracker::new(),
            reconciler,
            subscriptions: Vec::new(),
            torn_down: false,
        }
    }

    /// Keeps an event subscription alive until teardown.
    pub fn attach(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn view(&self) -> &FeedView {
        &self.view
    }

    pub fn filter(&self) -> &TickerFilter {
        &self.filter
    }

    pub fn reconciler(&self) -> &MembershipReconciler {
        &self.reconciler
    }

    pub fn set_filter(&mut self, filter: TickerFilter) {
        debug!("Filter changed to {filter:?}");
        self.filter = filter;
        self.refetch();
    }

    /// Reloads the base list for the current filter.
    ///
    /// Quote fields the source does not provide are carried over from the held row
    /// with the same symbol, and a row that ends up identical keeps its `Arc`.
    /// On failure the held rows stay and the error is exposed in the view.
    pub fn refetch(&mut self) {
        if self.torn_down {
            return;
        }
        self.view.is_loading = true;
        self.publish();

        match self.source.fetch(&self.filter) {
            Ok(fetched) => {
                info!("Fetched {} ticker(s)", fetched.len());
                let held: HashMap<Symbol, Arc<Ticker>> = self
                    .view
                    .tickers
                    .iter()
                    .map(|row| (row.symbol.clone(), Arc::clone(row)))
                    .collect();
                self.view.tickers = fetched
                    .into_iter()
                    .map(|ticker| match held.get(&ticker.symbol) {
                        Some(row) => carry_over(ticker, row),
                        None => Arc::new(ticker),
                    })
                    .collect();
                self.view.error = None;
            }
            Err(e) => {
                warn!("Ticker fetch failed: {e}");
                self.view.error = Some(e.to_string());
            }
        }

        self.view.is_loading = false;
        self.sync_memberships();
        self.publish();
    }

    /// Routes a session notification to the reconciler.
    pub fn handle_session_event(&mut self, event: SessionEvent) {
        if self.torn_down {
            return;
        }
        let pass = match event {
            SessionEvent::StateChanged {
                state: ConnectionState::Connected,
                epoch,
            } => self.reconciler.on_connected(&self.channel, epoch),
            SessionEvent::StateChanged { state, epoch } => {
                debug!("Push channel {state} (epoch {epoch})");
                self.reconciler.on_disconnected(epoch);
                return;
            }
            SessionEvent::Completed(completion) => {
                self.reconciler.on_completion(&self.channel, completion)
            }
        };
        log_pass(&pass);
    }

    /// Merges a pushed ticker update into the held rows.
    pub fn apply_update(&mut self, update: &TickerUpdate) -> MergeOutcome {
        let outcome = UpdateMerger::apply(&mut self.view.tickers, update);
        if outcome == MergeOutcome::Applied {
            self.publish();
        }
        outcome
    }

    /// Leaves every group and drops the event subscriptions. Only the first call
    /// does anything; afterwards the feed ignores refetches and session events.
    pub fn teardown(&mut self) -> TeardownReport {
        if self.torn_down {
            return TeardownReport::default();
        }
        self.torn_down = true;
        let report = TeardownCoordinator::teardown(&mut self.reconciler, &self.channel);
        self.subscriptions.clear();
        report
    }

    /// Processes commands, session events and updates until `Shutdown` or until any
    /// input channel closes, then tears down.
    pub fn run(
        mut self,
        commands: Receiver<FeedCommand>,
        session_events: Receiver<SessionEvent>,
        updates: Receiver<TickerUpdate>,
    ) -> TeardownReport {
        info!("Ticker feed running");
        loop {
            select! {
                recv(commands) -> command => match command {
                    Ok(FeedCommand::SetFilter(filter)) => self.set_filter(filter),
                    Ok(FeedCommand::Refetch) => self.refetch(),
                    Ok(FeedCommand::Shutdown) => break,
                    Err(_) => {
                        warn!("Feed command channel closed");
                        break;
                    }
                },
                recv(session_events) -> event => match event {
                    Ok(event) => self.handle_session_event(event),
                    Err(_) => {
                        warn!("Session event channel closed");
                        break;
                    }
                },
                recv(updates) -> update => match update {
                    Ok(update) => {
                        self.apply_update(&update);
                    }
                    Err(_) => {
                        warn!("Ticker update channel closed");
                        break;
                    }
                },
            }
        }
        info!("Ticker feed stopping...");
        self.teardown()
    }

    fn sync_memberships(&mut self) {
        let changed = self
            .tracker
            .observe(self.view.tickers.iter().map(Arc::as_ref))
            .cloned();
        let pass = match changed {
            Some(set) => {
                info!("Symbol set changed: [{}]", set.key());
                self.reconciler.set_desired(&self.channel, set)
            }
            None if self.reconciler.needs_pass(self.tracker.current()) => {
                self.reconciler.reconcile(&self.channel)
            }
            None => return,
        };
        log_pass(&pass);
    }

    fn publish(&mut self) {
        self.sink.publish(&self.view);
    }
}

impl<S, C, K> Drop for TickerFeed<S, C, K>
where
    S: TickerSource,
    C: PushChannel,
    K: SnapshotSink,
{
    fn drop(&mut self) {
        self.teardown();
    }
}

fn carry_over(fetched: Ticker, held: &Arc<Ticker>) -> Arc<Ticker> {
    let ticker = Ticker {
        name: fetched.name.or_else(|| held.name.clone()),
        exchange: fetched.exchange.or_else(|| held.exchange.clone()),
        price: fetched.price.or(held.price),
        change: fetched.change.or(held.change),
        change_percent: fetched.change_percent.or(held.change_percent),
        volume: fetched.volume.or(held.volume),
        value: fetched.value.or(held.value),
        symbol: fetched.symbol,
    };
    if ticker == **held {
        Arc::clone(held)
    } else {
        Arc::new(ticker)
    }
}

fn log_pass(pass: &ReconcilePass) {
    if !pass.is_empty() {
        debug!(
            "Reconciliation dispatched {} join(s), {} leave(s)",
            pass.joined.len(),
            pass.left.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::MembershipState;
    use crate::testing::{FakeChannel, sym};
    use crossbeam_channel::unbounded;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use ticker_common::{HubMethod, Result, SyncError};

    type Universe = Arc<Mutex<Result<Vec<Ticker>, String>>>;
    type Views = Arc<Mutex<Vec<FeedView>>>;
    type Feed = TickerFeed<
        Box<dyn Fn(&TickerFilter) -> Result<Vec<Ticker>>>,
        Arc<FakeChannel>,
        Box<dyn FnMut(&FeedView)>,
    >;

    struct Harness {
        feed: Feed,
        channel: Arc<FakeChannel>,
        universe: Universe,
        views: Views,
    }

    fn tickers(symbols: &[&str]) -> Vec<Ticker> {
        symbols.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn harness(initial: &[&str]) -> Harness {
        let channel = Arc::new(FakeChannel::connected(1));
        let universe: Universe = Arc::new(Mutex::new(Ok(tickers(initial))));
        let views: Views = Arc::new(Mutex::new(Vec::new()));

        let source_universe = Arc::clone(&universe);
        let source: Box<dyn Fn(&TickerFilter) -> Result<Vec<Ticker>>> =
            Box::new(move |_: &TickerFilter| {
                source_universe
                    .lock()
                    .unwrap()
                    .clone()
                    .map_err(SyncError::Format)
            });
        let sink_views = Arc::clone(&views);
        let sink: Box<dyn FnMut(&FeedView)> =
            Box::new(move |view: &FeedView| sink_views.lock().unwrap().push(view.clone()));

        let feed = TickerFeed::new(source, Arc::clone(&channel), sink, TickerFilter::default());
        Harness {
            feed,
            channel,
            universe,
            views,
        }
    }

    impl Harness {
        fn set_universe(&self, symbols: &[&str]) {
            *self.universe.lock().unwrap() = Ok(tickers(symbols));
        }

        /// Completes every outstanding invocation successfully, including follow-ups.
        fn settle(&mut self) {
            loop {
                let batch = self.channel.take_outstanding();
                if batch.is_empty() {
                    break;
                }
                for completion in batch {
                    self.feed
                        .handle_session_event(SessionEvent::Completed(completion));
                }
            }
        }

        fn state(&self, symbol: &str) -> MembershipState {
            self.feed.reconciler().state_of(&sym(symbol))
        }

        fn publishes(&self) -> usize {
            self.views.lock().unwrap().len()
        }
    }

    fn update(symbol: &str, price: f64) -> TickerUpdate {
        TickerUpdate {
            symbol: symbol.into(),
            price: Some(price),
            ..Default::default()
        }
    }

    #[test]
    fn initial_fetch_joins_every_symbol() {
        let mut h = harness(&["AAA", "BBB"]);
        h.feed.refetch();

        let mut joined: Vec<_> = h.channel.calls().into_iter().map(|(_, m, s)| (m, s)).collect();
        joined.sort_by(|a, b| a.1.cmp(&b.1));
        assert_eq!(
            joined,
            vec![
                (HubMethod::JoinTickerGroup, sym("AAA")),
                (HubMethod::JoinTickerGroup, sym("BBB")),
            ]
        );
        let last = h.views.lock().unwrap().last().cloned().unwrap();
        assert!(!last.is_loading);
        assert_eq!(last.tickers.len(), 2);
    }

    #[test]
    fn loading_flag_brackets_the_fetch() {
        let mut h = harness(&["AAA"]);
        h.feed.refetch();

        let views = h.views.lock().unwrap();
        assert_eq!(views.len(), 2);
        assert!(views[0].is_loading);
        assert!(!views[1].is_loading);
    }

    #[test]
    fn filter_change_leaves_and_joins_the_difference() {
        let mut h = harness(&["AAA", "BBB"]);
        h.feed.refetch();
        h.settle();
        h.channel.clear_calls();

        h.set_universe(&["BBB", "CCC"]);
        h.feed.set_filter(TickerFilter {
            exchange: None,
            query: Some("x".into()),
        });

        let calls = h.channel.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&(1, HubMethod::LeaveTickerGroup, sym("AAA"))));
        assert!(calls.contains(&(1, HubMethod::JoinTickerGroup, sym("CCC"))));
        assert!(calls.iter().all(|(_, _, s)| *s != sym("BBB")));
    }

    #[test]
    fn refetch_with_same_set_issues_nothing() {
        let mut h = harness(&["AAA", "BBB"]);
        h.feed.refetch();
        h.settle();
        h.channel.clear_calls();

        h.set_universe(&["bbb", "AAA", "aaa"]);
        h.feed.refetch();

        assert!(h.channel.calls().is_empty());
    }

    #[test]
    fn price_updates_never_touch_memberships() {
        let mut h = harness(&["AAA", "BBB"]);
        h.feed.refetch();
        h.settle();
        h.channel.clear_calls();

        for i in 0..10 {
            h.feed.apply_update(&update("AAA", 100.0 + i as f64));
        }

        assert!(h.channel.calls().is_empty());
        assert_eq!(h.feed.view().tickers[0].price, Some(109.0));
    }

    #[test]
    fn update_changes_only_its_row() {
        let mut h = harness(&["AAA", "BBB"]);
        h.feed.refetch();
        let before = h.feed.view().tickers.clone();

        let outcome = h.feed.apply_update(&update("bbb", 7.0));

        assert_eq!(outcome, MergeOutcome::Applied);
        let after = &h.feed.view().tickers;
        assert!(Arc::ptr_eq(&before[0], &after[0]));
        assert!(!Arc::ptr_eq(&before[1], &after[1]));
        assert_eq!(after[1].price, Some(7.0));
    }

    #[test]
    fn unknown_update_is_dropped_without_publishing() {
        let mut h = harness(&["AAA"]);
        h.feed.refetch();
        let published = h.publishes();
        let before = h.feed.view().tickers.clone();

        let outcome = h.feed.apply_update(&update("ZZZ", 1.0));

        assert_eq!(outcome, MergeOutcome::UnknownSymbol);
        assert_eq!(h.publishes(), published);
        assert_eq!(h.feed.view().tickers.len(), 1);
        assert!(Arc::ptr_eq(&before[0], &h.feed.view().tickers[0]));
    }

    #[test]
    fn refetch_carries_quotes_and_keeps_identity_of_unchanged_rows() {
        let mut h = harness(&["AAA", "BBB"]);
        h.feed.refetch();
        h.feed.apply_update(&update("AAA", 10.0));
        let before = h.feed.view().tickers.clone();

        h.feed.refetch();

        let after = &h.feed.view().tickers;
        assert_eq!(after[0].price, Some(10.0));
        assert!(Arc::ptr_eq(&before[0], &after[0]));
        assert!(Arc::ptr_eq(&before[1], &after[1]));
    }

    #[test]
    fn fetch_error_is_exposed_and_rows_are_kept() {
        let mut h = harness(&["AAA"]);
        h.feed.refetch();
        h.settle();
        h.channel.clear_calls();

        *h.universe.lock().unwrap() = Err("backend unavailable".into());
        h.feed.refetch();

        let view = h.feed.view();
        assert!(view.error.as_deref().unwrap().contains("backend unavailable"));
        assert_eq!(view.tickers.len(), 1);
        assert!(h.channel.calls().is_empty());

        h.set_universe(&["AAA"]);
        h.feed.refetch();
        assert_eq!(h.feed.view().error, None);
    }

    #[test]
    fn disconnect_clears_without_leaving_and_reconnect_rejoins() {
        let mut h = harness(&["AAA", "BBB"]);
        h.feed.refetch();
        h.settle();
        h.channel.clear_calls();

        h.channel.drop_connection();
        h.feed.handle_session_event(SessionEvent::StateChanged {
            state: ConnectionState::Disconnected,
            epoch: 1,
        });
        assert_eq!(h.state("AAA"), MembershipState::Unjoined);
        assert!(h.channel.calls().is_empty());

        h.channel.reconnect(2);
        h.feed.handle_session_event(SessionEvent::StateChanged {
            state: ConnectionState::Connected,
            epoch: 2,
        });

        let calls = h.channel.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&(2, HubMethod::JoinTickerGroup, sym("AAA"))));
        assert!(calls.contains(&(2, HubMethod::JoinTickerGroup, sym("BBB"))));
    }

    #[test]
    fn noop_refresh_retries_failed_join() {
        let mut h = harness(&["AAA"]);
        h.feed.refetch();
        let failed = h.channel.failure(HubMethod::JoinTickerGroup, "AAA");
        h.feed.handle_session_event(SessionEvent::Completed(failed));
        assert_eq!(h.state("AAA"), MembershipState::Unjoined);
        h.channel.clear_calls();

        h.feed.refetch();

        assert_eq!(
            h.channel.calls(),
            vec![(1, HubMethod::JoinTickerGroup, sym("AAA"))]
        );
    }

    #[test]
    fn teardown_leaves_joined_groups_once() {
        let mut h = harness(&["AAA", "BBB"]);
        h.feed.refetch();
        h.settle();
        h.channel.clear_calls();

        let report = h.feed.teardown();

        assert_eq!(report.left, vec![sym("AAA"), sym("BBB")]);
        assert!(h.feed.reconciler().tracked().is_empty());
        assert_eq!(h.feed.teardown(), TeardownReport::default());

        h.feed.handle_session_event(SessionEvent::StateChanged {
            state: ConnectionState::Connected,
            epoch: 2,
        });
        h.feed.refetch();
        assert_eq!(h.channel.calls().len(), 2);
    }

    #[test]
    fn dropping_the_feed_runs_teardown() {
        let mut h = harness(&["AAA"]);
        h.feed.refetch();
        h.settle();
        h.channel.clear_calls();
        let channel = Arc::clone(&h.channel);

        drop(h);

        assert_eq!(
            channel.calls(),
            vec![(1, HubMethod::LeaveTickerGroup, sym("AAA"))]
        );
    }

    #[test]
    fn run_loop_processes_commands_then_tears_down() {
        let h = harness(&["AAA", "BBB"]);
        let channel = Arc::clone(&h.channel);
        let (commands_tx, commands_rx) = unbounded();
        let (_events_tx, events_rx) = unbounded();
        let (_updates_tx, updates_rx) = unbounded();

        commands_tx.send(FeedCommand::Refetch).unwrap();
        commands_tx.send(FeedCommand::Shutdown).unwrap();
        let report = h.feed.run(commands_rx, events_rx, updates_rx);

        assert_eq!(report.left, vec![sym("AAA"), sym("BBB")]);
        let methods: Vec<_> = channel.calls().into_iter().map(|(_, m, _)| m).collect();
        assert_eq!(
            methods,
            vec![
                HubMethod::JoinTickerGroup,
                HubMethod::JoinTickerGroup,
                HubMethod::LeaveTickerGroup,
                HubMethod::LeaveTickerGroup,
            ]
        );
    }

    #[test]
    fn random_filter_churn_never_overlaps_operations_and_converges() {
        const UNIVERSE: [&str; 6] = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF"];
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut h = harness(&[]);
        h.feed.refetch();

        for _ in 0..500 {
            match rng.random_range(0..3) {
                0 => {
                    let subset: Vec<&str> = UNIVERSE
                        .iter()
                        .copied()
                        .filter(|_| rng.random_bool(0.5))
                        .collect();
                    h.set_universe(&subset);
                    h.feed.refetch();
                }
                _ => {
                    let mut outstanding = h.channel.take_outstanding();
                    if outstanding.is_empty() {
                        continue;
                    }
                    let mut picked = outstanding.swap_remove(rng.random_range(0..outstanding.len()));
                    if picked.method == HubMethod::JoinTickerGroup && rng.random_bool(0.2) {
                        picked.outcome = Err("rejected".into());
                    }
                    h.channel.restore_outstanding(outstanding);
                    h.feed
                        .handle_session_event(SessionEvent::Completed(picked));
                }
            }

            let outstanding = h.channel.outstanding();
            let distinct: HashSet<_> = outstanding.iter().map(|(_, _, s)| s.clone()).collect();
            assert_eq!(distinct.len(), outstanding.len(), "overlap in {outstanding:?}");
        }

        h.settle();
        h.feed.refetch();
        h.settle();

        let desired: Vec<Symbol> = h.feed.reconciler().desired().iter().cloned().collect();
        let tracked = h.feed.reconciler().tracked();
        assert_eq!(tracked.len(), desired.len());
        for (symbol, state) in tracked {
            assert!(desired.contains(&symbol));
            assert_eq!(state, MembershipState::Joined);
        }
    }
}
