//! In-memory content store.
//!
//! Caches published responses and answers requests that match them. Entries
//! with a freshness period live in a collection sorted by the time they go
//! stale; entries without one are kept forever. Stale entries are evicted
//! lazily: a cleanup pass runs on `add` and `lookup`, but only once the clock
//! has passed the next cleanup deadline.

use std::sync::Arc;
use std::time::Duration;

use chronosync_core::{
    deadline_after, ChannelId, ChildSelector, Clock, Component, Request, Response, Transport,
};

use crate::pending::PendingRequestTable;

/// Called when a lookup finds no matching entry.
pub type NotFoundHandler = Box<dyn FnMut(&Request) + Send>;

/// Default interval between cleanup passes.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_millis(1_000);

struct StaleTimeContent {
    response: Response,
    /// Unix ms at which the response goes stale.
    stale_at: i64,
}

/// Cache of signed responses keyed by name.
pub struct ContentStore {
    /// Sorted ascending on `stale_at`.
    stale_time: Vec<StaleTimeContent>,
    no_stale_time: Vec<Response>,
    cleanup_interval: Duration,
    next_cleanup: i64,
    clock: Arc<dyn Clock>,
    on_not_found: Option<NotFoundHandler>,
}

impl ContentStore {
    /// Create an empty store. The first cleanup is due one interval from now.
    pub fn new(clock: Arc<dyn Clock>, cleanup_interval: Duration) -> Self {
        let next_cleanup = deadline_after(clock.now_millis(), cleanup_interval);
        Self {
            stale_time: Vec::new(),
            no_stale_time: Vec::new(),
            cleanup_interval,
            next_cleanup,
            clock,
            on_not_found: None,
        }
    }

    /// Install the handler run when a lookup finds nothing.
    pub fn set_on_not_found(&mut self, handler: NotFoundHandler) {
        self.on_not_found = Some(handler);
    }

    /// Add a response.
    pub fn add(&mut self, response: Response) {
        self.cleanup();

        match response.freshness {
            Some(freshness) => {
                let stale_at = deadline_after(self.clock.now_millis(), freshness);
                let at = self.stale_time.partition_point(|c| c.stale_at < stale_at);
                self.stale_time
                    .insert(at, StaleTimeContent { response, stale_at });
            }
            None => self.no_stale_time.push(response),
        }
    }

    /// Evict stale entries if the cleanup deadline has passed.
    pub fn cleanup(&mut self) {
        let now = self.clock.now_millis();
        if now < self.next_cleanup {
            return;
        }

        // Sorted on stale_at, so the stale entries form a prefix.
        let stale = self.stale_time.partition_point(|c| c.stale_at <= now);
        if stale > 0 {
            self.stale_time.drain(..stale);
            tracing::debug!(evicted = stale, "content store cleanup");
        }
        self.next_cleanup = deadline_after(now, self.cleanup_interval);
    }

    /// Find the response that answers `request`.
    ///
    /// Without a child selector the first match wins, scanning the
    /// freshness-bounded entries before the permanent ones. With a selector,
    /// every match is ranked on the component right after the request name
    /// and the leftmost or rightmost one wins; ties keep the first found.
    /// When nothing matches, the not-found handler runs.
    pub fn lookup(&mut self, request: &Request) -> Option<Response> {
        self.cleanup();

        let now = self.clock.now_millis();
        let found = {
            let candidates = self
                .stale_time
                .iter()
                .filter(|c| c.stale_at > now)
                .map(|c| &c.response)
                .chain(self.no_stale_time.iter())
                .filter(|r| request.matches_name(&r.name));

            match request.child_selector {
                None => candidates.cloned().next(),
                Some(selector) => {
                    let mut selected: Option<(Component, &Response)> = None;
                    for response in candidates {
                        let component = request
                            .child_component(&response.name)
                            .cloned()
                            .unwrap_or_default();
                        let better = match &selected {
                            None => true,
                            Some((best, _)) => match selector {
                                ChildSelector::Leftmost => component < *best,
                                ChildSelector::Rightmost => component > *best,
                            },
                        };
                        if better {
                            selected = Some((component, response));
                        }
                    }
                    selected.map(|(_, r)| r.clone())
                }
            }
        };

        if found.is_none() {
            if let Some(handler) = self.on_not_found.as_mut() {
                handler(request);
            }
        }
        found
    }

    /// Look up `request` and send the match on `channel`.
    ///
    /// Returns whether a match was found. A failed send is logged only.
    pub fn answer<T: Transport + ?Sized>(
        &mut self,
        request: &Request,
        channel: ChannelId,
        transport: &mut T,
    ) -> bool {
        match self.lookup(request) {
            Some(response) => {
                if let Err(e) = transport.send(channel, &response) {
                    tracing::warn!(name = %response.name, %channel, "send from content store failed: {}", e);
                }
                true
            }
            None => false,
        }
    }

    /// Deliver a freshly added response to every pending request it matches.
    ///
    /// Expired records are dropped, matching records are removed after one
    /// delivery. Returns how many records were satisfied.
    pub fn satisfy_pending<T: Transport + ?Sized>(
        &self,
        pending: &mut PendingRequestTable,
        response: &Response,
        transport: &mut T,
    ) -> usize {
        let satisfied = pending.take_matching(&response.name, self.clock.now_millis());
        for record in &satisfied {
            if let Err(e) = transport.send(record.channel, response) {
                tracing::warn!(name = %response.name, channel = %record.channel, "send to pending request failed: {}", e);
            }
        }
        satisfied.len()
    }

    /// Number of cached responses, stale or not.
    pub fn len(&self) -> usize {
        self.stale_time.len() + self.no_stale_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("stale_time", &self.stale_time.len())
            .field("no_stale_time", &self.no_stale_time.len())
            .field("next_cleanup", &self.next_cleanup)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronosync_core::{ManualClock, Name, TransportError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<(ChannelId, Response)>,
        fail: bool,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, channel: ChannelId, response: &Response) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::ChannelClosed(channel.0));
            }
            self.sent.push((channel, response.clone()));
            Ok(())
        }
    }

    fn store() -> (ContentStore, ManualClock) {
        let clock = ManualClock::new(0);
        let store = ContentStore::new(Arc::new(clock.clone()), DEFAULT_CLEANUP_INTERVAL);
        (store, clock)
    }

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn test_rightmost_selector_picks_largest_child() {
        let (mut store, _) = store();
        store.add(Response::new(name("/app/a"), &b"A"[..]));
        store.add(Response::new(name("/app/c"), &b"C"[..]));
        store.add(Response::new(name("/app/b"), &b"B"[..]));

        let request = Request::new(name("/app")).with_child_selector(ChildSelector::Rightmost);
        assert_eq!(store.lookup(&request).unwrap().payload.as_ref(), b"C");

        let request = Request::new(name("/app")).with_child_selector(ChildSelector::Leftmost);
        assert_eq!(store.lookup(&request).unwrap().payload.as_ref(), b"A");
    }

    #[test]
    fn test_selector_uses_canonical_component_order() {
        let (mut store, _) = store();
        store.add(Response::new(name("/app/zz"), &b"long"[..]));
        store.add(Response::new(name("/app/z"), &b"short"[..]));

        // "zz" is longer and therefore greater than "z".
        let request = Request::new(name("/app")).with_child_selector(ChildSelector::Rightmost);
        assert_eq!(store.lookup(&request).unwrap().payload.as_ref(), b"long");
    }

    #[test]
    fn test_selector_ties_keep_first_found() {
        let (mut store, _) = store();
        store.add(Response::new(name("/app/a/1"), &b"first"[..]));
        store.add(Response::new(name("/app/a/2"), &b"second"[..]));

        let request = Request::new(name("/app")).with_child_selector(ChildSelector::Rightmost);
        assert_eq!(store.lookup(&request).unwrap().payload.as_ref(), b"first");
    }

    #[test]
    fn test_exact_name_match_counts_as_empty_child() {
        let (mut store, _) = store();
        store.add(Response::new(name("/app"), &b"self"[..]));
        store.add(Response::new(name("/app/x"), &b"child"[..]));

        let request = Request::new(name("/app")).with_child_selector(ChildSelector::Leftmost);
        assert_eq!(store.lookup(&request).unwrap().payload.as_ref(), b"self");
    }

    #[test]
    fn test_no_selector_prefers_fresh_collection() {
        let (mut store, _) = store();
        store.add(Response::new(name("/app/permanent"), &b"p"[..]));
        store.add(
            Response::new(name("/app/fresh"), &b"f"[..]).with_freshness(Duration::from_secs(10)),
        );

        let request = Request::new(name("/app"));
        assert_eq!(store.lookup(&request).unwrap().payload.as_ref(), b"f");
    }

    #[test]
    fn test_freshness_window() {
        let (mut store, clock) = store();
        clock.set(5_000);
        store.add(Response::new(name("/d/1"), &b"x"[..]).with_freshness(Duration::from_millis(500)));

        let request = Request::new(name("/d/1"));
        clock.set(5_499);
        assert!(store.lookup(&request).is_some());

        clock.set(5_500);
        assert!(store.lookup(&request).is_none());

        // Cleanup has run by now and evicted the entry.
        clock.set(10_000);
        store.cleanup();
        assert!(store.is_empty());
    }

    #[test]
    fn test_cleanup_waits_for_deadline() {
        let (mut store, clock) = store();
        store.add(Response::new(name("/d/1"), &b"x"[..]).with_freshness(Duration::from_millis(10)));

        clock.set(500);
        store.cleanup();
        // Stale but not yet evicted: the first pass is due at 1000.
        assert_eq!(store.len(), 1);

        clock.set(1_000);
        store.cleanup();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_cleanup_trims_only_stale_prefix() {
        let (mut store, clock) = store();
        store.add(Response::new(name("/d/late"), &b"l"[..]).with_freshness(Duration::from_secs(60)));
        store.add(Response::new(name("/d/early"), &b"e"[..]).with_freshness(Duration::from_millis(10)));
        store.add(Response::new(name("/d/forever"), &b"f"[..]));

        clock.set(2_000);
        store.cleanup();
        assert_eq!(store.len(), 2);
        assert!(store.lookup(&Request::new(name("/d/late"))).is_some());
        assert!(store.lookup(&Request::new(name("/d/forever"))).is_some());
    }

    #[test]
    fn test_not_found_handler_runs_on_miss() {
        let (mut store, _) = store();
        let misses = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&misses);
        store.set_on_not_found(Box::new(move |request| {
            sink.lock().unwrap().push(request.name.clone());
        }));

        store.add(Response::new(name("/app/a"), &b"A"[..]));
        assert!(store.lookup(&Request::new(name("/app/a"))).is_some());
        assert!(store.lookup(&Request::new(name("/app/b"))).is_none());

        assert_eq!(*misses.lock().unwrap(), vec![name("/app/b")]);
    }

    #[test]
    fn test_answer_sends_on_channel() {
        let (mut store, _) = store();
        let mut transport = RecordingTransport::default();
        store.add(Response::new(name("/app/a"), &b"A"[..]));

        assert!(store.answer(&Request::new(name("/app")), ChannelId(4), &mut transport));
        assert!(!store.answer(&Request::new(name("/other")), ChannelId(4), &mut transport));
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(transport.sent[0].0, ChannelId(4));
    }

    #[test]
    fn test_satisfy_pending_delivers_once() {
        let (store, clock) = store();
        let mut pending = PendingRequestTable::new();
        let mut transport = RecordingTransport::default();
        let lifetime = Duration::from_secs(4);

        pending.insert(Request::new(name("/sync/r1")).with_lifetime(lifetime), ChannelId(1), 0);
        pending.insert(Request::new(name("/sync/r1")).with_lifetime(lifetime), ChannelId(2), 0);
        pending.insert(Request::new(name("/sync/r2")).with_lifetime(lifetime), ChannelId(3), 0);

        clock.set(100);
        let response = Response::new(name("/sync/r1"), &b"batch"[..]);
        assert_eq!(store.satisfy_pending(&mut pending, &response, &mut transport), 2);
        assert_eq!(store.satisfy_pending(&mut pending, &response, &mut transport), 0);

        let channels: Vec<_> = transport.sent.iter().map(|(c, _)| *c).collect();
        assert_eq!(channels, vec![ChannelId(1), ChannelId(2)]);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_satisfy_pending_swallows_send_failure() {
        let (store, _) = store();
        let mut pending = PendingRequestTable::new();
        let mut transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };
        pending.insert(Request::new(name("/sync/r1")), ChannelId(1), 0);

        let response = Response::new(name("/sync/r1"), &b"batch"[..]);
        assert_eq!(store.satisfy_pending(&mut pending, &response, &mut transport), 1);
        assert!(pending.is_empty());
    }
}
