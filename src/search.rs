use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::api::{ApiError, CancelToken, Station};
use crate::config::SearchConfig;
use crate::data::StationService;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Clone)]
pub struct Options {
    pub debounce: Duration,
    pub min_query_len: usize,
    /// FIFO bound on the suggestion cache. `None` keeps every completed
    /// query for the session lifetime.
    pub cache_capacity: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            min_query_len: DEFAULT_MIN_QUERY_LEN,
            cache_capacity: None,
        }
    }
}

impl From<&SearchConfig> for Options {
    fn from(cfg: &SearchConfig) -> Self {
        Self {
            debounce: cfg.debounce,
            min_query_len: cfg.min_query_len,
            cache_capacity: cfg.cache_capacity,
        }
    }
}

/// Debounced, cancellable, cached incremental search over station
/// suggestions. At most one request is in flight at a time; a newer term
/// cancels the older request's token, so only the most recently scheduled
/// request can ever publish, regardless of response ordering.
pub struct Engine {
    service: Arc<dyn StationService>,
    opts: Options,
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    suggestions: RwLock<Vec<Station>>,
    loading: AtomicBool,
}

#[derive(Default)]
struct State {
    last_term: Option<String>,
    pending: Option<CancelToken>,
    cache: HashMap<String, Vec<Station>>,
    cache_order: VecDeque<String>,
}

impl Engine {
    pub fn new(service: Arc<dyn StationService>, opts: Options) -> Self {
        Self {
            service,
            opts,
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                suggestions: RwLock::new(Vec::new()),
                loading: AtomicBool::new(false),
            }),
        }
    }

    /// Snapshot of the last published suggestion list.
    pub fn suggestions(&self) -> Vec<Station> {
        self.shared.suggestions.read().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.loading.load(Ordering::SeqCst)
    }

    /// Fire-and-forget query. Redundant keystrokes (same term as the last
    /// submission) are dropped before any timer or network work.
    pub fn search(&self, term: &str) {
        let term = term.trim().to_string();
        let mut state = self.shared.state.lock();
        if state.last_term.as_deref() == Some(term.as_str()) {
            return;
        }
        if let Some(pending) = state.pending.take() {
            pending.cancel();
        }
        state.last_term = Some(term.clone());

        if term.chars().count() < self.opts.min_query_len {
            *self.shared.suggestions.write() = Vec::new();
            return;
        }

        if let Some(cached) = state.cache.get(&term).cloned() {
            *self.shared.suggestions.write() = cached;
            return;
        }

        let token = CancelToken::new();
        state.pending = Some(token.clone());
        drop(state);

        let service = Arc::clone(&self.service);
        let shared = Arc::clone(&self.shared);
        let debounce = self.opts.debounce;
        let capacity = self.opts.cache_capacity;
        thread::spawn(move || {
            // The token doubles as the debounce timer handle: a newer term
            // cancels it while we sleep and the request is never issued.
            thread::sleep(debounce);
            if token.is_cancelled() {
                return;
            }

            shared.loading.store(true, Ordering::SeqCst);
            let result = service.suggest(&term, &token);
            shared.loading.store(false, Ordering::SeqCst);

            // Token check and publish are atomic with respect to `search`,
            // so a superseded response can never land after its successor.
            let mut state = shared.state.lock();
            if token.is_cancelled() {
                return;
            }
            state.pending = None;
            match result {
                Ok(stations) => {
                    cache_insert(&mut state, capacity, term, stations.clone());
                    *shared.suggestions.write() = stations;
                }
                Err(ApiError::Cancelled) => {}
                Err(err) => {
                    log::debug!("suggestion fetch failed for {term:?}: {err}");
                    *shared.suggestions.write() = Vec::new();
                }
            }
        });
    }

    /// Blocking resolution for one-shot contexts such as CLI commands.
    /// Skips the debounce timer but shares the minimum-length rule and the
    /// suggestion cache with `search`. Failures collapse to an empty list.
    pub fn search_now(&self, term: &str) -> Vec<Station> {
        let term = term.trim().to_string();
        if term.chars().count() < self.opts.min_query_len {
            return Vec::new();
        }
        if let Some(cached) = self.shared.state.lock().cache.get(&term).cloned() {
            return cached;
        }

        let token = CancelToken::new();
        match self.service.suggest(&term, &token) {
            Ok(stations) => {
                let mut state = self.shared.state.lock();
                cache_insert(&mut state, self.opts.cache_capacity, term, stations.clone());
                stations
            }
            Err(err) => {
                log::warn!("station resolve failed for {term:?}: {err}");
                Vec::new()
            }
        }
    }

    /// Drops pending work and published suggestions.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        if let Some(pending) = state.pending.take() {
            pending.cancel();
        }
        state.last_term = None;
        *self.shared.suggestions.write() = Vec::new();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if let Some(pending) = state.pending.take() {
            pending.cancel();
        }
    }
}

fn cache_insert(state: &mut State, capacity: Option<usize>, term: String, stations: Vec<Station>) {
    if state.cache.contains_key(&term) {
        return;
    }
    if let Some(capacity) = capacity {
        while state.cache.len() >= capacity.max(1) {
            match state.cache_order.pop_front() {
                Some(oldest) => {
                    state.cache.remove(&oldest);
                }
                None => break,
            }
        }
    }
    state.cache_order.push_back(term.clone());
    state.cache.insert(term, stations);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::{Engine, Options};
    use crate::api::Station;
    use crate::config::SearchConfig;
    use crate::data::MockStationService;

    fn station(name: &str, code: i64) -> Station {
        Station {
            station: name.to_string(),
            code,
        }
    }

    fn fast_options() -> Options {
        Options {
            debounce: Duration::from_millis(20),
            min_query_len: 2,
            cache_capacity: None,
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn settle() {
        std::thread::sleep(Duration::from_millis(150));
    }

    #[test]
    fn short_terms_clear_without_network() {
        let service = Arc::new(MockStationService::default());
        service.respond_with("тверь", vec![station("ТВЕРЬ", 200092)]);
        let engine = Engine::new(service.clone(), fast_options());

        engine.search("тверь");
        wait_until(|| !engine.suggestions().is_empty());

        engine.search("т");
        assert!(engine.suggestions().is_empty());
        settle();
        assert_eq!(service.call_count(), 1, "short term must not hit the network");
    }

    #[test]
    fn duplicate_term_is_a_no_op() {
        let service = Arc::new(MockStationService::default());
        service.respond_with("мос", vec![station("МОСКВА ОКТ", 2006004)]);
        let engine = Engine::new(service.clone(), fast_options());

        engine.search("мос");
        engine.search("мос");
        wait_until(|| !engine.suggestions().is_empty());
        settle();
        assert_eq!(service.call_count(), 1);
    }

    #[test]
    fn completed_search_is_served_from_cache() {
        let service = Arc::new(MockStationService::default());
        service.respond_with("мос", vec![station("МОСКВА ОКТ", 2006004)]);
        service.respond_with("спб", vec![station("С-ПЕТЕРБУРГ", 2004001)]);
        let engine = Engine::new(service.clone(), fast_options());

        engine.search("мос");
        wait_until(|| !engine.suggestions().is_empty());
        engine.search("спб");
        wait_until(|| engine.suggestions() == vec![station("С-ПЕТЕРБУРГ", 2004001)]);

        engine.search("мос");
        // Cache hits publish synchronously.
        assert_eq!(engine.suggestions(), vec![station("МОСКВА ОКТ", 2006004)]);
        settle();
        let calls = service.calls.lock().clone();
        assert_eq!(calls.iter().filter(|c| c.as_str() == "мос").count(), 1);
    }

    #[test]
    fn newer_term_cancels_in_flight_request() {
        let service = Arc::new(MockStationService::default());
        service.respond_with("мос", vec![station("МОСКВА ОКТ", 2006004)]);
        service.respond_with("спб", vec![station("С-ПЕТЕРБУРГ", 2004001)]);
        *service.latency.lock() = Some(Duration::from_millis(120));
        let engine = Engine::new(service.clone(), fast_options());

        engine.search("мос");
        // Let the debounce fire so the first request is in flight.
        wait_until(|| service.call_count() == 1);
        engine.search("спб");

        wait_until(|| engine.suggestions() == vec![station("С-ПЕТЕРБУРГ", 2004001)]);
        settle();
        // The superseded response must never overwrite the newer one.
        assert_eq!(engine.suggestions(), vec![station("С-ПЕТЕРБУРГ", 2004001)]);
    }

    #[test]
    fn rapid_typing_coalesces_to_last_term() {
        let service = Arc::new(MockStationService::default());
        service.respond_with("мурм", vec![station("МУРМАНСК", 2004843)]);
        let engine = Engine::new(service.clone(), fast_options());

        engine.search("му");
        engine.search("мур");
        engine.search("мурм");
        wait_until(|| !engine.suggestions().is_empty());
        settle();
        assert_eq!(service.calls.lock().clone(), vec!["мурм".to_string()]);
    }

    #[test]
    fn failure_publishes_empty() {
        let service = Arc::new(MockStationService::default());
        service.fail.store(true, Ordering::SeqCst);
        let engine = Engine::new(service.clone(), fast_options());

        engine.search("мос");
        wait_until(|| service.call_count() == 1);
        settle();
        assert!(engine.suggestions().is_empty());
    }

    #[test]
    fn clear_cancels_pending_work() {
        let service = Arc::new(MockStationService::default());
        service.respond_with("мос", vec![station("МОСКВА ОКТ", 2006004)]);
        let engine = Engine::new(service.clone(), fast_options());

        engine.search("мос");
        engine.clear();
        settle();
        assert!(engine.suggestions().is_empty());
        assert_eq!(service.call_count(), 0, "cancelled timer must not fire");
    }

    #[test]
    fn options_follow_the_config_section() {
        let cfg = SearchConfig {
            debounce: Duration::from_millis(20),
            min_query_len: 3,
            cache_capacity: Some(1),
        };
        let opts = Options::from(&cfg);
        assert_eq!(opts.debounce, Duration::from_millis(20));
        assert_eq!(opts.min_query_len, 3);
        assert_eq!(opts.cache_capacity, Some(1));
    }

    #[test]
    fn config_driven_engine_honors_min_query_len() {
        let service = Arc::new(MockStationService::default());
        service.respond_with("мо", vec![station("МОСКВА ОКТ", 2006004)]);
        let cfg = SearchConfig {
            debounce: Duration::from_millis(20),
            min_query_len: 3,
            cache_capacity: None,
        };
        let engine = Engine::new(service.clone(), (&cfg).into());

        engine.search("мо");
        settle();
        assert!(engine.suggestions().is_empty());
        assert_eq!(service.call_count(), 0, "term below the configured minimum");

        engine.search("мос");
        settle();
        assert_eq!(service.call_count(), 1);
    }

    #[test]
    fn config_driven_engine_honors_cache_capacity() {
        let service = Arc::new(MockStationService::default());
        service.respond_with("мос", vec![station("МОСКВА ОКТ", 2006004)]);
        service.respond_with("спб", vec![station("С-ПЕТЕРБУРГ", 2004001)]);
        let cfg = SearchConfig {
            debounce: Duration::from_millis(20),
            min_query_len: 2,
            cache_capacity: Some(1),
        };
        let engine = Engine::new(service.clone(), (&cfg).into());

        engine.search("мос");
        wait_until(|| !engine.suggestions().is_empty());
        engine.search("спб");
        wait_until(|| engine.suggestions() == vec![station("С-ПЕТЕРБУРГ", 2004001)]);
        engine.search("мос");
        wait_until(|| engine.suggestions() == vec![station("МОСКВА ОКТ", 2006004)]);

        settle();
        let calls = service.calls.lock().clone();
        assert_eq!(
            calls.iter().filter(|c| c.as_str() == "мос").count(),
            2,
            "capacity of one must evict the first entry"
        );
    }

    #[test]
    fn direct_lookup_shares_rules_and_cache() {
        let service = Arc::new(MockStationService::default());
        service.respond_with("мос", vec![station("МОСКВА ОКТ", 2006004)]);
        let engine = Engine::new(service.clone(), fast_options());

        assert!(engine.search_now("м").is_empty());
        assert_eq!(service.call_count(), 0);

        let found = engine.search_now("мос");
        assert_eq!(found, vec![station("МОСКВА ОКТ", 2006004)]);
        assert_eq!(engine.search_now("мос"), found);
        assert_eq!(service.call_count(), 1, "second lookup must come from cache");
    }

    #[test]
    fn bounded_cache_evicts_oldest_entry() {
        let service = Arc::new(MockStationService::default());
        service.respond_with("мос", vec![station("МОСКВА ОКТ", 2006004)]);
        service.respond_with("спб", vec![station("С-ПЕТЕРБУРГ", 2004001)]);
        let mut opts = fast_options();
        opts.cache_capacity = Some(1);
        let engine = Engine::new(service.clone(), opts);

        engine.search("мос");
        wait_until(|| !engine.suggestions().is_empty());
        engine.search("спб");
        wait_until(|| engine.suggestions() == vec![station("С-ПЕТЕРБУРГ", 2004001)]);

        engine.search("мос");
        wait_until(|| engine.suggestions() == vec![station("МОСКВА ОКТ", 2006004)]);
        settle();
        let calls = service.calls.lock().clone();
        assert_eq!(calls.iter().filter(|c| c.as_str() == "мос").count(), 2);
    }
}
