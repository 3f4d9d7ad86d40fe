//! Per-host pacing and circuit-breaker state
//!
//! One [`HostState`] exists per hostname, independent of sources. State is
//! process-local and lives in an injected [`HostRegistry`] so ownership and
//! test isolation are explicit. Crawls for different hosts never contend;
//! crawls racing on the same host serialize their pacing decisions under the
//! registry mutex.

use crate::fetch::FetchError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Pacing and failure state for one hostname
#[derive(Debug, Clone)]
pub struct HostState {
    /// Earliest instant the next request to this host may start
    next_allowed_at: Option<Instant>,

    /// Consecutive transient failures (fetch exceptions and 5xx responses)
    failure_count: u32,

    /// While set and in the future, all requests fail fast with `CircuitOpen`
    circuit_open_until: Option<Instant>,
}

impl HostState {
    /// Creates a fresh host state with no history
    pub fn new() -> Self {
        Self {
            next_allowed_at: None,
            failure_count: 0,
            circuit_open_until: None,
        }
    }

    /// Checks whether the circuit is open at `now`
    pub fn is_circuit_open(&self, now: Instant) -> bool {
        matches!(self.circuit_open_until, Some(until) if now < until)
    }

    /// Reserves the next request slot and returns how long the caller must
    /// wait before starting
    ///
    /// The slot reservation happens atomically with the check: the next
    /// caller's slot begins `pacing` after this one's start, regardless of
    /// how the request turns out.
    pub fn reserve_slot(&mut self, now: Instant, pacing: Duration) -> Duration {
        let start = match self.next_allowed_at {
            Some(at) if at > now => at,
            _ => now,
        };
        self.next_allowed_at = Some(start + pacing);
        start.saturating_duration_since(now)
    }

    /// Records a transient failure (network error or 5xx)
    ///
    /// Returns true when this failure opened the circuit. The counter is not
    /// reset when the circuit opens; only a success resets it.
    pub fn record_failure(&mut self, now: Instant, threshold: u32, cooldown: Duration) -> bool {
        self.failure_count += 1;
        if self.failure_count >= threshold {
            self.circuit_open_until = Some(now + cooldown);
            return true;
        }
        false
    }

    /// Records a host-level success (2xx or 304): closes the circuit and
    /// clears the failure counter
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.circuit_open_until = None;
    }

    /// Current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}

impl Default for HostState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared registry of per-host state, keyed by hostname
///
/// Cloning is cheap; clones share the same underlying map.
#[derive(Clone, Default)]
pub struct HostRegistry {
    inner: Arc<Mutex<HashMap<String, HostState>>>,
}

impl HostRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the circuit and reserves the next pacing slot for `host`
    ///
    /// # Returns
    ///
    /// * `Ok(Duration)` - How long to sleep before sending (may be zero)
    /// * `Err(FetchError::CircuitOpen)` - The host's circuit is open; no
    ///   network call may be made
    pub fn begin_request(&self, host: &str, pacing: Duration) -> Result<Duration, FetchError> {
        let now = Instant::now();
        let mut map = self.inner.lock().unwrap();
        let state = map.entry(host.to_string()).or_default();

        if state.is_circuit_open(now) {
            return Err(FetchError::CircuitOpen {
                host: host.to_string(),
            });
        }

        Ok(state.reserve_slot(now, pacing))
    }

    /// Records a host-level success
    pub fn record_success(&self, host: &str) {
        let mut map = self.inner.lock().unwrap();
        map.entry(host.to_string()).or_default().record_success();
    }

    /// Records a transient failure; returns true if the circuit opened
    pub fn record_failure(&self, host: &str, threshold: u32, cooldown: Duration) -> bool {
        let now = Instant::now();
        let mut map = self.inner.lock().unwrap();
        let opened = map
            .entry(host.to_string())
            .or_default()
            .record_failure(now, threshold, cooldown);
        if opened {
            tracing::warn!(host, cooldown_secs = cooldown.as_secs(), "circuit opened");
        }
        opened
    }

    /// Checks whether `host`'s circuit is currently open
    pub fn is_circuit_open(&self, host: &str) -> bool {
        let map = self.inner.lock().unwrap();
        map.get(host)
            .map(|s| s.is_circuit_open(Instant::now()))
            .unwrap_or(false)
    }

    /// Current failure count for `host` (zero if never seen)
    pub fn failure_count(&self, host: &str) -> u32 {
        let map = self.inner.lock().unwrap();
        map.get(host).map(|s| s.failure_count()).unwrap_or(0)
    }

    /// Clears all host state
    ///
    /// For tests and operational resets.
    pub fn reset(&self) {
        self.inner.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACING: Duration = Duration::from_millis(250);
    const COOLDOWN: Duration = Duration::from_secs(60);

    #[test]
    fn test_first_slot_has_no_wait() {
        let mut state = HostState::new();
        let now = Instant::now();
        assert_eq!(state.reserve_slot(now, PACING), Duration::ZERO);
    }

    #[test]
    fn test_back_to_back_slots_are_paced() {
        let mut state = HostState::new();
        let now = Instant::now();

        assert_eq!(state.reserve_slot(now, PACING), Duration::ZERO);
        // Immediately asking again must wait out the pacing delay
        assert_eq!(state.reserve_slot(now, PACING), PACING);
        // And the next slot stacks behind the reserved one
        assert_eq!(state.reserve_slot(now, PACING), PACING * 2);
    }

    #[test]
    fn test_slot_after_delay_is_free() {
        let mut state = HostState::new();
        let now = Instant::now();
        state.reserve_slot(now, PACING);

        let later = now + Duration::from_millis(300);
        assert_eq!(state.reserve_slot(later, PACING), Duration::ZERO);
    }

    #[test]
    fn test_circuit_opens_at_threshold() {
        let mut state = HostState::new();
        let now = Instant::now();

        assert!(!state.record_failure(now, 3, COOLDOWN));
        assert!(!state.record_failure(now, 3, COOLDOWN));
        assert!(state.record_failure(now, 3, COOLDOWN));
        assert!(state.is_circuit_open(now));
    }

    #[test]
    fn test_circuit_closes_after_cooldown() {
        let mut state = HostState::new();
        let now = Instant::now();
        for _ in 0..3 {
            state.record_failure(now, 3, COOLDOWN);
        }

        assert!(state.is_circuit_open(now + Duration::from_secs(59)));
        assert!(!state.is_circuit_open(now + Duration::from_secs(61)));
    }

    #[test]
    fn test_counter_survives_circuit_open() {
        let mut state = HostState::new();
        let now = Instant::now();
        for _ in 0..3 {
            state.record_failure(now, 3, COOLDOWN);
        }

        // A further failure after cooldown re-opens immediately
        let later = now + Duration::from_secs(61);
        assert!(state.record_failure(later, 3, COOLDOWN));
        assert!(state.is_circuit_open(later));
    }

    #[test]
    fn test_success_resets_counter_and_circuit() {
        let mut state = HostState::new();
        let now = Instant::now();
        for _ in 0..3 {
            state.record_failure(now, 3, COOLDOWN);
        }

        state.record_success();
        assert_eq!(state.failure_count(), 0);
        assert!(!state.is_circuit_open(now));
    }

    #[test]
    fn test_registry_is_per_host() {
        let registry = HostRegistry::new();
        for _ in 0..3 {
            registry.record_failure("a.example.gov", 3, COOLDOWN);
        }

        assert!(registry.is_circuit_open("a.example.gov"));
        assert!(!registry.is_circuit_open("b.example.gov"));
        assert!(registry
            .begin_request("b.example.gov", PACING)
            .is_ok());
    }

    #[test]
    fn test_registry_begin_request_fails_fast_when_open() {
        let registry = HostRegistry::new();
        for _ in 0..3 {
            registry.record_failure("a.example.gov", 3, COOLDOWN);
        }

        let result = registry.begin_request("a.example.gov", PACING);
        assert!(matches!(result, Err(FetchError::CircuitOpen { .. })));
    }

    #[test]
    fn test_registry_reset() {
        let registry = HostRegistry::new();
        for _ in 0..3 {
            registry.record_failure("a.example.gov", 3, COOLDOWN);
        }

        registry.reset();
        assert!(!registry.is_circuit_open("a.example.gov"));
        assert_eq!(registry.failure_count("a.example.gov"), 0);
    }
}
