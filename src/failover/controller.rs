//! Failover decision logic.
//!
//! One call to [`FailoverController::observe`] per scheduler cycle. The
//! controller is the only writer of [`WatchdogState`]; it never performs I/O
//! itself, it only tells the scheduler whether to issue a restart.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::{Role, WatchdogConfig};
use crate::failover::state::{Phase, WatchdogState};
use crate::health::probe::ProbeResult;
use crate::observability::metrics;
use crate::resilience::BackoffPolicy;

/// What the scheduler must do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Fire-and-forget restart of the supervised service.
    Restart,
}

pub struct FailoverController {
    role: Role,
    defer: Duration,
    service_threshold: u32,
    peer_threshold: u32,
    backoff: BackoffPolicy,
    state: WatchdogState,
}

impl FailoverController {
    pub fn new(role: Role, defer: Duration, backoff: BackoffPolicy) -> Self {
        let defer = match role {
            Role::Primary => Duration::ZERO,
            Role::Secondary => defer,
        };
        Self {
            role,
            defer,
            service_threshold: 1,
            peer_threshold: 1,
            state: WatchdogState::new(backoff.min()),
            backoff,
        }
    }

    /// Consecutive DOWN probes before acting on the service / the peer.
    pub fn with_thresholds(mut self, service: u32, peer: u32) -> Self {
        self.service_threshold = service.max(1);
        self.peer_threshold = peer.max(1);
        self
    }

    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self::new(
            config.role,
            config.defer_window(),
            BackoffPolicy::from_config(&config.backoff),
        )
        .with_thresholds(config.service.failure_threshold, config.peer_failure_threshold)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> &WatchdogState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Whether the peer currently counts as DOWN.
    pub fn peer_down(&self) -> bool {
        self.state.consecutive_peer_failures >= self.peer_threshold
    }

    /// Earliest instant at which a pending deadline (defer or backoff) expires.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state.phase {
            Phase::Deferring => self.state.defer_deadline,
            Phase::BackoffWait => self.state.backoff_until,
            _ => None,
        }
    }

    /// Consume this cycle's probe verdicts and advance the state machine.
    pub fn observe(
        &mut self,
        service: &ProbeResult,
        peer: Option<&ProbeResult>,
        now: Instant,
    ) -> Action {
        if let Some(peer) = peer {
            self.record_peer(peer);
        }

        // Self-healing always wins over continuing a restart sequence.
        if service.is_up() {
            self.recover();
            return Action::None;
        }

        self.state.consecutive_service_failures =
            self.state.consecutive_service_failures.saturating_add(1);

        match self.state.phase {
            Phase::Healthy | Phase::ServiceSuspect => self.on_suspect(service, now),
            Phase::Deferring => self.on_deferring(now),
            Phase::Restarting => {
                self.enter_backoff(now);
                Action::None
            }
            Phase::BackoffWait => self.on_backoff_wait(now),
        }
    }

    /// The restart action itself failed (control interface unreachable,
    /// spawn error). Treated exactly like "still DOWN".
    pub fn restart_failed(&mut self, now: Instant) {
        if self.state.phase == Phase::Restarting {
            self.enter_backoff(now);
        }
    }

    fn on_suspect(&mut self, service: &ProbeResult, now: Instant) -> Action {
        if self.state.phase == Phase::Healthy {
            tracing::warn!(
                role = %self.role,
                outcome = %service.outcome,
                detail = service.detail.as_deref().unwrap_or(""),
                "Service probe failed"
            );
            self.transition(Phase::ServiceSuspect);
        }

        if self.state.consecutive_service_failures < self.service_threshold {
            return Action::None;
        }

        match self.role {
            Role::Primary => self.begin_restart(now),
            Role::Secondary => {
                let deadline = now + self.defer;
                self.state.defer_deadline = Some(deadline);
                tracing::warn!(
                    defer_secs = self.defer.as_secs_f64(),
                    "Service DOWN, deferring to primary"
                );
                self.transition(Phase::Deferring);
                self.on_deferring(now)
            }
        }
    }

    fn on_deferring(&mut self, now: Instant) -> Action {
        if self.peer_down() {
            tracing::warn!(
                consecutive_peer_failures = self.state.consecutive_peer_failures,
                "Primary watchdog is DOWN, ending deferral early"
            );
            return self.begin_restart(now);
        }

        let deadline = self.state.defer_deadline.unwrap_or(now);
        if now >= deadline {
            tracing::warn!("Defer window elapsed and service still DOWN, taking over");
            return self.begin_restart(now);
        }

        Action::None
    }

    fn on_backoff_wait(&mut self, now: Instant) -> Action {
        match self.state.backoff_until {
            Some(until) if now < until => Action::None,
            _ => self.begin_restart(now),
        }
    }

    fn begin_restart(&mut self, now: Instant) -> Action {
        self.state.defer_deadline = None;
        self.state.backoff_until = None;
        self.state.last_restart_attempt_at = Some(now);
        self.state.restarts_issued += 1;
        self.transition(Phase::Restarting);
        tracing::warn!(
            role = %self.role,
            attempt = self.state.failed_restarts + 1,
            consecutive_service_failures = self.state.consecutive_service_failures,
            "Issuing service restart"
        );
        Action::Restart
    }

    fn enter_backoff(&mut self, now: Instant) {
        let delay = if self.state.failed_restarts == 0 {
            self.backoff.min()
        } else {
            self.backoff.next_delay(self.state.current_backoff_delay)
        };
        self.state.current_backoff_delay = delay;
        self.state.failed_restarts += 1;
        self.state.backoff_until = Some(now + self.backoff.jittered(delay));
        metrics::record_backoff(delay);

        tracing::warn!(
            delay_ms = delay.as_millis() as u64,
            failed_restarts = self.state.failed_restarts,
            "Restart did not recover the service, backing off"
        );
        self.transition(Phase::BackoffWait);
    }

    fn recover(&mut self) {
        if self.state.phase != Phase::Healthy {
            tracing::info!(
                from = %self.state.phase,
                failed_restarts = self.state.failed_restarts,
                "Service is UP again"
            );
        }
        self.state.consecutive_service_failures = 0;
        self.state.failed_restarts = 0;
        self.state.current_backoff_delay = self.backoff.min();
        self.state.backoff_until = None;
        self.state.defer_deadline = None;
        self.transition(Phase::Healthy);
        metrics::record_backoff(self.state.current_backoff_delay);
    }

    fn record_peer(&mut self, peer: &ProbeResult) {
        let was_down = self.peer_down();
        if peer.is_up() {
            self.state.consecutive_peer_failures = 0;
        } else {
            self.state.consecutive_peer_failures =
                self.state.consecutive_peer_failures.saturating_add(1);
        }
        self.state.peer_up = Some(peer.is_up());

        match (was_down, self.peer_down()) {
            (false, true) => tracing::warn!(
                outcome = %peer.outcome,
                detail = peer.detail.as_deref().unwrap_or(""),
                "Peer watchdog is DOWN"
            ),
            (true, false) => tracing::info!("Peer watchdog is UP again"),
            _ => {}
        }
        metrics::record_peer(peer.is_up());
    }

    fn transition(&mut self, to: Phase) {
        if self.state.phase != to {
            tracing::debug!(from = %self.state.phase, to = %to, "Phase transition");
            self.state.phase = to;
            metrics::record_phase(to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::{ProbeOutcome, TargetKind};
    use rand::Rng;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn service(outcome: ProbeOutcome, at: Instant) -> ProbeResult {
        ProbeResult::new(TargetKind::Service, outcome, at)
    }

    fn peer(outcome: ProbeOutcome, at: Instant) -> ProbeResult {
        ProbeResult::new(TargetKind::Peer, outcome, at)
    }

    fn primary() -> FailoverController {
        FailoverController::new(Role::Primary, Duration::ZERO, BackoffPolicy::new(secs(1), secs(20)))
    }

    fn secondary(defer: u64) -> FailoverController {
        FailoverController::new(Role::Secondary, secs(defer), BackoffPolicy::new(secs(1), secs(20)))
    }

    #[test]
    fn test_scenario_a_service_up_throughout() {
        let mut c = primary();
        let t0 = Instant::now();
        for i in 0..20 {
            let now = t0 + secs(3 * i);
            let action = c.observe(&service(ProbeOutcome::Up, now), Some(&peer(ProbeOutcome::Up, now)), now);
            assert_eq!(action, Action::None);
            assert_eq!(c.phase(), Phase::Healthy);
        }
        assert_eq!(c.state().restarts_issued, 0);
    }

    #[test]
    fn test_scenario_b_primary_restarts_then_recovers() {
        let mut c = primary();
        let t0 = Instant::now();

        let action = c.observe(&service(ProbeOutcome::Down, t0), Some(&peer(ProbeOutcome::Up, t0)), t0);
        assert_eq!(action, Action::Restart);
        assert_eq!(c.phase(), Phase::Restarting);
        assert_eq!(c.state().last_restart_attempt_at, Some(t0));

        let t1 = t0 + secs(3);
        let action = c.observe(&service(ProbeOutcome::Up, t1), Some(&peer(ProbeOutcome::Up, t1)), t1);
        assert_eq!(action, Action::None);
        assert_eq!(c.phase(), Phase::Healthy);
        assert_eq!(c.state().current_backoff_delay, secs(1));
        assert_eq!(c.state().consecutive_service_failures, 0);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn test_restart_and_recovery_are_logged() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut c = primary();
            let t0 = Instant::now();
            c.observe(&service(ProbeOutcome::Down, t0), Some(&peer(ProbeOutcome::Up, t0)), t0);
            let t1 = t0 + secs(3);
            c.observe(&service(ProbeOutcome::Up, t1), Some(&peer(ProbeOutcome::Up, t1)), t1);
        });

        let text = logs.text();
        assert!(text.contains("WARN"), "{}", text);
        assert!(text.contains("Issuing service restart"), "{}", text);
        assert!(text.contains("role=primary"), "{}", text);
        assert!(text.contains("Service is UP again"), "{}", text);
    }

    #[test]
    fn test_deferral_is_logged_as_degradation() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut c = secondary(10);
            let t0 = Instant::now();
            c.observe(&service(ProbeOutcome::Down, t0), Some(&peer(ProbeOutcome::Up, t0)), t0);
        });

        assert!(logs.text().contains("Service DOWN, deferring to primary"));
    }

    #[test]
    fn test_scenario_c_secondary_defers_full_window() {
        let mut c = secondary(10);
        let t0 = Instant::now();
        let mut restarted_at = None;

        for t in (0..=15).step_by(3) {
            let now = t0 + secs(t);
            let action = c.observe(&service(ProbeOutcome::Down, now), Some(&peer(ProbeOutcome::Up, now)), now);
            if t <= 9 {
                assert_eq!(action, Action::None, "t={}", t);
                assert_eq!(c.phase(), Phase::Deferring, "t={}", t);
            }
            if action == Action::Restart {
                restarted_at = Some(t);
                break;
            }
        }

        assert_eq!(restarted_at, Some(12));
        assert_eq!(c.phase(), Phase::Restarting);
    }

    #[test]
    fn test_secondary_restarts_exactly_at_deadline() {
        let mut c = secondary(10);
        let t0 = Instant::now();
        c.observe(&service(ProbeOutcome::Down, t0), Some(&peer(ProbeOutcome::Up, t0)), t0);
        assert_eq!(c.next_deadline(), Some(t0 + secs(10)));

        let at = t0 + secs(10);
        let action = c.observe(&service(ProbeOutcome::Down, at), Some(&peer(ProbeOutcome::Up, at)), at);
        assert_eq!(action, Action::Restart);
    }

    #[test]
    fn test_scenario_d_peer_down_bypasses_defer() {
        let mut c = secondary(10);
        let t1 = Instant::now() + secs(1);
        let action = c.observe(&service(ProbeOutcome::Down, t1), Some(&peer(ProbeOutcome::Timeout, t1)), t1);
        assert_eq!(action, Action::Restart);
        assert_eq!(c.phase(), Phase::Restarting);
    }

    #[test]
    fn test_peer_going_down_mid_deferral_ends_it() {
        let mut c = secondary(10);
        let t0 = Instant::now();
        assert_eq!(
            c.observe(&service(ProbeOutcome::Down, t0), Some(&peer(ProbeOutcome::Up, t0)), t0),
            Action::None
        );
        let t3 = t0 + secs(3);
        assert_eq!(
            c.observe(&service(ProbeOutcome::Down, t3), Some(&peer(ProbeOutcome::Error, t3)), t3),
            Action::Restart
        );
    }

    #[test]
    fn test_secondary_returns_healthy_when_primary_fixes_it() {
        let mut c = secondary(10);
        let t0 = Instant::now();
        c.observe(&service(ProbeOutcome::Down, t0), Some(&peer(ProbeOutcome::Up, t0)), t0);
        assert_eq!(c.phase(), Phase::Deferring);

        let t3 = t0 + secs(3);
        let action = c.observe(&service(ProbeOutcome::Up, t3), Some(&peer(ProbeOutcome::Up, t3)), t3);
        assert_eq!(action, Action::None);
        assert_eq!(c.phase(), Phase::Healthy);
        assert!(c.state().defer_deadline.is_none());
        assert_eq!(c.state().restarts_issued, 0);
    }

    #[test]
    fn test_recovery_checked_before_peer_down() {
        let mut c = secondary(10);
        let t0 = Instant::now();
        c.observe(&service(ProbeOutcome::Down, t0), Some(&peer(ProbeOutcome::Up, t0)), t0);

        // Both could apply: service recovered wins, no restart.
        let t3 = t0 + secs(3);
        let action = c.observe(&service(ProbeOutcome::Up, t3), Some(&peer(ProbeOutcome::Down, t3)), t3);
        assert_eq!(action, Action::None);
        assert_eq!(c.phase(), Phase::Healthy);
    }

    #[test]
    fn test_scenario_e_backoff_sequence() {
        let mut c = primary();
        let mut now = Instant::now();
        let mut delays = Vec::new();

        assert_eq!(c.observe(&service(ProbeOutcome::Down, now), None, now), Action::Restart);

        while delays.len() < 3 {
            now += secs(3);
            let action = c.observe(&service(ProbeOutcome::Down, now), None, now);
            match (c.phase(), action) {
                (Phase::BackoffWait, Action::None) => delays.push(c.state().current_backoff_delay),
                (Phase::Restarting, Action::Restart) => {}
                (phase, action) => panic!("unexpected {} / {:?}", phase, action),
            }
        }

        assert_eq!(delays, vec![secs(1), secs(2), secs(4)]);
        assert!(delays.iter().all(|d| *d <= secs(20)));
    }

    #[test]
    fn test_backoff_waits_until_deadline() {
        let mut c = FailoverController::new(Role::Primary, Duration::ZERO, BackoffPolicy::new(secs(5), secs(20)));
        let t0 = Instant::now();
        assert_eq!(c.observe(&service(ProbeOutcome::Down, t0), None, t0), Action::Restart);

        let t1 = t0 + secs(1);
        c.observe(&service(ProbeOutcome::Down, t1), None, t1);
        assert_eq!(c.phase(), Phase::BackoffWait);
        assert_eq!(c.next_deadline(), Some(t1 + secs(5)));

        let t2 = t1 + secs(3);
        assert_eq!(c.observe(&service(ProbeOutcome::Down, t2), None, t2), Action::None);
        assert_eq!(c.phase(), Phase::BackoffWait);

        let t3 = t1 + secs(5);
        assert_eq!(c.observe(&service(ProbeOutcome::Down, t3), None, t3), Action::Restart);
    }

    #[test]
    fn test_backoff_resets_after_recovery() {
        let mut c = primary();
        let mut now = Instant::now();
        c.observe(&service(ProbeOutcome::Down, now), None, now);
        for _ in 0..6 {
            now += secs(30);
            c.observe(&service(ProbeOutcome::Down, now), None, now);
        }
        assert!(c.state().current_backoff_delay > secs(1));

        now += secs(3);
        c.observe(&service(ProbeOutcome::Up, now), None, now);
        assert_eq!(c.state().current_backoff_delay, secs(1));
        assert_eq!(c.state().failed_restarts, 0);

        // Next outage starts again from the minimum.
        now += secs(3);
        assert_eq!(c.observe(&service(ProbeOutcome::Down, now), None, now), Action::Restart);
        now += secs(3);
        c.observe(&service(ProbeOutcome::Down, now), None, now);
        assert_eq!(c.state().current_backoff_delay, secs(1));
    }

    #[test]
    fn test_restart_action_failure_drives_backoff() {
        let mut c = primary();
        let t0 = Instant::now();
        assert_eq!(c.observe(&service(ProbeOutcome::Error, t0), None, t0), Action::Restart);

        c.restart_failed(t0);
        assert_eq!(c.phase(), Phase::BackoffWait);
        assert_eq!(c.state().backoff_until, Some(t0 + secs(1)));

        // Still keeps retrying.
        let t1 = t0 + secs(3);
        assert_eq!(c.observe(&service(ProbeOutcome::Error, t1), None, t1), Action::Restart);
    }

    #[test]
    fn test_restart_failed_outside_restarting_is_ignored() {
        let mut c = primary();
        c.restart_failed(Instant::now());
        assert_eq!(c.phase(), Phase::Healthy);
    }

    #[test]
    fn test_service_threshold_delays_action() {
        let mut c = primary().with_thresholds(3, 1);
        let mut now = Instant::now();
        for _ in 0..2 {
            assert_eq!(c.observe(&service(ProbeOutcome::Down, now), None, now), Action::None);
            assert_eq!(c.phase(), Phase::ServiceSuspect);
            now += secs(3);
        }
        assert_eq!(c.observe(&service(ProbeOutcome::Down, now), None, now), Action::Restart);
    }

    #[test]
    fn test_peer_threshold() {
        let mut c = secondary(60).with_thresholds(1, 2);
        let t0 = Instant::now();
        assert_eq!(
            c.observe(&service(ProbeOutcome::Down, t0), Some(&peer(ProbeOutcome::Down, t0)), t0),
            Action::None
        );
        assert!(!c.peer_down());
        let t1 = t0 + secs(3);
        assert_eq!(
            c.observe(&service(ProbeOutcome::Down, t1), Some(&peer(ProbeOutcome::Down, t1)), t1),
            Action::Restart
        );
    }

    #[test]
    fn test_primary_ignores_defer_argument() {
        let mut c = FailoverController::new(Role::Primary, secs(30), BackoffPolicy::new(secs(1), secs(20)));
        let t0 = Instant::now();
        assert_eq!(c.observe(&service(ProbeOutcome::Down, t0), None, t0), Action::Restart);
    }

    /// Random verdict sequences: the pair invariants hold for every run.
    #[test]
    fn test_invariants_over_random_sequences() {
        let mut rng = rand::thread_rng();
        let outcomes = [ProbeOutcome::Up, ProbeOutcome::Down, ProbeOutcome::Timeout, ProbeOutcome::Error];

        for role in [Role::Primary, Role::Secondary] {
            for _ in 0..200 {
                let mut c = FailoverController::new(role, secs(10), BackoffPolicy::new(secs(1), secs(20)));
                let t0 = Instant::now();
                let mut now = t0;
                let mut outage_start: Option<Instant> = None;
                let mut prev_delay = c.state().current_backoff_delay;

                for _ in 0..60 {
                    now += Duration::from_millis(rng.gen_range(500..4000));
                    let svc = outcomes[rng.gen_range(0..outcomes.len())];
                    let pr = outcomes[rng.gen_range(0..outcomes.len())];
                    let before = c.phase();
                    let peer_was_down = c.peer_down();

                    let action = c.observe(&service(svc, now), Some(&peer(pr, now)), now);

                    if svc.is_up() {
                        outage_start = None;
                    } else if outage_start.is_none() {
                        outage_start = Some(now);
                    }

                    // Primary never defers.
                    if role == Role::Primary {
                        assert_ne!(c.phase(), Phase::Deferring);
                    }

                    // At most one restart outstanding.
                    if before == Phase::Restarting {
                        assert_eq!(action, Action::None);
                    }

                    // Secondary honours the defer window unless the primary is DOWN.
                    if role == Role::Secondary
                        && action == Action::Restart
                        && matches!(before, Phase::Healthy | Phase::ServiceSuspect | Phase::Deferring)
                    {
                        let waited = now - outage_start.unwrap_or(now);
                        assert!(
                            waited >= secs(10) || c.peer_down() || peer_was_down,
                            "restarted after {:?} with peer up",
                            waited
                        );
                    }

                    // Backoff bounded, non-decreasing within an outage, reset on UP.
                    let delay = c.state().current_backoff_delay;
                    assert!(delay >= secs(1) && delay <= secs(20));
                    if svc.is_up() {
                        assert_eq!(delay, secs(1));
                    } else {
                        assert!(delay >= prev_delay);
                    }
                    prev_delay = delay;
                }
            }
        }
    }
}
