use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use uuid::Uuid;

use crate::{
    error::LoginError,
    models::LockoutState,
    store::{KvState, StoreOp},
};

pub const MAX_ATTEMPTS: u32 = 3;
pub const LOCKOUT_DURATION_MS: i64 = 10 * 60 * 1000;

// Longer-lived store keys.
pub const ATTEMPTS_KEY: &str = "loginAttempts";
pub const LOCKED_UNTIL_KEY: &str = "lockedUntil";

/// LockoutSettings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutSettings {
    pub max_attempts: u32,
    pub duration_ms: i64,
}

impl Default for LockoutSettings {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            duration_ms: LOCKOUT_DURATION_MS,
        }
    }
}

// --- Time Source ---

/// Clock
///
/// Wall-clock source in epoch milliseconds, injected so lock expiry can be tested without
/// waiting ten minutes.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// ManualClock
///
/// A clock that only moves when told to. Used by tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub type ClockState = Arc<dyn Clock>;

// --- Pure State Functions ---

/// True iff a lock deadline is set and still in the future.
pub fn is_locked(state: &LockoutState, now_ms: i64) -> bool {
    state.locked_until.is_some_and(|until| until > now_ms)
}

/// Milliseconds left on the lock, never negative.
pub fn remaining_lockout_ms(state: &LockoutState, now_ms: i64) -> i64 {
    state
        .locked_until
        .map(|until| (until - now_ms).max(0))
        .unwrap_or(0)
}

/// Whole minutes shown to the user, rounded up.
pub fn minutes_remaining(remaining_ms: i64) -> i64 {
    if remaining_ms <= 0 {
        0
    } else {
        (remaining_ms + 59_999) / 60_000
    }
}

// Malformed values read as "no attempts" / "no lock".
fn parse_state(values: &[Option<String>]) -> LockoutState {
    let failed_attempts = values
        .first()
        .and_then(|v| v.as_deref())
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let locked_until = values
        .get(1)
        .and_then(|v| v.as_deref())
        .and_then(|v| v.trim().parse::<i64>().ok());
    LockoutState {
        failed_attempts,
        locked_until,
    }
}

const KEYS: [&str; 2] = [ATTEMPTS_KEY, LOCKED_UNTIL_KEY];

fn clear_ops() -> Vec<StoreOp> {
    vec![StoreOp::remove(ATTEMPTS_KEY), StoreOp::remove(LOCKED_UNTIL_KEY)]
}

/// LoginLimiter
///
/// Counts failed logins in a client's longer-lived store and locks submission once the
/// limit is hit. Every method recomputes from the persisted record; nothing is cached.
///
/// State machine: `Open(n) -> failure -> Open(n+1) -> n+1 == max -> Locked(now + duration)
/// -> deadline passes -> Open(0)`. The counter stays at the limit while locked.
#[derive(Clone)]
pub struct LoginLimiter {
    store: KvState,
    clock: ClockState,
    settings: LockoutSettings,
}

impl LoginLimiter {
    pub fn new(store: KvState, clock: ClockState, settings: LockoutSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> LockoutSettings {
        self.settings
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// The persisted record as-is, expired lock included.
    pub fn state(&self) -> LockoutState {
        parse_state(&KEYS.map(|k| self.store.get(k)))
    }

    /// refresh
    ///
    /// Expires a lapsed lock: when the deadline has passed, both keys are cleared and the
    /// fresh state is returned. Otherwise the record is returned untouched.
    pub fn refresh(&self) -> LockoutState {
        let now = self.now();
        let mut current = LockoutState::default();
        self.store.update(&KEYS, &mut |values| {
            current = parse_state(values);
            match current.locked_until {
                Some(until) if until <= now => {
                    current = LockoutState::default();
                    clear_ops()
                }
                _ => vec![],
            }
        });
        current
    }

    pub fn is_locked(&self) -> bool {
        is_locked(&self.refresh(), self.now())
    }

    pub fn remaining_ms(&self) -> i64 {
        remaining_lockout_ms(&self.refresh(), self.now())
    }

    /// ensure_unlocked
    ///
    /// Gate in front of every login submission. Fails with the remaining whole minutes
    /// while the lock holds, without any other side effect.
    pub fn ensure_unlocked(&self) -> Result<LockoutState, LoginError> {
        let state = self.refresh();
        let now = self.now();
        if is_locked(&state, now) {
            let remaining_ms = remaining_lockout_ms(&state, now);
            return Err(LoginError::Locked {
                minutes: minutes_remaining(remaining_ms),
                remaining_ms,
            });
        }
        Ok(state)
    }

    /// record_failure
    ///
    /// Counts one rejected login. Reaching the limit sets the deadline; the counter itself
    /// is only reset once that deadline passes.
    pub fn record_failure(&self) -> LockoutState {
        let now = self.now();
        let settings = self.settings;
        let mut next = LockoutState::default();
        self.store.update(&KEYS, &mut |values| {
            let mut state = parse_state(values);
            if state.locked_until.is_some_and(|until| until <= now) {
                state = LockoutState::default();
            }
            state.failed_attempts = state.failed_attempts.saturating_add(1);
            if state.failed_attempts >= settings.max_attempts && state.locked_until.is_none() {
                state.locked_until = Some(now + settings.duration_ms);
            }
            next = state;

            let mut ops = vec![StoreOp::set(ATTEMPTS_KEY, state.failed_attempts.to_string())];
            match state.locked_until {
                Some(until) => ops.push(StoreOp::set(LOCKED_UNTIL_KEY, until.to_string())),
                None => ops.push(StoreOp::remove(LOCKED_UNTIL_KEY)),
            }
            ops
        });

        if let Some(until) = next.locked_until {
            tracing::warn!(
                attempts = next.failed_attempts,
                locked_until = until,
                "login locked after repeated failures"
            );
        }
        next
    }

    /// Clears the counter and any deadline after a successful login.
    pub fn record_success(&self) {
        self.store.apply(clear_ops());
    }
}

// --- Countdown ---

/// LockoutCountdown
///
/// Background tick recomputing the remaining lock time from the persisted record once per
/// period, publishing it on a watch channel and clearing the lock when it reaches zero.
/// The task is aborted on `cancel` or when the countdown is dropped, so it never outlives
/// the client it belongs to.
pub struct LockoutCountdown {
    handle: JoinHandle<()>,
    remaining: watch::Receiver<i64>,
}

impl LockoutCountdown {
    /// Must be called from within a tokio runtime.
    pub fn start(limiter: LoginLimiter, tick: Duration) -> Self {
        let (tx, rx) = watch::channel(limiter.remaining_ms());

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let remaining = limiter.remaining_ms();
                tx.send_replace(remaining);
                if remaining == 0 {
                    tracing::info!("login lockout expired");
                    break;
                }
            }
        });

        Self {
            handle,
            remaining: rx,
        }
    }

    pub fn remaining(&self) -> watch::Receiver<i64> {
        self.remaining.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(self) {
        // Dropping aborts the task.
    }
}

impl Drop for LockoutCountdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// CountdownRegistry
///
/// At most one running countdown per client.
#[derive(Default)]
pub struct CountdownRegistry {
    running: Mutex<HashMap<Uuid, LockoutCountdown>>,
}

impl CountdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `countdown` for `client`, cancelling any previous one.
    pub fn arm(&self, client: Uuid, countdown: LockoutCountdown) {
        let mut running = self.running.lock();
        running.retain(|_, c| !c.is_finished());
        running.insert(client, countdown);
    }

    pub fn disarm(&self, client: Uuid) {
        self.running.lock().remove(&client);
    }

    pub fn is_running(&self, client: Uuid) -> bool {
        self.running
            .lock()
            .get(&client)
            .is_some_and(|c| !c.is_finished())
    }

    pub fn remaining(&self, client: Uuid) -> Option<watch::Receiver<i64>> {
        self.running.lock().get(&client).map(|c| c.remaining())
    }
}

pub type CountdownState = Arc<CountdownRegistry>;
