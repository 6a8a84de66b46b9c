use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

/// Time source for session timestamps (violation debounce, logs).
///
/// `Monotonic` reads wall time once and then advances with `Instant`, so a system
/// clock adjustment cannot shrink or stretch the debounce window. `Manual` clocks
/// share their instant across clones, so a test can hand one to a service and keep
/// advancing it from outside.
#[derive(Debug, Clone)]
pub enum Clock {
    System,
    Monotonic(MonotonicClock),
    Fixed(DateTime<Utc>),
    Manual(ManualClock),
}

impl Default for Clock {
    fn default() -> Self {
        Self::monotonic()
    }
}

impl Clock {
    /// Raw wall clock. Follows system clock adjustments.
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    /// Wall time anchored now, advanced by the monotonic clock.
    #[must_use]
    pub fn monotonic() -> Self {
        Self::Monotonic(MonotonicClock::anchored_now())
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// A shared clock starting at `at` that only moves when advanced.
    #[must_use]
    pub fn manual(at: DateTime<Utc>) -> Self {
        Self::Manual(ManualClock::starting_at(at))
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Monotonic(monotonic) => monotonic.now(),
            Clock::Fixed(t) => *t,
            Clock::Manual(manual) => manual.now(),
        }
    }

    /// Move a fixed or manual clock forward. Has no effect on the live clocks.
    pub fn advance(&mut self, delta: Duration) {
        match self {
            Clock::System | Clock::Monotonic(_) => {}
            Clock::Fixed(t) => *t += delta,
            Clock::Manual(manual) => manual.advance(delta),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    wall: DateTime<Utc>,
    started: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn anchored_now() -> Self {
        Self {
            wall: Utc::now(),
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        Duration::from_std(self.started.elapsed())
            .ok()
            .and_then(|elapsed| self.wall.checked_add_signed(elapsed))
            .unwrap_or(self.wall)
    }
}

/// Millisecond instant shared between clones.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    #[must_use]
    pub fn starting_at(at: DateTime<Utc>) -> Self {
        Self(Arc::new(AtomicI64::new(at.timestamp_millis())))
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.0.load(Ordering::SeqCst))
            .unwrap_or_default()
    }

    pub fn advance(&self, delta: Duration) {
        self.0.fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
