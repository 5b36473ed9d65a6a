use std::fmt::{self, Debug};
#[cfg(test)]
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Instant;

/// All host queues measure from the same epoch so timestamps of different queues compare.
static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

#[cfg_attr(test, mockall::automock)]
pub(crate) trait TimestampSource: Debug + Send + Sync {
    /// Nanoseconds since the shared epoch.
    fn now_nanos(&self) -> u64;
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct MonotonicClock;

impl TimestampSource for MonotonicClock {
    fn now_nanos(&self) -> u64 {
        // Saturates after roughly 584 years of process uptime.
        u64::try_from(EPOCH.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

#[derive(Clone)]
pub(crate) enum ClockFacade {
    Monotonic(MonotonicClock),

    #[cfg(test)]
    Mock(Arc<MockTimestampSource>),
}

impl ClockFacade {
    pub(crate) fn monotonic() -> Self {
        Self::Monotonic(MonotonicClock)
    }
}

impl TimestampSource for ClockFacade {
    fn now_nanos(&self) -> u64 {
        match self {
            Self::Monotonic(clock) => clock.now_nanos(),
            #[cfg(test)]
            Self::Mock(clock) => clock.now_nanos(),
        }
    }
}

#[cfg(test)]
impl From<MockTimestampSource> for ClockFacade {
    fn from(clock: MockTimestampSource) -> Self {
        Self::Mock(Arc::new(clock))
    }
}

impl Debug for ClockFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monotonic(clock) => clock.fmt(f),
            #[cfg(test)]
            Self::Mock(clock) => clock.fmt(f),
        }
    }
}

/// A mock clock that advances by `step` nanoseconds on every reading, starting at `step`.
///
/// Only deterministic when a single queue reads it.
#[cfg(test)]
pub(crate) fn stepping_clock(step: u64) -> ClockFacade {
    use std::sync::atomic::{AtomicU64, Ordering};

    let readings = AtomicU64::new(0);

    let mut clock = MockTimestampSource::new();
    clock.expect_now_nanos().returning(move || {
        let previous = readings.fetch_add(1, Ordering::Relaxed);
        previous.saturating_add(1).saturating_mul(step)
    });

    clock.into()
}
