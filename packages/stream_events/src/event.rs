use std::any::type_name;
use std::fmt;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::engine::is_ready;
use crate::{
    CompletionHandle, Error, EventFlags, MarkerRequest, MarkerTiming, Queue, Result, Timestamps,
};

const NANOS_PER_MILLI: f32 = 1_000_000.0;

/// Gives every event a place in a total order used when two events are locked together.
static NEXT_ORDINAL: AtomicU64 = AtomicU64::new(0);

/// Completion status reported by [`Event::query()`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventStatus {
    /// All work captured by the event has completed, or the event was never recorded and
    /// captures no work at all.
    Ready,

    /// Work captured by the event is still executing or waiting to execute.
    NotReady,
}

/// A host-visible synchronization point bound to a position in a queue's command sequence.
///
/// An event starts out unbound. [`record()`] binds it to the current end of a queue, after
/// which it can be polled with [`query()`], waited for with [`synchronize()`], compared with
/// another event via [`elapsed_time()`] or used to make another queue wait for it via
/// [`stream_wait()`]. Recording again rebinds the event to a new position.
///
/// All operations on one event are serialized by a lock owned by the event. Operations never
/// block the calling thread except [`synchronize()`] and the elapsed-time case that has to
/// materialize a marker.
///
/// [`record()`]: Self::record
/// [`query()`]: Self::query
/// [`synchronize()`]: Self::synchronize
/// [`elapsed_time()`]: Self::elapsed_time
/// [`stream_wait()`]: Self::stream_wait
///
/// # Example
///
/// ```rust
/// use stream_events::{Event, EventFlags, EventStatus, HostQueue};
///
/// let queue = HostQueue::new();
/// let start = Event::new(EventFlags::DEFAULT).unwrap();
/// let stop = Event::new(EventFlags::DEFAULT).unwrap();
///
/// start.record(&queue).unwrap();
/// queue.enqueue_work(|| std::thread::sleep(std::time::Duration::from_millis(5))).unwrap();
/// stop.record(&queue).unwrap();
///
/// stop.synchronize();
/// assert_eq!(stop.query(), EventStatus::Ready);
///
/// let millis = start.elapsed_time(&stop).unwrap();
/// assert!(millis >= 5.0);
/// ```
pub struct Event<Q: Queue> {
    ordinal: u64,
    flags: EventFlags,
    binding: Mutex<Binding<Q::Handle>>,
}

struct Binding<H> {
    // None until the event is bound to a queue position for the first time.
    handle: Option<Arc<H>>,

    // Whether `handle` was bound by an explicit record, as opposed to an implicit binding.
    recorded: bool,
}

type BindingGuard<'a, Q> = MutexGuard<'a, Binding<<Q as Queue>::Handle>>;

impl<Q: Queue> Event<Q> {
    /// Creates an unbound event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if `flags` contains unrecognized bits or both release
    /// flags.
    pub fn new(flags: EventFlags) -> Result<Self> {
        flags.validate()?;

        Ok(Self {
            ordinal: NEXT_ORDINAL.fetch_add(1, Ordering::Relaxed),
            flags,
            binding: Mutex::new(Binding {
                handle: None,
                recorded: false,
            }),
        })
    }

    /// The flags the event was created with.
    #[must_use]
    pub fn flags(&self) -> EventFlags {
        self.flags
    }

    /// Whether the event's current position was bound by an explicit [`record()`][Self::record].
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        self.binding.lock().recorded
    }

    /// The completion handle of the position the event is bound to, if any.
    #[must_use]
    pub fn completion_handle(&self) -> Option<Arc<Q::Handle>> {
        self.binding.lock().handle.clone()
    }

    /// Binds the event to the current end of `queue`'s command sequence.
    ///
    /// On a profiling queue, the most recently enqueued command is reused as the position if
    /// it is user-visible; otherwise a timed marker is enqueued. On other queues an untimed
    /// marker is enqueued. Recording at the position the event is already bound to changes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns the queue's error if a marker cannot be enqueued.
    pub fn record(&self, queue: &Q) -> Result<()> {
        self.add_marker(queue, None, true)
    }

    /// Binds the event to a specific command without marking it as recorded.
    ///
    /// This is how operations that take start/stop events bind them to the command they
    /// enqueue. Elapsed time between two events bound this way spans from the start
    /// event's command start to the stop event's command end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if `command` was not enqueued on `queue`.
    pub fn attach_command(&self, queue: &Q, command: Arc<Q::Handle>) -> Result<()> {
        self.add_marker(queue, Some(command), false)
    }

    /// Binds the event to `command`, or to a position chosen as in [`record()`][Self::record]
    /// if no command is given, and sets whether the binding counts as recorded.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidValue`] if `command` was not enqueued on `queue`.
    /// * The queue's error if a marker cannot be enqueued.
    pub fn add_marker(
        &self,
        queue: &Q,
        command: Option<Arc<Q::Handle>>,
        recorded: bool,
    ) -> Result<()> {
        let mut binding = self.binding.lock();

        let handle = match command {
            Some(command) if command.queue_id() != queue.id() => {
                return Err(Error::InvalidValue {
                    problem: format!(
                        "the command belongs to {}, not to {}",
                        command.queue_id(),
                        queue.id()
                    ),
                });
            }
            Some(command) => command,
            None => Self::current_position(queue)?,
        };

        if binding
            .handle
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &handle))
        {
            trace!(event = self.ordinal, queue = %queue.id(), "event already bound to position");
            return Ok(());
        }

        // Replacing the handle releases our reference to the previous position.
        binding.handle = Some(handle);
        binding.recorded = recorded;

        trace!(event = self.ordinal, queue = %queue.id(), recorded, "event bound to position");

        Ok(())
    }

    fn current_position(queue: &Q) -> Result<Arc<Q::Handle>> {
        if !queue.profiling_enabled() {
            return queue.enqueue_marker(MarkerRequest::new(MarkerTiming::Untimed));
        }

        match queue.last_enqueued() {
            Some(last) if last.is_user_visible() => Ok(last),
            _ => queue.enqueue_marker(MarkerRequest::new(MarkerTiming::Timed)),
        }
    }

    /// Reports whether the captured work has completed, without blocking.
    ///
    /// An event that was never recorded is always ready.
    #[must_use]
    pub fn query(&self) -> EventStatus {
        let binding = self.binding.lock();

        match binding.handle.as_deref() {
            None => EventStatus::Ready,
            Some(handle) if is_ready(handle) => EventStatus::Ready,
            Some(_) => EventStatus::NotReady,
        }
    }

    /// Blocks until the captured work has completed.
    ///
    /// Returns immediately if the event was never recorded or has already completed.
    pub fn synchronize(&self) {
        // Wait on a snapshot so other operations on this event are not held up meanwhile.
        let Some(handle) = self.completion_handle() else {
            return;
        };

        handle.await_completion();
    }

    /// Device time in milliseconds from this event to `stop`.
    ///
    /// The result is negative if `stop` completed first. If both events are bound to the same
    /// position because nothing was enqueued between them, a fresh marker is enqueued on that
    /// position's queue and the calling thread blocks until it completes, to measure against.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidHandle`] if either event was never recorded, was created with
    ///   [`EventFlags::DISABLE_TIMING`] or is bound to a command that captured no timestamps.
    /// * [`Error::NotReady`] if either event has not completed.
    pub fn elapsed_time(&self, stop: &Self) -> Result<f32> {
        if ptr::eq(self, stop) {
            return self.elapsed_time_to_self();
        }

        let (start_binding, stop_binding) = self.lock_with(stop);

        let (Some(start_handle), Some(stop_handle)) = (
            start_binding.handle.as_deref(),
            stop_binding.handle.as_deref(),
        ) else {
            return Err(Error::InvalidHandle {
                problem: "both events must be recorded before measuring elapsed time",
            });
        };

        if self.flags.timing_disabled() || stop.flags.timing_disabled() {
            return Err(Error::InvalidHandle {
                problem: "timing is disabled for at least one of the events",
            });
        }

        if !is_ready(start_handle) || !is_ready(stop_handle) {
            return Err(Error::NotReady);
        }

        let start_times = timestamps_of(start_handle)?;
        let same_position = ptr::eq(start_handle, stop_handle);

        if !same_position && start_binding.recorded && stop_binding.recorded {
            let stop_times = timestamps_of(stop_handle)?;
            return Ok(millis_between(start_times.end(), stop_times.end()));
        }

        if same_position && (start_binding.recorded || stop_binding.recorded) {
            let marker_end = self.measure_fresh_marker(start_handle)?;
            return Ok(millis_between(start_times.end(), marker_end));
        }

        let stop_times = timestamps_of(stop_handle)?;
        Ok(millis_between(start_times.start(), stop_times.end()))
    }

    fn elapsed_time_to_self(&self) -> Result<f32> {
        let binding = self.binding.lock();

        let Some(handle) = binding.handle.as_deref() else {
            return Err(Error::InvalidHandle {
                problem: "the event must be recorded before measuring elapsed time",
            });
        };

        if self.flags.timing_disabled() {
            return Err(Error::InvalidHandle {
                problem: "timing is disabled for the event",
            });
        }

        if !is_ready(handle) {
            return Err(Error::NotReady);
        }

        Ok(0.0)
    }

    /// Enqueues a marker after `position` on its queue, waits for it and returns its end time.
    fn measure_fresh_marker(&self, position: &Q::Handle) -> Result<u64> {
        let queue = position.queue().ok_or(Error::ResourceExhausted {
            problem: "the queue that owns the shared position no longer exists",
        })?;

        debug!(
            event = self.ordinal,
            queue = %queue.id(),
            "events share a position; measuring against a fresh marker"
        );

        let marker = queue.enqueue_marker(MarkerRequest::new(MarkerTiming::for_queue(&queue)))?;
        marker.await_completion();

        Ok(timestamps_of(&*marker)?.end())
    }

    /// Locks both events in ordinal order and returns the guards as `(self, other)`.
    fn lock_with<'a>(&'a self, other: &'a Self) -> (BindingGuard<'a, Q>, BindingGuard<'a, Q>) {
        if self.ordinal < other.ordinal {
            let mine = self.binding.lock();
            (mine, other.binding.lock())
        } else {
            let theirs = other.binding.lock();
            (self.binding.lock(), theirs)
        }
    }

    /// Makes commands enqueued on `queue` from now on wait until this event has completed.
    ///
    /// The calling thread does not block: the dependency is a marker with a wait-list,
    /// enqueued on `queue`. Nothing happens if the event was never recorded or is bound to a
    /// position on `queue` itself, which is already ordered.
    ///
    /// # Errors
    ///
    /// * [`Error::ResourceExhausted`] if the queue that owns the event's position cannot be
    ///   advanced.
    /// * The target queue's error if the marker cannot be enqueued.
    pub fn stream_wait(&self, queue: &Q) -> Result<()> {
        let binding = self.binding.lock();

        let Some(handle) = binding.handle.as_ref() else {
            return Ok(());
        };

        if handle.queue_id() == queue.id() {
            return Ok(());
        }

        if !handle.try_advance() {
            return Err(Error::ResourceExhausted {
                problem: "the queue that owns the event cannot make progress",
            });
        }

        let request =
            MarkerRequest::new(MarkerTiming::for_queue(queue)).with_wait_list(vec![Arc::clone(handle)]);
        queue.enqueue_marker(request)?;

        trace!(event = self.ordinal, queue = %queue.id(), "queue now waits for event");

        Ok(())
    }
}

impl<Q: Queue> fmt::Debug for Event<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct(type_name::<Self>());
        debug
            .field("ordinal", &self.ordinal)
            .field("flags", &self.flags);

        // Never block in Debug; another thread may be holding the lock for a long wait.
        if let Some(binding) = self.binding.try_lock() {
            debug
                .field("bound", &binding.handle.is_some())
                .field("recorded", &binding.recorded);
        }

        debug.finish_non_exhaustive()
    }
}

fn timestamps_of<H: CompletionHandle>(handle: &H) -> Result<Timestamps> {
    handle.timestamps().ok_or(Error::InvalidHandle {
        problem: "the command bound to the event did not capture timestamps",
    })
}

#[expect(
    clippy::cast_precision_loss,
    reason = "sub-microsecond precision is not meaningful in a millisecond result"
)]
fn millis_between(from_nanos: u64, to_nanos: u64) -> f32 {
    let delta = i128::from(to_nanos).saturating_sub(i128::from(from_nanos));
    delta as f32 / NANOS_PER_MILLI
}

#[cfg(test)]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::host::stepping_clock;
    use crate::{CommandKind, CommandStatus, HostQueue};

    assert_impl_all!(Event<HostQueue>: Send, Sync, fmt::Debug);

    const MILLI: u64 = 1_000_000;

    fn assert_millis(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "expected {expected} ms, got {actual} ms"
        );
    }

    fn event() -> Event<HostQueue> {
        Event::new(EventFlags::DEFAULT).unwrap()
    }

    fn deterministic_queue() -> HostQueue {
        HostQueue::builder().clock(stepping_clock(MILLI)).build()
    }

    #[test]
    fn new_validates_flags() {
        assert!(matches!(
            Event::<HostQueue>::new(EventFlags::from_bits_retain(0x10)),
            Err(Error::InvalidValue { .. })
        ));
        assert!(matches!(
            Event::<HostQueue>::new(EventFlags::RELEASE_TO_DEVICE | EventFlags::RELEASE_TO_SYSTEM),
            Err(Error::InvalidValue { .. })
        ));

        let event = Event::<HostQueue>::new(EventFlags::BLOCKING_SYNC).unwrap();
        assert_eq!(event.flags(), EventFlags::BLOCKING_SYNC);
    }

    #[test]
    fn unrecorded_event_is_trivially_ready() {
        let event = event();

        assert!(event.completion_handle().is_none());
        assert!(!event.is_recorded());
        assert_eq!(event.query(), EventStatus::Ready);
        event.synchronize();
    }

    #[test]
    fn unrecorded_event_ignores_paused_queue() {
        let queue = HostQueue::new();
        queue.pause();
        queue.enqueue_work(|| {}).unwrap();

        let event = event();

        assert_eq!(event.query(), EventStatus::Ready);
        event.synchronize();

        queue.resume();
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn record_on_empty_profiling_queue_enqueues_marker() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let event = event();

            event.record(&queue).unwrap();

            let handle = event.completion_handle().unwrap();
            assert!(event.is_recorded());
            assert!(handle.is_timed());
            assert!(Arc::ptr_eq(&queue.last_enqueued().unwrap(), &handle));

            event.synchronize();
            assert_eq!(event.query(), EventStatus::Ready);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn record_reuses_last_user_visible_command() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let work = queue.enqueue_work(|| {}).unwrap();
            let event = event();

            event.record(&queue).unwrap();

            assert!(Arc::ptr_eq(&event.completion_handle().unwrap(), &work));
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn record_after_internal_barrier_enqueues_new_marker() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            queue.finish().unwrap();
            let barrier = queue.last_enqueued().unwrap();

            let event = event();
            event.record(&queue).unwrap();

            let handle = event.completion_handle().unwrap();
            assert!(!Arc::ptr_eq(&handle, &barrier));
            assert!(handle.is_user_visible());
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn record_on_non_profiling_queue_always_enqueues_untimed_marker() {
        testing::with_watchdog(|| {
            let queue = HostQueue::builder().profiling(false).build();
            let event = event();

            event.record(&queue).unwrap();
            let first = event.completion_handle().unwrap();

            event.record(&queue).unwrap();
            let second = event.completion_handle().unwrap();

            assert!(!Arc::ptr_eq(&first, &second));
            assert!(!second.is_timed());
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn re_record_at_same_position_keeps_reference_count() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            // Keeps the worker from releasing the marker between the two counts.
            queue.pause();
            let event = event();

            event.record(&queue).unwrap();
            let handle = event.completion_handle().unwrap();
            let references_before = Arc::strong_count(&handle);

            event.record(&queue).unwrap();

            assert!(Arc::ptr_eq(&event.completion_handle().unwrap(), &handle));
            assert_eq!(Arc::strong_count(&handle), references_before);

            queue.resume();
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn rebinding_releases_previous_position() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let event = event();

            event.record(&queue).unwrap();
            let first = event.completion_handle().unwrap();

            queue.enqueue_work(|| {}).unwrap();
            event.record(&queue).unwrap();

            // Once the worker is done with the marker, only our local clone is left.
            queue.finish().unwrap();
            assert_eq!(Arc::strong_count(&first), 1);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn record_reuses_completed_command_released_by_worker() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let work = Arc::downgrade(&queue.enqueue_work(|| {}).unwrap());

            // Only the queue itself still holds the finished work.
            assert!(testing::eventually(|| work.strong_count() == 1));

            let event = event();
            event.record(&queue).unwrap();

            let handle = event.completion_handle().unwrap();
            assert!(Arc::ptr_eq(&handle, &work.upgrade().unwrap()));
            assert_eq!(handle.kind(), CommandKind::Work);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn attach_command_rejects_command_of_other_queue() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let other = HostQueue::new();
            let work = other.enqueue_work(|| {}).unwrap();
            let event = event();

            assert!(matches!(
                event.attach_command(&queue, work),
                Err(Error::InvalidValue { .. })
            ));
            assert!(event.completion_handle().is_none());
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn attach_command_binds_without_recording() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let work = queue.enqueue_work(|| {}).unwrap();
            let event = event();

            event.attach_command(&queue, Arc::clone(&work)).unwrap();

            assert!(!event.is_recorded());
            assert!(Arc::ptr_eq(&event.completion_handle().unwrap(), &work));
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn query_reports_not_ready_while_queue_is_paused() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            queue.pause();
            queue.enqueue_work(|| {}).unwrap();

            let event = event();
            event.record(&queue).unwrap();

            assert_eq!(event.query(), EventStatus::NotReady);
            assert_eq!(
                event.completion_handle().unwrap().status(),
                CommandStatus::Pending
            );

            queue.resume();
            event.synchronize();

            assert_eq!(event.query(), EventStatus::Ready);
            event.synchronize();
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_to_self() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let event = event();

            assert!(matches!(
                event.elapsed_time(&event),
                Err(Error::InvalidHandle { .. })
            ));

            event.record(&queue).unwrap();
            event.synchronize();

            assert_millis(event.elapsed_time(&event).unwrap(), 0.0);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_to_self_requires_completion() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            queue.pause();

            let event = event();
            event.record(&queue).unwrap();

            assert!(matches!(event.elapsed_time(&event), Err(Error::NotReady)));

            queue.resume();
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_with_disabled_timing_is_invalid_even_when_pending() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            queue.pause();

            let untimed = Event::new(EventFlags::DISABLE_TIMING).unwrap();
            let timed = event();
            untimed.record(&queue).unwrap();
            timed.record(&queue).unwrap();

            assert!(matches!(
                untimed.elapsed_time(&untimed),
                Err(Error::InvalidHandle { .. })
            ));
            assert!(matches!(
                untimed.elapsed_time(&timed),
                Err(Error::InvalidHandle { .. })
            ));
            assert!(matches!(
                timed.elapsed_time(&untimed),
                Err(Error::InvalidHandle { .. })
            ));

            queue.resume();
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_requires_both_recorded() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let recorded = event();
            let unrecorded = event();
            recorded.record(&queue).unwrap();
            recorded.synchronize();

            assert!(matches!(
                recorded.elapsed_time(&unrecorded),
                Err(Error::InvalidHandle { .. })
            ));
            assert!(matches!(
                unrecorded.elapsed_time(&recorded),
                Err(Error::InvalidHandle { .. })
            ));
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_pending_pair_is_not_ready() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let start = event();
            start.record(&queue).unwrap();
            start.synchronize();

            queue.pause();
            queue.enqueue_work(|| {}).unwrap();
            let stop = event();
            stop.record(&queue).unwrap();

            assert!(matches!(start.elapsed_time(&stop), Err(Error::NotReady)));
            assert!(matches!(stop.elapsed_time(&start), Err(Error::NotReady)));

            queue.resume();
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_between_distinct_recorded_positions() {
        testing::with_watchdog(|| {
            let queue = deterministic_queue();
            let start = event();
            let stop = event();

            // Marker runs 1..2 ms, work 3..4 ms.
            start.record(&queue).unwrap();
            queue.enqueue_work(|| {}).unwrap();
            stop.record(&queue).unwrap();
            stop.synchronize();

            assert_millis(start.elapsed_time(&stop).unwrap(), 2.0);
            assert_millis(stop.elapsed_time(&start).unwrap(), -2.0);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_between_shared_position_measures_fresh_marker() {
        testing::with_watchdog(|| {
            let queue = deterministic_queue();
            let start = event();
            let stop = event();

            // Both bind to the marker running 1..2 ms.
            start.record(&queue).unwrap();
            stop.record(&queue).unwrap();
            stop.synchronize();

            let shared = start.completion_handle().unwrap();
            assert!(Arc::ptr_eq(&shared, &stop.completion_handle().unwrap()));

            // The fresh marker runs 3..4 ms.
            assert_millis(start.elapsed_time(&stop).unwrap(), 2.0);

            let fresh = queue.last_enqueued().unwrap();
            assert!(!Arc::ptr_eq(&fresh, &shared));
            assert_eq!(fresh.status(), CommandStatus::Complete);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_around_completed_work_measures_the_work() {
        testing::with_watchdog(|| {
            let queue = deterministic_queue();
            let start = event();
            let stop = event();

            for _ in 0..20 {
                start.record(&queue).unwrap();

                let work = Arc::downgrade(&queue.enqueue_work(|| {}).unwrap());
                assert!(testing::eventually(|| work.strong_count() == 1));

                stop.record(&queue).unwrap();
                assert!(Arc::ptr_eq(
                    &stop.completion_handle().unwrap(),
                    &work.upgrade().unwrap()
                ));

                // The work ends two clock steps after the command `start` is bound to.
                assert_millis(start.elapsed_time(&stop).unwrap(), 2.0);
            }
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_at_shared_position_released_by_worker() {
        testing::with_watchdog(|| {
            let queue = deterministic_queue();
            let start = event();
            let stop = event();

            // The marker runs 1..2 ms.
            start.record(&queue).unwrap();
            let marker = Arc::downgrade(&start.completion_handle().unwrap());

            // Held by the event and by the queue, no longer by the worker.
            assert!(testing::eventually(|| marker.strong_count() == 2));

            stop.record(&queue).unwrap();
            assert!(Arc::ptr_eq(
                &stop.completion_handle().unwrap(),
                &marker.upgrade().unwrap()
            ));

            // The fresh marker runs 3..4 ms.
            assert_millis(start.elapsed_time(&stop).unwrap(), 2.0);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_at_shared_position_of_dropped_queue_fails() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let start = event();
            let stop = event();

            start.record(&queue).unwrap();
            stop.record(&queue).unwrap();
            stop.synchronize();
            drop(queue);

            assert!(matches!(
                start.elapsed_time(&stop),
                Err(Error::ResourceExhausted { .. })
            ));
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_between_implicit_bindings_spans_the_command() {
        testing::with_watchdog(|| {
            let queue = deterministic_queue();
            let start = event();
            let stop = event();

            // Work runs 1..2 ms.
            let work = queue.enqueue_work(|| {}).unwrap();
            start.attach_command(&queue, Arc::clone(&work)).unwrap();
            stop.attach_command(&queue, work).unwrap();
            stop.synchronize();

            assert_millis(start.elapsed_time(&stop).unwrap(), 1.0);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_mixed_binding_uses_start_of_first_command() {
        testing::with_watchdog(|| {
            let queue = deterministic_queue();
            let start = event();
            let stop = event();

            // First work runs 1..2 ms, second 3..4 ms.
            let first = queue.enqueue_work(|| {}).unwrap();
            start.attach_command(&queue, first).unwrap();
            queue.enqueue_work(|| {}).unwrap();
            stop.record(&queue).unwrap();
            stop.synchronize();

            assert_millis(start.elapsed_time(&stop).unwrap(), 3.0);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn elapsed_time_on_non_profiling_queue_is_invalid() {
        testing::with_watchdog(|| {
            let queue = HostQueue::builder().profiling(false).build();
            let start = event();
            let stop = event();

            start.record(&queue).unwrap();
            stop.record(&queue).unwrap();
            stop.synchronize();

            assert!(matches!(
                start.elapsed_time(&stop),
                Err(Error::InvalidHandle { .. })
            ));
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn reversed_concurrent_elapsed_time_does_not_deadlock() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let first = Arc::new(event());
            let second = Arc::new(event());

            first.record(&queue).unwrap();
            queue.enqueue_work(|| {}).unwrap();
            second.record(&queue).unwrap();
            second.synchronize();

            let forward = {
                let (first, second) = (Arc::clone(&first), Arc::clone(&second));
                thread::spawn(move || {
                    (0..1000)
                        .map(|_| first.elapsed_time(&second).unwrap())
                        .last()
                        .unwrap()
                })
            };

            let backward = {
                let (first, second) = (Arc::clone(&first), Arc::clone(&second));
                thread::spawn(move || {
                    (0..1000)
                        .map(|_| second.elapsed_time(&first).unwrap())
                        .last()
                        .unwrap()
                })
            };

            let forward = forward.join().unwrap();
            let backward = backward.join().unwrap();

            assert!(forward >= 0.0);
            assert_millis(forward, -backward);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn stream_wait_without_recording_does_nothing() {
        testing::with_watchdog(|| {
            let target = HostQueue::new();
            let event = event();

            event.stream_wait(&target).unwrap();

            assert!(target.last_enqueued().is_none());
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn stream_wait_on_own_queue_does_nothing() {
        testing::with_watchdog(|| {
            let queue = HostQueue::new();
            let event = event();
            event.record(&queue).unwrap();
            let position = queue.last_enqueued().unwrap();

            event.stream_wait(&queue).unwrap();

            assert!(Arc::ptr_eq(&queue.last_enqueued().unwrap(), &position));
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn stream_wait_enqueues_dependent_marker_on_target() {
        testing::with_watchdog(|| {
            let source = HostQueue::new();
            let target = HostQueue::new();
            source.pause();

            let event = event();
            source.enqueue_work(|| {}).unwrap();
            event.record(&source).unwrap();

            event.stream_wait(&target).unwrap();

            let marker = target.last_enqueued().unwrap();
            assert!(marker.is_user_visible());

            // The marker cannot complete while the source is held back.
            assert_eq!(marker.status(), CommandStatus::Pending);

            source.resume();
            marker.await_completion();
            assert_eq!(event.query(), EventStatus::Ready);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn stream_wait_fails_when_source_cannot_progress() {
        testing::with_watchdog(|| {
            let source = HostQueue::new();
            let target = HostQueue::new();

            let event = event();
            event.record(&source).unwrap();
            source.shutdown();

            assert!(matches!(
                event.stream_wait(&target),
                Err(Error::ResourceExhausted { .. })
            ));
            assert!(target.last_enqueued().is_none());
        });
    }

    #[test]
    fn millis_between_is_signed() {
        assert_millis(millis_between(1_000_000, 3_500_000), 2.5);
        assert_millis(millis_between(3_500_000, 1_000_000), -2.5);
        assert_millis(millis_between(7, 7), 0.0);
    }

    #[test]
    fn debug_does_not_block() {
        let event = event();
        let _guard = event.binding.lock();

        let text = format!("{event:?}");

        assert!(text.contains("ordinal"));
    }
}
