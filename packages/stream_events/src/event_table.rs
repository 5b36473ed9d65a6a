use std::collections::HashMap;
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{Error, Event, EventFlags, EventStatus, Queue, Result};

/// Opaque identifier of an event registered in an [`EventTable`].
///
/// Identifiers are never reused, so a handle to a destroyed event stays invalid forever.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct EventHandle(u64);

impl Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// Owns events on behalf of callers that refer to them by opaque [`EventHandle`]s.
///
/// This is the checked entry point for event operations: every call validates the handle it
/// is given and fails with [`Error::InvalidHandle`] for handles that were never issued or
/// whose event has been destroyed.
///
/// # Example
///
/// ```rust
/// use stream_events::{EventStatus, EventTable, HostQueue};
///
/// let table = EventTable::new();
/// let producer = HostQueue::new();
/// let consumer = HostQueue::new();
///
/// let ready = table.create_default().unwrap();
/// producer.enqueue_work(|| println!("producing")).unwrap();
/// table.record(ready, &producer).unwrap();
///
/// // Work enqueued on the consumer from now on starts only after the producer's work.
/// table.stream_wait(ready, &consumer).unwrap();
/// consumer.enqueue_work(|| println!("consuming")).unwrap();
///
/// table.synchronize(ready).unwrap();
/// assert_eq!(table.query(ready).unwrap(), EventStatus::Ready);
///
/// table.destroy(ready).unwrap();
/// assert!(table.query(ready).is_err());
/// ```
pub struct EventTable<Q: Queue> {
    events: RwLock<HashMap<EventHandle, Arc<Event<Q>>>>,
    next_handle: AtomicU64,
    max_events: Option<NonZero<usize>>,
}

impl<Q: Queue> EventTable<Q> {
    /// Creates a table without a limit on the number of events.
    ///
    /// Use [`EventTable::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a table.
    #[must_use]
    pub fn builder() -> EventTableBuilder<Q> {
        EventTableBuilder::new()
    }

    /// Creates an event from a raw flag bitmask.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidValue`] if the bitmask contains unrecognized bits or both release
    ///   flags.
    /// * [`Error::OutOfMemory`] if the table is full or cannot grow.
    pub fn create(&self, raw_flags: u32) -> Result<EventHandle> {
        let flags = EventFlags::from_raw(raw_flags)?;
        let event = Arc::new(Event::new(flags)?);

        let mut events = self.events.write();

        if self.max_events.is_some_and(|max| events.len() >= max.get()) {
            return Err(Error::OutOfMemory {
                problem: "the event table has reached its configured capacity",
            });
        }

        events
            .try_reserve(1)
            .map_err(|_reserve_error| Error::OutOfMemory {
                problem: "the event table cannot grow",
            })?;

        let handle = EventHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        events.insert(handle, event);

        debug!(event = %handle, ?flags, "event created");

        Ok(handle)
    }

    /// Creates an event with [`EventFlags::DEFAULT`].
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] if the table is full or cannot grow.
    pub fn create_default(&self) -> Result<EventHandle> {
        self.create(EventFlags::DEFAULT.bits())
    }

    /// Destroys an event, releasing its bound position.
    ///
    /// Calls already in progress on the event on other threads finish normally.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHandle`] if the handle is unknown or already destroyed.
    pub fn destroy(&self, handle: EventHandle) -> Result<()> {
        self.events
            .write()
            .remove(&handle)
            .ok_or(Error::InvalidHandle {
                problem: "unknown or destroyed event",
            })?;

        debug!(event = %handle, "event destroyed");

        Ok(())
    }

    /// The event behind a handle.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHandle`] if the handle is unknown or destroyed.
    pub fn get(&self, handle: EventHandle) -> Result<Arc<Event<Q>>> {
        self.events
            .read()
            .get(&handle)
            .cloned()
            .ok_or(Error::InvalidHandle {
                problem: "unknown or destroyed event",
            })
    }

    /// See [`Event::record()`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHandle`] for an unknown handle, otherwise the queue's error if a marker
    /// cannot be enqueued.
    pub fn record(&self, handle: EventHandle, queue: &Q) -> Result<()> {
        trace!(event = %handle, queue = %queue.id(), "record");
        self.get(handle)?.record(queue)
    }

    /// See [`Event::query()`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHandle`] for an unknown handle.
    pub fn query(&self, handle: EventHandle) -> Result<EventStatus> {
        Ok(self.get(handle)?.query())
    }

    /// See [`Event::synchronize()`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHandle`] for an unknown handle.
    pub fn synchronize(&self, handle: EventHandle) -> Result<()> {
        trace!(event = %handle, "synchronize");
        self.get(handle)?.synchronize();
        Ok(())
    }

    /// See [`Event::elapsed_time()`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHandle`] for an unknown handle, otherwise as [`Event::elapsed_time()`].
    pub fn elapsed_time(&self, start: EventHandle, stop: EventHandle) -> Result<f32> {
        let start_event = self.get(start)?;
        let stop_event = self.get(stop)?;

        let millis = start_event.elapsed_time(&stop_event)?;

        trace!(%start, %stop, millis, "elapsed time");

        Ok(millis)
    }

    /// See [`Event::stream_wait()`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHandle`] for an unknown handle, otherwise as [`Event::stream_wait()`].
    pub fn stream_wait(&self, handle: EventHandle, queue: &Q) -> Result<()> {
        trace!(event = %handle, queue = %queue.id(), "stream wait");
        self.get(handle)?.stream_wait(queue)
    }

    /// Number of live events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the table holds no live events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl<Q: Queue> Default for EventTable<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: Queue> fmt::Debug for EventTable<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTable")
            .field("len", &self.len())
            .field("max_events", &self.max_events)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring an [`EventTable`].
///
/// # Example
///
/// ```rust
/// use std::num::NonZero;
///
/// use stream_events::{EventTable, HostQueue};
///
/// let table: EventTable<HostQueue> = EventTable::builder()
///     .max_events(NonZero::new(64).unwrap())
///     .build();
///
/// assert!(table.is_empty());
/// ```
#[derive(Debug)]
pub struct EventTableBuilder<Q: Queue> {
    max_events: Option<NonZero<usize>>,

    _queue: PhantomData<fn() -> Q>,
}

impl<Q: Queue> EventTableBuilder<Q> {
    fn new() -> Self {
        Self {
            max_events: None,
            _queue: PhantomData,
        }
    }

    /// Limits how many events may be alive at the same time. Creating more fails with
    /// [`Error::OutOfMemory`].
    ///
    /// Default is unlimited.
    #[must_use]
    pub fn max_events(mut self, max_events: NonZero<usize>) -> Self {
        self.max_events = Some(max_events);
        self
    }

    /// Builds the table.
    #[must_use]
    pub fn build(self) -> EventTable<Q> {
        EventTable {
            events: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            max_events: self.max_events,
        }
    }
}
