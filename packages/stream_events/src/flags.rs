use bitflags::bitflags;

use crate::{Error, Result};

bitflags! {
    /// Creation flags of an [`Event`][crate::Event].
    ///
    /// The flags are fixed for the lifetime of the event. [`EventFlags::DEFAULT`] (the empty
    /// set) creates an event that captures timing data.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct EventFlags: u32 {
        /// Waiting threads should block instead of spinning.
        const BLOCKING_SYNC = 0x1;

        /// The event does not capture timing data and cannot be used to measure elapsed time.
        const DISABLE_TIMING = 0x2;

        /// Memory written before the event is made visible to the device when it completes.
        ///
        /// Mutually exclusive with [`EventFlags::RELEASE_TO_SYSTEM`].
        const RELEASE_TO_DEVICE = 0x4000_0000;

        /// Memory written before the event is made visible to the whole system when it
        /// completes.
        ///
        /// Mutually exclusive with [`EventFlags::RELEASE_TO_DEVICE`].
        const RELEASE_TO_SYSTEM = 0x8000_0000;
    }
}

impl EventFlags {
    /// No flags set: a timing-capable event with default release semantics.
    pub const DEFAULT: Self = Self::empty();

    const RELEASE_SCOPES: Self = Self::RELEASE_TO_DEVICE.union(Self::RELEASE_TO_SYSTEM);

    /// Interprets a raw flag bitmask, rejecting anything an event cannot be created with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if the bitmask contains a bit that is not a recognized
    /// flag or if both release flags are set.
    pub fn from_raw(bits: u32) -> Result<Self> {
        let flags = Self::from_bits_retain(bits);
        flags.validate()?;
        Ok(flags)
    }

    /// Whether events with these flags are excluded from elapsed-time measurement.
    #[must_use]
    pub fn timing_disabled(self) -> bool {
        self.contains(Self::DISABLE_TIMING)
    }

    pub(crate) fn validate(self) -> Result<()> {
        let unrecognized = self.bits() & !Self::all().bits();

        if unrecognized != 0 {
            return Err(Error::InvalidValue {
                problem: format!("unrecognized event flag bits {unrecognized:#x}"),
            });
        }

        if self.contains(Self::RELEASE_SCOPES) {
            return Err(Error::InvalidValue {
                problem: "RELEASE_TO_DEVICE and RELEASE_TO_SYSTEM are mutually exclusive"
                    .to_string(),
            });
        }

        Ok(())
    }
}
