use crate::capability::{Cs8Capability, DeviceError, Direction, NativeStream, StreamFlags};
use crate::stream_config::StreamConfig;
use crate::stream_log::StreamLog;
use std::fmt;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Could not set up stream: {0}")]
    Setup(#[source] DeviceError),

    #[error("Could not close stream: {0}")]
    Close(#[source] DeviceError),

    #[error("Could not activate stream: {0}")]
    Activation(#[source] DeviceError),

    #[error("Could not deactivate stream: {0}")]
    Deactivation(#[source] DeviceError),

    #[error("Could not query stream MTU: {0}")]
    Mtu(#[source] DeviceError),

    #[error("Attempting to read from an inactive stream")]
    InactiveStream,

    #[error("Attempting to deactivate a stream that is not active")]
    AlreadyInactive,

    #[error("Attempting to activate a stream that is already active")]
    AlreadyActive,

    #[error("Attempting to use a stream that has been closed")]
    Closed,

    #[error("Attempting to close a stream that is still active")]
    CloseWhileActive,

    #[error("Buffer too small: {required} components required, {actual} available")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("Read failed after {elements_read} elements: {source}")]
    Read {
        #[source]
        source: DeviceError,
        /// Elements copied before the failing burst. They are not validated.
        elements_read: usize,
        /// Timestamp of the last successful burst, 0 if there was none.
        time_ns: i64,
    },

    #[error("Backend returned {returned} elements for a burst of {requested}")]
    BurstOverrun { requested: usize, returned: usize },

    #[error("Read stalled: {bursts} consecutive empty bursts after {elements_read} elements")]
    Stalled { bursts: usize, elements_read: usize },

    #[error("Could not retrieve stream format: {0}")]
    Format(#[source] DeviceError),

    #[error("No stream formats retrieved for channel 0")]
    NoStreamFormats,
}

/// Result of a completed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResult {
    /// Timestamp reported with the most recent burst.
    pub time_ns: i64,
    pub elements_read: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Inactive,
    Active,
    Closed,
}

/// A CS8 receive stream on channel 0.
///
/// The handle exclusively owns its native stream token and borrows the capability set
/// that services it. It is not meant to be shared between callers; the `&mut self`
/// receivers enforce that.
///
/// A handle that is dropped while still open is deactivated (if needed) and closed,
/// ignoring backend errors. Call [`Cs8Stream::close`] to observe them.
pub struct Cs8Stream<'d, C: Cs8Capability + ?Sized> {
    native: Option<NativeStream>,
    device: &'d C,
    active: bool,
    max_stalled_bursts: usize,
}

impl<'d, C: Cs8Capability + ?Sized> Cs8Stream<'d, C> {
    pub const CHANNEL: usize = 0;

    /// Set up an RX stream on channel 0 with the default configuration.
    ///
    /// All stream calls are usable once this returns, regardless of activity state.
    pub fn setup(device: &'d C, log: &StreamLog<'_>) -> Result<Self, StreamError> {
        Self::setup_with_config(device, &StreamConfig::default(), log)
    }

    pub fn setup_with_config(
        device: &'d C,
        config: &StreamConfig,
        log: &StreamLog<'_>,
    ) -> Result<Self, StreamError> {
        let args = config.setup_args();
        match device.setup_stream(Direction::Rx, &[Self::CHANNEL], &args) {
            Ok(native) => {
                log.debug(format_args!("CS8 stream setup complete."));
                Ok(Self {
                    native: Some(native),
                    device,
                    active: false,
                    max_stalled_bursts: config.max_stalled_bursts(),
                })
            }
            Err(e) => {
                log.error(format_args!("Could not set up stream: {e}"));
                Err(StreamError::Setup(e))
            }
        }
    }

    pub fn state(&self) -> StreamState {
        match (&self.native, self.active) {
            (None, _) => StreamState::Closed,
            (Some(_), true) => StreamState::Active,
            (Some(_), false) => StreamState::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_closed(&self) -> bool {
        self.native.is_none()
    }

    fn native(&self, log: &StreamLog<'_>, operation: &str) -> Result<&NativeStream, StreamError> {
        self.native.as_ref().ok_or_else(|| {
            log.error(format_args!(
                "Attempting to {operation} a stream that has been closed."
            ));
            StreamError::Closed
        })
    }

    /// Close the stream. The stream must be deactivated first.
    ///
    /// After a successful close every further operation fails with
    /// [`StreamError::Closed`]. A failed close leaves the stream open.
    pub fn close(&mut self, log: &StreamLog<'_>) -> Result<(), StreamError> {
        let native = self.native(log, "close")?;
        if self.active {
            log.error(format_args!(
                "Attempting to close a stream that is still active."
            ));
            return Err(StreamError::CloseWhileActive);
        }

        if let Err(e) = self.device.close_stream(native) {
            log.error(format_args!("Could not close a stream: {e}"));
            return Err(StreamError::Close(e));
        }

        self.native = None;
        log.debug(format_args!("Stream closed."));
        Ok(())
    }

    /// Maximum number of elements a single burst may carry. Never zero.
    pub fn mtu(&self, log: &StreamLog<'_>) -> Result<usize, StreamError> {
        let native = self.native(log, "query the MTU of")?;
        let mtu = self.device.mtu(native).map_err(|e| {
            log.error(format_args!("Could not retrieve CS8 stream MTU: {e}"));
            StreamError::Mtu(e)
        })?;

        if mtu == 0 {
            log.error(format_args!("CS8 stream reported an MTU of 0."));
            return Err(StreamError::Mtu(DeviceError::other(
                "backend reported an MTU of 0",
            )));
        }

        log.debug(format_args!("CS8 stream MTU is {mtu}"));
        Ok(mtu)
    }

    /// Activate the stream so that it can be read.
    ///
    /// `time_ns` is honoured by the backend only with `StreamFlags::HAS_TIME`;
    /// `num_elems` requests a finite burst (0 for continuous streaming). A failed
    /// activation leaves the stream inactive.
    pub fn activate(
        &mut self,
        log: &StreamLog<'_>,
        flags: StreamFlags,
        time_ns: i64,
        num_elems: usize,
    ) -> Result<(), StreamError> {
        let native = self.native(log, "activate")?;
        if self.active {
            log.error(format_args!(
                "Attempting to activate a stream that is already active."
            ));
            return Err(StreamError::AlreadyActive);
        }

        if let Err(e) = self.device.activate(native, flags, time_ns, num_elems) {
            log.error(format_args!(
                "Error attempting to activate CS8 stream: {e}"
            ));
            self.active = false;
            return Err(StreamError::Activation(e));
        }

        self.active = true;
        log.debug(format_args!("CS8 stream activated."));
        Ok(())
    }

    /// Deactivate an active stream.
    ///
    /// The stream is left inactive even when the backend reports an error.
    pub fn deactivate(
        &mut self,
        log: &StreamLog<'_>,
        flags: StreamFlags,
        time_ns: i64,
    ) -> Result<(), StreamError> {
        let native = self.native(log, "deactivate")?;
        if !self.active {
            log.error(format_args!(
                "Attempting to deactivate a stream that is not active."
            ));
            return Err(StreamError::AlreadyInactive);
        }

        let result = self.device.deactivate(native, flags, time_ns);
        self.active = false;

        match result {
            Ok(()) => {
                log.debug(format_args!("CS8 stream deactivated."));
                Ok(())
            }
            Err(e) => {
                log.error(format_args!(
                    "Error encountered deactivating a stream: {e}"
                ));
                Err(StreamError::Deactivation(e))
            }
        }
    }

    fn ensure_readable(&self, log: &StreamLog<'_>) -> Result<&NativeStream, StreamError> {
        let native = self.native(log, "read from")?;
        if !self.active {
            log.error(format_args!("Attempting to read from an inactive stream."));
            return Err(StreamError::InactiveStream);
        }
        Ok(native)
    }

    /// Read exactly `elements_to_read` complex samples into `buffers[0]`.
    ///
    /// Bursts are pulled through an MTU-sized scratch buffer until the request is
    /// satisfied; each burst asks for at most the remaining count. Samples land
    /// interleaved (I, Q, I, Q, ...) at component offset `2 * elements_already_read`, so
    /// `buffers[0]` must hold at least `2 * elements_to_read` components.
    ///
    /// `output_flags` holds the flags of the most recent burst. The first failing burst
    /// aborts the read; the error carries how far it got, but those samples must be
    /// treated as unvalidated. On precondition failures the buffer is left untouched.
    pub fn read_cs8(
        &mut self,
        log: &StreamLog<'_>,
        buffers: &mut [&mut [i8]],
        elements_to_read: usize,
        output_flags: &mut [StreamFlags; 1],
        timeout_us: i64,
    ) -> Result<ReadResult, StreamError> {
        #[cfg(feature = "cpu-profiling")]
        let _span = tracy_client::span!("read_cs8");

        let native = self.ensure_readable(log)?;

        let required = elements_to_read.saturating_mul(2);
        let available = buffers.first().map_or(0, |b| b.len());
        if available < required {
            log.error(format_args!(
                "CS8 buffer holds {available} components, {required} required to read {elements_to_read} elements."
            ));
            return Err(StreamError::BufferTooSmall {
                required,
                actual: available,
            });
        }
        let Some(dest) = buffers.first_mut() else {
            return Err(StreamError::BufferTooSmall {
                required,
                actual: 0,
            });
        };

        let mtu = self.mtu(log)?;
        let mut scratch = vec![0i8; 2 * mtu];
        let mut elements_read = 0usize;
        let mut time_ns = 0i64;
        let mut stalled_bursts = 0usize;
        let start = Instant::now();

        while elements_read < elements_to_read {
            let requested = (elements_to_read - elements_read).min(mtu);
            let burst = match self.device.read_raw(
                native,
                &mut [scratch.as_mut_slice()],
                requested,
                output_flags,
                timeout_us,
            ) {
                Ok(burst) => burst,
                Err(e) => {
                    log.error(format_args!(
                        "Error encountered while reading CS8 data ({elements_read} of {elements_to_read} elements read): {e}"
                    ));
                    return Err(StreamError::Read {
                        source: e,
                        elements_read,
                        time_ns,
                    });
                }
            };

            if burst.count > requested {
                log.error(format_args!(
                    "Backend returned {} elements for a burst of {requested}.",
                    burst.count
                ));
                return Err(StreamError::BurstOverrun {
                    requested,
                    returned: burst.count,
                });
            }
            if !output_flags[0].is_empty() {
                log.debug(format_args!("Flags = {}", output_flags[0]));
            }
            log.debug(format_args!("Elements read: {}", burst.count));

            if burst.count == 0 {
                stalled_bursts += 1;
                if stalled_bursts > self.max_stalled_bursts {
                    log.error(format_args!(
                        "CS8 read stalled after {stalled_bursts} empty bursts ({elements_read} of {elements_to_read} elements read)."
                    ));
                    return Err(StreamError::Stalled {
                        bursts: stalled_bursts,
                        elements_read,
                    });
                }
                continue;
            }
            stalled_bursts = 0;

            // Indexed copy into a preallocated buffer, not growth by append.
            let offset = 2 * elements_read;
            let len = 2 * burst.count;
            dest[offset..offset + len].copy_from_slice(&scratch[..len]);

            elements_read += burst.count;
            time_ns = burst.time_ns;
        }

        log.debug(format_args!(
            "Time to read CS8 data: {} μs",
            start.elapsed().as_micros()
        ));
        Ok(ReadResult {
            time_ns,
            elements_read,
        })
    }

    /// Read `elements_to_read` samples and cast each I/Q component to `f64`.
    ///
    /// Values are not rescaled: a CS8 component of -2 becomes -2.0. `cf64` must hold at
    /// least `2 * elements_to_read` values and is only written when the read succeeds.
    pub fn read_cf64(
        &mut self,
        log: &StreamLog<'_>,
        cf64: &mut [f64],
        elements_to_read: usize,
        output_flags: &mut StreamFlags,
        timeout_us: i64,
    ) -> Result<ReadResult, StreamError> {
        self.ensure_readable(log)?;

        let required = elements_to_read.saturating_mul(2);
        if cf64.len() < required {
            log.error(format_args!(
                "CF64 buffer holds {} values, {required} required to read {elements_to_read} elements.",
                cf64.len()
            ));
            return Err(StreamError::BufferTooSmall {
                required,
                actual: cf64.len(),
            });
        }

        let mut cs8 = vec![0i8; required];
        let mut flags = [StreamFlags::NONE];
        let result = self.read_cs8(
            log,
            &mut [cs8.as_mut_slice()],
            elements_to_read,
            &mut flags,
            timeout_us,
        )?;
        *output_flags = flags[0];

        #[cfg(feature = "cpu-profiling")]
        let _span = tracy_client::span!("cs8_to_cf64");

        let start = Instant::now();
        let len = 2 * result.elements_read;
        for (dst, &src) in cf64[..len].iter_mut().zip(&cs8[..len]) {
            *dst = f64::from(src);
        }
        log.debug(format_args!(
            "Time to convert CS8 data to CF64 data: {} μs",
            start.elapsed().as_micros()
        ));

        Ok(result)
    }
}

impl<C: Cs8Capability + ?Sized> Drop for Cs8Stream<'_, C> {
    fn drop(&mut self) {
        if let Some(native) = self.native.take() {
            if self.active {
                let _ = self.device.deactivate(&native, StreamFlags::NONE, 0); // Ignore errors here
                self.active = false;
            }
            let _ = self.device.close_stream(&native);
        }
    }
}

impl<C: Cs8Capability + ?Sized> fmt::Debug for Cs8Stream<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cs8Stream")
            .field("native", &self.native)
            .field("active", &self.active)
            .field("max_stalled_bursts", &self.max_stalled_bursts)
            .finish_non_exhaustive()
    }
}
