//! # IQStream RS
//!
//! A Rust library for pulling raw CS8 (8-bit signed complex) samples from a radio
//! receiver as fixed-size bursts.
//!
//! The acquisition engine is written against a small capability set
//! ([`Cs8Capability`]) rather than a concrete driver, so the same code runs on real
//! hardware through SoapySDR and on the deterministic [`StubDevice`] in tests.
//!
//! ## Features
//!
//! - **Stream lifecycle**: setup, activate, deactivate and close with the state checks
//!   enforced by [`Cs8Stream`]
//! - **Burst accumulation**: reads of any size are satisfied across as many short
//!   hardware bursts as needed, guarded against backends that stop making progress
//! - **CF64 conversion**: samples cast index-for-index to `f64` for downstream code
//! - **Explicit logging**: every call takes a [`StreamLog`] context instead of relying
//!   on a process-wide logger
//! - **SoapySDR backend**: enable the `soapy` cargo feature for [`SoapyDevice`]
//!
//! ## Examples
//!
//! ### Reading a burst
//!
//! ```rust
//! use iqstream_rs::{Cs8Stream, StreamFlags, StreamLog, StubDevice};
//!
//! let device = StubDevice::builder().bursts([5000, 3000, 2000]).build();
//! let log = StreamLog::global();
//!
//! let mut stream = Cs8Stream::setup(&device, &log)?;
//! stream.activate(&log, StreamFlags::NONE, 0, 0)?;
//!
//! let mtu = stream.mtu(&log)?;
//! let mut buffer = vec![0i8; 2 * mtu];
//! let mut flags = [StreamFlags::NONE];
//! let result = stream.read_cs8(&log, &mut [buffer.as_mut_slice()], mtu, &mut flags, 100_000)?;
//! assert_eq!(result.elements_read, mtu);
//!
//! stream.deactivate(&log, StreamFlags::NONE, 0)?;
//! stream.close(&log)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Floating-point samples
//!
//! ```rust
//! use iqstream_rs::{Cs8Stream, StreamConfig, StreamFlags, StreamLog, StubDevice};
//!
//! let device = StubDevice::new();
//! let log = StreamLog::global();
//! let config = StreamConfig::builder().max_stalled_bursts(8).build();
//!
//! let mut stream = Cs8Stream::setup_with_config(&device, &config, &log)?;
//! stream.activate(&log, StreamFlags::NONE, 0, 0)?;
//!
//! let mut cf64 = vec![0.0f64; 2 * 1024];
//! let mut flags = StreamFlags::NONE;
//! stream.read_cf64(&log, &mut cf64, 1024, &mut flags, config.read_timeout_us())?;
//! assert_eq!(cf64[3], f64::from(StubDevice::sample_value(3)));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Checking formats before setup
//!
//! ```rust
//! use iqstream_rs::{stream_formats, StreamLog, StubDevice};
//!
//! let device = StubDevice::new();
//! let log = StreamLog::global();
//! if stream_formats::supports_cs8(&device, &log) {
//!     let formats = stream_formats::stream_formats(&device, &log)?;
//!     println!("Formats: {:?}", formats);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod capability;
pub mod cs8_stream;
#[cfg(feature = "soapy")]
pub mod soapy_device;
pub mod stream_config;
pub mod stream_formats;
pub mod stream_log;
pub mod stub_device;

// Re-export the main types for convenience
pub use capability::{
    Burst, Cs8Capability, DeviceError, DeviceErrorKind, Direction, NativeStream, StreamArgs,
    StreamFlags,
};

pub use cs8_stream::{Cs8Stream, ReadResult, StreamError, StreamState};

pub use stream_config::{StreamConfig, StreamConfigBuilder};

pub use stream_formats::StreamFormats;

pub use stream_log::StreamLog;

pub use stub_device::{StubCalls, StubDevice, StubDeviceBuilder};

#[cfg(feature = "soapy")]
pub use soapy_device::SoapyDevice;
