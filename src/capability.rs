use std::collections::BTreeMap;
use std::fmt;

/// Stream direction as seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Rx => "RX",
            Direction::Tx => "TX",
        }
    }
}

/// Status and control bits exchanged with a backend on activate, deactivate and read.
///
/// Bit positions follow the SoapySDR stream flag layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StreamFlags(i32);

impl StreamFlags {
    pub const NONE: Self = Self(0);
    pub const END_BURST: Self = Self(1 << 1);
    pub const HAS_TIME: Self = Self(1 << 2);
    pub const END_ABRUPT: Self = Self(1 << 3);
    pub const ONE_PACKET: Self = Self(1 << 4);
    pub const MORE_FRAGMENTS: Self = Self(1 << 5);
    pub const WAIT_TRIGGER: Self = Self(1 << 6);

    pub fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> i32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for StreamFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StreamFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for StreamFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-specific key/value hints passed to `setup_stream`.
///
/// The engine never interprets these; only the capability implementation does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamArgs {
    args: BTreeMap<String, String>,
}

impl StreamArgs {
    pub const WIRE: &'static str = "WIRE";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.args.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    /// The `WIRE` format requested between device and host, if any.
    pub fn wire_format(&self) -> Option<&str> {
        self.get(Self::WIRE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Opaque token for one stream opened on a backend.
///
/// The id is an index into the backend's own stream table. The token is neither
/// `Clone` nor `Copy`: exactly one `Cs8Stream` owns it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct NativeStream {
    id: u64,
}

impl NativeStream {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Outcome of one raw burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Burst {
    /// Timestamp of the first sample in the burst, valid when `HAS_TIME` is reported.
    pub time_ns: i64,
    /// Complex samples written to channel 0. Never more than were requested.
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Timeout,
    StreamError,
    Corruption,
    Overflow,
    NotSupported,
    TimeError,
    Underflow,
    Other,
}

impl DeviceErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceErrorKind::Timeout => "timeout",
            DeviceErrorKind::StreamError => "stream error",
            DeviceErrorKind::Corruption => "corruption",
            DeviceErrorKind::Overflow => "overflow",
            DeviceErrorKind::NotSupported => "not supported",
            DeviceErrorKind::TimeError => "time error",
            DeviceErrorKind::Underflow => "underflow",
            DeviceErrorKind::Other => "other",
        }
    }
}

/// Error reported by a capability implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({})", .kind.as_str())]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DeviceErrorKind::Other, message)
    }
}

/// The hardware operations the acquisition engine depends on.
///
/// Implemented once per backend (see `SoapyDevice` behind the `soapy` feature) and by
/// the `StubDevice` test double. Implementations are shared by reference for the
/// lifetime of their streams, so every method takes `&self`.
pub trait Cs8Capability {
    /// Open a stream. On failure no handle is produced.
    fn setup_stream(
        &self,
        direction: Direction,
        channels: &[usize],
        args: &StreamArgs,
    ) -> Result<NativeStream, DeviceError>;

    /// Release a stream. Calling this twice for the same stream is not supported;
    /// `Cs8Stream` guarantees it never does.
    fn close_stream(&self, stream: &NativeStream) -> Result<(), DeviceError>;

    /// Largest number of complex samples a single `read_raw` may return.
    fn mtu(&self, stream: &NativeStream) -> Result<usize, DeviceError>;

    /// `num_elems` optionally caps the burst (0 = unbounded). `time_ns` is only
    /// meaningful when `flags` contains `HAS_TIME`.
    fn activate(
        &self,
        stream: &NativeStream,
        flags: StreamFlags,
        time_ns: i64,
        num_elems: usize,
    ) -> Result<(), DeviceError>;

    fn deactivate(
        &self,
        stream: &NativeStream,
        flags: StreamFlags,
        time_ns: i64,
    ) -> Result<(), DeviceError>;

    /// Read at most `count_requested` complex samples into `buffers[0]` as interleaved
    /// I/Q components.
    ///
    /// A short burst is not an error. On error the contents of `buffers` and
    /// `output_flags` are unspecified.
    fn read_raw(
        &self,
        stream: &NativeStream,
        buffers: &mut [&mut [i8]],
        count_requested: usize,
        output_flags: &mut [StreamFlags; 1],
        timeout_us: i64,
    ) -> Result<Burst, DeviceError>;
}
