use crate::capability::{
    Burst, Cs8Capability, DeviceError, DeviceErrorKind, Direction, NativeStream, StreamArgs,
    StreamFlags,
};
use crate::stream_formats::StreamFormats;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

/// How many times each capability call reached the stub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubCalls {
    pub setups: usize,
    pub closes: usize,
    pub activates: usize,
    pub deactivates: usize,
    pub reads: usize,
}

#[derive(Debug, Default)]
struct StubStream {
    active: bool,
    bursts: usize,
    components_served: usize,
}

#[derive(Debug, Default)]
struct StubState {
    next_id: u64,
    streams: BTreeMap<u64, StubStream>,
    plan: VecDeque<usize>,
    calls: StubCalls,
    last_setup_args: Option<StreamArgs>,
}

#[derive(Debug, Clone)]
struct StubConfig {
    mtu: usize,
    stall: bool,
    formats: Vec<String>,
    native_format: (String, f64),
    fail_setup: Option<String>,
    fail_activate: Option<String>,
    fail_deactivate: Option<String>,
    fail_close: Option<String>,
    fail_read_at: Option<(usize, DeviceErrorKind)>,
}

/// Deterministic stand-in for a receiver, usable without hardware.
///
/// Every stream serves a ramp: component `k` of the stream (counting across reads) is
/// [`StubDevice::sample_value`]`(k)`, and the burst starting at sample `n` is stamped
/// [`StubDevice::timestamp_of`]`(n)`. Bursts follow the configured plan and then return
/// whatever was requested, up to the buffer size.
///
/// ```rust
/// use iqstream_rs::{Cs8Stream, StreamFlags, StreamLog, StubDevice};
///
/// let stub = StubDevice::builder().mtu(4).bursts([3, 1]).build();
/// let log = StreamLog::global();
/// let mut stream = Cs8Stream::setup(&stub, &log)?;
/// stream.activate(&log, StreamFlags::NONE, 0, 0)?;
///
/// let mut buffer = [0i8; 8];
/// let mut flags = [StreamFlags::NONE];
/// let result = stream.read_cs8(&log, &mut [&mut buffer[..]], 4, &mut flags, 0)?;
/// assert_eq!(result.elements_read, 4);
/// assert_eq!(stub.calls().reads, 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct StubDevice {
    config: StubConfig,
    state: RefCell<StubState>,
}

impl StubDevice {
    /// MTU of an RTL-SDR class receiver, scaled down to keep tests quick.
    pub const DEFAULT_MTU: usize = 10_000;
    pub const BASE_TIME_NS: i64 = 1_000_000;
    /// 1 MS/s
    pub const NS_PER_SAMPLE: i64 = 1_000;

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> StubDeviceBuilder {
        StubDeviceBuilder::new()
    }

    /// Value of interleaved component `index` on every stub stream.
    ///
    /// The ramp covers the full signed 8-bit range.
    pub fn sample_value(index: usize) -> i8 {
        i8::from_le_bytes([(index % 256) as u8])
    }

    /// Timestamp of the burst whose first sample is `sample_index`.
    pub fn timestamp_of(sample_index: usize) -> i64 {
        Self::BASE_TIME_NS
            + i64::try_from(sample_index).unwrap_or(i64::MAX / Self::NS_PER_SAMPLE)
                * Self::NS_PER_SAMPLE
    }

    pub fn calls(&self) -> StubCalls {
        self.state.borrow().calls
    }

    pub fn open_streams(&self) -> usize {
        self.state.borrow().streams.len()
    }

    pub fn last_setup_args(&self) -> Option<StreamArgs> {
        self.state.borrow().last_setup_args.clone()
    }

    fn unknown_stream(stream: &NativeStream) -> DeviceError {
        DeviceError::new(
            DeviceErrorKind::StreamError,
            format!("unknown stream {}", stream.id()),
        )
    }
}

impl Default for StubDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Cs8Capability for StubDevice {
    fn setup_stream(
        &self,
        direction: Direction,
        channels: &[usize],
        args: &StreamArgs,
    ) -> Result<NativeStream, DeviceError> {
        let mut state = self.state.borrow_mut();
        state.calls.setups += 1;
        state.last_setup_args = Some(args.clone());

        if let Some(message) = &self.config.fail_setup {
            return Err(DeviceError::other(message.clone()));
        }
        if direction != Direction::Rx || channels != [0] {
            return Err(DeviceError::new(
                DeviceErrorKind::NotSupported,
                format!(
                    "stub only streams {} channel 0, got {} {channels:?}",
                    Direction::Rx.as_str(),
                    direction.as_str()
                ),
            ));
        }
        if let Some(wire) = args.wire_format() {
            if !self.config.formats.iter().any(|f| f == wire) {
                return Err(DeviceError::new(
                    DeviceErrorKind::NotSupported,
                    format!("Bad args passed to setup_stream: unsupported WIRE format {wire}"),
                ));
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        state.streams.insert(id, StubStream::default());
        Ok(NativeStream::new(id))
    }

    fn close_stream(&self, stream: &NativeStream) -> Result<(), DeviceError> {
        let mut state = self.state.borrow_mut();
        state.calls.closes += 1;

        if let Some(message) = &self.config.fail_close {
            return Err(DeviceError::other(message.clone()));
        }
        state
            .streams
            .remove(&stream.id())
            .map(|_| ())
            .ok_or_else(|| Self::unknown_stream(stream))
    }

    fn mtu(&self, stream: &NativeStream) -> Result<usize, DeviceError> {
        if self.state.borrow().streams.contains_key(&stream.id()) {
            Ok(self.config.mtu)
        } else {
            Err(Self::unknown_stream(stream))
        }
    }

    fn activate(
        &self,
        stream: &NativeStream,
        _flags: StreamFlags,
        _time_ns: i64,
        _num_elems: usize,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.borrow_mut();
        state.calls.activates += 1;

        if let Some(message) = &self.config.fail_activate {
            return Err(DeviceError::other(message.clone()));
        }
        let entry = state
            .streams
            .get_mut(&stream.id())
            .ok_or_else(|| Self::unknown_stream(stream))?;
        entry.active = true;
        Ok(())
    }

    fn deactivate(
        &self,
        stream: &NativeStream,
        _flags: StreamFlags,
        _time_ns: i64,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.borrow_mut();
        state.calls.deactivates += 1;

        let entry = state
            .streams
            .get_mut(&stream.id())
            .ok_or_else(|| Self::unknown_stream(stream))?;
        // A failed halt still stops the stub from serving samples.
        entry.active = false;

        match &self.config.fail_deactivate {
            Some(message) => Err(DeviceError::other(message.clone())),
            None => Ok(()),
        }
    }

    fn read_raw(
        &self,
        stream: &NativeStream,
        buffers: &mut [&mut [i8]],
        count_requested: usize,
        output_flags: &mut [StreamFlags; 1],
        _timeout_us: i64,
    ) -> Result<Burst, DeviceError> {
        let state = &mut *self.state.borrow_mut();
        state.calls.reads += 1;

        let entry = state
            .streams
            .get_mut(&stream.id())
            .ok_or_else(|| Self::unknown_stream(stream))?;
        if !entry.active {
            return Err(DeviceError::new(
                DeviceErrorKind::StreamError,
                "stream is not activated",
            ));
        }

        let burst_index = entry.bursts;
        entry.bursts += 1;
        if let Some((at, kind)) = self.config.fail_read_at {
            if at == burst_index {
                return Err(DeviceError::new(kind, "Injected read failure"));
            }
        }

        let buffer = buffers.first_mut().ok_or_else(|| {
            DeviceError::new(DeviceErrorKind::StreamError, "no buffer for channel 0")
        })?;
        let planned = if self.config.stall {
            0
        } else {
            state.plan.pop_front().unwrap_or(count_requested)
        };
        let count = planned.min(count_requested).min(buffer.len() / 2);

        let first_component = entry.components_served;
        for (i, slot) in buffer[..2 * count].iter_mut().enumerate() {
            *slot = Self::sample_value(first_component + i);
        }
        entry.components_served += 2 * count;

        output_flags[0] = StreamFlags::HAS_TIME;
        Ok(Burst {
            time_ns: Self::timestamp_of(first_component / 2),
            count,
        })
    }
}

impl StreamFormats for StubDevice {
    fn stream_formats(
        &self,
        direction: Direction,
        channel: usize,
    ) -> Result<Vec<String>, DeviceError> {
        if direction == Direction::Rx && channel == 0 {
            Ok(self.config.formats.clone())
        } else {
            Ok(Vec::new())
        }
    }

    fn native_stream_format(
        &self,
        direction: Direction,
        channel: usize,
    ) -> Result<(String, f64), DeviceError> {
        if direction == Direction::Rx && channel == 0 {
            Ok(self.config.native_format.clone())
        } else {
            Err(DeviceError::new(
                DeviceErrorKind::NotSupported,
                format!("no native format for {} channel {channel}", direction.as_str()),
            ))
        }
    }
}

#[derive(Debug)]
pub struct StubDeviceBuilder {
    config: StubConfig,
    plan: VecDeque<usize>,
}

impl StubDeviceBuilder {
    pub fn new() -> Self {
        Self {
            config: StubConfig {
                mtu: StubDevice::DEFAULT_MTU,
                stall: false,
                formats: vec!["CS8".to_string(), "CS16".to_string(), "CF32".to_string()],
                native_format: ("CS8".to_string(), 128.0),
                fail_setup: None,
                fail_activate: None,
                fail_deactivate: None,
                fail_close: None,
                fail_read_at: None,
            },
            plan: VecDeque::new(),
        }
    }

    pub fn mtu(mut self, mtu: usize) -> Self {
        self.config.mtu = mtu;
        self
    }

    /// Sizes of the first bursts served, device-wide. Later bursts are full.
    pub fn bursts(mut self, sizes: impl IntoIterator<Item = usize>) -> Self {
        self.plan.extend(sizes);
        self
    }

    /// Every burst returns zero samples without error.
    pub fn stall(mut self) -> Self {
        self.config.stall = true;
        self
    }

    /// Formats reported for RX channel 0 and accepted as `WIRE` at setup.
    pub fn formats(mut self, formats: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.formats = formats.into_iter().map(Into::into).collect();
        self
    }

    pub fn native_format(mut self, format: impl Into<String>, full_scale: f64) -> Self {
        self.config.native_format = (format.into(), full_scale);
        self
    }

    pub fn fail_setup(mut self, message: impl Into<String>) -> Self {
        self.config.fail_setup = Some(message.into());
        self
    }

    pub fn fail_activate(mut self, message: impl Into<String>) -> Self {
        self.config.fail_activate = Some(message.into());
        self
    }

    pub fn fail_deactivate(mut self, message: impl Into<String>) -> Self {
        self.config.fail_deactivate = Some(message.into());
        self
    }

    pub fn fail_close(mut self, message: impl Into<String>) -> Self {
        self.config.fail_close = Some(message.into());
        self
    }

    /// Fail the `burst_index`-th read (0-based, per stream) with `kind`.
    pub fn fail_read_at(mut self, burst_index: usize, kind: DeviceErrorKind) -> Self {
        self.config.fail_read_at = Some((burst_index, kind));
        self
    }

    pub fn build(self) -> StubDevice {
        StubDevice {
            config: self.config,
            state: RefCell::new(StubState {
                plan: self.plan,
                ..StubState::default()
            }),
        }
    }
}

impl Default for StubDeviceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_active(stub: &StubDevice) -> NativeStream {
        let stream = stub
            .setup_stream(Direction::Rx, &[0], &StreamArgs::new().with("WIRE", "CS8"))
            .unwrap();
        stub.activate(&stream, StreamFlags::NONE, 0, 0).unwrap();
        stream
    }

    #[test]
    fn test_sample_value_ramp() {
        assert_eq!(StubDevice::sample_value(0), 0);
        assert_eq!(StubDevice::sample_value(127), 127);
        assert_eq!(StubDevice::sample_value(128), -128);
        assert_eq!(StubDevice::sample_value(255), -1);
        assert_eq!(StubDevice::sample_value(256), 0);
    }

    #[test]
    fn test_rejects_unsupported_setup() {
        let stub = StubDevice::new();
        let args = StreamArgs::new().with("WIRE", "CS8");
        assert!(stub.setup_stream(Direction::Tx, &[0], &args).is_err());
        assert!(stub.setup_stream(Direction::Rx, &[1], &args).is_err());
        assert!(stub
            .setup_stream(Direction::Rx, &[0], &StreamArgs::new().with("WIRE", "CU8"))
            .is_err());
        assert_eq!(stub.open_streams(), 0);
        assert_eq!(stub.calls().setups, 3);
    }

    #[test]
    fn test_stream_ids_are_unique() {
        let stub = StubDevice::new();
        let a = open_active(&stub);
        let b = open_active(&stub);
        assert_ne!(a.id(), b.id());
        stub.close_stream(&a).unwrap();
        assert!(stub.close_stream(&a).is_err());
        assert_eq!(stub.open_streams(), 1);
    }

    #[test]
    fn test_read_requires_activation() {
        let stub = StubDevice::new();
        let stream = stub
            .setup_stream(Direction::Rx, &[0], &StreamArgs::new())
            .unwrap();
        let mut buffer = [0i8; 8];
        let mut flags = [StreamFlags::NONE];
        let err = stub
            .read_raw(&stream, &mut [&mut buffer[..]], 4, &mut flags, 0)
            .unwrap_err();
        assert_eq!(err.kind, DeviceErrorKind::StreamError);
    }

    #[test]
    fn test_burst_never_exceeds_request_or_buffer() {
        let stub = StubDevice::builder().bursts([50]).build();
        let stream = open_active(&stub);
        let mut buffer = [0i8; 16];
        let mut flags = [StreamFlags::NONE];

        let burst = stub
            .read_raw(&stream, &mut [&mut buffer[..]], 20, &mut flags, 0)
            .unwrap();
        assert_eq!(burst.count, 8);

        let burst = stub
            .read_raw(&stream, &mut [&mut buffer[..]], 3, &mut flags, 0)
            .unwrap();
        assert_eq!(burst.count, 3);
        assert_eq!(burst.time_ns, StubDevice::timestamp_of(8));
        assert_eq!(buffer[0], StubDevice::sample_value(16));
        assert!(flags[0].contains(StreamFlags::HAS_TIME));
    }

    #[test]
    fn test_reports_formats() {
        let stub = StubDevice::builder().formats(["CS8"]).native_format("CS8", 127.0).build();
        assert_eq!(stub.stream_formats(Direction::Rx, 0).unwrap(), vec!["CS8"]);
        assert!(stub.stream_formats(Direction::Rx, 1).unwrap().is_empty());
        assert_eq!(
            stub.native_stream_format(Direction::Rx, 0).unwrap(),
            ("CS8".to_string(), 127.0)
        );
    }
}
