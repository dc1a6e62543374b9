//! SoapySDR backend for the capability set.
//!
//! Open streams live in a table keyed by the id carried in each [`NativeStream`], so the
//! engine never holds a native pointer.

use crate::capability::{
    Burst, Cs8Capability, DeviceError, DeviceErrorKind, Direction, NativeStream, StreamArgs,
    StreamFlags,
};
use crate::stream_formats::StreamFormats;
use num_complex::Complex;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

impl From<soapysdr::Error> for DeviceError {
    fn from(e: soapysdr::Error) -> Self {
        let kind = match e.code {
            soapysdr::ErrorCode::Timeout => DeviceErrorKind::Timeout,
            soapysdr::ErrorCode::StreamError => DeviceErrorKind::StreamError,
            soapysdr::ErrorCode::Corruption => DeviceErrorKind::Corruption,
            soapysdr::ErrorCode::Overflow => DeviceErrorKind::Overflow,
            soapysdr::ErrorCode::NotSupported => DeviceErrorKind::NotSupported,
            soapysdr::ErrorCode::TimeError => DeviceErrorKind::TimeError,
            soapysdr::ErrorCode::Underflow => DeviceErrorKind::Underflow,
            _ => DeviceErrorKind::Other,
        };
        Self::new(kind, e.message)
    }
}

fn soapy_direction(direction: Direction) -> soapysdr::Direction {
    match direction {
        Direction::Rx => soapysdr::Direction::Rx,
        Direction::Tx => soapysdr::Direction::Tx,
    }
}

/// Unpack complex samples into `dst` as I, Q, I, Q, ...
///
/// Stops at whichever of the two runs out first.
fn interleave(dst: &mut [i8], src: &[Complex<i8>]) {
    for (iq, sample) in dst.chunks_exact_mut(2).zip(src) {
        iq[0] = sample.re;
        iq[1] = sample.im;
    }
}

struct OpenStream {
    rx: soapysdr::RxStream<Complex<i8>>,
    scratch: Vec<Complex<i8>>,
}

/// A SoapySDR receiver.
///
/// Gain, frequency, antenna and sample rate are set on [`SoapyDevice::device`] before
/// the stream is set up; the stream engine never touches them.
pub struct SoapyDevice {
    device: soapysdr::Device,
    streams: RefCell<BTreeMap<u64, OpenStream>>,
    next_id: Cell<u64>,
}

impl SoapyDevice {
    /// Make a device from SoapySDR construction args, e.g. `"driver=rtlsdr"`.
    pub fn open(args: &str) -> Result<Self, DeviceError> {
        let device = soapysdr::Device::new(args)?;
        Ok(Self::from_device(device))
    }

    pub fn from_device(device: soapysdr::Device) -> Self {
        Self {
            device,
            streams: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn device(&self) -> &soapysdr::Device {
        &self.device
    }

    fn unknown_stream(stream: &NativeStream) -> DeviceError {
        DeviceError::new(
            DeviceErrorKind::StreamError,
            format!("unknown stream {}", stream.id()),
        )
    }

    fn with_stream<T>(
        &self,
        stream: &NativeStream,
        f: impl FnOnce(&mut OpenStream) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        let mut streams = self.streams.borrow_mut();
        let open = streams
            .get_mut(&stream.id())
            .ok_or_else(|| Self::unknown_stream(stream))?;
        f(open)
    }
}

impl std::fmt::Debug for SoapyDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoapyDevice")
            .field("open_streams", &self.streams.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Cs8Capability for SoapyDevice {
    fn setup_stream(
        &self,
        direction: Direction,
        channels: &[usize],
        args: &StreamArgs,
    ) -> Result<NativeStream, DeviceError> {
        if direction != Direction::Rx {
            return Err(DeviceError::new(
                DeviceErrorKind::NotSupported,
                format!("{} streams are not supported", direction.as_str()),
            ));
        }

        let mut soapy_args = soapysdr::Args::new();
        for (key, value) in args.iter() {
            soapy_args.set(key, value);
        }
        let rx = self
            .device
            .rx_stream_args::<Complex<i8>, _>(channels, soapy_args)?;

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.streams.borrow_mut().insert(
            id,
            OpenStream {
                rx,
                scratch: Vec::new(),
            },
        );
        Ok(NativeStream::new(id))
    }

    fn close_stream(&self, stream: &NativeStream) -> Result<(), DeviceError> {
        // Dropping the RxStream closes it on the device.
        self.streams
            .borrow_mut()
            .remove(&stream.id())
            .map(drop)
            .ok_or_else(|| Self::unknown_stream(stream))
    }

    fn mtu(&self, stream: &NativeStream) -> Result<usize, DeviceError> {
        self.with_stream(stream, |open| Ok(open.rx.mtu()?))
    }

    /// `num_elems` is not forwarded: the safe SoapySDR bindings only stream
    /// continuously.
    fn activate(
        &self,
        stream: &NativeStream,
        flags: StreamFlags,
        time_ns: i64,
        _num_elems: usize,
    ) -> Result<(), DeviceError> {
        let at = flags.contains(StreamFlags::HAS_TIME).then_some(time_ns);
        self.with_stream(stream, |open| Ok(open.rx.activate(at)?))
    }

    fn deactivate(
        &self,
        stream: &NativeStream,
        flags: StreamFlags,
        time_ns: i64,
    ) -> Result<(), DeviceError> {
        let at = flags.contains(StreamFlags::HAS_TIME).then_some(time_ns);
        self.with_stream(stream, |open| Ok(open.rx.deactivate(at)?))
    }

    /// Bursts carry no hardware timestamp: `time_ns` is 0 and no flags are set.
    fn read_raw(
        &self,
        stream: &NativeStream,
        buffers: &mut [&mut [i8]],
        count_requested: usize,
        output_flags: &mut [StreamFlags; 1],
        timeout_us: i64,
    ) -> Result<Burst, DeviceError> {
        let buffer = buffers.first_mut().ok_or_else(|| {
            DeviceError::new(DeviceErrorKind::StreamError, "no buffer for channel 0")
        })?;
        let count = count_requested.min(buffer.len() / 2);

        self.with_stream(stream, |open| {
            if open.scratch.len() < count {
                open.scratch.resize(count, Complex::new(0, 0));
            }
            let read = open
                .rx
                .read(&mut [&mut open.scratch[..count]], timeout_us)?
                .min(count);

            interleave(buffer, &open.scratch[..read]);
            output_flags[0] = StreamFlags::NONE;
            Ok(Burst {
                time_ns: 0,
                count: read,
            })
        })
    }
}

impl StreamFormats for SoapyDevice {
    fn stream_formats(
        &self,
        direction: Direction,
        channel: usize,
    ) -> Result<Vec<String>, DeviceError> {
        Ok(self
            .device
            .stream_formats(soapy_direction(direction), channel)?
            .iter()
            .map(ToString::to_string)
            .collect())
    }

    fn native_stream_format(
        &self,
        direction: Direction,
        channel: usize,
    ) -> Result<(String, f64), DeviceError> {
        let (format, full_scale) = self
            .device
            .native_stream_format(soapy_direction(direction), channel)?;
        Ok((format.to_string(), full_scale))
    }
}
