use crate::capability::{DeviceError, Direction};
use crate::cs8_stream::StreamError;
use crate::stream_log::StreamLog;
use std::fmt::Write;

/// Format discovery, kept apart from the streaming capability set.
pub trait StreamFormats {
    /// Sample formats the backend can deliver on `direction`/`channel`.
    fn stream_formats(&self, direction: Direction, channel: usize)
        -> Result<Vec<String>, DeviceError>;

    /// The backend's native format and its full-scale value.
    fn native_stream_format(
        &self,
        direction: Direction,
        channel: usize,
    ) -> Result<(String, f64), DeviceError>;
}

pub const CS8: &str = "CS8";

/// Stream formats for RX channel 0.
///
/// An empty list is an error: such a device cannot be streamed from.
pub fn stream_formats<D: StreamFormats + ?Sized>(
    device: &D,
    log: &StreamLog<'_>,
) -> Result<Vec<String>, StreamError> {
    let formats = device.stream_formats(Direction::Rx, 0).map_err(|e| {
        log.error(format_args!("Could not retrieve stream formats: {e}"));
        StreamError::Format(e)
    })?;

    if formats.is_empty() {
        log.error(format_args!("Channel 0 has no stream formats"));
        return Err(StreamError::NoStreamFormats);
    }

    let mut listing = String::from("Stream Formats:");
    for format in &formats {
        let _ = write!(listing, "\n         {format}");
    }
    log.debug(format_args!("{listing}"));
    Ok(formats)
}

/// Native format and full-scale value for RX channel 0.
pub fn native_stream_format<D: StreamFormats + ?Sized>(
    device: &D,
    log: &StreamLog<'_>,
) -> Result<(String, f64), StreamError> {
    match device.native_stream_format(Direction::Rx, 0) {
        Ok((format, full_scale)) => {
            log.debug(format_args!(
                "Native stream format is {format}, full scale {full_scale}"
            ));
            Ok((format, full_scale))
        }
        Err(e) => {
            log.error(format_args!("Could not retrieve native stream format: {e}"));
            Err(StreamError::Format(e))
        }
    }
}

/// Whether RX channel 0 can be set up as a CS8 stream.
pub fn supports_cs8<D: StreamFormats + ?Sized>(device: &D, log: &StreamLog<'_>) -> bool {
    stream_formats(device, log).is_ok_and(|formats| formats.iter().any(|f| f == CS8))
}
