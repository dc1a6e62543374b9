use crate::capability::StreamArgs;
use std::time::Duration;

/// Negotiation and acquisition settings for a `Cs8Stream`.
///
/// ```rust
/// use iqstream_rs::StreamConfig;
/// use std::time::Duration;
///
/// let config = StreamConfig::builder()
///     .wire_format("CS8")
///     .arg("bufflen", "65536")
///     .max_stalled_bursts(8)
///     .read_timeout(Duration::from_millis(250))
///     .build();
///
/// assert_eq!(config.setup_args().get("bufflen"), Some("65536"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    wire_format: String,
    extra_args: StreamArgs,
    max_stalled_bursts: usize,
    read_timeout: Duration,
}

impl StreamConfig {
    pub const DEFAULT_WIRE_FORMAT: &'static str = "CS8";
    pub const DEFAULT_MAX_STALLED_BURSTS: usize = 64;
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::new()
    }

    pub fn wire_format(&self) -> &str {
        &self.wire_format
    }

    /// Consecutive zero-length bursts tolerated before a read gives up.
    pub fn max_stalled_bursts(&self) -> usize {
        self.max_stalled_bursts
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Per-burst timeout in the microsecond unit the capability set expects.
    pub fn read_timeout_us(&self) -> i64 {
        i64::try_from(self.read_timeout.as_micros()).unwrap_or(i64::MAX)
    }

    /// Arguments handed to `setup_stream`: the extra args plus `WIRE`.
    ///
    /// `WIRE` always reflects `wire_format`, even if an extra arg tried to set it.
    pub fn setup_args(&self) -> StreamArgs {
        self.extra_args
            .clone()
            .with(StreamArgs::WIRE, self.wire_format.clone())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            wire_format: Self::DEFAULT_WIRE_FORMAT.to_string(),
            extra_args: StreamArgs::new(),
            max_stalled_bursts: Self::DEFAULT_MAX_STALLED_BURSTS,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub struct StreamConfigBuilder {
    config: StreamConfig,
}

impl StreamConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: StreamConfig::default(),
        }
    }

    pub fn wire_format(mut self, format: impl Into<String>) -> Self {
        self.config.wire_format = format.into();
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.extra_args.set(key, value);
        self
    }

    /// Zero disables tolerance: the first empty burst fails the read.
    pub fn max_stalled_bursts(mut self, bursts: usize) -> Self {
        self.config.max_stalled_bursts = bursts;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn build(self) -> StreamConfig {
        self.config
    }
}

impl Default for StreamConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.wire_format(), "CS8");
        assert_eq!(config.max_stalled_bursts(), 64);
        assert_eq!(config.read_timeout_us(), 100_000);
        assert_eq!(config.setup_args().wire_format(), Some("CS8"));
    }

    #[test]
    fn test_wire_format_wins_over_extra_arg() {
        let config = StreamConfig::builder()
            .arg(StreamArgs::WIRE, "CS16")
            .wire_format("CS8")
            .build();
        assert_eq!(config.setup_args().wire_format(), Some("CS8"));
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let config = StreamConfig::builder()
            .read_timeout(Duration::from_secs(u64::MAX))
            .build();
        assert_eq!(config.read_timeout_us(), i64::MAX);
    }
}
