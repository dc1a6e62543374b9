use log::{Level, Log, Record};
use std::fmt;

/// Logging context passed explicitly to every stream operation.
///
/// Records are handed straight to the borrowed sink; nothing here touches process
/// state. Use [`StreamLog::global`] to route through whatever logger was installed with
/// the `log` facade.
#[derive(Clone, Copy)]
pub struct StreamLog<'a> {
    sink: &'a dyn Log,
    target: &'a str,
}

impl<'a> StreamLog<'a> {
    pub const DEFAULT_TARGET: &'static str = "iqstream_rs";

    pub fn new(sink: &'a dyn Log) -> Self {
        Self {
            sink,
            target: Self::DEFAULT_TARGET,
        }
    }

    pub fn with_target(mut self, target: &'a str) -> Self {
        self.target = target;
        self
    }

    pub fn target(&self) -> &str {
        self.target
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Debug, args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Error, args);
    }

    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let record = Record::builder()
            .args(args)
            .level(level)
            .target(self.target)
            .module_path_static(Some(module_path!()))
            .build();

        if self.sink.enabled(record.metadata()) {
            self.sink.log(&record);
        }
    }
}

impl StreamLog<'static> {
    /// Context backed by the logger installed through the `log` facade.
    pub fn global() -> Self {
        Self::new(log::logger())
    }
}

impl Default for StreamLog<'static> {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Debug for StreamLog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamLog")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// In-memory sink used by the unit tests to assert on emitted diagnostics.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CapturingLog {
    records: std::sync::Mutex<Vec<(Level, String)>>,
}

#[cfg(test)]
impl CapturingLog {
    pub(crate) fn context(&self) -> StreamLog<'_> {
        StreamLog::new(self)
    }

    pub(crate) fn messages(&self) -> Vec<(Level, String)> {
        self.records.lock().unwrap().clone()
    }

    pub(crate) fn contains(&self, level: Level, needle: &str) -> bool {
        self.messages()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    pub(crate) fn count(&self, level: Level, needle: &str) -> usize {
        self.messages()
            .iter()
            .filter(|(l, m)| *l == level && m.contains(needle))
            .count()
    }
}

#[cfg(test)]
impl Log for CapturingLog {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        self.records
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ErrorsOnly(CapturingLog);

    impl Log for ErrorsOnly {
        fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
            metadata.level() <= Level::Error
        }

        fn log(&self, record: &Record<'_>) {
            self.0.log(record);
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_records_reach_sink() {
        let sink = CapturingLog::default();
        let log = sink.context();
        log.debug(format_args!("Elements read: {}", 42));
        log.error(format_args!("boom"));

        let messages = sink.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], (Level::Debug, "Elements read: 42".to_string()));
        assert_eq!(messages[1], (Level::Error, "boom".to_string()));
    }

    #[test]
    fn test_disabled_levels_are_skipped() {
        let sink = ErrorsOnly(CapturingLog::default());
        let log = StreamLog::new(&sink);
        log.debug(format_args!("hidden"));
        log.error(format_args!("shown"));

        assert!(!sink.0.contains(Level::Debug, "hidden"));
        assert!(sink.0.contains(Level::Error, "shown"));
    }

    #[test]
    fn test_target_override() {
        let sink = CapturingLog::default();
        let log = sink.context().with_target("radio");
        assert_eq!(log.target(), "radio");
        assert_eq!(StreamLog::global().target(), StreamLog::DEFAULT_TARGET);
    }
}
