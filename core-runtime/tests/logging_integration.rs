//! Integration tests for logging initialization.
//!
//! The global subscriber can be installed once per process, so everything that
//! needs it lives in a single test.

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for RecordingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

#[test]
fn test_init_logging_forwards_to_sink_and_rejects_second_init() {
    let sink = Arc::new(RecordingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("logging_integration=debug")
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::info!(identity = "bob@example.com", file_name = "a.txt", "staged");
    tracing::trace!("below the sink's minimum");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "staged");
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(
            entries[0].fields.get("identity"),
            Some(&"b***@[REDACTED]".to_string())
        );
        assert_eq!(entries[0].fields.get("file_name"), Some(&"a.txt".to_string()));
    }

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Config(_))));
}
