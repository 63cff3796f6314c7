use core::fmt;
use spin::Mutex;

/// Destination for log output. The kernel installs its serial port here;
/// host tests may install a capturing sink. With no sink installed, logging
/// is a no-op.
pub trait LogSink: Sync {
    fn write_str(&self, s: &str);
}

static SINK: Mutex<Option<&'static dyn LogSink>> = Mutex::new(None);

/// Install the process-wide log sink.
pub fn set_sink(sink: &'static dyn LogSink) {
    *SINK.lock() = Some(sink);
}

struct SinkWriter(&'static dyn LogSink);

impl fmt::Write for SinkWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

#[doc(hidden)]
pub fn _log(args: fmt::Arguments) {
    if let Some(sink) = *SINK.lock() {
        use core::fmt::Write;
        let _ = SinkWriter(sink).write_fmt(args);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::_log(format_args!("[INFO] "));
        $crate::logger::_log(format_args!($($arg)*));
        $crate::logger::_log(format_args!("\n"));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::_log(format_args!("[WARN] "));
        $crate::logger::_log(format_args!($($arg)*));
        $crate::logger::_log(format_args!("\n"));
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logger::_log(format_args!("[ERROR] "));
        $crate::logger::_log(format_args!($($arg)*));
        $crate::logger::_log(format_args!("\n"));
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;
    use std::sync::Mutex as StdMutex;

    struct Capture(StdMutex<String>);

    impl LogSink for Capture {
        fn write_str(&self, s: &str) {
            self.0.lock().unwrap().push_str(s);
        }
    }

    static CAPTURE: Capture = Capture(StdMutex::new(String::new()));

    #[test]
    fn macros_write_through_sink() {
        set_sink(&CAPTURE);
        log_info!("mounted {} clusters", 42);
        let out = CAPTURE.0.lock().unwrap().clone();
        assert!(out.contains("[INFO] mounted 42 clusters\n"));
    }
}
