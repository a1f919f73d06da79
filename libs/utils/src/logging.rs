use std::str::FromStr;

use anyhow::Context;
use strum_macros::{EnumString, VariantNames};
use tracing_subscriber::fmt::MakeWriter;

#[derive(EnumString, strum_macros::Display, VariantNames, Eq, PartialEq, Debug, Clone, Copy)]
#[strum(serialize_all = "snake_case")]
pub enum LogFormat {
    Plain,
    Json,
    Test,
}

impl LogFormat {
    pub fn from_config(s: &str) -> anyhow::Result<LogFormat> {
        use strum::VariantNames;
        LogFormat::from_str(s).with_context(|| {
            format!(
                "Unrecognized log format. Please specify one of: {:?}",
                LogFormat::VARIANTS
            )
        })
    }
}

/// Whether to add the `tracing_error` crate's `ErrorLayer`
/// to the global tracing subscriber.
///
pub enum TracingErrorLayerEnablement {
    /// Do not add the `ErrorLayer`.
    Disabled,
    /// Add the `ErrorLayer` with the filter specified by RUST_LOG, defaulting to `info` if `RUST_LOG` is unset.
    EnableWithRustLogFilter,
}

/// Where the logging should output to.
#[derive(Clone, Copy)]
pub enum Output {
    Stdout,
    Stderr,
}

/// The formatting layer shared by [`init`] and tests that capture log output.
fn fmt_layer<S, W>(
    log_format: LogFormat,
    writer: W,
) -> Box<dyn tracing_subscriber::Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    use tracing_subscriber::Layer;
    let log_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);
    match log_format {
        LogFormat::Json => log_layer.json().boxed(),
        LogFormat::Plain => log_layer.boxed(),
        LogFormat::Test => log_layer.with_test_writer().boxed(),
    }
}

pub fn init(
    log_format: LogFormat,
    tracing_error_layer_enablement: TracingErrorLayerEnablement,
    output: Output,
) -> anyhow::Result<()> {
    // We fall back to printing all spans at info-level or above if
    // the RUST_LOG environment variable is not set.
    let rust_log_env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    // NB: the order of the with() calls does not matter.
    // See https://docs.rs/tracing-subscriber/0.3.16/tracing_subscriber/layer/index.html#per-layer-filtering
    use tracing_subscriber::prelude::*;
    let r = tracing_subscriber::registry();
    let r = r.with(
        fmt_layer(log_format, move || -> Box<dyn std::io::Write> {
            match output {
                Output::Stdout => Box::new(std::io::stdout()),
                Output::Stderr => Box::new(std::io::stderr()),
            }
        })
        .with_filter(rust_log_env_filter()),
    );
    let res = match tracing_error_layer_enablement {
        TracingErrorLayerEnablement::EnableWithRustLogFilter => r
            .with(tracing_error::ErrorLayer::default().with_filter(rust_log_env_filter()))
            .try_init(),
        TracingErrorLayerEnablement::Disabled => r.try_init(),
    };
    res.context("install global tracing subscriber")?;

    Ok(())
}

/// Disable the default rust panic hook by using `set_hook`.
///
/// The assumption is that tracing is configured before with [`init`].
///
/// When the return value is dropped, the hook is reverted to std default hook (prints to stderr).
#[must_use]
pub fn replace_panic_hook_with_tracing_panic_hook() -> TracingPanicHookGuard {
    std::panic::set_hook(Box::new(tracing_panic_hook));
    TracingPanicHookGuard::new()
}

/// Drop guard which restores the std panic hook on drop.
///
/// Tracing should not be used when it's not configured, but we cannot really latch on to any
/// imaginary lifetime of tracing.
pub struct TracingPanicHookGuard {
    _private: (),
}

impl TracingPanicHookGuard {
    fn new() -> Self {
        TracingPanicHookGuard { _private: () }
    }
}

impl Drop for TracingPanicHookGuard {
    fn drop(&mut self) {
        let _ = std::panic::take_hook();
    }
}

/// Named symbol for our panic hook, which logs the panic.
fn tracing_panic_hook(info: &std::panic::PanicHookInfo) {
    let location = info.location();

    let msg = match info.payload().downcast_ref::<&'static str>() {
        Some(s) => *s,
        None => match info.payload().downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<dyn Any>",
        },
    };

    let thread = std::thread::current();
    let thread = thread.name().unwrap_or("<unnamed>");
    let backtrace = std::backtrace::Backtrace::capture();

    let _entered = if let Some(location) = location {
        tracing::error_span!("panic", %thread, location = %PrettyLocation(location))
    } else {
        tracing::error_span!("panic", %thread)
    }
    .entered();

    if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
        tracing::error!("{msg}\n\nStack backtrace:\n{backtrace}");
    } else {
        tracing::error!("{msg}");
    }

    // ensure that we log something on the panic if this hook is left after tracing has been
    // unconfigured. worst case when teardown is racing the panic is to log the panic twice.
    tracing::dispatcher::get_default(|d| {
        if let Some(_none) = d.downcast_ref::<tracing::subscriber::NoSubscriber>() {
            let location = location.map(PrettyLocation);
            log_panic_to_stderr(thread, msg, location, &backtrace);
        }
    });
}

#[cold]
fn log_panic_to_stderr(
    thread: &str,
    msg: &str,
    location: Option<PrettyLocation<'_, '_>>,
    backtrace: &std::backtrace::Backtrace,
) {
    eprintln!(
        "panic while tracing is unconfigured: thread '{thread}' panicked at '{msg}', {location:?}\nStack backtrace:\n{backtrace}"
    );
}

struct PrettyLocation<'a, 'b>(&'a std::panic::Location<'b>);

impl std::fmt::Display for PrettyLocation<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.0.file(), self.0.line(), self.0.column())
    }
}

impl std::fmt::Debug for PrettyLocation<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedOutput {
        fn lines(&self) -> Vec<String> {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf)
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    fn capture(log_format: LogFormat) -> Vec<String> {
        use tracing_subscriber::prelude::*;

        let output = CapturedOutput::default();
        let writer = output.clone();
        let layer = fmt_layer(log_format, move || writer.clone())
            .with_filter(tracing_subscriber::EnvFilter::new("warn"));

        tracing::subscriber::with_default(tracing_subscriber::registry().with(layer), || {
            let custom_field: &str = "hi";
            tracing::trace!(custom = %custom_field, "test log message");
            tracing::debug!(custom = %custom_field, "test log message");
            tracing::info!(custom = %custom_field, "test log message");
            tracing::warn!(custom = %custom_field, "test log message");
            tracing::error!(custom = %custom_field, "test log message");
        });

        output.lines()
    }

    #[test]
    fn log_format_from_config() {
        assert_eq!(LogFormat::from_config("plain").unwrap(), LogFormat::Plain);
        assert_eq!(LogFormat::from_config("json").unwrap(), LogFormat::Json);
        let err = LogFormat::from_config("yaml").unwrap_err();
        assert!(format!("{err:#}").contains("Unrecognized log format"));
    }

    #[test]
    fn plain_format_has_message_and_custom_field() {
        let lines = capture(LogFormat::Plain);
        assert_eq!(lines.len(), 2);
        for content in lines {
            serde_json::from_str::<serde_json::Value>(&content).unwrap_err();
            assert!(content.contains("custom=hi"));
            assert!(content.contains("test log message"));

            assert!(!content.contains("TRACE"));
            assert!(!content.contains("DEBUG"));
            assert!(!content.contains("INFO"));
        }
    }

    #[test]
    fn json_format_has_message_and_custom_field() {
        let lines = capture(LogFormat::Json);
        assert_eq!(lines.len(), 2);
        for content in lines {
            let value: serde_json::Value = serde_json::from_str(&content).unwrap();
            assert_eq!(value["fields"]["custom"], "hi");
            assert_eq!(value["fields"]["message"], "test log message");
        }
    }
}
