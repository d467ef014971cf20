use once_cell::sync::OnceCell;
use std::{error::Error, fmt, fs, io::Write, path::Path, sync::Mutex};
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    layer::Context, prelude::__tracing_subscriber_SubscriberExt, registry::LookupSpan, Layer,
};

static LOG_FILE: OnceCell<Mutex<fs::File>> = OnceCell::new();
static MAX_LEVEL: OnceCell<Level> = OnceCell::new();

/// Install the global subscriber. Lines at `max_level` or more severe go to stderr and, if
/// given, are appended to `log_file_path`.
pub(crate) fn init(log_file_path: Option<&Path>, max_level: Level) -> Result<(), Box<dyn Error>> {
    if let Some(log_file_path) = log_file_path {
        let log_file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(log_file_path)?;
        LOG_FILE
            .set(Mutex::new(log_file))
            .map_err(|_| "called logging::init more than once")?;
    }
    MAX_LEVEL
        .set(max_level)
        .map_err(|_| "called logging::init more than once")?;

    LogTracer::init()?;
    tracing::subscriber::set_global_default(
        tracing_subscriber::Registry::default().with(LogLayer),
    )?;
    Ok(())
}

fn print_to_log_file(line: &str) {
    if let Some(log_file) = LOG_FILE.get() {
        if let Ok(mut log_file) = log_file.lock() {
            // Nowhere left to report a failure to log.
            let _ = writeln!(log_file, "{}", line).and_then(|_| log_file.flush());
        }
    }
}

fn log_callback(level: Level, message: &str) {
    if level <= MAX_LEVEL.get().copied().unwrap_or(Level::INFO) {
        let timestamp = chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string();

        let line = format!("[{}] [{}] {}", timestamp, level, message);

        eprintln!("{}", line);
        print_to_log_file(&line);
    }
}

struct LogLayer;

#[derive(Default)]
struct MessageVisitor {
    message: String,
    log_target: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "log.target" {
            self.log_target = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

impl<S> Layer<S> for LogLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let span = if let Some(scope) = ctx.event_scope(event) {
            format!(
                "[{}] ",
                scope
                    .from_root()
                    .map(|span| span.name())
                    .collect::<Vec<_>>()
                    .join(".")
            )
        } else {
            String::new()
        };

        let metadata = event.metadata();

        let target = visitor
            .log_target
            .unwrap_or_else(|| metadata.target().to_string());

        let message = format!("{}[{}] {}", span, target, visitor.message);

        log_callback(*metadata.level(), &message);
    }
}
