use tracing::{Event, Level, Subscriber};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, EnvFilter, Layer, Registry};

const DEFAULT_FILTER: &str = "warn,backend=info,shared=info";

// Connection chatter from the HTTP stack drowns out the spin log
const QUIET_TARGETS: [&str; 3] = ["hyper", "reqwest", "h2"];

#[derive(Default)]
struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        }
    }
}

struct PromoLayer;

fn format_line(level: &Level, target: &str, timestamp: &str, message: &str) -> Option<String> {
    match *level {
        Level::ERROR => Some(format!("[{}] ❌ Error: {} - {}", timestamp, target, message)),
        Level::WARN => Some(format!("[{}] ⚠️ Warning: {} - {}", timestamp, target, message)),
        Level::INFO => Some(format!("[{}] ℹ️ {} - {}", timestamp, target, message)),
        Level::DEBUG if target.contains("services") || target.contains("games") => {
            Some(format!("[{}] 🔄 {} - {}", timestamp, target, message))
        }
        _ => None,
    }
}

impl<S: Subscriber> Layer<S> for PromoLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        if QUIET_TARGETS.iter().any(|quiet| metadata.target().starts_with(quiet)) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if visitor.0.is_empty() {
            return;
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        if let Some(line) = format_line(metadata.level(), metadata.target(), &timestamp, &visitor.0) {
            println!("{}", line);
        }
    }
}

/// Installs the global subscriber. `log` records from the shared crate are
/// bridged in by `try_init`. Calling this twice is harmless.
pub fn setup() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = Registry::default().with(env_filter).with(PromoLayer).try_init();
    if let Err(e) = result {
        eprintln!("Logging already initialised: {}", e);
    }
}
