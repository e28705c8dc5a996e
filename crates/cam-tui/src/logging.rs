//! Tracing setup: everything to the log file, WARN and ERROR also to the
//! in-app log panel.

use std::path::Path;

use tokio::sync::broadcast;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter: debug for our code, quiet HTTP client internals.
const DEFAULT_FILTER: &str = "debug,hyper_util=warn,reqwest=warn,hyper=warn";

/// Forwards WARN/ERROR events as preformatted lines to the log panel.
pub struct PanelLayer {
    sender: broadcast::Sender<String>,
}

impl PanelLayer {
    pub fn new(sender: broadcast::Sender<String>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for PanelLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{} [{}] {}{}",
            chrono::Local::now().format("%H:%M:%S"),
            level,
            visitor.message,
            visitor.fields
        );

        // No receiver yet is fine.
        let _ = self.sender.send(line);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init(log_path: &Path, panel: broadcast::Sender<String>) -> anyhow::Result<()> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .with(PanelLayer::new(panel))
        .try_init()?;
    Ok(())
}
