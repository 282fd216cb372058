//! Forwards `tracing` events to the host's log sinks.

use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, registry};
use unibridge_core::Slice;

use crate::glue::glue;

/// Layer that renders each event to one line and hands it to the error,
/// warn or info sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlueLayer;

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

pub(crate) fn render(event: &Event<'_>) -> String {
    let mut visitor = LineVisitor::default();
    event.record(&mut visitor);
    visitor.message + &visitor.fields
}

impl<S: Subscriber> Layer<S> for GlueLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(glue) = glue() else {
            return;
        };
        let line = render(event);
        let sink = match *event.metadata().level() {
            Level::ERROR => glue.error_log,
            Level::WARN => glue.warn_log,
            _ => glue.info_log,
        };
        sink(Slice::text(&line));
    }
}

/// Installs the forwarding subscriber for this module image. Returns false
/// when a subscriber was already set.
pub fn init() -> bool {
    registry()
        .with(GlueLayer.with_filter(LevelFilter::INFO))
        .try_init()
        .is_ok()
}
