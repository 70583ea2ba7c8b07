//! Tracing support.

use std::env;

use console::style;
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

use crate::server::CALL_TARGET;

/// The variable that enables the pretty call log.
pub const PRETTY_LOG_ENV: &str = "DBAL_PRETTY_LOG";

/// A layer that emits a pretty line for every call resolved by the daemon.
#[derive(Debug, Default)]
pub struct CallLog {}

/// Returns a layer that emits pretty call logs.
pub fn pretty_calls() -> CallLog {
    CallLog {}
}

#[derive(Default, Debug)]
struct Values {
    id: Option<String>,
    method: Option<String>,
    code: Option<i64>,
    duration: Option<u128>,
}

impl Visit for Values {
    fn record_u128(&mut self, field: &Field, value: u128) {
        if field.name() == "duration" {
            self.duration = Some(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "code" {
            self.code = Some(value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "method" {
            self.method = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "id" {
            self.id = Some(format!("{value:?}"));
        }
    }
}

impl Values {
    fn line(self) -> Option<String> {
        let (id, method, duration) = (self.id?, self.method?, self.duration?);
        let duration = duration as f64 / 1_000.0;

        let status = match self.code {
            None => style("ok".to_string()).green(),
            Some(m) if m < 500 => style(m.to_string()).yellow(),
            Some(m) => style(m.to_string()).red(),
        }
        .bold();

        Some(format!("{method:>16} {status:>3} {duration:>8.2}ms {id}"))
    }
}

impl<S> Layer<S> for CallLog
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != CALL_TARGET {
            return;
        }

        let mut values = Values::default();
        event.record(&mut values);

        if let Some(m) = values.line() {
            eprintln!("{m}");
        }
    }
}

/// Initialise tracing with default settings.
///
/// The filter is read from `var_name` and defaults to `INFO`. Setting [`PRETTY_LOG_ENV`] swaps
/// the structured call events for the pretty call log.
pub fn init_default<S>(var_name: S)
where
    S: Into<String>,
{
    let var_name = var_name.into();
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .with_env_var(var_name)
        .from_env_lossy();

    match env::var(PRETTY_LOG_ENV) {
        Ok(_) => {
            tracing_subscriber::registry()
                .with(pretty_calls())
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        // call events are processed by the call log layer
                        .with_filter(filter_fn(|metadata| metadata.target() != CALL_TARGET)),
                )
                .with(env_filter)
                .init();
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().compact())
                .with(env_filter)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_events_print_nothing() {
        let values = Values {
            id: Some("req_1".into()),
            method: None,
            code: None,
            duration: Some(1_500),
        };

        assert_eq!(values.line(), None);
    }

    #[test]
    fn formats_resolved_calls() {
        console::set_colors_enabled_stderr(false);
        console::set_colors_enabled(false);

        let line = Values {
            id: Some("req_1".into()),
            method: Some("read".into()),
            code: Some(404),
            duration: Some(1_500),
        }
        .line()
        .unwrap();

        assert!(line.contains("read"));
        assert!(line.contains("404"));
        assert!(line.contains("1.50ms"));
        assert!(line.ends_with("req_1"));
    }
}
