//! Subscriber construction
//!
//! A [`LoggerBuilder`] turns a [`Config`] into an `EnvFilter` plus one fmt
//! layer and installs them as the global default subscriber. Output goes to
//! stderr so it never interleaves with a benchmark's report on stdout.

use std::io;

use tracing::Subscriber;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug, Clone)]
pub struct LoggerBuilder {
    config: Config,
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Parses the filter directives without installing anything
    pub fn filter(&self) -> LogResult<EnvFilter> {
        EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })
    }

    /// Build and install the global subscriber
    ///
    /// Fails if the filter cannot be parsed or a global subscriber is
    /// already set.
    pub fn build(self) -> LogResult<()> {
        let filter = self.filter()?;

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer::<Layered<EnvFilter, Registry>>(&self.config))
            .try_init()?;

        tracing::debug!(
            level = %self.config.level,
            format = %self.config.format,
            "logger initialised"
        );
        Ok(())
    }
}

fn fmt_layer<S>(config: &Config) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let display = &config.display;
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(display.colors)
        .with_target(display.target)
        .with_file(display.source)
        .with_line_number(display.source)
        .with_thread_ids(display.thread_ids);

    match (config.format, display.time) {
        (Format::Compact, true) => layer.compact().boxed(),
        (Format::Compact, false) => layer.compact().without_time().boxed(),
        (Format::Pretty, true) => layer.pretty().boxed(),
        (Format::Pretty, false) => layer.pretty().without_time().boxed(),
        (Format::Json, time) => {
            let json = layer
                .json()
                .with_current_span(true)
                .flatten_event(display.flatten);
            if time {
                json.boxed()
            } else {
                json.without_time().boxed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_filter_is_rejected_before_install() {
        let builder = LoggerBuilder::from_config(Config {
            level: "pmbench_alloc=loud".to_string(),
            ..Config::default()
        });
        let err = builder.build().unwrap_err();
        assert_eq!(err.code(), "LOG:FILTER");
        assert!(!tracing::dispatcher::has_been_set());
    }

    #[test]
    fn test_presets_have_valid_filters() {
        for config in [Config::default(), Config::development(), Config::production(), Config::bench()] {
            LoggerBuilder::from_config(config).filter().unwrap();
        }
    }
}
