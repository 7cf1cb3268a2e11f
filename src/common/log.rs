//! Structured logging setup.
//!
//! Library code only emits `tracing` events; binaries and test harnesses call
//! [`init_logging`] once to install a subscriber. `RUST_LOG` wins over the
//! configured level when present.

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::config::AppCfg;
use super::error::{GovError, GovResult};

static LOG_INIT: OnceCell<()> = OnceCell::new();

/// Install the global subscriber. Repeated calls are no-ops.
pub fn init_logging(cfg: &AppCfg) -> GovResult<()> {
    LOG_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&cfg.log_level))
            .map_err(|e| GovError::Config(format!("log level `{}`: {e}", cfg.log_level)))?;

        let registry = tracing_subscriber::registry().with(filter);
        let result = if cfg.json_log {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_current_span(true)
                        .with_span_list(false),
                )
                .try_init()
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_line_number(true),
                )
                .try_init()
        };
        result.map_err(|e| GovError::Config(format!("logging already initialised elsewhere: {e}")))
    })?;
    Ok(())
}
