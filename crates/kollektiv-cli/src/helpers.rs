//! Small setup helpers shared by the subcommands.

use kollektiv_core::config::LogFormat;
use tracing_subscriber::EnvFilter;

pub fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }
}
