use crate::config::{Config, RustEnv};
use log::{LevelFilter, SetLoggerError};
use simplelog::{self, ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Modules to filter out from logging when not in Trace mode.
/// These are verbose HTTP stack dependencies that would bury stream lifecycle logs.
const FILTERED_MODULES: &[&str] = &["tower", "tracing", "hyper", "h2", "axum"];

pub struct Logger {}

impl Logger {
    /// Initializes the global logger with configuration based on the provided Config.
    ///
    /// When the log level is set to Trace, all logs including dependency logs are shown.
    /// For all other log levels, verbose dependency logs are filtered out. Production
    /// output is never colored so log collectors receive plain text.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let apply_filters = Self::should_filter_dependencies(config.log_level_filter);

        TermLogger::init(
            config.log_level_filter,
            Self::build_log_config(apply_filters),
            TerminalMode::Mixed,
            Self::color_choice(&config.runtime_env),
        )
    }

    /// Returns `false` for Trace level (show all logs), `true` for all other levels.
    fn should_filter_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    fn color_choice(runtime_env: &RustEnv) -> ColorChoice {
        match runtime_env {
            RustEnv::Production => ColorChoice::Never,
            RustEnv::Development | RustEnv::Staging => ColorChoice::Auto,
        }
    }

    /// Builds a simplelog Config with optional module filtering.
    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}
