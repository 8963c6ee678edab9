use std::io;
use std::sync::Once;

use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;

static INIT: Once = Once::new();

#[derive(Debug, Clone, Default)]
pub struct TracingFactory {
    options: TracingFactoryOptions,
}

#[derive(Debug, Clone)]
pub struct TracingFactoryOptions {
    debug: bool,
    output_type: OutputType,
    level: Option<Level>,
    log_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub enum OutputType {
    Stdout,
    File,
}

impl TracingFactory {
    /// Installs the global subscriber once per process; later calls are no-ops.
    pub fn init_log(debug: bool) -> Self {
        TracingFactory::init_log_with_options(TracingFactoryOptions::new_with_debug(debug))
    }

    pub fn init_log_with_options(opts: TracingFactoryOptions) -> Self {
        let dir = opts
            .log_dir
            .clone()
            .unwrap_or_else(|| "/tmp/mysql-server/logs".to_string());
        let level = opts.level.unwrap_or(Level::INFO);

        INIT.call_once(|| {
            let format = tracing_subscriber::fmt::format()
                .with_file(true)
                .with_line_number(false)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .compact();

            let result = match opts.output_type {
                OutputType::Stdout => tracing_subscriber::fmt()
                    .with_max_level(level)
                    .event_format(format)
                    .try_init(),
                OutputType::File => {
                    let file_appender = rolling::daily(format!("{dir}/server"), "server.log");
                    let merge = file_appender.and(io::stdout);
                    tracing_subscriber::fmt()
                        .with_max_level(level)
                        .event_format(format)
                        .with_writer(merge)
                        .try_init()
                }
            };
            let _ = result;
        });

        TracingFactory {
            options: TracingFactoryOptions {
                log_dir: Some(dir),
                ..opts
            },
        }
    }

    pub fn log_dir(&self) -> &str {
        self.options.log_dir()
    }
}

impl Default for TracingFactoryOptions {
    fn default() -> Self {
        TracingFactoryOptions::new_with_debug(true)
    }
}

impl TracingFactoryOptions {
    pub fn new_with_debug(debug: bool) -> Self {
        TracingFactoryOptions::new(debug, OutputType::Stdout, None)
    }

    pub fn new(debug: bool, output_type: OutputType, log_dir: Option<String>) -> Self {
        let level = if debug { Level::DEBUG } else { Level::INFO };
        TracingFactoryOptions {
            debug,
            output_type,
            level: Some(level),
            log_dir,
        }
    }

    pub fn log_dir(&self) -> &str {
        self.log_dir.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod test {
    use tracing::{debug, error, info, warn};

    use super::TracingFactory;

    #[test]
    fn init_log_is_idempotent() {
        TracingFactory::init_log(true);
        TracingFactory::init_log(true);

        debug!("tracing factory test: {:?}", "test");
        info!("tracing factory test: {:?}", "test");
        warn!("tracing factory test: {:?}", "test");
        error!("tracing factory test: {:?}", "test");
    }
}
