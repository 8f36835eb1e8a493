use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;

use crate::error::Result;

/// Name of the per-run log file.
pub const LOG_FILE: &str = "paropt.log";

/// Log sink owned by one runner.
///
/// Events go to `<run_dir>/paropt.log` and, optionally, to stderr. The
/// filter comes from `RUST_LOG` and defaults to `info`. Nothing is installed
/// globally; the runner enters the dispatch only while it runs.
pub(crate) struct RunLog {
    dispatch: Dispatch,
    path: PathBuf,
}

impl RunLog {
    pub(crate) fn open(run_dir: &Path, console: bool) -> Result<Self> {
        let path = run_dir.join(LOG_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file));
        let console_layer = console.then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            path,
        })
    }

    pub(crate) fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
