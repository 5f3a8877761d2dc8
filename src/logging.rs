use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use env_logger::{Builder, Target};

use crate::config::{LogTarget, Settings};
use crate::errors::SamError;

pub const LOG_FILE: &str = "download-sam.log";

/// Set up `env_logger` from the settings.  `RUST_LOG`, when set, refines the
/// level given on the command line.
pub fn init(settings: &Settings) -> Result<(), SamError> {
    builder(settings, Path::new(LOG_FILE))?
        .parse_default_env()
        .try_init()
        .map_err(|e| SamError::Unexpected(format!("cannot initialize logging: {}", e)))
}

/// Level, line format and target.  With `--log file` lines are appended to
/// `log_file`, which is created if missing.
fn builder(settings: &Settings, log_file: &Path) -> Result<Builder, SamError> {
    let mut builder = Builder::new();
    builder.filter_level(settings.log_level.into());

    if let Some(job_id) = settings.job_id.clone() {
        builder.format(move |buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                buf.timestamp(),
                record.level(),
                job_id,
                record.args()
            )
        });
    }

    if settings.log_target == LogTarget::File {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| SamError::io(log_file, e))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    Ok(builder)
}
