use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::db::s3::object_store::DEFAULT_REGION;
use crate::db::sam::monthly_extract_archive::DEFAULT_HOST_URL;
use crate::errors::SamError;
use crate::interval::month::Month;

const ABOUT: &str = "Downloads the monthly SAM extract ZIP file from sam.gov";

const LONG_ABOUT: &str = "Downloads the monthly SAM extract ZIP file from sam.gov. \
The file is named SAM_PUBLIC_MONTHLY_YYYYMMnn.ZIP where 'nn' is the day between 1 and 10 \
on which the website generated it, so each day is tried in turn starting on day 1. Once \
found, the file is copied to S3 and its contents are extracted into the ingest folder. \
Before downloading, the S3 bucket is checked for a file for the same month and if one is \
there nothing is done, unless --force is given.";

#[derive(Parser, Debug)]
#[command(name = "download_sam", version, about = ABOUT, long_about = LONG_ABOUT)]
pub struct Args {
    /// Year and month of the file, e.g. 201707, or 'default' for the current month
    #[arg(long, env = "SAM_YYYYMM")]
    pub yyyymm: String,

    /// Existing folder the extracted file is placed into for ingest
    #[arg(long, env = "SAM_INGEST")]
    pub ingest: Option<PathBuf>,

    /// S3 bucket name only, without any s3:// scheme
    #[arg(long, env = "SAM_BUCKET")]
    pub bucket: Option<String>,

    /// Key prefix for the uploaded file.  S3 keys and prefixes are case sensitive
    #[arg(long, env = "SAM_PREFIX")]
    pub prefix: Option<String>,

    /// Key name for the uploaded file instead of the downloaded file name.  Combined with --prefix
    #[arg(long, env = "SAM_KEY_NAME")]
    pub key_name: Option<String>,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Download even if the bucket already holds a file for the month
    #[arg(long)]
    pub force: bool,

    /// Stop after the download.  No S3 access, the file stays in the work folder
    #[arg(long)]
    pub only_download: bool,

    /// Folder the zip file is downloaded into, defaults to the current folder
    #[arg(long, env = "SAM_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    #[arg(long, env = "SAM_HOST_URL", default_value = DEFAULT_HOST_URL)]
    pub host_url: String,

    /// How long to wait for one download attempt
    #[arg(long, default_value_t = 180)]
    pub timeout_secs: u64,

    #[arg(long, value_enum, default_value_t = LogTarget::Con)]
    pub log: LogTarget,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Job id included in every log line
    #[arg(long, env = "SAM_JOB_ID")]
    pub job_id: Option<String>,

    /// Environment name, e.g. test, prod.  Loads .env/<name>.env first
    #[arg(long)]
    pub env: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Con,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Err,
    Warn,
    Info,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Err => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct S3Settings {
    pub bucket: String,
    pub prefix: Option<String>,
    pub key_name: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// Download and stop
    OnlyDownload,
    /// Download, archive to S3 and extract for ingest
    Publish { ingest_dir: PathBuf, s3: S3Settings },
}

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub month: Month,
    pub force: bool,
    pub mode: Mode,
    pub work_dir: PathBuf,
    pub host_url: String,
    pub timeout: Duration,
    pub log_target: LogTarget,
    pub log_level: LogLevel,
    pub job_id: Option<String>,
}

impl Settings {
    /// Check the arguments.  `current` is what 'default' resolves to.
    pub fn from_args(args: Args, current: Month) -> Result<Settings, SamError> {
        let month = parse_yyyymm(&args.yyyymm, current)?;

        let mode = if args.only_download {
            Mode::OnlyDownload
        } else {
            let ingest_dir = non_empty_path(args.ingest).ok_or_else(|| {
                SamError::InvalidParameter(
                    "An ingest folder is required unless --only-download is specified".to_string(),
                )
            })?;
            if !ingest_dir.is_dir() {
                return Err(SamError::InvalidParameter(format!(
                    "Ingest directory {} does not exist",
                    ingest_dir.display()
                )));
            }
            match (
                non_empty(args.bucket),
                non_empty(args.access_key),
                non_empty(args.secret_key),
            ) {
                (Some(bucket), Some(access_key), Some(secret_key)) => Mode::Publish {
                    ingest_dir,
                    s3: S3Settings {
                        bucket,
                        prefix: non_empty(args.prefix),
                        key_name: non_empty(args.key_name),
                        access_key,
                        secret_key,
                        region: args.region,
                    },
                },
                _ => {
                    return Err(SamError::InvalidParameter(
                        "S3 credentials/bucket name and ingest folder are required unless --only-download is specified".to_string(),
                    ))
                }
            }
        };

        let work_dir = non_empty_path(args.work_dir).unwrap_or_else(|| PathBuf::from("."));
        if !work_dir.is_dir() {
            return Err(SamError::InvalidParameter(format!(
                "Work directory {} does not exist",
                work_dir.display()
            )));
        }
        if args.timeout_secs == 0 {
            return Err(SamError::InvalidParameter(
                "timeout-secs must be greater than zero".to_string(),
            ));
        }

        Ok(Settings {
            month,
            force: args.force,
            mode,
            work_dir,
            host_url: args.host_url,
            timeout: Duration::from_secs(args.timeout_secs),
            log_target: args.log,
            log_level: args.log_level,
            job_id: non_empty(args.job_id),
        })
    }

    pub fn only_download(&self) -> bool {
        self.mode == Mode::OnlyDownload
    }
}

impl TryFrom<Args> for Settings {
    type Error = SamError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        Settings::from_args(args, Month::current())
    }
}

/// Either 'default' (any case) for the current month, or a YYYYMM value.
pub fn parse_yyyymm(value: &str, current: Month) -> Result<Month, SamError> {
    if value.eq_ignore_ascii_case("default") {
        return Ok(current);
    }
    value.parse::<Month>().map_err(|_| {
        SamError::InvalidParameter(format!(
            "yyyymm argument value {} must be in the form YYYYMM",
            value
        ))
    })
}

/// The value of `--env` in the raw command line, if any.  Needed before the
/// full parse so the env file can supply the other arguments.
pub fn env_name(raw: &[String]) -> Option<String> {
    let mut iter = raw.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--env" {
            return iter.next().cloned();
        }
        if let Some(value) = arg.strip_prefix("--env=") {
            return Some(value.to_string());
        }
    }
    None
}

/// Load .env/<name>.env into the process environment, if that file exists.
/// Returns the path loaded, or `None` when there is no such file.
pub fn load_env_file(name: &str) -> Result<Option<PathBuf>, SamError> {
    load_env_file_in(Path::new(".env"), name)
}

fn load_env_file_in(dir: &Path, name: &str) -> Result<Option<PathBuf>, SamError> {
    let path = dir.join(format!("{}.env", name));
    if !path.is_file() {
        return Ok(None);
    }
    dotenvy::from_path(&path).map_err(|e| {
        SamError::InvalidParameter(format!("Cannot load env file {}: {}", path.display(), e))
    })?;
    Ok(Some(path))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|p| !p.as_os_str().is_empty())
}
