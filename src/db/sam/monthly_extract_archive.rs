// Monthly public extract of the SAM entity registration data.
// The file is posted on one of the first ten days of the month and the exact
// day isn't announced, so every day in the window is tried in turn.
// https://www.sam.gov/SAM/extractfiledownload?role=WW&version=SAM&filename=SAM_PUBLIC_MONTHLY_20240103.ZIP

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use zip::ZipArchive;

use crate::db::sam::lib_sam::{Fetch, TimedDownloader};
use crate::errors::SamError;
use crate::interval::month::Month;

pub const FILE_PREFIX: &str = "SAM_PUBLIC_MONTHLY_";
pub const DEFAULT_HOST_URL: &str = "https://www.sam.gov/SAM/extractfiledownload";

/// One guess at where the month's file was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionTarget {
    pub month: Month,
    pub day: i8,
}

impl AcquisitionTarget {
    /// For example SAM_PUBLIC_MONTHLY_20240103.ZIP
    pub fn filename(&self) -> String {
        format!("{}{}{:02}.ZIP", FILE_PREFIX, self.month.yyyymm(), self.day)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    pub target: AcquisitionTarget,
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub target: AcquisitionTarget,
    pub local_path: PathBuf,
    pub completed: bool,
}

#[derive(Clone, Debug)]
pub struct SamMonthlyArchive {
    pub host_url: String,
    /// Where the zip file is downloaded to before it is published
    pub work_dir: PathBuf,
    /// Last day of the month to try
    pub days: i8,
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl SamMonthlyArchive {
    pub fn new(host_url: &str, work_dir: &Path) -> SamMonthlyArchive {
        SamMonthlyArchive {
            host_url: host_url.trim_end_matches('?').to_string(),
            work_dir: work_dir.to_path_buf(),
            days: 10,
            attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Candidate days in ascending order.  Each call starts a fresh sequence.
    pub fn candidates(&self, month: Month) -> impl Iterator<Item = AcquisitionTarget> {
        (1..=self.days).map(move |day| AcquisitionTarget { month, day })
    }

    pub fn url(&self, target: &AcquisitionTarget) -> String {
        format!(
            "{}?role=WW&version=SAM&filename={}",
            self.host_url,
            target.filename()
        )
    }

    pub fn candidate_url(&self, target: AcquisitionTarget) -> CandidateUrl {
        CandidateUrl {
            target,
            filename: target.filename(),
            url: self.url(&target),
        }
    }

    /// Local path of the downloaded zip file.  Does not check if the file exists.
    pub fn filename(&self, target: &AcquisitionTarget) -> PathBuf {
        self.work_dir.join(target.filename())
    }

    /// Try one candidate up to `attempts` times, sleeping `retry_delay` between
    /// a failed attempt and the next one.  Failures are logged, never returned.
    pub async fn download_with_retry<F: Fetch>(
        &self,
        downloader: &TimedDownloader<F>,
        target: AcquisitionTarget,
    ) -> DownloadOutcome {
        let candidate = self.candidate_url(target);
        let local_path = self.filename(&target);
        info!("Built this URL: {}", candidate.url);
        info!("Attempting to download file: {}", local_path.display());

        for attempt in 1..=self.attempts {
            match downloader.download(&candidate.url, &local_path).await {
                Ok(bytes) => {
                    info!(
                        "Successfully downloaded {} ({} bytes)",
                        local_path.display(),
                        bytes
                    );
                    return DownloadOutcome {
                        target,
                        local_path,
                        completed: true,
                    };
                }
                Err(e) => {
                    warn!("Attempt {} of {} failed: {}", attempt, self.attempts, e);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        DownloadOutcome {
            target,
            local_path,
            completed: false,
        }
    }

    /// Walk the candidate days in order and return the first file downloaded,
    /// or `None` if no day in the window produced one.
    pub async fn download_month<F: Fetch>(
        &self,
        downloader: &TimedDownloader<F>,
        month: Month,
    ) -> Option<PathBuf> {
        for target in self.candidates(month) {
            let outcome = self.download_with_retry(downloader, target).await;
            if outcome.completed {
                return Some(outcome.local_path);
            }
        }
        None
    }

    /// Extract every entry of the zip file into `ingest_dir`, replacing files
    /// already there.  The archive normally holds a single DAT file.
    pub fn extract_to_ingest(
        &self,
        zip_path: &Path,
        ingest_dir: &Path,
    ) -> Result<Vec<PathBuf>, SamError> {
        info!("Unzipping downloaded archive to the ingest folder");
        let file = File::open(zip_path).map_err(|e| SamError::io(zip_path, e))?;
        let mut zip = ZipArchive::new(file).map_err(|e| SamError::Archive {
            path: zip_path.to_path_buf(),
            source: e,
        })?;

        let mut extracted = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| SamError::Archive {
                path: zip_path.to_path_buf(),
                source: e,
            })?;
            let relative = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    warn!("Skipping entry with unsafe path: {}", entry.name());
                    continue;
                }
            };
            let target = ingest_dir.join(relative);
            if entry.is_dir() {
                fs::create_dir_all(&target).map_err(|e| SamError::io(&target, e))?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| SamError::io(parent, e))?;
            }
            if target.exists() {
                info!(
                    "Deleting existing file in target folder first: {}",
                    target.display()
                );
                fs::remove_file(&target).map_err(|e| SamError::io(&target, e))?;
            }
            info!("Extracting file: {}", target.display());
            let mut out = File::create(&target).map_err(|e| SamError::io(&target, e))?;
            io::copy(&mut entry, &mut out).map_err(|e| SamError::io(&target, e))?;
            extracted.push(target);
        }
        info!("Unzip complete");
        Ok(extracted)
    }
}
