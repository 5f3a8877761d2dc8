use std::path::PathBuf;

use log::info;

use crate::config::{Mode, Settings};
use crate::db::s3::object_store::{ObjectStore, RemoteArchive};
use crate::db::sam::lib_sam::{Fetch, TimedDownloader};
use crate::db::sam::monthly_extract_archive::SamMonthlyArchive;
use crate::errors::SamError;
use crate::interval::month::Month;

/// Everything a run needs to know, built once at startup.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub settings: Settings,
    /// The month to fetch, with 'default' already resolved
    pub month: Month,
}

impl RunContext {
    pub fn new(settings: Settings) -> RunContext {
        let month = settings.month;
        RunContext { settings, month }
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The bucket already holds this key for the month
    AlreadyPresent(String),
    /// No candidate day in the window could be downloaded
    NothingFound,
    /// Download-only mode, the file is left in the work folder
    Downloaded(PathBuf),
    Published { key: String, extracted: Vec<PathBuf> },
}

pub struct Pipeline<'a, S, F> {
    pub ctx: &'a RunContext,
    pub archive: SamMonthlyArchive,
    pub downloader: TimedDownloader<F>,
    pub remote: Option<RemoteArchive<S>>,
}

impl<'a, S: ObjectStore, F: Fetch> Pipeline<'a, S, F> {
    /// Wire up the pipeline for a run.  `store` is only used in publish mode
    /// and may be `None` otherwise.
    pub fn new(ctx: &'a RunContext, fetcher: F, store: Option<S>) -> Pipeline<'a, S, F> {
        let settings = &ctx.settings;
        let remote = match (&settings.mode, store) {
            (Mode::Publish { s3, .. }, Some(store)) => Some(RemoteArchive {
                store,
                bucket: s3.bucket.clone(),
                prefix: s3.prefix.clone(),
                key_name: s3.key_name.clone(),
            }),
            _ => None,
        };
        Pipeline {
            ctx,
            archive: SamMonthlyArchive::new(&settings.host_url, &settings.work_dir),
            downloader: TimedDownloader::new(fetcher, settings.timeout),
            remote,
        }
    }

    fn remote(&self) -> Result<&RemoteArchive<S>, SamError> {
        self.remote
            .as_ref()
            .ok_or_else(|| SamError::Unexpected("no object store configured".to_string()))
    }

    /// Existence check, download, publish, extract, clean up.  Any error
    /// returned here ends the run.
    pub async fn run(&self) -> Result<RunOutcome, SamError> {
        let settings = &self.ctx.settings;
        let month = self.ctx.month;

        if !settings.only_download() {
            if settings.force {
                info!("The --force argument was supplied, skipping the check for an existing monthly file");
            } else if let Some(key) = self.remote()?.find_month(&month).await? {
                info!(
                    "Monthly File {} has already been downloaded for this month. Nothing to do.",
                    key
                );
                return Ok(RunOutcome::AlreadyPresent(key));
            }
        }

        let local = match self.archive.download_month(&self.downloader, month).await {
            Some(path) => path,
            None => {
                info!("No file found to download for {}", month);
                return Ok(RunOutcome::NothingFound);
            }
        };

        let ingest_dir = match &settings.mode {
            Mode::OnlyDownload => {
                info!(
                    "File was downloaded: {}. The --only-download option was specified, so no further processing will occur",
                    local.display()
                );
                return Ok(RunOutcome::Downloaded(local));
            }
            Mode::Publish { ingest_dir, .. } => ingest_dir,
        };

        let key = self.remote()?.publish(&local).await?;
        let extracted = self.archive.extract_to_ingest(&local, ingest_dir)?;

        info!(
            "Deleting downloaded file from the work location: {}",
            local.display()
        );
        tokio::fs::remove_file(&local)
            .await
            .map_err(|e| SamError::io(&local, e))?;

        Ok(RunOutcome::Published { key, extracted })
    }
}
