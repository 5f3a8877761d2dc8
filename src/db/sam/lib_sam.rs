use std::future::Future;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use reqwest::{
    header::{HeaderMap, HeaderValue, UPGRADE_INSECURE_REQUESTS},
    Client,
};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::errors::SamError;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Copy a remote resource to a local file.  Returns the number of bytes written.
pub trait Fetch {
    fn fetch(
        &self,
        url: &str,
        destination: &Path,
    ) -> impl Future<Output = Result<u64, SamError>> + Send;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Client for the SAM host.  Certificate validation is off for every request.
    pub fn new() -> Result<HttpFetcher, SamError> {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        let client = Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(true)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| SamError::Unexpected(format!("failed to build http client: {}", e)))?;
        Ok(HttpFetcher { client })
    }

    pub fn with_client(client: Client) -> HttpFetcher {
        HttpFetcher { client }
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, SamError> {
        let failed = |reason: String| SamError::Transfer {
            url: url.to_string(),
            reason,
        };
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("server returned {}", status)));
        }

        let mut out = File::create(destination)
            .await
            .map_err(|e| failed(format!("cannot create {}: {}", destination.display(), e)))?;
        let mut partial = PartialFile::new(destination);
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| failed(e.to_string()))? {
            out.write_all(&chunk)
                .await
                .map_err(|e| failed(format!("cannot write {}: {}", destination.display(), e)))?;
            written += chunk.len() as u64;
        }
        out.flush()
            .await
            .map_err(|e| failed(format!("cannot write {}: {}", destination.display(), e)))?;
        partial.keep();
        Ok(written)
    }
}

/// A file this attempt created.  Removed on drop unless `keep` was called, so
/// an attempt that errors or is dropped mid-transfer leaves nothing behind,
/// while a file that was already there before the attempt is left alone.
struct PartialFile<'a> {
    path: &'a Path,
    kept: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path) -> PartialFile<'a> {
        PartialFile { path, kept: false }
    }

    fn keep(&mut self) {
        self.kept = true;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => info!("Removed partial download {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Could not remove partial download {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Runs one transfer against a wait window.  When the window elapses first the
/// transfer is dropped, which closes the connection and the output file.  A
/// fetcher removes its own partial output when dropped or failing.
pub struct TimedDownloader<F> {
    fetcher: F,
    max_wait: Duration,
}

impl<F: Fetch> TimedDownloader<F> {
    pub fn new(fetcher: F, max_wait: Duration) -> TimedDownloader<F> {
        TimedDownloader { fetcher, max_wait }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub async fn download(&self, url: &str, destination: &Path) -> Result<u64, SamError> {
        let finished = tokio::select! {
            res = self.fetcher.fetch(url, destination) => Some(res),
            _ = tokio::time::sleep(self.max_wait) => None,
        };
        match finished {
            Some(res) => res,
            None => Err(SamError::Transfer {
                url: url.to_string(),
                reason: format!("not completed within {}s", self.max_wait.as_secs_f64()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::path::PathBuf;

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    fn local_fetcher() -> HttpFetcher {
        HttpFetcher::with_client(Client::builder().no_proxy().build().unwrap())
    }

    /// Serve one canned response on a local port, optionally stalling afterwards.
    async fn serve_once(response: &'static [u8], stall: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response).await;
            let _ = socket.flush().await;
            if stall {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        });
        format!("http://{}/SAM/extractfiledownload?filename=x.ZIP", addr)
    }

    fn destination(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("SAM_PUBLIC_MONTHLY_20240101.ZIP")
    }

    #[tokio::test]
    async fn fetch_writes_body() -> Result<(), Box<dyn Error>> {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
            false,
        )
        .await;
        let dir = tempfile::tempdir()?;
        let path = destination(&dir);
        let n = local_fetcher().fetch(&url, &path).await?;
        assert_eq!(n, 5);
        assert_eq!(std::fs::read(&path)?, b"hello");
        Ok(())
    }

    #[tokio::test]
    async fn fetch_rejects_error_status() -> Result<(), Box<dyn Error>> {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            false,
        )
        .await;
        let dir = tempfile::tempdir()?;
        let path = destination(&dir);
        let res = local_fetcher().fetch(&url, &path).await;
        assert!(matches!(res, Err(SamError::Transfer { .. })));
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transfer_error() -> Result<(), Box<dyn Error>> {
        // bind then drop, so nothing listens on the port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);
        let dir = tempfile::tempdir()?;
        let downloader = TimedDownloader::new(local_fetcher(), Duration::from_secs(5));
        let res = downloader
            .download(&format!("http://{}/x.ZIP", addr), &destination(&dir))
            .await;
        assert!(matches!(res, Err(SamError::Transfer { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn stalled_transfer_is_abandoned_and_cleaned_up() -> Result<(), Box<dyn Error>> {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial",
            true,
        )
        .await;
        let dir = tempfile::tempdir()?;
        let path = destination(&dir);
        let downloader = TimedDownloader::new(local_fetcher(), Duration::from_millis(300));
        let res = downloader.download(&url, &path).await;
        match res {
            Err(SamError::Transfer { reason, .. }) => assert!(reason.contains("not completed")),
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn failed_attempt_keeps_file_it_did_not_create() -> Result<(), Box<dyn Error>> {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            false,
        )
        .await;
        let dir = tempfile::tempdir()?;
        let path = destination(&dir);
        std::fs::write(&path, "kept from a download-only run")?;
        let downloader = TimedDownloader::new(local_fetcher(), Duration::from_secs(5));
        let res = downloader.download(&url, &path).await;
        assert!(matches!(res, Err(SamError::Transfer { .. })));
        assert_eq!(
            std::fs::read_to_string(&path)?,
            "kept from a download-only run"
        );
        Ok(())
    }

    struct Refused;

    impl Fetch for Refused {
        async fn fetch(&self, url: &str, _destination: &Path) -> Result<u64, SamError> {
            Err(SamError::Transfer {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn downloader_leaves_existing_file_alone_on_error() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = destination(&dir);
        std::fs::write(&path, "zip")?;
        let downloader = TimedDownloader::new(Refused, Duration::from_secs(5));
        assert!(downloader.download("http://localhost/x.ZIP", &path).await.is_err());
        assert!(path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn timed_download_completes() -> Result<(), Box<dyn Error>> {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nzip",
            false,
        )
        .await;
        let dir = tempfile::tempdir()?;
        let path = destination(&dir);
        let downloader = TimedDownloader::new(local_fetcher(), Duration::from_secs(10));
        assert_eq!(downloader.download(&url, &path).await?, 3);
        assert!(path.exists());
        Ok(())
    }

    #[ignore]
    #[tokio::test]
    async fn download_from_sam() -> Result<(), Box<dyn Error>> {
        let downloader = TimedDownloader::new(HttpFetcher::new()?, Duration::from_secs(180));
        downloader
            .download(
                "https://www.sam.gov/SAM/extractfiledownload?role=WW&version=SAM&filename=SAM_PUBLIC_MONTHLY_20240107.ZIP",
                Path::new("/tmp/SAM_PUBLIC_MONTHLY_20240107.ZIP"),
            )
            .await?;
        Ok(())
    }
}
