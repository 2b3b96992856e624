use std::io::Read;
use std::time::Duration;

use super::DownloadError;

/// An opened transfer: the announced size and a body to stream from
pub struct Transfer {
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

/// Source of asset bytes. Called from download worker threads.
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Transfer, DownloadError>;
}

/// Blocking HTTP transport.
///
/// Must be created and dropped outside of any tokio runtime.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, DownloadError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("hana3d-pipeline/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            // Asset files can be large; only bound the connect phase
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| DownloadError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Transfer, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| DownloadError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status().as_u16()));
        }

        Ok(Transfer {
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}
