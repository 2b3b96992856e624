mod downloader;
mod error;
mod registry;
mod thread_com;
mod transport;

pub use downloader::Downloader;
pub use error::DownloadError;
pub use registry::DownloadRegistry;
pub use thread_com::{ThreadCom, UNKNOWN_FILE_SIZE};
pub use transport::{HttpTransport, Transfer, Transport};
