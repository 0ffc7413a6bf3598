use std::net::SocketAddr;
use std::path::PathBuf;

pub mod announce;
pub mod config;
pub mod error;
pub mod http_share;
pub mod storage;

pub use config::{ServerConfig, TlsSettings};
pub use error::{PathRejection, RequestError, StartupError};
pub use http_share::{FileServer, build_router};
pub use storage::UploadRoot;

/// A file that has been moved into place under the upload root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Final file name (relative to the upload root)
    pub file_name: String,
    /// Absolute on-disk path
    pub path: PathBuf,
    pub size: u64,
}

/// Notifications from the server to whoever drives it (the CLI binary)
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Listener is bound and accepting connections
    Listening {
        local_addr: SocketAddr,
        scheme: &'static str,
        /// URLs other devices can use to reach the server
        urls: Vec<String>,
    },

    /// One multipart part has been stored
    FileStored(StoredFile),

    /// Listener stopped after a shutdown request
    Stopped,
}

/// Install the ring crypto provider for rustls.
///
/// Needed before any TLS configuration is built (rustls 0.23+). Calling it
/// more than once is harmless.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
