use clap::{ArgAction, Parser};
use std::path::PathBuf;
use upload_core::config::{DEFAULT_FOLDER, DEFAULT_HOST, DEFAULT_PORT};
use upload_core::{ServerConfig, TlsSettings};

/// File upload server: share files with devices on your network
#[derive(Parser, Debug)]
#[command(name = "upload-server", version, disable_version_flag = true)]
pub struct Cli {
    /// Port number
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Disable QR terminal output
    #[arg(short = 'q', long = "qr-disable")]
    pub qr_disable: bool,

    /// Folder to upload files to
    #[arg(short = 'f', long, default_value = DEFAULT_FOLDER)]
    pub folder: PathBuf,

    /// Enable TLS / HTTPS
    #[arg(short = 'S', long)]
    pub tls: bool,

    /// Server certificate file (PEM)
    #[arg(short = 'C', long)]
    pub cert: Option<PathBuf>,

    /// Private key file (PEM)
    #[arg(short = 'K', long)]
    pub key: Option<PathBuf>,

    /// Maximum request body size in bytes
    #[arg(long = "max-size", value_name = "BYTES")]
    pub max_size: Option<usize>,

    /// Print the current version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

impl Cli {
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: DEFAULT_HOST,
            port: self.port,
            folder: self.folder,
            tls: TlsSettings {
                enabled: self.tls,
                cert_path: self.cert,
                key_path: self.key,
            },
            qr_enabled: !self.qr_disable,
            max_body_bytes: self.max_size,
        }
    }
}
