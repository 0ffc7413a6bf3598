use crate::error::StartupError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};

/// Default HTTP port for the upload server
pub const DEFAULT_PORT: u16 = 5000;

/// Host the server always binds to
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Folder uploads are stored in and served from
pub const DEFAULT_FOLDER: &str = "files";

/// Certificate and key locations for HTTPS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// Whether HTTPS was requested at all
    pub enabled: bool,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl TlsSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            cert_path: None,
            key_path: None,
        }
    }
}

/// Resolved server configuration.
///
/// Built once from command line input and never mutated afterwards. The
/// listener and every request handler get it through an `Arc`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Upload folder. Relative folders are resolved against the working
    /// directory; the last component is also the listing route.
    pub folder: PathBuf,
    pub tls: TlsSettings,
    /// Render a QR code next to each announced URL
    pub qr_enabled: bool,
    /// Maximum accepted request body in bytes, `None` for no limit
    pub max_body_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            folder: PathBuf::from(DEFAULT_FOLDER),
            tls: TlsSettings::disabled(),
            qr_enabled: true,
            max_body_bytes: None,
        }
    }
}

impl ServerConfig {
    /// Config for a server storing into `folder`, everything else default
    pub fn with_folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// URL path segment the listing is mounted at (`files` for `./files`)
    pub fn route_name(&self) -> Result<String, StartupError> {
        folder_route_name(&self.folder)
    }

    /// Check the TLS flags before anything is bound.
    ///
    /// Returns the certificate and key paths when HTTPS must be used. A TLS
    /// request with a missing path is an error, never a plaintext fallback.
    pub fn tls_material(&self) -> Result<Option<(&Path, &Path)>, StartupError> {
        let tls = &self.tls;
        if !tls.enabled {
            if tls.cert_path.is_some() || tls.key_path.is_some() {
                tracing::warn!("Certificate or key given without --tls, serving plain HTTP");
            }
            return Ok(None);
        }

        match (tls.cert_path.as_deref(), tls.key_path.as_deref()) {
            (Some(cert), Some(key)) => Ok(Some((cert, key))),
            (None, _) => Err(StartupError::TlsMaterialMissing { what: "certificate" }),
            (_, None) => Err(StartupError::TlsMaterialMissing { what: "private key" }),
        }
    }
}

fn folder_route_name(folder: &Path) -> Result<String, StartupError> {
    let invalid = || StartupError::InvalidFolder(folder.display().to_string());

    if folder
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(invalid());
    }

    let name = folder
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .last()
        .ok_or_else(invalid)?;

    let name = name.to_str().ok_or_else(invalid)?;
    if name.starts_with('.') {
        return Err(invalid());
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:5000");
        assert_eq!(config.route_name().unwrap(), "files");
        assert!(config.qr_enabled);
    }

    #[test]
    fn test_route_name_uses_last_component() {
        let config = ServerConfig::with_folder("/srv/shared/uploads/");
        assert_eq!(config.route_name().unwrap(), "uploads");

        let config = ServerConfig::with_folder("./phone");
        assert_eq!(config.route_name().unwrap(), "phone");
    }

    #[test]
    fn test_route_name_rejects_bad_folders() {
        for folder in ["", "/", "..", "files/..", "./.hidden"] {
            let config = ServerConfig::with_folder(folder);
            assert!(
                matches!(config.route_name(), Err(StartupError::InvalidFolder(_))),
                "folder {folder:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_tls_requires_both_files() {
        let mut config = ServerConfig::default();
        config.tls = TlsSettings {
            enabled: true,
            cert_path: Some(PathBuf::from("cert.pem")),
            key_path: None,
        };
        assert!(matches!(
            config.tls_material(),
            Err(StartupError::TlsMaterialMissing { what: "private key" })
        ));

        config.tls.cert_path = None;
        config.tls.key_path = Some(PathBuf::from("key.pem"));
        assert!(matches!(
            config.tls_material(),
            Err(StartupError::TlsMaterialMissing { what: "certificate" })
        ));

        config.tls.cert_path = Some(PathBuf::from("cert.pem"));
        let (cert, key) = config.tls_material().unwrap().unwrap();
        assert_eq!(cert, Path::new("cert.pem"));
        assert_eq!(key, Path::new("key.pem"));
    }

    #[test]
    fn test_cert_without_flag_stays_plain() {
        let mut config = ServerConfig::default();
        config.tls.cert_path = Some(PathBuf::from("cert.pem"));
        config.tls.key_path = Some(PathBuf::from("key.pem"));
        assert!(config.tls_material().unwrap().is_none());
    }
}
