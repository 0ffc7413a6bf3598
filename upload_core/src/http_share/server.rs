//! HTTP server for file sharing
//!
//! Router, uniform response headers, and the plaintext or TLS listener.

use super::landing::{index_handler, not_found_handler, render_landing_page};
use super::listing::{browse_handler, browse_root_handler};
use super::upload::{upload_handler, upload_redirect_handler};
use crate::config::ServerConfig;
use crate::error::StartupError;
use crate::storage::UploadRoot;
use crate::{ServerEvent, announce};
use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Headers the browser may send on cross-origin requests
const CORS_ALLOW_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";

/// Time in-flight requests get to finish once shutdown starts (TLS listener)
const TLS_SHUTDOWN_GRACE_SECS: u64 = 5;

/// State shared by all handlers
pub struct ShareState {
    pub config: Arc<ServerConfig>,
    pub root: UploadRoot,
    /// URL segment of the listing (`files`)
    pub route_name: String,
    /// Percent-encoded listing path (`/files`), used for routing and redirects
    pub listing_path: String,
    /// Landing page with the folder name filled in
    pub landing_page: String,
    pub event_tx: mpsc::Sender<ServerEvent>,
}

impl ShareState {
    pub fn new(
        config: Arc<ServerConfig>,
        root: UploadRoot,
        event_tx: mpsc::Sender<ServerEvent>,
    ) -> Result<Self, StartupError> {
        let route_name = config.route_name()?;
        let listing_path = format!("/{}", urlencoding::encode(&route_name));
        Ok(Self {
            landing_page: render_landing_page(&route_name, &listing_path),
            listing_path,
            route_name,
            config,
            root,
            event_tx,
        })
    }
}

/// Middleware adding CORS and content sniffing headers to every response.
///
/// `CorsLayer` answers preflights; this keeps the allowed headers on plain
/// responses too.
async fn add_share_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    response
}

/// Build the axum router for an already prepared state
pub fn create_router(state: Arc<ShareState>) -> Router {
    // Routes match the raw request path, so they use the encoded segment
    let listing = state.listing_path.clone();
    let listing_slash = format!("{}/", state.listing_path);
    let listing_nested = format!("{}/{{*path}}", state.listing_path);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]);

    let mut router = Router::new()
        .route("/", get(index_handler).post(upload_handler))
        .route("/upload", post(upload_redirect_handler))
        .route(&listing, get(browse_root_handler))
        .route(&listing_slash, get(browse_root_handler))
        .route(&listing_nested, get(browse_handler))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::disable());

    if let Some(limit) = state.config.max_body_bytes {
        router = router.layer(RequestBodyLimitLayer::new(limit));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(add_share_headers))
        .with_state(state)
}

/// Create the upload folder and build the router for `config`
pub async fn build_router(
    config: Arc<ServerConfig>,
    event_tx: mpsc::Sender<ServerEvent>,
) -> Result<Router, StartupError> {
    config.route_name()?;
    let root = UploadRoot::create(&config.folder).await?;
    let state = ShareState::new(config, root, event_tx)?;
    Ok(create_router(Arc::new(state)))
}

/// Protocol the listener speaks, fixed at startup
#[derive(Clone)]
pub enum Transport {
    Plain,
    Tls(RustlsConfig),
}

impl Transport {
    /// Load TLS material when HTTPS was requested.
    ///
    /// Missing or unreadable certificate/key files are fatal.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, StartupError> {
        let Some((cert, key)) = config.tls_material()? else {
            return Ok(Transport::Plain);
        };

        crate::install_crypto_provider();
        let tls = RustlsConfig::from_pem_file(cert, key)
            .await
            .map_err(StartupError::TlsMaterialInvalid)?;
        tracing::info!("Loaded TLS certificate {}", cert.display());
        Ok(Transport::Tls(tls))
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Transport::Plain => "http",
            Transport::Tls(_) => "https",
        }
    }
}

/// A bound upload server, ready to serve
pub struct FileServer {
    transport: Transport,
    listener: TcpListener,
    router: Router,
    upload_dir: PathBuf,
    event_tx: mpsc::Sender<ServerEvent>,
}

impl FileServer {
    /// Validate the config, prepare the upload folder and bind the socket.
    ///
    /// Every startup failure surfaces here, before a request is accepted.
    pub async fn bind(
        config: ServerConfig,
        event_tx: mpsc::Sender<ServerEvent>,
    ) -> Result<Self, StartupError> {
        let config = Arc::new(config);
        config.route_name()?;
        let transport = Transport::from_config(&config).await?;

        let root = UploadRoot::create(&config.folder).await?;
        let upload_dir = root.path().to_path_buf();
        let state = ShareState::new(config.clone(), root, event_tx.clone())?;
        let router = create_router(Arc::new(state));

        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;

        Ok(Self {
            transport,
            listener,
            router,
            upload_dir,
            event_tx,
        })
    }

    /// Canonical path of the upload folder
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn scheme(&self) -> &'static str {
        self.transport.scheme()
    }

    /// Serve until `cancel_token` fires
    pub async fn serve(self, cancel_token: CancellationToken) -> std::io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        let scheme = self.transport.scheme();
        let urls = announce::reachable_urls(scheme, local_addr);

        tracing::info!("Server started on {}://{}", scheme, local_addr);
        let _ = self
            .event_tx
            .send(ServerEvent::Listening {
                local_addr,
                scheme,
                urls,
            })
            .await;

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        match self.transport {
            Transport::Plain => {
                axum::serve(self.listener, app)
                    .with_graceful_shutdown(async move {
                        cancel_token.cancelled().await;
                        tracing::info!("HTTP server shutting down gracefully");
                    })
                    .await?;
            }
            Transport::Tls(tls) => {
                let handle = axum_server::Handle::new();
                let shutdown = handle.clone();
                tokio::spawn(async move {
                    cancel_token.cancelled().await;
                    tracing::info!("HTTPS server shutting down gracefully");
                    shutdown.graceful_shutdown(Some(Duration::from_secs(TLS_SHUTDOWN_GRACE_SECS)));
                });

                let listener = self.listener.into_std()?;
                axum_server::from_tcp_rustls(listener, tls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
        }

        tracing::debug!("Listener for {} closed", self.upload_dir.display());
        let _ = self.event_tx.send(ServerEvent::Stopped).await;
        Ok(())
    }
}
