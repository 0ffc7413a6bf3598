//! HTTP file sharing module
//!
//! Landing page, multipart uploads and the browsable upload folder.

pub mod landing;
pub mod listing;
pub mod server;
pub mod upload;

pub use server::{FileServer, ShareState, Transport, build_router, create_router};
