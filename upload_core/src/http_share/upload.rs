//! Multipart upload endpoints
//!
//! Every file part is streamed into a staging file first. Target names are
//! resolved once the whole body has been read, because the `file` field that
//! overrides them may come after the file parts. Only when every name is
//! valid are the staged files renamed into place.

use super::server::ShareState;
use crate::ServerEvent;
use crate::StoredFile;
use crate::error::{PathRejection, RequestError};
use crate::storage::{MAX_FILENAME_LENGTH, StagedFile, UploadRoot};
use axum::extract::multipart::{Field, Multipart, MultipartRejection};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Form field whose value overrides the stored file name
pub const TARGET_NAME_FIELD: &str = "file";

/// One file part of a multipart request, already on disk in staging
#[derive(Debug)]
pub struct IncomingFile {
    pub field_name: String,
    pub original_name: String,
    pub content_type: Option<String>,
    staged: StagedFile,
}

/// Everything read from one upload request
#[derive(Debug, Default)]
pub struct ReceivedUpload {
    /// Last non-empty `file` text field
    pub target_name: Option<String>,
    pub files: Vec<IncomingFile>,
}

/// Handler for `POST /` - stores the parts and answers with an empty 200
pub async fn upload_handler(
    State(state): State<Arc<ShareState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<StatusCode, RequestError> {
    store_upload(&state, multipart?).await?;
    Ok(StatusCode::OK)
}

/// Handler for `POST /upload` - same storage, then back to the listing
pub async fn upload_redirect_handler(
    State(state): State<Arc<ShareState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, RequestError> {
    store_upload(&state, multipart?).await?;
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, state.listing_path.clone())],
    )
        .into_response())
}

/// Receive, resolve and store every file part of one request
pub async fn store_upload(
    state: &ShareState,
    multipart: Multipart,
) -> Result<Vec<StoredFile>, RequestError> {
    let received = receive_parts(&state.root, multipart).await?;
    let stored = commit(&state.root, received).await?;

    for file in &stored {
        tracing::debug!("Stored {} ({} bytes)", file.path.display(), file.size);
        let _ = state
            .event_tx
            .send(ServerEvent::FileStored(file.clone()))
            .await;
    }
    Ok(stored)
}

/// Stream all parts of the body into staging files
pub async fn receive_parts(
    root: &UploadRoot,
    mut multipart: Multipart,
) -> Result<ReceivedUpload, RequestError> {
    let mut received = ReceivedUpload::default();

    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();

        let Some(original_name) = field.file_name().map(str::to_string) else {
            // Plain text field; only the target name matters
            if field_name == TARGET_NAME_FIELD {
                let value = read_target_name(&mut field).await?;
                if !value.is_empty() {
                    received.target_name = Some(value);
                }
            }
            continue;
        };

        // Browsers send an unnamed empty part for an empty file input
        if original_name.is_empty() {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let mut staged = StagedFile::create(root).await?;
        while let Some(chunk) = field.chunk().await? {
            staged.write_chunk(&chunk).await?;
        }
        staged.finish().await?;

        tracing::debug!(
            "Received part {:?} ({}, {} bytes)",
            original_name,
            field_name,
            staged.len()
        );
        received.files.push(IncomingFile {
            field_name,
            original_name,
            content_type,
            staged,
        });
    }

    Ok(received)
}

/// Resolve every target name, then move the staged files into place.
///
/// A rejected name fails the whole request before anything is renamed. If a
/// rename fails midway, files renamed before it stay in place.
pub async fn commit(
    root: &UploadRoot,
    received: ReceivedUpload,
) -> Result<Vec<StoredFile>, RequestError> {
    if received.files.is_empty() {
        return Err(RequestError::NoFiles);
    }

    let target_name = received.target_name.as_deref();
    let mut planned = Vec::with_capacity(received.files.len());
    for incoming in received.files {
        match root.resolve_upload(target_name, &incoming.original_name) {
            Ok((file_name, path)) => planned.push((incoming, file_name, path)),
            Err(reason) => {
                return Err(RequestError::PathRejected {
                    name: target_name.unwrap_or(&incoming.original_name).to_string(),
                    reason,
                });
            }
        }
    }

    let mut stored = Vec::with_capacity(planned.len());
    for (incoming, file_name, path) in planned {
        let size = incoming.staged.persist(&path).await?;
        stored.push(StoredFile {
            file_name,
            path,
            size,
        });
    }
    Ok(stored)
}

async fn read_target_name(field: &mut Field<'_>) -> Result<String, RequestError> {
    let mut value = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        value.extend_from_slice(&chunk);
        if value.len() > MAX_FILENAME_LENGTH {
            return Err(RequestError::PathRejected {
                name: String::from_utf8_lossy(&value[..MAX_FILENAME_LENGTH]).into_owned(),
                reason: PathRejection::TooLong {
                    max: MAX_FILENAME_LENGTH,
                },
            });
        }
    }
    Ok(String::from_utf8_lossy(&value).into_owned())
}
