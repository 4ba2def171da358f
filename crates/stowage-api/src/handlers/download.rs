use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, Response, StatusCode},
    response::{IntoResponse, Redirect},
};
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::io;
use std::sync::Arc;
use stowage_core::{AppError, DriverKind};
use stowage_storage::{ByteStream, StoredFile};
use tokio::sync::mpsc;

/// Chunks buffered between the blocking reader and the response body
const STREAM_BUFFER_CHUNKS: usize = 8;

/// RFC 5987 `attr-char`: everything else is percent-encoded in `filename*`
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Download `<storage>/<object_id>` (or `<object_id>` in the default storage).
///
/// Remote objects with a public URL are redirected to it; everything else is
/// streamed through the server.
#[tracing::instrument(skip(state), fields(operation = "download_file"))]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response<Body>, HttpAppError> {
    let file = state.storage.get_async(&path).await?;

    if file.container().driver_kind() != DriverKind::Local {
        if let Some(url) = file.cdn_url() {
            tracing::debug!(path = %path, url = %url, "Redirecting download to object URL");
            return Ok(Redirect::temporary(&url).into_response());
        }
    }

    tracing::debug!(
        path = %path,
        size_bytes = file.size,
        content_type = %file.content_type,
        "Streaming stored file"
    );

    stream_file(file).await
}

async fn stream_file(file: StoredFile) -> Result<Response<Body>, HttpAppError> {
    let content_type = HeaderValue::from_str(&file.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = content_disposition(&file.filename);

    let stream = tokio::task::spawn_blocking(move || file.as_stream(None))
        .await
        .map_err(|e| AppError::Internal(format!("spawn_blocking join error: {}", e)))??;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(body_stream(stream)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// `attachment` disposition for `filename`.
///
/// Printable ASCII names are sent as is. Anything else gets an ASCII
/// `filename` fallback plus a UTF-8 `filename*` parameter (RFC 6266).
fn content_disposition(filename: &str) -> String {
    let printable = filename.bytes().all(|b| (b' '..=b'~').contains(&b));
    if printable && !filename.contains(['"', '\\']) {
        return format!("attachment;filename={}", filename);
    }

    let fallback: String = filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment;filename=\"{}\";filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(filename, ATTR_CHAR)
    )
}

/// Pump a blocking byte stream into an async body on the blocking pool.
fn body_stream(
    stream: ByteStream,
) -> impl futures::Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER_CHUNKS);

    tokio::task::spawn_blocking(move || {
        for chunk in stream {
            let failed = chunk.is_err();
            let item = chunk.map_err(|e| {
                tracing::error!(error = %e, "Storage stream error");
                io::Error::other(format!("Storage stream error: {}", e))
            });
            // Stop when the client went away.
            if tx.blocking_send(item).is_err() || failed {
                break;
            }
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii_name() {
        assert_eq!(content_disposition("get.txt"), "attachment;filename=get.txt");
    }

    #[test]
    fn test_content_disposition_utf8_name() {
        let value = content_disposition("rapport été.pdf");
        assert_eq!(
            value,
            "attachment;filename=\"rapport _t_.pdf\";filename*=UTF-8''rapport%20%C3%A9t%C3%A9.pdf"
        );
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[test]
    fn test_content_disposition_quotes_and_controls() {
        let value = content_disposition("a\"b\nc.txt");
        assert_eq!(
            value,
            "attachment;filename=\"a_b_c.txt\";filename*=UTF-8''a%22b%0Ac.txt"
        );
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
