//! `POST /updateorders`: order submission.
//!
//! A submission is a multipart form with `image` (PNG), `reason` and
//! `password`. Nothing touches the maps directory or the history until the
//! image has passed validation; a rejection answers with the reason text and
//! drops the upload.

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::api::auth::is_valid_order_password;
use crate::api::state::AppState;
use crate::domain::Order;
use crate::error::{OrderRejection, PlaceError};
use crate::protocol::ServerMessage;
use crate::validation::validate_order_image;

/// Raw form fields as received
#[derive(Debug, Default)]
pub struct OrderSubmission {
    pub image: Option<UploadedImage>,
    pub reason: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug)]
pub struct UploadedImage {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl OrderSubmission {
    async fn read(mut multipart: Multipart) -> Result<Self, SubmitError> {
        let mut submission = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            SubmitError::BadForm(format!("failed to read multipart form: {}", e))
        })? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("image") => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field_bytes(field).await?;
                    submission.image = Some(UploadedImage {
                        content_type,
                        bytes,
                    });
                }
                Some("reason") => submission.reason = Some(field_text(field).await?),
                Some("password") => submission.password = Some(field_text(field).await?),
                _ => {}
            }
        }

        Ok(submission)
    }

    /// Credential and shape checks that come before decoding.
    fn check(self, expected_password: Option<&str>) -> Result<(String, Vec<u8>), OrderRejection> {
        let (Some(image), Some(reason), Some(password)) = (self.image, self.reason, self.password)
        else {
            return Err(OrderRejection::InvalidCredentials);
        };
        if reason.is_empty() || !is_valid_order_password(expected_password, &password) {
            return Err(OrderRejection::InvalidCredentials);
        }
        if image.content_type.as_deref() != Some("image/png") {
            return Err(OrderRejection::NotPng);
        }
        Ok((reason, image.bytes))
    }
}

async fn field_bytes(field: Field<'_>) -> Result<Vec<u8>, SubmitError> {
    field
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| SubmitError::BadForm(format!("failed to read image: {}", e)))
}

async fn field_text(field: Field<'_>) -> Result<String, SubmitError> {
    field
        .text()
        .await
        .map_err(|e| SubmitError::BadForm(format!("failed to read form field: {}", e)))
}

/// Outcome of a submission that did not end in a commit
#[derive(Debug)]
pub enum SubmitError {
    BadForm(String),
    Rejected(OrderRejection),
    Internal(PlaceError),
}

impl From<OrderRejection> for SubmitError {
    fn from(rejection: OrderRejection) -> Self {
        SubmitError::Rejected(rejection)
    }
}

impl From<PlaceError> for SubmitError {
    fn from(e: PlaceError) -> Self {
        SubmitError::Internal(e)
    }
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        match self {
            SubmitError::BadForm(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            SubmitError::Rejected(rejection) => {
                let status = match rejection {
                    OrderRejection::InvalidCredentials => StatusCode::UNAUTHORIZED,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, rejection.to_string()).into_response()
            }
            SubmitError::Internal(e) => {
                error!("Order submission failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to store order!").into_response()
            }
        }
    }
}

/// POST /updateorders
pub async fn update_orders(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Redirect, SubmitError> {
    let submission = OrderSubmission::read(multipart).await?;
    let order = submit_order(&state, submission).await?;
    info!(file = %order.file_ref, reason = %order.reason, "New order accepted");
    Ok(Redirect::to("/"))
}

/// Validate, store, commit and broadcast one submission.
pub async fn submit_order(state: &AppState, submission: OrderSubmission) -> Result<Order, SubmitError> {
    let (reason, bytes) = match submission.check(state.order_password.as_deref()) {
        Ok(checked) => checked,
        Err(rejection) => {
            warn!("Order submission refused: {}", rejection);
            return Err(rejection.into());
        }
    };

    // Decoding and scanning 4M pixels is CPU work
    let bytes = tokio::task::spawn_blocking(move || {
        validate_order_image(&bytes).map(|_| bytes)
    })
    .await
    .map_err(|e| PlaceError::Internal(format!("validation task failed: {}", e)))?
    .map_err(|rejection| {
        warn!("Order rejected: {}", rejection);
        SubmitError::Rejected(rejection)
    })?;

    tokio::fs::create_dir_all(state.maps_dir.as_path())
        .await
        .map_err(PlaceError::from)?;
    let (file, path) = store_order_image(state.maps_dir.as_path(), Utc::now(), &bytes)
        .await
        .map_err(PlaceError::from)?;

    let order = Order::new(file, reason, Utc::now());
    if let Err(e) = state.history.commit(order.clone()).await {
        if let Err(rm) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove orphaned order image {}: {}", path.display(), rm);
        }
        return Err(e.into());
    }

    let delivered = state.broadcast(ServerMessage::map(
        order.file_ref.clone(),
        Some(order.reason.clone()),
    ));
    info!(file = %order.file_ref, agents = delivered, "Order broadcast");

    Ok(order)
}

/// Write `bytes` to a new timestamp-named file in `maps_dir`. An existing
/// name is never reused; the timestamp moves forward a millisecond instead.
async fn store_order_image(
    maps_dir: &Path,
    mut at: DateTime<Utc>,
    bytes: &[u8],
) -> std::io::Result<(String, PathBuf)> {
    loop {
        let file = Order::file_name_for(at);
        let path = maps_dir.join(&file);
        let created = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        match created {
            Ok(mut out) => {
                out.write_all(bytes).await?;
                out.flush().await?;
                return Ok((file, path));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                at += Duration::milliseconds(1);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::coordination::ConnectionRegistry;
    use crate::domain::{Raster, Rgb};
    use crate::persistence::HistoryStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    async fn state(dir: &std::path::Path) -> AppState {
        let config = ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            data_file: dir.join("data.json"),
            maps_dir: dir.join("maps"),
            static_dir: dir.join("static"),
            order_password: Some("hunter2".to_string()),
            liveness_window_secs: 660,
            liveness_tick_ms: 1000,
            broadcast_capacity: 8,
            max_upload_bytes: 1 << 24,
        };
        let history = HistoryStore::open(&config.data_file).await.unwrap();
        AppState::new(
            Arc::new(history),
            Arc::new(ConnectionRegistry::default()),
            &config,
        )
    }

    fn submission(png: Vec<u8>, content_type: &str, password: &str) -> OrderSubmission {
        OrderSubmission {
            image: Some(UploadedImage {
                content_type: Some(content_type.to_string()),
                bytes: png,
            }),
            reason: Some("test".to_string()),
            password: Some(password.to_string()),
        }
    }

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        Raster::filled(width, height, Rgb::new(0xFF, 0xFF, 0xFF))
            .encode_png()
            .unwrap()
    }

    fn rejection(result: Result<Order, SubmitError>) -> OrderRejection {
        match result {
            Err(SubmitError::Rejected(r)) => r,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_password_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        let result = submit_order(&state, submission(vec![1, 2, 3], "image/png", "nope")).await;
        assert_eq!(rejection(result), OrderRejection::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_missing_reason_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        let mut sub = submission(vec![1], "image/png", "hunter2");
        sub.reason = None;
        assert_eq!(
            rejection(submit_order(&state, sub).await),
            OrderRejection::InvalidCredentials
        );
    }

    #[tokio::test]
    async fn test_non_png_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        let result = submit_order(&state, submission(vec![1], "image/jpeg", "hunter2")).await;
        assert_eq!(rejection(result), OrderRejection::NotPng);
    }

    #[tokio::test]
    async fn test_garbage_png_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        let result = submit_order(&state, submission(vec![0; 64], "image/png", "hunter2")).await;
        assert_eq!(rejection(result), OrderRejection::Unreadable);
    }

    #[tokio::test]
    async fn test_rejected_order_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        let result =
            submit_order(&state, submission(white_png(1999, 2000), "image/png", "hunter2")).await;

        assert!(matches!(
            rejection(result),
            OrderRejection::WrongDimensions { .. }
        ));
        assert_eq!(state.history.current().await.file_ref, "blank.png");
        assert_eq!(state.history.history().await.len(), 1);
        assert!(!dir.path().join("maps").exists());
    }

    #[tokio::test]
    async fn test_accepted_order_is_committed_and_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;
        let mut rx = state.ws_tx.subscribe();

        let order = submit_order(&state, submission(white_png(2000, 2000), "image/png", "hunter2"))
            .await
            .unwrap();

        assert_eq!(order.reason, "test");
        assert_eq!(state.history.current().await, order);
        assert_eq!(state.history.history().await.len(), 2);
        assert!(dir.path().join("maps").join(&order.file_ref).exists());
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::map(order.file_ref.clone(), Some("test".to_string()))
        );
    }

    #[tokio::test]
    async fn test_same_millisecond_orders_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let (first, second) = tokio::join!(
            store_order_image(dir.path(), at, b"first"),
            store_order_image(dir.path(), at, b"second"),
        );
        let (first_file, first_path) = first.unwrap();
        let (second_file, second_path) = second.unwrap();

        assert_ne!(first_file, second_file);
        let mut names = [first_file, second_file];
        names.sort();
        assert_eq!(names, ["1700000000000.png", "1700000000001.png"]);
        assert_eq!(std::fs::read(first_path).unwrap(), b"first");
        assert_eq!(std::fs::read(second_path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_existing_image_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        std::fs::write(dir.path().join("1700000000000.png"), b"committed").unwrap();

        let (file, _) = store_order_image(dir.path(), at, b"new").await.unwrap();

        assert_eq!(file, "1700000000001.png");
        assert_eq!(
            std::fs::read(dir.path().join("1700000000000.png")).unwrap(),
            b"committed"
        );
    }
}
