//! Multipart HTTP client for the verify, upload, list and compare endpoints.

use facegate_core::{BackendError, CapturedFrame, Comparison, FaceBackend, IdentityRef, Verdict};
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const VERIFY_WITH_ID_PATH: &str = "/verify-with-id";
const UPLOAD_IMAGE_PATH: &str = "/upload-image";
const ALL_IMAGE_IDS_PATH: &str = "/all-image-ids";
const VERIFY_WITH_IMAGE_PATH: &str = "/api-micro/verify-with-image";

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// File name attached to every uploaded frame.
const FRAME_FILE_NAME: &str = "captured-image.png";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Client for the recognition backend.
///
/// The comparison endpoint may live on a different host than the others.
pub struct HttpBackend {
    /// HTTP client (reusable connection pool).
    http_client: reqwest::Client,
    base_url: String,
    compare_base_url: String,
}

/// `image_id` values arrive as strings or bare numbers depending on the backend.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(i64),
}

impl From<IdValue> for IdentityRef {
    fn from(value: IdValue) -> Self {
        match value {
            IdValue::Text(s) => IdentityRef::new(s),
            IdValue::Number(n) => IdentityRef::new(n.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    image_id: IdValue,
}

#[derive(Debug, Deserialize)]
struct ImageIdsResponse {
    image_ids: Vec<IdValue>,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    result: String,
}

impl HttpBackend {
    /// Create a client. `compare_base_url` defaults to `base_url`.
    pub fn new(
        base_url: &str,
        compare_base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let base_url = normalize_base(base_url)?;
        let compare_base_url = match compare_base_url {
            Some(url) => normalize_base(url)?,
            None => base_url.clone(),
        };
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http_client,
            base_url,
            compare_base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl FaceBackend for HttpBackend {
    /// `POST /verify-with-id` with `image` and `image_id`. HTTP 200 is a
    /// match; any other status is a miss.
    async fn verify_with_id(
        &self,
        frame: &CapturedFrame,
        identity: &IdentityRef,
    ) -> Result<Verdict, BackendError> {
        let form = Form::new()
            .part("image", frame_part(frame)?)
            .text("image_id", identity.as_str().to_string());

        let response = self
            .http_client
            .post(self.url(VERIFY_WITH_ID_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), identity = %identity, "verify-with-id response");
        Ok(if status == StatusCode::OK {
            Verdict::Match
        } else {
            Verdict::NoMatch
        })
    }

    /// `POST /upload-image` with `image`; returns the assigned `image_id`.
    async fn upload_image(&self, frame: &CapturedFrame) -> Result<IdentityRef, BackendError> {
        let form = Form::new().part("image", frame_part(frame)?);

        let response = self
            .http_client
            .post(self.url(UPLOAD_IMAGE_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(BackendError::Rejected {
                status: response.status().as_u16(),
            });
        }
        let body: UploadResponse = response.json().await.map_err(|e| {
            BackendError::InvalidResponse(format!("failed to parse upload response: {e}"))
        })?;
        Ok(body.image_id.into())
    }

    /// `GET /all-image-ids`.
    async fn list_identities(&self) -> Result<Vec<IdentityRef>, BackendError> {
        let response = self
            .http_client
            .get(self.url(ALL_IMAGE_IDS_PATH))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(BackendError::Rejected {
                status: response.status().as_u16(),
            });
        }
        let body: ImageIdsResponse = response.json().await.map_err(|e| {
            BackendError::InvalidResponse(format!("failed to parse image id list: {e}"))
        })?;
        Ok(body.image_ids.into_iter().map(IdentityRef::from).collect())
    }

    /// `POST /api-micro/verify-with-image` with `image1` and `image2`.
    ///
    /// A `result` body is honoured even on an error status.
    async fn compare_images(
        &self,
        first: &CapturedFrame,
        second: &CapturedFrame,
    ) -> Result<Comparison, BackendError> {
        let form = Form::new()
            .part("image1", frame_part(first)?)
            .part("image2", frame_part(second)?);

        let response = self
            .http_client
            .post(format!("{}{VERIFY_WITH_IMAGE_PATH}", self.compare_base_url))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        match serde_json::from_slice::<CompareResponse>(&body) {
            Ok(parsed) => Ok(Comparison::from_result(&parsed.result)),
            Err(_) if !status.is_success() => Err(BackendError::Rejected {
                status: status.as_u16(),
            }),
            Err(e) => Err(BackendError::InvalidResponse(format!(
                "failed to parse comparison response: {e}"
            ))),
        }
    }
}

fn normalize_base(url: &str) -> Result<String, ClientError> {
    let parsed = Url::parse(url).map_err(|e| ClientError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {:?}", parsed.scheme()),
        });
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn frame_part(frame: &CapturedFrame) -> Result<Part, BackendError> {
    Part::bytes(frame.png.clone())
        .file_name(FRAME_FILE_NAME)
        .mime_str("image/png")
        .map_err(|e| BackendError::Transport(format!("failed to build multipart body: {e}")))
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Transport(format!("request timed out: {e}"))
    } else if e.is_connect() {
        BackendError::Transport(format!("connection failed: {e}"))
    } else {
        BackendError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{FromRequest, Multipart, Request};
    use axum::http::{header, StatusCode};
    use axum::Router;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn frame() -> CapturedFrame {
        CapturedFrame {
            png: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
            width: 1,
            height: 1,
        }
    }

    #[derive(Debug)]
    struct FormPart {
        name: String,
        file_name: Option<String>,
        content_type: Option<String>,
        data: Vec<u8>,
    }

    /// What the backend saw: method, path and the decoded multipart fields.
    #[derive(Debug)]
    struct Received {
        method: String,
        path: String,
        parts: Vec<FormPart>,
    }

    impl Received {
        async fn from_request(request: Request) -> Self {
            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let is_multipart = request
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("multipart/form-data"));

            let mut parts = Vec::new();
            if is_multipart {
                let mut multipart = Multipart::from_request(request, &()).await.unwrap();
                while let Some(field) = multipart.next_field().await.unwrap() {
                    let name = field.name().unwrap_or_default().to_string();
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let data = field.bytes().await.unwrap().to_vec();
                    parts.push(FormPart {
                        name,
                        file_name,
                        content_type,
                        data,
                    });
                }
            }
            Self {
                method,
                path,
                parts,
            }
        }

        fn part(&self, name: &str) -> Option<&FormPart> {
            self.parts.iter().find(|p| p.name == name)
        }

        fn text(&self, name: &str) -> Option<String> {
            self.part(name).map(|p| String::from_utf8_lossy(&p.data).into_owned())
        }

        fn field_names(&self) -> Vec<&str> {
            self.parts.iter().map(|p| p.name.as_str()).collect()
        }
    }

    /// Serve one canned JSON response on an ephemeral port. The receiver
    /// yields the first request the server decoded.
    async fn serve_once(
        status: StatusCode,
        body: &'static str,
    ) -> (String, oneshot::Receiver<Received>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let app = Router::new().fallback(move |request: Request| {
            let tx = Arc::clone(&tx);
            async move {
                let received = Received::from_request(request).await;
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(received);
                }
                (status, [(header::CONTENT_TYPE, "application/json")], body)
            }
        });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (base, rx)
    }

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(base, None, Duration::from_secs(5)).unwrap()
    }

    fn assert_png_frame_part(received: &Received, name: &str) {
        let part = received
            .part(name)
            .unwrap_or_else(|| panic!("missing {name} field in {:?}", received.field_names()));
        assert_eq!(part.file_name.as_deref(), Some("captured-image.png"));
        assert_eq!(part.content_type.as_deref(), Some("image/png"));
        assert_eq!(part.data, frame().png);
    }

    #[tokio::test]
    async fn test_verify_status_200_is_match() {
        let (base, server) = serve_once(StatusCode::OK, r#"{"message":"verified"}"#).await;

        let verdict = backend(&base)
            .verify_with_id(&frame(), &IdentityRef::new("face-42"))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Match);

        let received = server.await.unwrap();
        assert_eq!(received.method, "POST");
        assert_eq!(received.path, "/verify-with-id");
        assert_png_frame_part(&received, "image");
        assert_eq!(received.text("image_id").as_deref(), Some("face-42"));
        assert_eq!(received.part("image_id").unwrap().file_name, None);
    }

    #[tokio::test]
    async fn test_verify_other_status_is_no_match() {
        let (base, server) =
            serve_once(StatusCode::UNAUTHORIZED, r#"{"message":"no match"}"#).await;

        let verdict = backend(&base)
            .verify_with_id(&frame(), &IdentityRef::new("face-42"))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::NoMatch);
        assert_eq!(server.await.unwrap().path, "/verify-with-id");
    }

    #[tokio::test]
    async fn test_verify_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = backend(&base)
            .verify_with_id(&frame(), &IdentityRef::new("face-42"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }

    #[tokio::test]
    async fn test_upload_returns_image_id() {
        let (base, server) = serve_once(StatusCode::OK, r#"{"image_id": 1017}"#).await;

        let id = backend(&base).upload_image(&frame()).await.unwrap();
        assert_eq!(id, IdentityRef::new("1017"));

        let received = server.await.unwrap();
        assert_eq!(received.method, "POST");
        assert_eq!(received.path, "/upload-image");
        assert_png_frame_part(&received, "image");
        assert_eq!(received.field_names(), vec!["image"]);
        assert!(received.part("image_id").is_none());
    }

    #[tokio::test]
    async fn test_upload_error_status_rejected() {
        let (base, server) =
            serve_once(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#).await;

        let err = backend(&base).upload_image(&frame()).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected { status: 500 }));
        assert_eq!(server.await.unwrap().path, "/upload-image");
    }

    #[tokio::test]
    async fn test_list_identities() {
        let (base, server) =
            serve_once(StatusCode::OK, r#"{"image_ids": ["a1b2", "c3d4"]}"#).await;

        let ids = backend(&base).list_identities().await.unwrap();
        assert_eq!(ids, vec![IdentityRef::new("a1b2"), IdentityRef::new("c3d4")]);

        let received = server.await.unwrap();
        assert_eq!(received.method, "GET");
        assert_eq!(received.path, "/all-image-ids");
        assert!(received.parts.is_empty());
    }

    #[tokio::test]
    async fn test_list_identities_malformed_body() {
        let (base, server) = serve_once(StatusCode::OK, r#"{"ids": []}"#).await;

        let err = backend(&base).list_identities().await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_compare_uses_compare_base() {
        let (compare_base, server) =
            serve_once(StatusCode::OK, r#"{"result": "Face match!"}"#).await;
        let client =
            HttpBackend::new("http://127.0.0.1:9", Some(&compare_base), Duration::from_secs(5))
                .unwrap();

        let verdict = client.compare_images(&frame(), &frame()).await.unwrap();
        assert_eq!(verdict, Comparison::Match);

        let received = server.await.unwrap();
        assert_eq!(received.method, "POST");
        assert_eq!(received.path, "/api-micro/verify-with-image");
        assert_eq!(received.field_names(), vec!["image1", "image2"]);
        assert_png_frame_part(&received, "image1");
        assert_png_frame_part(&received, "image2");
    }

    #[tokio::test]
    async fn test_compare_result_on_error_status() {
        let (base, server) =
            serve_once(StatusCode::BAD_REQUEST, r#"{"result": "No match."}"#).await;

        let verdict = backend(&base).compare_images(&frame(), &frame()).await.unwrap();
        assert_eq!(verdict, Comparison::NoMatch);
        server.await.unwrap();
    }

    #[test]
    fn test_base_url_validation() {
        let client = backend("http://localhost:5001/");
        assert_eq!(client.base_url(), "http://localhost:5001");
        assert_eq!(client.url(VERIFY_WITH_ID_PATH), "http://localhost:5001/verify-with-id");

        assert!(matches!(
            HttpBackend::new("localhost:5001", None, Duration::from_secs(1)),
            Err(ClientError::InvalidUrl { .. })
        ));
        assert!(matches!(
            HttpBackend::new("not a url", None, Duration::from_secs(1)),
            Err(ClientError::InvalidUrl { .. })
        ));
    }
}
