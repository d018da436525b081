//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a full [`AppContext`] over a
//! temporary working directory with the real image converter, plus a
//! multipart body builder and in-code image fixtures.

#![allow(dead_code)]

use std::io::Cursor;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use tower::ServiceExt;

use hf_core::config::Config;
use hf_server::context::AppContext;
use hf_server::router::build_router;

/// Test harness wrapping a fully-constructed [`AppContext`] backed by a
/// temporary directory.
pub struct TestHarness {
    pub ctx: AppContext,
    _tmp: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a new harness after adjusting the default configuration.
    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.storage.temp_dir = tmp.path().join("temp_files");
        configure(&mut config);

        let ctx = hf_server::build_context(config).expect("failed to build context");
        Self { ctx, _tmp: tmp }
    }

    /// A fresh router over the shared context.
    pub fn router(&self) -> Router {
        build_router(self.ctx.clone(), None)
    }

    /// Send one request through a fresh router.
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    /// Poll `/status/{id}` until the job leaves `processing`.
    pub async fn wait_for_job(&self, job_id: &str) -> serde_json::Value {
        for _ in 0..500 {
            let response = self.get(&format!("/status/{job_id}")).await;
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            if json["status"] != "processing" {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {job_id} did not finish in time");
    }
}

/// Collect a response body into bytes.
pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Minimal `multipart/form-data` body builder.
pub struct MultipartBody {
    boundary: &'static str,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "heicforge-test-boundary-7MA4YWxkTrZu0gW",
            body: Vec::new(),
        }
    }

    pub fn file(mut self, field: &str, file_name: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn text(mut self, field: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    /// Finish the body and wrap it in a POST request to `uri`.
    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Request::post(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", self.boundary),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

fn encode_png(image: DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// An opaque RGB gradient PNG.
pub fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    encode_png(DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 16) as u8, (y * 16) as u8, 200])
    })))
}

/// An 8x8 PNG whose left half is fully transparent and right half opaque blue.
pub fn transparent_png_fixture() -> Vec<u8> {
    encode_png(DynamicImage::ImageRgba8(RgbaImage::from_fn(8, 8, |x, _| {
        if x < 4 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([0, 0, 255, 255])
        }
    })))
}

/// Bytes no decoder accepts.
pub fn corrupt_fixture() -> Vec<u8> {
    b"this is not an image at all".to_vec()
}
