//! Shared helpers for wos-core integration tests

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wos_common::config::ServiceConfig;
use wos_core::{build_router, AppState};

pub const BOUNDARY: &str = "wos-test-boundary";

/// Router state over a temporary root
pub struct TestApp {
    pub root: TempDir,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        let root = TempDir::new().unwrap();
        let mut config = ServiceConfig::with_root(root.path());
        config.blob_mirror.public_base_url = Some("https://cdn.example.org/objects".to_string());
        for dir in config.required_directories() {
            std::fs::create_dir_all(dir).unwrap();
        }
        let pool = wos_common::db::init_database(&config.database.path)
            .await
            .unwrap();
        let state = AppState::from_config(pool, Arc::new(config)).unwrap();
        Self { root, state }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = build_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    pub async fn post_index(&self, document: &str) -> (StatusCode, Value) {
        self.send_json(
            Request::builder()
                .method(Method::POST)
                .uri("/v1/object/index")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(document.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn search(&self, body: Value) -> (StatusCode, Value) {
        self.send_json(
            Request::builder()
                .method(Method::POST)
                .uri("/v1/object/search")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// One multipart form field
pub struct Part<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub data: &'a [u8],
}

pub fn multipart_request(method: Method, uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    part.name, file_name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name).as_bytes(),
            ),
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn document(kind: &str, name: &str, location: Option<(f64, f64)>, spec: &str) -> String {
    let location = location
        .map(|(lat, lon)| format!(r#","location":{{"lat":{},"lon":{}}}"#, lat, lon))
        .unwrap_or_default();
    format!(
        r#"{{"apiVersion":"v1","kind":"{kind}","metadata":{{"name":"{name}","createdAt":"2024-05-02T08:30:00Z","description":"integration","owner":{{"id":"owner-7","provider":"github"}}{location}}},"spec":{spec}}}"#
    )
}

pub fn arc_document(name: &str) -> String {
    document("arc", name, None, r#"{"coverImageUri":"media/cover.png"}"#)
}

pub fn pin_document(name: &str, lat: f64, lon: f64) -> String {
    document("pin", name, Some((lat, lon)), "{}")
}

pub fn pinned_arc_document(name: &str, arc_cid: &str, pin_cid: &str) -> String {
    document(
        "pinnedArc",
        name,
        None,
        &format!(
            r#"{{"arcSelector":{{"cid":"{}"}},"pinSelector":{{"cid":"{}"}}}}"#,
            arc_cid, pin_cid
        ),
    )
}

pub fn tar_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Single-entry tar whose header name bypasses the builder's path checks
pub fn raw_tar_entry(name: &str, data: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_old();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    let mut out = header.as_bytes().to_vec();
    out.extend_from_slice(data);
    let padding = (512 - data.len() % 512) % 512;
    out.extend(std::iter::repeat(0u8).take(padding + 1024));
    out
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 90]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}
