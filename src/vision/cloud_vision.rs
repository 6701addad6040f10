//! Cloud Vision OCR backend
//!
//! Sends a PNG of the card crop to a Vision-style `images:annotate` endpoint
//! and converts the returned word annotations into [`OcrWord`]s.

use base64::Engine;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::ocr::{OcrWord, TextRecognizer};
use crate::card::{BoundingBox, Point};
use crate::error::OcrError;

/// OCR service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Annotate endpoint URL
    pub endpoint: String,
    /// Environment variable holding the API credential
    pub credential_env: String,
    /// Upper bound on one request, in seconds
    pub timeout_secs: u64,
    /// Vision feature type to request
    pub feature: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            credential_env: "OCR_AUTH_KEY".to_string(),
            timeout_secs: 15,
            feature: "TEXT_DETECTION".to_string(),
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Explicit credential first, then the configured environment variable
    pub fn resolve_credential(&self, explicit: Option<String>) -> Option<String> {
        explicit
            .or_else(|| std::env::var(&self.credential_env).ok())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Serialize)]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<ServiceStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextAnnotation {
    #[serde(default)]
    description: String,
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
}

/// Zero coordinates are omitted by the service
#[derive(Debug, Deserialize)]
struct Vertex {
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
}

#[derive(Debug, Deserialize)]
struct ServiceStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Convert an annotate response into word boxes.
///
/// The first annotation is the whole text block and is skipped. Words whose
/// polygon collapses to a line are dropped.
pub(crate) fn parse_words(response: AnnotateResponse) -> Result<Vec<OcrWord>, OcrError> {
    let Some(first) = response.responses.into_iter().next() else {
        return Ok(vec![]);
    };

    if let Some(status) = first.error {
        return Err(OcrError::Service(format!(
            "service returned {}: {}",
            status.code, status.message
        )));
    }

    let words = first
        .text_annotations
        .into_iter()
        .skip(1)
        .filter_map(|annotation| {
            let vertices: Vec<Point> = annotation
                .bounding_poly?
                .vertices
                .iter()
                .map(|v| Point::new(v.x, v.y))
                .collect();
            match BoundingBox::from_vertices(&vertices) {
                Ok(bounds) => Some(OcrWord {
                    text: annotation.description,
                    bounds,
                }),
                Err(e) => {
                    debug!("Dropping word '{}': {}", annotation.description, e);
                    None
                }
            }
        })
        .collect();

    Ok(words)
}

/// OCR client for a Vision-style REST service
pub struct CloudVisionClient {
    client: reqwest::Client,
    runtime: Runtime,
    config: OcrConfig,
    credential: Option<String>,
}

impl CloudVisionClient {
    /// Create a client. A missing credential is accepted here and reported
    /// on every `recognize` call, so the pipeline fails closed.
    pub fn new(config: OcrConfig, credential: Option<String>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;

        if credential.is_none() {
            warn!(
                "No OCR credential ({} unset); recognition will fail until one is supplied",
                config.credential_env
            );
        }
        info!("OCR client targeting {}", config.endpoint);

        Ok(Self {
            client,
            runtime,
            config,
            credential,
        })
    }

    async fn annotate(&self, credential: &str, body: &AnnotateRequest) -> Result<AnnotateResponse, OcrError> {
        let url = reqwest::Url::parse_with_params(&self.config.endpoint, &[("key", credential)])
            .map_err(|e| OcrError::Service(format!("invalid endpoint: {}", e)))?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(OcrError::Service(format!("credential rejected ({})", status)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OcrError::Service(format!(
                "request failed with status {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<AnnotateResponse>()
            .await
            .map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, e: reqwest::Error) -> OcrError {
        if e.is_timeout() {
            OcrError::Timeout(self.config.timeout())
        } else {
            OcrError::Service(e.to_string())
        }
    }
}

impl TextRecognizer for CloudVisionClient {
    fn recognize(&self, image: &RgbImage) -> Result<Vec<OcrWord>, OcrError> {
        let Some(credential) = self.credential.as_deref() else {
            return Err(OcrError::Service(format!(
                "missing credential: set {} or pass --ocr-token",
                self.config.credential_env
            )));
        };

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| OcrError::Service(format!("failed to encode image: {}", e)))?;

        let body = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: base64::engine::general_purpose::STANDARD.encode(&png),
                },
                features: vec![Feature {
                    kind: self.config.feature.clone(),
                }],
            }],
        };

        let start = Instant::now();
        let timeout = self.config.timeout();
        let response = self.runtime.block_on(async {
            match tokio::time::timeout(timeout, self.annotate(credential, &body)).await {
                Ok(result) => result,
                Err(_) => Err(OcrError::Timeout(timeout)),
            }
        })?;

        let words = parse_words(response)?;
        debug!("OCR returned {} word(s) in {:?}", words.len(), start.elapsed());
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_words_skips_full_text() {
        let json = r#"{
            "responses": [{
                "textAnnotations": [
                    {"description": "John Smith\n12345678", "boundingPoly": {"vertices": [
                        {"x": 10, "y": 10}, {"x": 200, "y": 10}, {"x": 200, "y": 100}, {"x": 10, "y": 100}]}},
                    {"description": "John", "boundingPoly": {"vertices": [
                        {"x": 10, "y": 12}, {"x": 60, "y": 12}, {"x": 60, "y": 28}, {"x": 10, "y": 28}]}},
                    {"description": "12345678", "boundingPoly": {"vertices": [
                        {"y": 82}, {"x": 90, "y": 82}, {"x": 90, "y": 98}, {"y": 98}]}}
                ]
            }]
        }"#;
        let response: AnnotateResponse = serde_json::from_str(json).unwrap();
        let words = parse_words(response).unwrap();

        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "John");
        assert_eq!(words[1].text, "12345678");
        // Omitted x means 0
        assert_eq!(words[1].bounds.tl(), Point::new(0, 82));
    }

    #[test]
    fn test_parse_words_service_error() {
        let json = r#"{"responses": [{"error": {"code": 7, "message": "API key not valid"}}]}"#;
        let response: AnnotateResponse = serde_json::from_str(json).unwrap();
        let err = parse_words(response).unwrap_err();
        assert!(matches!(err, OcrError::Service(msg) if msg.contains("API key")));
    }

    #[test]
    fn test_parse_words_empty() {
        let response: AnnotateResponse = serde_json::from_str(r#"{"responses": [{}]}"#).unwrap();
        assert!(parse_words(response).unwrap().is_empty());
        assert!(parse_words(AnnotateResponse::default()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_words_drops_degenerate_boxes() {
        let json = r#"{"responses": [{"textAnnotations": [
            {"description": "all"},
            {"description": "-", "boundingPoly": {"vertices": [{"x": 5, "y": 5}, {"x": 9, "y": 5}]}}
        ]}]}"#;
        let response: AnnotateResponse = serde_json::from_str(json).unwrap();
        assert!(parse_words(response).unwrap().is_empty());
    }

    #[test]
    fn test_missing_credential_fails_closed() {
        let client = CloudVisionClient::new(OcrConfig::default(), None).unwrap();
        let image = RgbImage::new(4, 4);
        let err = client.recognize(&image).unwrap_err();
        assert!(matches!(err, OcrError::Service(msg) if msg.contains("missing credential")));
    }

    /// Accept one request on a local port and answer it with `reply`, or
    /// hold the connection open without answering when `reply` is `None`
    fn serve_once(reply: Option<&'static str>) -> (OcrConfig, std::thread::JoinHandle<()>) {
        use std::io::{BufRead, BufReader, Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);

            // Drain the request so the client sees a clean response
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
            let mut body = vec![0; content_length];
            let _ = reader.read_exact(&mut body);

            let mut stream = reader.into_inner();
            match reply {
                Some(reply) => {
                    let _ = stream.write_all(reply.as_bytes());
                }
                None => std::thread::sleep(Duration::from_secs(3)),
            }
        });

        let config = OcrConfig {
            endpoint: format!("http://127.0.0.1:{}/v1/images:annotate", port),
            timeout_secs: 1,
            ..Default::default()
        };
        (config, handle)
    }

    #[test]
    fn test_unanswered_request_times_out() {
        let (config, server) = serve_once(None);
        let client = CloudVisionClient::new(config, Some("key".to_string())).unwrap();

        let start = Instant::now();
        let err = client.recognize(&RgbImage::new(4, 4)).unwrap_err();
        assert_eq!(err, OcrError::Timeout(Duration::from_secs(1)));
        assert!(start.elapsed() < Duration::from_secs(3));
        server.join().unwrap();
    }

    #[test]
    fn test_forbidden_is_rejected_credential() {
        let (config, server) =
            serve_once(Some("HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"));
        let client = CloudVisionClient::new(config, Some("bad".to_string())).unwrap();

        let err = client.recognize(&RgbImage::new(4, 4)).unwrap_err();
        assert!(matches!(err, OcrError::Service(msg) if msg.contains("credential rejected")));
        server.join().unwrap();
    }

    #[test]
    fn test_server_error_is_service_error() {
        let (config, server) = serve_once(Some(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\nboom",
        ));
        let client = CloudVisionClient::new(config, Some("key".to_string())).unwrap();

        let err = client.recognize(&RgbImage::new(4, 4)).unwrap_err();
        assert!(matches!(err, OcrError::Service(msg) if msg.contains("500") && msg.contains("boom")));
        server.join().unwrap();
    }

    #[test]
    fn test_successful_response_is_parsed() {
        let (config, server) = serve_once(Some(concat!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 142\r\nConnection: close\r\n\r\n",
            r#"{"responses":[{"textAnnotations":[{"description":"John"},{"description":"John","boundingPoly":{"vertices":[{"x":1,"y":2},{"x":9,"y":12}]}}]}]}"#,
        )));
        let client = CloudVisionClient::new(config, Some("key".to_string())).unwrap();

        let words = client.recognize(&RgbImage::new(4, 4)).unwrap();
        server.join().unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "John");
        assert_eq!(words[0].bounds.tl(), Point::new(1, 2));
    }

    #[test]
    fn test_explicit_credential_wins() {
        let config = OcrConfig {
            credential_env: "CARD_CAPTURE_TEST_UNSET_VAR".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolve_credential(Some("abc".to_string())).as_deref(), Some("abc"));
        assert_eq!(config.resolve_credential(Some("  ".to_string())), None);
        assert_eq!(config.resolve_credential(None), None);
    }
}
