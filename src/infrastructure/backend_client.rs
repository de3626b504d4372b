// Backend REST client
use crate::application::backend_api::{BackendApi, BackendError, BackendResult, CameraFrame, NcPathData};
use crate::domain::telemetry::{SaveReceipt, SaveStatus, StoredRecord, SystemStatus, TelemetrySample};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct StartSaveRequest<'a> {
    folder_name: &'a str,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        tracing::debug!(%method, path, "backend request");
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> BackendResult<Response> {
        let response = request.send().await.map_err(|e| self.transport_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND {
                tracing::debug!(endpoint, "backend resource not found");
            } else {
                tracing::warn!(endpoint, status = status.as_u16(), "backend request rejected");
            }
            return Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> BackendResult<T> {
        let response = self.send(endpoint, request).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(endpoint, e)
            } else {
                BackendError::Decode {
                    endpoint: endpoint.to_string(),
                    source: e,
                }
            }
        })
    }

    fn transport_error(&self, endpoint: &str, error: reqwest::Error) -> BackendError {
        if error.is_timeout() {
            BackendError::Timeout {
                endpoint: endpoint.to_string(),
                timeout: self.timeout,
            }
        } else {
            BackendError::Transport {
                endpoint: endpoint.to_string(),
                source: error,
            }
        }
    }
}

#[async_trait]
impl BackendApi for BackendClient {
    async fn is_reachable(&self) -> bool {
        match self.send("/", self.request(Method::GET, "/")).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "backend reachability check failed");
                false
            }
        }
    }

    async fn system_status(&self) -> BackendResult<SystemStatus> {
        let endpoint = "/api/status";
        self.json(endpoint, self.request(Method::GET, endpoint)).await
    }

    async fn latest_sample(&self) -> BackendResult<Option<TelemetrySample>> {
        let endpoint = "/api/data/latest";
        let record: Option<StoredRecord> = self.json(endpoint, self.request(Method::GET, endpoint)).await?;
        Ok(record.map(TelemetrySample::from))
    }

    async fn sample_history(&self, limit: usize) -> BackendResult<Vec<TelemetrySample>> {
        let endpoint = "/api/data/history";
        let request = self
            .request(Method::GET, endpoint)
            .query(&[("limit", limit)]);
        let records: Vec<StoredRecord> = self.json(endpoint, request).await?;
        Ok(records.into_iter().map(TelemetrySample::from).collect())
    }

    async fn start_save(&self, folder_name: &str) -> BackendResult<SaveReceipt> {
        let endpoint = "/api/save/start";
        let request = self
            .request(Method::POST, endpoint)
            .json(&StartSaveRequest { folder_name });
        self.json(endpoint, request).await
    }

    async fn stop_save(&self) -> BackendResult<SaveReceipt> {
        let endpoint = "/api/save/stop";
        self.json(endpoint, self.request(Method::POST, endpoint)).await
    }

    async fn save_status(&self) -> BackendResult<SaveStatus> {
        let endpoint = "/api/save/status";
        self.json(endpoint, self.request(Method::GET, endpoint)).await
    }

    async fn camera_image(&self, camera_id: &str) -> BackendResult<CameraFrame> {
        let endpoint = format!("/api/images/{}", urlencoding::encode(camera_id));
        let response = self
            .send(&endpoint, self.request(Method::GET, &endpoint))
            .await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&endpoint, e))?;
        Ok(CameraFrame { content_type, bytes })
    }

    async fn tool_path(&self) -> BackendResult<Option<NcPathData>> {
        let endpoint = "/api/nc/path";
        match self.json(endpoint, self.request(Method::GET, endpoint)).await {
            Ok(path) => Ok(Some(path)),
            Err(BackendError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one canned HTTP response and hand back the raw request
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        one_shot_server_typed(status_line, "application/json", body).await
    }

    async fn one_shot_server_typed(
        status_line: &'static str,
        content_type: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                raw.extend_from_slice(&chunk[..n]);
                if n == 0 || request_complete(&raw) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                content_type,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    #[tokio::test]
    async fn test_start_save_posts_folder_name() {
        let (url, server) = one_shot_server(
            "200 OK",
            r#"{"message":"saving","save_path":"data/run_7","timestamp":"2025-03-01T10:00:00"}"#,
        )
        .await;
        let client = BackendClient::new(url, Duration::from_secs(5)).unwrap();

        let receipt = client.start_save("run_7").await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(receipt.save_path, "data/run_7");
        assert!(request.starts_with("POST /api/save/start"));
        assert!(request.contains(r#"{"folder_name":"run_7"}"#));
    }

    #[tokio::test]
    async fn test_history_sends_limit_query() {
        let (url, server) = one_shot_server(
            "200 OK",
            r#"[{"timestamp":"a","curpos_x":1.0,"curpos_y":2.0},{"timestamp":"b","outpower":600.0}]"#,
        )
        .await;
        let client = BackendClient::new(url, Duration::from_secs(5)).unwrap();

        let samples = client.sample_history(2).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].planar_position(), Some((1.0, 2.0)));
        assert_eq!(samples[1].laser_data.as_ref().unwrap().outpower, Some(600.0));
        assert!(request.starts_with("GET /api/data/history?limit=2 "));
    }

    #[tokio::test]
    async fn test_latest_without_data_is_none() {
        let (url, _server) = one_shot_server("200 OK", "null").await;
        let client = BackendClient::new(url, Duration::from_secs(5)).unwrap();

        assert!(client.latest_sample().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_camera_image_keeps_content_type() {
        let (url, server) = one_shot_server_typed("200 OK", "image/png", "PNGDATA").await;
        let client = BackendClient::new(url, Duration::from_secs(5)).unwrap();

        let frame = client.camera_image("basler main").await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(frame.content_type.as_deref(), Some("image/png"));
        assert_eq!(&frame.bytes[..], b"PNGDATA");
        assert!(request.starts_with("GET /api/images/basler%20main "));
    }

    #[tokio::test]
    async fn test_missing_tool_path_is_none() {
        let (url, _server) = one_shot_server("404 Not Found", r#"{"detail":"no path"}"#).await;
        let client = BackendClient::new(url, Duration::from_secs(5)).unwrap();

        assert!(client.tool_path().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced_with_body() {
        let (url, _server) = one_shot_server("500 Internal Server Error", r#"{"detail":"disk full"}"#).await;
        let client = BackendClient::new(url, Duration::from_secs(5)).unwrap();

        let err = client.stop_save().await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, .. }));
        assert!(err.to_string().contains("disk full"));
    }

    #[tokio::test]
    async fn test_unresponsive_backend_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let client = BackendClient::new(format!("http://{}", addr), Duration::from_millis(100)).unwrap();

        let err = client.system_status().await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }));
    }
}
