use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::SourceError,
    model::{PageRequest, Record},
};

use super::{PageSource, Units};

pub const CDO_DATA_URL: &str = "https://www.ncei.noaa.gov/cdo-web/api/v2/data";

/// Largest `limit` the CDO service accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// First offset of a CDO result set; the service counts from one.
pub const FIRST_OFFSET: u32 = 1;

pub const DEFAULT_DATASET: &str = "GSOD";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to talk to the CDO `data` endpoint.
#[derive(Clone)]
pub struct SourceSettings {
    pub token: String,
    pub endpoint: String,
    pub dataset: String,
    pub units: Units,
    pub timeout: Duration,
    pub use_system_proxy: bool,
}

impl SourceSettings {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoint: CDO_DATA_URL.to_string(),
            dataset: DEFAULT_DATASET.to_string(),
            units: Units::default(),
            timeout: DEFAULT_TIMEOUT,
            use_system_proxy: false,
        }
    }
}

impl fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSettings")
            .field("token", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("dataset", &self.dataset)
            .field("units", &self.units)
            .field("timeout", &self.timeout)
            .field("use_system_proxy", &self.use_system_proxy)
            .finish()
    }
}

/// [`PageSource`] backed by the NOAA Climate Data Online v2 API.
#[derive(Debug, Clone)]
pub struct CdoSource {
    settings: SourceSettings,
    http: Client,
}

impl CdoSource {
    pub fn new(settings: SourceSettings) -> Result<Self, SourceError> {
        let mut builder = Client::builder().timeout(settings.timeout);
        if !settings.use_system_proxy {
            builder = builder.no_proxy();
        }
        let http = builder.build().map_err(SourceError::Transport)?;

        Ok(Self { settings, http })
    }

    fn query_params(&self, request: &PageRequest) -> Vec<(&'static str, String)> {
        vec![
            ("datasetid", self.settings.dataset.clone()),
            ("stationid", request.station_id.clone()),
            ("startdate", request.chunk.start().format("%Y-%m-%d").to_string()),
            ("enddate", request.chunk.end().format("%Y-%m-%d").to_string()),
            ("limit", request.limit.to_string()),
            ("offset", request.offset.to_string()),
            ("units", self.settings.units.as_str().to_string()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct CdoResponse {
    // The service answers `{}` rather than an empty array once a query has no more rows.
    #[serde(default)]
    results: Vec<Record>,
}

fn parse_page(body: &str) -> Result<Vec<Record>, SourceError> {
    let parsed: CdoResponse = serde_json::from_str(body).map_err(SourceError::Decode)?;
    Ok(parsed.results)
}

#[async_trait]
impl PageSource for CdoSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Record>, SourceError> {
        let res = self
            .http
            .get(&self.settings.endpoint)
            .header("token", &self.settings.token)
            .query(&self.query_params(request))
            .send()
            .await
            .map_err(SourceError::Transport)?;

        let status = res.status();
        let body = res.text().await.map_err(SourceError::Transport)?;

        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        parse_page(&body)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DateRange;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    /// Answers a single HTTP request with `status_line` and `body`, returning the raw
    /// request head once the exchange is done.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;

            String::from_utf8_lossy(&head).into_owned()
        });

        (format!("http://{addr}/cdo-web/api/v2/data"), handle)
    }

    fn local_source(endpoint: String) -> CdoSource {
        let mut settings = SourceSettings::new("SECRET-TOKEN");
        settings.endpoint = endpoint;
        CdoSource::new(settings).unwrap()
    }

    fn request() -> PageRequest {
        PageRequest {
            chunk: DateRange::year(2024).unwrap(),
            station_id: "GHCND:USW00094728".to_string(),
            offset: FIRST_OFFSET,
            limit: MAX_PAGE_SIZE,
        }
    }

    #[test]
    fn query_params_carry_the_page_window() {
        let source = CdoSource::new(SourceSettings::new("TOKEN")).unwrap();
        let mut req = request();
        req.advance();

        let params = source.query_params(&req);
        let get = |key: &str| {
            params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str()).unwrap()
        };

        assert_eq!(get("datasetid"), "GSOD");
        assert_eq!(get("stationid"), "GHCND:USW00094728");
        assert_eq!(get("startdate"), "2024-01-01");
        assert_eq!(get("enddate"), "2024-12-31");
        assert_eq!(get("limit"), "1000");
        assert_eq!(get("offset"), "1001");
        assert_eq!(get("units"), "metric");
    }

    #[test]
    fn token_is_not_in_query_or_debug_output() {
        let source = CdoSource::new(SourceSettings::new("SECRET-TOKEN")).unwrap();
        assert!(source.query_params(&request()).iter().all(|(_, v)| v != "SECRET-TOKEN"));
        assert!(!format!("{source:?}").contains("SECRET-TOKEN"));
    }

    #[test]
    fn parse_page_keeps_field_order() {
        let body = r#"{
            "metadata": {"resultset": {"offset": 1, "count": 2, "limit": 1000}},
            "results": [
                {"date": "2024-01-01T00:00:00", "datatype": "TMAX", "station": "GHCND:USW00094728", "attributes": ",,W,2400", "value": 7.2},
                {"date": "2024-01-02T00:00:00", "datatype": "TMAX", "station": "GHCND:USW00094728", "attributes": ",,W,2400", "value": 5.0}
            ]
        }"#;

        let page = parse_page(body).unwrap();
        assert_eq!(page.len(), 2);
        let keys: Vec<&str> = page[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["date", "datatype", "station", "attributes", "value"]);
    }

    #[test]
    fn empty_object_is_an_empty_page() {
        assert!(parse_page("{}").unwrap().is_empty());
        assert!(parse_page(r#"{"results": []}"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = parse_page("<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }

    #[tokio::test]
    async fn sends_token_header_and_page_query() {
        let (endpoint, server) = serve_once("200 OK", r#"{"results": [{"date": "2024-01-01", "value": 3}]}"#).await;

        let page = local_source(endpoint).fetch_page(&request()).await.unwrap();
        let head = server.await.unwrap().to_lowercase();

        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["value"], 3);
        assert!(head.starts_with("get /cdo-web/api/v2/data?"), "{head}");
        assert!(head.contains("\r\ntoken: secret-token\r\n"), "{head}");
        assert!(head.contains("stationid=ghcnd%3ausw00094728"), "{head}");
        assert!(head.contains("offset=1&") || head.contains("offset=1 "), "{head}");
        assert!(!head.contains("token=secret-token"), "{head}");
    }

    #[tokio::test]
    async fn empty_object_response_is_an_empty_page() {
        let (endpoint, server) = serve_once("200 OK", "{}").await;

        let page = local_source(endpoint).fetch_page(&request()).await.unwrap();
        server.await.unwrap();

        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn error_status_carries_code_and_body() {
        let (endpoint, server) = serve_once("503 Service Unavailable", "try again later").await;

        let err = local_source(endpoint).fetch_page(&request()).await.unwrap_err();
        server.await.unwrap();

        match err {
            SourceError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "try again later");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_request_status_is_reported_as_is() {
        let (endpoint, server) = serve_once("400 Bad Request", r#"{"status":"400","message":"Token parameter is required."}"#).await;

        let err = local_source(endpoint).fetch_page(&request()).await.unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, SourceError::Status { status: 400, .. }));
    }
}
