use crate::errors::{MonitorError, Result};
use crate::market_data::provider::{normalize_bars, PriceProvider};
use crate::market_data::symbols::{provider_symbol, SymbolStyle};
use crate::models::{PriceBar, Security};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Bars either wrapped in an object or returned as a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    Wrapped { bars: Vec<PriceBar> },
    Bare(Vec<PriceBar>),
}

impl HistoryResponse {
    fn into_bars(self) -> Vec<PriceBar> {
        match self {
            HistoryResponse::Wrapped { bars } | HistoryResponse::Bare(bars) => bars,
        }
    }
}

/// Fetches daily history from a JSON endpoint described by a URL template
pub struct HttpPriceProvider {
    http_client: Client,
    url_template: String,
    symbol_style: SymbolStyle,
    api_token: Option<String>,
}

impl HttpPriceProvider {
    pub fn new(
        url_template: String,
        symbol_style: SymbolStyle,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            url_template,
            symbol_style,
            api_token,
        })
    }

    fn history_url(&self, security: &Security, start: NaiveDate, end: NaiveDate) -> String {
        self.url_template
            .replace("{symbol}", &provider_symbol(security, self.symbol_style))
            .replace("{code}", &security.code)
            .replace("{start}", &start.format("%Y%m%d").to_string())
            .replace("{end}", &end.format("%Y%m%d").to_string())
    }
}

/// Decode a history payload into bars
pub fn parse_history(body: &str) -> Result<Vec<PriceBar>> {
    let response: HistoryResponse = serde_json::from_str(body)?;
    Ok(response.into_bars())
}

#[async_trait]
impl PriceProvider for HttpPriceProvider {
    fn id(&self) -> &'static str {
        "http"
    }

    async fn fetch_history(
        &self,
        security: &Security,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let url = self.history_url(security, start, end);
        debug!("Fetching history for {} from {}", security.code, url);

        let mut request = self.http_client.get(&url);
        if let Some(ref token) = self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MonitorError::RateLimited(self.id().to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MonitorError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let bars = normalize_bars(parse_history(&body)?, start, end);
        if bars.is_empty() {
            return Err(MonitorError::NoData(security.code.clone()));
        }

        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer a single request with a canned status and body; returns the base URL
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request: Vec<u8> = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{}", addr)
    }

    async fn fetch_from(status: &'static str, body: &'static str) -> Result<Vec<PriceBar>> {
        let base = serve_once(status, body).await;
        let provider = HttpPriceProvider::new(
            format!("{}/daily/{{symbol}}?start={{start}}&end={{end}}", base),
            SymbolStyle::Prefix,
            Some("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();

        provider
            .fetch_history(
                &Security::new("601288", "Agricultural Bank"),
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            )
            .await
    }

    #[test]
    fn test_history_url_template() {
        let provider = HttpPriceProvider::new(
            "https://prices.example/daily/{symbol}?from={start}&to={end}".to_string(),
            SymbolStyle::Suffix,
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let security = Security::new("600028", "Sinopec");
        let url = provider.history_url(
            &security,
            NaiveDate::from_ymd_opt(2023, 5, 18).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
        );

        assert_eq!(
            url,
            "https://prices.example/daily/600028.SS?from=20230518&to=20240621"
        );
    }

    #[test]
    fn test_parse_wrapped_and_bare_payloads() {
        let wrapped = r#"{"bars": [
            {"date": "2024-06-20", "open": 4.1, "high": 4.2, "low": 4.0, "close": 4.15, "volume": 120000},
            {"date": "2024-06-21", "open": "4.15", "high": "4.3", "low": "4.1", "close": "4.28"}
        ]}"#;
        let bars = parse_history(wrapped).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, dec!(4.28));
        assert_eq!(bars[1].volume, dec!(0));

        let bare = r#"[{"date": "2024-06-21", "open": 1, "high": 1, "low": 1, "close": 1, "volume": 5}]"#;
        assert_eq!(parse_history(bare).unwrap().len(), 1);

        assert!(parse_history(r#"{"error": "unknown symbol"}"#).is_err());
    }

    #[tokio::test]
    async fn test_fetch_history_success_filters_range() {
        let bars = fetch_from(
            "200 OK",
            r#"{"bars": [
                {"date": "2024-05-31", "open": 4, "high": 4, "low": 4, "close": 4, "volume": 1},
                {"date": "2024-06-21", "open": 4.2, "high": 4.3, "low": 4.1, "close": 4.28, "volume": 9}
            ]}"#,
        )
        .await
        .unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, dec!(4.28));
    }

    #[tokio::test]
    async fn test_fetch_history_rate_limited() {
        let err = fetch_from("429 Too Many Requests", "{}").await.unwrap_err();
        assert!(matches!(err, MonitorError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_history_server_error_is_retryable() {
        let err = fetch_from("503 Service Unavailable", "maintenance").await.unwrap_err();
        assert!(matches!(err, MonitorError::ApiError { status: 503, ref message } if message == "maintenance"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_history_client_error_is_permanent() {
        let err = fetch_from("404 Not Found", "unknown symbol").await.unwrap_err();
        assert!(matches!(err, MonitorError::ApiError { status: 404, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_history_out_of_range_is_no_data() {
        let err = fetch_from(
            "200 OK",
            r#"[{"date": "2023-01-03", "open": 1, "high": 1, "low": 1, "close": 1, "volume": 1}]"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MonitorError::NoData(code) if code == "601288"));
    }
}
