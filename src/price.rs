use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PriceConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("instrument '{0}' is not a six-letter currency pair")]
    InvalidInstrument(String),
    #[error("price request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("price API returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("price API response has no numeric price field")]
    MissingPrice,
}

/// Source of current reference prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self, instrument: &str) -> Result<Decimal, FetchError>;
}

/// Gold API client. Every call is a fresh request: no caching, no retry.
pub struct PriceOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PriceOracle {
    pub fn new(config: &PriceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build price HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url_for(&self, instrument: &str) -> Result<String, FetchError> {
        let (base, quote) = split_pair(instrument)?;
        Ok(format!("{}/{}/{}", self.base_url, base, quote))
    }
}

#[async_trait]
impl PriceSource for PriceOracle {
    async fn fetch_price(&self, instrument: &str) -> Result<Decimal, FetchError> {
        let url = self.url_for(instrument)?;
        debug!("Requesting price: {}", url);

        let response = self
            .client
            .get(&url)
            .header("x-access-token", &self.api_key)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body: Value = response.json().await?;
        let price = parse_price(&body)?;
        info!("Current {} price: {}", instrument, price);
        Ok(price)
    }
}

/// `XAUUSD` -> (`XAU`, `USD`)
fn split_pair(instrument: &str) -> Result<(String, String), FetchError> {
    let pair = instrument.trim().to_uppercase();
    if pair.len() != 6 || !pair.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(FetchError::InvalidInstrument(instrument.to_string()));
    }
    Ok((pair[..3].to_string(), pair[3..].to_string()))
}

fn parse_price(body: &Value) -> Result<Decimal, FetchError> {
    match body.get("price") {
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(Decimal::from_f64)
            .ok_or(FetchError::MissingPrice),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| FetchError::MissingPrice),
        _ => Err(FetchError::MissingPrice),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::str::FromStr;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn oracle(base_url: String) -> PriceOracle {
        PriceOracle::new(&PriceConfig {
            api_key: "secret-token".to_string(),
            base_url,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_split_pair() {
        let (base, quote) = split_pair("xauusd").unwrap();
        assert_eq!((base.as_str(), quote.as_str()), ("XAU", "USD"));
        assert!(matches!(
            split_pair("XAU/USD"),
            Err(FetchError::InvalidInstrument(_))
        ));
        assert!(split_pair("GOLD").is_err());
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(
            parse_price(&json!({"price": 1950.25})).unwrap(),
            Decimal::from_str("1950.25").unwrap()
        );
        assert_eq!(
            parse_price(&json!({"price": "2011.5"})).unwrap(),
            Decimal::from_str("2011.5").unwrap()
        );
        assert!(matches!(
            parse_price(&json!({"ask": 1950.25})),
            Err(FetchError::MissingPrice)
        ));
        assert!(matches!(
            parse_price(&json!({"price": null})),
            Err(FetchError::MissingPrice)
        ));
    }

    #[tokio::test]
    async fn test_fetch_sends_token_and_parses_price() {
        let router = Router::new().route(
            "/XAU/USD",
            get(|headers: HeaderMap| async move {
                match headers.get("x-access-token").and_then(|v| v.to_str().ok()) {
                    Some("secret-token") => {
                        (StatusCode::OK, Json(json!({"metal": "XAU", "price": 1950.5})))
                    }
                    _ => (StatusCode::FORBIDDEN, Json(json!({"error": "no token"}))),
                }
            }),
        );
        let base = serve(router).await;

        let price = oracle(base).fetch_price("XAUUSD").await.unwrap();
        assert_eq!(price, Decimal::from_str("1950.5").unwrap());
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let router = Router::new().route(
            "/XAU/USD",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = serve(router).await;

        let err = oracle(base).fetch_price("XAUUSD").await.unwrap_err();
        assert!(matches!(err, FetchError::Status(s) if s.as_u16() == 429));
    }

    #[tokio::test]
    async fn test_fetch_missing_price_field() {
        let router = Router::new().route(
            "/XAU/USD",
            get(|| async { Json(json!({"metal": "XAU"})) }),
        );
        let base = serve(router).await;

        let err = oracle(base).fetch_price("XAUUSD").await.unwrap_err();
        assert!(matches!(err, FetchError::MissingPrice));
    }
}
