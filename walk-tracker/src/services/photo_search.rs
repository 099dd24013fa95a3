//! Photo search: coordinate in, remote image URL out
//!
//! The production client talks to the Flickr REST API
//! (`flickr.photos.search`). Size fields are requested through `extras` and
//! the first one present on the first result wins, in configured order.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use walk_common::config::SearchConfig;
use walk_common::Coordinate;

use crate::error::StageError;

const USER_AGENT: &str = concat!("walk-tracker/", env!("CARGO_PKG_VERSION"));

/// Finds one photo taken near a coordinate
#[async_trait]
pub trait PhotoSearchClient: Send + Sync {
    /// Returns the URL of the best matching image
    async fn search(&self, coordinate: Coordinate) -> Result<String, StageError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    stat: Option<String>,
    code: Option<i64>,
    message: Option<String>,
    photos: Option<PhotoPage>,
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    #[serde(default)]
    photo: Vec<Map<String, Value>>,
}

/// Flickr photo search client
pub struct FlickrSearchClient {
    http_client: reqwest::Client,
    api_key: String,
    config: SearchConfig,
}

impl FlickrSearchClient {
    /// Build a client; a missing or blank key is a configuration error
    pub fn new(api_key: Option<String>, config: SearchConfig) -> Result<Self, StageError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StageError::Configuration("Flickr API key is not configured".to_string()))?;

        if config.size_preference.is_empty() {
            return Err(StageError::Configuration(
                "search.size_preference must name at least one size".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| StageError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key,
            config,
        })
    }

    fn query_params(&self, coordinate: Coordinate) -> Vec<(&'static str, String)> {
        vec![
            ("method", "flickr.photos.search".to_string()),
            ("api_key", self.api_key.clone()),
            ("lat", coordinate.latitude.to_string()),
            ("lon", coordinate.longitude.to_string()),
            ("radius", self.config.radius_km.to_string()),
            ("radius_units", "km".to_string()),
            ("per_page", "1".to_string()),
            ("page", "1".to_string()),
            ("content_type", "1".to_string()),
            ("sort", self.config.sort.clone()),
            ("extras", self.config.size_preference.join(",")),
            ("format", "json".to_string()),
            ("nojsoncallback", "1".to_string()),
        ]
    }
}

/// First non-empty URL field of `photo`, in preference order
fn pick_image_url(photo: &Map<String, Value>, size_preference: &[String]) -> Option<String> {
    size_preference
        .iter()
        .filter_map(|field| photo.get(field).and_then(Value::as_str))
        .find(|url| !url.is_empty())
        .map(str::to_string)
}

fn parse_search_body(body: &str, size_preference: &[String]) -> Result<String, StageError> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| StageError::Upstream(format!("Malformed search response: {}", e)))?;

    if response.stat.as_deref() == Some("fail") {
        return Err(StageError::Upstream(format!(
            "Search service error {}: {}",
            response.code.unwrap_or_default(),
            response.message.unwrap_or_default()
        )));
    }

    let photos = response
        .photos
        .ok_or_else(|| StageError::Upstream("Search response has no photos element".to_string()))?;

    let first = photos
        .photo
        .first()
        .ok_or_else(|| StageError::Upstream("No photos near this location".to_string()))?;

    pick_image_url(first, size_preference).ok_or_else(|| {
        StageError::Upstream(format!(
            "First result has none of the requested sizes ({})",
            size_preference.join(", ")
        ))
    })
}

#[async_trait]
impl PhotoSearchClient for FlickrSearchClient {
    async fn search(&self, coordinate: Coordinate) -> Result<String, StageError> {
        tracing::debug!(
            latitude = coordinate.latitude,
            longitude = coordinate.longitude,
            "Querying photo search"
        );

        let response = self
            .http_client
            .get(&self.config.endpoint)
            .query(&self.query_params(coordinate))
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(StageError::Upstream(format!("Search returned HTTP {}", status.as_u16())));
        }

        let body = response.text().await?;
        let url = parse_search_body(&body, &self.config.size_preference)?;

        tracing::info!(
            latitude = coordinate.latitude,
            longitude = coordinate.longitude,
            url = %url,
            "Photo found"
        );
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> Vec<String> {
        SearchConfig::default().size_preference
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = FlickrSearchClient::new(None, SearchConfig::default()).err().unwrap();
        assert!(matches!(err, StageError::Configuration(_)));

        let err = FlickrSearchClient::new(Some("   ".into()), SearchConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, StageError::Configuration(_)));
    }

    #[test]
    fn test_query_params_carry_configuration() {
        let client = FlickrSearchClient::new(Some("key123".into()), SearchConfig::default()).unwrap();
        let params = client.query_params(Coordinate::new(52.5, 13.4));
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(get("api_key"), "key123");
        assert_eq!(get("lat"), "52.5");
        assert_eq!(get("lon"), "13.4");
        assert_eq!(get("radius"), "0.05");
        assert_eq!(get("per_page"), "1");
        assert_eq!(get("sort"), "interestingness-desc");
        assert_eq!(get("extras"), "url_o,url_l,url_c,url_z,url_m");
        assert_eq!(get("nojsoncallback"), "1");
    }

    #[test]
    fn test_preferred_size_wins() {
        let body = r#"{"stat":"ok","photos":{"photo":[
            {"id":"1","url_l":"https://live.example.com/large.jpg","url_o":"https://live.example.com/orig.jpg"}
        ]}}"#;
        assert_eq!(
            parse_search_body(body, &sizes()).unwrap(),
            "https://live.example.com/orig.jpg"
        );
    }

    #[test]
    fn test_falls_back_to_smaller_size() {
        let body = r#"{"stat":"ok","photos":{"photo":[{"id":"1","url_o":"","url_m":"https://live.example.com/m.jpg"}]}}"#;
        assert_eq!(parse_search_body(body, &sizes()).unwrap(), "https://live.example.com/m.jpg");
    }

    #[test]
    fn test_empty_result_is_permanent() {
        let body = r#"{"stat":"ok","photos":{"photo":[]}}"#;
        let err = parse_search_body(body, &sizes()).unwrap_err();
        assert!(matches!(err, StageError::Upstream(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_service_failure_is_permanent() {
        let body = r#"{"stat":"fail","code":100,"message":"Invalid API Key"}"#;
        let err = parse_search_body(body, &sizes()).unwrap_err();
        assert_eq!(err, StageError::Upstream("Search service error 100: Invalid API Key".to_string()));
    }

    #[test]
    fn test_malformed_body_is_permanent() {
        let err = parse_search_body("<html>", &sizes()).unwrap_err();
        assert!(matches!(err, StageError::Upstream(_)));
    }
}
