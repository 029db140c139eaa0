//! HTTP point-elevation providers.
//!
//! Both services speak the same protocol: `GET <url>?locations=lat,lon|lat,lon…`
//! answered by `{"results": [{"elevation": <number|null>}, …]}`. Batches are
//! split into chunks; any failing chunk fails the whole batch.

use std::time::Duration;

use serde::Deserialize;

use crate::coords::LatLon;
use crate::error::{Result, SlopeError};
use crate::resolver::{ElevationResolver, ProviderChain};

pub const OPENTOPODATA_URL: &str = "https://api.opentopodata.org/v1";
pub const OPEN_ELEVATION_URL: &str = "https://api.open-elevation.com/api/v1/lookup";

/// OpenTopoData datasets tried by [`default_chain`], best resolution first.
pub const DEFAULT_DATASETS: [&str; 3] = ["srtm30m", "aster30m", "etopo1"];

const USER_AGENT: &str = concat!("aclive/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: Option<f64>,
}

/// `lat,lon|lat,lon…` with six decimals.
pub fn locations_query(points: &[LatLon]) -> String {
    points
        .iter()
        .map(|p| format!("{:.6},{:.6}", p.lat, p.lon))
        .collect::<Vec<_>>()
        .join("|")
}

/// Parse one lookup response body, expecting exactly `expected` elevations.
pub fn parse_lookup_response(body: &str, expected: usize) -> Result<Vec<f64>> {
    let response: LookupResponse = serde_json::from_str(body)
        .map_err(|e| SlopeError::ElevationUnavailable(format!("malformed response: {e}")))?;
    if response.results.len() != expected {
        return Err(SlopeError::ElevationUnavailable(format!(
            "expected {expected} results, got {}",
            response.results.len()
        )));
    }
    response
        .results
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            r.elevation.filter(|z| z.is_finite()).ok_or_else(|| {
                SlopeError::ElevationUnavailable(format!("no elevation for point {i}"))
            })
        })
        .collect()
}

/// A blocking HTTP elevation service.
pub struct HttpElevationService {
    name: String,
    url: String,
    chunk_size: usize,
    client: reqwest::blocking::Client,
}

impl HttpElevationService {
    pub fn new(name: impl Into<String>, url: impl Into<String>, chunk_size: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SlopeError::ElevationUnavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            chunk_size: chunk_size.max(1),
            client,
        })
    }

    /// OpenTopoData `dataset`, 100 points per request, 15 s timeout.
    pub fn opentopodata(dataset: &str) -> Result<Self> {
        Self::new(
            format!("opentopodata/{dataset}"),
            format!("{OPENTOPODATA_URL}/{dataset}"),
            100,
            Duration::from_secs(15),
        )
    }

    /// Open-Elevation, 50 points per request, 10 s timeout.
    pub fn open_elevation() -> Result<Self> {
        Self::new("open-elevation", OPEN_ELEVATION_URL, 50, Duration::from_secs(10))
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self> {
        Self::new(self.name, self.url, self.chunk_size, timeout)
    }

    fn fetch_chunk(&self, chunk: &[LatLon]) -> Result<Vec<f64>> {
        let url = format!("{}?locations={}", self.url, locations_query(chunk));
        log::debug!("{}: requesting {} points", self.name, chunk.len());
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| SlopeError::ElevationUnavailable(format!("HTTP request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SlopeError::ElevationUnavailable(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }
        let body = response
            .text()
            .map_err(|e| SlopeError::ElevationUnavailable(format!("failed to read response body: {e}")))?;
        parse_lookup_response(&body, chunk.len())
    }
}

impl ElevationResolver for HttpElevationService {
    fn resolve(&self, points: &[LatLon]) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(points.len());
        for chunk in points.chunks(self.chunk_size) {
            out.extend(self.fetch_chunk(chunk)?);
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// OpenTopoData `datasets` in order, then Open-Elevation unless disabled.
/// `timeout` overrides the per-service defaults.
pub fn default_chain(
    datasets: &[String],
    open_elevation: bool,
    timeout: Option<Duration>,
) -> Result<ProviderChain> {
    let mut services = Vec::new();
    for dataset in datasets {
        services.push(HttpElevationService::opentopodata(dataset)?);
    }
    if open_elevation {
        services.push(HttpElevationService::open_elevation()?);
    }

    let mut chain = ProviderChain::new();
    for service in services {
        let service = match timeout {
            Some(t) => service.with_timeout(t)?,
            None => service,
        };
        chain.push(Box::new(service));
    }
    Ok(chain)
}
