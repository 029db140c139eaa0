//! Elevation lookup for batches of geographic points.
//!
//! Providers are tried in order by [`ProviderChain`]; the first one that
//! answers the whole batch wins. Any type implementing
//! [`ElevationResolver`] can join the chain, including plain closures.

use log::Level;

use crate::coords::{altitude_range, altitudes_uniform, GeoVertex, LatLon};
use crate::diagnostics::DiagnosticSink;
use crate::error::{Result, SlopeError};

/// Resolves ground elevation (metres) for a batch of points.
///
/// On success the returned vector has one entry per input point, in order.
pub trait ElevationResolver {
    fn resolve(&self, points: &[LatLon]) -> Result<Vec<f64>>;

    /// Short provider label for diagnostics.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> ElevationResolver for F
where
    F: Fn(&[LatLon]) -> Result<Vec<f64>>,
{
    fn resolve(&self, points: &[LatLon]) -> Result<Vec<f64>> {
        self(points)
    }
}

/// Ordered list of providers. Failure of one is logged and the next tried.
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Box<dyn ElevationResolver + Send + Sync>>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl ElevationResolver + Send + Sync + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn push(&mut self, provider: Box<dyn ElevationResolver + Send + Sync>) {
        self.providers.push(provider);
    }

    /// Move every provider of `other` to the end of this chain.
    pub fn append(&mut self, other: ProviderChain) {
        self.providers.extend(other.providers);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ElevationResolver for ProviderChain {
    fn resolve(&self, points: &[LatLon]) -> Result<Vec<f64>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.resolve(points) {
                Ok(values) if values.len() == points.len() => {
                    log::debug!("{}: {} elevations resolved", provider.name(), values.len());
                    return Ok(values);
                }
                Ok(values) => {
                    log::warn!(
                        "{}: expected {} elevations, got {}",
                        provider.name(),
                        points.len(),
                        values.len()
                    );
                    failures.push(format!("{}: short answer", provider.name()));
                }
                Err(e) => {
                    log::warn!("{}: {e}", provider.name());
                    failures.push(format!("{}: {e}", provider.name()));
                }
            }
        }
        Err(SlopeError::ElevationUnavailable(if failures.is_empty() {
            "no elevation provider configured".into()
        } else {
            failures.join("; ")
        }))
    }

    fn name(&self) -> &str {
        "provider chain"
    }
}

// ── Vertex enrichment ────────────────────────────────────────────────────────

/// Fill in vertex altitudes from `resolver` when they are missing or
/// uniform to the centimetre, so the vertex fallback has relief to work on.
///
/// Resolver failure is not fatal: the input vertices are returned as-is.
pub fn enrich_vertex_altitudes(
    vertices: &[GeoVertex],
    resolver: &dyn ElevationResolver,
    sink: &mut dyn DiagnosticSink,
) -> Vec<GeoVertex> {
    let missing = vertices.iter().any(|v| v.alt.is_none());
    if !missing && !altitudes_uniform(vertices) {
        return vertices.to_vec();
    }

    let points: Vec<LatLon> = vertices.iter().map(GeoVertex::latlon).collect();
    match resolver.resolve(&points) {
        Ok(values) if values.len() == vertices.len() => {
            let enriched: Vec<GeoVertex> = vertices
                .iter()
                .zip(values)
                .map(|(v, z)| GeoVertex::with_alt(v.lon, v.lat, z))
                .collect();
            sink.record(
                Level::Info,
                &format!(
                    "vertex altitudes resolved from {} (range {:.2} m)",
                    resolver.name(),
                    altitude_range(&enriched)
                ),
            );
            enriched
        }
        Ok(_) => {
            sink.record(Level::Warn, "vertex altitude lookup returned a short answer");
            vertices.to_vec()
        }
        Err(e) => {
            sink.record(Level::Warn, &format!("vertex altitude lookup failed: {e}"));
            vertices.to_vec()
        }
    }
}
