//! Slope summary of a parcel from a remote point-elevation service.
//!
//! Samples a sparse grid over the parcel, asks OpenTopoData (then
//! Open-Elevation) for the elevations and runs the slope pipeline on it.
//! A local DEM given with `--dem` is asked first.
//! When no grid elevation can be obtained, the parcel's vertex altitudes
//! give a coarser estimate instead.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use aclive_core::cli::{init_logging, parse_percentile, LogLevel};
use aclive_core::coords::GeoVertex;
use aclive_core::dem::DemRaster;
use aclive_core::kml::read_parcel;
use aclive_core::polygon::PlanarPolygon;
use aclive_core::projection::{LocalProjection, PlaneFrame};
use aclive_core::remote::{default_chain, DEFAULT_DATASETS};
use aclive_core::resolver::{enrich_vertex_altitudes, ProviderChain};
use aclive_core::sampling::PointSampledGrid;
use aclive_core::vertex::{vertex_slope, VertexSlope};
use aclive_core::{run, LogSink, SlopeError, SlopeParams, SlopeReport};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "talhao",
    about = "Slope summary of a field parcel using remote elevation services"
)]
struct Args {
    /// Parcel boundary (.kmz or .kml)
    #[arg(long = "kmz", alias = "kml")]
    parcel: PathBuf,

    /// Smoothing window in metres
    #[arg(long = "janela-suavizacao-m", default_value = "50")]
    smoothing_window_m: f64,

    /// Maximum machinery heading relative to the contour, degrees
    #[arg(long = "alpha-graus", default_value = "30")]
    alpha_deg: f64,

    /// Winsorization tail percent (0 disables)
    #[arg(long = "winsorizar-pct", default_value = "0")]
    winsorize_pct: f64,

    /// Percentile of the smoothed slope
    #[arg(long = "percentil", default_value = "80", value_parser = parse_percentile)]
    percentile: u8,

    /// Local DEM (GeoTIFF) queried before the remote services
    #[arg(long)]
    dem: Option<PathBuf>,

    /// OpenTopoData dataset, in priority order; repeat for several
    /// (default: srtm30m, aster30m, etopo1)
    #[arg(long = "dataset")]
    datasets: Vec<String>,

    /// Do not fall back to Open-Elevation
    #[arg(long = "sem-open-elevation")]
    no_open_elevation: bool,

    /// HTTP timeout per request, seconds (default: 15 OpenTopoData, 10 Open-Elevation)
    #[arg(long = "timeout-s")]
    timeout_s: Option<f64>,

    #[arg(long, value_enum, ignore_case = true, default_value = "INFO")]
    log_level: LogLevel,
}

impl Args {
    fn params(&self) -> SlopeParams {
        SlopeParams {
            percentile: self.percentile,
            smoothing_window_m: self.smoothing_window_m,
            alpha_deg: self.alpha_deg,
            // The sparse grid has no inward buffer.
            edge_buffer_m: 0.0,
            winsorize_pct: self.winsorize_pct,
        }
    }

    fn datasets(&self) -> Vec<String> {
        if self.datasets.is_empty() {
            DEFAULT_DATASETS.iter().map(|d| d.to_string()).collect()
        } else {
            self.datasets.clone()
        }
    }

    fn timeout(&self) -> Result<Option<Duration>> {
        self.timeout_s
            .map(|s| {
                Duration::try_from_secs_f64(s)
                    .ok()
                    .filter(|d| !d.is_zero())
                    .ok_or_else(|| anyhow!("timeout must be a positive number of seconds, got {s}"))
            })
            .transpose()
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Source {
    /// Percentile pipeline over the sampled grid.
    Grade,
    /// Plane fit over the vertex altitudes.
    Vertices,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Summary {
    nome: String,
    area_ha: f64,
    aclive_medio_deg: f64,
    aclive_operacional_deg: f64,
    aclive_severo_deg: f64,
    percentil_usado: Option<u8>,
    correcao_aplicada: bool,
    fonte: Source,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl Summary {
    fn from_grade(name: &str, area_ha: f64, report: &SlopeReport) -> Self {
        Self {
            nome: name.to_string(),
            area_ha: round2(area_ha),
            aclive_medio_deg: round2(report.median_angle_deg),
            aclive_operacional_deg: round2(report.operational_angle_deg),
            aclive_severo_deg: round2(report.severe_angle_deg),
            percentil_usado: Some(report.percentile_used),
            correcao_aplicada: report.correction_applied,
            fonte: Source::Grade,
        }
    }

    /// The plane angle stands in for both the median and the operational
    /// figure; the steepest vertex pair is the severe one.
    fn from_vertices(name: &str, area_ha: f64, slope: &VertexSlope) -> Self {
        Self {
            nome: name.to_string(),
            area_ha: round2(area_ha),
            aclive_medio_deg: round2(slope.mean_deg),
            aclive_operacional_deg: round2(slope.mean_deg),
            aclive_severo_deg: round2(slope.max_deg),
            percentil_usado: None,
            correcao_aplicada: false,
            fonte: Source::Vertices,
        }
    }
}

fn parcel_area_ha(vertices: &[GeoVertex]) -> Result<f64> {
    let frame = PlaneFrame::Local(LocalProjection::centred_on(vertices)?);
    Ok(PlanarPolygon::new(frame.project(vertices))?.area_ha())
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Local DEM first when given, then the remote services.
fn elevation_chain(args: &Args) -> Result<ProviderChain> {
    let mut chain = ProviderChain::new();
    if let Some(path) = &args.dem {
        let dem = DemRaster::from_geotiff(path)
            .with_context(|| format!("Cannot read DEM {}", path.display()))?;
        log::info!("local DEM {} ahead of the remote services", path.display());
        chain.push(Box::new(dem));
    }
    let remote = default_chain(&args.datasets(), !args.no_open_elevation, args.timeout()?)
        .context("Failed to set up elevation providers")?;
    chain.append(remote);
    Ok(chain)
}

fn execute(args: &Args) -> Result<Summary> {
    let params = args.params();
    params.validate()?;

    let parcel = read_parcel(&args.parcel)
        .with_context(|| format!("Cannot read parcel {}", args.parcel.display()))?;
    let area_ha = parcel_area_ha(&parcel.vertices)
        .with_context(|| format!("Invalid boundary for '{}'", parcel.name))?;
    log::info!(
        "parcel '{}': {} vertices, {:.2} ha",
        parcel.name,
        parcel.vertices.len(),
        area_ha
    );

    let chain = elevation_chain(args)?;
    let mut sink = LogSink;
    let vertices = enrich_vertex_altitudes(&parcel.vertices, &chain, &mut sink);

    let strategy = PointSampledGrid::new(chain);
    match run(&vertices, &strategy, &params, &mut sink) {
        Ok(run) => Ok(Summary::from_grade(&parcel.name, area_ha, &run.report)),
        Err(e @ (SlopeError::ElevationUnavailable(_) | SlopeError::NoValidPixels(_))) => {
            log::warn!("grid sampling unavailable ({e}), using vertex altitudes");
            let slope = vertex_slope(&vertices)?.ok_or_else(|| {
                anyhow!(
                    "no elevation for '{}': grid sampling failed and the vertices carry no relief",
                    parcel.name
                )
            })?;
            Ok(Summary::from_vertices(&parcel.name, area_ha, &slope))
        }
        Err(e) => Err(e).with_context(|| format!("Slope estimation failed for '{}'", parcel.name)),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    let summary = execute(&args).and_then(|s| Ok(serde_json::to_string_pretty(&s)?));
    match summary {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("parcel slope failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
