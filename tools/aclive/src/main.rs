//! Operational slope of one or more parcels over a local GeoTIFF DEM.
//!
//! Prints one JSON object per parcel (an array when several `--kmz` are
//! given). Any failure logs a single error line and exits with status 1.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aclive_core::cli::{init_logging, parse_percentile, LogLevel};
use aclive_core::dem::{write_geotiff, DemRaster, RasterGrid};
use aclive_core::kml::read_parcel;
use aclive_core::{run, LogSink, SlopeParams, SlopeRun};
use anyhow::{bail, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "aclive",
    about = "Operational slope of field parcels from a local DEM (GeoTIFF)"
)]
struct Args {
    /// Parcel boundary (.kmz or .kml); repeat for several parcels
    #[arg(long = "kmz", alias = "kml", required = true)]
    parcels: Vec<PathBuf>,

    /// DEM raster (single-band GeoTIFF, UTM or geographic)
    #[arg(long)]
    dem: PathBuf,

    /// Percentile of the smoothed slope
    #[arg(long = "percentil", default_value = "80", value_parser = parse_percentile)]
    percentile: u8,

    /// Smoothing window in metres
    #[arg(long = "janela-suavizacao-m", default_value = "50")]
    smoothing_window_m: f64,

    /// Maximum machinery heading relative to the contour, degrees
    #[arg(long = "alpha-graus", default_value = "30")]
    alpha_deg: f64,

    /// Inward buffer removing the parcel border, metres
    #[arg(long = "buffer-borda-m", default_value = "15")]
    edge_buffer_m: f64,

    /// Winsorization tail percent (0 disables)
    #[arg(long = "winsorizar-pct", default_value = "0")]
    winsorize_pct: f64,

    /// Directory receiving the intermediate slope and mask rasters
    #[arg(long = "salvar-rasters")]
    raster_dir: Option<PathBuf>,

    #[arg(long, value_enum, ignore_case = true, default_value = "INFO")]
    log_level: LogLevel,
}

impl Args {
    fn params(&self) -> SlopeParams {
        SlopeParams {
            percentile: self.percentile,
            smoothing_window_m: self.smoothing_window_m,
            alpha_deg: self.alpha_deg,
            edge_buffer_m: self.edge_buffer_m,
            winsorize_pct: self.winsorize_pct,
        }
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ParcelOutput {
    theta_op_deg: f64,
    grade_op_pct: f64,
    #[serde(rename = "S_p_pct")]
    s_p_pct: f64,
    percentil_usado: u8,
    janela_suavizacao_m: f64,
    alpha_graus: f64,
    buffer_borda_m: f64,
    area_utilizada_ha: f64,
    resolucao_m: f64,
    correcao_aplicada: bool,
    pixels_utilizados: usize,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

impl From<&SlopeRun> for ParcelOutput {
    fn from(run: &SlopeRun) -> Self {
        let r = &run.report;
        Self {
            theta_op_deg: round4(r.operational_angle_deg),
            grade_op_pct: round4(r.operational_grade_pct),
            s_p_pct: round4(r.percentile_slope_pct),
            percentil_usado: r.percentile_used,
            janela_suavizacao_m: r.smoothing_window_m,
            alpha_graus: r.alpha_deg,
            buffer_borda_m: r.effective_buffer_m,
            area_utilizada_ha: round4(r.used_area_ha),
            resolucao_m: round4(r.resolution_m),
            correcao_aplicada: r.correction_applied,
            pixels_utilizados: r.cell_count,
        }
    }
}

// ── Raster dumps ─────────────────────────────────────────────────────────────

fn save_rasters(dir: &Path, run: &SlopeRun) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    log::info!("saving intermediate rasters to {}", dir.display());

    write_geotiff(&dir.join("slope_pct.tif"), &run.slope, &run.georef, f32::NAN)
        .context("Failed to write slope_pct.tif")?;
    write_geotiff(
        &dir.join("slope_pct_suav.tif"),
        &run.slope_smoothed,
        &run.georef,
        f32::NAN,
    )
    .context("Failed to write slope_pct_suav.tif")?;
    let mask = run.mask.map(|inside| inside.then_some(1.0));
    write_geotiff(&dir.join("mascara_interior.tif"), &mask, &run.georef, 0.0)
        .context("Failed to write mascara_interior.tif")?;
    Ok(())
}

/// Output directory for one parcel: the directory itself for a single
/// parcel, a per-parcel subdirectory otherwise.
fn raster_dir_for(root: &Path, parcel: &Path, several: bool) -> PathBuf {
    if several {
        let stem = parcel
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "talhao".to_string());
        root.join(stem)
    } else {
        root.to_path_buf()
    }
}

// ── Driver ───────────────────────────────────────────────────────────────────

fn process_parcel(
    path: &Path,
    dem: &DemRaster,
    params: &SlopeParams,
    raster_dir: Option<PathBuf>,
) -> Result<ParcelOutput> {
    let parcel = read_parcel(path).with_context(|| format!("Cannot read parcel {}", path.display()))?;
    log::info!(
        "parcel '{}' with {} vertices",
        parcel.name,
        parcel.vertices.len()
    );

    let run = run(&parcel.vertices, &RasterGrid::new(dem), params, &mut LogSink)
        .with_context(|| format!("Slope estimation failed for '{}'", parcel.name))?;

    if let Some(dir) = raster_dir {
        save_rasters(&dir, &run)?;
    }
    Ok(ParcelOutput::from(&run))
}

fn execute(args: &Args) -> Result<String> {
    let params = args.params();
    params.validate()?;

    let dem = DemRaster::from_geotiff(&args.dem)
        .with_context(|| format!("Cannot read DEM {}", args.dem.display()))?;
    log::info!(
        "DEM {}×{} px, {:.2} m × {:.2} m",
        dem.width(),
        dem.height(),
        dem.pixel_w,
        dem.pixel_h
    );

    let several = args.parcels.len() > 1;
    let outputs = args
        .parcels
        .par_iter()
        .map(|path| {
            let raster_dir = args
                .raster_dir
                .as_deref()
                .map(|root| raster_dir_for(root, path, several));
            process_parcel(path, &dem, &params, raster_dir)
        })
        .collect::<Result<Vec<_>>>()?;

    let json = match outputs.as_slice() {
        [single] => serde_json::to_string_pretty(single)?,
        [] => bail!("no parcel given"),
        all => serde_json::to_string_pretty(all)?,
    };
    Ok(json)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    match execute(&args) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("operational slope failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
