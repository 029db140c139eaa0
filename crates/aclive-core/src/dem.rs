//! Single-band DEM rasters: GeoTIFF I/O, sampling and the raster grid
//! strategy.
//!
//! GeoTIFF rows run north → south; [`DemRaster`] stores them flipped so
//! row 0 is the southernmost row, matching [`crate::grid`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use log::Level;
use serde::Serialize;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use crate::buffer::inward_buffer;
use crate::coords::{GeoVertex, LatLon};
use crate::crs::{is_geographic, wgs84_to_utm, Crs};
use crate::diagnostics::DiagnosticSink;
use crate::error::{Result, SlopeError};
use crate::grid::{Grid, ValidityMask};
use crate::params::SlopeParams;
use crate::polygon::{Bounds, PlanarPolygon};
use crate::projection::{ensure_distinct_vertices, LocalProjection, PlaneFrame, EARTH_RADIUS_M};
use crate::resolver::ElevationResolver;
use crate::sampling::{axis, GridLayout, GridStrategy, ProjectedParcel};

// ── GeoTIFF tags and keys ────────────────────────────────────────────────────

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u32 = 1024;
const KEY_RASTER_TYPE: u32 = 1025;
const KEY_GEOGRAPHIC_TYPE: u32 = 2048;
const KEY_PROJECTED_CS_TYPE: u32 = 3072;
const RASTER_PIXEL_IS_POINT: u32 = 2;
const USER_DEFINED: u32 = 32767;

/// Extra margin around the parcel bounds when cropping the DEM, metres.
pub const CROP_MARGIN_M: f64 = 5.0;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Top-left corner and pixel size of a north-up raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub west: f64,
    pub north: f64,
    pub pixel_w: f64,
    /// Pixel height as a positive distance.
    pub pixel_h: f64,
}

/// Georeference from ModelPixelScale + ModelTiepoint, or from a
/// ModelTransformation matrix. Rotated or south-up rasters are rejected.
pub fn parse_georeference(
    scale: Option<&[f64]>,
    tiepoint: Option<&[f64]>,
    transformation: Option<&[f64]>,
) -> Result<GeoTransform> {
    if let (Some(s), Some(t)) = (scale, tiepoint) {
        if s.len() >= 2 && t.len() >= 6 && s[0] > 0.0 && s[1] > 0.0 {
            return Ok(GeoTransform {
                west: t[3] - t[0] * s[0],
                north: t[4] + t[1] * s[1],
                pixel_w: s[0],
                pixel_h: s[1],
            });
        }
    }
    if let Some(m) = transformation {
        if m.len() >= 8 {
            if m[1] != 0.0 || m[4] != 0.0 {
                return Err(SlopeError::Crs("rotated DEM rasters are not supported".into()));
            }
            if m[0] > 0.0 && m[5] < 0.0 {
                return Ok(GeoTransform {
                    west: m[3],
                    north: m[7],
                    pixel_w: m[0],
                    pixel_h: -m[5],
                });
            }
            return Err(SlopeError::Crs("DEM raster is not north-up".into()));
        }
    }
    Err(SlopeError::Crs("DEM has no usable georeference tags".into()))
}

/// The parts of a GeoKeyDirectory the reader cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeoKeys {
    pub model_type: Option<u32>,
    pub pixel_is_point: bool,
    pub epsg: Option<u32>,
}

/// Parse inline (location 0) keys of a GeoKeyDirectory.
pub fn parse_geokeys(dir: &[u32]) -> GeoKeys {
    let mut keys = GeoKeys::default();
    let mut geographic = None;
    let mut projected = None;
    for entry in dir.get(4..).unwrap_or_default().chunks_exact(4) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match key {
            KEY_MODEL_TYPE => keys.model_type = Some(value),
            KEY_RASTER_TYPE => keys.pixel_is_point = value == RASTER_PIXEL_IS_POINT,
            KEY_GEOGRAPHIC_TYPE => geographic = Some(value),
            KEY_PROJECTED_CS_TYPE => projected = Some(value),
            _ => {}
        }
    }
    keys.epsg = projected.or(geographic).filter(|&e| e != 0 && e != USER_DEFINED);
    keys
}

// ── Raster ───────────────────────────────────────────────────────────────────

/// A north-up elevation raster, stored south-up.
#[derive(Debug, Clone)]
pub struct DemRaster {
    pub elev: Grid<Option<f64>>,
    /// West edge of column 0.
    pub min_x: f64,
    /// South edge of row 0.
    pub min_y: f64,
    pub pixel_w: f64,
    pub pixel_h: f64,
    pub crs: Option<Crs>,
}

impl DemRaster {
    pub fn new(
        elev: Grid<Option<f64>>,
        min_x: f64,
        min_y: f64,
        pixel_w: f64,
        pixel_h: f64,
        crs: Option<Crs>,
    ) -> Self {
        Self { elev, min_x, min_y, pixel_w, pixel_h, crs }
    }

    pub fn from_geotiff(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let dem = decode_geotiff(BufReader::new(file))?;
        log::debug!(
            "DEM {}: {}×{} px, pixel {:.3}×{:.3}, CRS {:?}",
            path.display(),
            dem.elev.width,
            dem.elev.height,
            dem.pixel_w,
            dem.pixel_h,
            dem.crs
        );
        Ok(dem)
    }

    pub fn width(&self) -> usize {
        self.elev.width
    }

    pub fn height(&self) -> usize {
        self.elev.height
    }

    /// Raster-CRS coordinates of the centre of cell (r, c).
    pub fn cell_centre(&self, r: usize, c: usize) -> (f64, f64) {
        (
            self.min_x + (c as f64 + 0.5) * self.pixel_w,
            self.min_y + (r as f64 + 0.5) * self.pixel_h,
        )
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            min_x: self.min_x,
            min_y: self.min_y,
            max_x: self.min_x + self.width() as f64 * self.pixel_w,
            max_y: self.min_y + self.height() as f64 * self.pixel_h,
        }
    }

    /// Bilinear interpolation between cell centres at raster-CRS (x, y).
    ///
    /// Points within half a pixel of the edge use the edge cells. Undefined
    /// corners drop out and the remaining weights are renormalised.
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (w, h) = (self.width(), self.height());
        if w == 0 || h == 0 {
            return None;
        }
        let fx = (x - self.min_x) / self.pixel_w - 0.5;
        let fy = (y - self.min_y) / self.pixel_h - 0.5;
        if !(fx >= -0.5 && fx <= w as f64 - 0.5 && fy >= -0.5 && fy <= h as f64 - 0.5) {
            return None;
        }
        let fx = fx.clamp(0.0, (w - 1) as f64);
        let fy = fy.clamp(0.0, (h - 1) as f64);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(w - 1);
        let y1 = (y0 + 1).min(h - 1);
        let tx = fx - x0 as f64;
        let ty = fy - y0 as f64;

        let corners = [
            (y0, x0, (1.0 - tx) * (1.0 - ty)),
            (y0, x1, tx * (1.0 - ty)),
            (y1, x0, (1.0 - tx) * ty),
            (y1, x1, tx * ty),
        ];
        let (mut sum, mut weight) = (0.0, 0.0);
        for (r, c, wgt) in corners {
            if let Some(z) = self.elev.get(r, c) {
                sum += z * wgt;
                weight += wgt;
            }
        }
        (weight > 1e-12).then(|| sum / weight)
    }

    /// Raster-CRS coordinates of a geographic position.
    pub fn to_raster_coords(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        match self.crs {
            Some(Crs::Geographic { .. }) => Ok((lon, lat)),
            Some(Crs::Utm { zone, .. }) => Ok(wgs84_to_utm(lon, lat, zone)),
            Some(Crs::Unsupported { epsg }) => {
                Err(SlopeError::Crs(format!("EPSG:{epsg} is not supported")))
            }
            None => Err(SlopeError::Crs("DEM has no spatial reference".into())),
        }
    }
}

fn decode_geotiff<R: Read + Seek>(reader: R) -> Result<DemRaster> {
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let (w, h) = (width as usize, height as usize);

    let scale = decoder
        .find_tag(tag(TAG_MODEL_PIXEL_SCALE))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let tiepoint = decoder
        .find_tag(tag(TAG_MODEL_TIEPOINT))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let transformation = decoder
        .find_tag(tag(TAG_MODEL_TRANSFORMATION))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let geokeys = decoder
        .find_tag(tag(TAG_GEO_KEY_DIRECTORY))?
        .map(|v| v.into_u32_vec())
        .transpose()?
        .map(|dir| parse_geokeys(&dir))
        .unwrap_or_default();
    let nodata = decoder
        .find_tag(tag(TAG_GDAL_NODATA))?
        .and_then(|v| v.into_string().ok())
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

    let mut gt = parse_georeference(scale.as_deref(), tiepoint.as_deref(), transformation.as_deref())?;
    if geokeys.pixel_is_point {
        gt.west -= gt.pixel_w / 2.0;
        gt.north += gt.pixel_h / 2.0;
    }

    let values: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|z| z as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|z| z as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => {
            return Err(SlopeError::RasterBounds(
                "unsupported DEM sample format".into(),
            ))
        }
    };
    if values.len() != w * h {
        return Err(SlopeError::RasterBounds(format!(
            "expected a single-band {w}×{h} DEM, got {} samples",
            values.len()
        )));
    }

    // North-up file rows → south-up grid rows.
    let mut elev = Grid::new(w, h, None);
    for (file_row, row) in values.chunks_exact(w.max(1)).enumerate() {
        let r = h - 1 - file_row;
        for (c, &z) in row.iter().enumerate() {
            let defined = z.is_finite() && nodata.map_or(true, |nd| z != nd);
            if defined {
                elev.set(r, c, Some(z));
            }
        }
    }

    Ok(DemRaster {
        elev,
        min_x: gt.west,
        min_y: gt.north - h as f64 * gt.pixel_h,
        pixel_w: gt.pixel_w,
        pixel_h: gt.pixel_h,
        crs: geokeys.epsg.map(Crs::from_epsg),
    })
}

impl ElevationResolver for DemRaster {
    /// Bilinear DEM lookup; any point off the raster fails the batch.
    fn resolve(&self, points: &[LatLon]) -> Result<Vec<f64>> {
        points
            .iter()
            .map(|p| {
                let (x, y) = self.to_raster_coords(p.lon, p.lat)?;
                self.sample(x, y).ok_or_else(|| {
                    SlopeError::ElevationUnavailable(format!(
                        "no DEM sample at ({:.6}, {:.6})",
                        p.lat, p.lon
                    ))
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "local DEM"
    }
}

// ── Raster grid strategy ─────────────────────────────────────────────────────

/// Dense strategy over a [`DemRaster`].
///
/// A UTM DEM is cropped around the parcel in its own zone; one with
/// non-square pixels is resampled bilinearly onto square cells of the finer
/// pixel side. A geographic DEM is resampled bilinearly onto a local
/// tangent plane grid at its native resolution.
pub struct RasterGrid<'a> {
    dem: &'a DemRaster,
}

impl<'a> RasterGrid<'a> {
    pub fn new(dem: &'a DemRaster) -> Self {
        Self { dem }
    }

    /// Native resolution of a geographic DEM in metres at latitude `lat0`
    /// (radians); the finer of the two axes.
    fn native_step_m(&self, lat0: f64) -> f64 {
        let m_per_deg = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        let dx = self.dem.pixel_w * m_per_deg * lat0.cos();
        let dy = self.dem.pixel_h * m_per_deg;
        dx.min(dy)
    }

    /// Pixels within 1 % of square are used as-is; others are resampled.
    fn square_pixels(&self) -> bool {
        (self.dem.pixel_w - self.dem.pixel_h).abs() <= 0.01 * self.dem.pixel_w
    }

    /// Column/row index ranges (half-open) of DEM cells covering `b`.
    fn crop_window(&self, b: Bounds) -> Result<(usize, usize, usize, usize)> {
        let (w, h) = (self.dem.width() as f64, self.dem.height() as f64);
        let c0 = ((b.min_x - self.dem.min_x) / self.dem.pixel_w).floor().max(0.0);
        let c1 = ((b.max_x - self.dem.min_x) / self.dem.pixel_w).ceil().min(w);
        let r0 = ((b.min_y - self.dem.min_y) / self.dem.pixel_h).floor().max(0.0);
        let r1 = ((b.max_y - self.dem.min_y) / self.dem.pixel_h).ceil().min(h);
        if !(c1 > c0 && r1 > r0) {
            return Err(SlopeError::RasterBounds(
                "parcel does not intersect the DEM".into(),
            ));
        }
        Ok((c0 as usize, c1 as usize, r0 as usize, r1 as usize))
    }
}

impl GridStrategy for RasterGrid<'_> {
    fn project(&self, vertices: &[GeoVertex]) -> Result<ProjectedParcel> {
        ensure_distinct_vertices(vertices)?;
        let frame = match self.dem.crs {
            Some(Crs::Utm { epsg, zone }) => PlaneFrame::Utm { epsg, zone },
            Some(Crs::Geographic { .. }) => {
                PlaneFrame::Local(LocalProjection::centred_on(vertices)?)
            }
            Some(crs) => {
                return Err(SlopeError::Crs(format!(
                    "EPSG:{} is neither UTM nor geographic",
                    crs.epsg()
                )))
            }
            None => return Err(SlopeError::Crs("DEM has no spatial reference".into())),
        };
        let polygon = PlanarPolygon::new(frame.project(vertices))?;
        Ok(ProjectedParcel { frame, polygon })
    }

    fn layout(
        &self,
        parcel: &ProjectedParcel,
        params: &SlopeParams,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<GridLayout> {
        let b = parcel.polygon.bounds().expanded(CROP_MARGIN_M);
        let (x_coords, y_coords, step) = match &parcel.frame {
            PlaneFrame::Utm { .. } => {
                let (c0, c1, r0, r1) = self.crop_window(b)?;
                if self.square_pixels() {
                    let xs = (c0..c1).map(|c| self.dem.cell_centre(0, c).0).collect();
                    let ys = (r0..r1).map(|r| self.dem.cell_centre(r, 0).1).collect();
                    (xs, ys, self.dem.pixel_w)
                } else {
                    let step = self.dem.pixel_w.min(self.dem.pixel_h);
                    sink.record(
                        Level::Info,
                        &format!(
                            "non-square DEM pixels ({:.3}×{:.3} m); resampling at {step:.3} m",
                            self.dem.pixel_w, self.dem.pixel_h
                        ),
                    );
                    (axis(b.min_x, b.max_x, step), axis(b.min_y, b.max_y, step), step)
                }
            }
            PlaneFrame::Local(projection) => {
                let dem_bounds = self.dem.bounds();
                let sw = projection.inverse(b.min_x, b.min_y);
                let ne = projection.inverse(b.max_x, b.max_y);
                if ne.lon < dem_bounds.min_x
                    || sw.lon > dem_bounds.max_x
                    || ne.lat < dem_bounds.min_y
                    || sw.lat > dem_bounds.max_y
                {
                    return Err(SlopeError::RasterBounds(
                        "parcel does not intersect the DEM".into(),
                    ));
                }
                let step = self.native_step_m(projection.lat0);
                (axis(b.min_x, b.max_x, step), axis(b.min_y, b.max_y, step), step)
            }
        };

        let buffered = inward_buffer(
            &parcel.polygon,
            &x_coords,
            &y_coords,
            step * step,
            params.edge_buffer_m,
            sink,
        );
        sink.record(
            Level::Debug,
            &format!(
                "raster grid {}×{} at {step:.2} m, {} interior cells, buffer {:.2} m",
                x_coords.len(),
                y_coords.len(),
                buffered.mask.count_valid(),
                buffered.effective_m
            ),
        );
        Ok(GridLayout {
            x_coords,
            y_coords,
            step,
            mask: buffered.mask,
            effective_buffer_m: buffered.effective_m,
        })
    }

    /// Every cell of the window is filled, so neighbours outside the mask
    /// still feed the gradient.
    fn elevations(
        &self,
        parcel: &ProjectedParcel,
        layout: &GridLayout,
        _mask: &ValidityMask,
    ) -> Result<Grid<Option<f64>>> {
        let (w, h) = (layout.x_coords.len(), layout.y_coords.len());
        let mut elev = Grid::new(w, h, None);
        match &parcel.frame {
            PlaneFrame::Utm { .. } if !self.square_pixels() => {
                for (r, &y) in layout.y_coords.iter().enumerate() {
                    for (c, &x) in layout.x_coords.iter().enumerate() {
                        elev.set(r, c, self.dem.sample(x, y));
                    }
                }
            }
            PlaneFrame::Utm { .. } => {
                let index = |v: f64, origin: f64, size: f64| ((v - origin) / size - 0.5).round() as usize;
                let c0 = layout.x_coords.first().map_or(0, |&x| index(x, self.dem.min_x, self.dem.pixel_w));
                let r0 = layout.y_coords.first().map_or(0, |&y| index(y, self.dem.min_y, self.dem.pixel_h));
                for r in 0..h {
                    for c in 0..w {
                        elev.set(r, c, self.dem.elev.get(r0 + r, c0 + c));
                    }
                }
            }
            PlaneFrame::Local(projection) => {
                for (r, &y) in layout.y_coords.iter().enumerate() {
                    for (c, &x) in layout.x_coords.iter().enumerate() {
                        let p = projection.inverse(x, y);
                        elev.set(r, c, self.dem.sample(p.lon, p.lat));
                    }
                }
            }
        }
        if elev.data.iter().all(Option::is_none) {
            return Err(SlopeError::RasterBounds(
                "no defined DEM samples over the parcel".into(),
            ));
        }
        Ok(elev)
    }

    fn denoise(&self) -> bool {
        true
    }
}

// ── GeoTIFF writer ───────────────────────────────────────────────────────────

/// Placement of a pipeline grid, for writing it back out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Georeference {
    /// West edge of the first column.
    pub west: f64,
    /// North edge of the last (northernmost) row.
    pub north: f64,
    pub step: f64,
    pub epsg: Option<u32>,
}

impl Georeference {
    pub fn from_axes(x_coords: &[f64], y_coords: &[f64], step: f64, epsg: Option<u32>) -> Self {
        let x0 = x_coords.first().copied().unwrap_or(0.0);
        let y1 = y_coords.last().copied().unwrap_or(0.0);
        Self {
            west: x0 - step / 2.0,
            north: y1 + step / 2.0,
            step,
            epsg,
        }
    }
}

/// Write a south-up grid as a Float32 GeoTIFF. `None` cells are written as
/// `nodata`.
pub fn write_geotiff(
    path: &Path,
    grid: &Grid<Option<f64>>,
    georef: &Georeference,
    nodata: f32,
) -> Result<()> {
    let file = File::create(path)?;
    encode_geotiff(BufWriter::new(file), grid, georef, nodata)
}

fn encode_geotiff<W: Write + Seek>(
    writer: W,
    grid: &Grid<Option<f64>>,
    georef: &Georeference,
    nodata: f32,
) -> Result<()> {
    let (w, h) = (grid.width, grid.height);
    let mut data = Vec::with_capacity(w * h);
    for r in (0..h).rev() {
        for c in 0..w {
            data.push(grid.get(r, c).map_or(nodata, |v| v as f32));
        }
    }

    let scale = [georef.step, georef.step, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, georef.west, georef.north, 0.0];
    let mut geokeys: Vec<u16> = vec![1, 1, 0, 0];
    match georef.epsg.and_then(|e| u16::try_from(e).ok()) {
        Some(epsg) if is_geographic(u32::from(epsg)) => {
            geokeys.extend_from_slice(&[1024, 0, 1, 2, 1025, 0, 1, 1, 2048, 0, 1, epsg]);
        }
        Some(epsg) => {
            geokeys.extend_from_slice(&[1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, epsg]);
        }
        None => geokeys.extend_from_slice(&[1024, 0, 1, 1, 1025, 0, 1, 1]),
    }
    geokeys[3] = ((geokeys.len() - 4) / 4) as u16;
    let nodata_text = if nodata.is_nan() { "nan".to_string() } else { nodata.to_string() };

    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<Gray32Float>(w as u32, h as u32)?;
    image.encoder().write_tag(tag(TAG_MODEL_PIXEL_SCALE), &scale[..])?;
    image.encoder().write_tag(tag(TAG_MODEL_TIEPOINT), &tiepoint[..])?;
    image.encoder().write_tag(tag(TAG_GEO_KEY_DIRECTORY), &geokeys[..])?;
    image.encoder().write_tag(tag(TAG_GDAL_NODATA), nodata_text.as_str())?;
    image.write_data(&data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::UtmZone;
    use crate::diagnostics::DiagnosticLog;
    use approx::assert_abs_diff_eq;

    #[test]
    fn georeference_from_scale_and_tiepoint() {
        let gt = parse_georeference(
            Some(&[30.0, 30.0, 0.0]),
            Some(&[0.0, 0.0, 0.0, 500_000.0, 8_000_000.0, 0.0]),
            None,
        )
        .unwrap();
        assert_eq!(gt, GeoTransform { west: 500_000.0, north: 8_000_000.0, pixel_w: 30.0, pixel_h: 30.0 });
    }

    #[test]
    fn georeference_from_transformation() {
        let m = [5.0, 0.0, 0.0, 100.0, 0.0, -5.0, 0.0, 900.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let gt = parse_georeference(None, None, Some(&m)).unwrap();
        assert_eq!((gt.west, gt.north, gt.pixel_w, gt.pixel_h), (100.0, 900.0, 5.0, 5.0));

        let mut rotated = m;
        rotated[1] = 0.5;
        assert!(matches!(
            parse_georeference(None, None, Some(&rotated)),
            Err(SlopeError::Crs(_))
        ));
        assert!(matches!(parse_georeference(None, None, None), Err(SlopeError::Crs(_))));
    }

    #[test]
    fn geokeys_prefer_projected_code() {
        let dir = [1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 2, 3072, 0, 1, 31983];
        let keys = parse_geokeys(&dir);
        assert_eq!(keys.epsg, Some(31983));
        assert!(keys.pixel_is_point);

        let user = [1, 1, 0, 1, 3072, 0, 1, USER_DEFINED];
        assert_eq!(parse_geokeys(&user).epsg, None);
        assert_eq!(parse_geokeys(&[]).epsg, None);
    }

    #[test]
    fn geotiff_round_trip_keeps_orientation_and_nodata() {
        let mut grid = Grid::new(4, 3, None);
        for r in 0..3 {
            for c in 0..4 {
                grid.set(r, c, Some(100.0 + r as f64 * 10.0 + c as f64));
            }
        }
        grid.set(1, 2, None);
        let xs = [502.5, 507.5, 512.5, 517.5];
        let ys = [7_002.5, 7_007.5, 7_012.5];
        let georef = Georeference::from_axes(&xs, &ys, 5.0, Some(31983));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        write_geotiff(&path, &grid, &georef, f32::NAN).unwrap();

        let dem = DemRaster::from_geotiff(&path).unwrap();
        assert_eq!((dem.width(), dem.height()), (4, 3));
        assert_eq!(dem.elev, grid);
        assert_abs_diff_eq!(dem.min_x, 500.0);
        assert_abs_diff_eq!(dem.min_y, 7_000.0);
        assert_eq!(
            dem.crs,
            Some(Crs::Utm { epsg: 31983, zone: UtmZone { zone: 23, north: false } })
        );
    }

    #[test]
    fn bilinear_sample_between_centres() {
        let mut grid = Grid::new(2, 2, None);
        grid.set(0, 0, Some(0.0));
        grid.set(0, 1, Some(10.0));
        grid.set(1, 0, Some(20.0));
        grid.set(1, 1, Some(30.0));
        let dem = DemRaster::new(grid, 0.0, 0.0, 10.0, 10.0, None);
        assert_eq!(dem.sample(5.0, 5.0), Some(0.0));
        assert_abs_diff_eq!(dem.sample(10.0, 10.0).unwrap(), 15.0);
        assert_eq!(dem.sample(1.0, 1.0), Some(0.0));
        assert_eq!(dem.sample(-1.0, 5.0), None);
        assert_eq!(dem.sample(5.0, 20.5), None);
    }

    fn utm_plane_dem(origin: (f64, f64), n: usize, a: f64, b: f64) -> DemRaster {
        let mut grid = Grid::new(n, n, None);
        for r in 0..n {
            for c in 0..n {
                let (x, y) = (c as f64 * 5.0, r as f64 * 5.0);
                grid.set(r, c, Some(500.0 + a * x + b * y));
            }
        }
        let zone = UtmZone { zone: 23, north: false };
        DemRaster::new(grid, origin.0, origin.1, 5.0, 5.0, Some(Crs::Utm { epsg: 31983, zone }))
    }

    fn parcel_vertices() -> Vec<GeoVertex> {
        vec![
            GeoVertex::new(-47.900, -15.800),
            GeoVertex::new(-47.899, -15.800),
            GeoVertex::new(-47.899, -15.799),
            GeoVertex::new(-47.900, -15.799),
        ]
    }

    #[test]
    fn utm_dem_is_cropped_around_parcel() {
        let zone = UtmZone { zone: 23, north: false };
        let (e, n) = wgs84_to_utm(-47.900, -15.800, zone);
        let dem = utm_plane_dem((e - 100.0, n - 100.0), 80, 0.0, 0.0);
        let strategy = RasterGrid::new(&dem);
        let mut sink = DiagnosticLog::new();

        let parcel = strategy.project(&parcel_vertices()).unwrap();
        assert_eq!(parcel.frame.epsg(), Some(31983));
        let layout = strategy.layout(&parcel, &SlopeParams::default(), &mut sink).unwrap();
        assert_eq!(layout.step, 5.0);
        let b = parcel.polygon.bounds();
        assert!(layout.x_coords[0] < b.min_x && *layout.x_coords.last().unwrap() > b.max_x);
        assert!(layout.mask.count_valid() > 0);
        assert!(layout.effective_buffer_m > 0.0);

        let elev = strategy.elevations(&parcel, &layout, &layout.mask).unwrap();
        assert!(elev.data.iter().all(|z| *z == Some(500.0)));
        assert!(strategy.denoise());
    }

    #[test]
    fn parcel_off_the_dem_is_raster_bounds() {
        let dem = utm_plane_dem((100_000.0, 100_000.0), 10, 0.0, 0.0);
        let strategy = RasterGrid::new(&dem);
        let mut sink = DiagnosticLog::new();
        let parcel = strategy.project(&parcel_vertices()).unwrap();
        let err = strategy.layout(&parcel, &SlopeParams::default(), &mut sink).unwrap_err();
        assert!(matches!(err, SlopeError::RasterBounds(_)));
    }

    #[test]
    fn missing_or_foreign_crs_is_crs_error() {
        let mut dem = utm_plane_dem((0.0, 0.0), 4, 0.0, 0.0);
        dem.crs = None;
        assert!(matches!(
            RasterGrid::new(&dem).project(&parcel_vertices()),
            Err(SlopeError::Crs(_))
        ));
        dem.crs = Some(Crs::from_epsg(3857));
        assert!(matches!(
            RasterGrid::new(&dem).project(&parcel_vertices()),
            Err(SlopeError::Crs(_))
        ));
    }

    #[test]
    fn geographic_dem_resampled_at_native_resolution() {
        // 1 arc-second pixels (~30 m) around the parcel.
        let px = 1.0 / 3600.0;
        let n = 60;
        let (west, south) = (-47.9100, -15.8100);
        let grid = Grid::new(n, n, Some(750.0));
        let dem = DemRaster::new(grid, west, south, px, px, Some(Crs::from_epsg(4674)));
        let strategy = RasterGrid::new(&dem);
        let mut sink = DiagnosticLog::new();

        let parcel = strategy.project(&parcel_vertices()).unwrap();
        assert_eq!(parcel.frame.epsg(), None);
        let layout = strategy.layout(&parcel, &SlopeParams::default(), &mut sink).unwrap();
        assert!(layout.step > 28.0 && layout.step < 31.0, "step {}", layout.step);
        let elev = strategy.elevations(&parcel, &layout, &layout.mask).unwrap();
        assert!(elev.data.iter().all(|z| z.map_or(false, |v| (v - 750.0).abs() < 1e-9)));
    }

    #[test]
    fn dem_answers_point_queries() {
        let zone = UtmZone { zone: 23, north: false };
        let (e, n) = wgs84_to_utm(-47.900, -15.800, zone);
        let dem = utm_plane_dem((e - 100.0, n - 100.0), 80, 0.1, 0.0);
        let z = dem.resolve(&[LatLon::new(-15.800, -47.900)]).unwrap();
        // Half a pixel past cell 19: x = 19.5 · 5 m on a 0.1 gradient.
        assert_abs_diff_eq!(z[0], 509.75, epsilon = 1e-6);
        assert!(dem.resolve(&[LatLon::new(0.0, 0.0)]).is_err());
    }
}
