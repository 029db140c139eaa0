//! Parcel boundaries from KML / KMZ files.
//!
//! Only the first `Placemark` is read: its `name` and the outer ring of its
//! first `Polygon`.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::coords::GeoVertex;
use crate::error::{Result, SlopeError};

/// A named parcel boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    pub name: String,
    pub vertices: Vec<GeoVertex>,
}

/// Read the first placemark polygon from a `.kml` or `.kmz` file. The file
/// stem names the parcel when the placemark has no name.
pub fn read_parcel(path: &Path) -> Result<Parcel> {
    let bytes = fs::read(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let xml = if bytes.starts_with(b"PK") {
        kml_from_kmz(&bytes)?
    } else {
        String::from_utf8(bytes)
            .map_err(|e| SlopeError::Boundary(format!("{}: not UTF-8 text: {e}", path.display())))?
    };
    parse_kml(&xml, &stem)
}

/// Text of the first `*.kml` entry of a KMZ archive.
pub fn kml_from_kmz(bytes: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SlopeError::Boundary(format!("failed to open KMZ: {e}")))?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| SlopeError::Boundary(format!("failed to access KMZ entry {i}: {e}")))?;
        if !entry.name().to_ascii_lowercase().ends_with(".kml") {
            continue;
        }
        let mut xml = String::new();
        entry.read_to_string(&mut xml)?;
        return Ok(xml);
    }
    Err(SlopeError::Boundary("KMZ holds no .kml document".into()))
}

/// Parse `lon,lat[,alt]` tuples separated by whitespace.
pub fn parse_coordinates(text: &str) -> Result<Vec<GeoVertex>> {
    let mut vertices = Vec::new();
    for token in text.split_whitespace() {
        let parts: Vec<&str> = token.split(',').collect();
        if parts.len() < 2 {
            continue;
        }
        let num = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| SlopeError::Boundary(format!("bad coordinate '{token}'")))
        };
        let (lon, lat) = (num(parts[0])?, num(parts[1])?);
        let alt = match parts.get(2).map(|s| s.trim()) {
            Some(s) if !s.is_empty() => Some(num(s)?),
            _ => None,
        };
        vertices.push(GeoVertex { lon, lat, alt });
    }
    Ok(vertices)
}

/// Placemark name and outer ring from KML text.
pub fn parse_kml(xml: &str, fallback_name: &str) -> Result<Parcel> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    // Element path below (and including) the first Placemark.
    let mut path: Vec<String> = Vec::new();
    let mut in_placemark = false;
    let mut name: Option<String> = None;
    let mut coordinates: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SlopeError::Boundary(format!("malformed KML: {e}")))?;
        match event {
            Event::Start(e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if !in_placemark && local == "Placemark" {
                    in_placemark = true;
                }
                if in_placemark {
                    path.push(local);
                }
            }
            Event::End(_) if in_placemark => {
                path.pop();
                if path.is_empty() {
                    break;
                }
            }
            Event::Text(t) if in_placemark => {
                let text = t
                    .unescape()
                    .map_err(|e| SlopeError::Boundary(format!("malformed KML text: {e}")))?;
                capture(&path, &text, &mut name, &mut coordinates);
            }
            Event::CData(t) if in_placemark => {
                let text = String::from_utf8_lossy(&t).into_owned();
                capture(&path, &text, &mut name, &mut coordinates);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !in_placemark {
        return Err(SlopeError::Boundary("no Placemark in KML".into()));
    }
    let text = coordinates
        .ok_or_else(|| SlopeError::Boundary("placemark has no polygon coordinates".into()))?;

    let mut vertices = parse_coordinates(&text)?;
    if vertices.len() >= 2 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    if vertices.len() < 3 {
        return Err(SlopeError::InputGeometry(format!(
            "parcel boundary has {} points",
            vertices.len()
        )));
    }

    let name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| fallback_name.to_string());
    Ok(Parcel { name, vertices })
}

fn capture(path: &[String], text: &str, name: &mut Option<String>, coords: &mut Option<String>) {
    const RING: [&str; 4] = ["Polygon", "outerBoundaryIs", "LinearRing", "coordinates"];
    if path.len() == 2 && path[1] == "name" && name.is_none() {
        *name = Some(text.to_string());
    } else if coords.is_none()
        && path.len() >= RING.len()
        && path[path.len() - RING.len()..].iter().zip(RING).all(|(a, b)| a == b)
    {
        *coords = Some(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>Fazenda</name>
    <Placemark>
      <name>Talhão 7</name>
      <Polygon>
        <outerBoundaryIs>
          <LinearRing>
            <coordinates>
              -47.900,-15.800,0 -47.899,-15.800,0
              -47.899,-15.799,0 -47.900,-15.799,0
              -47.900,-15.800,0
            </coordinates>
          </LinearRing>
        </outerBoundaryIs>
        <innerBoundaryIs>
          <LinearRing><coordinates>1,1,0 2,2,0 3,1,0</coordinates></LinearRing>
        </innerBoundaryIs>
      </Polygon>
    </Placemark>
    <Placemark><name>Second</name></Placemark>
  </Document>
</kml>"#;

    #[test]
    fn first_placemark_outer_ring() {
        let parcel = parse_kml(DOC, "file").unwrap();
        assert_eq!(parcel.name, "Talhão 7");
        assert_eq!(parcel.vertices.len(), 4);
        assert_eq!(parcel.vertices[0], GeoVertex::with_alt(-47.900, -15.800, 0.0));
        assert_eq!(parcel.vertices[2], GeoVertex::with_alt(-47.899, -15.799, 0.0));
    }

    #[test]
    fn prefixed_tags_and_missing_name() {
        let xml = r#"<kml:kml xmlns:kml="http://www.opengis.net/kml/2.2"><kml:Placemark>
            <kml:Polygon><kml:outerBoundaryIs><kml:LinearRing>
            <kml:coordinates>10,20 11,20 11,21</kml:coordinates>
            </kml:LinearRing></kml:outerBoundaryIs></kml:Polygon></kml:Placemark></kml:kml>"#;
        let parcel = parse_kml(xml, "north_field").unwrap();
        assert_eq!(parcel.name, "north_field");
        assert_eq!(parcel.vertices.len(), 3);
        assert_eq!(parcel.vertices[1].alt, None);
    }

    #[test]
    fn too_few_points_is_input_geometry() {
        let xml = "<kml><Placemark><Polygon><outerBoundaryIs><LinearRing>\
                   <coordinates>1,1 2,2 1,1</coordinates>\
                   </LinearRing></outerBoundaryIs></Polygon></Placemark></kml>";
        assert!(matches!(parse_kml(xml, "x"), Err(SlopeError::InputGeometry(_))));
    }

    #[test]
    fn missing_placemark_or_polygon_is_boundary_error() {
        assert!(matches!(parse_kml("<kml/>", "x"), Err(SlopeError::Boundary(_))));
        let xml = "<kml><Placemark><name>a</name><Point><coordinates>1,2</coordinates></Point></Placemark></kml>";
        assert!(matches!(parse_kml(xml, "x"), Err(SlopeError::Boundary(_))));
        assert!(parse_coordinates("1,abc").is_err());
    }

    #[test]
    fn kmz_round_trip() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            zip.start_file("files/readme.txt", zip::write::FileOptions::default()).unwrap();
            zip.write_all(b"not a kml").unwrap();
            zip.start_file("doc.kml", zip::write::FileOptions::default()).unwrap();
            zip.write_all(DOC.as_bytes()).unwrap();
            zip.finish().unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talhao.kmz");
        fs::write(&path, buf.into_inner()).unwrap();
        let parcel = read_parcel(&path).unwrap();
        assert_eq!(parcel.name, "Talhão 7");
        assert_eq!(parcel.vertices.len(), 4);
    }

    #[test]
    fn plain_kml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talhao.kml");
        fs::write(&path, DOC).unwrap();
        assert_eq!(read_parcel(&path).unwrap().vertices.len(), 4);
    }
}
