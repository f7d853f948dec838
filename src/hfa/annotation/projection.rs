//! Map information and spatial reference summary.

use std::fmt;

use crate::hfa::types::value::Record;

/// Six-term affine geotransform of an `Eprj_MapInfo` record.
///
/// `upperLeftCenter` is the centre of the upper-left pixel, so the origin is
/// shifted by half a pixel to the outer corner:
/// `[ulx - pw/2, pw, 0, uly + ph/2, 0, -ph]`.
pub fn geo_transform(map_info: &Record) -> Option<[f64; 6]> {
    let ulx = map_info.get_f64("upperLeftCenter.x")?;
    let uly = map_info.get_f64("upperLeftCenter.y")?;
    let pw = map_info.get_f64("pixelSize.width")?;
    let ph = map_info.get_f64("pixelSize.height")?;
    Some([ulx - pw / 2.0, pw, 0.0, uly + ph / 2.0, 0.0, -ph])
}

/// A UTM zone and hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    pub zone: i64,
    pub north: bool,
}

/// What the file says about its coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSummary {
    /// Datum name, or the spheroid name when the file has no datum.
    pub geographic: Option<String>,
    pub datum: Option<String>,
    pub spheroid: Option<String>,
    pub projection: Option<String>,
    pub units: Option<String>,
    /// Set for `proNumber == 1`.
    pub utm: Option<UtmZone>,
    pub geo_transform: Option<[f64; 6]>,
}

impl ProjectionSummary {
    /// Builds the summary from the decoded `Map_Info`, `Projection` and `Datum`
    /// records.
    ///
    /// Both map info and projection are required; the datum is optional.
    pub fn from_records(
        map_info: Option<&Record>,
        projection: Option<&Record>,
        datum: Option<&Record>,
    ) -> Option<Self> {
        let (map_info, projection) = (map_info?, projection?);

        let datum_name = datum.and_then(|d| d.get_string("datumname"));
        let spheroid = projection.get_string("proSpheroid.sphereName");
        let utm = match projection.get_i64("proNumber") {
            Some(1) => Some(UtmZone {
                zone: projection.get_i64("proZone").unwrap_or(0),
                north: projection.get_f64("proParams[3]").unwrap_or(0.0) >= 0.0,
            }),
            _ => None,
        };

        Some(Self {
            geographic: datum_name.clone().or_else(|| spheroid.clone()),
            datum: datum_name,
            spheroid,
            projection: projection
                .get_string("proName")
                .or_else(|| map_info.get_string("proName")),
            units: map_info.get_string("units"),
            utm,
            geo_transform: geo_transform(map_info),
        })
    }
}

impl fmt::Display for ProjectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let or_unknown = |s: &Option<String>| s.clone().unwrap_or_else(|| "unknown".to_string());
        write!(f, "GCS: {}, projection: {}", or_unknown(&self.geographic), or_unknown(&self.projection))?;
        if let Some(utm) = self.utm {
            write!(f, " (UTM zone {}{})", utm.zone, if utm.north { 'N' } else { 'S' })?;
        }
        if let Some(units) = &self.units {
            write!(f, ", units: {}", units)?;
        }
        Ok(())
    }
}
