//! Annotation extraction.
//!
//! Walks the entry tree and maps decoded records of known annotation and map
//! types into [`GeometryFeature`]s.
//!
//! | Entry type                         | Feature                                  |
//! |------------------------------------|------------------------------------------|
//! | `Rectangle2`                       | `Polygon`, four rotated corners          |
//! | `Eant_Ellipse`                     | `Polygon`, `ellipse_segments` points     |
//! | `Eant_Polyline`                    | `LineString`                             |
//! | `Eant_Polygon`                     | `Polygon`, explicitly closed             |
//! | `Text2`, `Eant_Text`               | `Point` at `origin`, `text` attribute    |
//! | `Eprj_MapInfo`                     | `Metadata` with `geoTransform`           |
//! | `Eprj_ProParameters`, `Eprj_Datum` | `Metadata`                               |
//!
//! `Element_Eant`/`Element_2_Eant` entries produce no feature themselves; their
//! scalar fields (name, description, element type...) become attributes of the
//! shapes below them, and their polynomial transform, if any, is applied to the
//! shapes' coordinates.

pub mod geometry;
pub mod projection;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Seek};
use log::{debug, trace, warn};

pub use geometry::{Affine, Point};
pub use projection::{ProjectionSummary, UtmZone};

use super::iter::TreeWalker;
use super::reader::HfaReader;
use super::types::error::{HfaError, Result};
use super::types::models::Entry;
use super::types::value::{Record, Value};

pub const RECTANGLE: &str = "Rectangle2";
pub const ELLIPSE: &str = "Eant_Ellipse";
pub const POLYLINE: &str = "Eant_Polyline";
pub const POLYGON: &str = "Eant_Polygon";
pub const TEXT2: &str = "Text2";
pub const TEXT: &str = "Eant_Text";
pub const MAP_INFO: &str = "Eprj_MapInfo";
pub const PRO_PARAMETERS: &str = "Eprj_ProParameters";
pub const DATUM: &str = "Eprj_Datum";
pub const ELEMENT: &str = "Element_Eant";
pub const ELEMENT_2: &str = "Element_2_Eant";

/// Geometry type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Point,
    LineString,
    Polygon,
    /// Non-geometric record (map info, projection, datum).
    Metadata,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FeatureKind::Point => "Point",
            FeatureKind::LineString => "LineString",
            FeatureKind::Polygon => "Polygon",
            FeatureKind::Metadata => "Metadata",
        };
        f.write_str(name)
    }
}

/// One extracted feature, ready for a vector writer.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryFeature {
    pub kind: FeatureKind,
    pub coordinates: Vec<Point>,
    pub attributes: BTreeMap<String, Value>,
    /// Offset of the entry the feature was decoded from.
    pub entry_offset: u64,
    pub entry_name: String,
    pub type_name: String,
}

impl GeometryFeature {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// First and last coordinates coincide.
    pub fn is_closed(&self) -> bool {
        self.coordinates.len() > 1 && self.coordinates.first() == self.coordinates.last()
    }
}

impl fmt::Display for GeometryFeature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {:?} ({})", self.kind, self.entry_name, self.type_name)?;
        if self.kind != FeatureKind::Metadata {
            write!(f, " [")?;
            for (i, p) in self.coordinates.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "({}, {})", p.x, p.y)?;
            }
            write!(f, "]")?;
        }
        for (name, value) in &self.attributes {
            write!(f, "\n    {}: {}", name, value)?;
        }
        Ok(())
    }
}

/// An entry left out of the extraction, with the reason.
#[derive(Debug)]
pub struct SkippedEntry {
    pub offset: u64,
    pub name: String,
    pub type_name: String,
    pub error: HfaError,
}

/// Result of a full extraction run.
#[derive(Debug)]
pub struct Extraction {
    pub features: Vec<GeometryFeature>,
    pub skipped: Vec<SkippedEntry>,
    pub projection: Option<ProjectionSummary>,
}

impl Extraction {
    /// Features that carry coordinates.
    pub fn geometries(&self) -> impl Iterator<Item = &GeometryFeature> {
        self.features
            .iter()
            .filter(|f| f.kind != FeatureKind::Metadata)
    }

    pub fn metadata(&self) -> impl Iterator<Item = &GeometryFeature> {
        self.features
            .iter()
            .filter(|f| f.kind == FeatureKind::Metadata)
    }
}

/// Attributes and transform inherited from an annotation element.
#[derive(Debug)]
struct ElementContext {
    depth: usize,
    attributes: BTreeMap<String, Value>,
    transform: Option<Affine>,
}

/// Streams features out of the entry tree.
///
/// Per-entry failures are collected (see [`FeatureIterator::skipped`]) and do
/// not interrupt the stream; a corrupt tree or an I/O failure is yielded as an
/// error and ends it.
///
/// Created by [`HfaReader::features()`](crate::HfaReader::features).
pub struct FeatureIterator<'a, R> {
    reader: &'a HfaReader<R>,
    walker: TreeWalker<'a, R>,
    elements: Vec<ElementContext>,
    skipped: Vec<SkippedEntry>,
}

impl<'a, R: Read + Seek> FeatureIterator<'a, R> {
    pub(crate) fn new(reader: &'a HfaReader<R>) -> Self {
        Self {
            reader,
            walker: reader.walk(),
            elements: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Entries skipped so far.
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    pub fn into_skipped(self) -> Vec<SkippedEntry> {
        self.skipped
    }

    fn skip(&mut self, offset: u64, entry: Option<&Entry>, error: HfaError) {
        let (name, type_name) = entry
            .map(|e| (e.name.clone(), e.type_name.clone()))
            .unwrap_or_default();
        warn!(
            "Skipping entry {:?} ({}) at {:#x}: {}",
            name, type_name, offset, error
        );
        self.skipped.push(SkippedEntry {
            offset,
            name,
            type_name,
            error,
        });
    }

    /// Attributes and transform from all enclosing elements, innermost last.
    fn inherited(&self) -> (BTreeMap<String, Value>, Option<Affine>) {
        let mut attributes = BTreeMap::new();
        let mut transform = None;
        for element in &self.elements {
            attributes.extend(element.attributes.clone());
            transform = element.transform.or(transform);
        }
        (attributes, transform)
    }
}

impl<'a, R: Read + Seek> Iterator for FeatureIterator<'a, R> {
    type Item = Result<GeometryFeature>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (depth, entry) = match self.walker.next()? {
                Ok(item) => item,
                Err(e) if e.is_recoverable() => {
                    self.skip(e.offset().unwrap_or(0), None, e);
                    continue;
                }
                Err(e) => return Some(Err(e)),
            };

            while self.elements.last().is_some_and(|c| c.depth >= depth) {
                self.elements.pop();
            }

            let type_name = entry.type_name.as_str();
            let is_element = matches!(type_name, ELEMENT | ELEMENT_2);
            if !is_element && !is_known(type_name) {
                trace!("Ignoring {} ({})", entry.name, type_name);
                continue;
            }
            if !entry.has_data() {
                debug!("{} ({}) has no data block", entry.name, type_name);
                continue;
            }

            let record = match self.reader.decode_entry(&entry) {
                Ok(record) => record,
                Err(e) if e.is_recoverable() => {
                    self.skip(entry.offset, Some(&entry), e);
                    continue;
                }
                Err(e) => return Some(Err(e)),
            };

            if is_element {
                let context = ElementContext {
                    depth,
                    attributes: scalar_attributes(&record),
                    transform: Affine::from_record(&record).filter(|t| !t.is_identity()),
                };
                debug!(
                    "Element {} at depth {} ({} attributes, transform: {})",
                    entry.name,
                    depth,
                    context.attributes.len(),
                    context.transform.is_some()
                );
                self.elements.push(context);
                continue;
            }

            let (inherited, transform) = self.inherited();
            let segments = self.reader.options().ellipse_segments;
            match map_record(&entry, &record, segments) {
                Ok(mut feature) => {
                    if feature.kind != FeatureKind::Metadata {
                        if let Some(transform) = transform {
                            for p in &mut feature.coordinates {
                                *p = transform.apply(*p);
                            }
                        }
                        feature.attributes.extend(inherited);
                    }
                    return Some(Ok(feature));
                }
                Err(e) => {
                    self.skip(entry.offset, Some(&entry), e);
                }
            }
        }
    }
}

fn is_known(type_name: &str) -> bool {
    matches!(
        type_name,
        RECTANGLE | ELLIPSE | POLYLINE | POLYGON | TEXT2 | TEXT | MAP_INFO | PRO_PARAMETERS | DATUM
    )
}

/// Top-level scalar fields of a record.
fn scalar_attributes(record: &Record) -> BTreeMap<String, Value> {
    record
        .fields()
        .filter(|(_, v)| v.is_scalar())
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Maps one decoded record to a feature.
pub fn map_record(entry: &Entry, record: &Record, ellipse_segments: usize) -> Result<GeometryFeature> {
    let missing = |field: &'static str| HfaError::MissingField {
        offset: entry.data as u64,
        type_name: record.type_name().to_string(),
        field,
    };
    let number = |field: &'static str| record.get_f64(field).ok_or_else(|| missing(field));
    let center = || {
        record
            .field("center")
            .or_else(|| record.field("origin"))
            .and_then(Point::from_value)
            .ok_or_else(|| missing("center"))
    };
    let orientation = || record.get_f64("orientation").unwrap_or(0.0);

    let mut attributes = scalar_attributes(record);
    let (kind, coordinates) = match entry.type_name.as_str() {
        RECTANGLE => (
            FeatureKind::Polygon,
            geometry::rectangle_corners(center()?, number("width")?, number("height")?, orientation()),
        ),
        ELLIPSE => (
            FeatureKind::Polygon,
            geometry::ellipse_ring(
                center()?,
                number("semiMajorAxis")?,
                number("semiMinorAxis")?,
                orientation(),
                ellipse_segments,
            ),
        ),
        POLYLINE => (
            FeatureKind::LineString,
            geometry::collect_points(record).ok_or_else(|| missing("points"))?,
        ),
        POLYGON => {
            let mut points = geometry::collect_points(record).ok_or_else(|| missing("points"))?;
            if let Some(&first) = points.first() {
                if points.last() != Some(&first) {
                    points.push(first);
                }
            }
            (FeatureKind::Polygon, points)
        }
        TEXT2 | TEXT => {
            let origin = record
                .field("origin")
                .and_then(Point::from_value)
                .ok_or_else(|| missing("origin"))?;
            let text = record
                .get_string("text.string")
                .or_else(|| record.get_string("text"))
                .unwrap_or_default();
            attributes.insert("text".to_string(), Value::Text(text));
            (FeatureKind::Point, vec![origin])
        }
        MAP_INFO => {
            attributes = record
                .fields()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            if let Some(transform) = projection::geo_transform(record) {
                attributes.insert(
                    "geoTransform".to_string(),
                    Value::Array(transform.into_iter().map(Value::Float).collect()),
                );
            }
            (FeatureKind::Metadata, Vec::new())
        }
        _ => {
            attributes = record
                .fields()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            (FeatureKind::Metadata, Vec::new())
        }
    };

    Ok(GeometryFeature {
        kind,
        coordinates,
        attributes,
        entry_offset: entry.offset,
        entry_name: entry.name.clone(),
        type_name: entry.type_name.clone(),
    })
}
