//! In-memory HFA file builder for integration tests.
//!
//! Layout produced by [`build`]:
//! ```text
//! 0x00  EHFA_HEADER_TAG\0 + header pointer (0x14)
//! 0x14  Ehfa_File record
//! 0x40  Ehfa_Entry nodes, 128 bytes each, in pre-order
//! ...   data blocks
//! ...   dictionary text, NUL-terminated
//! ```
#![allow(dead_code)]

use std::io::Cursor;

use hfa_reader::{Endianness, HfaReader, OpenOptions};

pub const HEADER_RECORD: u64 = 0x14;
pub const ENTRY_BASE: u64 = 0x40;
pub const ENTRY_LEN: u64 = 128;

/// Field offsets within an entry.
pub const NEXT: u64 = 0;
pub const PARENT: u64 = 8;
pub const CHILD: u64 = 12;
pub const DATA: u64 = 16;
pub const DATA_SIZE: u64 = 20;

/// Dictionary covering every type the annotation tests use.
pub const DICTIONARY: &str = "\
{1:x{1:dx,1:dy,}Eprj_Coordinate,center,1:dwidth,1:dheight,1:dorientation,}Rectangle2,\
{1:oEprj_Coordinate,center,1:dsemiMajorAxis,1:dsemiMinorAxis,1:dorientation,}Eant_Ellipse,\
{0:poEprj_Coordinate,points,}Eant_Polyline,\
{0:poEprj_Coordinate,points,}Eant_Polygon,\
{0:pcstring,}Egda_String,\
{1:oEprj_Coordinate,origin,1:oEgda_String,text,}Text2,\
{1:lorder,0:pdpolycoefmtx,0:pdpolycoefvector,}Efga_Polynomial,\
{0:pcname,0:pcdescription,1:lelementType,1:*oEfga_Polynomial,xform,}Element_2_Eant,\
{0:pcproName,1:*oEprj_Coordinate,upperLeftCenter,1:*oEprj_Coordinate,lowerRightCenter,\
1:*oEprj_Size,pixelSize,0:pcunits,}Eprj_MapInfo,\
{1:dwidth,1:dheight,}Eprj_Size,\
{1:e2:EPRJ_INTERNAL,EPRJ_EXTERNAL,proType,1:lproNumber,0:pcproExeName,0:pcproName,\
1:lproZone,0:pdproParams,1:*oEprj_Spheroid,proSpheroid,}Eprj_ProParameters,\
{0:pcsphereName,1:da,1:db,1:deSquared,1:dradius,}Eprj_Spheroid,\
{0:pcdatumname,}Eprj_Datum,\
{1:lversion,1:LfreeList,}Ehfa_File,\
.";

/// One tree node to lay out.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub type_name: String,
    pub data: Vec<u8>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: &str, type_name: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            data,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }
}

/// A laid-out file plus the offsets of its entries, for patching.
pub struct Built {
    pub bytes: Vec<u8>,
    /// `(name, entry offset, data offset)` in pre-order.
    pub entries: Vec<(String, u64, u64)>,
    pub endianness: Endianness,
}

impl Built {
    pub fn entry_offset(&self, name: &str) -> u64 {
        self.entries
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, offset, _)| *offset)
            .unwrap_or_else(|| panic!("no entry named {}", name))
    }

    pub fn data_offset(&self, name: &str) -> u64 {
        self.entries
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, data)| *data)
            .unwrap_or_else(|| panic!("no entry named {}", name))
    }

    /// Overwrites the u32 at `at` in the file's byte order.
    pub fn patch_u32(&mut self, at: u64, value: u32) {
        let at = at as usize;
        let bytes = match self.endianness {
            Endianness::Big => value.to_be_bytes(),
            Endianness::Little => value.to_le_bytes(),
        };
        self.bytes[at..at + 4].copy_from_slice(&bytes);
    }

    /// Overwrites a link or size field of the named entry.
    pub fn patch_entry(&mut self, name: &str, field: u64, value: u32) {
        let at = self.entry_offset(name) + field;
        self.patch_u32(at, value);
    }

    pub fn open(&self) -> hfa_reader::Result<HfaReader<Cursor<Vec<u8>>>> {
        HfaReader::from_reader(
            Cursor::new(self.bytes.clone()),
            OpenOptions::new().endianness(self.endianness),
        )
    }
}

struct Flat {
    name: String,
    type_name: String,
    data: Vec<u8>,
    parent: Option<usize>,
    child: Option<usize>,
    next: Option<usize>,
    prev: Option<usize>,
}

fn flatten(node: &Node, parent: Option<usize>, out: &mut Vec<Flat>) -> usize {
    let idx = out.len();
    out.push(Flat {
        name: node.name.clone(),
        type_name: node.type_name.clone(),
        data: node.data.clone(),
        parent,
        child: None,
        next: None,
        prev: None,
    });
    let mut previous: Option<usize> = None;
    for child in &node.children {
        let ci = flatten(child, Some(idx), out);
        match previous {
            Some(p) => {
                out[p].next = Some(ci);
                out[ci].prev = Some(p);
            }
            None => out[idx].child = Some(ci),
        }
        previous = Some(ci);
    }
    idx
}

/// Lays out `root` and `dictionary` as an HFA file.
pub fn build(dictionary: &str, root: &Node, endianness: Endianness) -> Built {
    let mut flat = Vec::new();
    flatten(root, None, &mut flat);

    let entry_offset = |i: usize| ENTRY_BASE + ENTRY_LEN * i as u64;
    let mut data_offsets = Vec::with_capacity(flat.len());
    let mut cursor = entry_offset(flat.len());
    for node in &flat {
        if node.data.is_empty() {
            data_offsets.push(0);
        } else {
            data_offsets.push(cursor);
            cursor += node.data.len() as u64;
        }
    }
    let dictionary_offset = cursor;

    let mut w = Data::new(endianness);
    w.bytes(b"EHFA_HEADER_TAG\0");
    w.u32(HEADER_RECORD as u32);
    w.u32(1) // version
        .u32(0) // free list
        .u32(ENTRY_BASE as u32)
        .u16(ENTRY_LEN as u16)
        .u32(dictionary_offset as u32);
    w.pad_to(ENTRY_BASE as usize);

    let link = |i: Option<usize>| i.map(|i| entry_offset(i) as u32).unwrap_or(0);
    for (i, node) in flat.iter().enumerate() {
        w.u32(link(node.next))
            .u32(link(node.prev))
            .u32(link(node.parent))
            .u32(link(node.child))
            .u32(data_offsets[i] as u32)
            .u32(node.data.len() as u32)
            .fixed_str(&node.name, 64)
            .fixed_str(&node.type_name, 32)
            .u32(0);
        w.pad_to((entry_offset(i) + ENTRY_LEN) as usize);
    }
    for node in &flat {
        w.bytes(&node.data);
    }
    w.bytes(dictionary.as_bytes());
    w.bytes(&[0]);

    Built {
        bytes: w.finish(),
        entries: flat
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), entry_offset(i), data_offsets[i]))
            .collect(),
        endianness,
    }
}

/// Byte writer for data blocks, in the file's byte order.
pub struct Data {
    buf: Vec<u8>,
    endianness: Endianness,
}

impl Data {
    pub fn new(endianness: Endianness) -> Self {
        Self {
            buf: Vec::new(),
            endianness,
        }
    }

    pub fn be() -> Self {
        Self::new(Endianness::Big)
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        match self.endianness {
            Endianness::Big => self.bytes(&v.to_be_bytes()),
            Endianness::Little => self.bytes(&v.to_le_bytes()),
        }
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        match self.endianness {
            Endianness::Big => self.bytes(&v.to_be_bytes()),
            Endianness::Little => self.bytes(&v.to_le_bytes()),
        }
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.u32(v as u32)
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        match self.endianness {
            Endianness::Big => self.bytes(&v.to_be_bytes()),
            Endianness::Little => self.bytes(&v.to_le_bytes()),
        }
    }

    /// Variable-length prefix: item count and a non-null item pointer.
    pub fn pointer(&mut self, count: u32) -> &mut Self {
        self.u32(count).u32(if count == 0 { 0 } else { 1 })
    }

    /// A `0:pc` string field, NUL included.
    pub fn string(&mut self, s: &str) -> &mut Self {
        self.pointer(s.len() as u32 + 1).bytes(s.as_bytes()).bytes(&[0])
    }

    pub fn fixed_str(&mut self, s: &str, width: usize) -> &mut Self {
        let mut field = vec![0u8; width];
        field[..s.len()].copy_from_slice(s.as_bytes());
        self.bytes(&field)
    }

    pub fn coordinate(&mut self, x: f64, y: f64) -> &mut Self {
        self.f64(x).f64(y)
    }

    pub fn pad_to(&mut self, len: usize) -> &mut Self {
        self.buf.resize(len, 0);
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

pub fn rectangle(cx: f64, cy: f64, width: f64, height: f64, orientation: f64) -> Vec<u8> {
    Data::be()
        .coordinate(cx, cy)
        .f64(width)
        .f64(height)
        .f64(orientation)
        .finish()
}

/// `Element_2_Eant` data; `xform` is `(matrix, vector)` of a first-order polynomial.
pub fn element(name: &str, element_type: u32, xform: Option<([f64; 4], [f64; 2])>) -> Vec<u8> {
    let mut d = Data::be();
    d.string(name).string("").u32(element_type);
    match xform {
        Some((matrix, vector)) => {
            d.pointer(1).u32(1).pointer(4);
            for m in matrix {
                d.f64(m);
            }
            d.pointer(2);
            for v in vector {
                d.f64(v);
            }
        }
        None => {
            d.pointer(0);
        }
    }
    d.finish()
}

pub fn polyline(points: &[(f64, f64)]) -> Vec<u8> {
    let mut d = Data::be();
    d.pointer(points.len() as u32);
    for &(x, y) in points {
        d.coordinate(x, y);
    }
    d.finish()
}

pub fn text(x: f64, y: f64, s: &str) -> Vec<u8> {
    Data::be().coordinate(x, y).string(s).finish()
}

pub fn map_info() -> Vec<u8> {
    Data::be()
        .string("UTM")
        .pointer(1)
        .coordinate(500_000.0, 4_000_000.0)
        .pointer(1)
        .coordinate(500_100.0, 3_999_900.0)
        .pointer(1)
        .f64(10.0)
        .f64(10.0)
        .string("meters")
        .finish()
}

pub fn projection(zone: u32, south: bool) -> Vec<u8> {
    let mut d = Data::be();
    d.u16(0)
        .u32(1)
        .string("")
        .string("UTM")
        .u32(zone)
        .pointer(4)
        .f64(0.0)
        .f64(0.0)
        .f64(0.0)
        .f64(if south { -1.0 } else { 0.0 })
        .pointer(1)
        .string("WGS 84")
        .f64(6_378_137.0)
        .f64(6_356_752.314)
        .f64(0.006_694_38)
        .f64(6_378_137.0);
    d.finish()
}

pub fn datum(name: &str) -> Vec<u8> {
    Data::be().string(name).finish()
}

/// The standard annotation overlay:
///
/// ```text
/// root
/// ├─ Map_Info     Eprj_MapInfo
/// ├─ Projection   Eprj_ProParameters
/// ├─ Datum        Eprj_Datum
/// ├─ Element_1    Element_2_Eant "parcel"
/// │  └─ Rectangle Rectangle2 (10,20) 4x2
/// ├─ Element_2    Element_2_Eant "road", shifted by (100, 200)
/// │  └─ Line      Eant_Polyline
/// └─ Label        Text2 "Main St"
/// ```
pub fn overlay() -> Node {
    Node::new("root", "root", Vec::new()).with_children(vec![
        Node::new("Map_Info", "Eprj_MapInfo", map_info()),
        Node::new("Projection", "Eprj_ProParameters", projection(48, false)),
        Node::new("Datum", "Eprj_Datum", datum("WGS84")),
        Node::new("Element_1", "Element_2_Eant", element("parcel", 3, None)).with_children(vec![
            Node::new("Rectangle", "Rectangle2", rectangle(10.0, 20.0, 4.0, 2.0, 0.0)),
        ]),
        Node::new(
            "Element_2",
            "Element_2_Eant",
            element("road", 5, Some(([1.0, 0.0, 0.0, 1.0], [100.0, 200.0]))),
        )
        .with_children(vec![Node::new(
            "Line",
            "Eant_Polyline",
            polyline(&[(0.0, 0.0), (5.0, 5.0), (10.0, 0.0)]),
        )]),
        Node::new("Label", "Text2", text(3.0, 4.0, "Main St")),
    ])
}

/// Pre-order names of [`overlay`].
pub const OVERLAY_ORDER: &[(&str, usize)] = &[
    ("root", 0),
    ("Map_Info", 1),
    ("Projection", 1),
    ("Datum", 1),
    ("Element_1", 1),
    ("Rectangle", 2),
    ("Element_2", 1),
    ("Line", 2),
    ("Label", 1),
];

pub fn overlay_file() -> Built {
    build(DICTIONARY, &overlay(), Endianness::Big)
}
