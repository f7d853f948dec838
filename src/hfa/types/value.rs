//! Dynamically typed values produced by the record decoder.
//!
//! The shape of a decoded record depends on the dictionary found in the file,
//! so records are ordered lists of `(field name, Value)` pairs rather than
//! static structs. Nested fields can be reached with dotted paths and array
//! indices, e.g. `proSpheroid.a` or `proParams[3]`.

use std::fmt;

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A pointer field with a null offset or zero count.
    Absent,
    Integer(i64),
    Float(f64),
    Text(String),
    Enum { index: u16, name: String },
    Record(Record),
    Array(Vec<Value>),
    BaseData(BaseData),
}

impl Value {
    /// Numeric view of the value. Enums yield their index.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Enum { index, .. } => Some(*index as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Enum { index, .. } => Some(*index as i64),
            _ => None,
        }
    }

    /// Text view of the value. Enums yield their literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Enum { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Element `index` of an array, or cell `index` (row-major) of a BASEDATA table.
    pub fn index(&self, index: usize) -> Option<Value> {
        match self {
            Value::Array(items) => items.get(index).cloned(),
            Value::BaseData(table) => table.values.get(index).map(|v| Value::Float(*v)),
            _ => None,
        }
    }

    /// True for integers, floats, text and enums.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Integer(_) | Value::Float(_) | Value::Text(_) | Value::Enum { .. }
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "<absent>"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Enum { name, .. } => write!(f, "{}", name),
            Value::Record(r) => write!(f, "{}", r),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::BaseData(table) => write!(
                f,
                "<{}x{} {:?}>",
                table.rows, table.cols, table.item_type
            ),
        }
    }
}

/// Item type codes of a BASEDATA (`b`) table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseItemType {
    U1,
    U2,
    U4,
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    F32,
    F64,
    C64,
    C128,
}

impl BaseItemType {
    /// Bits used by one cell (complex types count both parts).
    pub fn bits(self) -> usize {
        match self {
            BaseItemType::U1 => 1,
            BaseItemType::U2 => 2,
            BaseItemType::U4 => 4,
            BaseItemType::U8 | BaseItemType::S8 => 8,
            BaseItemType::U16 | BaseItemType::S16 => 16,
            BaseItemType::U32 | BaseItemType::S32 | BaseItemType::F32 => 32,
            BaseItemType::F64 | BaseItemType::C64 => 64,
            BaseItemType::C128 => 128,
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(self, BaseItemType::C64 | BaseItemType::C128)
    }
}

impl TryFrom<i16> for BaseItemType {
    type Error = i16;
    fn try_from(code: i16) -> std::result::Result<Self, i16> {
        Ok(match code {
            0 => BaseItemType::U1,
            1 => BaseItemType::U2,
            2 => BaseItemType::U4,
            3 => BaseItemType::U8,
            4 => BaseItemType::S8,
            5 => BaseItemType::U16,
            6 => BaseItemType::S16,
            7 => BaseItemType::U32,
            8 => BaseItemType::S32,
            9 => BaseItemType::F32,
            10 => BaseItemType::F64,
            11 => BaseItemType::C64,
            12 => BaseItemType::C128,
            other => return Err(other),
        })
    }
}

/// A decoded BASEDATA table.
///
/// `values` is row-major; complex cells contribute their real and imaginary
/// parts as two consecutive values.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseData {
    pub rows: usize,
    pub cols: usize,
    pub item_type: BaseItemType,
    pub object_type: i16,
    pub values: Vec<f64>,
}

impl BaseData {
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols || self.item_type.is_complex() {
            return None;
        }
        self.values.get(row * self.cols + col).copied()
    }
}

/// An ordered, name-addressed set of decoded fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    type_name: String,
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push((name.into(), value));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Direct child field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Looks up a dotted path such as `upperLeftCenter.x` or `proParams[3]`.
    pub fn get(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = lookup_segment(self, first)?;
        for segment in segments {
            let record = match &current {
                Value::Record(r) => r,
                _ => return None,
            };
            current = lookup_segment(record, segment)?;
        }
        Some(current)
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(|v| v.as_f64())
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(|v| v.as_i64())
    }

    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path).and_then(|v| v.as_str().map(str::to_owned))
    }
}

/// Resolves one path segment: `name` or `name[index]`.
fn lookup_segment(record: &Record, segment: &str) -> Option<Value> {
    match segment.split_once('[') {
        Some((name, rest)) => {
            let index: usize = rest.strip_suffix(']')?.trim().parse().ok()?;
            record.field(name)?.index(index)
        }
        None => record.field(segment).cloned(),
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {{", self.type_name)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {}: {}", name, value)?;
        }
        write!(f, " }}")
    }
}
