//! MIF type dictionary parsing.
//!
//! Every HFA file embeds a textual schema describing the layout of each data
//! type used by its entries:
//!
//! ```text
//! {1:lversion,1:lfreeList,1:lrootEntryPtr,1:sentryHeaderLength,1:ldictionaryPtr,}Ehfa_File,
//! {1:x{1:dx,1:dy,}Eprj_Coordinate,center,1:dwidth,1:dheight,1:dorientation,}Rectangle2,
//! .
//! ```
//!
//! A field is `count ':' [p|*] kind [extra] name ','`. Enum kinds (`e`) carry
//! their literal list, object kinds (`o`) name another type and inline kinds
//! (`x`) define one in place. Type names are stored in a name-indexed map and
//! only resolved when a record is decoded, so a type may reference one that is
//! defined later in the dictionary.

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Seek};

use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, trace, warn};

use crate::hfa::cursor::ByteCursor;
use crate::hfa::types::error::{HfaError, Result};
use crate::hfa::utils;

const FRAGMENT_LEN: usize = 40;

/// Storage kind of a dictionary field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `1`: packed 1-bit values
    Bit1,
    /// `2`: packed 2-bit values
    Bit2,
    /// `4`: packed 4-bit values
    Bit4,
    /// `c`: 8-bit character
    Char,
    /// `C`: unsigned 8-bit character
    UChar,
    /// `e`: enumeration stored as an unsigned 16-bit index
    Enum,
    /// `s`: unsigned 16-bit integer
    U16,
    /// `S`: signed 16-bit integer
    I16,
    /// `t`: 32-bit time value
    Time,
    /// `l`: unsigned 32-bit integer
    U32,
    /// `L`: signed 32-bit integer
    I32,
    /// `f`: 32-bit float
    F32,
    /// `d`: 64-bit float
    F64,
    /// `m`: complex of two 32-bit floats
    Complex32,
    /// `M`: complex of two 64-bit floats
    Complex64,
    /// `b`: BASEDATA table
    BaseData,
    /// `o`: object of a named type
    Object,
    /// `x`: object of a type defined inline
    Inline,
}

impl ElementKind {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            b'1' => ElementKind::Bit1,
            b'2' => ElementKind::Bit2,
            b'4' => ElementKind::Bit4,
            b'c' => ElementKind::Char,
            b'C' => ElementKind::UChar,
            b'e' => ElementKind::Enum,
            b's' => ElementKind::U16,
            b'S' => ElementKind::I16,
            b't' => ElementKind::Time,
            b'l' => ElementKind::U32,
            b'L' => ElementKind::I32,
            b'f' => ElementKind::F32,
            b'd' => ElementKind::F64,
            b'm' => ElementKind::Complex32,
            b'M' => ElementKind::Complex64,
            b'b' => ElementKind::BaseData,
            b'o' => ElementKind::Object,
            b'x' => ElementKind::Inline,
            _ => return None,
        })
    }

    pub fn code(self) -> char {
        match self {
            ElementKind::Bit1 => '1',
            ElementKind::Bit2 => '2',
            ElementKind::Bit4 => '4',
            ElementKind::Char => 'c',
            ElementKind::UChar => 'C',
            ElementKind::Enum => 'e',
            ElementKind::U16 => 's',
            ElementKind::I16 => 'S',
            ElementKind::Time => 't',
            ElementKind::U32 => 'l',
            ElementKind::I32 => 'L',
            ElementKind::F32 => 'f',
            ElementKind::F64 => 'd',
            ElementKind::Complex32 => 'm',
            ElementKind::Complex64 => 'M',
            ElementKind::BaseData => 'b',
            ElementKind::Object => 'o',
            ElementKind::Inline => 'x',
        }
    }

    /// Bytes used by one item, for kinds with a fixed width.
    ///
    /// Bit kinds, BASEDATA and objects return `None`.
    pub fn item_size(self) -> Option<usize> {
        match self {
            ElementKind::Char | ElementKind::UChar => Some(1),
            ElementKind::Enum | ElementKind::U16 | ElementKind::I16 => Some(2),
            ElementKind::Time | ElementKind::U32 | ElementKind::I32 | ElementKind::F32 => Some(4),
            ElementKind::F64 | ElementKind::Complex32 => Some(8),
            ElementKind::Complex64 => Some(16),
            _ => None,
        }
    }

    /// Bits per item for the packed kinds.
    pub fn packed_bits(self) -> Option<usize> {
        match self {
            ElementKind::Bit1 => Some(1),
            ElementKind::Bit2 => Some(2),
            ElementKind::Bit4 => Some(4),
            _ => None,
        }
    }

    pub fn is_object(self) -> bool {
        matches!(self, ElementKind::Object | ElementKind::Inline)
    }
}

/// Indirection marker preceding the kind code.
///
/// Both forms are stored on disk as a `u32` count and a `u32` offset followed
/// by the items themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indirection {
    /// `p`
    Pointer,
    /// `*`
    Star,
}

impl Indirection {
    pub fn code(self) -> char {
        match self {
            Indirection::Pointer => 'p',
            Indirection::Star => '*',
        }
    }
}

/// One field of a dictionary type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Declared item count; 0 denotes a variable-length field.
    pub count: u32,
    pub indirection: Option<Indirection>,
    pub kind: ElementKind,
    pub name: String,
    /// Referenced type for `o` and `x` fields.
    pub type_name: Option<String>,
    /// Literal values of an `e` field, indexed by the stored value.
    pub enum_values: Vec<String>,
}

impl FieldSpec {
    /// A plain field: `count:kind name`.
    pub fn new(count: u32, kind: ElementKind, name: impl Into<String>) -> Self {
        Self {
            count,
            indirection: None,
            kind,
            name: name.into(),
            type_name: None,
            enum_values: Vec::new(),
        }
    }

    /// An object field referencing `type_name`.
    pub fn object(count: u32, type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::new(count, ElementKind::Object, name)
        }
    }

    /// An enum field with its literal list.
    pub fn enumeration<S: Into<String>>(
        count: u32,
        values: impl IntoIterator<Item = S>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            enum_values: values.into_iter().map(Into::into).collect(),
            ..Self::new(count, ElementKind::Enum, name)
        }
    }

    pub fn with_indirection(mut self, indirection: Indirection) -> Self {
        self.indirection = Some(indirection);
        self
    }

    /// True when the data carries its own item count (pointer or count 0).
    pub fn is_variable(&self) -> bool {
        self.indirection.is_some() || self.count == 0
    }
}

/// A named type: an ordered list of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Size in bytes of an instance, if every field has a fixed width.
    pub fn fixed_size(&self, dictionary: &TypeDictionary) -> Option<usize> {
        self.fixed_size_at(dictionary, 0)
    }

    fn fixed_size_at(&self, dictionary: &TypeDictionary, depth: usize) -> Option<usize> {
        if depth > crate::hfa::format::record::MAX_NESTING {
            return None;
        }
        self.fields.iter().try_fold(0usize, |total, field| {
            if field.is_variable() {
                return None;
            }
            let count = field.count as usize;
            let size = match field.kind {
                ElementKind::Object | ElementKind::Inline => {
                    let nested = dictionary.get(field.type_name.as_deref()?)?;
                    nested.fixed_size_at(dictionary, depth + 1)? * count
                }
                ElementKind::BaseData => return None,
                kind => match kind.packed_bits() {
                    Some(bits) => (count * bits).div_ceil(8),
                    None => kind.item_size()? * count,
                },
            };
            Some(total + size)
        })
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        for field in &self.fields {
            let pointer = field.indirection.map(|p| p.code().to_string()).unwrap_or_default();
            write!(f, "    {}:{}{} {}", field.count, pointer, field.kind.code(), field.name)?;
            if let Some(type_name) = &field.type_name {
                write!(f, " ({})", type_name)?;
            }
            if !field.enum_values.is_empty() {
                write!(f, " [{}]", field.enum_values.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The parsed dictionary: type name to field layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeDictionary {
    types: HashMap<String, TypeDef>,
    /// Top-level type names in definition order.
    order: Vec<String>,
}

impl TypeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dictionary from top-level type definitions.
    pub fn from_types(types: impl IntoIterator<Item = TypeDef>) -> Self {
        let mut dictionary = Self::new();
        for def in types {
            dictionary.insert(def);
        }
        dictionary
    }

    /// Parses dictionary text; error offsets are relative to the text start.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_at(text, 0)
    }

    /// Parses dictionary text located at `base_offset` in the file.
    pub fn parse_at(text: &str, base_offset: u64) -> Result<Self> {
        Self::parse_bytes(text.as_bytes(), base_offset, UTF_8)
    }

    /// Parses raw dictionary bytes located at `base_offset` in the file.
    ///
    /// The grammar is ASCII; names and enum literals are decoded with
    /// `encoding`. Error offsets count on-disk bytes.
    pub fn parse_bytes(bytes: &[u8], base_offset: u64, encoding: &'static Encoding) -> Result<Self> {
        let mut dictionary = Self::new();
        let mut parser = Parser::new(bytes, base_offset, encoding);
        parser.parse_dictionary(&mut dictionary)?;
        debug!(
            "Parsed dictionary: {} top-level types, {} total",
            dictionary.order.len(),
            dictionary.types.len()
        );
        Ok(dictionary)
    }

    /// Adds or replaces a top-level type.
    pub fn insert(&mut self, def: TypeDef) {
        if self.types.contains_key(&def.name) {
            warn!("Type {:?} defined more than once; keeping the last definition", def.name);
            self.order.retain(|n| n != &def.name);
        }
        self.order.push(def.name.clone());
        self.types.insert(def.name.clone(), def);
    }

    /// Registers a type defined inside a field. Top-level definitions win.
    fn insert_inline(&mut self, def: TypeDef) {
        if !self.order.contains(&def.name) {
            self.types.insert(def.name.clone(), def);
        }
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of known types, inline ones included.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Top-level types in definition order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.order.iter().filter_map(|name| self.types.get(name))
    }

    /// `(type, field, missing type)` for every object field whose type is unknown.
    pub fn unresolved_references(&self) -> Vec<(String, String, String)> {
        let mut missing = Vec::new();
        let mut names: Vec<&String> = self.types.keys().collect();
        names.sort();
        for name in names {
            for field in &self.types[name].fields {
                if let Some(target) = &field.type_name {
                    if !self.types.contains_key(target) {
                        missing.push((name.clone(), field.name.clone(), target.clone()));
                    }
                }
            }
        }
        missing
    }

    /// Re-encodes the dictionary in the on-disk grammar, terminated by `.`.
    pub fn to_dictionary_string(&self) -> String {
        let mut out = String::new();
        for def in self.types() {
            self.write_typedef(&mut out, def);
        }
        out.push('.');
        out
    }

    fn write_typedef(&self, out: &mut String, def: &TypeDef) {
        out.push('{');
        for field in &def.fields {
            out.push_str(&field.count.to_string());
            out.push(':');
            if let Some(indirection) = field.indirection {
                out.push(indirection.code());
            }
            out.push(field.kind.code());
            match field.kind {
                ElementKind::Enum => {
                    out.push_str(&field.enum_values.len().to_string());
                    out.push(':');
                    for value in &field.enum_values {
                        out.push_str(value);
                        out.push(',');
                    }
                }
                ElementKind::Object => {
                    out.push_str(field.type_name.as_deref().unwrap_or_default());
                    out.push(',');
                }
                ElementKind::Inline => {
                    let inline = field.type_name.as_deref().and_then(|n| self.get(n));
                    match inline {
                        Some(inline) => self.write_typedef(out, inline),
                        None => out.push_str("{},"),
                    }
                }
                _ => {}
            }
            out.push_str(&field.name);
            out.push(',');
        }
        out.push('}');
        if !is_anonymous(&def.name) {
            out.push_str(&def.name);
        }
        out.push(',');
    }
}

impl fmt::Display for TypeDictionary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for def in self.types() {
            match def.fixed_size(self) {
                Some(size) => write!(f, "[{} bytes] ", size)?,
                None => write!(f, "[variable] ")?,
            }
            write!(f, "{}", def)?;
        }
        Ok(())
    }
}

fn anonymous_name(n: usize) -> String {
    format!("<inline {}>", n)
}

fn is_anonymous(name: &str) -> bool {
    name.starts_with("<inline ")
}

/// Reads and parses the dictionary string stored at `offset`.
///
/// The text runs to the first NUL (or the end of the file); parsing stops at
/// the top-level `.` terminator.
pub fn read<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    offset: u64,
    encoding: &'static Encoding,
) -> Result<TypeDictionary> {
    info!("Reading type dictionary at {:#x}", offset);
    cursor.seek(offset)?;
    let bytes = match cursor.read_until_nul() {
        Ok(bytes) => bytes,
        Err(HfaError::TruncatedFile { .. }) => {
            trace!("Dictionary is not NUL-terminated; reading to end of file");
            cursor.seek(offset)?;
            let remaining = (cursor.len() - offset) as usize;
            cursor.read_bytes(remaining)?
        }
        Err(e) => return Err(e),
    };
    trace!("Dictionary text: {} bytes", bytes.len());

    let dictionary = TypeDictionary::parse_bytes(&bytes, offset, encoding)?;
    for (type_name, field, target) in dictionary.unresolved_references() {
        debug!(
            "Field {}.{} references undefined type {:?}",
            type_name, field, target
        );
    }
    Ok(dictionary)
}

/// Single-pass parser over the raw dictionary bytes.
struct Parser<'a> {
    bytes: &'a [u8],
    encoding: &'static Encoding,
    pos: usize,
    base: u64,
    anonymous: usize,
}

impl<'a> Parser<'a> {
    fn new(bytes: &'a [u8], base: u64, encoding: &'static Encoding) -> Self {
        Self {
            bytes,
            encoding,
            pos: 0,
            base,
            anonymous: 0,
        }
    }

    fn error(&self, at: usize, reason: &'static str) -> HfaError {
        HfaError::DictionaryParse {
            offset: self.base + at as u64,
            reason,
            fragment: utils::fragment(self.bytes, at, FRAGMENT_LEN, self.encoding),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_dictionary(&mut self, dictionary: &mut TypeDictionary) -> Result<()> {
        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some(b'.') | Some(0) => return Ok(()),
                Some(b'{') => {
                    let def = self.parse_typedef(dictionary)?;
                    trace!("Type {} ({} fields)", def.name, def.fields.len());
                    dictionary.insert(def);
                }
                Some(_) => return Err(self.error(self.pos, "expected '{' or '.'")),
            }
        }
    }

    /// `'{' field* '}' name ','`
    fn parse_typedef(&mut self, dictionary: &mut TypeDictionary) -> Result<TypeDef> {
        let start = self.pos;
        if self.bump() != Some(b'{') {
            return Err(self.error(start, "expected '{'"));
        }
        let mut fields = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                None | Some(0) => return Err(self.error(start, "unbalanced '{'")),
                Some(_) => fields.push(self.parse_field(dictionary)?),
            }
        }
        let name = self.take_token(start, "unterminated type name")?;
        Ok(TypeDef { name, fields })
    }

    /// `count ':' [p|*] kind [extra] name ','`
    fn parse_field(&mut self, dictionary: &mut TypeDictionary) -> Result<FieldSpec> {
        let start = self.pos;
        let count = self.parse_count(start)?;

        let indirection = match self.peek() {
            Some(b'p') => Some(Indirection::Pointer),
            Some(b'*') => Some(Indirection::Star),
            _ => None,
        };
        if indirection.is_some() {
            self.pos += 1;
        }

        let code_at = self.pos;
        let code = self.bump().ok_or_else(|| self.error(start, "truncated field"))?;
        let kind = ElementKind::from_code(code)
            .ok_or_else(|| self.error(code_at, "unknown element kind"))?;

        let mut type_name = None;
        let mut enum_values = Vec::new();
        match kind {
            ElementKind::Enum => {
                let n = self.parse_count(code_at)?;
                for _ in 0..n {
                    enum_values.push(self.take_token(code_at, "unterminated enum value")?);
                }
            }
            ElementKind::Object => {
                let target = self.take_token(code_at, "unterminated object type name")?;
                if target.is_empty() {
                    return Err(self.error(code_at, "empty object type name"));
                }
                type_name = Some(target);
            }
            ElementKind::Inline => {
                if self.peek() != Some(b'{') {
                    return Err(self.error(code_at, "expected inline type definition"));
                }
                let mut def = self.parse_typedef(dictionary)?;
                if def.name.is_empty() {
                    self.anonymous += 1;
                    def.name = anonymous_name(self.anonymous);
                }
                type_name = Some(def.name.clone());
                dictionary.insert_inline(def);
            }
            _ => {}
        }

        let name = self.take_token(start, "unterminated field name")?;
        if name.is_empty() {
            return Err(self.error(start, "empty field name"));
        }
        Ok(FieldSpec {
            count,
            indirection,
            kind,
            name,
            type_name,
            enum_values,
        })
    }

    /// Decimal digits followed by ':'.
    fn parse_count(&mut self, field_start: usize) -> Result<u32> {
        let digits_start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(self.error(field_start, "expected item count"));
        }
        let count = utils::decode_text(&self.bytes[digits_start..self.pos], self.encoding)
            .parse::<u32>()
            .map_err(|_| self.error(field_start, "item count out of range"))?;
        if self.bump() != Some(b':') {
            return Err(self.error(field_start, "expected ':' after count"));
        }
        Ok(count)
    }

    /// Text up to the next ',' (consumed). Braces and the end of input are errors.
    fn take_token(&mut self, context_start: usize, reason: &'static str) -> Result<String> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b',') => {
                    let token = utils::decode_text(&self.bytes[start..self.pos], self.encoding);
                    self.pos += 1;
                    return Ok(token);
                }
                Some(b'{') | Some(b'}') | Some(0) | None => {
                    return Err(self.error(context_start, reason));
                }
                Some(_) => self.pos += 1,
            }
        }
    }
}
