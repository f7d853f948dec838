//! # Dictionary-Driven Record Decoding
//!
//! Turns the raw bytes of an entry's data block into a [`Record`], using the
//! field list of the entry's type in the [`TypeDictionary`].
//!
//! ## Field encodings
//! - Fixed-count numeric fields: `count` consecutive items. A single item is
//!   stored as a scalar, more as an array; character runs become text.
//! - Pointer fields (`p`/`*`) and count-0 fields: a `u32` item count and a
//!   `u32` offset, followed by the items inline. A zero count or null offset
//!   decodes to [`Value::Absent`] and consumes only the 8-byte prefix.
//! - `o`/`x`: nested records, decoded recursively.
//! - `e`: a `u16` index into the field's literal list.
//! - `b`: BASEDATA, a `rows x cols` table with an item type code.
//!
//! Decoding never reads outside the supplied slice; running out of bytes is a
//! [`HfaError::RecordOverrun`].

use encoding_rs::Encoding;
use log::trace;

use crate::hfa::format::dictionary::{ElementKind, FieldSpec, TypeDictionary};
use crate::hfa::types::error::{HfaError, Result};
use crate::hfa::types::models::Endianness;
use crate::hfa::types::value::{BaseData, BaseItemType, Record, Value};
use crate::hfa::utils;

/// Deepest type nesting followed before a type is considered self-referencing.
pub const MAX_NESTING: usize = 32;

/// Size of the count + offset prefix of a variable-length field.
const POINTER_PREFIX_LEN: usize = 8;

/// Size of the BASEDATA header: rows, cols, item type, object type.
const BASEDATA_HEADER_LEN: usize = 12;

/// Decodes records against a dictionary.
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder<'a> {
    dictionary: &'a TypeDictionary,
    endianness: Endianness,
    encoding: &'static Encoding,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(
        dictionary: &'a TypeDictionary,
        endianness: Endianness,
        encoding: &'static Encoding,
    ) -> Self {
        Self {
            dictionary,
            endianness,
            encoding,
        }
    }

    /// Decodes `bytes` as an instance of `type_name`.
    ///
    /// `base_offset` is the file offset of `bytes[0]` and is only used for
    /// error reporting. Trailing bytes not covered by the type are ignored.
    pub fn decode(&self, type_name: &str, bytes: &[u8], base_offset: u64) -> Result<Record> {
        let mut reader = FieldReader::new(bytes, base_offset, self.endianness);
        let record = self.decode_type(type_name, &mut reader, 0)?;
        trace!(
            "Decoded {} at {:#x}: {} of {} bytes used",
            type_name,
            base_offset,
            reader.pos,
            bytes.len()
        );
        Ok(record)
    }

    fn decode_type(&self, type_name: &str, reader: &mut FieldReader, depth: usize) -> Result<Record> {
        if depth > MAX_NESTING {
            return Err(HfaError::NestingTooDeep {
                offset: reader.offset(),
                name: type_name.to_string(),
            });
        }
        let def = self
            .dictionary
            .get(type_name)
            .ok_or_else(|| HfaError::UnknownType {
                offset: reader.offset(),
                name: type_name.to_string(),
            })?;

        let mut record = Record::new(type_name);
        for field in &def.fields {
            let value = self.decode_field(field, reader, depth)?;
            trace!("  {}.{} = {}", type_name, field.name, value);
            record.push(field.name.clone(), value);
        }
        Ok(record)
    }

    fn decode_field(&self, field: &FieldSpec, reader: &mut FieldReader, depth: usize) -> Result<Value> {
        let count = if field.is_variable() {
            reader.require(POINTER_PREFIX_LEN)?;
            let count = reader.u32()? as usize;
            let pointer = reader.u32()?;
            if count == 0 || pointer == 0 {
                return Ok(Value::Absent);
            }
            count
        } else {
            field.count as usize
        };
        self.check_count(field, count, reader)?;
        // `1:*o...` style pointers to a single item decode like plain fields.
        let single = count == 1 && field.count == 1;

        let value = match field.kind {
            ElementKind::Char | ElementKind::UChar => {
                let bytes = reader.take(count)?;
                if single && !field.is_variable() {
                    match field.kind {
                        ElementKind::Char => Value::Integer(bytes[0] as i8 as i64),
                        _ => Value::Integer(bytes[0] as i64),
                    }
                } else {
                    Value::Text(utils::decode_text(bytes, self.encoding))
                }
            }
            ElementKind::Bit1 | ElementKind::Bit2 | ElementKind::Bit4 => {
                let bits = field.kind.packed_bits().unwrap_or(1);
                let bytes = reader.take(count.saturating_mul(bits).div_ceil(8))?;
                collapse(unpack_bits(bytes, bits, count), single)
            }
            ElementKind::Enum => {
                let items = (0..count)
                    .map(|_| self.decode_enum(field, reader))
                    .collect::<Result<Vec<_>>>()?;
                collapse(items, single)
            }
            ElementKind::Object | ElementKind::Inline => {
                let type_name = field.type_name.as_deref().ok_or_else(|| HfaError::UnknownType {
                    offset: reader.offset(),
                    name: String::new(),
                })?;
                let items = (0..count)
                    .map(|_| {
                        self.decode_type(type_name, reader, depth + 1)
                            .map(Value::Record)
                    })
                    .collect::<Result<Vec<_>>>()?;
                collapse(items, single)
            }
            ElementKind::BaseData => {
                let items = (0..count)
                    .map(|_| self.decode_basedata(reader).map(Value::BaseData))
                    .collect::<Result<Vec<_>>>()?;
                collapse(items, single)
            }
            kind => {
                let items = (0..count)
                    .map(|_| read_scalar(kind, reader))
                    .collect::<Result<Vec<_>>>()?;
                collapse(items, single)
            }
        };
        Ok(value)
    }

    /// Fails before decoding when `count` items cannot fit in the bytes left.
    ///
    /// Zero-size items are charged one byte each past the first.
    fn check_count(&self, field: &FieldSpec, count: usize, reader: &FieldReader) -> Result<()> {
        let needed = match field.kind.packed_bits() {
            Some(bits) => count.saturating_mul(bits).div_ceil(8),
            None => {
                let item_len = self.min_item_len(field);
                if item_len == 0 && count <= 1 {
                    return Ok(());
                }
                count.saturating_mul(item_len.max(1))
            }
        };
        reader.require(needed)
    }

    /// Smallest number of bytes one item of `field` can occupy.
    fn min_item_len(&self, field: &FieldSpec) -> usize {
        match field.kind {
            ElementKind::BaseData => BASEDATA_HEADER_LEN,
            ElementKind::Object | ElementKind::Inline => field
                .type_name
                .as_deref()
                .and_then(|name| self.dictionary.get(name))
                .and_then(|def| def.fixed_size(self.dictionary))
                .unwrap_or(1),
            kind => kind.item_size().unwrap_or(1),
        }
    }

    fn decode_enum(&self, field: &FieldSpec, reader: &mut FieldReader) -> Result<Value> {
        let offset = reader.offset();
        let index = reader.u16()?;
        let name = field
            .enum_values
            .get(index as usize)
            .ok_or(HfaError::EnumRange {
                offset,
                index,
                count: field.enum_values.len(),
            })?;
        Ok(Value::Enum {
            index,
            name: name.clone(),
        })
    }

    fn decode_basedata(&self, reader: &mut FieldReader) -> Result<BaseData> {
        let offset = reader.offset();
        reader.require(BASEDATA_HEADER_LEN)?;
        let rows = reader.i32()?;
        let cols = reader.i32()?;
        let item_code = reader.i16()?;
        let object_type = reader.i16()?;

        let item_type = BaseItemType::try_from(item_code).map_err(|_| HfaError::EnumRange {
            offset: offset + 8,
            index: item_code as u16,
            count: 13,
        })?;
        if rows < 0 || cols < 0 {
            return Err(HfaError::RecordOverrun {
                offset,
                needed: BASEDATA_HEADER_LEN as u64,
                available: reader.remaining() as u64,
            });
        }
        let (rows, cols) = (rows as usize, cols as usize);
        let cells = rows.checked_mul(cols).ok_or(HfaError::RecordOverrun {
            offset,
            needed: u64::MAX,
            available: reader.remaining() as u64,
        })?;

        let values = match item_type {
            BaseItemType::U1 | BaseItemType::U2 | BaseItemType::U4 => {
                let bits = item_type.bits();
                let bytes = reader.take(cells.saturating_mul(bits).div_ceil(8))?;
                unpack_bits(bytes, bits, cells)
                    .iter()
                    .filter_map(Value::as_f64)
                    .collect()
            }
            BaseItemType::U8 => read_cells(reader, cells, 1, |r| Ok(r.take(1)?[0] as f64))?,
            BaseItemType::S8 => read_cells(reader, cells, 1, |r| Ok(r.take(1)?[0] as i8 as f64))?,
            BaseItemType::U16 => read_cells(reader, cells, 2, |r| Ok(r.u16()? as f64))?,
            BaseItemType::S16 => read_cells(reader, cells, 2, |r| Ok(r.i16()? as f64))?,
            BaseItemType::U32 => read_cells(reader, cells, 4, |r| Ok(r.u32()? as f64))?,
            BaseItemType::S32 => read_cells(reader, cells, 4, |r| Ok(r.i32()? as f64))?,
            BaseItemType::F32 => read_cells(reader, cells, 4, |r| Ok(r.f32()? as f64))?,
            BaseItemType::F64 => read_cells(reader, cells, 8, |r| r.f64())?,
            // Real and imaginary parts are stored as consecutive values.
            BaseItemType::C64 => read_cells(reader, cells.saturating_mul(2), 4, |r| Ok(r.f32()? as f64))?,
            BaseItemType::C128 => read_cells(reader, cells.saturating_mul(2), 8, |r| r.f64())?,
        };

        Ok(BaseData {
            rows,
            cols,
            item_type,
            object_type,
            values,
        })
    }
}

fn read_scalar(kind: ElementKind, reader: &mut FieldReader) -> Result<Value> {
    Ok(match kind {
        ElementKind::U16 => Value::Integer(reader.u16()? as i64),
        ElementKind::I16 => Value::Integer(reader.i16()? as i64),
        ElementKind::U32 | ElementKind::Time => Value::Integer(reader.u32()? as i64),
        ElementKind::I32 => Value::Integer(reader.i32()? as i64),
        ElementKind::F32 => Value::Float(reader.f32()? as f64),
        ElementKind::F64 => Value::Float(reader.f64()?),
        ElementKind::Complex32 => {
            let re = reader.f32()? as f64;
            let im = reader.f32()? as f64;
            Value::Array(vec![Value::Float(re), Value::Float(im)])
        }
        ElementKind::Complex64 => {
            let re = reader.f64()?;
            let im = reader.f64()?;
            Value::Array(vec![Value::Float(re), Value::Float(im)])
        }
        other => unreachable!("{:?} is not a scalar kind", other),
    })
}

/// Reads `count` cells of `width` bytes, checking the whole run up front.
fn read_cells(
    reader: &mut FieldReader,
    count: usize,
    width: usize,
    mut read: impl FnMut(&mut FieldReader) -> Result<f64>,
) -> Result<Vec<f64>> {
    reader.require(count.saturating_mul(width))?;
    (0..count).map(|_| read(reader)).collect()
}

fn collapse(mut items: Vec<Value>, single: bool) -> Value {
    if single && items.len() == 1 {
        items.remove(0)
    } else {
        Value::Array(items)
    }
}

/// Unpacks `count` values of `bits` width, least significant bits first.
fn unpack_bits(bytes: &[u8], bits: usize, count: usize) -> Vec<Value> {
    let per_byte = 8 / bits;
    let mask = (1u16 << bits) as u8 - 1;
    (0..count)
        .map(|i| {
            let byte = bytes[i / per_byte];
            let shift = (i % per_byte) * bits;
            Value::Integer(((byte >> shift) & mask) as i64)
        })
        .collect()
}

/// Bounded reader over a record's bytes.
struct FieldReader<'b> {
    data: &'b [u8],
    pos: usize,
    base: u64,
    endianness: Endianness,
}

impl<'b> FieldReader<'b> {
    fn new(data: &'b [u8], base: u64, endianness: Endianness) -> Self {
        Self {
            data,
            pos: 0,
            base,
            endianness,
        }
    }

    fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn require(&self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(HfaError::RecordOverrun {
                offset: self.offset(),
                needed: n as u64,
                available: self.remaining() as u64,
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'b [u8]> {
        self.require(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(self.endianness.read_u16(self.take(2)?))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(self.endianness.read_i16(self.take(2)?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(self.endianness.read_u32(self.take(4)?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(self.endianness.read_i32(self.take(4)?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(self.endianness.read_f32(self.take(4)?))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(self.endianness.read_f64(self.take(8)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    fn decoder(dict: &TypeDictionary) -> RecordDecoder<'_> {
        RecordDecoder::new(dict, Endianness::Big, WINDOWS_1252)
    }

    #[test]
    fn header_record_from_two_words() {
        let dict = TypeDictionary::parse("{1:lversion,1:LfreeList,}Ehfa_File,.").unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&(-7i32).to_be_bytes());

        let record = decoder(&dict).decode("Ehfa_File", &bytes, 0x20).unwrap();
        assert_eq!(record.field("version"), Some(&Value::Integer(3)));
        assert_eq!(record.field("freeList"), Some(&Value::Integer(-7)));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn one_byte_short_is_an_overrun() {
        let dict = TypeDictionary::parse("{1:lversion,1:LfreeList,}Ehfa_File,.").unwrap();
        let bytes = [0u8; 7];
        match decoder(&dict).decode("Ehfa_File", &bytes, 0x100) {
            Err(HfaError::RecordOverrun { offset, needed, available }) => {
                assert_eq!(offset, 0x104);
                assert_eq!(needed, 4);
                assert_eq!(available, 3);
            }
            other => panic!("expected overrun, got {:?}", other),
        }
    }

    #[test]
    fn unknown_type_is_reported() {
        let dict = TypeDictionary::parse("{1:oMissing,inner,}Outer,.").unwrap();
        let err = decoder(&dict).decode("Outer", &[0; 16], 0x40).unwrap_err();
        assert!(matches!(err, HfaError::UnknownType { ref name, offset: 0x40 } if name == "Missing"));
        assert!(matches!(
            decoder(&dict).decode("Nope", &[], 0),
            Err(HfaError::UnknownType { .. })
        ));
    }

    #[test]
    fn pointer_strings_and_absent_pointers() {
        let dict = TypeDictionary::parse("{0:pcname,0:pcdescription,1:lid,}Element,.").unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&5u32.to_be_bytes());
        bytes.extend_from_slice(&0x200u32.to_be_bytes());
        bytes.extend_from_slice(b"road\0");
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&9u32.to_be_bytes());

        let record = decoder(&dict).decode("Element", &bytes, 0x1F8).unwrap();
        assert_eq!(record.get_string("name").as_deref(), Some("road"));
        assert_eq!(record.field("description"), Some(&Value::Absent));
        assert_eq!(record.get_i64("id"), Some(9));
    }

    #[test]
    fn enum_index_out_of_range() {
        let dict = TypeDictionary::parse("{1:e2:EPRJ_INTERNAL,EPRJ_EXTERNAL,proType,}P,.").unwrap();
        let ok = decoder(&dict).decode("P", &1u16.to_be_bytes(), 0).unwrap();
        assert_eq!(ok.get_string("proType").as_deref(), Some("EPRJ_EXTERNAL"));

        let err = decoder(&dict).decode("P", &2u16.to_be_bytes(), 0x30).unwrap_err();
        assert!(matches!(
            err,
            HfaError::EnumRange { offset: 0x30, index: 2, count: 2 }
        ));
    }

    #[test]
    fn nested_inline_objects_and_arrays() {
        let dict = TypeDictionary::parse(
            "{1:x{1:dx,1:dy,}Eprj_Coordinate,center,3:dparams,8:cname,}Thing,.",
        )
        .unwrap();
        let mut bytes = Vec::new();
        for v in [1.0f64, 2.0, 10.0, 20.0, 30.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend_from_slice(b"abc\0\0\0\0\0");

        let record = decoder(&dict).decode("Thing", &bytes, 0).unwrap();
        assert_eq!(record.get_f64("center.x"), Some(1.0));
        assert_eq!(record.get_f64("center.y"), Some(2.0));
        assert_eq!(record.get_f64("params[2]"), Some(30.0));
        assert_eq!(record.get_string("name").as_deref(), Some("abc"));
    }

    #[test]
    fn basedata_tables() {
        let dict = TypeDictionary::parse("{1:bcoefs,}Poly,.").unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2i32.to_be_bytes());
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&10i16.to_be_bytes());
        bytes.extend_from_slice(&0i16.to_be_bytes());
        bytes.extend_from_slice(&0.5f64.to_be_bytes());
        bytes.extend_from_slice(&(-4.0f64).to_be_bytes());

        let record = decoder(&dict).decode("Poly", &bytes, 0).unwrap();
        match record.field("coefs") {
            Some(Value::BaseData(table)) => {
                assert_eq!((table.rows, table.cols), (2, 1));
                assert_eq!(table.item_type, BaseItemType::F64);
                assert_eq!(table.get(1, 0), Some(-4.0));
            }
            other => panic!("expected basedata, got {:?}", other),
        }

        // Declared cells beyond the data block.
        let err = decoder(&dict).decode("Poly", &bytes[..bytes.len() - 1], 0).unwrap_err();
        assert!(matches!(err, HfaError::RecordOverrun { .. }));
    }

    #[test]
    fn packed_bits() {
        let dict = TypeDictionary::parse("{6:2flags,}Bits,.").unwrap();
        let record = decoder(&dict).decode("Bits", &[0b1110_0100, 0b0000_0011], 0).unwrap();
        let expected: Vec<Value> = [0, 1, 2, 3, 3, 0].iter().map(|&v| Value::Integer(v)).collect();
        assert_eq!(record.field("flags"), Some(&Value::Array(expected)));
    }

    #[test]
    fn self_referencing_type_is_bounded() {
        let dict = TypeDictionary::parse("{1:oLoop,again,}Loop,.").unwrap();
        let err = decoder(&dict).decode("Loop", &[0; 64], 0).unwrap_err();
        assert!(matches!(err, HfaError::NestingTooDeep { .. }));
    }

    #[test]
    fn zero_size_items_cannot_outnumber_the_block() {
        let dict = TypeDictionary::parse("{}Empty,{0:poEmpty,items,}Holder,.").unwrap();
        for count in [0x0400_0000u32, u32::MAX] {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&count.to_be_bytes());
            bytes.extend_from_slice(&1u32.to_be_bytes());
            match decoder(&dict).decode("Holder", &bytes, 0x80) {
                Err(HfaError::RecordOverrun { offset, needed, available }) => {
                    assert_eq!(offset, 0x88);
                    assert_eq!(needed, count as u64);
                    assert_eq!(available, 0);
                }
                other => panic!("expected overrun, got {:?}", other),
            }
        }

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        let record = decoder(&dict).decode("Holder", &bytes, 0).unwrap();
        assert_eq!(
            record.field("items"),
            Some(&Value::Array(vec![Value::Record(Record::new("Empty"))]))
        );
    }

    #[test]
    fn huge_counts_on_short_blocks_are_overruns() {
        let dict = TypeDictionary::parse(
            "{0:pdvalues,}Coefs,{0:pcname,}Label,{0:poPair,pairs,}Pairs,{1:dx,1:dy,}Pair,.",
        )
        .unwrap();
        let prefix = |count: u32| {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&count.to_be_bytes());
            bytes.extend_from_slice(&1u32.to_be_bytes());
            bytes
        };

        let err = decoder(&dict).decode("Coefs", &prefix(u32::MAX), 0).unwrap_err();
        assert!(matches!(
            err,
            HfaError::RecordOverrun { offset: 8, available: 0, .. }
        ));

        let err = decoder(&dict).decode("Label", &prefix(u32::MAX), 0).unwrap_err();
        assert!(matches!(err, HfaError::RecordOverrun { available: 0, .. }));

        let mut bytes = prefix(1000);
        bytes.extend_from_slice(&[0; 16]);
        match decoder(&dict).decode("Pairs", &bytes, 0) {
            Err(HfaError::RecordOverrun { offset, needed, available }) => {
                assert_eq!(offset, 8);
                assert_eq!(needed, 16_000);
                assert_eq!(available, 16);
            }
            other => panic!("expected overrun, got {:?}", other),
        }
    }

    #[test]
    fn little_endian_records() {
        let dict = TypeDictionary::parse("{1:Sa,1:db,}LE,.").unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-3i16).to_le_bytes());
        bytes.extend_from_slice(&6.5f64.to_le_bytes());
        let record = RecordDecoder::new(&dict, Endianness::Little, WINDOWS_1252)
            .decode("LE", &bytes, 0)
            .unwrap();
        assert_eq!(record.get_i64("a"), Some(-3));
        assert_eq!(record.get_f64("b"), Some(6.5));
    }
}
