//! AMQP field values, the building blocks of field tables and arrays.
//!
//! Every value is a one-byte type tag followed by the typed payload. The
//! tag letters for the 16/32/64-bit integers were not stable across
//! historical client implementations; the mapping below is the one this
//! crate is pinned to, in a single place, with both directions covered by
//! tests.
use std::collections::HashMap;
use std::io;

use bytes::{Buf, BufMut, BytesMut};

/// A field table maps short-string keys to typed field values.
pub type FieldTable = HashMap<String, AMQPFieldValue>;
/// A field array is an ordered list of typed field values.
pub type FieldArray = Vec<AMQPFieldValue>;

const TAG_BOOL: u8 = b't';
const TAG_INT8: u8 = b'b';
const TAG_UINT8: u8 = b'B';
const TAG_INT16: u8 = b'U';
const TAG_UINT16: u8 = b'u';
const TAG_INT32: u8 = b'I';
const TAG_UINT32: u8 = b'i';
const TAG_INT64: u8 = b'L';
const TAG_UINT64: u8 = b'l';
const TAG_FLOAT: u8 = b'f';
const TAG_DOUBLE: u8 = b'd';
const TAG_DECIMAL: u8 = b'D';
const TAG_SIMPLE_STRING: u8 = b's';
const TAG_LONG_STRING: u8 = b'S';
const TAG_TIMESTAMP: u8 = b'T';
const TAG_ARRAY: u8 = b'A';
const TAG_TABLE: u8 = b'F';
const TAG_VOID: u8 = b'V';

/// A typed AMQP field value as it appears in tables and arrays.
#[derive(Clone, Debug, PartialEq)]
pub enum AMQPFieldValue {
    Bool(bool),
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float(f32),
    Double(f64),
    /// Scale (number of decimal places) and mantissa.
    Decimal(u8, i32),
    SimpleString(String),
    LongString(String),
    /// Seconds since the epoch.
    Timestamp(u64),
    FieldArray(FieldArray),
    FieldTable(Box<FieldTable>),
    Void,
}

pub(crate) fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn ensure(buf: &BytesMut, needed: usize, what: &str) -> io::Result<()> {
    if buf.remaining() < needed {
        return Err(invalid_data(format!(
            "truncated {}: need {} bytes, {} available",
            what,
            needed,
            buf.remaining()
        )));
    }

    Ok(())
}

macro_rules! checked_decode {
    ($name:ident, $getter:ident, $ty:ty, $size:expr, $what:expr) => {
        pub(crate) fn $name(buf: &mut BytesMut) -> io::Result<$ty> {
            ensure(buf, $size, $what)?;
            Ok(buf.$getter())
        }
    };
}

checked_decode!(decode_u8, get_u8, u8, 1, "octet");
checked_decode!(decode_i8, get_i8, i8, 1, "octet");
checked_decode!(decode_u16, get_u16, u16, 2, "short");
checked_decode!(decode_i16, get_i16, i16, 2, "short");
checked_decode!(decode_u32, get_u32, u32, 4, "long");
checked_decode!(decode_i32, get_i32, i32, 4, "long");
checked_decode!(decode_u64, get_u64, u64, 8, "longlong");
checked_decode!(decode_i64, get_i64, i64, 8, "longlong");
checked_decode!(decode_f32, get_f32, f32, 4, "float");
checked_decode!(decode_f64, get_f64, f64, 8, "double");

pub(crate) fn encode_short_string(buf: &mut BytesMut, s: &str) {
    debug_assert!(s.len() < 256);

    buf.put_u8(s.len() as u8);
    buf.put(s.as_bytes());
}

pub(crate) fn decode_short_string(buf: &mut BytesMut) -> io::Result<String> {
    let len = decode_u8(buf)? as usize;

    ensure(buf, len, "short string")?;

    let sb = buf.split_to(len);

    String::from_utf8(sb.to_vec()).map_err(|_| invalid_data("short string is not valid utf-8".to_string()))
}

pub(crate) fn encode_long_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put(s.as_bytes());
}

pub(crate) fn decode_long_string(buf: &mut BytesMut) -> io::Result<String> {
    let len = decode_u32(buf)? as usize;

    ensure(buf, len, "long string")?;

    let sb = buf.split_to(len);

    String::from_utf8(sb.to_vec()).map_err(|_| invalid_data("long string is not valid utf-8".to_string()))
}

pub(crate) fn encode_value(buf: &mut BytesMut, value: &AMQPFieldValue) {
    use AMQPFieldValue::*;

    match value {
        Bool(v) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(u8::from(*v));
        }
        Int8(v) => {
            buf.put_u8(TAG_INT8);
            buf.put_i8(*v);
        }
        Uint8(v) => {
            buf.put_u8(TAG_UINT8);
            buf.put_u8(*v);
        }
        Int16(v) => {
            buf.put_u8(TAG_INT16);
            buf.put_i16(*v);
        }
        Uint16(v) => {
            buf.put_u8(TAG_UINT16);
            buf.put_u16(*v);
        }
        Int32(v) => {
            buf.put_u8(TAG_INT32);
            buf.put_i32(*v);
        }
        Uint32(v) => {
            buf.put_u8(TAG_UINT32);
            buf.put_u32(*v);
        }
        Int64(v) => {
            buf.put_u8(TAG_INT64);
            buf.put_i64(*v);
        }
        Uint64(v) => {
            buf.put_u8(TAG_UINT64);
            buf.put_u64(*v);
        }
        Float(v) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_f32(*v);
        }
        Double(v) => {
            buf.put_u8(TAG_DOUBLE);
            buf.put_f64(*v);
        }
        Decimal(scale, mantissa) => {
            buf.put_u8(TAG_DECIMAL);
            buf.put_u8(*scale);
            buf.put_i32(*mantissa);
        }
        SimpleString(v) => {
            buf.put_u8(TAG_SIMPLE_STRING);
            encode_short_string(buf, v);
        }
        LongString(v) => {
            buf.put_u8(TAG_LONG_STRING);
            encode_long_string(buf, v);
        }
        Timestamp(v) => {
            buf.put_u8(TAG_TIMESTAMP);
            buf.put_u64(*v);
        }
        FieldArray(v) => {
            buf.put_u8(TAG_ARRAY);
            encode_field_array(buf, v);
        }
        FieldTable(v) => {
            buf.put_u8(TAG_TABLE);
            encode_field_table(buf, Some(v.as_ref()));
        }
        Void => {
            buf.put_u8(TAG_VOID);
        }
    }
}

pub(crate) fn decode_value(buf: &mut BytesMut) -> io::Result<AMQPFieldValue> {
    use AMQPFieldValue::*;

    let value = match decode_u8(buf)? {
        TAG_BOOL => Bool(decode_u8(buf)? != 0),
        TAG_INT8 => Int8(decode_i8(buf)?),
        TAG_UINT8 => Uint8(decode_u8(buf)?),
        TAG_INT16 => Int16(decode_i16(buf)?),
        TAG_UINT16 => Uint16(decode_u16(buf)?),
        TAG_INT32 => Int32(decode_i32(buf)?),
        TAG_UINT32 => Uint32(decode_u32(buf)?),
        TAG_INT64 => Int64(decode_i64(buf)?),
        TAG_UINT64 => Uint64(decode_u64(buf)?),
        TAG_FLOAT => Float(decode_f32(buf)?),
        TAG_DOUBLE => Double(decode_f64(buf)?),
        TAG_DECIMAL => {
            let scale = decode_u8(buf)?;
            let mantissa = decode_i32(buf)?;

            Decimal(scale, mantissa)
        }
        TAG_SIMPLE_STRING => SimpleString(decode_short_string(buf)?),
        TAG_LONG_STRING => LongString(decode_long_string(buf)?),
        TAG_TIMESTAMP => Timestamp(decode_u64(buf)?),
        TAG_ARRAY => FieldArray(decode_field_array(buf)?),
        TAG_TABLE => match decode_field_table(buf)? {
            None => FieldTable(Box::default()),
            Some(table) => FieldTable(Box::new(table)),
        },
        TAG_VOID => Void,
        tag => return Err(invalid_data(format!("unknown field value type tag 0x{:02X}", tag))),
    };

    Ok(value)
}

/// Encode a field table with its byte-length prefix.
///
/// Entries are serialized into a scratch buffer first, so the length
/// prefix reflects the actual serialized size whatever the iteration
/// order of the map is. `None` encodes as an empty table.
pub(crate) fn encode_field_table(buf: &mut BytesMut, ft: Option<&FieldTable>) {
    match ft {
        None => buf.put_u32(0),
        Some(table) => {
            let mut ft_buf = BytesMut::with_capacity(4096);

            for (name, value) in table {
                encode_short_string(&mut ft_buf, name);
                encode_value(&mut ft_buf, value);
            }

            buf.put_u32(ft_buf.len() as u32);
            buf.put(ft_buf);
        }
    }
}

/// Decode a field table.
///
/// The buffer points to the beginning of the field table which is a `u32`
/// length prefix. An empty table decodes to `None`.
pub(crate) fn decode_field_table(buf: &mut BytesMut) -> io::Result<Option<FieldTable>> {
    let ft_len = decode_u32(buf)? as usize;

    if ft_len == 0 {
        return Ok(None);
    }

    ensure(buf, ft_len, "field table")?;

    let mut ft_buf = buf.split_to(ft_len);
    let mut table = FieldTable::new();

    while ft_buf.has_remaining() {
        let field_name = decode_short_string(&mut ft_buf)?;
        let field_value = decode_value(&mut ft_buf)?;

        table.insert(field_name, field_value);
    }

    Ok(Some(table))
}

pub(crate) fn encode_field_array(buf: &mut BytesMut, fa: &[AMQPFieldValue]) {
    let mut fa_buf = BytesMut::with_capacity(1024);

    for value in fa {
        encode_value(&mut fa_buf, value);
    }

    buf.put_u32(fa_buf.len() as u32);
    buf.put(fa_buf);
}

pub(crate) fn decode_field_array(buf: &mut BytesMut) -> io::Result<FieldArray> {
    let fa_len = decode_u32(buf)? as usize;

    ensure(buf, fa_len, "field array")?;

    let mut fa_buf = buf.split_to(fa_len);
    let mut array = FieldArray::new();

    while fa_buf.has_remaining() {
        array.push(decode_value(&mut fa_buf)?);
    }

    Ok(array)
}
