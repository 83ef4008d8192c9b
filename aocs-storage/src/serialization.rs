//! Array persistence for the column blocks of a segment file.
//!
//! Each column block is one Arrow array stored under one physical key, in a minimal
//! container: a fixed header followed by the raw Arrow buffers. Decoding rebuilds
//! `ArrayData` over the pager blob without an intermediate parse step.
//!
//! Unlike Arrow IPC there is no schema, framing or dictionary support. The column type
//! is carried by the block's owner and cross-checked against the header's type code.

use std::convert::TryFrom;

use arrow::array::{Array, ArrayData, ArrayRef, make_array};
use arrow::buffer::Buffer;
use arrow::datatypes::DataType;
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use aocs_result::{Error, Result};

use crate::codecs::{read_u32_le, read_u64_le, write_u32_le, write_u64_le};

const MAGIC: [u8; 4] = *b"ARR0";
const HEADER_LEN: usize = 24;

/// Header flag: a validity bitmap of `ceil(len / 8)` bytes trails the payload.
const FLAG_HAS_VALIDITY: u8 = 0b0000_0001;

/// On-pager layout selector.
///
/// The header is:
///   bytes 0..=3  : MAGIC = b"ARR0"
///   byte  4      : layout code (see `Layout`)
///   byte  5      : type code (`PrimType`)
///   byte  6      : flags (`FLAG_HAS_VALIDITY`)
///   byte  7      : reserved (0)
///   bytes 8..=15 : len (u64) = number of elements
///   bytes 16..=19: extra_a (u32) = layout-specific
///   bytes 20..=23: extra_b (u32) = layout-specific
///   bytes 24..   : payload, then the optional validity bitmap
///
/// - `Primitive`: fixed-width values (Int64, Float64) and bit-packed Boolean.
///   `extra_a` = values byte length, `extra_b` = 0. Payload: `[values]`.
/// - `Varlen`: Utf8. `extra_a` = offsets byte length, `extra_b` = values byte length.
///   Payload: `[offsets][values]`.
#[repr(u8)]
enum Layout {
    Primitive = 0,
    Varlen = 2,
}

/// Stable on-pager type codes. Do not reorder. Only append new
/// variants at the end with explicit numeric values.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
enum PrimType {
    Int64 = 6,
    Float64 = 11,
    Utf8 = 12,
    Boolean = 15,
}

#[inline]
fn prim_from_datatype(dt: &DataType) -> Result<PrimType> {
    let p = match dt {
        DataType::Int64 => PrimType::Int64,
        DataType::Float64 => PrimType::Float64,
        DataType::Utf8 => PrimType::Utf8,
        DataType::Boolean => PrimType::Boolean,
        other => {
            return Err(Error::Internal(format!(
                "unsupported Arrow type for column block: {other:?}"
            )));
        }
    };
    Ok(p)
}

#[inline]
fn datatype_from_prim(p: PrimType) -> DataType {
    match p {
        PrimType::Int64 => DataType::Int64,
        PrimType::Float64 => DataType::Float64,
        PrimType::Utf8 => DataType::Utf8,
        PrimType::Boolean => DataType::Boolean,
    }
}

/// Serialize one array into the block container.
pub fn serialize_array(arr: &dyn Array) -> Result<Vec<u8>> {
    let data = arr.to_data();
    if data.offset() != 0 {
        return Err(Error::Internal("sliced arrays cannot be serialized".into()));
    }
    let code = prim_from_datatype(arr.data_type())?;
    let validity = data.nulls().map(|n| n.inner().sliced());

    let (layout, extra_a, extra_b, payload): (Layout, u32, u32, Vec<&[u8]>) = match code {
        PrimType::Utf8 => {
            let offsets = data
                .buffers()
                .first()
                .ok_or_else(|| Error::Internal("missing offsets buffer".into()))?;
            let values = data
                .buffers()
                .get(1)
                .ok_or_else(|| Error::Internal("missing values buffer for varlen".into()))?;
            let offsets_len = u32::try_from(offsets.len())
                .map_err(|_| Error::Internal("offsets buffer too large".into()))?;
            let values_len = u32::try_from(values.len())
                .map_err(|_| Error::Internal("values buffer too large".into()))?;
            (
                Layout::Varlen,
                offsets_len,
                values_len,
                vec![offsets.as_slice(), values.as_slice()],
            )
        }
        _ => {
            let values = data
                .buffers()
                .first()
                .ok_or_else(|| Error::Internal("missing values buffer".into()))?;
            let values_len = u32::try_from(values.len())
                .map_err(|_| Error::Internal("values too large".into()))?;
            (Layout::Primitive, values_len, 0, vec![values.as_slice()])
        }
    };

    let payload_len: usize = payload.iter().map(|b| b.len()).sum();
    let validity_len = validity.as_ref().map_or(0, |v| v.len());
    let mut out = Vec::with_capacity(HEADER_LEN + payload_len + validity_len);
    out.extend_from_slice(&MAGIC);
    out.push(layout as u8);
    out.push(u8::from(code));
    out.push(if validity.is_some() {
        FLAG_HAS_VALIDITY
    } else {
        0
    });
    out.push(0);
    write_u64_le(&mut out, data.len() as u64);
    write_u32_le(&mut out, extra_a);
    write_u32_le(&mut out, extra_b);
    for part in payload {
        out.extend_from_slice(part);
    }
    if let Some(v) = validity {
        out.extend_from_slice(v.as_slice());
    }
    Ok(out)
}

/// Rebuild an array from a pager blob.
pub fn deserialize_array(blob: Bytes) -> Result<ArrayRef> {
    let raw = blob.as_ref();
    if raw.len() < HEADER_LEN || raw[0..4] != MAGIC {
        return Err(Error::Internal("bad array blob magic/size".into()));
    }

    let layout = raw[4];
    let code = PrimType::try_from(raw[5])
        .map_err(|_| Error::Internal(format!("unsupported type code {}", raw[5])))?;
    let has_validity = raw[6] & FLAG_HAS_VALIDITY != 0;

    let mut o = 8usize;
    let len = read_u64_le(raw, &mut o) as usize;
    let extra_a = read_u32_le(raw, &mut o) as usize;
    let extra_b = read_u32_le(raw, &mut o) as usize;

    let whole = Buffer::from(blob.clone());
    let payload_len = extra_a + extra_b;
    let validity_len = if has_validity { len.div_ceil(8) } else { 0 };
    if whole.len() != HEADER_LEN + payload_len + validity_len {
        return Err(Error::Internal("array blob length mismatch".into()));
    }
    let validity =
        has_validity.then(|| whole.slice_with_length(HEADER_LEN + payload_len, validity_len));

    let builder = match layout {
        x if x == Layout::Primitive as u8 => {
            if matches!(code, PrimType::Utf8) {
                return Err(Error::Internal("primitive layout with varlen type".into()));
            }
            ArrayData::builder(datatype_from_prim(code))
                .len(len)
                .add_buffer(whole.slice_with_length(HEADER_LEN, extra_a))
        }
        x if x == Layout::Varlen as u8 => {
            if !matches!(code, PrimType::Utf8) {
                return Err(Error::Internal("varlen layout with fixed-width type".into()));
            }
            ArrayData::builder(DataType::Utf8)
                .len(len)
                .add_buffer(whole.slice_with_length(HEADER_LEN, extra_a))
                .add_buffer(whole.slice_with_length(HEADER_LEN + extra_a, extra_b))
        }
        other => return Err(Error::Internal(format!("unknown layout {other}"))),
    };

    let data = builder.null_bit_buffer(validity).align_buffers(true).build()?;
    Ok(make_array(data))
}

/* ---- Compile-time pinning of on-pager codes -------------------------------
   Changing any discriminant silently would corrupt stored blocks. These const
   checks make such edits fail to compile immediately.
*/
#[allow(clippy::no_effect)]
const _: () = {
    ["code changed"][!(PrimType::Int64 as u8 == 6) as usize];
    ["code changed"][!(PrimType::Float64 as u8 == 11) as usize];
    ["code changed"][!(PrimType::Utf8 as u8 == 12) as usize];
    ["code changed"][!(PrimType::Boolean as u8 == 15) as usize];
    ["code changed"][!(Layout::Primitive as u8 == 0) as usize];
    ["code changed"][!(Layout::Varlen as u8 == 2) as usize];
};

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{BooleanArray, Int64Array, StringArray};
    use std::sync::Arc;

    fn roundtrip(arr: ArrayRef) -> ArrayRef {
        let bytes = serialize_array(arr.as_ref()).unwrap();
        deserialize_array(Bytes::from(bytes)).unwrap()
    }

    #[test]
    fn nullable_int64_keeps_validity() {
        let arr: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), None, Some(3)]));
        let back = roundtrip(Arc::clone(&arr));
        assert_eq!(back.as_ref(), arr.as_ref());
        assert_eq!(back.null_count(), 1);
    }

    #[test]
    fn utf8_with_nulls() {
        let arr: ArrayRef = Arc::new(StringArray::from(vec![Some("a"), None, Some("ccc")]));
        let back = roundtrip(Arc::clone(&arr));
        assert_eq!(back.as_ref(), arr.as_ref());
    }

    #[test]
    fn boolean_bits_survive() {
        let arr: ArrayRef = Arc::new(BooleanArray::from(vec![true, false, true, true]));
        let back = roundtrip(Arc::clone(&arr));
        assert_eq!(back.as_ref(), arr.as_ref());
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let arr = Int64Array::from(vec![1, 2, 3]);
        let mut bytes = serialize_array(&arr).unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            deserialize_array(Bytes::from(bytes)),
            Err(Error::Internal(_))
        ));
    }
}
