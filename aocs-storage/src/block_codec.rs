//! Conversion between cell values and the Arrow arrays stored per column block.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use bytes::Bytes;

use aocs_result::{Error, Result};
use aocs_types::{ColumnType, Datum};

use crate::serialization::{deserialize_array, serialize_array};

/// Arrow type used to store a column of `ty`.
pub fn arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Utf8 => DataType::Utf8,
        ColumnType::Boolean => DataType::Boolean,
    }
}

fn mismatch(ty: ColumnType, value: &Datum) -> Error {
    Error::InvalidArgumentError(format!("value {value:?} does not fit a {ty:?} column"))
}

/// Build an array of `ty` from `values`.
pub fn datums_to_array(ty: ColumnType, values: &[Datum]) -> Result<ArrayRef> {
    let array: ArrayRef = match ty {
        ColumnType::Integer => {
            let mut b = Int64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    Datum::Null => b.append_null(),
                    Datum::Integer(i) => b.append_value(*i),
                    other => return Err(mismatch(ty, other)),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Float => {
            let mut b = Float64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    Datum::Null => b.append_null(),
                    Datum::Float(f) => b.append_value(*f),
                    other => return Err(mismatch(ty, other)),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Utf8 => {
            let mut b = StringBuilder::with_capacity(values.len(), values.len() * 8);
            for v in values {
                match v {
                    Datum::Null => b.append_null(),
                    Datum::String(s) => b.append_value(s),
                    other => return Err(mismatch(ty, other)),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Boolean => {
            let mut b = BooleanBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    Datum::Null => b.append_null(),
                    Datum::Boolean(x) => b.append_value(*x),
                    other => return Err(mismatch(ty, other)),
                }
            }
            Arc::new(b.finish())
        }
    };
    Ok(array)
}

/// Expand an array back into cell values.
pub fn array_to_datums(ty: ColumnType, array: &ArrayRef) -> Result<Vec<Datum>> {
    if array.data_type() != &arrow_type(ty) {
        return Err(Error::Internal(format!(
            "column block holds {:?}, expected {:?}",
            array.data_type(),
            ty
        )));
    }
    let n = array.len();
    let mut out = Vec::with_capacity(n);
    match ty {
        ColumnType::Integer => {
            let a = array.as_primitive::<Int64Type>();
            for i in 0..n {
                out.push(if a.is_null(i) {
                    Datum::Null
                } else {
                    Datum::Integer(a.value(i))
                });
            }
        }
        ColumnType::Float => {
            let a = array.as_primitive::<Float64Type>();
            for i in 0..n {
                out.push(if a.is_null(i) {
                    Datum::Null
                } else {
                    Datum::Float(a.value(i))
                });
            }
        }
        ColumnType::Utf8 => {
            let a = array.as_string::<i32>();
            for i in 0..n {
                out.push(if a.is_null(i) {
                    Datum::Null
                } else {
                    Datum::String(a.value(i).to_string())
                });
            }
        }
        ColumnType::Boolean => {
            let a = array.as_boolean();
            for i in 0..n {
                out.push(if a.is_null(i) {
                    Datum::Null
                } else {
                    Datum::Boolean(a.value(i))
                });
            }
        }
    }
    Ok(out)
}

/// An encoded column block plus the sizes the segment catalog records for it.
#[derive(Debug, Clone)]
pub struct EncodedBlock {
    pub bytes: Vec<u8>,
    pub row_count: u64,
    /// In-memory Arrow footprint of the block before encoding.
    pub uncompressed_len: u64,
}

pub fn encode_block(ty: ColumnType, values: &[Datum]) -> Result<EncodedBlock> {
    let array = datums_to_array(ty, values)?;
    let bytes = serialize_array(array.as_ref())?;
    Ok(EncodedBlock {
        bytes,
        row_count: values.len() as u64,
        uncompressed_len: array.get_buffer_memory_size() as u64,
    })
}

pub fn decode_block<B: AsRef<[u8]>>(ty: ColumnType, blob: &B) -> Result<Vec<Datum>> {
    let array = deserialize_array(Bytes::copy_from_slice(blob.as_ref()))?;
    array_to_datums(ty, &array)
}
