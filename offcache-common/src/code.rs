// Copyright 2026 offcache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};

/// Converts values to and from the bytes kept in off-heap storage.
///
/// In-heap backends never serialize; the boundary only exists at the storage layer.
pub trait Serializer<T>: Send + Sync + 'static {
    /// Serialize `value` into a freshly allocated buffer.
    fn serialize(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from `buf`.
    fn deserialize(&self, buf: &[u8]) -> Result<T>;
}

impl<T, S> Serializer<T> for Arc<S>
where
    S: Serializer<T> + ?Sized,
{
    fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        self.as_ref().serialize(value)
    }

    fn deserialize(&self, buf: &[u8]) -> Result<T> {
        self.as_ref().deserialize(buf)
    }
}

/// Serializer for byte vectors, strings and primitive integers.
///
/// Byte vectors are stored as-is, strings as UTF-8 and integers as big-endian bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawSerializer;

impl Serializer<Vec<u8>> for RawSerializer {
    fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn deserialize(&self, buf: &[u8]) -> Result<Vec<u8>> {
        Ok(buf.to_vec())
    }
}

impl Serializer<String> for RawSerializer {
    fn serialize(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, buf: &[u8]) -> Result<String> {
        String::from_utf8(buf.to_vec()).map_err(|e| Error::new(ErrorKind::Serde, "invalid utf-8").with_source(e))
    }
}

macro_rules! for_all_primitives {
    ($macro:ident) => {
        $macro! {
            u8, u16, u32, u64, usize,
            i8, i16, i32, i64, isize,
        }
    };
}

macro_rules! impl_raw_serializer {
    ($( $type:ty, )*) => {
        $(
            impl Serializer<$type> for RawSerializer {
                fn serialize(&self, value: &$type) -> Result<Vec<u8>> {
                    Ok(value.to_be_bytes().to_vec())
                }

                fn deserialize(&self, buf: &[u8]) -> Result<$type> {
                    let bytes = buf.try_into().map_err(|_| {
                        Error::new(ErrorKind::Serde, concat!("buffer length mismatch for ", stringify!($type)))
                            .with_context("expected", std::mem::size_of::<$type>())
                            .with_context("actual", buf.len())
                    })?;
                    Ok(<$type>::from_be_bytes(bytes))
                }
            }
        )*
    };
}

for_all_primitives! { impl_raw_serializer }

/// Serializer for any serde compatible type, backed by bincode.
#[cfg(feature = "serde")]
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeSerializer;

#[cfg(feature = "serde")]
impl<T> Serializer<T> for BincodeSerializer
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(Error::bincode_error)
    }

    fn deserialize(&self, buf: &[u8]) -> Result<T> {
        bincode::deserialize(buf).map_err(Error::bincode_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_primitives() {
        let buf = Serializer::<u64>::serialize(&RawSerializer, &0x0102_0304_0506_0708).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let v: u64 = RawSerializer.deserialize(&buf).unwrap();
        assert_eq!(v, 0x0102_0304_0506_0708);

        let err = Serializer::<u32>::deserialize(&RawSerializer, &[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serde);
    }

    #[test]
    fn test_raw_string() {
        let buf = RawSerializer.serialize(&"offcache".to_string()).unwrap();
        assert_eq!(buf, b"offcache");
        let err = Serializer::<String>::deserialize(&RawSerializer, &[0xff, 0xfe]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serde);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_bincode() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Record {
            id: u64,
            name: String,
        }

        let record = Record {
            id: 42,
            name: "answer".to_string(),
        };
        let buf = BincodeSerializer.serialize(&record).unwrap();
        let decoded: Record = BincodeSerializer.deserialize(&buf).unwrap();
        assert_eq!(decoded, record);
    }
}
