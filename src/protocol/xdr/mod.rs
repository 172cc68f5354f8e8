//! XDR (External Data Representation) codec as defined in RFC 4506.
//!
//! Every value that crosses the wire implements [`Serialize`] and
//! [`Deserialize`]. All primitives are big endian; opaque data and strings
//! carry a 32-bit length prefix and are padded to a four byte boundary.
//! Discriminated unions are a 32-bit discriminant followed by the selected
//! arm. The decoder is streaming: it never reads past the supplied source,
//! and a short read surfaces as an `std::io::Error` which the RPC layer
//! reports as `GARBAGE_ARGS`.

use std::io::{Read, Write};

use byteorder::BigEndian;
use byteorder::{ReadBytesExt, WriteBytesExt};

pub mod nfs2;
pub mod nfs3;
pub mod nfs4;
pub mod portmap;
pub mod rpc;

/// Endianness used for every XDR primitive.
pub type XdrEndian = BigEndian;

/// XDR data alignment in bytes.
pub const ALIGNMENT: usize = 4;

/// Opaque fields are read in bounded chunks so that an adversarial length
/// prefix cannot force a huge up-front allocation.
const OPAQUE_CHUNK: usize = 64 * 1024;

/// Serializes a value into an XDR byte stream.
pub trait Serialize {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()>;
}

/// Deserializes a value from an XDR byte stream, in place.
pub trait Deserialize {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()>;
}

/// Reads a complete value of type `T` from the stream.
pub fn deserialize<T: Deserialize + Default>(src: &mut impl Read) -> std::io::Result<T> {
    let mut value = T::default();
    value.deserialize(src)?;
    Ok(value)
}

/// Consumes the padding that follows `src_len` bytes of opaque data.
///
/// The NFS protocols do not require the padding to be zero, so the bytes
/// are read and discarded without inspection.
pub fn read_padding(src_len: usize, src: &mut impl Read) -> std::io::Result<()> {
    let mut pad: [u8; ALIGNMENT] = Default::default();
    let rem = src_len % ALIGNMENT;
    if rem != 0 {
        src.read_exact(&mut pad[rem..])?;
    }
    Ok(())
}

/// Writes zero padding after `src_len` bytes of opaque data.
pub fn write_padding(src_len: usize, dest: &mut impl Write) -> std::io::Result<()> {
    let pad: [u8; ALIGNMENT] = Default::default();
    let rem = src_len % ALIGNMENT;
    if rem != 0 {
        dest.write_all(&pad[rem..])?;
    }
    Ok(())
}

/// Builds the `InvalidData` error used for malformed wire input.
pub fn invalid_data(m: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, m.into())
}

impl Serialize for bool {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XdrEndian>(u32::from(*self))
    }
}

impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XdrEndian>()? != 0;
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XdrEndian>(*self)
    }
}

impl Deserialize for u32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XdrEndian>()?;
        Ok(())
    }
}

impl Serialize for i32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i32::<XdrEndian>(*self)
    }
}

impl Deserialize for i32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i32::<XdrEndian>()?;
        Ok(())
    }
}

impl Serialize for u64 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u64::<XdrEndian>(*self)
    }
}

impl Deserialize for u64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u64::<XdrEndian>()?;
        Ok(())
    }
}

impl Serialize for i64 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i64::<XdrEndian>(*self)
    }
}

impl Deserialize for i64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i64::<XdrEndian>()?;
        Ok(())
    }
}

/// Fixed-size arrays are raw bytes without a length prefix, padded to the
/// XDR alignment when the size requires it.
impl<const N: usize> Serialize for [u8; N] {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_all(self)?;
        write_padding(N, dest)
    }
}

impl<const N: usize> Deserialize for [u8; N] {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        src.read_exact(self)?;
        read_padding(N, src)
    }
}

/// Variable-length opaque data: length prefix, bytes, padding.
impl Serialize for Vec<u8> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        debug_assert!(self.len() < u32::MAX as usize);
        (self.len() as u32).serialize(dest)?;
        dest.write_all(self)?;
        write_padding(self.len(), dest)
    }
}

impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = deserialize::<u32>(src)? as usize;
        self.clear();
        let mut remaining = length;
        while remaining > 0 {
            let chunk = remaining.min(OPAQUE_CHUNK);
            let start = self.len();
            self.resize(start + chunk, 0);
            src.read_exact(&mut self[start..])?;
            remaining -= chunk;
        }
        read_padding(length, src)
    }
}

/// Counted array of 32-bit integers (auxiliary gids, attribute bitmaps).
impl Serialize for Vec<u32> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        debug_assert!(self.len() < u32::MAX as usize);
        (self.len() as u32).serialize(dest)?;
        for item in self {
            item.serialize(dest)?;
        }
        Ok(())
    }
}

impl Deserialize for Vec<u32> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = deserialize::<u32>(src)? as usize;
        self.clear();
        for _ in 0..length {
            self.push(deserialize(src)?);
        }
        Ok(())
    }
}

/// XDR strings are opaque bytes required to be valid UTF-8.
impl Serialize for String {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        let bytes = self.as_bytes();
        (bytes.len() as u32).serialize(dest)?;
        dest.write_all(bytes)?;
        write_padding(bytes.len(), dest)
    }
}

impl Deserialize for String {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let raw = deserialize::<Vec<u8>>(src)?;
        *self = String::from_utf8(raw).map_err(|_| invalid_data("string is not UTF-8"))?;
        Ok(())
    }
}

/// Optional values follow the XDR bool-discriminated union convention:
/// `TRUE value` or `FALSE`.
impl<T: Serialize> Serialize for Option<T> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            Some(v) => {
                true.serialize(dest)?;
                v.serialize(dest)
            }
            None => false.serialize(dest),
        }
    }
}

impl<T: Deserialize + Default> Deserialize for Option<T> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        if deserialize::<bool>(src)? {
            *self = Some(deserialize(src)?);
        } else {
            *self = None;
        }
        Ok(())
    }
}

/// Implements [`Serialize`] for a struct by visiting each field in
/// declaration order, matching the XDR description of the structure.
#[macro_export]
macro_rules! SerializeStruct {
    ($t:ident, $($field:ident),* $(,)?) => {
        impl $crate::protocol::xdr::Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                $(self.$field.serialize(dest)?;)*
                Ok(())
            }
        }
    };
}

/// Field-by-field counterpart of [`SerializeStruct`].
#[macro_export]
macro_rules! DeserializeStruct {
    ($t:ident, $($field:ident),* $(,)?) => {
        impl $crate::protocol::xdr::Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                $(self.$field.deserialize(src)?;)*
                Ok(())
            }
        }
    };
}

/// Implements the codec for a numeric enum carried as a 32-bit value.
#[macro_export]
macro_rules! SerializeEnum {
    ($t:ident) => {
        impl $crate::protocol::xdr::Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                (*self as u32).serialize(dest)
            }
        }
    };
}

/// Decoding an out-of-range discriminant is a wire error.
#[macro_export]
macro_rules! DeserializeEnum {
    ($t:ident) => {
        impl $crate::protocol::xdr::Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                let raw = $crate::protocol::xdr::deserialize::<u32>(src)?;
                match FromPrimitive::from_u32(raw) {
                    Some(v) => {
                        *self = v;
                        Ok(())
                    }
                    None => Err($crate::protocol::xdr::invalid_data(format!(
                        "invalid {} discriminant {raw}",
                        stringify!($t)
                    ))),
                }
            }
        }
    };
}

/// Implements the codec for a two-arm union discriminated by an XDR bool:
/// the `Void` arm encodes `FALSE`, the value arm encodes `TRUE value`.
#[macro_export]
macro_rules! SerializeBoolUnion {
    ($t:ident, $arm:ident, $armty:ty) => {
        impl $crate::protocol::xdr::Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                match self {
                    $t::Void => false.serialize(dest),
                    $t::$arm(v) => {
                        true.serialize(dest)?;
                        v.serialize(dest)
                    }
                }
            }
        }
    };
}

#[macro_export]
macro_rules! DeserializeBoolUnion {
    ($t:ident, $arm:ident, $armty:ty) => {
        impl $crate::protocol::xdr::Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                if $crate::protocol::xdr::deserialize::<bool>(src)? {
                    let mut value = <$armty>::default();
                    value.deserialize(src)?;
                    *self = $t::$arm(value);
                } else {
                    *self = $t::Void;
                }
                Ok(())
            }
        }
    };
}

pub use crate::{
    DeserializeBoolUnion, DeserializeEnum, DeserializeStruct, SerializeBoolUnion, SerializeEnum,
    SerializeStruct,
};
