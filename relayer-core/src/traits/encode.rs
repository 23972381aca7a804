use std::io::{Read, Write};

use crate::{DecodeError, H160, H256, U256};

/// Simple trait for types with a canonical encoding
pub trait Encode {
    /// Write the canonical encoding to the writer
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write;

    /// Serialize to a vec
    fn to_vec(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![];
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// Simple trait for types with a canonical encoding
pub trait Decode {
    /// Try to read from some source
    fn read_from<R>(reader: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
        Self: Sized;
}

macro_rules! impl_big_endian {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
            where
                W: Write,
            {
                writer.write_all(&self.to_be_bytes())?;
                Ok(std::mem::size_of::<$ty>())
            }
        }

        impl Decode for $ty {
            fn read_from<R>(reader: &mut R) -> Result<Self, DecodeError>
            where
                R: Read,
            {
                let mut buf = [0; std::mem::size_of::<$ty>()];
                reader.read_exact(&mut buf)?;
                Ok(<$ty>::from_be_bytes(buf))
            }
        }
    )*};
}

impl_big_endian!(u8, u16, u32, u64);

impl<const N: usize> Encode for [u8; N] {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        writer.write_all(self)?;
        Ok(N)
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn read_from<R>(reader: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let mut buf = [0; N];
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl Encode for H256 {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        writer.write_all(self.as_ref())?;
        Ok(32)
    }
}

impl Decode for H256 {
    fn read_from<R>(reader: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let mut digest = H256::default();
        reader.read_exact(digest.as_mut())?;
        Ok(digest)
    }
}

impl Encode for H160 {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        writer.write_all(self.as_ref())?;
        Ok(20)
    }
}

impl Decode for H160 {
    fn read_from<R>(reader: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let mut address = H160::default();
        reader.read_exact(address.as_mut())?;
        Ok(address)
    }
}

/// Amounts are 32-byte big-endian on the wire.
impl Encode for U256 {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        let mut buf = [0; 32];
        self.to_big_endian(&mut buf);
        writer.write_all(&buf)?;
        Ok(32)
    }
}

impl Decode for U256 {
    fn read_from<R>(reader: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let mut buf = [0; 32];
        reader.read_exact(&mut buf)?;
        Ok(U256::from_big_endian(&buf))
    }
}

/// Raw bytes extend to the end of the input.
impl Encode for Vec<u8> {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write,
    {
        writer.write_all(self)?;
        Ok(self.len())
    }
}

impl Decode for Vec<u8> {
    fn read_from<R>(reader: &mut R) -> Result<Self, DecodeError>
    where
        R: Read,
    {
        let mut buf = vec![];
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Write `bytes` behind a big-endian u16 length.
pub fn write_u16_prefixed<W: Write>(writer: &mut W, bytes: &[u8]) -> std::io::Result<usize> {
    let len = u16::try_from(bytes.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "field longer than u16::MAX bytes",
        )
    })?;
    let written = len.write_to(writer)?;
    writer.write_all(bytes)?;
    Ok(written + bytes.len())
}

/// Read a field written by [`write_u16_prefixed`].
pub fn read_u16_prefixed<R: Read>(reader: &mut R) -> Result<Vec<u8>, DecodeError> {
    let len = u16::read_from(reader)? as usize;
    read_exact_vec(reader, len)
}

/// Write `bytes` behind a single length byte.
pub fn write_u8_prefixed<W: Write>(writer: &mut W, bytes: &[u8]) -> std::io::Result<usize> {
    let len = u8::try_from(bytes.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "field longer than u8::MAX bytes",
        )
    })?;
    let written = len.write_to(writer)?;
    writer.write_all(bytes)?;
    Ok(written + bytes.len())
}

/// Read a field written by [`write_u8_prefixed`].
pub fn read_u8_prefixed<R: Read>(reader: &mut R) -> Result<Vec<u8>, DecodeError> {
    let len = u8::read_from(reader)? as usize;
    read_exact_vec(reader, len)
}

fn read_exact_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut buf = vec![0; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
