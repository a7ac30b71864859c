// Fixed-width serialization helpers for the on-disk layout
//
// Integers use native byte order; strings live in NUL-padded fixed slots.

use std::io::{self, Read, Write};

pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_ne_bytes())
}

pub fn read_u32<R: Read + ?Sized>(reader: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_ne_bytes(bytes))
}

pub fn write_i32<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_ne_bytes())
}

pub fn read_i32<R: Read + ?Sized>(reader: &mut R) -> io::Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_ne_bytes(bytes))
}

pub fn write_i64<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    writer.write_all(&value.to_ne_bytes())
}

pub fn read_i64<R: Read + ?Sized>(reader: &mut R) -> io::Result<i64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(i64::from_ne_bytes(bytes))
}

/// Write `data` into a zero-padded slot of `width` bytes
pub fn write_slot<W: Write>(writer: &mut W, data: &[u8], width: usize) -> io::Result<()> {
    if data.len() > width {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} bytes do not fit a {} byte slot", data.len(), width),
        ));
    }
    writer.write_all(data)?;
    writer.write_all(&vec![0u8; width - data.len()])
}

/// Read a fixed slot of `width` bytes
pub fn read_slot<R: Read + ?Sized>(reader: &mut R, width: usize) -> io::Result<Vec<u8>> {
    let mut data = vec![0u8; width];
    reader.read_exact(&mut data)?;
    Ok(data)
}

/// Write a string NUL-padded to `width` bytes; at least one NUL terminates it
pub fn write_fixed_str<W: Write>(writer: &mut W, value: &str, width: usize) -> io::Result<()> {
    if value.len() >= width {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("string of {} bytes needs a terminator within {}", value.len(), width),
        ));
    }
    write_slot(writer, value.as_bytes(), width)
}

/// Read a NUL-terminated string from a fixed slot of `width` bytes
pub fn read_fixed_str<R: Read + ?Sized>(reader: &mut R, width: usize) -> io::Result<String> {
    let slot = read_slot(reader, width)?;
    let end = slot.iter().position(|b| *b == 0).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "string slot has no NUL terminator")
    })?;
    String::from_utf8(slot[..end].to_vec())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_integers_native_order() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0x01020304).unwrap();
        write_i64(&mut buf, -2).unwrap();
        assert_eq!(&buf[..4], &0x01020304u32.to_ne_bytes());
        assert_eq!(buf.len(), 12);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_u32(&mut cursor).unwrap(), 0x01020304);
        assert_eq!(read_i64(&mut cursor).unwrap(), -2);
    }

    #[test]
    fn test_fixed_str_slot() {
        let mut buf = Vec::new();
        write_fixed_str(&mut buf, "P1", 32).unwrap();
        assert_eq!(buf.len(), 32);
        assert_eq!(&buf[..3], b"P1\0");

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_fixed_str(&mut cursor, 32).unwrap(), "P1");
    }

    #[test]
    fn test_fixed_str_needs_terminator() {
        let mut buf = Vec::new();
        assert!(write_fixed_str(&mut buf, &"a".repeat(32), 32).is_err());

        let mut cursor = Cursor::new(vec![b'a'; 32]);
        let err = read_fixed_str(&mut cursor, 32).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_read() {
        let mut cursor = Cursor::new(vec![1u8, 2]);
        let err = read_u32(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
