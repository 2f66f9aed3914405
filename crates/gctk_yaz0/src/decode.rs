use byteorder::{BigEndian, ByteOrder};

use crate::{Result, Yaz0Error, HEADER_SIZE, LONG_MATCH, MAGIC};

/// Upper bound on output bytes per compressed body byte.
///
/// A group of eight long back-references spends 25 bytes to produce
/// `8 * 0x111` bytes of output.
const MAX_EXPANSION: usize = 88;

/// Read the uncompressed size from a Yaz0 header.
pub fn decompressed_size(src: &[u8]) -> Result<u32> {
    if src.len() < HEADER_SIZE {
        return Err(Yaz0Error::TruncatedHeader(src.len()));
    }
    let magic = [src[0], src[1], src[2], src[3]];
    if magic != MAGIC {
        return Err(Yaz0Error::InvalidMagic(magic));
    }
    Ok(BigEndian::read_u32(&src[4..8]))
}

/// Decompress a complete Yaz0 stream.
///
/// Decoding stops as soon as the declared number of bytes has been produced;
/// trailing bytes (alignment padding written by some encoders) are ignored.
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    let declared = decompressed_size(src)?;
    let size = declared as usize;

    let available = src.len() - HEADER_SIZE;
    if size > available.saturating_mul(MAX_EXPANSION) {
        return Err(Yaz0Error::DeclaredSizeTooLarge {
            declared,
            available,
        });
    }

    let mut reader = ByteReader {
        src,
        pos: HEADER_SIZE,
    };
    let mut out = Vec::with_capacity(size);
    let mut control = 0u8;
    let mut remaining_ops = 0u32;

    while out.len() < size {
        if remaining_ops == 0 {
            control = reader.next()?;
            remaining_ops = 8;
        }

        if control & 0x80 != 0 {
            out.push(reader.next()?);
        } else {
            let b1 = reader.next()? as usize;
            let b2 = reader.next()? as usize;
            let distance = (((b1 & 0x0F) << 8) | b2) + 1;
            let length = match b1 >> 4 {
                0 => reader.next()? as usize + LONG_MATCH,
                n => n + 2,
            };

            if distance > out.len() {
                return Err(Yaz0Error::InvalidBackReference {
                    distance,
                    position: out.len(),
                });
            }

            // A run may overlap the bytes it produces, so copy one at a time.
            let start = out.len() - distance;
            let length = length.min(size - out.len());
            for i in 0..length {
                let byte = out[start + i];
                out.push(byte);
            }
        }

        control <<= 1;
        remaining_ops -= 1;
    }

    Ok(out)
}

struct ByteReader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl ByteReader<'_> {
    fn next(&mut self) -> Result<u8> {
        let byte = *self
            .src
            .get(self.pos)
            .ok_or(Yaz0Error::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(size: u32) -> Vec<u8> {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&size.to_be_bytes());
        data.extend_from_slice(&[0; 8]);
        data
    }

    #[test]
    fn test_decompress_literals_and_short_run() {
        let mut data = header(6);
        data.extend_from_slice(&[0xE0, b'a', b'b', b'c', 0x10, 0x02]);

        assert_eq!(decompress(&data).unwrap(), b"abcabc");
    }

    #[test]
    fn test_decompress_long_run() {
        // One literal, then a three byte back-reference of length 0x12 + 0x0E.
        let mut data = header(0x21);
        data.extend_from_slice(&[0x80, b'z', 0x00, 0x00, 0x0E]);

        assert_eq!(decompress(&data).unwrap(), vec![b'z'; 0x21]);
    }

    #[test]
    fn test_decompress_ignores_trailing_padding() {
        let mut data = header(1);
        data.extend_from_slice(&[0x80, 0x42, 0x00, 0x00, 0x00]);

        assert_eq!(decompress(&data).unwrap(), vec![0x42]);
    }

    #[test]
    fn test_decompress_empty() {
        assert!(decompress(&header(0)).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = header(0);
        data[..4].copy_from_slice(b"Yay0");

        assert_eq!(
            decompress(&data),
            Err(Yaz0Error::InvalidMagic(*b"Yay0"))
        );
    }

    #[test]
    fn test_truncated_header() {
        assert_eq!(decompress(b"Yaz0"), Err(Yaz0Error::TruncatedHeader(4)));
    }

    #[test]
    fn test_truncated_body() {
        let mut data = header(4);
        data.extend_from_slice(&[0xF0, b'a', b'b']);

        assert_eq!(
            decompress(&data),
            Err(Yaz0Error::UnexpectedEof { offset: 0x13 })
        );
    }

    #[test]
    fn test_back_reference_before_start() {
        let mut data = header(3);
        data.extend_from_slice(&[0x00, 0x10, 0x00]);

        assert_eq!(
            decompress(&data),
            Err(Yaz0Error::InvalidBackReference {
                distance: 1,
                position: 0
            })
        );
    }

    #[test]
    fn test_declared_size_too_large() {
        let mut data = header(u32::MAX);
        data.extend_from_slice(&[0x80, 0x00]);

        assert!(matches!(
            decompress(&data),
            Err(Yaz0Error::DeclaredSizeTooLarge { .. })
        ));
    }

    #[test]
    fn test_decompressed_size() {
        assert_eq!(decompressed_size(&header(0x1234)).unwrap(), 0x1234);
    }
}
