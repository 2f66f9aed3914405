use thiserror::Error;

/// Errors produced while reading a Yaz0 stream.
///
/// Every variant describes malformed input; the codec never panics on bad data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Yaz0Error {
    #[error("invalid Yaz0 magic: {0:02x?}")]
    InvalidMagic([u8; 4]),

    #[error("stream of {0} bytes is too short to hold a Yaz0 header")]
    TruncatedHeader(usize),

    #[error("unexpected end of compressed data at offset {offset:#x}")]
    UnexpectedEof { offset: usize },

    #[error("back-reference of distance {distance} at output position {position} points before the start of output")]
    InvalidBackReference { distance: usize, position: usize },

    #[error("declared size {declared} cannot be produced from {available} bytes of compressed data")]
    DeclaredSizeTooLarge { declared: u32, available: usize },

    #[error("input of {0} bytes does not fit the 32-bit Yaz0 size field")]
    InputTooLarge(usize),
}
