//! Extended metadata sidecar format using nom
//!
//! Sidecar layout:
//! ```text
//! TXMD
//! [4 bytes: version u32 little-endian]
//! [4 bytes: body length u32 little-endian]
//! ...body...
//! ```

use nom::{
    bytes::complete::tag,
    multi::length_data,
    number::complete::le_u32,
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::{Error, Result};

/// Magic header for extended metadata sidecars
pub const SIDECAR_MAGIC: &[u8] = b"TXMD";

/// Current sidecar format version
pub const SIDECAR_VERSION: u32 = 1;

/// Header length in bytes
pub const SIDECAR_HEADER_LEN: usize = SIDECAR_MAGIC.len() + 8;

fn sidecar(input: &[u8]) -> IResult<&[u8], (u32, &[u8])> {
    preceded(tag(SIDECAR_MAGIC), tuple((le_u32, length_data(le_u32))))(input)
}

/// Parse a sidecar file and return its body
pub fn parse_sidecar(input: &[u8]) -> Result<&[u8]> {
    if input.len() < SIDECAR_HEADER_LEN {
        return Err(Error::Parse("Input too short for sidecar header".to_string()));
    }

    let (rest, (version, body)) = sidecar(input)?;

    if version != SIDECAR_VERSION {
        return Err(Error::Parse(format!("Unsupported sidecar version {}", version)));
    }
    if !rest.is_empty() {
        return Err(Error::Parse(format!("{} trailing bytes after sidecar body", rest.len())));
    }

    Ok(body)
}

/// Encode a sidecar file around `body`
pub fn create_sidecar(body: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(body.len())
        .map_err(|_| Error::Parse(format!("Extended data too large: {} bytes", body.len())))?;

    let mut out = Vec::with_capacity(SIDECAR_HEADER_LEN + body.len());
    out.extend_from_slice(SIDECAR_MAGIC);
    out.extend_from_slice(&SIDECAR_VERSION.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(body);
    Ok(out)
}
