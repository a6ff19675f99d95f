//! Framing arithmetic shared by every operation kind.
use super::{
    OperationCode, OperationMeta,
    header::{HEADER_SIZE, MAX_KEY_LENGTH, RequestHeader},
};

/// Builds the header for a request whose parts have the given lengths.
///
/// Lengths in the header always match the slices passed in; callers must pass
/// the same slices to [`write_frame`].
pub fn create_header(
    opcode: OperationCode,
    meta: &OperationMeta,
    extras: &[u8],
    body: &[u8],
    key: &[u8],
) -> [u8; HEADER_SIZE] {
    debug_assert!(key.len() <= MAX_KEY_LENGTH);
    debug_assert!(extras.len() <= u8::MAX as usize);

    RequestHeader::new(
        opcode,
        extras.len() as u8,
        key.len() as u16,
        body.len() as u32,
        meta.vbucket,
        meta.opaque(),
        meta.cas,
    )
    .to_bytes()
}

/// Copies header, extras, key and body back to back into one buffer.
pub fn write_frame(header: &[u8; HEADER_SIZE], extras: &[u8], key: &[u8], body: &[u8]) -> Vec<u8> {
    let len = header.len() + extras.len() + key.len() + body.len();
    let mut buffer = vec![0; len];

    let mut offset = 0;
    for part in [&header[..], extras, key, body] {
        buffer[offset..offset + part.len()].clone_from_slice(part);
        offset += part.len();
    }

    buffer
}
