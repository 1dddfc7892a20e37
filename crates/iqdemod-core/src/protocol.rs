//! Audio block wire format: bare native-endian `f32` samples, no header.
//! Sample rate and channel count are fixed by the configured decimation and
//! must be agreed out of band.

pub const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

pub fn encode_audio_block(samples: &[f32]) -> &[u8] {
    bytemuck::cast_slice(samples)
}

/// Decodes a received block. Trailing bytes that do not form a full sample
/// are ignored.
pub fn decode_audio_block(bytes: &[u8]) -> Vec<f32> {
    let whole = bytes.len() - bytes.len() % BYTES_PER_SAMPLE;
    bytemuck::pod_collect_to_vec(&bytes[..whole])
}

/// Splits an encoded block into datagram payloads of at most `max_bytes`,
/// never cutting a sample in half.
pub fn datagrams(bytes: &[u8], max_bytes: usize) -> std::slice::Chunks<'_, u8> {
    let per_datagram = (max_bytes / BYTES_PER_SAMPLE).max(1) * BYTES_PER_SAMPLE;
    bytes.chunks(per_datagram)
}
