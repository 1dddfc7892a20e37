use crate::config::IqFormat;
use anyhow::Context;
use std::io::{ErrorKind, Read};

/// Reads raw IQ pairs in any [`IqFormat`] and hands them out as interleaved
/// `i16` blocks.
pub struct IqBlockReader<R> {
    reader: R,
    format: IqFormat,
    scratch_u8: Vec<u8>,
    eof: bool,
}

impl<R: Read> IqBlockReader<R> {
    pub fn new(reader: R, format: IqFormat) -> Self {
        Self {
            reader,
            format,
            scratch_u8: Vec::new(),
            eof: false,
        }
    }

    pub fn format(&self) -> IqFormat {
        self.format
    }

    /// Fills `out` with as many whole IQ pairs as fit and returns the number
    /// of `i16` values written (always even).
    ///
    /// Blocks until `out` is full or the source ends. Returns `Ok(0)` once the
    /// source is exhausted; a partial pair at the very end is dropped.
    pub fn read_block(&mut self, out: &mut [i16]) -> anyhow::Result<usize> {
        if self.eof {
            return Ok(0);
        }
        let pairs = out.len() / 2;
        let out = &mut out[..pairs * 2];

        match self.format {
            IqFormat::Cs16 => self.read_cs16(out),
            IqFormat::Cs8 => self.read_8bit(out, |b| (b as i8) as i16),
            IqFormat::Cu8 => self.read_8bit(out, |b| U8_TO_I8[b as usize] as i16),
        }
    }

    fn read_cs16(&mut self, out: &mut [i16]) -> anyhow::Result<usize> {
        let raw: &mut [u8] = bytemuck::cast_slice_mut(out);
        let filled = fill(&mut self.reader, raw, &mut self.eof)?;
        Ok(filled / self.format.bytes_per_pair() * 2)
    }

    fn read_8bit(&mut self, out: &mut [i16], widen: impl Fn(u8) -> i16) -> anyhow::Result<usize> {
        if self.scratch_u8.len() < out.len() {
            self.scratch_u8.resize(out.len(), 0u8);
        }
        let raw = &mut self.scratch_u8[..out.len()];
        let filled = fill(&mut self.reader, raw, &mut self.eof)?;

        let values = filled / self.format.bytes_per_pair() * 2;
        for (dst, src) in out[..values].iter_mut().zip(raw.iter().copied()) {
            *dst = widen(src) << 8;
        }
        Ok(values)
    }
}

/// Reads until `buf` is full or EOF; returns the bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8], eof: &mut bool) -> anyhow::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                *eof = true;
                break;
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("input sample read"),
        }
    }
    Ok(filled)
}

// Unsigned 8-bit samples are centered at 128; xor 0x80 recenters them at 0.
static U8_TO_I8: [i8; 256] = {
    let mut lut = [0i8; 256];
    let mut i = 0usize;
    while i < 256 {
        lut[i] = ((i as u8) ^ 0x80) as i8;
        i += 1;
    }
    lut
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cu8_lut_is_centered() {
        assert_eq!(U8_TO_I8[0], -128);
        assert_eq!(U8_TO_I8[128], 0);
        assert_eq!(U8_TO_I8[255], 127);
    }

    #[test]
    fn odd_output_length_only_fills_whole_pairs() {
        let input: Vec<u8> = vec![1, 2, 3, 4];
        let mut reader = IqBlockReader::new(Cursor::new(input), IqFormat::Cs8);
        let mut out = [0i16; 3];
        assert_eq!(reader.read_block(&mut out).unwrap(), 2);
        assert_eq!(out, [256, 512, 0]);
    }
}
