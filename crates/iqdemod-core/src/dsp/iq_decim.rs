//! Boxcar decimation of interleaved `i16` IQ pairs.
//!
//! Each output sample is the *sum* of `decimation` consecutive IQ pairs. The
//! division by `decimation` is intentionally left out: FM demodulation only
//! looks at phase, and the audio stage applies its own gain.

use super::kernel::Kernel;
use num_complex::Complex32;

const IQ_COMPONENTS: usize = 2;

/// IQ pairs summed per vector step.
pub const VECTOR_CHUNK_PAIRS: usize = 8;

/// Decimates `input` using the fastest kernel available on this CPU.
///
/// See [`downsample_iq_with`] for the exact contract.
pub fn downsample_iq(input: &[i16], out: &mut Vec<Complex32>, decimation: usize) {
    downsample_iq_with(Kernel::detect(), input, out, decimation);
}

/// Sums every complete group of `decimation` IQ pairs in `input` into one
/// complex sample.
///
/// `out` is cleared first. A trailing group with fewer than `decimation`
/// pairs is dropped and not carried to the next call, so an input shorter
/// than one group yields an empty output rather than an error. A dangling
/// odd `i16` is ignored. `decimation == 0` also yields an empty output.
///
/// Sums are accumulated in `i64` and converted to `f32` once per group, so
/// both kernels produce identical values.
pub fn downsample_iq_with(
    kernel: Kernel,
    input: &[i16],
    out: &mut Vec<Complex32>,
    decimation: usize,
) {
    out.clear();

    let Some(stride) = decimation.checked_mul(IQ_COMPONENTS) else {
        return;
    };
    if stride == 0 || input.len() < stride {
        return;
    }

    out.reserve(input.len() / stride);
    let groups = input.chunks_exact(stride);

    if kernel.is_accelerated() {
        for group in groups {
            // SAFETY: is_accelerated() confirmed the CPU supports the target
            // feature vector::sum_group is compiled with.
            let (si, sq) = unsafe { vector::sum_group(group) };
            out.push(Complex32::new(si as f32, sq as f32));
        }
    } else {
        for group in groups {
            let (si, sq) = sum_pairs_scalar(group);
            out.push(Complex32::new(si as f32, sq as f32));
        }
    }
}

fn sum_pairs_scalar(pairs: &[i16]) -> (i64, i64) {
    let mut si = 0i64;
    let mut sq = 0i64;
    for pair in pairs.chunks_exact(IQ_COMPONENTS) {
        si += i64::from(pair[0]);
        sq += i64::from(pair[1]);
    }
    (si, sq)
}

#[cfg(target_arch = "x86_64")]
mod vector {
    use super::{sum_pairs_scalar, IQ_COMPONENTS, VECTOR_CHUNK_PAIRS};
    use std::arch::x86_64::*;

    // Each i32 lane gains at most 2 * 32768 per chunk; reducing into i64
    // every FLUSH_CHUNKS keeps the lanes from wrapping on long groups.
    const FLUSH_CHUNKS: usize = 16_384;

    /// # Safety
    /// The CPU must support SSE2.
    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn sum_group(group: &[i16]) -> (i64, i64) {
        // madd multiplies i16 lanes and adds neighbours into i32 lanes. With
        // a (1, 0) mask each i32 lane holds one widened I, with (0, 1) one Q.
        let mask_i = _mm_set1_epi32(0x0000_0001);
        let mask_q = _mm_set1_epi32(0x0001_0000);
        let chunk_len = VECTOR_CHUNK_PAIRS * IQ_COMPONENTS;

        let mut si = 0i64;
        let mut sq = 0i64;
        for span in group.chunks(FLUSH_CHUNKS * chunk_len) {
            let mut acc_i = _mm_setzero_si128();
            let mut acc_q = _mm_setzero_si128();

            let mut chunks = span.chunks_exact(chunk_len);
            for chunk in &mut chunks {
                let ptr = chunk.as_ptr() as *const __m128i;
                let lo = _mm_loadu_si128(ptr);
                let hi = _mm_loadu_si128(ptr.add(1));
                acc_i = _mm_add_epi32(
                    acc_i,
                    _mm_add_epi32(_mm_madd_epi16(lo, mask_i), _mm_madd_epi16(hi, mask_i)),
                );
                acc_q = _mm_add_epi32(
                    acc_q,
                    _mm_add_epi32(_mm_madd_epi16(lo, mask_q), _mm_madd_epi16(hi, mask_q)),
                );
            }

            let mut lanes_i = [0i32; 4];
            let mut lanes_q = [0i32; 4];
            _mm_storeu_si128(lanes_i.as_mut_ptr() as *mut __m128i, acc_i);
            _mm_storeu_si128(lanes_q.as_mut_ptr() as *mut __m128i, acc_q);

            let (rem_i, rem_q) = sum_pairs_scalar(chunks.remainder());
            si += lanes_i.iter().map(|&v| i64::from(v)).sum::<i64>() + rem_i;
            sq += lanes_q.iter().map(|&v| i64::from(v)).sum::<i64>() + rem_q;
        }
        (si, sq)
    }
}

#[cfg(target_arch = "aarch64")]
mod vector {
    use super::{sum_pairs_scalar, IQ_COMPONENTS, VECTOR_CHUNK_PAIRS};
    use std::arch::aarch64::*;

    /// # Safety
    /// The CPU must support NEON.
    #[target_feature(enable = "neon")]
    pub(super) unsafe fn sum_group(group: &[i16]) -> (i64, i64) {
        let mut si = 0i64;
        let mut sq = 0i64;

        let mut chunks = group.chunks_exact(VECTOR_CHUNK_PAIRS * IQ_COMPONENTS);
        for chunk in &mut chunks {
            // De-interleaves 8 pairs into an I vector and a Q vector.
            let iq = vld2q_s16(chunk.as_ptr());
            si += i64::from(vaddlvq_s16(iq.0));
            sq += i64::from(vaddlvq_s16(iq.1));
        }

        let (rem_i, rem_q) = sum_pairs_scalar(chunks.remainder());
        (si + rem_i, sq + rem_q)
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod vector {
    /// # Safety
    /// Always safe; there is no vector path on this target.
    pub(super) unsafe fn sum_group(group: &[i16]) -> (i64, i64) {
        super::sum_pairs_scalar(group)
    }
}
