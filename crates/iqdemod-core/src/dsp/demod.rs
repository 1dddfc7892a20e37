use super::kernel::Kernel;
use num_complex::Complex32;

/// Complex samples per AM vector step.
pub const AM_CHUNK_SAMPLES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemodulationMode {
    Am,
    Fm,
}

impl DemodulationMode {
    pub fn from_str_upper(s: &str) -> Option<Self> {
        match s {
            "AM" => Some(Self::Am),
            "FM" | "FMC" | "NFM" | "NBFM" | "WBFM" => Some(Self::Fm),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Am => "AM",
            Self::Fm => "FM",
        }
    }
}

/// Phase-continuity state of one FM stream.
///
/// Holds the last complex sample seen so the first sample of the next block
/// is differenced against it. Starts at `0 + 0i`. One instance per stream.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DemodState {
    pub prev_iq: Complex32,
}

impl DemodState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.prev_iq = Complex32::new(0.0, 0.0);
    }
}

/// Polar discriminator: `out[n] = arg(x[n] * conj(x[n-1]))`.
///
/// `x[-1]` is taken from `state`, and `state` holds the block's last sample
/// afterwards, so a stream split into blocks of any size demodulates exactly
/// like one long block. Output has one sample per input sample. A product
/// of zero magnitude yields `0.0`, whatever the signs of its zero parts.
pub fn demodulate_fm(input: &[Complex32], out: &mut Vec<f32>, state: &mut DemodState) {
    out.clear();
    out.reserve(input.len());

    let mut prev = state.prev_iq;
    for v in input {
        out.push(phase_step(*v * prev.conj()));
        prev = *v;
    }
    state.prev_iq = prev;
}

// atan2(+0, -0) is pi; a zero product must read as no phase change.
#[inline]
fn phase_step(d: Complex32) -> f32 {
    if d.re == 0.0 && d.im == 0.0 {
        0.0
    } else {
        d.arg()
    }
}

/// Envelope detector using the fastest kernel available on this CPU.
pub fn demodulate_am(input: &[Complex32], out: &mut Vec<f32>) {
    demodulate_am_with(Kernel::detect(), input, out);
}

/// `out[n] = sqrt(re² + im²)`. Stateless; `out` is cleared first.
pub fn demodulate_am_with(kernel: Kernel, input: &[Complex32], out: &mut Vec<f32>) {
    out.clear();
    out.reserve(input.len());

    if kernel.is_accelerated() {
        // SAFETY: is_accelerated() confirmed the CPU supports the target
        // feature vector::envelopes is compiled with.
        unsafe { vector::envelopes(input, out) };
    } else {
        out.extend(input.iter().map(envelope));
    }
}

#[inline]
fn envelope(v: &Complex32) -> f32 {
    (v.re * v.re + v.im * v.im).sqrt()
}

#[cfg(target_arch = "x86_64")]
mod vector {
    use super::{envelope, AM_CHUNK_SAMPLES};
    use num_complex::Complex32;
    use std::arch::x86_64::*;

    /// # Safety
    /// The CPU must support SSE2.
    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn envelopes(input: &[Complex32], out: &mut Vec<f32>) {
        let mut chunks = input.chunks_exact(AM_CHUNK_SAMPLES);
        for chunk in &mut chunks {
            // Complex32 is repr(C) { re, im }, so a chunk is 8 packed floats.
            let ptr = chunk.as_ptr() as *const f32;
            let a = _mm_loadu_ps(ptr);
            let b = _mm_loadu_ps(ptr.add(4));
            let a2 = _mm_mul_ps(a, a);
            let b2 = _mm_mul_ps(b, b);
            let re2 = _mm_shuffle_ps::<0b10_00_10_00>(a2, b2);
            let im2 = _mm_shuffle_ps::<0b11_01_11_01>(a2, b2);
            let mag = _mm_sqrt_ps(_mm_add_ps(re2, im2));

            let mut lanes = [0.0f32; AM_CHUNK_SAMPLES];
            _mm_storeu_ps(lanes.as_mut_ptr(), mag);
            out.extend_from_slice(&lanes);
        }
        out.extend(chunks.remainder().iter().map(envelope));
    }
}

#[cfg(target_arch = "aarch64")]
mod vector {
    use super::{envelope, AM_CHUNK_SAMPLES};
    use num_complex::Complex32;
    use std::arch::aarch64::*;

    /// # Safety
    /// The CPU must support NEON.
    #[target_feature(enable = "neon")]
    pub(super) unsafe fn envelopes(input: &[Complex32], out: &mut Vec<f32>) {
        let mut chunks = input.chunks_exact(AM_CHUNK_SAMPLES);
        for chunk in &mut chunks {
            let iq = vld2q_f32(chunk.as_ptr() as *const f32);
            let sum = vaddq_f32(vmulq_f32(iq.0, iq.0), vmulq_f32(iq.1, iq.1));
            let mag = vsqrtq_f32(sum);

            let mut lanes = [0.0f32; AM_CHUNK_SAMPLES];
            vst1q_f32(lanes.as_mut_ptr(), mag);
            out.extend_from_slice(&lanes);
        }
        out.extend(chunks.remainder().iter().map(envelope));
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod vector {
    use num_complex::Complex32;

    /// # Safety
    /// Always safe; there is no vector path on this target.
    pub(super) unsafe fn envelopes(input: &[Complex32], out: &mut Vec<f32>) {
        out.extend(input.iter().map(super::envelope));
    }
}
