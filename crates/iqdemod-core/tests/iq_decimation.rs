use iqdemod_core::dsp::iq_decim::{downsample_iq, downsample_iq_with, VECTOR_CHUNK_PAIRS};
use iqdemod_core::dsp::kernel::Kernel;
use num_complex::Complex32;
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

fn decimate(kernel: Kernel, input: &[i16], decimation: usize) -> Vec<Complex32> {
    let mut out = Vec::new();
    downsample_iq_with(kernel, input, &mut out, decimation);
    out
}

fn total(samples: &[Complex32]) -> Complex32 {
    samples
        .iter()
        .fold(Complex32::new(0.0, 0.0), |acc, v| acc + *v)
}

proptest! {
    #[test]
    fn decimation_is_associative_under_summation(
        n1 in 1usize..=6,
        n2 in 1usize..=6,
        k in 1usize..=3,
        seed in any::<u64>(),
    ) {
        let pairs = n1 * n2 * k;
        let mut rng = StdRng::seed_from_u64(seed);
        let input: Vec<i16> = (0..pairs * 2).map(|_| rng.gen()).collect();

        let whole = decimate(Kernel::Scalar, &input, pairs);
        prop_assert_eq!(whole.len(), 1);
        for n in [n1, n2] {
            let parts = decimate(Kernel::Scalar, &input, n);
            prop_assert_eq!(parts.len(), pairs / n);
            prop_assert_eq!(total(&parts), whole[0]);
        }
    }

    #[test]
    fn input_shorter_than_one_stride_is_empty(
        decimation in 2usize..=32,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let len = rng.gen_range(0..decimation * 2);
        let input: Vec<i16> = (0..len).map(|_| rng.gen()).collect();
        for kernel in [Kernel::Scalar, Kernel::Vector] {
            prop_assert!(decimate(kernel, &input, decimation).is_empty());
        }
    }

    #[test]
    fn vector_and_scalar_kernels_agree(
        input in proptest::collection::vec(any::<i16>(), 0..2048),
        decimation in 1usize..=40,
    ) {
        let scalar = decimate(Kernel::Scalar, &input, decimation);
        let vector = decimate(Kernel::Vector, &input, decimation);
        prop_assert_eq!(scalar, vector);
    }
}

#[test]
fn kernels_agree_on_full_scale_noise_around_the_chunk_width() {
    let mut rng = StdRng::seed_from_u64(123);
    let input: Vec<i16> = (0..65_536).map(|_| rng.gen_range(-32768..=32767)).collect();

    let widths = [
        1,
        VECTOR_CHUNK_PAIRS - 1,
        VECTOR_CHUNK_PAIRS,
        VECTOR_CHUNK_PAIRS + 1,
        10,
        2 * VECTOR_CHUNK_PAIRS,
        20,
        3 * VECTOR_CHUNK_PAIRS + 5,
    ];
    for decimation in widths {
        let scalar = decimate(Kernel::Scalar, &input, decimation);
        let vector = decimate(Kernel::Vector, &input, decimation);
        assert_eq!(scalar.len(), 32_768 / decimation);
        for (s, v) in scalar.iter().zip(vector.iter()) {
            let tol = 1e-3 * s.norm().max(1.0);
            assert!((s - v).norm() <= tol, "decimation {decimation}: {s} vs {v}");
        }
    }
}

#[test]
fn default_entry_point_reuses_output_buffer() {
    let mut out = Vec::with_capacity(4);
    downsample_iq(&[1, -1, 1, -1, 1, -1], &mut out, 3);
    assert_eq!(out, vec![Complex32::new(3.0, -3.0)]);
    downsample_iq(&[], &mut out, 3);
    assert!(out.is_empty());
}
