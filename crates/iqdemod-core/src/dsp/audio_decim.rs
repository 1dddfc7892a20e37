/// Partial averaging window of one audio stream.
///
/// `counter` stays in `0..decimation` between calls; `accumulator` is the sum
/// of the samples counted so far.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioDecimState {
    pub accumulator: f32,
    pub counter: usize,
}

impl AudioDecimState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards the partial window.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.counter = 0;
    }

    pub fn pending(&self) -> usize {
        self.counter
    }
}

/// Averages every `decimation` input samples into one output sample scaled
/// by `gain`: `y = (x[k] + .. + x[k + decimation - 1]) * (gain / decimation)`.
///
/// Windows span call boundaries: samples that do not complete a window stay
/// in `state` for the next call. `out` is cleared first and only holds this
/// call's results. `decimation == 0` produces nothing and leaves `state` as is.
pub fn downsample_audio(
    input: &[f32],
    out: &mut Vec<f32>,
    decimation: usize,
    state: &mut AudioDecimState,
    gain: f32,
) {
    out.clear();
    if decimation == 0 {
        return;
    }

    let scale = gain / decimation as f32;
    out.reserve((state.counter + input.len()) / decimation);

    for &v in input {
        state.accumulator += v;
        state.counter += 1;
        if state.counter == decimation {
            out.push(state.accumulator * scale);
            state.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn empty_input_emits_nothing() {
        let mut state = AudioDecimState::new();
        let mut out = vec![9.0];
        downsample_audio(&[], &mut out, 4, &mut state, 1.0);
        assert!(out.is_empty());
        assert_eq!(state, AudioDecimState::new());
    }

    #[test]
    fn short_input_is_held_in_state() {
        let mut state = AudioDecimState::new();
        let mut out = Vec::new();
        downsample_audio(&[1.0, 2.0, 3.0], &mut out, 4, &mut state, 1.0);
        assert!(out.is_empty());
        assert_eq!(state.pending(), 3);
        assert!((state.accumulator - 6.0).abs() < 1e-6);
    }

    #[test]
    fn averages_complete_windows() {
        let mut state = AudioDecimState::new();
        let mut out = Vec::new();
        downsample_audio(&[1.0, 3.0, 5.0, 7.0], &mut out, 2, &mut state, 1.0);
        assert!(approx(&out, &[2.0, 6.0]));
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn gain_scales_the_average() {
        let mut state = AudioDecimState::new();
        let mut out = Vec::new();
        downsample_audio(&[2.0, 4.0, 6.0], &mut out, 3, &mut state, 0.5);
        assert!(approx(&out, &[2.0]));
    }

    #[test]
    fn windows_span_calls() {
        let mut state = AudioDecimState::new();
        let mut out = Vec::new();

        downsample_audio(&[1.0, 2.0, 3.0], &mut out, 2, &mut state, 1.0);
        assert!(approx(&out, &[1.5]));

        downsample_audio(&[4.0, 5.0, 6.0], &mut out, 2, &mut state, 1.0);
        assert!(approx(&out, &[3.5, 5.5]));
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn zero_decimation_is_a_no_op() {
        let mut state = AudioDecimState {
            accumulator: 1.0,
            counter: 1,
        };
        let mut out = vec![3.0];
        downsample_audio(&[1.0, 2.0], &mut out, 0, &mut state, 1.0);
        assert!(out.is_empty());
        assert_eq!(state.counter, 1);
    }

    #[test]
    fn decimation_of_ten() {
        let input: Vec<f32> = (1..=20).map(|v| v as f32).collect();
        let mut state = AudioDecimState::new();
        let mut out = Vec::new();
        downsample_audio(&input, &mut out, 10, &mut state, 1.0);
        assert!(approx(&out, &[5.5, 15.5]));
    }
}
