use crate::dsp::{
    audio_decim::{downsample_audio, AudioDecimState},
    demod::{demodulate_am_with, demodulate_fm, DemodState, DemodulationMode},
    iq_decim::downsample_iq_with,
    kernel::Kernel,
};
use num_complex::Complex32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub iq_decimation: usize,
    pub audio_decimation: usize,
    pub audio_gain: f32,
    pub mode: DemodulationMode,
    pub kernel: Kernel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            iq_decimation: 10,
            audio_decimation: 5,
            audio_gain: 1.0,
            mode: DemodulationMode::Fm,
            kernel: Kernel::detect(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.iq_decimation >= 1, "iq decimation must be >= 1");
        anyhow::ensure!(self.audio_decimation >= 1, "audio decimation must be >= 1");
        anyhow::ensure!(
            self.iq_decimation.checked_mul(self.audio_decimation).is_some(),
            "combined decimation overflows"
        );
        anyhow::ensure!(
            self.audio_gain.is_finite(),
            "audio gain must be finite (got {})",
            self.audio_gain
        );
        Ok(())
    }

    pub fn total_decimation(&self) -> usize {
        self.iq_decimation.saturating_mul(self.audio_decimation)
    }

    /// Sample rate after IQ decimation.
    pub fn intermediate_rate(&self, input_sps: f64) -> f64 {
        input_sps / self.iq_decimation as f64
    }

    /// Sample rate of the finished audio.
    pub fn audio_rate(&self, input_sps: f64) -> f64 {
        input_sps / self.total_decimation() as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub blocks: u64,
    pub iq_pairs: u64,
    /// Pairs lost to incomplete IQ decimation groups at block ends.
    pub dropped_pairs: u64,
    pub audio_samples: u64,
}

/// One stream's run through IQ decimation, demodulation and audio
/// decimation.
///
/// Owns the stream's state objects and the scratch buffers between stages.
/// Feed blocks in stream order; use one `Pipeline` per stream.
pub struct Pipeline {
    cfg: PipelineConfig,
    demod: DemodState,
    audio: AudioDecimState,
    iq_buf: Vec<Complex32>,
    demod_buf: Vec<f32>,
    audio_buf: Vec<f32>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        tracing::debug!(
            iq_decimation = cfg.iq_decimation,
            audio_decimation = cfg.audio_decimation,
            audio_gain = cfg.audio_gain,
            mode = cfg.mode.as_str(),
            kernel = cfg.kernel.as_str(),
            accelerated = cfg.kernel.is_accelerated(),
            "pipeline created"
        );
        Ok(Self {
            cfg,
            demod: DemodState::new(),
            audio: AudioDecimState::new(),
            iq_buf: Vec::new(),
            demod_buf: Vec::new(),
            audio_buf: Vec::new(),
            stats: PipelineStats::default(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn demod_state(&self) -> &DemodState {
        &self.demod
    }

    pub fn audio_state(&self) -> &AudioDecimState {
        &self.audio
    }

    /// Runs one raw interleaved IQ block through the chain and returns the
    /// audio it produced. The slice is only valid until the next call.
    ///
    /// Pairs beyond the last complete IQ decimation group are dropped, so
    /// blocks should hold a multiple of `iq_decimation` pairs.
    pub fn process_block(&mut self, raw: &[i16]) -> &[f32] {
        let kernel = self.cfg.kernel;
        downsample_iq_with(kernel, raw, &mut self.iq_buf, self.cfg.iq_decimation);

        match self.cfg.mode {
            DemodulationMode::Fm => demodulate_fm(&self.iq_buf, &mut self.demod_buf, &mut self.demod),
            DemodulationMode::Am => demodulate_am_with(kernel, &self.iq_buf, &mut self.demod_buf),
        }

        downsample_audio(
            &self.demod_buf,
            &mut self.audio_buf,
            self.cfg.audio_decimation,
            &mut self.audio,
            self.cfg.audio_gain,
        );

        let pairs = (raw.len() / 2) as u64;
        self.stats.blocks += 1;
        self.stats.iq_pairs += pairs;
        self.stats.dropped_pairs += pairs % self.cfg.iq_decimation as u64;
        self.stats.audio_samples += self.audio_buf.len() as u64;

        tracing::trace!(
            pairs,
            decimated = self.iq_buf.len(),
            audio = self.audio_buf.len(),
            "block processed"
        );

        &self.audio_buf
    }

    /// Switches demodulation mid-stream. FM phase and the audio window are
    /// kept.
    pub fn set_mode(&mut self, mode: DemodulationMode) {
        if mode != self.cfg.mode {
            tracing::debug!(from = self.cfg.mode.as_str(), to = mode.as_str(), "mode changed");
            self.cfg.mode = mode;
        }
    }

    pub fn set_gain(&mut self, gain: f32) -> anyhow::Result<()> {
        anyhow::ensure!(gain.is_finite(), "audio gain must be finite (got {gain})");
        self.cfg.audio_gain = gain;
        Ok(())
    }

    /// Clears FM phase and any partial audio window, as at stream start.
    pub fn reset(&mut self) {
        self.demod.reset();
        self.audio.reset();
    }
}
