use crate::dsp::demod::DemodulationMode;
use crate::dsp::kernel::{Kernel, KernelChoice};
use crate::pipeline::PipelineConfig;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Largest UDP payload over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub dsp: DspConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_sps")]
    pub sps: i64,
    /// IQ pairs handed to the pipeline per block.
    #[serde(default = "default_block_samples")]
    pub block_samples: usize,
    #[serde(default)]
    pub driver: InputDriver,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum InputDriver {
    #[serde(rename = "stdin")]
    Stdin {
        #[serde(default)]
        format: IqFormat,
    },
    #[serde(rename = "file")]
    File {
        path: PathBuf,
        #[serde(default)]
        format: IqFormat,
    },
    #[serde(rename = "tcp")]
    Tcp {
        address: String,
        #[serde(default)]
        format: IqFormat,
    },
    #[serde(rename = "soapysdr")]
    SoapySdr(SoapySdrDriver),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoapySdrDriver {
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub channel: usize,
    /// Center frequency in Hz.
    pub frequency: f64,
    /// Manual RF gain in dB. `None` leaves the device's gain mode alone.
    #[serde(default)]
    pub gain: Option<f64>,
    #[serde(default)]
    pub antenna: Option<String>,
}

impl InputDriver {
    /// Sample format of byte-stream drivers; `None` for SoapySDR.
    pub fn format(&self) -> Option<IqFormat> {
        match self {
            Self::Stdin { format } | Self::File { format, .. } | Self::Tcp { format, .. } => {
                Some(*format)
            }
            Self::SoapySdr(_) => None,
        }
    }
}

/// Wire format of raw IQ pairs before conversion to `i16`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IqFormat {
    #[default]
    Cs16,
    Cs8,
    Cu8,
}

impl IqFormat {
    pub fn bytes_per_pair(self) -> usize {
        match self {
            Self::Cs16 => 4,
            Self::Cs8 | Self::Cu8 => 2,
        }
    }

    pub fn from_str_lower(s: &str) -> Option<Self> {
        match s {
            "cs16" => Some(Self::Cs16),
            "cs8" => Some(Self::Cs8),
            "cu8" => Some(Self::Cu8),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DspConfig {
    #[serde(default = "default_iq_decimation")]
    pub iq_decimation: usize,
    #[serde(default = "default_audio_decimation")]
    pub audio_decimation: usize,
    #[serde(default = "default_audio_gain")]
    pub audio_gain: f32,
    #[serde(default = "default_demodulation")]
    pub demodulation: String,
    #[serde(default)]
    pub kernel: KernelChoice,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum OutputConfig {
    #[serde(rename = "stdout")]
    Stdout,
    #[serde(rename = "udp")]
    Udp(UdpOutput),
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdpOutput {
    pub address: String,
    pub port: u16,
    #[serde(default = "default_max_datagram_bytes")]
    pub max_datagram_bytes: usize,
    #[serde(default = "default_multicast_ttl")]
    pub multicast_ttl: u32,
}

impl UdpOutput {
    pub fn new(address: String, port: u16) -> Self {
        Self {
            address,
            port,
            max_datagram_bytes: default_max_datagram_bytes(),
            multicast_ttl: default_multicast_ttl(),
        }
    }
}

fn default_sps() -> i64 {
    2_400_000
}
fn default_block_samples() -> usize {
    120_000
}
fn default_iq_decimation() -> usize {
    10
}
fn default_audio_decimation() -> usize {
    5
}
fn default_audio_gain() -> f32 {
    1.0
}
fn default_demodulation() -> String {
    "FM".to_string()
}
fn default_max_datagram_bytes() -> usize {
    65_000
}
fn default_multicast_ttl() -> u32 {
    1
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            sps: default_sps(),
            block_samples: default_block_samples(),
            driver: InputDriver::default(),
        }
    }
}

impl Default for InputDriver {
    fn default() -> Self {
        Self::Stdin {
            format: IqFormat::default(),
        }
    }
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            iq_decimation: default_iq_decimation(),
            audio_decimation: default_audio_decimation(),
            audio_gain: default_audio_gain(),
            demodulation: default_demodulation(),
            kernel: KernelChoice::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::Stdout
    }
}

pub fn load_from_file(path: &Path) -> anyhow::Result<Config> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Values derived from a validated [`Config`].
#[derive(Debug, Clone)]
pub struct Runtime {
    pub input_sps: i64,
    pub intermediate_sps: f64,
    pub audio_sps: f64,
    pub block_pairs: usize,
    pub format: Option<IqFormat>,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn demodulation_mode(&self) -> anyhow::Result<DemodulationMode> {
        let mode = self.dsp.demodulation.trim().to_uppercase();
        DemodulationMode::from_str_upper(mode.as_str())
            .with_context(|| format!("unknown dsp.demodulation {:?}", self.dsp.demodulation))
    }

    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let cfg = PipelineConfig {
            iq_decimation: self.dsp.iq_decimation,
            audio_decimation: self.dsp.audio_decimation,
            audio_gain: self.dsp.audio_gain,
            mode: self.demodulation_mode()?,
            kernel: Kernel::from_choice(self.dsp.kernel),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn runtime(&self) -> anyhow::Result<Runtime> {
        let pipeline = self.pipeline_config()?;

        let sps = self.input.sps;
        anyhow::ensure!(sps > 0, "input.sps must be > 0");

        let block_pairs = self.input.block_samples;
        anyhow::ensure!(block_pairs > 0, "input.block_samples must be > 0");
        anyhow::ensure!(
            block_pairs % pipeline.iq_decimation == 0,
            "input.block_samples ({block_pairs}) must be a multiple of dsp.iq_decimation ({})",
            pipeline.iq_decimation
        );

        if let OutputConfig::Udp(udp) = &self.output {
            anyhow::ensure!(
                (4..=MAX_UDP_PAYLOAD).contains(&udp.max_datagram_bytes),
                "output.max_datagram_bytes must be within 4..={MAX_UDP_PAYLOAD}"
            );
            anyhow::ensure!(
                udp.max_datagram_bytes % 4 == 0,
                "output.max_datagram_bytes must be a multiple of 4 (one f32 sample)"
            );
            anyhow::ensure!(udp.port > 0, "output.port must be > 0");
        }

        let total = pipeline.total_decimation();
        if sps as u64 % total as u64 != 0 {
            tracing::warn!(
                sps,
                total_decimation = total,
                "input rate is not an integer multiple of the combined decimation"
            );
        }

        Ok(Runtime {
            input_sps: sps,
            intermediate_sps: pipeline.intermediate_rate(sps as f64),
            audio_sps: pipeline.audio_rate(sps as f64),
            block_pairs,
            format: self.input.driver.format(),
            pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.input.sps, 2_400_000);
        assert_eq!(cfg.dsp.iq_decimation, 10);
        assert_eq!(cfg.dsp.audio_decimation, 5);
        assert!(matches!(cfg.output, OutputConfig::Stdout));
        assert!(matches!(
            cfg.input.driver,
            InputDriver::Stdin {
                format: IqFormat::Cs16
            }
        ));
    }

    #[test]
    fn format_names_round_trip_through_serde() {
        let f: IqFormat = serde_json::from_str("\"cu8\"").unwrap();
        assert_eq!(f, IqFormat::Cu8);
        assert_eq!(IqFormat::from_str_lower("cs8"), Some(IqFormat::Cs8));
        assert_eq!(f.bytes_per_pair(), 2);
    }
}
