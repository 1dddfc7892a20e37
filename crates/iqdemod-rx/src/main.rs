mod banner;
mod build_info;
mod input;
mod logging;
mod output;
mod rx;
mod shutdown;

use anyhow::Context;
use clap::Parser;
use iqdemod_core::config::{
    self, Config, InputDriver, IqFormat, OutputConfig, SoapySdrDriver, UdpOutput,
};
use iqdemod_core::dsp::kernel::{self, KernelChoice};
use iqdemod_core::pipeline::{Pipeline, PipelineStats};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const TRANSPORT_QUEUE_BLOCKS: usize = 32;
const DSP_STOP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(
    name = "iqdemod-rx",
    version,
    about = "Demodulate an IQ stream to mono float audio"
)]
struct Args {
    /// JSON config file; built-in defaults are used when omitted
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Center frequency in MHz (selects the SoapySDR driver)
    #[arg(short = 'f', long)]
    frequency: Option<f64>,

    /// Manual RF gain in dB (SoapySDR only)
    #[arg(short = 'g', long)]
    gain: Option<f64>,

    /// SoapySDR device arguments (example: driver=rtlsdr)
    #[arg(long)]
    device: Option<String>,

    /// UDP destination address; requires --port
    #[arg(short = 'a', long)]
    address: Option<String>,

    /// UDP destination port; requires --address
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Demodulation mode (FM, NFM, WBFM, AM)
    #[arg(short = 'm', long)]
    mode: Option<String>,

    /// Linear gain applied after audio decimation
    #[arg(long)]
    audio_gain: Option<f32>,

    /// Inner-loop kernel: auto, scalar or vector
    #[arg(long)]
    kernel: Option<String>,

    /// Raw sample format for stdin/file/tcp input: cs16, cs8 or cu8
    #[arg(long)]
    input_format: Option<String>,

    /// Read IQ from a file instead of stdin
    #[arg(long, conflicts_with = "tcp")]
    input_file: Option<PathBuf>,

    /// Read IQ from a TCP server (host:port)
    #[arg(long)]
    tcp: Option<String>,

    /// Verbose logging for iqdemod crates (RUST_LOG overrides)
    #[arg(long)]
    debug: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _guards = logging::init(&logging::LoggingConfig {
        debug: args.debug,
        log_dir: args.log_dir.clone(),
        ..logging::LoggingConfig::default()
    })?;
    banner::log_startup_banner();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("iqdemod-rt")
        .build()
        .context("build tokio runtime")?;

    let result = runtime.block_on(run(args));
    // A DSP thread stuck in a blocking read must not hold the process open.
    runtime.shutdown_timeout(Duration::from_millis(500));

    match result {
        Ok(stats) => {
            tracing::info!(
                blocks = stats.blocks,
                iq_pairs = stats.iq_pairs,
                audio_samples = stats.audio_samples,
                dropped_pairs = stats.dropped_pairs,
                "stopped"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = ?e, "fatal");
            Err(e)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<PipelineStats> {
    let mut cfg = match &args.config {
        Some(path) => config::load_from_file(path)?,
        None => Config::default(),
    };
    apply_overrides(&mut cfg, &args)?;
    let rt = cfg.runtime()?;

    tracing::info!(
        input_sps = rt.input_sps,
        intermediate_sps = rt.intermediate_sps,
        audio_sps = rt.audio_sps,
        block_pairs = rt.block_pairs,
        format = ?rt.format,
        mode = rt.pipeline.mode.as_str(),
        kernel = rt.pipeline.kernel.as_str(),
        simd = kernel::simd_description(),
        "configuration"
    );

    let stop_requested = Arc::new(AtomicBool::new(false));
    let (source, driver_name) = input::open(&cfg.input, stop_requested.clone())?;
    tracing::info!(driver = driver_name, "input opened");

    let pipeline = Pipeline::new(rt.pipeline)?;
    let sink = output::AudioSink::open(&cfg.output).await?;
    tracing::info!(output = %sink.describe(), "output opened");

    let (tx, rx_blocks) = mpsc::channel::<Vec<u8>>(TRANSPORT_QUEUE_BLOCKS);
    let transport = tokio::spawn(output::run_transport(sink, rx_blocks));

    let dsp_stop = stop_requested.clone();
    let block_pairs = rt.block_pairs;
    let mut dsp = tokio::task::spawn_blocking(move || {
        rx::run_dsp_loop(source, pipeline, block_pairs, tx, dsp_stop)
    });

    let joined = tokio::select! {
        res = &mut dsp => Some(res),
        _ = shutdown::shutdown_signal() => {
            stop_requested.store(true, Ordering::Relaxed);
            match tokio::time::timeout(DSP_STOP_GRACE, &mut dsp).await {
                Ok(res) => Some(res),
                Err(_) => {
                    tracing::warn!("dsp loop still blocked on input; abandoning it");
                    None
                }
            }
        }
    };

    let stats = match joined {
        Some(res) => res.context("join dsp loop")??,
        None => {
            // The abandoned loop still holds the sender.
            transport.abort();
            return Ok(PipelineStats::default());
        }
    };

    if let Err(e) = transport.await {
        tracing::warn!(error = ?e, "transport task failed");
    }
    Ok(stats)
}

fn apply_overrides(cfg: &mut Config, args: &Args) -> anyhow::Result<()> {
    // Switching drivers keeps the sample format the config file chose.
    let format = cfg.input.driver.format().unwrap_or_default();
    if let Some(path) = &args.input_file {
        cfg.input.driver = InputDriver::File {
            path: path.clone(),
            format,
        };
    }
    if let Some(address) = &args.tcp {
        cfg.input.driver = InputDriver::Tcp {
            address: address.clone(),
            format,
        };
    }

    if let Some(mhz) = args.frequency {
        anyhow::ensure!(
            mhz.is_finite() && mhz > 0.0,
            "frequency must be a positive number of MHz"
        );
        let hz = (mhz * 1e6).round();
        match &mut cfg.input.driver {
            InputDriver::SoapySdr(driver) => driver.frequency = hz,
            other => {
                *other = InputDriver::SoapySdr(SoapySdrDriver {
                    device: String::new(),
                    channel: 0,
                    frequency: hz,
                    gain: None,
                    antenna: None,
                })
            }
        }
    }

    match &mut cfg.input.driver {
        InputDriver::SoapySdr(driver) => {
            if let Some(device) = &args.device {
                driver.device = device.clone();
            }
            if let Some(gain) = args.gain {
                driver.gain = Some(gain);
            }
        }
        _ => {
            if args.gain.is_some() || args.device.is_some() {
                anyhow::bail!("--gain and --device only apply to SoapySDR input (pass -f)");
            }
        }
    }

    if let Some(name) = &args.input_format {
        let parsed = IqFormat::from_str_lower(name.trim().to_ascii_lowercase().as_str())
            .with_context(|| format!("unknown input format {name:?} (expected cs16, cs8 or cu8)"))?;
        match &mut cfg.input.driver {
            InputDriver::Stdin { format }
            | InputDriver::File { format, .. }
            | InputDriver::Tcp { format, .. } => *format = parsed,
            InputDriver::SoapySdr(_) => {
                anyhow::bail!("--input-format does not apply to SoapySDR input")
            }
        }
    }

    match (&args.address, args.port) {
        (Some(address), Some(port)) => {
            let udp = match &cfg.output {
                OutputConfig::Udp(existing) => UdpOutput {
                    address: address.clone(),
                    port,
                    ..existing.clone()
                },
                OutputConfig::Stdout => UdpOutput::new(address.clone(), port),
            };
            cfg.output = OutputConfig::Udp(udp);
        }
        (None, None) => {}
        _ => anyhow::bail!("--address and --port must be given together"),
    }

    if let Some(mode) = &args.mode {
        cfg.dsp.demodulation = mode.clone();
    }
    if let Some(gain) = args.audio_gain {
        cfg.dsp.audio_gain = gain;
    }
    if let Some(name) = &args.kernel {
        cfg.dsp.kernel = KernelChoice::from_str_lower(name.trim().to_ascii_lowercase().as_str())
            .with_context(|| format!("unknown kernel {name:?} (expected auto, scalar or vector)"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("iqdemod-rx").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn every_flag_has_help_text() {
        use clap::CommandFactory;
        let cmd = Args::command();
        for arg in cmd.get_arguments() {
            let id = arg.get_id().as_str();
            if id == "help" || id == "version" {
                continue;
            }
            assert!(arg.get_help().is_some(), "--{id} has no help text");
        }
    }

    #[test]
    fn address_and_port_select_udp_output() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, &parse(&["-a", "239.1.2.3", "-p", "7355"])).unwrap();
        match cfg.output {
            OutputConfig::Udp(udp) => {
                assert_eq!(udp.address, "239.1.2.3");
                assert_eq!(udp.port, 7355);
                assert_eq!(udp.max_datagram_bytes, 65_000);
            }
            OutputConfig::Stdout => panic!("expected udp output"),
        }
    }

    #[test]
    fn address_without_port_is_rejected() {
        let mut cfg = Config::default();
        assert!(apply_overrides(&mut cfg, &parse(&["-a", "10.0.0.1"])).is_err());
    }

    #[test]
    fn frequency_switches_to_soapysdr_in_hz() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, &parse(&["-f", "100.1", "-g", "30"])).unwrap();
        match cfg.input.driver {
            InputDriver::SoapySdr(driver) => {
                assert_eq!(driver.frequency, 100_100_000.0);
                assert_eq!(driver.gain, Some(30.0));
            }
            other => panic!("unexpected driver {other:?}"),
        }
    }

    #[test]
    fn gain_without_soapysdr_is_rejected() {
        let mut cfg = Config::default();
        assert!(apply_overrides(&mut cfg, &parse(&["-g", "30"])).is_err());
    }

    #[test]
    fn dsp_overrides_reach_the_runtime() {
        let mut cfg = Config::default();
        let args = parse(&[
            "-m",
            "am",
            "--audio-gain",
            "2.5",
            "--kernel",
            "scalar",
            "--input-format",
            "cu8",
        ]);
        apply_overrides(&mut cfg, &args).unwrap();
        let rt = cfg.runtime().unwrap();
        assert_eq!(rt.pipeline.mode.as_str(), "AM");
        assert_eq!(rt.pipeline.audio_gain, 2.5);
        assert_eq!(rt.pipeline.kernel.as_str(), "scalar");
        assert_eq!(rt.format, Some(IqFormat::Cu8));
    }

    #[test]
    fn input_file_keeps_the_configured_format() {
        let mut cfg = Config::default();
        cfg.input.driver = InputDriver::Stdin {
            format: IqFormat::Cu8,
        };
        apply_overrides(&mut cfg, &parse(&["--input-file", "capture.cu8"])).unwrap();
        match &cfg.input.driver {
            InputDriver::File { path, format } => {
                assert_eq!(path, &PathBuf::from("capture.cu8"));
                assert_eq!(*format, IqFormat::Cu8);
            }
            other => panic!("unexpected driver {other:?}"),
        }

        let mut cfg = Config::default();
        cfg.input.driver = InputDriver::File {
            path: "old.cs8".into(),
            format: IqFormat::Cs8,
        };
        apply_overrides(&mut cfg, &parse(&["--tcp", "127.0.0.1:1234"])).unwrap();
        assert_eq!(cfg.input.driver.format(), Some(IqFormat::Cs8));
    }

    #[test]
    fn input_format_flag_wins_over_the_configured_one() {
        let mut cfg = Config::default();
        cfg.input.driver = InputDriver::Stdin {
            format: IqFormat::Cu8,
        };
        let args = parse(&["--input-file", "capture.raw", "--input-format", "cs16"]);
        apply_overrides(&mut cfg, &args).unwrap();
        assert_eq!(cfg.input.driver.format(), Some(IqFormat::Cs16));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let mut cfg = Config::default();
        assert!(apply_overrides(&mut cfg, &parse(&["--kernel", "gpu"])).is_err());
        let mut cfg = Config::default();
        assert!(apply_overrides(&mut cfg, &parse(&["--input-format", "f32"])).is_err());
    }
}
