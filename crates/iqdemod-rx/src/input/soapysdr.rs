use super::RawSource;
use anyhow::Context;
use iqdemod_core::config::SoapySdrDriver;
use num_complex::Complex;
use soapysdr::{Device, Direction, ErrorCode, RxStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const READ_TIMEOUT_US: i64 = 200_000;

pub struct SoapySource {
    _device: Device,
    stream: RxStream<Complex<i16>>,
    scratch: Vec<Complex<i16>>,
    stop_requested: Arc<AtomicBool>,
}

pub fn open(
    driver: &SoapySdrDriver,
    sps: i64,
    stop_requested: Arc<AtomicBool>,
) -> anyhow::Result<SoapySource> {
    let ch = driver.channel;
    let device = Device::new(driver.device.as_str())
        .with_context(|| format!("open SoapySDR device {:?}", driver.device))?;

    device
        .set_sample_rate(Direction::Rx, ch, sps as f64)
        .context("set sample rate")?;
    device
        .set_frequency(Direction::Rx, ch, driver.frequency, ())
        .context("set frequency")?;
    if let Some(antenna) = driver.antenna.as_deref() {
        device
            .set_antenna(Direction::Rx, ch, antenna)
            .with_context(|| format!("set antenna {antenna:?}"))?;
    }
    if let Some(gain) = driver.gain {
        device
            .set_gain_mode(Direction::Rx, ch, false)
            .context("disable AGC")?;
        device
            .set_gain(Direction::Rx, ch, gain)
            .context("set gain")?;
    }

    let mut stream = device
        .rx_stream::<Complex<i16>>(&[ch])
        .context("open rx stream")?;
    stream.activate(None).context("activate rx stream")?;

    tracing::info!(
        device = %driver.device,
        channel = ch,
        frequency = driver.frequency,
        gain = ?driver.gain,
        sps,
        "SoapySDR stream active"
    );

    Ok(SoapySource {
        _device: device,
        stream,
        scratch: Vec::new(),
        stop_requested,
    })
}

impl RawSource for SoapySource {
    fn read_block(&mut self, out: &mut [i16]) -> anyhow::Result<usize> {
        let pairs = out.len() / 2;
        if self.scratch.len() < pairs {
            self.scratch.resize(pairs, Complex::new(0, 0));
        }

        // Fill the whole block so IQ decimation groups never straddle blocks.
        let mut filled = 0usize;
        while filled < pairs {
            if self.stop_requested.load(Ordering::Relaxed) {
                return Ok(0);
            }
            match self
                .stream
                .read(&mut [&mut self.scratch[filled..pairs]], READ_TIMEOUT_US)
            {
                Ok(n) => filled += n,
                Err(e) if e.code == ErrorCode::Timeout || e.code == ErrorCode::Overflow => {
                    tracing::trace!(error = %e, "soapysdr read retry");
                }
                Err(e) => return Err(e).context("soapysdr read"),
            }
        }

        for (dst, s) in out.chunks_exact_mut(2).zip(self.scratch[..pairs].iter()) {
            dst[0] = s.re;
            dst[1] = s.im;
        }
        Ok(pairs * 2)
    }
}
