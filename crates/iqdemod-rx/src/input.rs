#[cfg(feature = "soapysdr")]
mod soapysdr;

use anyhow::Context;
use iqdemod_core::config::{InputConfig, InputDriver};
use iqdemod_core::dsp::sample::IqBlockReader;
use std::io::Read;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Producer of raw interleaved `i16` IQ blocks.
pub trait RawSource: Send {
    /// Fills `out` with whole IQ pairs and returns the number of `i16`
    /// values written. `Ok(0)` means the source has ended.
    fn read_block(&mut self, out: &mut [i16]) -> anyhow::Result<usize>;
}

impl<R: Read + Send> RawSource for IqBlockReader<R> {
    fn read_block(&mut self, out: &mut [i16]) -> anyhow::Result<usize> {
        IqBlockReader::read_block(self, out)
    }
}

pub fn open(
    input: &InputConfig,
    stop_requested: Arc<AtomicBool>,
) -> anyhow::Result<(Box<dyn RawSource>, &'static str)> {
    match &input.driver {
        InputDriver::Stdin { format } => Ok((
            Box::new(IqBlockReader::new(std::io::stdin(), *format)),
            "stdin",
        )),
        InputDriver::File { path, format } => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("open input file {}", path.display()))?;
            Ok((Box::new(IqBlockReader::new(file, *format)), "file"))
        }
        InputDriver::Tcp { address, format } => {
            let stream = std::net::TcpStream::connect(address.as_str())
                .with_context(|| format!("connect to {address}"))?;
            stream.set_nodelay(true).context("set TCP_NODELAY")?;
            tracing::info!(address = %address, "connected to IQ server");
            Ok((Box::new(IqBlockReader::new(stream, *format)), "tcp"))
        }
        InputDriver::SoapySdr(driver) => {
            #[cfg(feature = "soapysdr")]
            {
                Ok((
                    Box::new(soapysdr::open(driver, input.sps, stop_requested)?),
                    "soapysdr",
                ))
            }

            #[cfg(not(feature = "soapysdr"))]
            {
                let _ = (driver, stop_requested);
                anyhow::bail!(
                    "SoapySDR input support is disabled (rebuild with Cargo feature \"soapysdr\")"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iqdemod_core::config::IqFormat;
    use std::io::Write;

    #[test]
    fn file_driver_streams_blocks() {
        let path = std::env::temp_dir().join(format!("iqdemod-input-{}.cs16", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        for v in [1i16, -1, 2, -2] {
            file.write_all(&v.to_ne_bytes()).unwrap();
        }
        drop(file);

        let input = InputConfig {
            driver: InputDriver::File {
                path: path.clone(),
                format: IqFormat::Cs16,
            },
            ..InputConfig::default()
        };
        let (mut source, name) = open(&input, Arc::new(AtomicBool::new(false))).unwrap();
        assert_eq!(name, "file");

        let mut buf = [0i16; 8];
        assert_eq!(source.read_block(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[1, -1, 2, -2]);
        assert_eq!(source.read_block(&mut buf).unwrap(), 0);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let input = InputConfig {
            driver: InputDriver::File {
                path: "/nonexistent/iq.cs16".into(),
                format: IqFormat::Cs16,
            },
            ..InputConfig::default()
        };
        assert!(open(&input, Arc::new(AtomicBool::new(false))).is_err());
    }
}
