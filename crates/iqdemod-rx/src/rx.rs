use crate::input::RawSource;
use iqdemod_core::pipeline::{Pipeline, PipelineStats};
use iqdemod_core::protocol;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Reads blocks from `source` until it ends, the stop flag is raised or the
/// transport goes away. Runs on a blocking thread.
pub fn run_dsp_loop(
    mut source: Box<dyn RawSource>,
    mut pipeline: Pipeline,
    block_pairs: usize,
    tx: mpsc::Sender<Vec<u8>>,
    stop_requested: Arc<AtomicBool>,
) -> anyhow::Result<PipelineStats> {
    let mut raw = vec![0i16; block_pairs * 2];
    let mut last_report = Instant::now();

    loop {
        if stop_requested.load(Ordering::Relaxed) {
            tracing::debug!("dsp loop stopping on request");
            break;
        }

        let n = source.read_block(&mut raw)?;
        if n == 0 {
            tracing::info!("input ended");
            break;
        }

        let audio = pipeline.process_block(&raw[..n]);
        if !audio.is_empty() {
            let bytes = protocol::encode_audio_block(audio).to_vec();
            if tx.blocking_send(bytes).is_err() {
                tracing::debug!("transport closed; stopping dsp loop");
                break;
            }
        }

        if last_report.elapsed() >= STATS_INTERVAL {
            let stats = pipeline.stats();
            tracing::debug!(
                blocks = stats.blocks,
                iq_pairs = stats.iq_pairs,
                audio_samples = stats.audio_samples,
                dropped_pairs = stats.dropped_pairs,
                "dsp progress"
            );
            last_report = Instant::now();
        }
    }

    Ok(pipeline.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iqdemod_core::dsp::demod::DemodulationMode;
    use iqdemod_core::dsp::kernel::Kernel;
    use iqdemod_core::pipeline::PipelineConfig;

    struct Blocks(Vec<Vec<i16>>);

    impl RawSource for Blocks {
        fn read_block(&mut self, out: &mut [i16]) -> anyhow::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            let block = self.0.remove(0);
            out[..block.len()].copy_from_slice(&block);
            Ok(block.len())
        }
    }

    fn am_pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig {
            iq_decimation: 2,
            audio_decimation: 2,
            audio_gain: 1.0,
            mode: DemodulationMode::Am,
            kernel: Kernel::Scalar,
        })
        .unwrap()
    }

    #[test]
    fn streams_audio_until_input_ends() {
        let source = Blocks(vec![vec![1, 2, 2, 2, 3, 4, 3, 4], vec![3, 4, 3, 4]]);
        let (tx, mut rx) = mpsc::channel(8);
        let stats = run_dsp_loop(
            Box::new(source),
            am_pipeline(),
            4,
            tx,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.audio_samples, 1);
        let block = rx.try_recv().unwrap();
        assert_eq!(protocol::decode_audio_block(&block), vec![7.5]);
        // Second block only fills half an audio window.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stop_flag_ends_the_loop_before_reading() {
        let source = Blocks(vec![vec![1, 2, 2, 2, 3, 4, 3, 4]]);
        let (tx, _rx) = mpsc::channel(8);
        let stats = run_dsp_loop(
            Box::new(source),
            am_pipeline(),
            4,
            tx,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();
        assert_eq!(stats.blocks, 0);
    }

    #[test]
    fn closed_transport_stops_the_loop() {
        let source = Blocks(vec![vec![1, 2, 2, 2, 3, 4, 3, 4]; 3]);
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let stats = run_dsp_loop(
            Box::new(source),
            am_pipeline(),
            4,
            tx,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        assert_eq!(stats.blocks, 1);
    }
}
