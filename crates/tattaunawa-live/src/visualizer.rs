//! Frequency-domain visual feedback
//!
//! Two analysers tap the capture and playback paths; both receive samples
//! continuously, but only the "active" one (output while the remote party
//! speaks, input otherwise) is rendered. A display-rate loop republishes the
//! active analyser's byte-scaled magnitude bins through a watch channel. The
//! loop never touches the audio paths and is cancellable independently of
//! session teardown.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::SessionConfig;

struct AnalyserInner {
    /// Most recent `fft_size` samples, oldest first.
    recent: Vec<f32>,
    /// Exponentially smoothed magnitudes, one per bin.
    smoothed: Vec<f32>,
}

/// A fixed-size frequency analyser: keeps the last `fft_size` samples and
/// produces smoothed, byte-scaled magnitude bins on demand.
pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    /// Pre-computed Hann window.
    window: Vec<f32>,
    smoothing: f32,
    fft_size: usize,
    inner: Mutex<AnalyserInner>,
}

impl SpectrumAnalyser {
    pub fn new(fft_size: usize, smoothing: f32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / (fft_size - 1) as f32).cos())
            })
            .collect();
        Self {
            fft,
            window,
            smoothing,
            fft_size,
            inner: Mutex::new(AnalyserInner {
                recent: vec![0.0; fft_size],
                smoothed: vec![0.0; fft_size / 2],
            }),
        }
    }

    /// Feed samples from an audio path. Read-only with respect to the caller's
    /// buffer; only the trailing `fft_size` samples are retained.
    pub fn push(&self, samples: &[f32]) {
        // try_lock so a render tick in progress can never stall an audio task.
        let Ok(mut inner) = self.inner.try_lock() else {
            return;
        };
        if samples.len() >= self.fft_size {
            inner
                .recent
                .copy_from_slice(&samples[samples.len() - self.fft_size..]);
        } else {
            inner.recent.rotate_left(samples.len());
            let start = self.fft_size - samples.len();
            inner.recent[start..].copy_from_slice(samples);
        }
    }

    /// Current magnitude bins scaled to 0..=255, `fft_size / 2` of them.
    /// Applies the exponential smoothing as part of the read.
    pub fn bins(&self) -> Vec<u8> {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut spectrum: Vec<Complex<f32>> = inner
            .recent
            .iter()
            .zip(self.window.iter())
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut spectrum);

        let scale = 2.0 / self.fft_size as f32;
        let smoothing = self.smoothing;
        for (bin, value) in inner.smoothed.iter_mut().zip(spectrum.iter()) {
            let magnitude = (value.norm() * scale).min(1.0);
            *bin = smoothing * *bin + (1.0 - smoothing) * magnitude;
        }

        inner.smoothed.iter().map(|m| (m * 255.0) as u8).collect()
    }
}

/// Publishes a frequency snapshot of whichever audio path is active.
pub struct SignalVisualizer {
    input: Arc<SpectrumAnalyser>,
    output: Arc<SpectrumAnalyser>,
    snapshot_tx: watch::Sender<Vec<u8>>,
    render_interval: Duration,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SignalVisualizer {
    /// Create the visualizer plus the snapshot receiver handed to the UI shell.
    pub fn new(config: &SessionConfig) -> (Arc<Self>, watch::Receiver<Vec<u8>>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(vec![0u8; config.spectrum_bins()]);
        let viz = Arc::new(Self {
            input: Arc::new(SpectrumAnalyser::new(config.fft_size, config.smoothing)),
            output: Arc::new(SpectrumAnalyser::new(config.fft_size, config.smoothing)),
            snapshot_tx,
            render_interval: Duration::from_secs(1) / config.render_rate_hz.max(1),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        });
        (viz, snapshot_rx)
    }

    /// Analyser tapped from the capture path.
    pub fn input_analyser(&self) -> Arc<SpectrumAnalyser> {
        Arc::clone(&self.input)
    }

    /// Analyser tapped from the playback path.
    pub fn output_analyser(&self) -> Arc<SpectrumAnalyser> {
        Arc::clone(&self.output)
    }

    /// Start the render loop. Each tick reads the analyser selected by the
    /// "remote speaking" flag and republishes its bins.
    pub fn start(self: &Arc<Self>, speaking_rx: watch::Receiver<bool>) {
        self.running.store(true, Ordering::SeqCst);
        let viz = Arc::clone(self);
        let running = Arc::clone(&self.running);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(viz.render_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let analyser = if *speaking_rx.borrow() {
                    &viz.output
                } else {
                    &viz.input
                };
                if viz.snapshot_tx.send(analyser.bins()).is_err() {
                    // All receivers gone; nothing left to render for.
                    break;
                }
            }
            debug!("Visualizer render loop finished");
        });

        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(handle);
        }
    }

    /// Cancel the render loop. Safe to call while a tick is in flight, more
    /// than once, and after the session itself is gone.
    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}
