//! Session configuration
//!
//! One config struct per session; the defaults carry the tuned constants of the
//! production deployment (16kHz uplink, 24kHz downlink, 4096-sample frames).

/// Configuration for a live duplex session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL of the live voice service.
    pub service_url: String,

    /// Prebuilt voice the service should answer with (default: "Kore").
    pub voice: String,

    /// Microphone sample rate in Hz (default: 16000).
    pub input_sample_rate: u32,

    /// Sample rate of inbound synthesized audio in Hz (default: 24000).
    pub output_sample_rate: u32,

    /// Capture frame size in samples (default: 4096, ~256ms at 16kHz).
    /// Each frame is encoded and transmitted independently.
    pub frame_size: usize,

    /// Gain applied to the per-frame RMS before clamping to [0, 1] for the
    /// volume meter (default: 5.0).
    pub volume_gain: f32,

    /// FFT size for the visualizer analysers (default: 64, giving 32 bins).
    /// Must be a power of two.
    pub fft_size: usize,

    /// Exponential smoothing factor for analyser magnitudes in [0, 1)
    /// (default: 0.8). Higher is smoother.
    pub smoothing: f32,

    /// Target render cadence for the visualizer loop in Hz (default: 60).
    pub render_rate_hz: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_url: "wss://live.tattaunawa360.app/v1/session".to_string(),
            voice: "Kore".to_string(),
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            frame_size: 4096,
            volume_gain: 5.0,
            fft_size: 64,
            smoothing: 0.8,
            render_rate_hz: 60,
        }
    }
}

impl SessionConfig {
    /// Number of frequency bins published per visualizer snapshot (fft_size / 2).
    pub fn spectrum_bins(&self) -> usize {
        self.fft_size / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let c = SessionConfig::default();
        assert_eq!(c.input_sample_rate, 16_000);
        assert_eq!(c.output_sample_rate, 24_000);
        assert_eq!(c.frame_size, 4096);
        assert_eq!(c.fft_size, 64);
        assert_eq!(c.spectrum_bins(), 32);
        assert_eq!(c.voice, "Kore");
    }
}
