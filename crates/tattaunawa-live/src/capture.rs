//! Microphone capture
//!
//! CPAL input stream accumulating mono f32 samples into fixed-size frames.
//! The device callback only copies samples and forwards full frames over an
//! unbounded channel; volume metering, analyser taps, and PCM encoding all
//! happen downstream so the callback never blocks.

use crate::error::{LiveError, LiveResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A fixed-size block of mono samples straight off the capture device.
/// Self-contained: no cross-frame state is needed to encode it.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
}

/// Microphone capture producing `AudioFrame`s of `frame_size` samples.
pub struct InputCapture {
    sample_rate: u32,
    frame_size: usize,
    device: Device,
    stream_config: StreamConfig,
}

impl InputCapture {
    /// Acquire the default input device. This is the point where the host may
    /// prompt for microphone permission; denial surfaces as `DeviceAccess`.
    pub fn new(sample_rate: u32, frame_size: usize) -> LiveResult<Self> {
        info!("Acquiring capture device ({sample_rate}Hz, {frame_size}-sample frames)");

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| LiveError::DeviceAccess("No input device available".to_string()))?;

        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            sample_rate,
            frame_size,
            device,
            stream_config,
        })
    }

    /// Start the input stream. Full frames are pushed into `frame_tx`; the
    /// returned `Stream` must be kept alive for capture to continue and
    /// dropped to release the device.
    pub fn start(self, frame_tx: mpsc::UnboundedSender<AudioFrame>) -> LiveResult<Stream> {
        let frame_size = self.frame_size;
        let sample_rate = self.sample_rate;
        let mut frame_buffer = Vec::with_capacity(frame_size);

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    frame_buffer.push(sample);
                    if frame_buffer.len() >= frame_size {
                        let frame = AudioFrame {
                            samples: std::mem::replace(
                                &mut frame_buffer,
                                Vec::with_capacity(frame_size),
                            ),
                            sample_rate,
                        };
                        if frame_tx.send(frame).is_err() {
                            // Session side is gone; frames just fall on the floor.
                            return;
                        }
                    }
                }
            },
            move |err| {
                warn!("Capture stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        info!("Capture started");

        Ok(stream)
    }

    /// List available input devices.
    pub fn list_input_devices() -> LiveResult<Vec<String>> {
        let host = cpal::default_host();
        let mut names = Vec::new();
        for device in host.input_devices()? {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }
}
