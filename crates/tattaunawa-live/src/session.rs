//! Session lifecycle and coordination
//!
//! `SessionController` owns the single source of truth for session state and
//! wires the capture, transport, playback, interruption, and visualizer paths
//! together. Three independent cadences feed one logical state: the device
//! callback (frame rate), the render loop (display rate), and channel receipt
//! (whenever the network delivers). `close()` is the one cancellation point
//! and is safe against any in-flight callback.

use crate::capture::{AudioFrame, InputCapture};
use crate::config::SessionConfig;
use crate::context::ConsultantContext;
use crate::error::{ErrorCategory, LiveError, LiveResult};
use crate::interrupt::InterruptionCoordinator;
use crate::pcm;
use crate::playback::{AudioOut, Clock, PlaybackScheduler, RodioOut, SystemClock};
use crate::transport::{self, ChannelHandle, ClientEvent, ServerEvent};
use crate::visualizer::SignalVisualizer;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle state of a session. Error and Closed are terminal, except that
/// `close()` may still move Error to Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Error,
    Closed,
}

impl SessionState {
    /// The full transition table. Everything not listed here is rejected:
    /// Connecting→Connected, Connecting→Error, Connected→Error, any→Closed.
    pub fn can_transition(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Connecting, Connected) | (Connecting, Error) | (Connected, Error)
        ) || (to == Closed && self != Closed)
    }
}

/// Lifecycle events delivered to the embedding shell.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connecting,
    Connected,
    Error {
        category: ErrorCategory,
        message: String,
    },
    Closed,
}

struct Shared {
    state: Mutex<SessionState>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Shared {
    fn state(&self) -> SessionState {
        match self.state.lock() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Apply a transition if the table allows it, emitting the matching
    /// event. Illegal transitions are ignored, not errors.
    fn transition(&self, to: SessionState, event: SessionEvent) -> bool {
        let mut state = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !state.can_transition(to) {
            debug!("Ignoring illegal transition {:?} -> {:?}", *state, to);
            return false;
        }
        debug!("Session state {:?} -> {:?}", *state, to);
        *state = to;
        drop(state);
        let _ = self.event_tx.send(event);
        true
    }

    fn fail(&self, error: &LiveError) {
        self.transition(
            SessionState::Error,
            SessionEvent::Error {
                category: error.category(),
                message: error.to_string(),
            },
        );
    }
}

/// Builds live sessions from a configuration.
pub struct SessionController {
    config: SessionConfig,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> LiveResult<Self> {
        if !config.fft_size.is_power_of_two() || config.fft_size < 2 {
            return Err(LiveError::Config(format!(
                "FFT size must be a power of two, got {}",
                config.fft_size
            )));
        }
        if config.frame_size == 0
            || config.input_sample_rate == 0
            || config.output_sample_rate == 0
        {
            return Err(LiveError::Config(
                "Sample rates and frame size must be non-zero".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Establish the transport channel, send the grounding setup, acquire the
    /// microphone, and transition Connecting→Connected. Channel failure and
    /// device denial both fail the start; if the device fails after the
    /// channel came up, the channel is torn down before returning.
    pub async fn start(&self, context: ConsultantContext) -> LiveResult<Session> {
        let channel = transport::connect(&self.config).await?;
        let out: Arc<dyn AudioOut> = Arc::new(RodioOut::new()?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        self.wire(context, channel, out, clock, true)
    }

    /// Wire a session over an already-established channel with explicit audio
    /// output and clock, without acquiring a capture device. The embedder (or
    /// test) injects frames through `Session::frame_sender()`.
    pub fn start_with_channel(
        &self,
        context: ConsultantContext,
        channel: ChannelHandle,
        out: Arc<dyn AudioOut>,
        clock: Arc<dyn Clock>,
    ) -> LiveResult<Session> {
        self.wire(context, channel, out, clock, false)
    }

    fn wire(
        &self,
        context: ConsultantContext,
        channel: ChannelHandle,
        out: Arc<dyn AudioOut>,
        clock: Arc<dyn Clock>,
        acquire_device: bool,
    ) -> LiveResult<Session> {
        let config = self.config.clone();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Connecting),
            event_tx,
        });
        let _ = shared.event_tx.send(SessionEvent::Connecting);
        info!(
            "Starting live session ({} consultant(s) in grounding context)",
            context.len()
        );

        let (visualizer, spectrum_rx) = SignalVisualizer::new(&config);
        let (scheduler, speaking_rx) = PlaybackScheduler::new(
            clock,
            out,
            Some(visualizer.output_analyser()),
            config.output_sample_rate,
        );
        let coordinator = Arc::new(InterruptionCoordinator::new(Arc::clone(&scheduler)));
        let (volume_tx, volume_rx) = watch::channel(0.0f32);
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<AudioFrame>();

        let (sender, mut receiver) = channel.split();
        let setup = ClientEvent::setup(&config, &context);
        if let Err(e) = sender.send(setup) {
            let error = LiveError::ChannelSetup(e.to_string());
            shared.fail(&error);
            return Err(error);
        }

        // Device acquisition happens after the channel is up; on failure the
        // channel halves are dropped here, which closes the socket.
        let mic_stream = if acquire_device {
            let capture = match InputCapture::new(config.input_sample_rate, config.frame_size) {
                Ok(c) => c,
                Err(e) => {
                    shared.fail(&e);
                    return Err(e);
                }
            };
            match capture.start(frame_tx.clone()) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    shared.fail(&e);
                    return Err(e);
                }
            }
        } else {
            None
        };

        shared.transition(SessionState::Connected, SessionEvent::Connected);

        // Uplink: frames -> volume meter + input analyser tap -> PCM16 -> channel.
        // Frames arriving while not Connected are dropped without queueing; in
        // a terminal state the task exits, releasing the sender and with it
        // the socket.
        let uplink = {
            let shared = Arc::clone(&shared);
            let input_tap = visualizer.input_analyser();
            let gain = config.volume_gain;
            tokio::spawn(async move {
                while let Some(frame) = frame_rx.recv().await {
                    match shared.state() {
                        SessionState::Connected => {}
                        SessionState::Connecting => continue,
                        SessionState::Error | SessionState::Closed => break,
                    }
                    volume_tx.send_replace(pcm::rms_volume(&frame.samples, gain));
                    input_tap.push(&frame.samples);
                    let payload = pcm::encode_pcm16(&frame.samples, frame.sample_rate);
                    if sender.send(ClientEvent::audio(payload)).is_err() {
                        let error =
                            LiveError::ChannelRuntime("Uplink channel closed".to_string());
                        warn!("{error}");
                        shared.fail(&error);
                        break;
                    }
                }
                debug!("Uplink task finished");
            })
        };

        // Downlink: inbound chunks to the scheduler, control signals to the
        // coordinator and state machine. Terminal signals take the uplink task
        // down with them so the channel closes without waiting for the
        // embedder's close().
        let uplink_abort = uplink.abort_handle();
        let downlink = {
            let shared = Arc::clone(&shared);
            let scheduler = Arc::clone(&scheduler);
            let coordinator = Arc::clone(&coordinator);
            let visualizer = Arc::clone(&visualizer);
            tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    match event {
                        ServerEvent::Audio { data } => match scheduler.enqueue_base64(&data) {
                            Ok(_) => {}
                            Err(LiveError::Decode(e)) => {
                                warn!("Dropping malformed audio chunk: {e}");
                            }
                            Err(e) => warn!("Playback failed: {e}"),
                        },
                        ServerEvent::Interrupted => coordinator.on_interrupted(),
                        ServerEvent::Closed => {
                            info!("Service closed the session");
                            scheduler.cancel_all();
                            visualizer.cancel();
                            shared.transition(SessionState::Closed, SessionEvent::Closed);
                            uplink_abort.abort();
                            break;
                        }
                        ServerEvent::Error { message } => {
                            let error = LiveError::ChannelRuntime(message);
                            warn!("{error}");
                            scheduler.cancel_all();
                            visualizer.cancel();
                            shared.fail(&error);
                            uplink_abort.abort();
                            break;
                        }
                    }
                }
                debug!("Downlink task finished");
            })
        };

        visualizer.start(speaking_rx.clone());

        Ok(Session {
            shared,
            scheduler,
            visualizer,
            coordinator,
            frame_tx,
            mic_stream,
            uplink: Some(uplink),
            downlink: Some(downlink),
            event_rx: Some(event_rx),
            speaking_rx,
            spectrum_rx,
            volume_rx,
        })
    }
}

/// A running live session.
///
/// Not `Send`: the capture stream is bound to the thread that started it, so
/// keep the session on that thread (the async tasks it spawns are unaffected).
pub struct Session {
    shared: Arc<Shared>,
    scheduler: Arc<PlaybackScheduler>,
    visualizer: Arc<SignalVisualizer>,
    coordinator: Arc<InterruptionCoordinator>,
    frame_tx: mpsc::UnboundedSender<AudioFrame>,
    mic_stream: Option<cpal::Stream>,
    uplink: Option<JoinHandle<()>>,
    downlink: Option<JoinHandle<()>>,
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    speaking_rx: watch::Receiver<bool>,
    spectrum_rx: watch::Receiver<Vec<u8>>,
    volume_rx: watch::Receiver<f32>,
}

impl Session {
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Take the lifecycle event receiver. Returns `None` after the first call.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx.take()
    }

    /// Whether the remote party is currently speaking.
    pub fn remote_speaking(&self) -> bool {
        *self.speaking_rx.borrow()
    }

    /// Watch the "remote is speaking" flag.
    pub fn watch_remote_speaking(&self) -> watch::Receiver<bool> {
        self.speaking_rx.clone()
    }

    /// Watch the visualizer's frequency snapshot (spectrum_bins magnitudes).
    pub fn watch_spectrum(&self) -> watch::Receiver<Vec<u8>> {
        self.spectrum_rx.clone()
    }

    /// Watch the per-frame microphone volume sample in [0, 1].
    pub fn watch_volume(&self) -> watch::Receiver<f32> {
        self.volume_rx.clone()
    }

    /// Sender for injecting capture frames when the embedder owns the device
    /// (also used in tests).
    pub fn frame_sender(&self) -> mpsc::UnboundedSender<AudioFrame> {
        self.frame_tx.clone()
    }

    /// Number of barge-ins handled so far.
    pub fn interruptions(&self) -> u64 {
        self.coordinator.interruptions()
    }

    /// Current playback cursor (next available start time).
    pub fn playback_cursor(&self) -> std::time::Duration {
        self.scheduler.cursor()
    }

    /// Number of inbound buffers scheduled but not yet finished or cancelled.
    pub fn pending_playback(&self) -> usize {
        self.scheduler.active_len()
    }

    /// Close the session: stop in-flight playback, release the capture
    /// device, close the transport channel, and cancel the render loop.
    /// Idempotent, legal from any state, and safe while callbacks are in
    /// flight.
    pub fn close(&mut self) {
        let transitioned = self
            .shared
            .transition(SessionState::Closed, SessionEvent::Closed);
        self.scheduler.cancel_all();
        self.visualizer.cancel();
        if let Some(handle) = self.uplink.take() {
            // Dropping the uplink task releases the channel sender, which
            // closes the socket.
            handle.abort();
        }
        if let Some(handle) = self.downlink.take() {
            handle.abort();
        }
        self.mic_stream = None;
        if transitioned {
            info!("Session closed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
