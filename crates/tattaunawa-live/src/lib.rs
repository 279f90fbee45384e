//! # Tattaunawa Live - Real-Time Duplex Voice Sessions
//!
//! This crate implements the live voice session of the Tattaunawa360
//! marketplace: microphone audio streams up to a remote conversational
//! service, synthesized speech streams back and plays gaplessly, and the user
//! can barge in mid-utterance. Built on bare metal Rust for minimal latency.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Session Controller                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │   Mic In     │→ │ PCM16 Encode │→ │   Channel    │ ⇄ svc │
//! │  │    (cpal)    │  │  (base64)    │  │ (websocket)  │      │
//! │  └──────┬───────┘  └──────────────┘  └──────┬───────┘      │
//! │         ↓ tap                               ↓               │
//! │  ┌──────────────┐                   ┌──────────────┐       │
//! │  │  Visualizer  │←──────── tap ─────│  Playback    │       │
//! │  │  (rustfft)   │    Kill Signal    │  Scheduler   │       │
//! │  └──────────────┘  ┌─────────────┐  │  (rodio)     │       │
//! │                    │ Interruption │→ └──────────────┘       │
//! │                    │ Coordinator  │                         │
//! │                    └─────────────┘                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod context;
pub mod error;
pub mod interrupt;
pub mod pcm;
pub mod playback;
pub mod session;
pub mod transport;
pub mod visualizer;

pub use capture::{AudioFrame, InputCapture};
pub use config::SessionConfig;
pub use context::{Consultant, ConsultantContext};
pub use error::{ErrorCategory, LiveError, LiveResult};
pub use interrupt::InterruptionCoordinator;
pub use pcm::{decode_base64_pcm16, decode_pcm16, encode_pcm16, rms_volume, PcmPayload};
pub use playback::{
    AudioOut, Clock, NullOut, PlaybackBuffer, PlaybackScheduler, RodioOut, ScheduledChunk,
    SystemClock,
};
pub use session::{Session, SessionController, SessionEvent, SessionState};
pub use transport::{ChannelHandle, ChannelSender, ClientEvent, RemoteEnd, ServerEvent};
pub use visualizer::{SignalVisualizer, SpectrumAnalyser};
