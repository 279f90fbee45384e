//! Gapless playback scheduling for inbound speech
//!
//! Chunks arrive in bursts; scheduling each one at `max(cursor, now)` and
//! advancing the cursor by the chunk's duration keeps playback gapless while
//! the network keeps up and degrades to silence (never overlap) when it does
//! not. The cursor, the active buffer set, and the interruption reset are all
//! guarded by a single mutex so a buffer finishing naturally can never race a
//! barge-in reset.

use crate::error::{LiveError, LiveResult};
use crate::pcm;
use crate::visualizer::SpectrumAnalyser;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Monotonic playback clock. Production uses the process clock; tests drive a
/// manual one.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Wall clock anchored at creation.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Sink for decoded audio. Appended buffers play back-to-back; `stop_all`
/// cuts everything queued, best-effort.
pub trait AudioOut: Send + Sync {
    fn play(&self, samples: Vec<f32>, sample_rate: u32) -> LiveResult<()>;
    fn stop_all(&self);
}

enum OutCmd {
    Play { samples: Vec<f32>, sample_rate: u32 },
    StopAll,
}

/// Rodio-backed output. The `OutputStream` is not Send, so it lives on a
/// dedicated thread and takes commands over a channel.
pub struct RodioOut {
    cmd_tx: mpsc::UnboundedSender<OutCmd>,
}

impl RodioOut {
    pub fn new() -> LiveResult<Self> {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<OutCmd>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<LiveResult<()>>();

        thread::spawn(move || {
            let (stream, handle) = match OutputStream::try_default() {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = ready_tx.send(Err(LiveError::Playback(e.to_string())));
                    return;
                }
            };
            let sink = match Sink::try_new(&handle) {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(LiveError::Playback(e.to_string())));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            info!("Playback output ready");

            while let Some(cmd) = cmd_rx.blocking_recv() {
                match cmd {
                    OutCmd::Play {
                        samples,
                        sample_rate,
                    } => sink.append(SamplesBuffer::new(1, sample_rate, samples)),
                    OutCmd::StopAll => sink.stop(),
                }
            }
            // Keep the stream alive for the thread's lifetime.
            drop(stream);
            debug!("Playback output thread finished");
        });

        ready_rx
            .recv()
            .map_err(|_| LiveError::Playback("Output thread died during init".to_string()))??;
        Ok(Self { cmd_tx })
    }
}

impl AudioOut for RodioOut {
    fn play(&self, samples: Vec<f32>, sample_rate: u32) -> LiveResult<()> {
        self.cmd_tx
            .send(OutCmd::Play {
                samples,
                sample_rate,
            })
            .map_err(|e| LiveError::Playback(e.to_string()))
    }

    fn stop_all(&self) {
        // Best-effort: stopping after the output thread is gone is a no-op.
        let _ = self.cmd_tx.send(OutCmd::StopAll);
    }
}

/// A decoded inbound chunk with a known duration. Owned by the scheduler from
/// arrival until playback completes or the buffer is cancelled.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Start/duration of a scheduled chunk, relative to the playback clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledChunk {
    pub start: Duration,
    pub duration: Duration,
}

struct SchedulerState {
    /// Next available start time. Never decreases except on interruption.
    cursor: Duration,
    /// Buffers scheduled but not yet finished or cancelled.
    active: HashSet<u64>,
    next_id: u64,
    /// Bumped on every interruption; stale completions check it and bail.
    generation: u64,
}

/// Schedules inbound chunks for gapless, ordered playback and owns the
/// "remote is speaking" flag.
pub struct PlaybackScheduler {
    state: Mutex<SchedulerState>,
    clock: Arc<dyn Clock>,
    out: Arc<dyn AudioOut>,
    output_tap: Option<Arc<SpectrumAnalyser>>,
    speaking_tx: watch::Sender<bool>,
    sample_rate: u32,
}

impl PlaybackScheduler {
    /// Create a scheduler. The returned watch receiver reports whether the
    /// remote party is currently speaking.
    pub fn new(
        clock: Arc<dyn Clock>,
        out: Arc<dyn AudioOut>,
        output_tap: Option<Arc<SpectrumAnalyser>>,
        sample_rate: u32,
    ) -> (Arc<Self>, watch::Receiver<bool>) {
        let (speaking_tx, speaking_rx) = watch::channel(false);
        let scheduler = Arc::new(Self {
            state: Mutex::new(SchedulerState {
                cursor: Duration::ZERO,
                active: HashSet::new(),
                next_id: 0,
                generation: 0,
            }),
            clock,
            out,
            output_tap,
            speaking_tx,
            sample_rate,
        });
        (scheduler, speaking_rx)
    }

    /// Decode a base64 PCM16 chunk and schedule it. A malformed chunk is an
    /// isolated `Decode` error; the session continues.
    pub fn enqueue_base64(self: &Arc<Self>, data: &str) -> LiveResult<ScheduledChunk> {
        let samples = pcm::decode_base64_pcm16(data)?;
        self.schedule(PlaybackBuffer {
            samples,
            sample_rate: self.sample_rate,
        })
    }

    /// Schedule a decoded buffer at `max(cursor, now)` and advance the cursor
    /// past it. Spawns the completion timer that retires the buffer.
    pub fn schedule(self: &Arc<Self>, buffer: PlaybackBuffer) -> LiveResult<ScheduledChunk> {
        let duration = buffer.duration();
        if buffer.samples.is_empty() {
            return Err(LiveError::Decode("Empty audio chunk".to_string()));
        }

        if let Some(ref tap) = self.output_tap {
            tap.push(&buffer.samples);
        }

        let (id, generation, start) = {
            let mut state = self.lock_state();
            let start = state.cursor.max(self.clock.now());
            state.cursor = start + duration;
            let id = state.next_id;
            state.next_id += 1;
            state.active.insert(id);
            (id, state.generation, start)
        };
        self.speaking_tx.send_replace(true);

        if let Err(e) = self.out.play(buffer.samples, buffer.sample_rate) {
            // The reservation above never turns into audio; undo it so the
            // active set, cursor, and speaking flag reflect what is actually
            // queued. A barge-in in between already reset everything.
            let became_idle = {
                let mut state = self.lock_state();
                if state.generation != generation {
                    false
                } else {
                    state.active.remove(&id);
                    if state.cursor == start + duration {
                        state.cursor = start;
                    }
                    state.active.is_empty()
                }
            };
            if became_idle {
                self.speaking_tx.send_replace(false);
            }
            return Err(e);
        }
        debug!(
            "Scheduled chunk {id}: start {:.3}s, duration {:.3}s",
            start.as_secs_f64(),
            duration.as_secs_f64()
        );

        let scheduler = Arc::clone(self);
        let end = start + duration;
        tokio::spawn(async move {
            let delay = end.saturating_sub(scheduler.clock.now());
            tokio::time::sleep(delay).await;
            scheduler.complete(id, generation);
        });

        Ok(ScheduledChunk { start, duration })
    }

    /// Retire a buffer that played to its scheduled end. A completion from
    /// before an interruption is stale and ignored; the cursor is untouched.
    pub fn complete(&self, id: u64, generation: u64) {
        let became_idle = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            state.active.remove(&id) && state.active.is_empty()
        };
        if became_idle {
            debug!("Remote finished speaking");
            self.speaking_tx.send_replace(false);
        }
    }

    /// Barge-in: cut everything queued, clear the active set, and snap the
    /// cursor back to the device clock so the next chunk starts immediately.
    pub fn cancel_all(&self) {
        let cancelled = {
            let mut state = self.lock_state();
            self.out.stop_all();
            let cancelled = state.active.len();
            state.active.clear();
            state.generation += 1;
            state.cursor = self.clock.now();
            cancelled
        };
        self.speaking_tx.send_replace(false);
        if cancelled > 0 {
            info!("Playback interrupted: {cancelled} pending chunk(s) abandoned");
        }
    }

    /// Current cursor value.
    pub fn cursor(&self) -> Duration {
        self.lock_state().cursor
    }

    /// Number of buffers scheduled but not yet retired.
    pub fn active_len(&self) -> usize {
        self.lock_state().active.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Discard-only output for environments without an audio device.
pub struct NullOut;

impl AudioOut for NullOut {
    fn play(&self, _samples: Vec<f32>, _sample_rate: u32) -> LiveResult<()> {
        Ok(())
    }

    fn stop_all(&self) {}
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.out.stop_all();
    }
}
