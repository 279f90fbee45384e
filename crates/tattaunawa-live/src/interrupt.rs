//! Barge-in handling
//!
//! The service sends an interrupted-signal when the user starts speaking over
//! synthesized audio. The coordinator reaches into the playback scheduler and
//! abandons everything pending in one atomic step, so the next inbound chunk
//! starts at "now" instead of after the dead tail.

use crate::playback::PlaybackScheduler;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Subscribes to inbound interruption signals and cancels pending playback.
pub struct InterruptionCoordinator {
    scheduler: Arc<PlaybackScheduler>,
    count: AtomicU64,
}

impl InterruptionCoordinator {
    pub fn new(scheduler: Arc<PlaybackScheduler>) -> Self {
        Self {
            scheduler,
            count: AtomicU64::new(0),
        }
    }

    /// Handle one interrupted-signal: stop every active buffer (best-effort),
    /// clear the active set, reset the cursor to the device clock, and flip
    /// the speaking flag back to the user. Idempotent when nothing is playing.
    pub fn on_interrupted(&self) {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Barge-in #{n}: silencing remote audio");
        self.scheduler.cancel_all();
    }

    /// Number of interruptions handled this session.
    pub fn interruptions(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{Clock, NullOut, PlaybackBuffer, PlaybackScheduler};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedClock(Mutex<Duration>);

    impl Clock for FixedClock {
        fn now(&self) -> Duration {
            *self.0.lock().unwrap()
        }
    }

    #[tokio::test]
    async fn interruption_silences_and_counts() {
        let clock = Arc::new(FixedClock(Mutex::new(Duration::ZERO)));
        let (scheduler, speaking) =
            PlaybackScheduler::new(clock.clone(), Arc::new(NullOut), None, 24_000);
        let coordinator = InterruptionCoordinator::new(Arc::clone(&scheduler));

        scheduler
            .schedule(PlaybackBuffer {
                samples: vec![0.2; 24_000],
                sample_rate: 24_000,
            })
            .unwrap();
        assert!(*speaking.borrow());

        *clock.0.lock().unwrap() = Duration::from_millis(300);
        coordinator.on_interrupted();

        assert_eq!(scheduler.active_len(), 0);
        assert_eq!(scheduler.cursor(), Duration::from_millis(300));
        assert!(!*speaking.borrow());
        assert_eq!(coordinator.interruptions(), 1);
    }

    #[tokio::test]
    async fn interrupting_silence_is_a_no_op() {
        let clock = Arc::new(FixedClock(Mutex::new(Duration::from_secs(2))));
        let (scheduler, speaking) =
            PlaybackScheduler::new(clock, Arc::new(NullOut), None, 24_000);
        let coordinator = InterruptionCoordinator::new(Arc::clone(&scheduler));

        coordinator.on_interrupted();
        coordinator.on_interrupted();

        assert_eq!(scheduler.active_len(), 0);
        assert!(!*speaking.borrow());
        assert_eq!(coordinator.interruptions(), 2);
    }
}
