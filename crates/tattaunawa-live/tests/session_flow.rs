//! End-to-end session tests over an in-process channel pair.
//!
//! No audio hardware is involved: playback goes to a null sink, the device
//! clock is driven manually, and capture frames are injected through the
//! session's frame sender. Tests that need real devices are ignored by
//! default, as in the rest of the workspace.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tattaunawa_live::{
    encode_pcm16, AudioFrame, ChannelHandle, ClientEvent, Clock, Consultant, ConsultantContext,
    NullOut, ServerEvent, Session, SessionConfig, SessionController, SessionEvent, SessionState,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Duration::ZERO),
        })
    }

    fn advance_to(&self, t: Duration) {
        *self.now.lock().unwrap() = t;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }
}

fn two_consultants() -> ConsultantContext {
    ConsultantContext::new(vec![
        Consultant {
            id: "c-1".into(),
            name: "Amina Bello".into(),
            title: "Cardiologist".into(),
            category: "Health & Medicine".into(),
            languages: vec!["English".into(), "Hausa".into()],
            bio: "20 years of clinical practice.".into(),
            rate: 120.0,
        },
        Consultant {
            id: "c-2".into(),
            name: "Kwame Mensah".into(),
            title: "Solutions Architect".into(),
            category: "Programming & Tech".into(),
            languages: vec!["English".into(), "French".into()],
            bio: "Distributed systems and cloud migrations.".into(),
            rate: 95.0,
        },
    ])
}

/// Base64 PCM16 chunk of the given duration at the output rate.
fn chunk_of(seconds: f64) -> String {
    let samples = vec![0.25f32; (24_000.0 * seconds) as usize];
    encode_pcm16(&samples, 24_000).data
}

struct Harness {
    session: Session,
    remote: tattaunawa_live::RemoteEnd,
    clock: Arc<ManualClock>,
}

fn start_session() -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let controller = SessionController::new(SessionConfig::default()).expect("valid config");
    let (handle, remote) = ChannelHandle::pair();
    let clock = ManualClock::new();
    let session = controller
        .start_with_channel(two_consultants(), handle, Arc::new(NullOut), clock.clone())
        .expect("session should wire up");
    Harness {
        session,
        remote,
        clock,
    }
}

/// Poll until the condition holds or the deadline passes.
async fn eventually(mut cond: impl FnMut() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn start_sends_grounding_setup_and_connects() {
    let mut h = start_session();
    assert_eq!(h.session.state(), SessionState::Connected);

    let first = timeout(WAIT, h.remote.from_client.recv())
        .await
        .expect("setup should arrive")
        .expect("channel open");
    match first {
        ClientEvent::Setup {
            system_instruction,
            voice,
            response_modality,
        } => {
            assert!(system_instruction.contains("Amina Bello"));
            assert!(system_instruction.contains("Kwame Mensah"));
            assert_eq!(voice, "Kore");
            assert_eq!(response_modality, "audio");
        }
        other => panic!("expected setup first, got {other:?}"),
    }

    let mut events = h.session.take_event_receiver().expect("first take");
    assert!(matches!(events.try_recv(), Ok(SessionEvent::Connecting)));
    assert!(matches!(events.try_recv(), Ok(SessionEvent::Connected)));
    assert!(h.session.take_event_receiver().is_none());
}

#[tokio::test]
async fn inbound_chunks_play_back_to_back_then_interrupt_resets() {
    let mut h = start_session();
    let speaking = h.session.watch_remote_speaking();

    // Two 0.5s chunks arriving back-to-back.
    for _ in 0..2 {
        h.remote
            .to_client
            .send(ServerEvent::Audio { data: chunk_of(0.5) })
            .await
            .unwrap();
    }

    // Second chunk's start is exactly first start + 0.5s, so the cursor sits
    // at 1.0s with both buffers pending.
    {
        let session = &h.session;
        eventually(
            || session.playback_cursor() == Duration::from_secs(1),
            "both chunks to be scheduled",
        )
        .await;
    }
    assert_eq!(h.session.pending_playback(), 2);
    assert!(*speaking.borrow());

    // Barge-in mid-second-chunk.
    h.clock.advance_to(Duration::from_millis(700));
    h.remote.to_client.send(ServerEvent::Interrupted).await.unwrap();

    {
        let session = &h.session;
        eventually(|| session.pending_playback() == 0, "barge-in to clear queue").await;
    }
    assert_eq!(h.session.playback_cursor(), Duration::from_millis(700));
    assert!(!*speaking.borrow());
    assert_eq!(h.session.interruptions(), 1);

    // Audio arriving right after the interrupt starts now, not at the
    // abandoned 1.0s cursor.
    h.remote
        .to_client
        .send(ServerEvent::Audio { data: chunk_of(0.5) })
        .await
        .unwrap();
    {
        let session = &h.session;
        eventually(
            || session.playback_cursor() == Duration::from_millis(1200),
            "post-interrupt chunk",
        )
        .await;
    }

    h.session.close();
}

#[tokio::test]
async fn injected_frames_are_encoded_and_transmitted() {
    let mut h = start_session();

    // Skip the setup message.
    let _ = timeout(WAIT, h.remote.from_client.recv()).await.unwrap();

    let frames = h.session.frame_sender();
    frames
        .send(AudioFrame {
            samples: vec![0.5; 4096],
            sample_rate: 16_000,
        })
        .unwrap();

    let event = timeout(WAIT, h.remote.from_client.recv())
        .await
        .expect("frame should be transmitted")
        .expect("channel open");
    match event {
        ClientEvent::Audio { data, mime_type } => {
            assert_eq!(mime_type, "audio/pcm;rate=16000");
            assert!(!data.is_empty());
        }
        other => panic!("expected audio, got {other:?}"),
    }

    // The volume meter saw the frame: RMS(0.5) * 5 clamps to 1.0.
    let volume = h.session.watch_volume();
    {
        let volume = volume.clone();
        eventually(|| (*volume.borrow() - 1.0).abs() < 1e-6, "volume update").await;
    }
}

#[tokio::test]
async fn frames_after_close_are_dropped_silently() {
    let mut h = start_session();
    let _ = timeout(WAIT, h.remote.from_client.recv()).await.unwrap(); // setup

    h.session.close();
    assert_eq!(h.session.state(), SessionState::Closed);

    let frames = h.session.frame_sender();
    // The uplink task may already be gone; either way nothing is transmitted.
    let _ = frames.send(AudioFrame {
        samples: vec![0.5; 4096],
        sample_rate: 16_000,
    });

    let outcome = timeout(Duration::from_millis(200), h.remote.from_client.recv()).await;
    match outcome {
        Err(_) => {}          // nothing arrived
        Ok(None) => {}        // channel closed outright
        Ok(Some(ev)) => panic!("frame leaked after close: {ev:?}"),
    }
}

#[tokio::test]
async fn close_is_idempotent_and_terminal() {
    let mut h = start_session();
    let mut events = h.session.take_event_receiver().unwrap();

    h.session.close();
    h.session.close();
    h.session.close();
    assert_eq!(h.session.state(), SessionState::Closed);

    let mut closed_events = 0;
    while let Ok(ev) = events.try_recv() {
        if matches!(ev, SessionEvent::Closed) {
            closed_events += 1;
        }
    }
    assert_eq!(closed_events, 1, "close emits exactly one Closed event");
}

#[tokio::test]
async fn service_error_downgrades_to_error_state() {
    let mut h = start_session();
    let mut events = h.session.take_event_receiver().unwrap();

    h.remote
        .to_client
        .send(ServerEvent::Error {
            message: "quota exceeded".into(),
        })
        .await
        .unwrap();

    {
        let session = &h.session;
        eventually(|| session.state() == SessionState::Error, "error state").await;
    }

    let mut saw_error = false;
    while let Ok(ev) = events.try_recv() {
        if let SessionEvent::Error { category, message } = ev {
            assert_eq!(category, tattaunawa_live::ErrorCategory::Connection);
            assert!(message.contains("quota exceeded"));
            saw_error = true;
        }
    }
    assert!(saw_error);

    // close() still moves Error -> Closed.
    h.session.close();
    assert_eq!(h.session.state(), SessionState::Closed);
}

#[tokio::test]
async fn service_error_tears_the_channel_down() {
    let mut h = start_session();
    let _ = timeout(WAIT, h.remote.from_client.recv()).await.unwrap(); // setup

    h.remote
        .to_client
        .send(ServerEvent::Error {
            message: "internal".into(),
        })
        .await
        .unwrap();

    {
        let session = &h.session;
        eventually(|| session.state() == SessionState::Error, "error state").await;
    }

    // The session drops its end of the channel without waiting for close():
    // the remote sees the uplink close, not a silent stall.
    let drained = timeout(WAIT, async {
        while h.remote.from_client.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok(), "uplink channel should close after the error");
}

#[tokio::test]
async fn service_close_signal_closes_the_session() {
    let mut h = start_session();
    h.remote.to_client.send(ServerEvent::Closed).await.unwrap();
    {
        let session = &h.session;
        eventually(|| session.state() == SessionState::Closed, "closed state").await;
    }
}

#[tokio::test]
async fn malformed_chunk_does_not_kill_the_session() {
    let mut h = start_session();

    h.remote
        .to_client
        .send(ServerEvent::Audio {
            data: "@@not-base64@@".into(),
        })
        .await
        .unwrap();
    h.remote
        .to_client
        .send(ServerEvent::Audio { data: chunk_of(0.25) })
        .await
        .unwrap();

    {
        let session = &h.session;
        eventually(
            || session.playback_cursor() == Duration::from_millis(250),
            "good chunk after bad",
        )
        .await;
    }
    assert_eq!(h.session.state(), SessionState::Connected);
}

#[tokio::test]
#[ignore] // Requires audio hardware
async fn real_devices_come_up() {
    use tattaunawa_live::{InputCapture, RodioOut};

    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let capture = InputCapture::new(16_000, 4096).expect("input device");
    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::unbounded_channel();
    let _stream = capture.start(frame_tx).expect("capture stream");

    let frame = timeout(Duration::from_secs(5), frame_rx.recv())
        .await
        .expect("a frame within 5s")
        .expect("stream alive");
    assert_eq!(frame.samples.len(), 4096);

    let _out = RodioOut::new().expect("output device");
}
