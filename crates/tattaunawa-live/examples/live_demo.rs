//! Live session demo: talk to the voice assistant from the terminal.
//!
//! Requires a microphone, speakers, and a reachable live service. Set
//! `LIVE_SERVICE_URL` to override the default endpoint:
//!
//! ```sh
//! LIVE_SERVICE_URL=wss://localhost:8443/v1/session cargo run --example live_demo
//! ```

use anyhow::Result;
use tattaunawa_live::{
    Consultant, ConsultantContext, SessionConfig, SessionController, SessionEvent,
};

fn demo_catalog() -> ConsultantContext {
    ConsultantContext::new(vec![
        Consultant {
            id: "demo-1".into(),
            name: "Amina Bello".into(),
            title: "Cardiologist".into(),
            category: "Health & Medicine".into(),
            languages: vec!["English".into(), "Hausa".into()],
            bio: "20 years of clinical practice.".into(),
            rate: 120.0,
        },
        Consultant {
            id: "demo-2".into(),
            name: "Kwame Mensah".into(),
            title: "Solutions Architect".into(),
            category: "Programming & Tech".into(),
            languages: vec!["English".into(), "French".into()],
            bio: "Distributed systems and cloud migrations.".into(),
            rate: 95.0,
        },
    ])
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = SessionConfig::default();
    if let Ok(url) = std::env::var("LIVE_SERVICE_URL") {
        config.service_url = url;
    }

    println!("🎤 Connecting to {} ...", config.service_url);
    let controller = SessionController::new(config)?;
    let mut session = controller.start(demo_catalog()).await?;
    let mut events = session
        .take_event_receiver()
        .expect("event receiver taken once");
    let mut speaking = session.watch_remote_speaking();

    println!("✅ Connected. Speak naturally; Ctrl-C ends the session.\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n👋 Ending session");
                break;
            }
            changed = speaking.changed() => {
                if changed.is_err() {
                    break;
                }
                if *speaking.borrow() {
                    println!("🔊 Assistant is speaking...");
                } else {
                    println!("🎤 Listening...");
                }
            }
            event = events.recv() => {
                match event {
                    Some(SessionEvent::Error { category, message }) => {
                        eprintln!("❌ Session error ({category:?}): {message}");
                        break;
                    }
                    Some(SessionEvent::Closed) | None => break,
                    Some(_) => {}
                }
            }
        }
    }

    session.close();
    Ok(())
}
