// Integration tests for the outbound pacer
//
// These tests verify chunk numbering, frame cadence, cancellation and
// transport failure handling.

use anyhow::Result;
use media_relay::audio::{codec, FrameSource};
use media_relay::media::{ChannelTransport, Outbound, OutboundMedia, OutboundQueue, Transport};
use media_relay::session::{Pacer, PacerOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const INTERVAL: Duration = Duration::from_millis(20);

fn ramp_source(samples: usize) -> FrameSource {
    let pcm: Vec<u8> = (0..samples)
        .flat_map(|i| ((i as i16).wrapping_mul(37)).to_le_bytes())
        .collect();
    FrameSource::new(pcm.into(), 160, 1.0).expect("frame source")
}

fn drain(rx: &mut OutboundQueue) -> Vec<OutboundMedia> {
    let mut messages = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let Outbound::Text(text) = frame {
            messages.push(serde_json::from_str(&text).expect("outbound media json"));
        }
    }
    messages
}

/// Fails every send after the first `allow` succeed
struct FlakyTransport {
    allow: usize,
    sent: AtomicUsize,
}

#[async_trait::async_trait]
impl Transport for FlakyTransport {
    async fn send_text(&self, _text: String) -> Result<()> {
        if self.sent.fetch_add(1, Ordering::SeqCst) >= self.allow {
            anyhow::bail!("connection reset");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_pacer_sends_every_frame_with_sequential_chunks() -> Result<()> {
    let (transport, mut rx) = ChannelTransport::new(64);
    let source = ramp_source(480);
    let expected: Vec<Vec<u8>> = source
        .frames()
        .map(|f| codec::encode_frame(&f.samples))
        .collect();

    let handle = Pacer::new("MZ-seq", source, INTERVAL, Arc::new(transport)).spawn();
    let outcome = handle.join().await;

    assert_eq!(outcome, PacerOutcome::Completed { frames_sent: 3 });

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 3);

    for (i, msg) in messages.iter().enumerate() {
        assert_eq!(msg.event, "media");
        assert_eq!(msg.stream_sid, "MZ-seq");
        assert_eq!(msg.media.track, "outbound");
        assert_eq!(msg.media.chunk, (i + 1).to_string());

        use base64::Engine;
        let payload = base64::engine::general_purpose::STANDARD.decode(&msg.media.payload)?;
        assert_eq!(payload.len(), 160);
        assert_eq!(payload, expected[i]);
    }

    Ok(())
}

#[tokio::test]
async fn test_pacer_spacing_matches_interval() -> Result<()> {
    let (transport, mut rx) = ChannelTransport::new(64);
    let handle = Pacer::new("MZ-time", ramp_source(160 * 6), INTERVAL, Arc::new(transport)).spawn();

    assert_eq!(handle.join().await, PacerOutcome::Completed { frames_sent: 6 });

    let stamps: Vec<i64> = drain(&mut rx)
        .iter()
        .map(|m| m.media.timestamp.parse::<i64>().unwrap())
        .collect();
    assert_eq!(stamps.len(), 6);

    assert!(stamps.windows(2).all(|w| w[1] >= w[0]), "timestamps go backwards");

    // Five gaps of 20ms; allow for timer granularity and a loaded machine
    let span = stamps[5] - stamps[0];
    assert!(span >= 85, "frames sent too fast: {}ms", span);
    assert!(span <= 600, "frames sent too slowly: {}ms", span);

    Ok(())
}

#[tokio::test]
async fn test_short_source_is_padded_to_full_frames() -> Result<()> {
    let (transport, mut rx) = ChannelTransport::new(64);
    let handle = Pacer::new("MZ-pad", ramp_source(200), INTERVAL, Arc::new(transport)).spawn();

    assert_eq!(handle.join().await, PacerOutcome::Completed { frames_sent: 2 });

    let messages = drain(&mut rx);
    use base64::Engine;
    let last = base64::engine::general_purpose::STANDARD.decode(&messages[1].media.payload)?;
    assert_eq!(last.len(), 160);
    // Padding is silence, which encodes to 0xFF
    assert!(last[40..].iter().all(|&b| b == 0xFF));

    Ok(())
}

#[tokio::test]
async fn test_cancel_stops_within_one_interval() -> Result<()> {
    let (transport, mut rx) = ChannelTransport::new(64);
    let handle = Pacer::new("MZ-cancel", ramp_source(160 * 100), INTERVAL, Arc::new(transport)).spawn();

    // Let a couple of frames out
    for _ in 0..2 {
        rx.recv().await.expect("frame before cancel");
    }

    let cancelled_at = Instant::now();
    handle.cancel();
    let outcome = handle.join().await;
    let latency = cancelled_at.elapsed();

    let frames_sent = match outcome {
        PacerOutcome::Cancelled { frames_sent } => frames_sent,
        other => panic!("expected cancellation, got {:?}", other),
    };
    assert!((2..=5).contains(&frames_sent), "sent {} frames", frames_sent);
    assert!(latency < Duration::from_millis(200), "cancel took {:?}", latency);

    // Nothing else arrives once the run has ended
    let late = drain(&mut rx);
    assert_eq!(2 + late.len() as u64, frames_sent);
    tokio::time::sleep(INTERVAL * 3).await;
    assert!(drain(&mut rx).is_empty());

    Ok(())
}

#[tokio::test]
async fn test_cancel_is_prompt_when_peer_stops_reading() -> Result<()> {
    // Nobody drains the queue, so the third send parks waiting for space
    let (transport, mut rx) = ChannelTransport::new(2);
    let handle = Pacer::new("MZ-stall", ramp_source(160 * 100), INTERVAL, Arc::new(transport)).spawn();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(handle.frames_sent(), 2);

    handle.cancel();
    let outcome = tokio::time::timeout(Duration::from_millis(500), handle.join())
        .await
        .expect("cancelled pacer stayed blocked on a full queue");

    assert_eq!(outcome, PacerOutcome::Cancelled { frames_sent: 2 });
    assert_eq!(drain(&mut rx).len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_dropping_handle_cancels_run() -> Result<()> {
    let (transport, mut rx) = ChannelTransport::new(64);
    let handle = Pacer::new("MZ-drop", ramp_source(160 * 100), INTERVAL, Arc::new(transport)).spawn();

    rx.recv().await.expect("first frame");
    drop(handle);

    // The task releases the transport when it stops, which ends the channel
    let mut received = 1;
    let ended = tokio::time::timeout(Duration::from_millis(500), async {
        while rx.recv().await.is_some() {
            received += 1;
        }
    })
    .await;

    assert!(ended.is_ok(), "pacer kept running after its handle was dropped");
    assert!(received <= 3, "received {} frames", received);

    Ok(())
}

#[tokio::test]
async fn test_transport_failure_is_terminal() -> Result<()> {
    let transport = Arc::new(FlakyTransport {
        allow: 2,
        sent: AtomicUsize::new(0),
    });

    let handle = Pacer::new("MZ-fail", ramp_source(160 * 10), INTERVAL, transport.clone()).spawn();
    let outcome = handle.join().await;

    match outcome {
        PacerOutcome::Failed { frames_sent, reason } => {
            assert_eq!(frames_sent, 2);
            assert!(reason.contains("connection reset"));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    // One failed attempt, no retries
    assert_eq!(transport.sent.load(Ordering::SeqCst), 3);

    Ok(())
}

#[tokio::test]
async fn test_replacement_waits_for_previous_run() -> Result<()> {
    let (transport, mut rx) = ChannelTransport::new(256);
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let first = Pacer::new("MZ-first", ramp_source(160 * 100), INTERVAL, Arc::clone(&transport)).spawn();
    rx.recv().await.expect("first run started");

    let second = Pacer::new("MZ-second", ramp_source(480), INTERVAL, Arc::clone(&transport))
        .spawn_after(Some(first));

    assert_eq!(second.join().await, PacerOutcome::Completed { frames_sent: 3 });

    let messages = drain(&mut rx);
    let split = messages
        .iter()
        .position(|m| m.stream_sid == "MZ-second")
        .expect("second run sent frames");

    // Every frame of the first run precedes every frame of the second
    assert!(messages[..split].iter().all(|m| m.stream_sid == "MZ-first"));
    let chunks: Vec<&str> = messages[split..].iter().map(|m| m.media.chunk.as_str()).collect();
    assert_eq!(chunks, vec!["1", "2", "3"]);

    Ok(())
}
