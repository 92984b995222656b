//! Session-level playback flow: manifest in, ticks in, events out.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use weir::{
    Adaptation, ClockTick, FetchEvent, FetchPipeline, FetchResult, IndexKey, Manifest, MediaSink,
    MediaType, ParsedSegment, Period, PlaybackState, PlayerOptions, Representation,
    SegmentRequest, SegmentTiming, Session, SessionIo, SinkError, SinkLock, TemplateIndex,
    TimelineEntry, WeirEvent,
};

struct OkSink {
    appends: Mutex<Vec<(f64, f64)>>,
}

#[async_trait]
impl MediaSink for OkSink {
    async fn append(&self, data: Bytes) -> Result<(), SinkError> {
        if data.len() == 16 {
            let start = f64::from_le_bytes(data[..8].try_into().unwrap());
            let end = f64::from_le_bytes(data[8..].try_into().unwrap());
            self.appends.lock().push((start, end));
        }
        Ok(())
    }

    async fn remove(&self, _start: f64, _end: f64) -> Result<(), SinkError> {
        Ok(())
    }

    fn buffered(&self) -> Vec<(f64, f64)> {
        self.appends.lock().clone()
    }

    fn updating(&self) -> bool {
        false
    }
}

struct InstantPipeline;

#[async_trait]
impl FetchPipeline for InstantPipeline {
    async fn fetch(&self, request: SegmentRequest) -> mpsc::Receiver<FetchResult> {
        let (tx, rx) = mpsc::channel(4);
        let seg = &request.segment;
        let parsed = if seg.is_init {
            ParsedSegment {
                blob: Bytes::from_static(b"init"),
                ..ParsedSegment::default()
            }
        } else {
            let start = seg.start_seconds();
            let end = seg.end_seconds().unwrap_or(start);
            let mut blob = Vec::with_capacity(16);
            blob.extend_from_slice(&start.to_le_bytes());
            blob.extend_from_slice(&end.to_le_bytes());
            ParsedSegment {
                blob: Bytes::from(blob),
                timescale: Some(seg.time.timescale()),
                next_segments: Vec::new(),
                current_segment: Some(SegmentTiming {
                    time: seg.time.value(),
                    duration: seg.duration.map_or(0, |d| d.value()),
                    timescale: seg.time.timescale(),
                }),
            }
        };
        let _ = tx.try_send(Ok(FetchEvent::Progress {
            bytes: parsed.blob.len() as u64,
        }));
        let _ = tx.try_send(Ok(FetchEvent::Parsed(parsed)));
        rx
    }
}

struct TestIo {
    io: SessionIo,
    sink: Arc<OkSink>,
    _idle_tx: watch::Sender<bool>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn rep(id: &str, bitrate: u32) -> Representation {
    Representation {
        id: id.to_owned(),
        bitrate,
        width: None,
        height: None,
        codec: "avc1.640028".to_owned(),
    }
}

fn manifest() -> Arc<Manifest> {
    let adaptation = Arc::new(Adaptation {
        id: "video-main".to_owned(),
        media_type: MediaType::Video,
        representations: vec![rep("lo", 500_000), rep("hi", 2_000_000)],
        init_policy: None,
    });
    let mut m = Manifest::new(false, Some(120.0));
    m.push_period(Period {
        id: "p1".to_owned(),
        start: 0.0,
        duration: Some(120.0),
        adaptations: vec![adaptation],
    });
    for rep_id in ["lo", "hi"] {
        m.register_index(
            IndexKey::new("p1", "video-main", rep_id),
            Box::new(TemplateIndex::new(
                1,
                "seg-$Time$.m4s",
                Some("init.mp4".to_owned()),
                1,
                0,
                vec![TimelineEntry {
                    start: 0,
                    duration: 2,
                    repeat: 59,
                }],
                None,
            )),
        );
    }
    Arc::new(m)
}

fn io_bundle() -> TestIo {
    let sink = Arc::new(OkSink {
        appends: Mutex::new(Vec::new()),
    });
    let (idle_tx, idle_rx) = watch::channel(true);
    TestIo {
        io: SessionIo {
            sink: Arc::clone(&sink) as Arc<dyn MediaSink>,
            sink_lock: Arc::new(SinkLock::new()),
            sink_idle: idle_rx,
            pipeline: Arc::new(InstantPipeline),
        },
        sink,
        _idle_tx: idle_tx,
    }
}

fn playing_tick(current_time: f64, buffer_gap: f64) -> ClockTick {
    ClockTick {
        current_time,
        buffer_gap,
        live_gap: f64::INFINITY,
        duration: Some(120.0),
        ready_state: 4,
        state: PlaybackState::Playing,
    }
}

fn test_options() -> PlayerOptions {
    // Scenario bursts can outpace the subscriber; a roomy bus keeps the
    // assertions deterministic.
    PlayerOptions::default().with_event_capacity(1024)
}

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<WeirEvent>) -> WeirEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event bus closed")
}

async fn collect_loaded_ids(
    rx: &mut tokio::sync::broadcast::Receiver<WeirEvent>,
    count: usize,
) -> Vec<String> {
    let mut ids = Vec::new();
    while ids.len() < count {
        if let WeirEvent::SegmentLoaded { segment_id, .. } = next_event(rx).await {
            ids.push(segment_id);
        }
    }
    ids
}

#[tokio::test]
async fn plays_from_first_tick_to_loaded_segments() {
    init_tracing();
    let bundle = io_bundle();
    let session = Session::start(manifest(), test_options(), bundle.io);
    let mut events = session.subscribe();

    session.push_tick(playing_tick(0.0, 0.0));

    // Without samples the chooser starts at the floor: everything that
    // flows is the low representation.
    let ids = collect_loaded_ids(&mut events, 3).await;
    assert!(
        ids.iter().all(|id| id.starts_with("lo.")),
        "unexpected ids {ids:?}"
    );
    assert!(!bundle.sink.appends.lock().is_empty());

    assert_eq!(session.dispose().await, 0, "no leaked request spans");
}

#[tokio::test]
async fn initial_bitrate_seeds_the_first_selection() {
    init_tracing();
    let bundle = io_bundle();
    let options = test_options().with_initial_video_bitrate(2_500_000);
    let session = Session::start(manifest(), options, bundle.io);
    let mut events = session.subscribe();

    session.push_tick(playing_tick(0.0, 0.0));

    let ids = collect_loaded_ids(&mut events, 1).await;
    assert!(
        ids[0].starts_with("hi."),
        "seeded estimate should start near the initial bitrate, got {ids:?}"
    );

    session.dispose().await;
}

#[tokio::test]
async fn manual_bitrate_switch_changes_representation() {
    init_tracing();
    let bundle = io_bundle();
    let session = Session::start(manifest(), test_options(), bundle.io);
    let mut events = session.subscribe();

    session.push_tick(playing_tick(0.0, 0.0));
    let _ = collect_loaded_ids(&mut events, 1).await;

    // Force the high representation, then tick so the ABR loop
    // re-evaluates and the scheduler rebuilds.
    session.set_manual_bitrate(MediaType::Video, 2_000_000);
    session.push_tick(playing_tick(0.5, 4.0));

    let mut switched = false;
    for _ in 0..64 {
        match next_event(&mut events).await {
            WeirEvent::RepresentationChanged {
                representation_id, ..
            } if representation_id == "hi" => {
                switched = true;
            }
            WeirEvent::SegmentLoaded { segment_id, .. }
                if switched && segment_id.starts_with("hi.") =>
            {
                session.dispose().await;
                return;
            }
            _ => {}
        }
    }
    panic!("never switched to the manual representation");
}
