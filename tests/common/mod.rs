//! Common test utilities for hls-dl E2E tests

use async_trait::async_trait;
use hls_dl::{Config, Event, MediaTool, Result, RetryConfig};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A mock HLS origin serving a master playlist, variant playlists, and segments
pub struct MockHls {
    pub server: MockServer,
}

impl MockHls {
    /// Serve `tiers` as `(label, height, bandwidth)` triples, each variant
    /// carrying `segment_count` segments whose bodies are `"{label}-seg-{i}"`
    pub async fn start(tiers: &[(&str, u32, u64)], segment_count: usize) -> Self {
        let server = MockServer::start().await;

        let mut master = String::from("#EXTM3U\n");
        for (label, height, bandwidth) in tiers {
            let width = height * 16 / 9;
            master.push_str(&format!(
                "#EXT-X-STREAM-INF:BANDWIDTH={bandwidth},RESOLUTION={width}x{height}\n{label}/video.m3u8\n"
            ));
        }
        Mock::given(method("GET"))
            .and(path("/master.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(master))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/master.m3u8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/vnd.apple.mpegurl"),
            )
            .mount(&server)
            .await;

        for (label, _, _) in tiers {
            let mut media = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n");
            for i in 0..segment_count {
                media.push_str(&format!("#EXTINF:6.0,\nseg_{i}.ts\n"));
            }
            media.push_str("#EXT-X-ENDLIST\n");
            Mock::given(method("GET"))
                .and(path(format!("/{label}/video.m3u8")))
                .respond_with(ResponseTemplate::new(200).set_body_string(media))
                .mount(&server)
                .await;

            for i in 0..segment_count {
                Mock::given(method("GET"))
                    .and(path(format!("/{label}/seg_{i}.ts")))
                    .respond_with(
                        ResponseTemplate::new(200).set_body_string(format!("{label}-seg-{i}")),
                    )
                    .mount(&server)
                    .await;
            }
        }

        Self { server }
    }

    pub fn master_url(&self) -> String {
        format!("{}/master.m3u8", self.server.uri())
    }

    /// Expected output bytes for a fully assembled item at `label` quality
    pub fn expected_content(label: &str, segment_count: usize) -> String {
        (0..segment_count)
            .map(|i| format!("{label}-seg-{i}"))
            .collect()
    }
}

/// Media tool stand-in: remux is a byte copy, verify can be told to fail
///
/// Lets the pipeline run end to end without an ffmpeg binary while still
/// exercising the corruption-recovery path.
pub struct StubTool {
    verify_failures_remaining: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl StubTool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            verify_failures_remaining: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        })
    }

    /// Make the next `n` verify calls fail
    pub fn fail_next_verifications(self: &Arc<Self>, n: usize) {
        self.verify_failures_remaining.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaTool for StubTool {
    async fn remux(&self, input: &Path, output: &Path) -> Result<()> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn verify(&self, file: &Path) -> Result<()> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.verify_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.verify_failures_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(hls_dl::Error::Verification {
                path: file.to_path_buf(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Config pointed at a temp dir, with delays shrunk for test speed
pub fn test_config(dir: &TempDir) -> Config {
    let headers = dir.path().join("header.txt");
    std::fs::write(&headers, "Authorization: Token token=test-token\n")
        .expect("write headers file");

    let mut config = Config::default();
    config.auth.headers_file = headers;
    config.download.output_dir = dir.path().join("downloads");
    config.download.temp_dir = dir.path().join("temp");
    config.download.min_free_bytes = 0;
    config.persistence.state_path = dir.path().join("state.json");
    config.failure.item_retry_delay = Duration::from_millis(10);
    config.failure.segment_retry = RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Drain the batch channel to completion, asserting the sentinel contract:
/// exactly one `Done`, nothing after it
pub async fn collect_events(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let done = matches!(event, Event::Done);
        events.push(event);
        if done {
            break;
        }
    }
    assert!(
        rx.recv().await.is_none(),
        "no events may follow the Done sentinel"
    );
    let done_count = events.iter().filter(|e| matches!(e, Event::Done)).count();
    assert_eq!(done_count, 1, "exactly one Done sentinel per batch");
    events
}

/// Position of the first event matching `pred`, panicking with `label` if absent
pub fn index_of(events: &[Event], label: &str, pred: impl Fn(&Event) -> bool) -> usize {
    events
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("expected event: {label}, got {events:#?}"))
}
