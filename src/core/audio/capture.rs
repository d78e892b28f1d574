//! Audio capture pipeline.
//!
//! A [`CaptureBackend`] delivers float sample blocks at the capture rate. Each
//! block is converted to PCM16, base64 encoded and handed to an
//! [`AudioChunkSink`] (normally the live session client). When the sink is not
//! open the chunk is dropped; buffering is the gateway's job.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::pcm::{self, CAPTURE_SAMPLE_RATE};
use super::{AudioError, AudioResult};

/// Stream of captured sample blocks, in device order.
pub type SampleBlockReceiver = mpsc::UnboundedReceiver<Vec<f32>>;

/// Device constraints requested when opening a capture stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConstraints {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            channels: 1,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Source of microphone sample blocks.
///
/// `open` acquires the device exclusively and returns the block stream; it
/// fails with [`AudioError::DeviceUnavailable`] when permission is denied or no
/// device matches `device_id`. `close` releases the device and must tolerate
/// being called on a closed backend.
pub trait CaptureBackend: Send {
    fn open(
        &mut self,
        device_id: Option<&str>,
        constraints: &CaptureConstraints,
    ) -> AudioResult<SampleBlockReceiver>;

    fn close(&mut self);
}

/// Destination for encoded capture chunks.
#[async_trait]
pub trait AudioChunkSink: Send + Sync {
    /// Whether the underlying channel is currently open.
    fn is_open(&self) -> bool;

    /// Transmit one base64 PCM16 chunk.
    async fn send_audio_chunk(&self, chunk: String) -> AudioResult<()>;
}

/// Counters describing what the pipeline did with captured blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub blocks: u64,
    pub sent: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct CaptureCounters {
    blocks: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
}

// =============================================================================
// Capture pipeline
// =============================================================================

/// Microphone-to-session pipeline.
pub struct AudioCapture {
    backend: Box<dyn CaptureBackend>,
    sink: Arc<dyn AudioChunkSink>,
    constraints: CaptureConstraints,
    task: Option<JoinHandle<()>>,
    counters: Arc<CaptureCounters>,
}

impl AudioCapture {
    pub fn new(backend: Box<dyn CaptureBackend>, sink: Arc<dyn AudioChunkSink>) -> Self {
        Self {
            backend,
            sink,
            constraints: CaptureConstraints::default(),
            task: None,
            counters: Arc::new(CaptureCounters::default()),
        }
    }

    /// Override the device constraints used by subsequent `start` calls.
    pub fn with_constraints(mut self, constraints: CaptureConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            blocks: self.counters.blocks.load(Ordering::Relaxed),
            sent: self.counters.sent.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Open the input device and start streaming chunks to the sink.
    ///
    /// Starting a running pipeline is a no-op. Must be called inside a tokio
    /// runtime.
    pub fn start(&mut self, device_id: Option<&str>) -> AudioResult<()> {
        if self.is_running() {
            debug!("Audio capture already running");
            return Ok(());
        }
        // A stream that ended on its own still holds the device.
        self.stop();

        let mut blocks = self.backend.open(device_id, &self.constraints)?;
        info!(
            device = device_id.unwrap_or("default"),
            sample_rate = self.constraints.sample_rate,
            "Audio capture started"
        );

        let sink = self.sink.clone();
        let counters = self.counters.clone();
        self.task = Some(tokio::spawn(async move {
            while let Some(block) = blocks.recv().await {
                counters.blocks.fetch_add(1, Ordering::Relaxed);

                if !sink.is_open() {
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(samples = block.len(), "Session channel closed, dropping chunk");
                    continue;
                }

                let chunk = pcm::samples_to_base64(&block);
                match sink.send_audio_chunk(chunk).await {
                    Ok(()) => {
                        counters.sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!("Dropping audio chunk: {}", e);
                    }
                }
            }
            debug!("Capture block stream ended");
        }));

        Ok(())
    }

    /// Stop streaming and release the device. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.backend.close();
            info!("Audio capture stopped");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Channel backend
// =============================================================================

/// Capture backend fed programmatically through a [`CaptureFeed`].
///
/// Useful for piping audio from files or other processes, and for tests.
/// Like a device stream, the feed can be opened once.
pub struct ChannelCaptureBackend {
    devices: Vec<String>,
    receiver: Option<SampleBlockReceiver>,
    open: Arc<AtomicBool>,
}

/// Producer half of a [`ChannelCaptureBackend`].
#[derive(Clone)]
pub struct CaptureFeed {
    sender: mpsc::UnboundedSender<Vec<f32>>,
    open: Arc<AtomicBool>,
}

impl CaptureFeed {
    /// Queue a block for the pipeline. Returns false once the pipeline has
    /// dropped the stream.
    pub fn push(&self, block: Vec<f32>) -> bool {
        self.sender.send(block).is_ok()
    }

    /// Whether the backend currently holds the "device".
    pub fn is_device_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl ChannelCaptureBackend {
    /// Backend accepting any device id.
    pub fn pair() -> (Self, CaptureFeed) {
        Self::pair_with_devices(Vec::new())
    }

    /// Backend exposing a fixed set of device ids. An empty list accepts any id.
    pub fn pair_with_devices(devices: Vec<String>) -> (Self, CaptureFeed) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        (
            Self {
                devices,
                receiver: Some(receiver),
                open: open.clone(),
            },
            CaptureFeed { sender, open },
        )
    }
}

impl CaptureBackend for ChannelCaptureBackend {
    fn open(
        &mut self,
        device_id: Option<&str>,
        _constraints: &CaptureConstraints,
    ) -> AudioResult<SampleBlockReceiver> {
        if let Some(id) = device_id
            && !self.devices.is_empty()
            && !self.devices.iter().any(|d| d == id)
        {
            return Err(AudioError::DeviceUnavailable(format!(
                "no input device matches '{id}'"
            )));
        }

        let receiver = self.receiver.take().ok_or_else(|| {
            AudioError::DeviceUnavailable("capture feed already consumed".to_string())
        })?;
        self.open.store(true, Ordering::SeqCst);
        Ok(receiver)
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct RecordingSink {
        open: AtomicBool,
        chunks: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new(open: bool) -> Arc<Self> {
            Arc::new(Self {
                open: AtomicBool::new(open),
                chunks: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AudioChunkSink for RecordingSink {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        async fn send_audio_chunk(&self, chunk: String) -> AudioResult<()> {
            self.chunks.lock().push(chunk);
            Ok(())
        }
    }

    async fn wait_for_blocks(capture: &AudioCapture, blocks: u64) {
        for _ in 0..100 {
            if capture.stats().blocks >= blocks {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("capture processed {:?}", capture.stats());
    }

    #[tokio::test]
    async fn test_each_block_becomes_one_chunk() {
        let (backend, feed) = ChannelCaptureBackend::pair();
        let sink = RecordingSink::new(true);
        let mut capture = AudioCapture::new(Box::new(backend), sink.clone());

        capture.start(None).unwrap();
        assert!(feed.is_device_open());
        feed.push(vec![0.0, 0.5]);
        feed.push(vec![-1.0]);
        wait_for_blocks(&capture, 2).await;

        let chunks = sink.chunks.lock().clone();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], pcm::samples_to_base64(&[0.0, 0.5]));
        assert_eq!(chunks[1], pcm::samples_to_base64(&[-1.0]));
        assert_eq!(capture.stats().sent, 2);
    }

    #[tokio::test]
    async fn test_chunks_dropped_when_sink_closed() {
        let (backend, feed) = ChannelCaptureBackend::pair();
        let sink = RecordingSink::new(false);
        let mut capture = AudioCapture::new(Box::new(backend), sink.clone());

        capture.start(None).unwrap();
        feed.push(vec![0.1; 160]);
        wait_for_blocks(&capture, 1).await;

        assert!(sink.chunks.lock().is_empty());
        assert_eq!(
            capture.stats(),
            CaptureStats {
                blocks: 1,
                sent: 0,
                dropped: 1
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_device_unavailable() {
        let (backend, feed) = ChannelCaptureBackend::pair_with_devices(vec!["mic-1".to_string()]);
        let mut capture = AudioCapture::new(Box::new(backend), RecordingSink::new(true));

        let result = capture.start(Some("mic-2"));
        assert!(matches!(result, Err(AudioError::DeviceUnavailable(_))));
        assert!(!capture.is_running());
        assert!(!feed.is_device_open());

        capture.start(Some("mic-1")).unwrap();
        assert!(capture.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_releases_device() {
        let (backend, feed) = ChannelCaptureBackend::pair();
        let mut capture = AudioCapture::new(Box::new(backend), RecordingSink::new(true));

        capture.stop();
        capture.start(None).unwrap();
        capture.stop();
        assert!(!feed.is_device_open());
        assert!(!capture.is_running());
        capture.stop();
        assert!(!feed.is_device_open());
    }

    #[tokio::test]
    async fn test_feed_is_not_restartable() {
        let (backend, _feed) = ChannelCaptureBackend::pair();
        let mut capture = AudioCapture::new(Box::new(backend), RecordingSink::new(true));

        capture.start(None).unwrap();
        capture.stop();
        assert!(matches!(
            capture.start(None),
            Err(AudioError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_default_constraints() {
        let constraints = CaptureConstraints::default();
        assert_eq!(constraints.sample_rate, 16_000);
        assert_eq!(constraints.channels, 1);
        assert!(constraints.echo_cancellation);
        assert!(constraints.noise_suppression);
        assert!(constraints.auto_gain_control);
    }
}
