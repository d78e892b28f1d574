//! Audio playback pipeline.
//!
//! Decoded frames are appended to a shared [`PlaybackBuffer`]; the output
//! device pulls from it in its render callback, so consecutive frames play
//! back-to-back in arrival order. `interrupt()` empties the buffer under the
//! same lock the renderer uses, so nothing queued before the call is rendered
//! after it returns.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::pcm::{self, PLAYBACK_SAMPLE_RATE};
use super::{AudioError, AudioResult};

// =============================================================================
// Playback buffer
// =============================================================================

struct PlaybackQueue {
    samples: VecDeque<f32>,
    volume: f32,
    rendered: u64,
}

/// Continuous sample queue shared between the player and the output device.
#[derive(Clone)]
pub struct PlaybackBuffer {
    inner: Arc<Mutex<PlaybackQueue>>,
}

impl Default for PlaybackBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlaybackQueue {
                samples: VecDeque::new(),
                volume: 1.0,
                rendered: 0,
            })),
        }
    }

    pub fn enqueue(&self, samples: &[f32]) {
        self.inner.lock().samples.extend(samples.iter().copied());
    }

    /// Fill `out` with queued samples scaled by the current volume.
    ///
    /// Underruns are padded with silence. Returns the number of queued samples
    /// consumed.
    pub fn render(&self, out: &mut [f32]) -> usize {
        let mut queue = self.inner.lock();
        let volume = queue.volume;
        let count = out.len().min(queue.samples.len());

        for (slot, sample) in out.iter_mut().zip(queue.samples.drain(..count)) {
            *slot = sample * volume;
        }
        out[count..].fill(0.0);

        queue.rendered += count as u64;
        count
    }

    /// Drop everything queued. Returns the number of discarded samples.
    pub fn clear(&self) -> usize {
        let mut queue = self.inner.lock();
        let discarded = queue.samples.len();
        queue.samples.clear();
        discarded
    }

    pub fn queued(&self) -> usize {
        self.inner.lock().samples.len()
    }

    /// Total samples handed to the device so far.
    pub fn rendered(&self) -> u64 {
        self.inner.lock().rendered
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    fn set_volume(&self, volume: f32) {
        self.inner.lock().volume = volume;
    }
}

// =============================================================================
// Backends
// =============================================================================

/// Output device driving a [`PlaybackBuffer`].
pub trait PlaybackBackend: Send {
    /// Open the device at `sample_rate` and start pulling from `buffer`.
    fn open(&mut self, sample_rate: u32, buffer: PlaybackBuffer) -> AudioResult<()>;

    /// Release the device. Must tolerate being called on a closed backend.
    fn close(&mut self);
}

/// Backend without a device; the owner pulls samples through
/// [`PlaybackBuffer::render`] (e.g. to write them to a file).
#[derive(Default)]
pub struct PullPlaybackBackend {
    buffer: Option<PlaybackBuffer>,
}

impl PullPlaybackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.buffer.is_some()
    }
}

impl PlaybackBackend for PullPlaybackBackend {
    fn open(&mut self, _sample_rate: u32, buffer: PlaybackBuffer) -> AudioResult<()> {
        self.buffer = Some(buffer);
        Ok(())
    }

    fn close(&mut self) {
        self.buffer = None;
    }
}

// =============================================================================
// Player
// =============================================================================

struct PlayerInner {
    backend: Box<dyn PlaybackBackend>,
    initialized: bool,
}

/// Session audio player.
pub struct AudioPlayer {
    inner: Mutex<PlayerInner>,
    buffer: PlaybackBuffer,
    sample_rate: u32,
}

impl AudioPlayer {
    pub fn new(backend: Box<dyn PlaybackBackend>) -> Self {
        Self::with_sample_rate(backend, PLAYBACK_SAMPLE_RATE)
    }

    pub fn with_sample_rate(backend: Box<dyn PlaybackBackend>, sample_rate: u32) -> Self {
        Self {
            inner: Mutex::new(PlayerInner {
                backend,
                initialized: false,
            }),
            buffer: PlaybackBuffer::new(),
            sample_rate,
        }
    }

    /// Open the output device. Repeated calls after success are no-ops.
    pub fn init(&self) -> AudioResult<()> {
        let mut inner = self.inner.lock();
        if inner.initialized {
            return Ok(());
        }
        inner.backend.open(self.sample_rate, self.buffer.clone())?;
        inner.initialized = true;
        info!(sample_rate = self.sample_rate, "Audio player initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    /// Decode a base64 PCM16 frame and queue it behind earlier frames.
    ///
    /// Returns the number of samples queued.
    pub fn play(&self, frame: &str) -> AudioResult<usize> {
        if !self.is_initialized() {
            return Err(AudioError::NotInitialized);
        }
        let samples = pcm::base64_to_samples(frame)?;
        self.buffer.enqueue(&samples);
        Ok(samples.len())
    }

    /// Discard all queued and partially played audio.
    pub fn interrupt(&self) {
        let discarded = self.buffer.clear();
        debug!(discarded, "Playback interrupted");
    }

    /// Set output volume, clamped to `[0.0, 1.0]`. Applies to audio already queued.
    pub fn set_volume(&self, level: f32) {
        let level = if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, 1.0)
        };
        self.buffer.set_volume(level);
    }

    pub fn volume(&self) -> f32 {
        self.buffer.volume()
    }

    /// Release the output device. Later `play` calls fail until `init` runs again.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            return;
        }
        inner.backend.close();
        inner.initialized = false;
        self.buffer.clear();
        info!("Audio player destroyed");
    }

    /// The buffer the output device renders from.
    pub fn buffer(&self) -> &PlaybackBuffer {
        &self.buffer
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl PlaybackBackend for CountingBackend {
        fn open(&mut self, _sample_rate: u32, _buffer: PlaybackBuffer) -> AudioResult<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MissingDevice;

    impl PlaybackBackend for MissingDevice {
        fn open(&mut self, _sample_rate: u32, _buffer: PlaybackBuffer) -> AudioResult<()> {
            Err(AudioError::DeviceUnavailable("no output device".to_string()))
        }

        fn close(&mut self) {}
    }

    fn ready_player() -> AudioPlayer {
        let player = AudioPlayer::new(Box::new(PullPlaybackBackend::new()));
        player.init().unwrap();
        player
    }

    #[test]
    fn test_init_is_idempotent() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let player = AudioPlayer::new(Box::new(CountingBackend {
            opens: opens.clone(),
            closes: closes.clone(),
        }));

        player.init().unwrap();
        player.init().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(player.sample_rate(), 24_000);

        player.destroy();
        player.destroy();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_frames_render_in_order_without_gaps() {
        let player = ready_player();
        player.play(&pcm::samples_to_base64(&[0.25, 0.5])).unwrap();
        player.play(&pcm::samples_to_base64(&[-0.25])).unwrap();

        let mut out = [1.0f32; 5];
        assert_eq!(player.buffer().render(&mut out), 3);
        assert_eq!(out, [0.25, 0.5, -0.25, 0.0, 0.0]);
    }

    #[test]
    fn test_interrupt_discards_pending_audio() {
        let player = ready_player();
        player.play(&pcm::samples_to_base64(&[0.5; 480])).unwrap();

        let mut out = vec![0.0f32; 100];
        assert_eq!(player.buffer().render(&mut out), 100);

        player.interrupt();
        assert_eq!(player.buffer().queued(), 0);
        assert_eq!(player.buffer().render(&mut out), 0);
        assert!(out.iter().all(|s| *s == 0.0));

        player.play(&pcm::samples_to_base64(&[0.25])).unwrap();
        assert_eq!(player.buffer().render(&mut out[..1]), 1);
        assert_eq!(out[0], 0.25);
    }

    #[test]
    fn test_volume_clamped_and_applied_to_queued_audio() {
        let player = ready_player();
        player.play(&pcm::samples_to_base64(&[0.5, 0.5])).unwrap();

        player.set_volume(0.5);
        let mut out = [0.0f32; 1];
        player.buffer().render(&mut out);
        assert_eq!(out[0], 0.25);

        player.set_volume(3.0);
        assert_eq!(player.volume(), 1.0);
        player.set_volume(-1.0);
        assert_eq!(player.volume(), 0.0);
        player.set_volume(f32::NAN);
        assert_eq!(player.volume(), 0.0);
    }

    #[test]
    fn test_play_requires_init() {
        let player = AudioPlayer::new(Box::new(PullPlaybackBackend::new()));
        assert!(matches!(
            player.play(&pcm::samples_to_base64(&[0.1])),
            Err(AudioError::NotInitialized)
        ));
    }

    #[test]
    fn test_play_after_destroy_fails() {
        let player = ready_player();
        player.play(&pcm::samples_to_base64(&[0.1; 10])).unwrap();
        player.destroy();

        assert_eq!(player.buffer().queued(), 0);
        assert!(matches!(
            player.play(&pcm::samples_to_base64(&[0.1])),
            Err(AudioError::NotInitialized)
        ));
    }

    #[test]
    fn test_init_failure_reports_device_unavailable() {
        let player = AudioPlayer::new(Box::new(MissingDevice));
        assert!(matches!(
            player.init(),
            Err(AudioError::DeviceUnavailable(_))
        ));
        assert!(!player.is_initialized());
    }

    #[test]
    fn test_invalid_frame_leaves_queue_untouched() {
        let player = ready_player();
        assert!(matches!(
            player.play("%%%"),
            Err(AudioError::InvalidFrame(_))
        ));
        assert_eq!(player.buffer().queued(), 0);
    }
}
