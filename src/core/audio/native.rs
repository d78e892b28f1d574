//! cpal device backends.
//!
//! cpal streams are not `Send` on every platform, so each open stream lives on
//! its own thread and is dropped there when the backend closes. Devices are
//! opened with their default configuration; samples are downmixed to mono and
//! resampled to or from the pipeline rate with [`StreamResampler`].

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::capture::{CaptureBackend, CaptureConstraints, SampleBlockReceiver};
use super::playback::{PlaybackBackend, PlaybackBuffer};
use super::resample::StreamResampler;
use super::{AudioError, AudioResult};

/// List input device names, for `--device` selection.
pub fn list_input_devices() -> AudioResult<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| AudioError::DeviceUnavailable(format!("no input devices available: {e}")))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

// =============================================================================
// Stream thread
// =============================================================================

struct StreamThread {
    stop: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl StreamThread {
    fn spawn<F>(name: &str, build: F) -> AudioResult<Self>
    where
        F: FnOnce() -> AudioResult<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::channel::<AudioResult<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::DeviceUnavailable(format!(
                        "failed to start stream: {e}"
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Blocks until close() or the backend is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::Backend(format!("failed to spawn audio thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| AudioError::Backend("audio thread exited during setup".to_string()))??;

        Ok(Self {
            stop: stop_tx,
            handle,
        })
    }

    fn shutdown(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("Audio stream thread panicked");
        }
    }
}

fn stream_error(err: cpal::StreamError) {
    warn!("Audio stream error: {}", err);
}

fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

// =============================================================================
// Capture
// =============================================================================

/// Microphone capture through the default cpal host.
///
/// Echo cancellation, noise suppression and gain control are left to the
/// platform; cpal exposes no switches for them.
#[derive(Default)]
pub struct CpalCaptureBackend {
    stream: Option<StreamThread>,
}

impl CpalCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn select_input_device(host: &cpal::Host, device_id: Option<&str>) -> AudioResult<cpal::Device> {
    match device_id {
        Some(name) => {
            let mut devices = host.input_devices().map_err(|e| {
                AudioError::DeviceUnavailable(format!("no input devices available: {e}"))
            })?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceUnavailable(format!("input device '{name}' not found")))
        }
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default input device".to_string())),
    }
}

impl CaptureBackend for CpalCaptureBackend {
    fn open(
        &mut self,
        device_id: Option<&str>,
        constraints: &CaptureConstraints,
    ) -> AudioResult<SampleBlockReceiver> {
        self.close();

        let (tx, rx) = mpsc::unbounded_channel::<Vec<f32>>();
        let device_id = device_id.map(str::to_string);
        let target_rate = constraints.sample_rate;

        let stream = StreamThread::spawn("audio-capture", move || {
            let host = cpal::default_host();
            let device = select_input_device(&host, device_id.as_deref())?;
            let default_config = device
                .default_input_config()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
            let format = default_config.sample_format();
            let config: StreamConfig = default_config.into();
            let channels = usize::from(config.channels.max(1));
            let device_rate = config.sample_rate.0;

            info!(
                device = %device.name().unwrap_or_default(),
                ?format,
                device_rate,
                channels,
                "Opening input device"
            );

            let mut resampler = StreamResampler::new(device_rate, target_rate);
            debug!(high_quality = resampler.is_high_quality(), "Capture resampler ready");
            let mut deliver = move |mono: Vec<f32>| {
                let block = resampler.process(&mono);
                if !block.is_empty() {
                    let _ = tx.send(block);
                }
            };

            let stream = match format {
                SampleFormat::F32 => device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        deliver(downmix(data, channels));
                    },
                    stream_error,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let floats: Vec<f32> =
                            data.iter().map(|s| *s as f32 / 32_768.0).collect();
                        deliver(downmix(&floats, channels));
                    },
                    stream_error,
                    None,
                ),
                other => {
                    return Err(AudioError::DeviceUnavailable(format!(
                        "unsupported sample format: {other:?}"
                    )));
                }
            };
            stream.map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
        })?;

        self.stream = Some(stream);
        Ok(rx)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown();
            debug!("Input device released");
        }
    }
}

impl Drop for CpalCaptureBackend {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Playback
// =============================================================================

/// Speaker output through the default cpal host.
#[derive(Default)]
pub struct CpalPlaybackBackend {
    stream: Option<StreamThread>,
}

impl CpalPlaybackBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackBackend for CpalPlaybackBackend {
    fn open(&mut self, sample_rate: u32, buffer: PlaybackBuffer) -> AudioResult<()> {
        self.close();

        let stream = StreamThread::spawn("audio-playback", move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceUnavailable("no default output device".to_string()))?;
            let default_config = device
                .default_output_config()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
            if default_config.sample_format() != SampleFormat::F32 {
                return Err(AudioError::DeviceUnavailable(format!(
                    "unsupported output sample format: {:?}",
                    default_config.sample_format()
                )));
            }
            let config: StreamConfig = default_config.into();
            let channels = usize::from(config.channels.max(1));
            let device_rate = config.sample_rate.0;

            info!(
                device = %device.name().unwrap_or_default(),
                device_rate, channels, "Opening output device"
            );

            let mut resampler = StreamResampler::new(sample_rate, device_rate);
            debug!(high_quality = resampler.is_high_quality(), "Playback resampler ready");
            let ratio = sample_rate as f64 / device_rate.max(1) as f64;
            let mut pending: Vec<f32> = Vec::new();
            let mut source: Vec<f32> = Vec::new();

            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let frames = data.len() / channels;
                        while pending.len() < frames {
                            let needed = ((frames - pending.len()) as f64 * ratio).ceil() as usize + 1;
                            source.resize(needed, 0.0);
                            buffer.render(&mut source);
                            pending.extend(resampler.process(&source));
                        }
                        for (frame, sample) in data.chunks_mut(channels).zip(pending.drain(..frames)) {
                            frame.fill(sample);
                        }
                    },
                    stream_error,
                    None,
                )
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
        })?;

        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown();
            debug!("Output device released");
        }
    }
}

impl Drop for CpalPlaybackBackend {
    fn drop(&mut self) {
        self.close();
    }
}
