//! Sample rate conversion for device streams.
//!
//! With the `high-quality-audio` feature streams go through a windowed sinc
//! resampler; without it, or if the sinc resampler fails, a linear
//! interpolator carries on. Both keep state across blocks so a stream can be
//! fed in device callback sized pieces.

#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
#[cfg(feature = "high-quality-audio")]
use tracing::warn;

#[cfg(feature = "high-quality-audio")]
use super::{AudioError, AudioResult};

/// Input frames per sinc processing step.
#[cfg(feature = "high-quality-audio")]
const SINC_CHUNK: usize = 256;

/// Streaming resampler from one fixed rate to another.
#[cfg_attr(not(feature = "high-quality-audio"), allow(dead_code))]
pub struct StreamResampler {
    from_rate: u32,
    to_rate: u32,
    inner: Inner,
}

enum Inner {
    Passthrough,
    #[cfg(feature = "high-quality-audio")]
    Sinc(SincStream),
    Linear(LinearResampler),
}

impl StreamResampler {
    /// Best available resampler for the rates.
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        if from_rate == to_rate {
            return Self {
                from_rate,
                to_rate,
                inner: Inner::Passthrough,
            };
        }

        #[cfg(feature = "high-quality-audio")]
        match SincStream::new(from_rate, to_rate) {
            Ok(sinc) => {
                return Self {
                    from_rate,
                    to_rate,
                    inner: Inner::Sinc(sinc),
                };
            }
            Err(e) => warn!("Sinc resampler unavailable, using linear: {}", e),
        }

        Self::linear(from_rate, to_rate)
    }

    /// Linear interpolation regardless of features.
    pub fn linear(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            inner: Inner::Linear(LinearResampler::new(from_rate, to_rate)),
        }
    }

    pub fn is_high_quality(&self) -> bool {
        match self.inner {
            #[cfg(feature = "high-quality-audio")]
            Inner::Sinc(_) => true,
            _ => false,
        }
    }

    /// Convert the next block of the stream. Output length follows the rate
    /// ratio over the life of the stream, not per call.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        match &mut self.inner {
            Inner::Passthrough => input.to_vec(),
            #[cfg(feature = "high-quality-audio")]
            Inner::Sinc(sinc) => match sinc.process(input) {
                Ok(output) => output,
                Err(e) => {
                    warn!("Sinc resampler failed, switching to linear: {}", e);
                    let mut linear = LinearResampler::new(self.from_rate, self.to_rate);
                    let output = linear.process(input);
                    self.inner = Inner::Linear(linear);
                    output
                }
            },
            Inner::Linear(linear) => linear.process(input),
        }
    }
}

// =============================================================================
// Sinc
// =============================================================================

#[cfg(feature = "high-quality-audio")]
struct SincStream {
    resampler: SincFixedIn<f32>,
    pending: Vec<f32>,
}

#[cfg(feature = "high-quality-audio")]
impl SincStream {
    fn new(from_rate: u32, to_rate: u32) -> AudioResult<Self> {
        let params = InterpolationParameters {
            sinc_len: 64,
            f_cutoff: 0.90,
            interpolation: InterpolationType::Cubic,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = to_rate as f64 / from_rate.max(1) as f64;
        let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, SINC_CHUNK, 1)
            .map_err(|e| AudioError::Backend(format!("failed to construct sinc resampler: {e:?}")))?;
        Ok(Self {
            resampler,
            pending: Vec::with_capacity(SINC_CHUNK * 2),
        })
    }

    fn process(&mut self, input: &[f32]) -> AudioResult<Vec<f32>> {
        self.pending.extend_from_slice(input);
        let mut output = Vec::new();
        while self.pending.len() >= SINC_CHUNK {
            let produced = self
                .resampler
                .process(&[&self.pending[..SINC_CHUNK]], None)
                .map_err(|e| AudioError::Backend(format!("resampler process failed: {e:?}")))?;
            if let Some(channel) = produced.first() {
                output.extend_from_slice(channel);
            }
            self.pending.drain(..SINC_CHUNK);
        }
        Ok(output)
    }
}

// =============================================================================
// Linear
// =============================================================================

/// Linear resampler carrying its phase across blocks.
struct LinearResampler {
    step: f64,
    position: f64,
    last: f32,
}

impl LinearResampler {
    fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: from_rate as f64 / to_rate.max(1) as f64,
            position: 0.0,
            last: 0.0,
        }
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if (self.step - 1.0).abs() < f64::EPSILON || input.is_empty() {
            return input.to_vec();
        }
        let mut output = Vec::with_capacity((input.len() as f64 / self.step) as usize + 1);
        // Index -1 refers to the last sample of the previous block.
        while self.position < input.len() as f64 - 1.0 {
            let index = self.position.floor();
            let frac = (self.position - index) as f32;
            let (a, b) = if index < 0.0 {
                (self.last, input[0])
            } else {
                let i = index as usize;
                (input[i], input[i + 1])
            };
            output.push(a + (b - a) * frac);
            self.position += self.step;
        }
        self.position -= input.len() as f64;
        self.last = input[input.len() - 1];
        output
    }
}
