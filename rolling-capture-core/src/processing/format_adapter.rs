use crate::models::audio_models::AudioFormat;

/// Converts device buffers into the session's output format.
///
/// Providers deliver interleaved f32 at whatever rate and channel layout the
/// hardware runs at. The converter remaps channels, resamples with linear
/// interpolation and quantizes to 16-bit PCM. All operations are pure.
#[derive(Debug, Clone, Copy)]
pub struct FrameConverter {
    target_sample_rate: f64,
    target_channels: u16,
}

impl FrameConverter {
    pub fn new(format: &AudioFormat) -> Self {
        Self {
            target_sample_rate: format.sample_rate as f64,
            target_channels: format.channels.max(1),
        }
    }

    /// Device buffer in, writer-ready interleaved samples out.
    pub fn convert(&self, samples: &[f32], sample_rate: f64, channels: u16) -> Vec<i16> {
        let remapped = self.remap_channels(samples, channels.max(1));
        let resampled = self.resample(&remapped, sample_rate);
        Self::to_int16(&resampled)
    }

    /// Reshape interleaved `samples` with `channels` per frame into the target
    /// layout. Mono targets average every source channel; stereo targets
    /// duplicate a mono source or keep the first two channels.
    pub fn remap_channels(&self, samples: &[f32], channels: u16) -> Vec<f32> {
        let source = channels as usize;
        let target = self.target_channels as usize;
        if source == target {
            return samples.to_vec();
        }

        let frames = samples.chunks_exact(source);
        let mut output = Vec::with_capacity(frames.len() * target);
        for frame in frames {
            if target == 1 {
                output.push(frame.iter().sum::<f32>() / source as f32);
            } else if source == 1 {
                output.extend(std::iter::repeat(frame[0]).take(target));
            } else {
                output.extend((0..target).map(|ch| frame.get(ch).copied().unwrap_or(0.0)));
            }
        }
        output
    }

    /// Linear interpolation resampling of interleaved audio already in the
    /// target channel layout. Returns the input unchanged if rates match.
    pub fn resample(&self, samples: &[f32], source_sample_rate: f64) -> Vec<f32> {
        if (source_sample_rate - self.target_sample_rate).abs() < 0.01
            || samples.is_empty()
            || source_sample_rate <= 0.0
        {
            return samples.to_vec();
        }

        let channels = self.target_channels as usize;
        let frame_count = samples.len() / channels;
        let ratio = self.target_sample_rate / source_sample_rate;
        let output_frames = (frame_count as f64 * ratio) as usize;
        if output_frames == 0 {
            return Vec::new();
        }

        let mut output = vec![0.0f32; output_frames * channels];
        for i in 0..output_frames {
            let source_index = i as f64 / ratio;
            let index = source_index as usize;
            let fraction = (source_index - index as f64) as f32;

            for ch in 0..channels {
                output[i * channels + ch] = if index + 1 < frame_count {
                    samples[index * channels + ch] * (1.0 - fraction)
                        + samples[(index + 1) * channels + ch] * fraction
                } else if index < frame_count {
                    samples[index * channels + ch]
                } else {
                    0.0
                };
            }
        }
        output
    }

    /// Quantize `[-1.0, 1.0]` floats to 16-bit PCM, clamping out-of-range values.
    pub fn to_int16(samples: &[f32]) -> Vec<i16> {
        samples
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect()
    }
}
