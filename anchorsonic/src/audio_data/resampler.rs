use crate::error::{AnchorSonicError, Result};
use rubato::{FftFixedIn, Resampler};

/// Offline sample-rate converter used when assets are registered.
///
/// All channels go through one multi-channel rubato resampler. The filter delay is
/// trimmed from the front and the output is cut to `ceil(frames * ratio)`, so a
/// resampled asset keeps its duration and loops without a gap.
pub struct AudioResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl AudioResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(AnchorSonicError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if channels == 0 {
            return Err(AnchorSonicError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024).max(16),
        })
    }

    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }

    /// Resamples interleaved audio and returns interleaved audio.
    pub fn resample_interleaved(&self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved.to_vec());
        }

        let channels = self.channels as usize;
        let input_frames = interleaved.len() / channels;
        let expected_frames = (input_frames as f64 * self.resample_ratio()).ceil() as usize;

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2,
            channels,
        )
        .map_err(|e| AnchorSonicError::AudioLoading(format!("Failed to create resampler: {}", e)))?;

        let delay = resampler.output_delay();
        let mut planar_out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected_frames + delay); channels];
        let mut chunk: Vec<Vec<f32>> = vec![vec![0.0; self.chunk_size]; channels];
        let mut frame = 0;

        // Keep feeding (zero-padded past the end) until the delayed tail is flushed.
        while planar_out[0].len() < expected_frames + delay {
            for (ch, buffer) in chunk.iter_mut().enumerate() {
                for (i, slot) in buffer.iter_mut().enumerate() {
                    let source_frame = frame + i;
                    *slot = if source_frame < input_frames {
                        interleaved[source_frame * channels + ch]
                    } else {
                        0.0
                    };
                }
            }
            frame += self.chunk_size;

            let waves_out = resampler
                .process(&chunk, None)
                .map_err(|e| AnchorSonicError::AudioLoading(format!("Resampling error: {}", e)))?;
            for (out, wave) in planar_out.iter_mut().zip(waves_out) {
                out.extend_from_slice(&wave);
            }
        }

        let mut output = Vec::with_capacity(expected_frames * channels);
        for i in delay..delay + expected_frames {
            for channel in &planar_out {
                output.push(channel[i]);
            }
        }
        Ok(output)
    }
}
