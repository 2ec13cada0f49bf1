// Fixed-size frame slicing over a PCM byte buffer
//
// The buffer holds little-endian 16-bit mono samples. Each pass over it
// yields frames of `frame_samples` samples with gain applied and the result
// clamped to the i16 range. A short final frame is zero-padded to full
// length so every frame on the wire has the same size; a trailing odd byte
// (half a sample) is ignored.

use anyhow::Result;
use std::sync::Arc;

/// One frame of gain-adjusted samples
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Zero-based position of this frame within the source
    pub index: usize,
    /// Samples, always exactly `frame_samples` long
    pub samples: Vec<i16>,
    /// How many trailing samples are zero padding
    pub padded: usize,
}

/// A restartable view over a shared PCM buffer
#[derive(Debug, Clone)]
pub struct FrameSource {
    pcm: Arc<[u8]>,
    frame_samples: usize,
    gain: f32,
}

impl FrameSource {
    pub fn new(pcm: Arc<[u8]>, frame_samples: usize, gain: f32) -> Result<Self> {
        anyhow::ensure!(frame_samples > 0, "frame_samples must be non-zero");
        anyhow::ensure!(
            gain.is_finite() && gain >= 0.0,
            "gain must be finite and non-negative, got {}",
            gain
        );

        Ok(Self {
            pcm,
            frame_samples,
            gain,
        })
    }

    /// Number of whole samples in the buffer
    pub fn sample_count(&self) -> usize {
        self.pcm.len() / 2
    }

    /// Number of frames a full pass yields
    pub fn frame_count(&self) -> usize {
        self.sample_count().div_ceil(self.frame_samples)
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Start a new pass from the beginning of the buffer
    pub fn frames(&self) -> Frames<'_> {
        Frames {
            source: self,
            next_sample: 0,
            index: 0,
        }
    }
}

/// Lazy iterator over the frames of a `FrameSource`
#[derive(Debug)]
pub struct Frames<'a> {
    source: &'a FrameSource,
    next_sample: usize,
    index: usize,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let total = self.source.sample_count();
        if self.next_sample >= total {
            return None;
        }

        let frame_samples = self.source.frame_samples;
        let end = (self.next_sample + frame_samples).min(total);
        let bytes = &self.source.pcm[self.next_sample * 2..end * 2];

        let mut samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| apply_gain(i16::from_le_bytes([pair[0], pair[1]]), self.source.gain))
            .collect();

        let padded = frame_samples - samples.len();
        samples.resize(frame_samples, 0);

        let frame = Frame {
            index: self.index,
            samples,
            padded,
        };

        self.next_sample = end;
        self.index += 1;

        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.source.frame_count() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}

/// Scale a sample, round to nearest and clamp into the i16 range
pub fn apply_gain(sample: i16, gain: f32) -> i16 {
    let scaled = (sample as f32 * gain).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
