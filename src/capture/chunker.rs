//! Sample-rate reduction and fixed-size framing for outbound audio
//!
//! Capture hardware rarely runs at the gateway's 16 kHz; the pump
//! downsamples whatever rate the device delivers and re-chunks the result
//! into fixed 4096-sample frames before transmission.

/// Reduce the sample rate by averaging each group of `source/target`
/// consecutive samples into one. A trailing short group is averaged over
/// its actual length.
///
/// Handles integer ratios only; anything else passes through unchanged
/// so the gateway gets off-rate audio rather than nothing.
pub fn downsample(samples: &[i16], source_rate: u32, target_rate: u32) -> Vec<i16> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    let ratio = match decimation_ratio(source_rate, target_rate) {
        Some(ratio) => ratio,
        None => {
            log::warn!(
                "Cannot decimate {} Hz to {} Hz, passing audio through",
                source_rate,
                target_rate
            );
            return samples.to_vec();
        }
    };

    let mut out = Vec::with_capacity(samples.len() / ratio + 1);
    let mut acc: i64 = 0;
    let mut group_len: i64 = 0;
    for &sample in samples {
        acc += sample as i64;
        group_len += 1;
        if group_len == ratio as i64 {
            out.push((acc / group_len) as i16);
            acc = 0;
            group_len = 0;
        }
    }
    if group_len > 0 {
        out.push((acc / group_len) as i16);
    }
    out
}

fn decimation_ratio(source_rate: u32, target_rate: u32) -> Option<usize> {
    if source_rate == 0 || target_rate == 0 || source_rate % target_rate != 0 {
        return None;
    }
    Some((source_rate / target_rate) as usize)
}

/// Accumulates samples and drains them as fixed-size frames.
///
/// Not internally synchronized; owned by the single pump task.
#[derive(Debug)]
pub struct FrameChunker {
    buffer: Vec<i16>,
    frame_samples: usize,
}

impl FrameChunker {
    pub fn new(frame_samples: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(frame_samples * 2),
            frame_samples,
        }
    }

    /// Append samples and return every complete frame now available.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Vec<i16>> {
        self.buffer.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_samples {
            frames.push(self.buffer.drain(..self.frame_samples).collect());
        }
        frames
    }

    /// Drain whatever remains as a final partial frame, if any.
    #[cfg(test)]
    fn flush(&mut self) -> Option<Vec<i16>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Samples currently waiting for a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsample_3x() {
        // 48kHz → 16kHz (3:1)
        let input = vec![100i16, 200, 300, 400, 500, 600];
        let output = downsample(&input, 48000, 16000);

        assert_eq!(output.len(), 2);
        assert_eq!(output[0], 200); // (100 + 200 + 300) / 3
        assert_eq!(output[1], 500); // (400 + 500 + 600) / 3
    }

    #[test]
    fn downsample_same_rate_is_identity() {
        let input = vec![100i16, 200, 300];
        assert_eq!(downsample(&input, 16000, 16000), input);
    }

    #[test]
    fn downsample_averages_the_trailing_short_group() {
        let output = downsample(&[10, 20, 30, 40, 50], 32000, 16000);
        assert_eq!(output, vec![15, 35, 50]);
    }

    #[test]
    fn downsample_unsupported_ratio_returns_original() {
        // 44.1kHz → 16kHz is not an integer ratio
        let input = vec![100i16, 200, 300];
        assert_eq!(downsample(&input, 44100, 16000), input);
    }

    #[test]
    fn downsample_zero_rate_returns_original() {
        let input = vec![100i16, 200, 300];
        assert_eq!(downsample(&input, 48000, 0), input);
        assert_eq!(downsample(&input, 0, 16000), input);
    }

    #[test]
    fn chunker_emits_only_complete_frames() {
        let mut chunker = FrameChunker::new(4);

        assert!(chunker.push(&[1, 2, 3]).is_empty());
        assert_eq!(chunker.pending(), 3);

        let frames = chunker.push(&[4, 5]);
        assert_eq!(frames, vec![vec![1, 2, 3, 4]]);
        assert_eq!(chunker.pending(), 1);
    }

    #[test]
    fn chunker_emits_multiple_frames_at_once() {
        let mut chunker = FrameChunker::new(2);
        let frames = chunker.push(&[1, 2, 3, 4, 5]);
        assert_eq!(frames, vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(chunker.pending(), 1);
    }

    #[test]
    fn chunker_preserves_sample_order_across_pushes() {
        let mut chunker = FrameChunker::new(3);
        let mut out = Vec::new();
        for block in [[1i16, 2].as_slice(), &[3, 4], &[5, 6, 7]] {
            for frame in chunker.push(block) {
                out.extend(frame);
            }
        }
        if let Some(rest) = chunker.flush() {
            out.extend(rest);
        }
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn flush_drains_the_partial_frame() {
        let mut chunker = FrameChunker::new(4);
        chunker.push(&[9, 9]);
        assert_eq!(chunker.flush(), Some(vec![9, 9]));
        assert_eq!(chunker.flush(), None);
    }
}
