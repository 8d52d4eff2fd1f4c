//! Decoded audio handed to the inference backend.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Job-scoped: built once from an inline payload and dropped when the job
/// finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_rate() {
        let chunk = AudioChunk::new(vec![0.0; 32_000], 16_000);
        assert!((chunk.duration_secs() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_rate_has_zero_duration() {
        let chunk = AudioChunk::new(vec![0.0; 10], 0);
        assert_eq!(chunk.duration_secs(), 0.0);
    }
}
