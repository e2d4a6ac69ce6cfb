//! Audio frame handed from the capture source to the meter.

/// One analysis window of normalized samples in [-1.0, 1.0].
///
/// Produced once per level tick and consumed immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Sequence number of the pull that produced this frame.
    pub sequence: u64,
    /// Normalized samples, oldest first.
    pub samples: Vec<f32>,
}

impl AudioFrame {
    /// Creates a new audio frame.
    pub fn new(sequence: u64, samples: Vec<f32>) -> Self {
        Self { sequence, samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame() {
        assert!(AudioFrame::new(0, Vec::new()).is_empty());
        assert!(!AudioFrame::new(1, vec![0.0; 2048]).is_empty());
    }
}
