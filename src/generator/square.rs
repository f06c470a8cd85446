use super::{GeneratorState, SignalGenerator};

/// Square wave of fixed length, the closest cheap stand-in for a stepping drive
pub struct SquareGenerator {
    /// Samples per full cycle
    period: f32,
    amplitude: f32,
    /// Current sample position
    position: usize,
    /// Total duration in samples
    duration: usize,
}

impl SquareGenerator {
    /// Create a square wave
    ///
    /// # Arguments
    /// * `frequency` - Tone in Hz
    /// * `amplitude` - Peak level (0.0 to 1.0)
    /// * `duration_samples` - Length in samples
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Example
    /// ```
    /// use drivetone::generator::SquareGenerator;
    ///
    /// let tone = SquareGenerator::new(262, 0.25, 22050, 44100); // half a second of middle C
    /// ```
    pub fn new(frequency: u16, amplitude: f32, duration_samples: usize, sample_rate: u32) -> Self {
        Self {
            period: sample_rate as f32 / frequency.max(1) as f32,
            amplitude,
            position: 0,
            duration: duration_samples,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn duration(&self) -> usize {
        self.duration
    }

    fn sample_at(&self, index: usize) -> f32 {
        let phase = (index as f32 / self.period).fract();
        if phase < 0.5 {
            self.amplitude
        } else {
            -self.amplitude
        }
    }
}

impl SignalGenerator for SquareGenerator {
    fn process(&mut self, buffer: &mut [f32]) -> GeneratorState {
        let remaining = self.duration.saturating_sub(self.position);

        for (i, sample) in buffer.iter_mut().enumerate() {
            *sample = if i < remaining {
                self.sample_at(self.position + i)
            } else {
                0.0
            };
        }

        self.position = (self.position + buffer.len()).min(self.duration);

        if self.is_complete() {
            GeneratorState::Complete
        } else {
            GeneratorState::Running
        }
    }

    fn is_complete(&self) -> bool {
        self.position >= self.duration
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_alternates() {
        // 1 kHz at 8 kHz: four samples high, four low
        let mut tone = SquareGenerator::new(1000, 0.5, 16, 8000);
        let mut buffer = [0.0f32; 8];

        let state = tone.process(&mut buffer);
        assert_eq!(state, GeneratorState::Running);
        assert_eq!(buffer, [0.5, 0.5, 0.5, 0.5, -0.5, -0.5, -0.5, -0.5]);

        let state = tone.process(&mut buffer);
        assert_eq!(state, GeneratorState::Complete);
        assert!(tone.is_complete());
    }

    #[test]
    fn test_silence_after_end() {
        let mut tone = SquareGenerator::new(1000, 1.0, 3, 8000);
        let mut buffer = [9.0f32; 6];
        assert_eq!(tone.process(&mut buffer), GeneratorState::Complete);
        assert_eq!(&buffer[..3], &[1.0, 1.0, 1.0]);
        assert_eq!(&buffer[3..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reset() {
        let mut tone = SquareGenerator::new(440, 0.3, 100, 44100);
        let mut first = [0.0f32; 100];
        tone.process(&mut first);
        assert!(tone.is_complete());

        tone.reset();
        assert_eq!(tone.position(), 0);
        let mut second = [0.0f32; 100];
        tone.process(&mut second);
        assert_eq!(first, second);
    }
}
