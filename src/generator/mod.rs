pub mod square;

pub use square::SquareGenerator;

/// Represents the current state of a signal generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Generator is still producing samples
    Running,
    /// Generator has completed and will produce no more samples
    Complete,
}

/// Core trait for preview signal generators
///
/// Generators produce samples frame by frame so long renders never need
/// the whole voice in memory at once.
pub trait SignalGenerator {
    /// Fill `buffer` with the next samples
    ///
    /// Samples past the end of the signal are written as silence, and
    /// `GeneratorState::Complete` is returned once the end is reached.
    fn process(&mut self, buffer: &mut [f32]) -> GeneratorState;

    fn is_complete(&self) -> bool;

    /// Rewind to the first sample
    fn reset(&mut self);
}
