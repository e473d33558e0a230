//! Benchmarks for low-level DSP primitives.

mod amplify;
mod detune;
mod envelope;
mod mix;
mod oscillator;

pub use amplify::bench_amplify;
pub use detune::bench_detune;
pub use envelope::bench_envelope;
pub use mix::bench_mix;
pub use oscillator::bench_oscillator;
