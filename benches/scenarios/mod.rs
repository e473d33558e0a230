//! Real-world scenario benchmarks.
//!
//! These model a group as the demo binary plays it: several oscillator
//! children, unisono stacks, an FM pair, and a send matrix on the master bus.

mod group;
mod routing;

pub use group::bench_group;
pub use routing::bench_routing;
