// Small process-level helpers for the adapters.

pub mod clock;
pub mod rng;
