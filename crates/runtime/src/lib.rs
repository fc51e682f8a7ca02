// runtime crate

pub mod client;
pub mod container;
pub mod emulation;
pub mod memory;

#[cfg(test)]
mod emulation_test;

pub use client::{Provisioned, RuntimeClient, RuntimeConfig, SpawnedEnvironment};
pub use container::{ExecOutput, ExecRequest, RuntimeError, Substrate};
pub use emulation::EmulationSubstrate;
pub use memory::{MemorySubstrate, SubstrateCall};
