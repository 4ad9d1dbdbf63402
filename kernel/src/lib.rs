// src/lib.rs
// Initialisation NUMA de boot : découverte vNUMA Xen PV et registre de topologie
#![cfg_attr(not(test), no_std)]

// Import de alloc pour les allocations dynamiques
extern crate alloc;

pub mod arch;
pub mod config;
pub mod logger;
pub mod memory;

pub use arch::x86_64::numa::{x86_numa_init, NumaSource};
pub use arch::x86_64::xen::vnuma::{vnuma_init, xen_numa_init, VnumaEnv, VnumaError, VnumaOutcome};
pub use config::NumaOptions;
pub use memory::numa::{CpuMask, NumaRegistry};
