//! # NUMA (Non-Uniform Memory Access) Support
//!
//! Picks the topology source at boot and finalizes the registry. Xen PV
//! guests ask the hypervisor (vNUMA); everything else, or any failure, ends
//! on a single dummy node spanning all memory.

use core::fmt;

use super::xen::hypercall::{vnuma_supported, XenMemoryOp};
use super::xen::vnuma::{dummy_numa_init, vnuma_init, VnumaEnv, VnumaError, VnumaOutcome};
use crate::config::NumaOptions;
use crate::memory::numa::NumaRegistry;
use crate::memory::BootAllocator;

/// Why the dummy node was used without trying vNUMA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyReason {
    /// `numa=off`
    NumaOff,
    /// Not a Xen PV guest
    NotXenPv,
    /// `numa=novnuma`
    VnumaDisabled,
    /// Capability probe answered -ENOSYS
    VnumaUnsupported,
}

impl fmt::Display for DummyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DummyReason::NumaOff => write!(f, "NUMA turned off"),
            DummyReason::NotXenPv => write!(f, "No NUMA configuration found"),
            DummyReason::VnumaDisabled => write!(f, "vNUMA disabled on command line"),
            DummyReason::VnumaUnsupported => write!(f, "vNUMA not supported by hypervisor"),
        }
    }
}

/// Topology source that ended up in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumaSource {
    /// Hypervisor topology installed
    Vnuma { nr_nodes: usize },
    /// vNUMA was attempted and fell back to the dummy node
    VnumaFallback(VnumaError),
    /// Dummy node without any vNUMA attempt
    Dummy(DummyReason),
}

impl NumaSource {
    pub fn nr_nodes(&self) -> usize {
        match self {
            NumaSource::Vnuma { nr_nodes } => *nr_nodes,
            _ => 1,
        }
    }
}

/// NUMA init of the boot CPU.
///
/// Never fails: the registry always comes back finalized with at least one
/// online node.
pub fn x86_numa_init<H, A>(
    options: NumaOptions,
    env: &mut VnumaEnv<'_, H, A>,
    registry: &mut NumaRegistry,
) -> NumaSource
where
    H: XenMemoryOp + ?Sized,
    A: BootAllocator + ?Sized,
{
    let source = if options.numa_off() {
        NumaSource::Dummy(DummyReason::NumaOff)
    } else if !env.guest.is_pv() {
        NumaSource::Dummy(DummyReason::NotXenPv)
    } else if options.contains(NumaOptions::NOVNUMA) {
        NumaSource::Dummy(DummyReason::VnumaDisabled)
    } else if !vnuma_supported(&mut *env.hypervisor) {
        NumaSource::Dummy(DummyReason::VnumaUnsupported)
    } else {
        match vnuma_init(env, registry) {
            VnumaOutcome::Installed { nr_nodes } => NumaSource::Vnuma { nr_nodes },
            VnumaOutcome::Fallback(e) => NumaSource::VnumaFallback(e),
        }
    };

    if let NumaSource::Dummy(reason) = source {
        log::info!("NUMA: {}", reason);
        dummy_numa_init(registry, env.possible_cpus, env.max_pfn);
    }

    registry.register_nodes();
    log::info!(
        "NUMA: {} node(s) online, nr_node_ids {}",
        registry.online_nodes().weight(),
        registry.nr_node_ids()
    );
    if options.contains(NumaOptions::DEBUG) {
        registry.dump();
    }

    source
}
