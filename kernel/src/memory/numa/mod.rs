//! NUMA (Non-Uniform Memory Access) support
//!
//! The boot-time topology registry lives in [`registry`]. It is filled by
//! whichever firmware/hypervisor source the architecture picks (for Xen PV:
//! `arch::x86_64::xen::vnuma`), finalized once, then published here for the
//! rest of the kernel.

pub mod nodemask;
pub mod registry;

use core::fmt;

use spin::Once;

pub use nodemask::{CpuMask, NodeMask};
pub use registry::{NumaMemblk, NumaRegistry};

/// NUMA node ID
pub type NodeId = usize;

/// Maximum number of NUMA nodes supported
pub const MAX_NUMNODES: usize = 64;

/// Maximum number of memory blocks across all nodes
pub const NR_NODE_MEMBLKS: usize = MAX_NUMNODES * 2;

/// Maximum number of CPUs supported for NUMA mapping
pub const MAX_CPUS: usize = 256;

/// Number of local APIC ID slots
pub const MAX_LOCAL_APIC: usize = 32768;

/// Distance value for same-node access (local)
pub const LOCAL_DISTANCE: u8 = 10;

/// Default distance value for different-node access (remote)
pub const REMOTE_DISTANCE: u8 = 20;

/// Errors reported by the topology registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumaError {
    /// Node ID outside `[0, MAX_NUMNODES)`
    InvalidNode { node: NodeId },
    /// CPU index outside `[0, MAX_CPUS)`
    InvalidCpu { cpu: usize },
    /// APIC ID outside `[0, MAX_LOCAL_APIC)`
    InvalidApicId { apicid: usize },
    /// Memory block table is full
    TooManyMemblks,
    /// Memory block with `start > end`
    InvertedRange { node: NodeId, start: u64, end: u64 },
    /// Memory block overlapping a block owned by another node
    Overlap { node: NodeId, start: u64, end: u64, other: NodeId },
    /// Distance outside the node span or not representable
    InvalidDistance { from: NodeId, to: NodeId, distance: u32 },
    /// Topology was already published for this boot
    AlreadyPublished,
}

impl fmt::Display for NumaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumaError::InvalidNode { node } => write!(f, "invalid node {}", node),
            NumaError::InvalidCpu { cpu } => write!(f, "invalid cpu {}", cpu),
            NumaError::InvalidApicId { apicid } => write!(f, "invalid apicid {:#x}", apicid),
            NumaError::TooManyMemblks => write!(f, "too many memblk ranges"),
            NumaError::InvertedRange { node, start, end } => {
                write!(f, "invalid memblk node {} [mem {:#010x}-{:#010x}]", node, start, end)
            }
            NumaError::Overlap { node, start, end, other } => write!(
                f,
                "node {} [mem {:#010x}-{:#010x}] overlaps with node {}",
                node, start, end, other
            ),
            NumaError::InvalidDistance { from, to, distance } => {
                write!(f, "invalid distance {} for {} -> {}", distance, from, to)
            }
            NumaError::AlreadyPublished => write!(f, "topology already published"),
        }
    }
}

static NUMA_TOPOLOGY: Once<NumaRegistry> = Once::new();

/// Publishes the finalized registry for the remainder of the boot.
///
/// Only the first call succeeds; the registry is immutable afterwards.
pub fn publish(registry: NumaRegistry) -> Result<&'static NumaRegistry, NumaError> {
    let mut pending = Some(registry);
    let stored = NUMA_TOPOLOGY.call_once(|| pending.take().unwrap_or_default());
    match pending {
        None => {
            log::info!("NUMA: topology published, {} node(s)", stored.parsed_nodes().weight());
            Ok(stored)
        }
        Some(_) => Err(NumaError::AlreadyPublished),
    }
}

/// Published topology, if any
pub fn topology() -> Option<&'static NumaRegistry> {
    NUMA_TOPOLOGY.get()
}

/// Node of `cpu` in the published topology (node 0 before publication)
pub fn cpu_to_node(cpu: usize) -> NodeId {
    topology().and_then(|t| t.cpu_to_node(cpu)).unwrap_or(0)
}

/// Distance between two nodes (lower = faster)
pub fn node_distance(from: NodeId, to: NodeId) -> u8 {
    match topology() {
        Some(t) => t.node_distance(from, to),
        None if from == to => LOCAL_DISTANCE,
        None => REMOTE_DISTANCE,
    }
}

/// Number of node IDs in use (1 before publication)
pub fn nr_node_ids() -> usize {
    topology().map(|t| t.nr_node_ids()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Seul test du crate qui publie : l'état global vit pour tout le processus.
    #[test]
    fn test_publish_once() {
        let mut reg = NumaRegistry::new();
        reg.mark_node_parsed(0).unwrap();
        reg.mark_node_parsed(1).unwrap();
        reg.add_memblk(0, 0, 0x1000).unwrap();
        reg.add_memblk(1, 0x1000, 0x2000).unwrap();
        reg.set_cpu_node(3, 1).unwrap();
        reg.register_nodes();

        let published = publish(reg).unwrap();
        assert_eq!(published.online_nodes().weight(), 2);
        assert_eq!(cpu_to_node(3), 1);
        assert_eq!(cpu_to_node(200), 0);
        assert_eq!(node_distance(0, 1), REMOTE_DISTANCE);
        assert_eq!(nr_node_ids(), 2);

        assert_eq!(publish(NumaRegistry::new()).err(), Some(NumaError::AlreadyPublished));
    }
}
