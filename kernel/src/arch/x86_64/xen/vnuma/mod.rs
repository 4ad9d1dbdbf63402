//! Xen PV vNUMA topology import
//!
//! Runs once during early boot on the boot CPU, before any secondary CPU is
//! up. One attempt goes through:
//!
//! ```text
//! reset -> allocate scratch -> XENMEM_get_vnuma_info -> validate
//!       -> install ............................ -> release scratch -> Installed
//!       -> (any failure) ...... release scratch -> dummy node       -> Fallback
//! ```
//!
//! The attempt never leaves a half-installed topology: a failure resets the
//! registry wholesale before the dummy node goes in.

pub mod fallback;
pub mod install;
pub mod scratch;
pub mod validate;

use core::fmt;

use self::scratch::{ScratchBuffers, ScratchTable, ScratchTables};
use super::hypercall::{VnumaTopologyRequest, XenMemoryOp};
use super::XenDomainType;
use crate::memory::numa::{CpuMask, NumaError, NumaRegistry};
use crate::memory::BootAllocator;

pub use fallback::dummy_numa_init;
pub use validate::VnumaTopology;

/// Why an attempt ended on the dummy node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnumaError {
    /// Only PV guests can query their topology
    NotPvGuest,
    /// A scratch table could not be reserved
    ScratchAlloc { table: ScratchTable },
    /// Hypercall returned a negative status
    Hypercall { status: i32 },
    /// Hypervisor reported zero nodes
    NoNodes,
    /// More nodes than possible CPUs (or than the kernel supports)
    TooManyNodes { nr_nodes: usize, limit: usize },
    /// A possible CPU has no slot in the cpu_to_node table
    CpuOutOfRange { cpu: usize },
    /// A CPU maps to a node that was not reported
    CpuNodeOutOfRange { cpu: usize, node: usize },
    /// The registry rejected part of the topology
    Registry(NumaError),
}

impl fmt::Display for VnumaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VnumaError::NotPvGuest => write!(f, "not a PV guest"),
            VnumaError::ScratchAlloc { table } => write!(f, "cannot allocate {} table", table),
            VnumaError::Hypercall { status } => write!(f, "XENMEM_get_vnuma_info failed ({})", status),
            VnumaError::NoNodes => write!(f, "no nodes reported"),
            VnumaError::TooManyNodes { nr_nodes, limit } => {
                write!(f, "{} nodes reported, at most {} supported", nr_nodes, limit)
            }
            VnumaError::CpuOutOfRange { cpu } => write!(f, "cpu {} outside cpu_to_node table", cpu),
            VnumaError::CpuNodeOutOfRange { cpu, node } => {
                write!(f, "cpu {} mapped to unknown node {}", cpu, node)
            }
            VnumaError::Registry(e) => write!(f, "{}", e),
        }
    }
}

impl From<NumaError> for VnumaError {
    fn from(e: NumaError) -> Self {
        VnumaError::Registry(e)
    }
}

/// Result of one import attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnumaOutcome {
    /// Hypervisor topology installed with `nr_nodes` nodes
    Installed { nr_nodes: usize },
    /// Dummy single node installed instead
    Fallback(VnumaError),
}

impl VnumaOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, VnumaOutcome::Installed { .. })
    }

    /// Number of nodes left in the registry
    pub fn nr_nodes(&self) -> usize {
        match self {
            VnumaOutcome::Installed { nr_nodes } => *nr_nodes,
            VnumaOutcome::Fallback(_) => 1,
        }
    }
}

/// Boot environment of the import
pub struct VnumaEnv<'a, H: XenMemoryOp + ?Sized, A: BootAllocator + ?Sized> {
    pub guest: XenDomainType,
    pub possible_cpus: &'a CpuMask,
    /// Highest usable page frame, spanned by the dummy node
    pub max_pfn: u64,
    pub hypervisor: &'a mut H,
    pub memblock: &'a mut A,
}

impl<'a, H: XenMemoryOp + ?Sized, A: BootAllocator + ?Sized> VnumaEnv<'a, H, A> {
    /// Environment whose dummy node spans all RAM known to `memblock`
    pub fn new(
        guest: XenDomainType,
        possible_cpus: &'a CpuMask,
        hypervisor: &'a mut H,
        memblock: &'a mut A,
    ) -> Self {
        let max_pfn = memblock.end_pfn();
        Self {
            guest,
            possible_cpus,
            max_pfn,
            hypervisor,
            memblock,
        }
    }
}

/// Imports the hypervisor topology, or installs the dummy node.
///
/// The registry is reset first; on return it holds exactly one of the two.
pub fn vnuma_init<H, A>(env: &mut VnumaEnv<'_, H, A>, registry: &mut NumaRegistry) -> VnumaOutcome
where
    H: XenMemoryOp + ?Sized,
    A: BootAllocator + ?Sized,
{
    registry.reset();

    match try_vnuma_init(env, registry) {
        Ok(nr_nodes) => {
            log::info!("vNUMA: {} node(s) from hypervisor", nr_nodes);
            VnumaOutcome::Installed { nr_nodes }
        }
        Err(e) => {
            log::info!("vNUMA: {}, using dummy node", e);
            dummy_numa_init(registry, env.possible_cpus, env.max_pfn);
            VnumaOutcome::Fallback(e)
        }
    }
}

/// Boot-facing entry point.
///
/// Only an ineligible guest is reported to the caller; every other failure
/// is absorbed by the dummy node so that boot always proceeds.
pub fn xen_numa_init<H, A>(env: &mut VnumaEnv<'_, H, A>, registry: &mut NumaRegistry) -> Result<(), VnumaError>
where
    H: XenMemoryOp + ?Sized,
    A: BootAllocator + ?Sized,
{
    match vnuma_init(env, registry) {
        VnumaOutcome::Fallback(VnumaError::NotPvGuest) => Err(VnumaError::NotPvGuest),
        _ => Ok(()),
    }
}

fn try_vnuma_init<H, A>(env: &mut VnumaEnv<'_, H, A>, registry: &mut NumaRegistry) -> Result<usize, VnumaError>
where
    H: XenMemoryOp + ?Sized,
    A: BootAllocator + ?Sized,
{
    // Avant toute allocation
    validate::check_guest(env.guest)?;

    let pcpus = env.possible_cpus.weight();
    let mut scratch = ScratchBuffers::allocate(&mut *env.memblock, pcpus);
    let mut tables = scratch.tables()?;

    let nr_nodes = query_topology(&mut *env.hypervisor, &mut tables)?;
    let topology = validate::check_topology(
        nr_nodes,
        env.possible_cpus,
        tables.memrange,
        tables.distance,
        tables.cpu_to_node,
    )?;

    install::install_topology(registry, &topology, env.possible_cpus)?;
    Ok(topology.nr_nodes())
}

/// Issues the query for this domain; returns the reported node count
fn query_topology<H: XenMemoryOp + ?Sized>(
    hypervisor: &mut H,
    tables: &mut ScratchTables<'_>,
) -> Result<u32, VnumaError> {
    let mut nr_nodes = 0u32;
    let mut request = VnumaTopologyRequest::for_self(
        &mut nr_nodes,
        &mut *tables.memrange,
        &mut *tables.distance,
        &mut *tables.cpu_to_node,
    );
    let status = hypervisor.get_vnuma_info(Some(&mut request));
    validate::check_status(status)?;
    Ok(nr_nodes)
}
