//! Checks applied to the hypervisor answer before anything is installed
//!
//! Order matters: guest type, scratch tables, hypercall status, node count,
//! then the per-CPU table. The first failure ends the attempt.

use super::VnumaError;
use crate::arch::x86_64::xen::hypercall::VmemRange;
use crate::arch::x86_64::xen::XenDomainType;
use crate::memory::numa::{CpuMask, NodeId, MAX_NUMNODES};

/// Validated view over the scratch tables
#[derive(Debug, Clone, Copy)]
pub struct VnumaTopology<'s> {
    nr_nodes: usize,
    memrange: &'s [VmemRange],
    distance: &'s [u32],
    cpu_to_node: &'s [u32],
}

impl<'s> VnumaTopology<'s> {
    pub fn nr_nodes(&self) -> usize {
        self.nr_nodes
    }

    /// Memory range of each node, indexed by node ID
    pub fn memranges(&self) -> &'s [VmemRange] {
        &self.memrange[..self.nr_nodes]
    }

    /// Distance from `from` to `to`.
    ///
    /// The table is destination-major with stride `nr_nodes`: the entry for
    /// (from, to) sits at `to * nr_nodes + from`.
    pub fn distance(&self, from: NodeId, to: NodeId) -> u32 {
        self.distance[to * self.nr_nodes + from]
    }

    pub fn cpu_node(&self, cpu: usize) -> NodeId {
        self.cpu_to_node[cpu] as NodeId
    }
}

/// Only PV guests can issue the query
pub fn check_guest(guest: XenDomainType) -> Result<(), VnumaError> {
    if !guest.is_pv() {
        return Err(VnumaError::NotPvGuest);
    }
    Ok(())
}

pub fn check_status(status: i32) -> Result<(), VnumaError> {
    if status < 0 {
        return Err(VnumaError::Hypercall { status });
    }
    Ok(())
}

/// Validates the reported node count and CPU table against the possible CPUs
pub fn check_topology<'s>(
    nr_nodes: u32,
    possible: &CpuMask,
    memrange: &'s [VmemRange],
    distance: &'s [u32],
    cpu_to_node: &'s [u32],
) -> Result<VnumaTopology<'s>, VnumaError> {
    let nr_nodes = nr_nodes as usize;
    let pcpus = possible.weight();

    if nr_nodes == 0 {
        return Err(VnumaError::NoNodes);
    }
    if nr_nodes > pcpus {
        log::debug!("vNUMA: Node without cpu is not supported in this version.");
        return Err(VnumaError::TooManyNodes { nr_nodes, limit: pcpus });
    }
    if nr_nodes > MAX_NUMNODES {
        return Err(VnumaError::TooManyNodes { nr_nodes, limit: MAX_NUMNODES });
    }
    // Les tables sont dimensionnées sur pcpus : nr_nodes <= pcpus les couvre
    if memrange.len() < nr_nodes || distance.len() < nr_nodes * nr_nodes {
        return Err(VnumaError::TooManyNodes { nr_nodes, limit: memrange.len() });
    }

    for cpu in possible.iter() {
        let node = *cpu_to_node
            .get(cpu)
            .ok_or(VnumaError::CpuOutOfRange { cpu })? as usize;
        if node >= nr_nodes {
            return Err(VnumaError::CpuNodeOutOfRange { cpu, node });
        }
    }

    Ok(VnumaTopology {
        nr_nodes,
        memrange,
        distance,
        cpu_to_node,
    })
}
