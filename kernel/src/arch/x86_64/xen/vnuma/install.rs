//! Installs a validated vNUMA topology into the registry

use super::validate::VnumaTopology;
use super::VnumaError;
use crate::memory::numa::{CpuMask, NumaRegistry};

/// Node memory, then node IDs, CPUs and finally distances.
///
/// A rejected memory block aborts the install; the caller falls back and
/// its reset discards whatever was already registered.
pub fn install_topology(
    registry: &mut NumaRegistry,
    topology: &VnumaTopology<'_>,
    possible: &CpuMask,
) -> Result<(), VnumaError> {
    let nr_nodes = topology.nr_nodes();

    // Plages en adresses physiques, alignées sur la carte e820 du domaine
    for (nid, range) in topology.memranges().iter().enumerate() {
        registry.add_memblk(nid, range.start, range.end)?;
        registry.mark_node_parsed(nid)?;
        log::debug!(
            "vNUMA: node {} [mem {:#010x}-{:#010x}]",
            nid,
            range.start,
            range.end.saturating_sub(1)
        );
    }

    registry.setup_nr_node_ids();

    // Toutes les CPUs possibles, pas seulement celles en ligne.
    // PV: the APIC ID of a vCPU is its index.
    for cpu in possible.iter() {
        let node = topology.cpu_node(cpu);
        registry.set_apicid_to_node(cpu, Some(node))?;
        registry.set_cpu_node(cpu, node)?;
    }

    for from in 0..nr_nodes {
        for to in 0..nr_nodes {
            if let Err(e) = registry.set_distance(from, to, topology.distance(from, to)) {
                log::warn!("NUMA: Warning: {}, ignored", e);
            }
        }
    }

    Ok(())
}
