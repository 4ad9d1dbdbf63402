//! Single dummy node covering all guest memory
//!
//! Used whenever the real topology cannot be imported. The dummy node
//! satisfies the generic NUMA code without running any host-topology
//! specific initializer (SRAT, AMD northbridge), none of which work in a PV
//! guest.

use crate::memory::numa::{CpuMask, NumaRegistry};
use crate::memory::pfn_phys;

/// Resets the registry, then installs node 0 spanning [0, PFN_PHYS(max_pfn))
/// with every possible CPU on it. Running it twice yields the same state.
pub fn dummy_numa_init(registry: &mut NumaRegistry, possible: &CpuMask, max_pfn: u64) {
    // Slots APIC -> aucun nœud, ensembles de nœuds vidés, blocs et distances oubliés
    registry.reset();

    let end = pfn_phys(max_pfn);
    log::info!("NUMA: Faking a node at [mem {:#018x}-{:#018x}]", 0, end.saturating_sub(1));

    // Registry was just reset: node 0 and a block starting at 0 are always accepted.
    if let Err(e) = registry
        .mark_node_parsed(0)
        .and_then(|()| registry.add_memblk(0, 0, end))
    {
        log::error!("NUMA: dummy node rejected: {}", e);
    }

    for cpu in possible.iter() {
        if let Err(e) = registry.set_cpu_node(cpu, 0) {
            log::error!("NUMA: cpu {} not mapped to dummy node: {}", cpu, e);
        }
    }

    registry.setup_nr_node_ids();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::numa::NumaMemblk;

    #[test]
    fn test_dummy_node_spans_all_memory() {
        let mut reg = NumaRegistry::new();
        reg.mark_node_parsed(3).unwrap();
        reg.add_memblk(3, 0x10_0000, 0x20_0000).unwrap();
        reg.set_cpu_node(1, 3).unwrap();
        reg.set_apicid_to_node(1, Some(3)).unwrap();

        let possible = CpuMask::first_n(2);
        dummy_numa_init(&mut reg, &possible, 0x4_0000);

        assert_eq!(reg.parsed_nodes().iter().collect::<alloc::vec::Vec<_>>(), [0]);
        assert_eq!(reg.memblks(), &[NumaMemblk { nid: 0, start: 0, end: 0x4000_0000 }]);
        assert_eq!(reg.cpu_to_node(0), Some(0));
        assert_eq!(reg.cpu_to_node(1), Some(0));
        assert_eq!(reg.apicid_to_node(1), None);
        assert!(reg.node_cpumask(3).unwrap().is_empty());
        assert_eq!(reg.nr_node_ids(), 1);
    }
}
