//! Test doubles shared by the integration tests
#![allow(dead_code)]

use core::mem::size_of_val;
use core::ptr::NonNull;

use vnuma_kernel::arch::x86_64::xen::hypercall::{
    VmemRange, VnumaTopologyRequest, XenMemoryOp, ENOBUFS, ENOSYS,
};
use vnuma_kernel::arch::x86_64::xen::DomId;
use vnuma_kernel::memory::{BootAllocator, Memblock, MemoryResult, PhysicalAddress};

/// Boot RAM of the simulated guest, physical [0, RAM_SIZE)
pub const RAM_SIZE: u64 = 1 << 20;

/// Hypervisor answering XENMEM_get_vnuma_info from a canned topology.
///
/// `distance[i][j]` is the distance from node `i` to node `j`; it is written
/// destination-major with stride `nr_nodes`, like Xen does.
#[derive(Debug, Clone, Default)]
pub struct FakeHypervisor {
    /// Status of the null-argument probe (`-ENOSYS` = not implemented)
    pub probe_status: i32,
    /// Status of the real query; negative means nothing is written
    pub status: i32,
    /// Reported node count, possibly hostile
    pub nr_nodes: u32,
    pub memranges: Vec<VmemRange>,
    pub distance: Vec<Vec<u32>>,
    pub cpu_to_node: Vec<u32>,
    pub probes: usize,
    pub queries: usize,
    pub last_domid: Option<DomId>,
    /// (address, byte length) of the memrange, distance and cpu_to_node
    /// tables of the last query
    pub buffers: Vec<(usize, usize)>,
}

impl FakeHypervisor {
    /// Well-formed topology: one node count, ranges, matrix and CPU table
    pub fn with_topology(memranges: Vec<VmemRange>, distance: Vec<Vec<u32>>, cpu_to_node: Vec<u32>) -> Self {
        Self {
            nr_nodes: memranges.len() as u32,
            memranges,
            distance,
            cpu_to_node,
            ..Self::default()
        }
    }

    /// Hypervisor that predates vNUMA
    pub fn without_vnuma() -> Self {
        Self {
            probe_status: -ENOSYS,
            status: -ENOSYS,
            ..Self::default()
        }
    }

    /// Two nodes, four CPUs: the reference topology used across tests
    pub fn two_nodes() -> Self {
        Self::with_topology(
            vec![VmemRange::new(0, 0x1000), VmemRange::new(0x1000, 0x2000)],
            vec![vec![10, 20], vec![20, 10]],
            vec![0, 0, 1, 1],
        )
    }
}

impl XenMemoryOp for FakeHypervisor {
    fn get_vnuma_info(&mut self, request: Option<&mut VnumaTopologyRequest<'_>>) -> i32 {
        let Some(req) = request else {
            self.probes += 1;
            return self.probe_status;
        };
        self.queries += 1;
        self.last_domid = Some(req.domid);
        self.buffers = vec![
            (req.memrange.as_ptr() as usize, size_of_val(&*req.memrange)),
            (req.distance.as_ptr() as usize, size_of_val(&*req.distance)),
            (req.cpu_to_node.as_ptr() as usize, size_of_val(&*req.cpu_to_node)),
        ];

        if self.status < 0 {
            return self.status;
        }

        let n = self.distance.len();
        if self.memranges.len() > req.memrange.len()
            || n * n > req.distance.len()
            || self.cpu_to_node.len() > req.cpu_to_node.len()
        {
            return -ENOBUFS;
        }

        *req.nr_nodes = self.nr_nodes;
        req.memrange[..self.memranges.len()].copy_from_slice(&self.memranges);
        for (from, row) in self.distance.iter().enumerate() {
            for (to, &d) in row.iter().enumerate() {
                req.distance[to * n + from] = d;
            }
        }
        req.cpu_to_node[..self.cpu_to_node.len()].copy_from_slice(&self.cpu_to_node);
        self.status
    }
}

/// Memblock over host memory, counting calls and optionally failing the
/// n-th allocation
pub struct CountingAllocator {
    pub inner: Memblock,
    pub allocs: usize,
    pub frees: usize,
    pub fail_alloc: Option<usize>,
    /// Every range handed out, in order
    pub reservations: Vec<(u64, usize)>,
    ram: Vec<u64>,
}

impl CountingAllocator {
    pub fn new() -> Self {
        let mut ram = vec![0u64; RAM_SIZE as usize / 8];
        let mut inner = Memblock::new();
        inner.add(0, RAM_SIZE).expect("ram");
        // SAFETY: the heap buffer of `ram` covers [0, RAM_SIZE), never moves
        // and lives as long as `inner`
        unsafe { inner.set_direct_map(ram.as_mut_ptr() as usize) };
        Self {
            inner,
            allocs: 0,
            frees: 0,
            fail_alloc: None,
            reservations: Vec::new(),
            ram,
        }
    }

    pub fn failing_at(n: usize) -> Self {
        Self {
            fail_alloc: Some(n),
            ..Self::new()
        }
    }

    pub fn outstanding(&self) -> u64 {
        self.inner.reserved_size()
    }

    /// Physical address behind a host pointer into the simulated RAM
    pub fn phys_of(&self, addr: usize) -> Option<u64> {
        let offset = addr.checked_sub(self.ram.as_ptr() as usize)? as u64;
        (offset < RAM_SIZE).then_some(offset)
    }

    /// Whether `[phys, phys + len)` lies inside one handed-out range
    pub fn was_reserved(&self, phys: u64, len: usize) -> bool {
        self.reservations
            .iter()
            .any(|&(base, size)| base <= phys && phys + len as u64 <= base + size as u64)
    }

    pub fn read_u64(&self, phys: u64) -> u64 {
        self.ram[(phys / 8) as usize]
    }
}

impl BootAllocator for CountingAllocator {
    fn alloc(&mut self, size: usize, align: usize) -> Option<PhysicalAddress> {
        let index = self.allocs;
        self.allocs += 1;
        if self.fail_alloc == Some(index) {
            return None;
        }
        let base = self.inner.alloc(size, align)?;
        self.reservations.push((base.value(), size));
        Some(base)
    }

    fn free(&mut self, base: PhysicalAddress, size: usize) -> MemoryResult<()> {
        self.frees += 1;
        self.inner.free(base, size)
    }

    fn direct_map(&self, base: PhysicalAddress, size: usize) -> Option<NonNull<u8>> {
        self.inner.direct_map(base, size)
    }

    fn end_pfn(&self) -> u64 {
        self.inner.end_pfn()
    }
}
