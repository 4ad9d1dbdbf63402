//! Scratch tables handed to XENMEM_get_vnuma_info
//!
//! Each table is reserved from the boot allocator (page aligned) for the
//! duration of one attempt, zeroed, and viewed in place as a typed,
//! bounds-checked slice: the hypervisor writes straight into the reserved
//! range. [`ScratchBuffers`] gives every reservation back when dropped, on
//! success and failure alike.

use core::fmt;
use core::mem::size_of;
use core::slice;

use zerocopy::{AsBytes, FromBytes, Ref};

use super::VnumaError;
use crate::arch::x86_64::xen::hypercall::VmemRange;
use crate::memory::{BootAllocator, PhysicalAddress, PAGE_SIZE};

/// Which scratch table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchTable {
    MemRange,
    Distance,
    CpuToNode,
}

impl fmt::Display for ScratchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScratchTable::MemRange => write!(f, "memrange"),
            ScratchTable::Distance => write!(f, "distance"),
            ScratchTable::CpuToNode => write!(f, "cpu_to_node"),
        }
    }
}

/// One reserved, zero-initialized table of `T`, mapped over its reservation
pub struct ScratchBuffer<'a, T> {
    phys: PhysicalAddress,
    bytes: usize,
    table: &'a mut [T],
}

impl<'a, T: FromBytes + AsBytes> ScratchBuffer<'a, T> {
    fn reserve<A: BootAllocator + ?Sized>(
        allocator: &mut A,
        len: usize,
        which: ScratchTable,
    ) -> Option<Self> {
        let bytes = len.checked_mul(size_of::<T>())?;
        let phys = allocator.alloc(bytes, PAGE_SIZE)?;

        match Self::map(allocator, phys, bytes) {
            Some(table) => Some(Self { phys, bytes, table }),
            None => {
                log::warn!("vNUMA: {} table @ {:?} not mapped", which, phys);
                if let Err(e) = allocator.free(phys, bytes) {
                    log::warn!("vNUMA: failed to release {} table @ {:?}: {}", which, phys, e);
                }
                None
            }
        }
    }

    fn map<A: BootAllocator + ?Sized>(
        allocator: &A,
        phys: PhysicalAddress,
        bytes: usize,
    ) -> Option<&'a mut [T]> {
        let virt = allocator.direct_map(phys, bytes)?;
        // SAFETY: [phys, phys + bytes) was reserved for this table alone and
        // stays reserved until `release` consumes the buffer; `direct_map`
        // returned a writable mapping of exactly that range.
        let raw = unsafe { slice::from_raw_parts_mut(virt.as_ptr(), bytes) };
        Ref::<_, [T]>::new_slice_zeroed(raw).map(|r| r.into_mut_slice())
    }
}

/// Mutable views over the three tables, once all of them exist
pub struct ScratchTables<'s> {
    pub memrange: &'s mut [VmemRange],
    pub distance: &'s mut [u32],
    pub cpu_to_node: &'s mut [u32],
}

/// The three scratch tables of one attempt, sized from the possible CPUs
pub struct ScratchBuffers<'a, A: BootAllocator + ?Sized> {
    allocator: &'a mut A,
    memrange: Option<ScratchBuffer<'a, VmemRange>>,
    distance: Option<ScratchBuffer<'a, u32>>,
    cpu_to_node: Option<ScratchBuffer<'a, u32>>,
}

impl<'a, A: BootAllocator + ?Sized> ScratchBuffers<'a, A> {
    /// Reserves `pcpus` ranges, `pcpus * pcpus` distances and `pcpus` CPU
    /// entries. All three are attempted; a missing one is only reported by
    /// [`ScratchBuffers::tables`].
    pub fn allocate(allocator: &'a mut A, pcpus: usize) -> Self {
        let memrange = ScratchBuffer::reserve(allocator, pcpus, ScratchTable::MemRange);
        let distance = pcpus
            .checked_mul(pcpus)
            .and_then(|len| ScratchBuffer::reserve(allocator, len, ScratchTable::Distance));
        let cpu_to_node = ScratchBuffer::reserve(allocator, pcpus, ScratchTable::CpuToNode);

        Self {
            allocator,
            memrange,
            distance,
            cpu_to_node,
        }
    }

    pub fn tables(&mut self) -> Result<ScratchTables<'_>, VnumaError> {
        match (&mut self.memrange, &mut self.distance, &mut self.cpu_to_node) {
            (Some(m), Some(d), Some(c)) => Ok(ScratchTables {
                memrange: &mut *m.table,
                distance: &mut *d.table,
                cpu_to_node: &mut *c.table,
            }),
            (None, _, _) => Err(VnumaError::ScratchAlloc { table: ScratchTable::MemRange }),
            (_, None, _) => Err(VnumaError::ScratchAlloc { table: ScratchTable::Distance }),
            (_, _, None) => Err(VnumaError::ScratchAlloc { table: ScratchTable::CpuToNode }),
        }
    }

    fn release<T>(allocator: &mut A, buffer: Option<ScratchBuffer<'_, T>>, table: ScratchTable) {
        if let Some(buffer) = buffer {
            if let Err(e) = allocator.free(buffer.phys, buffer.bytes) {
                log::warn!("vNUMA: failed to release {} table @ {:?}: {}", table, buffer.phys, e);
            }
        }
    }
}

impl<A: BootAllocator + ?Sized> Drop for ScratchBuffers<'_, A> {
    fn drop(&mut self) {
        Self::release(self.allocator, self.memrange.take(), ScratchTable::MemRange);
        Self::release(self.allocator, self.distance.take(), ScratchTable::Distance);
        Self::release(self.allocator, self.cpu_to_node.take(), ScratchTable::CpuToNode);
    }
}
