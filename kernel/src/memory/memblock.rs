//! Memblock: allocateur physique de boot
//!
//! Suit deux tables de régions (RAM déclarée, plages réservées) à capacité
//! fixe, sans allocation dynamique. Les allocations se font du haut vers le
//! bas, en first-fit, hors de toute plage réservée.

use core::ptr::NonNull;

use super::{MemoryError, MemoryResult, PhysicalAddress, PAGE_SHIFT};

/// Capacité de chaque table de régions
pub const INIT_MEMBLOCK_REGIONS: usize = 128;

/// Early boot physical allocator, as consumed by NUMA bring-up.
///
/// Returned ranges must be released with [`BootAllocator::free`] using the
/// same size that was requested.
pub trait BootAllocator {
    /// Reserve `size` bytes aligned on `align` (power of two).
    fn alloc(&mut self, size: usize, align: usize) -> Option<PhysicalAddress>;

    /// Return a range previously obtained from [`BootAllocator::alloc`].
    fn free(&mut self, base: PhysicalAddress, size: usize) -> MemoryResult<()>;

    /// Writable mapping of the reserved range `[base, base + size)`.
    ///
    /// `None` when the range is not reserved RAM covered by the direct map.
    fn direct_map(&self, base: PhysicalAddress, size: usize) -> Option<NonNull<u8>>;

    /// Highest page frame backed by RAM (max_pfn)
    fn end_pfn(&self) -> u64;
}

/// Plage physique [base, base + size)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemblockRegion {
    pub base: u64,
    pub size: u64,
}

impl MemblockRegion {
    pub const fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    pub const fn end(&self) -> u64 {
        self.base + self.size
    }

    pub const fn overlaps(&self, base: u64, end: u64) -> bool {
        self.base < end && base < self.end()
    }
}

struct RegionTable {
    regions: [MemblockRegion; INIT_MEMBLOCK_REGIONS],
    cnt: usize,
}

impl RegionTable {
    const fn new() -> Self {
        Self {
            regions: [MemblockRegion::new(0, 0); INIT_MEMBLOCK_REGIONS],
            cnt: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.cnt == INIT_MEMBLOCK_REGIONS
    }

    fn as_slice(&self) -> &[MemblockRegion] {
        &self.regions[..self.cnt]
    }

    fn find_overlap(&self, base: u64, end: u64) -> Option<usize> {
        self.as_slice().iter().position(|r| r.overlaps(base, end))
    }

    /// Insertion triée par adresse de base
    fn insert(&mut self, region: MemblockRegion) -> MemoryResult<()> {
        if self.is_full() {
            return Err(MemoryError::TooManyRegions);
        }
        let idx = self
            .as_slice()
            .iter()
            .position(|r| r.base > region.base)
            .unwrap_or(self.cnt);
        self.regions.copy_within(idx..self.cnt, idx + 1);
        self.regions[idx] = region;
        self.cnt += 1;
        Ok(())
    }

    fn remove(&mut self, idx: usize) -> MemblockRegion {
        let region = self.regions[idx];
        self.regions.copy_within(idx + 1..self.cnt, idx);
        self.cnt -= 1;
        region
    }

    fn total_size(&self) -> u64 {
        self.as_slice().iter().map(|r| r.size).sum()
    }
}

/// Early physical memory allocator
pub struct Memblock {
    memory: RegionTable,
    reserved: RegionTable,
    /// Virtual address of physical 0 in the direct map
    phys_offset: Option<usize>,
}

impl Memblock {
    pub const fn new() -> Self {
        Self {
            memory: RegionTable::new(),
            reserved: RegionTable::new(),
            phys_offset: None,
        }
    }

    /// Declares the direct map: physical `p` is accessible at `phys_offset + p`.
    ///
    /// Until this is called no range can be mapped and
    /// [`BootAllocator::direct_map`] always fails.
    ///
    /// # Safety
    ///
    /// Every range passed to [`Memblock::add`], before or after this call,
    /// must stay mapped read-write at `phys_offset + base` for the lifetime
    /// of the allocator, and must not be accessed by anyone else while it is
    /// reserved through [`BootAllocator::alloc`].
    pub unsafe fn set_direct_map(&mut self, phys_offset: usize) {
        self.phys_offset = Some(phys_offset);
    }

    /// Déclare une plage de RAM utilisable
    pub fn add(&mut self, base: u64, size: u64) -> MemoryResult<()> {
        let end = Self::checked_end(base, size)?;
        if self.memory.find_overlap(base, end).is_some() {
            return Err(MemoryError::Overlap);
        }
        self.memory.insert(MemblockRegion::new(base, size))
    }

    /// Réserve une plage (noyau, initrd, tables du bootloader...)
    pub fn reserve(&mut self, base: u64, size: u64) -> MemoryResult<()> {
        let end = Self::checked_end(base, size)?;
        if self.reserved.find_overlap(base, end).is_some() {
            return Err(MemoryError::Overlap);
        }
        self.reserved.insert(MemblockRegion::new(base, size))
    }

    pub fn memory_regions(&self) -> &[MemblockRegion] {
        self.memory.as_slice()
    }

    pub fn reserved_regions(&self) -> &[MemblockRegion] {
        self.reserved.as_slice()
    }

    pub fn reserved_size(&self) -> u64 {
        self.reserved.total_size()
    }

    /// Highest page frame backed by declared RAM (max_pfn)
    pub fn end_pfn(&self) -> u64 {
        self.memory
            .as_slice()
            .iter()
            .map(MemblockRegion::end)
            .max()
            .unwrap_or(0)
            >> PAGE_SHIFT
    }

    fn checked_end(base: u64, size: u64) -> MemoryResult<u64> {
        if size == 0 {
            return Err(MemoryError::InvalidSize);
        }
        base.checked_add(size).ok_or(MemoryError::InvalidAddress)
    }

    /// Top-down first fit inside one RAM region
    fn find_in_region(&self, region: MemblockRegion, size: u64, align: u64) -> Option<u64> {
        let mut limit = region.end();
        loop {
            let candidate = limit.checked_sub(size)? & !(align - 1);
            if candidate < region.base {
                return None;
            }
            match self.reserved.find_overlap(candidate, candidate + size) {
                // Redescendre sous la réservation gênante
                Some(idx) => limit = self.reserved.as_slice()[idx].base,
                None => return Some(candidate),
            }
        }
    }
}

impl Default for Memblock {
    fn default() -> Self {
        Self::new()
    }
}

impl BootAllocator for Memblock {
    fn alloc(&mut self, size: usize, align: usize) -> Option<PhysicalAddress> {
        if size == 0 || !align.is_power_of_two() {
            return None;
        }
        let size = size as u64;
        let align = align as u64;

        let found = self
            .memory
            .as_slice()
            .iter()
            .rev()
            .find_map(|&region| self.find_in_region(region, size, align))?;

        self.reserved.insert(MemblockRegion::new(found, size)).ok()?;
        log::trace!("memblock: alloc {:#x} bytes @ {:#x}", size, found);
        Some(PhysicalAddress::new(found))
    }

    fn free(&mut self, base: PhysicalAddress, size: usize) -> MemoryResult<()> {
        let base = base.value();
        let end = Self::checked_end(base, size as u64)?;
        let mut freed = false;

        while let Some(idx) = self.reserved.find_overlap(base, end) {
            let region = self.reserved.as_slice()[idx];
            // Découpe en deux : une entrée de plus. Une telle région est la
            // seule à chevaucher la plage, rien n'a encore été modifié.
            if region.base < base && region.end() > end && self.reserved.is_full() {
                return Err(MemoryError::TooManyRegions);
            }
            self.reserved.remove(idx);
            if region.base < base {
                self.reserved
                    .insert(MemblockRegion::new(region.base, base - region.base))?;
            }
            if region.end() > end {
                self.reserved
                    .insert(MemblockRegion::new(end, region.end() - end))?;
            }
            freed = true;
        }

        if freed {
            Ok(())
        } else {
            Err(MemoryError::InvalidAddress)
        }
    }

    fn direct_map(&self, base: PhysicalAddress, size: usize) -> Option<NonNull<u8>> {
        let offset = self.phys_offset?;
        let start = base.value();
        let end = start.checked_add(size as u64)?;
        // Uniquement des plages réservées, donc de la RAM déclarée
        self.reserved
            .as_slice()
            .iter()
            .find(|r| r.base <= start && end <= r.end())?;
        let virt = usize::try_from(start).ok()?.checked_add(offset)?;
        NonNull::new(virt as *mut u8)
    }

    fn end_pfn(&self) -> u64 {
        Memblock::end_pfn(self)
    }
}
