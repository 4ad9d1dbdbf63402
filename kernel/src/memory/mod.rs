//! Memory management subsystem (early boot)
//!
//! Only what the NUMA bring-up needs before the frame allocator exists:
//! physical addresses, page-frame helpers, the memblock allocator and the
//! NUMA topology registry.

pub mod memblock;
pub mod numa;

use core::fmt;

pub use memblock::{BootAllocator, Memblock};

/// Taille d'une page (4KB)
pub const PAGE_SIZE: usize = 4096;

/// log2(PAGE_SIZE)
pub const PAGE_SHIFT: u32 = 12;

/// Physical address of page frame `pfn` (PFN_PHYS)
pub const fn pfn_phys(pfn: u64) -> u64 {
    pfn << PAGE_SHIFT
}

/// Page frame containing `addr` (PFN_DOWN)
pub const fn phys_pfn(addr: u64) -> u64 {
    addr >> PAGE_SHIFT
}

/// Adresse physique
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    /// Crée une nouvelle adresse physique
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Retourne la valeur brute de l'adresse
    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_aligned(self, align: u64) -> bool {
        align != 0 && self.0 % align == 0
    }

    pub const fn is_page_aligned(self) -> bool {
        self.is_aligned(PAGE_SIZE as u64)
    }

    /// Arrondit l'adresse au multiple inférieur de `align` (puissance de 2)
    pub const fn align_down(self, align: u64) -> Self {
        Self(self.0 & !(align - 1))
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

// Error type for memory operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    InvalidAddress,
    InvalidSize,
    /// Region registered twice or overlapping an existing one
    Overlap,
    /// Fixed-capacity region table is full
    TooManyRegions,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::InvalidAddress => write!(f, "Invalid address"),
            MemoryError::InvalidSize => write!(f, "Invalid size"),
            MemoryError::Overlap => write!(f, "Overlapping region"),
            MemoryError::TooManyRegions => write!(f, "Too many regions"),
        }
    }
}

pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pfn_conversions() {
        assert_eq!(pfn_phys(0), 0);
        assert_eq!(pfn_phys(1), 0x1000);
        assert_eq!(pfn_phys(0x40000), 0x4000_0000);
        assert_eq!(phys_pfn(0x1fff), 1);
        assert_eq!(phys_pfn(pfn_phys(1234)), 1234);
    }

    #[test]
    fn test_alignment() {
        let addr = PhysicalAddress::new(0x3456);
        assert!(!addr.is_page_aligned());
        assert_eq!(addr.align_down(0x1000), PhysicalAddress::new(0x3000));
        assert!(PhysicalAddress::new(0x3000).is_page_aligned());
        assert!(!addr.is_aligned(0));
    }
}
