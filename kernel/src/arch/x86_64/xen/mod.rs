//! Xen guest support
//!
//! Only what early NUMA bring-up needs: the guest type as detected by the
//! platform code, the XENMEM_get_vnuma_info interface and the vNUMA
//! topology import.

pub mod hypercall;
pub mod vnuma;

/// Xen domain identifier
pub type DomId = u16;

/// Domain selector meaning "the calling domain"
pub const DOMID_SELF: DomId = 0x7FF0;

/// Type of Xen guest we are running as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XenDomainType {
    /// Not running on Xen
    None,
    /// Paravirtualized guest
    Pv,
    /// Hardware virtualized guest (HVM/PVH)
    Hvm,
}

impl XenDomainType {
    pub const fn is_pv(self) -> bool {
        matches!(self, XenDomainType::Pv)
    }
}
