//! XENMEM_get_vnuma_info interface
//!
//! The transport (hypercall page, register ABI) belongs to the platform; this
//! module only defines the request layout and the [`XenMemoryOp`] seam the
//! topology import is written against.

use zerocopy::{AsBytes, FromBytes, FromZeroes};

use super::{DomId, DOMID_SELF};

/// memory_op sub-command
pub const XENMEM_GET_VNUMA_INFO: u32 = 26;

// Codes errno renvoyés (négatifs) par l'hyperviseur
pub const EFAULT: i32 = 14;
pub const EINVAL: i32 = 22;
pub const ENOSYS: i32 = 38;
pub const ENOBUFS: i32 = 105;

/// Memory range of one virtual node, physical addresses [start, end)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromZeroes, FromBytes, AsBytes)]
pub struct VmemRange {
    pub start: u64,
    pub end: u64,
}

impl VmemRange {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }
}

/// Arguments of XENMEM_get_vnuma_info.
///
/// Every output handle is a caller-owned buffer; the hypervisor fills at
/// most `len()` entries of each.
///
/// - `memrange`: one entry per node, indexed by node ID
/// - `distance`: `nr_nodes * nr_nodes` entries, stride `nr_nodes`,
///   entry `j * nr_nodes + i` is the distance from node `i` to node `j`
/// - `cpu_to_node`: one node ID per vCPU
#[derive(Debug)]
pub struct VnumaTopologyRequest<'a> {
    pub domid: DomId,
    pub nr_nodes: &'a mut u32,
    pub memrange: &'a mut [VmemRange],
    pub distance: &'a mut [u32],
    pub cpu_to_node: &'a mut [u32],
}

impl<'a> VnumaTopologyRequest<'a> {
    /// Request for the calling domain
    pub fn for_self(
        nr_nodes: &'a mut u32,
        memrange: &'a mut [VmemRange],
        distance: &'a mut [u32],
        cpu_to_node: &'a mut [u32],
    ) -> Self {
        Self {
            domid: DOMID_SELF,
            nr_nodes,
            memrange,
            distance,
            cpu_to_node,
        }
    }
}

/// Hypervisor memory_op calls used during boot.
///
/// Synchronous: blocks until the hypervisor answers, never retried.
pub trait XenMemoryOp {
    /// XENMEM_get_vnuma_info; `None` issues the call with a null argument.
    ///
    /// Returns a status, `>= 0` on success, `-errno` otherwise.
    fn get_vnuma_info(&mut self, request: Option<&mut VnumaTopologyRequest<'_>>) -> i32;
}

/// Checks if hypercall is supported
///
/// A null request is rejected by any hypervisor that knows the sub-command;
/// only an unknown sub-command answers `-ENOSYS`.
pub fn vnuma_supported<H: XenMemoryOp + ?Sized>(hypervisor: &mut H) -> bool {
    hypervisor.get_vnuma_info(None) != -ENOSYS
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_eq_size!(VmemRange, [u64; 2]);
    static_assertions::const_assert_eq!(core::mem::align_of::<VmemRange>(), 8);

    struct Status(i32);

    impl XenMemoryOp for Status {
        fn get_vnuma_info(&mut self, request: Option<&mut VnumaTopologyRequest<'_>>) -> i32 {
            assert!(request.is_none());
            self.0
        }
    }

    #[test]
    fn test_probe_only_enosys_means_unsupported() {
        assert!(!vnuma_supported(&mut Status(-ENOSYS)));
        assert!(vnuma_supported(&mut Status(-EFAULT)));
        assert!(vnuma_supported(&mut Status(-EINVAL)));
        assert!(vnuma_supported(&mut Status(0)));
    }

    #[test]
    fn test_vmemrange_wire_layout() {
        let range = VmemRange::new(0x1000, 0x2000);
        let bytes = range.as_bytes();
        assert_eq!(&bytes[..8], &0x1000u64.to_ne_bytes());
        assert_eq!(&bytes[8..], &0x2000u64.to_ne_bytes());
        assert_eq!(VmemRange::new_zeroed(), VmemRange::default());
    }

    #[test]
    fn test_request_targets_self() {
        let mut nr = 0;
        let mut mem = [VmemRange::default(); 1];
        let mut dist = [0u32; 1];
        let mut cpus = [0u32; 1];
        let req = VnumaTopologyRequest::for_self(&mut nr, &mut mem, &mut dist, &mut cpus);
        assert_eq!(req.domid, DOMID_SELF);
        assert_eq!(req.memrange.len(), 1);
    }
}
