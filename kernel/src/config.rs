//! Boot configuration: `numa=` command-line options
//!
//! Format: `numa=<opt>[,<opt>...]`, the token may appear several times and
//! the options accumulate. Unknown options are reported and ignored.

use bitflags::bitflags;

bitflags! {
    /// NUMA boot options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NumaOptions: u32 {
        /// `numa=off`: single dummy node, no topology discovery
        const OFF     = 1 << 0;
        /// `numa=novnuma`: do not query the hypervisor topology
        const NOVNUMA = 1 << 1;
        /// `numa=debug`: dump the final topology
        const DEBUG   = 1 << 2;
    }
}

impl NumaOptions {
    /// Parses every `numa=` token of a kernel command line
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut options = Self::empty();
        for value in cmdline
            .split_ascii_whitespace()
            .filter_map(|token| token.strip_prefix("numa="))
        {
            for opt in value.split(',').filter(|o| !o.is_empty()) {
                match Self::from_option(opt) {
                    Some(flag) => options |= flag,
                    None => log::warn!("NUMA: unknown option numa={} ignored", opt),
                }
            }
        }
        options
    }

    fn from_option(opt: &str) -> Option<Self> {
        match opt {
            "off" => Some(Self::OFF),
            "novnuma" => Some(Self::NOVNUMA),
            "debug" => Some(Self::DEBUG),
            _ => None,
        }
    }

    pub fn numa_off(&self) -> bool {
        self.contains(Self::OFF)
    }
}
