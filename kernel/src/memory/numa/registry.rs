//! Boot-time NUMA topology registry
//!
//! Explicit handle over everything the NUMA bring-up mutates: parsed /
//! possible / online node sets, per-node memory blocks, the node distance
//! table, CPU -> node and APIC ID -> node maps. Filled during early boot by a
//! single writer, then published read-only (see [`super::publish`]).

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use super::{
    CpuMask, NodeId, NodeMask, NumaError, LOCAL_DISTANCE, MAX_CPUS, MAX_LOCAL_APIC,
    MAX_NUMNODES, NR_NODE_MEMBLKS, REMOTE_DISTANCE,
};

/// Memory block [start, end) owned by node `nid`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumaMemblk {
    pub nid: NodeId,
    pub start: u64,
    pub end: u64,
}

impl NumaMemblk {
    pub const fn size(&self) -> u64 {
        self.end - self.start
    }

    const fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && start < self.end
    }
}

pub struct NumaRegistry {
    nodes_parsed: NodeMask,
    node_possible: NodeMask,
    node_online: NodeMask,
    memblks: Vec<NumaMemblk>,
    /// Row-major `distance_cnt * distance_cnt`, indexed `from * cnt + to`
    distance: Vec<u8>,
    distance_cnt: usize,
    cpu_to_node: Vec<Option<NodeId>>,
    node_to_cpumask: [CpuMask; MAX_NUMNODES],
    apicid_to_node: Vec<Option<u16>>,
    nr_node_ids: usize,
}

impl NumaRegistry {
    pub fn new() -> Self {
        Self {
            nodes_parsed: NodeMask::new(),
            node_possible: NodeMask::new(),
            node_online: NodeMask::new(),
            memblks: Vec::with_capacity(NR_NODE_MEMBLKS),
            distance: Vec::new(),
            distance_cnt: 0,
            cpu_to_node: vec![None; MAX_CPUS],
            node_to_cpumask: [CpuMask::new(); MAX_NUMNODES],
            apicid_to_node: vec![None; MAX_LOCAL_APIC],
            nr_node_ids: MAX_NUMNODES,
        }
    }

    /// Wipes every piece of topology state.
    ///
    /// Run before each init attempt so that a failed attempt never leaks
    /// nodes, blocks or CPU assignments into the next one.
    pub fn reset(&mut self) {
        self.reset_apicid_map();
        self.clear_node_sets();
        self.memblks.clear();
        self.reset_distance();
        self.cpu_to_node.fill(None);
        for mask in self.node_to_cpumask.iter_mut() {
            mask.clear_all();
        }
        self.nr_node_ids = MAX_NUMNODES;
    }

    // ── Node sets ───────────────────────────────────────────────────────────

    pub fn mark_node_parsed(&mut self, node: NodeId) -> Result<(), NumaError> {
        Self::check_node(node)?;
        self.nodes_parsed.set(node);
        Ok(())
    }

    /// Clears the parsed, possible and online node sets
    pub fn clear_node_sets(&mut self) {
        self.nodes_parsed.clear_all();
        self.node_possible.clear_all();
        self.node_online.clear_all();
    }

    /// nr_node_ids = highest parsed node + 1
    pub fn setup_nr_node_ids(&mut self) {
        self.nr_node_ids = self.nodes_parsed.last().map_or(0, |n| n + 1);
    }

    /// Finalizes the node sets: every parsed node becomes possible, parsed
    /// nodes owning memory go online.
    pub fn register_nodes(&mut self) {
        self.node_possible = self.nodes_parsed;
        self.node_online.clear_all();
        for blk in self.memblks.iter().filter(|b| b.size() > 0) {
            if self.nodes_parsed.test(blk.nid) {
                self.node_online.set(blk.nid);
            }
        }
        self.setup_nr_node_ids();
    }

    // ── Memory blocks ───────────────────────────────────────────────────────

    /// Registers [start, end) as memory of `nid`.
    ///
    /// Empty ranges are accepted and dropped. Overlap with a block of the
    /// same node is allowed; overlap with another node is not.
    pub fn add_memblk(&mut self, nid: NodeId, start: u64, end: u64) -> Result<(), NumaError> {
        Self::check_node(nid)?;
        if start > end {
            return Err(NumaError::InvertedRange { node: nid, start, end });
        }
        if start == end {
            log::debug!("NUMA: empty memblk node {} [mem {:#010x}] ignored", nid, start);
            return Ok(());
        }
        if let Some(other) = self
            .memblks
            .iter()
            .find(|b| b.nid != nid && b.overlaps(start, end))
        {
            return Err(NumaError::Overlap { node: nid, start, end, other: other.nid });
        }
        if self.memblks.len() >= NR_NODE_MEMBLKS {
            return Err(NumaError::TooManyMemblks);
        }
        self.memblks.push(NumaMemblk { nid, start, end });
        Ok(())
    }

    // ── Distances ───────────────────────────────────────────────────────────

    /// Clears the distance table; it is lazily rebuilt on the next set
    pub fn reset_distance(&mut self) {
        self.distance.clear();
        self.distance_cnt = 0;
    }

    fn alloc_distance(&mut self) {
        let highest = self
            .memblks
            .iter()
            .map(|b| b.nid)
            .chain(self.nodes_parsed.last())
            .max();
        let cnt = highest.map_or(0, |n| n + 1);

        self.distance = vec![REMOTE_DISTANCE; cnt * cnt];
        for i in 0..cnt {
            self.distance[i * cnt + i] = LOCAL_DISTANCE;
        }
        self.distance_cnt = cnt;
        log::debug!("NUMA: distance table allocated for {} node(s)", cnt);
    }

    /// Records the distance from `from` to `to`.
    ///
    /// The table spans the parsed nodes as of the first call. Out-of-span
    /// nodes, values above `u8::MAX` and non-local self distances are
    /// rejected and leave the table untouched.
    pub fn set_distance(&mut self, from: NodeId, to: NodeId, distance: u32) -> Result<(), NumaError> {
        if self.distance_cnt == 0 {
            self.alloc_distance();
        }
        let cnt = self.distance_cnt;
        let invalid = NumaError::InvalidDistance { from, to, distance };
        if from >= cnt || to >= cnt {
            return Err(invalid);
        }
        let value = u8::try_from(distance).map_err(|_| invalid)?;
        if from == to && value != LOCAL_DISTANCE {
            return Err(invalid);
        }
        self.distance[from * cnt + to] = value;
        Ok(())
    }

    /// Distance from `from` to `to`; LOCAL/REMOTE defaults outside the table
    pub fn node_distance(&self, from: NodeId, to: NodeId) -> u8 {
        let cnt = self.distance_cnt;
        if from >= cnt || to >= cnt {
            return if from == to { LOCAL_DISTANCE } else { REMOTE_DISTANCE };
        }
        self.distance[from * cnt + to]
    }

    pub fn distance_cnt(&self) -> usize {
        self.distance_cnt
    }

    // ── CPUs ────────────────────────────────────────────────────────────────

    /// Assigns `cpu` to `node` and moves it into that node's CPU mask
    pub fn set_cpu_node(&mut self, cpu: usize, node: NodeId) -> Result<(), NumaError> {
        Self::check_node(node)?;
        if cpu >= MAX_CPUS {
            return Err(NumaError::InvalidCpu { cpu });
        }
        if let Some(previous) = self.cpu_to_node[cpu] {
            self.node_to_cpumask[previous].clear(cpu);
        }
        self.cpu_to_node[cpu] = Some(node);
        self.node_to_cpumask[node].set(cpu);
        Ok(())
    }

    pub fn set_apicid_to_node(&mut self, apicid: usize, node: Option<NodeId>) -> Result<(), NumaError> {
        if apicid >= MAX_LOCAL_APIC {
            return Err(NumaError::InvalidApicId { apicid });
        }
        let node = match node {
            Some(node) => {
                Self::check_node(node)?;
                Some(node as u16)
            }
            None => None,
        };
        self.apicid_to_node[apicid] = node;
        Ok(())
    }

    /// Every APIC slot back to "no node"
    pub fn reset_apicid_map(&mut self) {
        self.apicid_to_node.fill(None);
    }

    // ── Read-back ───────────────────────────────────────────────────────────

    pub fn parsed_nodes(&self) -> &NodeMask {
        &self.nodes_parsed
    }

    pub fn possible_nodes(&self) -> &NodeMask {
        &self.node_possible
    }

    pub fn online_nodes(&self) -> &NodeMask {
        &self.node_online
    }

    pub fn nr_node_ids(&self) -> usize {
        self.nr_node_ids
    }

    pub fn memblks(&self) -> &[NumaMemblk] {
        &self.memblks
    }

    /// Lowest start / highest end over the blocks of `node`
    pub fn node_memory_range(&self, node: NodeId) -> Option<(u64, u64)> {
        self.memblks
            .iter()
            .filter(|b| b.nid == node)
            .fold(None, |acc, b| match acc {
                None => Some((b.start, b.end)),
                Some((s, e)) => Some((s.min(b.start), e.max(b.end))),
            })
    }

    pub fn cpu_to_node(&self, cpu: usize) -> Option<NodeId> {
        self.cpu_to_node.get(cpu).copied().flatten()
    }

    pub fn node_cpumask(&self, node: NodeId) -> Option<&CpuMask> {
        self.node_to_cpumask.get(node)
    }

    pub fn apicid_to_node(&self, apicid: usize) -> Option<NodeId> {
        self.apicid_to_node.get(apicid).copied().flatten().map(NodeId::from)
    }

    /// Logs the whole topology at info level
    pub fn dump(&self) {
        for node in self.nodes_parsed.iter() {
            let (start, end) = self.node_memory_range(node).unwrap_or((0, 0));
            log::info!(
                "NUMA: node {} [mem {:#010x}-{:#010x}] cpus {:?}",
                node,
                start,
                end.saturating_sub(1),
                self.node_to_cpumask[node]
            );
        }
        for from in 0..self.distance_cnt {
            let row = &self.distance[from * self.distance_cnt..(from + 1) * self.distance_cnt];
            log::info!("NUMA: distance[{}] = {:?}", from, row);
        }
    }

    fn check_node(node: NodeId) -> Result<(), NumaError> {
        if node >= MAX_NUMNODES {
            return Err(NumaError::InvalidNode { node });
        }
        Ok(())
    }
}

impl Default for NumaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NumaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumaRegistry")
            .field("nodes_parsed", &self.nodes_parsed)
            .field("node_possible", &self.node_possible)
            .field("node_online", &self.node_online)
            .field("memblks", &self.memblks)
            .field("distance_cnt", &self.distance_cnt)
            .field("nr_node_ids", &self.nr_node_ids)
            .finish_non_exhaustive()
    }
}
