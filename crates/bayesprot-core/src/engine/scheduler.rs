//! Message scheduling policies for loopy belief propagation.
//!
//! Schedulers only decide *which* edge is recomputed next; they know nothing
//! about factors or messages. An edge is queued at most once; re-queueing an
//! already pending edge keeps the higher priority.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::str::FromStr;

use crate::engine::errors::InferenceError;
use crate::engine::factor_graph::EdgeIdx;

/// A work queue of directed edges whose messages are due for recomputation.
pub trait MessageScheduler {
    /// Queues `edge`; `priority` is the change that made it due.
    fn push(&mut self, edge: EdgeIdx, priority: f64);
    /// Next edge to recompute, or `None` when every edge has converged.
    fn pop(&mut self) -> Option<EdgeIdx>;
    fn is_empty(&self) -> bool;
    fn len(&self) -> usize;
}

/// Available scheduling policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SchedulingType {
    /// Largest pending change first.
    #[default]
    Priority,
    /// First queued, first recomputed.
    Fifo,
}

impl SchedulingType {
    /// Fresh scheduler for a graph with `edge_count` directed edges.
    pub fn scheduler(self, edge_count: usize) -> Box<dyn MessageScheduler> {
        match self {
            SchedulingType::Priority => Box::new(PriorityScheduler::new(edge_count)),
            SchedulingType::Fifo => Box::new(FifoScheduler::new(edge_count)),
        }
    }
}

impl FromStr for SchedulingType {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "priority" => Ok(SchedulingType::Priority),
            "fifo" => Ok(SchedulingType::Fifo),
            "random_spanning_tree" => Err(InferenceError::Configuration(
                "scheduling_type 'random_spanning_tree' is not supported; use 'priority' or 'fifo'"
                    .into(),
            )),
            other => Err(InferenceError::Configuration(format!(
                "unknown scheduling_type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    priority: f64,
    edge: EdgeIdx,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Max-heap on priority; among equal priorities the lowest edge index wins.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.edge.cmp(&self.edge))
    }
}

/// Recomputes the edge with the largest pending change first.
///
/// Superseded heap entries are skipped lazily on pop.
#[derive(Debug)]
pub struct PriorityScheduler {
    heap: BinaryHeap<Entry>,
    pending: Vec<Option<f64>>,
    len: usize,
}

impl PriorityScheduler {
    pub fn new(edge_count: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(edge_count),
            pending: vec![None; edge_count],
            len: 0,
        }
    }
}

impl MessageScheduler for PriorityScheduler {
    fn push(&mut self, edge: EdgeIdx, priority: f64) {
        let slot = &mut self.pending[edge.0 as usize];
        match *slot {
            Some(current) if current >= priority => {}
            Some(_) => {
                *slot = Some(priority);
                self.heap.push(Entry { priority, edge });
            }
            None => {
                *slot = Some(priority);
                self.len += 1;
                self.heap.push(Entry { priority, edge });
            }
        }
    }

    fn pop(&mut self) -> Option<EdgeIdx> {
        while let Some(entry) = self.heap.pop() {
            let slot = &mut self.pending[entry.edge.0 as usize];
            if *slot == Some(entry.priority) {
                *slot = None;
                self.len -= 1;
                return Some(entry.edge);
            }
        }
        None
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Recomputes edges in the order they became due.
#[derive(Debug)]
pub struct FifoScheduler {
    queue: VecDeque<EdgeIdx>,
    queued: Vec<bool>,
}

impl FifoScheduler {
    pub fn new(edge_count: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(edge_count),
            queued: vec![false; edge_count],
        }
    }
}

impl MessageScheduler for FifoScheduler {
    fn push(&mut self, edge: EdgeIdx, _priority: f64) {
        let queued = &mut self.queued[edge.0 as usize];
        if !*queued {
            *queued = true;
            self.queue.push_back(edge);
        }
    }

    fn pop(&mut self) -> Option<EdgeIdx> {
        let edge = self.queue.pop_front()?;
        self.queued[edge.0 as usize] = false;
        Some(edge)
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_pops_largest_change_first() {
        let mut scheduler = PriorityScheduler::new(4);
        scheduler.push(EdgeIdx(0), 0.1);
        scheduler.push(EdgeIdx(1), 0.7);
        scheduler.push(EdgeIdx(2), 0.3);
        assert_eq!(scheduler.len(), 3);
        assert_eq!(scheduler.pop(), Some(EdgeIdx(1)));
        assert_eq!(scheduler.pop(), Some(EdgeIdx(2)));
        assert_eq!(scheduler.pop(), Some(EdgeIdx(0)));
        assert_eq!(scheduler.pop(), None);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn priority_ties_break_by_lowest_edge() {
        let mut scheduler = PriorityScheduler::new(4);
        for edge in [3, 1, 2] {
            scheduler.push(EdgeIdx(edge), f64::INFINITY);
        }
        assert_eq!(scheduler.pop(), Some(EdgeIdx(1)));
        assert_eq!(scheduler.pop(), Some(EdgeIdx(2)));
        assert_eq!(scheduler.pop(), Some(EdgeIdx(3)));
    }

    #[test]
    fn priority_requeue_keeps_maximum() {
        let mut scheduler = PriorityScheduler::new(3);
        scheduler.push(EdgeIdx(0), 0.5);
        scheduler.push(EdgeIdx(1), 0.4);
        scheduler.push(EdgeIdx(0), 0.1);
        scheduler.push(EdgeIdx(1), 0.9);
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.pop(), Some(EdgeIdx(1)));
        assert_eq!(scheduler.pop(), Some(EdgeIdx(0)));
        assert_eq!(scheduler.pop(), None);
    }

    #[test]
    fn fifo_preserves_insertion_order_without_duplicates() {
        let mut scheduler = FifoScheduler::new(4);
        scheduler.push(EdgeIdx(2), 0.1);
        scheduler.push(EdgeIdx(0), 0.9);
        scheduler.push(EdgeIdx(2), 0.5);
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.pop(), Some(EdgeIdx(2)));
        assert_eq!(scheduler.pop(), Some(EdgeIdx(0)));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn scheduling_type_parsing() {
        assert_eq!("priority".parse::<SchedulingType>().ok(), Some(SchedulingType::Priority));
        assert_eq!("fifo".parse::<SchedulingType>().ok(), Some(SchedulingType::Fifo));
        assert!(matches!(
            "random_spanning_tree".parse::<SchedulingType>(),
            Err(InferenceError::Configuration(_))
        ));
        assert!("lifo".parse::<SchedulingType>().is_err());
    }
}
