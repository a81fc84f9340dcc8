//! The protein–peptide evidence graph.
//!
//! Nodes are proteins, protein groups, peptide groups and peptide-spectrum
//! matches; edges mean "is evidence of" and only join nodes of different
//! kinds. The graph is decomposed into connected components, which are the
//! independent units of inference.
//!
//! ## Construction
//!
//! [`EvidenceGraph::build`] adds a protein node per protein hit and a PSM node
//! per retained peptide hit, linked to every protein the peptide maps to.
//! [`EvidenceGraph::cluster_indistinguishable_nodes`] then inserts
//! - a protein-group node per set of proteins sharing exactly the same PSMs,
//! - a peptide-group node per set of PSMs sharing exactly the same parents,
//!
//! which yields the layered structure protein → protein group → peptide group
//! → PSM used by the factor graph compiler.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::collections::{BTreeMap, VecDeque};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::InferenceError;
use crate::evidence::ident::{PeptideIdentification, ProteinIdentification};

/// Index of a node in the evidence graph.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeIdx(pub u32);

/// Kind of an evidence node, ordered from generating cause to observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum NodeKind {
    Protein,
    ProteinGroup,
    PeptideGroup,
    PeptideSpectrumMatch,
}

impl NodeKind {
    /// Generative rank; neighbours of lower rank are a node's upstream inputs.
    pub fn rank(self) -> u8 {
        match self {
            NodeKind::Protein => 0,
            NodeKind::ProteinGroup => 1,
            NodeKind::PeptideGroup => 2,
            NodeKind::PeptideSpectrumMatch => 3,
        }
    }
}

/// A node of the evidence graph with its back-reference into the identifications.
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceNode {
    /// Index into [`ProteinIdentification::hits`].
    Protein { hit: usize },
    /// Group posterior, written when group probabilities are annotated.
    ProteinGroup { probability: f64 },
    PeptideGroup,
    /// Index of the peptide identification and of the hit inside it.
    PeptideSpectrumMatch { identification: usize, hit: usize },
}

impl EvidenceNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            EvidenceNode::Protein { .. } => NodeKind::Protein,
            EvidenceNode::ProteinGroup { .. } => NodeKind::ProteinGroup,
            EvidenceNode::PeptideGroup => NodeKind::PeptideGroup,
            EvidenceNode::PeptideSpectrumMatch { .. } => NodeKind::PeptideSpectrumMatch,
        }
    }
}

/// A connected component: its node indices in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub index: usize,
    nodes: Vec<NodeIdx>,
}

impl Component {
    pub fn nodes(&self) -> &[NodeIdx] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Bipartite multi-type evidence graph.
#[derive(Debug, Clone, Default)]
pub struct EvidenceGraph {
    nodes: Vec<EvidenceNode>,
    adjacency: Vec<SmallVec<[NodeIdx; 4]>>,
    components: Vec<Component>,
    components_computed: bool,
}

impl EvidenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds protein and PSM nodes from identifications.
    ///
    /// Only the `top_psms` best hits of each spectrum are kept (`0` keeps all),
    /// and only hits mapping to at least one known protein accession.
    pub fn build(
        proteins: &ProteinIdentification,
        peptides: &[PeptideIdentification],
        top_psms: usize,
    ) -> Self {
        let mut graph = Self::new();
        let mut by_accession: FxHashMap<&str, NodeIdx> = FxHashMap::default();
        for (hit, protein) in proteins.hits.iter().enumerate() {
            let node = graph.add_node(EvidenceNode::Protein { hit });
            by_accession.entry(protein.accession.as_str()).or_insert(node);
        }

        for (identification, peptide_id) in peptides.iter().enumerate() {
            for hit in peptide_id.top_hits(top_psms) {
                let mut parents: SmallVec<[NodeIdx; 4]> = peptide_id.hits[hit]
                    .protein_accessions
                    .iter()
                    .filter_map(|acc| by_accession.get(acc.as_str()).copied())
                    .collect();
                parents.sort_unstable();
                parents.dedup();
                if parents.is_empty() {
                    continue;
                }
                let psm = graph.add_node(EvidenceNode::PeptideSpectrumMatch { identification, hit });
                for parent in parents {
                    graph.connect(parent, psm);
                }
            }
        }
        graph
    }

    pub fn add_node(&mut self, node: EvidenceNode) -> NodeIdx {
        let idx = NodeIdx(self.nodes.len() as u32);
        self.nodes.push(node);
        self.adjacency.push(SmallVec::new());
        self.components_computed = false;
        idx
    }

    /// Adds an undirected edge; both endpoints must exist and differ in kind.
    pub fn add_edge(&mut self, a: NodeIdx, b: NodeIdx) -> Result<(), InferenceError> {
        let (Some(na), Some(nb)) = (self.nodes.get(a.0 as usize), self.nodes.get(b.0 as usize))
        else {
            return Err(InferenceError::Structural(format!(
                "edge {:?} - {:?} refers to a missing node",
                a, b
            )));
        };
        if na.kind() == nb.kind() {
            return Err(InferenceError::Structural(format!(
                "edge {:?} - {:?} joins two {:?} nodes",
                a,
                b,
                na.kind()
            )));
        }
        self.connect(a, b);
        Ok(())
    }

    fn connect(&mut self, a: NodeIdx, b: NodeIdx) {
        if !self.adjacency[a.0 as usize].contains(&b) {
            self.adjacency[a.0 as usize].push(b);
            self.adjacency[b.0 as usize].push(a);
            self.components_computed = false;
        }
    }

    fn disconnect(&mut self, a: NodeIdx, b: NodeIdx) {
        self.adjacency[a.0 as usize].retain(|n| *n != b);
        self.adjacency[b.0 as usize].retain(|n| *n != a);
        self.components_computed = false;
    }

    pub fn node(&self, idx: NodeIdx) -> &EvidenceNode {
        &self.nodes[idx.0 as usize]
    }

    pub fn kind(&self, idx: NodeIdx) -> NodeKind {
        self.node(idx).kind()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|a| a.len()).sum::<usize>() / 2
    }

    pub fn neighbors(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.adjacency[idx.0 as usize]
    }

    /// Neighbours of strictly lower rank, in ascending index order.
    pub fn upstream(&self, idx: NodeIdx) -> SmallVec<[NodeIdx; 4]> {
        let rank = self.kind(idx).rank();
        let mut upstream: SmallVec<[NodeIdx; 4]> = self
            .neighbors(idx)
            .iter()
            .copied()
            .filter(|&n| self.kind(n).rank() < rank)
            .collect();
        upstream.sort_unstable();
        upstream
    }

    fn neighbors_of_kind(&self, idx: NodeIdx, pred: impl Fn(NodeKind) -> bool) -> Vec<NodeIdx> {
        let mut out: Vec<NodeIdx> = self
            .neighbors(idx)
            .iter()
            .copied()
            .filter(|&n| pred(self.kind(n)))
            .collect();
        out.sort_unstable();
        out
    }

    /// Decomposes the graph into connected components (breadth-first, by lowest node index).
    pub fn compute_connected_components(&mut self) {
        let mut component_of = vec![usize::MAX; self.nodes.len()];
        let mut components = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..self.nodes.len() {
            if component_of[start] != usize::MAX {
                continue;
            }
            let index = components.len();
            let mut nodes = Vec::new();
            component_of[start] = index;
            queue.push_back(NodeIdx(start as u32));
            while let Some(node) = queue.pop_front() {
                nodes.push(node);
                for &next in &self.adjacency[node.0 as usize] {
                    if component_of[next.0 as usize] == usize::MAX {
                        component_of[next.0 as usize] = index;
                        queue.push_back(next);
                    }
                }
            }
            nodes.sort_unstable();
            components.push(Component { index, nodes });
        }

        self.components = components;
        self.components_computed = true;
    }

    /// Connected components; empty until [`Self::compute_connected_components`] ran.
    pub fn components(&self) -> &[Component] {
        if self.components_computed {
            &self.components
        } else {
            &[]
        }
    }

    pub fn has_components(&self) -> bool {
        self.components_computed
    }

    /// Whether every node of `component` has the same kind.
    pub fn is_single_kind(&self, component: &Component) -> bool {
        match component.nodes.first() {
            Some(&first) => {
                let kind = self.kind(first);
                component.nodes.iter().all(|&n| self.kind(n) == kind)
            }
            None => true,
        }
    }

    /// Inserts protein-group and peptide-group nodes for indistinguishable evidence.
    ///
    /// Connected components are recomputed if they had been computed before.
    pub fn cluster_indistinguishable_nodes(&mut self) {
        let had_components = self.components_computed;

        let mut proteins_by_psms: BTreeMap<Vec<NodeIdx>, Vec<NodeIdx>> = BTreeMap::new();
        for idx in 0..self.nodes.len() as u32 {
            let node = NodeIdx(idx);
            if self.kind(node) != NodeKind::Protein {
                continue;
            }
            let psms = self.neighbors_of_kind(node, |k| k == NodeKind::PeptideSpectrumMatch);
            if !psms.is_empty() {
                proteins_by_psms.entry(psms).or_default().push(node);
            }
        }
        for (psms, proteins) in proteins_by_psms {
            let group = self.add_node(EvidenceNode::ProteinGroup { probability: 0.0 });
            for &protein in &proteins {
                for &psm in &psms {
                    self.disconnect(protein, psm);
                }
                self.connect(protein, group);
            }
            for psm in psms {
                self.connect(group, psm);
            }
        }

        let mut psms_by_parents: BTreeMap<Vec<NodeIdx>, Vec<NodeIdx>> = BTreeMap::new();
        for idx in 0..self.nodes.len() as u32 {
            let node = NodeIdx(idx);
            if self.kind(node) != NodeKind::PeptideSpectrumMatch {
                continue;
            }
            let parents = self.neighbors_of_kind(node, |k| {
                matches!(k, NodeKind::Protein | NodeKind::ProteinGroup)
            });
            if !parents.is_empty() {
                psms_by_parents.entry(parents).or_default().push(node);
            }
        }
        for (parents, psms) in psms_by_parents {
            let peptide_group = self.add_node(EvidenceNode::PeptideGroup);
            for &psm in &psms {
                for &parent in &parents {
                    self.disconnect(parent, psm);
                }
                self.connect(peptide_group, psm);
            }
            for parent in parents {
                self.connect(parent, peptide_group);
            }
        }

        if had_components {
            self.compute_connected_components();
        }
    }

    /// Applies `f` to every component, in parallel when the `parallel` feature is on.
    ///
    /// Results are returned in component order.
    pub fn apply_on_components<R, F>(&self, f: F) -> Vec<R>
    where
        F: Fn(&Component) -> R + Sync + Send,
        R: Send,
    {
        #[cfg(feature = "parallel")]
        {
            self.components().par_iter().map(f).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.components().iter().map(f).collect()
        }
    }

    /// Applies `f` to every component on the calling thread, in component order.
    pub fn apply_on_components_sequentially<F>(&self, mut f: F)
    where
        F: FnMut(&Component),
    {
        for component in self.components() {
            f(component);
        }
    }

    /// Records a protein group's posterior on its node.
    pub fn set_group_probability(&mut self, idx: NodeIdx, value: f64) -> Result<(), InferenceError> {
        match self.nodes.get_mut(idx.0 as usize) {
            Some(EvidenceNode::ProteinGroup { probability }) => {
                *probability = value;
                Ok(())
            }
            other => Err(InferenceError::Internal(format!(
                "node {:?} is not a protein group: {:?}",
                idx, other
            ))),
        }
    }
}
