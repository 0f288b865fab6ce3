mod building;
mod printing;
mod ray_bvh_intersection;

pub use printing::BvhStatistics;

use std::{fmt, str::FromStr};

use bon::bon;
use index_vec::{IndexSlice, IndexVec};
use thiserror::Error;

use crate::geometry::WorldBox;

use super::Primitive;

/// Leaf primitive counts are stored in a byte.
pub const MAX_PRIMS_IN_NODE_LIMIT: usize = u8::MAX as usize;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SplitMethod {
    /// Surface area heuristic
    #[default]
    Sah,
    /// Linear BVH treelets over a Morton curve, combined using SAH
    Hlbvh,
    /// Split at the middle of the centroid bounds
    Middle,
    /// Split into two halves with equal primitive counts
    EqualCounts,
}

impl SplitMethod {
    pub const ALL: [SplitMethod; 4] = [
        SplitMethod::Sah,
        SplitMethod::Hlbvh,
        SplitMethod::Middle,
        SplitMethod::EqualCounts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SplitMethod::Sah => "sah",
            SplitMethod::Hlbvh => "hlbvh",
            SplitMethod::Middle => "middle",
            SplitMethod::EqualCounts => "equal",
        }
    }
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("Unknown split method {0:?}, expected one of sah, hlbvh, middle, equal")]
pub struct ParseSplitMethodError(String);

impl FromStr for SplitMethod {
    type Err = ParseSplitMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SplitMethod::ALL
            .into_iter()
            .find(|method| method.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseSplitMethodError(s.to_owned()))
    }
}

index_vec::define_index_type! {
    pub struct NodeIdx = u32;
}

/// Node of the flattened tree.
/// Interior node's first child immediately follows it in the node array.
#[derive(Clone, Debug)]
pub struct LinearNode {
    pub bounds: WorldBox,
    pub kind: NodeKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Leaf {
        primitives_offset: u32,
        n_primitives: u8,
    },
    Interior {
        second_child_offset: NodeIdx,
        split_axis: u8,
    },
}

/// Bounding volume hierarchy over a set of primitives.
///
/// Immutable after construction, safe to query from many threads at once.
/// The primitives are reordered during the build so that each leaf refers to a
/// contiguous range of them.
pub struct Bvh<P> {
    primitives: Vec<P>,
    nodes: IndexVec<NodeIdx, LinearNode>,
    max_prims_in_node: usize,
    split_method: SplitMethod,
}

#[bon]
impl<P: Primitive> Bvh<P> {
    #[builder]
    pub fn new(
        primitives: Vec<P>,
        #[builder(default = 4)] max_prims_in_node: usize,
        #[builder(default)] split_method: SplitMethod,
    ) -> Self {
        Self::build(primitives, max_prims_in_node, split_method)
    }
}

impl<P> Bvh<P> {
    /// Primitives in the order used by the leaves.
    pub fn primitives(&self) -> &[P] {
        &self.primitives
    }

    pub fn nodes(&self) -> &IndexSlice<NodeIdx, [LinearNode]> {
        &self.nodes
    }

    pub fn max_prims_in_node(&self) -> usize {
        self.max_prims_in_node
    }

    pub fn split_method(&self) -> SplitMethod {
        self.split_method
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
