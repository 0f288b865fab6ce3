use index_vec::IndexVec;
use itertools::Itertools as _;
use ordered_float::OrderedFloat;

use crate::{
    arena::MemoryArena,
    geometry::{FloatType, WorldBox, WorldPoint},
    scene::Primitive,
};

use super::{Bvh, LinearNode, MAX_PRIMS_IN_NODE_LIMIT, NodeIdx, NodeKind, SplitMethod};

const BUILD_ARENA_BLOCK_SIZE: usize = 1024 * 1024;

const SAH_BUCKET_COUNT: usize = 12;
/// Cost of traversing an interior node, relative to intersecting a primitive
const SAH_TRAVERSAL_COST: FloatType = 0.125;

/// Bits per axis of the Morton code grid
const MORTON_BITS: u32 = 10;
const MORTON_SCALE: FloatType = (1 << MORTON_BITS) as FloatType;
/// Primitives whose Morton codes share the bits above this one form one treelet
const TREELET_SHIFT: u32 = 3 * MORTON_BITS - 12;

impl<P: Primitive> Bvh<P> {
    /// Build the hierarchy, reordering the primitives so that each leaf refers
    /// to a contiguous range.
    /// `max_prims_in_node` is clamped to `1..=255`.
    pub fn build(primitives: Vec<P>, max_prims_in_node: usize, split_method: SplitMethod) -> Self {
        let max_prims_in_node = max_prims_in_node.clamp(1, MAX_PRIMS_IN_NODE_LIMIT);
        assert!(
            u32::try_from(primitives.len()).is_ok(),
            "Too many primitives for a single BVH"
        );

        if primitives.is_empty() {
            return Bvh {
                primitives,
                nodes: IndexVec::new(),
                max_prims_in_node,
                split_method,
            };
        }

        let mut infos: Vec<PrimitiveInfo> = primitives
            .iter()
            .enumerate()
            .map(|(index, primitive)| PrimitiveInfo::new(index, primitive.world_bound()))
            .collect();

        let arena = MemoryArena::new(BUILD_ARENA_BLOCK_SIZE);
        let mut builder = Builder {
            arena: &arena,
            max_prims_in_node,
            total_nodes: 0,
            ordered: Vec::with_capacity(infos.len()),
        };

        let root = match split_method {
            SplitMethod::Hlbvh => builder.hlbvh_build(&infos),
            _ => builder.recursive_build(&mut infos, split_method),
        };

        let mut nodes = IndexVec::with_capacity(builder.total_nodes);
        flatten(root, &mut nodes);
        debug_assert!(nodes.len() == builder.total_nodes);

        Bvh {
            primitives: reorder(primitives, &builder.ordered),
            nodes,
            max_prims_in_node,
            split_method,
        }
    }
}

/// Build time record of a single primitive.
#[derive(Copy, Clone, Debug)]
struct PrimitiveInfo {
    index: usize,
    bounds: WorldBox,
    centroid: WorldPoint,
}

impl PrimitiveInfo {
    fn new(index: usize, bounds: WorldBox) -> Self {
        debug_assert!(!bounds.is_empty(), "Primitive {index} has empty bounds");
        PrimitiveInfo {
            index,
            bounds,
            centroid: bounds.center(),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct MortonPrimitive {
    code: u32,
    info: PrimitiveInfo,
}

/// Node of the temporary tree, lives in the build arena.
enum BuildNode<'a> {
    Leaf {
        first_offset: usize,
        count: usize,
        bounds: WorldBox,
    },
    Interior {
        children: [&'a BuildNode<'a>; 2],
        split_axis: u8,
        bounds: WorldBox,
    },
}

impl BuildNode<'_> {
    fn bounds(&self) -> &WorldBox {
        match self {
            BuildNode::Leaf { bounds, .. } => bounds,
            BuildNode::Interior { bounds, .. } => bounds,
        }
    }
}

struct Builder<'a> {
    arena: &'a MemoryArena,
    max_prims_in_node: usize,
    total_nodes: usize,
    /// Primitive indices in the order of leaves
    ordered: Vec<usize>,
}

impl<'a> Builder<'a> {
    fn leaf(&mut self, infos: impl ExactSizeIterator<Item = PrimitiveInfo>) -> &'a BuildNode<'a> {
        let first_offset = self.ordered.len();
        let count = infos.len();
        debug_assert!(count > 0);
        debug_assert!(count <= MAX_PRIMS_IN_NODE_LIMIT);

        let mut bounds = WorldBox::empty();
        for info in infos {
            bounds = bounds.union(&info.bounds);
            self.ordered.push(info.index);
        }

        self.total_nodes += 1;
        self.arena.alloc(BuildNode::Leaf {
            first_offset,
            count,
            bounds,
        })
    }

    fn interior(&mut self, children: [&'a BuildNode<'a>; 2], split_axis: usize) -> &'a BuildNode<'a> {
        self.total_nodes += 1;
        self.arena.alloc(BuildNode::Interior {
            children,
            split_axis: split_axis as u8,
            bounds: children[0].bounds().union(children[1].bounds()),
        })
    }

    fn recursive_build(
        &mut self,
        infos: &mut [PrimitiveInfo],
        split_method: SplitMethod,
    ) -> &'a BuildNode<'a> {
        let count = infos.len();
        if count == 1 {
            return self.leaf(infos.iter().copied());
        }

        let centroid_bounds = centroid_bounds(infos.iter().map(|info| &info.centroid));
        let dim = centroid_bounds.maximum_extent();

        let mid = if centroid_bounds.max[dim] == centroid_bounds.min[dim] {
            // All centroids coincide, no split can separate them.
            (count > self.max_prims_in_node).then_some(count / 2)
        } else {
            match split_method {
                SplitMethod::Middle | SplitMethod::EqualCounts if count <= self.max_prims_in_node => {
                    None
                }
                SplitMethod::Middle => Some(
                    split_middle(infos, dim, &centroid_bounds)
                        .unwrap_or_else(|| split_equal_counts(infos, dim)),
                ),
                SplitMethod::EqualCounts => Some(split_equal_counts(infos, dim)),
                SplitMethod::Sah | SplitMethod::Hlbvh => {
                    split_sah(infos, dim, &centroid_bounds, self.max_prims_in_node)
                }
            }
        };

        let Some(mid) = mid else {
            return self.leaf(infos.iter().copied());
        };

        let (left, right) = infos.split_at_mut(mid);
        let children = [
            self.recursive_build(left, split_method),
            self.recursive_build(right, split_method),
        ];
        self.interior(children, dim)
    }

    /// Linear BVH treelets over the Morton curve, joined together by SAH.
    fn hlbvh_build(&mut self, infos: &[PrimitiveInfo]) -> &'a BuildNode<'a> {
        let centroid_bounds = centroid_bounds(infos.iter().map(|info| &info.centroid));

        let mut morton_primitives: Vec<MortonPrimitive> = infos
            .iter()
            .map(|info| MortonPrimitive {
                code: morton_code(&centroid_bounds, &info.centroid),
                info: *info,
            })
            .collect();
        morton_primitives.sort_by_key(|mp| mp.code);

        let mut treelets: Vec<&'a BuildNode<'a>> = morton_primitives
            .chunk_by(|a, b| a.code >> TREELET_SHIFT == b.code >> TREELET_SHIFT)
            .map(|treelet| self.emit_lbvh(treelet, TREELET_SHIFT as i32 - 1))
            .collect();

        self.build_upper_sah(&mut treelets)
    }

    /// Split a run of Morton-sorted primitives on successive code bits.
    /// All primitives of the run share the code bits above `bit`.
    fn emit_lbvh(&mut self, primitives: &[MortonPrimitive], bit: i32) -> &'a BuildNode<'a> {
        let count = primitives.len();
        if count <= self.max_prims_in_node {
            return self.leaf(primitives.iter().map(|mp| mp.info));
        }

        let mid = if bit < 0 {
            // Out of bits, the remaining primitives share a grid cell.
            count / 2
        } else {
            let mask = 1 << bit;
            if primitives[0].code & mask == primitives[count - 1].code & mask {
                return self.emit_lbvh(primitives, bit - 1);
            }
            primitives.partition_point(|mp| mp.code & mask == 0)
        };

        let (left, right) = primitives.split_at(mid);
        let children = [
            self.emit_lbvh(left, bit - 1),
            self.emit_lbvh(right, bit - 1),
        ];
        let split_axis = (children[1].bounds().center() - children[0].bounds().center())
            .abs()
            .imax();
        self.interior(children, split_axis)
    }

    /// Join subtrees using SAH, always splitting down to a single subtree.
    fn build_upper_sah(&mut self, nodes: &mut [&'a BuildNode<'a>]) -> &'a BuildNode<'a> {
        if let [node] = nodes {
            return *node;
        }

        let centers: Vec<WorldPoint> = nodes.iter().map(|node| node.bounds().center()).collect();
        let centroid_bounds = centroid_bounds(centers.iter());
        let dim = centroid_bounds.maximum_extent();

        let mid = if centroid_bounds.max[dim] == centroid_bounds.min[dim] {
            nodes.len() / 2
        } else {
            let bounds = nodes
                .iter()
                .fold(WorldBox::empty(), |acc, node| acc.union(node.bounds()));
            let (best_bucket, _cost) = best_bucket_split(
                nodes.iter().map(|node| (node.bounds().center(), *node.bounds())),
                dim,
                &centroid_bounds,
                &bounds,
            );
            itertools::partition(&mut *nodes, |node| {
                bucket_index(&centroid_bounds, dim, &node.bounds().center()) <= best_bucket
            })
        };

        let (left, right) = nodes.split_at_mut(mid);
        let children = [self.build_upper_sah(left), self.build_upper_sah(right)];
        self.interior(children, dim)
    }
}

fn centroid_bounds<'p>(centroids: impl IntoIterator<Item = &'p WorldPoint>) -> WorldBox {
    centroids
        .into_iter()
        .fold(WorldBox::empty(), |acc, centroid| acc.union_point(centroid))
}

/// Partition at the midpoint of the centroid bounds.
/// Returns None if all primitives end up on one side.
fn split_middle(infos: &mut [PrimitiveInfo], dim: usize, centroid_bounds: &WorldBox) -> Option<usize> {
    let pmid = (centroid_bounds.min[dim] + centroid_bounds.max[dim]) / 2.0;
    let mid = itertools::partition(&mut *infos, |info| info.centroid[dim] < pmid);
    (mid != 0 && mid != infos.len()).then_some(mid)
}

/// Partition into two halves around the median centroid.
fn split_equal_counts(infos: &mut [PrimitiveInfo], dim: usize) -> usize {
    let mid = infos.len() / 2;
    infos.select_nth_unstable_by_key(mid, |info| OrderedFloat(info.centroid[dim]));
    mid
}

/// Returns None if a leaf is cheaper than any split.
fn split_sah(
    infos: &mut [PrimitiveInfo],
    dim: usize,
    centroid_bounds: &WorldBox,
    max_prims_in_node: usize,
) -> Option<usize> {
    let count = infos.len();
    if count <= 2 {
        return Some(split_equal_counts(infos, dim));
    }

    let bounds = infos
        .iter()
        .fold(WorldBox::empty(), |acc, info| acc.union(&info.bounds));
    if bounds.surface_area() <= 0.0 {
        // Flat primitives on a line, the cost model has nothing to compare.
        return (count > max_prims_in_node).then(|| split_equal_counts(infos, dim));
    }

    let (best_bucket, split_cost) = best_bucket_split(
        infos.iter().map(|info| (info.centroid, info.bounds)),
        dim,
        centroid_bounds,
        &bounds,
    );

    let leaf_cost = count as FloatType;
    if count > max_prims_in_node || split_cost < leaf_cost {
        Some(itertools::partition(&mut *infos, |info| {
            bucket_index(centroid_bounds, dim, &info.centroid) <= best_bucket
        }))
    } else {
        None
    }
}

#[derive(Clone, Debug)]
struct Bucket {
    count: usize,
    bounds: WorldBox,
}

fn bucket_index(centroid_bounds: &WorldBox, dim: usize, centroid: &WorldPoint) -> usize {
    let offset = centroid_bounds.offset(centroid)[dim];
    ((SAH_BUCKET_COUNT as FloatType * offset) as usize).min(SAH_BUCKET_COUNT - 1)
}

/// Find the bucket boundary with the lowest SAH cost.
/// Items are (centroid, bounds) pairs; returns the last bucket of the lower half and the
/// cost of the split, relative to the cost of intersecting a single primitive.
/// The centroid bounds must not be degenerate along `dim`.
fn best_bucket_split(
    items: impl Iterator<Item = (WorldPoint, WorldBox)>,
    dim: usize,
    centroid_bounds: &WorldBox,
    bounds: &WorldBox,
) -> (usize, FloatType) {
    let mut buckets: [Bucket; SAH_BUCKET_COUNT] = std::array::from_fn(|_| Bucket {
        count: 0,
        bounds: WorldBox::empty(),
    });
    for (centroid, item_bounds) in items {
        let bucket = &mut buckets[bucket_index(centroid_bounds, dim, &centroid)];
        bucket.count += 1;
        bucket.bounds = bucket.bounds.union(&item_bounds);
    }

    // Weighted area of everything below and above each boundary
    let mut costs = [0.0; SAH_BUCKET_COUNT - 1];

    let mut count_below = 0;
    let mut bounds_below = WorldBox::empty();
    for (i, bucket) in buckets[..SAH_BUCKET_COUNT - 1].iter().enumerate() {
        count_below += bucket.count;
        bounds_below = bounds_below.union(&bucket.bounds);
        costs[i] += count_below as FloatType * bounds_below.surface_area();
    }

    let mut count_above = 0;
    let mut bounds_above = WorldBox::empty();
    for (i, bucket) in buckets.iter().enumerate().skip(1).rev() {
        count_above += bucket.count;
        bounds_above = bounds_above.union(&bucket.bounds);
        costs[i - 1] += count_above as FloatType * bounds_above.surface_area();
    }

    let best = costs
        .iter()
        .position_min_by_key(|cost| OrderedFloat(**cost))
        .unwrap_or(0);

    (
        best,
        SAH_TRAVERSAL_COST + costs[best] / bounds.surface_area(),
    )
}

/// Insert two zero bits between each of the low 10 bits of `x`.
fn spread_bits(x: u32) -> u32 {
    debug_assert!(x < 1 << MORTON_BITS);
    let x = (x | (x << 16)) & 0x0300_00ff;
    let x = (x | (x << 8)) & 0x0300_f00f;
    let x = (x | (x << 4)) & 0x030c_30c3;
    (x | (x << 2)) & 0x0924_9249
}

fn morton_code(centroid_bounds: &WorldBox, centroid: &WorldPoint) -> u32 {
    let grid = centroid_bounds
        .offset(centroid)
        .map(|x| (x * MORTON_SCALE).clamp(0.0, MORTON_SCALE - 1.0) as u32);

    (spread_bits(grid.z) << 2) | (spread_bits(grid.y) << 1) | spread_bits(grid.x)
}

/// Depth first, pre-order flattening.
fn flatten(node: &BuildNode, nodes: &mut IndexVec<NodeIdx, LinearNode>) -> NodeIdx {
    let index = nodes.push(LinearNode {
        bounds: *node.bounds(),
        kind: NodeKind::Leaf {
            primitives_offset: 0,
            n_primitives: 0,
        },
    });

    nodes[index].kind = match node {
        BuildNode::Leaf {
            first_offset,
            count,
            ..
        } => NodeKind::Leaf {
            primitives_offset: *first_offset as u32,
            n_primitives: *count as u8,
        },
        BuildNode::Interior {
            children,
            split_axis,
            ..
        } => {
            flatten(children[0], nodes);
            let second_child_offset = flatten(children[1], nodes);
            NodeKind::Interior {
                second_child_offset,
                split_axis: *split_axis,
            }
        }
    };

    index
}

/// Reorder primitives so that `ordered[i]` ends up at position `i`.
fn reorder<P>(primitives: Vec<P>, ordered: &[usize]) -> Vec<P> {
    debug_assert!(primitives.len() == ordered.len());
    let mut rank = vec![0; ordered.len()];
    for (position, &index) in ordered.iter().enumerate() {
        rank[index] = position;
    }

    let mut ranked: Vec<(usize, P)> = rank.into_iter().zip(primitives).collect();
    ranked.sort_unstable_by_key(|(position, _)| *position);
    ranked.into_iter().map(|(_, primitive)| primitive).collect()
}
