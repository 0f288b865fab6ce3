use crate::util::Stats;

use super::{Bvh, NodeIdx, NodeKind};

#[derive(Clone, Debug, PartialEq)]
pub struct BvhStatistics {
    pub node_count: usize,
    pub leaf_count: usize,
    /// Depth of the leaves, root has depth 1
    pub depth: Stats,
    /// Number of primitives per leaf
    pub leaf_fill: Stats,
}

impl<P> Bvh<P> {
    pub fn statistics(&self) -> BvhStatistics {
        let mut depth = Stats::default();
        let mut leaf_fill = Stats::default();

        if !self.nodes.is_empty() {
            self.collect_statistics(NodeIdx::new(0), 1, &mut depth, &mut leaf_fill);
        }

        BvhStatistics {
            node_count: self.nodes.len(),
            leaf_count: leaf_fill.count,
            depth,
            leaf_fill,
        }
    }

    fn collect_statistics(&self, index: NodeIdx, depth: usize, depth_stats: &mut Stats, leaf_fill: &mut Stats) {
        match self.nodes[index].kind {
            NodeKind::Leaf { n_primitives, .. } => {
                depth_stats.add_sample(depth);
                leaf_fill.add_sample(n_primitives as usize);
            }
            NodeKind::Interior {
                second_child_offset, ..
            } => {
                self.collect_statistics(index + 1, depth + 1, depth_stats, leaf_fill);
                self.collect_statistics(second_child_offset, depth + 1, depth_stats, leaf_fill);
            }
        }
    }

    pub fn print_statistics(&self) {
        let statistics = self.statistics();
        println!(
            "BVH ({}, max {} primitives in node): {} primitives, {} nodes, {} leaves",
            self.split_method,
            self.max_prims_in_node,
            self.primitives.len(),
            statistics.node_count,
            statistics.leaf_count
        );
        if statistics.leaf_count > 0 {
            println!("Depth: {}", statistics.depth);
            println!("Leaf nodes fill: {}", statistics.leaf_fill);
        }
    }

    pub fn print_tree(&self) {
        if !self.nodes.is_empty() {
            self.print_recursive(0, NodeIdx::new(0));
        }
    }

    fn print_recursive(&self, indent: usize, index: NodeIdx) {
        let node = &self.nodes[index];
        let indent_str = "  ".repeat(indent);
        match node.kind {
            NodeKind::Leaf {
                primitives_offset,
                n_primitives,
            } => {
                println!(
                    "{}- L{}: {:?}-{:?} primitives {}..{}",
                    indent_str,
                    index.index(),
                    node.bounds.min,
                    node.bounds.max,
                    primitives_offset,
                    primitives_offset + n_primitives as u32
                );
            }
            NodeKind::Interior {
                second_child_offset,
                split_axis,
            } => {
                println!(
                    "{}- I{}: {:?}-{:?} split {}",
                    indent_str,
                    index.index(),
                    node.bounds.min,
                    node.bounds.max,
                    ["x", "y", "z"][split_axis as usize]
                );
                self.print_recursive(indent + 1, index + 1);
                self.print_recursive(indent + 1, second_child_offset);
            }
        }
    }
}
