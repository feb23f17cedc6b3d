//! Splitting ways into records at junction nodes

use crate::core::index::EntityIndex;
use crate::core::source::Coord;

/// One output record's worth of a way
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Node position of the cut that started this segment, if any
    pub prev_cut: Option<usize>,
    /// Node position of the cut that ended this segment
    pub cut: usize,
    pub coords: Vec<Coord>,
}

/// Cuts a way's node list at shared nodes
pub struct WaySegmenter<'a> {
    index: &'a EntityIndex,
    breakup: bool,
}

impl<'a> WaySegmenter<'a> {
    /// With `breakup` off the way is only cut at its last node
    pub fn new(index: &'a EntityIndex, breakup: bool) -> Self {
        Self { index, breakup }
    }

    /// Nodes without coordinates are left out without ending a segment.
    /// Consecutive segments share their boundary coordinate.
    pub fn segments(&self, nodes: &[i64]) -> Vec<Segment> {
        let mut segments = Vec::new();
        let Some(last) = nodes.len().checked_sub(1) else {
            return segments;
        };

        let mut buffer = Vec::new();
        let mut prev_cut = None;

        for (i, &node_id) in nodes.iter().enumerate() {
            let Some(coord) = self.index.coord(node_id) else {
                continue;
            };
            buffer.push(coord);

            let junction = i == last || (self.breakup && self.index.usage_count(node_id) > 1);
            if i > 0 && junction && buffer.len() > 1 {
                segments.push(Segment {
                    prev_cut,
                    cut: i,
                    coords: std::mem::replace(&mut buffer, vec![coord]),
                });
                prev_cut = Some(i);
            }
        }

        segments
    }
}
