//! Banned right turns from turn-restriction relations
//!
//! At every cut of a from-way, each restriction whose via-node is the cut node
//! is tested geometrically: the turn from the from-way onto the to-way is a
//! right turn when the signed angle between the two edges is negative. Edges
//! are `(dx, dy) = (Δlon, Δlat)` vectors, so no projection is involved.

use crate::core::index::EntityIndex;
use crate::core::segment::Segment;
use crate::core::source::Coord;

/// Direction from which the from-way enters the via-node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approach {
    /// Travelling along the way, from the node before the cut
    Behind,
    /// Travelling against the way, from the node after the cut
    Ahead,
}

/// Restriction counters accumulated over the second pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnStats {
    /// Restrictions whose via-node sat at a cut
    pub found: usize,
    /// Restrictions written as banned right turns
    pub written: usize,
}

fn heading(from: Coord, to: Coord) -> f64 {
    (to.lat - from.lat).atan2(to.lon - from.lon)
}

/// Angle in degrees from edge `a -> b` to edge `c -> d`, in `(-180, 180]`
pub fn signed_angle(a: Coord, b: Coord, c: Coord, d: Coord) -> f64 {
    let degrees = (heading(c, d) - heading(a, b)).to_degrees().rem_euclid(360.0);
    if degrees > 180.0 {
        degrees - 360.0
    } else {
        degrees
    }
}

pub fn is_right_turn(angle: f64) -> bool {
    angle < 0.0
}

/// Resolves restrictions indexed under a from-way into banned to-way ids
pub struct TurnRestrictionResolver<'a> {
    index: &'a EntityIndex,
}

impl<'a> TurnRestrictionResolver<'a> {
    pub fn new(index: &'a EntityIndex) -> Self {
        Self { index }
    }

    /// Annotation for one segment: turns banned at its own cut, then turns
    /// banned at its previous cut when approached from ahead.
    pub fn annotate(
        &self,
        way_id: i64,
        nodes: &[i64],
        segment: &Segment,
        stats: &mut TurnStats,
    ) -> String {
        let mut banned = self.banned_turns(way_id, nodes, segment.cut, Approach::Behind, stats);
        if let Some(prev_cut) = segment.prev_cut {
            banned.extend(self.banned_turns(way_id, nodes, prev_cut, Approach::Ahead, stats));
        }

        banned
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// To-way ids of restrictions at `nodes[cut]` that are right turns
    pub fn banned_turns(
        &self,
        way_id: i64,
        nodes: &[i64],
        cut: usize,
        approach: Approach,
        stats: &mut TurnStats,
    ) -> Vec<i64> {
        let Some(&via) = nodes.get(cut) else {
            return Vec::new();
        };

        let mut banned = Vec::new();
        for restriction in self
            .index
            .restrictions_from(way_id)
            .filter(|restriction| restriction.via_node == via)
        {
            stats.found += 1;

            let Some(exit) = self.exit_node(restriction.to_way, via) else {
                continue;
            };
            let entry = match approach {
                Approach::Behind => cut.checked_sub(1).and_then(|i| nodes.get(i)),
                Approach::Ahead => nodes.get(cut + 1),
            };
            let Some(&entry) = entry else {
                continue;
            };

            let (Some(from), Some(at), Some(to)) = (
                self.index.coord(entry),
                self.index.coord(via),
                self.index.coord(exit),
            ) else {
                log::debug!(
                    "Restriction {} skipped: node coordinates outside the extract",
                    restriction.id
                );
                continue;
            };

            if is_right_turn(signed_angle(from, at, at, to)) {
                banned.push(restriction.to_way);
                stats.written += 1;
            }
        }
        banned
    }

    /// Neighbour of the first `via` occurrence on the to-way: the following
    /// node, or the preceding one when `via` ends the way.
    fn exit_node(&self, to_way: i64, via: i64) -> Option<i64> {
        let nodes = self.index.way_nodes(to_way)?;
        let position = nodes.iter().position(|&node| node == via)?;
        nodes
            .get(position + 1)
            .or_else(|| position.checked_sub(1).and_then(|i| nodes.get(i)))
            .copied()
    }
}
