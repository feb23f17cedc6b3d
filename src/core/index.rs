//! In-memory entity index built during the first pass
//!
//! Holds everything the second pass needs: retained node coordinates, how many
//! way references each node has, the node list of every way and the turn
//! restrictions keyed by their from-way.

use crate::core::rules::BoundingBox;
use crate::core::source::{Coord, ElementKind, MemberKind, OsmElement};
use std::collections::HashMap;

/// A complete `type=restriction` relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    pub id: i64,
    pub from_ways: Vec<i64>,
    pub to_way: i64,
    pub via_node: i64,
}

/// Members and tags of the relation currently being read
#[derive(Debug)]
pub struct RelationBuilder {
    id: i64,
    from_ways: Vec<i64>,
    to_way: Option<i64>,
    via_node: Option<i64>,
    restriction_tag: bool,
    unexpected_role: bool,
}

impl RelationBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            from_ways: Vec::new(),
            to_way: None,
            via_node: None,
            restriction_tag: false,
            unexpected_role: false,
        }
    }

    pub fn add_member(&mut self, kind: MemberKind, ref_id: i64, role: &str) {
        match (kind, role) {
            (MemberKind::Node, "via") => self.via_node = Some(ref_id),
            (MemberKind::Way, "from") => self.from_ways.push(ref_id),
            (MemberKind::Way, "to") => self.to_way = Some(ref_id),
            (MemberKind::Relation, _) => {}
            _ => self.unexpected_role = true,
        }
    }

    pub fn add_tag(&mut self, key: &str, value: &str) {
        if key == "type" && value == "restriction" {
            self.restriction_tag = true;
        }
    }

    /// The stored restriction, if the relation is a complete one.
    ///
    /// Negative to-way and via-node refs (unsaved editor objects) never
    /// resolve, so such relations are dropped.
    pub fn build(self) -> Option<Restriction> {
        if !self.restriction_tag || self.unexpected_role || self.from_ways.is_empty() {
            return None;
        }
        Some(Restriction {
            id: self.id,
            from_ways: self.from_ways,
            to_way: self.to_way.filter(|&id| id >= 0)?,
            via_node: self.via_node.filter(|&id| id >= 0)?,
        })
    }
}

/// Node, way and restriction tables shared by both passes
#[derive(Debug, Default)]
pub struct EntityIndex {
    coords: HashMap<i64, Coord>,
    usage: HashMap<i64, u32>,
    ways: HashMap<i64, Vec<i64>>,
    restrictions: Vec<Restriction>,
    /// from-way id to positions in `restrictions`
    by_from_way: HashMap<i64, Vec<usize>>,
}

impl EntityIndex {
    pub fn insert_node(&mut self, id: i64, coord: Coord) {
        self.coords.insert(id, coord);
    }

    /// Append a node reference to a way and count the usage
    pub fn push_way_node(&mut self, way_id: i64, node_id: i64) {
        self.ways.entry(way_id).or_default().push(node_id);
        *self.usage.entry(node_id).or_insert(0) += 1;
    }

    pub fn insert_restriction(&mut self, restriction: Restriction) {
        let position = self.restrictions.len();
        for &from_way in &restriction.from_ways {
            let bucket = self.by_from_way.entry(from_way).or_default();
            if !bucket.contains(&position) {
                bucket.push(position);
            }
        }
        self.restrictions.push(restriction);
    }

    pub fn coord(&self, node_id: i64) -> Option<Coord> {
        self.coords.get(&node_id).copied()
    }

    pub fn usage_count(&self, node_id: i64) -> u32 {
        self.usage.get(&node_id).copied().unwrap_or(0)
    }

    pub fn way_nodes(&self, way_id: i64) -> Option<&[i64]> {
        self.ways.get(&way_id).map(Vec::as_slice)
    }

    /// Restrictions listing `way_id` among their from-ways
    pub fn restrictions_from(&self, way_id: i64) -> impl Iterator<Item = &Restriction> + '_ {
        self.by_from_way
            .get(&way_id)
            .into_iter()
            .flatten()
            .filter_map(|&position| self.restrictions.get(position))
    }

    pub fn node_count(&self) -> usize {
        self.coords.len()
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    pub fn restriction_count(&self) -> usize {
        self.restrictions.len()
    }

    /// Number of from-way lookup entries
    pub fn from_way_entries(&self) -> usize {
        self.by_from_way.values().map(Vec::len).sum()
    }
}

/// First-pass counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub nodes_read: usize,
    pub nodes_retained: usize,
    pub nodes_skipped: usize,
    pub ways_read: usize,
    pub relations_read: usize,
    pub restrictions_indexed: usize,
}

/// Element currently open in the first pass
#[derive(Debug)]
enum Scope {
    Outside,
    Way(i64),
    Relation(RelationBuilder),
}

/// First-pass context: feeds elements into an [`EntityIndex`]
#[derive(Debug)]
pub struct IndexBuilder {
    index: EntityIndex,
    bbox: Option<BoundingBox>,
    relations: bool,
    scope: Scope,
    stats: ScanStats,
}

impl IndexBuilder {
    /// `relations` enables capture of turn restrictions
    pub fn new(bbox: Option<BoundingBox>, relations: bool) -> Self {
        Self {
            index: EntityIndex::default(),
            bbox,
            relations,
            scope: Scope::Outside,
            stats: ScanStats::default(),
        }
    }

    pub fn accept(&mut self, element: OsmElement) {
        match element {
            OsmElement::Node { id, coord } => {
                self.close_scope();
                self.stats.nodes_read += 1;
                match coord {
                    Some(coord) if self.in_bounds(coord) => {
                        self.index.insert_node(id, coord);
                        self.stats.nodes_retained += 1;
                    }
                    _ => {
                        log::trace!("Skipping node {id}: outside bounding box or without coordinates");
                        self.stats.nodes_skipped += 1;
                    }
                }
            }
            OsmElement::Way { id } => {
                self.close_scope();
                self.stats.ways_read += 1;
                self.scope = Scope::Way(id);
            }
            OsmElement::NodeRef { node_id } => {
                if let Scope::Way(way_id) = self.scope {
                    self.index.push_way_node(way_id, node_id);
                }
            }
            OsmElement::Relation { id } => {
                self.close_scope();
                self.stats.relations_read += 1;
                if self.relations {
                    self.scope = Scope::Relation(RelationBuilder::new(id));
                }
            }
            OsmElement::Member { kind, ref_id, role } => {
                if let Scope::Relation(builder) = &mut self.scope {
                    builder.add_member(kind, ref_id, &role);
                }
            }
            OsmElement::Tag { key, value } => {
                if let Scope::Relation(builder) = &mut self.scope {
                    builder.add_tag(&key, &value);
                }
            }
            OsmElement::End(ElementKind::Relation) => {
                if let Scope::Relation(builder) = std::mem::replace(&mut self.scope, Scope::Outside) {
                    match builder.build() {
                        Some(restriction) => {
                            self.index.insert_restriction(restriction);
                            self.stats.restrictions_indexed += 1;
                        }
                        None => log::trace!("Discarding relation: not a complete turn restriction"),
                    }
                }
            }
            OsmElement::End(ElementKind::Way) => self.scope = Scope::Outside,
            OsmElement::End(ElementKind::Node | ElementKind::Osm) => {}
        }
    }

    pub fn finish(self) -> (EntityIndex, ScanStats) {
        (self.index, self.stats)
    }

    fn in_bounds(&self, coord: Coord) -> bool {
        self.bbox
            .map(|bbox| bbox.contains(coord.lat, coord.lon))
            .unwrap_or(true)
    }

    /// Drop whatever element is still open; an unclosed relation is discarded
    fn close_scope(&mut self) {
        if let Scope::Relation(builder) = std::mem::replace(&mut self.scope, Scope::Outside) {
            log::debug!("Discarding relation {} left open", builder.id);
        }
    }
}
