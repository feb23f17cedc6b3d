//! Two-pass conversion driver
//!
//! Pass 1 reads the whole extract into an [`EntityIndex`]; pass 2 reads it
//! again, applies the rule table to every way and writes its segments.

use crate::core::filter::{Verdict, WayAttributes};
use crate::core::index::{EntityIndex, IndexBuilder, ScanStats};
use crate::core::mif::{MifWriter, Record, DEFAULT_STYLE};
use crate::core::rules::RuleTable;
use crate::core::segment::WaySegmenter;
use crate::core::source::{ElementKind, OsmElement, OsmReader, ReadStats};
use crate::core::turns::{TurnRestrictionResolver, TurnStats};
use log::{debug, info, trace};
use osm2mif_common::Result;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Paths and switches for one conversion run
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// OSM XML extract
    pub input: PathBuf,
    /// Rule description
    pub rules: PathBuf,
    /// Output base name; `.mif` and `.mid` are appended
    pub output: PathBuf,
    /// Capture turn restrictions and write the Restrictions column
    pub relations: bool,
}

impl ConvertConfig {
    pub fn new<P: Into<PathBuf>>(input: P, rules: P, output: P) -> Self {
        Self {
            input: input.into(),
            rules: rules.into(),
            output: output.into(),
            relations: true,
        }
    }
}

/// End-of-run counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub lines_read: usize,
    pub lines_skipped: usize,
    pub nodes_read: usize,
    pub nodes_retained: usize,
    pub nodes_skipped: usize,
    pub ways_read: usize,
    pub ways_written: usize,
    pub ways_skipped: usize,
    pub records_written: usize,
    pub relations_enabled: bool,
    pub restrictions_indexed: usize,
    /// From-way lookup entries
    pub restricted_ways: usize,
    pub restrictions_found: usize,
    pub restrictions_written: usize,
}

/// Way counters for the second pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WayStats {
    pub ways_read: usize,
    pub ways_written: usize,
    pub ways_skipped: usize,
}

/// Convert the files named in `config`
pub fn run_convert(config: &ConvertConfig) -> Result<ConvertSummary> {
    let rules = RuleTable::from_path(&config.rules)?;
    info!(
        "Loaded {} rule columns from {}",
        rules.column_count(),
        config.rules.display()
    );

    let first = OsmReader::from_path(&config.input)?;
    let mut writer = MifWriter::create(&config.output, &rules, config.relations)?;
    let second = OsmReader::from_path(&config.input)?;

    let summary = convert(&rules, first, second, &mut writer, config.relations)?;
    writer.finish()?;
    Ok(summary)
}

/// Run both passes over two independent reads of the same extract
pub fn convert<R1, R2, W>(
    rules: &RuleTable,
    first: OsmReader<R1>,
    second: OsmReader<R2>,
    writer: &mut MifWriter<W>,
    relations: bool,
) -> Result<ConvertSummary>
where
    R1: BufRead,
    R2: BufRead,
    W: Write,
{
    let (index, scan, _) = index_pass(rules, first, relations)?;
    let (ways, turns, read) = way_pass(rules, &index, second, writer, relations)?;

    Ok(ConvertSummary {
        lines_read: read.lines,
        lines_skipped: read.skipped_lines,
        nodes_read: scan.nodes_read,
        nodes_retained: scan.nodes_retained,
        nodes_skipped: scan.nodes_skipped,
        ways_read: ways.ways_read,
        ways_written: ways.ways_written,
        ways_skipped: ways.ways_skipped,
        records_written: writer.records_written(),
        relations_enabled: relations,
        restrictions_indexed: scan.restrictions_indexed,
        restricted_ways: index.from_way_entries(),
        restrictions_found: turns.found,
        restrictions_written: turns.written,
    })
}

/// Pass 1: index nodes, ways and (optionally) turn restrictions
pub fn index_pass<R: BufRead>(
    rules: &RuleTable,
    reader: OsmReader<R>,
    relations: bool,
) -> Result<(EntityIndex, ScanStats, ReadStats)> {
    if relations {
        info!("Pass 1: indexing nodes, ways and turn restrictions");
    } else {
        info!("Pass 1: indexing nodes and ways");
    }

    let mut builder = IndexBuilder::new(rules.bounding_box(), relations);
    let read = reader.for_each(|element| {
        builder.accept(element);
        Ok(())
    })?;
    let (index, scan) = builder.finish();

    info!(
        "Pass 1 done: {} of {} nodes retained, {} ways, {} restrictions over {} lines",
        scan.nodes_retained,
        scan.nodes_read,
        index.way_count(),
        index.restriction_count(),
        read.lines
    );
    Ok((index, scan, read))
}

/// Pass 2: apply the rules to every way and write its segments
pub fn way_pass<R: BufRead, W: Write>(
    rules: &RuleTable,
    index: &EntityIndex,
    reader: OsmReader<R>,
    writer: &mut MifWriter<W>,
    relations: bool,
) -> Result<(WayStats, TurnStats, ReadStats)> {
    info!("Pass 2: writing ways");

    let mut pass = WayPass {
        rules,
        index,
        writer,
        resolver: relations.then(|| TurnRestrictionResolver::new(index)),
        current: None,
        stats: WayStats::default(),
        turns: TurnStats::default(),
    };
    let read = reader.for_each(|element| pass.accept(element))?;
    pass.abandon_open_way();

    info!(
        "Pass 2 done: {} ways written, {} skipped, {} records",
        pass.stats.ways_written,
        pass.stats.ways_skipped,
        pass.writer.records_written()
    );
    Ok((pass.stats, pass.turns, read))
}

/// Second-pass context: the way being read and the running counters
struct WayPass<'a, W: Write> {
    rules: &'a RuleTable,
    index: &'a EntityIndex,
    writer: &'a mut MifWriter<W>,
    resolver: Option<TurnRestrictionResolver<'a>>,
    current: Option<(i64, WayAttributes<'a>)>,
    stats: WayStats,
    turns: TurnStats,
}

impl<'a, W: Write> WayPass<'a, W> {
    fn accept(&mut self, element: OsmElement) -> Result<()> {
        match element {
            OsmElement::Way { id } => {
                self.abandon_open_way();
                self.stats.ways_read += 1;
                self.current = Some((id, WayAttributes::new(self.rules, id)));
            }
            OsmElement::Tag { key, value } => {
                if let Some((_, attributes)) = &mut self.current {
                    attributes.apply_tag(&key, &value);
                }
            }
            OsmElement::End(ElementKind::Way) => {
                if let Some((id, attributes)) = self.current.take() {
                    self.finish_way(id, &attributes)?;
                }
            }
            OsmElement::Node { .. } | OsmElement::Relation { .. } => self.abandon_open_way(),
            _ => {}
        }
        Ok(())
    }

    /// A way still open when another element starts is never written
    fn abandon_open_way(&mut self) {
        if let Some((id, _)) = self.current.take() {
            debug!("Way {id} skipped: not closed");
            self.stats.ways_skipped += 1;
        }
    }

    fn finish_way(&mut self, id: i64, attributes: &WayAttributes<'_>) -> Result<()> {
        let verdict = attributes.verdict();
        if verdict != Verdict::Accepted {
            trace!("Way {id} skipped: {verdict:?}");
            self.stats.ways_skipped += 1;
            return Ok(());
        }

        let index = self.index;
        let nodes = index.way_nodes(id).unwrap_or_default();
        let segments = WaySegmenter::new(index, attributes.breakup()).segments(nodes);
        if segments.is_empty() {
            debug!("Way {id} skipped: fewer than two located nodes");
            self.stats.ways_skipped += 1;
            return Ok(());
        }

        let values: Vec<&str> = attributes.column_values().collect();
        let style = attributes.style().unwrap_or(DEFAULT_STYLE);
        for segment in &segments {
            let restrictions = match &self.resolver {
                Some(resolver) => resolver.annotate(id, nodes, segment, &mut self.turns),
                None => String::new(),
            };
            self.writer.write_record(&Record {
                geometry: attributes.geometry(),
                coords: &segment.coords,
                style,
                values: values.clone(),
                restrictions: &restrictions,
            })?;
        }
        self.stats.ways_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"mk="highway" iv="residential" iv="primary" style="Pen (3,2,255)"
k="name" iv="*"
k="access" ev="private"
"#;

    const EXTRACT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6">
 <node id="1" lat="51.0" lon="4.0"/>
 <node id="2" lat="51.001" lon="4.0"/>
 <node id="3" lat="51.002" lon="4.0"/>
 <node id="4" lat="51.001" lon="4.001"/>
 <way id="10">
  <nd ref="1"/>
  <nd ref="2"/>
  <nd ref="3"/>
  <tag k="highway" v="residential"/>
  <tag k="name" v="Church &amp; Main"/>
 </way>
 <way id="11">
  <nd ref="2"/>
  <nd ref="4"/>
  <tag k="highway" v="primary"/>
 </way>
 <way id="12">
  <nd ref="3"/>
  <nd ref="4"/>
  <tag k="highway" v="residential"/>
  <tag k="access" v="private"/>
 </way>
 <way id="13">
  <nd ref="1"/>
  <nd ref="4"/>
  <tag k="building" v="yes"/>
 </way>
 <relation id="100">
  <member type="way" ref="10" role="from"/>
  <member type="node" ref="2" role="via"/>
  <member type="way" ref="11" role="to"/>
  <tag k="type" v="restriction"/>
  <tag k="restriction" v="no_right_turn"/>
 </relation>
</osm>
"#;

    fn run(relations: bool) -> (ConvertSummary, String, String) {
        let rules = RuleTable::parse(RULES).unwrap();
        let mut writer = MifWriter::new(Vec::new(), Vec::new(), &rules, relations).unwrap();
        let summary = convert(
            &rules,
            OsmReader::new(EXTRACT.as_bytes()),
            OsmReader::new(EXTRACT.as_bytes()),
            &mut writer,
            relations,
        )
        .unwrap();
        let (mif, mid) = writer.finish().unwrap();
        (
            summary,
            String::from_utf8(mif).unwrap(),
            String::from_utf8(mid).unwrap(),
        )
    }

    #[test]
    fn test_convert_with_restrictions() {
        let (summary, mif, mid) = run(true);

        assert_eq!(summary.nodes_read, 4);
        assert_eq!(summary.nodes_retained, 4);
        assert_eq!(summary.ways_read, 4);
        assert_eq!(summary.ways_written, 2);
        assert_eq!(summary.ways_skipped, 2);
        // Way 10 splits at node 2 (shared with way 11); way 11 is whole
        assert_eq!(summary.records_written, 3);
        assert_eq!(summary.restrictions_indexed, 1);
        assert_eq!(summary.restrictions_written, 1);

        assert_eq!(
            mid,
            "\"residential\",\"Church & Main\",\"11\"\n\
             \"residential\",\"Church & Main\",\"\"\n\
             \"primary\",\"\",\"\"\n"
        );
        assert!(mif.contains("Columns 3\n"));
        assert!(mif.contains("Pline 2\n4 51\n4 51.001\n\tPen (2,54,32768)\n"));
        assert!(mif.contains("Pline 2\n4 51.001\n4.001 51.001\n\tPen (3,2,255)\n"));
    }

    #[test]
    fn test_convert_without_restrictions() {
        let (summary, mif, mid) = run(false);

        assert!(!summary.relations_enabled);
        assert_eq!(summary.restrictions_indexed, 0);
        assert_eq!(summary.restrictions_found, 0);
        assert_eq!(summary.records_written, 3);
        assert!(mif.contains("Columns 2\n"));
        assert!(mid.starts_with("\"residential\",\"Church & Main\"\n"));
    }

    #[test]
    fn test_summary_counts_balance() {
        let (summary, _, _) = run(true);
        assert_eq!(
            summary.nodes_read,
            summary.nodes_retained + summary.nodes_skipped
        );
        assert_eq!(summary.ways_read, summary.ways_written + summary.ways_skipped);
        assert_eq!(summary.lines_read, EXTRACT.lines().count());
    }
}
