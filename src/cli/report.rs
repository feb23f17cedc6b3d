//! End-of-run summary printed on stdout

use osm2mif::ConvertSummary;
use std::fmt::Write;

/// Render the counts of a finished run, one fact per line
pub fn render_summary(summary: &ConvertSummary) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(
        out,
        "Processed {} lines from OSM file ({} skipped)",
        summary.lines_read, summary.lines_skipped
    );
    let _ = writeln!(
        out,
        "Nodes: {} read, {} retained, {} skipped",
        summary.nodes_read, summary.nodes_retained, summary.nodes_skipped
    );
    let _ = writeln!(
        out,
        "Ways: {} read, {} written, {} skipped",
        summary.ways_read, summary.ways_written, summary.ways_skipped
    );
    let _ = writeln!(out, "Records: {} written", summary.records_written);

    if summary.relations_enabled {
        let _ = writeln!(
            out,
            "Restrictions: {} indexed ({} from-way entries)",
            summary.restrictions_indexed, summary.restricted_ways
        );
        let _ = writeln!(
            out,
            "Restrictions: {} found at junctions, {} written",
            summary.restrictions_found, summary.restrictions_written
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(relations_enabled: bool) -> ConvertSummary {
        ConvertSummary {
            lines_read: 120,
            lines_skipped: 1,
            nodes_read: 40,
            nodes_retained: 38,
            nodes_skipped: 2,
            ways_read: 9,
            ways_written: 5,
            ways_skipped: 4,
            records_written: 7,
            relations_enabled,
            restrictions_indexed: 2,
            restricted_ways: 3,
            restrictions_found: 4,
            restrictions_written: 1,
        }
    }

    #[test]
    fn test_render_summary_with_restrictions() {
        let text = render_summary(&summary(true));
        assert_eq!(
            text,
            "Processed 120 lines from OSM file (1 skipped)\n\
             Nodes: 40 read, 38 retained, 2 skipped\n\
             Ways: 9 read, 5 written, 4 skipped\n\
             Records: 7 written\n\
             Restrictions: 2 indexed (3 from-way entries)\n\
             Restrictions: 4 found at junctions, 1 written\n"
        );
    }

    #[test]
    fn test_render_summary_without_restrictions() {
        let text = render_summary(&summary(false));
        assert!(text.ends_with("Records: 7 written\n"));
        assert!(!text.contains("Restrictions"));
    }
}
