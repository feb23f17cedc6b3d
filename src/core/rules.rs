//! Rule table: which tagged ways are converted and how
//!
//! The rule description is a line-oriented list of `key="value"` tokens:
//!
//! ```text
//! // bounding box (any side may be omitted)
//! min_lon="4.2" max_lon="4.5" min_lat="50.7" max_lat="50.9"
//! mk="highway" iv="residential" iv="primary" style="Pen(2,2,255)"
//! k="waterway" iv="river" mif_type="Region" break_up="no"
//! k="route" ev="ferry"
//! k="oneway" iv="*" type="Integer"
//! ```
//!
//! Declarations for the same key merge across lines. Values enumerated with
//! `iv` always take precedence over the `iv="*"` wildcard.

use osm2mif_common::{suggest_correction, Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Value matching every value of a key
pub const WILDCARD: &str = "*";

/// Column type used when a key declares no `type`
pub const DEFAULT_COLUMN_TYPE: &str = "Char(250)";

const BOUNDS_KEYS: &[&str] = &["min_lon", "max_lon", "min_lat", "max_lat"];
const DECLARATION_KEYS: &[&str] = &["k", "mk", "min_lon", "max_lon", "min_lat", "max_lat"];
const VALUE_KEYS: &[&str] = &["iv", "ev", "style", "tv", "mif_type", "type", "break_up"];

/// Geometry written for a matched way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryType {
    #[default]
    Polyline,
    Region,
}

impl GeometryType {
    /// Parse a `mif_type` value. Anything other than `Region` is a polyline.
    pub fn from_rule(value: &str) -> Self {
        if value.eq_ignore_ascii_case("region") {
            GeometryType::Region
        } else {
            GeometryType::Polyline
        }
    }
}

/// Inclusive lat/lon rectangle; undeclared sides are unbounded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min_lon: f64::NEG_INFINITY,
            max_lon: f64::INFINITY,
            min_lat: f64::NEG_INFINITY,
            max_lat: f64::INFINITY,
        }
    }
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Per-value overrides declared after an `iv` token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueOverrides {
    pub style: Option<String>,
    pub transform: Option<String>,
    pub geometry: Option<GeometryType>,
}

/// Inclusion policy for one tag key
#[derive(Debug, Clone, Default)]
pub struct KeyRule {
    pub match_all: bool,
    pub values: BTreeSet<String>,
    /// Keyed by included value, or by [`WILDCARD`] for the `iv="*"` overrides
    pub overrides: HashMap<String, ValueOverrides>,
    pub mandatory: bool,
    pub no_breakup: bool,
    pub column_type: Option<String>,
}

/// Exclusion policy for one tag key
#[derive(Debug, Clone, Default)]
pub struct ExclusionRule {
    pub match_all: bool,
    pub values: BTreeSet<String>,
}

impl ExclusionRule {
    fn matches(&self, value: &str) -> bool {
        self.match_all || self.values.contains(value)
    }
}

/// How a tag value matched its key rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Wildcard,
    Specific,
}

/// Result of classifying one tag against the rule table
#[derive(Debug, Clone, PartialEq)]
pub struct Classification<'r> {
    /// Column the value is written to
    pub column: &'r str,
    pub tier: MatchTier,
    pub mandatory: bool,
    /// Value after the `tv` transform, if any
    pub value: String,
    pub style: Option<&'r str>,
    pub geometry: Option<GeometryType>,
    pub suppress_breakup: bool,
}

/// Immutable rule table, built once before the input is read
#[derive(Debug, Default)]
pub struct RuleTable {
    included: BTreeMap<String, KeyRule>,
    excluded: BTreeMap<String, ExclusionRule>,
    bbox: Option<BoundingBox>,
}

impl RuleTable {
    /// Load a rule description from disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse a rule description held in memory
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut parser = RuleParser::default();
        for (i, line) in reader.lines().enumerate() {
            parser.parse_line(i + 1, &line?)?;
        }
        parser.finish()
    }

    /// Classify a tag against the inclusion rules.
    ///
    /// Enumerated values are looked up first; the wildcard only applies to
    /// values that are not enumerated. Empty values never match.
    pub fn classify(&self, key: &str, value: &str) -> Option<Classification<'_>> {
        let (column, rule) = self.included.get_key_value(key)?;
        if value.is_empty() {
            return None;
        }

        let tier = if rule.values.contains(value) {
            MatchTier::Specific
        } else if rule.match_all {
            MatchTier::Wildcard
        } else {
            return None;
        };

        let specific = match tier {
            MatchTier::Specific => rule.overrides.get(value),
            MatchTier::Wildcard => None,
        };
        let wildcard = if rule.match_all {
            rule.overrides.get(WILDCARD)
        } else {
            None
        };

        let transform = specific
            .and_then(|o| o.transform.as_deref())
            .or_else(|| wildcard.and_then(|o| o.transform.as_deref()));
        let style = specific
            .and_then(|o| o.style.as_deref())
            .or_else(|| wildcard.and_then(|o| o.style.as_deref()));
        let geometry = specific
            .and_then(|o| o.geometry)
            .or_else(|| wildcard.and_then(|o| o.geometry));

        Some(Classification {
            column: column.as_str(),
            tier,
            mandatory: rule.mandatory,
            value: transform.unwrap_or(value).to_string(),
            style,
            geometry,
            suppress_breakup: rule.no_breakup,
        })
    }

    /// Whether a tag vetoes its way
    pub fn is_excluded(&self, key: &str, value: &str) -> bool {
        self.excluded
            .get(key)
            .map(|rule| rule.matches(value))
            .unwrap_or(false)
    }

    /// Output columns as `(name, type)` in key order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.included.iter().map(|(key, rule)| {
            (
                key.as_str(),
                rule.column_type.as_deref().unwrap_or(DEFAULT_COLUMN_TYPE),
            )
        })
    }

    pub fn column_count(&self) -> usize {
        self.included.len()
    }

    pub fn has_mandatory_keys(&self) -> bool {
        self.included.values().any(|rule| rule.mandatory)
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bbox
    }
}

/// Incremental parser state; one instance per rule description
#[derive(Default)]
struct RuleParser {
    table: RuleTable,
}

impl RuleParser {
    fn parse_line(&mut self, line_no: usize, line: &str) -> Result<()> {
        let syntax = |reason: String| Error::RuleSyntax {
            line: line_no,
            text: line.to_string(),
            reason,
        };

        let tokens = tokenize(line).map_err(syntax)?;
        let Some(((first_key, first_value), rest)) = tokens.split_first() else {
            return Ok(());
        };

        if BOUNDS_KEYS.contains(first_key) {
            return tokens
                .iter()
                .try_for_each(|(key, value)| self.apply_bound(key, value))
                .map_err(syntax);
        }

        let mandatory = match *first_key {
            "k" => false,
            "mk" => true,
            other => {
                return Err(syntax(unrecognised(other, DECLARATION_KEYS)));
            }
        };

        self.apply_declaration(first_value, mandatory, rest)
            .map_err(syntax)
    }

    fn apply_bound(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        if !BOUNDS_KEYS.contains(&key) {
            return Err(format!("'{key}' cannot follow a bounding box value"));
        }
        let parsed: f64 = value
            .trim()
            .parse()
            .map_err(|_| format!("'{value}' is not a lat/long"))?;

        let bbox = self.table.bbox.get_or_insert_with(BoundingBox::default);
        match key {
            "min_lon" => bbox.min_lon = parsed,
            "max_lon" => bbox.max_lon = parsed,
            "min_lat" => bbox.min_lat = parsed,
            _ => bbox.max_lat = parsed,
        }
        Ok(())
    }

    fn apply_declaration(
        &mut self,
        key: &str,
        mandatory: bool,
        tokens: &[(&str, &str)],
    ) -> std::result::Result<(), String> {
        // Most recent `iv` on this line; style/tv/mif_type attach to it
        let mut current_value: Option<&str> = None;

        for &(token, value) in tokens {
            match token {
                "iv" => {
                    let rule = self.included_rule(key, mandatory);
                    if value == WILDCARD {
                        rule.match_all = true;
                    } else {
                        rule.values.insert(value.to_string());
                    }
                    current_value = Some(value);
                }
                "ev" => {
                    let rule = self.table.excluded.entry(key.to_string()).or_default();
                    if value == WILDCARD {
                        rule.match_all = true;
                    } else {
                        rule.values.insert(value.to_string());
                    }
                }
                "style" | "tv" | "mif_type" => {
                    let included = current_value
                        .ok_or_else(|| format!("'{token}' must follow an iv value"))?;
                    let overrides = self
                        .included_rule(key, mandatory)
                        .overrides
                        .entry(included.to_string())
                        .or_default();
                    match token {
                        "style" => overrides.style = Some(value.to_string()),
                        "tv" => overrides.transform = Some(value.to_string()),
                        _ => overrides.geometry = Some(GeometryType::from_rule(value)),
                    }
                }
                "type" => {
                    let rule = self.included_rule(key, mandatory);
                    if rule.column_type.is_some() {
                        return Err(format!("type defined twice for {key}"));
                    }
                    rule.column_type = Some(value.to_string());
                }
                "break_up" => {
                    let no_breakup = match value {
                        "no" => true,
                        "yes" => false,
                        other => return Err(format!("break_up must be \"yes\" or \"no\", not '{other}'")),
                    };
                    self.included_rule(key, mandatory).no_breakup |= no_breakup;
                }
                "k" | "mk" => {
                    return Err(format!("'{token}' must start the line"));
                }
                other => return Err(unrecognised(other, VALUE_KEYS)),
            }
        }
        Ok(())
    }

    fn included_rule(&mut self, key: &str, mandatory: bool) -> &mut KeyRule {
        let rule = self.table.included.entry(key.to_string()).or_default();
        rule.mandatory |= mandatory;
        rule
    }

    fn finish(self) -> Result<RuleTable> {
        for (key, exclusion) in &self.table.excluded {
            let all_included = self
                .table
                .included
                .get(key)
                .map(|rule| rule.match_all)
                .unwrap_or(false);
            if exclusion.match_all && all_included {
                return Err(Error::AmbiguousWildcard { key: key.clone() });
            }
        }
        Ok(self.table)
    }
}

fn unrecognised(key: &str, candidates: &[&str]) -> String {
    match suggest_correction(key, candidates) {
        Some(suggestion) => format!("unrecognised key '{key}' (did you mean '{suggestion}'?)"),
        None => format!("unrecognised key '{key}'"),
    }
}

/// Split a line into `key="value"` pairs, stopping at a `//` comment
fn tokenize(line: &str) -> std::result::Result<Vec<(&str, &str)>, String> {
    let mut tokens = Vec::new();
    let mut rest = line;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() || rest.starts_with("//") {
            break;
        }

        let eq = rest
            .find("=\"")
            .ok_or_else(|| format!("expected key=\"value\" at '{rest}'"))?;
        let key = rest[..eq].trim();
        let after = &rest[eq + 2..];
        let close = after
            .find('"')
            .ok_or_else(|| "missing closing quote".to_string())?;
        let value = &after[..close];

        if key.is_empty() || value.is_empty() {
            return Err("empty key or value".to_string());
        }
        if key.contains(char::is_whitespace) || key.contains('"') {
            return Err(format!("unexpected text before '{key}'"));
        }

        tokens.push((key, value));
        rest = &after[close + 1..];
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(err: Error) -> String {
        match err {
            Error::RuleSyntax { reason, .. } => reason,
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_specific_value_beats_wildcard() {
        let rules = RuleTable::parse(
            "k=\"waterway\" iv=\"*\" style=\"Pen(1,2,3)\"\n\
             k=\"waterway\" iv=\"river\" style=\"Pen(3,2,65438)\" tv=\"1\"\n",
        )
        .unwrap();

        let river = rules.classify("waterway", "river").unwrap();
        assert_eq!(river.tier, MatchTier::Specific);
        assert_eq!(river.style, Some("Pen(3,2,65438)"));
        assert_eq!(river.value, "1");

        let canal = rules.classify("waterway", "canal").unwrap();
        assert_eq!(canal.tier, MatchTier::Wildcard);
        assert_eq!(canal.style, Some("Pen(1,2,3)"));
        assert_eq!(canal.value, "canal");
    }

    #[test]
    fn test_specific_value_falls_back_to_wildcard_overrides() {
        let rules =
            RuleTable::parse("k=\"natural\" iv=\"*\" mif_type=\"Region\" iv=\"coastline\"").unwrap();

        let coastline = rules.classify("natural", "coastline").unwrap();
        assert_eq!(coastline.tier, MatchTier::Specific);
        assert_eq!(coastline.geometry, Some(GeometryType::Region));
    }

    #[test]
    fn test_unlisted_values_and_empty_values_do_not_match() {
        let rules = RuleTable::parse("mk=\"highway\" iv=\"residential\"").unwrap();
        assert!(rules.classify("highway", "motorway").is_none());
        assert!(rules.classify("highway", "").is_none());
        assert!(rules.classify("name", "Main Street").is_none());

        let residential = rules.classify("highway", "residential").unwrap();
        assert!(residential.mandatory);
        assert_eq!(residential.column, "highway");
        assert_eq!(residential.style, None);
    }

    #[test]
    fn test_exclusions() {
        let rules = RuleTable::parse(
            "k=\"route\" ev=\"ferry\" ev=\"ski\"\n\
             k=\"access\" ev=\"*\"\n",
        )
        .unwrap();
        assert!(rules.is_excluded("route", "ferry"));
        assert!(!rules.is_excluded("route", "bus"));
        assert!(rules.is_excluded("access", "private"));
        assert!(!rules.is_excluded("highway", "primary"));
        assert_eq!(rules.column_count(), 0);
    }

    #[test]
    fn test_columns_sorted_with_types() {
        let rules = RuleTable::parse(
            "k=\"oneway\" iv=\"*\" type=\"Integer\"\n\
             mk=\"highway\" iv=\"primary\"\n\
             k=\"name\" iv=\"*\"\n",
        )
        .unwrap();
        let columns: Vec<_> = rules.columns().collect();
        assert_eq!(
            columns,
            vec![
                ("highway", "Char(250)"),
                ("name", "Char(250)"),
                ("oneway", "Integer"),
            ]
        );
        assert!(rules.has_mandatory_keys());
    }

    #[test]
    fn test_bounding_box_and_comments() {
        let rules = RuleTable::parse(
            "// Brussels\n\
             \n\
             min_lon=\"4.2\" max_lon=\"4.5\"\n\
             min_lat=\"50.7\"\n\
             max_lat=\"50.9\" // north edge\n",
        )
        .unwrap();
        let bbox = rules.bounding_box().unwrap();
        assert!(bbox.contains(50.8, 4.3));
        assert!(bbox.contains(50.7, 4.5));
        assert!(!bbox.contains(51.0, 4.3));
        assert!(!bbox.contains(50.8, 4.6));
    }

    #[test]
    fn test_partial_bounding_box_is_open_ended() {
        let rules = RuleTable::parse("min_lat=\"50.0\"").unwrap();
        let bbox = rules.bounding_box().unwrap();
        assert!(bbox.contains(89.0, -170.0));
        assert!(!bbox.contains(49.9, 0.0));
        assert!(RuleTable::parse("").unwrap().bounding_box().is_none());
    }

    #[test]
    fn test_break_up_and_mandatory_merge() {
        let rules = RuleTable::parse(
            "k=\"waterway\" iv=\"river\"\n\
             mk=\"waterway\" break_up=\"no\"\n",
        )
        .unwrap();
        assert!(rules.has_mandatory_keys());
        let class = rules.classify("waterway", "river").unwrap();
        assert!(class.mandatory);
        assert!(class.suppress_breakup);
    }

    #[test]
    fn test_ambiguous_wildcard_is_rejected() {
        let err = RuleTable::parse("k=\"route\" iv=\"*\"\nk=\"route\" ev=\"*\"").unwrap_err();
        assert!(matches!(err, Error::AmbiguousWildcard { ref key } if key == "route"));
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let err = RuleTable::parse("k=\"lanes\" iv=\"*\" type=\"Integer\" type=\"Char(10)\"")
            .unwrap_err();
        assert_eq!(reason(err), "type defined twice for lanes");
    }

    #[test]
    fn test_unrecognised_keys_suggest_corrections() {
        let err = RuleTable::parse("k=\"highway\" iv=\"primary\" styel=\"Pen(1,1,1)\"").unwrap_err();
        assert!(reason(err).contains("did you mean 'style'"));

        let err = RuleTable::parse("min-lon=\"4.0\"").unwrap_err();
        match err {
            Error::RuleSyntax { line, text, reason } => {
                assert_eq!(line, 1);
                assert_eq!(text, "min-lon=\"4.0\"");
                assert!(reason.contains("did you mean 'min_lon'"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(
            reason(RuleTable::parse("k=\"highway").unwrap_err()),
            "missing closing quote"
        );
        assert_eq!(
            reason(RuleTable::parse("k=\"\"").unwrap_err()),
            "empty key or value"
        );
        assert!(reason(RuleTable::parse("k=\"highway\" junk").unwrap_err()).starts_with("expected"));
        assert_eq!(
            reason(RuleTable::parse("min_lon=\"east\"").unwrap_err()),
            "'east' is not a lat/long"
        );
        assert_eq!(
            reason(RuleTable::parse("k=\"highway\" style=\"Pen(1,1,1)\"").unwrap_err()),
            "'style' must follow an iv value"
        );
    }

    #[test]
    fn test_error_reports_line_number() {
        let err = RuleTable::parse("k=\"highway\" iv=\"primary\"\nk=\"name\" iv=\"*\" tpye=\"x\"")
            .unwrap_err();
        assert!(matches!(err, Error::RuleSyntax { line: 2, .. }));
    }

    #[test]
    fn test_geometry_type_from_rule() {
        assert_eq!(GeometryType::from_rule("Region"), GeometryType::Region);
        assert_eq!(GeometryType::from_rule("region"), GeometryType::Region);
        assert_eq!(GeometryType::from_rule("Pline"), GeometryType::Polyline);
        assert_eq!(GeometryType::from_rule("Line"), GeometryType::Polyline);
    }
}
