//! Per-way rule application for the second pass

use crate::core::rules::{GeometryType, MatchTier, RuleTable};
use std::collections::{BTreeMap, HashMap};

/// Rule key that is filled with the way id before any tag is seen
const ID_COLUMN: &str = "id";

/// Outcome of applying the rule table to every tag of a way
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// At least one tag hit the exclusion table
    Excluded,
    /// No tag matched an inclusion rule
    NoMatch,
    /// Mandatory keys exist but none of them matched
    MissingMandatory,
}

/// Attribute accumulator for the way being read
#[derive(Debug)]
pub struct WayAttributes<'r> {
    rules: &'r RuleTable,
    values: BTreeMap<&'r str, String>,
    tiers: HashMap<&'r str, MatchTier>,
    style: Option<&'r str>,
    geometry: Option<GeometryType>,
    excluded: bool,
    matched: bool,
    mandatory_matched: bool,
    suppress_breakup: bool,
}

impl<'r> WayAttributes<'r> {
    pub fn new(rules: &'r RuleTable, way_id: i64) -> Self {
        let values = rules
            .columns()
            .map(|(name, _)| {
                let value = if name == ID_COLUMN {
                    way_id.to_string()
                } else {
                    String::new()
                };
                (name, value)
            })
            .collect();

        Self {
            rules,
            values,
            tiers: HashMap::new(),
            style: None,
            geometry: None,
            excluded: false,
            matched: false,
            mandatory_matched: false,
            suppress_breakup: false,
        }
    }

    pub fn apply_tag(&mut self, key: &str, value: &str) {
        let rules = self.rules;
        if rules.is_excluded(key, value) {
            self.excluded = true;
            return;
        }
        let Some(class) = rules.classify(key, value) else {
            return;
        };

        // An enumerated value is never displaced by a later wildcard match
        if self
            .tiers
            .get(class.column)
            .is_some_and(|&earlier| earlier > class.tier)
        {
            return;
        }
        self.tiers.insert(class.column, class.tier);
        self.values.insert(class.column, class.value);

        if let Some(style) = class.style {
            self.style = Some(style);
        }
        if let Some(geometry) = class.geometry {
            self.geometry = Some(geometry);
        }
        self.matched = true;
        self.mandatory_matched |= class.mandatory;
        self.suppress_breakup |= class.suppress_breakup;
    }

    pub fn verdict(&self) -> Verdict {
        if self.excluded {
            Verdict::Excluded
        } else if !self.matched {
            Verdict::NoMatch
        } else if self.rules.has_mandatory_keys() && !self.mandatory_matched {
            Verdict::MissingMandatory
        } else {
            Verdict::Accepted
        }
    }

    /// Column values in column order
    pub fn column_values(&self) -> impl Iterator<Item = &str> {
        self.values.values().map(String::as_str)
    }

    pub fn style(&self) -> Option<&'r str> {
        self.style
    }

    pub fn geometry(&self) -> GeometryType {
        self.geometry.unwrap_or_default()
    }

    /// Whether the way is cut at shared nodes
    pub fn breakup(&self) -> bool {
        !self.suppress_breakup
    }
}
