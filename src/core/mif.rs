//! MapInfo interchange writer
//!
//! Every record produces one geometry block in the `.mif` file and one
//! attribute row in the `.mid` file, in the same order.

use crate::core::rules::{GeometryType, RuleTable};
use crate::core::source::Coord;
use osm2mif_common::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Style used when no matched rule declares one
pub const DEFAULT_STYLE: &str = "Pen (2,54,32768)";

/// Records between two flushes of the output buffers
pub const FLUSH_INTERVAL: usize = 10_000;

const RESTRICTIONS_COLUMN: &str = "Restrictions Char(250)";

/// One geometry plus its attribute row
#[derive(Debug)]
pub struct Record<'a> {
    pub geometry: GeometryType,
    pub coords: &'a [Coord],
    pub style: &'a str,
    /// One value per rule column, in column order
    pub values: Vec<&'a str>,
    /// `;`-joined banned to-way ids
    pub restrictions: &'a str,
}

/// `<base>.<extension>`, appended to the base name as given
pub fn output_path(base: &Path, extension: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// Paired `.mif` / `.mid` writer
pub struct MifWriter<W: Write> {
    mif: W,
    mid: W,
    restrictions: bool,
    records: usize,
}

impl MifWriter<BufWriter<File>> {
    /// Create `<base>.mif` and `<base>.mid` and write the header
    pub fn create(base: &Path, rules: &RuleTable, restrictions: bool) -> Result<Self> {
        let open = |extension: &str| {
            let path = output_path(base, extension);
            File::create(&path)
                .map(BufWriter::new)
                .map_err(|source| Error::Open { path, source })
        };
        Self::new(open("mif")?, open("mid")?, rules, restrictions)
    }
}

impl<W: Write> MifWriter<W> {
    pub fn new(mut mif: W, mid: W, rules: &RuleTable, restrictions: bool) -> Result<Self> {
        writeln!(mif, "Version 300")?;
        writeln!(mif, "Charset \"Neutral\"")?;
        writeln!(mif, "Delimiter \",\"")?;
        writeln!(
            mif,
            "CoordSys Earth Projection 1, 74 Bounds (-1000, -1000) (1000, 1000)"
        )?;
        writeln!(
            mif,
            "Columns {}",
            rules.column_count() + usize::from(restrictions)
        )?;
        for (name, column_type) in rules.columns() {
            writeln!(mif, "    {name} {column_type}")?;
        }
        if restrictions {
            writeln!(mif, "    {RESTRICTIONS_COLUMN}")?;
        }
        writeln!(mif, "Data")?;

        Ok(Self {
            mif,
            mid,
            restrictions,
            records: 0,
        })
    }

    pub fn write_record(&mut self, record: &Record<'_>) -> Result<()> {
        match record.geometry {
            GeometryType::Region => {
                writeln!(self.mif, "Region 1")?;
                writeln!(self.mif, "  {}", record.coords.len())?;
            }
            GeometryType::Polyline => writeln!(self.mif, "Pline {}", record.coords.len())?,
        }
        for coord in record.coords {
            writeln!(
                self.mif,
                "{} {}",
                format_coordinate(coord.lon),
                format_coordinate(coord.lat)
            )?;
        }
        writeln!(self.mif, "\t{}", record.style)?;

        let mut fields: Vec<String> = record
            .values
            .iter()
            .map(|value| format!("\"{}\"", unescape_entities(value)))
            .collect();
        if self.restrictions {
            fields.push(format!("\"{}\"", record.restrictions));
        }
        writeln!(self.mid, "{}", fields.join(","))?;

        self.records += 1;
        if self.records % FLUSH_INTERVAL == 0 {
            self.flush()?;
        }
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records
    }

    pub fn flush(&mut self) -> Result<()> {
        self.mif.flush()?;
        self.mid.flush()?;
        Ok(())
    }

    /// Flush both outputs and hand back the underlying writers
    pub fn finish(mut self) -> Result<(W, W)> {
        self.flush()?;
        Ok((self.mif, self.mid))
    }
}

/// Decode the two entities MapInfo cannot show
pub fn unescape_entities(value: &str) -> String {
    value.replace("&apos;", "'").replace("&amp;", "&")
}

/// Format like C's `%.15g`: 15 significant digits, trailing zeros trimmed,
/// scientific notation for very small or very large magnitudes.
pub fn format_coordinate(value: f64) -> String {
    const PRECISION: i32 = 15;

    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }

    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}
