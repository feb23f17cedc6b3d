//! Line-oriented OpenStreetMap XML element reader
//!
//! OSM XML extracts put one element per line. Each line is read as raw bytes
//! with a hard length limit and tokenised with `quick-xml`, producing typed
//! elements for the two conversion passes. Attribute values are passed through
//! raw (still entity-escaped, invalid UTF-8 replaced); the MID writer decodes
//! the entities it cares about.

use osm2mif_common::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Longest accepted input line, in bytes
pub const MAX_LINE_LENGTH: usize = 100_000;

/// Node position in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Element whose closing tag was read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
    Osm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

impl MemberKind {
    fn from_attr(value: &str) -> Option<Self> {
        match value {
            "node" => Some(MemberKind::Node),
            "way" => Some(MemberKind::Way),
            "relation" => Some(MemberKind::Relation),
            _ => None,
        }
    }
}

/// One element of interest from the input stream
#[derive(Debug, Clone, PartialEq)]
pub enum OsmElement {
    /// `coord` is `None` when the node lacks `lat` or `lon`
    Node { id: i64, coord: Option<Coord> },
    Way { id: i64 },
    NodeRef { node_id: i64 },
    Tag { key: String, value: String },
    Relation { id: i64 },
    Member { kind: MemberKind, ref_id: i64, role: String },
    End(ElementKind),
}

/// Line accounting for one pass over the input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub lines: usize,
    pub skipped_lines: usize,
}

/// Why a line produced no elements
enum LineFailure {
    /// Markup that cannot be tokenised; the line is skipped
    Markup(String),
    /// Malformed field; the run stops
    Fatal(Error),
}

impl From<Error> for LineFailure {
    fn from(err: Error) -> Self {
        LineFailure::Fatal(err)
    }
}

/// Streaming reader over an OSM XML extract
pub struct OsmReader<R> {
    inner: R,
    buf: Vec<u8>,
    stats: ReadStats,
}

impl OsmReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> OsmReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            stats: ReadStats::default(),
        }
    }

    /// Feed every element to `f` until the closing `</osm>` marker.
    ///
    /// An empty or over-long line, or end of input before `</osm>`, is a read
    /// failure. Lines with unparseable markup are skipped and counted.
    pub fn for_each<F>(mut self, mut f: F) -> Result<ReadStats>
    where
        F: FnMut(OsmElement) -> Result<()>,
    {
        let mut elements = Vec::new();
        // Room for the longest line plus its "\r\n" terminator
        let limit = MAX_LINE_LENGTH as u64 + 2;

        loop {
            self.buf.clear();
            let read = self
                .inner
                .by_ref()
                .take(limit)
                .read_until(b'\n', &mut self.buf)?;
            if read == 0 {
                return Err(Error::UnexpectedEof {
                    lines: self.stats.lines,
                });
            }
            self.stats.lines += 1;
            let line_no = self.stats.lines;

            let mut line = self.buf.as_slice();
            while let [rest @ .., b'\n' | b'\r'] = line {
                line = rest;
            }
            if line.is_empty() || line.len() > MAX_LINE_LENGTH {
                return Err(Error::UnreadableLine {
                    line: line_no,
                    max: MAX_LINE_LENGTH,
                });
            }

            elements.clear();
            match parse_line(line, line_no, &mut elements) {
                Ok(()) => {}
                Err(LineFailure::Markup(message)) => {
                    log::warn!("Skipping line {line_no}: {message}");
                    self.stats.skipped_lines += 1;
                    continue;
                }
                Err(LineFailure::Fatal(err)) => return Err(err),
            }

            for element in elements.drain(..) {
                let closes = element == OsmElement::End(ElementKind::Osm);
                f(element)?;
                if closes {
                    return Ok(self.stats);
                }
            }
        }
    }
}

fn parse_line(
    line: &[u8],
    line_no: usize,
    out: &mut Vec<OsmElement>,
) -> std::result::Result<(), LineFailure> {
    let mut reader = Reader::from_reader(line);
    reader.trim_text(true);
    // Elements open and close on different lines
    reader.check_end_names(false);

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return Ok(()),
            Ok(Event::Start(e)) => decode_start(&e, line_no, false, out)?,
            Ok(Event::Empty(e)) => decode_start(&e, line_no, true, out)?,
            Ok(Event::End(e)) => {
                let kind = match e.name().as_ref() {
                    b"node" => ElementKind::Node,
                    b"way" => ElementKind::Way,
                    b"relation" => ElementKind::Relation,
                    b"osm" => ElementKind::Osm,
                    _ => continue,
                };
                out.push(OsmElement::End(kind));
            }
            Ok(_) => {}
            Err(e) => return Err(LineFailure::Markup(e.to_string())),
        }
    }
}

fn decode_start(
    e: &BytesStart<'_>,
    line: usize,
    empty: bool,
    out: &mut Vec<OsmElement>,
) -> std::result::Result<(), LineFailure> {
    match e.name().as_ref() {
        b"node" => {
            let id = parse_id(&required_attr(e, b"id", "node", "id", line)?, line)?;
            let lat = attr_value(e, b"lat")?;
            let lon = attr_value(e, b"lon")?;
            let coord = match (lat, lon) {
                (Some(lat), Some(lon)) => Some(Coord::new(
                    parse_degrees(&lat, line, "a latitude")?,
                    parse_degrees(&lon, line, "a longitude")?,
                )),
                _ => None,
            };
            out.push(OsmElement::Node { id, coord });
            if empty {
                out.push(OsmElement::End(ElementKind::Node));
            }
        }
        b"way" => {
            let id = parse_id(&required_attr(e, b"id", "way", "id", line)?, line)?;
            out.push(OsmElement::Way { id });
            if empty {
                out.push(OsmElement::End(ElementKind::Way));
            }
        }
        b"nd" => {
            let node_id = parse_id(&required_attr(e, b"ref", "nd", "ref", line)?, line)?;
            out.push(OsmElement::NodeRef { node_id });
        }
        b"tag" => {
            if let (Some(key), Some(value)) = (attr_value(e, b"k")?, attr_value(e, b"v")?) {
                out.push(OsmElement::Tag { key, value });
            } else {
                log::trace!("Ignoring incomplete <tag> on line {line}");
            }
        }
        b"relation" => {
            let id = parse_id(&required_attr(e, b"id", "relation", "id", line)?, line)?;
            out.push(OsmElement::Relation { id });
            if empty {
                out.push(OsmElement::End(ElementKind::Relation));
            }
        }
        b"member" => {
            let kind = attr_value(e, b"type")?
                .as_deref()
                .and_then(MemberKind::from_attr);
            let ref_id = parse_id(&required_attr(e, b"ref", "member", "ref", line)?, line)?;
            let role = attr_value(e, b"role")?.unwrap_or_default();
            match kind {
                Some(kind) => out.push(OsmElement::Member { kind, ref_id, role }),
                None => log::trace!("Ignoring <member> of unknown type on line {line}"),
            }
        }
        _ => {}
    }
    Ok(())
}

fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> std::result::Result<Option<String>, LineFailure> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|err| LineFailure::Markup(err.to_string()))?;
        if attr.key.as_ref() == name {
            return Ok(Some(String::from_utf8_lossy(&attr.value).into_owned()));
        }
    }
    Ok(None)
}

fn required_attr(
    e: &BytesStart<'_>,
    name: &[u8],
    element: &'static str,
    attribute: &'static str,
    line: usize,
) -> std::result::Result<String, LineFailure> {
    attr_value(e, name)?.ok_or(LineFailure::Fatal(Error::MissingAttribute {
        line,
        element,
        attribute,
    }))
}

fn parse_id(token: &str, line: usize) -> Result<i64> {
    token.trim().parse().map_err(|_| Error::MalformedField {
        line,
        token: token.to_string(),
        expected: "a numeric ID",
    })
}

fn parse_degrees(token: &str, line: usize, expected: &'static str) -> Result<f64> {
    token
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| Error::MalformedField {
            line,
            token: token.to_string(),
            expected,
        })
}
