//! Response representation negotiation
//!
//! [`negotiate`] picks one of the supported representations from an
//! `Accept` header; [`render`] serializes an [`Envelope`] into it.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;
use std::cmp::Ordering;

use crate::domain::Envelope;
use crate::error::{AppError, Result};

/// Supported response representations, in server preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Json,
    Xml,
    Yaml,
    Text,
}

impl Representation {
    pub const OFFERS: [Representation; 4] = [
        Representation::Json,
        Representation::Xml,
        Representation::Yaml,
        Representation::Text,
    ];

    /// Media types that select this representation
    pub fn media_types(self) -> &'static [&'static str] {
        match self {
            Representation::Json => &["application/json"],
            Representation::Xml => &["application/xml", "text/xml"],
            Representation::Yaml => &["text/yaml", "application/yaml", "application/x-yaml"],
            Representation::Text => &["text/plain"],
        }
    }

    /// `Content-Type` of the rendered body. Text is served as YAML.
    pub fn content_type(self) -> &'static str {
        match self {
            Representation::Json => "application/json",
            Representation::Xml => "application/xml; charset=utf-8",
            Representation::Yaml | Representation::Text => "text/yaml; charset=utf-8",
        }
    }
}

/// One media range from an `Accept` header
#[derive(Debug, Clone, PartialEq)]
struct MediaRange {
    kind: String,
    subtype: String,
    q: f32,
    index: usize,
}

impl MediaRange {
    fn parse(item: &str, index: usize) -> Option<Self> {
        let mut params = item.split(';');
        let (kind, subtype) = params.next()?.trim().split_once('/')?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut q = 1.0;
        for param in params {
            if let Some((name, value)) = param.split_once('=') {
                if name.trim().eq_ignore_ascii_case("q") {
                    q = value.trim().parse::<f32>().ok()?.clamp(0.0, 1.0);
                }
            }
        }

        Some(Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            q,
            index,
        })
    }

    /// Specificity of a match against `media_type`, if it matches at all
    fn specificity(&self, media_type: &str) -> Option<u8> {
        let (kind, subtype) = media_type.split_once('/')?;
        match (self.kind.as_str(), self.subtype.as_str()) {
            ("*", "*") => Some(0),
            (k, "*") if k == kind => Some(1),
            (k, s) if k == kind && s == subtype => Some(2),
            _ => None,
        }
    }
}

fn parse_accept(header: &str) -> Vec<MediaRange> {
    header
        .split(',')
        .enumerate()
        .filter_map(|(i, item)| MediaRange::parse(item, i))
        .collect()
}

/// A candidate representation with the range that selected it
struct Candidate {
    representation: Representation,
    q: f32,
    specificity: u8,
    index: usize,
    offer: usize,
}

impl Candidate {
    fn cmp_preference(&self, other: &Self) -> Ordering {
        other
            .q
            .partial_cmp(&self.q)
            .unwrap_or(Ordering::Equal)
            .then(other.specificity.cmp(&self.specificity))
            .then(self.index.cmp(&other.index))
            .then(self.offer.cmp(&other.offer))
    }
}

/// Choose a representation for an `Accept` header.
///
/// A missing or blank header selects JSON. A header that matches none of
/// the offers is `NotAcceptable`.
pub fn negotiate(accept: Option<&str>) -> Result<Representation> {
    let Some(accept) = accept.filter(|h| !h.trim().is_empty()) else {
        return Ok(Representation::Json);
    };

    let ranges = parse_accept(accept);
    let offers = Representation::OFFERS
        .iter()
        .flat_map(|r| r.media_types().iter().map(move |m| (*r, *m)));

    let mut candidates: Vec<Candidate> = offers
        .enumerate()
        .filter_map(|(offer, (representation, media_type))| {
            // Most specific matching range decides the quality
            ranges
                .iter()
                .filter_map(|range| range.specificity(media_type).map(|s| (range, s)))
                .max_by(|(a, sa), (b, sb)| sa.cmp(sb).then(b.index.cmp(&a.index)))
                .map(|(range, specificity)| Candidate {
                    representation,
                    q: range.q,
                    specificity,
                    index: range.index,
                    offer,
                })
        })
        .filter(|c| c.q > 0.0)
        .collect();

    candidates.sort_by(Candidate::cmp_preference);
    candidates
        .first()
        .map(|c| c.representation)
        .ok_or_else(|| AppError::NotAcceptable("Not acceptable".to_string()))
}

/// Serialize an envelope body into the chosen representation
pub fn render(representation: Representation, envelope: &Envelope) -> Result<Vec<u8>> {
    let rendered = match representation {
        Representation::Json => serde_json::to_vec(envelope.body()).map_err(anyhow::Error::from),
        Representation::Xml => to_xml(envelope.root(), envelope.body()),
        Representation::Yaml | Representation::Text => serde_yaml::to_string(envelope.body())
            .map(String::into_bytes)
            .map_err(anyhow::Error::from),
    };
    rendered.map_err(AppError::Internal)
}

/// XML document with `root` as its document element
pub fn to_xml(root: &str, body: &Value) -> anyhow::Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_element(&mut writer, &xml_name(root), body)?;
    Ok(writer.into_inner())
}

/// Object fields become child elements; an array field repeats its element.
fn write_field(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> anyhow::Result<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
            Ok(())
        }
        _ => write_element(writer, name, value),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> anyhow::Result<()> {
    let text = match value {
        Value::Null => {
            writer.write_event(Event::Empty(BytesStart::new(name)))?;
            return Ok(());
        }
        Value::Object(map) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            for (key, child) in map {
                write_field(writer, &xml_name(key), child)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
            return Ok(());
        }
        Value::Array(items) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            for item in items {
                write_element(writer, "item", item)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
            return Ok(());
        }
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
    };

    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(&text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Coerce a key into a valid XML element name
pub fn xml_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match name.chars().next() {
        None => name.push('_'),
        Some(first) if !(first.is_alphabetic() || first == '_') => name.insert(0, '_'),
        _ => {}
    }
    name
}
