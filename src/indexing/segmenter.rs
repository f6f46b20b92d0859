use crate::core::error::Error;
use chrono::TimeZone;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four segment granularities, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// The whole document for one calendar day
    Day,
    /// A top-level (`#`) heading block
    Memory,
    /// A second-level (`##`) heading block
    Section,
    /// A single quoted (`>`) line
    Line,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Day,
        Granularity::Memory,
        Granularity::Section,
        Granularity::Line,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Memory => "memory",
            Granularity::Section => "section",
            Granularity::Line => "line",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Granularity::Day),
            "memory" => Ok(Granularity::Memory),
            "section" => Ok(Granularity::Section),
            "line" => Ok(Granularity::Line),
            other => Err(Error::Validation(format!(
                "Invalid mode '{}'. Choose from 'day', 'memory', 'section', 'line'.",
                other
            ))),
        }
    }
}

/// A segment as produced by the segmenter, before it is attributed to a
/// source file and date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSegment {
    pub text: String,
    pub title: Option<String>,
    pub parent_memory: Option<String>,
    pub parent_section: Option<String>,
}

/// The four ordered segment sequences extracted from one document.
#[derive(Debug, Clone, Default)]
pub struct SegmentedDocument {
    pub day: Vec<RawSegment>,
    pub memory: Vec<RawSegment>,
    pub section: Vec<RawSegment>,
    pub line: Vec<RawSegment>,
}

impl SegmentedDocument {
    pub fn get(&self, granularity: Granularity) -> &[RawSegment] {
        match granularity {
            Granularity::Day => &self.day,
            Granularity::Memory => &self.memory,
            Granularity::Section => &self.section,
            Granularity::Line => &self.line,
        }
    }
}

static END_MS: Lazy<Regex> = Lazy::new(|| Regex::new(r"&endMs=\d{13}").unwrap());
static START_MS: Lazy<Regex> = Lazy::new(|| Regex::new(r"#?startMs\s*[:=]\s*(\d{13})").unwrap());

/// Rewrite millisecond-epoch timestamp markers into human-readable local
/// datetimes and drop end-of-range markers.
///
/// Idempotent: the rewritten form contains no 13-digit run, so text that has
/// already been normalized passes through unchanged.
pub fn normalize_timestamps(text: &str, tz: Tz) -> String {
    let stripped = END_MS.replace_all(text, "");
    START_MS
        .replace_all(&stripped, |caps: &Captures| {
            let Ok(ms) = caps[1].parse::<i64>() else {
                return caps[0].to_string();
            };
            match chrono::Utc.timestamp_millis_opt(ms).single() {
                Some(dt) => dt
                    .with_timezone(&tz)
                    .format("%Y-%m-%d %H:%M:%S%.3f")
                    .to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Segment a document into the four granularities in a single forward pass.
///
/// `# ` opens a memory, `## ` opens a section, `>` records a line segment
/// immediately. Memory accumulators keep nested section headings and quoted
/// lines in raw form; the day view keeps everything except `# ` heading
/// lines, with markers stripped.
pub fn segment_document(content: &str, include_titles: bool) -> SegmentedDocument {
    let mut doc = SegmentedDocument::default();

    let mut day_lines: Vec<String> = Vec::new();
    let mut mem_title: Option<String> = None;
    let mut mem_lines: Vec<String> = Vec::new();
    let mut sec_title: Option<String> = None;
    let mut sec_lines: Vec<String> = Vec::new();

    for line in content.lines() {
        if let Some(title) = line.strip_prefix("# ") {
            flush_section(
                &mut doc,
                &mut sec_title,
                &mut sec_lines,
                mem_title.as_deref(),
                include_titles,
            );
            flush_memory(&mut doc, &mut mem_title, &mut mem_lines, include_titles);
            mem_title = Some(title.trim().to_string());
        } else if let Some(title) = line.strip_prefix("## ") {
            day_lines.push(title.trim().to_string());
            flush_section(
                &mut doc,
                &mut sec_title,
                &mut sec_lines,
                mem_title.as_deref(),
                include_titles,
            );
            sec_title = Some(title.trim().to_string());
            if mem_title.is_some() {
                // Blank line before the nested heading inside the memory body
                mem_lines.push(String::new());
                mem_lines.push(line.to_string());
            }
        } else if let Some(rest) = line.strip_prefix('>') {
            let text = rest.trim().to_string();
            day_lines.push(text.clone());
            if !text.is_empty() {
                doc.line.push(RawSegment {
                    text,
                    title: None,
                    parent_memory: mem_title.clone(),
                    parent_section: sec_title.clone(),
                });
            }
            if sec_title.is_some() {
                sec_lines.push(line.to_string());
                mem_lines.push(line.to_string());
            } else if mem_title.is_some() {
                mem_lines.push(line.to_string());
            }
        } else {
            day_lines.push(line.to_string());
            if sec_title.is_some() {
                sec_lines.push(line.to_string());
                mem_lines.push(line.to_string());
            } else if mem_title.is_some() {
                mem_lines.push(line.to_string());
            }
        }
    }

    flush_section(
        &mut doc,
        &mut sec_title,
        &mut sec_lines,
        mem_title.as_deref(),
        include_titles,
    );
    flush_memory(&mut doc, &mut mem_title, &mut mem_lines, include_titles);

    let day_text = day_lines.join("\n").trim().to_string();
    if !day_text.is_empty() {
        doc.day.push(RawSegment {
            text: day_text,
            title: None,
            parent_memory: None,
            parent_section: None,
        });
    }

    doc
}

/// Close the open section, emitting a segment only if its body is non-empty.
fn flush_section(
    doc: &mut SegmentedDocument,
    title: &mut Option<String>,
    lines: &mut Vec<String>,
    parent_memory: Option<&str>,
    include_titles: bool,
) {
    let Some(t) = title.take() else {
        lines.clear();
        return;
    };
    let body = lines.join("\n").trim().to_string();
    lines.clear();
    if body.is_empty() {
        return;
    }
    let text = if include_titles {
        format!("## {}\n{}", t, body)
    } else {
        body
    };
    doc.section.push(RawSegment {
        text,
        title: Some(t),
        parent_memory: parent_memory.map(str::to_string),
        parent_section: None,
    });
}

/// Close the open memory, emitting a segment only if its body is non-empty.
fn flush_memory(
    doc: &mut SegmentedDocument,
    title: &mut Option<String>,
    lines: &mut Vec<String>,
    include_titles: bool,
) {
    let Some(t) = title.take() else {
        lines.clear();
        return;
    };
    let body = lines.join("\n").trim().to_string();
    lines.clear();
    if body.is_empty() {
        return;
    }
    let text = if include_titles {
        format!("# {}\n{}", t, body)
    } else {
        body
    };
    doc.memory.push(RawSegment {
        text,
        title: Some(t),
        parent_memory: None,
        parent_section: None,
    });
}
