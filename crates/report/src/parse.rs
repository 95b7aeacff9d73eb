//! Splitting model output into named sections

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

use crate::sections::SectionName;

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(#{1,6})[ \t]+(.+?)[ \t#]*$").expect("heading pattern is valid")
    })
}

fn underline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ {0,3}(=+|-+)[ \t]*$").expect("underline pattern is valid"))
}

/// Opening or closing code fence: the marker character and run length
fn fence(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.chars().take_while(|c| *c == marker).count();
    (run >= 3).then_some((marker, run))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Line<'a> {
    Text,
    /// ATX or setext heading: level and heading text
    Heading(usize, &'a str),
    /// The `===` or `---` line under a setext heading
    Underline,
}

/// Could this line be the text of a setext heading?
fn setext_candidate(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && !line.starts_with("    ")
        && !line.starts_with('\t')
        && !trimmed.starts_with(['-', '*', '+', '>', '|'])
        && !trimmed.starts_with(|c: char| c.is_ascii_digit())
}

/// Classify every line, skipping anything inside ``` or ~~~ fences.
///
/// A setext heading is only recognised for a single line of text that
/// follows a blank line, a heading or the start of the input.
fn classify<'a>(lines: &[&'a str]) -> Vec<Line<'a>> {
    let mut out = vec![Line::Text; lines.len()];
    let mut open: Option<(char, usize)> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if let Some((marker, run)) = fence(line) {
            open = match open {
                None => Some((marker, run)),
                Some((m, r)) if m == marker && run >= r => None,
                still_open => still_open,
            };
            i += 1;
            continue;
        }
        if open.is_some() {
            i += 1;
            continue;
        }

        if let Some(c) = heading_re().captures(line.trim_end()) {
            let text = c.get(2).map_or("", |m| m.as_str());
            out[i] = Line::Heading(c[1].len(), text);
            i += 1;
            continue;
        }

        let after_break = i == 0 || lines[i - 1].trim().is_empty() || out[i - 1] != Line::Text;
        let underline = lines
            .get(i + 1)
            .and_then(|next| underline_re().captures(next))
            .map(|c| if c[1].starts_with('=') { 1 } else { 2 });
        if let Some(level) = underline.filter(|_| after_break && setext_candidate(line)) {
            out[i] = Line::Heading(level, line.trim());
            out[i + 1] = Line::Underline;
            i += 2;
            continue;
        }
        i += 1;
    }

    out
}

fn flush(current: Option<(SectionName, Vec<&str>)>, sections: &mut BTreeMap<SectionName, String>) {
    if let Some((name, lines)) = current {
        if sections.contains_key(&name) {
            debug!("Ignoring repeated section {}", name);
        } else {
            sections.insert(name, lines.join("\n").trim().to_string());
        }
    }
}

/// Split markdown at headings that name a known section.
///
/// Both `#`..`###` headings and setext headings (text underlined with
/// `===` or `---`) split. Text under a heading that is not a known section
/// stays with the section before it. Text before the first known heading
/// (titles, preambles) is dropped. When a section appears twice the first
/// occurrence wins.
pub fn split_sections(markdown: &str) -> BTreeMap<SectionName, String> {
    let lines: Vec<&str> = markdown.lines().collect();
    let kinds = classify(&lines);
    let mut sections: BTreeMap<SectionName, String> = BTreeMap::new();
    let mut current: Option<(SectionName, Vec<&str>)> = None;
    let mut started = false;

    for (line, kind) in lines.iter().zip(kinds) {
        let known = match kind {
            Line::Heading(level, text) if level <= 3 => SectionName::from_heading(text),
            Line::Underline if started => continue,
            _ => None,
        };
        started = known.is_some();

        match known {
            Some(name) => {
                flush(current.take(), &mut sections);
                current = Some((name, Vec::new()));
            }
            None => {
                if let Some((_, lines)) = current.as_mut() {
                    lines.push(*line);
                }
            }
        }
    }
    flush(current, &mut sections);

    sections
}

/// Push `#` and `##` headings inside a section body down to `###`, so the
/// report's own headings stay unique. Setext headings are rewritten the
/// same way and lose their underline.
pub fn demote_headings(body: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    lines
        .iter()
        .zip(classify(&lines))
        .filter(|(_, kind)| *kind != Line::Underline)
        .map(|(line, kind)| match kind {
            Line::Heading(level, text) if level <= 2 => format!("### {}", text),
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
