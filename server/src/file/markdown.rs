//! Read-side markdown helpers: heading structure, section extraction, tail
//! queries, frontmatter. Content is stored as opaque bytes; parsing only ever
//! happens on the read path.

use serde::Serialize;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
	pub level: u8,
	pub text: String,
	/// 1-based line number
	pub line: usize,
}

/// Scan ATX headings (`#`..`######` at the start of a line, followed by a
/// space). Setext headings and indented hashes are not recognized.
pub fn structure(content: &str) -> Vec<Heading> {
	let mut headings = Vec::new();
	for (idx, line) in content.lines().enumerate() {
		if let Some(heading) = parse_heading(line, idx + 1) {
			headings.push(heading);
		}
	}
	headings
}

fn parse_heading(line: &str, line_no: usize) -> Option<Heading> {
	let hashes = line.bytes().take_while(|b| *b == b'#').count();
	if hashes == 0 || hashes > 6 {
		return None;
	}
	let rest = &line[hashes..];
	let text = rest.strip_prefix(' ')?;
	// tolerate closing hashes: "## Title ##"
	let text = text.trim().trim_end_matches('#').trim_end();
	Some(Heading { level: hashes as u8, text: text.to_string(), line: line_no })
}

#[derive(Debug, Serialize)]
pub struct Section {
	pub heading: String,
	pub level: u8,
	pub content: String,
	#[serde(rename = "startLine")]
	pub start_line: usize,
	#[serde(rename = "endLine")]
	pub end_line: usize,
}

/// Extract the section under the heading whose text matches exactly. The
/// section runs from the heading line to just before the next heading of
/// equal or shallower level (nested deeper headings stay inside), or EOF.
pub fn section(content: &str, heading: &str) -> ApiResult<Section> {
	let lines: Vec<&str> = content.lines().collect();

	let mut start: Option<(usize, u8)> = None;
	for (idx, line) in lines.iter().enumerate() {
		if let Some(h) = parse_heading(line, idx + 1) {
			match start {
				None => {
					if h.text == heading {
						start = Some((idx, h.level));
					}
				}
				Some((start_idx, level)) => {
					if h.level <= level {
						return Ok(build_section(&lines, heading, level, start_idx, idx));
					}
				}
			}
		}
	}

	match start {
		Some((start_idx, level)) => {
			Ok(build_section(&lines, heading, level, start_idx, lines.len()))
		}
		None => Err(Error::SectionNotFound),
	}
}

fn build_section(
	lines: &[&str],
	heading: &str,
	level: u8,
	start_idx: usize,
	end_idx: usize,
) -> Section {
	Section {
		heading: heading.to_string(),
		level,
		content: lines[start_idx..end_idx].join("\n"),
		start_line: start_idx + 1,
		end_line: end_idx,
	}
}

#[derive(Debug, Serialize)]
pub struct Tail {
	pub content: String,
	#[serde(rename = "bytesReturned")]
	pub bytes_returned: usize,
	pub truncated: bool,
}

/// Last N lines of the content
pub fn tail_lines(content: &str, n: usize) -> Tail {
	let lines: Vec<&str> = content.lines().collect();
	let truncated = n < lines.len();
	let start = lines.len().saturating_sub(n);
	let tail = lines[start..].join("\n");
	Tail { bytes_returned: tail.len(), content: tail, truncated }
}

/// Last M bytes of the content, snapped forward to a char boundary
pub fn tail_bytes(content: &str, m: usize) -> Tail {
	if m >= content.len() {
		return Tail { content: content.to_string(), bytes_returned: content.len(), truncated: false };
	}
	let mut start = content.len() - m;
	while !content.is_char_boundary(start) {
		start += 1;
	}
	let tail = &content[start..];
	Tail { content: tail.to_string(), bytes_returned: tail.len(), truncated: true }
}

/// Parse a leading YAML frontmatter block (`---` fences) into JSON.
/// Unparseable frontmatter is treated as absent; the read surface never
/// fails on document content.
pub fn frontmatter(content: &str) -> Option<serde_json::Value> {
	let rest = content.strip_prefix("---\n").or_else(|| content.strip_prefix("---\r\n"))?;
	let end = rest.find("\n---").map(|idx| idx + 1)?;
	let yaml = &rest[..end - 1];
	let parsed: serde_yaml::Value = serde_yaml::from_str(yaml).ok()?;
	serde_json::to_value(parsed).ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	const DOC: &str = "## Section A\n\nContent A\n\n### Nested\n\nDeep\n\n## Section B\n\nContent B";

	#[test]
	fn structure_finds_atx_headings_with_lines() {
		let headings = structure(DOC);
		assert_eq!(
			headings,
			vec![
				Heading { level: 2, text: "Section A".into(), line: 1 },
				Heading { level: 3, text: "Nested".into(), line: 5 },
				Heading { level: 2, text: "Section B".into(), line: 9 },
			]
		);
	}

	#[test]
	fn structure_ignores_non_headings() {
		let headings = structure("#nospace\n####### toodeep\n # indented\ntext # inline");
		assert!(headings.is_empty());
	}

	#[test]
	fn section_includes_nested_and_stops_at_sibling() {
		let section = section(DOC, "Section A").unwrap();
		assert_eq!(section.level, 2);
		assert!(section.content.contains("Content A"));
		assert!(section.content.contains("Nested"));
		assert!(!section.content.contains("Section B"));
		assert_eq!(section.start_line, 1);
	}

	#[test]
	fn section_runs_to_eof() {
		let section = section(DOC, "Section B").unwrap();
		assert!(section.content.contains("Content B"));
	}

	#[test]
	fn missing_section_errors() {
		assert!(matches!(section(DOC, "Nope"), Err(Error::SectionNotFound)));
	}

	#[test]
	fn tail_by_lines() {
		let tail = tail_lines("a\nb\nc\nd", 2);
		assert_eq!(tail.content, "c\nd");
		assert!(tail.truncated);
		let all = tail_lines("a\nb", 10);
		assert!(!all.truncated);
	}

	#[test]
	fn tail_by_bytes_respects_char_boundaries() {
		let tail = tail_bytes("héllo wörld", 4);
		assert!(tail.bytes_returned <= 4);
		assert!(tail.content.is_char_boundary(0));
		let all = tail_bytes("abc", 100);
		assert_eq!(all.content, "abc");
		assert!(!all.truncated);
	}

	#[test]
	fn frontmatter_parses_yaml_block() {
		let doc = "---\ntitle: Test\nlabels:\n  - a\n  - b\n---\n\n# Body";
		let fm = frontmatter(doc).unwrap();
		assert_eq!(fm["title"], "Test");
		assert_eq!(fm["labels"][1], "b");
	}

	#[test]
	fn missing_or_broken_frontmatter_is_none() {
		assert!(frontmatter("# Just a doc").is_none());
		assert!(frontmatter("---\n: : :\n---\n").is_none());
	}
}

// vim: ts=4
