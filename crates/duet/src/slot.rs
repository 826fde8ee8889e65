//! Framed entries stored in an agent's slot file.
//!
//! Each entry starts with a frame comment recording the exact byte length of
//! its content, so the reader skips bodies instead of scanning them. Text in
//! a body that looks like a header is never taken as one.

use crate::agent::Tag;

const FRAME_PREFIX: &str = "<!-- entry bytes=";
const FRAME_SUFFIX: &str = " -->";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    pub tag: Tag,
    pub round: u32,
    pub step: String,
    pub updated: String,
    pub summary: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotLog {
    entries: Vec<SlotEntry>,
}

impl SlotLog {
    pub fn entries(&self) -> &[SlotEntry] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&SlotEntry> {
        self.entries.last()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry and drop the oldest ones beyond `capacity`.
    pub fn push(&mut self, entry: SlotEntry, capacity: usize) {
        self.entries.push(entry);
        let excess = self.entries.len().saturating_sub(capacity.max(1));
        self.entries.drain(..excess);
    }

    pub fn render(&self, title: &str, placeholder: &str) -> String {
        let mut out = format!("# {title}\n\n");
        if self.entries.is_empty() {
            out.push_str(placeholder);
            out.push('\n');
            return out;
        }
        for entry in &self.entries {
            out.push_str(&format!(
                "{FRAME_PREFIX}{}{FRAME_SUFFIX}\n## [{}] Round {} | Step: {}\n**Updated**: {}\n**Summary**: {}\n\n",
                entry.content.len(),
                entry.tag,
                entry.round,
                entry.step,
                entry.updated,
                entry.summary,
            ));
            out.push_str(&entry.content);
            out.push_str("\n\n");
        }
        out
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut entries = Vec::new();
        let Some(start) = raw.find(FRAME_PREFIX) else {
            return Ok(Self { entries });
        };
        let mut rest = &raw[start..];
        loop {
            rest = rest.trim_start_matches(['\n', '\r', ' ', '\t']);
            if rest.is_empty() {
                break;
            }
            let (entry, remaining) = parse_entry(rest)?;
            entries.push(entry);
            rest = remaining;
        }
        Ok(Self { entries })
    }
}

fn parse_entry(input: &str) -> Result<(SlotEntry, &str), String> {
    let (frame, rest) = take_line(input)?;
    let len: usize = frame
        .strip_prefix(FRAME_PREFIX)
        .and_then(|s| s.strip_suffix(FRAME_SUFFIX))
        .ok_or_else(|| format!("expected entry frame, found '{frame}'"))?
        .parse()
        .map_err(|_| format!("bad length in entry frame '{frame}'"))?;

    let (header, rest) = take_line(rest)?;
    let (tag, round, step) = parse_header(header)?;

    let (updated, rest) = take_line(rest)?;
    let updated = updated
        .strip_prefix("**Updated**: ")
        .ok_or("missing **Updated** line")?;

    let (summary, rest) = take_line(rest)?;
    let summary = summary
        .strip_prefix("**Summary**:")
        .ok_or("missing **Summary** line")?
        .trim_start();

    let (blank, rest) = take_line(rest)?;
    if !blank.is_empty() {
        return Err("missing blank line before entry content".to_string());
    }

    let content = rest
        .get(..len)
        .ok_or_else(|| format!("entry content shorter than {len} bytes"))?;

    Ok((
        SlotEntry {
            tag,
            round,
            step: step.to_string(),
            updated: updated.to_string(),
            summary: summary.to_string(),
            content: content.to_string(),
        },
        &rest[len..],
    ))
}

/// Parse `## [TAG] Round N | Step: S`.
fn parse_header(line: &str) -> Result<(Tag, u32, &str), String> {
    let bad = || format!("malformed entry header '{line}'");
    let rest = line.strip_prefix("## [").ok_or_else(bad)?;
    let (tag, rest) = rest.split_once("] Round ").ok_or_else(bad)?;
    let tag = Tag::parse(tag).ok_or_else(|| format!("unknown tag '{tag}' in entry header"))?;
    let (round, step) = rest.split_once(" | Step: ").ok_or_else(bad)?;
    let round = round.parse().map_err(|_| bad())?;
    Ok((tag, round, step))
}

fn take_line(input: &str) -> Result<(&str, &str), String> {
    match input.split_once('\n') {
        Some((line, rest)) => Ok((line.trim_end_matches('\r'), rest)),
        None => Err("unexpected end of slot file".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: Tag, round: u32, content: &str) -> SlotEntry {
        SlotEntry {
            tag,
            round,
            step: "planning".to_string(),
            updated: "2025-01-01 10:00:00".to_string(),
            summary: "summary".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn empty_file_has_no_entries() {
        let log = SlotLog::parse("# Author Work\n\n(Waiting for the author)\n").expect("parse");
        assert!(log.is_empty());
        assert_eq!(log.latest(), None);
    }

    #[test]
    fn render_then_parse_keeps_entries() {
        let mut log = SlotLog::default();
        log.push(entry(Tag::Pass, 1, "[PASS] ok\n\nlooks right"), 3);
        log.push(entry(Tag::NeedsWork, 2, "[NEEDS_WORK] no\n\nmissing tests"), 3);
        let text = log.render("Reviewer Feedback", "(empty)");
        let parsed = SlotLog::parse(&text).expect("parse");
        assert_eq!(parsed, log);
        assert_eq!(parsed.latest().map(|e| e.tag), Some(Tag::NeedsWork));
    }

    #[test]
    fn header_lookalikes_in_body_are_ignored() {
        let body = "[PLAN] tricky\n\n<!-- entry bytes=3 -->\n## [CONSENSUS] Round 9 | Step: x\n[CONSENSUS]";
        let mut log = SlotLog::default();
        log.push(entry(Tag::Plan, 1, body), 1);
        let parsed = SlotLog::parse(&log.render("Author Work", "")).expect("parse");
        assert_eq!(parsed.entries().len(), 1);
        assert_eq!(parsed.latest().map(|e| e.tag), Some(Tag::Plan));
        assert_eq!(parsed.latest().map(|e| e.content.as_str()), Some(body));
    }

    #[test]
    fn push_drops_oldest_beyond_capacity() {
        let mut log = SlotLog::default();
        for round in 1..=4 {
            log.push(entry(Tag::Pass, round, "[PASS] x\nwhy"), 3);
        }
        let rounds: Vec<u32> = log.entries().iter().map(|e| e.round).collect();
        assert_eq!(rounds, vec![2, 3, 4]);
    }

    #[test]
    fn multibyte_content_is_measured_in_bytes() {
        let mut log = SlotLog::default();
        log.push(entry(Tag::Research, 1, "[RESEARCH] 参考实现\n关键类型"), 1);
        let parsed = SlotLog::parse(&log.render("Author Work", "")).expect("parse");
        assert_eq!(parsed, log);
    }

    #[test]
    fn truncated_content_is_an_error() {
        let text = "# T\n\n<!-- entry bytes=50 -->\n## [PLAN] Round 1 | Step: s\n**Updated**: t\n**Summary**: x\n\nshort";
        assert!(SlotLog::parse(text).is_err());
    }
}
