use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricLine {
    pub timestamp_ms: u64,
    pub text: String,
}

/// Parse `[mm:ss.cc]text` lines.
///
/// Lines whose timestamp cannot be read (including `[ar:...]` style headers)
/// are dropped one by one; a line may carry several timestamps. Returns
/// `None` when no line survives. Output is sorted by timestamp.
pub fn parse_lrc(content: &str) -> Option<Vec<LyricLine>> {
    let mut lines: Vec<LyricLine> = content.lines().flat_map(parse_line).collect();
    if lines.is_empty() {
        return None;
    }
    lines.sort_by_key(|l| l.timestamp_ms);
    Some(lines)
}

fn parse_line(line: &str) -> Vec<LyricLine> {
    let mut rest = line.trim();
    let mut stamps = Vec::new();

    while let Some(tail) = rest.strip_prefix('[') {
        let Some(end) = tail.find(']') else {
            return Vec::new();
        };
        match parse_timestamp(&tail[..end]) {
            Some(ms) => stamps.push(ms),
            None => return Vec::new(),
        }
        rest = &tail[end + 1..];
    }

    let text = rest.trim().to_string();
    stamps
        .into_iter()
        .map(|timestamp_ms| LyricLine {
            timestamp_ms,
            text: text.clone(),
        })
        .collect()
}

/// `mm:ss`, `mm:ss.c`, `mm:ss.cc` (centiseconds) or `mm:ss.mmm`.
pub fn parse_timestamp(ts: &str) -> Option<u64> {
    let (min, sec_part) = ts.split_once(':')?;
    let (sec, frac) = match sec_part.split_once('.') {
        Some((s, f)) => (s, Some(f)),
        None => (sec_part, None),
    };

    let min = digits(min)?;
    let sec = digits(sec)?;
    let ms = match frac {
        None => 0,
        Some(f) => match f.len() {
            1 => digits(f)? * 100,
            2 => digits(f)? * 10,
            3 => digits(f)?,
            _ => return None,
        },
    };

    Some(min * 60_000 + sec * 1000 + ms)
}

fn digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Index of the line being sung at `position_ms`: the last one whose
/// timestamp is not after it.
pub fn active_line(lines: &[LyricLine], position_ms: u64) -> Option<usize> {
    lines
        .partition_point(|l| l.timestamp_ms <= position_ms)
        .checked_sub(1)
}
