//! Segment file naming: `<table>-<seq:06>.jsonl`, with a `.partial` suffix
//! while the segment is still being written.

const SEALED_EXT: &str = ".jsonl";
const PARTIAL_EXT: &str = ".jsonl.partial";

/// Whether a segment file is sealed or still being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Sealed,
    Partial,
}

/// File name of a sealed segment.
pub fn sealed_file_name(table: &str, seq: u64) -> String {
    format!("{table}-{seq:06}{SEALED_EXT}")
}

/// File name of an in-progress segment.
pub fn partial_file_name(table: &str, seq: u64) -> String {
    format!("{table}-{seq:06}{PARTIAL_EXT}")
}

/// Parse a segment file name belonging to `table`.
pub fn parse_file_name(table: &str, name: &str) -> Option<(u64, SegmentState)> {
    let rest = name.strip_prefix(table)?.strip_prefix('-')?;

    let (digits, state) = if let Some(d) = rest.strip_suffix(PARTIAL_EXT) {
        (d, SegmentState::Partial)
    } else if let Some(d) = rest.strip_suffix(SEALED_EXT) {
        (d, SegmentState::Sealed)
    } else {
        return None;
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|seq| (seq, state))
}
