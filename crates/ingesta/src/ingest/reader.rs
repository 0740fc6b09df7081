//! Lazy record stream over sealed segments.

use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::Stream;

use ingesta_core::checkpoint::IngestCursor;
use ingesta_core::item::{decode_item, KeySchema};
use ingesta_core::load::SourcedRecord;
use ingesta_core::segment::{is_trailer_line, SegmentState};

use super::error::ImportError;
use crate::config::Strictness;
use crate::layout::{read_trailer, TableLayout};

/// One step of the import stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEvent {
    Record(SourcedRecord),
    /// A malformed record that was skipped. Only produced with
    /// [`Strictness::Skip`].
    Skipped {
        segment: u64,
        offset: u64,
        reason: String,
    },
}

/// Reads sealed segments in sequence order, verifying each one's completion
/// marker before yielding any of its records.
pub struct ImportReader {
    layout: TableLayout,
    key_schema: KeySchema,
    strictness: Strictness,
}

fn io_error(path: &Path, e: io::Error) -> ImportError {
    ImportError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

impl ImportReader {
    pub fn new(layout: TableLayout, key_schema: KeySchema, strictness: Strictness) -> Self {
        Self {
            layout,
            key_schema,
            strictness,
        }
    }

    /// Records from `start` onward. The stream ends with an error at the first
    /// segment that is not sealed yet, is missing from the sequence, or fails
    /// verification.
    pub fn records(
        &self,
        start: IngestCursor,
    ) -> impl Stream<Item = Result<ImportEvent, ImportError>> + Send + '_ {
        async_stream::stream! {
            let files = match self.layout.list_segments().await {
                Ok(files) => files,
                Err(e) => {
                    yield Err(io_error(&self.layout.segments_dir(), e));
                    return;
                }
            };

            let mut expected = start.segment;
            for file in files {
                if file.seq < expected {
                    continue;
                }
                if file.seq > expected {
                    yield Err(ImportError::SegmentCorrupt {
                        seq: expected,
                        reason: format!("segment missing before {}", file.seq),
                    });
                    return;
                }
                if file.state == SegmentState::Partial {
                    yield Err(ImportError::IncompleteSegment { seq: file.seq });
                    return;
                }

                let trailer = match read_trailer(&file.path).await {
                    Ok(Some(trailer)) if trailer.seq == file.seq => trailer,
                    Ok(Some(trailer)) => {
                        yield Err(ImportError::SegmentCorrupt {
                            seq: file.seq,
                            reason: format!("completion marker names segment {}", trailer.seq),
                        });
                        return;
                    }
                    Ok(None) => {
                        yield Err(ImportError::SegmentCorrupt {
                            seq: file.seq,
                            reason: "no completion marker".to_string(),
                        });
                        return;
                    }
                    Err(e) => {
                        yield Err(io_error(&file.path, e));
                        return;
                    }
                };

                let handle = match File::open(&file.path).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        yield Err(io_error(&file.path, e));
                        return;
                    }
                };

                tracing::debug!(
                    table = self.layout.table(),
                    segment = file.seq,
                    records = trailer.records,
                    "Reading segment"
                );

                let skip = if file.seq == start.segment { start.offset } else { 0 };
                let mut lines = BufReader::new(handle).split(b'\n');
                let mut offset = 0;
                loop {
                    let line = match lines.next_segment().await {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            yield Err(ImportError::SegmentCorrupt {
                                seq: file.seq,
                                reason: format!("unreadable line at offset {offset}: {e}"),
                            });
                            return;
                        }
                    };
                    let line = line.strip_suffix(b"\r").unwrap_or(&line);
                    if std::str::from_utf8(line).is_ok_and(is_trailer_line) {
                        break;
                    }
                    if offset >= skip {
                        match self.decode(file.seq, offset, line) {
                            Ok(event) => yield Ok(event),
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }
                    offset += 1;
                }

                if offset != trailer.records {
                    yield Err(ImportError::SegmentCorrupt {
                        seq: file.seq,
                        reason: format!(
                            "completion marker counts {} records, found {offset}",
                            trailer.records
                        ),
                    });
                    return;
                }
                expected = file.seq + 1;
            }
        }
    }

    fn decode(&self, segment: u64, offset: u64, line: &[u8]) -> Result<ImportEvent, ImportError> {
        let parsed = std::str::from_utf8(line)
            .map_err(|e| format!("Record is not valid UTF-8: {e}"))
            .and_then(|line| decode_item(line).map_err(|e| e.to_string()))
            .and_then(|item| {
                item.primary_key(&self.key_schema)
                    .map(|key| (item, key))
                    .map_err(|e| e.to_string())
            });

        match parsed {
            Ok((item, key)) => Ok(ImportEvent::Record(SourcedRecord {
                item,
                key,
                segment,
                offset,
            })),
            Err(reason) => match self.strictness {
                Strictness::Skip => {
                    tracing::warn!(
                        table = self.layout.table(),
                        segment,
                        offset,
                        reason = %reason,
                        "Skipping malformed record"
                    );
                    Ok(ImportEvent::Skipped {
                        segment,
                        offset,
                        reason,
                    })
                }
                Strictness::Abort => Err(ImportError::RecordMalformed {
                    segment,
                    offset,
                    reason,
                }),
            },
        }
    }
}
