//! Where a table's files live on the data volume.
//!
//! ```text
//! <data_dir>/<table>/segments/<table>-000001.jsonl[.partial]
//! <data_dir>/<table>/checkpoints/{export,ingest}.json
//! <data_dir>/<table>/key_schema.json
//! <data_dir>/<table>/manifest.json
//! <data_dir>/<table>/archive/
//! <data_dir>/schemas/<table>_schema.json
//! ```

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use ingesta_core::segment::{
    decode_trailer, parse_file_name, partial_file_name, sealed_file_name, ExportManifest,
    SegmentState, SegmentTrailer,
};
use ingesta_core::item::KeySchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::fsutil;

/// Bytes read from the end of a segment when looking for its marker.
const TRAILER_WINDOW: u64 = 64 * 1024;

/// A segment file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    pub seq: u64,
    pub state: SegmentState,
    pub path: PathBuf,
}

/// Paths for one table.
#[derive(Debug, Clone)]
pub struct TableLayout {
    data_dir: PathBuf,
    table: String,
}

impl TableLayout {
    pub fn new(data_dir: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn root(&self) -> PathBuf {
        self.data_dir.join(&self.table)
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root().join("segments")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root().join("checkpoints")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root().join("archive")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root().join("manifest.json")
    }

    /// Key schema recorded by the export stage when it starts.
    pub fn key_schema_path(&self) -> PathBuf {
        self.root().join("key_schema.json")
    }

    pub fn schema_path(&self) -> PathBuf {
        self.data_dir
            .join("schemas")
            .join(format!("{}_schema.json", self.table))
    }

    pub fn sealed_path(&self, seq: u64) -> PathBuf {
        self.segments_dir().join(sealed_file_name(&self.table, seq))
    }

    pub fn partial_path(&self, seq: u64) -> PathBuf {
        self.segments_dir().join(partial_file_name(&self.table, seq))
    }

    pub async fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.segments_dir()).await?;
        fs::create_dir_all(self.checkpoints_dir()).await
    }

    /// Segment files of this table ordered by sequence number. Other files in
    /// the directory are ignored.
    pub async fn list_segments(&self) -> io::Result<Vec<SegmentFile>> {
        let mut entries = match fs::read_dir(self.segments_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut segments = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some((seq, state)) = parse_file_name(&self.table, name) {
                segments.push(SegmentFile {
                    seq,
                    state,
                    path: entry.path(),
                });
            }
        }

        segments.sort_by_key(|s| (s.seq, s.state == SegmentState::Partial));
        Ok(segments)
    }

    pub async fn read_manifest(&self) -> io::Result<Option<ExportManifest>> {
        read_json(&self.manifest_path()).await
    }

    pub async fn write_manifest(&self, manifest: &ExportManifest) -> io::Result<()> {
        write_json(&self.manifest_path(), manifest).await
    }

    pub async fn read_key_schema(&self) -> io::Result<Option<KeySchema>> {
        read_json(&self.key_schema_path()).await
    }

    pub async fn write_key_schema(&self, schema: &KeySchema) -> io::Result<()> {
        write_json(&self.key_schema_path(), schema).await
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fsutil::write_atomic(path, &bytes).await
}

/// Read the completion marker of a segment file. Returns `None` if the file
/// does not end with a valid marker line.
pub async fn read_trailer(path: &Path) -> io::Result<Option<SegmentTrailer>> {
    let mut file = fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(TRAILER_WINDOW)))
        .await?;

    let mut tail = Vec::new();
    file.read_to_end(&mut tail).await?;
    let tail = String::from_utf8_lossy(&tail);

    let Some(body) = tail.strip_suffix('\n') else {
        return Ok(None);
    };
    let last_line = body.rsplit('\n').next().unwrap_or(body);
    Ok(decode_trailer(last_line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingesta_core::segment::encode_trailer;

    #[tokio::test]
    async fn test_list_segments_orders_by_seq() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "users");
        layout.ensure_dirs().await.unwrap();

        for path in [
            layout.partial_path(3),
            layout.sealed_path(10),
            layout.sealed_path(2),
            layout.segments_dir().join("notes.txt"),
        ] {
            fs::write(path, b"").await.unwrap();
        }

        let seqs: Vec<_> = layout
            .list_segments()
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.seq, s.state))
            .collect();
        assert_eq!(
            seqs,
            vec![
                (2, SegmentState::Sealed),
                (3, SegmentState::Partial),
                (10, SegmentState::Sealed),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_segments_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "missing");
        assert!(layout.list_segments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_key_schema_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path(), "orders");
        layout.ensure_dirs().await.unwrap();

        assert_eq!(layout.read_key_schema().await.unwrap(), None);
        let schema = KeySchema::new("PK").with_sort_key("SK");
        layout.write_key_schema(&schema).await.unwrap();
        assert_eq!(layout.read_key_schema().await.unwrap(), Some(schema));
    }

    #[tokio::test]
    async fn test_read_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.jsonl");
        let trailer = SegmentTrailer {
            seq: 1,
            records: 1,
            last_cursor: None,
        };

        fs::write(&path, format!("{{\"pk\":{{\"S\":\"a\"}}}}\n{}", encode_trailer(&trailer)))
            .await
            .unwrap();
        assert_eq!(read_trailer(&path).await.unwrap(), Some(trailer));

        fs::write(&path, "{\"pk\":{\"S\":\"a\"}}\n").await.unwrap();
        assert_eq!(read_trailer(&path).await.unwrap(), None);

        fs::write(&path, "#SEALED {\"seq\":1,\"records\":1").await.unwrap();
        assert_eq!(read_trailer(&path).await.unwrap(), None);
    }
}
