mod format;
mod naming;

pub use format::{
    decode_trailer, encode_record_line, encode_trailer, is_trailer_line, ExportManifest,
    SegmentDescriptor, SegmentLimits, SegmentTrailer, SEALED_PREFIX,
};
pub use naming::{parse_file_name, partial_file_name, sealed_file_name, SegmentState};
