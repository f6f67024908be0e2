use thiserror::Error;

use crate::record::tag_str;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of data at offset {offset:#x} (need {need} bytes, have {have})")]
    UnexpectedEof {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("{kind} {tag} at offset {offset:#x}: declared size {declared}, consumed {consumed}")]
    SizeMismatch {
        kind: &'static str,
        tag: String,
        offset: usize,
        declared: usize,
        consumed: usize,
    },

    #[error("unsupported plugin header: {0}")]
    UnsupportedHeader(String),

    #[error("record {} {form_id:08X}: failed to inflate compressed payload: {message}", tag_str(tag))]
    Inflate {
        tag: [u8; 4],
        form_id: u32,
        message: String,
    },

    #[error("record {} {form_id:08X}: inflated {actual} bytes, header declared {declared}", tag_str(tag))]
    InflatedSize {
        tag: [u8; 4],
        form_id: u32,
        declared: usize,
        actual: usize,
    },

    #[error("record {} {form_id:08X}: failed to compress payload: {source}", tag_str(tag))]
    Deflate {
        tag: [u8; 4],
        form_id: u32,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
