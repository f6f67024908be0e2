//! Reader/writer for TES4-family plugin files (`.esm` / `.esp`).
//!
//! Three layers:
//! - **Layer 1** (`codec`/`cursor`): raw little-endian values and bounded reads/writes
//! - **Layer 2** (`record`/`plugin`): the group → record → subrecord tree, with
//!   per-record zlib compression
//! - **Layer 3** (`schema`): declarative record layouts used to render parsed
//!   records for humans

pub mod codec;
pub mod compression;
pub mod cursor;
pub mod error;
pub mod format;
pub mod plugin;
pub mod record;
pub mod schema;

pub use error::{Error, Result};
pub use format::Format;
pub use plugin::{FormatChoice, LoadOptions, Plugin};
pub use record::{Entry, Group, GroupKind, Node, Record, Subrecord, Tag};
