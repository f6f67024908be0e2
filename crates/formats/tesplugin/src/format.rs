/// Header layout of a plugin file.
///
/// Known variants:
/// - `Legacy`: Oblivion-era plugins. Record headers are 20 bytes (tag, size,
///   flags, form-id, one extra flag word) and group headers are 20 bytes.
/// - `Modern`: Fallout 3 / New Vegas era plugins. Both headers carry one more
///   flag word, for 24 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Legacy,
    Modern,
}

impl Format {
    /// Size of a record header, including tag and size fields.
    pub fn record_header_len(self) -> usize {
        match self {
            Self::Legacy => 20,
            Self::Modern => 24,
        }
    }

    /// Size of a group header, including tag and size fields.
    pub fn group_header_len(self) -> usize {
        self.record_header_len()
    }

    /// Whether record and group headers carry the trailing flag word.
    pub fn has_extended_header(self) -> bool {
        self == Self::Modern
    }

    /// Detect the format from the first bytes of a plugin.
    ///
    /// The header record is always `TES4`, and its first subrecord is always
    /// `HEDR`; where that subrecord begins tells the two layouts apart.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.get(..4) != Some(b"TES4") {
            return None;
        }
        if data.get(20..24) == Some(b"HEDR") {
            Some(Self::Legacy)
        } else if data.get(24..28) == Some(b"HEDR") {
            Some(Self::Modern)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy (20-byte headers)"),
            Self::Modern => write!(f, "modern (24-byte headers)"),
        }
    }
}
