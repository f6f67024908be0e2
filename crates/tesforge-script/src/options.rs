/// Options controlling how strictly scripts are compiled.
///
/// The defaults match the game editor. Relax individual checks by clearing
/// their fields, or use `relaxed` with check names.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// An unknown identifier aborts the compile with a single error. When
    /// cleared it is recorded as a diagnostic and the statement is skipped.
    pub fail_on_undeclared: bool,
    /// A block that ends with an `if` still open is a diagnostic.
    pub strict_block_end: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            fail_on_undeclared: true,
            strict_block_end: true,
        }
    }
}

impl CompileOptions {
    /// Default options with the named checks relaxed:
    /// - `"undeclared"`: unknown identifiers become diagnostics
    /// - `"block-end"`: open `if`s at `end` are closed silently
    pub fn relaxed(names: &[&str]) -> Self {
        let mut options = Self::default();
        for name in names {
            match *name {
                "undeclared" => options.fail_on_undeclared = false,
                "block-end" => options.strict_block_end = false,
                _ => {}
            }
        }
        options
    }
}
