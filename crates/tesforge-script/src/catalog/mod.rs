//! Built-in functions, event blocks and enumerations.
//!
//! The catalog is a JSON document embedded in the crate. It is loaded once
//! into a process-wide slot on first use; [`reload`] swaps in another one.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::lexer::{NameKind, NameSets};

/// The catalog document shipped with the crate.
pub const EMBEDDED: &str = include_str!("builtins.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed catalog document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{entry}: {message}")]
    Invalid { entry: String, message: String },
}

/// Value kinds used for return values and parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Void,
    Int,
    Float,
    Ref,
    String,
    /// One of `X`, `Y`, `Z`.
    Axis,
    /// A name from one of the catalog's enumerations, or its number.
    Enum,
    Short,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamDef {
    pub kind: ValueKind,
    /// Enumeration for `enum` parameters.
    #[serde(default, rename = "enum")]
    pub enum_name: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionDef {
    pub name: String,
    pub opcode: u16,
    #[serde(default = "void")]
    pub returns: ValueKind,
    #[serde(default)]
    pub params: Vec<ParamDef>,
    /// Callable as `ref.Function`.
    #[serde(default = "yes")]
    pub reference: bool,
    /// Arguments past the declared parameters are accepted as variables
    /// instead of being rejected.
    #[serde(default)]
    pub skip_args: bool,
}

impl FunctionDef {
    /// Number of leading parameters that must be supplied.
    pub fn required(&self) -> usize {
        self.params.iter().take_while(|p| !p.optional).count()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockDef {
    pub name: String,
    pub opcode: u16,
    #[serde(default)]
    pub params: Vec<ParamDef>,
}

impl BlockDef {
    pub fn required(&self) -> usize {
        self.params.iter().take_while(|p| !p.optional).count()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnumDoc {
    name: String,
    values: Vec<(String, u16)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDoc {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    functions: Vec<FunctionDef>,
    #[serde(default)]
    blocks: Vec<BlockDef>,
    #[serde(default)]
    enums: Vec<EnumDoc>,
}

fn void() -> ValueKind {
    ValueKind::Void
}

fn yes() -> bool {
    true
}

/// Validated catalog. Name lookups ignore case.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    version: u32,
    functions: HashMap<String, FunctionDef>,
    blocks: HashMap<String, BlockDef>,
    enums: HashMap<String, HashMap<String, u16>>,
    names: NameSets,
}

impl Catalog {
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDoc = serde_json::from_str(text)?;
        let mut catalog = Catalog {
            version: doc.version,
            ..Catalog::default()
        };

        for e in doc.enums {
            let values = e
                .values
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect();
            if catalog.enums.insert(e.name.to_ascii_lowercase(), values).is_some() {
                return Err(invalid(&format!("enum \"{}\"", e.name), "defined more than once"));
            }
        }

        let mut opcodes = HashMap::new();
        for f in doc.functions {
            let entry = format!("function \"{}\"", f.name);
            catalog.check_params(&entry, &f.params)?;
            if let Some(other) = opcodes.insert(f.opcode, f.name.clone()) {
                return Err(invalid(
                    &entry,
                    format!("opcode {:#06x} is already used by {other}", f.opcode),
                ));
            }
            catalog.names.insert(NameKind::Function, &f.name);
            if catalog.functions.insert(f.name.to_ascii_lowercase(), f).is_some() {
                return Err(invalid(&entry, "defined more than once"));
            }
        }

        for b in doc.blocks {
            let entry = format!("block \"{}\"", b.name);
            catalog.check_params(&entry, &b.params)?;
            if let Some(p) = b
                .params
                .iter()
                .find(|p| !matches!(p.kind, ValueKind::Short | ValueKind::Int | ValueKind::Ref))
            {
                return Err(invalid(
                    &entry,
                    format!("block parameters must be short, int or ref, not {:?}", p.kind),
                ));
            }
            if catalog.blocks.insert(b.name.to_ascii_lowercase(), b).is_some() {
                return Err(invalid(&entry, "defined more than once"));
            }
        }

        Ok(catalog)
    }

    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_json(EMBEDDED)
    }

    fn check_params(&self, entry: &str, params: &[ParamDef]) -> Result<(), CatalogError> {
        let mut seen_optional = false;
        for p in params {
            if p.kind == ValueKind::Void {
                return Err(invalid(entry, "parameters cannot be void"));
            }
            if seen_optional && !p.optional {
                return Err(invalid(entry, "required parameter after an optional one"));
            }
            seen_optional |= p.optional;
            match (&p.kind, &p.enum_name) {
                (ValueKind::Enum, Some(name)) if self.enums.contains_key(&name.to_ascii_lowercase()) => {}
                (ValueKind::Enum, Some(name)) => {
                    return Err(invalid(entry, format!("unknown enum \"{name}\"")));
                }
                (ValueKind::Enum, None) => return Err(invalid(entry, "enum parameter without an enum name")),
                (_, Some(_)) => return Err(invalid(entry, "only enum parameters name an enum")),
                (_, None) => {}
            }
        }
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    pub fn block(&self, name: &str) -> Option<&BlockDef> {
        self.blocks.get(&name.to_ascii_lowercase())
    }

    /// Value of `name` in enumeration `enum_name`.
    pub fn enum_value(&self, enum_name: &str, name: &str) -> Option<u16> {
        self.enums
            .get(&enum_name.to_ascii_lowercase())?
            .get(&name.to_ascii_lowercase())
            .copied()
    }

    /// Function names, for identifier classification.
    pub fn names(&self) -> &NameSets {
        &self.names
    }

    /// Version number declared by the document.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

fn invalid(entry: &str, message: impl Into<String>) -> CatalogError {
    CatalogError::Invalid {
        entry: entry.to_string(),
        message: message.into(),
    }
}

static GLOBAL: RwLock<Option<Arc<Catalog>>> = RwLock::new(None);

/// The process-wide catalog, loading the embedded document on first use.
pub fn global() -> Result<Arc<Catalog>, CatalogError> {
    if let Some(catalog) = GLOBAL.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Ok(Arc::clone(catalog));
    }
    let mut slot = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(catalog) = slot.as_ref() {
        return Ok(Arc::clone(catalog));
    }
    let catalog = Arc::new(Catalog::embedded()?);
    info!(
        version = catalog.version(),
        functions = catalog.function_count(),
        blocks = catalog.block_count(),
        "loaded embedded function catalog"
    );
    *slot = Some(Arc::clone(&catalog));
    Ok(catalog)
}

/// Replace the process-wide catalog.
pub fn reload(catalog: Catalog) {
    info!(functions = catalog.function_count(), "function catalog reloaded");
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(catalog));
}

/// Drop the process-wide catalog; the next [`global`] call reloads the embedded one.
pub fn reset() {
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_loads() {
        let catalog = Catalog::embedded().unwrap();
        let get_stage = catalog.function("getstage").unwrap();
        assert_eq!(get_stage.returns, ValueKind::Int);
        assert_eq!(get_stage.required(), 1);
        assert!(!get_stage.reference);

        let add_item = catalog.function("AddItem").unwrap();
        assert_eq!(add_item.required(), 2);
        assert_eq!(add_item.params.len(), 3);

        assert!(catalog.function("ShowMessage").unwrap().skip_args);
        assert_eq!(catalog.block("gamemode").map(|b| b.opcode), Some(0));
        assert_eq!(catalog.enum_value("ActorValue", "health"), Some(8));
        assert!(catalog.names().contains(NameKind::Function, "GETDISTANCE"));
    }

    #[test]
    fn rejects_required_after_optional() {
        let err = Catalog::from_json(
            r#"{"functions":[{"name":"F","opcode":1,"params":[{"kind":"int","optional":true},{"kind":"int"}]}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("function \"F\""), "{err}");
    }

    #[test]
    fn rejects_duplicate_opcodes_and_bad_block_params() {
        let err = Catalog::from_json(
            r#"{"functions":[{"name":"A","opcode":7},{"name":"B","opcode":7}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("already used by A"), "{err}");

        let err = Catalog::from_json(r#"{"blocks":[{"name":"OnThing","opcode":1,"params":[{"kind":"float"}]}]}"#)
            .unwrap_err();
        assert!(err.to_string().starts_with("block \"OnThing\""), "{err}");
    }

    #[test]
    fn enum_params_must_name_known_enums() {
        let err = Catalog::from_json(
            r#"{"functions":[{"name":"F","opcode":1,"params":[{"kind":"enum","enum":"Nope"}]}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown enum"), "{err}");
    }
}
