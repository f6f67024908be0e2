//! Symbol tables and the Setup pass that fills them.
//!
//! Setup walks the active plugin and its masters, moves every form-id into
//! the active plugin's id space, and records what scripts may refer to:
//! editor ids, global variables and the variables of quest and placed
//! reference scripts (far variables, `owner.variable`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tesplugin::record::{tag_str, Record, Tag};
use tesplugin::Plugin;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::lexer::{Keyword, NameKind, NameSets};
use crate::options::CompileOptions;

pub const SCPT: Tag = *b"SCPT";
pub const SCRI: Tag = *b"SCRI";
pub const SLSD: Tag = *b"SLSD";
pub const SCVR: Tag = *b"SCVR";
pub const SCRV: Tag = *b"SCRV";
const GLOB: Tag = *b"GLOB";
const QUST: Tag = *b"QUST";
const REFR: Tag = *b"REFR";

/// Form-id of the player reference, present in every game.
pub const PLAYER_REF: u32 = 0x0000_0014;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Int,
    Float,
    Ref,
}

impl VarKind {
    /// Variable type named by a declaration keyword.
    pub fn from_keyword(keyword: Keyword) -> Option<Self> {
        match keyword {
            Keyword::Short | Keyword::Long | Keyword::Int => Some(Self::Int),
            Keyword::Float => Some(Self::Float),
            Keyword::Ref => Some(Self::Ref),
            _ => None,
        }
    }

    /// Type byte used in bytecode: refs are stored as integers.
    pub fn code(self) -> u8 {
        match self {
            Self::Int | Self::Ref => b's',
            Self::Float => b'f',
        }
    }
}

/// A variable slot in some script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    pub kind: VarKind,
    pub slot: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormInfo {
    pub form_id: u32,
    pub tag: Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalInfo {
    pub form_id: u32,
    pub kind: VarKind,
}

/// Names a script can resolve, keyed case-insensitively.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    editor_ids: HashMap<String, FormInfo>,
    globals: HashMap<String, GlobalInfo>,
    far_vars: HashMap<String, HashMap<String, Variable>>,
    names: NameSets,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// An empty table knowing only the player.
    pub fn new() -> Self {
        let mut table = Self {
            editor_ids: HashMap::new(),
            globals: HashMap::new(),
            far_vars: HashMap::new(),
            names: NameSets::new(),
        };
        for name in ["player", "playerRef"] {
            table.insert_editor_id(
                name,
                FormInfo {
                    form_id: PLAYER_REF,
                    tag: *b"ACHR",
                },
            );
        }
        table
    }

    pub fn insert_editor_id(&mut self, name: &str, info: FormInfo) {
        self.editor_ids.insert(name.to_ascii_lowercase(), info);
        self.names.insert(NameKind::EditorId, name);
    }

    pub fn insert_global(&mut self, name: &str, info: GlobalInfo) {
        self.globals.insert(name.to_ascii_lowercase(), info);
        self.names.insert(NameKind::Global, name);
    }

    /// Register the variables reachable through `owner.variable`.
    pub fn insert_far_variables(&mut self, owner: &str, vars: HashMap<String, Variable>) {
        let vars = vars
            .into_iter()
            .map(|(name, var)| (name.to_ascii_lowercase(), var))
            .collect();
        self.far_vars.insert(owner.to_ascii_lowercase(), vars);
    }

    pub fn editor_id(&self, name: &str) -> Option<FormInfo> {
        self.editor_ids.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn global(&self, name: &str) -> Option<GlobalInfo> {
        self.globals.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn far_variable(&self, owner: &str, name: &str) -> Option<Variable> {
        self.far_vars
            .get(&owner.to_ascii_lowercase())?
            .get(&name.to_ascii_lowercase())
            .copied()
    }

    pub fn has_far_variables(&self, owner: &str) -> bool {
        self.far_vars.contains_key(&owner.to_ascii_lowercase())
    }

    /// Global and editor-id names, for identifier classification.
    pub fn names(&self) -> &NameSets {
        &self.names
    }

    pub fn editor_id_count(&self) -> usize {
        self.editor_ids.len()
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    pub fn far_owner_count(&self) -> usize {
        self.far_vars.len()
    }
}

/// Everything a compile needs besides the source.
#[derive(Debug, Clone)]
pub struct CompileContext {
    pub catalog: Arc<Catalog>,
    pub symbols: SymbolTable,
    pub options: CompileOptions,
}

impl CompileContext {
    /// A context without plugin symbols.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            symbols: SymbolTable::new(),
            options: CompileOptions::default(),
        }
    }

    /// Build symbol tables from `active` and its masters.
    ///
    /// `masters` pairs each loaded master with its file name. Names are
    /// matched case-insensitively against the active plugin's master list;
    /// masters it does not declare are skipped. Later plugins override
    /// earlier ones, so the active plugin wins.
    pub fn setup(catalog: Arc<Catalog>, active: &Plugin, masters: &[(&str, &Plugin)]) -> Self {
        let load_order: Vec<String> = active
            .masters()
            .iter()
            .map(|m| m.to_ascii_lowercase())
            .collect();

        let mut collector = Collector::default();
        for (name, plugin) in masters {
            let Some(index) = load_order.iter().position(|m| m.eq_ignore_ascii_case(name)) else {
                warn!(master = %name, "not a master of the active plugin; skipped");
                continue;
            };
            collector.collect(plugin, &Remap::new(plugin, &load_order, index));
        }
        collector.collect(active, &Remap::new(active, &load_order, load_order.len()));

        let symbols = collector.finish();
        info!(
            editor_ids = symbols.editor_id_count(),
            globals = symbols.global_count(),
            far_owners = symbols.far_owner_count(),
            "symbol setup complete"
        );
        Self {
            catalog,
            symbols,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }
}

/// Maps one plugin's form-ids into the active plugin's id space.
struct Remap {
    /// New top byte for each of the plugin's own master indices.
    masters: Vec<Option<u8>>,
    /// New top byte for records the plugin defines itself.
    own: Option<u8>,
}

impl Remap {
    fn new(plugin: &Plugin, load_order: &[String], own: usize) -> Self {
        let masters = plugin
            .masters()
            .iter()
            .map(|m| {
                load_order
                    .iter()
                    .position(|l| l.eq_ignore_ascii_case(m))
                    .and_then(|i| u8::try_from(i).ok())
            })
            .collect();
        Self {
            masters,
            own: u8::try_from(own).ok(),
        }
    }

    fn apply(&self, form_id: u32) -> Option<u32> {
        let top = (form_id >> 24) as usize;
        let index = match self.masters.get(top) {
            Some(mapped) => (*mapped)?,
            None => self.own?,
        };
        Some(u32::from(index) << 24 | (form_id & 0x00FF_FFFF))
    }
}

/// First pass state: facts gathered per record, resolved in `finish`.
#[derive(Default)]
struct Collector {
    symbols: SymbolTable,
    scripts: HashMap<u32, HashMap<String, Variable>>,
    script_of: HashMap<u32, u32>,
    quests: Vec<(String, u32)>,
    placed: Vec<(String, u32)>,
}

impl Collector {
    fn collect(&mut self, plugin: &Plugin, remap: &Remap) {
        let mut skipped = 0usize;
        for record in plugin.records().filter(|r| &r.tag != b"TES4") {
            let Some(form_id) = remap.apply(record.form_id) else {
                skipped += 1;
                continue;
            };
            if let Some(script) = record.subrecord(&SCRI).and_then(|s| s.as_u32()) {
                if let Some(script) = remap.apply(script) {
                    self.script_of.insert(form_id, script);
                }
            }
            if record.tag == SCPT {
                self.scripts.insert(form_id, script_variables(record));
            }

            let Some(edid) = record.editor_id() else {
                continue;
            };
            self.symbols.insert_editor_id(
                &edid,
                FormInfo {
                    form_id,
                    tag: record.tag,
                },
            );
            match record.tag {
                GLOB => {
                    let kind = match record.subrecord(b"FNAM").and_then(|s| s.data.first()) {
                        Some(b'f') => VarKind::Float,
                        _ => VarKind::Int,
                    };
                    self.symbols.insert_global(&edid, GlobalInfo { form_id, kind });
                }
                QUST => self.quests.push((edid.into_owned(), form_id)),
                REFR => {
                    if let Some(base) = record
                        .subrecord(b"NAME")
                        .and_then(|s| s.as_u32())
                        .and_then(|b| remap.apply(b))
                    {
                        self.placed.push((edid.into_owned(), base));
                    }
                }
                _ => {}
            }
        }
        if skipped > 0 {
            debug!(skipped, "records owned by plugins outside the load order were skipped");
        }
    }

    fn finish(mut self) -> SymbolTable {
        for (owner, form_id) in self.quests.iter().chain(&self.placed) {
            let vars = self
                .script_of
                .get(form_id)
                .and_then(|script| self.scripts.get(script));
            match vars {
                Some(vars) => self.symbols.insert_far_variables(owner, vars.clone()),
                None => debug!(owner = %owner, form_id = format_args!("{form_id:08X}"), "no script attached"),
            }
        }
        self.symbols
    }
}

/// Named locals of a compiled script record (`SLSD`/`SCVR` pairs).
pub fn script_variables(record: &Record) -> HashMap<String, Variable> {
    let ref_slots: HashSet<u32> = record
        .subrecords_with(&SCRV)
        .filter_map(|s| s.as_u32())
        .collect();
    let mut vars = HashMap::new();
    let mut pending: Option<(u32, u8)> = None;
    for sub in &record.subrecords {
        if sub.tag == SLSD {
            pending = sub.as_u32().map(|slot| (slot, sub.data.get(16).copied().unwrap_or(0)));
        } else if sub.tag == SCVR {
            let Some((slot, flag)) = pending.take() else {
                debug!(record = %tag_str(&record.tag), "SCVR without SLSD");
                continue;
            };
            let kind = if ref_slots.contains(&slot) {
                VarKind::Ref
            } else if flag & 1 != 0 {
                VarKind::Int
            } else {
                VarKind::Float
            };
            let Ok(slot) = u16::try_from(slot) else {
                continue;
            };
            vars.insert(sub.as_str().to_ascii_lowercase(), Variable { kind, slot });
        }
    }
    vars
}
