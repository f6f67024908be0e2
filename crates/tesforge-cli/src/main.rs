use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tesforge_script::compiler::SCTX;
use tesforge_script::symbols::SCPT;
use tesforge_script::{catalog, compile_script, emit, Catalog, CompileContext, CompileOptions};
use tesplugin::record::tag_str;
use tesplugin::schema::{self, Schema};
use tesplugin::{Entry, LoadOptions, Plugin, Subrecord};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tesforge", about = "Inspect TES4-family plugins and compile their scripts")]
struct Cli {
    /// Record schema document to use instead of the built-in one.
    #[arg(long, global = true)]
    schema: Option<PathBuf>,
    /// Function catalog document to use instead of the built-in one.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    /// More log output (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show a plugin's header and record counts.
    Info {
        file: PathBuf,
    },
    /// Print the group/record tree.
    Dump {
        file: PathBuf,
        /// Also print every subrecord, decoded through the schema.
        #[arg(long)]
        subrecords: bool,
    },
    /// Describe one record field by field.
    Describe {
        file: PathBuf,
        /// Form-id in hex (`0x` prefix optional).
        #[arg(long, value_parser = parse_form_id, required_unless_present = "edid", conflicts_with = "edid")]
        form_id: Option<u32>,
        /// Editor id (case-insensitive).
        #[arg(long)]
        edid: Option<String>,
    },
    /// Parse and re-serialize a plugin, checking that nothing changes.
    Roundtrip {
        file: PathBuf,
        /// Write the re-serialized plugin here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compile a script record.
    Compile {
        file: PathBuf,
        /// Editor id of the `SCPT` record to compile.
        #[arg(long)]
        script: String,
        /// Replace the record's source with this file before compiling.
        #[arg(long)]
        source: Option<PathBuf>,
        /// Directory holding the plugin's masters (default: the plugin's directory).
        #[arg(long)]
        masters_dir: Option<PathBuf>,
        /// Write the updated plugin here.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Checks to relax: "undeclared", "block-end".
        #[arg(long = "relax")]
        relax: Vec<String>,
        /// Print the compiled bytecode, one statement per line.
        #[arg(long)]
        listing: bool,
    },
}

fn parse_form_id(s: &str) -> std::result::Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid form-id {s:?}: {e}"))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn load_documents(schema_path: Option<&Path>, catalog_path: Option<&Path>) -> Result<()> {
    if let Some(path) = schema_path {
        let text = fs::read_to_string(path).with_context(|| format!("failed to read schema: {}", path.display()))?;
        let doc = Schema::from_json(&text).with_context(|| format!("invalid schema: {}", path.display()))?;
        schema::reload(doc);
    }
    if let Some(path) = catalog_path {
        let text = fs::read_to_string(path).with_context(|| format!("failed to read catalog: {}", path.display()))?;
        let doc = Catalog::from_json(&text).with_context(|| format!("invalid catalog: {}", path.display()))?;
        catalog::reload(doc);
    }
    Ok(())
}

fn load_plugin(path: &Path) -> Result<Plugin> {
    Plugin::read(path, &LoadOptions::default()).with_context(|| format!("failed to load plugin: {}", path.display()))
}

fn cmd_info(file: &Path) -> Result<()> {
    let plugin = load_plugin(file)?;
    let (author, description) = plugin.author_and_description();
    println!("File: {}", file.display());
    println!("Format: {:?}", plugin.format);
    println!("Author: {}", author.as_deref().unwrap_or("-"));
    println!("Description: {}", description.as_deref().unwrap_or("-"));
    let masters = plugin.masters();
    if masters.is_empty() {
        println!("Masters: none");
    } else {
        println!("Masters:");
        for (i, m) in masters.iter().enumerate() {
            println!("  {i:02X} {m}");
        }
    }
    let stats = plugin.stats();
    println!("Records: {}", stats.values().sum::<usize>());
    for (tag, count) in &stats {
        println!("  {tag} {count}");
    }
    Ok(())
}

fn dump_entries(entries: &[Entry], depth: usize, schema: Option<&Schema>) {
    let indent = "  ".repeat(depth);
    for entry in entries {
        match entry {
            Entry::Group(g) => {
                println!("{indent}GRUP {} ({} entries)", g.label_desc(), g.children.len());
                dump_entries(&g.children, depth + 1, schema);
            }
            Entry::Record(r) => {
                let edid = r.editor_id().map(|e| format!(" {e}")).unwrap_or_default();
                let compressed = if r.is_compressed() { " [compressed]" } else { "" };
                println!("{indent}{} {:08X}{edid}{compressed}", tag_str(&r.tag), r.form_id);
                if let Some(schema) = schema {
                    for sub in &r.subrecords {
                        for line in schema.format_subrecord(&r.tag, sub).lines() {
                            println!("{indent}  {line}");
                        }
                    }
                }
            }
        }
    }
}

fn cmd_dump(file: &Path, subrecords: bool) -> Result<()> {
    let plugin = load_plugin(file)?;
    let schema = if subrecords { Some(schema::global()?) } else { None };
    dump_entries(&plugin.entries, 0, schema.as_deref());
    Ok(())
}

fn cmd_describe(file: &Path, form_id: Option<u32>, edid: Option<&str>) -> Result<()> {
    let plugin = load_plugin(file)?;
    let record = match (form_id, edid) {
        (Some(id), _) => plugin
            .find_form(id)
            .ok_or_else(|| anyhow!("no record with form-id {id:08X}"))?,
        (None, Some(name)) => plugin
            .find_editor_id(name)
            .ok_or_else(|| anyhow!("no record with editor id {name:?}"))?,
        (None, None) => bail!("pass --form-id or --edid"),
    };
    print!("{}", schema::global()?.describe(record));
    Ok(())
}

fn cmd_roundtrip(file: &Path, output: Option<&Path>) -> Result<()> {
    let original = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let plugin = Plugin::parse(&original, &LoadOptions::default())
        .with_context(|| format!("failed to parse {}", file.display()))?;
    let written = plugin.to_bytes()?;
    let reparsed = Plugin::parse(&written, &LoadOptions::default()).context("re-serialized plugin does not parse")?;
    if reparsed != plugin {
        bail!("re-serialized plugin parses to a different record tree");
    }

    if written == original {
        println!("identical: {} bytes", written.len());
    } else {
        // Recompressed payloads need not match byte for byte.
        let first = written
            .iter()
            .zip(&original)
            .position(|(a, b)| a != b)
            .unwrap_or(written.len().min(original.len()));
        println!(
            "tree identical; bytes differ from offset {first:#x} ({} -> {} bytes)",
            original.len(),
            written.len()
        );
    }

    if let Some(out) = output {
        fs::write(out, &written).with_context(|| format!("failed to write {}", out.display()))?;
        info!(path = %out.display(), "written");
    }
    Ok(())
}

struct CompileArgs<'a> {
    script: &'a str,
    source: Option<&'a Path>,
    masters_dir: Option<&'a Path>,
    output: Option<&'a Path>,
    relax: &'a [String],
    listing: bool,
}

fn cmd_compile(file: &Path, args: &CompileArgs<'_>) -> Result<()> {
    let mut plugin = load_plugin(file)?;

    let dir = match args.masters_dir {
        Some(dir) => dir.to_path_buf(),
        None => file.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let mut masters = Vec::new();
    for name in plugin.masters() {
        let path = dir.join(&name);
        if !path.is_file() {
            warn!(master = %name, dir = %dir.display(), "master not found; its symbols are unavailable");
            continue;
        }
        masters.push((name, load_plugin(&path)?));
    }
    let master_refs: Vec<(&str, &Plugin)> = masters.iter().map(|(n, p)| (n.as_str(), p)).collect();

    let relax: Vec<&str> = args.relax.iter().map(String::as_str).collect();
    let ctx = CompileContext::setup(catalog::global()?, &plugin, &master_refs)
        .with_options(CompileOptions::relaxed(&relax));

    let form_id = plugin
        .find_editor_id(args.script)
        .filter(|r| r.tag == SCPT)
        .map(|r| r.form_id)
        .ok_or_else(|| anyhow!("no SCPT record with editor id {:?}", args.script))?;
    let record = plugin
        .find_form_mut(form_id)
        .ok_or_else(|| anyhow!("record {form_id:08X} disappeared"))?;

    if let Some(path) = args.source {
        let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        match record.subrecords.iter_mut().find(|s| s.tag == SCTX) {
            Some(sctx) => sctx.data = text.into_bytes(),
            None => record.subrecords.push(Subrecord::new(SCTX, text.into_bytes())),
        }
    }

    let compiled = compile_script(&ctx, record).with_context(|| format!("failed to compile {}", args.script))?;
    println!(
        "{}: {} bytes of bytecode, {} local(s), {} reference(s)",
        compiled.editor_id.as_deref().unwrap_or(args.script),
        compiled.bytecode.len(),
        compiled.locals.len(),
        compiled.references.len()
    );
    if args.listing {
        print!("{}", emit::listing(&compiled.bytecode));
    }

    if let Some(out) = args.output {
        fs::write(out, plugin.to_bytes()?).with_context(|| format!("failed to write {}", out.display()))?;
        info!(path = %out.display(), "written");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    load_documents(cli.schema.as_deref(), cli.catalog.as_deref())?;

    match &cli.command {
        Command::Info { file } => cmd_info(file),
        Command::Dump { file, subrecords } => cmd_dump(file, *subrecords),
        Command::Describe { file, form_id, edid } => cmd_describe(file, *form_id, edid.as_deref()),
        Command::Roundtrip { file, output } => cmd_roundtrip(file, output.as_deref()),
        Command::Compile {
            file,
            script,
            source,
            masters_dir,
            output,
            relax,
            listing,
        } => cmd_compile(
            file,
            &CompileArgs {
                script,
                source: source.as_deref(),
                masters_dir: masters_dir.as_deref(),
                output: output.as_deref(),
                relax,
                listing: *listing,
            },
        ),
    }
}
