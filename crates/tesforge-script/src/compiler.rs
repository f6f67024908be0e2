//! Statement-level compilation.
//!
//! A compile walks the statement queue once. Expressions are parsed into
//! [`Expr`](crate::ast::Expr) trees and emitted immediately; block lengths,
//! statement lengths and jump counts are backpatched. Problems confined to
//! one statement become diagnostics and the statement is dropped; anything
//! that breaks the script's overall shape aborts.

use tesplugin::codec;
use tesplugin::record::{Record, Subrecord, Tag, EDID};
use tracing::{debug, info};

use crate::ast::{Arg, Expr};
use crate::emit::{Emitter, Opcode};
use crate::error::{diag, CompileError, Diagnostic, Fault, Result, Step};
use crate::lexer::{Keyword, Lexer, NameKind, NameSets, Statement, Symbol, TokenKind};
use crate::parser::{describe, Tokens};
use crate::symbols::{CompileContext, VarKind, SCRV, SCVR, SLSD};

pub const SCHR: Tag = *b"SCHR";
pub const SCDA: Tag = *b"SCDA";
pub const SCTX: Tag = *b"SCTX";
pub const SCRO: Tag = *b"SCRO";

/// Script type stored in the last field of `SCHR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    Object,
    Quest,
    MagicEffect,
    /// Dialogue and quest-stage result scripts.
    Result,
    Other(u32),
}

impl ScriptType {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Object,
            1 => Self::Quest,
            0x100 => Self::MagicEffect,
            0x1_0000 => Self::Result,
            other => Self::Other(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Object => 0,
            Self::Quest => 1,
            Self::MagicEffect => 0x100,
            Self::Result => 0x1_0000,
            Self::Other(v) => v,
        }
    }
}

/// A declared local variable. Slots are 1-based, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: String,
    pub kind: VarKind,
    pub slot: u16,
}

/// An entry of the script's reference list. Bytecode refers to entries by
/// 1-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    /// A `ref` local, stored as `SCRV`.
    Local(u16),
    /// Another record, stored as `SCRO`.
    Form(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledScript {
    /// Name from the `ScriptName` line; result scripts have none.
    pub editor_id: Option<String>,
    pub script_type: ScriptType,
    pub locals: Vec<Local>,
    pub references: Vec<Reference>,
    pub bytecode: Vec<u8>,
    pub source: String,
}

impl CompiledScript {
    /// The 20-byte `SCHR` header.
    pub fn header(&self) -> Subrecord {
        let mut data = Vec::with_capacity(20);
        for v in [
            0,
            self.references.len() as u32,
            self.bytecode.len() as u32,
            self.locals.len() as u32,
            self.script_type.as_u32(),
        ] {
            data.extend_from_slice(&codec::from_u32(v));
        }
        Subrecord::new(SCHR, data)
    }

    /// Subrecords of a script record holding this script, in file order.
    pub fn subrecords(&self) -> Vec<Subrecord> {
        let mut out = Vec::new();
        if let Some(edid) = &self.editor_id {
            out.push(Subrecord::from_zstring(EDID, edid));
        }
        out.push(self.header());
        out.push(Subrecord::new(SCDA, self.bytecode.clone()));
        out.push(Subrecord::new(SCTX, self.source.as_bytes().to_vec()));
        for local in &self.locals {
            let mut slsd = vec![0u8; 24];
            slsd[..4].copy_from_slice(&codec::from_u32(u32::from(local.slot)));
            slsd[16] = u8::from(local.kind != VarKind::Float);
            out.push(Subrecord::new(SLSD, slsd));
            out.push(Subrecord::from_zstring(SCVR, &local.name));
        }
        for reference in &self.references {
            out.push(match *reference {
                Reference::Local(slot) => Subrecord::from_u32(SCRV, u32::from(slot)),
                Reference::Form(form_id) => Subrecord::from_u32(SCRO, form_id),
            });
        }
        out
    }
}

/// Compile the `SCTX` source of a script record and replace the record's
/// subrecords with the result. The record's script type is kept.
///
/// On error the record is left untouched.
pub fn compile_script(ctx: &CompileContext, record: &mut Record) -> Result<CompiledScript> {
    let source = record
        .subrecord(&SCTX)
        .map(|s| s.as_str().into_owned())
        .ok_or_else(|| CompileError::Structural {
            line: 0,
            message: "record has no SCTX source".to_string(),
        })?;
    let script_type = record
        .subrecord(&SCHR)
        .and_then(|s| codec::take4(s.data.get(16..)?))
        .map(|b| ScriptType::from_u32(codec::to_u32(b)))
        .unwrap_or(ScriptType::Object);

    let compiled = compile_source(ctx, &source, script_type)?;
    record.subrecords = compiled.subrecords();
    Ok(compiled)
}

/// Compile a complete script: `ScriptName`, declarations, then blocks.
pub fn compile_source(ctx: &CompileContext, source: &str, script_type: ScriptType) -> Result<CompiledScript> {
    let mut lexer = Lexer::new(source);
    let mut unit = Unit::new(ctx);

    let name = unit.script_name(&mut lexer)?;
    debug!(script = %name, "compiling");
    unit.declarations(&mut lexer)?;

    while let Some(st) = unit.next_statement(&mut lexer) {
        match st.keyword() {
            Some(Keyword::Begin) => unit.block(&mut lexer, st)?,
            Some(k) if VarKind::from_keyword(k).is_some() => {
                unit.report(st.line, "variable declarations must come before the first block")
            }
            Some(Keyword::End) => unit.report(st.line, "'end' without 'begin'"),
            _ => unit.report(st.line, "statement outside of a begin/end block"),
        }
    }

    unit.finish(Some(name), source, script_type, lexer.take_diagnostics())
}

/// Compile a result script: optional declarations followed by statements,
/// with no name and no blocks.
pub fn compile_result_script(ctx: &CompileContext, source: &str) -> Result<CompiledScript> {
    let mut lexer = Lexer::new(source);
    let mut unit = Unit::new(ctx);
    unit.declarations(&mut lexer)?;

    let mut last_line = 1;
    while let Some(st) = unit.next_statement(&mut lexer) {
        last_line = st.line;
        match st.keyword() {
            Some(k @ (Keyword::Begin | Keyword::End | Keyword::ScriptName)) => unit.report(
                st.line,
                format!("'{}' is not allowed in a result script", k.as_str()),
            ),
            _ => {
                let line = st.line;
                let step = unit.statement(st);
                unit.record(line, step)?;
            }
        }
    }
    unit.close_branches(last_line);

    unit.finish(None, source, ScriptType::Result, lexer.take_diagnostics())
}

/// An `if` chain whose current branch is still open.
struct Branch {
    /// Jump-count placeholder of the branch's opening statement; `None` if
    /// that statement failed to compile.
    jump_at: Option<usize>,
    /// Statements compiled since the branch opened.
    statements: u16,
    after_else: bool,
}

/// State of one compile.
pub(crate) struct Unit<'c> {
    pub(crate) ctx: &'c CompileContext,
    locals: Vec<Local>,
    local_names: NameSets,
    references: Vec<Reference>,
    emitter: Emitter,
    diagnostics: Vec<Diagnostic>,
    branches: Vec<Branch>,
}

impl<'c> Unit<'c> {
    pub(crate) fn new(ctx: &'c CompileContext) -> Self {
        Self {
            ctx,
            locals: Vec::new(),
            local_names: NameSets::new(),
            references: Vec::new(),
            emitter: Emitter::new(),
            diagnostics: Vec::new(),
            branches: Vec::new(),
        }
    }

    /// Name sets used to classify identifiers, highest priority first.
    pub(crate) fn layers(&self) -> [&NameSets; 3] {
        [
            &self.local_names,
            self.ctx.symbols.names(),
            self.ctx.catalog.names(),
        ]
    }

    fn next_statement(&self, lexer: &mut Lexer) -> Option<Statement> {
        lexer.next_statement(&self.layers())
    }

    fn report(&mut self, line: usize, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(line, message));
    }

    /// Record the outcome of one statement.
    fn record(&mut self, line: usize, step: Step<()>) -> Result<()> {
        match step {
            Ok(()) => Ok(()),
            Err(Fault::Diagnostic(message)) => {
                self.report(line, message);
                Ok(())
            }
            Err(Fault::Structural(message)) => Err(CompileError::Structural { line, message }),
        }
    }

    pub(crate) fn local(&self, name: &str) -> Option<&Local> {
        self.locals.iter().find(|l| l.name.eq_ignore_ascii_case(name))
    }

    fn reference(&mut self, reference: Reference) -> u16 {
        let index = match self.references.iter().position(|r| *r == reference) {
            Some(i) => i,
            None => {
                self.references.push(reference);
                self.references.len() - 1
            }
        };
        u16::try_from(index + 1).unwrap_or(u16::MAX)
    }

    /// Reference-list index for another record, added on first use.
    pub(crate) fn form_reference(&mut self, form_id: u32) -> u16 {
        self.reference(Reference::Form(form_id))
    }

    pub(crate) fn local_reference(&mut self, slot: u16) -> u16 {
        self.reference(Reference::Local(slot))
    }

    /// Fault for a name nothing resolves.
    pub(crate) fn undeclared(&self, name: &str) -> Fault {
        let message = format!("unknown identifier '{name}'");
        if self.ctx.options.fail_on_undeclared {
            Fault::Structural(message)
        } else {
            Fault::Diagnostic(message)
        }
    }

    fn script_name(&mut self, lexer: &mut Lexer) -> Result<String> {
        let Some(st) = lexer.next_statement(&[]) else {
            return Err(CompileError::Structural {
                line: 1,
                message: "script is empty".to_string(),
            });
        };
        match (st.keyword(), st.tokens.get(1).and_then(|t| t.ident())) {
            (Some(Keyword::ScriptName), Some(name)) if st.tokens.len() == 2 => Ok(name.to_string()),
            _ => Err(CompileError::Structural {
                line: st.line,
                message: "expected 'ScriptName <name>' as the first statement".to_string(),
            }),
        }
    }

    /// Consume the leading run of variable declarations.
    fn declarations(&mut self, lexer: &mut Lexer) -> Result<()> {
        while let Some(st) = lexer.peek_statement(&[]) {
            let Some(kind) = st.keyword().and_then(VarKind::from_keyword) else {
                break;
            };
            lexer.next_statement(&[]);
            let step = self.declare(kind, &st);
            self.record(st.line, step)?;
        }
        // Ref locals head the reference list, in declaration order.
        let ref_slots: Vec<u16> = self
            .locals
            .iter()
            .filter(|l| l.kind == VarKind::Ref)
            .map(|l| l.slot)
            .collect();
        for slot in ref_slots {
            self.local_reference(slot);
        }
        Ok(())
    }

    fn declare(&mut self, kind: VarKind, st: &Statement) -> Step<()> {
        let keyword = describe(&st.tokens[0]);
        let Some(name) = st.tokens.get(1).and_then(|t| t.ident()) else {
            return diag(format!("expected a variable name after '{keyword}'"));
        };
        if let Some(extra) = st.tokens.get(2) {
            return diag(format!("unexpected '{}' after variable name", describe(extra)));
        }
        if self.local(name).is_some() {
            return diag(format!("variable '{name}' is already declared"));
        }
        let slot = u16::try_from(self.locals.len() + 1).map_err(|_| Fault::Structural("too many variables".into()))?;
        self.locals.push(Local {
            name: name.to_string(),
            kind,
            slot,
        });
        self.local_names.insert(NameKind::Local, name);
        Ok(())
    }

    /// Compile a `begin` ... `end` block.
    fn block(&mut self, lexer: &mut Lexer, begin: Statement) -> Result<()> {
        let start_line = begin.line;
        let mut t = Tokens::new(&begin.tokens[1..]);
        let opened = self
            .block_header(&mut t)
            .and_then(|(opcode, args)| self.emitter.begin(opcode, &args).map_err(Fault::from));
        let length_at = match opened {
            Ok(length_at) => length_at,
            Err(fault) => {
                self.record(start_line, Err(fault))?;
                self.emitter.begin(0, &[]).map_err(|err| CompileError::Structural {
                    line: start_line,
                    message: err.to_string(),
                })?
            }
        };

        let mut last_line = start_line;
        loop {
            let Some(st) = self.next_statement(lexer) else {
                self.report(
                    last_line,
                    format!("missing 'end' for the block begun on line {start_line}"),
                );
                self.close_branches(last_line);
                self.emitter.patch_block_length(length_at);
                return Ok(());
            };
            last_line = st.line;
            match st.keyword() {
                Some(Keyword::End) => {
                    if let Some(extra) = st.tokens.get(1) {
                        self.report(st.line, format!("unexpected '{}' after 'end'", describe(extra)));
                    }
                    self.close_branches(st.line);
                    self.emitter.bare(Opcode::End);
                    self.emitter.patch_block_length(length_at);
                    return Ok(());
                }
                Some(Keyword::Begin) => self.report(
                    st.line,
                    format!("'begin' inside the block begun on line {start_line}"),
                ),
                _ => {
                    let line = st.line;
                    let step = self.statement(st);
                    self.record(line, step)?;
                }
            }
        }
    }

    fn block_header(&mut self, t: &mut Tokens<'_>) -> Step<(u16, Vec<Arg>)> {
        let ctx = self.ctx;
        let Some(name) = t.next().and_then(|tok| tok.ident()) else {
            return diag("'begin' needs a block type");
        };
        let Some(def) = ctx.catalog.block(name) else {
            return diag(format!("unknown block type '{name}'"));
        };
        let args = self.arguments(&def.name, &def.params, false, t)?;
        self.expect_end(t)?;
        Ok((def.opcode, args))
    }

    /// Compile one statement inside a block (or a result script).
    fn statement(&mut self, st: Statement) -> Step<()> {
        let ctx = self.ctx;
        let mut t = Tokens::new(&st.tokens);
        let Some(first) = t.next() else {
            return Ok(());
        };
        match &first.kind {
            TokenKind::Keyword(keyword) => match keyword {
                Keyword::Set => {
                    let target = self.set_target(&mut t)?;
                    if !t.eat_keyword(Keyword::To) {
                        return diag("expected 'to' after the variable in 'set'");
                    }
                    let value = self.expression(&mut t)?;
                    self.expect_end(&t)?;
                    self.emitter.set(&target, &value)?;
                    self.count_statement();
                }
                Keyword::If => {
                    let opened = self
                        .expression(&mut t)
                        .and_then(|c| self.expect_end(&t).map(|()| c))
                        .and_then(|c| self.emitter.conditional(Opcode::If, &c).map_err(Fault::from));
                    let jump_at = match opened {
                        Ok(jump_at) => {
                            self.count_statement();
                            Some(jump_at)
                        }
                        Err(fault) => {
                            // Keep the chain balanced so its endif still matches.
                            self.branches.push(Branch {
                                jump_at: None,
                                statements: 0,
                                after_else: false,
                            });
                            return Err(fault);
                        }
                    };
                    self.branches.push(Branch {
                        jump_at,
                        statements: 0,
                        after_else: false,
                    });
                }
                Keyword::ElseIf => {
                    self.check_branch("elseif")?;
                    let condition = self.expression(&mut t)?;
                    self.expect_end(&t)?;
                    let jump_at = self.emitter.conditional(Opcode::ElseIf, &condition)?;
                    self.close_branch();
                    self.count_statement();
                    self.branches.push(Branch {
                        jump_at: Some(jump_at),
                        statements: 0,
                        after_else: false,
                    });
                }
                Keyword::Else => {
                    self.check_branch("else")?;
                    self.expect_end(&t)?;
                    self.close_branch();
                    self.count_statement();
                    let jump_at = self.emitter.else_branch();
                    self.branches.push(Branch {
                        jump_at: Some(jump_at),
                        statements: 0,
                        after_else: true,
                    });
                }
                Keyword::EndIf => {
                    if self.branches.is_empty() {
                        return diag("endif without matching if");
                    }
                    self.expect_end(&t)?;
                    self.close_branch();
                    self.count_statement();
                    self.emitter.bare(Opcode::EndIf);
                }
                Keyword::Return => {
                    self.expect_end(&t)?;
                    self.count_statement();
                    self.emitter.bare(Opcode::Return);
                }
                Keyword::ShowMessage => {
                    let def = ctx
                        .catalog
                        .function("ShowMessage")
                        .ok_or_else(|| Fault::Structural("ShowMessage is missing from the function catalog".into()))?;
                    let call = self.call(def, None, &mut t)?;
                    self.expect_end(&t)?;
                    self.emitter.call_statement(&call)?;
                    self.count_statement();
                }
                Keyword::Short | Keyword::Long | Keyword::Float | Keyword::Int | Keyword::Ref => {
                    return diag("variable declarations must come before the first statement");
                }
                Keyword::ScriptName => return diag("ScriptName must be the first statement"),
                Keyword::Begin => return diag("'begin' is only allowed outside of blocks"),
                Keyword::End => return diag("'end' without 'begin'"),
                Keyword::To => return diag("unexpected 'to'"),
            },
            TokenKind::Name(NameKind::Function, name) => {
                let Some(def) = ctx.catalog.function(name) else {
                    return Err(self.undeclared(name));
                };
                let call = self.call(def, None, &mut t)?;
                self.expect_end(&t)?;
                self.emitter.call_statement(&call)?;
                self.count_statement();
            }
            TokenKind::Name(NameKind::Local | NameKind::EditorId, _) | TokenKind::Ident(_)
                if t.peek().is_some_and(|tok| tok.is_symbol(Symbol::Dot)) =>
            {
                let Expr::Call(call) = self.member(first, &mut t, false)? else {
                    return diag(format!("'{}.' must be followed by a function call", describe(first)));
                };
                self.expect_end(&t)?;
                self.emitter.call_statement(&call)?;
                self.count_statement();
            }
            TokenKind::Ident(name) => return Err(self.undeclared(name)),
            _ => return diag(format!("'{}' does not start a statement", describe(first))),
        }
        Ok(())
    }

    fn check_branch(&self, keyword: &str) -> Step<()> {
        match self.branches.last() {
            None => diag(format!("{keyword} without matching if")),
            Some(b) if b.after_else => diag(format!("{keyword} after else")),
            Some(_) => Ok(()),
        }
    }

    pub(crate) fn expect_end(&self, t: &Tokens<'_>) -> Step<()> {
        match t.peek() {
            Some(extra) => diag(format!("unexpected '{}' at end of statement", describe(extra))),
            None => Ok(()),
        }
    }

    /// Count a compiled statement toward every open branch.
    fn count_statement(&mut self) {
        for branch in &mut self.branches {
            branch.statements = branch.statements.saturating_add(1);
        }
    }

    /// Pop the innermost branch and store its statement count.
    fn close_branch(&mut self) {
        if let Some(branch) = self.branches.pop() {
            if let Some(jump_at) = branch.jump_at {
                self.emitter.patch_jump(jump_at, branch.statements);
            }
        }
    }

    /// End of a block: anything still open is missing its `endif`.
    fn close_branches(&mut self, line: usize) {
        let open = self.branches.len();
        if open > 0 && self.ctx.options.strict_block_end {
            self.report(line, format!("{open} 'if' statement(s) not closed with 'endif'"));
        }
        while !self.branches.is_empty() {
            self.close_branch();
        }
    }

    fn finish(
        self,
        editor_id: Option<String>,
        source: &str,
        script_type: ScriptType,
        lexer_diagnostics: Vec<Diagnostic>,
    ) -> Result<CompiledScript> {
        let mut diagnostics = lexer_diagnostics;
        diagnostics.extend(self.diagnostics);
        if !diagnostics.is_empty() {
            diagnostics.sort_by_key(|d| d.line);
            for d in &diagnostics {
                debug!(diagnostic = %d, "compile diagnostic");
            }
            return Err(CompileError::Diagnostics(diagnostics));
        }

        let bytecode = self.emitter.into_bytes();
        info!(
            script = editor_id.as_deref().unwrap_or("<result>"),
            bytes = bytecode.len(),
            locals = self.locals.len(),
            references = self.references.len(),
            "script compiled"
        );
        Ok(CompiledScript {
            editor_id,
            script_type,
            locals: self.locals,
            references: self.references,
            bytecode,
            source: source.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::Catalog;
    use crate::emit::split_statements;

    fn ctx() -> CompileContext {
        CompileContext::new(Arc::new(Catalog::embedded().unwrap()))
    }

    fn opcodes(bytecode: &[u8]) -> Vec<u16> {
        split_statements(bytecode).unwrap().iter().map(|s| s.opcode).collect()
    }

    /// Jump count of the statement at `index`.
    fn jump(bytecode: &[u8], index: usize) -> u16 {
        let st = split_statements(bytecode).unwrap()[index];
        codec::to_u16(codec::take2(st.payload).unwrap())
    }

    #[test]
    fn empty_game_mode_block() {
        let script = compile_source(&ctx(), "ScriptName Test\nbegin GameMode\nend\n", ScriptType::Object).unwrap();
        assert_eq!(script.editor_id.as_deref(), Some("Test"));
        assert!(script.locals.is_empty());
        assert!(script.references.is_empty());
        assert_eq!(
            script.bytecode,
            [0x10, 0, 6, 0, 0, 0, 4, 0, 0, 0, 0x11, 0, 0, 0]
        );
    }

    #[test]
    fn jump_counts_cover_branch_bodies() {
        let source = "scn T\nshort a\nbegin GameMode\n\
            if a == 1\n  set a to 2\n  set a to 3\n\
            elseif a == 2\n  if a\n    return\n  endif\n\
            else\n  set a to 0\n\
            endif\nend";
        let script = compile_source(&ctx(), source, ScriptType::Object).unwrap();
        let ops = opcodes(&script.bytecode);
        assert_eq!(
            ops,
            [0x10, 0x16, 0x15, 0x15, 0x18, 0x16, 0x1E, 0x19, 0x17, 0x15, 0x19, 0x11]
        );
        assert_eq!(jump(&script.bytecode, 1), 2);
        // elseif body: inner if, return, endif.
        assert_eq!(jump(&script.bytecode, 4), 3);
        assert_eq!(jump(&script.bytecode, 5), 1);
        assert_eq!(jump(&script.bytecode, 8), 1);
    }

    #[test]
    fn unmatched_branch_keywords_are_diagnostics() {
        let err = compile_source(
            &ctx(),
            "scn T\nbegin GameMode\nelseif 1\nendif\nend",
            ScriptType::Object,
        )
        .unwrap_err();
        let messages: Vec<String> = err.diagnostics().into_iter().map(|d| d.message).collect();
        assert_eq!(
            messages,
            ["elseif without matching if", "endif without matching if"]
        );
    }

    #[test]
    fn open_if_at_end_of_block() {
        let err = compile_source(&ctx(), "scn T\nbegin GameMode\nif 1\nend", ScriptType::Object).unwrap_err();
        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 4);
        assert!(diagnostics[0].message.contains("endif"));

        let mut relaxed = ctx();
        relaxed.options = crate::options::CompileOptions::relaxed(&["block-end"]);
        assert!(compile_source(&relaxed, "scn T\nbegin GameMode\nif 1\nend", ScriptType::Object).is_ok());
    }

    #[test]
    fn script_must_start_with_its_name() {
        let err = compile_source(&ctx(), "short a\nscn T", ScriptType::Object).unwrap_err();
        assert!(matches!(err, CompileError::Structural { line: 1, .. }), "{err}");
        let err = compile_source(&ctx(), "; nothing\n", ScriptType::Object).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn late_and_duplicate_declarations() {
        let err = compile_source(
            &ctx(),
            "scn T\nshort a\nfloat A\nbegin GameMode\nshort b\nend\nshort c",
            ScriptType::Object,
        )
        .unwrap_err();
        let lines: Vec<usize> = err.diagnostics().iter().map(|d| d.line).collect();
        assert_eq!(lines, [3, 5, 7]);
    }

    #[test]
    fn missing_end_is_reported() {
        let err = compile_source(&ctx(), "scn T\nbegin GameMode\nreturn", ScriptType::Object).unwrap_err();
        assert!(err.diagnostics()[0].message.contains("missing 'end'"));
    }

    #[test]
    fn header_reflects_contents() {
        let script = compile_source(
            &ctx(),
            "scn T\nshort a\nref target\nfloat f\nbegin GameMode\nset a to 1\nend",
            ScriptType::Quest,
        )
        .unwrap();
        let header = script.header();
        assert_eq!(header.data.len(), 20);
        assert_eq!(codec::to_u32(codec::take4(&header.data[4..]).unwrap()), 1);
        assert_eq!(
            codec::to_u32(codec::take4(&header.data[8..]).unwrap()) as usize,
            script.bytecode.len()
        );
        assert_eq!(codec::to_u32(codec::take4(&header.data[12..]).unwrap()), 3);
        assert_eq!(codec::to_u32(codec::take4(&header.data[16..]).unwrap()), 1);
        assert_eq!(script.references, [Reference::Local(2)]);
    }
}
