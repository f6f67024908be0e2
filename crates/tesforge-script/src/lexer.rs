//! Tokenizer for script source.
//!
//! The whole source is scanned up front into a queue of statements (the
//! tokens between two newlines). Identifiers are left unclassified by the
//! scan; each statement is matched against the caller's [`NameSets`] when it
//! is dequeued, so names registered after scanning (declared locals, symbols
//! from Setup) still resolve.

use std::collections::{HashSet, VecDeque};

use crate::error::Diagnostic;

/// Reserved words. Matching is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    ScriptName,
    Begin,
    End,
    Short,
    Long,
    Float,
    Int,
    Ref,
    Set,
    To,
    If,
    ElseIf,
    Else,
    EndIf,
    Return,
    ShowMessage,
}

impl Keyword {
    pub fn parse(word: &str) -> Option<Self> {
        Some(match word.to_ascii_lowercase().as_str() {
            "scriptname" | "scn" => Self::ScriptName,
            "begin" => Self::Begin,
            "end" => Self::End,
            "short" => Self::Short,
            "long" => Self::Long,
            "float" => Self::Float,
            "int" => Self::Int,
            "ref" | "reference" => Self::Ref,
            "set" => Self::Set,
            "to" => Self::To,
            "if" => Self::If,
            "elseif" => Self::ElseIf,
            "else" => Self::Else,
            "endif" => Self::EndIf,
            "return" => Self::Return,
            "showmessage" => Self::ShowMessage,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScriptName => "ScriptName",
            Self::Begin => "begin",
            Self::End => "end",
            Self::Short => "short",
            Self::Long => "long",
            Self::Float => "float",
            Self::Int => "int",
            Self::Ref => "ref",
            Self::Set => "set",
            Self::To => "to",
            Self::If => "if",
            Self::ElseIf => "elseif",
            Self::Else => "else",
            Self::EndIf => "endif",
            Self::Return => "return",
            Self::ShowMessage => "ShowMessage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    And,
    Or,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Dot,
    Assign,
}

impl Symbol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::And => "&&",
            Self::Or => "||",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Dot => ".",
            Self::Assign => "=",
        }
    }
}

/// Classes an identifier can be promoted to at dequeue time, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Local,
    Global,
    Function,
    EditorId,
}

impl NameKind {
    pub const ALL: [NameKind; 4] = [Self::Local, Self::Global, Self::Function, Self::EditorId];

    fn index(self) -> usize {
        match self {
            Self::Local => 0,
            Self::Global => 1,
            Self::Function => 2,
            Self::EditorId => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i32),
    Float(f64),
    Keyword(Keyword),
    Symbol(Symbol),
    Str(String),
    /// Identifier that no name set claimed.
    Ident(String),
    /// Identifier found in a name set when its statement was dequeued.
    Name(NameKind, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    /// Source text of an identifier, classified or not.
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) | TokenKind::Name(_, s) => Some(s),
            _ => None,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn is_symbol(&self, symbol: Symbol) -> bool {
        self.kind == TokenKind::Symbol(symbol)
    }
}

/// The tokens of one source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub tokens: Vec<Token>,
}

impl Statement {
    pub fn keyword(&self) -> Option<Keyword> {
        match self.tokens.first().map(|t| &t.kind) {
            Some(TokenKind::Keyword(k)) => Some(*k),
            _ => None,
        }
    }

    fn classify(&mut self, layers: &[&NameSets]) {
        for token in &mut self.tokens {
            let name = match &mut token.kind {
                TokenKind::Ident(s) | TokenKind::Name(_, s) => std::mem::take(s),
                _ => continue,
            };
            token.kind = match classify(layers, &name) {
                Some(kind) => TokenKind::Name(kind, name),
                None => TokenKind::Ident(name),
            };
        }
    }
}

/// Mutable sets of known names, one per [`NameKind`]. Lookups ignore case.
#[derive(Debug, Clone, Default)]
pub struct NameSets {
    sets: [HashSet<String>; 4],
}

impl NameSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: NameKind, name: &str) {
        self.sets[kind.index()].insert(name.to_ascii_lowercase());
    }

    pub fn remove(&mut self, kind: NameKind, name: &str) -> bool {
        self.sets[kind.index()].remove(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, kind: NameKind, name: &str) -> bool {
        self.sets[kind.index()].contains(&name.to_ascii_lowercase())
    }

    pub fn clear(&mut self, kind: NameKind) {
        self.sets[kind.index()].clear();
    }

    pub fn len(&self, kind: NameKind) -> usize {
        self.sets[kind.index()].len()
    }
}

/// Classify `name` against several name sets. Kinds are tried in priority
/// order, each across every layer, so a local anywhere beats a global.
pub fn classify(layers: &[&NameSets], name: &str) -> Option<NameKind> {
    let lower = name.to_ascii_lowercase();
    NameKind::ALL
        .into_iter()
        .find(|kind| layers.iter().any(|l| l.sets[kind.index()].contains(&lower)))
}

/// Queue of scanned statements.
#[derive(Debug, Default)]
pub struct Lexer {
    statements: VecDeque<Statement>,
    diagnostics: Vec<Diagnostic>,
}

impl Lexer {
    /// Scan the whole source. Problems become diagnostics; scanning never stops early.
    pub fn new(source: &str) -> Self {
        let mut scanner = Scanner::new(source);
        scanner.run();
        Self {
            statements: scanner.statements,
            diagnostics: scanner.diagnostics,
        }
    }

    /// Dequeue the next statement, classifying its identifiers against `names`.
    pub fn next_statement(&mut self, names: &[&NameSets]) -> Option<Statement> {
        let mut statement = self.statements.pop_front()?;
        statement.classify(names);
        Some(statement)
    }

    /// The next statement, classified, without consuming it.
    pub fn peek_statement(&self, names: &[&NameSets]) -> Option<Statement> {
        let mut statement = self.statements.front()?.clone();
        statement.classify(names);
        Some(statement)
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

struct Scanner<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    current: Vec<Token>,
    statements: VecDeque<Statement>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            line: 1,
            current: Vec::new(),
            statements: VecDeque::new(),
            diagnostics: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind) {
        self.current.push(Token {
            kind,
            line: self.line,
        });
    }

    fn error(&mut self, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(self.line, message));
    }

    fn end_statement(&mut self) {
        if !self.current.is_empty() {
            self.statements.push_back(Statement {
                line: self.current[0].line,
                tokens: std::mem::take(&mut self.current),
            });
        }
    }

    fn run(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b'\n' => {
                    self.end_statement();
                    self.line += 1;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | b',' => self.pos += 1,
                b';' => {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                b'"' => self.lex_string(),
                b'0'..=b'9' => self.lex_number_or_ident(false),
                b'.' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                    self.lex_number_or_ident(false)
                }
                b'~' => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'0'..=b'9') => self.lex_number_or_ident(true),
                        Some(b'.') if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                            self.lex_number_or_ident(true)
                        }
                        _ => self.error("'~' must be followed by a number"),
                    }
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_word(),
                0x00..=0x1F | 0x7F => {
                    self.error(format!("unexpected control character 0x{b:02X}"));
                    self.pos += 1;
                }
                _ => self.lex_symbol(),
            }
        }
        self.end_statement();
    }

    fn lex_string(&mut self) {
        self.pos += 1; // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    self.error("unterminated string");
                    return;
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    match self.peek_at(1) {
                        Some(b'\\') => value.push('\\'),
                        Some(b'n') => value.push('\n'),
                        Some(b'"') => value.push('"'),
                        // Unknown escapes are kept verbatim.
                        _ => {
                            value.push('\\');
                            self.pos += 1;
                            continue;
                        }
                    }
                    self.pos += 2;
                }
                Some(_) => {
                    let ch = self.input[self.pos..].chars().next().unwrap_or('\u{FFFD}');
                    value.push(ch);
                    self.pos += ch.len_utf8().max(1);
                }
            }
        }
        self.push(TokenKind::Str(value));
    }

    fn lex_number_or_ident(&mut self, negative: bool) {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        // Editor ids may start with digits.
        if !negative && self.peek().is_some_and(|b| b.is_ascii_alphabetic() || b == b'_') {
            self.pos = start;
            self.lex_word();
            return;
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        } else if self.peek() == Some(b'.') && self.pos > start {
            // Trailing dot: `5.` is a float.
            is_float = true;
            self.pos += 1;
        }

        let text = &self.input[start..self.pos];
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => self.push(TokenKind::Float(if negative { -v } else { v })),
                Err(_) => self.error(format!("invalid number '{text}'")),
            }
        } else {
            let parsed = if negative {
                format!("-{text}").parse::<i32>()
            } else {
                text.parse::<i32>()
            };
            match parsed {
                Ok(v) => self.push(TokenKind::Int(v)),
                Err(_) => self.error(format!("integer '{text}' is out of range")),
            }
        }
    }

    fn lex_word(&mut self) {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        let word = &self.input[start..self.pos];
        match Keyword::parse(word) {
            Some(k) => self.push(TokenKind::Keyword(k)),
            None => self.push(TokenKind::Ident(word.to_string())),
        }
    }

    fn lex_symbol(&mut self) {
        let two = match (self.peek(), self.peek_at(1)) {
            (Some(b'='), Some(b'=')) => Some(Symbol::Eq),
            (Some(b'!'), Some(b'=')) => Some(Symbol::Ne),
            (Some(b'<'), Some(b'=')) => Some(Symbol::Le),
            (Some(b'>'), Some(b'=')) => Some(Symbol::Ge),
            (Some(b'&'), Some(b'&')) => Some(Symbol::And),
            (Some(b'|'), Some(b'|')) => Some(Symbol::Or),
            _ => None,
        };
        if let Some(symbol) = two {
            self.pos += 2;
            self.push(TokenKind::Symbol(symbol));
            return;
        }
        let one = match self.peek() {
            Some(b'<') => Some(Symbol::Lt),
            Some(b'>') => Some(Symbol::Gt),
            Some(b'+') => Some(Symbol::Plus),
            Some(b'-') => Some(Symbol::Minus),
            Some(b'*') => Some(Symbol::Star),
            Some(b'/') => Some(Symbol::Slash),
            Some(b'(') => Some(Symbol::LParen),
            Some(b')') => Some(Symbol::RParen),
            Some(b'.') => Some(Symbol::Dot),
            Some(b'=') => Some(Symbol::Assign),
            _ => None,
        };
        match one {
            Some(symbol) => {
                self.pos += 1;
                self.push(TokenKind::Symbol(symbol));
            }
            None => {
                let ch = self.input[self.pos..].chars().next().unwrap_or('\u{FFFD}');
                self.error(format!("unexpected character '{ch}'"));
                self.pos += ch.len_utf8().max(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Vec<TokenKind>> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        while let Some(st) = lexer.next_statement(&[]) {
            out.push(st.tokens.into_iter().map(|t| t.kind).collect());
        }
        out
    }

    fn ident(s: &str) -> TokenKind {
        TokenKind::Ident(s.to_string())
    }

    #[test]
    fn show_message_statement() {
        assert_eq!(
            kinds("ShowMessage DoorOpenedScienceMsg passSkill"),
            [vec![
                TokenKind::Keyword(Keyword::ShowMessage),
                ident("DoorOpenedScienceMsg"),
                ident("passSkill"),
            ]]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""line one\nline \"two\"""#),
            [vec![TokenKind::Str("line one\nline \"two\"".to_string())]]
        );
        assert_eq!(
            kinds(r#""back\\slash" "odd\q""#),
            [vec![
                TokenKind::Str("back\\slash".to_string()),
                TokenKind::Str("odd\\q".to_string()),
            ]]
        );
    }

    #[test]
    fn unterminated_string_is_a_diagnostic() {
        let mut lexer = Lexer::new("set x to 1\nMessage \"oops\nreturn");
        assert_eq!(lexer.diagnostics().len(), 1);
        assert_eq!(lexer.diagnostics()[0].line, 2);
        assert!(lexer.diagnostics()[0].message.contains("unterminated"));
        // Scanning carried on past the bad line.
        let mut lines = Vec::new();
        while let Some(st) = lexer.next_statement(&[]) {
            lines.push(st.line);
        }
        assert_eq!(lines, [1, 2, 3]);
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("12 .5 3.25 ~5 ~.5 0x"),
            [vec![
                TokenKind::Int(12),
                TokenKind::Float(0.5),
                TokenKind::Float(3.25),
                TokenKind::Int(-5),
                TokenKind::Float(-0.5),
                ident("0x"),
            ]]
        );
    }

    #[test]
    fn symbols_and_separators() {
        assert_eq!(
            kinds("if a >= 1, b != 2\t&& (c||d) ; trailing comment"),
            [vec![
                TokenKind::Keyword(Keyword::If),
                ident("a"),
                TokenKind::Symbol(Symbol::Ge),
                TokenKind::Int(1),
                ident("b"),
                TokenKind::Symbol(Symbol::Ne),
                TokenKind::Int(2),
                TokenKind::Symbol(Symbol::And),
                TokenKind::Symbol(Symbol::LParen),
                ident("c"),
                TokenKind::Symbol(Symbol::Or),
                ident("d"),
                TokenKind::Symbol(Symbol::RParen),
            ]]
        );
    }

    #[test]
    fn keywords_ignore_case() {
        assert_eq!(
            kinds("SCN Foo\nBEGIN GameMode\nEndIf"),
            [
                vec![TokenKind::Keyword(Keyword::ScriptName), ident("Foo")],
                vec![TokenKind::Keyword(Keyword::Begin), ident("GameMode")],
                vec![TokenKind::Keyword(Keyword::EndIf)],
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let mut lexer = Lexer::new("\n\n; only a comment\n   \nreturn\n");
        let st = lexer.next_statement(&[]).unwrap();
        assert_eq!(st.line, 5);
        assert_eq!(st.keyword(), Some(Keyword::Return));
        assert!(lexer.next_statement(&[]).is_none());
    }

    #[test]
    fn control_characters_are_flagged_and_skipped() {
        let mut lexer = Lexer::new("set\u{1} x to 1");
        assert_eq!(lexer.diagnostics().len(), 1);
        let st = lexer.next_statement(&[]).unwrap();
        assert_eq!(st.tokens.len(), 4);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut lexer = Lexer::new("short a\nshort b");
        assert_eq!(lexer.peek_statement(&[]).unwrap().line, 1);
        assert_eq!(lexer.next_statement(&[]).unwrap().line, 1);
        assert_eq!(lexer.peek_statement(&[]).unwrap().line, 2);
        assert_eq!(lexer.next_statement(&[]).unwrap().line, 2);
        assert!(lexer.peek_statement(&[]).is_none());
    }

    #[test]
    fn names_are_classified_at_dequeue() {
        let mut lexer = Lexer::new("set count to GameHour\nset count to GameHour");
        let mut names = NameSets::new();
        names.insert(NameKind::Global, "gamehour");

        let first = lexer.next_statement(&[&names]).unwrap();
        assert_eq!(first.tokens[1].kind, ident("count"));
        assert_eq!(
            first.tokens[3].kind,
            TokenKind::Name(NameKind::Global, "GameHour".to_string())
        );

        // Declared between dequeues: the second statement sees it.
        let mut locals = NameSets::new();
        locals.insert(NameKind::Local, "Count");
        let second = lexer.next_statement(&[&locals, &names]).unwrap();
        assert_eq!(
            second.tokens[1].kind,
            TokenKind::Name(NameKind::Local, "count".to_string())
        );
    }

    #[test]
    fn local_beats_global_across_layers() {
        let mut globals = NameSets::new();
        globals.insert(NameKind::Global, "timer");
        let mut locals = NameSets::new();
        locals.insert(NameKind::Local, "timer");
        assert_eq!(classify(&[&globals, &locals], "Timer"), Some(NameKind::Local));
        assert_eq!(classify(&[&globals], "Timer"), Some(NameKind::Global));
        assert_eq!(classify(&[&globals], "other"), None);
    }
}
