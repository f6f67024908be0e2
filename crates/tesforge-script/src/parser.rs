//! Expression and argument parsing.
//!
//! Binary expressions use precedence climbing over [`BinaryOp::precedence`].
//! Function arguments are not comma separated: a call takes one token per
//! declared parameter and stops early at an operator or the end of the
//! statement, which is why negative literals are written `~5`.

use crate::ast::{Arg, BinaryOp, Call, Expr, SetTarget};
use crate::catalog::{FunctionDef, ParamDef, ValueKind};
use crate::compiler::Unit;
use crate::error::{diag, Fault, Step};
use crate::lexer::{Keyword, NameKind, Symbol, Token, TokenKind};
use crate::symbols::VarKind;

/// Cursor over the tokens of one statement.
pub(crate) struct Tokens<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Tokens<'t> {
    pub(crate) fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn at_symbol(&self, symbol: Symbol) -> bool {
        self.peek().is_some_and(|t| t.is_symbol(symbol))
    }

    fn eat_symbol(&mut self, symbol: Symbol) -> bool {
        let hit = self.at_symbol(symbol);
        if hit {
            self.pos += 1;
        }
        hit
    }

    pub(crate) fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        let hit = self.peek().is_some_and(|t| t.is_keyword(keyword));
        if hit {
            self.pos += 1;
        }
        hit
    }

    /// Arguments stop at an operator or the end of the statement.
    fn at_argument_end(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), None | Some(TokenKind::Symbol(_)))
    }
}

/// Source-like text of a token, for messages.
pub(crate) fn describe(token: &Token) -> String {
    match &token.kind {
        TokenKind::Int(v) => v.to_string(),
        TokenKind::Float(v) => v.to_string(),
        TokenKind::Keyword(k) => k.as_str().to_string(),
        TokenKind::Symbol(s) => s.as_str().to_string(),
        TokenKind::Str(s) => format!("\"{s}\""),
        TokenKind::Ident(s) | TokenKind::Name(_, s) => s.clone(),
    }
}

/// The object on the left of a `.`.
struct Owner {
    index: u16,
    /// Editor id, when the owner is a named object; only those expose
    /// variables.
    editor_id: Option<String>,
}

impl Unit<'_> {
    pub(crate) fn expression(&mut self, t: &mut Tokens<'_>) -> Step<Expr> {
        if t.peek().is_none() {
            return diag("expected an expression");
        }
        self.binary(t, BinaryOp::LOOSEST)
    }

    /// Parse operands joined by operators binding at `limit` or tighter.
    fn binary(&mut self, t: &mut Tokens<'_>, limit: u8) -> Step<Expr> {
        let mut lhs = self.unary(t)?;
        while let Some(op) = t.peek().and_then(binary_op) {
            let precedence = op.precedence();
            if precedence > limit {
                break;
            }
            t.next();
            let rhs = self.binary(t, precedence - 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self, t: &mut Tokens<'_>) -> Step<Expr> {
        if t.eat_symbol(Symbol::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary(t)?)));
        }
        self.primary(t)
    }

    fn primary(&mut self, t: &mut Tokens<'_>) -> Step<Expr> {
        let ctx = self.ctx;
        let Some(token) = t.next() else {
            return diag("expression ends early");
        };
        match &token.kind {
            TokenKind::Int(v) => Ok(Expr::Int(*v)),
            TokenKind::Float(v) => Ok(Expr::Float(*v)),
            TokenKind::Symbol(Symbol::LParen) => {
                let inner = self.binary(t, BinaryOp::LOOSEST)?;
                if !t.eat_symbol(Symbol::RParen) {
                    return diag("expected ')'");
                }
                Ok(inner)
            }
            TokenKind::Name(NameKind::Local | NameKind::EditorId, _) | TokenKind::Ident(_)
                if t.at_symbol(Symbol::Dot) =>
            {
                self.member(token, t, true)
            }
            TokenKind::Name(NameKind::Local, name) => {
                let Some(local) = self.local(name) else {
                    return Err(self.undeclared(name));
                };
                let (kind, slot) = (local.kind, local.slot);
                Ok(match kind {
                    VarKind::Ref => Expr::Reference(self.local_reference(slot)),
                    _ => Expr::Local { kind, slot },
                })
            }
            TokenKind::Name(NameKind::Global, name) => match ctx.symbols.global(name) {
                Some(global) => Ok(Expr::Global(self.form_reference(global.form_id))),
                None => Err(self.undeclared(name)),
            },
            TokenKind::Name(NameKind::Function, name) => match ctx.catalog.function(name) {
                Some(def) => {
                    returns_value(def)?;
                    Ok(Expr::Call(self.call(def, None, t)?))
                }
                None => Err(self.undeclared(name)),
            },
            TokenKind::Name(NameKind::EditorId, name) => match ctx.symbols.editor_id(name) {
                Some(info) => Ok(Expr::Reference(self.form_reference(info.form_id))),
                None => Err(self.undeclared(name)),
            },
            TokenKind::Ident(name) => Err(self.undeclared(name)),
            TokenKind::Str(_) => diag("strings are only allowed as function arguments"),
            _ => diag(format!("unexpected '{}' in expression", describe(token))),
        }
    }

    /// Resolve the object before a `.`.
    fn owner(&mut self, token: &Token) -> Step<Owner> {
        let ctx = self.ctx;
        match &token.kind {
            TokenKind::Name(NameKind::Local, name) => match self.local(name) {
                Some(local) if local.kind == VarKind::Ref => {
                    let slot = local.slot;
                    Ok(Owner {
                        index: self.local_reference(slot),
                        editor_id: None,
                    })
                }
                Some(_) => diag(format!("'{name}' is not a ref variable")),
                None => Err(self.undeclared(name)),
            },
            TokenKind::Name(NameKind::EditorId, name) => match ctx.symbols.editor_id(name) {
                Some(info) => Ok(Owner {
                    index: self.form_reference(info.form_id),
                    editor_id: Some(name.clone()),
                }),
                None => Err(self.undeclared(name)),
            },
            TokenKind::Ident(name) => Err(self.undeclared(name)),
            _ => diag(format!("'{}' cannot be used before '.'", describe(token))),
        }
    }

    /// `owner.Function args` or `owner.variable`; the cursor is on the dot.
    /// With `as_value`, a function that returns nothing is rejected.
    pub(crate) fn member(&mut self, owner_token: &Token, t: &mut Tokens<'_>, as_value: bool) -> Step<Expr> {
        let ctx = self.ctx;
        t.next();
        let owner = self.owner(owner_token)?;
        let Some(name) = t.next().and_then(|m| m.ident()) else {
            return diag("expected a name after '.'");
        };

        if let Some(def) = ctx.catalog.function(name) {
            if !def.reference {
                return diag(format!("'{}' cannot be called on a reference", def.name));
            }
            if as_value {
                returns_value(def)?;
            }
            return Ok(Expr::Call(self.call(def, Some(owner.index), t)?));
        }

        let Some(editor_id) = owner.editor_id else {
            return diag(format!("'{name}' is not a function"));
        };
        match ctx.symbols.far_variable(&editor_id, name) {
            Some(var) => Ok(Expr::FarVar {
                owner: owner.index,
                var,
            }),
            None if !ctx.symbols.has_far_variables(&editor_id) => {
                diag(format!("'{editor_id}' has no script variables"))
            }
            None => Err(self.undeclared(&format!("{editor_id}.{name}"))),
        }
    }

    pub(crate) fn set_target(&mut self, t: &mut Tokens<'_>) -> Step<SetTarget> {
        let ctx = self.ctx;
        let Some(token) = t.next() else {
            return diag("expected a variable after 'set'");
        };
        if t.at_symbol(Symbol::Dot) {
            return match self.member(token, t, false)? {
                Expr::FarVar { owner, var } => Ok(SetTarget::FarVar { owner, var }),
                _ => diag(format!("cannot assign to a function call on '{}'", describe(token))),
            };
        }
        match &token.kind {
            TokenKind::Name(NameKind::Local, name) => match self.local(name) {
                Some(local) => Ok(SetTarget::Local {
                    kind: local.kind,
                    slot: local.slot,
                }),
                None => Err(self.undeclared(name)),
            },
            TokenKind::Name(NameKind::Global, name) => match ctx.symbols.global(name) {
                Some(global) => Ok(SetTarget::Global(self.form_reference(global.form_id))),
                None => Err(self.undeclared(name)),
            },
            TokenKind::Ident(name) => Err(self.undeclared(name)),
            _ => diag(format!("cannot assign to '{}'", describe(token))),
        }
    }

    pub(crate) fn call(&mut self, def: &FunctionDef, target: Option<u16>, t: &mut Tokens<'_>) -> Step<Call> {
        let args = self.arguments(&def.name, &def.params, def.skip_args, t)?;
        Ok(Call {
            opcode: def.opcode,
            target,
            has_params: !def.params.is_empty() || !args.is_empty(),
            args,
        })
    }

    /// Arguments for `params`. With `extra_variables`, trailing variables
    /// past the declared parameters are accepted as well.
    pub(crate) fn arguments(
        &mut self,
        name: &str,
        params: &[ParamDef],
        extra_variables: bool,
        t: &mut Tokens<'_>,
    ) -> Step<Vec<Arg>> {
        let mut args = Vec::new();
        for (i, param) in params.iter().enumerate() {
            if t.at_argument_end() {
                let required = params.iter().take_while(|p| !p.optional).count();
                if i < required {
                    return diag(format!(
                        "'{name}' needs {required} argument(s) but {i} were given"
                    ));
                }
                break;
            }
            args.push(self.argument(name, i + 1, param, t)?);
        }
        if extra_variables {
            while !t.at_argument_end() {
                args.push(self.variable_argument(name, t)?);
            }
        }
        Ok(args)
    }

    fn argument(&mut self, function: &str, index: usize, param: &ParamDef, t: &mut Tokens<'_>) -> Step<Arg> {
        let ctx = self.ctx;
        let Some(token) = t.next() else {
            return diag(format!("argument {index} of '{function}' is missing"));
        };
        let expected = |what: &str| -> Step<Arg> {
            diag(format!(
                "argument {index} of '{function}' must be {what}, not '{}'",
                describe(token)
            ))
        };

        match param.kind {
            ValueKind::Int | ValueKind::Float => {
                let float = param.kind == ValueKind::Float;
                match &token.kind {
                    TokenKind::Int(v) if float => Ok(Arg::Float(f64::from(*v))),
                    TokenKind::Int(v) => Ok(Arg::Int(*v)),
                    TokenKind::Float(v) if float => Ok(Arg::Float(*v)),
                    TokenKind::Float(v) => match whole_number(*v) {
                        Some(v) => Ok(Arg::Int(v)),
                        None => expected("a whole number"),
                    },
                    TokenKind::Name(NameKind::Local, name) => match self.local(name) {
                        Some(local) if local.kind != VarKind::Ref => Ok(Arg::Local {
                            kind: local.kind,
                            slot: local.slot,
                        }),
                        Some(_) => expected("a number"),
                        None => Err(self.undeclared(name)),
                    },
                    TokenKind::Name(NameKind::Global, name) => match ctx.symbols.global(name) {
                        Some(global) => Ok(Arg::Global(self.form_reference(global.form_id))),
                        None => Err(self.undeclared(name)),
                    },
                    TokenKind::Ident(name) => Err(self.undeclared(name)),
                    _ => expected("a number"),
                }
            }
            ValueKind::Short => match &token.kind {
                TokenKind::Int(v) if (i32::from(i16::MIN)..=i32::from(u16::MAX)).contains(v) => {
                    Ok(Arg::Short(*v as u16))
                }
                _ => expected("a 16-bit integer"),
            },
            ValueKind::Ref => match &token.kind {
                TokenKind::Name(NameKind::EditorId, name) => match ctx.symbols.editor_id(name) {
                    Some(info) => Ok(Arg::Ref(self.form_reference(info.form_id))),
                    None => Err(self.undeclared(name)),
                },
                TokenKind::Name(NameKind::Local, name) => match self.local(name) {
                    Some(local) if local.kind == VarKind::Ref => {
                        let slot = local.slot;
                        Ok(Arg::Ref(self.local_reference(slot)))
                    }
                    Some(_) => expected("a reference"),
                    None => Err(self.undeclared(name)),
                },
                TokenKind::Ident(name) => Err(self.undeclared(name)),
                _ => expected("a reference"),
            },
            ValueKind::String => match &token.kind {
                TokenKind::Str(s) => Ok(Arg::Str(s.clone())),
                _ => expected("a string"),
            },
            ValueKind::Axis => match token.ident().map(|s| s.to_ascii_uppercase()).as_deref() {
                Some("X") => Ok(Arg::Short(u16::from(b'X'))),
                Some("Y") => Ok(Arg::Short(u16::from(b'Y'))),
                Some("Z") => Ok(Arg::Short(u16::from(b'Z'))),
                _ => expected("an axis (X/Y/Z)"),
            },
            ValueKind::Enum => {
                let enum_name = param.enum_name.as_deref().unwrap_or_default();
                match &token.kind {
                    TokenKind::Int(v) => match u16::try_from(*v) {
                        Ok(v) => Ok(Arg::Short(v)),
                        Err(_) => expected(&format!("a value of {enum_name}")),
                    },
                    TokenKind::Ident(name) | TokenKind::Name(_, name) => {
                        match ctx.catalog.enum_value(enum_name, name) {
                            Some(v) => Ok(Arg::Short(v)),
                            None => diag(format!("'{name}' is not a value of {enum_name}")),
                        }
                    }
                    _ => expected(&format!("a value of {enum_name}")),
                }
            }
            ValueKind::Void => Err(Fault::Structural(format!(
                "'{function}' declares a void parameter"
            ))),
        }
    }

    /// A trailing variable argument, as taken by message functions.
    fn variable_argument(&mut self, function: &str, t: &mut Tokens<'_>) -> Step<Arg> {
        let ctx = self.ctx;
        let Some(token) = t.next() else {
            return diag("expression ends early");
        };
        match &token.kind {
            TokenKind::Int(v) => Ok(Arg::Int(*v)),
            TokenKind::Float(v) => Ok(Arg::Float(*v)),
            TokenKind::Name(NameKind::Local, name) => match self.local(name) {
                Some(local) if local.kind == VarKind::Ref => {
                    let slot = local.slot;
                    Ok(Arg::Ref(self.local_reference(slot)))
                }
                Some(local) => Ok(Arg::Local {
                    kind: local.kind,
                    slot: local.slot,
                }),
                None => Err(self.undeclared(name)),
            },
            TokenKind::Name(NameKind::Global, name) => match ctx.symbols.global(name) {
                Some(global) => Ok(Arg::Global(self.form_reference(global.form_id))),
                None => Err(self.undeclared(name)),
            },
            TokenKind::Ident(name) => Err(self.undeclared(name)),
            _ => diag(format!(
                "extra arguments to '{function}' must be variables, not '{}'",
                describe(token)
            )),
        }
    }
}

fn returns_value(def: &FunctionDef) -> Step<()> {
    if def.returns == ValueKind::Void {
        return diag(format!("'{}' does not return a value", def.name));
    }
    Ok(())
}

/// `v` as an `i32`, if it has no fractional part and fits.
fn whole_number(v: f64) -> Option<i32> {
    let range = f64::from(i32::MIN)..=f64::from(i32::MAX);
    (v.fract() == 0.0 && range.contains(&v)).then_some(v as i32)
}

fn binary_op(token: &Token) -> Option<BinaryOp> {
    match token.kind {
        TokenKind::Symbol(symbol) => BinaryOp::from_symbol(symbol),
        _ => None,
    }
}
