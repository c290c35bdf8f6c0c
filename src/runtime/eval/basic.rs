//! Reference eval compiler
//!
//! Performs the early checks a script engine runs before executing eval code:
//! tokenization, bracket balance, strict-mode restrictions and context checks
//! for `super` and `new.target`. The result is an [`EvalExecutable`] recording
//! which referenced identifiers need TDZ checks.

use std::iter::Peekable;
use std::rc::Rc;
use std::str::CharIndices;

use indexmap::IndexSet;
use tracing::trace;
use unicode_ident::{is_xid_continue, is_xid_start};

use super::compiler::{
    CompileError, CompileRequest, DerivedContextType, EvalCompiler, EvalContextType, EvalFlags,
};
use super::key::CallSiteIndex;
use super::source::SourceText;
use crate::runtime::gc::{OwnerId, GC};
use crate::runtime::memory::Gc;
use crate::util::span::Position;

/// Compiled eval unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalExecutable {
    source: SourceText,
    call_site: CallSiteIndex,
    flags: EvalFlags,
    owner: OwnerId,
    token_count: usize,
    tdz_checks: Vec<Rc<str>>,
}

impl EvalExecutable {
    pub fn source(&self) -> &SourceText {
        &self.source
    }

    pub fn call_site(&self) -> CallSiteIndex {
        self.call_site
    }

    pub fn flags(&self) -> EvalFlags {
        self.flags
    }

    /// Code block the unit was compiled for
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Referenced bindings that were in their TDZ at compile time
    pub fn tdz_checks(&self) -> impl Iterator<Item = &str> + '_ {
        self.tdz_checks.iter().map(|name| &**name)
    }

    pub fn is_strict(&self) -> bool {
        self.flags.in_strict_context
    }
}

/// Reference implementation of [`EvalCompiler`]
#[derive(Debug, Default)]
pub struct BasicCompiler {
    compilations: usize,
    failures: usize,
}

impl BasicCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `compile` calls, failed ones included
    pub fn compilations(&self) -> usize {
        self.compilations
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}

impl EvalCompiler<EvalExecutable> for BasicCompiler {
    fn compile(
        &mut self,
        heap: &mut GC<EvalExecutable>,
        request: &CompileRequest<'_>,
    ) -> Result<Gc<EvalExecutable>, CompileError> {
        self.compilations += 1;
        let analysis = match analyze(request) {
            Ok(analysis) => analysis,
            Err(err) => {
                self.failures += 1;
                return Err(err);
            }
        };
        trace!(
            tokens = analysis.token_count,
            tdz = analysis.tdz_checks.len(),
            "compiled eval at {}",
            request.call_site
        );

        Ok(heap.alloc(EvalExecutable {
            source: request.source.clone(),
            call_site: request.call_site,
            flags: request.flags,
            owner: request.owner,
            token_count: analysis.token_count,
            tdz_checks: analysis.tdz_checks,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Ident(String),
    Number,
    Str,
    Punct(char),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: Position,
}

struct Analysis {
    token_count: usize,
    tdz_checks: Vec<Rc<str>>,
}

const PUNCTUATION: &str = "(){}[];,.+-*/%=<>!&|^~?:";

struct Cursor<'s> {
    chars: Peekable<CharIndices<'s>>,
    line: usize,
    column: usize,
    offset: usize,
}

impl<'s> Cursor<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    fn position(&self) -> Position {
        Position::with_offset(self.line, self.column, self.offset)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn peek_second(&self) -> Option<char> {
        self.chars.clone().nth(1).map(|(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let (offset, c) = self.chars.next()?;
        self.offset = offset + c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat_while(
        &mut self,
        mut predicate: impl FnMut(char) -> bool,
    ) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }
}

fn is_ident_start(c: char) -> bool {
    c == '$' || c == '_' || is_xid_start(c)
}

fn is_ident_continue(c: char) -> bool {
    c == '$' || is_xid_continue(c)
}

fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();

    while let Some(c) = cursor.peek() {
        let position = cursor.position();

        if c.is_whitespace() {
            cursor.bump();
            continue;
        }

        if c == '/' && cursor.peek_second() == Some('/') {
            cursor.eat_while(|c| c != '\n');
            continue;
        }

        if c == '/' && cursor.peek_second() == Some('*') {
            cursor.bump();
            cursor.bump();
            let mut closed = false;
            while let Some(c) = cursor.bump() {
                if c == '*' && cursor.peek() == Some('/') {
                    cursor.bump();
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(CompileError::syntax("unterminated comment", position));
            }
            continue;
        }

        let kind = if is_ident_start(c) {
            TokenKind::Ident(cursor.eat_while(is_ident_continue))
        } else if c.is_ascii_digit() {
            cursor.eat_while(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
            TokenKind::Number
        } else if matches!(c, '"' | '\'' | '`') {
            lex_string(&mut cursor, c, position)?;
            TokenKind::Str
        } else if PUNCTUATION.contains(c) {
            cursor.bump();
            TokenKind::Punct(c)
        } else {
            return Err(CompileError::syntax(
                format!("unexpected character '{}'", c),
                position,
            ));
        };

        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}

fn lex_string(
    cursor: &mut Cursor<'_>,
    quote: char,
    start: Position,
) -> Result<(), CompileError> {
    cursor.bump();
    while let Some(c) = cursor.bump() {
        match c {
            '\\' => {
                cursor.bump();
            }
            '\n' if quote != '`' => break,
            c if c == quote => return Ok(()),
            _ => {}
        }
    }
    Err(CompileError::syntax("unterminated string literal", start))
}

fn check_brackets(tokens: &[Token]) -> Result<(), CompileError> {
    let mut open: Vec<(char, Position)> = Vec::new();
    for token in tokens {
        let TokenKind::Punct(c) = token.kind else {
            continue;
        };
        match c {
            '(' | '[' | '{' => open.push((c, token.position)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match open.pop() {
                    Some((opener, _)) if opener == expected => {}
                    _ => {
                        return Err(CompileError::syntax(
                            format!("unexpected '{}'", c),
                            token.position,
                        ))
                    }
                }
            }
            _ => {}
        }
    }

    match open.pop() {
        Some((opener, position)) => Err(CompileError::syntax(
            format!("unclosed '{}'", opener),
            position,
        )),
        None => Ok(()),
    }
}

fn analyze(request: &CompileRequest<'_>) -> Result<Analysis, CompileError> {
    let tokens = tokenize(request.source.as_str())?;
    check_brackets(&tokens)?;

    let flags = request.flags;
    let mut tdz_checks: IndexSet<Rc<str>> = IndexSet::new();

    for (i, token) in tokens.iter().enumerate() {
        let TokenKind::Ident(name) = &token.kind else {
            continue;
        };
        let is_property = i > 0 && tokens[i - 1].kind == TokenKind::Punct('.');
        if is_property {
            continue;
        }

        match name.as_str() {
            "with" if flags.in_strict_context => {
                return Err(CompileError::syntax(
                    "strict mode code may not include a with statement",
                    token.position,
                ));
            }
            "super" if flags.derived_context_type == DerivedContextType::None => {
                return Err(CompileError::semantic(
                    "'super' is only valid inside derived class constructors and methods",
                    token.position,
                ));
            }
            "new" if is_new_target(&tokens[i + 1..]) => {
                let in_function = flags.eval_context_type == EvalContextType::FunctionEvalContext
                    || flags.is_arrow_function_context;
                if !in_function {
                    return Err(CompileError::semantic(
                        "new.target is only valid inside functions",
                        token.position,
                    ));
                }
            }
            _ => {
                if let Some(binding) = request.variables_under_tdz.get(name) {
                    tdz_checks.insert(Rc::clone(binding));
                }
            }
        }
    }

    Ok(Analysis {
        token_count: tokens.len(),
        tdz_checks: tdz_checks.into_iter().collect(),
    })
}

fn is_new_target(rest: &[Token]) -> bool {
    matches!(
        rest,
        [
            Token {
                kind: TokenKind::Punct('.'),
                ..
            },
            Token {
                kind: TokenKind::Ident(name),
                ..
            },
            ..
        ] if name == "target"
    )
}
