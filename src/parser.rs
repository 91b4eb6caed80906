use log::debug;
use thiserror::Error;

use crate::{
    ast::{Ast, NodeId, NodeKind},
    lexer::{LexError, Lexer},
    symbol::{SymbolKind, SymbolTable, SymbolType},
    token::{Terminal, Token},
};

/// Expression scanning
mod expr;

/// Buffered token stream used for lookahead and backtracking
pub mod stream;

use stream::TokenStream;

/// Deepest nesting of blocks, calls and operators a source file may hold.
pub const MAX_NESTING: usize = 128;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("Invalid statement")]
    InvalidStatement,

    #[error("Invalid parameter")]
    InvalidParam,

    #[error("Invalid block-typed parameter")]
    InvalidBlockParam,

    #[error("Invalid parameter list")]
    InvalidParamList,

    #[error("Invalid function definition")]
    InvalidFuncDef,

    #[error("Invalid if-statement")]
    InvalidIf,

    #[error("Invalid jump statement")]
    InvalidJump,

    #[error("Invalid block statement")]
    InvalidBlock,

    #[error("Not enough arguments for operator {0}")]
    NotEnoughArguments(Terminal),

    #[error("Missing operator")]
    MissingOperator,

    #[error("Function call without identifier")]
    CallWithoutIdentifier,

    #[error("Redeclared symbol `{0}`")]
    Redeclared(String),

    #[error("Expected {0}, found {1}")]
    Expected(String, String),

    #[error("Nested deeper than {0} levels")]
    Nesting(usize),
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("Ln {line}, col {column}: parsing error: {kind}")]
    Syntax {
        kind: ParseErrorKind,
        line: usize,
        column: usize,
    },
}

impl ParseError {
    /// The syntax error kind, if this is not a lexing error.
    pub fn kind(&self) -> Option<&ParseErrorKind> {
        match self {
            Self::Syntax { kind, .. } => Some(kind),
            Self::Lex(_) => None,
        }
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// A saved parser position, restored when a trial parse fails.
#[derive(Clone, Copy)]
struct Checkpoint {
    cur: usize,
    nodes: usize,
}

/// The result of parsing a whole file.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub ast: Ast,
    /// The top-level `Block`
    pub root: NodeId,
    pub symbols: SymbolTable,
}

/// Backtracking recursive-descent parser.
///
/// Every `Option`-returning rule either recognises its construct or returns
/// `None`, in which case the caller restores its checkpoint. Errors are fatal.
pub struct Parser<I> {
    stream: TokenStream<I>,
    cur: usize,
    ast: Ast,
    symbols: SymbolTable,
    /// Labels of the enclosing function definitions
    namespace: Vec<String>,
    /// Blocks and calls currently open
    depth: usize,
}

impl<'a> Parser<Lexer<&'a [u8]>> {
    /// Parses a whole source string.
    pub fn parse(input: &'a str, word_length: usize) -> ParseResult<Parsed> {
        Parser::new(Lexer::new(input.as_bytes()), word_length).finish()
    }
}

impl<I> Parser<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    pub fn new(tokens: I, word_length: usize) -> Self {
        Self {
            stream: TokenStream::new(tokens),
            cur: 0,
            ast: Ast::default(),
            symbols: SymbolTable::new(word_length),
            namespace: vec![],
            depth: 0,
        }
    }

    /// Parses every statement up to the end of input.
    pub fn finish(mut self) -> ParseResult<Parsed> {
        let mut stmts = vec![];

        loop {
            self.skip_newlines()?;
            if self.peek_kind(0)?.is_none() {
                break;
            }

            match self.statement()? {
                Some(stmt) => stmts.push(stmt),
                None => return Err(self.fail(ParseErrorKind::InvalidStatement)),
            }
        }

        let root = self.ast.add(NodeKind::Block, None, stmts);

        debug!(
            "parsed {} tokens into {} nodes, {} symbols",
            self.stream.pulled(),
            self.ast.len(),
            self.symbols.len()
        );

        Ok(Parsed {
            ast: self.ast,
            root,
            symbols: self.symbols,
        })
    }

    fn peek(&mut self, ahead: usize) -> ParseResult<Option<&Token>> {
        Ok(self.stream.get(self.cur + ahead)?)
    }

    fn peek_kind(&mut self, ahead: usize) -> ParseResult<Option<Terminal>> {
        Ok(self.peek(ahead)?.map(|token| token.kind))
    }

    fn is(&mut self, ahead: usize, kind: Terminal) -> ParseResult<bool> {
        Ok(self.peek_kind(ahead)? == Some(kind))
    }

    /// Consumes the current token.
    fn advance(&mut self) -> ParseResult<Token> {
        let token = self
            .peek(0)?
            .cloned()
            .ok_or_else(|| self.fail(ParseErrorKind::Expected("token".to_string(), "EOF".to_string())))?;
        self.cur += 1;
        Ok(token)
    }

    /// Consumes the current token if it is of the given kind.
    fn eat(&mut self, kind: Terminal) -> ParseResult<Option<Token>> {
        if self.is(0, kind)? {
            self.advance().map(Some)
        } else {
            Ok(None)
        }
    }

    fn expect(&mut self, kind: Terminal, err: ParseErrorKind) -> ParseResult<Token> {
        self.eat(kind)?.ok_or_else(|| self.fail(err))
    }

    fn skip_newlines(&mut self) -> ParseResult<()> {
        while self.eat(Terminal::Newline)?.is_some() {}
        Ok(())
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.fail(ParseErrorKind::Nesting(MAX_NESTING)));
        }

        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn save(&self) -> Checkpoint {
        Checkpoint {
            cur: self.cur,
            nodes: self.ast.len(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.cur = checkpoint.cur;
        self.ast.truncate(checkpoint.nodes);
    }

    /// Builds an error located at the current token.
    fn fail(&self, kind: ParseErrorKind) -> ParseError {
        let (line, column) = self
            .stream
            .buffered(self.cur)
            .or(self.stream.last())
            .map(|token| (token.line, token.column))
            .unwrap_or((1, 1));
        ParseError::Syntax { kind, line, column }
    }

    fn fail_at(token: &Token, kind: ParseErrorKind) -> ParseError {
        ParseError::Syntax {
            kind,
            line: token.line,
            column: token.column,
        }
    }

    /// Describes the current token for error messages.
    fn found(&mut self) -> ParseResult<String> {
        Ok(self
            .peek(0)?
            .map(|token| token.to_string())
            .unwrap_or_else(|| "EOF".to_string()))
    }

    /// Registers `token`'s name in the current namespace, returning the
    /// qualified name.
    fn declare(
        &mut self,
        token: &Token,
        kind: SymbolKind,
        ty: SymbolType,
        node: Option<NodeId>,
    ) -> ParseResult<String> {
        self.symbols
            .declare(&self.namespace, token.name(), kind, ty, node)
            .map(|symbol| symbol.name.clone())
            .map_err(|err| Self::fail_at(token, ParseErrorKind::Redeclared(err.0)))
    }

    fn declare_param(&mut self, param: NodeId, kind: SymbolKind) -> ParseResult<()> {
        let node = &self.ast[param];
        let ty = match node.children.first().map(|ty| &self.ast[*ty].token) {
            Some(Some(token)) if token.kind == Terminal::Byte => SymbolType::Byte,
            Some(Some(token)) => SymbolType::Block(token.value.unwrap_or_default()),
            _ => SymbolType::Word,
        };
        let token = node
            .token
            .clone()
            .unwrap_or_else(|| Token::new(Terminal::Identifier, 1, 1));
        self.declare(&token, kind, ty, Some(param)).map(|_| ())
    }

    /// Parses one statement, trying each kind of statement in turn.
    fn statement(&mut self) -> ParseResult<Option<NodeId>> {
        if let Some(stmt) = self.labeled()? {
            return Ok(Some(stmt));
        }

        let alternatives: [fn(&mut Self) -> ParseResult<Option<NodeId>>; 7] = [
            Self::unlabeled_func,
            Self::if_stmt,
            Self::auto_var_stmt,
            Self::alias_stmt,
            Self::assign_stmt,
            Self::jump_stmt,
            Self::return_stmt,
        ];

        for alternative in alternatives {
            let checkpoint = self.save();
            if let Some(stmt) = alternative(self)? {
                return Ok(Some(stmt));
            }
            self.restore(checkpoint);
        }

        Ok(None)
    }

    /// `Identifier ':'` followed by a function definition, an if statement, a
    /// block or an expression.
    fn labeled(&mut self) -> ParseResult<Option<NodeId>> {
        if !(self.is(0, Terminal::Identifier)? && self.is(1, Terminal::Alias)?) {
            return Ok(None);
        }

        let label = self.advance()?;
        let colon = self.advance()?;

        match self.peek_kind(0)? {
            Some(Terminal::Func) => self.func_def(label).map(Some),

            Some(Terminal::If) => {
                let name = self.declare(&label, SymbolKind::Label, SymbolType::Word, None)?;
                let stmt = self
                    .if_stmt()?
                    .ok_or_else(|| self.fail(ParseErrorKind::InvalidIf))?;
                Ok(Some(self.label(label, name, stmt)))
            }

            Some(Terminal::Newline) if self.indent_follows()? => {
                let name = self.declare(&label, SymbolKind::Label, SymbolType::Word, None)?;
                self.advance()?;
                let block = self
                    .block()?
                    .ok_or_else(|| self.fail(ParseErrorKind::InvalidBlock))?;
                Ok(Some(self.label(label, name, block)))
            }

            _ => {
                // A label followed by an expression aliases that expression
                let value = self
                    .expression()?
                    .ok_or_else(|| Self::fail_at(&label, ParseErrorKind::InvalidStatement))?;
                self.expect(Terminal::Newline, ParseErrorKind::InvalidStatement)?;

                let param = self.ast.add(NodeKind::Param, Some(label), vec![]);
                self.declare_param(param, SymbolKind::Alias)?;
                Ok(Some(self.ast.add(
                    NodeKind::AliasStmt,
                    Some(colon),
                    vec![param, value],
                )))
            }
        }
    }

    fn label(&mut self, label: Token, name: String, stmt: NodeId) -> NodeId {
        let node = self.ast.add(NodeKind::Label, Some(label), vec![stmt]);
        self.symbols.bind(&name, node);
        node
    }

    /// `func params (-> params)? Newline Block`, named by its label.
    fn func_def(&mut self, label: Token) -> ParseResult<NodeId> {
        self.expect(Terminal::Func, ParseErrorKind::InvalidFuncDef)?;
        let name = self.declare(&label, SymbolKind::Function, SymbolType::Function, None)?;
        self.namespace.push(label.name().to_string());

        let params = self.param_list()?.unwrap_or_default();
        for param in &params {
            self.declare_param(*param, SymbolKind::Param)?;
        }

        let mut returns = vec![];
        if self.eat(Terminal::Map)?.is_some() {
            returns = self
                .param_list()?
                .ok_or_else(|| self.fail(ParseErrorKind::InvalidFuncDef))?;
            for param in &returns {
                self.declare_param(*param, SymbolKind::Return)?;
            }
        }

        self.expect(Terminal::Newline, ParseErrorKind::InvalidFuncDef)?;
        let body = self
            .block()?
            .ok_or_else(|| self.fail(ParseErrorKind::InvalidFuncDef))?;

        self.namespace.pop();

        let kind = NodeKind::FuncDef {
            returns: returns.len(),
        };
        let children = params.into_iter().chain(returns).chain([body]).collect();
        let node = self.ast.add(kind, Some(label), children);
        self.symbols.bind(&name, node);

        Ok(node)
    }

    /// A function needs a label to be named by.
    fn unlabeled_func(&mut self) -> ParseResult<Option<NodeId>> {
        if self.is(0, Terminal::Func)? {
            return Err(self.fail(ParseErrorKind::InvalidFuncDef));
        }
        Ok(None)
    }

    /// Whether the next non-blank line opens a block.
    fn indent_follows(&mut self) -> ParseResult<bool> {
        let mut ahead = 0;
        while self.is(ahead, Terminal::Newline)? {
            ahead += 1;
        }
        Ok(ahead > 0 && self.is(ahead, Terminal::Indent)?)
    }

    /// `Indent statements Dedent`, after any blank lines
    fn block(&mut self) -> ParseResult<Option<NodeId>> {
        self.skip_newlines()?;
        if self.eat(Terminal::Indent)?.is_none() {
            return Ok(None);
        }

        let stmts = self.nested(Self::block_statements)?;
        if stmts.is_empty() {
            return Err(self.fail(ParseErrorKind::InvalidBlock));
        }

        Ok(Some(self.ast.add(NodeKind::Block, None, stmts)))
    }

    /// Statements up to and including the closing `Dedent`.
    fn block_statements(&mut self) -> ParseResult<Vec<NodeId>> {
        let mut stmts = vec![];
        loop {
            self.skip_newlines()?;
            match self.peek_kind(0)? {
                Some(Terminal::Dedent) => {
                    self.advance()?;
                    break;
                }
                None => return Err(self.fail(ParseErrorKind::InvalidBlock)),
                Some(_) => match self.statement()? {
                    Some(stmt) => stmts.push(stmt),
                    None => return Err(self.fail(ParseErrorKind::InvalidStatement)),
                },
            }
        }

        Ok(stmts)
    }

    fn if_stmt(&mut self) -> ParseResult<Option<NodeId>> {
        let Some(keyword) = self.eat(Terminal::If)? else {
            return Ok(None);
        };

        let cond = self
            .expression()?
            .ok_or_else(|| self.fail(ParseErrorKind::InvalidIf))?;
        self.expect(Terminal::Newline, ParseErrorKind::InvalidIf)?;
        let body = self
            .block()?
            .ok_or_else(|| self.fail(ParseErrorKind::InvalidIf))?;

        Ok(Some(self.ast.add(NodeKind::IfStmt, Some(keyword), vec![cond, body])))
    }

    /// `<byte | block N>? Identifier`
    fn param(&mut self) -> ParseResult<Option<NodeId>> {
        let ty = match self.peek_kind(0)? {
            Some(Terminal::Byte) => {
                let token = self.advance()?;
                Some(self.ast.add(NodeKind::Type, Some(token), vec![]))
            }
            Some(Terminal::Block) => {
                self.advance()?;
                let length = self
                    .eat(Terminal::Literal)?
                    .ok_or_else(|| self.fail(ParseErrorKind::InvalidBlockParam))?;
                Some(self.ast.add(NodeKind::Type, Some(length), vec![]))
            }
            Some(Terminal::Identifier) => None,
            _ => return Ok(None),
        };

        let name = self.expect(Terminal::Identifier, ParseErrorKind::InvalidParam)?;
        Ok(Some(self.ast.add(NodeKind::Param, Some(name), ty.into_iter().collect())))
    }

    /// One or more comma separated parameters.
    fn param_list(&mut self) -> ParseResult<Option<Vec<NodeId>>> {
        let Some(first) = self.param()? else {
            return Ok(None);
        };

        let mut params = vec![first];
        while self.eat(Terminal::Comma)?.is_some() {
            let param = self
                .param()?
                .ok_or_else(|| self.fail(ParseErrorKind::InvalidParamList))?;
            params.push(param);
        }

        Ok(Some(params))
    }

    /// `params := Expr`
    fn auto_var_stmt(&mut self) -> ParseResult<Option<NodeId>> {
        let Some(params) = self.param_list()? else {
            return Ok(None);
        };
        let Some(op) = self.eat(Terminal::AutoVar)? else {
            return Ok(None);
        };

        for param in &params {
            self.declare_param(*param, SymbolKind::Automatic)?;
        }

        let value = self.required_expression()?;
        self.expect(Terminal::Newline, ParseErrorKind::InvalidStatement)?;

        let children = params.into_iter().chain([value]).collect();
        Ok(Some(self.ast.add(NodeKind::AutoVarStmt, Some(op), children)))
    }

    /// `param : Expr`
    fn alias_stmt(&mut self) -> ParseResult<Option<NodeId>> {
        let Some(param) = self.param()? else {
            return Ok(None);
        };
        let Some(op) = self.eat(Terminal::Alias)? else {
            return Ok(None);
        };

        self.declare_param(param, SymbolKind::Alias)?;

        let value = self.required_expression()?;
        self.expect(Terminal::Newline, ParseErrorKind::InvalidStatement)?;

        Ok(Some(self.ast.add(NodeKind::AliasStmt, Some(op), vec![param, value])))
    }

    /// `identifiers = Expr`
    fn assign_stmt(&mut self) -> ParseResult<Option<NodeId>> {
        let mut targets = vec![];
        loop {
            let Some(name) = self.eat(Terminal::Identifier)? else {
                return Ok(None);
            };
            targets.push(self.ast.add(NodeKind::Expr, Some(name), vec![]));

            if self.eat(Terminal::Comma)?.is_none() {
                break;
            }
        }

        let Some(op) = self.eat(Terminal::Assign)? else {
            return Ok(None);
        };

        let value = self.required_expression()?;
        self.expect(Terminal::Newline, ParseErrorKind::InvalidStatement)?;

        let children = targets.into_iter().chain([value]).collect();
        Ok(Some(self.ast.add(NodeKind::AssignStmt, Some(op), children)))
    }

    fn jump_stmt(&mut self) -> ParseResult<Option<NodeId>> {
        let Some(keyword) = self.eat(Terminal::Jump)? else {
            return Ok(None);
        };

        let target = self
            .expression()?
            .ok_or_else(|| self.fail(ParseErrorKind::InvalidJump))?;
        self.expect(Terminal::Newline, ParseErrorKind::InvalidJump)?;

        Ok(Some(self.ast.add(NodeKind::JumpStmt, Some(keyword), vec![target])))
    }

    fn return_stmt(&mut self) -> ParseResult<Option<NodeId>> {
        let Some(keyword) = self.eat(Terminal::Return)? else {
            return Ok(None);
        };

        self.expect(Terminal::Newline, ParseErrorKind::InvalidStatement)?;
        Ok(Some(self.ast.add(NodeKind::ReturnStmt, Some(keyword), vec![])))
    }

    fn required_expression(&mut self) -> ParseResult<NodeId> {
        match self.expression()? {
            Some(expr) => Ok(expr),
            None => {
                let found = self.found()?;
                Err(self.fail(ParseErrorKind::Expected("expression".to_string(), found)))
            }
        }
    }
}
