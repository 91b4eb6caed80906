use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::{
    ast::{Ast, NodeId, NodeKind, ops::Op},
    bytecode::{
        Block, BlockUnit, Expression, FormatError, FormatErrorKind, Function,
        INSTRUCTION_POINTER, MAX_WORD_LENGTH, Member, Program, Section, Statement, Storage, Variable, VariableKind, literal_bytes,
    },
    parser::Parsed,
    symbol::{SEPARATOR, Symbol, SymbolKind, SymbolTable, SymbolType},
    token::Terminal,
};

/// Frame layout and reference numbering
pub mod layout;

use layout::Layout;

type CompileResult<T> = Result<T, FormatError>;

/// Lowers a parsed file into a [`Program`].
pub fn compile(parsed: &Parsed) -> CompileResult<Program> {
    Compiler::new(parsed).compile()
}

/// An alias found to be a view into a block variable.
struct OffsetAlias {
    /// Qualified name of the block
    parent: String,
    /// Reference to the block
    index: u64,
    offset: u64,
}

pub struct Compiler<'a> {
    ast: &'a Ast,
    root: NodeId,
    symbols: &'a SymbolTable,
    layout: Layout,

    statements: Vec<Statement>,
    literals: Vec<Vec<u8>>,
    pool: HashMap<Vec<u8>, u64>,
    /// Function definitions waiting for their body to be emitted
    queue: VecDeque<(NodeId, Vec<String>)>,
    /// Pre-order number of the last emitted statement
    numbered: u64,

    bodies: HashMap<String, (u64, u64)>,
    members: HashMap<String, Vec<Member>>,
    aliases: HashMap<String, Storage>,
}

impl<'a> Compiler<'a> {
    pub fn new(parsed: &'a Parsed) -> Self {
        Self {
            ast: &parsed.ast,
            root: parsed.root,
            symbols: &parsed.symbols,
            layout: Layout::new(&parsed.ast, parsed.root, &parsed.symbols),
            statements: vec![],
            literals: vec![],
            pool: HashMap::new(),
            queue: VecDeque::new(),
            numbered: 0,
            bodies: HashMap::new(),
            members: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn compile(mut self) -> CompileResult<Program> {
        let word_length = self.symbols.word_length();
        if !(1..=MAX_WORD_LENGTH).contains(&word_length) {
            return Err(FormatError::new(
                Section::Header,
                FormatErrorKind::WordLength(word_length),
            ));
        }

        // Top-level code, then function bodies in the order they are met
        let ast = self.ast;
        let mut top = vec![];
        self.statements(&ast[self.root].children, &[], &mut top)?;
        self.statements = top;

        while let Some((func, namespace)) = self.queue.pop_front() {
            let Some(body) = ast[func].children.last() else {
                continue;
            };

            let start = self.statements.len() as u64 + 1;
            let mut stmts = vec![];
            self.statements(&ast[*body].children, &namespace, &mut stmts)?;

            let name = namespace.join(&SEPARATOR.to_string());
            self.bodies.insert(name, (start, stmts.len() as u64));
            self.statements.extend(stmts);
        }

        let mut variables = vec![];
        for (i, symbol) in self.symbols.frame("").enumerate() {
            let identifier = i as u64 + 1;
            variables.push(match symbol.kind {
                SymbolKind::Special => Variable::special(identifier),
                _ => self.variable(symbol, identifier)?,
            });
        }

        let imports = self.layout.imports().collect::<Vec<_>>();
        for identifier in &imports {
            variables.push(Variable {
                identifier: *identifier,
                storage: Storage::Address,
                kind: VariableKind::Word,
            });
        }

        debug!(
            "compiled {} variables, {} statements, {} literals",
            variables.len(),
            self.statements.len(),
            self.literals.len()
        );

        Ok(Program {
            word_length,
            identifiers: self.layout.root().to_vec(),
            variables,
            imports,
            statements: self.statements,
            literals: self.literals,
        })
    }

    fn reference(&self, namespace: &[String], name: &str) -> CompileResult<u64> {
        self.layout.reference(self.symbols, namespace, name)
    }

    /// Bumps the pre-order statement counter.
    fn number(&mut self) -> u64 {
        self.numbered += 1;
        self.numbered
    }

    fn literal(&mut self, value: u64) -> u64 {
        let bytes = literal_bytes(value);
        if let Some(index) = self.pool.get(&bytes) {
            return *index;
        }

        self.literals.push(bytes.clone());
        let index = self.literals.len() as u64;
        self.pool.insert(bytes, index);
        index
    }

    fn statements(
        &mut self,
        stmts: &[NodeId],
        namespace: &[String],
        out: &mut Vec<Statement>,
    ) -> CompileResult<()> {
        for stmt in stmts {
            self.statement(*stmt, namespace, out)?;
        }
        Ok(())
    }

    fn statement(
        &mut self,
        id: NodeId,
        namespace: &[String],
        out: &mut Vec<Statement>,
    ) -> CompileResult<()> {
        let ast = self.ast;
        let node = &ast[id];
        let name = node.name().unwrap_or_default();

        match node.kind {
            NodeKind::Label => {
                // Bind the label to the instruction pointer, then run the
                // labeled code inline
                self.number();
                out.push(Statement::Address {
                    variable: self.reference(namespace, name)?,
                    value: Expression::SymbolRef(INSTRUCTION_POINTER),
                });
                self.statements(&node.children, namespace, out)?;
            }

            NodeKind::Block => self.statements(&node.children, namespace, out)?,

            NodeKind::FuncDef { .. } => {
                let mut inner = namespace.to_vec();
                inner.push(name.to_string());
                self.queue.push_back((id, inner));
            }

            NodeKind::IfStmt => {
                self.number();
                let condition = self.expression(node.children[0], namespace)?;
                let mut body = vec![];
                for block in &node.children[1..] {
                    self.statement(*block, namespace, &mut body)?;
                }
                out.push(Statement::If { condition, body });
            }

            NodeKind::AutoVarStmt | NodeKind::AssignStmt => {
                self.number();
                let Some((value, targets)) = node.children.split_last() else {
                    return Ok(());
                };

                let variables = targets
                    .iter()
                    .map(|target| self.reference(namespace, ast[*target].name().unwrap_or_default()))
                    .collect::<CompileResult<Vec<_>>>()?;
                let value = self.value(*value, namespace, &variables)?;

                out.push(if node.kind == NodeKind::AutoVarStmt {
                    Statement::Automatic { variables, value }
                } else {
                    Statement::Assignment { variables, value }
                });
            }

            NodeKind::AliasStmt => {
                let number = self.number();
                let [param, value] = node.children[..] else {
                    return Ok(());
                };

                let alias = ast[param].name().unwrap_or_default();
                let variable = self.reference(namespace, alias)?;
                let qualified = SymbolTable::qualify(namespace, alias);

                match self.offset_alias(value, namespace)? {
                    Some(OffsetAlias {
                        parent,
                        index,
                        offset,
                    }) => {
                        self.members.entry(parent).or_default().push(Member {
                            offset,
                            statement: number,
                        });
                        self.aliases.insert(
                            qualified,
                            Storage::Offset {
                                parent: index,
                                offset,
                            },
                        );
                        out.push(Statement::Offset { variable });
                    }
                    None => {
                        self.aliases.insert(qualified, Storage::Address);
                        let value = self.expression(value, namespace)?;
                        out.push(Statement::Address { variable, value });
                    }
                }
            }

            NodeKind::JumpStmt => {
                self.number();
                let target = self.expression(node.children[0], namespace)?;
                out.push(Statement::Jump { target });
            }

            NodeKind::ReturnStmt => {
                self.number();
                out.push(Statement::Return);
            }

            NodeKind::Param | NodeKind::Type | NodeKind::Expr | NodeKind::FuncCall => {}
        }

        Ok(())
    }

    /// Detects `v` and `v N +` aliases of a block variable `v`.
    fn offset_alias(
        &self,
        value: NodeId,
        namespace: &[String],
    ) -> CompileResult<Option<OffsetAlias>> {
        let ast = self.ast;
        let node = &ast[value];
        if node.kind != NodeKind::Expr {
            return Ok(None);
        }

        let is = |id: NodeId, kind: Terminal| {
            let node = &ast[id];
            node.children.is_empty() && node.token.as_ref().is_some_and(|t| t.kind == kind)
        };

        let (base, offset) = match node.children[..] {
            [] => (value, 0),
            [base, offset]
                if node.token.as_ref().is_some_and(|t| t.kind == Terminal::Add)
                    && is(offset, Terminal::Literal) =>
            {
                (base, ast[offset].value().unwrap_or_default())
            }
            _ => return Ok(None),
        };

        if !is(base, Terminal::Identifier) {
            return Ok(None);
        }

        let name = ast[base].name().unwrap_or_default();
        let Some(symbol) = self.symbols.resolve(namespace, name) else {
            return Ok(None);
        };
        let SymbolType::Block(length) = symbol.ty else {
            return Ok(None);
        };

        if offset >= length {
            return Err(FormatError::new(
                Section::Variables,
                FormatErrorKind::OffsetBounds { offset, length },
            ));
        }

        Ok(Some(OffsetAlias {
            parent: symbol.name.clone(),
            index: self.reference(namespace, name)?,
            offset,
        }))
    }

    /// The value of `:=` or `=`, whose targets receive a call's results.
    fn value(
        &mut self,
        id: NodeId,
        namespace: &[String],
        receivers: &[u64],
    ) -> CompileResult<Expression> {
        let mut value = self.expression(id, namespace)?;
        if let Expression::FunctionCall {
            receivers: targets, ..
        } = &mut value
        {
            *targets = receivers.to_vec();
        }
        Ok(value)
    }

    fn expression(&mut self, id: NodeId, namespace: &[String]) -> CompileResult<Expression> {
        let ast = self.ast;
        let node = &ast[id];

        if node.kind == NodeKind::FuncCall {
            let Some((callee, args)) = node.children.split_first() else {
                return Err(self.malformed(id));
            };

            let callee = Box::new(self.expression(*callee, namespace)?);
            let args = args
                .iter()
                .map(|arg| self.expression(*arg, namespace))
                .collect::<CompileResult<Vec<_>>>()?;
            return Ok(Expression::FunctionCall {
                callee,
                args,
                receivers: vec![],
            });
        }

        let Some(token) = &node.token else {
            return Err(self.malformed(id));
        };

        match token.kind {
            Terminal::Identifier => Ok(Expression::SymbolRef(
                self.reference(namespace, token.name())?,
            )),
            Terminal::Literal => Ok(Expression::Literal(
                self.literal(token.value.unwrap_or_default()),
            )),
            kind => match (Op::parsed(kind), &node.children[..]) {
                (Some(Op::Unary(op)), [operand]) => Ok(Expression::Unary(
                    op,
                    Box::new(self.expression(*operand, namespace)?),
                )),
                (Some(Op::Binary(op)), [lhs, rhs]) => {
                    let lhs = self.expression(*lhs, namespace)?;
                    let rhs = self.expression(*rhs, namespace)?;
                    Ok(Expression::Binary(op, Box::new(lhs), Box::new(rhs)))
                }
                _ => Err(self.malformed(id)),
            },
        }
    }

    fn malformed(&self, id: NodeId) -> FormatError {
        let node = &self.ast[id];
        let found = node
            .token
            .as_ref()
            .map(|token| token.to_string())
            .unwrap_or_else(|| format!("{:?}", node.kind));
        FormatError::new(Section::Statements, FormatErrorKind::UnresolvedSymbol(found))
    }

    fn variable(&self, symbol: &Symbol, identifier: u64) -> CompileResult<Variable> {
        let storage = match symbol.kind {
            SymbolKind::Param | SymbolKind::Return | SymbolKind::Automatic => Storage::Automatic,
            SymbolKind::Alias => self
                .aliases
                .get(&symbol.name)
                .copied()
                .unwrap_or(Storage::Address),
            SymbolKind::Special | SymbolKind::Function | SymbolKind::Label => Storage::Address,
        };

        let kind = match symbol.ty {
            SymbolType::Word => VariableKind::Word,
            SymbolType::Byte => VariableKind::Byte,
            SymbolType::Block(length) => VariableKind::Block(Block {
                unit: BlockUnit::Byte,
                length,
                members: self.members.get(&symbol.name).cloned().unwrap_or_default(),
            }),
            SymbolType::Function => VariableKind::Function(self.function(symbol)?),
        };

        Ok(Variable {
            identifier,
            storage,
            kind,
        })
    }

    fn function(&self, symbol: &Symbol) -> CompileResult<Function> {
        let frame = self.symbols.frame(&symbol.name).collect::<Vec<_>>();
        let count = |kind| frame.iter().filter(|s| s.kind == kind).count() as u64;

        let (body_start, body_len) = self.bodies.get(&symbol.name).copied().ok_or_else(|| {
            FormatError::new(
                Section::Variables,
                FormatErrorKind::UnresolvedSymbol(symbol.name.clone()),
            )
        })?;

        Ok(Function {
            params: count(SymbolKind::Param),
            returns: count(SymbolKind::Return),
            frame: frame
                .iter()
                .map(|local| self.variable(local, 0))
                .collect::<CompileResult<Vec<_>>>()?,
            body_start,
            body_len,
        })
    }
}
