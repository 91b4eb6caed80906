use super::{
    Expression, FormatError, FormatErrorKind, MAX_DEPTH, Program, Section, Statement, Storage,
    Variable, VariableKind,
};

type CheckResult = Result<(), FormatError>;

/// Frames visible from some point of the program, outermost first.
#[derive(Clone)]
struct Chain<'a> {
    frames: Vec<&'a [Variable]>,
}

impl<'a> Chain<'a> {
    fn len(&self) -> usize {
        self.frames.iter().map(|frame| frame.len()).sum()
    }

    /// Looks up a 1-based index across the chain.
    fn get(&self, index: u64) -> Option<&'a Variable> {
        let mut index = (index as usize).checked_sub(1)?;
        for frame in self.frames.iter().copied() {
            if index < frame.len() {
                return Some(&frame[index]);
            }
            index -= frame.len();
        }
        None
    }

    fn enter(&self, frame: &'a [Variable]) -> Self {
        let mut chain = self.clone();
        chain.frames.push(frame);
        chain
    }
}

fn fail(section: Section, kind: FormatErrorKind) -> FormatError {
    FormatError::new(section, kind)
}

/// Checks that every reference in the program resolves.
pub(super) fn validate(program: &Program) -> CheckResult {
    nesting(program)?;

    let preorder = program.preorder();
    let root = Chain {
        frames: vec![program.variables.as_slice()],
    };

    for var in &program.variables {
        variable(program, &root, var, &preorder)?;
    }

    for import in &program.imports {
        if root.get(*import).is_none() {
            return Err(fail(Section::Imports, FormatErrorKind::UnresolvedVariable(*import)));
        }
    }

    let mut scopes = vec![root.len(); program.statements.len()];
    claim_bodies(&root, &program.variables, &mut scopes);

    for (stmt, scope) in program.statements.iter().zip(scopes) {
        statement(program, scope as u64, stmt)?;
    }

    Ok(())
}

/// Bounds how deep frames, statements and expressions nest, before anything
/// else walks them.
fn nesting(program: &Program) -> CheckResult {
    for var in &program.variables {
        variable_depth(var, 1)?;
    }
    for stmt in &program.statements {
        statement_depth(stmt, 1)?;
    }
    Ok(())
}

fn deeper(section: Section, depth: usize) -> CheckResult {
    if depth > MAX_DEPTH {
        return Err(fail(section, FormatErrorKind::Nesting(MAX_DEPTH)));
    }
    Ok(())
}

fn variable_depth(var: &Variable, depth: usize) -> CheckResult {
    deeper(Section::Variables, depth)?;
    if let VariableKind::Function(func) = &var.kind {
        for local in &func.frame {
            variable_depth(local, depth + 1)?;
        }
    }
    Ok(())
}

fn statement_depth(stmt: &Statement, depth: usize) -> CheckResult {
    deeper(Section::Statements, depth)?;
    match stmt {
        Statement::Automatic { value, .. }
        | Statement::Assignment { value, .. }
        | Statement::Address { value, .. }
        | Statement::Jump { target: value } => expression_depth(value, depth + 1),
        Statement::If { condition, body } => {
            expression_depth(condition, depth + 1)?;
            for stmt in body {
                statement_depth(stmt, depth + 1)?;
            }
            Ok(())
        }
        Statement::Offset { .. } | Statement::Return => Ok(()),
    }
}

fn expression_depth(expr: &Expression, depth: usize) -> CheckResult {
    deeper(Section::Statements, depth)?;
    match expr {
        Expression::Literal(_) | Expression::SymbolRef(_) => Ok(()),
        Expression::FunctionCall { callee, args, .. } => {
            expression_depth(callee, depth + 1)?;
            for arg in args {
                expression_depth(arg, depth + 1)?;
            }
            Ok(())
        }
        Expression::Unary(_, operand) => expression_depth(operand, depth + 1),
        Expression::Binary(_, lhs, rhs) => {
            expression_depth(lhs, depth + 1)?;
            expression_depth(rhs, depth + 1)
        }
    }
}

fn variable<'a>(
    program: &Program,
    chain: &Chain<'a>,
    var: &'a Variable,
    preorder: &[&Statement],
) -> CheckResult {
    let section = Section::Variables;

    if var.identifier as usize > program.identifiers.len() {
        return Err(fail(section, FormatErrorKind::UnresolvedIdentifier(var.identifier)));
    }

    if let Storage::Offset { parent, offset } = var.storage {
        let Some(VariableKind::Block(block)) = chain.get(parent).map(|parent| &parent.kind) else {
            return Err(fail(section, FormatErrorKind::UnresolvedVariable(parent)));
        };

        let length = block.byte_length(program.word_length);
        if offset >= length {
            return Err(fail(section, FormatErrorKind::OffsetBounds { offset, length }));
        }
    }

    match &var.kind {
        VariableKind::Block(block) => {
            let length = block.byte_length(program.word_length);
            for member in &block.members {
                if member.offset >= length {
                    return Err(fail(
                        section,
                        FormatErrorKind::OffsetBounds {
                            offset: member.offset,
                            length,
                        },
                    ));
                }

                let declared = (member.statement as usize)
                    .checked_sub(1)
                    .and_then(|i| preorder.get(i));
                if !matches!(declared, Some(Statement::Offset { .. })) {
                    return Err(fail(
                        section,
                        FormatErrorKind::UnresolvedStatement(member.statement),
                    ));
                }
            }
        }

        VariableKind::Function(func) => {
            let stream = program.statements.len() as u64;
            let in_range = func.body_start >= 1
                && func
                    .body_start
                    .checked_add(func.body_len)
                    .is_some_and(|end| end - 1 <= stream);
            if !in_range {
                return Err(fail(section, FormatErrorKind::UnresolvedStatement(func.body_start)));
            }

            let declared = func.params.saturating_add(func.returns);
            if declared > func.frame.len() as u64 {
                return Err(fail(section, FormatErrorKind::UnresolvedVariable(declared)));
            }

            let inner = chain.enter(&func.frame);
            for local in &func.frame {
                variable(program, &inner, local, preorder)?;
            }
        }

        VariableKind::Special | VariableKind::Word | VariableKind::Byte => {}
    }

    Ok(())
}

/// Records, for every stream position inside a function body, how many
/// variables are visible there.
fn claim_bodies<'a>(chain: &Chain<'a>, frame: &'a [Variable], scopes: &mut [usize]) {
    for var in frame {
        let VariableKind::Function(func) = &var.kind else {
            continue;
        };

        let inner = chain.enter(&func.frame);
        let start = func.body_start as usize - 1;
        let end = start + func.body_len as usize;
        for scope in &mut scopes[start..end] {
            *scope = inner.len();
        }

        claim_bodies(&inner, &func.frame, scopes);
    }
}

fn reference(scope: u64, variable: u64) -> CheckResult {
    if variable == 0 || variable > scope {
        return Err(fail(Section::Statements, FormatErrorKind::UnresolvedVariable(variable)));
    }
    Ok(())
}

fn statement(program: &Program, scope: u64, stmt: &Statement) -> CheckResult {
    match stmt {
        Statement::Automatic { variables, value } | Statement::Assignment { variables, value } => {
            for var in variables {
                reference(scope, *var)?;
            }
            expression(program, scope, value)
        }
        Statement::Address { variable, value } => {
            reference(scope, *variable)?;
            expression(program, scope, value)
        }
        Statement::Offset { variable } => reference(scope, *variable),
        Statement::If { condition, body } => {
            expression(program, scope, condition)?;
            for stmt in body {
                statement(program, scope, stmt)?;
            }
            Ok(())
        }
        Statement::Jump { target } => expression(program, scope, target),
        Statement::Return => Ok(()),
    }
}

fn expression(program: &Program, scope: u64, expr: &Expression) -> CheckResult {
    match expr {
        Expression::Literal(index) => {
            if *index == 0 || *index as usize > program.literals.len() {
                return Err(fail(Section::Statements, FormatErrorKind::UnresolvedLiteral(*index)));
            }
            Ok(())
        }
        Expression::SymbolRef(variable) => reference(scope, *variable),
        Expression::FunctionCall {
            callee,
            args,
            receivers,
        } => {
            expression(program, scope, callee)?;
            for arg in args {
                expression(program, scope, arg)?;
            }
            for receiver in receivers {
                reference(scope, *receiver)?;
            }
            Ok(())
        }
        Expression::Unary(_, operand) => expression(program, scope, operand),
        Expression::Binary(_, lhs, rhs) => {
            expression(program, scope, lhs)?;
            expression(program, scope, rhs)
        }
    }
}
