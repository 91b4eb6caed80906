use crate::{
    ast::{NodeId, NodeKind, ops::Op},
    lexer::LexError,
    token::{Terminal, Token},
};

use super::{MAX_NESTING, ParseErrorKind, ParseResult, Parser};

/// A parsed operand and the depth of its subtree.
type Operand = (NodeId, usize);

impl<I> Parser<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    /// Scans a postfix expression.
    ///
    /// Operands are pushed on a stack and every operator pops its operands and
    /// pushes its own node. Returns `None` when no operand starts here.
    pub(crate) fn expression(&mut self) -> ParseResult<Option<NodeId>> {
        Ok(self.operand()?.map(|(expr, _)| expr))
    }

    fn operand(&mut self) -> ParseResult<Option<Operand>> {
        let mut stack: Vec<Operand> = vec![];

        while let Some(kind) = self.peek_kind(0)? {
            match kind {
                Terminal::Identifier | Terminal::Literal => {
                    let token = self.advance()?;
                    self.bounded(&token, 1)?;
                    stack.push((self.ast.add(NodeKind::Expr, Some(token), vec![]), 1));
                }
                Terminal::LeftParen => {
                    let call = self.func_call()?;
                    stack.push(call);
                }
                _ => {
                    let Some(op) = Op::parsed(kind) else {
                        break;
                    };

                    let token = self.advance()?;
                    if stack.len() < op.arity() {
                        return Err(Self::fail_at(
                            &token,
                            ParseErrorKind::NotEnoughArguments(kind),
                        ));
                    }

                    let operands = stack.split_off(stack.len() - op.arity());
                    let depth = 1 + deepest(&operands);
                    self.bounded(&token, depth)?;

                    let children = operands.into_iter().map(|(id, _)| id).collect();
                    stack.push((self.ast.add(NodeKind::Expr, Some(token), children), depth));
                }
            }
        }

        match stack.len() {
            0 => Ok(None),
            1 => Ok(stack.pop()),
            _ => Err(self.fail(ParseErrorKind::MissingOperator)),
        }
    }

    /// Fails when a node of the given depth would nest too deep here.
    fn bounded(&self, token: &Token, depth: usize) -> ParseResult<()> {
        if self.depth + depth > MAX_NESTING {
            return Err(Self::fail_at(token, ParseErrorKind::Nesting(MAX_NESTING)));
        }
        Ok(())
    }

    /// `( args..., callee )`
    fn func_call(&mut self) -> ParseResult<Operand> {
        let open = self.advance()?;
        let operands = self.nested(Self::call_operands)?;

        let depth = 1 + deepest(&operands);
        self.bounded(&open, depth)?;

        let mut exprs = operands.into_iter().map(|(id, _)| id).collect::<Vec<_>>();
        let callee = exprs
            .pop()
            .filter(|callee| {
                let node = &self.ast[*callee];
                node.kind == NodeKind::Expr
                    && node.children.is_empty()
                    && node.token.as_ref().map(|t| t.kind) == Some(Terminal::Identifier)
            })
            .ok_or_else(|| Self::fail_at(&open, ParseErrorKind::CallWithoutIdentifier))?;

        let token = self.ast[callee].token.clone();
        let children = [callee].into_iter().chain(exprs).collect();
        Ok((self.ast.add(NodeKind::FuncCall, token, children), depth))
    }

    /// Comma separated expressions up to and including the closing `)`.
    fn call_operands(&mut self) -> ParseResult<Vec<Operand>> {
        let mut operands = vec![];
        if self.eat(Terminal::RightParen)?.is_some() {
            return Ok(operands);
        }

        loop {
            let Some(operand) = self.operand()? else {
                let found = self.found()?;
                return Err(self.fail(ParseErrorKind::Expected(
                    "expression".to_string(),
                    found,
                )));
            };
            operands.push(operand);

            if self.eat(Terminal::Comma)?.is_some() {
                continue;
            }

            if self.eat(Terminal::RightParen)?.is_none() {
                let found = self.found()?;
                return Err(self.fail(ParseErrorKind::Expected(
                    Terminal::RightParen.to_string(),
                    found,
                )));
            }
            return Ok(operands);
        }
    }
}

fn deepest(operands: &[Operand]) -> usize {
    operands.iter().map(|(_, depth)| *depth).max().unwrap_or_default()
}

#[cfg(test)]
mod test {
    use crate::{
        ast::NodeKind,
        lexer::Lexer,
        parser::{ParseErrorKind, Parser},
        token::Terminal,
    };

    #[test]
    fn test_postfix_nesting() {
        let mut parser = Parser::new(Lexer::new(&b"a 1 + b ! *\n"[..]), 8);
        let expr = parser.expression().unwrap().unwrap();

        let ast = &parser.ast;
        let node = &ast[expr];
        assert_eq!(node.token.as_ref().unwrap().kind, Terminal::Mult);

        let lhs = &ast[node.children[0]];
        let rhs = &ast[node.children[1]];
        assert_eq!(lhs.token.as_ref().unwrap().kind, Terminal::Add);
        assert_eq!(rhs.token.as_ref().unwrap().kind, Terminal::Not);
        assert_eq!(rhs.children.len(), 1);

        // Stops before the newline
        assert!(parser.is(0, Terminal::Newline).unwrap());
    }

    #[test]
    fn test_no_expression() {
        let mut parser = Parser::new(Lexer::new(&b"= a\n"[..]), 8);
        assert_eq!(parser.expression().unwrap(), None);
        assert_eq!(parser.ast.len(), 0);
    }

    #[test]
    fn test_call_syntax_errors() {
        let mut parser = Parser::new(Lexer::new(&b"(a, f\n"[..]), 8);
        let err = parser.expression().unwrap_err();
        assert_eq!(
            err.kind(),
            Some(&ParseErrorKind::Expected("`)`".to_string(), "newline".to_string()))
        );

        let mut parser = Parser::new(Lexer::new(&b"(a, , f)\n"[..]), 8);
        assert!(matches!(
            parser.expression().unwrap_err().kind(),
            Some(ParseErrorKind::Expected(..))
        ));
    }

    #[test]
    fn test_nested_calls() {
        let mut parser = Parser::new(Lexer::new(&b"((x, g), f)\n"[..]), 8);
        let call = parser.expression().unwrap().unwrap();

        let ast = &parser.ast;
        assert_eq!(ast[call].kind, NodeKind::FuncCall);
        assert_eq!(ast[call].name(), Some("f"));
        let inner = ast[call].children[1];
        assert_eq!(ast[inner].kind, NodeKind::FuncCall);
        assert_eq!(ast[inner].name(), Some("g"));
    }
}
