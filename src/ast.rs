use std::{
    fmt::{self, Write},
    ops::Index,
};

use crate::token::Token;

/// Contains the operators found in expressions
pub mod ops;

/// Index of a node inside its [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// The non-terminals of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Label,
    /// `returns` counts the return parameters, which sit between the
    /// parameters and the body.
    FuncDef {
        returns: usize,
    },
    Block,
    IfStmt,
    AutoVarStmt,
    AliasStmt,
    AssignStmt,
    JumpStmt,
    ReturnStmt,
    Param,
    Type,
    Expr,
    FuncCall,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// The identifier, literal, keyword or operator the node was built from
    pub token: Option<Token>,
    pub children: Vec<NodeId>,
    /// Only used for diagnostics
    pub parent: Option<NodeId>,
}

impl Node {
    /// The identifier carried by the node, if any.
    pub fn name(&self) -> Option<&str> {
        self.token.as_ref().and_then(|token| token.lexeme.as_deref())
    }

    /// The literal value carried by the node, if any.
    pub fn value(&self) -> Option<u64> {
        self.token.as_ref().and_then(|token| token.value)
    }

    /// Line and column of the node's token.
    pub fn position(&self) -> Option<(usize, usize)> {
        self.token.as_ref().map(|token| (token.line, token.column))
    }
}

/// Arena owning every node of a parsed file.
///
/// Nodes are only ever appended; children are created before their parent.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn add(&mut self, kind: NodeKind, token: Option<Token>, children: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        for child in &children {
            self.nodes[child.0].parent = Some(id);
        }
        self.nodes.push(Node {
            kind,
            token,
            children,
            parent: None,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Forget every node created after the arena had `len` nodes.
    pub(crate) fn truncate(&mut self, len: usize) {
        if len >= self.nodes.len() {
            return;
        }

        // Only the children of removed nodes can point at a removed parent
        let removed = self.nodes.split_off(len);
        for child in removed.iter().flat_map(|node| &node.children) {
            if let Some(node) = self.nodes.get_mut(child.0) {
                node.parent = None;
            }
        }
    }

    /// Parameters of a `FuncDef` node
    pub fn params(&self, func: NodeId) -> &[NodeId] {
        let node = &self[func];
        let NodeKind::FuncDef { returns } = node.kind else {
            return &[];
        };
        &node.children[..node.children.len() - 1 - returns]
    }

    /// Return parameters of a `FuncDef` node
    pub fn returns(&self, func: NodeId) -> &[NodeId] {
        let node = &self[func];
        let NodeKind::FuncDef { returns } = node.kind else {
            return &[];
        };
        let end = node.children.len() - 1;
        &node.children[end - returns..end]
    }

    /// Writes the tree below `root`, one node per line.
    pub fn dump<W: Write>(&self, w: &mut W, root: NodeId) -> fmt::Result {
        self.dump_node(w, root, 0)
    }

    fn dump_node<W: Write>(&self, w: &mut W, id: NodeId, depth: usize) -> fmt::Result {
        let node = &self[id];
        let kind = match node.kind {
            NodeKind::FuncDef { .. } => "FuncDef".to_string(),
            kind => format!("{kind:?}"),
        };

        match &node.token {
            Some(token) => writeln!(w, "{}{kind}: {token}", "  ".repeat(depth))?,
            None => writeln!(w, "{}{kind}", "  ".repeat(depth))?,
        }

        for child in &node.children {
            self.dump_node(w, *child, depth + 1)?;
        }
        Ok(())
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index.0]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::token::Terminal;

    fn ident(name: &str) -> Option<Token> {
        Some(Token {
            lexeme: Some(name.to_string()),
            ..Token::new(Terminal::Identifier, 1, 1)
        })
    }

    #[test]
    fn test_parent_links() {
        let mut ast = Ast::default();
        let a = ast.add(NodeKind::Expr, ident("a"), vec![]);
        let b = ast.add(NodeKind::Expr, ident("b"), vec![]);
        let sum = ast.add(NodeKind::Expr, None, vec![a, b]);

        assert_eq!(ast[a].parent, Some(sum));
        assert_eq!(ast[sum].children, vec![a, b]);
        assert_eq!(ast[b].name(), Some("b"));
    }

    #[test]
    fn test_truncate() {
        let mut ast = Ast::default();
        let a = ast.add(NodeKind::Expr, ident("a"), vec![]);
        let len = ast.len();
        ast.add(NodeKind::Param, None, vec![a]);
        ast.truncate(len);

        assert_eq!(ast.len(), 1);
        assert_eq!(ast[a].parent, None);

        // Adopted children older than the cut are released, others are kept
        let b = ast.add(NodeKind::Expr, ident("b"), vec![]);
        let sum = ast.add(NodeKind::Expr, None, vec![a, b]);
        let len = ast.len();
        let c = ast.add(NodeKind::Expr, ident("c"), vec![]);
        ast.add(NodeKind::Block, None, vec![b, c]);
        ast.truncate(len);

        assert_eq!(ast.len(), 3);
        assert_eq!(ast[a].parent, Some(sum));
        assert_eq!(ast[b].parent, None);

        ast.truncate(10);
        assert_eq!(ast.len(), 3);
    }

    #[test]
    fn test_dump() {
        let mut ast = Ast::default();
        let x = ast.add(NodeKind::Param, ident("x"), vec![]);
        let body = ast.add(NodeKind::Block, None, vec![]);
        let func = ast.add(NodeKind::FuncDef { returns: 0 }, ident("f"), vec![x, body]);

        let mut out = String::new();
        ast.dump(&mut out, func).unwrap();
        assert_eq!(out, "FuncDef: Identifier(f)\n  Param: Identifier(x)\n  Block\n");
    }

    #[test]
    fn test_func_def_parts() {
        let mut ast = Ast::default();
        let x = ast.add(NodeKind::Param, ident("x"), vec![]);
        let y = ast.add(NodeKind::Param, ident("y"), vec![]);
        let r = ast.add(NodeKind::Param, ident("r"), vec![]);
        let body = ast.add(NodeKind::Block, None, vec![]);
        let func = ast.add(NodeKind::FuncDef { returns: 1 }, ident("f"), vec![x, y, r, body]);

        assert_eq!(ast.params(func), &[x, y]);
        assert_eq!(ast.returns(func), &[r]);
    }
}
