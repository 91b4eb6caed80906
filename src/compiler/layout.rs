use std::collections::HashMap;

use log::trace;

use crate::{
    ast::{Ast, NodeId, NodeKind},
    bytecode::{FormatError, FormatErrorKind, Section},
    symbol::{SEPARATOR, SymbolTable},
    token::Terminal,
};

/// Where every variable lives in the bytecode variable tables.
///
/// The root frame holds the specials, the file-level symbols and the imports.
/// Each function has a frame of its own holding the symbols declared directly
/// in its namespace. References number the frames visible from a namespace
/// consecutively, root first.
#[derive(Debug)]
pub struct Layout {
    /// Qualified names of the root frame
    root: Vec<String>,
    /// Names referenced but declared nowhere visible, in first-reference order
    imports: Vec<String>,
    /// 0-based position of every symbol in its own frame
    positions: HashMap<String, usize>,
    /// Frame size of every function, keyed by qualified name
    frames: HashMap<String, usize>,
}

impl Layout {
    pub fn new(ast: &Ast, root: NodeId, symbols: &SymbolTable) -> Self {
        let mut imports = vec![];
        collect_imports(ast, root, symbols, &mut vec![], &mut imports);

        let mut positions = HashMap::new();
        let mut frames: HashMap<String, usize> = HashMap::new();
        for symbol in symbols.iter() {
            let frame = frames.entry(symbol.namespace().to_string()).or_default();
            positions.insert(symbol.name.clone(), *frame);
            *frame += 1;
        }

        let root_frame = symbols
            .frame("")
            .map(|symbol| symbol.name.clone())
            .chain(imports.iter().cloned())
            .collect();

        trace!("imports: {imports:?}");

        Self {
            root: root_frame,
            imports,
            positions,
            frames,
        }
    }

    /// Qualified names of the root frame, imports last.
    pub fn root(&self) -> &[String] {
        &self.root
    }

    /// Root frame indices of the imports.
    pub fn imports(&self) -> impl Iterator<Item = u64> + '_ {
        let first = self.root.len() - self.imports.len();
        (0..self.imports.len()).map(move |i| (first + i + 1) as u64)
    }

    pub fn is_import(&self, name: &str) -> bool {
        self.imports.iter().any(|import| import == name)
    }

    /// Resolves `name` as seen from `namespace` to its 1-based index in the
    /// frame chain.
    pub fn reference(
        &self,
        symbols: &SymbolTable,
        namespace: &[String],
        name: &str,
    ) -> Result<u64, FormatError> {
        let unresolved =
            || FormatError::new(Section::Statements, FormatErrorKind::UnresolvedSymbol(name.to_string()));

        let Some(symbol) = symbols.resolve(namespace, name) else {
            let first = self.root.len() - self.imports.len();
            let import = self.imports.iter().position(|i| i == name).ok_or_else(unresolved)?;
            return Ok((first + import + 1) as u64);
        };

        let position = *self.positions.get(&symbol.name).ok_or_else(unresolved)?;
        let owner = symbol.namespace();
        if owner.is_empty() {
            return Ok(position as u64 + 1);
        }

        // Skip the root frame and every enclosing function frame outside the owner
        let depth = owner.split(SEPARATOR).count();
        let mut index = self.root.len();
        for outer in 1..depth {
            let frame = namespace[..outer].join(&SEPARATOR.to_string());
            index += self.frames.get(&frame).copied().unwrap_or_default();
        }

        Ok((index + position + 1) as u64)
    }
}

/// Finds identifiers that resolve to no declaration.
fn collect_imports(
    ast: &Ast,
    id: NodeId,
    symbols: &SymbolTable,
    namespace: &mut Vec<String>,
    imports: &mut Vec<String>,
) {
    let node = &ast[id];
    match node.kind {
        NodeKind::FuncDef { .. } => {
            namespace.push(node.name().unwrap_or_default().to_string());
            for child in &node.children {
                collect_imports(ast, *child, symbols, namespace, imports);
            }
            namespace.pop();
            return;
        }
        NodeKind::Expr if node.children.is_empty() => {
            if let Some(token) = node.token.as_ref().filter(|t| t.kind == Terminal::Identifier) {
                let name = token.name();
                if symbols.resolve(namespace, name).is_none() && !imports.iter().any(|i| i == name) {
                    imports.push(name.to_string());
                }
            }
        }
        _ => {}
    }

    for child in &node.children {
        collect_imports(ast, *child, symbols, namespace, imports);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::Parser;

    fn layout(src: &str) -> (Layout, SymbolTable) {
        let parsed = Parser::parse(src, 8).unwrap();
        (Layout::new(&parsed.ast, parsed.root, &parsed.symbols), parsed.symbols)
    }

    fn ns(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_imports() {
        let (layout, symbols) = layout("x := y z +\nf:func\n  w = y\n");
        assert_eq!(layout.root()[6..], ["x", "f", "y", "z", "w"]);
        assert_eq!(layout.imports().collect::<Vec<_>>(), vec![9, 10, 11]);
        assert!(layout.is_import("w"));
        assert!(!layout.is_import("x"));
        assert_eq!(layout.reference(&symbols, &ns(&["f"]), "y").unwrap(), 9);
    }

    #[test]
    fn test_frame_chain() {
        let src = "\
g:func a
  f:func b
    b = a
    return
  return
";
        let (layout, symbols) = layout(src);
        let inner = ns(&["g", "f"]);

        assert_eq!(layout.reference(&symbols, &inner, "_ip").unwrap(), 4);
        assert_eq!(layout.reference(&symbols, &inner, "g").unwrap(), 7);
        assert_eq!(layout.reference(&symbols, &inner, "a").unwrap(), 8);
        assert_eq!(layout.reference(&symbols, &inner, "f").unwrap(), 9);
        assert_eq!(layout.reference(&symbols, &inner, "b").unwrap(), 10);
        assert_eq!(layout.reference(&symbols, &ns(&["g"]), "a").unwrap(), 8);
    }

    #[test]
    fn test_unresolved() {
        let (layout, symbols) = layout("x := 1\n");
        let err = layout.reference(&symbols, &[], "nowhere").unwrap_err();
        assert_eq!(err.kind, FormatErrorKind::UnresolvedSymbol("nowhere".to_string()));
    }
}
