use std::collections::HashMap;

use thiserror::Error;

use crate::ast::NodeId;

/// Identifiers predeclared in every file, in variable-table order.
pub const SPECIALS: [&str; 6] = ["_", "_sp", "_fp", "_ip", "_text", "_data"];

/// Separator between the segments of a qualified name
pub const SEPARATOR: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// One of [`SPECIALS`]
    Special,
    Param,
    Return,
    /// Declared with `:=`
    Automatic,
    /// Declared with `:`
    Alias,
    Function,
    /// Names a block or an if statement
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    Word,
    Byte,
    /// A block of the given number of bytes
    Block(u64),
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Fully qualified, dot-joined name
    pub name: String,
    pub kind: SymbolKind,
    pub ty: SymbolType,
    /// Size in bytes
    pub size: u64,
    /// The declaring node, if the symbol comes from source
    pub node: Option<NodeId>,
}

impl Symbol {
    /// The namespace the symbol was declared in, empty at file scope.
    pub fn namespace(&self) -> &str {
        self.name
            .rsplit_once(SEPARATOR)
            .map(|(namespace, _)| namespace)
            .unwrap_or_default()
    }

    /// The name without its namespace.
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(SEPARATOR)
            .map(|(_, name)| name)
            .unwrap_or(&self.name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Redeclared symbol `{0}`")]
pub struct Redeclared(pub String);

/// Every symbol of a file, keyed by qualified name and kept in declaration
/// order.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    index: HashMap<String, usize>,
    word_length: u64,
}

impl SymbolTable {
    /// Creates a table holding only the special identifiers.
    pub fn new(word_length: usize) -> Self {
        let mut table = Self {
            symbols: vec![],
            index: HashMap::new(),
            word_length: word_length as u64,
        };

        for name in SPECIALS {
            table
                .declare(&[], name, SymbolKind::Special, SymbolType::Word, None)
                .expect("Special identifiers are unique");
        }

        table
    }

    /// Joins a namespace path and a name.
    pub fn qualify(namespace: &[String], name: &str) -> String {
        namespace
            .iter()
            .map(String::as_str)
            .chain([name])
            .collect::<Vec<_>>()
            .join(&SEPARATOR.to_string())
    }

    /// Register a symbol under the given namespace path
    pub fn declare(
        &mut self,
        namespace: &[String],
        name: &str,
        kind: SymbolKind,
        ty: SymbolType,
        node: Option<NodeId>,
    ) -> Result<&Symbol, Redeclared> {
        let name = Self::qualify(namespace, name);
        if self.index.contains_key(&name) {
            return Err(Redeclared(name));
        }

        let size = match ty {
            SymbolType::Byte => 1,
            SymbolType::Block(length) => length,
            SymbolType::Word | SymbolType::Function => self.word_length,
        };

        self.index.insert(name.clone(), self.symbols.len());
        self.symbols.push(Symbol {
            name,
            kind,
            ty,
            size,
            node,
        });

        Ok(&self.symbols[self.symbols.len() - 1])
    }

    /// Attach the declaring node to a symbol declared before its node existed.
    pub fn bind(&mut self, qualified: &str, node: NodeId) {
        if let Some(i) = self.index.get(qualified) {
            self.symbols[*i].node = Some(node);
        }
    }

    pub fn get(&self, qualified: &str) -> Option<&Symbol> {
        self.index.get(qualified).map(|i| &self.symbols[*i])
    }

    /// Retrieves a symbol visible from the given namespace, searching from the
    /// innermost namespace outwards.
    pub fn resolve(&self, namespace: &[String], name: &str) -> Option<&Symbol> {
        (0..=namespace.len())
            .rev()
            .find_map(|depth| self.get(&Self::qualify(&namespace[..depth], name)))
    }

    /// Symbols declared directly inside `namespace`, in declaration order.
    pub fn frame<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.symbols
            .iter()
            .filter(move |symbol| symbol.namespace() == namespace)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn word_length(&self) -> usize {
        self.word_length as usize
    }
}
