use lang::{
    Error, Options,
    ast::NodeKind,
    bytecode::{Expression, FormatErrorKind, Marker, Program, Statement, Storage, VariableKind},
    compile_str, compile_to_bytes, lex, parse,
    parser::{MAX_NESTING, ParseErrorKind},
    token::Terminal,
};

const SOURCE: &str = include_str!("sample.lang");

fn word(value: u64, word_length: usize) -> Vec<u8> {
    value.to_be_bytes()[8 - word_length..].to_vec()
}

#[test]
fn test_lex_func_def() {
    let kinds = lex("f:func x\n  return\n")
        .unwrap()
        .into_iter()
        .map(|token| token.to_string())
        .collect::<Vec<_>>();

    assert_eq!(
        kinds,
        vec![
            "Identifier(f)",
            "`:`",
            "`func`",
            "Identifier(x)",
            "newline",
            "indent",
            "`return`",
            "newline",
            "dedent",
        ]
    );
}

#[test]
fn test_indentation_widths() {
    let tokens = lex("a\n  b\n  c\n    d\n  e\nf\n").unwrap();
    let indentation = tokens
        .iter()
        .filter(|token| matches!(token.kind, Terminal::Indent | Terminal::Dedent))
        .map(|token| token.kind)
        .collect::<Vec<_>>();

    assert_eq!(
        indentation,
        vec![
            Terminal::Indent,
            Terminal::Indent,
            Terminal::Dedent,
            Terminal::Dedent
        ]
    );
}

#[test]
fn test_end_to_end_func_def() {
    let src = "f:func x\n  return\n";
    let options = Options::default();

    let parsed = parse(src, &options).unwrap();
    let ast = &parsed.ast;
    let func = ast[parsed.root].children[0];
    assert_eq!(ast[func].kind, NodeKind::FuncDef { returns: 0 });
    assert_eq!(ast[func].name(), Some("f"));
    assert_eq!(ast[ast.params(func)[0]].name(), Some("x"));

    let program = compile_str(src, &options).unwrap();
    assert_eq!(program.variables.len(), 7);
    assert_eq!(program.statements, vec![Statement::Return]);
    assert!(program.literals.is_empty());

    let mut expected = b"Version 0.0\nArch.: 8bytes/word\n".to_vec();
    expected.extend(word(7, 8));
    expected.extend(b"_\n_sp\n_fp\n_ip\n_text\n_data\nf\n");
    expected.extend(word(7, 8));
    expected.extend([Marker::Address as u8, Marker::Function as u8]);
    expected.extend(word(1, 8)); // params
    expected.extend(word(0, 8)); // returns
    expected.extend(word(1, 8)); // frame
    expected.extend(word(0, 8));
    expected.extend([Marker::Automatic as u8, Marker::Word as u8]);
    expected.extend(word(1, 8)); // body start
    expected.extend(word(1, 8)); // body length
    expected.extend(word(0, 8)); // imports
    expected.extend(word(1, 8));
    expected.push(Marker::Return as u8);

    assert_eq!(compile_to_bytes(src, &options).unwrap(), expected);
}

#[test]
fn test_sample_program() {
    let program = compile_str(SOURCE, &Options::default()).unwrap();

    assert_eq!(
        program.identifiers[6..],
        ["header", "buf", "len", "flags", "copy", "main"]
    );
    assert!(program.imports.is_empty());
    assert_eq!(program.statements.len(), 12);

    assert_eq!(program.variables[8].storage, Storage::Offset { parent: 8, offset: 0 });
    assert_eq!(program.variables[9].storage, Storage::Offset { parent: 8, offset: 8 });

    let VariableKind::Function(copy) = &program.variables[10].kind else {
        panic!("copy is not a function");
    };
    assert_eq!((copy.params, copy.returns), (3, 1));
    // src, dst, count, copied, loop, b
    assert_eq!(copy.frame.len(), 6);
    assert_eq!((copy.body_start, copy.body_len), (5, 4));
    assert_eq!(copy.frame[5].kind, VariableKind::Byte);

    let VariableKind::Function(main) = &program.variables[11].kind else {
        panic!("main is not a function");
    };
    assert_eq!((main.body_start, main.body_len), (9, 4));

    // `n := (header, buf, 16, copy)` receives into n, the first local of main
    let Statement::Automatic { variables, value } = &program.statements[8] else {
        panic!("expected the call");
    };
    assert_eq!(variables, &vec![13]);
    let Expression::FunctionCall {
        callee, receivers, ..
    } = value
    else {
        panic!("expected the call");
    };
    assert_eq!(callee.as_ref(), &Expression::SymbolRef(11));
    assert_eq!(receivers, &vec![13]);

    let values = (1..=program.literals.len() as u64)
        .filter_map(|i| program.literal_value(i))
        .collect::<Vec<_>>();
    assert_eq!(values, vec![0, 1, 16, 10, 15]);
}

#[test]
fn test_sample_round_trip() {
    for word_length in [2, 4, 8] {
        let options = Options { word_length };
        let program = compile_str(SOURCE, &options).unwrap();
        let bytes = program.encode().unwrap();

        let decoded = Program::decode(&bytes).unwrap();
        assert_eq!(decoded, program);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }
}

#[test]
fn test_sample_listing() {
    let listing = compile_str(SOURCE, &Options::default())
        .unwrap()
        .to_string();

    assert!(listing.starts_with("; Version 0.0, 8 bytes/word\n"));
    // `loop` is local to `copy`, whose frame follows the 12 root variables
    assert!(listing.contains("$17: _ip"));
    assert!(listing.contains("offset flags"));
    assert!(listing.contains("(header, buf, 16, copy)"));
}

#[test]
fn test_import_table() {
    let word_length = 2;
    let mut bytes = b"Version 0.0\nArch.: 2bytes/word\n".to_vec();
    bytes.extend(word(7, word_length));
    bytes.extend(b"_\n_sp\n_fp\n_ip\n_text\n_data\nput\n");
    bytes.extend(word(7, word_length));
    bytes.extend([Marker::Address as u8, Marker::Word as u8]);
    bytes.extend(word(2, word_length));
    bytes.extend(word(3, word_length));
    bytes.extend(word(7, word_length));
    bytes.extend(word(1, word_length));
    bytes.push(Marker::Return as u8);

    let program = Program::decode(&bytes).unwrap();
    assert_eq!(program.variables.len(), 7);

    let imported = program.imported().collect::<Vec<_>>();
    assert_eq!(imported, vec![&program.variables[2], &program.variables[6]]);

    assert_eq!(program.encode().unwrap(), bytes);
}

#[test]
fn test_imports_from_source() {
    let program = compile_str("f:func\n  x = (exit)\n", &Options::default()).unwrap();
    assert_eq!(program.identifiers[6..], ["f", "x", "exit"]);
    assert_eq!(program.imports, vec![8, 9]);
}

#[test]
fn test_pipeline_errors() {
    let options = Options::default();

    let err = compile_str("x := 1\nx := 2\n", &options).unwrap_err();
    let Error::Parse(err) = err else {
        panic!("expected a parse error, got {err}");
    };
    assert_eq!(err.kind(), Some(&ParseErrorKind::Redeclared("x".to_string())));

    assert!(matches!(
        compile_str("f:func x\n  x := !\n", &options),
        Err(Error::Parse(_))
    ));

    assert!(matches!(lex("x := 1 ?\n"), Err(Error::Lex(_))));

    let err = compile_str("x := 1\n", &Options { word_length: 0 }).unwrap_err();
    assert!(matches!(err, Error::Format(err) if err.kind == FormatErrorKind::WordLength(0)));

    // Every file needs at least one statement
    let err = compile_to_bytes("# empty\n", &options).unwrap_err();
    assert!(matches!(err, Error::Format(err) if err.kind == FormatErrorKind::MissingStatement));
}

#[test]
fn test_deepest_source() {
    let options = Options::default();

    let chain = format!("x := a{}\n", " !".repeat(MAX_NESTING - 1));
    let mut ifs = String::new();
    for level in 0..MAX_NESTING - 1 {
        ifs.push_str(&format!("{}if a\n", " ".repeat(level)));
    }
    ifs.push_str(&format!("{}x := a\n", " ".repeat(MAX_NESTING - 1)));

    for src in [chain, ifs] {
        let bytes = compile_to_bytes(&src, &options).unwrap();
        assert_eq!(Program::decode(&bytes).unwrap().encode().unwrap(), bytes);
    }

    let err = compile_str(&format!("x := a{}\n", " !".repeat(MAX_NESTING)), &options).unwrap_err();
    assert!(matches!(
        err,
        Error::Parse(err) if err.kind() == Some(&ParseErrorKind::Nesting(MAX_NESTING))
    ));
}
