use std::{fs, path::PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum, builder::RangedU64ValueParser};
use lang::{
    Options,
    bytecode::{MAX_WORD_LENGTH, Program},
    compiler,
    lexer::Lexer,
};
use log::{LevelFilter, info};
use simple_logger::SimpleLogger;

/// What to produce from a source file
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Emit {
    /// The binary bytecode file
    Bytecode,
    /// One token per line
    Tokens,
    /// The syntax tree
    Ast,
    /// A readable listing of the compiled program
    Listing,
}

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
struct Args {
    /// The file to compile, or to disassemble with `--disassemble`
    file: PathBuf,

    /// The output file. Defaults to the input with the `.lbc` extension
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Bytes per word of the target machine
    #[arg(
        long,
        default_value_t = Options::default().word_length,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=MAX_WORD_LENGTH as u64),
    )]
    word_length: usize,

    #[arg(long, value_enum, default_value_t = Emit::Bytecode)]
    emit: Emit,

    /// Print the listing of an existing bytecode file
    #[arg(long)]
    disassemble: bool,

    /// Log progress; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new().with_level(level).env().init()?;

    if args.disassemble {
        let bytes = fs::read(&args.file)
            .with_context(|| format!("Failed to read {}", args.file.display()))?;
        let program = Program::decode(&bytes)
            .with_context(|| format!("Failed to decode {}", args.file.display()))?;
        print!("{program}");
        return Ok(());
    }

    let src = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let options = Options {
        word_length: args.word_length,
    };

    match args.emit {
        Emit::Tokens => {
            for token in Lexer::lex(&src)? {
                println!("{:>4}:{:<4} {token}", token.line, token.column);
            }
        }
        Emit::Ast => {
            let parsed = lang::parse(&src, &options)?;
            let mut out = String::new();
            parsed.ast.dump(&mut out, parsed.root)?;
            print!("{out}");
        }
        Emit::Listing => {
            let program = lang::compile_str(&src, &options)?;
            print!("{program}");
        }
        Emit::Bytecode => {
            let parsed = lang::parse(&src, &options)?;
            let program = compiler::compile(&parsed)?;
            let bytes = program.encode()?;

            let out = args
                .out
                .clone()
                .unwrap_or_else(|| args.file.with_extension("lbc"));
            fs::write(&out, &bytes)
                .with_context(|| format!("Failed to write {}", out.display()))?;

            info!("wrote {} bytes to {}", bytes.len(), out.display());
        }
    }

    Ok(())
}
