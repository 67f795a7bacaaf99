use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use ember_lang as ember;

use ember::ast_printer::AstPrinter;
use ember::error::EmberError;
use ember::interpreter::Interpreter;
use ember::parser::Parser;
use ember::resolver::Resolver;
use ember::scanner::Scanner;
use ember::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about = "Ember language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: Option<PathBuf>,

        /// Emit the token stream as JSON instead of the plain listing
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file and prints each statement's AST
    Parse { filename: Option<PathBuf> },

    /// Runs input from a file as an Ember program
    Run { filename: Option<PathBuf> },

    /// Starts an interactive session
    Repl,
}

/// Memory-maps the contents of a source file.
fn map_file(filename: &PathBuf) -> Result<Mmap> {
    info!("Mapping file: {:?}", filename);
    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;

    // SAFETY: the mapping is read-only and stays alive for the whole scan
    let mmap =
        unsafe { Mmap::map(&file) }.context(format!("Failed to map file {:?}", filename))?;

    // the scanner slices lexemes without re-checking encoding
    std::str::from_utf8(&mmap)
        .map_err(EmberError::from)
        .context(format!("File {:?} is not valid UTF-8", filename))?;

    info!("Mapped {} bytes from {:?}", mmap.len(), filename);

    Ok(mmap)
}

fn init_logger() -> Result<()> {
    // Create or open the log file
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    // Configure env_logger to write to file with module path and source line
    Builder::new()
        .format(|buf, record| {
            // Strip 'ember_lang::' from module path
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("ember_lang::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Scans `src` to completion, printing every lexing error.  Returns the token
/// list and whether scanning was clean.
fn scan_source(src: &[u8]) -> (Vec<Token>, bool) {
    let scanner = Scanner::new(src);
    let mut tokens: Vec<Token> = Vec::new();
    let mut clean = true;

    for result in scanner {
        match result {
            Ok(token) => {
                debug!("Scanned token: {}", token);
                tokens.push(token);
            }

            Err(e) => {
                clean = false;

                debug!("Scan error: {}", e);

                eprintln!("{}", e);
            }
        }
    }

    (tokens, clean)
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands {
        Commands::Tokenize { filename, json } => match filename {
            Some(filename) => {
                info!("Running Tokenize subcommand");
                let mmap = map_file(&filename)?;
                let (tokens, clean) = scan_source(&mmap);

                if json {
                    let rendered = serde_json::to_string_pretty(&tokens)
                        .context("Failed to serialize tokens")?;
                    println!("{}", rendered);
                } else {
                    for token in &tokens {
                        println!("{}", token);
                    }
                }

                if !clean {
                    debug!("Tokenization failed, exiting with code 65");

                    std::process::exit(65);
                }

                info!("Tokenization completed successfully");
            }
            None => {
                info!("No filepath provided for Tokenize");

                println!("No input filepath was provided. Exiting...");

                std::process::exit(0);
            }
        },

        Commands::Parse { filename } => match filename {
            Some(filename) => {
                info!("Running Parse subcommand");
                let mmap = map_file(&filename)?;
                let (tokens, clean) = scan_source(&mmap);

                if !clean {
                    std::process::exit(65);
                }

                let mut parser = Parser::new(&tokens);

                match parser.parse() {
                    Ok(statements) => {
                        info!("Parsed {} statements", statements.len());

                        for stmt in &statements {
                            println!("{}", AstPrinter::print_stmt(stmt));
                        }
                    }

                    Err(e) => {
                        debug!("Parse error: {}", e);
                        eprintln!("{}", e);
                        std::process::exit(65);
                    }
                }

                info!("Parse subcommand completed");
            }
            None => {
                info!("No filepath provided for Parse");
                println!("No input filepath was provided. Exiting...");
                std::process::exit(0);
            }
        },

        Commands::Run { filename } => match filename {
            Some(filename) => {
                info!("Running Run subcommand");
                let mmap = map_file(&filename)?;
                let (tokens, clean) = scan_source(&mmap);

                if !clean {
                    std::process::exit(65);
                }

                let mut parser = Parser::new(&tokens);
                let statements = match parser.parse() {
                    Ok(statements) => statements,

                    Err(e) => {
                        debug!("Parse error: {}", e);
                        eprintln!("{}", e);
                        std::process::exit(65);
                    }
                };

                info!("Parsed {} statements", statements.len());

                let mut interpreter = Interpreter::new();

                // Fail closed: any resolution error skips evaluation entirely.
                let resolver = Resolver::new(&mut interpreter);
                if let Err(errors) = resolver.resolve(&statements) {
                    for e in &errors {
                        eprintln!("{}", e);
                    }

                    debug!("Resolution failed with {} error(s)", errors.len());
                    std::process::exit(65);
                }

                match interpreter.interpret(&statements) {
                    Ok(()) => {
                        info!("Program executed successfully");
                    }

                    Err(e) => {
                        debug!("Runtime error: {}", e);
                        eprintln!("{}", e);
                        std::process::exit(70);
                    }
                }
            }

            None => {
                info!("No filepath provided for Run");
                println!("No input filepath was provided. Exiting...");
                std::process::exit(0);
            }
        },

        Commands::Repl => {
            info!("Starting REPL");
            repl()?;
        }
    }

    Ok(())
}

/// Interactive session: one statement list per line, sharing a single
/// interpreter so globals and closures persist.  Errors are reported and the
/// session continues.
fn repl() -> Result<()> {
    let stdin = io::stdin();
    let mut interpreter = Interpreter::new();

    // node ids must stay unique across lines for as long as closures from
    // earlier lines are alive
    let mut next_id: usize = 0;

    loop {
        print!("## ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        if line.trim().is_empty() {
            continue;
        }

        let (tokens, clean) = scan_source(line.as_bytes());
        if !clean {
            continue;
        }

        let mut parser = Parser::with_first_id(&tokens, next_id);
        let statements = match parser.parse() {
            Ok(statements) => statements,

            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };
        next_id = parser.next_id();

        let resolver = Resolver::new(&mut interpreter);
        if let Err(errors) = resolver.resolve(&statements) {
            for e in errors {
                eprintln!("{}", e);
            }
            continue;
        }

        if let Err(e) = interpreter.interpret(&statements) {
            // interactive policy: report, keep the session alive
            eprintln!("{}", e);
        }
    }

    Ok(())
}
