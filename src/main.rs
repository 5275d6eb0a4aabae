use std::path::PathBuf;

use clap::Parser;

use quill::context::Context;
use quill::log::Logger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Options {
    /// Script files to run; the shell starts when none are given
    files: Vec<PathBuf>,

    /// Skip the bundled standard library
    #[arg(long)]
    no_std: bool,

    /// Log compiled instructions and machine steps to stderr
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let options = Options::parse();

    let logger = Logger::to_stderr();
    if options.debug {
        logger.instructions.set(true);
        logger.stack.set(true);
    }

    let ctx = match Context::new(!options.no_std, logger) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    if options.files.is_empty() {
        quill::repl::run(&ctx);
        return;
    }

    for file in &options.files {
        let source = match std::fs::read_to_string(file) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("error: could not read '{}': {}", file.display(), err);
                std::process::exit(1);
            }
        };
        if let Err(err) = ctx.compile_and_execute(&source) {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}
