//! The interactive shell. It is a thin collaborator over
//! [Context::compile_and_execute]: comma commands are handled here, anything
//! else is fed to the pipeline and the results (or the error) are printed.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::context::Context;

const HELP: &str = "commands:
  ,exit     leave the shell
  ,help     show this text
  ,logcomp  toggle logging of compiled instructions
  ,logexec  toggle logging of machine steps
  ,time     toggle timing of each expression";

pub fn run(ctx: &Context) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("cannot start the shell: {}", err);
            return;
        }
    };

    let mut show_time = false;
    println!("quill {} — ,help for commands", env!("CARGO_PKG_VERSION"));

    loop {
        let prompt = if ctx.has_pending_input() { ". " } else { "> " };
        match editor.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());

                if let Some(command) = trimmed.strip_prefix(',') {
                    match command {
                        "exit" => break,
                        "help" => println!("{}", HELP),
                        "logcomp" => {
                            let on = !ctx.logger.instructions.get();
                            ctx.logger.instructions.set(on);
                            println!("instruction logging {}", if on { "on" } else { "off" });
                        }
                        "logexec" => {
                            let on = !ctx.logger.stack.get();
                            ctx.logger.stack.set(on);
                            println!("execution logging {}", if on { "on" } else { "off" });
                        }
                        "time" => {
                            show_time = !show_time;
                            println!("timing {}", if show_time { "on" } else { "off" });
                        }
                        other => println!("unknown command ',{}' — try ,help", other),
                    }
                    continue;
                }

                match ctx.compile_and_execute(&line) {
                    Ok(results) => {
                        for result in results {
                            println!("{}", result.output);
                            if show_time {
                                println!(";; {:?}", result.elapsed);
                            }
                        }
                    }
                    Err(err) => println!("{}", err),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("error: {:?}", err);
                break;
            }
        }
    }
}
