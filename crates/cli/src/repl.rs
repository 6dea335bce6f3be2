// Interactive Lua prompt over the script host. Runs until quit() or EOF.

use std::io::{self, BufRead, Write};

use xlsx2json_script::{ScriptError, ScriptHost};

use crate::CliError;

const PROMPT: &str = "> ";

/// Read lines from `input`, evaluate each, write results to `output`.
/// Errors are reported and the loop continues; only an exit request or an
/// I/O failure ends it early.
pub fn run<R: BufRead, W: Write>(host: &ScriptHost, input: R, mut output: W) -> Result<(), CliError> {
    let mut lines = input.lines();
    while host.keep_running() {
        write!(output, "{}", PROMPT).and_then(|_| output.flush()).map_err(repl_io)?;

        let line = match lines.next() {
            Some(line) => line.map_err(repl_io)?,
            None => {
                writeln!(output).map_err(repl_io)?;
                break;
            }
        };

        match host.eval(&line) {
            Ok(Some(result)) => writeln!(output, "{}", result).map_err(repl_io)?,
            Ok(None) => {}
            Err(ScriptError::Eval(message)) => writeln!(output, "error: {}", message).map_err(repl_io)?,
            Err(err) => return Err(CliError::script(err)),
        }
    }
    Ok(())
}

/// Run the prompt on the terminal.
pub fn run_stdio(host: &ScriptHost) -> Result<(), CliError> {
    let stdin = io::stdin();
    run(host, stdin.lock(), io::stderr())
}

fn repl_io(err: io::Error) -> CliError {
    CliError::output(format!("repl: {}", err))
}
