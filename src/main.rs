use anyhow::{Context, Result};
use jush::interp::Interp;
use nix::libc;
use reedline::{DefaultPrompt, Reedline, Signal};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

fn main() -> Result<()> {
    let mut interp = Interp::new()?;

    let result = match std::env::args().nth(1) {
        Some(path) => run_script(&path, &mut interp),
        None if unsafe { libc::isatty(libc::STDIN_FILENO) } == 1 => repl(&mut interp),
        None => run_stream(BufReader::new(io::stdin()), &mut interp),
    };

    interp.shutdown()?;
    result?;
    Ok(())
}

fn repl(interp: &mut Interp) -> Result<()> {
    let mut line_editor = Reedline::create();
    let prompt = DefaultPrompt::default();
    let mut out = io::stdout();

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                let line = buffer.trim();
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = interp.execute_line(line, &mut out) {
                    eprintln!("jush: {}", e);
                }
                out.flush()?;
            }
            Ok(Signal::CtrlC) => continue,
            Ok(Signal::CtrlD) => break,
            Err(e) => {
                eprintln!("jush: error reading line: {}", e);
                break;
            }
        }
    }
    Ok(())
}

fn run_script(path: &str, interp: &mut Interp) -> Result<()> {
    let file = File::open(path).with_context(|| format!("cannot open script '{}'", path))?;
    run_stream(BufReader::new(file), interp)
}

fn run_stream<R: BufRead>(reader: R, interp: &mut Interp) -> Result<()> {
    let mut out = io::stdout();
    for line in reader.lines() {
        let line = line?;
        if let Err(e) = interp.execute_line(&line, &mut out) {
            eprintln!("jush: {}", e);
        }
        out.flush()?;
    }
    Ok(())
}
