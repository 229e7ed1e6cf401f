use serde::{Deserialize, Serialize};
use std::fmt;

/// One parsed input line.
///
/// A statement with a line number is destined for the program store;
/// a statement without one is executed immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub lineno: Option<u32>,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// List the stored program with the program-counter marker.
    List,
    /// Delete stored lines whose numbers fall in the inclusive range.
    Delete { min: u32, max: u32 },
    /// Execute the stored program from the beginning.
    Run,
    /// Move the program counter to the given line.
    Goto(u32),
    /// Dump the job table.
    Jobs,
    /// Dump the variable store.
    Vars,
    /// Block until the next job status or output event.
    Pause,
    Wait(Expr),
    Poll(Expr),
    Cancel(Expr),
    Expunge(Expr),
    Unset(String),
    Assign { name: String, value: Value },
    Exec { pipeline: Pipeline, background: bool },
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Expr(Expr),
    /// `$(pipeline)`: run the pipeline with output capture and store
    /// whatever it wrote to its standard output.
    Capture(Pipeline),
}

/// A pipeline of commands plus its redirection attributes.
///
/// `input_file` applies to the first command, `output_file` and
/// `capture_output` to the last. `capture_output` and `output_file`
/// are mutually exclusive at launch time; the parser only ever sets
/// `capture_output` for capture assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub input_file: Option<String>,
    pub output_file: Option<String>,
    pub capture_output: bool,
}

/// One pipeline stage. `args[0]` is the program name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub args: Vec<Expr>,
}

/// An argument expression, evaluated to a string at launch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A bare word, taken literally.
    Word(String),
    /// A double-quoted string.
    Str(String),
    /// A `$name` reference into the variable store.
    Var(String),
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.lineno {
            write!(f, "{} ", n)?;
        }
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for StmtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StmtKind::List => write!(f, "list"),
            StmtKind::Delete { min, max } => write!(f, "delete {} {}", min, max),
            StmtKind::Run => write!(f, "run"),
            StmtKind::Goto(n) => write!(f, "goto {}", n),
            StmtKind::Jobs => write!(f, "jobs"),
            StmtKind::Vars => write!(f, "vars"),
            StmtKind::Pause => write!(f, "pause"),
            StmtKind::Wait(e) => write!(f, "wait {}", e),
            StmtKind::Poll(e) => write!(f, "poll {}", e),
            StmtKind::Cancel(e) => write!(f, "cancel {}", e),
            StmtKind::Expunge(e) => write!(f, "expunge {}", e),
            StmtKind::Unset(name) => write!(f, "unset {}", name),
            StmtKind::Assign { name, value } => write!(f, "{} = {}", name, value),
            StmtKind::Exec {
                pipeline,
                background,
            } => {
                write!(f, "{}", pipeline)?;
                if *background {
                    write!(f, " &")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Expr(e) => write!(f, "{}", e),
            Value::Capture(p) => write!(f, "$({})", p),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cmd) in self.commands.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", cmd)?;
        }
        if let Some(path) = &self.input_file {
            write!(f, " < {}", path)?;
        }
        if let Some(path) = &self.output_file {
            write!(f, " > {}", path)?;
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Word(w) => write!(f, "{}", w),
            Expr::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Expr::Var(name) => write!(f, "${}", name),
        }
    }
}
