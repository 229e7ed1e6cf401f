use crate::eval::eval_to_string;
use crate::jobs::{status_raw, JobManager};
use crate::lexer;
use crate::parser::ast::{Expr, Pipeline, Stmt, StmtKind, Value};
use crate::parser::Parser;
use crate::program::ProgramStore;
use crate::store::VarStore;
use anyhow::{anyhow, Result};
use std::io::Write;

/// The interpreter: one variable store, one program store, one job
/// manager, and the dispatch logic that ties them together.
pub struct Interp {
    vars: VarStore,
    program: ProgramStore,
    jobs: JobManager,
}

impl Interp {
    pub fn new() -> Result<Self> {
        let jobs = JobManager::new();
        jobs.init()?;
        Ok(Self {
            vars: VarStore::new(),
            program: ProgramStore::new(),
            jobs,
        })
    }

    /// Lex, parse and execute one input line. Output that a statement
    /// produces (listings, dumps, wait statuses) goes to `out`.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<()> {
        let tokens = lexer::tokenize(line)?;
        let Some(stmt) = Parser::new(tokens).parse()? else {
            return Ok(());
        };
        self.execute(stmt, out)
    }

    /// Execute one statement: numbered statements go to the program
    /// store, everything else runs now.
    pub fn execute(&mut self, stmt: Stmt, out: &mut dyn Write) -> Result<()> {
        if stmt.lineno.is_some() {
            self.program.insert(stmt)?;
            return Ok(());
        }
        self.execute_kind(stmt.kind, out)
    }

    /// Cancel and reap everything still running. Call before exit.
    pub fn shutdown(&mut self) -> Result<()> {
        self.jobs.fini()?;
        Ok(())
    }

    fn execute_kind(&mut self, kind: StmtKind, out: &mut dyn Write) -> Result<()> {
        match kind {
            StmtKind::List => self.program.list(out)?,
            StmtKind::Delete { min, max } => self.program.delete(min, max)?,
            StmtKind::Run => self.run_program(out)?,
            StmtKind::Goto(lineno) => {
                self.program
                    .goto(lineno)
                    .ok_or_else(|| anyhow!("no line numbered {}", lineno))?;
            }
            StmtKind::Jobs => self.jobs.show(out)?,
            StmtKind::Vars => {
                self.vars.show(out)?;
                writeln!(out)?;
            }
            StmtKind::Pause => self.jobs.pause()?,
            StmtKind::Wait(expr) => {
                let status = self.jobs.wait(self.job_id(&expr)?)?;
                writeln!(out, "{}", status_raw(status))?;
            }
            StmtKind::Poll(expr) => {
                let status = self.jobs.poll(self.job_id(&expr)?)?;
                writeln!(out, "{}", status_raw(status))?;
            }
            StmtKind::Cancel(expr) => self.jobs.cancel(self.job_id(&expr)?)?,
            StmtKind::Expunge(expr) => self.jobs.expunge(self.job_id(&expr)?)?,
            StmtKind::Unset(name) => self.vars.set_string(&name, None)?,
            StmtKind::Assign { name, value } => self.assign(&name, value)?,
            StmtKind::Exec {
                pipeline,
                background,
            } => self.exec_pipeline(&pipeline, background, out)?,
        }
        Ok(())
    }

    /// Run the stored program from the top. The cursor is advanced
    /// before each statement executes, so a `goto` lands exactly on
    /// its target line.
    fn run_program(&mut self, out: &mut dyn Write) -> Result<()> {
        self.program.reset();
        loop {
            let Some(stmt) = self.program.fetch().cloned() else {
                break;
            };
            self.program.next();
            self.execute_kind(stmt.kind, out)?;
        }
        Ok(())
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match value {
            Value::Expr(expr) => {
                let text = eval_to_string(&expr, &self.vars);
                self.vars.set_string(name, Some(&text))?;
            }
            Value::Capture(pipeline) => {
                let id = self.jobs.run(&pipeline, &self.vars)?;
                self.jobs.wait(id)?;
                let output = self.jobs.get_output(id).unwrap_or_default();
                self.jobs.expunge(id)?;
                self.vars
                    .set_string(name, Some(&String::from_utf8_lossy(&output)))?;
            }
        }
        Ok(())
    }

    fn exec_pipeline(
        &mut self,
        pipeline: &Pipeline,
        background: bool,
        out: &mut dyn Write,
    ) -> Result<()> {
        let id = self.jobs.run(pipeline, &self.vars)?;
        if background {
            writeln!(out, "[{}]", id)?;
        } else {
            self.jobs.wait(id)?;
            self.jobs.expunge(id)?;
        }
        Ok(())
    }

    fn job_id(&self, expr: &Expr) -> Result<u32> {
        let text = eval_to_string(expr, &self.vars);
        text.parse::<u32>()
            .map_err(|_| anyhow!("not a job id: '{}'", text))
    }
}
