use crate::error::JushError;
use crate::parser::ast::Stmt;
use std::io::{self, Write};

/// Position of the program counter.
///
/// `At(n)` designates the position just before the stored line
/// numbered `n`, which always exists while the cursor holds it.
/// `End` is the position past the last line. `Unset` is the state
/// before the store has ever been reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Unset,
    At(u32),
    End,
}

#[derive(Debug)]
struct ProgramLine {
    lineno: u32,
    stmt: Stmt,
}

/// Numbered-statement store with a program counter.
///
/// Lines are kept in strictly increasing line-number order. The
/// cursor survives edits: it designates a *line*, not an index, so
/// inserting or deleting other lines never moves it. Deleting the
/// cursor's own line advances it to the first survivor past the
/// deleted range.
#[derive(Debug, Default)]
pub struct ProgramStore {
    lines: Vec<ProgramLine>,
    cursor: Cursor,
    touched: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::Unset
    }
}

impl ProgramStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a statement under its line number, replacing any
    /// existing statement with the same number.
    ///
    /// The statement must carry a positive line number. The cursor is
    /// unaffected: a replaced line keeps its position, so a cursor
    /// designating it now designates the replacement.
    pub fn insert(&mut self, stmt: Stmt) -> Result<(), JushError> {
        let lineno = stmt
            .lineno
            .filter(|&n| n > 0)
            .ok_or(JushError::BadLineNumber)?;
        self.touched = true;
        match self.lines.binary_search_by_key(&lineno, |line| line.lineno) {
            Ok(i) => self.lines[i].stmt = stmt,
            Err(i) => self.lines.insert(i, ProgramLine { lineno, stmt }),
        }
        Ok(())
    }

    /// Delete every line whose number falls in `[min, max]`.
    ///
    /// If the cursor's line is deleted, the cursor moves to the first
    /// surviving line past `max`, or to the end if there is none.
    pub fn delete(&mut self, min: u32, max: u32) -> Result<(), JushError> {
        if min < 1 || max < min {
            return Err(JushError::BadRange(min, max));
        }
        if let Cursor::At(n) = self.cursor {
            if n >= min && n <= max {
                self.cursor = self
                    .lines
                    .iter()
                    .map(|line| line.lineno)
                    .find(|&lineno| lineno > max)
                    .map_or(Cursor::End, Cursor::At);
            }
        }
        self.lines
            .retain(|line| line.lineno < min || line.lineno > max);
        Ok(())
    }

    /// Move the cursor to the first line, or to the end if the store
    /// is empty. Does nothing if the store has never been used.
    pub fn reset(&mut self) {
        if !self.touched {
            return;
        }
        self.cursor = self
            .lines
            .first()
            .map_or(Cursor::End, |line| Cursor::At(line.lineno));
    }

    /// Statement at the cursor, without advancing.
    pub fn fetch(&self) -> Option<&Stmt> {
        match self.cursor {
            Cursor::At(n) => self.lookup(n),
            _ => None,
        }
    }

    /// Advance the cursor one position, then return the statement
    /// now at the cursor.
    pub fn next(&mut self) -> Option<&Stmt> {
        if let Cursor::At(n) = self.cursor {
            self.cursor = self
                .lines
                .iter()
                .map(|line| line.lineno)
                .find(|&lineno| lineno > n)
                .map_or(Cursor::End, Cursor::At);
        }
        self.fetch()
    }

    /// Move the cursor to the line numbered `lineno` and return its
    /// statement. The cursor is unchanged when no such line exists.
    pub fn goto(&mut self, lineno: u32) -> Option<&Stmt> {
        if self.lookup(lineno).is_some() {
            self.cursor = Cursor::At(lineno);
            self.fetch()
        } else {
            None
        }
    }

    /// List the program in line order, with a `-->` marker line at
    /// the cursor position.
    pub fn list(&self, out: &mut dyn Write) -> io::Result<()> {
        for line in &self.lines {
            if self.cursor == Cursor::At(line.lineno) {
                writeln!(out, "-->")?;
            }
            writeln!(out, "{}", line.stmt)?;
        }
        if self.cursor == Cursor::End {
            writeln!(out, "-->")?;
        }
        Ok(())
    }

    fn lookup(&self, lineno: u32) -> Option<&Stmt> {
        self.lines
            .binary_search_by_key(&lineno, |line| line.lineno)
            .ok()
            .map(|i| &self.lines[i].stmt)
    }
}
