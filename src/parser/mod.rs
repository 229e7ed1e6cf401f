pub mod ast;

use crate::lexer::Token;
use anyhow::{anyhow, bail, Result};
use ast::{Command, Expr, Pipeline, Stmt, StmtKind, Value};

/// Recursive-descent parser over one line of tokens.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse one statement; `None` for an empty line.
    pub fn parse(&mut self) -> Result<Option<Stmt>> {
        if self.peek().is_none() {
            return Ok(None);
        }

        let lineno = if let Some(Token::Number(_)) = self.peek() {
            Some(self.expect_number()?)
        } else {
            None
        };

        let kind = self.parse_stmt()?;

        if let Some(token) = self.peek() {
            bail!("unexpected trailing input: {:?}", token);
        }
        Ok(Some(Stmt { lineno, kind }))
    }

    fn parse_stmt(&mut self) -> Result<StmtKind> {
        let head = match self.peek() {
            Some(Token::Word(w)) => w.clone(),
            Some(_) => return self.parse_exec(),
            None => bail!("expected a statement"),
        };

        match head.as_str() {
            "list" => {
                self.advance();
                Ok(StmtKind::List)
            }
            "run" => {
                self.advance();
                Ok(StmtKind::Run)
            }
            "jobs" => {
                self.advance();
                Ok(StmtKind::Jobs)
            }
            "vars" => {
                self.advance();
                Ok(StmtKind::Vars)
            }
            "pause" => {
                self.advance();
                Ok(StmtKind::Pause)
            }
            "goto" => {
                self.advance();
                Ok(StmtKind::Goto(self.expect_number()?))
            }
            "delete" => {
                self.advance();
                let min = self.expect_number()?;
                let max = if let Some(Token::Number(_)) = self.peek() {
                    self.expect_number()?
                } else {
                    min
                };
                Ok(StmtKind::Delete { min, max })
            }
            "wait" => {
                self.advance();
                Ok(StmtKind::Wait(self.parse_expr()?))
            }
            "poll" => {
                self.advance();
                Ok(StmtKind::Poll(self.parse_expr()?))
            }
            "cancel" => {
                self.advance();
                Ok(StmtKind::Cancel(self.parse_expr()?))
            }
            "expunge" => {
                self.advance();
                Ok(StmtKind::Expunge(self.parse_expr()?))
            }
            "unset" => {
                self.advance();
                match self.advance() {
                    Some(Token::Word(name)) => Ok(StmtKind::Unset(name)),
                    other => bail!("unset: expected a variable name, got {:?}", other),
                }
            }
            _ => {
                if let Some(Token::Equals) = self.peek_at(1) {
                    self.parse_assign()
                } else {
                    self.parse_exec()
                }
            }
        }
    }

    fn parse_assign(&mut self) -> Result<StmtKind> {
        let name = match self.advance() {
            Some(Token::Word(name)) => name,
            other => bail!("expected a variable name, got {:?}", other),
        };
        self.advance(); // the `=`

        let value = if let Some(Token::DollarParen) = self.peek() {
            self.advance();
            let mut pipeline = self.parse_pipeline(true)?;
            match self.advance() {
                Some(Token::RParen) => {}
                other => bail!("expected ')', got {:?}", other),
            }
            pipeline.capture_output = true;
            Value::Capture(pipeline)
        } else {
            Value::Expr(self.parse_expr()?)
        };

        Ok(StmtKind::Assign { name, value })
    }

    fn parse_exec(&mut self) -> Result<StmtKind> {
        let pipeline = self.parse_pipeline(false)?;
        let background = if let Some(Token::Amp) = self.peek() {
            self.advance();
            true
        } else {
            false
        };
        Ok(StmtKind::Exec {
            pipeline,
            background,
        })
    }

    fn parse_pipeline(&mut self, stop_at_rparen: bool) -> Result<Pipeline> {
        let mut pipeline = Pipeline {
            commands: Vec::new(),
            input_file: None,
            output_file: None,
            capture_output: false,
        };

        loop {
            let mut args = Vec::new();
            while let Some(expr) = self.peek_arg() {
                args.push(expr);
                self.advance();
            }
            if args.is_empty() {
                bail!("expected a command");
            }
            pipeline.commands.push(Command { args });

            loop {
                match self.peek() {
                    Some(Token::Lt) => {
                        self.advance();
                        pipeline.input_file = Some(self.expect_path()?);
                    }
                    Some(Token::Gt) => {
                        self.advance();
                        pipeline.output_file = Some(self.expect_path()?);
                    }
                    _ => break,
                }
            }

            match self.peek() {
                Some(Token::Pipe) => {
                    self.advance();
                }
                Some(Token::RParen) if stop_at_rparen => break,
                Some(Token::Amp) | None => break,
                Some(token) => bail!("unexpected token in pipeline: {:?}", token),
            }
        }

        Ok(pipeline)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.peek_arg()
            .map(|expr| {
                self.advance();
                expr
            })
            .ok_or_else(|| anyhow!("expected a value, got {:?}", self.peek()))
    }

    /// An argument-position token viewed as an expression, without consuming it.
    fn peek_arg(&self) -> Option<Expr> {
        match self.peek() {
            Some(Token::Word(w)) => Some(Expr::Word(w.clone())),
            Some(Token::Number(n)) => Some(Expr::Word(n.clone())),
            Some(Token::Str(s)) => Some(Expr::Str(s.clone())),
            Some(Token::Var(name)) => Some(Expr::Var(name.clone())),
            _ => None,
        }
    }

    fn expect_path(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Word(s)) | Some(Token::Str(s)) | Some(Token::Number(s)) => Ok(s),
            other => bail!("expected a file path, got {:?}", other),
        }
    }

    fn expect_number(&mut self) -> Result<u32> {
        match self.advance() {
            Some(Token::Number(text)) => text
                .parse::<u32>()
                .map_err(|_| anyhow!("line number out of range: {}", text)),
            other => bail!("expected a line number, got {:?}", other),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }
}
