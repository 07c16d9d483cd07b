use std::collections::VecDeque;
use std::io::BufRead;

use anyhow::Context as _;
use inkwell::{context::Context, values::{AnyValue, FunctionValue}};

use crate::ast::ANONYMOUS_FUNCTION;
use crate::codegen::Codegen;
use crate::jit::Jit;
use crate::lexer::{Lexer, Token};
use crate::parser::{Parser, ParserError};

pub const MODULE_NAME: &str = "kaleido";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// execute top-level expressions instead of only lowering them
    pub jit: bool,
    pub print_ir: bool,
    /// print a prompt whenever the next item is about to be read
    pub interactive: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            jit: true,
            print_ir: true,
            interactive: false,
        }
    }
}

/// Feeds a reader's lines to the lexer one at a time, so input is only read
/// once the lexer asks for more.
pub struct LineChars<R> {
    reader: R,
    pending: VecDeque<char>,
}

impl<R: BufRead> LineChars<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: VecDeque::new(),
        }
    }
}

impl<R: BufRead> Iterator for LineChars<R> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        loop {
            if let Some(c) = self.pending.pop_front() {
                return Some(c);
            }

            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => self.pending.extend(line.chars()),
                Err(e) => {
                    eprintln!("Error: failed to read input: {}", e);
                    return None;
                }
            }
        }
    }
}

/// The top-level loop:
/// `top ::= definition | external | expression | ';'`
pub struct Driver<'ctx, I: Iterator<Item = char>> {
    parser: Parser<I>,
    codegen: Codegen<'ctx>,
    jit: Option<Jit<'ctx>>,
    options: Options,
}

impl<'ctx, I: Iterator<Item = char>> Driver<'ctx, I> {
    pub fn new(context: &'ctx Context, source: I, options: Options) -> anyhow::Result<Self> {
        let jit = if options.jit {
            Some(Jit::new().context("failed to start the jit")?)
        } else {
            None
        };

        if options.interactive {
            eprint!("ready> ");
        }

        Ok(Self {
            parser: Parser::new(Lexer::new(source)),
            codegen: Codegen::new(context, MODULE_NAME),
            jit,
            options,
        })
    }

    /// Handle the next top-level item, yielding the value of a top-level
    /// expression if one was evaluated. `None` once the input is exhausted.
    pub fn step(&mut self) -> Option<anyhow::Result<Option<f64>>> {
        let handled = match self.parser.current().clone() {
            Token::Eof => return None,
            Token::Char(';') => {
                self.parser.advance();
                Ok(None)
            }
            Token::Def => self.handle_definition(),
            Token::Extern => self.handle_extern(),
            _ => self.handle_top_level_expression(),
        };
        Some(handled)
    }

    /// Run until end of input, returning the value of every evaluated
    /// top-level expression. Failures are reported and skipped.
    pub fn run(&mut self) -> Vec<f64> {
        let mut results = Vec::new();

        while let Some(handled) = self.step() {
            match handled {
                Ok(Some(value)) => results.push(value),
                Ok(None) => (),
                Err(e) => eprintln!("Error: {:#}", e),
            }

            if self.options.interactive {
                eprint!("ready> ");
            }
        }

        results
    }

    /// Skip the offending token so the loop can resume after a parse error.
    fn recover<T>(&mut self, parsed: Result<T, ParserError>) -> Result<T, ParserError> {
        if parsed.is_err() {
            self.parser.advance();
        }
        parsed
    }

    fn report(&self, header: &str, ir: FunctionValue<'ctx>) {
        if self.options.print_ir {
            eprintln!("{}", header);
            eprintln!("{}", ir.print_to_string().to_string());
        }
    }

    /// Lowering failed: throw away whatever the unit's module picked up.
    fn discard_unit<E>(&mut self, err: E) -> E {
        drop(self.codegen.take_module());
        err
    }

    fn submit_unit(&mut self) -> anyhow::Result<()> {
        let module = self.codegen.take_module();
        if let Some(jit) = self.jit.as_mut() {
            jit.add_unit(module)?;
        }
        Ok(())
    }

    fn handle_definition(&mut self) -> anyhow::Result<Option<f64>> {
        let parsed = self.parser.parse_definition();
        let function = self.recover(parsed)?;
        let ir = self
            .codegen
            .compile_fn(&function)
            .map_err(|e| self.discard_unit(e))?;
        self.report("Read function definition:", ir);
        self.submit_unit()?;
        Ok(None)
    }

    fn handle_extern(&mut self) -> anyhow::Result<Option<f64>> {
        let parsed = self.parser.parse_extern();
        let proto = self.recover(parsed)?;
        let ir = self
            .codegen
            .compile_proto(&proto)
            .map_err(|e| self.discard_unit(e))?;
        self.report("Read extern:", ir);
        self.submit_unit()?;
        Ok(None)
    }

    fn handle_top_level_expression(&mut self) -> anyhow::Result<Option<f64>> {
        let parsed = self.parser.parse_top_level_expr();
        let function = self.recover(parsed)?;
        let ir = self
            .codegen
            .compile_fn(&function)
            .map_err(|e| self.discard_unit(e))?;
        self.report("Read top-level expression:", ir);

        let module = self.codegen.take_module();
        let jit = match self.jit.as_mut() {
            Some(jit) => jit,
            None => return Ok(None),
        };

        let unit = jit.add_unit(module)?;
        let value = jit.call_nullary(ANONYMOUS_FUNCTION);
        jit.remove_unit(unit);

        let value = value?;
        eprintln!("Evaluated to {}", value);
        Ok(Some(value))
    }
}
