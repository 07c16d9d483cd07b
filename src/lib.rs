pub mod ast;
pub mod codegen;
pub mod driver;
pub mod jit;
pub mod lexer;
pub mod parser;
pub mod runtime;
