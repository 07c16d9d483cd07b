use std::{fmt, iter::Peekable};

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    /// any other single character, operators and punctuation alike
    Char(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "def"),
            Token::Extern => write!(f, "extern"),
            Token::Ident(ident) => write!(f, "identifier '{}'", ident),
            Token::Number(num) => write!(f, "number {}", num),
            Token::Char(c) => write!(f, "'{}'", c),
        }
    }
}

/// Pulls tokens on demand from a character source. Nothing past the next
/// pending character is ever read, so an interactive source only blocks when
/// the parser actually needs another token.
pub struct Lexer<I: Iterator<Item = char>> {
    chars: Peekable<I>,
}

impl<I: Iterator<Item = char>> Lexer<I> {
    pub fn new(chars: I) -> Self {
        Self {
            chars: chars.peekable(),
        }
    }

    fn take_while(&mut self, buf: &mut String, pred: impl Fn(char) -> bool) {
        while let Some(&c) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            buf.push(c);
            self.chars.next();
        }
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            while self.chars.next_if(|&c| is_space(c)).is_some() {}

            let c = match self.chars.peek() {
                Some(&c) => c,
                None => return Token::Eof,
            };

            if c.is_ascii_alphabetic() {
                let mut ident = String::new();
                self.take_while(&mut ident, |c| c.is_ascii_alphanumeric());
                return match ident.as_str() {
                    "def" => Token::Def,
                    "extern" => Token::Extern,
                    _ => Token::Ident(ident),
                };
            }

            if c.is_ascii_digit() || c == '.' {
                let mut num = String::new();
                self.take_while(&mut num, |c| c.is_ascii_digit() || c == '.');
                return Token::Number(parse_number(&num));
            }

            if c == '#' {
                // comment runs to the end of the line
                while self.chars.next_if(|&c| c != '\n' && c != '\r').is_some() {}
                continue;
            }

            self.chars.next();
            return Token::Char(c);
        }
    }
}

impl<I: Iterator<Item = char>> Iterator for Lexer<I> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        match self.next_token() {
            Token::Eof => None,
            tok => Some(tok),
        }
    }
}

/// Same set as C `isspace`, which unlike `char::is_ascii_whitespace`
/// includes vertical tab.
fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0B' | '\x0C')
}

/// Reads the longest numeric prefix, `strtod` style: `1.2.3` is `1.2` and a
/// lone `.` is `0`.
fn parse_number(text: &str) -> f64 {
    let end = text
        .match_indices('.')
        .nth(1)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text[..end].parse().unwrap_or(0.0)
}

/// lex a whole string, stopping before the end of input token
pub fn lex(input: &str) -> Vec<Token> {
    Lexer::new(input.chars()).collect()
}
