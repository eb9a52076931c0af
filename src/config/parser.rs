//! Recursive-descent parser over the lexer's token stream, producing a flat
//! `section -> key -> value` table (spec §6, §5 GLOSSARY "Section").
//!
//! Ported from the teacher's `ConfigParser` (`src/config_handler/parser.rs`):
//! a `peek_kind`/`consume`/`skip_newlines` cursor over the token vector and
//! a `ConfigError` that carries the offending `Loc` plus a short context
//! trace, minus the indentation bookkeeping a flat `[section]` grammar
//! doesn't need.

use std::collections::HashMap;
use std::fmt;

use super::lexer::{Lexer, Loc, Token, TokenKind};

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub loc: Loc,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error at line {}, col {}: {}", self.loc.line, self.loc.col, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// One `[section]` block's raw `key = value` pairs.
pub type Section = HashMap<String, String>;

/// The whole file: section name -> its keys. The implicit top-level
/// section (before the first `[header]`) is named `""`.
pub type Document = HashMap<String, Section>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn parse(source: &str) -> Result<Document, ConfigError> {
        let tokens = Lexer::new(source).tokenize();
        let mut parser = Parser { tokens, pos: 0 };
        parser.parse_document()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline) {
            self.bump();
        }
    }

    fn parse_document(&mut self) -> Result<Document, ConfigError> {
        let mut doc = Document::new();
        let mut current_section = String::new();
        doc.insert(current_section.clone(), Section::new());

        self.skip_newlines();
        while !matches!(self.peek().kind, TokenKind::Eof) {
            match &self.peek().kind {
                TokenKind::LBracket => {
                    current_section = self.parse_section_header()?;
                    doc.entry(current_section.clone()).or_default();
                }
                TokenKind::Ident(_) => {
                    let (key, value) = self.parse_pair()?;
                    doc.get_mut(&current_section).unwrap().insert(key, value);
                }
                _ => {
                    let tok = self.bump();
                    return Err(ConfigError {
                        message: format!("unexpected token {:?}", tok.kind),
                        loc: tok.loc,
                    });
                }
            }
            self.skip_newlines();
        }
        Ok(doc)
    }

    fn parse_section_header(&mut self) -> Result<String, ConfigError> {
        self.bump(); // '['
        let name = match self.bump().kind {
            TokenKind::Ident(s) => s,
            other => {
                return Err(ConfigError {
                    message: format!("expected section name, found {other:?}"),
                    loc: self.peek().loc,
                })
            }
        };
        match self.bump().kind {
            TokenKind::RBracket => Ok(name),
            other => Err(ConfigError {
                message: format!("expected ']', found {other:?}"),
                loc: self.peek().loc,
            }),
        }
    }

    fn parse_pair(&mut self) -> Result<(String, String), ConfigError> {
        let key_tok = self.bump();
        let key = match key_tok.kind {
            TokenKind::Ident(s) => s,
            other => {
                return Err(ConfigError {
                    message: format!("expected key, found {other:?}"),
                    loc: key_tok.loc,
                })
            }
        };
        match self.bump().kind {
            TokenKind::Equals => {}
            other => {
                return Err(ConfigError {
                    message: format!("expected '=' after key '{key}', found {other:?}"),
                    loc: key_tok.loc,
                })
            }
        }
        let value_tok = self.bump();
        let value = match value_tok.kind {
            TokenKind::Ident(s) | TokenKind::Value(s) => s,
            other => {
                return Err(ConfigError {
                    message: format!("expected value for key '{key}', found {other:?}"),
                    loc: value_tok.loc,
                })
            }
        };
        Ok((key, value))
    }
}
