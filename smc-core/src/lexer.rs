//! Tokenizer for `.sm` source text.
//!
//! The language is line oriented, so newlines are tokens. Comments start with
//! `#` and run to the end of the line. Guard expressions are captured whole
//! as the raw text between `[` and `]` and parsed later by
//! [`GuardExpr::parse`](crate::guard::GuardExpr::parse).

use crate::definition::Location;
use crate::error::{SyntaxError, SyntaxErrorKind};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// Reserved words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Machine,
    Events,
    ResetEvents,
    Commands,
    Initial,
    State,
    Entry,
    Exit,
    End,
    Transition,
    On,
}

impl Keyword {
    pub const ALL: [Keyword; 11] = [
        Keyword::Machine,
        Keyword::Events,
        Keyword::ResetEvents,
        Keyword::Commands,
        Keyword::Initial,
        Keyword::State,
        Keyword::Entry,
        Keyword::Exit,
        Keyword::End,
        Keyword::Transition,
        Keyword::On,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Machine => "machine",
            Keyword::Events => "events",
            Keyword::ResetEvents => "resetEvents",
            Keyword::Commands => "commands",
            Keyword::Initial => "initial",
            Keyword::State => "state",
            Keyword::Entry => "entry",
            Keyword::Exit => "exit",
            Keyword::End => "end",
            Keyword::Transition => "transition",
            Keyword::On => "on",
        }
    }

    pub fn lookup(word: &str) -> Option<Keyword> {
        Keyword::ALL.into_iter().find(|k| k.as_str() == word)
    }
}

/// The kind of token, not including source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Keyword(Keyword),
    /// `->`
    Arrow,
    /// `=>`
    FatArrow,
    /// `/`
    Slash,
    /// Raw guard text between `[` and `]`.
    Guard(String),
    Newline,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::Keyword(k) => write!(f, "keyword '{}'", k.as_str()),
            TokenKind::Arrow => f.write_str("'->'"),
            TokenKind::FatArrow => f.write_str("'=>'"),
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::Guard(_) => f.write_str("guard"),
            TokenKind::Newline => f.write_str("newline"),
            TokenKind::Eof => f.write_str("end of file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

/// Splits source text into tokens. The last token is always [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

/// Returns true if `s` can be written as a bare identifier.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if is_ident_start(c))
        && chars.all(is_ident_continue)
        && Keyword::lookup(s).is_none()
}

/// Rewrites `s` into a bare identifier: characters that cannot appear in one
/// become `_`, and a leading digit or a keyword gets a `_` prefix.
pub fn to_identifier(s: &str) -> String {
    if is_identifier(s) {
        return s.to_string();
    }
    let mut out: String = s
        .chars()
        .map(|c| if is_ident_continue(c) { c } else { '_' })
        .collect();
    if !out.starts_with(is_ident_start) || Keyword::lookup(&out).is_some() {
        out.insert(0, '_');
    }
    out
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, location: Location) {
        self.tokens.push(Token { kind, location });
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        while let Some(&c) = self.chars.peek() {
            let start = self.location();
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    self.push(TokenKind::Newline, start);
                }
                '#' => {
                    while matches!(self.chars.peek(), Some(&c) if c != '\n') {
                        self.bump();
                    }
                }
                '-' | '=' => {
                    self.bump();
                    if self.chars.peek() != Some(&'>') {
                        return Err(SyntaxError::new(
                            start,
                            SyntaxErrorKind::UnexpectedCharacter(c),
                        ));
                    }
                    self.bump();
                    let kind = if c == '-' {
                        TokenKind::Arrow
                    } else {
                        TokenKind::FatArrow
                    };
                    self.push(kind, start);
                }
                '/' => {
                    self.bump();
                    self.push(TokenKind::Slash, start);
                }
                '[' => {
                    self.bump();
                    let text = self.guard_text(start)?;
                    self.push(TokenKind::Guard(text), start);
                }
                c if is_ident_start(c) => {
                    let word = self.word();
                    let kind = match Keyword::lookup(&word) {
                        Some(k) => TokenKind::Keyword(k),
                        None => TokenKind::Ident(word),
                    };
                    self.push(kind, start);
                }
                other => {
                    return Err(SyntaxError::new(
                        start,
                        SyntaxErrorKind::UnexpectedCharacter(other),
                    ));
                }
            }
        }

        let end = self.location();
        self.push(TokenKind::Eof, end);
        Ok(self.tokens)
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if !is_ident_continue(c) {
                break;
            }
            word.push(c);
            self.bump();
        }
        word
    }

    /// Reads up to the closing `]`, skipping over string literals.
    fn guard_text(&mut self, open: Location) -> Result<String, SyntaxError> {
        let mut text = String::new();
        let mut in_string = false;

        loop {
            match self.chars.peek().copied() {
                None | Some('\n') => {
                    return Err(SyntaxError::new(open, SyntaxErrorKind::UnterminatedGuard));
                }
                Some(']') if !in_string => {
                    self.bump();
                    return Ok(text);
                }
                Some(c) => {
                    self.bump();
                    text.push(c);
                    if c == '"' {
                        in_string = !in_string;
                    } else if c == '\\' && in_string {
                        // Keep the escaped character verbatim.
                        if let Some(&next) = self.chars.peek() {
                            if next != '\n' {
                                self.bump();
                                text.push(next);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn ident(s: &str) -> TokenKind {
        TokenKind::Ident(s.to_string())
    }

    #[test]
    fn test_transition_line() {
        assert_eq!(
            kinds("transition a -> b on go [ctx.ok] / run"),
            vec![
                TokenKind::Keyword(Keyword::Transition),
                ident("a"),
                TokenKind::Arrow,
                ident("b"),
                TokenKind::Keyword(Keyword::On),
                ident("go"),
                TokenKind::Guard("ctx.ok".to_string()),
                TokenKind::Slash,
                ident("run"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_newlines() {
        assert_eq!(
            kinds("# header\nstate idle # trailing\nend"),
            vec![
                TokenKind::Newline,
                TokenKind::Keyword(Keyword::State),
                ident("idle"),
                TokenKind::Newline,
                TokenKind::Keyword(Keyword::End),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_locations() {
        let tokens = tokenize("state a\n  go => b").unwrap();
        assert_eq!(tokens[1].location, Location::new(1, 7));
        assert_eq!(tokens[3].location, Location::new(2, 3));
        assert_eq!(tokens[4].location, Location::new(2, 6));
    }

    #[test]
    fn test_guard_with_bracket_in_string() {
        assert_eq!(
            kinds(r#"[ctx.s == "a]\"b"]"#),
            vec![
                TokenKind::Guard(r#"ctx.s == "a]\"b""#.to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_guard() {
        let err = tokenize("go => b [ctx.ok\nend").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedGuard);
        assert_eq!(err.location, Location::new(1, 9));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("state a\nstate $b").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnexpectedCharacter('$'));
        assert_eq!(err.location, Location::new(2, 7));

        let err = tokenize("a - b").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnexpectedCharacter('-'));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("doorClosed"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("state"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn test_to_identifier() {
        assert_eq!(to_identifier("door"), "door");
        assert_eq!(to_identifier("my-machine"), "my_machine");
        assert_eq!(to_identifier("2024_fsm"), "_2024_fsm");
        assert_eq!(to_identifier("state"), "_state");
        assert_eq!(to_identifier("tür"), "t_r");
        assert_eq!(to_identifier(""), "_");
        for s in ["my-machine", "2024_fsm", "state", "a b.c", ""] {
            assert!(is_identifier(&to_identifier(s)), "{:?}", s);
        }
    }
}
