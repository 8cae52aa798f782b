//! Recursive descent parser for `.sm` files.
//!
//! Grammar (one declaration per line, `#` comments, blank lines ignored):
//!
//! ```text
//! file        := [ 'machine' IDENT EOL ] item*
//! item        := events | resetEvents | commands | state | transition
//! events      := 'events' EOL ( IDENT [IDENT] EOL )* 'end' EOL
//! resetEvents := 'resetEvents' EOL ( IDENT EOL )* 'end' EOL
//! commands    := 'commands' EOL ( IDENT [IDENT] EOL )* 'end' EOL
//! state       := ['initial'] 'state' IDENT EOL body* 'end' EOL
//! body        := 'entry' IDENT EOL
//!              | 'exit' IDENT EOL
//!              | IDENT '=>' IDENT [GUARD] ['/' IDENT] EOL
//! transition  := 'transition' IDENT '->' IDENT 'on' IDENT [GUARD] ['/' IDENT] EOL
//! ```
//!
//! State names are not resolved here; transitions may refer to states that
//! are declared later, or never.

use crate::definition::{Declaration, Location, State, StateMachine, Transition};
use crate::error::{CoreError, SyntaxError, SyntaxErrorKind};
use crate::guard::GuardExpr;
use crate::lexer::{to_identifier, tokenize, Keyword, Token, TokenKind};
use std::path::Path;

/// Machine name used when the source has no `machine` header.
pub const DEFAULT_MACHINE_NAME: &str = "Machine";

/// Parses a state machine from source text.
pub fn parse_str(source: &str) -> Result<StateMachine, SyntaxError> {
    Parser::new(source).parse()
}

/// Reads and parses a `.sm` file. The file stem, rewritten into an identifier,
/// names the machine unless the source has a `machine` header.
pub fn parse_file(path: impl AsRef<Path>) -> Result<StateMachine, CoreError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(DEFAULT_MACHINE_NAME);

    let machine = Parser::new(&source)
        .with_default_name(default_name)
        .parse()
        .map_err(|error| CoreError::Syntax {
            path: path.to_path_buf(),
            error,
        })?;

    tracing::debug!(
        path = %path.display(),
        states = machine.states.len(),
        transitions = machine.transitions.len(),
        "parsed state machine '{}'",
        machine.name
    );
    Ok(machine)
}

/// Parser over a token stream.
pub struct Parser<'a> {
    source: &'a str,
    default_name: String,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            default_name: DEFAULT_MACHINE_NAME.to_string(),
        }
    }

    /// Sets the machine name used when the source has no header. Names that
    /// are not identifiers are rewritten so the machine can be dumped.
    pub fn with_default_name(mut self, name: impl AsRef<str>) -> Self {
        self.default_name = to_identifier(name.as_ref());
        self
    }

    pub fn parse(self) -> Result<StateMachine, SyntaxError> {
        let tokens = tokenize(self.source)?;
        let mut cursor = Cursor { tokens, pos: 0 };
        cursor.machine(self.default_name)
    }
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> &Token {
        // The token list always ends with Eof and the cursor never moves past it.
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.peek().kind == TokenKind::Keyword(keyword)
    }

    fn unexpected(&self, expected: impl Into<String>) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(
            token.location,
            SyntaxErrorKind::UnexpectedToken {
                expected: expected.into(),
                found: token.kind.to_string(),
            },
        )
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Location, SyntaxError> {
        if self.at_keyword(keyword) {
            Ok(self.advance().location)
        } else {
            Err(self.unexpected(format!("'{}'", keyword.as_str())))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Location), SyntaxError> {
        match &self.peek().kind {
            TokenKind::Ident(_) => {
                let token = self.advance();
                match token.kind {
                    TokenKind::Ident(name) => Ok((name, token.location)),
                    _ => unreachable!("peeked an identifier"),
                }
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn optional_ident(&mut self) -> Option<String> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        }
    }

    /// Consumes the end of a declaration: a newline, or end of file.
    fn expect_eol(&mut self) -> Result<(), SyntaxError> {
        match self.peek().kind {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek().kind == TokenKind::Newline {
            self.advance();
        }
    }

    fn machine(&mut self, default_name: String) -> Result<StateMachine, SyntaxError> {
        self.skip_newlines();

        let mut machine = StateMachine::new(default_name);
        if self.at_keyword(Keyword::Machine) {
            self.advance();
            let (name, _) = self.expect_ident("machine name")?;
            machine.name = name;
            self.expect_eol()?;
        }

        loop {
            self.skip_newlines();
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Keyword(Keyword::Machine) => {
                    return Err(SyntaxError::new(
                        token.location,
                        SyntaxErrorKind::MisplacedHeader,
                    ));
                }
                TokenKind::Keyword(Keyword::Events) => {
                    let block = self.declaration_block(Keyword::Events, true)?;
                    machine.events.extend(block);
                }
                TokenKind::Keyword(Keyword::ResetEvents) => {
                    let block = self.declaration_block(Keyword::ResetEvents, false)?;
                    machine.reset_events.extend(block);
                }
                TokenKind::Keyword(Keyword::Commands) => {
                    let block = self.declaration_block(Keyword::Commands, true)?;
                    machine.commands.extend(block);
                }
                TokenKind::Keyword(Keyword::Initial | Keyword::State) => {
                    self.state(&mut machine)?;
                }
                TokenKind::Keyword(Keyword::Transition) => {
                    let transition = self.transition()?;
                    machine.transitions.push(transition);
                }
                _ => return Err(self.unexpected("a declaration")),
            }
        }

        Ok(machine)
    }

    fn declaration_block(
        &mut self,
        keyword: Keyword,
        with_codes: bool,
    ) -> Result<Vec<Declaration>, SyntaxError> {
        self.expect_keyword(keyword)?;
        self.expect_eol()?;

        let what = match keyword {
            Keyword::Commands => "command name or 'end'",
            _ => "event name or 'end'",
        };

        let mut declarations = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_keyword(Keyword::End) {
                self.advance();
                self.expect_eol()?;
                return Ok(declarations);
            }

            let (name, location) = self.expect_ident(what)?;
            let code = if with_codes {
                self.optional_ident()
            } else {
                None
            };
            self.expect_eol()?;
            declarations.push(Declaration::new(name, code).at(location));
        }
    }

    fn state(&mut self, machine: &mut StateMachine) -> Result<(), SyntaxError> {
        let initial = self.at_keyword(Keyword::Initial);
        let start = self.peek().location;
        if initial {
            self.advance();
        }
        self.expect_keyword(Keyword::State)?;
        let (name, _) = self.expect_ident("state name")?;
        self.expect_eol()?;

        let mut state = State::new(name).at(start);
        state.initial = initial;

        loop {
            self.skip_newlines();
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Keyword(Keyword::End) => {
                    self.advance();
                    self.expect_eol()?;
                    break;
                }
                TokenKind::Keyword(keyword @ (Keyword::Entry | Keyword::Exit)) => {
                    self.advance();
                    let (action, _) = self.expect_ident("action name")?;
                    self.expect_eol()?;

                    let (slot, clause) = if keyword == Keyword::Entry {
                        (&mut state.entry, "entry")
                    } else {
                        (&mut state.exit, "exit")
                    };
                    if slot.is_some() {
                        return Err(SyntaxError::new(
                            token.location,
                            SyntaxErrorKind::DuplicateClause {
                                clause,
                                state: state.name.clone(),
                            },
                        ));
                    }
                    *slot = Some(action);
                }
                TokenKind::Ident(event) => {
                    self.advance();
                    if self.peek().kind != TokenKind::FatArrow {
                        return Err(self.unexpected("'=>'"));
                    }
                    self.advance();
                    let (target, _) = self.expect_ident("target state")?;
                    let transition = Transition::new(state.name.clone(), event, target)
                        .at(token.location);
                    let transition = self.transition_tail(transition)?;
                    machine.transitions.push(transition);
                }
                _ => return Err(self.unexpected("'entry', 'exit', a transition or 'end'")),
            }
        }

        machine.states.push(state);
        Ok(())
    }

    fn transition(&mut self) -> Result<Transition, SyntaxError> {
        let start = self.expect_keyword(Keyword::Transition)?;
        let (source, _) = self.expect_ident("source state")?;
        if self.peek().kind != TokenKind::Arrow {
            return Err(self.unexpected("'->'"));
        }
        self.advance();
        let (target, _) = self.expect_ident("target state")?;
        self.expect_keyword(Keyword::On)?;
        let (event, _) = self.expect_ident("event name")?;

        self.transition_tail(Transition::new(source, event, target).at(start))
    }

    /// Parses the optional `[guard]` and `/ action` suffix and the line end.
    fn transition_tail(&mut self, mut transition: Transition) -> Result<Transition, SyntaxError> {
        if let TokenKind::Guard(text) = &self.peek().kind {
            let text = text.clone();
            let location = self.advance().location;
            let guard = GuardExpr::parse(&text).map_err(|e| {
                // Guards never span lines; the text starts one column after `[`.
                let column = location.column + 1 + e.offset as u32;
                SyntaxError::new(
                    Location::new(location.line, column),
                    SyntaxErrorKind::InvalidGuard { reason: e.reason },
                )
            })?;
            transition.guard = Some(guard);
        }

        if self.peek().kind == TokenKind::Slash {
            self.advance();
            let (action, _) = self.expect_ident("action name")?;
            transition.action = Some(action);
        }

        self.expect_eol()?;
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const CONTROLLER: &str = "\
# Miss Grant's controller
machine Controller

events
    doorClosed D1CL
    drawerOpened D2OP
    lightOn L1ON
end

resetEvents
    doorOpened
end

commands
    unlockPanel PNUL
    lockDoor D1LK
end

initial state idle
    entry lockDoor
    doorClosed => active
end

state active
    drawerOpened => waitingForLight [ctx.armed] / unlockPanel
end

transition waitingForLight -> unlockedPanel on lightOn
state waitingForLight
end
state unlockedPanel
    exit lockDoor
end
";

    #[test]
    fn test_parse_controller() {
        let machine = parse_str(CONTROLLER).unwrap();

        assert_eq!(machine.name, "Controller");
        assert_eq!(machine.events.len(), 3);
        assert_eq!(machine.events[0].code.as_deref(), Some("D1CL"));
        assert_eq!(machine.reset_events[0].name, "doorOpened");
        assert_eq!(machine.commands[1].name, "lockDoor");
        assert_eq!(machine.states.len(), 4);
        assert_eq!(machine.initial_state().unwrap().name, "idle");
        assert_eq!(machine.states[0].entry.as_deref(), Some("lockDoor"));
        assert_eq!(machine.states[3].exit.as_deref(), Some("lockDoor"));

        let t = &machine.transitions;
        assert_eq!(t.len(), 3);
        assert_eq!(t[0], Transition::new("idle", "doorClosed", "active"));
        assert_eq!(
            t[1],
            Transition::new("active", "drawerOpened", "waitingForLight")
                .with_guard(GuardExpr::Truthy("armed".to_string()))
                .with_action("unlockPanel")
        );
        assert_eq!(
            t[2],
            Transition::new("waitingForLight", "lightOn", "unlockedPanel")
        );
    }

    #[test]
    fn test_locations_recorded() {
        let machine = parse_str(CONTROLLER).unwrap();
        assert_eq!(machine.states[0].location, Location::new(19, 1));
        assert_eq!(machine.transitions[0].location, Location::new(21, 5));
        assert_eq!(machine.transitions[2].location, Location::new(28, 1));
        assert_eq!(machine.events[1].location, Location::new(6, 5));
    }

    #[test]
    fn test_default_name_and_forward_references() {
        let machine = parse_str("transition a -> b on go\nstate zz\nend").unwrap();
        assert_eq!(machine.name, DEFAULT_MACHINE_NAME);
        assert_eq!(machine.transitions[0].source, "a");
        assert!(!machine.has_state("a"));
    }

    #[test]
    fn test_default_name_is_identifier() {
        for (name, expected) in [
            ("my-machine", "my_machine"),
            ("2024_fsm", "_2024_fsm"),
            ("state", "_state"),
            ("Door", "Door"),
        ] {
            let machine = Parser::new("initial state a\nend")
                .with_default_name(name)
                .parse()
                .unwrap();
            assert_eq!(machine.name, expected);
        }
    }

    #[test]
    fn test_guard_with_comparison() {
        let machine =
            parse_str("transition a -> b on go [ctx.n >= 3 && ctx.s == \"x\"] / act").unwrap();
        let guard = machine.transitions[0].guard.as_ref().unwrap();
        assert!(guard.evaluate(&json!({"n": 3, "s": "x"})));
        assert!(!guard.evaluate(&json!({"n": 2, "s": "x"})));
    }

    #[test]
    fn test_missing_arrow() {
        let err = parse_str("transition a b on go").unwrap_err();
        assert_eq!(err.location, Location::new(1, 14));
        assert_eq!(
            err.kind,
            SyntaxErrorKind::UnexpectedToken {
                expected: "'->'".to_string(),
                found: "identifier 'b'".to_string(),
            }
        );
    }

    #[test]
    fn test_keyword_as_name() {
        let err = parse_str("state end\nend").unwrap_err();
        assert_eq!(err.code(), "UNEXPECTED_TOKEN");
        assert_eq!(err.location, Location::new(1, 7));
    }

    #[test]
    fn test_trailing_junk() {
        let err = parse_str("transition a -> b on go / act extra").unwrap_err();
        assert_eq!(err.location, Location::new(1, 31));
    }

    #[test]
    fn test_unclosed_state() {
        let err = parse_str("state a\n  go => b\n").unwrap_err();
        assert_eq!(
            err.kind,
            SyntaxErrorKind::UnexpectedToken {
                expected: "'entry', 'exit', a transition or 'end'".to_string(),
                found: "end of file".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_entry() {
        let err = parse_str("state a\n  entry x\n  entry y\nend").unwrap_err();
        assert_eq!(err.location, Location::new(3, 3));
        assert_eq!(
            err.kind,
            SyntaxErrorKind::DuplicateClause {
                clause: "entry",
                state: "a".to_string()
            }
        );
    }

    #[test]
    fn test_misplaced_header() {
        let err = parse_str("state a\nend\nmachine M").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::MisplacedHeader);
        assert_eq!(err.location, Location::new(3, 1));
    }

    #[test]
    fn test_invalid_guard_location() {
        let err = parse_str("transition a -> b on go [ctx.a &&]").unwrap_err();
        assert_eq!(err.code(), "INVALID_GUARD");
        // '[' is at column 25; the guard text ends at offset 8.
        assert_eq!(err.location, Location::new(1, 34));
    }

    #[test]
    fn test_reset_events_reject_codes() {
        let err = parse_str("resetEvents\n  doorOpened D1OP\nend").unwrap_err();
        assert_eq!(err.location, Location::new(2, 14));
    }

    #[test]
    fn test_parse_file_uses_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turnstile.sm");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "initial state locked\n    coin => unlocked\nend").unwrap();

        let machine = parse_file(&path).unwrap();
        assert_eq!(machine.name, "turnstile");
        assert_eq!(machine.transitions.len(), 1);
    }

    #[test]
    fn test_parse_file_missing() {
        let err = parse_file("/definitely/not/here.sm").unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
