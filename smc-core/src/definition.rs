//! State machine model types.
//!
//! A [`StateMachine`] is built by the parser and never mutated afterwards.
//! Checker, printer and generators borrow it read-only.
//!
//! Equality is structural: two machines are equal when they declare the same
//! states, transitions, events and commands in the same order, regardless of
//! where in the source text they were written. Source locations are carried
//! for diagnostics only and never take part in comparisons.

use crate::guard::GuardExpr;
use crate::printer;
use serde::Serialize;
use std::fmt;

/// A 1-based position in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A named declaration in an `events`, `resetEvents` or `commands` block.
#[derive(Debug, Clone, Serialize)]
pub struct Declaration {
    pub name: String,

    /// Optional external code (e.g. `D1CL`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip)]
    pub location: Location,
}

impl Declaration {
    pub fn new(name: impl Into<String>, code: Option<String>) -> Self {
        Self {
            name: name.into(),
            code,
            location: Location::default(),
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl PartialEq for Declaration {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.code == other.code
    }
}

/// A state in the machine.
#[derive(Debug, Clone, Serialize)]
pub struct State {
    pub name: String,

    /// Whether this state is marked `initial`.
    pub initial: bool,

    /// Action run when the state is entered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    /// Action run when the state is left.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<String>,

    #[serde(skip)]
    pub location: Location,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: false,
            entry: None,
            exit: None,
            location: Location::default(),
        }
    }

    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    pub fn with_entry(mut self, action: impl Into<String>) -> Self {
        self.entry = Some(action.into());
        self
    }

    pub fn with_exit(mut self, action: impl Into<String>) -> Self {
        self.exit = Some(action.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.initial == other.initial
            && self.entry == other.entry
            && self.exit == other.exit
    }
}

/// A transition in the machine.
///
/// Source and target are raw names; resolving them against the declared
/// states is the checker's job.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    /// Source state.
    pub source: String,

    /// Target state.
    pub target: String,

    /// Event that triggers this transition.
    pub event: String,

    /// Optional guard expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardExpr>,

    /// Optional action run while taking the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(skip)]
    pub location: Location,
}

impl Transition {
    pub fn new(
        source: impl Into<String>,
        event: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            event: event.into(),
            guard: None,
            action: None,
            location: Location::default(),
        }
    }

    pub fn with_guard(mut self, guard: GuardExpr) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Returns true if taking this transition changes nothing observable.
    pub fn is_no_op(&self) -> bool {
        self.source == self.target && self.action.is_none()
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.target == other.target
            && self.event == other.event
            && self.guard == other.guard
            && self.action == other.action
    }
}

/// A parsed state machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMachine {
    /// Machine name.
    pub name: String,

    /// Declared events. Empty means events are implicit.
    pub events: Vec<Declaration>,

    /// Events that return the machine to its initial state from anywhere.
    pub reset_events: Vec<Declaration>,

    /// Declared commands. Empty means actions are unchecked.
    pub commands: Vec<Declaration>,

    /// States in declaration order.
    pub states: Vec<State>,

    /// Transitions in declaration order.
    pub transitions: Vec<Transition>,
}

impl StateMachine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
            reset_events: Vec::new(),
            commands: Vec::new(),
            states: Vec::new(),
            transitions: Vec::new(),
        }
    }

    /// Looks up a state by name. Returns the first declaration on duplicates.
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    /// Returns true if the given state is declared.
    pub fn has_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    /// Returns the initial state if exactly one state is marked initial.
    pub fn initial_state(&self) -> Option<&State> {
        let mut initial = self.states.iter().filter(|s| s.initial);
        match (initial.next(), initial.next()) {
            (Some(state), None) => Some(state),
            _ => None,
        }
    }

    /// Returns the transitions leaving the given state, in declaration order.
    pub fn outgoing<'a>(&'a self, state: &'a str) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions.iter().filter(move |t| t.source == state)
    }

    /// Returns the distinct events handled by the given state, in order of
    /// first appearance.
    pub fn events_from<'a>(&'a self, state: &'a str) -> Vec<&'a str> {
        let mut events: Vec<&str> = Vec::new();
        for t in self.outgoing(state) {
            if !events.contains(&t.event.as_str()) {
                events.push(&t.event);
            }
        }
        events
    }

    /// Returns true if the event is a reset event.
    pub fn is_reset_event(&self, event: &str) -> bool {
        self.reset_events.iter().any(|e| e.name == event)
    }

    /// Looks up the declared code of a command.
    pub fn command_code(&self, command: &str) -> Option<&str> {
        self.commands
            .iter()
            .find(|c| c.name == command)
            .and_then(|c| c.code.as_deref())
    }

    /// Checksum of the canonical dump, stable across formatting changes.
    pub fn checksum(&self) -> String {
        let text = printer::dump(self);
        format!("{:08x}", crc32c::crc32c(text.as_bytes()))
    }
}
