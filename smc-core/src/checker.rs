//! Semantic checks.
//!
//! The checker never fails: every problem becomes a [`Diagnostic`] and the
//! caller decides whether to go on. Rules run cheapest first and each rule
//! reports in declaration order, so the same machine always produces the same
//! list.
//!
//! | Code | Severity | Rule |
//! |------|----------|------|
//! | E001 | error    | state declared twice |
//! | E002 | error    | event or command declared twice |
//! | E003 | error    | no initial state |
//! | E004 | error    | more than one initial state |
//! | E005 | error    | transition references an undeclared state |
//! | E006 | error    | event not declared in a non-empty `events` block |
//! | E007 | error    | action not declared in a non-empty `commands` block |
//! | E008 | error    | duplicate (source, event) with at least one unguarded |
//! | W101 | warning  | duplicate (source, event) whose guards may overlap |
//! | W102 | warning  | self-transition without action has no effect |
//! | W103 | warning  | state unreachable from the initial state |

use crate::definition::{Declaration, Location, State, StateMachine, Transition};
use crate::visit::{walk, Node, Visitor};
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}

/// Stable identifier of a checker rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    DuplicateState,
    DuplicateDeclaration,
    MissingInitial,
    MultipleInitial,
    UndeclaredState,
    UndeclaredEvent,
    UndeclaredCommand,
    DuplicateTransition,
    OverlappingGuards,
    NoEffect,
    UnreachableState,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::DuplicateState => "E001",
            DiagnosticCode::DuplicateDeclaration => "E002",
            DiagnosticCode::MissingInitial => "E003",
            DiagnosticCode::MultipleInitial => "E004",
            DiagnosticCode::UndeclaredState => "E005",
            DiagnosticCode::UndeclaredEvent => "E006",
            DiagnosticCode::UndeclaredCommand => "E007",
            DiagnosticCode::DuplicateTransition => "E008",
            DiagnosticCode::OverlappingGuards => "W101",
            DiagnosticCode::NoEffect => "W102",
            DiagnosticCode::UnreachableState => "W103",
        }
    }

    /// Short kebab-case rule name.
    pub fn name(self) -> &'static str {
        match self {
            DiagnosticCode::DuplicateState => "duplicate-state",
            DiagnosticCode::DuplicateDeclaration => "duplicate-declaration",
            DiagnosticCode::MissingInitial => "missing-initial",
            DiagnosticCode::MultipleInitial => "multiple-initial",
            DiagnosticCode::UndeclaredState => "undeclared-state",
            DiagnosticCode::UndeclaredEvent => "undeclared-event",
            DiagnosticCode::UndeclaredCommand => "undeclared-command",
            DiagnosticCode::DuplicateTransition => "duplicate-transition",
            DiagnosticCode::OverlappingGuards => "overlapping-guards",
            DiagnosticCode::NoEffect => "no-effect",
            DiagnosticCode::UnreachableState => "unreachable-state",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            DiagnosticCode::OverlappingGuards
            | DiagnosticCode::NoEffect
            | DiagnosticCode::UnreachableState => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DiagnosticCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The model element a diagnostic is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Subject {
    Machine { name: String },
    State { name: String },
    Transition { source: String, event: String },
    Event { name: String },
    Command { name: String },
}

impl Subject {
    fn transition(t: &Transition) -> Self {
        Subject::Transition {
            source: t.source.clone(),
            event: t.event.clone(),
        }
    }

    fn state(s: &State) -> Self {
        Subject::State {
            name: s.name.clone(),
        }
    }
}

/// A semantic problem found in a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub location: Location,
    pub subject: Subject,
    /// The offending name.
    pub identifier: String,
}

impl Diagnostic {
    fn new(
        code: DiagnosticCode,
        location: Location,
        subject: Subject,
        identifier: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: code.severity(),
            code,
            message: message.into(),
            location,
            subject,
            identifier: identifier.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}[{}]: {}",
            self.location, self.severity, self.code, self.message
        )
    }
}

/// Returns true if any diagnostic is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Checker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    /// Report states that cannot be reached from the initial state.
    pub unreachable_states: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            unreachable_states: true,
        }
    }
}

/// Checks a machine with default options.
pub fn check(machine: &StateMachine) -> Vec<Diagnostic> {
    check_with(machine, &CheckOptions::default())
}

/// Checks a machine.
pub fn check_with(machine: &StateMachine, options: &CheckOptions) -> Vec<Diagnostic> {
    let mut symbols = Symbols::default();
    walk(machine, &mut symbols);

    let mut diagnostics = std::mem::take(&mut symbols.duplicate_states);
    diagnostics.append(&mut symbols.duplicate_declarations);
    symbols.check_initial(&mut diagnostics);
    symbols.check_state_references(&mut diagnostics);
    symbols.check_event_references(machine, &mut diagnostics);
    symbols.check_command_references(machine, &mut diagnostics);
    symbols.check_duplicate_transitions(&mut diagnostics);
    symbols.check_no_effect(&mut diagnostics);
    if options.unreachable_states {
        symbols.check_reachability(&mut diagnostics);
    }

    tracing::debug!(
        machine = %machine.name,
        errors = diagnostics.iter().filter(|d| d.is_error()).count(),
        warnings = diagnostics.iter().filter(|d| !d.is_error()).count(),
        "checked state machine"
    );
    diagnostics
}

/// Declared names collected in one walk. Hash containers are used for
/// lookups only; every report iterates a declaration-ordered vector.
#[derive(Default)]
struct Symbols<'m> {
    machine: Option<&'m StateMachine>,
    states: Vec<&'m State>,
    state_names: HashSet<&'m str>,
    events: HashMap<&'m str, &'m Declaration>,
    reset_events: HashSet<&'m str>,
    commands: HashMap<&'m str, &'m Declaration>,
    transitions: Vec<&'m Transition>,
    duplicate_states: Vec<Diagnostic>,
    duplicate_declarations: Vec<Diagnostic>,
}

impl<'m> Visitor<'m> for Symbols<'m> {
    fn visit(&mut self, node: Node<'m>) {
        match node {
            Node::Machine(machine) => self.machine = Some(machine),
            Node::Event(decl) => {
                if self.events.insert(&decl.name, decl).is_some() {
                    self.duplicate_declarations
                        .push(duplicate_declaration("event", decl));
                }
            }
            Node::ResetEvent(decl) => {
                if !self.reset_events.insert(&decl.name) {
                    self.duplicate_declarations
                        .push(duplicate_declaration("reset event", decl));
                }
            }
            Node::Command(decl) => {
                if self.commands.insert(&decl.name, decl).is_some() {
                    self.duplicate_declarations
                        .push(duplicate_declaration("command", decl));
                }
            }
            Node::State(state) => {
                if !self.state_names.insert(&state.name) {
                    self.duplicate_states.push(Diagnostic::new(
                        DiagnosticCode::DuplicateState,
                        state.location,
                        Subject::state(state),
                        &state.name,
                        format!("state '{}' is declared more than once", state.name),
                    ));
                }
                self.states.push(state);
            }
            Node::Transition(t) => self.transitions.push(t),
        }
    }
}

fn duplicate_declaration(what: &str, decl: &Declaration) -> Diagnostic {
    let subject = if what == "command" {
        Subject::Command {
            name: decl.name.clone(),
        }
    } else {
        Subject::Event {
            name: decl.name.clone(),
        }
    };
    Diagnostic::new(
        DiagnosticCode::DuplicateDeclaration,
        decl.location,
        subject,
        &decl.name,
        format!("{} '{}' is declared more than once", what, decl.name),
    )
}

impl<'m> Symbols<'m> {
    fn machine_name(&self) -> &str {
        self.machine.map(|m| m.name.as_str()).unwrap_or_default()
    }

    fn check_initial(&self, out: &mut Vec<Diagnostic>) {
        let initial: Vec<&State> = self.states.iter().copied().filter(|s| s.initial).collect();

        if initial.is_empty() {
            let name = self.machine_name().to_string();
            out.push(Diagnostic::new(
                DiagnosticCode::MissingInitial,
                Location::new(1, 1),
                Subject::Machine { name: name.clone() },
                name,
                "no state is marked 'initial'",
            ));
        }

        for extra in initial.iter().skip(1) {
            out.push(Diagnostic::new(
                DiagnosticCode::MultipleInitial,
                extra.location,
                Subject::state(extra),
                &extra.name,
                format!(
                    "state '{}' is marked 'initial' but '{}' already is",
                    extra.name, initial[0].name
                ),
            ));
        }
    }

    fn check_state_references(&self, out: &mut Vec<Diagnostic>) {
        for t in &self.transitions {
            for (role, name) in [("source", &t.source), ("target", &t.target)] {
                if !self.state_names.contains(name.as_str()) {
                    out.push(Diagnostic::new(
                        DiagnosticCode::UndeclaredState,
                        t.location,
                        Subject::transition(t),
                        name,
                        format!(
                            "transition on '{}' has undeclared {} state '{}'",
                            t.event, role, name
                        ),
                    ));
                }
            }
        }
    }

    fn check_event_references(&self, machine: &StateMachine, out: &mut Vec<Diagnostic>) {
        if self.events.is_empty() {
            return;
        }

        for t in &self.transitions {
            if !self.events.contains_key(t.event.as_str()) {
                out.push(Diagnostic::new(
                    DiagnosticCode::UndeclaredEvent,
                    t.location,
                    Subject::transition(t),
                    &t.event,
                    format!("event '{}' is not declared", t.event),
                ));
            }
        }

        for reset in &machine.reset_events {
            if !self.events.contains_key(reset.name.as_str()) {
                out.push(Diagnostic::new(
                    DiagnosticCode::UndeclaredEvent,
                    reset.location,
                    Subject::Event {
                        name: reset.name.clone(),
                    },
                    &reset.name,
                    format!("reset event '{}' is not declared", reset.name),
                ));
            }
        }
    }

    fn check_command_references(&self, machine: &StateMachine, out: &mut Vec<Diagnostic>) {
        if self.commands.is_empty() {
            return;
        }

        for state in &machine.states {
            for action in [&state.entry, &state.exit].into_iter().flatten() {
                if !self.commands.contains_key(action.as_str()) {
                    out.push(Diagnostic::new(
                        DiagnosticCode::UndeclaredCommand,
                        state.location,
                        Subject::state(state),
                        action,
                        format!(
                            "state '{}' uses undeclared command '{}'",
                            state.name, action
                        ),
                    ));
                }
            }
        }

        for t in &self.transitions {
            if let Some(action) = &t.action {
                if !self.commands.contains_key(action.as_str()) {
                    out.push(Diagnostic::new(
                        DiagnosticCode::UndeclaredCommand,
                        t.location,
                        Subject::transition(t),
                        action,
                        format!(
                            "transition on '{}' uses undeclared command '{}'",
                            t.event, action
                        ),
                    ));
                }
            }
        }
    }

    fn check_duplicate_transitions(&self, out: &mut Vec<Diagnostic>) {
        for (j, later) in self.transitions.iter().enumerate() {
            let earlier = self.transitions[..j]
                .iter()
                .filter(|t| t.source == later.source && t.event == later.event);

            let mut overlap = false;
            for t in earlier {
                match (&t.guard, &later.guard) {
                    (Some(a), Some(b)) => overlap |= !a.excludes(b),
                    _ => {
                        out.push(Diagnostic::new(
                            DiagnosticCode::DuplicateTransition,
                            later.location,
                            Subject::transition(later),
                            &later.event,
                            format!(
                                "state '{}' already handles event '{}'",
                                later.source, later.event
                            ),
                        ));
                        overlap = false;
                        break;
                    }
                }
            }

            if overlap {
                out.push(Diagnostic::new(
                    DiagnosticCode::OverlappingGuards,
                    later.location,
                    Subject::transition(later),
                    &later.event,
                    format!(
                        "guards on event '{}' in state '{}' may overlap; the first match wins",
                        later.event, later.source
                    ),
                ));
            }
        }
    }

    fn check_no_effect(&self, out: &mut Vec<Diagnostic>) {
        for t in self.transitions.iter().filter(|t| t.is_no_op()) {
            out.push(Diagnostic::new(
                DiagnosticCode::NoEffect,
                t.location,
                Subject::transition(t),
                &t.event,
                format!("in state '{}': event '{}' has no effect", t.source, t.event),
            ));
        }
    }

    fn check_reachability(&self, out: &mut Vec<Diagnostic>) {
        let mut initial = self.states.iter().filter(|s| s.initial);
        let start = match (initial.next(), initial.next()) {
            (Some(state), None) => state,
            _ => return,
        };

        let mut reachable: HashSet<&str> = HashSet::from([start.name.as_str()]);
        let mut queue = vec![start.name.as_str()];
        while let Some(current) = queue.pop() {
            for t in self.transitions.iter().filter(|t| t.source == current) {
                if reachable.insert(&t.target) {
                    queue.push(&t.target);
                }
            }
        }

        let mut reported = HashSet::new();
        for state in &self.states {
            if !reachable.contains(state.name.as_str()) && reported.insert(&state.name) {
                out.push(Diagnostic::new(
                    DiagnosticCode::UnreachableState,
                    state.location,
                    Subject::state(state),
                    &state.name,
                    format!("state '{}' is unreachable from '{}'", state.name, start.name),
                ));
            }
        }
    }
}
