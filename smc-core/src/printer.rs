//! Canonical `.sm` printer.
//!
//! Output layout:
//!
//! ```text
//! machine Name
//!
//! events
//!     name CODE
//! end
//!
//! resetEvents
//!     name
//! end
//!
//! commands
//!     name CODE
//! end
//!
//! initial state a
//!     entry action
//!     exit action
//! end
//!
//! transition a -> b on event [guard] / action
//! ```
//!
//! Empty blocks are omitted. Transitions are always printed at top level, in
//! declaration order, after every state. Re-parsing the output yields a
//! machine equal to the input, and printing that machine again yields the
//! same bytes.

use crate::definition::{Declaration, StateMachine};
use crate::visit::{walk, Node, Visitor};
use std::fmt::Write;

const INDENT: &str = "    ";

/// Prints a machine as canonical `.sm` source.
pub fn dump(machine: &StateMachine) -> String {
    let mut printer = Printer::default();
    walk(machine, &mut printer);
    printer.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Events,
    ResetEvents,
    Commands,
    States,
    Transitions,
}

impl Section {
    /// Keyword that opens a block section.
    fn opener(self) -> Option<&'static str> {
        match self {
            Section::Events => Some("events"),
            Section::ResetEvents => Some("resetEvents"),
            Section::Commands => Some("commands"),
            Section::Header | Section::States | Section::Transitions => None,
        }
    }
}

#[derive(Debug, Default)]
struct Printer {
    out: String,
    section: Option<Section>,
}

impl Printer {
    /// Closes the current section and opens `next` if it differs.
    fn enter(&mut self, next: Section) {
        if self.section == Some(next) {
            if next == Section::States {
                self.out.push('\n');
            }
            return;
        }

        self.close();
        if self.section.is_some() {
            self.out.push('\n');
        }
        if let Some(opener) = next.opener() {
            self.out.push_str(opener);
            self.out.push('\n');
        }
        self.section = Some(next);
    }

    fn close(&mut self) {
        if self.section.and_then(Section::opener).is_some() {
            self.out.push_str("end\n");
        }
    }

    fn declaration(&mut self, decl: &Declaration) {
        let _ = match &decl.code {
            Some(code) => writeln!(self.out, "{}{} {}", INDENT, decl.name, code),
            None => writeln!(self.out, "{}{}", INDENT, decl.name),
        };
    }

    fn finish(mut self) -> String {
        self.close();
        self.out
    }
}

impl<'m> Visitor<'m> for Printer {
    fn visit(&mut self, node: Node<'m>) {
        match node {
            Node::Machine(machine) => {
                self.enter(Section::Header);
                let _ = writeln!(self.out, "machine {}", machine.name);
            }
            Node::Event(decl) => {
                self.enter(Section::Events);
                self.declaration(decl);
            }
            Node::ResetEvent(decl) => {
                self.enter(Section::ResetEvents);
                let _ = writeln!(self.out, "{}{}", INDENT, decl.name);
            }
            Node::Command(decl) => {
                self.enter(Section::Commands);
                self.declaration(decl);
            }
            Node::State(state) => {
                self.enter(Section::States);
                if state.initial {
                    self.out.push_str("initial ");
                }
                let _ = writeln!(self.out, "state {}", state.name);
                if let Some(entry) = &state.entry {
                    let _ = writeln!(self.out, "{}entry {}", INDENT, entry);
                }
                if let Some(exit) = &state.exit {
                    let _ = writeln!(self.out, "{}exit {}", INDENT, exit);
                }
                self.out.push_str("end\n");
            }
            Node::Transition(t) => {
                self.enter(Section::Transitions);
                let _ = write!(
                    self.out,
                    "transition {} -> {} on {}",
                    t.source, t.target, t.event
                );
                if let Some(guard) = &t.guard {
                    let _ = write!(self.out, " [{}]", guard);
                }
                if let Some(action) = &t.action {
                    let _ = write!(self.out, " / {}", action);
                }
                self.out.push('\n');
            }
        }
    }
}
