//! Read-only traversal of a [`StateMachine`].
//!
//! Consumers implement [`Visitor`] and match exhaustively on [`Node`], so a
//! new node kind is a compile error in every consumer rather than a silently
//! skipped case. [`walk`] fixes the visiting order:
//!
//! 1. the machine itself
//! 2. events, reset events, commands
//! 3. states
//! 4. transitions
//!
//! each group in declaration order.

use crate::definition::{Declaration, State, StateMachine, Transition};
use std::fmt::Write;

/// A node of the abstract model.
#[derive(Debug, Clone, Copy)]
pub enum Node<'m> {
    Machine(&'m StateMachine),
    Event(&'m Declaration),
    ResetEvent(&'m Declaration),
    Command(&'m Declaration),
    State(&'m State),
    Transition(&'m Transition),
}

pub trait Visitor<'m> {
    fn visit(&mut self, node: Node<'m>);
}

/// Visits every node of `machine` in the documented order.
pub fn walk<'m, V: Visitor<'m> + ?Sized>(machine: &'m StateMachine, visitor: &mut V) {
    visitor.visit(Node::Machine(machine));
    for event in &machine.events {
        visitor.visit(Node::Event(event));
    }
    for event in &machine.reset_events {
        visitor.visit(Node::ResetEvent(event));
    }
    for command in &machine.commands {
        visitor.visit(Node::Command(command));
    }
    for state in &machine.states {
        visitor.visit(Node::State(state));
    }
    for transition in &machine.transitions {
        visitor.visit(Node::Transition(transition));
    }
}

/// Collects a human readable summary of a machine.
///
/// ```text
/// Found states: idle, active
/// State idle:
///  Action: lockDoor
///  Transition: doorClosed -> active
/// State active:
/// ```
#[derive(Debug, Default)]
pub struct ModelSummary<'m> {
    states: Vec<StateSummary<'m>>,
}

#[derive(Debug)]
struct StateSummary<'m> {
    name: &'m str,
    actions: Vec<&'m str>,
    transitions: Vec<(&'m str, &'m str)>,
}

impl<'m> ModelSummary<'m> {
    pub fn of(machine: &'m StateMachine) -> Self {
        let mut summary = Self::default();
        walk(machine, &mut summary);
        summary
    }

    /// State names in declaration order, without duplicates.
    pub fn state_names(&self) -> Vec<&'m str> {
        self.states.iter().map(|s| s.name).collect()
    }

    fn state_mut(&mut self, name: &'m str) -> &mut StateSummary<'m> {
        let index = match self.states.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.states.push(StateSummary {
                    name,
                    actions: Vec::new(),
                    transitions: Vec::new(),
                });
                self.states.len() - 1
            }
        };
        &mut self.states[index]
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Found states: {}", self.state_names().join(", "));
        for state in &self.states {
            let _ = writeln!(out, "State {}:", state.name);
            for action in &state.actions {
                let _ = writeln!(out, " Action: {}", action);
            }
            for (event, target) in &state.transitions {
                let _ = writeln!(out, " Transition: {} -> {}", event, target);
            }
        }
        out
    }
}

impl<'m> Visitor<'m> for ModelSummary<'m> {
    fn visit(&mut self, node: Node<'m>) {
        match node {
            Node::Machine(_) | Node::Event(_) | Node::ResetEvent(_) | Node::Command(_) => {}
            Node::State(state) => {
                let summary = self.state_mut(&state.name);
                summary.actions.extend(state.entry.as_deref());
                summary.actions.extend(state.exit.as_deref());
            }
            Node::Transition(t) => {
                // Transitions out of undeclared states still show up.
                let summary = self.state_mut(&t.source);
                summary.transitions.push((&t.event, &t.target));
            }
        }
    }
}
