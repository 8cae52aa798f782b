//! Dry-run execution of a machine against a JSON context.
//!
//! The simulator follows the same dispatch rules generated code does: reset
//! events return to the initial state from anywhere, otherwise the first
//! transition out of the current state whose guard holds is taken. Exit and
//! entry actions only run when the state actually changes.

use crate::definition::StateMachine;
use crate::error::SimulationError;
use crate::guard::GuardEvaluator;
use serde::Serialize;
use serde_json::Value;

/// One applied event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub event: String,
    pub from: String,
    pub to: String,
    /// Actions run, in order.
    pub actions: Vec<String>,
}

/// Steps a machine through events.
#[derive(Debug)]
pub struct Simulator<'m> {
    machine: &'m StateMachine,
    state: &'m str,
    ctx: Value,
}

impl<'m> Simulator<'m> {
    /// Starts in the initial state.
    pub fn new(machine: &'m StateMachine, ctx: Value) -> Result<Self, SimulationError> {
        let initial = machine
            .initial_state()
            .ok_or(SimulationError::NoInitialState)?;
        Ok(Self {
            machine,
            state: &initial.name,
            ctx,
        })
    }

    pub fn state(&self) -> &str {
        self.state
    }

    pub fn ctx(&self) -> &Value {
        &self.ctx
    }

    /// Applies an event without changing the context.
    pub fn apply(&mut self, event: &str) -> Result<Step, SimulationError> {
        self.apply_with(event, Value::Null)
    }

    /// Merges `payload` into the context, then applies the event.
    ///
    /// The context is only updated if the event is accepted.
    pub fn apply_with(&mut self, event: &str, payload: Value) -> Result<Step, SimulationError> {
        let ctx = merge_ctx(&self.ctx, &payload);

        let (target, action) = if self.machine.is_reset_event(event) {
            let initial = self
                .machine
                .initial_state()
                .ok_or(SimulationError::NoInitialState)?;
            (initial.name.as_str(), None)
        } else {
            if !self.machine.events_from(self.state).contains(&event) {
                return Err(SimulationError::InvalidTransition {
                    state: self.state.to_string(),
                    event: event.to_string(),
                });
            }

            let taken = self
                .machine
                .outgoing(self.state)
                .filter(|t| t.event == event)
                .find(|t| GuardEvaluator::evaluate_opt(t.guard.as_ref(), &ctx))
                .ok_or_else(|| SimulationError::GuardFailed {
                    state: self.state.to_string(),
                    event: event.to_string(),
                })?;
            (taken.target.as_str(), taken.action.as_deref())
        };

        let next = self
            .machine
            .state(target)
            .ok_or_else(|| SimulationError::UnknownState {
                state: target.to_string(),
            })?;

        let mut actions = Vec::new();
        let changed = next.name != self.state;
        if changed {
            if let Some(exit) = self.machine.state(self.state).and_then(|s| s.exit.as_deref()) {
                actions.push(exit.to_string());
            }
        }
        actions.extend(action.map(str::to_string));
        if changed {
            actions.extend(next.entry.clone());
        }

        let step = Step {
            event: event.to_string(),
            from: self.state.to_string(),
            to: next.name.clone(),
            actions,
        };
        tracing::debug!(event, from = %step.from, to = %step.to, "applied event");

        self.state = &next.name;
        self.ctx = ctx;
        Ok(step)
    }
}

/// Shallow-merges an object payload into an object context. Any other
/// payload leaves the context unchanged.
fn merge_ctx(ctx: &Value, payload: &Value) -> Value {
    match (ctx, payload) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut merged = base.clone();
            for (key, value) in patch {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (_, Value::Object(_)) => payload.clone(),
        _ => ctx.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use serde_json::json;

    const DOOR: &str = "\
resetEvents
    panic
end
initial state closed
    entry lock
    exit unlock
    open => opened [ctx.authorized] / beep
    knock => closed
end
state opened
    close => closed
end
";

    #[test]
    fn test_guarded_transition_and_actions() {
        let machine = parse_str(DOOR).unwrap();
        let mut sim = Simulator::new(&machine, json!({"authorized": true})).unwrap();
        assert_eq!(sim.state(), "closed");

        let step = sim.apply("open").unwrap();
        assert_eq!(step.from, "closed");
        assert_eq!(step.to, "opened");
        assert_eq!(step.actions, vec!["unlock", "beep"]);
        assert_eq!(sim.state(), "opened");

        let step = sim.apply("close").unwrap();
        assert_eq!(step.actions, vec!["lock"]);
    }

    #[test]
    fn test_self_transition_skips_exit_and_entry() {
        let machine = parse_str(DOOR).unwrap();
        let mut sim = Simulator::new(&machine, json!({})).unwrap();
        let step = sim.apply("knock").unwrap();
        assert_eq!(step.to, "closed");
        assert!(step.actions.is_empty());
    }

    #[test]
    fn test_guard_failed() {
        let machine = parse_str(DOOR).unwrap();
        let mut sim = Simulator::new(&machine, json!({"authorized": false})).unwrap();
        let err = sim.apply("open").unwrap_err();
        assert_eq!(err.error_code(), "GUARD_FAILED");
        assert_eq!(sim.state(), "closed");

        // Payload makes the guard pass.
        let step = sim.apply_with("open", json!({"authorized": true})).unwrap();
        assert_eq!(step.to, "opened");
        assert_eq!(sim.ctx()["authorized"], json!(true));
    }

    #[test]
    fn test_invalid_transition() {
        let machine = parse_str(DOOR).unwrap();
        let mut sim = Simulator::new(&machine, json!({})).unwrap();
        let err = sim.apply("close").unwrap_err();
        assert!(matches!(
            err,
            SimulationError::InvalidTransition { ref state, ref event }
                if state == "closed" && event == "close"
        ));
    }

    #[test]
    fn test_reset_event() {
        let machine = parse_str(DOOR).unwrap();
        let mut sim = Simulator::new(&machine, json!({"authorized": true})).unwrap();
        sim.apply("open").unwrap();
        let step = sim.apply("panic").unwrap();
        assert_eq!(step.to, "closed");
        assert_eq!(step.actions, vec!["lock"]);
    }

    #[test]
    fn test_rejected_payload_not_merged() {
        let machine = parse_str(DOOR).unwrap();
        let mut sim = Simulator::new(&machine, json!({"authorized": false})).unwrap();
        assert!(sim.apply_with("close", json!({"authorized": true})).is_err());
        assert_eq!(sim.ctx()["authorized"], json!(false));
    }

    #[test]
    fn test_unknown_target() {
        let machine = parse_str("initial state a\n  go => nowhere\nend").unwrap();
        let mut sim = Simulator::new(&machine, json!({})).unwrap();
        assert_eq!(sim.apply("go").unwrap_err().error_code(), "UNKNOWN_STATE");
    }

    #[test]
    fn test_no_initial_state() {
        let machine = parse_str("state a\nend").unwrap();
        assert!(matches!(
            Simulator::new(&machine, json!({})),
            Err(SimulationError::NoInitialState)
        ));
    }
}
