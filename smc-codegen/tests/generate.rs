//! Generator integration tests.

use proptest::prelude::*;
use smc_codegen::{generate, GenerationError, Generator, GeneratorOptions};
use smc_core::{parse_str, State, StateMachine, Transition};

const WORKER: &str = "\
machine Worker

resetEvents
    abort
end

commands
    spawn SPWN
    halt
end

initial state Idle
    start => Running [ctx.jobs > 0] / spawn
end

state Running
    entry spawn
    stop => Idle / halt
    tick => Running
end
";

#[test]
fn test_worker_module() {
    let machine = parse_str(WORKER).unwrap();
    let code = generate(&machine).unwrap();

    assert!(code.starts_with("# Generated by smc from state machine 'Worker'.\n"));
    assert!(code.contains(&format!("# Source checksum: {}\n", machine.checksum())));
    assert!(code.contains("class UnhandledEvent(Exception):\n"));
    assert!(code.contains("class WorkerBase:\n"));
    assert!(code.contains("class IdleState(WorkerBase):\n    name = \"Idle\"\n"));
    assert!(code.contains("class RunningState(WorkerBase):\n"));
    assert!(code.contains(
        "    def on_entry(self, machine, ctx):\n        machine.run_action(\"spawn\")\n"
    ));
    assert!(code.contains(
        "    def on_stop(self, machine, ctx):\n        return machine.transition(\"Idle\", \"halt\", ctx)\n"
    ));
    assert!(code.contains(
        "    def on_tick(self, machine, ctx):\n        return machine.transition(\"Running\", None, ctx)\n"
    ));
    assert!(code.contains("class Worker:\n"));
    assert!(code.contains("    initial = \"Idle\"\n"));
    assert!(code.contains("    reset_events = frozenset([\"abort\"])\n"));
    assert!(code.contains(
        "    commands = {\n        \"spawn\": \"SPWN\",\n        \"halt\": None,\n    }\n"
    ));
    assert!(code.contains("    events = {}\n"));
    assert!(code.contains(
        "    states = {\n        \"Idle\": IdleState,\n        \"Running\": RunningState,\n    }\n"
    ));
    for method in ["__init__", "enter", "dispatch", "transition", "run_action"] {
        assert!(code.contains(&format!("    def {}(", method)), "missing {}", method);
    }
}

#[test]
fn test_state_class_order_follows_declarations() {
    let code = generate(&parse_str(WORKER).unwrap()).unwrap();
    let idle = code.find("class IdleState").unwrap();
    let running = code.find("class RunningState").unwrap();
    let dispatcher = code.find("class Worker:").unwrap();
    assert!(idle < running && running < dispatcher);
}

#[test]
fn test_options() {
    let machine = parse_str(WORKER).unwrap();
    let generator = Generator::new(GeneratorOptions {
        indent_width: 2,
        state_suffix: "Mode".to_string(),
    });
    let code = generator.generate(&machine).unwrap();
    assert!(code.contains("class IdleMode(WorkerBase):\n  name = \"Idle\"\n"));
    assert!(code.contains("  def on_start(self, machine, ctx):\n    if _compare("));
}

#[test]
fn test_unresolved_reference_is_refused() {
    let machine = parse_str("initial state a\n  go => missing\nend").unwrap();
    assert_eq!(
        generate(&machine).unwrap_err(),
        GenerationError::UnresolvedState {
            state: "missing".to_string(),
            event: "go".to_string(),
        }
    );
}

#[test]
fn test_duplicate_unguarded_is_refused() {
    let machine = parse_str(
        "initial state A\nend\nstate B\nend\nstate C\nend\n\
         transition A -> B on event\ntransition A -> C on event\n",
    )
    .unwrap();
    let err = generate(&machine).unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_TRANSITION");
    assert_eq!(
        err.to_string(),
        "state 'A' has more than one unguarded transition on 'event'"
    );
}

fn arb_machine() -> impl Strategy<Value = StateMachine> {
    (2usize..6, prop::collection::vec((0usize..6, 0usize..4, 0usize..6), 0..10)).prop_map(
        |(count, edges)| {
            let mut machine = StateMachine::new("Gen");
            machine.states = (0..count).map(|i| State::new(format!("s{}", i))).collect();
            machine.states[0].initial = true;
            for (from, event, to) in edges {
                let (from, to) = (from % count, to % count);
                let event = format!("e{}", event);
                let taken = machine
                    .transitions
                    .iter()
                    .any(|t| t.source == format!("s{}", from) && t.event == event);
                if !taken {
                    machine.transitions.push(Transition::new(
                        format!("s{}", from),
                        event,
                        format!("s{}", to),
                    ));
                }
            }
            machine
        },
    )
}

proptest! {
    #[test]
    fn generation_is_deterministic(machine in arb_machine()) {
        let first = generate(&machine).unwrap();
        prop_assert_eq!(generate(&machine).unwrap(), first);
    }

    #[test]
    fn every_state_gets_a_class(machine in arb_machine()) {
        let code = generate(&machine).unwrap();
        for state in &machine.states {
            let expected = format!("class S{}State(GenBase):", &state.name[1..]);
            prop_assert!(code.contains(&expected));
        }
    }
}
