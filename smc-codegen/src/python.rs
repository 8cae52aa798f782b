//! Python class skeleton generator.
//!
//! The generated module contains one class per state plus a dispatcher that
//! owns the current state. Handlers try guarded transitions in declaration
//! order and raise `UnhandledEvent` when none applies, matching
//! [`smc_core::Simulator`].

use crate::error::GenerationError;
use crate::writer::CodeWriter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smc_core::visit::{walk, Node, Visitor};
use smc_core::{GuardExpr, State, StateMachine, Transition};
use std::collections::{HashMap, HashSet};

/// Code generator options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    /// Spaces per indentation level.
    pub indent_width: usize,

    /// Appended to the PascalCase state name to form its class name.
    pub state_suffix: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            indent_width: 4,
            state_suffix: "State".to_string(),
        }
    }
}

/// Generates Python with default options.
pub fn generate(machine: &StateMachine) -> Result<String, GenerationError> {
    Generator::new(GeneratorOptions::default()).generate(machine)
}

/// Python skeleton generator.
#[derive(Debug, Clone, Default)]
pub struct Generator {
    options: GeneratorOptions,
}

impl Generator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Validates the machine and renders the module.
    pub fn generate(&self, machine: &StateMachine) -> Result<String, GenerationError> {
        let mut tables = HandlerTables::default();
        walk(machine, &mut tables);

        let classes = tables.validate(machine, &self.options).map_err(|e| {
            tracing::warn!(machine = %machine.name, code = e.code(), "generation refused: {}", e);
            e
        })?;

        let mut w = CodeWriter::new(self.options.indent_width);
        let emitter = Emitter {
            machine,
            tables: &tables,
            classes: &classes,
            base: format!("{}Base", pascal_case(&machine.name)),
        };
        emitter.module(&mut w);

        tracing::debug!(
            machine = %machine.name,
            classes = tables.states.len(),
            "generated python module"
        );
        Ok(w.finish())
    }
}

/// States and their outgoing transitions, collected in one walk.
#[derive(Default)]
struct HandlerTables<'m> {
    states: Vec<&'m State>,
    transitions: Vec<&'m Transition>,
}

impl<'m> Visitor<'m> for HandlerTables<'m> {
    fn visit(&mut self, node: Node<'m>) {
        match node {
            Node::Machine(_) | Node::Event(_) | Node::ResetEvent(_) | Node::Command(_) => {}
            Node::State(state) => self.states.push(state),
            Node::Transition(t) => self.transitions.push(t),
        }
    }
}

impl<'m> HandlerTables<'m> {
    /// Outgoing transitions of `state` grouped by event, in order of first
    /// appearance.
    fn handlers(&self, state: &str) -> Vec<(&'m str, Vec<&'m Transition>)> {
        let mut groups: Vec<(&'m str, Vec<&'m Transition>)> = Vec::new();
        for &t in self.transitions.iter().filter(|t| t.source == state) {
            match groups.iter_mut().find(|(event, _)| *event == t.event) {
                Some((_, group)) => group.push(t),
                None => groups.push((t.event.as_str(), vec![t])),
            }
        }
        groups
    }

    /// Checks everything the generated code relies on and returns the class
    /// name of each state.
    fn validate(
        &self,
        machine: &StateMachine,
        options: &GeneratorOptions,
    ) -> Result<HashMap<&'m str, String>, GenerationError> {
        let mut declared = HashSet::new();
        for state in &self.states {
            if !declared.insert(state.name.as_str()) {
                return Err(GenerationError::DuplicateState {
                    state: state.name.clone(),
                });
            }
        }

        match self.states.iter().filter(|s| s.initial).count() {
            0 => return Err(GenerationError::NoInitialState),
            1 => {}
            count => return Err(GenerationError::MultipleInitialStates { count }),
        }

        for t in &self.transitions {
            for name in [&t.source, &t.target] {
                if !declared.contains(name.as_str()) {
                    return Err(GenerationError::UnresolvedState {
                        state: name.clone(),
                        event: t.event.clone(),
                    });
                }
            }
        }

        for state in &self.states {
            for (event, group) in self.handlers(&state.name) {
                if group.len() > 1 && group.iter().any(|t| t.guard.is_none()) {
                    return Err(GenerationError::DuplicateTransition {
                        state: state.name.clone(),
                        event: event.to_string(),
                    });
                }
            }
        }

        let machine_class = pascal_case(&machine.name);
        let mut generated = vec![(machine.name.as_str(), machine_class.clone())];
        for state in &self.states {
            generated.push((
                state.name.as_str(),
                format!("{}{}", pascal_case(&state.name), options.state_suffix),
            ));
        }
        for t in &self.transitions {
            generated.push((t.event.as_str(), format!("on_{}", t.event)));
        }
        if let Some((name, generated)) = generated.into_iter().find(|(_, g)| !is_py_identifier(g)) {
            return Err(GenerationError::InvalidIdentifier {
                name: name.to_string(),
                generated,
            });
        }

        let reserved = [
            machine_class.clone(),
            format!("{}Base", machine_class),
            "UnhandledEvent".to_string(),
        ];
        let mut owners: HashMap<String, &str> = HashMap::new();
        let mut classes = HashMap::new();
        for state in &self.states {
            let class = format!("{}{}", pascal_case(&state.name), options.state_suffix);
            if reserved.contains(&class) {
                return Err(GenerationError::NameCollision {
                    first: state.name.clone(),
                    second: machine.name.clone(),
                    class,
                });
            }
            if let Some(first) = owners.insert(class.clone(), &state.name) {
                return Err(GenerationError::NameCollision {
                    first: first.to_string(),
                    second: state.name.clone(),
                    class,
                });
            }
            classes.insert(state.name.as_str(), class);
        }

        Ok(classes)
    }
}

struct Emitter<'a, 'm> {
    machine: &'m StateMachine,
    tables: &'a HandlerTables<'m>,
    classes: &'a HashMap<&'m str, String>,
    base: String,
}

impl Emitter<'_, '_> {
    fn module(&self, w: &mut CodeWriter) {
        w.line(format!(
            "# Generated by smc from state machine '{}'.",
            self.machine.name
        ));
        w.line(format!("# Source checksum: {}", self.machine.checksum()));
        w.line("# Do not edit by hand.");
        w.blank();
        w.line("import operator");
        w.blank();
        self.runtime(w);
        self.base_class(w);
        for state in &self.tables.states {
            w.blank();
            w.blank();
            self.state_class(w, state);
        }
        w.blank();
        w.blank();
        self.dispatcher(w);
    }

    fn runtime(&self, w: &mut CodeWriter) {
        w.blank();
        w.block("class UnhandledEvent(Exception):", |w| {
            w.line("\"\"\"Raised when the current state does not handle an event.\"\"\"");
            w.blank();
            w.block("def __init__(self, state, event):", |w| {
                w.line(
                    "super().__init__(\"state '%s' does not handle event '%s'\" % (state, event))",
                );
                w.line("self.state = state");
                w.line("self.event = event");
            });
        });
        w.blank();
        w.blank();
        w.block("def _field(ctx, path):", |w| {
            w.line("value = ctx");
            w.block("for part in path.split(\".\"):", |w| {
                w.block("if not isinstance(value, dict):", |w| w.line("return None"));
                w.line("value = value.get(part)");
            });
            w.line("return value");
        });
        w.blank();
        w.blank();
        w.block("def _equals(value, expected):", |w| {
            w.block(
                "if isinstance(value, bool) or isinstance(expected, bool):",
                |w| w.line("return value is expected"),
            );
            w.line("return value == expected");
        });
        w.blank();
        w.blank();
        w.block("def _compare(ctx, path, op, operand):", |w| {
            w.line("value = _field(ctx, path)");
            w.block(
                "if isinstance(value, bool) or not isinstance(value, (int, float)):",
                |w| w.line("return False"),
            );
            w.line("return op(value, operand)");
        });
        w.blank();
        w.blank();
    }

    fn base_class(&self, w: &mut CodeWriter) {
        w.block(format!("class {}:", self.base), |w| {
            w.line(format!(
                "\"\"\"Base class for {} states.\"\"\"",
                self.machine.name
            ));
            w.blank();
            w.line("name = None");
            w.blank();
            w.block("def on_entry(self, machine, ctx):", |w| w.line("pass"));
            w.blank();
            w.block("def on_exit(self, machine, ctx):", |w| w.line("pass"));
            w.blank();
            w.block("def handle(self, machine, event, ctx):", |w| {
                w.line("handler = getattr(self, \"on_\" + event, None)");
                w.block("if handler is None:", |w| {
                    w.line("raise UnhandledEvent(self.name, event)")
                });
                w.line("return handler(machine, ctx)");
            });
        });
    }

    fn state_class(&self, w: &mut CodeWriter, state: &State) {
        let class = self.class_of(&state.name);
        w.block(format!("class {}({}):", class, self.base), |w| {
            w.line(format!("name = {}", py_str(&state.name)));

            for (hook, action) in [("on_entry", &state.entry), ("on_exit", &state.exit)] {
                if let Some(action) = action {
                    w.blank();
                    w.block(format!("def {}(self, machine, ctx):", hook), |w| {
                        w.line(format!("machine.run_action({})", py_str(action)))
                    });
                }
            }

            for (event, group) in self.tables.handlers(&state.name) {
                w.blank();
                w.block(format!("def on_{}(self, machine, ctx):", event), |w| {
                    self.handler_body(w, event, &group)
                });
            }
        });
    }

    fn handler_body(&self, w: &mut CodeWriter, event: &str, group: &[&Transition]) {
        let mut guarded = false;
        for (i, t) in group.iter().enumerate() {
            let take = format!(
                "return machine.transition({}, {}, ctx)",
                py_str(&t.target),
                t.action.as_deref().map(py_str).unwrap_or_else(|| "None".to_string())
            );
            match &t.guard {
                Some(guard) => {
                    guarded = true;
                    let keyword = if i == 0 { "if" } else { "elif" };
                    w.block(format!("{} {}:", keyword, py_guard(guard)), |w| {
                        w.line(&take)
                    });
                }
                None => w.line(&take),
            }
        }
        if guarded {
            w.line(format!("raise UnhandledEvent(self.name, {})", py_str(event)));
        }
    }

    fn dispatcher(&self, w: &mut CodeWriter) {
        let name = pascal_case(&self.machine.name);
        let initial = self
            .tables
            .states
            .iter()
            .find(|s| s.initial)
            .map(|s| s.name.as_str())
            .unwrap_or_default();

        w.block(format!("class {}:", name), |w| {
            w.line(format!(
                "\"\"\"Dispatcher for the {} state machine.\"\"\"",
                self.machine.name
            ));
            w.blank();
            w.line(format!("initial = {}", py_str(initial)));

            let resets: Vec<String> = self
                .machine
                .reset_events
                .iter()
                .map(|e| py_str(&e.name))
                .collect();
            if resets.is_empty() {
                w.line("reset_events = frozenset()");
            } else {
                w.line(format!("reset_events = frozenset([{}])", resets.join(", ")));
            }

            self.code_table(w, "events", &self.machine.events);
            self.code_table(w, "commands", &self.machine.commands);

            w.block("states = {", |w| {
                for state in &self.tables.states {
                    w.line(format!(
                        "{}: {},",
                        py_str(&state.name),
                        self.class_of(&state.name)
                    ));
                }
            });
            w.line("}");
            w.blank();

            w.block("def __init__(self, ctx=None):", |w| {
                w.line("self.ctx = {} if ctx is None else ctx");
                w.line("self.state = None");
                w.line("self.enter(self.initial, self.ctx)");
            });
            w.blank();
            w.block("def enter(self, target, ctx):", |w| {
                w.line("self.state = self.states[target]()");
                w.line("self.state.on_entry(self, ctx)");
                w.line("return self.state");
            });
            w.blank();
            w.block("def dispatch(self, event, payload=None):", |w| {
                w.line("\"\"\"Merges the payload into the context if the event is accepted.\"\"\"");
                w.line("ctx = dict(self.ctx)");
                w.block("if payload:", |w| w.line("ctx.update(payload)"));
                w.block("if event in self.reset_events:", |w| {
                    w.line("state = self.transition(self.initial, None, ctx)")
                });
                w.block("else:", |w| {
                    w.line("state = self.state.handle(self, event, ctx)")
                });
                w.line("self.ctx = ctx");
                w.line("return state");
            });
            w.blank();
            w.block("def transition(self, target, action, ctx):", |w| {
                w.line("changed = target != self.state.name");
                w.block("if changed:", |w| w.line("self.state.on_exit(self, ctx)"));
                w.block("if action is not None:", |w| w.line("self.run_action(action)"));
                w.block("if changed:", |w| w.line("self.enter(target, ctx)"));
                w.line("return self.state");
            });
            w.blank();
            w.block("def run_action(self, action):", |w| {
                w.line("\"\"\"Override to perform commands; `commands` maps names to codes.\"\"\"");
            });
        });
    }

    fn code_table(&self, w: &mut CodeWriter, name: &str, decls: &[smc_core::Declaration]) {
        if decls.is_empty() {
            w.line(format!("{} = {{}}", name));
            return;
        }
        w.block(format!("{} = {{", name), |w| {
            for decl in decls {
                let code = decl
                    .code
                    .as_deref()
                    .map(py_str)
                    .unwrap_or_else(|| "None".to_string());
                w.line(format!("{}: {},", py_str(&decl.name), code));
            }
        });
        w.line("}");
    }

    fn class_of<'s>(&'s self, state: &'s str) -> &'s str {
        self.classes.get(state).map(String::as_str).unwrap_or(state)
    }
}

/// `door_closed` and `doorClosed` both become `DoorClosed`. A result that
/// would start with a digit keeps a leading `_`.
pub fn pascal_case(name: &str) -> String {
    let out: String = name
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", out)
    } else {
        out
    }
}

const PY_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

fn is_py_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !PY_KEYWORDS.contains(&s)
}

fn py_str(s: &str) -> String {
    // JSON string escapes are a subset of Python's.
    serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s))
}

fn py_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => py_str(s),
        other => other.to_string(),
    }
}

fn py_guard(guard: &GuardExpr) -> String {
    let mut out = String::new();
    write_guard(&mut out, guard, 0);
    out
}

fn precedence(guard: &GuardExpr) -> u8 {
    match guard {
        GuardExpr::Or(..) => 1,
        GuardExpr::And(..) => 2,
        GuardExpr::Not(_) | GuardExpr::Ne(..) => 3,
        _ => 4,
    }
}

fn write_guard(out: &mut String, guard: &GuardExpr, min_precedence: u8) {
    if precedence(guard) < min_precedence {
        out.push('(');
        write_guard(out, guard, 0);
        out.push(')');
        return;
    }

    let compare = |out: &mut String, field: &str, op: &str, n: f64| {
        out.push_str(&format!(
            "_compare(ctx, {}, operator.{}, {:?})",
            py_str(field),
            op,
            n
        ));
    };

    match guard {
        GuardExpr::Truthy(field) => out.push_str(&format!("bool(_field(ctx, {}))", py_str(field))),
        GuardExpr::Eq(field, value) => out.push_str(&format!(
            "_equals(_field(ctx, {}), {})",
            py_str(field),
            py_value(value)
        )),
        GuardExpr::Ne(field, value) => out.push_str(&format!(
            "not _equals(_field(ctx, {}), {})",
            py_str(field),
            py_value(value)
        )),
        GuardExpr::Gt(field, n) => compare(out, field, "gt", *n),
        GuardExpr::Ge(field, n) => compare(out, field, "ge", *n),
        GuardExpr::Lt(field, n) => compare(out, field, "lt", *n),
        GuardExpr::Le(field, n) => compare(out, field, "le", *n),
        GuardExpr::Or(left, right) => {
            write_guard(out, left, 1);
            out.push_str(" or ");
            write_guard(out, right, 2);
        }
        GuardExpr::And(left, right) => {
            write_guard(out, left, 2);
            out.push_str(" and ");
            write_guard(out, right, 3);
        }
        GuardExpr::Not(inner) => {
            out.push_str("not ");
            write_guard(out, inner, 3);
        }
    }
}
