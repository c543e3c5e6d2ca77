//! Context sanitizer: decides where the live logger handle is injected into
//! arguments crossing into user code, and strips runtime-only keys out of
//! results crossing back.
//!
//! Two call shapes exist in the provider/hook ecosystem. Provider calls pass
//! `(prompt, options, context)` and get the logger added to the trailing
//! context mapping. Lifecycle hooks opt in with an explicit marker key
//! instead, so an options dict forwarded verbatim to a third-party SDK never
//! grows a surprise `logger` entry.

use serde_json::Value;

/// Key under which the live logger handle is placed.
pub const LOGGER_KEY: &str = "logger";

/// Explicit opt-in marker for hook-shaped calls. Removed during injection
/// and replaced by [`LOGGER_KEY`].
pub const INJECT_MARKER_KEY: &str = "__inject_logger__";

/// Where the logger handle goes for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionPlan {
    /// No argument wants a logger.
    None,
    /// Provider-shaped call: inject into the trailing mapping argument.
    TrailingMapping { index: usize },
    /// Hook-shaped call: inject into each mapping carrying the marker key.
    MarkedMappings { indices: Vec<usize> },
}

/// Decide injection for one positional argument list.
///
/// An explicit marker anywhere wins over the provider heuristic; the
/// heuristic applies only to calls with three or more arguments whose last
/// argument is a mapping.
pub fn plan_injection(args: &[Value]) -> InjectionPlan {
    let marked: Vec<usize> = args
        .iter()
        .enumerate()
        .filter(|(_, arg)| {
            arg.as_object()
                .is_some_and(|map| map.contains_key(INJECT_MARKER_KEY))
        })
        .map(|(i, _)| i)
        .collect();

    if !marked.is_empty() {
        return InjectionPlan::MarkedMappings { indices: marked };
    }

    if args.len() >= 3 && args.last().is_some_and(Value::is_object) {
        return InjectionPlan::TrailingMapping {
            index: args.len() - 1,
        };
    }

    InjectionPlan::None
}

/// Recursively remove `logger` and `__inject_logger__` keys at any depth.
///
/// Applied to every successful result before serialization so the logger
/// handle (not JSON-representable) never reaches a response file. Keys that
/// merely look similar are left alone. Idempotent.
pub fn strip_runtime_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove(LOGGER_KEY);
            map.remove(INJECT_MARKER_KEY);
            for child in map.values_mut() {
                strip_runtime_keys(child);
            }
        }
        Value::Array(items) => {
            for child in items {
                strip_runtime_keys(child);
            }
        }
        _ => {}
    }
}
