//! Cycle collection for the value graph
//!
//! Reference counting reclaims acyclic garbage promptly, but refs and
//! closure-captured environments can form cycles. A thread-local registry
//! tracks every cycle-capable value and every environment; collection is
//! CPython-style trial deletion:
//!
//! 1. Snapshot each tracked node's external reference count.
//! 2. Subtract every edge between tracked nodes (container children, dict
//!    keys and values, ref targets, closure→environment, environment→parent,
//!    environment bindings).
//! 3. Nodes with a positive remainder are externally reachable roots; mark
//!    them and everything they transitively reach as rescued. Environments
//!    carry a generation marker so each chain is visited at most once per
//!    phase.
//! 4. The rest is garbage: sever its mutable edges (ref targets, closure
//!    environments, environment bindings) and let the plain reference counts
//!    unwind the cycle.
//!
//! Collection runs exactly once, when the outermost call returns. Nested
//! calls must not collect: native frames commonly hold values the traversal
//! cannot see.

use crate::env::{Env, EnvCell};
use crate::value::{Value, ValueKind};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Weak;
use tracing::debug;

/// Counters for one collection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub tracked_values: usize,
    pub tracked_envs: usize,
    pub freed_values: usize,
    pub freed_envs: usize,
}

struct Tracker {
    values: Vec<Weak<ValueKind>>,
    envs: Vec<Weak<EnvCell>>,
    generation: u64,
    depth: usize,
}

thread_local! {
    static TRACKER: RefCell<Tracker> = RefCell::new(Tracker {
        values: Vec::new(),
        envs: Vec::new(),
        generation: 0,
        depth: 0,
    });
}

pub(crate) fn track_value(value: &Value) {
    if !value.is_cycle_capable() {
        return;
    }
    TRACKER.with(|t| t.borrow_mut().values.push(value.downgrade()));
}

pub(crate) fn track_env(env: &Env) {
    TRACKER.with(|t| t.borrow_mut().envs.push(env.downgrade()));
}

/// Note entry into an evaluator call frame.
pub fn enter_call() {
    TRACKER.with(|t| t.borrow_mut().depth += 1);
}

/// Note return from an evaluator call frame. At the outermost return a
/// collection runs and its statistics are returned.
pub fn leave_call() -> Option<CollectStats> {
    let at_outermost = TRACKER.with(|t| {
        let mut tracker = t.borrow_mut();
        tracker.depth = tracker.depth.saturating_sub(1);
        tracker.depth == 0
    });
    if at_outermost { Some(collect()) } else { None }
}

/// The number of live tracked values (dead registry entries are pruned).
pub fn tracked_value_count() -> usize {
    TRACKER.with(|t| {
        let mut tracker = t.borrow_mut();
        tracker.values.retain(|w| w.strong_count() > 0);
        tracker.values.len()
    })
}

/// Run a collection now, regardless of call depth.
pub fn collect() -> CollectStats {
    // Phase 0: snapshot. Upgrading adds exactly one strong handle per node,
    // subtracted below when the external counts are read.
    let (values, envs, mark_gen) = TRACKER.with(|t| {
        let mut tracker = t.borrow_mut();
        tracker.values.retain(|w| w.strong_count() > 0);
        tracker.envs.retain(|w| w.strong_count() > 0);
        let values: Vec<Value> = tracker
            .values
            .iter()
            .filter_map(|w| w.upgrade().map(Value::from_cell))
            .collect();
        let envs: Vec<Env> = tracker
            .envs
            .iter()
            .filter_map(|w| w.upgrade().map(Env::from_cell))
            .collect();
        tracker.generation += 1;
        (values, envs, tracker.generation)
    });

    let mut value_scratch: HashMap<usize, i64> = values
        .iter()
        .map(|v| (v.addr(), v.strong_count() as i64 - 1))
        .collect();
    let mut env_scratch: HashMap<usize, i64> = envs
        .iter()
        .map(|e| (e.addr(), e.strong_count() as i64 - 1))
        .collect();

    // Phase 1: subtract internal edges.
    for value in &values {
        value.for_each_child(|child| {
            if let Some(count) = value_scratch.get_mut(&child.addr()) {
                *count -= 1;
            }
        });
        if let Some(env) = value.env_edge() {
            if let Some(count) = env_scratch.get_mut(&env.addr()) {
                *count -= 1;
            }
        }
    }
    for env in &envs {
        if let Some(parent) = env.parent() {
            if let Some(count) = env_scratch.get_mut(&parent.addr()) {
                *count -= 1;
            }
        }
        env.for_each_binding(|_, value| {
            if let Some(count) = value_scratch.get_mut(&value.addr()) {
                *count -= 1;
            }
        });
    }

    // Phase 2: mark everything reachable from externally-referenced roots.
    enum Node {
        V(Value),
        E(Env),
    }
    let mut rescued: HashSet<usize> = HashSet::new();
    let mut work: Vec<Node> = Vec::new();
    for value in &values {
        if value_scratch.get(&value.addr()).copied().unwrap_or(0) > 0 {
            work.push(Node::V(value.clone()));
        }
    }
    for env in &envs {
        if env_scratch.get(&env.addr()).copied().unwrap_or(0) > 0 {
            work.push(Node::E(env.clone()));
        }
    }
    while let Some(node) = work.pop() {
        match node {
            Node::V(value) => {
                if !value_scratch.contains_key(&value.addr()) {
                    continue;
                }
                if !rescued.insert(value.addr()) {
                    continue;
                }
                value.for_each_child(|child| work.push(Node::V(child.clone())));
                if let Some(env) = value.env_edge() {
                    work.push(Node::E(env));
                }
            }
            Node::E(env) => {
                if !env.enter_generation(mark_gen) {
                    continue;
                }
                if let Some(parent) = env.parent() {
                    work.push(Node::E(parent.clone()));
                }
                env.for_each_binding(|_, value| work.push(Node::V(value.clone())));
            }
        }
    }

    // Phase 3: sever the garbage. Dropping the snapshot afterwards lets the
    // ordinary reference counts free the cycle members.
    let mut freed_values = 0;
    let mut freed_envs = 0;
    for value in &values {
        if !rescued.contains(&value.addr()) {
            value.sever();
            freed_values += 1;
        }
    }
    for env in &envs {
        if env.enter_generation(mark_gen) {
            // First visit in this generation: the mark phase never reached it.
            env.clear_bindings();
            freed_envs += 1;
        }
    }

    let stats = CollectStats {
        tracked_values: values.len(),
        tracked_envs: envs.len(),
        freed_values,
        freed_envs,
    };
    drop(values);
    drop(envs);
    TRACKER.with(|t| {
        let mut tracker = t.borrow_mut();
        tracker.values.retain(|w| w.strong_count() > 0);
        tracker.envs.retain(|w| w.strong_count() > 0);
    });
    debug!(
        tracked_values = stats.tracked_values,
        freed_values = stats.freed_values,
        tracked_envs = stats.tracked_envs,
        freed_envs = stats.freed_envs,
        "cycle collection"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_acyclic_values_survive() {
        collect();
        let before = tracked_value_count();
        let arr = Value::array(Type::integer(), vec![Value::integer(1)]);
        let stats = collect();
        assert_eq!(stats.freed_values, 0);
        assert_eq!(tracked_value_count(), before + 1);
        drop(arr);
        assert_eq!(tracked_value_count(), before);
    }

    #[test]
    #[serial]
    fn test_ref_cycle_is_collected() {
        collect();
        let before = tracked_value_count();
        {
            // ref -> array -> ref: a cycle with no external handles left.
            let r = Value::ref_of(Type::null(), Value::null());
            let arr = Value::array(Type::ref_of(Type::null()), vec![r.clone()]);
            assert!(r.ref_set(arr.clone()));
        }
        // The cycle keeps itself alive past the drops.
        assert!(tracked_value_count() > before);
        let stats = collect();
        assert_eq!(stats.freed_values, 2);
        assert_eq!(tracked_value_count(), before);
    }

    #[test]
    #[serial]
    fn test_externally_held_cycle_is_rescued() {
        collect();
        let r = Value::ref_of(Type::null(), Value::null());
        let arr = Value::array(Type::ref_of(Type::null()), vec![r.clone()]);
        assert!(r.ref_set(arr.clone()));
        let stats = collect();
        assert_eq!(stats.freed_values, 0);
        // Still intact.
        assert!(arr.array_items().unwrap()[0].same(&r));
        drop(arr);
        drop(r);
        collect();
    }

    #[test]
    #[serial]
    fn test_env_binding_keeps_value_alive() {
        collect();
        let env = Env::root();
        env.define("x", Value::array(Type::integer(), vec![]));
        let stats = collect();
        assert_eq!(stats.freed_values, 0);
        assert!(env.lookup("x").is_some());
    }

    #[test]
    #[serial]
    fn test_call_depth_gates_collection() {
        enter_call();
        enter_call();
        assert!(leave_call().is_none());
        assert!(leave_call().is_some());
    }
}
