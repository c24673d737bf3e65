//! Sandbox for local cells, evaluated by an embedded Rhai engine.
//!
//! Cells tagged `javascript` (the client default) or `rhai` land here. The
//! script surface covers the common cell shape: `let`/`const`, top-level
//! `return`, `results["cell_1"]` lookups and `console.log(..)`.
//!
//! One engine is built at startup with the capability set registered on it.
//! Every evaluation gets its own scope from an [`ExecutionContext`], so no
//! variables leak between cells or connections.

use std::time::Duration;

use chrono::Utc;
use rhai::{Blob, Dynamic, Engine, Map, Scope, INT};
use serde_json::Value;

use super::{Console, ExecutionContext, LogLevel};
use crate::error::{BridgeError, BridgeResult};

pub struct LocalSandbox {
    engine: Engine,
}

/// Receiver of `console.log(..)` and friends inside scripts.
#[derive(Debug, Clone, Copy)]
struct ConsoleObject;

impl LocalSandbox {
    /// `max_operations` of 0 leaves scripts unbounded.
    pub fn new(console: Console, max_operations: u64) -> Self {
        let mut engine = Engine::new();
        if max_operations > 0 {
            engine.set_max_operations(max_operations);
        }

        // console
        let out = console.clone();
        engine.on_print(move |s| out.emit(LogLevel::Log, s));
        let out = console.clone();
        engine.on_debug(move |s, _source, _pos| out.emit(LogLevel::Debug, s));
        let out = console.clone();
        engine.register_fn("warn", move |v: Dynamic| out.emit(LogLevel::Warn, &display(v)));
        let out = console.clone();
        engine.register_fn("error", move |v: Dynamic| out.emit(LogLevel::Error, &display(v)));

        engine.register_type_with_name::<ConsoleObject>("Console");
        let methods = [
            ("log", LogLevel::Log),
            ("info", LogLevel::Log),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ];
        for (name, level) in methods {
            let out = console.clone();
            engine.register_fn(name, move |_: ConsoleObject, v: Dynamic| out.emit(level, &display(v)));
        }

        // timers
        engine.register_fn("sleep", |ms: INT| {
            std::thread::sleep(Duration::from_millis(ms.max(0) as u64));
        });
        engine.register_fn("now_ms", || -> INT { Utc::now().timestamp_millis() });

        // bytes
        engine.register_fn("bytes", |s: &str| -> Blob { s.as_bytes().to_vec() });
        engine.register_fn("utf8", |b: Blob| -> String { String::from_utf8_lossy(&b).into_owned() });
        engine.register_fn("hex", |b: Blob| -> String {
            b.iter().map(|x| format!("{x:02x}")).collect()
        });

        Self { engine }
    }

    /// Evaluate `code` as a script body. A top-level `return` or the final
    /// expression is the result; unit becomes `null`.
    pub fn eval(&self, code: &str, ctx: &ExecutionContext) -> BridgeResult<Value> {
        let mut scope = Scope::new();
        scope.push_constant("console", ConsoleObject);
        scope.push_constant("results", json_map(ctx.results.iter())?);
        scope.push_constant(
            "env",
            ctx.env
                .iter()
                .map(|(k, v)| (k.as_str().into(), Dynamic::from(v.clone())))
                .collect::<Map>(),
        );

        let out = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, code)
            .map_err(|e| BridgeError::Execution(e.to_string()))?;
        rhai::serde::from_dynamic::<Value>(&out).map_err(|e| BridgeError::Execution(e.to_string()))
    }
}

fn json_map<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> BridgeResult<Map> {
    let mut map = Map::new();
    for (k, v) in entries {
        let value = rhai::serde::to_dynamic(v).map_err(|e| BridgeError::Execution(e.to_string()))?;
        map.insert(k.as_str().into(), value);
    }
    Ok(map)
}

// Strings print as-is, everything else as JSON.
fn display(v: Dynamic) -> String {
    if v.is_string() {
        return v.into_string().unwrap_or_default();
    }
    match rhai::serde::from_dynamic::<Value>(&v) {
        Ok(json) => json.to_string(),
        Err(_) => v.to_string(),
    }
}
