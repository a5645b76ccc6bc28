//! runbox-script: embedded script engine façade for action definitions.
//!
//! Wraps a V8 isolate behind a deliberately small surface: create a
//! backend, feed it source strings, drop it. Every scripting failure
//! (invalid UTF-8, parse error, thrown exception) collapses into `false`;
//! richer error reporting is a non-goal of this façade, and no engine
//! type escapes the public API.
//!
//! The engine needs process-wide initialization that outlives any one
//! isolate; [`init`] performs it exactly once. A backend is not
//! thread-safe: it is logically pinned to the thread using it, while its
//! persistent context outlives any individual [`run_js`] call.
//!
//! [`run_js`]: ScriptBackend::run_js

#![warn(unsafe_op_in_unsafe_fn)]

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Once;

pub mod ffi;

static INIT: Once = Once::new();

/// Process-wide engine initialization.
///
/// The first caller brings up the platform and the engine globals; the
/// platform stays alive for the life of the process. Must run before any
/// [`ScriptBackend::new`]; calling it again is a no-op.
pub fn init() {
    INIT.call_once(|| {
        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform);
        v8::V8::initialize();
        tracing::debug!("script engine platform initialized");
    });
}

/// An isolated script engine instance.
///
/// Owns an isolate with its own heap and array-buffer allocator, plus one
/// persistent global context that carries state across
/// [`run_js`](Self::run_js) calls.
pub struct ScriptBackend {
    // Declared before the isolate: a global handle must not outlive the
    // isolate it points into.
    context: v8::Global<v8::Context>,
    isolate: v8::OwnedIsolate,
}

impl ScriptBackend {
    /// Create a backend, or [`None`] if the engine failed to come up.
    pub fn new() -> Option<Self> {
        init();

        let backend = catch_unwind(|| {
            let params =
                v8::CreateParams::default().array_buffer_allocator(v8::new_default_allocator());
            let mut isolate = v8::Isolate::new(params);
            let context = {
                let scope = &mut v8::HandleScope::new(&mut isolate);
                let context = v8::Context::new(scope);
                v8::Global::new(scope, context)
            };
            Self { context, isolate }
        });
        backend.ok()
    }

    /// Compile and evaluate `source` in the backend's context.
    ///
    /// The result value is discarded; `false` covers string wrapping,
    /// compilation failure, and thrown exceptions alike.
    pub fn run_js(&mut self, source: &str) -> bool {
        let scope = &mut v8::HandleScope::new(&mut self.isolate);
        let context = v8::Local::new(scope, &self.context);
        let scope = &mut v8::ContextScope::new(scope, context);
        let scope = &mut v8::TryCatch::new(scope);

        let Some(source) = v8::String::new(scope, source) else {
            return false;
        };
        let Some(script) = v8::Script::compile(scope, source, None) else {
            return false;
        };
        script.run(scope).is_some()
    }

    /// [`ScriptBackend::run_js`] behind a panic barrier, for callers that
    /// must never unwind (the C surface).
    fn run_js_no_unwind(&mut self, source: &str) -> bool {
        catch_unwind(AssertUnwindSafe(|| self.run_js(source))).unwrap_or(false)
    }
}
