//! One isolated Rhai engine per instance.
//!
//! Scripts are plain Rhai files. Top-level statements run once per
//! compilation (the reconfiguration window), and the functions they define
//! become message handlers:
//! - `fn loadbang()` - Called when the host finishes loading
//! - `fn bang()` - Trigger-only message
//! - `fn msg_int(n)` / `fn msg_float(x)` - Numeric messages
//! - `fn <selector>(args...)` - Any other named message
//!
//! A handler may also be a top-level variable holding a closure
//! (`let bang = || emit(0, 1, 2);`).
//!
//! Rhai has no variadic functions, so a message whose argument count has no
//! exact overload goes to the overload with the most parameters: missing
//! parameters receive `()` and extra arguments are dropped.

use std::rc::Rc;

use rhai::{CallFnOptions, Dynamic, Engine, FnAccess, FnPtr, Scope, AST};

use crate::capabilities::Capabilities;
use crate::error::BridgeError;
use crate::platform::Platform;
use crate::script_diagnostics::ScriptPhase;
use crate::value::{self, TypedValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Engine and capabilities ready, no program installed.
    Built,
    /// Top-level statements are running.
    Evaluating,
    /// Program installed, ready for dispatch.
    Idle,
    /// Last compilation or evaluation failed. Dispatch still works if a
    /// program is installed, and the first handler that returns normally
    /// moves the engine back to `Idle`.
    Faulted,
}

/// What a message name resolved to.
enum Handler {
    Function { arity: usize },
    Closure { ptr: FnPtr, arity: Option<usize> },
}

/// Scripting engine for one instance.
pub struct ScriptEngineInstance {
    engine: Engine,
    ast: Option<AST>,
    scope: Scope<'static>,
    caps: Capabilities,
    state: EngineState,
}

impl ScriptEngineInstance {
    /// Create an engine with the platform's limits and the capability
    /// surface bound.
    pub fn build(platform: &Platform, caps: Capabilities) -> Self {
        let mut engine = platform.new_engine();
        caps.install(&mut engine);

        Self {
            engine,
            ast: None,
            scope: Scope::new(),
            caps,
            state: EngineState::Built,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn has_program(&self) -> bool {
        self.ast.is_some()
    }

    pub fn mark_faulted(&mut self) {
        self.state = EngineState::Faulted;
    }

    /// Parse `source`. On failure nothing changes.
    pub fn compile(&mut self, source: &str) -> Result<(), BridgeError> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|err| BridgeError::compilation(&err))?;
        self.ast = Some(ast);
        Ok(())
    }

    /// Run the top-level statements of the compiled program. Count writes
    /// made before a failure still count.
    pub fn run_top_level(&mut self) -> Result<(), BridgeError> {
        let Some(ast) = self.ast.as_ref() else {
            return Ok(());
        };

        self.caps.reporter().reset_budget();
        self.state = EngineState::Evaluating;
        let result = self.engine.run_ast_with_scope(&mut self.scope, ast);
        self.caps.sync_counts();

        match result {
            Ok(()) => {
                self.state = EngineState::Idle;
                log::debug!("top-level evaluation of {} done", self.caps.reporter().identity());
                Ok(())
            }
            Err(err) => {
                self.state = EngineState::Faulted;
                Err(BridgeError::runtime(ScriptPhase::Evaluate, &err))
            }
        }
    }

    /// Compile and evaluate with the reconfiguration window open for the
    /// whole call. The window is committed to the host before returning.
    pub fn compile_and_run(&mut self, source: &str) -> Result<(), BridgeError> {
        let ports = Rc::clone(self.caps.ports());
        ports.borrow_mut().open_window();

        if let Err(err) = self.compile(source) {
            ports.borrow_mut().abandon();
            return Err(err);
        }
        let result = self.run_top_level();

        let host = Rc::clone(self.caps.reporter().host());
        ports.borrow_mut().commit(host.as_ref());
        self.caps.sync_counts();
        result
    }

    /// Call the handler named `name` with marshalled `args`.
    pub fn invoke(&mut self, name: &str, args: &[TypedValue]) -> Result<Option<TypedValue>, BridgeError> {
        let Some(ast) = self.ast.as_ref() else {
            return Err(self.missing(name));
        };
        let handler = self.resolve(ast, name, args.len())?;

        self.caps.reporter().reset_budget();
        let script_args = value::to_script_args(args);

        let result = match handler {
            Handler::Function { arity } => {
                let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
                self.engine.call_fn_with_options::<Dynamic>(
                    options,
                    &mut self.scope,
                    ast,
                    name,
                    adapt_arguments(script_args, arity),
                )
            }
            Handler::Closure { ptr, arity } => {
                let args = match arity {
                    Some(arity) => adapt_arguments(script_args, arity),
                    None => script_args,
                };
                ptr.call::<Dynamic>(&self.engine, ast, args)
            }
        };

        // Late count writes are requests outside the window: logged, ignored.
        self.caps.sync_counts();

        match result {
            Ok(value) => {
                if self.state == EngineState::Faulted {
                    self.state = EngineState::Idle;
                }
                Ok(value::to_host(&value))
            }
            Err(err) => Err(BridgeError::runtime(ScriptPhase::Dispatch, &err)),
        }
    }

    /// Look `name` up among the script's functions, then among its
    /// top-level variables.
    fn resolve(&self, ast: &AST, name: &str, argc: usize) -> Result<Handler, BridgeError> {
        let arities: Vec<usize> = ast
            .iter_functions()
            .filter(|f| f.name == name && f.access != FnAccess::Private)
            .map(|f| f.params.len())
            .collect();

        if arities.contains(&argc) {
            return Ok(Handler::Function { arity: argc });
        }
        if let Some(arity) = arities.iter().copied().max() {
            return Ok(Handler::Function { arity });
        }

        match self.scope.get(name) {
            Some(value) => match value.clone().try_cast::<FnPtr>() {
                Some(ptr) => {
                    let arity = closure_arity(ast, &ptr);
                    Ok(Handler::Closure { ptr, arity })
                }
                None => Err(BridgeError::MissingFunction {
                    instance: self.caps.reporter().identity(),
                    function: format!("{} (not callable)", name),
                }),
            },
            None => Err(self.missing(name)),
        }
    }

    fn missing(&self, name: &str) -> BridgeError {
        BridgeError::MissingFunction {
            instance: self.caps.reporter().identity(),
            function: name.to_string(),
        }
    }

    /// Release the engine and its program. Consuming `self` guarantees no
    /// call into this engine is still running.
    pub fn dispose(self) {
        log::debug!("disposing engine for {}", self.caps.reporter().identity());
        drop(self);
    }
}

/// Declared parameter count of a closure's underlying function, minus the
/// values it captured.
fn closure_arity(ast: &AST, ptr: &FnPtr) -> Option<usize> {
    let curried = ptr.curry().len();
    ast.iter_functions()
        .filter(|f| f.name == ptr.fn_name())
        .map(|f| f.params.len().saturating_sub(curried))
        .max()
}

/// Pad with `()` or truncate so `args` has exactly `arity` entries.
fn adapt_arguments(mut args: Vec<Dynamic>, arity: usize) -> Vec<Dynamic> {
    args.resize(arity, Dynamic::UNIT);
    args
}
