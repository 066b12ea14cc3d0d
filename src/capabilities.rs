//! The capability table: everything a script can reach in its host.
//!
//! One [`Capabilities`] value is built per instance and installed into every
//! engine that instance builds. The bindings are exactly:
//! - `log(...)`, `errorLog(...)` (plus Rhai's own `print`/`debug`)
//! - `constructionArguments`, `activeInletIndex` (read-only)
//! - `inletCount`, `outletCount` (read/write accessors, committed only while
//!   the reconfiguration window is open)
//! - `emit(outlet, values...)`
//! - `setInletAssistText(index, text)`, `setOutletAssistText(index, text)`
//!
//! Rhai has no variadic functions, so the variadic bindings are registered
//! once per arity up to [`MAX_VARIADIC_ARGS`].
//!
//! Rhai has no setter hook for a bare variable either. Each count accessor is
//! a shared cell served by the variable resolver: the script writes into the
//! cell, and every access to the accessor (and every capability that depends
//! on the counts) first forwards the stored value to the
//! [`PortReconfigurator`] and stores back the count now in effect.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rhai::{Dynamic, Engine, EvalAltResult, FLOAT, INT};

use crate::error::BridgeError;
use crate::host::PortKind;
use crate::ports::PortReconfigurator;
use crate::script_log::{LogLevel, Reporter};
use crate::value::{self, TypedValue};

pub const INLET_COUNT: &str = "inletCount";
pub const OUTLET_COUNT: &str = "outletCount";
pub const ACTIVE_INLET: &str = "activeInletIndex";
pub const CONSTRUCTION_ARGUMENTS: &str = "constructionArguments";

/// Most values accepted by `log`, `errorLog` and `emit` (after the index).
pub const MAX_VARIADIC_ARGS: usize = 10;

type Variadic<R> = Rc<dyn Fn(&[Dynamic]) -> R>;

/// Register `$name` once for each arity, from the initial identifier list up
/// to the full list. Every arity forwards a slice to the same handler.
macro_rules! register_variadic {
    (@each $engine:expr, $name:expr, $handler:expr; [$($done:ident)*]) => {
        register_variadic!(@one $engine, $name, $handler; $($done)*);
    };
    (@each $engine:expr, $name:expr, $handler:expr; [$($done:ident)*] $next:ident $($rest:ident)*) => {
        register_variadic!(@one $engine, $name, $handler; $($done)*);
        register_variadic!(@each $engine, $name, $handler; [$($done)* $next] $($rest)*);
    };
    (@one $engine:expr, $name:expr, $handler:expr; $($arg:ident)*) => {{
        let handler = Rc::clone(&$handler);
        $engine.register_fn($name, move |$($arg: Dynamic),*| handler(&[$($arg),*]));
    }};
}

#[derive(Clone)]
pub struct Capabilities {
    reporter: Rc<Reporter>,
    ports: Rc<RefCell<PortReconfigurator>>,
    arguments: Rc<[TypedValue]>,
    active_inlet: Rc<Cell<Option<usize>>>,
    inlet_cell: Dynamic,
    outlet_cell: Dynamic,
}

impl Capabilities {
    pub fn new(
        reporter: Rc<Reporter>,
        ports: Rc<RefCell<PortReconfigurator>>,
        arguments: Vec<TypedValue>,
    ) -> Self {
        let (inlets, outlets) = {
            let ports = ports.borrow();
            (ports.inlet_count() as INT, ports.outlet_count() as INT)
        };
        Self {
            reporter,
            ports,
            arguments: arguments.into(),
            active_inlet: Rc::new(Cell::new(None)),
            inlet_cell: Dynamic::from_int(inlets).into_shared(),
            outlet_cell: Dynamic::from_int(outlets).into_shared(),
        }
    }

    pub fn reporter(&self) -> &Rc<Reporter> {
        &self.reporter
    }

    pub fn ports(&self) -> &Rc<RefCell<PortReconfigurator>> {
        &self.ports
    }

    pub fn arguments(&self) -> &[TypedValue] {
        &self.arguments
    }

    pub fn active_inlet(&self) -> Option<usize> {
        self.active_inlet.get()
    }

    pub fn set_active_inlet(&self, inlet: Option<usize>) {
        self.active_inlet.set(inlet);
    }

    /// Committed count as seen by the script.
    pub fn committed(&self, kind: PortKind) -> INT {
        self.ports.borrow().count(kind) as INT
    }

    /// Bind the whole capability surface into `engine`.
    pub fn install(&self, engine: &mut Engine) {
        self.install_logging(engine);
        self.install_emit(engine);
        self.install_assist(engine);
        self.install_resolver(engine);
    }

    fn cell(&self, kind: PortKind) -> &Dynamic {
        match kind {
            PortKind::Inlet => &self.inlet_cell,
            PortKind::Outlet => &self.outlet_cell,
        }
    }

    /// Forward whatever the script stored in the `kind` accessor to the
    /// reconfigurator, then store back the count in effect: the pending count
    /// while the window is open, the committed count otherwise. Values that
    /// are not finite numbers are reported and discarded.
    pub fn sync_count(&self, kind: PortKind) {
        let stored = self.cell(kind).flatten_clone();
        let current = self.ports.borrow().effective_count(kind) as INT;
        match count_from(&stored) {
            Some(requested) if requested == current => {}
            Some(requested) => {
                self.ports.borrow_mut().request(kind, requested);
            }
            None => self.reporter.report(&BridgeError::BadArgument(format!(
                "{} must be a number, got {}",
                count_name(kind),
                stored.type_name()
            ))),
        }

        let effective = self.ports.borrow().effective_count(kind) as INT;
        let mut cell = self.cell(kind).clone();
        if let Some(mut value) = cell.write_lock::<Dynamic>() {
            *value = Dynamic::from_int(effective);
        };
    }

    pub fn sync_counts(&self) {
        self.sync_count(PortKind::Inlet);
        self.sync_count(PortKind::Outlet);
    }

    fn install_logging(&self, engine: &mut Engine) {
        let reporter = Rc::clone(&self.reporter);
        let info: Variadic<()> =
            Rc::new(move |args: &[Dynamic]| reporter.script_log(LogLevel::Info, args));
        register_variadic!(@each engine, "log", info;
            [] a0 a1 a2 a3 a4 a5 a6 a7 a8 a9);

        // The math package defines log(x) and log(x, base). Exact-typed
        // overloads in the global namespace are resolved before it.
        let numeric = Rc::clone(&info);
        engine.register_fn("log", move |x: FLOAT| numeric(&[Dynamic::from_float(x)]));
        let numeric = Rc::clone(&info);
        engine.register_fn("log", move |x: INT| numeric(&[Dynamic::from_int(x)]));
        let numeric = Rc::clone(&info);
        engine.register_fn("log", move |x: FLOAT, y: FLOAT| {
            numeric(&[Dynamic::from_float(x), Dynamic::from_float(y)])
        });
        let numeric = Rc::clone(&info);
        engine.register_fn("log", move |x: FLOAT, y: INT| {
            numeric(&[Dynamic::from_float(x), Dynamic::from_int(y)])
        });
        let numeric = Rc::clone(&info);
        engine.register_fn("log", move |x: INT, y: FLOAT| {
            numeric(&[Dynamic::from_int(x), Dynamic::from_float(y)])
        });
        let numeric = Rc::clone(&info);
        engine.register_fn("log", move |x: INT, y: INT| {
            numeric(&[Dynamic::from_int(x), Dynamic::from_int(y)])
        });

        let reporter = Rc::clone(&self.reporter);
        let error: Variadic<()> =
            Rc::new(move |args: &[Dynamic]| reporter.script_log(LogLevel::Error, args));
        register_variadic!(@each engine, "errorLog", error;
            [] a0 a1 a2 a3 a4 a5 a6 a7 a8 a9);

        let reporter = Rc::clone(&self.reporter);
        engine.on_print(move |text| reporter.script_text(LogLevel::Info, text));

        let reporter = Rc::clone(&self.reporter);
        engine.on_debug(move |text, _source, _pos| reporter.script_text(LogLevel::Info, text));
    }

    fn install_emit(&self, engine: &mut Engine) {
        let caps = self.clone();
        let emit: Variadic<Result<(), Box<EvalAltResult>>> =
            Rc::new(move |args: &[Dynamic]| caps.emit(args));
        register_variadic!(@each engine, "emit", emit;
            [index] v0 v1 v2 v3 v4 v5 v6 v7 v8 v9);
    }

    fn install_assist(&self, engine: &mut Engine) {
        let caps = self.clone();
        engine.register_fn("setInletAssistText", move |index: Dynamic, text: Dynamic| {
            caps.set_assist(PortKind::Inlet, &index, &text)
        });
        let caps = self.clone();
        engine.register_fn("setOutletAssistText", move |index: Dynamic, text: Dynamic| {
            caps.set_assist(PortKind::Outlet, &index, &text)
        });
    }

    /// Globals come from the variable resolver, which is consulted before the
    /// scope and also inside nested function calls. Resolved values are
    /// read-only unless shared, so only the count cells accept writes.
    fn install_resolver(&self, engine: &mut Engine) {
        let caps = self.clone();
        engine.on_var(move |name, _index, _context| match name {
            CONSTRUCTION_ARGUMENTS => Ok(Some(Dynamic::from(value::to_script_array(
                caps.arguments(),
            )))),
            ACTIVE_INLET => Ok(Some(Dynamic::from_int(
                caps.active_inlet().map_or(-1, |i| i as INT),
            ))),
            INLET_COUNT => Ok(Some(caps.count_accessor(PortKind::Inlet))),
            OUTLET_COUNT => Ok(Some(caps.count_accessor(PortKind::Outlet))),
            _ => Ok(None),
        });
    }

    fn count_accessor(&self, kind: PortKind) -> Dynamic {
        self.sync_count(kind);
        self.cell(kind).clone()
    }

    /// `emit(outlet, values...)`. Two or more marshalled values go out as one
    /// list; zero or one produce nothing.
    fn emit(&self, args: &[Dynamic]) -> Result<(), Box<EvalAltResult>> {
        let Some((index, values)) = args.split_first() else {
            return Err("bad index".into());
        };
        let outlet = {
            let ports = self.ports.borrow();
            port_index(index)
                .and_then(|i| ports.outlet(i))
                .ok_or_else(|| Box::<EvalAltResult>::from("bad index"))?
        };

        let values: Vec<TypedValue> = values.iter().filter_map(value::to_host).collect();
        if values.len() < 2 {
            return Ok(());
        }
        self.reporter.host().outlet_list(outlet, &values);
        Ok(())
    }

    fn set_assist(&self, kind: PortKind, index: &Dynamic, text: &Dynamic) {
        self.sync_count(kind);
        let result = match int_index(index) {
            Some(i) => self
                .ports
                .borrow_mut()
                .set_assist(kind, i, &value::stringify(text)),
            None => Err(BridgeError::BadArgument(format!(
                "{} assist index must be a number, got {}",
                kind.label().to_lowercase(),
                index.type_name()
            ))),
        };
        if let Err(err) = result {
            self.reporter.report(&err);
        }
    }
}

/// Integer or finite float (truncated toward zero).
fn int_index(value: &Dynamic) -> Option<i64> {
    if let Ok(i) = value.as_int() {
        return Some(i);
    }
    value
        .as_float()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

fn port_index(value: &Dynamic) -> Option<usize> {
    int_index(value).and_then(|i| usize::try_from(i).ok())
}

fn count_from(value: &Dynamic) -> Option<INT> {
    int_index(value)
}

fn count_name(kind: PortKind) -> &'static str {
    match kind {
        PortKind::Inlet => INLET_COUNT,
        PortKind::Outlet => OUTLET_COUNT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;

    fn setup(outlets: i64) -> (Rc<RecordingHost>, Capabilities, Engine) {
        let host = Rc::new(RecordingHost::new());
        let reporter = Rc::new(Reporter::new(host.clone(), 100));
        let ports = Rc::new(RefCell::new(PortReconfigurator::new()));
        {
            let mut ports = ports.borrow_mut();
            ports.open_window();
            ports.request(PortKind::Inlet, 2);
            ports.request(PortKind::Outlet, outlets);
            ports.commit(host.as_ref());
        }
        let caps = Capabilities::new(
            reporter,
            ports,
            vec![TypedValue::Int(1), TypedValue::Float(2.5), TypedValue::from("foo")],
        );
        let mut engine = Engine::new();
        caps.install(&mut engine);
        (host, caps, engine)
    }

    #[test]
    fn test_emit_two_values_sends_one_list() {
        let (host, _caps, engine) = setup(2);
        engine.run("emit(1, 1, \"two\");").unwrap();
        assert_eq!(
            host.messages(),
            vec![(1, vec![TypedValue::Int(1), TypedValue::from("two")])]
        );
    }

    #[test]
    fn test_emit_single_value_is_silent() {
        let (host, _caps, engine) = setup(1);
        engine.run("emit(0, 5); emit(0); emit(0, [1, 2]);").unwrap();
        assert!(host.messages().is_empty());
    }

    #[test]
    fn test_emit_skips_unmarshalable_values() {
        let (host, _caps, engine) = setup(1);
        engine.run("emit(0, 1, true, (), 2.5);").unwrap();
        assert_eq!(
            host.messages(),
            vec![(0, vec![TypedValue::Int(1), TypedValue::Float(2.5)])]
        );
    }

    #[test]
    fn test_emit_bad_index_throws() {
        let (host, _caps, engine) = setup(1);
        for script in ["emit(1, 1, 2);", "emit(-1, 1, 2);", "emit(\"x\", 1, 2);"] {
            let err = engine.run(script).unwrap_err();
            assert!(err.to_string().contains("bad index"), "{}", err);
        }
        assert!(host.messages().is_empty());

        // Scripts can catch it.
        engine
            .run("try { emit(9, 1, 2); } catch (e) { log(\"caught\"); }")
            .unwrap();
        assert_eq!(host.infos(), vec!["caught".to_string()]);
    }

    #[test]
    fn test_emit_float_index_truncates() {
        let (host, _caps, engine) = setup(2);
        engine.run("emit(1.9, 1, 2);").unwrap();
        assert_eq!(host.messages()[0].0, 1);
    }

    #[test]
    fn test_log_is_variadic() {
        let (host, _caps, engine) = setup(1);
        engine
            .run("log(); log(\"a\"); log(\"a\", 1, 2.5); errorLog(\"bad\", 3); print(\"p\");")
            .unwrap();
        assert_eq!(
            host.infos(),
            vec!["".to_string(), "a".to_string(), "a 1 2.5".to_string(), "p".to_string()]
        );
        assert_eq!(host.errors(), vec!["bad 3".to_string()]);
    }

    #[test]
    fn test_log_shadows_math_log() {
        let (host, _caps, engine) = setup(1);
        engine.run("log(2.5); log(10, 2);").unwrap();
        assert_eq!(host.infos(), vec!["2.5".to_string(), "10 2".to_string()]);
    }

    #[test]
    fn test_error_log_channel() {
        let (host, _caps, engine) = setup(1);
        engine.run("errorLog(\"bad\", 3);").unwrap();
        assert_eq!(host.errors(), vec!["bad 3".to_string()]);
    }

    #[test]
    fn test_construction_arguments_read_only() {
        let (_host, _caps, engine) = setup(1);
        let args: rhai::Array = engine.eval("constructionArguments").unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].as_int(), Ok(1));
        assert_eq!(args[1].as_float(), Ok(2.5));
        assert_eq!(args[2].clone().into_string().unwrap(), "foo");

        assert!(engine.run("constructionArguments = [];").is_err());
    }

    #[test]
    fn test_active_inlet_index() {
        let (_host, caps, engine) = setup(1);
        assert_eq!(engine.eval::<INT>("activeInletIndex").unwrap(), -1);
        caps.set_active_inlet(Some(1));
        assert_eq!(engine.eval::<INT>("fn f() { activeInletIndex } f()").unwrap(), 1);
    }

    #[test]
    fn test_counts_visible_in_functions() {
        let (_host, _caps, engine) = setup(3);
        assert_eq!(engine.eval::<INT>("fn f() { outletCount } f()").unwrap(), 3);
        assert_eq!(engine.eval::<INT>("inletCount").unwrap(), 2);
    }

    #[test]
    fn test_count_writes_reach_reconfigurator() {
        let (host, caps, engine) = setup(1);
        caps.ports().borrow_mut().open_window();
        engine.run("inletCount = 4; outletCount = 300;").unwrap();
        caps.sync_counts();

        assert!(caps.ports().borrow_mut().commit(host.as_ref()));
        assert_eq!(caps.committed(PortKind::Inlet), 4);
        assert_eq!(caps.committed(PortKind::Outlet), 250);
    }

    #[test]
    fn test_count_reads_return_clamped_request() {
        let (_host, caps, engine) = setup(1);
        caps.ports().borrow_mut().open_window();
        assert_eq!(engine.eval::<INT>("inletCount = 999; inletCount").unwrap(), 250);
        assert_eq!(engine.eval::<INT>("outletCount = -3; outletCount").unwrap(), 0);
        assert_eq!(engine.eval::<INT>("inletCount += 1; inletCount").unwrap(), 250);
        assert_eq!(caps.ports().borrow().effective_count(PortKind::Outlet), 0);
    }

    #[test]
    fn test_helper_functions_use_the_accessors() {
        let (host, caps, engine) = setup(1);
        caps.ports().borrow_mut().open_window();
        engine
            .run(
                "fn grow(n) { inletCount = n; }\n\
                 fn inlets() { inletCount }\n\
                 grow(3);\n\
                 log(inlets());",
            )
            .unwrap();
        assert_eq!(host.infos(), vec!["3".to_string()]);
        caps.sync_counts();
        caps.ports().borrow_mut().commit(host.as_ref());
        assert_eq!(host.inlet_count(), 3);
    }

    #[test]
    fn test_assist_text_for_port_requested_earlier() {
        let (host, caps, engine) = setup(1);
        caps.ports().borrow_mut().open_window();
        engine
            .run("outletCount = 3; setOutletAssistText(2, \"third\");")
            .unwrap();
        assert!(host.errors().is_empty());
        caps.sync_counts();
        caps.ports().borrow_mut().commit(host.as_ref());
        assert_eq!(caps.ports().borrow().assist(PortKind::Outlet, 2), Some("third"));
    }

    #[test]
    fn test_count_writes_outside_window_are_discarded() {
        let (_host, caps, engine) = setup(1);
        assert_eq!(engine.eval::<INT>("inletCount = 7; inletCount").unwrap(), 2);
        assert_eq!(caps.committed(PortKind::Inlet), 2);
    }

    #[test]
    fn test_non_numeric_count_is_reported() {
        let (host, caps, engine) = setup(1);
        caps.ports().borrow_mut().open_window();
        engine.run("inletCount = \"many\"; outletCount = 0.0 / 0.0;").unwrap();
        caps.sync_counts();
        assert_eq!(host.errors().len(), 2);
        assert_eq!(caps.ports().borrow().effective_count(PortKind::Inlet), 2);
        assert_eq!(caps.ports().borrow().effective_count(PortKind::Outlet), 1);
    }

    #[test]
    fn test_emit_non_finite_index_throws() {
        let (host, _caps, engine) = setup(1);
        for script in ["emit(0.0 / 0.0, 1, 2);", "emit(1.0 / 0.0, 1, 2);"] {
            let err = engine.run(script).unwrap_err();
            assert!(err.to_string().contains("bad index"), "{}", err);
        }
        assert!(host.messages().is_empty());
    }

    #[test]
    fn test_assist_text_out_of_range_is_reported() {
        let (host, caps, engine) = setup(1);
        engine
            .run("setInletAssistText(0, \"left\"); setOutletAssistText(5, \"nope\");")
            .unwrap();
        assert_eq!(caps.ports().borrow().assist(PortKind::Inlet, 0), Some("left"));
        assert_eq!(host.errors().len(), 1);
        assert!(host.errors()[0].contains("bad argument"));
    }
}
