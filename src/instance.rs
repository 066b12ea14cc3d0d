//! One live scripted object.
//!
//! An [`Instance`] owns the source buffer, the port table and the current
//! script engine. Every recompilation builds a fresh engine; the previous one
//! is disposed as soon as the new source parses, so two engines are never
//! installed in the same slot.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::capabilities::Capabilities;
use crate::dispatch::{Dispatcher, HostEvent};
use crate::engine::{EngineState, ScriptEngineInstance};
use crate::error::BridgeError;
use crate::host::{Host, PortKind};
use crate::platform::{Platform, PlatformLease};
use crate::ports::PortReconfigurator;
use crate::script_diagnostics::ScriptDiagnostic;
use crate::script_log::Reporter;
use crate::value::TypedValue;

/// Where the current source text came from.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub path: PathBuf,
    /// SHA-256 of the raw file contents, lowercase hex.
    pub digest: String,
    pub loaded_at: DateTime<Utc>,
}

/// Result of an editor save, so the editor can finish persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Compiled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Deferred {
    Read(String),
}

pub struct Instance {
    platform: Platform,
    host: Rc<dyn Host>,
    caps: Capabilities,
    engine: Option<ScriptEngineInstance>,
    source: String,
    source_info: Option<SourceInfo>,
    editor_open: bool,
    deferred: VecDeque<Deferred>,
    accepting: bool,
    // Declared last so it is released after everything above.
    _lease: PlatformLease,
}

impl Instance {
    /// Construct an instance with one inlet and one outlet. If the first
    /// argument is a symbol, a read of that source is scheduled.
    pub fn create(
        platform: &Platform,
        host: Rc<dyn Host>,
        args: Vec<TypedValue>,
    ) -> Result<Self, BridgeError> {
        let lease = platform.lease()?;

        let reporter = Rc::new(Reporter::new(
            Rc::clone(&host),
            platform.config().max_logs_per_call,
        ));
        let ports = Rc::new(RefCell::new(PortReconfigurator::new()));
        {
            let mut ports = ports.borrow_mut();
            ports.open_window();
            ports.request(PortKind::Inlet, 1);
            ports.request(PortKind::Outlet, 1);
            ports.commit(host.as_ref());
        }

        let autoload = args.first().and_then(TypedValue::as_symbol).map(str::to_string);
        let caps = Capabilities::new(reporter, ports, args);
        let engine = ScriptEngineInstance::build(platform, caps.clone());

        let mut instance = Self {
            platform: platform.clone(),
            host,
            caps,
            engine: Some(engine),
            source: String::new(),
            source_info: None,
            editor_open: false,
            deferred: VecDeque::new(),
            accepting: true,
            _lease: lease,
        };

        if let Some(name) = autoload {
            instance.deferred.push_back(Deferred::Read(name));
        }
        log::debug!(
            "instance created with {} argument(s)",
            instance.caps.arguments().len()
        );
        Ok(instance)
    }

    // ---- messages ----

    pub fn loadbang(&mut self) -> Option<TypedValue> {
        self.deliver(None, &HostEvent::LoadBang)
    }

    pub fn bang(&mut self, inlet: usize) -> Option<TypedValue> {
        self.deliver(Some(inlet), &HostEvent::Bang)
    }

    pub fn int(&mut self, inlet: usize, n: i64) -> Option<TypedValue> {
        self.deliver(Some(inlet), &HostEvent::Int(n))
    }

    pub fn float(&mut self, inlet: usize, x: f64) -> Option<TypedValue> {
        self.deliver(Some(inlet), &HostEvent::Float(x))
    }

    pub fn anything(&mut self, inlet: usize, selector: &str, args: &[TypedValue]) -> Option<TypedValue> {
        let event = HostEvent::Anything {
            selector: selector.to_string(),
            args: args.to_vec(),
        };
        self.deliver(Some(inlet), &event)
    }

    /// Deliver any event. `loadbang` is never tied to an inlet.
    pub fn dispatch(&mut self, inlet: usize, event: &HostEvent) -> Option<TypedValue> {
        let inlet = match event {
            HostEvent::LoadBang => None,
            _ => Some(inlet),
        };
        self.deliver(inlet, event)
    }

    fn deliver(&mut self, inlet: Option<usize>, event: &HostEvent) -> Option<TypedValue> {
        if !self.accepting {
            return None;
        }
        let engine = self.engine.as_mut()?;
        match Dispatcher::new(&self.caps).dispatch(engine, inlet, event) {
            Ok(value) => value,
            Err(err) => {
                self.caps.reporter().report(&err);
                None
            }
        }
    }

    // ---- administration ----

    /// Schedule a read of `name`. An empty name asks the host to pick a
    /// file; cancelling that dialog does nothing.
    pub fn compile(&mut self, name: &str) {
        let name = if name.is_empty() {
            match self.host.choose_source() {
                Some(chosen) => chosen,
                None => return,
            }
        } else {
            name.to_string()
        };
        self.deferred.push_back(Deferred::Read(name));
    }

    pub fn pending_tasks(&self) -> usize {
        self.deferred.len()
    }

    /// Run scheduled reads. The host calls this from its own task queue,
    /// never from inside a message handler. Returns the number of tasks run.
    pub fn run_deferred(&mut self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.deferred.pop_front() {
            ran += 1;
            match task {
                Deferred::Read(name) => match self.load(&name) {
                    Ok(status) => log::debug!("{}: loaded, {:?}", name, status),
                    Err(err) => self.caps.reporter().report(&err),
                },
            }
        }
        ran
    }

    /// Read `name` through the host, then recompile. Only acquisition errors
    /// are returned; compile and runtime errors are reported by the
    /// recompilation itself and show up as [`SaveStatus::Failed`].
    fn load(&mut self, name: &str) -> Result<SaveStatus, BridgeError> {
        let path = self
            .host
            .locate(name)
            .ok_or_else(|| BridgeError::NotFound(name.to_string()))?;
        let bytes = self
            .host
            .read_text(&path)
            .map_err(|source| BridgeError::Io {
                path: path.clone(),
                source,
            })?;

        self.source_info = Some(SourceInfo {
            name: name.to_string(),
            path,
            digest: format!("{:x}", Sha256::digest(&bytes)),
            loaded_at: Utc::now(),
        });
        self.caps.reporter().set_identity(name);
        self.source = String::from_utf8_lossy(&bytes).into_owned();

        Ok(self.recompile_status())
    }

    /// Build a fresh engine for the current buffer. On a parse error the
    /// previous engine stays installed and port counts are untouched.
    fn recompile(&mut self) -> Result<(), BridgeError> {
        let ports = Rc::clone(self.caps.ports());
        let mut candidate = ScriptEngineInstance::build(&self.platform, self.caps.clone());

        ports.borrow_mut().open_window();
        if let Err(err) = candidate.compile(&self.source) {
            ports.borrow_mut().abandon();
            candidate.dispose();
            if let Some(engine) = self.engine.as_mut() {
                if !engine.has_program() {
                    engine.mark_faulted();
                }
            }
            self.caps.reporter().report(&err);
            return Err(err);
        }

        if let Some(previous) = self.engine.take() {
            previous.dispose();
        }
        let result = candidate.run_top_level();
        ports.borrow_mut().commit(self.host.as_ref());
        self.caps.sync_counts();
        self.engine = Some(candidate);

        match result {
            Ok(()) => {
                log::info!(
                    "{}: compiled ({} inlet(s), {} outlet(s))",
                    self.identity(),
                    self.inlet_count(),
                    self.outlet_count()
                );
                Ok(())
            }
            Err(err) => {
                self.caps.reporter().report(&err);
                Err(err)
            }
        }
    }

    pub fn open_editor(&mut self) {
        self.editor_open = true;
        self.host.open_editor(&self.source, &self.identity());
    }

    /// Editor closed: keep the text, do not recompile.
    pub fn editor_closed(&mut self, text: &str) {
        self.source = text.to_string();
        self.editor_open = false;
    }

    /// Editor saved: keep the text and recompile it.
    pub fn editor_saved(&mut self, text: &str) -> SaveStatus {
        self.source = text.to_string();
        self.recompile_status()
    }

    /// Recompile the buffer; errors have already been reported when this
    /// returns `Failed`.
    fn recompile_status(&mut self) -> SaveStatus {
        match self.recompile() {
            Ok(()) => SaveStatus::Compiled,
            Err(_) => SaveStatus::Failed,
        }
    }

    pub fn is_editor_open(&self) -> bool {
        self.editor_open
    }

    // ---- introspection ----

    pub fn describe_port(&self, kind: PortKind, index: usize) -> String {
        match self.caps.ports().borrow().assist(kind, index) {
            Some(text) => text.to_string(),
            None => format!("{}: {} {}", self.identity(), kind.label(), index),
        }
    }

    pub fn identity(&self) -> String {
        self.caps.reporter().identity()
    }

    pub fn state(&self) -> EngineState {
        self.engine
            .as_ref()
            .map_or(EngineState::Built, ScriptEngineInstance::state)
    }

    pub fn inlet_count(&self) -> usize {
        self.caps.ports().borrow().inlet_count()
    }

    pub fn outlet_count(&self) -> usize {
        self.caps.ports().borrow().outlet_count()
    }

    pub fn arguments(&self) -> &[TypedValue] {
        self.caps.arguments()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn source_info(&self) -> Option<&SourceInfo> {
        self.source_info.as_ref()
    }

    pub fn take_diagnostics(&self) -> Vec<ScriptDiagnostic> {
        self.caps.reporter().take_diagnostics()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.accepting = false;
        if let Some(engine) = self.engine.take() {
            engine.dispose();
        }
        self.deferred.clear();
        self.source.clear();
        log::debug!("instance {} released", self.identity());
    }
}
