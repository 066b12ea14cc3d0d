//! The host side of the bridge.
//!
//! A [`Host`] is whatever owns the visible object: it materialises ports,
//! receives outlet lists and console text, and resolves script files by name.
//! The bridge only talks to the host through this trait, so the same instance
//! code runs inside a patcher, the console runner, or a test.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::value::TypedValue;

/// Opaque handle for a materialised port. Only the host interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortHandle(u64);

impl PortHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Inlet,
    Outlet,
}

impl PortKind {
    pub fn label(self) -> &'static str {
        match self {
            PortKind::Inlet => "Inlet",
            PortKind::Outlet => "Outlet",
        }
    }
}

pub trait Host {
    /// Start a batch of port changes. Hosts typically freeze redraw here.
    fn begin_port_edit(&self) {}

    /// Finish a batch of port changes.
    fn end_port_edit(&self) {}

    fn append_inlet(&self, index: usize) -> PortHandle;

    fn remove_inlet(&self, index: usize, handle: PortHandle);

    fn append_outlet(&self, index: usize) -> PortHandle;

    fn remove_outlet(&self, index: usize, handle: PortHandle);

    /// Send a list out of an outlet.
    fn outlet_list(&self, outlet: PortHandle, values: &[TypedValue]);

    /// Informational console line.
    fn info(&self, message: &str);

    /// Error console line.
    fn error(&self, message: &str);

    /// Resolve a script name against the host's search path.
    fn locate(&self, name: &str) -> Option<PathBuf>;

    fn read_text(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    /// Ask the user for a script file. `None` means the dialog was cancelled.
    fn choose_source(&self) -> Option<String> {
        None
    }

    /// Show the source text in an editor window titled after the instance.
    fn open_editor(&self, _text: &str, _title: &str) {}
}

/// Bookkeeping for hosts that hand out sequential handles.
#[derive(Debug, Default)]
pub struct PortLedger {
    next: Cell<u64>,
    inlets: RefCell<Vec<PortHandle>>,
    outlets: RefCell<Vec<PortHandle>>,
}

impl PortLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&self) -> PortHandle {
        let raw = self.next.get() + 1;
        self.next.set(raw);
        PortHandle::new(raw)
    }

    pub fn append(&self, kind: PortKind) -> PortHandle {
        let handle = self.fresh();
        self.ports(kind).borrow_mut().push(handle);
        handle
    }

    pub fn remove(&self, kind: PortKind, handle: PortHandle) {
        self.ports(kind).borrow_mut().retain(|h| *h != handle);
    }

    /// Index of a live handle, in creation order.
    pub fn index_of(&self, kind: PortKind, handle: PortHandle) -> Option<usize> {
        self.ports(kind).borrow().iter().position(|h| *h == handle)
    }

    pub fn count(&self, kind: PortKind) -> usize {
        self.ports(kind).borrow().len()
    }

    fn ports(&self, kind: PortKind) -> &RefCell<Vec<PortHandle>> {
        match kind {
            PortKind::Inlet => &self.inlets,
            PortKind::Outlet => &self.outlets,
        }
    }
}

/// One call the bridge made into a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    BeginEdit,
    EndEdit,
    AppendInlet(usize),
    RemoveInlet(usize),
    AppendOutlet(usize),
    RemoveOutlet(usize),
}

/// In-memory host that records everything. Used by tests and doc checks.
#[derive(Debug, Default)]
pub struct RecordingHost {
    ledger: PortLedger,
    calls: RefCell<Vec<HostCall>>,
    messages: RefCell<Vec<(usize, Vec<TypedValue>)>>,
    infos: RefCell<Vec<String>>,
    errors: RefCell<Vec<String>>,
    sources: RefCell<HashMap<String, Vec<u8>>>,
    chosen: RefCell<Option<String>>,
    editors: RefCell<Vec<(String, String)>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` resolvable with the given contents.
    pub fn add_source(&self, name: &str, text: &str) {
        self.sources
            .borrow_mut()
            .insert(name.to_string(), text.as_bytes().to_vec());
    }

    pub fn add_source_bytes(&self, name: &str, bytes: Vec<u8>) {
        self.sources.borrow_mut().insert(name.to_string(), bytes);
    }

    /// Preset the answer of the next file dialog.
    pub fn set_chosen_source(&self, name: Option<&str>) {
        *self.chosen.borrow_mut() = name.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.borrow().clone()
    }

    pub fn messages(&self) -> Vec<(usize, Vec<TypedValue>)> {
        self.messages.borrow().clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.borrow().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    pub fn editors(&self) -> Vec<(String, String)> {
        self.editors.borrow().clone()
    }

    pub fn inlet_count(&self) -> usize {
        self.ledger.count(PortKind::Inlet)
    }

    pub fn outlet_count(&self) -> usize {
        self.ledger.count(PortKind::Outlet)
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
        self.messages.borrow_mut().clear();
        self.infos.borrow_mut().clear();
        self.errors.borrow_mut().clear();
    }
}

impl Host for RecordingHost {
    fn begin_port_edit(&self) {
        self.calls.borrow_mut().push(HostCall::BeginEdit);
    }

    fn end_port_edit(&self) {
        self.calls.borrow_mut().push(HostCall::EndEdit);
    }

    fn append_inlet(&self, index: usize) -> PortHandle {
        self.calls.borrow_mut().push(HostCall::AppendInlet(index));
        self.ledger.append(PortKind::Inlet)
    }

    fn remove_inlet(&self, index: usize, handle: PortHandle) {
        self.calls.borrow_mut().push(HostCall::RemoveInlet(index));
        self.ledger.remove(PortKind::Inlet, handle);
    }

    fn append_outlet(&self, index: usize) -> PortHandle {
        self.calls.borrow_mut().push(HostCall::AppendOutlet(index));
        self.ledger.append(PortKind::Outlet)
    }

    fn remove_outlet(&self, index: usize, handle: PortHandle) {
        self.calls.borrow_mut().push(HostCall::RemoveOutlet(index));
        self.ledger.remove(PortKind::Outlet, handle);
    }

    fn outlet_list(&self, outlet: PortHandle, values: &[TypedValue]) {
        let index = self
            .ledger
            .index_of(PortKind::Outlet, outlet)
            .unwrap_or(usize::MAX);
        self.messages.borrow_mut().push((index, values.to_vec()));
    }

    fn info(&self, message: &str) {
        self.infos.borrow_mut().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        if self.sources.borrow().contains_key(name) {
            Some(PathBuf::from(name))
        } else {
            None
        }
    }

    fn read_text(&self, path: &Path) -> io::Result<Vec<u8>> {
        let key = path.to_string_lossy();
        self.sources
            .borrow()
            .get(key.as_ref())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "not recorded"))
    }

    fn choose_source(&self) -> Option<String> {
        self.chosen.borrow_mut().take()
    }

    fn open_editor(&self, text: &str, title: &str) {
        self.editors
            .borrow_mut()
            .push((title.to_string(), text.to_string()));
    }
}
