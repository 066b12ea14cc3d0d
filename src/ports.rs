//! Inlet/outlet topology of one instance.
//!
//! Scripts write `inletCount`/`outletCount`; the requests are only honoured
//! while a reconfiguration window is open (one compilation pass). Commit then
//! reconciles the handle lists with the host, removing from the highest index
//! down and appending upward.

use std::collections::BTreeMap;

use crate::error::BridgeError;
use crate::host::{Host, PortHandle, PortKind};

pub const MAX_PORTS: i64 = 250;

/// Clamp a requested count to the valid range for `kind`.
pub fn clamp_count(kind: PortKind, requested: i64) -> usize {
    let min = match kind {
        PortKind::Inlet => 1,
        PortKind::Outlet => 0,
    };
    requested.clamp(min, MAX_PORTS) as usize
}

#[derive(Debug, Default, Clone, Copy)]
struct Pending {
    inlets: Option<usize>,
    outlets: Option<usize>,
}

#[derive(Debug, Default)]
pub struct PortReconfigurator {
    inlets: Vec<PortHandle>,
    outlets: Vec<PortHandle>,
    inlet_assist: BTreeMap<usize, String>,
    outlet_assist: BTreeMap<usize, String>,
    window: Option<Pending>,
}

impl PortReconfigurator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: PortKind) -> usize {
        match kind {
            PortKind::Inlet => self.inlets.len(),
            PortKind::Outlet => self.outlets.len(),
        }
    }

    pub fn inlet_count(&self) -> usize {
        self.inlets.len()
    }

    pub fn outlet_count(&self) -> usize {
        self.outlets.len()
    }

    /// Count as it will be after the open window commits.
    pub fn effective_count(&self, kind: PortKind) -> usize {
        let pending = self.window.and_then(|pending| match kind {
            PortKind::Inlet => pending.inlets,
            PortKind::Outlet => pending.outlets,
        });
        pending.unwrap_or_else(|| self.count(kind))
    }

    pub fn outlet(&self, index: usize) -> Option<PortHandle> {
        self.outlets.get(index).copied()
    }

    pub fn is_window_open(&self) -> bool {
        self.window.is_some()
    }

    pub fn open_window(&mut self) {
        self.window = Some(Pending::default());
    }

    /// Drop the open window without touching the host.
    pub fn abandon(&mut self) {
        self.window = None;
    }

    /// Record a requested count. Returns the clamped value. Outside the window
    /// the request is accepted but has no effect.
    pub fn request(&mut self, kind: PortKind, requested: i64) -> usize {
        let count = clamp_count(kind, requested);
        match self.window.as_mut() {
            Some(pending) => match kind {
                PortKind::Inlet => pending.inlets = Some(count),
                PortKind::Outlet => pending.outlets = Some(count),
            },
            None => {
                log::debug!(
                    "ignoring {} count {} outside reconfiguration window",
                    kind.label().to_lowercase(),
                    requested
                );
            }
        }
        count
    }

    /// Close the window and apply the recorded counts to the host.
    /// Returns true if the topology changed.
    pub fn commit(&mut self, host: &dyn Host) -> bool {
        let Some(pending) = self.window.take() else {
            return false;
        };

        let inlet_target = pending.inlets.unwrap_or(self.inlets.len());
        let outlet_target = pending.outlets.unwrap_or(self.outlets.len());
        let changed = inlet_target != self.inlets.len() || outlet_target != self.outlets.len();

        if changed {
            host.begin_port_edit();

            while self.inlets.len() > inlet_target {
                let index = self.inlets.len() - 1;
                if let Some(handle) = self.inlets.pop() {
                    host.remove_inlet(index, handle);
                }
            }
            while self.inlets.len() < inlet_target {
                let handle = host.append_inlet(self.inlets.len());
                self.inlets.push(handle);
            }

            while self.outlets.len() > outlet_target {
                let index = self.outlets.len() - 1;
                if let Some(handle) = self.outlets.pop() {
                    host.remove_outlet(index, handle);
                }
            }
            while self.outlets.len() < outlet_target {
                let handle = host.append_outlet(self.outlets.len());
                self.outlets.push(handle);
            }

            host.end_port_edit();

            log::debug!(
                "committed ports: {} inlet(s), {} outlet(s)",
                self.inlets.len(),
                self.outlets.len()
            );
        }

        // Drops text of removed ports, and of ports that were requested
        // during the window and then requested away again.
        let (inlets, outlets) = (self.inlets.len(), self.outlets.len());
        self.inlet_assist.retain(|index, _| *index < inlets);
        self.outlet_assist.retain(|index, _| *index < outlets);

        changed
    }

    pub fn set_assist(&mut self, kind: PortKind, index: i64, text: &str) -> Result<(), BridgeError> {
        let count = self.effective_count(kind);
        if index < 0 || index as usize >= count {
            return Err(BridgeError::BadArgument(format!(
                "{} index {} out of range (0..{})",
                kind.label().to_lowercase(),
                index,
                count
            )));
        }
        let map = match kind {
            PortKind::Inlet => &mut self.inlet_assist,
            PortKind::Outlet => &mut self.outlet_assist,
        };
        map.insert(index as usize, text.to_string());
        Ok(())
    }

    pub fn assist(&self, kind: PortKind, index: usize) -> Option<&str> {
        let map = match kind {
            PortKind::Inlet => &self.inlet_assist,
            PortKind::Outlet => &self.outlet_assist,
        };
        map.get(&index).map(String::as_str)
    }
}
