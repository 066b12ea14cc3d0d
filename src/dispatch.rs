//! Host events and their routing to script handlers.

use std::fmt;

use crate::capabilities::Capabilities;
use crate::engine::ScriptEngineInstance;
use crate::error::BridgeError;
use crate::value::TypedValue;

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    LoadBang,
    Bang,
    Int(i64),
    Float(f64),
    Anything { selector: String, args: Vec<TypedValue> },
}

impl HostEvent {
    /// Script function that handles this event.
    pub fn function_name(&self) -> &str {
        match self {
            HostEvent::LoadBang => "loadbang",
            HostEvent::Bang => "bang",
            HostEvent::Int(_) => "msg_int",
            HostEvent::Float(_) => "msg_float",
            HostEvent::Anything { selector, .. } => selector.as_str(),
        }
    }

    pub fn arguments(&self) -> Vec<TypedValue> {
        match self {
            HostEvent::LoadBang | HostEvent::Bang => Vec::new(),
            HostEvent::Int(n) => vec![TypedValue::Int(*n)],
            HostEvent::Float(x) => vec![TypedValue::Float(*x)],
            HostEvent::Anything { args, .. } => args.clone(),
        }
    }

    /// Build the event a message box would send for `atoms`: a lone number
    /// is a numeric message, `bang` is a trigger, a leading number with more
    /// atoms is a `list`, anything else is a named message.
    pub fn from_atoms(mut atoms: Vec<TypedValue>) -> Option<Self> {
        let first = atoms.first()?.clone();
        match (first, atoms.len()) {
            (TypedValue::Int(n), 1) => Some(HostEvent::Int(n)),
            (TypedValue::Float(x), 1) => Some(HostEvent::Float(x)),
            (TypedValue::Symbol(s), 1) if s == "bang" => Some(HostEvent::Bang),
            (TypedValue::Symbol(s), 1) if s == "loadbang" => Some(HostEvent::LoadBang),
            (TypedValue::Symbol(selector), _) => {
                atoms.remove(0);
                Some(HostEvent::Anything {
                    selector,
                    args: atoms,
                })
            }
            _ => Some(HostEvent::Anything {
                selector: "list".to_string(),
                args: atoms,
            }),
        }
    }

    /// Parse `[inlet:]selector args...`. Returns the inlet and the event.
    pub fn parse(line: &str) -> Result<(usize, Self), BridgeError> {
        let line = line.trim();
        let (inlet, rest) = match line.split_once(':') {
            Some((prefix, rest)) if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) => {
                let inlet = prefix
                    .parse::<usize>()
                    .map_err(|e| BridgeError::BadArgument(format!("inlet '{}': {}", prefix, e)))?;
                (inlet, rest)
            }
            _ => (0, line),
        };

        let atoms: Vec<TypedValue> = rest.split_whitespace().map(TypedValue::parse_atom).collect();
        let event = Self::from_atoms(atoms)
            .ok_or_else(|| BridgeError::BadArgument(format!("empty message '{}'", line)))?;
        Ok((inlet, event))
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())?;
        for arg in self.arguments() {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Routes events into one instance's engine.
pub struct Dispatcher<'a> {
    caps: &'a Capabilities,
}

impl<'a> Dispatcher<'a> {
    pub fn new(caps: &'a Capabilities) -> Self {
        Self { caps }
    }

    /// Invoke the handler for `event`. `inlet` is `None` for lifecycle
    /// signals, which have no delivering inlet. `activeInletIndex` is set
    /// only for the duration of the call.
    pub fn dispatch(
        &self,
        engine: &mut ScriptEngineInstance,
        inlet: Option<usize>,
        event: &HostEvent,
    ) -> Result<Option<TypedValue>, BridgeError> {
        if let Some(index) = inlet {
            let count = self.caps.ports().borrow().inlet_count();
            if index >= count {
                return Err(BridgeError::BadArgument(format!(
                    "inlet {} out of range (0..{})",
                    index, count
                )));
            }
        }

        self.caps.set_active_inlet(inlet);
        let result = engine.invoke(event.function_name(), &event.arguments());
        self.caps.set_active_inlet(None);
        result
    }
}
