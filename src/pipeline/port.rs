//! Port descriptors and the event type hierarchy.
//!
//! Each stage declares its ports (inputs/outputs) via static `PortDescriptor`
//! arrays. The pipeline uses these to validate connections at setup time and
//! to type-check events at emit time.
//!
//! ```text
//! Any
//! ├── MonitoringRecord
//! │   ├── OperationExecution
//! │   └── Branching
//! ├── ExecutionTrace
//! ├── OperationCall
//! └── Dataflow
//! ```

use std::fmt;

/// Runtime type of a [`PipelineEvent`](super::event::PipelineEvent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Any,
    MonitoringRecord,
    OperationExecution,
    Branching,
    ExecutionTrace,
    OperationCall,
    Dataflow,
}

impl EventType {
    pub fn parent(self) -> Option<EventType> {
        match self {
            EventType::Any => None,
            EventType::OperationExecution | EventType::Branching => Some(EventType::MonitoringRecord),
            EventType::MonitoringRecord
            | EventType::ExecutionTrace
            | EventType::OperationCall
            | EventType::Dataflow => Some(EventType::Any),
        }
    }

    /// Whether a value of type `other` may be delivered where `self` is expected.
    pub fn is_assignable_from(self, other: EventType) -> bool {
        let mut current = Some(other);
        while let Some(ty) = current {
            if ty == self {
                return true;
            }
            current = ty.parent();
        }
        false
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
        }
    }
}

/// Static descriptor for a stage's port.
///
/// An empty `event_types` slice means the port accepts any event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
    pub event_types: &'static [EventType],
}

impl PortDescriptor {
    pub const fn input(name: &'static str, event_types: &'static [EventType]) -> Self {
        Self {
            name,
            direction: PortDirection::Input,
            event_types,
        }
    }

    pub const fn output(name: &'static str, event_types: &'static [EventType]) -> Self {
        Self {
            name,
            direction: PortDirection::Output,
            event_types,
        }
    }

    pub fn accepts_any(&self) -> bool {
        self.event_types.is_empty()
    }

    /// Whether an event of runtime type `ty` matches one of this port's types.
    pub fn accepts(&self, ty: EventType) -> bool {
        self.accepts_any() || self.event_types.iter().any(|t| t.is_assignable_from(ty))
    }

    /// Connection rule from this output port to `input`.
    pub fn can_connect_to(&self, input: &PortDescriptor) -> bool {
        if input.accepts_any() {
            return true;
        }
        if self.event_types.is_empty() {
            return input.event_types.contains(&EventType::Any);
        }
        self.event_types
            .iter()
            .all(|out| input.event_types.iter().any(|inp| inp.is_assignable_from(*out)))
    }
}

/// Find a port by name and direction.
pub fn find_port<'a>(
    ports: &'a [PortDescriptor],
    name: &str,
    direction: PortDirection,
) -> Option<&'a PortDescriptor> {
    ports.iter().find(|p| p.name == name && p.direction == direction)
}
