//! Output decision mapping.
//!
//! The queued vehicle selects one of a small set of symbolic outputs. The
//! latch remembers the last applied vehicle so the actuator is only touched
//! when the decision changes.

use std::fmt;

use anyhow::Result;
use tracing::info;

use crate::queuing::NONE_LABEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolicOutput {
    Car,
    Motorbike,
    /// Idle / fail-safe channel. Secondary channels off, default on.
    Default,
}

impl SymbolicOutput {
    pub const ALL: [SymbolicOutput; 3] = [SymbolicOutput::Car, SymbolicOutput::Motorbike, SymbolicOutput::Default];

    pub fn for_vehicle(vehicle: Option<&str>) -> Self {
        match vehicle {
            Some("car") => SymbolicOutput::Car,
            Some("motorbike") => SymbolicOutput::Motorbike,
            _ => SymbolicOutput::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolicOutput::Car => "car",
            SymbolicOutput::Motorbike => "motorbike",
            SymbolicOutput::Default => "default",
        }
    }
}

impl fmt::Display for SymbolicOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical (or simulated) output channels.
///
/// `activate` must leave exactly one channel active: implementations switch
/// every other channel off before switching the requested one on.
pub trait ActuationChannel {
    fn activate(&mut self, output: SymbolicOutput) -> Result<()>;
    fn deactivate_all(&mut self) -> Result<()>;
}

impl<A: ActuationChannel + ?Sized> ActuationChannel for Box<A> {
    fn activate(&mut self, output: SymbolicOutput) -> Result<()> {
        (**self).activate(output)
    }

    fn deactivate_all(&mut self) -> Result<()> {
        (**self).deactivate_all()
    }
}

/// `Some(output)` only when the decision changed.
pub fn decide(current: Option<&str>, previous: Option<&str>) -> Option<SymbolicOutput> {
    if current == previous {
        None
    } else {
        Some(SymbolicOutput::for_vehicle(current))
    }
}

/// Edge-triggered output state, owned by the processing loop.
#[derive(Debug, Clone, Default)]
pub struct OutputLatch {
    previous: Option<String>,
    activations: u64,
}

impl OutputLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// Actuate if `current` differs from the last applied vehicle. Returns
    /// the output that was activated, if any.
    pub fn apply<A>(&mut self, current: Option<&str>, actuator: &mut A) -> Result<Option<SymbolicOutput>>
    where
        A: ActuationChannel + ?Sized,
    {
        let Some(output) = decide(current, self.previous.as_deref()) else {
            return Ok(None);
        };

        actuator.activate(output)?;
        info!(
            "Output {} -> {} (vehicle: {})",
            SymbolicOutput::for_vehicle(self.previous.as_deref()),
            output,
            current.unwrap_or(NONE_LABEL)
        );
        self.previous = current.map(str::to_string);
        self.activations += 1;
        Ok(Some(output))
    }

    /// Drive the fail-safe output regardless of the latch.
    pub fn reset_to_safe<A>(&mut self, actuator: &mut A) -> Result<()>
    where
        A: ActuationChannel + ?Sized,
    {
        actuator.activate(SymbolicOutput::Default)?;
        self.previous = None;
        Ok(())
    }
}
