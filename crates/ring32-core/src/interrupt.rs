//! Interrupt line state machine and delivery policy.
//!
//! Lines move `Idle → Pending → Queued | Dispatching → Idle`. Nothing here
//! runs asynchronously: the execution engine calls [`InterruptController::latch`]
//! and [`InterruptController::service_next`] once per instruction boundary.

use thiserror::Error;

use crate::memory::PhysicalMemory;
use crate::state::FlagSet;
use crate::{FaultCode, Machine};

/// Number of maskable interrupt lines.
pub const INTERRUPT_LINE_COUNT: usize = 8;

/// Delivery state of one maskable line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum LineState {
    /// Nothing raised.
    #[default]
    Idle,
    /// Raised since the last boundary.
    Pending,
    /// Raised while masked; waits for its mask bit.
    Queued,
    /// Eligible to fire at this boundary.
    Dispatching,
}

/// Source selected by [`InterruptController::service_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InterruptSource {
    /// Non-maskable fault trigger.
    Fault(FaultCode),
    /// Maskable line `0..=7`.
    Line(u8),
}

/// Last-Interrupt ids written to `LLL` when a fault is serviced.
///
/// The defaults (0, 1, 2) share `LLL` values with lines 0 to 2, so a guest
/// reading `LLL` alone cannot tell a fault from a line. Hosts disambiguate
/// through [`InterruptSource`]; guests that need it can be given ids that no
/// wired line uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FaultInterruptIds {
    /// Id for [`FaultCode::PageFault`].
    pub page_fault: u8,
    /// Id for [`FaultCode::ProtectionFault`].
    pub protection_fault: u8,
    /// Id for [`FaultCode::PrivilegeFault`].
    pub privilege_fault: u8,
}

impl Default for FaultInterruptIds {
    fn default() -> Self {
        Self {
            page_fault: 0,
            protection_fault: 1,
            privilege_fault: 2,
        }
    }
}

impl FaultInterruptIds {
    /// Id for `fault`, or `None` for faults never delivered as interrupts.
    #[must_use]
    pub const fn id_for(&self, fault: FaultCode) -> Option<u8> {
        match fault {
            FaultCode::PageFault => Some(self.page_fault & 0x7),
            FaultCode::ProtectionFault => Some(self.protection_fault & 0x7),
            FaultCode::PrivilegeFault => Some(self.privilege_fault & 0x7),
            FaultCode::InvalidOpcode => None,
        }
    }
}

/// Host-side misuse of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum InterruptError {
    /// Line number outside `0..8`.
    #[error("interrupt line {line} is out of range")]
    LineOutOfRange {
        /// Requested line.
        line: u8,
    },
    /// Fault that is reported to the host rather than delivered.
    #[error("{0} is not delivered as an interrupt")]
    NotDeliverable(FaultCode),
}

/// Pending/queued interrupt tracking for 8 maskable lines plus the
/// non-maskable fault trigger.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct InterruptController {
    lines: [LineState; INTERRUPT_LINE_COUNT],
    pending_fault: Option<FaultCode>,
    last_serviced: Option<InterruptSource>,
    ids: FaultInterruptIds,
}

impl InterruptController {
    /// Controller using `ids` for fault Last-Interrupt values.
    #[must_use]
    pub fn new(ids: FaultInterruptIds) -> Self {
        Self {
            ids,
            ..Self::default()
        }
    }

    /// Raises maskable line `line`. Raising a line that is already waiting
    /// has no further effect.
    ///
    /// # Errors
    ///
    /// Returns [`InterruptError::LineOutOfRange`] for `line >= 8`.
    pub fn raise(&mut self, line: u8) -> Result<(), InterruptError> {
        let state = self
            .lines
            .get_mut(usize::from(line))
            .ok_or(InterruptError::LineOutOfRange { line })?;
        if *state == LineState::Idle {
            *state = LineState::Pending;
        }
        Ok(())
    }

    /// Records a non-maskable fault trigger. Only the first fault before the
    /// next service is kept.
    ///
    /// # Errors
    ///
    /// Returns [`InterruptError::NotDeliverable`] for
    /// [`FaultCode::InvalidOpcode`].
    pub fn raise_fault(&mut self, fault: FaultCode) -> Result<(), InterruptError> {
        if !fault.is_interrupt() {
            return Err(InterruptError::NotDeliverable(fault));
        }
        if self.pending_fault.is_none() {
            self.pending_fault = Some(fault);
        }
        Ok(())
    }

    /// Re-evaluates every waiting line against `gate` (bit `i` set = line
    /// `i` may fire).
    pub fn latch(&mut self, gate: u8) {
        for (line, state) in self.lines.iter_mut().enumerate() {
            if *state == LineState::Idle {
                continue;
            }
            *state = if gate & (1 << line) != 0 {
                LineState::Dispatching
            } else {
                LineState::Queued
            };
        }
    }

    /// Picks the next source to fire, returns it to `Idle` and writes its
    /// Last-Interrupt id into `flags`.
    ///
    /// A pending fault always wins; otherwise the lowest dispatching line.
    pub fn service_next(&mut self, flags: &mut FlagSet) -> Option<InterruptSource> {
        let (source, id) = if let Some(fault) = self.pending_fault.take() {
            (InterruptSource::Fault(fault), self.ids.id_for(fault)?)
        } else {
            let line = self
                .lines
                .iter()
                .position(|state| *state == LineState::Dispatching)?;
            self.lines[line] = LineState::Idle;
            let line = u8::try_from(line).ok()?;
            (InterruptSource::Line(line), line)
        };

        flags.last_interrupt = id;
        self.last_serviced = Some(source);
        Some(source)
    }

    /// Current state of `line`.
    #[must_use]
    pub fn line_state(&self, line: u8) -> Option<LineState> {
        self.lines.get(usize::from(line)).copied()
    }

    /// Fault waiting to be serviced, if any.
    #[must_use]
    pub const fn pending_fault(&self) -> Option<FaultCode> {
        self.pending_fault
    }

    /// Returns `true` when any line or fault is waiting.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_fault.is_some() || self.lines.iter().any(|state| *state != LineState::Idle)
    }

    /// Most recently serviced source.
    #[must_use]
    pub const fn last_serviced(&self) -> Option<InterruptSource> {
        self.last_serviced
    }

    /// Last-Interrupt id configuration.
    #[must_use]
    pub const fn fault_ids(&self) -> &FaultInterruptIds {
        &self.ids
    }

    /// Drops every waiting source.
    pub fn reset(&mut self) {
        *self = Self::new(self.ids);
    }
}

/// Control-transfer convention applied when a source fires.
///
/// The architecture does not fix a vectoring scheme; hosts plug one in here.
pub trait InterruptEntry {
    /// Transfers control for `source`. Runs after `LLL` has been written
    /// and with `machine` already resumed from a halt.
    fn enter(
        &mut self,
        machine: &mut Machine,
        memory: &mut dyn PhysicalMemory,
        source: InterruptSource,
    );
}

/// Leaves registers untouched; the host reacts to the reported source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HostEntry;

impl InterruptEntry for HostEntry {
    fn enter(
        &mut self,
        _machine: &mut Machine,
        _memory: &mut dyn PhysicalMemory,
        _source: InterruptSource,
    ) {
    }
}
