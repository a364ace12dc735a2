//! Progress and diagnostic events emitted during maintenance passes.
//!
//! Events flow over an optional crossbeam channel so a frontend can render
//! progress bars and warnings without the core blocking on a slow consumer.
//! All conditions reported here are expected-frequency and recoverable;
//! fatal resource exhaustion is additionally reflected in the assembly
//! outcome itself.

use crossbeam_channel::Sender;

/// Diagnostic event produced by the maintenance passes.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
  /// Fraction of the current assembly level completed, in `[0, 1]`.
  LevelProgress { level: u32, percent: f32 },

  /// Brick-pool memory consumed so far versus the configured budget.
  MemoryUsage {
    used_bytes: usize,
    budget_bytes: usize,
  },

  /// Human-readable warning for a recoverable data-quality condition.
  Warning(String),

  /// The pool-coordinate counter hit capacity; assembly stops at the
  /// current level boundary with a usable partial result. Emitted exactly
  /// once per run.
  PoolExhausted { level: u32, bricks_written: u32 },
}

/// Sending half of the event channel, as handed to the assembler.
pub type EventSender = Sender<ProgressEvent>;

/// Send an event if a sink is attached. A gone receiver is not an error.
pub(crate) fn emit(sink: Option<&EventSender>, event: ProgressEvent) {
  if let Some(sender) = sink {
    let _ = sender.send(event);
  }
}
