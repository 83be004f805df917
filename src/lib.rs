//! Embeddable RV32IMA interpreter with a framebuffer VT100/VT52 terminal.
//!
//! [`Session`] is the entire public surface: `setup` once, `step` repeatedly
//! with a borrowed framebuffer and keyboard buffer, `cleanup` when done.

pub mod cpu;
pub mod cpustate;
pub mod debugger;
pub mod decode;
pub mod error;
pub mod framebuffer;
pub mod logfile;
pub mod mmio;
pub mod ram;
mod session;
pub mod terminal;
pub mod uart;

pub use error::SetupError;
pub use session::{Session, StepResult};
