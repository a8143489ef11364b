//! Execution engine: the lifecycle controller and the external program
//! executor it drives.

pub mod control;
pub mod exec;

pub use control::{ControlConfig, Controller, Iteration, RunMode, RunStatus};
pub use exec::{ExecConfig, ExecutionFailure, ExecutionOutcome, Executor, ProcessExecutor};
