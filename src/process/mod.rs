//! Process control: tree termination and the per-session panic signal

pub mod panic;
pub mod tree;

pub use panic::{PanicReport, PanicSignal};
pub use tree::{collect_tree, kill_tree};
