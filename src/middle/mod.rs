//! Middle-end module - SIL, analyses and optimization

pub mod cfg;
pub mod dominance;
pub mod ir;
pub mod ir_printer;
pub mod loops;
pub mod optimize;
pub mod simplify_cfg;
pub mod ssa_updater;
pub mod verify;
