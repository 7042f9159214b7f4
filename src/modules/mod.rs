pub mod action;
pub mod brain;
pub mod evaluation;
pub mod intake;
pub mod memory;
