pub mod gate;
pub mod retry;
