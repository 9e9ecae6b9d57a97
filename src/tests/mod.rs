#[cfg(test)]
pub mod common;

mod manager_lifecycle;
