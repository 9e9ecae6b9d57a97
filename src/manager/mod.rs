pub mod manager;
pub mod scheduler;
pub mod state;

pub use manager::AutoManagedTokenManager;
pub use scheduler::{RefreshScheduler, RefreshSettings};
pub use state::ManagerState;
