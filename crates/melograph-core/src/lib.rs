pub mod analysis;
pub mod clock;
pub mod config;
pub mod ipc;
pub mod scheduler;
pub mod session;

pub use analysis::*;
pub use clock::*;
pub use config::*;
pub use ipc::*;
pub use scheduler::*;
pub use session::*;
