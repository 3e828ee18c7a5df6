pub mod audio;
pub mod notes;
pub mod pitch;
pub mod storage;
pub mod synth;
pub mod types;

pub use audio::*;
pub use notes::*;
pub use pitch::*;
pub use storage::*;
pub use synth::*;
pub use types::*;
