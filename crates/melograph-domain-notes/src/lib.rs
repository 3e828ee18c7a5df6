pub mod formatter;
pub mod pitch;
pub mod segmenter;

pub use formatter::*;
pub use pitch::*;
pub use segmenter::*;
