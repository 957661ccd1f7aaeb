pub mod code;
pub mod enums;
pub mod procedure;

pub use code::*;
pub use procedure::*;
