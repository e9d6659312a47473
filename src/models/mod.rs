pub mod address;
pub mod enums;
pub mod field;
pub mod record;

pub use address::*;
pub use enums::*;
pub use field::*;
pub use record::*;
