pub mod claim;
pub mod common;
pub mod export;
pub mod intent;
pub mod scalar;

pub use claim::*;
pub use common::*;
pub use export::*;
pub use intent::*;
pub use scalar::*;
