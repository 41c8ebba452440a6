pub mod build;
pub mod library;
pub mod patterns;
pub mod validate;

pub use build::*;
pub use library::*;
pub use patterns::*;
pub use validate::*;
