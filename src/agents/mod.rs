//! Reference agent implementations.

mod simple_ai;

pub use simple_ai::SimpleAi;
