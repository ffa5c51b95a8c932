pub mod panic;
pub mod shutdown;
