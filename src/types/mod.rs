pub mod compiled;
pub mod cycle;
pub mod portfolio;
pub mod target;
pub mod value;
pub mod viewport;

pub use compiled::*;
pub use cycle::*;
pub use portfolio::*;
pub use target::*;
pub use value::*;
pub use viewport::*;
