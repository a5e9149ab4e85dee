pub mod error_manager;
pub mod function_names;
pub mod results_cache;

pub use error_manager::{ErrorInfo, ErrorManager};
pub use function_names::FunctionNames;
pub use results_cache::{CachedEntity, CachedResult, ResultsCache};
