use dashmap::DashMap;
use std::sync::Arc;

/// Short display names for engine function identifiers.
#[derive(Default)]
pub struct FunctionNames {
    names: DashMap<String, String>,
}

impl FunctionNames {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, function_id: &str, display_name: &str) {
        self.names
            .insert(function_id.to_string(), display_name.to_string());
    }

    /// Display name, or the raw ID for unknown functions.
    pub fn display_name(&self, function_id: &str) -> String {
        self.names
            .get(function_id)
            .map(|name| name.value().clone())
            .unwrap_or_else(|| function_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_function_falls_back_to_id() {
        let names = FunctionNames::new();
        names.register("fn-1", "Black-Scholes PV");
        assert_eq!(names.display_name("fn-1"), "Black-Scholes PV");
        assert_eq!(names.display_name("fn-2"), "fn-2");
    }
}
