//! The symbolic translation registry.
//!
//! A typed map from operator name to translation function, built once at
//! first use and queried by exact-match lookup. Generic tensor operators and
//! structural primitives have separate tables; both are openly extensible
//! through `register_*` for embedders with custom operators.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::translate::symbolic::{self, SymbolicFn};

pub struct SymbolicRegistry {
    tensor_ops: HashMap<&'static str, SymbolicFn>,
    structural_ops: HashMap<&'static str, SymbolicFn>,
}

impl SymbolicRegistry {
    /// The registry with every translation function this crate ships.
    pub fn standard() -> SymbolicRegistry {
        let mut registry = SymbolicRegistry {
            tensor_ops: HashMap::new(),
            structural_ops: HashMap::new(),
        };
        symbolic::register_standard(&mut registry);
        registry
    }

    pub fn register_tensor_op(&mut self, name: &'static str, f: SymbolicFn) {
        self.tensor_ops.insert(name, f);
    }

    pub fn register_structural_op(&mut self, name: &'static str, f: SymbolicFn) {
        self.structural_ops.insert(name, f);
    }

    pub fn tensor_op(&self, name: &str) -> Option<SymbolicFn> {
        self.tensor_ops.get(name).copied()
    }

    pub fn structural_op(&self, name: &str) -> Option<SymbolicFn> {
        self.structural_ops.get(name).copied()
    }
}

/// The process-wide standard registry.
pub fn standard() -> &'static SymbolicRegistry {
    static REGISTRY: OnceLock<SymbolicRegistry> = OnceLock::new();
    REGISTRY.get_or_init(SymbolicRegistry::standard)
}
