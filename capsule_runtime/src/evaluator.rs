//! Code evaluation seam.
//!
//! The runtime never interprets source text itself. An [`Evaluator`] turns
//! `(source, name)` into an export object, given the sandbox scope it may
//! read capabilities from. It must be deterministic with respect to what it
//! observes through that scope: replay depends on it.

use std::collections::BTreeMap;
use std::rc::Rc;

use capsule_membrane::{MembraneError, ObjectRef, Value};

pub trait Evaluator {
    /// Evaluate `source` as a module called `name` with `scope` as its
    /// global, returning the module's exports.
    fn evaluate(&self, source: &str, name: &str, scope: &ObjectRef)
        -> Result<Value, MembraneError>;
}

/// Yields a fresh evaluator for every sandbox, original or restored.
pub type EvaluatorFactory = Rc<dyn Fn() -> Rc<dyn Evaluator>>;

/// Builds a module's exports from its scope.
pub type ModuleBuilder = Rc<dyn Fn(&ObjectRef) -> Result<Value, MembraneError>>;

/// Evaluator whose "modules" are native closures keyed by source text.
///
/// Each builder is a pure function of the scope, so a restored sandbox
/// rebuilds the same exports as the original.
#[derive(Clone, Default)]
pub struct NativeModuleEvaluator {
    modules: BTreeMap<String, ModuleBuilder>,
}

impl NativeModuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, source: &str, builder: F) -> Self
    where
        F: Fn(&ObjectRef) -> Result<Value, MembraneError> + 'static,
    {
        self.modules.insert(source.to_string(), Rc::new(builder));
        self
    }

    /// Factory handing out a clone of this module table per sandbox.
    pub fn factory(self) -> EvaluatorFactory {
        Rc::new(move || Rc::new(self.clone()) as Rc<dyn Evaluator>)
    }
}

impl Evaluator for NativeModuleEvaluator {
    fn evaluate(
        &self,
        source: &str,
        name: &str,
        scope: &ObjectRef,
    ) -> Result<Value, MembraneError> {
        let builder = self.modules.get(source).ok_or_else(|| {
            MembraneError::Fault(format!("module {name:?}: no evaluator for source {source:?}"))
        })?;
        builder(scope)
    }
}
