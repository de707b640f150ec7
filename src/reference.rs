//! Model references and their resolution.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::snapshot;
use crate::store::BlobStore;
use crate::{Mlp, Result};

/// Name given to models trained without one.
pub const ANONYMOUS: &str = "Anonymous";

/// A live, named model handle.
#[derive(Debug, Clone)]
pub struct Predictor {
    pub name: String,
    pub model: Arc<Mlp>,
}

impl Predictor {
    pub fn new(name: impl Into<String>, model: Mlp) -> Self {
        Self {
            name: name.into(),
            model: Arc::new(model),
        }
    }

    #[inline]
    pub fn is_anonymous(&self) -> bool {
        self.name == ANONYMOUS
    }
}

/// Callback invoked with the model name when a named lookup finds nothing.
pub type OnMissing = Box<dyn Fn(&str) + Send + Sync>;

/// A model name plus an optional not-found callback.
pub struct NamedRef {
    pub name: String,
    pub on_missing: Option<OnMissing>,
}

impl NamedRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_missing: None,
        }
    }

    pub fn on_missing(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_missing = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for NamedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedRef")
            .field("name", &self.name)
            .field("on_missing", &self.on_missing.is_some())
            .finish()
    }
}

/// Which model an operation targets.
#[derive(Debug, Default)]
pub enum ModelRef {
    ByHandle(Predictor),
    ByName(NamedRef),
    /// The session's active model, if any.
    #[default]
    Implicit,
}

impl ModelRef {
    /// The referenced model name, when the reference carries one.
    pub fn name(&self) -> Option<&str> {
        match self {
            ModelRef::ByHandle(p) => Some(&p.name),
            ModelRef::ByName(n) => Some(&n.name),
            ModelRef::Implicit => None,
        }
    }
}

impl From<&str> for ModelRef {
    fn from(name: &str) -> Self {
        ModelRef::ByName(NamedRef::new(name))
    }
}

impl From<String> for ModelRef {
    fn from(name: String) -> Self {
        ModelRef::ByName(NamedRef::new(name))
    }
}

impl From<Predictor> for ModelRef {
    fn from(p: Predictor) -> Self {
        ModelRef::ByHandle(p)
    }
}

impl From<NamedRef> for ModelRef {
    fn from(n: NamedRef) -> Self {
        ModelRef::ByName(n)
    }
}

/// Resolve a reference to a live model.
///
/// Handles resolve without touching the store. Names are looked up in the
/// store; when absent, the callback runs and `None` is returned.
pub fn unpack(reference: &ModelRef, store: &dyn BlobStore) -> Result<Option<Predictor>> {
    match reference {
        ModelRef::Implicit => Ok(None),
        ModelRef::ByHandle(p) => Ok(Some(p.clone())),
        ModelRef::ByName(named) => match snapshot::load_model(store, &named.name)? {
            Some(model) => Ok(Some(Predictor::new(named.name.clone(), model))),
            None => {
                debug!(model = %named.name, "referenced model not found");
                if let Some(cb) = &named.on_missing {
                    cb(&named.name);
                }
                Ok(None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::MemoryStore;
    use crate::{Activation, MlpBuilder};

    fn model() -> Mlp {
        MlpBuilder::new(vec![1])
            .unwrap()
            .add_layer(1, Activation::Linear, true)
            .unwrap()
            .build_with_seed(0)
            .unwrap()
    }

    #[test]
    fn implicit_and_handles_skip_the_store() {
        let store = MemoryStore::new();
        assert!(unpack(&ModelRef::Implicit, &store).unwrap().is_none());

        let handle = Predictor::new("h", model());
        let got = unpack(&ModelRef::from(handle.clone()), &store)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&got.model, &handle.model));
    }

    #[test]
    fn names_hit_the_store_and_report_misses() {
        let store = MemoryStore::new();
        store
            .set(&snapshot::model_key("m"), model().to_json_string().unwrap())
            .unwrap();
        let got = unpack(&ModelRef::from("m"), &store).unwrap().unwrap();
        assert_eq!(got.name, "m");

        let misses = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&misses);
        let reference = ModelRef::from(NamedRef::new("missing").on_missing(move |name| {
            assert_eq!(name, "missing");
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(unpack(&reference, &store).unwrap().is_none());
        assert_eq!(misses.load(Ordering::SeqCst), 1);
    }
}
