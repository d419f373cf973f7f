use std::{
    any::{type_name, Any},
    fmt,
    sync::Arc,
};

use crate::errors::{DIError, DIResult};

/// Ordered runtime values handed to a definition factory.
///
/// Values are consumed positionally: `ctx.param::<u32>(0)` reads the first one.
#[derive(Clone, Default)]
pub struct Parameters {
    values: Vec<Arc<dyn Any + Send + Sync>>,
}

impl Parameters {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    pub fn push<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.push(Arc::new(value));
    }

    pub fn get<T: Any + Clone>(&self, index: usize) -> DIResult<T> {
        let value = self.values.get(index).ok_or_else(|| DIError::ParameterMissing {
            index,
            expected: type_name::<T>().to_string(),
        })?;

        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| DIError::ParameterTypeMismatch {
                index,
                expected: type_name::<T>().to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Build `Parameters` from a list of values: `parameters_of![42u32, "id"]`
#[macro_export]
macro_rules! parameters_of {
    () => {
        $crate::Parameters::empty()
    };
    ($($value:expr),+ $(,)?) => {{
        let mut parameters = $crate::Parameters::empty();
        $(parameters.push($value);)+
        parameters
    }};
}
