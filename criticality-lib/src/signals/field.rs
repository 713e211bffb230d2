use super::Value;

/// A signal field that is either unset or holds a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field<T>(Option<T>);

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Field<T> {
    pub fn set(&mut self, value: T) {
        self.0 = Some(value);
    }

    pub fn unset(&mut self) {
        self.0 = None;
    }

    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.0.is_some()
    }

    #[must_use]
    pub const fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }
}

impl<T: Clone + Into<Value>> Field<T> {
    /// The field's value, or `None` if unset.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.0.clone().map(Into::into)
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        Self(value)
    }
}
