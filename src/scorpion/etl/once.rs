use std::cell::OnceCell;
use std::fmt;

use crate::scorpion::etl::error::{EtlError, Result};

/// A named cell that accepts exactly one assignment.
///
/// Reading before the assignment and assigning a second time are both
/// errors, so owners can hold configuration that is loaded once per run
/// without resorting to `Option` juggling at every call site.
pub struct SetOnce<T> {
    name: &'static str,
    value: OnceCell<T>,
}

impl<T> SetOnce<T> {
    /// Creates an empty cell. `name` appears in error messages.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: OnceCell::new(),
        }
    }

    /// Stores `value`, failing if the cell already holds one.
    pub fn set(&self, value: T) -> Result<()> {
        self.value
            .set(value)
            .map_err(|_| EtlError::AlreadySet { name: self.name })
    }

    /// Returns the stored value, failing if nothing was assigned yet.
    pub fn get(&self) -> Result<&T> {
        self.value.get().ok_or(EtlError::NotSet { name: self.name })
    }

    pub fn is_set(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Consumes the cell and returns the stored value.
    pub fn into_inner(self) -> Result<T> {
        let name = self.name;
        self.value.into_inner().ok_or(EtlError::NotSet { name })
    }
}

impl<T: fmt::Debug> fmt::Debug for SetOnce<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetOnce")
            .field("name", &self.name)
            .field("value", &self.value.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_before_set_fails() {
        let cell: SetOnce<u32> = SetOnce::new("answer");
        let err = cell.get().unwrap_err();
        assert!(matches!(err, EtlError::NotSet { name: "answer" }));
        assert!(!cell.is_set());
    }

    #[test]
    fn second_set_fails_and_keeps_first_value() {
        let cell = SetOnce::new("answer");
        cell.set(42).unwrap();
        let err = cell.set(7).unwrap_err();
        assert!(matches!(err, EtlError::AlreadySet { name: "answer" }));
        assert_eq!(*cell.get().unwrap(), 42);
    }

    #[test]
    fn into_inner_returns_value() {
        let cell = SetOnce::new("names");
        cell.set(vec!["a".to_string()]).unwrap();
        assert_eq!(cell.into_inner().unwrap(), vec!["a".to_string()]);
    }
}
