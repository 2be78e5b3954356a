//! Provider traits for dependency injection
//!
//! [`Injectable`] bounds every concrete component type, and [`InjectCell`] is
//! the slot components use for members wired after construction.

use crate::DiError;
use once_cell::sync::OnceCell;
use std::fmt;

/// Marker trait for types that can be managed by the container.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
pub trait Injectable: Send + Sync + 'static {}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// A set-once slot for a member that is wired after construction.
///
/// Components are shared behind `Arc` before the injection phase runs, so
/// field and setter injection cannot take `&mut self`. Declaring such members
/// as `InjectCell` lets the injection engine fill them through `&self`, which
/// is what makes property-level cycles possible.
///
/// # Examples
///
/// ```rust
/// use bean_context::InjectCell;
/// use std::sync::Arc;
///
/// struct Greeter {
///     prefix: InjectCell<String>,
/// }
///
/// let greeter = Greeter { prefix: InjectCell::new() };
/// greeter.prefix.set("Hello".to_string()).unwrap();
/// assert_eq!(greeter.prefix.get().map(String::as_str), Some("Hello"));
/// assert!(greeter.prefix.set("again".to_string()).is_err());
/// ```
pub struct InjectCell<T> {
    cell: OnceCell<T>,
}

impl<T> InjectCell<T> {
    /// Create an empty cell
    #[inline]
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Store the injected value. Fails if the member was already wired.
    pub fn set(&self, value: T) -> Result<(), DiError> {
        self.cell.set(value).map_err(|_| {
            DiError::invalid(
                std::any::type_name::<T>(),
                "member was injected more than once",
            )
        })
    }

    /// Get the injected value, if any
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Get the injected value or fail with a descriptive error
    pub fn required(&self, member: &str) -> Result<&T, DiError> {
        self.cell.get().ok_or_else(|| DiError::NoSuchDefinition {
            what: format!("for member '{member}': not injected yet"),
        })
    }

    /// Whether the member has been wired
    #[inline]
    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T> Default for InjectCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for InjectCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("InjectCell").field(value).finish(),
            None => f.write_str("InjectCell(<unset>)"),
        }
    }
}
