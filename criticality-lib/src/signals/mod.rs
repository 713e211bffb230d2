//! Tri-state, namespaced signal sets.
//!
//! A signal set is a fixed, ordered list of typed optional fields grouped under a namespace.
//! Each field is either unset (never collected) or holds an integer, float, string or timestamp.
//! Fields flagged as legacy are reported under the [`Namespace::LEGACY`] namespace instead of
//! their set's own, which keeps output columns compatible with older consumers.
//!
//! Sets are declared with the [`signal_set!`](crate::signal_set) macro, which generates the
//! struct and a static schema so that field names never have to be discovered at runtime.

mod field;
mod value;

pub use field::Field;
pub use value::Value;

use crate::Result;
use core::fmt::{Debug, Display, Formatter};
use ohno::bail;
use regex::Regex;
use std::sync::LazyLock;

static VALID_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new("^[a-z0-9_]+$").expect("valid name pattern"));

const NAME_SEPARATOR: char = '.';

/// A short lowercase identifier grouping related signal fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(&'static str);

impl Namespace {
    /// Namespace that legacy fields are reported under.
    pub const LEGACY: Self = Self("legacy");

    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.0)
    }
}

/// Static description of one field of a signal set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub legacy: bool,
}

/// A collection of signals for one repository.
pub trait SignalSet: Debug + Send + Sync {
    fn namespace(&self) -> Namespace;

    /// Field definitions in output order.
    fn schema(&self) -> &'static [FieldDef];

    /// Current field values, parallel to [`schema`](Self::schema).
    fn values(&self) -> Vec<Option<Value>>;
}

/// Check that a set's namespace and field names are valid identifiers.
pub fn validate_set(set: &dyn SignalSet) -> Result<()> {
    let namespace = set.namespace();
    if !VALID_NAME.is_match(namespace.as_str()) {
        bail!("namespace '{namespace}' contains invalid characters");
    }

    for def in set.schema() {
        if !VALID_NAME.is_match(def.name) {
            bail!("field name '{}' in namespace '{namespace}' contains invalid characters", def.name);
        }
    }

    Ok(())
}

/// The namespace a field is reported under.
#[must_use]
pub fn output_namespace(set: &dyn SignalSet, def: &FieldDef) -> Namespace {
    if def.legacy { Namespace::LEGACY } else { set.namespace() }
}

/// Namespace-qualified field names, e.g. `repo.star_count` or `legacy.created_since`.
#[must_use]
pub fn field_names(set: &dyn SignalSet) -> Vec<String> {
    set.schema()
        .iter()
        .map(|def| format!("{}{NAME_SEPARATOR}{}", output_namespace(set, def), def.name))
        .collect()
}

/// Pairs of qualified field name and value.
#[must_use]
pub fn as_map(set: &dyn SignalSet) -> Vec<(String, Option<Value>)> {
    field_names(set).into_iter().zip(set.values()).collect()
}

/// Declare a signal set struct and its schema.
///
/// Each field is a [`Field`] of the given type; appending `=> legacy` reports the field under
/// the legacy namespace.
///
/// ```ignore
/// signal_set! {
///     /// Signals about issues.
///     pub struct IssuesSet in "issues" {
///         updated_issues_count: i64 => legacy,
///     }
/// }
/// ```
#[macro_export]
macro_rules! signal_set {
    (@legacy) => { false };
    (@legacy legacy) => { true };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $namespace:literal {
            $( $field:ident : $ty:ty $(=> $tag:ident)? ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default)]
        $vis struct $name {
            $( pub $field: $crate::signals::Field<$ty>, )*
        }

        impl $name {
            pub const NAMESPACE: $crate::signals::Namespace = $crate::signals::Namespace::new($namespace);

            pub const SCHEMA: &'static [$crate::signals::FieldDef] = &[
                $( $crate::signals::FieldDef {
                    name: stringify!($field),
                    legacy: $crate::signal_set!(@legacy $($tag)?),
                }, )*
            ];
        }

        impl $crate::signals::SignalSet for $name {
            fn namespace(&self) -> $crate::signals::Namespace {
                Self::NAMESPACE
            }

            fn schema(&self) -> &'static [$crate::signals::FieldDef] {
                Self::SCHEMA
            }

            fn values(&self) -> Vec<Option<$crate::signals::Value>> {
                vec![ $( self.$field.value(), )* ]
            }
        }
    };
}
