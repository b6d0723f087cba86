//! Schema layer: packages, classes, enumerations and features.
//!
//! ```text
//! Package ── classifiers ──┬── Class ── features ── Feature
//!    │                     │     └── supertypes        ├── attribute: ValueType
//!    └── subpackages       └── Enumeration              └── reference: Class,
//!                                 └── EnumLiteral            containment, opposite
//! ```
//!
//! Schema elements are process-wide handles into a shared arena (see
//! [`arena`]). They are `Copy`, compare by identity and can be used from any
//! thread. Definitions are append-only: elements are never removed, which
//! keeps every handle valid for the lifetime of the process.

pub(crate) mod arena;
mod class;
pub mod ecore;
mod enumeration;
mod feature;
mod package;

use std::fmt;

use thiserror::Error;

use crate::base::Name;

pub use class::Class;
pub use ecore::Ecore;
pub use enumeration::{EnumLiteral, Enumeration};
pub use feature::Feature;
pub use package::Package;

/// Errors raised while defining schema elements.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("feature '{feature}' conflicts with an existing feature of class '{class}'")]
    Conflict { class: Name, feature: Name },

    #[error("package '{package}' already contains a classifier named '{name}'")]
    DuplicateClassifier { package: Name, name: Name },

    #[error("enumeration '{enumeration}' already has a literal named '{literal}'")]
    DuplicateLiteral { enumeration: Name, literal: Name },

    #[error("class '{class}' cannot specialize '{supertype}': inheritance cycle")]
    CyclicInheritance { class: Name, supertype: Name },

    #[error("classifier '{classifier}' already belongs to package '{package}'")]
    AlreadyOwned { classifier: Name, package: Name },

    #[error("feature '{0}' is not a reference")]
    NotAReference(Name),

    #[error("feature '{0}' is not an attribute")]
    NotAnAttribute(Name),

    #[error("invalid opposite: {0}")]
    InvalidOpposite(String),
}

/// Lower and upper bound of a feature. `upper == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Multiplicity {
    pub lower: usize,
    pub upper: Option<usize>,
}

impl Multiplicity {
    pub const ONE: Self = Self::new(1, Some(1));
    pub const OPTIONAL: Self = Self::new(0, Some(1));
    pub const MANY: Self = Self::new(0, None);
    pub const REQUIRED_MANY: Self = Self::new(1, None);

    pub const fn new(lower: usize, upper: Option<usize>) -> Self {
        Self { lower, upper }
    }

    /// Build from Ecore bounds, where `-1` (or any negative) means unbounded.
    pub fn from_bounds(lower: i64, upper: i64) -> Self {
        let upper = if upper < 0 { None } else { Some(upper as usize) };
        Self::new(lower.max(0) as usize, upper)
    }

    /// More than one value allowed.
    pub fn is_many(&self) -> bool {
        self.upper.is_none_or(|u| u > 1)
    }

    /// The upper bound in Ecore notation.
    pub fn upper_bound(&self) -> i64 {
        self.upper.map_or(-1, |u| u as i64)
    }

    pub fn allows(&self, count: usize) -> bool {
        self.upper.is_none_or(|u| count <= u)
    }
}

impl Default for Multiplicity {
    fn default() -> Self {
        Self::OPTIONAL
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            Some(u) => write!(f, "[{}..{}]", self.lower, u),
            None => write!(f, "[{}..*]", self.lower),
        }
    }
}

/// Primitive value kinds carried by attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Boolean,
    Int,
    Long,
    Short,
    Byte,
    Float,
    Double,
    Char,
    /// A user-defined data type, stored as text.
    Other(Name),
}

impl DataType {
    /// Name of the matching Ecore data type (`EInt` for [`DataType::Int`]).
    pub fn ecore_name(&self) -> &str {
        match self {
            DataType::String => "EString",
            DataType::Boolean => "EBoolean",
            DataType::Int => "EInt",
            DataType::Long => "ELong",
            DataType::Short => "EShort",
            DataType::Byte => "EByte",
            DataType::Float => "EFloat",
            DataType::Double => "EDouble",
            DataType::Char => "EChar",
            DataType::Other(name) => name,
        }
    }

    /// Map an Ecore data type name, including the boxed `...Object` variants.
    pub fn from_ecore_name(name: &str) -> DataType {
        match name {
            "EString" => DataType::String,
            "EBoolean" | "EBooleanObject" => DataType::Boolean,
            "EInt" | "EIntegerObject" | "EBigInteger" => DataType::Int,
            "ELong" | "ELongObject" => DataType::Long,
            "EShort" | "EShortObject" => DataType::Short,
            "EByte" | "EByteObject" => DataType::Byte,
            "EFloat" | "EFloatObject" => DataType::Float,
            "EDouble" | "EDoubleObject" | "EBigDecimal" => DataType::Double,
            "EChar" | "ECharacterObject" => DataType::Char,
            other => DataType::Other(other.into()),
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Long | DataType::Short | DataType::Byte
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }
}

/// The type of an attribute: a primitive or an enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Data(DataType),
    Enum(Enumeration),
}

impl From<DataType> for ValueType {
    fn from(d: DataType) -> Self {
        ValueType::Data(d)
    }
}

impl From<Enumeration> for ValueType {
    fn from(e: Enumeration) -> Self {
        ValueType::Enum(e)
    }
}

/// A named type owned by a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classifier {
    Class(Class),
    Enum(Enumeration),
}

impl Classifier {
    pub fn name(self) -> Name {
        arena::read(|a| a.classifier_name(self))
    }

    pub fn package(self) -> Option<Package> {
        arena::read(|a| a.classifier_package(self))
    }

    pub fn as_class(self) -> Option<Class> {
        match self {
            Classifier::Class(c) => Some(c),
            Classifier::Enum(_) => None,
        }
    }

    pub fn as_enum(self) -> Option<Enumeration> {
        match self {
            Classifier::Enum(e) => Some(e),
            Classifier::Class(_) => None,
        }
    }

    /// `nsURI#//Name` of the classifier, used as a type tag in documents.
    pub fn uri(self) -> Option<String> {
        let package = self.package()?;
        Some(format!("{}#{}", package.ns_uri(), self.fragment()))
    }

    /// `//Name`, or `//sub/Name` for classifiers of subpackages.
    pub fn fragment(self) -> String {
        let mut path = vec![self.name().to_string()];
        let mut current = self.package();
        while let Some(p) = current {
            let parent = p.super_package();
            if parent.is_some() {
                path.push(p.name().to_string());
            }
            current = parent;
        }
        path.reverse();
        format!("//{}", path.join("/"))
    }
}

impl From<Class> for Classifier {
    fn from(c: Class) -> Self {
        Classifier::Class(c)
    }
}

impl From<Enumeration> for Classifier {
    fn from(e: Enumeration) -> Self {
        Classifier::Enum(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1, false)]
    #[case(1, 1, false)]
    #[case(0, -1, true)]
    #[case(2, 5, true)]
    fn test_multiplicity_from_bounds(#[case] lower: i64, #[case] upper: i64, #[case] many: bool) {
        let m = Multiplicity::from_bounds(lower, upper);
        assert_eq!(m.is_many(), many);
        assert_eq!(m.upper_bound(), upper);
    }

    #[test]
    fn test_multiplicity_allows() {
        assert!(Multiplicity::MANY.allows(100));
        assert!(Multiplicity::OPTIONAL.allows(1));
        assert!(!Multiplicity::new(0, Some(2)).allows(3));
        assert_eq!(Multiplicity::MANY.to_string(), "[0..*]");
    }

    #[rstest]
    #[case("EInt", DataType::Int)]
    #[case("EIntegerObject", DataType::Int)]
    #[case("EDouble", DataType::Double)]
    #[case("EString", DataType::String)]
    fn test_data_type_from_ecore_name(#[case] name: &str, #[case] expected: DataType) {
        assert_eq!(DataType::from_ecore_name(name), expected);
    }

    #[test]
    fn test_unknown_data_type_kept_by_name() {
        let dt = DataType::from_ecore_name("EDate");
        assert_eq!(dt, DataType::Other("EDate".into()));
        assert_eq!(dt.ecore_name(), "EDate");
    }

    #[test]
    fn test_classifier_uri() {
        let p = Package::new("uri_test", "http://uri.test/1.0", "ut");
        let a = p.define_class("A", &[], false).expect("define A");
        assert_eq!(
            Classifier::from(a).uri().as_deref(),
            Some("http://uri.test/1.0#//A")
        );
    }
}
