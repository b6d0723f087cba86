use std::fmt;

use super::arena::{self, LiteralData};
use super::{Classifier, Package, SchemaError};
use crate::base::Name;

/// An enumeration: a data type with a fixed, ordered set of literals.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Enumeration(pub(crate) u32);

/// One literal of an [`Enumeration`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumLiteral {
    pub(crate) enumeration: Enumeration,
    pub(crate) index: u32,
}

impl Enumeration {
    /// Create an enumeration outside of any package.
    pub fn new(name: &str, literals: &[&str]) -> Enumeration {
        arena::write(|a| a.push_enum(None, name, literals))
    }

    pub fn name(self) -> Name {
        arena::read(|a| a.enumeration(self).name.clone())
    }

    pub fn package(self) -> Option<Package> {
        arena::read(|a| a.enumeration(self).package)
    }

    pub fn literals(self) -> Vec<EnumLiteral> {
        let count = arena::read(|a| a.enumeration(self).literals.len());
        (0..count as u32)
            .map(|index| EnumLiteral {
                enumeration: self,
                index,
            })
            .collect()
    }

    /// Look up a literal by name.
    pub fn literal(self, name: &str) -> Option<EnumLiteral> {
        let index = arena::read(|a| {
            a.enumeration(self)
                .literals
                .iter()
                .position(|l| &*l.name == name)
        })?;
        Some(EnumLiteral {
            enumeration: self,
            index: index as u32,
        })
    }

    /// Look up a literal by its integer value.
    pub fn literal_by_value(self, value: i64) -> Option<EnumLiteral> {
        let index = arena::read(|a| {
            a.enumeration(self)
                .literals
                .iter()
                .position(|l| l.value == value)
        })?;
        Some(EnumLiteral {
            enumeration: self,
            index: index as u32,
        })
    }

    /// The first literal, used when an enum attribute has no explicit default.
    pub fn default_literal(self) -> Option<EnumLiteral> {
        self.literals().into_iter().next()
    }

    /// Append a literal with the given value.
    pub fn add_literal(self, name: &str, value: i64) -> Result<EnumLiteral, SchemaError> {
        arena::write(|a| {
            if a.enumeration(self).literals.iter().any(|l| &*l.name == name) {
                return Err(SchemaError::DuplicateLiteral {
                    enumeration: a.enumeration(self).name.clone(),
                    literal: name.into(),
                });
            }
            let name = a.intern(name);
            let literals = &mut a.enums[self.0 as usize].literals;
            literals.push(LiteralData { name, value });
            Ok(EnumLiteral {
                enumeration: self,
                index: (literals.len() - 1) as u32,
            })
        })
    }

    pub fn uri(self) -> Option<String> {
        Classifier::Enum(self).uri()
    }
}

impl EnumLiteral {
    pub fn enumeration(self) -> Enumeration {
        self.enumeration
    }

    pub fn name(self) -> Name {
        arena::read(|a| a.literal(self).name.clone())
    }

    pub fn value(self) -> i64 {
        arena::read(|a| a.literal(self).value)
    }
}

impl fmt::Debug for Enumeration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match arena::try_read(|a| a.enumeration(*self).name.clone()) {
            Some(name) => write!(f, "Enumeration({name})"),
            None => write!(f, "Enumeration#{}", self.0),
        }
    }
}

impl fmt::Debug for EnumLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match arena::try_read(|a| a.literal(*self).name.clone()) {
            Some(name) => write!(f, "EnumLiteral({name})"),
            None => write!(f, "EnumLiteral#{}.{}", self.enumeration.0, self.index),
        }
    }
}

impl fmt::Display for EnumLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
