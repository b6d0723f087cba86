//! The built-in Ecore package.
//!
//! Ecore describes metamodels with the same machinery it defines, so `.ecore`
//! documents load as ordinary models whose classes are [`Ecore::e_class`],
//! [`Ecore::e_attribute`] and so on. The bridge in `resource::bridge` turns
//! such a model into live schema handles.

use super::arena::{FeatureKind, MetaArena};
use super::{Class, DataType, Feature, Multiplicity, Package, ValueType};

pub const NS_URI: &str = "http://www.eclipse.org/emf/2002/Ecore";
pub const NS_PREFIX: &str = "ecore";
pub const NAME: &str = "ecore";

/// Data types published by the Ecore package, in document order.
pub const DATA_TYPES: &[DataType] = &[
    DataType::String,
    DataType::Boolean,
    DataType::Int,
    DataType::Long,
    DataType::Short,
    DataType::Byte,
    DataType::Float,
    DataType::Double,
    DataType::Char,
];

/// Handles to every Ecore class and feature the engine reflects on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ecore {
    pub package: Package,

    pub e_object: Class,
    pub e_model_element: Class,
    pub e_named_element: Class,
    pub e_package: Class,
    pub e_classifier: Class,
    pub e_class: Class,
    pub e_data_type: Class,
    pub e_enum: Class,
    pub e_enum_literal: Class,
    pub e_typed_element: Class,
    pub e_structural_feature: Class,
    pub e_attribute: Class,
    pub e_reference: Class,

    pub name: Feature,
    pub ns_uri: Feature,
    pub ns_prefix: Feature,
    pub e_classifiers: Feature,
    pub e_subpackages: Feature,
    pub e_super_package: Feature,
    pub e_package_of: Feature,
    pub instance_class_name: Feature,
    pub is_abstract: Feature,
    pub is_interface: Feature,
    pub e_super_types: Feature,
    pub e_structural_features: Feature,
    pub e_containing_class: Feature,
    pub e_literals: Feature,
    pub e_enum_of: Feature,
    pub literal_value: Feature,
    pub literal_text: Feature,
    pub ordered: Feature,
    pub unique: Feature,
    pub lower_bound: Feature,
    pub upper_bound: Feature,
    pub e_type: Feature,
    pub changeable: Feature,
    pub transient: Feature,
    pub derived: Feature,
    pub default_value_literal: Feature,
    pub id: Feature,
    pub containment: Feature,
    pub e_opposite: Feature,
}

/// The Ecore handles of this process.
pub fn ecore() -> Ecore {
    super::arena::read(|a| a.ecore())
}

pub(crate) fn build(a: &mut MetaArena) -> Ecore {
    let package = a.push_package(NAME, NS_URI, NS_PREFIX);
    let p = Some(package);

    let e_object = a.push_class(p, "EObject", &[], false);
    let e_model_element = a.push_class(p, "EModelElement", &[], true);
    let e_named_element = a.push_class(p, "ENamedElement", &[e_model_element], true);
    let e_package = a.push_class(p, "EPackage", &[e_named_element], false);
    let e_classifier = a.push_class(p, "EClassifier", &[e_named_element], true);
    let e_class = a.push_class(p, "EClass", &[e_classifier], false);
    let e_data_type = a.push_class(p, "EDataType", &[e_classifier], false);
    let e_enum = a.push_class(p, "EEnum", &[e_data_type], false);
    let e_enum_literal = a.push_class(p, "EEnumLiteral", &[e_named_element], false);
    let e_typed_element = a.push_class(p, "ETypedElement", &[e_named_element], true);
    let e_structural_feature =
        a.push_class(p, "EStructuralFeature", &[e_typed_element], true);
    let e_attribute = a.push_class(p, "EAttribute", &[e_structural_feature], false);
    let e_reference = a.push_class(p, "EReference", &[e_structural_feature], false);

    let attr = |a: &mut MetaArena, c: Class, name: &str, ty: DataType, default: Option<&str>| {
        let default = default.map(|d| a.intern(d));
        a.push_feature(
            c,
            name,
            Multiplicity::OPTIONAL,
            FeatureKind::Attribute {
                ty: ValueType::Data(ty),
                id: false,
                default,
            },
        )
    };
    let reference =
        |a: &mut MetaArena, c: Class, name: &str, target: Class, m: Multiplicity, containment| {
            a.push_feature(
                c,
                name,
                m,
                FeatureKind::Reference {
                    target,
                    containment,
                    opposite: None,
                },
            )
        };

    let name = attr(a, e_named_element, "name", DataType::String, None);

    let ns_uri = attr(a, e_package, "nsURI", DataType::String, None);
    let ns_prefix = attr(a, e_package, "nsPrefix", DataType::String, None);
    let e_classifiers = reference(a, e_package, "eClassifiers", e_classifier, Multiplicity::MANY, true);
    let e_subpackages = reference(a, e_package, "eSubpackages", e_package, Multiplicity::MANY, true);
    let e_super_package =
        reference(a, e_package, "eSuperPackage", e_package, Multiplicity::OPTIONAL, false);
    a.link_opposites(e_subpackages, e_super_package);

    let e_package_of =
        reference(a, e_classifier, "ePackage", e_package, Multiplicity::OPTIONAL, false);
    a.link_opposites(e_classifiers, e_package_of);
    let instance_class_name = attr(a, e_classifier, "instanceClassName", DataType::String, None);

    let is_abstract = attr(a, e_class, "abstract", DataType::Boolean, Some("false"));
    let is_interface = attr(a, e_class, "interface", DataType::Boolean, Some("false"));
    let e_super_types = reference(a, e_class, "eSuperTypes", e_class, Multiplicity::MANY, false);
    let e_structural_features = reference(
        a,
        e_class,
        "eStructuralFeatures",
        e_structural_feature,
        Multiplicity::MANY,
        true,
    );

    let e_literals = reference(a, e_enum, "eLiterals", e_enum_literal, Multiplicity::MANY, true);
    let literal_value = attr(a, e_enum_literal, "value", DataType::Int, None);
    let literal_text = attr(a, e_enum_literal, "literal", DataType::String, None);
    let e_enum_of = reference(a, e_enum_literal, "eEnum", e_enum, Multiplicity::OPTIONAL, false);
    a.link_opposites(e_literals, e_enum_of);

    let ordered = attr(a, e_typed_element, "ordered", DataType::Boolean, Some("true"));
    let unique = attr(a, e_typed_element, "unique", DataType::Boolean, Some("true"));
    let lower_bound = attr(a, e_typed_element, "lowerBound", DataType::Int, Some("0"));
    let upper_bound = attr(a, e_typed_element, "upperBound", DataType::Int, Some("1"));
    let e_type = reference(a, e_typed_element, "eType", e_classifier, Multiplicity::OPTIONAL, false);

    let changeable = attr(a, e_structural_feature, "changeable", DataType::Boolean, Some("true"));
    let transient = attr(a, e_structural_feature, "transient", DataType::Boolean, Some("false"));
    let derived = attr(a, e_structural_feature, "derived", DataType::Boolean, Some("false"));
    let default_value_literal =
        attr(a, e_structural_feature, "defaultValueLiteral", DataType::String, None);
    let e_containing_class = reference(
        a,
        e_structural_feature,
        "eContainingClass",
        e_class,
        Multiplicity::OPTIONAL,
        false,
    );
    a.link_opposites(e_structural_features, e_containing_class);

    let id = attr(a, e_attribute, "iD", DataType::Boolean, Some("false"));

    let containment = attr(a, e_reference, "containment", DataType::Boolean, Some("false"));
    let e_opposite = reference(a, e_reference, "eOpposite", e_reference, Multiplicity::OPTIONAL, false);

    Ecore {
        package,
        e_object,
        e_model_element,
        e_named_element,
        e_package,
        e_classifier,
        e_class,
        e_data_type,
        e_enum,
        e_enum_literal,
        e_typed_element,
        e_structural_feature,
        e_attribute,
        e_reference,
        name,
        ns_uri,
        ns_prefix,
        e_classifiers,
        e_subpackages,
        e_super_package,
        e_package_of,
        instance_class_name,
        is_abstract,
        is_interface,
        e_super_types,
        e_structural_features,
        e_containing_class,
        e_literals,
        e_enum_of,
        literal_value,
        literal_text,
        ordered,
        unique,
        lower_bound,
        upper_bound,
        e_type,
        changeable,
        transient,
        derived,
        default_value_literal,
        id,
        containment,
        e_opposite,
    }
}
