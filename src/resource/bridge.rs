//! Conversion between Ecore models and schema handles.
//!
//! ```text
//! .ecore document ──load──► EPackage objects ──package_from_resource──► Package
//! Package ──resource_from_package──► EPackage objects ──save──► .ecore document
//! ```
//!
//! Every converted object is bound to the schema element it stands for, so a
//! model is converted once and references into it map to the same handles.

use rustc_hash::FxHashMap;

use super::set::MetaBinding;
use super::{ResourceError, ResourceId, ResourceSet};
use crate::base::Uri;
use crate::graph::ObjectId;
use crate::interchange::InterchangeError;
use crate::meta::{
    Class, Classifier, DataType, Ecore, Feature, Multiplicity, Package, ValueType, ecore,
};

/// Bookkeeping for a model being converted into packages.
#[derive(Default)]
struct Conversion {
    classes: Vec<(ObjectId, Class)>,
    references: Vec<(ObjectId, Feature)>,
    /// Objects bound by this conversion, unbound again if it fails.
    bound: Vec<ObjectId>,
}

impl ResourceSet {
    /// Convert the `EPackage` roots of a loaded resource into packages.
    ///
    /// Roots converted earlier keep their packages. Classes referenced in
    /// other documents are converted along the way.
    pub fn package_from_resource(&mut self, id: ResourceId) -> Result<Vec<Package>, ResourceError> {
        let e = ecore::ecore();
        let roots: Vec<ObjectId> = self
            .resource_ref(id)?
            .contents()
            .iter()
            .copied()
            .filter(|r| self.graph.is_instance(*r, e.e_package))
            .collect();

        let mut conversion = Conversion::default();
        let packages = match self.convert_packages(&e, roots, &mut conversion) {
            Ok(packages) => packages,
            Err(err) => {
                for object in &conversion.bound {
                    self.meta_bindings.remove(object);
                }
                return Err(err);
            }
        };
        tracing::debug!(
            resource = ?id,
            packages = packages.len(),
            classes = conversion.classes.len(),
            "converted Ecore model"
        );
        Ok(packages)
    }

    fn convert_packages(
        &mut self,
        e: &Ecore,
        roots: Vec<ObjectId>,
        conversion: &mut Conversion,
    ) -> Result<Vec<Package>, ResourceError> {
        let mut packages = Vec::with_capacity(roots.len());
        for root in roots {
            if let Some(MetaBinding::Package(p)) = self.meta_bindings.get(&root) {
                packages.push(*p);
                continue;
            }
            packages.push(self.bind_package(e, root, None, conversion)?);
        }
        self.complete_classes(e, conversion)?;
        self.link_opposites(e, conversion)?;
        Ok(packages)
    }

    fn bind(&mut self, conversion: &mut Conversion, object: ObjectId, binding: MetaBinding) {
        self.meta_bindings.insert(object, binding);
        conversion.bound.push(object);
    }

    /// Convert a resource's packages and register them in this set.
    pub fn register_resource_packages(&mut self, id: ResourceId) -> Result<Vec<Package>, ResourceError> {
        let packages = self.package_from_resource(id)?;
        for package in &packages {
            self.registry.register(*package);
        }
        Ok(packages)
    }

    /// First pass: packages and classifiers, bound before anything refers to them.
    fn bind_package(
        &mut self,
        e: &Ecore,
        object: ObjectId,
        parent: Option<Package>,
        conversion: &mut Conversion,
    ) -> Result<Package, ResourceError> {
        let name = self.text(object, e.name);
        let package = Package::new(&name, &self.text(object, e.ns_uri), &self.text(object, e.ns_prefix));
        if let Some(parent) = parent {
            parent.add_subpackage(package)?;
        }
        self.bind(conversion, object, MetaBinding::Package(package));

        for classifier in self.graph.get_objects(object, e.e_classifiers)? {
            let name = self.text(classifier, e.name);
            let binding = if self.graph.is_instance(classifier, e.e_class) {
                let class = package.define_class(&name, &[], self.flag(classifier, e.is_abstract))?;
                class.set_interface(self.flag(classifier, e.is_interface));
                conversion.classes.push((classifier, class));
                MetaBinding::Classifier(class.into())
            } else if self.graph.is_instance(classifier, e.e_enum) {
                let enumeration = package.define_enum(&name, &[])?;
                let literals = self.graph.get_objects(classifier, e.e_literals)?;
                for (index, literal) in literals.into_iter().enumerate() {
                    let value = self
                        .graph
                        .get_int(literal, e.literal_value)?
                        .unwrap_or(index as i64);
                    enumeration.add_literal(&self.text(literal, e.name), value)?;
                }
                MetaBinding::Classifier(enumeration.into())
            } else {
                let instance = self.text(classifier, e.instance_class_name);
                MetaBinding::DataType(data_type(&name, &instance))
            };
            self.bind(conversion, classifier, binding);
        }

        for sub in self.graph.get_objects(object, e.e_subpackages)? {
            self.bind_package(e, sub, Some(package), conversion)?;
        }
        Ok(package)
    }

    /// Second pass: supertypes, then features.
    fn complete_classes(&mut self, e: &Ecore, conversion: &mut Conversion) -> Result<(), ResourceError> {
        let classes = conversion.classes.clone();
        for (object, class) in &classes {
            for supertype in self.graph.get_objects(*object, e.e_super_types)? {
                let supertype = self.class_binding(supertype)?;
                class.add_supertype(supertype)?;
            }
        }
        for (object, class) in classes {
            for feature in self.graph.get_objects(object, e.e_structural_features)? {
                let handle = self.convert_feature(e, class, feature)?;
                if handle.is_reference() {
                    conversion.references.push((feature, handle));
                }
                self.bind(conversion, feature, MetaBinding::Feature(handle));
            }
        }
        Ok(())
    }

    fn convert_feature(&mut self, e: &Ecore, class: Class, object: ObjectId) -> Result<Feature, ResourceError> {
        let name = self.text(object, e.name);
        let lower = self.graph.get_int(object, e.lower_bound)?.unwrap_or(0);
        let upper = self.graph.get_int(object, e.upper_bound)?.unwrap_or(1);
        let multiplicity = Multiplicity::from_bounds(lower, upper);
        let ty = self.graph.get_object(object, e.e_type)?;

        let feature = if self.graph.is_instance(object, e.e_reference) {
            let target = match ty {
                Some(ty) => self.class_binding(ty)?,
                None => e.e_object,
            };
            class.add_reference(&name, target, multiplicity, self.flag(object, e.containment))?
        } else {
            let value_type = match ty {
                Some(ty) => self.value_type_binding(ty)?,
                None => ValueType::Data(DataType::String),
            };
            let feature = class.add_attribute(&name, value_type, multiplicity)?;
            if self.flag(object, e.id) {
                feature.set_id(true)?;
            }
            if let Some(default) = self.graph.get_str(object, e.default_value_literal)? {
                feature.set_default_literal(Some(&default))?;
            }
            feature
        };
        if self.graph.is_set(object, e.unique)? {
            feature.set_unique(self.flag(object, e.unique));
        }
        feature.set_transient(self.flag(object, e.transient));
        Ok(feature)
    }

    /// Third pass: opposites, once both ends exist.
    fn link_opposites(&mut self, e: &Ecore, conversion: &Conversion) -> Result<(), ResourceError> {
        for (object, feature) in &conversion.references {
            let Some(opposite) = self.graph.get_object(*object, e.e_opposite)? else {
                continue;
            };
            let MetaBinding::Feature(opposite) = self.binding_of(opposite)? else {
                return Err(unresolved(format!("eOpposite of '{}' is not a feature", feature.name())));
            };
            if feature.opposite() != Some(opposite) {
                feature.set_opposite(opposite)?;
            }
        }
        Ok(())
    }

    fn class_binding(&mut self, id: ObjectId) -> Result<Class, ResourceError> {
        match self.binding_of(id)? {
            MetaBinding::Classifier(Classifier::Class(class)) => Ok(class),
            other => Err(unresolved(format!("{other:?} is not a class"))),
        }
    }

    fn value_type_binding(&mut self, id: ObjectId) -> Result<ValueType, ResourceError> {
        match self.binding_of(id)? {
            MetaBinding::Classifier(Classifier::Enum(enumeration)) => Ok(ValueType::Enum(enumeration)),
            MetaBinding::DataType(data_type) => Ok(ValueType::Data(data_type)),
            other => Err(unresolved(format!("{other:?} is not a data type"))),
        }
    }

    /// The schema element an Ecore object stands for, converting its model
    /// or resolving its proxy as needed.
    fn binding_of(&mut self, id: ObjectId) -> Result<MetaBinding, ResourceError> {
        let mut target = self.graph.follow(id);
        if let Some(uri) = self.graph.proxy_uri(target).cloned() {
            if let Some(binding) = self.registered_binding(&uri) {
                return Ok(binding);
            }
            target = self.resolve(target);
            if self.graph.is_proxy(target) {
                return Err(unresolved(uri.to_string()));
            }
        }
        if let Some(binding) = self.meta_bindings.get(&target) {
            return Ok(binding.clone());
        }
        if let Some(owner) = self.resource_of(target) {
            self.package_from_resource(owner)?;
            if let Some(binding) = self.meta_bindings.get(&target) {
                return Ok(binding.clone());
            }
        }
        Err(unresolved(format!("{target} is not part of an Ecore model")))
    }

    /// Map a URI into a registered package straight to its classifier.
    fn registered_binding(&self, uri: &Uri) -> Option<MetaBinding> {
        let package = self.lookup_package(uri.document())?;
        let path = uri.fragment()?.trim_start_matches('/');
        match package.classifier_at(path) {
            Some(classifier) => Some(MetaBinding::Classifier(classifier)),
            None => Some(MetaBinding::DataType(DataType::from_ecore_name(
                path.rsplit('/').next().unwrap_or(path),
            ))),
        }
    }

    fn text(&self, object: ObjectId, feature: Feature) -> String {
        self.graph
            .get_str(object, feature)
            .ok()
            .flatten()
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    fn flag(&self, object: ObjectId, feature: Feature) -> bool {
        self.graph.get_bool(object, feature).ok().flatten().unwrap_or(false)
    }

    // ── Reflection ──────────────────────────────────────────────────

    /// Describe `package` as Ecore objects in a new resource at `uri`.
    pub fn resource_from_package(&mut self, uri: impl Into<Uri>, package: Package) -> Result<ResourceId, ResourceError> {
        let e = ecore::ecore();
        let id = self.create_resource(uri)?;
        let mut reflection = Reflection::default();
        let root = self.reflect_package(&e, package, &mut reflection)?;
        self.reflect_features(&e, &mut reflection)?;
        for (feature, object) in &reflection.features {
            let Some(opposite) = feature.opposite() else {
                continue;
            };
            if let Some(other) = reflection.features.get(&opposite) {
                self.graph.set(*object, e.e_opposite, *other)?;
            }
        }
        self.append(id, root)?;
        self.resource_mut(id)?.loaded = true;
        tracing::debug!(package = %package.name(), resource = ?id, "reflected package");
        Ok(id)
    }

    fn reflect_package(&mut self, e: &Ecore, package: Package, reflection: &mut Reflection) -> Result<ObjectId, ResourceError> {
        let object = self.graph.create(e.e_package)?;
        self.graph.set(object, e.name, &*package.name())?;
        self.graph.set(object, e.ns_uri, &*package.ns_uri())?;
        self.graph.set(object, e.ns_prefix, &*package.ns_prefix())?;
        self.meta_bindings.insert(object, MetaBinding::Package(package));

        for classifier in package.classifiers() {
            let class = match classifier {
                Classifier::Class(_) => e.e_class,
                Classifier::Enum(_) => e.e_enum,
            };
            let child = self.graph.create(class)?;
            self.graph.set(child, e.name, &*classifier.name())?;
            self.graph.add(object, e.e_classifiers, child)?;
            if let Classifier::Enum(enumeration) = classifier {
                for literal in enumeration.literals() {
                    let lit = self.graph.create(e.e_enum_literal)?;
                    self.graph.set(lit, e.name, &*literal.name())?;
                    if literal.value() != 0 {
                        self.graph.set(lit, e.literal_value, literal.value())?;
                    }
                    self.graph.add(child, e.e_literals, lit)?;
                }
            }
            self.meta_bindings.insert(child, MetaBinding::Classifier(classifier));
            reflection.classifiers.insert(classifier, child);
        }
        if package == e.package {
            for data_type in ecore::DATA_TYPES {
                let child = self.graph.create(e.e_data_type)?;
                self.graph.set(child, e.name, data_type.ecore_name())?;
                self.graph.add(object, e.e_classifiers, child)?;
                self.meta_bindings.insert(child, MetaBinding::DataType(data_type.clone()));
                reflection.data_types.insert(data_type.clone(), child);
            }
        }
        for sub in package.subpackages() {
            let child = self.reflect_package(e, sub, reflection)?;
            self.graph.add(object, e.e_subpackages, child)?;
        }
        Ok(object)
    }

    fn reflect_features(&mut self, e: &Ecore, reflection: &mut Reflection) -> Result<(), ResourceError> {
        let classes: Vec<(Class, ObjectId)> = reflection
            .classifiers
            .iter()
            .filter_map(|(c, o)| c.as_class().map(|c| (c, *o)))
            .collect();
        for (class, object) in classes {
            if class.is_abstract() {
                self.graph.set(object, e.is_abstract, true)?;
            }
            if class.is_interface() {
                self.graph.set(object, e.is_interface, true)?;
            }
            for supertype in class.supertypes() {
                let target = self.classifier_object(e, supertype.into(), reflection);
                self.graph.add(object, e.e_super_types, target)?;
            }
            for feature in class.features() {
                let child = self.reflect_feature(e, feature, reflection)?;
                self.graph.add(object, e.e_structural_features, child)?;
                self.meta_bindings.insert(child, MetaBinding::Feature(feature));
                reflection.features.insert(feature, child);
            }
        }
        Ok(())
    }

    fn reflect_feature(&mut self, e: &Ecore, feature: Feature, reflection: &Reflection) -> Result<ObjectId, ResourceError> {
        let class = if feature.is_reference() { e.e_reference } else { e.e_attribute };
        let object = self.graph.create(class)?;
        self.graph.set(object, e.name, &*feature.name())?;
        let multiplicity = feature.multiplicity();
        if multiplicity.lower != 0 {
            self.graph.set(object, e.lower_bound, multiplicity.lower as i64)?;
        }
        if multiplicity.upper_bound() != 1 {
            self.graph.set(object, e.upper_bound, multiplicity.upper_bound())?;
        }
        if feature.is_transient() {
            self.graph.set(object, e.transient, true)?;
        }
        let ty = match (feature.target(), feature.value_type()) {
            (Some(target), _) => Some(self.classifier_object(e, target.into(), reflection)),
            (None, Some(ValueType::Enum(enumeration))) => {
                Some(self.classifier_object(e, enumeration.into(), reflection))
            }
            (None, Some(ValueType::Data(data_type))) => Some(self.data_type_object(e, &data_type, reflection)),
            (None, None) => None,
        };
        if let Some(ty) = ty {
            self.graph.set(object, e.e_type, ty)?;
        }
        if feature.is_reference() {
            if feature.is_containment() {
                self.graph.set(object, e.containment, true)?;
            }
            if !feature.is_unique() {
                self.graph.set(object, e.unique, false)?;
            }
        } else {
            if feature.is_id() {
                self.graph.set(object, e.id, true)?;
            }
            if let Some(default) = feature.default_literal() {
                self.graph.set(object, e.default_value_literal, &*default)?;
            }
            if feature.is_unique() && feature.is_many() {
                self.graph.set(object, e.unique, true)?;
            }
        }
        Ok(object)
    }

    /// The reflected object for a classifier, or a proxy into its package.
    fn classifier_object(&mut self, e: &Ecore, classifier: Classifier, reflection: &Reflection) -> ObjectId {
        if let Some(object) = reflection.classifiers.get(&classifier) {
            return *object;
        }
        let expected = match classifier {
            Classifier::Class(_) => e.e_class,
            Classifier::Enum(_) => e.e_enum,
        };
        let uri = classifier
            .uri()
            .unwrap_or_else(|| format!("#//{}", classifier.name()));
        self.proxy_for(uri, Some(expected))
    }

    fn data_type_object(&mut self, e: &Ecore, data_type: &DataType, reflection: &Reflection) -> ObjectId {
        if let Some(object) = reflection.data_types.get(data_type) {
            return *object;
        }
        let uri = format!("{}#//{}", ecore::NS_URI, data_type.ecore_name());
        self.proxy_for(uri, Some(e.e_data_type))
    }
}

#[derive(Default)]
struct Reflection {
    classifiers: indexmap::IndexMap<Classifier, ObjectId>,
    data_types: FxHashMap<DataType, ObjectId>,
    features: indexmap::IndexMap<Feature, ObjectId>,
}

/// Map an Ecore data type to a primitive, by name or by its Java class.
fn data_type(name: &str, instance_class: &str) -> DataType {
    match DataType::from_ecore_name(name) {
        DataType::Other(_) => match instance_class {
            "java.lang.String" | "String" => DataType::String,
            "boolean" | "java.lang.Boolean" => DataType::Boolean,
            "int" | "java.lang.Integer" => DataType::Int,
            "long" | "java.lang.Long" => DataType::Long,
            "short" | "java.lang.Short" => DataType::Short,
            "byte" | "java.lang.Byte" => DataType::Byte,
            "float" | "java.lang.Float" => DataType::Float,
            "double" | "java.lang.Double" => DataType::Double,
            "char" | "java.lang.Character" => DataType::Char,
            _ => DataType::Other(name.into()),
        },
        known => known,
    }
}

fn unresolved(message: impl Into<String>) -> ResourceError {
    ResourceError::Interchange(InterchangeError::UnresolvedReference(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{MemoryStore, isolated_registry};
    use rstest::rstest;

    fn set() -> ResourceSet {
        ResourceSet::new()
            .with_registry(isolated_registry())
            .with_store(MemoryStore::new())
    }

    fn library() -> Package {
        let p = Package::new("bridge_lib", "http://bridge.test/lib", "lib");
        let named = p.define_class("Named", &[], true).unwrap();
        named
            .add_attribute("name", DataType::String, Multiplicity::OPTIONAL)
            .unwrap();
        let book = p.define_class("Book", &[named], false).unwrap();
        let writer = p.define_class("Writer", &[named], false).unwrap();
        let genre = p.define_enum("Genre", &["Novel", "Poetry"]).unwrap();
        book.add_attribute("genre", genre, Multiplicity::OPTIONAL).unwrap();
        book.add_attribute("pages", DataType::Int, Multiplicity::OPTIONAL)
            .unwrap();
        let books = writer
            .add_reference("books", book, Multiplicity::MANY, false)
            .unwrap();
        let author = book
            .add_reference("author", writer, Multiplicity::OPTIONAL, false)
            .unwrap();
        books.set_opposite(author).unwrap();
        p
    }

    #[test]
    fn test_reflected_package_converts_back() {
        let original = library();
        let mut rs = set();
        let id = rs.resource_from_package("lib.ecore", original).unwrap();
        let root = rs.contents(id)[0];
        let e = ecore::ecore();
        assert_eq!(rs.graph().get_str(root, e.name).unwrap().as_deref(), Some("bridge_lib"));
        assert_eq!(rs.graph().get_objects(root, e.e_classifiers).unwrap().len(), 4);

        // Bindings made during reflection are reused.
        assert_eq!(rs.package_from_resource(id).unwrap(), vec![original]);

        // A copy of the objects in a fresh set converts into a new package.
        let bytes = rs.save_bytes(id, &Default::default()).unwrap();
        let mut fresh = set();
        let copy_id = fresh.create_resource("copy.ecore").unwrap();
        fresh.load_bytes(copy_id, &bytes).unwrap();
        let copy = fresh.package_from_resource(copy_id).unwrap()[0];
        assert_ne!(copy, original);
        let book = copy.class("Book").unwrap();
        let named = copy.class("Named").unwrap();
        assert!(named.is_abstract());
        assert!(book.conforms_to(named));
        assert_eq!(
            book.feature("pages").unwrap().value_type(),
            Some(ValueType::Data(DataType::Int))
        );
        let genre = copy.enumeration("Genre").unwrap();
        assert_eq!(genre.literals().len(), 2);
        let author = book.feature("author").unwrap();
        let books = copy.class("Writer").unwrap().feature("books").unwrap();
        assert_eq!(author.opposite(), Some(books));
        assert!(books.is_many());
    }

    #[test]
    fn test_registered_uris_map_directly() {
        let mut rs = set();
        let proxy = rs.proxy_for(format!("{}#//EInt", ecore::NS_URI), None);
        assert_eq!(
            rs.value_type_binding(proxy).unwrap(),
            ValueType::Data(DataType::Int)
        );
        let e = ecore::ecore();
        let proxy = rs.proxy_for(format!("{}#//EObject", ecore::NS_URI), None);
        assert_eq!(rs.class_binding(proxy).unwrap(), e.e_object);
    }

    #[test]
    fn test_ecore_nsuri_is_served_by_reflection() {
        let mut rs = set();
        let id = rs.get_resource(ecore::NS_URI).unwrap();
        let e = ecore::ecore();
        let root = rs.contents(id)[0];
        assert!(rs.graph().is_instance(root, e.e_package));
        let string = rs.object_at(id, "//EString").unwrap();
        assert!(rs.graph().is_instance(string, e.e_data_type));
    }

    #[test]
    fn test_failed_conversion_leaves_nothing_bound() {
        let mut rs = ResourceSet::new()
            .with_registry(isolated_registry())
            .with_store(MemoryStore::new().with_document(
                "dup.ecore",
                r#"<?xml version="1.0" encoding="UTF-8"?>
<ecore:EPackage xmi:version="2.0" xmlns:xmi="http://www.omg.org/XMI" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xmlns:ecore="http://www.eclipse.org/emf/2002/Ecore" name="dup" nsURI="http://bridge.test/dup" nsPrefix="dup">
  <eClassifiers xsi:type="ecore:EClass" name="A">
    <eStructuralFeatures xsi:type="ecore:EAttribute" name="x" eType="ecore:EDataType http://www.eclipse.org/emf/2002/Ecore#//EInt"/>
    <eStructuralFeatures xsi:type="ecore:EAttribute" name="x" eType="ecore:EDataType http://www.eclipse.org/emf/2002/Ecore#//EString"/>
  </eClassifiers>
</ecore:EPackage>
"#,
            ));
        let id = rs.get_resource("dup.ecore").unwrap();
        let root = rs.contents(id)[0];

        let err = rs.register_resource_packages(id).unwrap_err();
        assert!(matches!(err, ResourceError::Schema(crate::meta::SchemaError::Conflict { .. })));
        assert!(!rs.meta_bindings.contains_key(&root));
        assert!(rs.lookup_package("http://bridge.test/dup").is_none());

        let err = rs.register_resource_packages(id).unwrap_err();
        assert!(matches!(err, ResourceError::Schema(_)));
        assert!(rs.lookup_package("http://bridge.test/dup").is_none());
    }

    #[rstest]
    #[case("EString", "", DataType::String)]
    #[case("MyInt", "int", DataType::Int)]
    #[case("EDoubleObject", "", DataType::Double)]
    #[case("Opaque", "com.example.Opaque", DataType::Other("Opaque".into()))]
    fn test_data_type_mapping(#[case] name: &str, #[case] instance: &str, #[case] expected: DataType) {
        assert_eq!(data_type(name, instance), expected);
    }
}
