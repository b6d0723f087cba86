//! JSON format support.
//!
//! ## Document Structure
//!
//! ```json
//! {
//!   "eClass": "http://example.org/lib#//Library",
//!   "name": "City",
//!   "tags": ["fiction", "classics"],
//!   "books": [
//!     { "title": "Dune", "author": { "$ref": "//@writers.0" } },
//!     { "eClass": "http://example.org/lib#//Comic", "title": "Maus" }
//!   ],
//!   "publisher": {
//!     "$ref": "publishers.json#//@houses.2",
//!     "eClass": "http://example.org/lib#//Publisher"
//!   }
//! }
//! ```
//!
//! A document with several roots is a JSON array of such objects. Roots
//! always carry `eClass`; nested objects carry it when their class is not the
//! feature's declared type.

use serde::Serialize;

use super::{InterchangeError, LoadContext, ModelFormat, SaveContext, SaveOptions};

/// Key holding the concrete class of an object.
pub const ECLASS_KEY: &str = "eClass";
/// Key holding the target of a reference.
pub const REF_KEY: &str = "$ref";
/// Key holding a document identifier.
pub const ID_KEY: &str = "_id";

/// JSON format handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl ModelFormat for Json {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn mime_type(&self) -> &'static str {
        "application/json"
    }

    fn read(&self, input: &[u8], ctx: &mut LoadContext<'_>) -> Result<(), InterchangeError> {
        reader::JsonReader.read(input, ctx)
    }

    fn write(&self, ctx: &SaveContext<'_>, options: &SaveOptions) -> Result<Vec<u8>, InterchangeError> {
        let value = writer::JsonWriter::new(ctx, options).write()?;
        let mut out = Vec::new();
        if options.indent > 0 {
            let indent = " ".repeat(options.indent);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
            value
                .serialize(&mut serializer)
                .map_err(|e| InterchangeError::json(format!("Serialization error: {e}")))?;
        } else {
            serde_json::to_writer(&mut out, &value)
                .map_err(|e| InterchangeError::json(format!("Serialization error: {e}")))?;
        }
        out.push(b'\n');
        Ok(out)
    }

    fn validate(&self, input: &[u8]) -> Result<(), InterchangeError> {
        let value: serde_json::Value =
            serde_json::from_slice(input).map_err(|e| InterchangeError::json(format!("Invalid JSON: {e}")))?;
        if !value.is_object() && !value.is_array() {
            return Err(InterchangeError::json("Expected object or array"));
        }
        Ok(())
    }
}

// ============================================================================
// JSON READER
// ============================================================================

mod reader {
    use super::*;
    use crate::graph::ObjectId;
    use crate::meta::{Class, Feature, ValueType, ecore};
    use serde_json::{Map, Value};

    /// JSON document reader.
    pub struct JsonReader;

    impl JsonReader {
        pub fn read(&self, input: &[u8], ctx: &mut LoadContext<'_>) -> Result<(), InterchangeError> {
            let value: Value =
                serde_json::from_slice(input).map_err(|e| InterchangeError::json(format!("Parse error: {e}")))?;
            match value {
                Value::Object(obj) => self.read_root(&obj, ctx),
                Value::Array(items) => {
                    for item in &items {
                        let obj = item
                            .as_object()
                            .ok_or_else(|| InterchangeError::json("Expected an object for each root"))?;
                        self.read_root(obj, ctx)?;
                    }
                    Ok(())
                }
                _ => Err(InterchangeError::json("Expected object or array")),
            }
        }

        fn read_root(&self, obj: &Map<String, Value>, ctx: &mut LoadContext<'_>) -> Result<(), InterchangeError> {
            let eclass = obj
                .get(ECLASS_KEY)
                .and_then(Value::as_str)
                .ok_or_else(|| InterchangeError::missing_key(ECLASS_KEY))?;
            let class = ctx.class_from_uri(eclass)?;
            let root = ctx.create(class)?;
            ctx.add_root(root)?;
            self.read_fields(obj, root, class, ctx)
        }

        fn read_fields(
            &self,
            obj: &Map<String, Value>,
            object: ObjectId,
            class: Class,
            ctx: &mut LoadContext<'_>,
        ) -> Result<(), InterchangeError> {
            for (key, value) in obj {
                match key.as_str() {
                    ECLASS_KEY => continue,
                    ID_KEY => {
                        if let Some(id) = value.as_str() {
                            ctx.record_id(object, id);
                        }
                        continue;
                    }
                    _ => {}
                }
                let feature = class
                    .feature(key)
                    .ok_or_else(|| InterchangeError::unknown_feature(class.name().to_string(), key.as_str()))?;
                let items: &[Value] = match value {
                    Value::Array(items) => items,
                    Value::Null => continue,
                    single => std::slice::from_ref(single),
                };
                for item in items {
                    if feature.is_attribute() {
                        self.read_attribute(item, object, feature, ctx)?;
                    } else {
                        self.read_reference(item, object, feature, ctx)?;
                    }
                }
            }
            Ok(())
        }

        fn read_attribute(
            &self,
            item: &Value,
            object: ObjectId,
            feature: Feature,
            ctx: &mut LoadContext<'_>,
        ) -> Result<(), InterchangeError> {
            let text = match item {
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => {
                    let integral = matches!(feature.value_type(), Some(ValueType::Data(dt)) if dt.is_integral());
                    match (n.as_i64(), n.as_f64()) {
                        (Some(i), _) => i.to_string(),
                        (None, Some(f)) if integral && f.fract() == 0.0 => (f as i64).to_string(),
                        _ => n.to_string(),
                    }
                }
                Value::Null => return Ok(()),
                other => {
                    return Err(InterchangeError::invalid_value(
                        feature.name().to_string(),
                        format!("expected a scalar, found {other}"),
                    ));
                }
            };
            ctx.set_text(object, feature, &text)
        }

        fn read_reference(
            &self,
            item: &Value,
            object: ObjectId,
            feature: Feature,
            ctx: &mut LoadContext<'_>,
        ) -> Result<(), InterchangeError> {
            let obj = item.as_object().ok_or_else(|| {
                InterchangeError::invalid_value(feature.name().to_string(), "expected an object or a reference")
            })?;
            let eclass = obj.get(ECLASS_KEY).and_then(Value::as_str);
            if let Some(href) = obj.get(REF_KEY).and_then(Value::as_str) {
                let hint = eclass.map(|uri| ctx.class_from_uri(uri)).transpose()?;
                ctx.defer(object, feature, href, hint);
                return Ok(());
            }
            if !feature.is_containment() {
                return Err(InterchangeError::invalid_value(
                    feature.name().to_string(),
                    format!("a non-containment reference needs '{REF_KEY}'"),
                ));
            }
            let class = match eclass {
                Some(uri) => ctx.class_from_uri(uri)?,
                None => feature.target().unwrap_or_else(|| ecore::ecore().e_object),
            };
            let child = ctx.create(class)?;
            ctx.set_value(object, feature, child.into())?;
            self.read_fields(obj, child, class, ctx)
        }
    }
}

// ============================================================================
// JSON WRITER
// ============================================================================

mod writer {
    use super::*;
    use crate::graph::{ObjectGraph, ObjectId, Value as ModelValue};
    use crate::interchange::ReferenceTarget;
    use crate::meta::{Class, Feature};
    use serde_json::{Map, Value, json};

    /// JSON document writer.
    pub struct JsonWriter<'c, 'a> {
        ctx: &'c SaveContext<'a>,
        options: &'c SaveOptions,
        graph: &'a ObjectGraph,
    }

    impl<'c, 'a> JsonWriter<'c, 'a> {
        pub fn new(ctx: &'c SaveContext<'a>, options: &'c SaveOptions) -> Self {
            Self {
                ctx,
                options,
                graph: ctx.graph(),
            }
        }

        pub fn write(&self) -> Result<Value, InterchangeError> {
            let roots = self.ctx.roots();
            if let [root] = roots {
                return self.object_to_json(*root, None);
            }
            let items = roots
                .iter()
                .map(|root| self.object_to_json(*root, None))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(items))
        }

        fn object_to_json(&self, object: ObjectId, declared: Option<Class>) -> Result<Value, InterchangeError> {
            let class = self
                .graph
                .class_of(object)
                .ok_or_else(|| InterchangeError::UnresolvedReference(format!("{object} is an unresolved proxy")))?;
            let mut obj = Map::new();
            if declared.is_none() || self.options.use_explicit_type_tag || declared != Some(class) {
                obj.insert(ECLASS_KEY.to_string(), json!(class_uri(class)?));
            }
            if let Some(id) = self.ctx.id_of(object) {
                obj.insert(ID_KEY.to_string(), json!(id));
            }

            for feature in class.all_features() {
                if feature.is_transient() || feature.is_container() || !self.graph.is_set(object, feature)? {
                    continue;
                }
                let values = if feature.is_attribute() {
                    self.graph
                        .get(object, feature)?
                        .into_values()
                        .iter()
                        .map(scalar_to_json)
                        .collect::<Vec<_>>()
                } else {
                    self.graph
                        .get_objects(object, feature)?
                        .into_iter()
                        .map(|target| self.reference_to_json(target, feature))
                        .collect::<Result<Vec<_>, _>>()?
                };
                let value = if feature.is_many() {
                    Value::Array(values)
                } else {
                    match values.into_iter().next() {
                        Some(v) => v,
                        None => continue,
                    }
                };
                obj.insert(feature.name().to_string(), value);
            }
            Ok(Value::Object(obj))
        }

        fn reference_to_json(&self, target: ObjectId, feature: Feature) -> Result<Value, InterchangeError> {
            if feature.is_containment() && !self.graph.is_proxy(target) {
                return self.object_to_json(target, feature.target());
            }
            let mut obj = Map::new();
            match self.ctx.reference(target)? {
                ReferenceTarget::Local(fragment) => {
                    obj.insert(REF_KEY.to_string(), json!(fragment));
                }
                ReferenceTarget::External { href, class } => {
                    obj.insert(REF_KEY.to_string(), json!(href));
                    if let Some(class) = class {
                        obj.insert(ECLASS_KEY.to_string(), json!(class_uri(class)?));
                    }
                }
            }
            Ok(Value::Object(obj))
        }
    }

    fn class_uri(class: Class) -> Result<String, InterchangeError> {
        class
            .uri()
            .ok_or_else(|| InterchangeError::malformed(format!("class '{}' belongs to no package", class.name())))
    }

    fn scalar_to_json(value: &ModelValue) -> Value {
        match value {
            ModelValue::String(s) => json!(s.as_ref()),
            ModelValue::Int(i) => json!(*i),
            ModelValue::Float(f) => json!(*f),
            ModelValue::Bool(b) => json!(*b),
            ModelValue::Literal(l) => json!(l.name().as_ref()),
            ModelValue::Object(id) => json!(id.to_string()),
        }
    }
}
