//! Object storage and read access.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::{AsFeature, FeatureValue, ModelError, ObjectId, Value};
use crate::base::Uri;
use crate::meta::{Class, EnumLiteral, Feature};

#[derive(Debug, Clone)]
pub(super) struct ObjectData {
    pub class: Class,
    /// Present only while non-empty. Single-valued features hold one value.
    pub values: FxHashMap<Feature, Vec<Value>>,
    pub container: Option<(ObjectId, Feature)>,
}

#[derive(Debug, Clone)]
pub(super) struct ProxyData {
    pub uri: Uri,
    pub expected: Option<Class>,
    pub target: Option<ObjectId>,
}

#[derive(Debug, Clone)]
pub(super) enum Slot {
    Object(ObjectData),
    Proxy(ProxyData),
}

/// Checkpoint returned by [`ObjectGraph::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphMark(usize);

/// Arena of model objects and proxies.
#[derive(Debug, Default, Clone)]
pub struct ObjectGraph {
    pub(super) slots: Vec<Slot>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots, objects and proxies alike.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // ── Creation ────────────────────────────────────────────────────

    /// Create an empty instance of `class`.
    pub fn create(&mut self, class: Class) -> Result<ObjectId, ModelError> {
        if class.is_abstract() || class.is_interface() {
            return Err(ModelError::Instantiation(class.name()));
        }
        Ok(self.push(Slot::Object(ObjectData {
            class,
            values: FxHashMap::default(),
            container: None,
        })))
    }

    /// Create an instance and initialize features from `(name, value)` pairs.
    /// Values for many-valued features are added one by one.
    ///
    /// All pairs are checked before the object is created, so a failure
    /// leaves the graph unchanged.
    pub fn instantiate<'a, I>(&mut self, class: Class, init: I) -> Result<ObjectId, ModelError>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        if class.is_abstract() || class.is_interface() {
            return Err(ModelError::Instantiation(class.name()));
        }
        let mut checked = Vec::new();
        let mut counts: FxHashMap<Feature, usize> = FxHashMap::default();
        for (name, value) in init {
            let feature = name.feature_of(class)?;
            let value = self.check_value(feature, value)?;
            let count = counts.entry(feature).or_default();
            *count += 1;
            if !feature.multiplicity().allows(*count) {
                return Err(ModelError::multiplicity(feature, "too many values"));
            }
            checked.push((feature, value));
        }
        let id = self.create(class)?;
        for (feature, value) in checked {
            if feature.is_many() {
                self.add(id, feature, value)?;
            } else {
                self.set(id, feature, value)?;
            }
        }
        Ok(id)
    }

    /// Create an unresolved proxy for the object at `uri`.
    pub fn create_proxy(&mut self, uri: Uri, expected: Option<Class>) -> ObjectId {
        self.push(Slot::Proxy(ProxyData {
            uri,
            expected,
            target: None,
        }))
    }

    fn push(&mut self, slot: Slot) -> ObjectId {
        self.slots.push(slot);
        ObjectId((self.slots.len() - 1) as u32)
    }

    // ── Checkpoints ─────────────────────────────────────────────────

    pub fn mark(&self) -> GraphMark {
        GraphMark(self.slots.len())
    }

    /// Drop every slot created after `mark`, along with any link into them.
    pub fn rollback(&mut self, mark: GraphMark) {
        if mark.0 >= self.slots.len() {
            return;
        }
        let dropped = self.slots.len() - mark.0;
        self.slots.truncate(mark.0);
        let live = |v: &Value| !matches!(v, Value::Object(id) if id.index() >= mark.0);
        for slot in &mut self.slots {
            match slot {
                Slot::Object(data) => {
                    if data.container.is_some_and(|(c, _)| c.index() >= mark.0) {
                        data.container = None;
                    }
                    data.values.retain(|_, vs| {
                        vs.retain(live);
                        !vs.is_empty()
                    });
                }
                Slot::Proxy(p) => {
                    if p.target.is_some_and(|t| t.index() >= mark.0) {
                        p.target = None;
                    }
                }
            }
        }
        tracing::debug!(dropped, "rolled back object graph");
    }

    // ── Slots and proxies ───────────────────────────────────────────

    pub fn contains(&self, id: ObjectId) -> bool {
        id.index() < self.slots.len()
    }

    /// Follow resolved proxies to the slot that currently stands for `id`.
    pub fn follow(&self, id: ObjectId) -> ObjectId {
        let mut current = id;
        // Forward chains are acyclic: a proxy only ever forwards to an object.
        for _ in 0..self.slots.len() {
            match self.slots.get(current.index()) {
                Some(Slot::Proxy(ProxyData {
                    target: Some(next), ..
                })) => current = *next,
                _ => break,
            }
        }
        current
    }

    /// Whether `id` still stands for an unresolved proxy.
    pub fn is_proxy(&self, id: ObjectId) -> bool {
        matches!(self.slots.get(self.follow(id).index()), Some(Slot::Proxy(_)))
    }

    /// Whether `id` was created as a proxy, resolved or not.
    pub fn was_proxy(&self, id: ObjectId) -> bool {
        matches!(self.slots.get(id.index()), Some(Slot::Proxy(_)))
    }

    /// URI of an unresolved proxy.
    pub fn proxy_uri(&self, id: ObjectId) -> Option<&Uri> {
        self.proxy(id).map(|p| &p.uri)
    }

    /// Class the referrer expects the proxied object to have.
    pub fn proxy_expected_type(&self, id: ObjectId) -> Option<Class> {
        self.proxy(id).and_then(|p| p.expected)
    }

    fn proxy(&self, id: ObjectId) -> Option<&ProxyData> {
        match self.slots.get(self.follow(id).index()) {
            Some(Slot::Proxy(p)) => Some(p),
            _ => None,
        }
    }

    /// All unresolved proxy slots.
    pub fn pending_proxies(&self) -> impl Iterator<Item = (ObjectId, &Uri)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Proxy(ProxyData {
                uri, target: None, ..
            }) => Some((ObjectId(i as u32), uri)),
            _ => None,
        })
    }

    /// Turn `proxy` into a forward to `target`.
    pub fn resolve_proxy(&mut self, proxy: ObjectId, target: ObjectId) -> Result<(), ModelError> {
        let target = self.follow(target);
        let class = self.class_of(target).ok_or(ModelError::NoSuchObject(target))?;
        let slot = self.follow(proxy);
        if slot == target {
            return Ok(());
        }
        let Some(Slot::Proxy(data)) = self.slots.get_mut(slot.index()) else {
            return Err(ModelError::NoSuchObject(proxy));
        };
        if let Some(expected) = data.expected {
            if !class.conforms_to(expected) {
                tracing::warn!(
                    uri = %data.uri,
                    expected = %expected.name(),
                    found = %class.name(),
                    "proxy resolved to an object of an unexpected class"
                );
            }
        }
        tracing::trace!(uri = %data.uri, %target, "resolved proxy");
        data.target = Some(target);
        Ok(())
    }

    // ── Object reads ────────────────────────────────────────────────

    pub(super) fn data(&self, id: ObjectId) -> Result<&ObjectData, ModelError> {
        match self.slots.get(self.follow(id).index()) {
            Some(Slot::Object(data)) => Ok(data),
            Some(Slot::Proxy(p)) => Err(ModelError::UnresolvedProxy {
                id,
                uri: p.uri.to_string(),
            }),
            None => Err(ModelError::NoSuchObject(id)),
        }
    }

    pub(super) fn data_mut(&mut self, id: ObjectId) -> Result<&mut ObjectData, ModelError> {
        let slot = self.follow(id);
        match self.slots.get_mut(slot.index()) {
            Some(Slot::Object(data)) => Ok(data),
            Some(Slot::Proxy(p)) => Err(ModelError::UnresolvedProxy {
                id,
                uri: p.uri.to_string(),
            }),
            None => Err(ModelError::NoSuchObject(id)),
        }
    }

    /// Class of a live object. `None` for unresolved proxies.
    pub fn class_of(&self, id: ObjectId) -> Option<Class> {
        self.data(id).ok().map(|d| d.class)
    }

    /// Whether `id` is an instance of `class` or one of its subclasses.
    pub fn is_instance(&self, id: ObjectId, class: Class) -> bool {
        self.class_of(id).is_some_and(|c| c.conforms_to(class))
    }

    pub(super) fn feature(&self, id: ObjectId, feature: impl AsFeature) -> Result<Feature, ModelError> {
        feature.feature_of(self.data(id)?.class)
    }

    fn followed(&self, v: &Value) -> Value {
        match v {
            Value::Object(id) => Value::Object(self.follow(*id)),
            other => other.clone(),
        }
    }

    /// The content of a feature. Object values are reported through
    /// [`ObjectGraph::follow`].
    pub fn get(&self, id: ObjectId, feature: impl AsFeature) -> Result<FeatureValue, ModelError> {
        let data = self.data(id)?;
        let feature = feature.feature_of(data.class)?;
        let stored = data.values.get(&feature).map(Vec::as_slice).unwrap_or_default();
        if feature.is_many() {
            let values = stored.iter().map(|v| self.followed(v)).collect();
            return Ok(FeatureValue::Many(values));
        }
        let value = match stored.first() {
            Some(v) => Some(self.followed(v)),
            None => default_value(feature),
        };
        Ok(FeatureValue::Single(value))
    }

    /// The value of a single-valued feature.
    pub fn get_value(&self, id: ObjectId, feature: impl AsFeature) -> Result<Option<Value>, ModelError> {
        let feature = self.feature(id, feature)?;
        if feature.is_many() {
            return Err(ModelError::multiplicity(feature, "is many-valued"));
        }
        Ok(self.get(id, feature)?.single().cloned())
    }

    /// All values of a feature, whatever its multiplicity.
    pub fn get_many(&self, id: ObjectId, feature: impl AsFeature) -> Result<Vec<Value>, ModelError> {
        Ok(self.get(id, feature)?.into_values())
    }

    pub fn get_str(&self, id: ObjectId, feature: impl AsFeature) -> Result<Option<Arc<str>>, ModelError> {
        Ok(match self.get(id, feature)? {
            FeatureValue::Single(Some(Value::String(s))) => Some(s),
            _ => None,
        })
    }

    pub fn get_int(&self, id: ObjectId, feature: impl AsFeature) -> Result<Option<i64>, ModelError> {
        Ok(self.get(id, feature)?.single().and_then(Value::as_int))
    }

    pub fn get_float(&self, id: ObjectId, feature: impl AsFeature) -> Result<Option<f64>, ModelError> {
        Ok(self.get(id, feature)?.single().and_then(Value::as_float))
    }

    pub fn get_bool(&self, id: ObjectId, feature: impl AsFeature) -> Result<Option<bool>, ModelError> {
        Ok(self.get(id, feature)?.single().and_then(Value::as_bool))
    }

    pub fn get_literal(&self, id: ObjectId, feature: impl AsFeature) -> Result<Option<EnumLiteral>, ModelError> {
        Ok(self.get(id, feature)?.single().and_then(Value::as_literal))
    }

    pub fn get_object(&self, id: ObjectId, feature: impl AsFeature) -> Result<Option<ObjectId>, ModelError> {
        Ok(self.get(id, feature)?.single().and_then(Value::as_object))
    }

    pub fn get_objects(&self, id: ObjectId, feature: impl AsFeature) -> Result<Vec<ObjectId>, ModelError> {
        Ok(self
            .get(id, feature)?
            .values()
            .iter()
            .filter_map(Value::as_object)
            .collect())
    }

    /// Stored values without following proxies, as the codecs need them.
    pub fn raw_values(&self, id: ObjectId, feature: Feature) -> Result<Vec<Value>, ModelError> {
        let data = self.data(id)?;
        Ok(data.values.get(&feature).cloned().unwrap_or_default())
    }

    /// Whether a feature holds an explicitly stored, non-empty value.
    pub fn is_set(&self, id: ObjectId, feature: impl AsFeature) -> Result<bool, ModelError> {
        let data = self.data(id)?;
        let feature = feature.feature_of(data.class)?;
        Ok(data.values.get(&feature).is_some_and(|vs| !vs.is_empty()))
    }

    /// Features of `id` that are set, in class feature order.
    pub fn set_features(&self, id: ObjectId) -> Result<Vec<Feature>, ModelError> {
        let data = self.data(id)?;
        Ok(data
            .class
            .all_features()
            .into_iter()
            .filter(|f| data.values.get(f).is_some_and(|vs| !vs.is_empty()))
            .collect())
    }

    /// The object containing `id`, if any.
    pub fn container(&self, id: ObjectId) -> Option<ObjectId> {
        self.data(id).ok().and_then(|d| d.container).map(|(c, _)| c)
    }

    /// The containment reference through which `id` is contained.
    pub fn containing_feature(&self, id: ObjectId) -> Option<Feature> {
        self.data(id).ok().and_then(|d| d.container).map(|(_, f)| f)
    }
}

fn default_value(feature: Feature) -> Option<Value> {
    let literal = feature.default_literal()?;
    let ty = feature.value_type()?;
    Value::parse(&literal, &ty).ok()
}
