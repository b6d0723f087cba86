//! Feature writes with containment and opposite synchronization.
//!
//! Public operations validate everything that can fail first, then apply
//! the change through `basic_insert` / `basic_erase`, which touch exactly one
//! side of one link. Only containment-side inserts and erases maintain the
//! `container` back-pointer.

use super::object::Slot;
use super::{AsFeature, ModelError, ObjectGraph, ObjectId, Value};
use crate::meta::{DataType, Feature, ValueType};

impl ObjectGraph {
    /// Set a single-valued feature.
    pub fn set(&mut self, id: ObjectId, feature: impl AsFeature, value: impl Into<Value>) -> Result<(), ModelError> {
        let feature = self.feature(id, feature)?;
        if feature.is_many() {
            return Err(ModelError::multiplicity(feature, "is many-valued, use add"));
        }
        match self.check_value(feature, value.into())? {
            Value::Object(target) => self.add_ref(id, feature, target),
            value => {
                self.data_mut(id)?.values.insert(feature, vec![value]);
                Ok(())
            }
        }
    }

    /// Append to a many-valued feature. Adding a value a unique feature
    /// already holds does nothing.
    pub fn add(&mut self, id: ObjectId, feature: impl AsFeature, value: impl Into<Value>) -> Result<(), ModelError> {
        let feature = self.feature(id, feature)?;
        if !feature.is_many() {
            return Err(ModelError::multiplicity(feature, "is single-valued, use set"));
        }
        match self.check_value(feature, value.into())? {
            Value::Object(target) => self.add_ref(id, feature, target),
            value => {
                let unique = feature.is_unique();
                let multiplicity = feature.multiplicity();
                let values = self.data_mut(id)?.values.entry(feature).or_default();
                if unique && values.contains(&value) {
                    return Ok(());
                }
                if !multiplicity.allows(values.len() + 1) {
                    return Err(ModelError::multiplicity(
                        feature,
                        format!("holds at most {multiplicity}"),
                    ));
                }
                values.push(value);
                Ok(())
            }
        }
    }

    /// Remove the first occurrence of `value` from a many-valued feature.
    /// Returns whether anything was removed.
    pub fn remove(&mut self, id: ObjectId, feature: impl AsFeature, value: impl Into<Value>) -> Result<bool, ModelError> {
        let feature = self.feature(id, feature)?;
        if !feature.is_many() {
            return Err(ModelError::multiplicity(feature, "is single-valued, use unset"));
        }
        match self.check_value(feature, value.into())? {
            Value::Object(target) => self.remove_ref(id, feature, target),
            value => {
                let data = self.data_mut(id)?;
                let Some(values) = data.values.get_mut(&feature) else {
                    return Ok(false);
                };
                let Some(pos) = values.iter().position(|v| *v == value) else {
                    return Ok(false);
                };
                values.remove(pos);
                if values.is_empty() {
                    data.values.remove(&feature);
                }
                Ok(true)
            }
        }
    }

    /// Reset a feature to its unset state, unlinking any referenced objects.
    pub fn unset(&mut self, id: ObjectId, feature: impl AsFeature) -> Result<(), ModelError> {
        let feature = self.feature(id, feature)?;
        if feature.is_reference() {
            for value in self.raw_values(id, feature)?.into_iter().rev() {
                if let Value::Object(target) = value {
                    self.remove_ref(id, feature, target)?;
                }
            }
        }
        self.data_mut(id)?.values.remove(&feature);
        Ok(())
    }

    /// Remove every value of a many-valued feature.
    pub fn clear(&mut self, id: ObjectId, feature: impl AsFeature) -> Result<(), ModelError> {
        let feature = self.feature(id, feature)?;
        if !feature.is_many() {
            return Err(ModelError::multiplicity(feature, "is single-valued, use unset"));
        }
        self.unset(id, feature)
    }

    /// Remove `id` from its container, if it has one.
    pub fn detach(&mut self, id: ObjectId) -> Result<(), ModelError> {
        if self.is_proxy(id) {
            return Ok(());
        }
        if let Some((parent, feature)) = self.data(id)?.container {
            self.remove_ref(parent, feature, id)?;
        }
        Ok(())
    }

    /// Check `value` against the feature type, widening integers stored in
    /// floating point attributes.
    pub(super) fn check_value(&self, feature: Feature, value: Value) -> Result<Value, ModelError> {
        if let Some(target) = feature.target() {
            let Value::Object(id) = value else {
                return Err(ModelError::type_mismatch(feature, target.name().to_string(), value.kind()));
            };
            if !self.contains(id) {
                return Err(ModelError::NoSuchObject(id));
            }
            let real = self.follow(id);
            if let Some(class) = self.class_of(real) {
                if !class.conforms_to(target) {
                    return Err(ModelError::type_mismatch(
                        feature,
                        target.name().to_string(),
                        class.name().to_string(),
                    ));
                }
            } else if let Some(expected) = self.proxy_expected_type(real) {
                if !expected.conforms_to(target) && !target.conforms_to(expected) {
                    return Err(ModelError::type_mismatch(
                        feature,
                        target.name().to_string(),
                        format!("proxy of {}", expected.name()),
                    ));
                }
            }
            return Ok(Value::Object(real));
        }

        let Some(ty) = feature.value_type() else {
            return Err(ModelError::type_mismatch(feature, "a value", value.kind()));
        };
        let accepted = match (&ty, value) {
            (ValueType::Enum(e), Value::Literal(l)) if l.enumeration() == *e => Value::Literal(l),
            (ValueType::Data(DataType::Boolean), Value::Bool(b)) => Value::Bool(b),
            (ValueType::Data(dt), Value::Int(i)) if dt.is_integral() => Value::Int(i),
            (ValueType::Data(dt), Value::Int(i)) if dt.is_floating() => Value::Float(i as f64),
            (ValueType::Data(dt), Value::Float(f)) if dt.is_floating() => Value::Float(f),
            (ValueType::Data(DataType::String | DataType::Char | DataType::Other(_)), Value::String(s)) => {
                Value::String(s)
            }
            (ty, other) => {
                let expected = match ty {
                    ValueType::Enum(e) => format!("a literal of {}", e.name()),
                    ValueType::Data(dt) => dt.ecore_name().to_string(),
                };
                return Err(ModelError::type_mismatch(feature, expected, other.kind()));
            }
        };
        Ok(accepted)
    }

    /// Link `owner.feature` to `value`, keeping containment and opposites
    /// consistent. `value` has passed `check_value`.
    fn add_ref(&mut self, owner: ObjectId, feature: Feature, value: ObjectId) -> Result<(), ModelError> {
        let owner = self.follow(owner);
        let value = self.follow(value);
        let loaded = !self.is_proxy(value);
        let opposite = feature.opposite();
        let current = self.raw_values(owner, feature)?;

        let present = current.iter().any(|v| self.refers_to(v, value));
        if present && (!feature.is_many() || feature.is_unique() || opposite.is_some() || feature.is_containment()) {
            return Ok(());
        }
        if feature.is_many() && !feature.multiplicity().allows(current.len() + 1) {
            return Err(ModelError::multiplicity(
                feature,
                format!("holds at most {}", feature.multiplicity()),
            ));
        }
        if loaded {
            if feature.is_containment() && (value == owner || self.is_ancestor(value, owner)) {
                return Err(ModelError::ContainmentCycle {
                    parent: owner,
                    feature: feature.name(),
                    child: value,
                });
            }
            if let Some(opp) = opposite.filter(|o| o.is_containment()) {
                if value == owner || self.is_ancestor(owner, value) {
                    return Err(ModelError::ContainmentCycle {
                        parent: value,
                        feature: opp.name(),
                        child: owner,
                    });
                }
            }
        }

        if !feature.is_many() {
            if let Some(old) = current.first().and_then(Value::as_object) {
                self.remove_ref(owner, feature, old)?;
            }
        }
        if loaded {
            if feature.is_containment() {
                self.detach(value)?;
            }
            if let Some(opp) = opposite {
                if opp.is_containment() {
                    self.detach(owner)?;
                }
                if !opp.is_many() {
                    let previous = self.raw_values(value, opp)?.first().and_then(Value::as_object);
                    if let Some(previous) = previous.filter(|p| self.follow(*p) != owner) {
                        self.remove_ref(value, opp, previous)?;
                    }
                }
                self.basic_insert(value, opp, owner)?;
            }
        }
        self.basic_insert(owner, feature, value)
    }

    /// Unlink `owner.feature` from `value` on both sides.
    fn remove_ref(&mut self, owner: ObjectId, feature: Feature, value: ObjectId) -> Result<bool, ModelError> {
        let owner = self.follow(owner);
        let value = self.follow(value);
        if !self.basic_erase(owner, feature, value)? {
            return Ok(false);
        }
        if let Some(opp) = feature.opposite() {
            if !self.is_proxy(value) {
                self.basic_erase(value, opp, owner)?;
            }
        }
        Ok(true)
    }

    fn refers_to(&self, stored: &Value, target: ObjectId) -> bool {
        matches!(stored, Value::Object(id) if self.follow(*id) == target)
    }

    fn basic_insert(&mut self, owner: ObjectId, feature: Feature, value: ObjectId) -> Result<(), ModelError> {
        let already = self
            .raw_values(owner, feature)?
            .iter()
            .any(|v| self.refers_to(v, value));
        {
            let values = self.data_mut(owner)?.values.entry(feature).or_default();
            if !feature.is_many() {
                values.clear();
                values.push(Value::Object(value));
            } else if !already || !feature.is_unique() {
                values.push(Value::Object(value));
            }
        }
        if feature.is_containment() {
            if let Some(Slot::Object(data)) = self.slots.get_mut(value.index()) {
                data.container = Some((owner, feature));
            }
        }
        Ok(())
    }

    fn basic_erase(&mut self, owner: ObjectId, feature: Feature, value: ObjectId) -> Result<bool, ModelError> {
        let position = self
            .raw_values(owner, feature)?
            .iter()
            .position(|v| self.refers_to(v, value));
        let Some(position) = position else {
            return Ok(false);
        };
        let data = self.data_mut(owner)?;
        if let Some(values) = data.values.get_mut(&feature) {
            values.remove(position);
            if values.is_empty() {
                data.values.remove(&feature);
            }
        }
        if feature.is_containment() {
            if let Some(Slot::Object(child)) = self.slots.get_mut(value.index()) {
                if child.container == Some((owner, feature)) {
                    child.container = None;
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Class, Enumeration, Multiplicity, Package};

    struct Tree {
        node: Class,
        children: Feature,
        parent: Feature,
        friend: Feature,
    }

    fn tree(tag: &str) -> Tree {
        let p = Package::new(tag, &format!("http://mutate.test/{tag}"), tag);
        let node = p.define_class("Node", &[], false).expect("Node");
        node.add_attribute("name", DataType::String, Multiplicity::OPTIONAL)
            .expect("name");
        let children = node
            .add_reference("children", node, Multiplicity::MANY, true)
            .expect("children");
        let parent = node
            .add_reference("parent", node, Multiplicity::OPTIONAL, false)
            .expect("parent");
        children.set_opposite(parent).expect("opposite");
        let friend = node
            .add_reference("friend", node, Multiplicity::OPTIONAL, false)
            .expect("friend");
        friend.set_opposite(friend).expect("self opposite");
        Tree {
            node,
            children,
            parent,
            friend,
        }
    }

    #[test]
    fn test_add_child_sets_parent() {
        let t = tree("add_child");
        let mut g = ObjectGraph::new();
        let a = g.create(t.node).unwrap();
        let b = g.create(t.node).unwrap();
        g.add(a, t.children, b).unwrap();
        assert_eq!(g.get_object(b, t.parent).unwrap(), Some(a));
        assert_eq!(g.container(b), Some(a));
        assert_eq!(g.containing_feature(b), Some(t.children));

        g.remove(a, t.children, b).unwrap();
        assert_eq!(g.get_object(b, t.parent).unwrap(), None);
        assert_eq!(g.container(b), None);
    }

    #[test]
    fn test_set_parent_adds_child() {
        let t = tree("set_parent");
        let mut g = ObjectGraph::new();
        let a = g.create(t.node).unwrap();
        let b = g.create(t.node).unwrap();
        g.set(b, "parent", a).unwrap();
        assert_eq!(g.get_objects(a, "children").unwrap(), vec![b]);
        assert_eq!(g.container(b), Some(a));

        g.unset(b, t.parent).unwrap();
        assert!(g.get_objects(a, t.children).unwrap().is_empty());
        assert_eq!(g.container(b), None);
    }

    #[test]
    fn test_move_between_containers() {
        let t = tree("move");
        let mut g = ObjectGraph::new();
        let a1 = g.create(t.node).unwrap();
        let a2 = g.create(t.node).unwrap();
        let b = g.create(t.node).unwrap();
        g.add(a1, t.children, b).unwrap();
        g.add(a2, t.children, b).unwrap();
        assert!(g.get_objects(a1, t.children).unwrap().is_empty());
        assert_eq!(g.get_objects(a2, t.children).unwrap(), vec![b]);
        assert_eq!(g.get_object(b, t.parent).unwrap(), Some(a2));
    }

    #[test]
    fn test_reparent_through_container_side() {
        let t = tree("reparent");
        let mut g = ObjectGraph::new();
        let a1 = g.create(t.node).unwrap();
        let a2 = g.create(t.node).unwrap();
        let b = g.create(t.node).unwrap();
        g.set(b, t.parent, a1).unwrap();
        g.set(b, t.parent, a2).unwrap();
        assert!(g.get_objects(a1, t.children).unwrap().is_empty());
        assert_eq!(g.get_objects(a2, t.children).unwrap(), vec![b]);
        assert_eq!(g.container(b), Some(a2));
    }

    #[test]
    fn test_containment_cycle_rejected() {
        let t = tree("cycle");
        let mut g = ObjectGraph::new();
        let a = g.create(t.node).unwrap();
        let b = g.create(t.node).unwrap();
        let c = g.create(t.node).unwrap();
        g.add(a, t.children, b).unwrap();
        g.add(b, t.children, c).unwrap();

        let err = g.add(c, t.children, a).unwrap_err();
        assert!(matches!(err, ModelError::ContainmentCycle { .. }));
        let err = g.add(a, t.children, a).unwrap_err();
        assert!(matches!(err, ModelError::ContainmentCycle { .. }));
        let err = g.set(a, t.parent, c).unwrap_err();
        assert!(matches!(err, ModelError::ContainmentCycle { .. }));

        // unchanged
        assert_eq!(g.container(a), None);
        assert_eq!(g.get_objects(b, t.children).unwrap(), vec![c]);
    }

    #[test]
    fn test_single_opposite_steals_partner() {
        let t = tree("partners");
        let mut g = ObjectGraph::new();
        let a = g.create(t.node).unwrap();
        let b = g.create(t.node).unwrap();
        let c = g.create(t.node).unwrap();
        g.set(a, t.friend, b).unwrap();
        assert_eq!(g.get_object(b, t.friend).unwrap(), Some(a));

        g.set(c, t.friend, b).unwrap();
        assert_eq!(g.get_object(b, t.friend).unwrap(), Some(c));
        assert_eq!(g.get_object(a, t.friend).unwrap(), None);
    }

    #[test]
    fn test_type_mismatch_leaves_graph_unchanged() {
        let t = tree("mismatch");
        let other = Class::new("Other", &[], false).unwrap();
        let mut g = ObjectGraph::new();
        let a = g.create(t.node).unwrap();
        let o = g.create(other).unwrap();
        let err = g.add(a, t.children, o).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
        assert!(!g.is_set(a, t.children).unwrap());

        let err = g.set(a, "name", 42).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
    }

    #[test]
    fn test_multiplicity_misuse() {
        let t = tree("multiplicity");
        let mut g = ObjectGraph::new();
        let a = g.create(t.node).unwrap();
        let b = g.create(t.node).unwrap();
        assert!(matches!(g.set(a, t.children, b), Err(ModelError::Multiplicity { .. })));
        assert!(matches!(g.add(a, t.parent, b), Err(ModelError::Multiplicity { .. })));
        assert!(matches!(
            g.set(a, "missing", 1),
            Err(ModelError::UnknownFeature { .. })
        ));
    }

    #[test]
    fn test_int_widens_into_float_attribute() {
        let p = Package::new("widen", "http://mutate.test/widen", "widen");
        let c = p.define_class("Point", &[], false).unwrap();
        let x = c
            .add_attribute("x", DataType::Double, Multiplicity::OPTIONAL)
            .unwrap();
        let mut g = ObjectGraph::new();
        let pt = g.create(c).unwrap();
        g.set(pt, x, 3).unwrap();
        assert_eq!(g.get_value(pt, x).unwrap(), Some(Value::Float(3.0)));
    }

    #[test]
    fn test_many_valued_attributes_keep_duplicates() {
        let p = Package::new("multi_attr", "http://mutate.test/multi_attr", "ma");
        let c = p.define_class("Bag", &[], false).unwrap();
        let items = c
            .add_attribute("items", DataType::Int, Multiplicity::MANY)
            .unwrap();
        let mut g = ObjectGraph::new();
        let bag = g.create(c).unwrap();
        for v in [1, 2, 1] {
            g.add(bag, items, v).unwrap();
        }
        assert_eq!(
            g.get_many(bag, items).unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(1)]
        );
        assert!(g.remove(bag, items, 1).unwrap());
        assert_eq!(g.get_many(bag, items).unwrap(), vec![Value::Int(2), Value::Int(1)]);
        assert!(!g.remove(bag, items, 7).unwrap());
    }

    #[test]
    fn test_enum_literal_must_match_enumeration() {
        let p = Package::new("enum_attr", "http://mutate.test/enum_attr", "ea");
        let color = p.define_enum("Color", &["red", "blue"]).unwrap();
        let other = Enumeration::new("Shape", &["round"]);
        let c = p.define_class("Thing", &[], false).unwrap();
        let col = c
            .add_attribute("color", color, Multiplicity::OPTIONAL)
            .unwrap();
        let mut g = ObjectGraph::new();
        let t = g.create(c).unwrap();
        let blue = color.literal("blue").unwrap();
        g.set(t, col, blue).unwrap();
        assert_eq!(g.get_literal(t, col).unwrap(), Some(blue));
        let round = other.literal("round").unwrap();
        assert!(matches!(g.set(t, col, round), Err(ModelError::TypeMismatch { .. })));
    }

    #[test]
    fn test_abstract_class_cannot_be_instantiated() {
        let abs = Class::new("AbstractThing", &[], true).unwrap();
        let mut g = ObjectGraph::new();
        assert!(matches!(g.create(abs), Err(ModelError::Instantiation(_))));
        assert!(g.is_empty());
    }

    #[test]
    fn test_instantiate_with_initial_values() {
        let t = tree("instantiate");
        let mut g = ObjectGraph::new();
        let child = g.create(t.node).unwrap();
        let root = g
            .instantiate(
                t.node,
                [("name", Value::from("root")), ("children", Value::from(child))],
            )
            .unwrap();
        assert_eq!(g.get_str(root, "name").unwrap().as_deref(), Some("root"));
        assert_eq!(g.container(child), Some(root));

        let before = g.len();
        let err = g.instantiate(t.node, [("name", Value::Int(1))]).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { .. }));
        assert_eq!(g.len(), before);
    }

    #[test]
    fn test_rollback_drops_new_slots_and_links() {
        let t = tree("rollback");
        let mut g = ObjectGraph::new();
        let keep = g.create(t.node).unwrap();
        let mark = g.mark();
        let extra = g.create(t.node).unwrap();
        g.set(keep, t.friend, extra).unwrap();
        g.rollback(mark);
        assert_eq!(g.len(), 1);
        assert_eq!(g.get_object(keep, t.friend).unwrap(), None);
    }
}
