//! XMI (XML Metadata Interchange) format support.
//!
//! ## XMI Structure
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <lib:Library xmi:version="2.0" xmlns:xmi="http://www.omg.org/XMI"
//!     xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
//!     xmlns:lib="http://example.org/lib" name="City">
//!   <books title="Dune" author="//@writers.0"/>
//!   <books xsi:type="lib:Comic" title="Maus"/>
//!   <writers name="Frank Herbert" books="//@books.0"/>
//!   <tags>fiction</tags>
//! </lib:Library>
//! ```
//!
//! Single-valued attributes are XML attributes, containment values are child
//! elements named after their feature, many-valued attributes are repeated
//! child elements. Several roots are wrapped in `xmi:XMI`.

use super::{InterchangeError, LoadContext, ModelFormat, SaveContext, SaveOptions};

/// XMI namespace URIs.
pub mod namespace {
    /// XMI 2.0 namespace (used with `xmi:version="2.0"`).
    pub const XMI: &str = "http://www.omg.org/XMI";
    /// XSI namespace for `xsi:type`.
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
}

/// XMI format handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xmi;

impl ModelFormat for Xmi {
    fn name(&self) -> &'static str {
        "XMI"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["xmi", "ecore"]
    }

    fn mime_type(&self) -> &'static str {
        "application/xmi+xml"
    }

    fn read(&self, input: &[u8], ctx: &mut LoadContext<'_>) -> Result<(), InterchangeError> {
        reader::XmiReader::new().read(input, ctx)
    }

    fn write(&self, ctx: &SaveContext<'_>, options: &SaveOptions) -> Result<Vec<u8>, InterchangeError> {
        writer::XmiWriter::new(ctx, options).write()
    }

    fn validate(&self, input: &[u8]) -> Result<(), InterchangeError> {
        let content = std::str::from_utf8(input)
            .map_err(|e| InterchangeError::xml(format!("Invalid UTF-8: {e}")))?;
        if !content.trim_start().starts_with('<') {
            return Err(InterchangeError::xml("Missing root element"));
        }
        Ok(())
    }
}

// ============================================================================
// XMI READER
// ============================================================================

mod reader {
    use super::*;
    use crate::graph::ObjectId;
    use crate::meta::{Class, Feature, ecore};
    use quick_xml::Reader;
    use quick_xml::events::{BytesStart, Event};
    use rustc_hash::FxHashMap;

    /// What an open element stands for.
    enum Frame {
        /// The `xmi:XMI` wrapper around several roots.
        Wrapper,
        /// An object; its children are feature elements.
        Object(ObjectId),
        /// An attribute value given as element text.
        Text {
            object: ObjectId,
            feature: Feature,
            text: String,
        },
        /// An element whose content is ignored.
        Skip,
    }

    /// XMI document reader.
    pub struct XmiReader {
        /// Prefix → namespace URI, from every `xmlns` declaration seen.
        namespaces: FxHashMap<String, String>,
        stack: Vec<Frame>,
    }

    impl XmiReader {
        pub fn new() -> Self {
            Self {
                namespaces: FxHashMap::default(),
                stack: Vec::new(),
            }
        }

        pub fn read(&mut self, input: &[u8], ctx: &mut LoadContext<'_>) -> Result<(), InterchangeError> {
            // Not trimmed: value elements keep their text verbatim. Text
            // outside a value element is dropped below.
            let mut reader = Reader::from_reader(input);

            let mut buf = Vec::new();
            let mut seen_root = false;
            loop {
                match reader.read_event_into(&mut buf) {
                    Ok(Event::Start(ref e)) => {
                        self.handle_start_element(e, ctx)?;
                        seen_root = true;
                    }
                    Ok(Event::Empty(ref e)) => {
                        self.handle_start_element(e, ctx)?;
                        self.handle_end_element(ctx)?;
                        seen_root = true;
                    }
                    Ok(Event::End(_)) => {
                        self.handle_end_element(ctx)?;
                    }
                    Ok(Event::Text(ref t)) => {
                        if let Some(Frame::Text { text, .. }) = self.stack.last_mut() {
                            let value = t
                                .unescape()
                                .map_err(|e| InterchangeError::xml(format!("Text error: {e}")))?;
                            text.push_str(&value);
                        }
                    }
                    Ok(Event::CData(ref t)) => {
                        if let Some(Frame::Text { text, .. }) = self.stack.last_mut() {
                            text.push_str(&String::from_utf8_lossy(t.as_ref()));
                        }
                    }
                    Ok(Event::Eof) => break,
                    Err(e) => {
                        return Err(InterchangeError::xml(format!(
                            "XML parse error at position {}: {e}",
                            reader.error_position()
                        )));
                    }
                    _ => {}
                }
                buf.clear();
            }
            if !seen_root {
                return Err(InterchangeError::missing_element("root"));
            }
            Ok(())
        }

        fn handle_start_element(&mut self, e: &BytesStart<'_>, ctx: &mut LoadContext<'_>) -> Result<(), InterchangeError> {
            let tag = std::str::from_utf8(e.name().as_ref())
                .map_err(|e| InterchangeError::xml(format!("Invalid tag name: {e}")))?
                .to_string();
            let attrs = Self::attributes(e)?;
            for (key, value) in &attrs {
                if key == "xmlns" {
                    self.namespaces.insert(String::new(), value.clone());
                } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                    self.namespaces.insert(prefix.to_string(), value.clone());
                }
            }

            let frame = match self.stack.last() {
                None if self.is_xmi_wrapper(&tag) => Frame::Wrapper,
                None | Some(Frame::Wrapper) => {
                    let class = self.class_of_qname(ctx, &tag)?;
                    let object = ctx.create(class)?;
                    ctx.add_root(object)?;
                    self.apply_attributes(ctx, object, class, &attrs)?;
                    Frame::Object(object)
                }
                Some(Frame::Object(parent)) => self.feature_element(ctx, *parent, &tag, &attrs)?,
                Some(Frame::Text { .. } | Frame::Skip) => Frame::Skip,
            };
            self.stack.push(frame);
            Ok(())
        }

        fn handle_end_element(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), InterchangeError> {
            if let Some(Frame::Text {
                object,
                feature,
                text,
            }) = self.stack.pop()
            {
                ctx.set_text(object, feature, &text)?;
            }
            Ok(())
        }

        /// A child element of an object: a contained object, an href, or a value.
        fn feature_element(
            &self,
            ctx: &mut LoadContext<'_>,
            parent: ObjectId,
            tag: &str,
            attrs: &[(String, String)],
        ) -> Result<Frame, InterchangeError> {
            let class = ctx
                .graph()
                .class_of(parent)
                .ok_or_else(|| InterchangeError::malformed(format!("no object for <{tag}>")))?;
            let Some(feature) = class.feature(tag) else {
                return Self::unknown_feature(class, tag).map(|()| Frame::Skip);
            };
            if feature.is_attribute() {
                return Ok(Frame::Text {
                    object: parent,
                    feature,
                    text: String::new(),
                });
            }
            let type_tag = attrs
                .iter()
                .find(|(k, _)| k == "xsi:type" || k == "xmi:type")
                .map(|(_, v)| v.as_str());
            if let Some((_, href)) = attrs.iter().find(|(k, _)| k == "href") {
                let hint = type_tag.map(|t| self.class_of_qname(ctx, t)).transpose()?;
                ctx.defer(parent, feature, href, hint);
                return Ok(Frame::Skip);
            }
            if !feature.is_containment() {
                return Ok(Frame::Skip);
            }
            let child_class = match type_tag {
                Some(t) => self.class_of_qname(ctx, t)?,
                None => feature.target().unwrap_or_else(|| ecore::ecore().e_object),
            };
            let child = ctx.create(child_class)?;
            ctx.set_value(parent, feature, child.into())?;
            self.apply_attributes(ctx, child, child_class, attrs)?;
            Ok(Frame::Object(child))
        }

        fn apply_attributes(
            &self,
            ctx: &mut LoadContext<'_>,
            object: ObjectId,
            class: Class,
            attrs: &[(String, String)],
        ) -> Result<(), InterchangeError> {
            for (key, value) in attrs {
                match key.as_str() {
                    "xmi:id" => {
                        ctx.record_id(object, value);
                        continue;
                    }
                    "xmlns" | "href" => continue,
                    k if k.contains(':') => continue,
                    _ => {}
                }
                let Some(feature) = class.feature(key) else {
                    Self::unknown_feature(class, key)?;
                    continue;
                };
                if feature.is_attribute() {
                    if feature.is_many() {
                        for token in value.split_whitespace() {
                            ctx.set_text(object, feature, token)?;
                        }
                    } else {
                        ctx.set_text(object, feature, value)?;
                    }
                    continue;
                }
                // `ecore:EDataType http://...#//EString` announces the type of the next href.
                let mut hint = None;
                for token in value.split_whitespace() {
                    if token.contains(':') && !token.contains('#') && !token.contains('/') {
                        hint = Some(self.class_of_qname(ctx, token)?);
                        continue;
                    }
                    ctx.defer(object, feature, token, hint.take());
                }
            }
            Ok(())
        }

        /// Ecore models may carry annotations and generics this engine does not
        /// model; those are skipped. Anything else is an error.
        fn unknown_feature(class: Class, name: &str) -> Result<(), InterchangeError> {
            if class.package() == Some(ecore::ecore().package) {
                tracing::trace!(class = %class.name(), feature = name, "skipping unsupported Ecore feature");
                return Ok(());
            }
            Err(InterchangeError::unknown_feature(class.name().to_string(), name))
        }

        fn class_of_qname(&self, ctx: &LoadContext<'_>, qname: &str) -> Result<Class, InterchangeError> {
            let (prefix, local) = qname.split_once(':').unwrap_or(("", qname));
            let ns_uri = self
                .namespaces
                .get(prefix)
                .ok_or_else(|| InterchangeError::UnknownPackage(format!("undeclared prefix '{prefix}'")))?;
            let package = ctx.package(ns_uri)?;
            LoadContext::class_in(package, local)
        }

        fn is_xmi_wrapper(&self, tag: &str) -> bool {
            let (prefix, local) = tag.split_once(':').unwrap_or(("", tag));
            local == "XMI"
                && self
                    .namespaces
                    .get(prefix)
                    .is_none_or(|ns| ns.starts_with(namespace::XMI) || ns.contains("/XMI"))
        }

        fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, InterchangeError> {
            let mut out = Vec::new();
            for attr_result in e.attributes() {
                let attr = attr_result.map_err(|e| InterchangeError::xml(format!("Attribute error: {e}")))?;
                let key = std::str::from_utf8(attr.key.as_ref())
                    .map_err(|e| InterchangeError::xml(format!("Attribute key error: {e}")))?
                    .to_string();
                let value = attr
                    .unescape_value()
                    .map_err(|e| InterchangeError::xml(format!("Attribute value error: {e}")))?
                    .to_string();
                out.push((key, value));
            }
            Ok(out)
        }
    }
}

// ============================================================================
// XMI WRITER
// ============================================================================

mod writer {
    use super::*;
    use crate::graph::{ObjectGraph, ObjectId, Value};
    use crate::interchange::ReferenceTarget;
    use crate::meta::{Class, Feature, Package};
    use indexmap::IndexMap;
    use quick_xml::Writer;
    use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

    /// XMI document writer.
    pub struct XmiWriter<'c, 'a> {
        ctx: &'c SaveContext<'a>,
        options: &'c SaveOptions,
        graph: &'a ObjectGraph,
        /// nsURI → prefix, in declaration order.
        prefixes: IndexMap<String, String>,
    }

    impl<'c, 'a> XmiWriter<'c, 'a> {
        pub fn new(ctx: &'c SaveContext<'a>, options: &'c SaveOptions) -> Self {
            Self {
                ctx,
                options,
                graph: ctx.graph(),
                prefixes: IndexMap::new(),
            }
        }

        pub fn write(mut self) -> Result<Vec<u8>, InterchangeError> {
            let roots = self.ctx.roots();
            self.collect_packages(roots)?;

            let mut writer = if self.options.indent > 0 {
                Writer::new_with_indent(Vec::new(), b' ', self.options.indent)
            } else {
                Writer::new(Vec::new())
            };
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                .map_err(write_error)?;

            match roots {
                [] => {
                    let mut start = BytesStart::new("xmi:XMI");
                    self.push_header(&mut start);
                    writer.write_event(Event::Empty(start)).map_err(write_error)?;
                }
                [root] => {
                    let tag = self.qname(self.class(*root)?)?;
                    self.write_object(&mut writer, *root, &tag, None, true)?;
                }
                _ => {
                    let mut start = BytesStart::new("xmi:XMI");
                    self.push_header(&mut start);
                    writer.write_event(Event::Start(start)).map_err(write_error)?;
                    for root in roots {
                        let tag = self.qname(self.class(*root)?)?;
                        self.write_object(&mut writer, *root, &tag, None, false)?;
                    }
                    writer
                        .write_event(Event::End(BytesEnd::new("xmi:XMI")))
                        .map_err(write_error)?;
                }
            }

            let mut output = writer.into_inner();
            output.push(b'\n');
            Ok(output)
        }

        /// Declare every package whose classes appear as tags or type tags.
        fn collect_packages(&mut self, roots: &[ObjectId]) -> Result<(), InterchangeError> {
            for root in roots {
                let objects: Vec<ObjectId> = std::iter::once(*root).chain(self.graph.all_contents(*root)).collect();
                for object in objects {
                    let class = self.class(object)?;
                    self.declare(class)?;
                    for feature in class.all_features() {
                        if !self.writes_reference(object, feature)? {
                            continue;
                        }
                        for target in self.graph.get_objects(object, feature)? {
                            if let Some(class) = self.type_tag_class(target, feature)? {
                                self.declare(class)?;
                            }
                        }
                    }
                }
            }
            Ok(())
        }

        fn declare(&mut self, class: Class) -> Result<(), InterchangeError> {
            let package = package_of(class)?;
            let ns_uri = package.ns_uri().to_string();
            if self.prefixes.contains_key(&ns_uri) {
                return Ok(());
            }
            let base = match &*package.ns_prefix() {
                "" => package.name().to_string(),
                prefix => prefix.to_string(),
            };
            let mut prefix = base.clone();
            let mut n = 1;
            while self.prefixes.values().any(|p| *p == prefix) || prefix == "xmi" || prefix == "xsi" {
                prefix = format!("{base}{n}");
                n += 1;
            }
            self.prefixes.insert(ns_uri, prefix);
            Ok(())
        }

        fn push_header(&self, start: &mut BytesStart<'_>) {
            start.push_attribute(("xmi:version", "2.0"));
            start.push_attribute(("xmlns:xmi", namespace::XMI));
            start.push_attribute(("xmlns:xsi", namespace::XSI));
            for (ns_uri, prefix) in &self.prefixes {
                start.push_attribute((format!("xmlns:{prefix}").as_str(), ns_uri.as_str()));
            }
        }

        fn write_object(
            &self,
            writer: &mut Writer<Vec<u8>>,
            object: ObjectId,
            tag: &str,
            declared: Option<Class>,
            document_root: bool,
        ) -> Result<(), InterchangeError> {
            let class = self.class(object)?;
            let mut start = BytesStart::new(tag);
            if document_root {
                self.push_header(&mut start);
            }
            if declared.is_some() {
                if self.options.use_explicit_type_tag {
                    start.push_attribute(("xmi:type", self.qname(class)?.as_str()));
                } else if declared != Some(class) {
                    start.push_attribute(("xsi:type", self.qname(class)?.as_str()));
                }
            }
            if let Some(id) = self.ctx.id_of(object) {
                start.push_attribute(("xmi:id", id));
            }

            let mut children: Vec<Child> = Vec::new();
            for feature in class.all_features() {
                if feature.is_transient() || !self.graph.is_set(object, feature)? {
                    continue;
                }
                if feature.is_attribute() {
                    let values = self.graph.get(object, feature)?.into_values();
                    if feature.is_many() {
                        children.extend(values.into_iter().map(|v| Child::Text(feature, v)));
                    } else if let Some(text) = values.first().and_then(Value::to_text) {
                        start.push_attribute((&*feature.name(), text.as_str()));
                    }
                    continue;
                }
                if feature.is_containment() {
                    for child in self.graph.get_objects(object, feature)? {
                        children.push(Child::Contained(feature, child));
                    }
                    continue;
                }
                if !self.writes_reference(object, feature)? {
                    continue;
                }
                let targets = self.graph.get_objects(object, feature)?;
                let mut refs = Vec::with_capacity(targets.len());
                for target in &targets {
                    refs.push((*target, self.ctx.reference(*target)?));
                }
                if refs.iter().all(|(_, r)| matches!(r, ReferenceTarget::Local(_))) {
                    let joined = refs
                        .iter()
                        .filter_map(|(_, r)| match r {
                            ReferenceTarget::Local(fragment) => Some(fragment.as_str()),
                            ReferenceTarget::External { .. } => None,
                        })
                        .collect::<Vec<_>>()
                        .join(" ");
                    start.push_attribute((&*feature.name(), joined.as_str()));
                } else {
                    children.extend(refs.into_iter().map(|(t, r)| Child::Href(feature, t, r)));
                }
            }

            if children.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(write_error)?;
                return Ok(());
            }
            writer.write_event(Event::Start(start)).map_err(write_error)?;
            for child in children {
                match child {
                    Child::Text(feature, value) => {
                        let name = feature.name();
                        let text = value.to_text().unwrap_or_default();
                        writer
                            .write_event(Event::Start(BytesStart::new(&*name)))
                            .map_err(write_error)?;
                        writer
                            .write_event(Event::Text(BytesText::new(&text)))
                            .map_err(write_error)?;
                        writer
                            .write_event(Event::End(BytesEnd::new(&*name)))
                            .map_err(write_error)?;
                    }
                    Child::Contained(feature, child) if self.graph.is_proxy(child) => {
                        let reference = self.ctx.reference(child)?;
                        self.write_href(writer, feature, child, reference)?;
                    }
                    Child::Contained(feature, child) => {
                        self.write_object(writer, child, &feature.name(), feature.target(), false)?;
                    }
                    Child::Href(feature, target, reference) => {
                        self.write_href(writer, feature, target, reference)?;
                    }
                }
            }
            writer
                .write_event(Event::End(BytesEnd::new(tag)))
                .map_err(write_error)?;
            Ok(())
        }

        fn write_href(
            &self,
            writer: &mut Writer<Vec<u8>>,
            feature: Feature,
            target: ObjectId,
            reference: ReferenceTarget,
        ) -> Result<(), InterchangeError> {
            let name = feature.name();
            let mut start = BytesStart::new(&*name);
            if let Some(class) = self.type_tag_class(target, feature)? {
                let key = if self.options.use_explicit_type_tag { "xmi:type" } else { "xsi:type" };
                start.push_attribute((key, self.qname(class)?.as_str()));
            }
            let href = match reference {
                ReferenceTarget::Local(fragment) => format!("#{fragment}"),
                ReferenceTarget::External { href, .. } => href,
            };
            start.push_attribute(("href", href.as_str()));
            writer.write_event(Event::Empty(start)).map_err(write_error)?;
            Ok(())
        }

        /// Non-containment references are written unless they are the
        /// container side of a containment pair.
        fn writes_reference(&self, object: ObjectId, feature: Feature) -> Result<bool, InterchangeError> {
            Ok(feature.is_reference()
                && !feature.is_containment()
                && !feature.is_container()
                && !feature.is_transient()
                && self.graph.is_set(object, feature)?)
        }

        /// The class to announce for an href target, when it is not the
        /// feature's declared type.
        fn type_tag_class(&self, target: ObjectId, feature: Feature) -> Result<Option<Class>, InterchangeError> {
            let class = match self.ctx.reference(target)? {
                ReferenceTarget::Local(_) => return Ok(None),
                ReferenceTarget::External { class, .. } => class,
            };
            Ok(class.filter(|c| self.options.use_explicit_type_tag || feature.target() != Some(*c)))
        }

        fn class(&self, object: ObjectId) -> Result<Class, InterchangeError> {
            self.graph
                .class_of(object)
                .ok_or_else(|| InterchangeError::UnresolvedReference(format!("{object} is an unresolved proxy")))
        }

        fn qname(&self, class: Class) -> Result<String, InterchangeError> {
            let package = package_of(class)?;
            let prefix = self
                .prefixes
                .get(&*package.ns_uri())
                .ok_or_else(|| InterchangeError::UnknownPackage(package.ns_uri().to_string()))?;
            Ok(format!("{prefix}:{}", class.name()))
        }
    }

    enum Child {
        Text(Feature, Value),
        Contained(Feature, ObjectId),
        Href(Feature, ObjectId, ReferenceTarget),
    }

    fn package_of(class: Class) -> Result<Package, InterchangeError> {
        class
            .package()
            .ok_or_else(|| InterchangeError::malformed(format!("class '{}' belongs to no package", class.name())))
    }

    fn write_error(e: impl std::fmt::Display) -> InterchangeError {
        InterchangeError::xml(format!("Write error: {e}"))
    }
}
