//! Bidirectional term / IRI resolution against a crate's `@context`

use super::specs::{find_specification, latest_specification, nearest_specification, Specification};
use super::value::{ContextItem, ContextValue};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Options that shape how an `@context` is resolved
#[derive(Debug, Clone, Copy)]
pub struct ResolverOptions {
    /// Substituted for unknown context documents whose URI carries no
    /// recognizable version
    pub fallback: &'static Specification,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            fallback: latest_specification(),
        }
    }
}

/// Resolved mapping between short terms and IRIs.
///
/// Built once from a raw `@context` and immutable afterwards; a changed
/// context means building a new resolver.
#[derive(Debug, Clone)]
pub struct ContextResolver {
    /// Raw value this resolver was built from
    source: ContextValue,
    /// Specification table in effect (the last referenced one wins)
    specification: Option<&'static Specification>,
    using_fallback: bool,
    /// term -> IRI
    terms: HashMap<String, String>,
    /// Terms in first-registration order
    order: Vec<String>,
    /// IRI -> first-registered term still mapping to it
    reverse: HashMap<String, String>,
    /// prefix -> namespace, sorted for deterministic longest-match ties
    prefixes: BTreeMap<String, String>,
    /// Prefixes that came from inline definitions rather than a table
    custom_prefixes: Vec<String>,
    vocab: Option<String>,
    base: Option<String>,
}

impl ContextResolver {
    /// A resolver that knows no terms
    pub fn empty() -> Self {
        Self {
            source: ContextValue::empty(),
            specification: None,
            using_fallback: false,
            terms: HashMap::new(),
            order: Vec::new(),
            reverse: HashMap::new(),
            prefixes: BTreeMap::new(),
            custom_prefixes: Vec::new(),
            vocab: None,
            base: None,
        }
    }

    /// Build a resolver for `context` with default options
    pub fn setup(context: &ContextValue) -> Self {
        Self::setup_with(context, ResolverOptions::default())
    }

    /// Build a resolver for `context`.
    ///
    /// Never fails: unknown context documents are replaced by the nearest
    /// bundled specification and flagged through `using_fallback()`.
    pub fn setup_with(context: &ContextValue, options: ResolverOptions) -> Self {
        let mut resolver = Self::empty();
        resolver.source = context.clone();

        for item in context.items() {
            match item {
                ContextItem::Reference(uri) => resolver.load_reference(&uri, options),
                ContextItem::Inline(map) => resolver.load_inline(&map),
            }
        }

        resolver.rebuild_reverse();
        resolver
    }

    fn load_reference(&mut self, uri: &str, options: ResolverOptions) {
        if uri.trim().is_empty() {
            return;
        }
        let spec = match find_specification(uri) {
            Some(spec) => spec,
            None => {
                let spec = nearest_specification(uri, options.fallback);
                tracing::warn!(
                    context = uri,
                    fallback = spec.version,
                    "unknown @context document, using fallback specification"
                );
                self.using_fallback = true;
                spec
            }
        };
        for (term, iri) in spec.terms() {
            self.register(term.to_string(), iri.to_string(), false);
        }
        self.specification = Some(spec);
    }

    fn load_inline(&mut self, map: &Map<String, Value>) {
        for (key, value) in map {
            match key.as_str() {
                "@vocab" => self.vocab = value.as_str().map(str::to_string),
                "@base" => self.base = value.as_str().map(str::to_string),
                k if k.starts_with('@') => {}
                _ => match value {
                    Value::String(iri) => {
                        let iri = self.expand_definition(iri);
                        self.register(key.clone(), iri, true);
                    }
                    Value::Object(def) => match def.get("@id").and_then(Value::as_str) {
                        Some(iri) => {
                            let iri = self.expand_definition(iri);
                            self.register(key.clone(), iri, true);
                        }
                        None => tracing::debug!(term = %key, "term definition without @id ignored"),
                    },
                    Value::Null => self.unregister(key),
                    other => tracing::warn!(term = %key, value = %other, "unsupported term definition ignored"),
                },
            }
        }
    }

    /// Definitions may themselves be compact IRIs (`"ex:thing"`)
    fn expand_definition(&self, iri: &str) -> String {
        if let Some((prefix, local)) = iri.split_once(':') {
            if !local.starts_with("//") {
                if let Some(ns) = self.prefixes.get(prefix) {
                    return format!("{}{}", ns, local);
                }
            }
        }
        iri.to_string()
    }

    fn register(&mut self, term: String, iri: String, custom: bool) {
        if is_prefix_iri(&iri) {
            if custom && !self.custom_prefixes.contains(&term) {
                self.custom_prefixes.push(term.clone());
            }
            self.prefixes.insert(term.clone(), iri.clone());
        } else {
            self.prefixes.remove(&term);
        }
        if !self.terms.contains_key(&term) {
            self.order.push(term.clone());
        }
        self.terms.insert(term, iri);
    }

    fn unregister(&mut self, term: &str) {
        self.terms.remove(term);
        self.prefixes.remove(term);
        self.order.retain(|t| t != term);
        self.custom_prefixes.retain(|t| t != term);
    }

    /// Reverse entries are derived after every override has been applied,
    /// so the chosen term always resolves back to its IRI
    fn rebuild_reverse(&mut self) {
        self.reverse.clear();
        for term in &self.order {
            if let Some(iri) = self.terms.get(term) {
                self.reverse.entry(iri.clone()).or_insert_with(|| term.clone());
            }
        }
    }

    /// Resolve a short or prefixed term to its IRI
    pub fn resolve(&self, term: &str) -> Option<String> {
        if term.is_empty() {
            return None;
        }
        if let Some(iri) = self.terms.get(term) {
            return Some(iri.clone());
        }
        if let Some((prefix, local)) = term.split_once(':') {
            if !local.starts_with("//") {
                if let Some(ns) = self.prefixes.get(prefix) {
                    return Some(format!("{}{}", ns, local));
                }
            }
        }
        if term.contains("://") {
            return Some(term.to_string());
        }
        match &self.vocab {
            Some(vocab) if !term.contains(':') => Some(format!("{}{}", vocab, term)),
            _ => None,
        }
    }

    /// Find a short term for an IRI.
    ///
    /// Tries an exact term, then the longest matching prefix, then `@vocab`.
    /// Only candidates that resolve back to `iri` are returned.
    pub fn reverse(&self, iri: &str) -> Option<String> {
        if iri.is_empty() {
            return None;
        }
        if let Some(term) = self.reverse.get(iri) {
            return Some(term.clone());
        }

        let mut best: Option<(&String, &String)> = None;
        for (prefix, ns) in &self.prefixes {
            if iri.len() > ns.len() && iri.starts_with(ns.as_str()) {
                if best.map_or(true, |(_, b)| ns.len() > b.len()) {
                    best = Some((prefix, ns));
                }
            }
        }
        if let Some((prefix, ns)) = best {
            let candidate = format!("{}:{}", prefix, &iri[ns.len()..]);
            if self.resolve(&candidate).as_deref() == Some(iri) {
                return Some(candidate);
            }
        }

        if let Some(vocab) = &self.vocab {
            if let Some(local) = iri.strip_prefix(vocab.as_str()) {
                if !local.is_empty() && self.resolve(local).as_deref() == Some(iri) {
                    return Some(local.to_string());
                }
            }
        }
        None
    }

    /// Structural comparison against another raw context value
    pub fn is_same_as(&self, other: &ContextValue) -> bool {
        self.source == *other
    }

    /// True when an unknown context document was replaced by a bundled one
    pub fn using_fallback(&self) -> bool {
        self.using_fallback
    }

    pub fn specification(&self) -> Option<&'static Specification> {
        self.specification
    }

    pub fn specification_version(&self) -> Option<&'static str> {
        self.specification.map(|s| s.version)
    }

    pub fn source(&self) -> &ContextValue {
        &self.source
    }

    pub fn vocab(&self) -> Option<&str> {
        self.vocab.as_deref()
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Inline prefixes, in definition order
    pub fn custom_prefixes(&self) -> &[String] {
        &self.custom_prefixes
    }

    /// All `(term, iri)` pairs in registration order
    pub fn terms(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|t| self.terms.get(t).map(|iri| (t.as_str(), iri.as_str())))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.vocab.is_none()
    }
}

impl Default for ContextResolver {
    fn default() -> Self {
        Self::empty()
    }
}

/// IRIs ending in a gen-delim can be used as prefixes
fn is_prefix_iri(iri: &str) -> bool {
    iri.ends_with('/') || iri.ends_with('#') || iri.ends_with(':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::specs::RO_CRATE_1_1;
    use serde_json::json;

    fn setup(raw: Value) -> ContextResolver {
        let value: ContextValue = serde_json::from_value(raw).unwrap();
        ContextResolver::setup(&value)
    }

    #[test]
    fn ro_crate_1_1_terms() {
        let r = setup(json!("https://w3id.org/ro/crate/1.1/context"));
        assert_eq!(r.resolve("Organization").as_deref(), Some("https://schema.org/Organization"));
        assert_eq!(r.resolve("issueTracker"), None);
        assert_eq!(r.specification_version(), Some("v1.1.3"));
        assert!(!r.using_fallback());
    }

    #[test]
    fn ro_crate_1_2_terms() {
        let r = setup(json!("https://w3id.org/ro/crate/1.2/context"));
        assert_eq!(
            r.resolve("issueTracker").as_deref(),
            Some("https://codemeta.github.io/terms/issueTracker")
        );
        assert_eq!(r.resolve("Organization").as_deref(), Some("https://schema.org/Organization"));
    }

    #[test]
    fn custom_prefix_expands() {
        let r = setup(json!([
            "https://w3id.org/ro/crate/1.1/context",
            {"custom": "https://example.org/ns/"}
        ]));
        assert_eq!(
            r.resolve("custom:someTest").as_deref(),
            Some("https://example.org/ns/someTest")
        );
        assert_eq!(r.reverse("https://example.org/ns/someTest").as_deref(), Some("custom:someTest"));
        assert_eq!(r.custom_prefixes(), &["custom".to_string()]);
    }

    #[test]
    fn unregistered_prefix_is_unresolvable() {
        let r = setup(json!("https://w3id.org/ro/crate/1.1/context"));
        assert_eq!(r.resolve("custom:someTest"), None);
    }

    #[test]
    fn vocab_resolves_plain_terms() {
        let r = setup(json!({"@vocab": "https://example.org/vocab/", "ex": "https://example.org/ex#"}));
        assert_eq!(r.resolve("anything").as_deref(), Some("https://example.org/vocab/anything"));
        assert_eq!(r.reverse("https://example.org/vocab/anything").as_deref(), Some("anything"));
        assert_eq!(r.resolve("ex:thing").as_deref(), Some("https://example.org/ex#thing"));
        assert_eq!(r.vocab(), Some("https://example.org/vocab/"));
    }

    #[test]
    fn unknown_context_falls_back() {
        let r = setup(json!("https://example.org/unknown/context"));
        assert!(r.using_fallback());
        assert_eq!(r.specification_version(), Some("v1.2.0"));
        assert!(r.resolve("Person").is_some());
    }

    #[test]
    fn fallback_can_be_configured() {
        let value = ContextValue::from("https://example.org/unknown/context");
        let r = ContextResolver::setup_with(&value, ResolverOptions { fallback: &RO_CRATE_1_1 });
        assert!(r.using_fallback());
        assert_eq!(r.specification_version(), Some("v1.1.3"));
    }

    #[test]
    fn empty_context_resolves_nothing() {
        let r = ContextResolver::setup(&ContextValue::empty());
        assert!(r.is_empty());
        assert_eq!(r.resolve("name"), None);
        assert_eq!(r.resolve(""), None);
        assert_eq!(r.reverse("https://schema.org/name"), None);
    }

    #[test]
    fn reverse_prefers_first_registered_term() {
        // "File" and "MediaObject" share an IRI; "MediaObject" comes first
        let r = setup(json!("https://w3id.org/ro/crate/1.1/context"));
        assert_eq!(r.reverse("https://schema.org/MediaObject").as_deref(), Some("MediaObject"));
    }

    #[test]
    fn overridden_term_does_not_leak_into_reverse() {
        let r = setup(json!([
            "https://w3id.org/ro/crate/1.1/context",
            {"name": "https://example.org/ns/name"}
        ]));
        assert_eq!(r.resolve("name").as_deref(), Some("https://example.org/ns/name"));
        let back = r.reverse("https://schema.org/name");
        // Only the prefixed form still resolves to the schema.org IRI
        assert_eq!(back.as_deref(), Some("schema:name"));
        assert_eq!(r.resolve(&back.unwrap()).as_deref(), Some("https://schema.org/name"));
    }

    #[test]
    fn object_definitions_and_compact_iris() {
        let r = setup(json!({
            "ex": "https://example.org/",
            "homepage": {"@id": "ex:homepage", "@type": "@id"},
            "dropped": {"@type": "@id"}
        }));
        assert_eq!(r.resolve("homepage").as_deref(), Some("https://example.org/homepage"));
        assert_eq!(r.resolve("dropped"), None);
    }

    #[test]
    fn null_definition_removes_term() {
        let r = setup(json!([
            "https://w3id.org/ro/crate/1.1/context",
            {"name": null}
        ]));
        assert_eq!(r.resolve("name"), None);
    }

    #[test]
    fn absolute_iris_pass_through() {
        let r = setup(json!("https://w3id.org/ro/crate/1.1/context"));
        assert_eq!(
            r.resolve("https://example.org/x").as_deref(),
            Some("https://example.org/x")
        );
    }

    #[test]
    fn is_same_as_compares_structure() {
        let raw = json!(["https://w3id.org/ro/crate/1.1/context", {"a": "https://a.org/", "b": "https://b.org/"}]);
        let r = setup(raw);
        let reordered: ContextValue = serde_json::from_value(json!([
            "https://w3id.org/ro/crate/1.1/context",
            {"b": "https://b.org/", "a": "https://a.org/"}
        ]))
        .unwrap();
        assert!(r.is_same_as(&reordered));
        assert!(!r.is_same_as(&ContextValue::from("https://w3id.org/ro/crate/1.2/context")));
    }

    #[test]
    fn terms_iterate_in_registration_order() {
        let r = setup(json!("https://w3id.org/ro/crate/1.1/context"));
        let first = r.terms().next().unwrap();
        assert_eq!(first, ("3DModel", "https://schema.org/3DModel"));
    }

    #[test]
    fn full_schema_org_vocabulary_resolves() {
        for uri in ["https://w3id.org/ro/crate/1.1/context", "https://w3id.org/ro/crate/1.2/context"] {
            let r = setup(json!(uri));
            for term in ["startDate", "telephone", "inLanguage", "worksFor", "Review", "endDate", "duration"] {
                let iri = format!("https://schema.org/{}", term);
                assert_eq!(r.resolve(term).as_deref(), Some(iri.as_str()), "{} under {}", term, uri);
                assert_eq!(r.reverse(&iri).as_deref(), Some(term));
            }
        }
    }
}
