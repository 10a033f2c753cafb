//! Bundled RO-Crate context documents
//!
//! Context documents for known RO-Crate versions are compiled in rather
//! than fetched. Each is a JSON-LD file next to this module, parsed once on
//! first use. Supporting a new version means adding the file and a
//! `Specification` to `SPECIFICATIONS`; the resolver does not change.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// Prefix shared by every RO-Crate specification URI
pub const RO_CRATE_SPEC_PREFIX: &str = "https://w3id.org/ro/crate/";

/// A known RO-Crate context document and its term table
pub struct Specification {
    /// Version label, e.g. "v1.1.3"
    pub version: &'static str,
    /// Canonical context URI
    pub uri: &'static str,
    /// Other URIs that name the same document
    pub alternate_uris: &'static [&'static str],
    /// The bundled JSON-LD context document
    document: &'static str,
    table: OnceLock<Vec<(String, String)>>,
}

impl Specification {
    /// Whether `uri` names this specification's context document
    pub fn matches(&self, uri: &str) -> bool {
        let uri = uri.trim_end_matches('/');
        self.uri == uri || self.alternate_uris.contains(&uri)
    }

    /// `major.minor` part of the version, e.g. "1.2"
    pub fn minor_version(&self) -> &'static str {
        let v = self.version.trim_start_matches('v');
        match v.match_indices('.').nth(1) {
            Some((pos, _)) => &v[..pos],
            None => v,
        }
    }

    /// All `(term, iri)` pairs in document order
    pub fn terms(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.table()
            .iter()
            .map(|(term, iri)| (term.as_str(), iri.as_str()))
    }

    fn table(&self) -> &[(String, String)] {
        self.table.get_or_init(|| match serde_json::from_str::<ContextDocument>(self.document) {
            Ok(doc) => doc.context.0,
            Err(e) => {
                tracing::error!(version = self.version, error = %e, "bundled context document is invalid");
                Vec::new()
            }
        })
    }
}

impl fmt::Debug for Specification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("version", &self.version)
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

/// The parts of a context document the resolver uses
#[derive(Deserialize)]
struct ContextDocument {
    #[serde(rename = "@context")]
    context: TermTable,
}

/// Term definitions of a `@context` object, kept in document order.
///
/// Keywords and definitions without an IRI are skipped.
struct TermTable(Vec<(String, String)>);

impl<'de> Deserialize<'de> for TermTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TermVisitor;

        impl<'de> Visitor<'de> for TermVisitor {
            type Value = TermTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON-LD context object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<TermTable, A::Error> {
                let mut terms = Vec::new();
                while let Some((term, definition)) = map.next_entry::<String, Value>()? {
                    if term.starts_with('@') {
                        continue;
                    }
                    let iri = match definition {
                        Value::String(iri) => iri,
                        Value::Object(obj) => match obj.get("@id").and_then(Value::as_str) {
                            Some(iri) => iri.to_string(),
                            None => continue,
                        },
                        Value::Null => continue,
                        other => return Err(de::Error::custom(format!("bad definition for {}: {}", term, other))),
                    };
                    terms.push((term, iri));
                }
                Ok(TermTable(terms))
            }
        }

        deserializer.deserialize_map(TermVisitor)
    }
}

/// RO-Crate 1.1 context
pub static RO_CRATE_1_1: Specification = Specification {
    version: "v1.1.3",
    uri: "https://w3id.org/ro/crate/1.1/context",
    alternate_uris: &["http://w3id.org/ro/crate/1.1/context"],
    document: include_str!("ro-crate-1.1.jsonld"),
    table: OnceLock::new(),
};

/// RO-Crate 1.2 context: everything in 1.1 plus profile and codemeta terms
pub static RO_CRATE_1_2: Specification = Specification {
    version: "v1.2.0",
    uri: "https://w3id.org/ro/crate/1.2/context",
    alternate_uris: &[
        "http://w3id.org/ro/crate/1.2/context",
        "https://w3id.org/ro/crate/1.2-DRAFT/context",
    ],
    document: include_str!("ro-crate-1.2.jsonld"),
    table: OnceLock::new(),
};

/// Known specifications, oldest first
pub static SPECIFICATIONS: &[&Specification] = &[&RO_CRATE_1_1, &RO_CRATE_1_2];

/// Look up a specification by context URI
pub fn find_specification(uri: &str) -> Option<&'static Specification> {
    SPECIFICATIONS.iter().copied().find(|spec| spec.matches(uri))
}

/// Look up a specification by version, with or without the leading "v"
/// and with or without a patch number ("1.1", "v1.1.3")
pub fn specification_for_version(version: &str) -> Option<&'static Specification> {
    let wanted = version.trim_start_matches('v');
    SPECIFICATIONS
        .iter()
        .copied()
        .find(|spec| spec.version.trim_start_matches('v') == wanted || spec.minor_version() == wanted)
}

/// The newest bundled specification
pub fn latest_specification() -> &'static Specification {
    SPECIFICATIONS[SPECIFICATIONS.len() - 1]
}

/// Closest known specification for an unrecognized context URI.
///
/// A URI shaped like `.../ro/crate/<major>.<minor>...` maps to the table of
/// that version when one exists; anything else gets `default`.
pub fn nearest_specification(uri: &str, default: &'static Specification) -> &'static Specification {
    uri_version(uri)
        .and_then(|v| specification_for_version(&v))
        .unwrap_or(default)
}

/// Extract `major.minor` from an RO-Crate-style URI
fn uri_version(uri: &str) -> Option<String> {
    let (_, rest) = uri.split_once("/ro/crate/")?;
    let digits: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = digits.split('.').filter(|p| !p.is_empty());
    let major = parts.next()?;
    let minor = parts.next()?;
    Some(format!("{}.{}", major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_known_uris() {
        assert_eq!(find_specification("https://w3id.org/ro/crate/1.1/context").unwrap().version, "v1.1.3");
        assert_eq!(find_specification("http://w3id.org/ro/crate/1.2/context").unwrap().version, "v1.2.0");
        assert!(find_specification("https://example.org/context").is_none());
    }

    #[test]
    fn minor_version_strips_patch() {
        assert_eq!(RO_CRATE_1_1.minor_version(), "1.1");
        assert_eq!(RO_CRATE_1_2.minor_version(), "1.2");
    }

    #[test]
    fn version_lookup_accepts_short_forms() {
        assert_eq!(specification_for_version("1.1").unwrap().uri, RO_CRATE_1_1.uri);
        assert_eq!(specification_for_version("v1.2.0").unwrap().uri, RO_CRATE_1_2.uri);
        assert!(specification_for_version("2.0").is_none());
    }

    #[test]
    fn nearest_uses_version_in_uri() {
        let spec = nearest_specification("https://w3id.org/ro/crate/1.1-DRAFT/context", latest_specification());
        assert_eq!(spec.version, "v1.1.3");

        let spec = nearest_specification("https://example.org/my/context", latest_specification());
        assert_eq!(spec.version, "v1.2.0");

        let spec = nearest_specification("https://w3id.org/ro/crate/9.9/context", &RO_CRATE_1_1);
        assert_eq!(spec.version, "v1.1.3");
    }

    #[test]
    fn one_two_extends_one_one() {
        let v11: Vec<_> = RO_CRATE_1_1.terms().collect();
        let v12: Vec<_> = RO_CRATE_1_2.terms().collect();
        assert!(v11.iter().all(|t| v12.contains(t)));
        assert!(v12.iter().any(|(t, _)| *t == "issueTracker"));
        assert!(!v11.iter().any(|(t, _)| *t == "issueTracker"));
    }

    #[test]
    fn bundled_documents_cover_schema_org() {
        for spec in SPECIFICATIONS {
            let terms: std::collections::HashMap<_, _> = spec.terms().collect();
            assert!(terms.len() > 2000, "{} has only {} terms", spec.version, terms.len());
            for term in ["startDate", "endDate", "telephone", "inLanguage", "worksFor", "Review", "duration"] {
                let iri = format!("https://schema.org/{}", term);
                assert_eq!(terms.get(term).copied(), Some(iri.as_str()), "{} in {}", term, spec.version);
            }
            assert_eq!(terms.get("File").copied(), Some("https://schema.org/MediaObject"));
            assert_eq!(terms.get("pcdm").copied(), Some("http://pcdm.org/models#"));
        }
    }

    #[test]
    fn term_table_keeps_document_order_and_skips_keywords() {
        let doc: ContextDocument = serde_json::from_str(
            r#"{"@context": {"@vocab": "https://v/", "zeta": "https://z/zeta", "alpha": {"@id": "https://a/alpha"},
                "typed": {"@type": "@id"}, "gone": null}}"#,
        )
        .unwrap();
        assert_eq!(
            doc.context.0,
            vec![
                ("zeta".to_string(), "https://z/zeta".to_string()),
                ("alpha".to_string(), "https://a/alpha".to_string()),
            ]
        );
    }
}
