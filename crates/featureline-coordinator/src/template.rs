//! SQL template resolution.
//!
//! Transformation queries reference upstream sources as `{{name.variant}}`
//! placeholders. Resolution substitutes each with the provider's quoted
//! table reference and produces the ordered source mappings downstream
//! runners address positionally.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use featureline_core::{Error, NameVariant, Result};
use featureline_providers::{quote_ident, OfflineStore, SourceMapping};

/// `{{key}}` where the key may contain anything but `}`. A key is
/// `name.variant` and the variant may be empty.
fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^}]*)\}\}").expect("valid placeholder pattern"))
}

/// Expand every placeholder in `template` into the provider's quoted table
/// reference, looking the key up in `replacements`.
pub fn template_replace(
    template: &str,
    replacements: &HashMap<String, String>,
    offline: &dyn OfflineStore,
) -> Result<String> {
    let mut resolved = String::with_capacity(template.len());
    let mut last = 0;
    for captures in placeholder_re().captures_iter(template) {
        let placeholder = captures.get(0).expect("regex match has a whole-match group");
        let key = &captures[1];
        let table = replacements
            .get(key)
            .ok_or_else(|| Error::UnresolvedTemplateKey(key.to_string()))?;
        resolved.push_str(&template[last..placeholder.start()]);
        resolved.push_str(&offline.qualified_table(table));
        last = placeholder.end();
    }
    resolved.push_str(&template[last..]);
    Ok(resolved)
}

/// Scan `template` left to right and emit one mapping per placeholder:
/// the generically quoted form plus the raw replacement. Duplicate
/// placeholders produce duplicate mappings, in order.
pub fn get_source_mapping(
    template: &str,
    replacements: &HashMap<String, String>,
) -> Result<Vec<SourceMapping>> {
    let mut mappings = Vec::new();
    for captures in placeholder_re().captures_iter(template) {
        let key = &captures[1];
        let table = replacements
            .get(key)
            .ok_or_else(|| Error::UnresolvedTemplateKey(key.to_string()))?;
        mappings.push(SourceMapping {
            template: quote_ident(table),
            source: table.clone(),
        });
    }
    Ok(mappings)
}

/// Emit one mapping per declared source, in the declared order; the
/// `template` side is the `name.variant` key. The declared list is
/// authoritative because runners bind sources positionally.
pub fn get_ordered_source_mappings(
    sources: &[NameVariant],
    replacements: &HashMap<String, String>,
) -> Result<Vec<SourceMapping>> {
    let mut mappings = Vec::with_capacity(sources.len());
    for source in sources {
        let key = source.key();
        let table = replacements
            .get(&key)
            .ok_or_else(|| Error::UnresolvedTemplateKey(key.clone()))?;
        mappings.push(SourceMapping {
            template: key,
            source: table.clone(),
        });
    }
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use featureline_providers::{MemoryOfflineStore, TableQuoting};

    fn replacements(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn generic_store() -> MemoryOfflineStore {
        MemoryOfflineStore::new(TableQuoting::DoubleQuote)
    }

    #[test]
    fn test_template_replace_generic() {
        let resolved = template_replace(
            "Some example text {{name1.variant1}} and more {{name2.variant2}}",
            &replacements(&[
                ("name1.variant1", "replacement1"),
                ("name2.variant2", "replacement2"),
            ]),
            &generic_store(),
        )
        .unwrap();
        assert_eq!(
            resolved,
            "Some example text \"replacement1\" and more \"replacement2\""
        );
    }

    #[test]
    fn test_template_replace_missing_key() {
        let err = template_replace(
            "Some example text {{name1.variant1}} and more {{name2.variant2}}",
            &replacements(&[
                ("name1.variant1", "replacement1"),
                ("name3.variant3", "replacement2"),
            ]),
            &generic_store(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnresolvedTemplateKey(key) if key == "name2.variant2"));
    }

    #[test]
    fn test_template_replace_bigquery() {
        let store = MemoryOfflineStore::new(TableQuoting::BigQuery {
            project: "p".to_string(),
            dataset: "d".to_string(),
        });
        let resolved =
            template_replace("FROM {{n.v}}", &replacements(&[("n.v", "t")]), &store).unwrap();
        assert_eq!(resolved, "FROM `p.d.t`");
    }

    #[test]
    fn test_template_replace_empty_template() {
        let resolved = template_replace("", &HashMap::new(), &generic_store()).unwrap();
        assert_eq!(resolved, "");
    }

    #[test]
    fn test_template_replace_no_placeholders() {
        let resolved =
            template_replace("SELECT 1", &HashMap::new(), &generic_store()).unwrap();
        assert_eq!(resolved, "SELECT 1");
    }

    #[test]
    fn test_template_replace_empty_variant() {
        let resolved = template_replace(
            "SELECT * FROM {{S.}}",
            &replacements(&[("S.", "S_table")]),
            &generic_store(),
        )
        .unwrap();
        assert_eq!(resolved, "SELECT * FROM \"S_table\"");
    }

    #[test]
    fn test_template_replace_duplicate_placeholders() {
        let resolved = template_replace(
            "{{a.b}} JOIN {{a.b}}",
            &replacements(&[("a.b", "t")]),
            &generic_store(),
        )
        .unwrap();
        assert_eq!(resolved, "\"t\" JOIN \"t\"");
    }

    #[test]
    fn test_get_source_mapping() {
        let mappings = get_source_mapping(
            "Some example text {{name1.variant1}} and more {{name2.variant2}}",
            &replacements(&[
                ("name1.variant1", "replacement1"),
                ("name2.variant2", "replacement2"),
            ]),
        )
        .unwrap();
        assert_eq!(
            mappings,
            vec![
                SourceMapping {
                    template: "\"replacement1\"".to_string(),
                    source: "replacement1".to_string(),
                },
                SourceMapping {
                    template: "\"replacement2\"".to_string(),
                    source: "replacement2".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_get_source_mapping_missing_key() {
        let err = get_source_mapping(
            "Some example text {{name1.variant1}} and more {{name2.variant2}}",
            &replacements(&[
                ("name1.variant1", "replacement1"),
                ("name3.variant3", "replacement2"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnresolvedTemplateKey(_)));
    }

    #[test]
    fn test_get_source_mapping_duplicates_preserved() {
        let mappings =
            get_source_mapping("{{a.b}} {{a.b}}", &replacements(&[("a.b", "t")])).unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0], mappings[1]);
    }

    #[test]
    fn test_ordered_source_mappings_follow_declared_order() {
        let sources = vec![
            NameVariant::new("name1", "variant1"),
            NameVariant::new("name2", "variant2"),
            NameVariant::new("name3", "variant3"),
            NameVariant::new("name4", "variant4"),
        ];
        // the map iterates in arbitrary order; the declared list wins
        let map = replacements(&[
            ("name2.variant2", "tableB"),
            ("name4.variant4", "tableD"),
            ("name1.variant1", "tableA"),
            ("name3.variant3", "tableC"),
        ]);
        let mappings = get_ordered_source_mappings(&sources, &map).unwrap();
        assert_eq!(mappings.len(), sources.len());
        let expected = ["tableA", "tableB", "tableC", "tableD"];
        for (i, mapping) in mappings.iter().enumerate() {
            assert_eq!(mapping.template, sources[i].key());
            assert_eq!(mapping.source, expected[i]);
        }
    }

    #[test]
    fn test_ordered_source_mappings_missing_declared_source() {
        let sources = vec![
            NameVariant::new("name1", "variant1"),
            NameVariant::new("name2", "variant2"),
        ];
        let map = replacements(&[("name1.variant1", "tableA")]);
        let err = get_ordered_source_mappings(&sources, &map).unwrap_err();
        assert!(matches!(err, Error::UnresolvedTemplateKey(_)));
    }

    #[test]
    fn test_round_trip_consistency() {
        // mappings from a resolved template line up with the ordered
        // mappings when the declared order is the placeholder order
        let sources = vec![NameVariant::new("a", "1"), NameVariant::new("b", "2")];
        let map = replacements(&[("a.1", "ta"), ("b.2", "tb")]);
        let template = "SELECT * FROM {{a.1}} JOIN {{b.2}}";

        let scanned = get_source_mapping(template, &map).unwrap();
        let ordered = get_ordered_source_mappings(&sources, &map).unwrap();
        assert_eq!(scanned.len(), ordered.len());
        for (scan, order) in scanned.iter().zip(&ordered) {
            assert_eq!(scan.source, order.source);
        }
    }
}
