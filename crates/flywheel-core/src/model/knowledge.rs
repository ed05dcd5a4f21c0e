//! Knowledge base — static lookup tables used only by the proactive
//! (knowledge-based) matcher.

use serde::{Deserialize, Serialize};

/// Token → expansion, with a context tag and priority for disambiguation.
/// e.g. "DIS" in a pump context expands to "discharge" with high priority;
/// in a different context it might mean something else.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbbreviationEntry {
    pub token: String,
    pub expansion: String,
    pub context: String,
    pub priority: i32,
    pub measurement_type: Option<String>,
}

/// Unit symbol → canonical measurement type, e.g. "psi" → "pressure".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitMapping {
    pub unit: String,
    pub measurement_type: String,
}

/// A regex whose match boosts confidence by a fixed amount.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamingConvention {
    pub pattern: String,
    pub confidence_boost: f64,
}

/// Parent/child relationship between measurement types, e.g.
/// "differential_pressure" is-a "pressure".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeasurementTypeNode {
    pub name: String,
    pub parent: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub abbreviations: Vec<AbbreviationEntry>,
    pub unit_mappings: Vec<UnitMapping>,
    pub naming_conventions: Vec<NamingConvention>,
    pub measurement_types: Vec<MeasurementTypeNode>,
}

impl KnowledgeBase {
    /// Looks up a token (case-insensitive) in the abbreviation dictionary,
    /// optionally preferring a matching context. Highest priority wins on
    /// ambiguity; ties keep the first match encountered.
    pub fn lookup_abbreviation(&self, token: &str, context: Option<&str>) -> Option<&AbbreviationEntry> {
        let token_lower = token.to_lowercase();
        let mut candidates: Vec<&AbbreviationEntry> = self
            .abbreviations
            .iter()
            .filter(|e| e.token.to_lowercase() == token_lower)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        if let Some(ctx) = context {
            if let Some(best) = candidates
                .iter()
                .filter(|e| e.context.eq_ignore_ascii_case(ctx))
                .max_by_key(|e| e.priority)
            {
                return Some(best);
            }
        }
        candidates.sort_by_key(|e| std::cmp::Reverse(e.priority));
        candidates.into_iter().next()
    }

    pub fn measurement_type_for_unit(&self, unit: &str) -> Option<&str> {
        self.unit_mappings
            .iter()
            .find(|m| m.unit.eq_ignore_ascii_case(unit))
            .map(|m| m.measurement_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb() -> KnowledgeBase {
        KnowledgeBase {
            abbreviations: vec![
                AbbreviationEntry {
                    token: "DIS".into(),
                    expansion: "discharge".into(),
                    context: "pump".into(),
                    priority: 10,
                    measurement_type: Some("pressure".into()),
                },
                AbbreviationEntry {
                    token: "DIS".into(),
                    expansion: "disabled".into(),
                    context: "generic".into(),
                    priority: 1,
                    measurement_type: None,
                },
            ],
            unit_mappings: vec![UnitMapping {
                unit: "psi".into(),
                measurement_type: "pressure".into(),
            }],
            naming_conventions: vec![],
            measurement_types: vec![],
        }
    }

    #[test]
    fn ambiguous_token_prefers_matching_context() {
        let kb = kb();
        let entry = kb.lookup_abbreviation("dis", Some("pump")).unwrap();
        assert_eq!(entry.expansion, "discharge");
    }

    #[test]
    fn ambiguous_token_without_context_prefers_highest_priority() {
        let kb = kb();
        let entry = kb.lookup_abbreviation("DIS", None).unwrap();
        assert_eq!(entry.expansion, "discharge");
    }

    #[test]
    fn unit_mapping_is_case_insensitive() {
        let kb = kb();
        assert_eq!(kb.measurement_type_for_unit("PSI"), Some("pressure"));
    }
}
