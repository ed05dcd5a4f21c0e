//! Proactive (knowledge-based) pattern matching: scores newly-registered
//! tag groups against the pattern library using only tag names, units,
//! descriptions, and the static knowledge base — no correlation or
//! fingerprint data required.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use regex::Regex;

use flywheel_core::config::MatchingConfig;
use flywheel_core::model::{cluster_id, Cluster, KnowledgeBase, MatchExplanation, MatchWeights, Pattern, SubScores, Suggestion, Tag};
use flywheel_core::Result;
use flywheel_store::MetadataStore;

use crate::util::{role_matches_any_tag, tokenize};

/// Prioritized skeletons tried in order; the first that captures a prefix
/// wins.
const PREFIX_SKELETONS: &[&str] = &[r"^([A-Za-z]+_?\d+)_", r"^([A-Za-z]+\d+)\."];

#[derive(Debug, Default, Clone, Copy)]
pub struct ProactiveStats {
    pub groups_considered: u64,
    pub suggestions_created: u64,
}

struct Group {
    prefix: String,
    tags: Vec<Tag>,
}

fn extract_prefix(name: &str) -> String {
    for skeleton in PREFIX_SKELETONS {
        if let Ok(re) = Regex::new(skeleton) {
            if let Some(caps) = re.captures(name) {
                if let Some(m) = caps.get(1) {
                    return m.as_str().to_string();
                }
            }
        }
    }
    name.split(['_', '.', '-']).next().unwrap_or(name).to_string()
}

fn group_by_prefix(mut tags: Vec<Tag>) -> Vec<Group> {
    tags.sort_by(|a, b| a.name.cmp(&b.name));
    let mut groups: HashMap<String, Vec<Tag>> = HashMap::new();
    for tag in tags {
        let prefix = extract_prefix(&tag.name);
        groups.entry(prefix).or_default().push(tag);
    }
    groups
        .into_iter()
        .filter(|(_, tags)| tags.len() >= 3)
        .map(|(prefix, tags)| Group { prefix, tags })
        .collect()
}

fn infer_measurement_type(tag: &Tag, kb: &KnowledgeBase) -> Option<String> {
    for token in tokenize(&tag.name) {
        if let Some(entry) = kb.lookup_abbreviation(&token, None) {
            if let Some(mt) = &entry.measurement_type {
                return Some(mt.clone());
            }
        }
    }
    kb.measurement_type_for_unit(&tag.unit).map(|s| s.to_string())
}

fn naming_score(group: &Group, pattern: &Pattern) -> (f64, Vec<String>) {
    let refs: Vec<&Tag> = group.tags.iter().collect();
    let weight_sum: f64 = pattern.roles.iter().map(|r| r.weight).sum();
    if weight_sum <= 0.0 {
        return (0.0, Vec::new());
    }
    let mut matched_weight = 0.0;
    let mut matched_roles = Vec::new();
    for role in &pattern.roles {
        if role_matches_any_tag(role, &refs) {
            matched_weight += role.weight;
            matched_roles.push(role.name.clone());
        }
    }
    (matched_weight / weight_sum, matched_roles)
}

fn unit_match_score(group: &Group, pattern: &Pattern) -> f64 {
    let roles_with_unit: Vec<_> = pattern.roles.iter().filter(|r| r.expected_unit.is_some()).collect();
    if roles_with_unit.is_empty() {
        return 0.0;
    }
    let matched = roles_with_unit
        .iter()
        .filter(|role| {
            group
                .tags
                .iter()
                .any(|t| role_matches_any_tag(role, &[t]) && t.unit.eq_ignore_ascii_case(role.expected_unit.as_ref().unwrap()))
        })
        .count();
    matched as f64 / roles_with_unit.len() as f64
}

fn metadata_score(group: &Group, pattern: &Pattern) -> f64 {
    let terms: Vec<String> = pattern
        .name
        .split([' ', '_', '-'])
        .chain(pattern.category.split([' ', '_', '-']))
        .filter(|s| s.len() > 2)
        .map(|s| s.to_lowercase())
        .collect();
    if terms.is_empty() || group.tags.is_empty() {
        return 0.0;
    }
    let per_tag: Vec<f64> = group
        .tags
        .iter()
        .map(|t| {
            let haystack = format!("{} {}", t.description, t.address).to_lowercase();
            let hits = terms.iter().filter(|term| haystack.contains(term.as_str())).count();
            hits as f64 / terms.len() as f64
        })
        .collect();
    per_tag.iter().sum::<f64>() / per_tag.len() as f64
}

fn knowledge_boost_score(group: &Group, kb: &KnowledgeBase) -> f64 {
    let Some(first) = group.tags.first() else {
        return 0.0;
    };
    let max_boost = kb
        .naming_conventions
        .iter()
        .filter_map(|nc| {
            Regex::new(&format!("(?i){}", nc.pattern))
                .ok()
                .filter(|re| re.is_match(&first.name))
                .map(|_| nc.confidence_boost)
        })
        .fold(0.0_f64, f64::max);
    let mean_abbrev_count = group
        .tags
        .iter()
        .map(|t| tokenize(&t.name).iter().filter(|tok| kb.lookup_abbreviation(tok, None).is_some()).count() as f64)
        .sum::<f64>()
        / group.tags.len() as f64;
    let bonus = if mean_abbrev_count >= 2.0 { 0.05 } else { 0.0 };
    max_boost + bonus
}

/// Per-role best-tag assignment: naming match (+0.6), unit match
/// (+0.3), inferred-measurement match (+0.1); kept if the total reaches
/// 0.30.
fn assign_roles(group: &Group, pattern: &Pattern, kb: &KnowledgeBase) -> Vec<(String, i64, f64)> {
    let mut assignments = Vec::new();
    for role in &pattern.roles {
        let mut best: Option<(i64, f64)> = None;
        for tag in &group.tags {
            let mut score = 0.0;
            if role_matches_any_tag(role, &[tag]) {
                score += 0.6;
            }
            if let Some(expected) = &role.expected_unit {
                if tag.unit.eq_ignore_ascii_case(expected) {
                    score += 0.3;
                }
            }
            if let Some(measurement) = infer_measurement_type(tag, kb) {
                let role_name = role.name.to_lowercase();
                let measurement = measurement.to_lowercase();
                if role_name.contains(&measurement) || measurement.contains(&role_name) {
                    score += 0.1;
                }
            }
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((tag.sequence_id, score));
            }
        }
        if let Some((sequence_id, score)) = best {
            if score >= 0.30 {
                assignments.push((role.name.clone(), sequence_id, score));
            }
        }
    }
    assignments
}

/// One proactive-mode pass. `candidate_tags` is the caller-resolved
/// "unanalyzed enabled tags" set: no existing binding and not a member
/// of any currently active cluster.
pub async fn run_once(
    metadata: &dyn MetadataStore,
    candidate_tags: Vec<Tag>,
    config: &MatchingConfig,
    now: DateTime<Utc>,
) -> Result<ProactiveStats> {
    let mut stats = ProactiveStats::default();
    let kb = metadata.load_knowledge_base().await?;
    let groups = group_by_prefix(candidate_tags);
    let patterns = metadata.list_matchable_patterns().await?;

    for group in &groups {
        stats.groups_considered += 1;
        for pattern in &patterns {
            let (naming, matched_roles) = naming_score(group, pattern);
            let unit_match = unit_match_score(group, pattern);
            let metadata_coverage = metadata_score(group, pattern);
            let knowledge_boost = knowledge_boost_score(group, &kb);

            let scores = SubScores {
                naming,
                correlation: 0.0,
                range: unit_match,
                rate: metadata_coverage,
            };
            let base = scores.weighted(&MatchWeights::PROACTIVE);
            let overall = ((base + config.knowledge_boost * knowledge_boost).min(1.0)) * pattern.confidence;
            if overall < config.min_confidence_proactive {
                continue;
            }

            let members: Vec<i64> = group.tags.iter().map(|t| t.sequence_id).collect();
            let id = cluster_id(&members);
            if metadata.find_suggestion(id, pattern.id).await?.is_some() {
                continue;
            }

            let cluster = Cluster {
                id,
                members: {
                    let mut m = members.clone();
                    m.sort_unstable();
                    m
                },
                cohesion: 0.0,
                is_active: true,
                detected_at: now,
            };
            metadata.upsert_cluster(cluster).await?;

            let role_assignments = assign_roles(group, pattern, &kb);
            let parsed_tokens: Vec<String> = group.tags.iter().flat_map(|t| tokenize(&t.name)).collect::<HashSet<_>>().into_iter().collect();
            let explanation = format!(
                "{}: proactive match on {} tag(s); naming {:.2}, unit {:.2}, metadata {:.2}, knowledge boost {:.2}, overall {:.2}",
                pattern.name,
                group.tags.len(),
                naming,
                unit_match,
                metadata_coverage,
                knowledge_boost,
                overall,
            );
            let structured = MatchExplanation {
                sub_scores: scores,
                matched_roles: role_assignments.iter().map(|(role, _, _)| role.clone()).collect::<Vec<_>>().into_iter().chain(matched_roles).collect(),
                parsed_tokens,
            };
            let suggestion = Suggestion::new(id, pattern.id, scores, overall, explanation, structured, group.prefix.clone());
            metadata.upsert_suggestion(suggestion).await?;
            stats.suggestions_created += 1;
        }
    }
    Ok(stats)
}
