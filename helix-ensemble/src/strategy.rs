//! Pure aggregation logic for the three §4.G strategies. Consensus's
//! arbiter round-trip needs I/O and lives in [`crate::engine`]; this
//! module only groups and scores already-collected candidates.

/// One successful attempt, ready for grouping.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider_id: String,
    pub content: String,
    pub confidence: Option<f32>,
    pub latency_ms: u64,
}

fn normalise(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

struct Group<'a> {
    representative: &'a Candidate,
    members: Vec<&'a Candidate>,
}

fn group_by_content<'a>(candidates: &'a [Candidate]) -> Vec<Group<'a>> {
    let mut groups: Vec<Group<'a>> = Vec::new();
    for candidate in candidates {
        let key = normalise(&candidate.content);
        if let Some(group) = groups.iter_mut().find(|g| normalise(&g.representative.content) == key) {
            group.members.push(candidate);
        } else {
            groups.push(Group { representative: candidate, members: vec![candidate] });
        }
    }
    groups
}

/// Winner = largest group; ties broken by lowest mean latency (§4.G).
pub fn aggregate_majority(candidates: &[Candidate]) -> Option<Candidate> {
    let groups = group_by_content(candidates);
    groups
        .into_iter()
        .max_by(|a, b| {
            a.members
                .len()
                .cmp(&b.members.len())
                .then_with(|| mean_latency(&b.members).partial_cmp(&mean_latency(&a.members)).unwrap())
        })
        .map(|g| g.representative.clone())
}

fn mean_latency(members: &[&Candidate]) -> f64 {
    let sum: u64 = members.iter().map(|c| c.latency_ms).sum();
    sum as f64 / members.len() as f64
}

/// Winner = answer maximising `Σ confidence_i` over its group. A missing
/// confidence contributes `0.5` so every candidate still counts (§4.B).
pub fn aggregate_confidence_weighted(candidates: &[Candidate]) -> Option<Candidate> {
    let groups = group_by_content(candidates);
    groups
        .into_iter()
        .max_by(|a, b| sum_confidence(&a.members).partial_cmp(&sum_confidence(&b.members)).unwrap())
        .map(|g| g.representative.clone())
}

fn sum_confidence(members: &[&Candidate]) -> f32 {
    members.iter().map(|c| c.confidence.unwrap_or(0.5)).sum()
}

/// Jaccard similarity of whitespace-token sets, used by consensus to
/// decide whether surviving answers have converged.
fn token_similarity(a: &str, b: &str) -> f32 {
    use std::collections::HashSet;
    let ta: HashSet<&str> = a.split_whitespace().collect();
    let tb: HashSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 { 1.0 } else { intersection as f32 / union as f32 }
}

/// True once every pair of surviving candidates is at least `threshold`
/// similar — the consensus loop's early-stop condition.
pub fn has_converged(candidates: &[Candidate], threshold: f32) -> bool {
    if candidates.len() <= 1 {
        return true;
    }
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            if token_similarity(&candidates[i].content, &candidates[j].content) < threshold {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(provider_id: &str, content: &str, confidence: Option<f32>, latency_ms: u64) -> Candidate {
        Candidate { provider_id: provider_id.into(), content: content.into(), confidence, latency_ms }
    }

    #[test]
    fn majority_picks_largest_group() {
        let candidates = vec![
            candidate("a", "Paris", Some(0.7), 100),
            candidate("b", "Paris", Some(0.6), 110),
            candidate("c", "Lyon", Some(0.9), 90),
        ];
        let winner = aggregate_majority(&candidates).unwrap();
        assert_eq!(winner.content, "Paris");
    }

    #[test]
    fn confidence_weighted_sums_per_group() {
        let candidates = vec![
            candidate("a", "Paris", Some(0.7), 100),
            candidate("b", "Paris", Some(0.6), 110),
            candidate("c", "Lyon", Some(0.9), 90),
        ];
        let winner = aggregate_confidence_weighted(&candidates).unwrap();
        assert_eq!(winner.content, "Paris"); // 1.3 beats 0.9
    }

    #[test]
    fn convergence_requires_all_pairs_above_threshold() {
        let candidates = vec![candidate("a", "the sky is blue", None, 0), candidate("b", "the sky is blue", None, 0)];
        assert!(has_converged(&candidates, 0.99));
        let diverged = vec![candidate("a", "the sky is blue", None, 0), candidate("b", "rocks are heavy", None, 0)];
        assert!(!has_converged(&diverged, 0.5));
    }
}
