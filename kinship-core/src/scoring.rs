//! Similarity signal scoring and merging.
//!
//! Three signals produce candidate lists independently: embedding cosine,
//! skill overlap and community overlap. They are folded into one
//! accumulator in that fixed order with `merge_signal`, then ranked by
//! `finalize`. Only the embedding signal is filtered by the requested
//! minimum before merging, so skill and community matches can rank below it.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::SimilarityProfile;

/// Skill overlap ratio is scaled up before clamping.
pub const SKILL_OVERLAP_SCALE: f64 = 1.2;
/// Score contributed by each shared community.
pub const COMMUNITY_WEIGHT: f64 = 0.3;
/// Weight kept by the accumulated score when a candidate reappears.
pub const EXISTING_WEIGHT: f64 = 0.6;
pub const INCOMING_WEIGHT: f64 = 0.4;
/// Candidates sharing fewer skills are not a skill match.
pub const MIN_SHARED_SKILLS: i64 = 2;

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// `min(shared / total * 1.2, 1.0)`; zero when the user has no skills.
pub fn skill_overlap_score(shared: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    clamp_score(shared as f64 / total as f64 * SKILL_OVERLAP_SCALE)
}

pub fn community_overlap_score(shared: usize) -> f64 {
    clamp_score(shared as f64 * COMMUNITY_WEIGHT)
}

/// Score for a holder of a named skill: proficiency sets the base, more than
/// five years of experience adds 0.2.
pub fn expertise_score(proficiency: Option<&str>, years_experience: Option<i32>) -> f64 {
    let base = match proficiency {
        Some("expert") => 1.0,
        Some("advanced") => 0.8,
        Some("intermediate") => 0.6,
        _ => 0.5,
    };
    if years_experience.unwrap_or(0) > 5 {
        clamp_score(base + 0.2)
    } else {
        base
    }
}

pub fn embedding_reason() -> String {
    "Similar profile and interests".to_string()
}

pub fn skill_reason(shared: usize) -> String {
    format!("{} shared skills", shared)
}

pub fn community_reason(shared: usize) -> String {
    format!("Member of {} same communities", shared)
}

pub fn expertise_reason(skill: &str, proficiency: Option<&str>) -> String {
    format!("Has {} skill ({} level)", skill, proficiency.unwrap_or("unspecified"))
}

fn union_into(target: &mut Vec<String>, incoming: Vec<String>) {
    for item in incoming {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Fold one signal's candidates into the accumulator.
///
/// A candidate already present gets `existing * 0.6 + incoming * 0.4`,
/// clamped to 1.0, with shared lists unioned and reasons appended. New
/// candidates are appended in signal order.
pub fn merge_signal(accumulator: &mut Vec<SimilarityProfile>, incoming: Vec<SimilarityProfile>) {
    let mut index: HashMap<Uuid, usize> = accumulator
        .iter()
        .enumerate()
        .map(|(i, p)| (p.user_id, i))
        .collect();

    for mut profile in incoming {
        match index.get(&profile.user_id) {
            Some(&i) => {
                let existing = &mut accumulator[i];
                existing.similarity_score = clamp_score(
                    existing.similarity_score * EXISTING_WEIGHT
                        + profile.similarity_score * INCOMING_WEIGHT,
                );
                union_into(&mut existing.shared_skills, profile.shared_skills);
                union_into(&mut existing.shared_communities, profile.shared_communities);
                existing.reasons.extend(profile.reasons);
            }
            None => {
                profile.similarity_score = clamp_score(profile.similarity_score);
                index.insert(profile.user_id, accumulator.len());
                accumulator.push(profile);
            }
        }
    }
}

/// Sort by score descending (stable, so merge order breaks ties), drop
/// duplicate user ids and truncate. Returns the profiles and the number of
/// distinct candidates before truncation.
pub fn finalize(mut profiles: Vec<SimilarityProfile>, limit: usize) -> (Vec<SimilarityProfile>, usize) {
    profiles.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));

    let mut seen = std::collections::HashSet::new();
    profiles.retain(|p| seen.insert(p.user_id));

    let total = profiles.len();
    profiles.truncate(limit);
    (profiles, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_profile(id: Uuid, score: f64, skills: &[&str], reason: &str) -> SimilarityProfile {
        SimilarityProfile {
            user_id: id,
            username: "someone".into(),
            full_name: None,
            profile_image_url: None,
            location: None,
            similarity_score: score,
            shared_skills: skills.iter().map(|s| s.to_string()).collect(),
            shared_communities: vec![],
            reasons: vec![reason.to_string()],
        }
    }

    #[test]
    fn test_skill_overlap_score() {
        assert_eq!(skill_overlap_score(2, 2), 1.0);
        assert!((skill_overlap_score(2, 4) - 0.6).abs() < 1e-9);
        assert_eq!(skill_overlap_score(3, 0), 0.0);
    }

    #[test]
    fn test_community_overlap_score() {
        assert!((community_overlap_score(1) - 0.3).abs() < 1e-9);
        assert!((community_overlap_score(3) - 0.9).abs() < 1e-9);
        assert_eq!(community_overlap_score(5), 1.0);
    }

    #[test]
    fn test_expertise_score() {
        assert_eq!(expertise_score(Some("expert"), Some(10)), 1.0);
        assert!((expertise_score(Some("advanced"), Some(6)) - 1.0).abs() < 1e-9);
        assert!((expertise_score(Some("intermediate"), Some(5)) - 0.6).abs() < 1e-9);
        assert!((expertise_score(None, Some(8)) - 0.7).abs() < 1e-9);
        assert_eq!(expertise_score(Some("beginner"), None), 0.5);
        assert_eq!(expertise_reason("Rust", None), "Has Rust skill (unspecified level)");
    }

    #[test]
    fn test_merge_combines_repeated_candidates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut acc = vec![make_profile(a, 0.9, &["Rust"], "embedding")];
        merge_signal(
            &mut acc,
            vec![
                make_profile(a, 0.5, &["Rust", "SQL"], "skills"),
                make_profile(b, 0.7, &["Go"], "skills"),
            ],
        );

        assert_eq!(acc.len(), 2);
        assert!((acc[0].similarity_score - (0.9 * 0.6 + 0.5 * 0.4)).abs() < 1e-9);
        assert_eq!(acc[0].shared_skills, vec!["Rust", "SQL"]);
        assert_eq!(acc[0].reasons, vec!["embedding", "skills"]);
        assert_eq!(acc[1].user_id, b);
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let a = Uuid::new_v4();
        let mut acc = Vec::new();
        merge_signal(&mut acc, vec![make_profile(a, 1.7, &[], "embedding")]);
        merge_signal(&mut acc, vec![make_profile(a, 1.0, &[], "skills")]);
        merge_signal(&mut acc, vec![make_profile(a, 1.0, &[], "communities")]);
        assert_eq!(acc[0].similarity_score, 1.0);

        let b = Uuid::new_v4();
        merge_signal(&mut acc, vec![make_profile(b, -0.4, &[], "embedding")]);
        assert_eq!(acc[1].similarity_score, 0.0);
    }

    #[test]
    fn test_finalize_sorts_dedups_and_truncates() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let profiles = vec![
            make_profile(ids[0], 0.2, &[], "x"),
            make_profile(ids[1], 0.9, &[], "x"),
            make_profile(ids[1], 0.1, &[], "dup"),
            make_profile(ids[2], 0.5, &[], "x"),
            make_profile(ids[3], 0.5, &[], "x"),
        ];
        let (top, total) = finalize(profiles, 3);
        assert_eq!(total, 4);
        let order: Vec<Uuid> = top.iter().map(|p| p.user_id).collect();
        assert_eq!(order, vec![ids[1], ids[2], ids[3]]);
    }
}
