//! Text canonicalization and fuzzy reference matching.
//!
//! `normalize` is pure and idempotent: identical input always yields
//! identical output, and normalizing twice changes nothing. Every string
//! compared anywhere in the dedup path goes through it first.

pub mod dates;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Tokens that carry no identity: the event kind words and edition noise.
const STOP_TOKENS: &[&str] = &["festival", "fest", "edition"];

/// Canonical form of a raw name: lowercase, diacritics stripped, stop tokens
/// and four-digit years removed, non-alphanumeric runs collapsed to single
/// spaces.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let mut spaced = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        if c.is_alphanumeric() {
            spaced.push(c);
        } else {
            spaced.push(' ');
        }
    }
    spaced
        .split_whitespace()
        .filter(|tok| !STOP_TOKENS.contains(tok) && !is_year_token(tok))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_year_token(tok: &str) -> bool {
    tok.len() == 4 && tok.chars().all(|c| c.is_ascii_digit())
}

/// URL-safe slug: diacritics stripped, non-alphanumerics folded to single
/// hyphens. Years are kept — slugs want them.
pub fn slugify(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let mut slug = String::with_capacity(stripped.len());
    let mut last_hyphen = true;
    for c in stripped.chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Diacritic-insensitive lookup over a canonical reference table, with a
/// bounded Levenshtein fallback. Never guesses: no hit within the ceiling
/// means `None`.
pub struct FuzzyMatcher {
    entries: Vec<(String, i64)>,
    max_distance: usize,
}

impl FuzzyMatcher {
    pub fn new(variants: Vec<(String, i64)>, max_distance: usize) -> Self {
        let mut entries: Vec<(String, i64)> = variants
            .into_iter()
            .map(|(name, id)| (normalize(&name), id))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        entries.sort();
        entries.dedup();
        Self {
            entries,
            max_distance,
        }
    }

    pub fn lookup(&self, raw: &str) -> Option<i64> {
        let needle = normalize(raw);
        if needle.is_empty() {
            return None;
        }
        for (variant, id) in &self.entries {
            if *variant == needle {
                return Some(*id);
            }
        }
        if self.max_distance == 0 {
            return None;
        }
        let mut best: Option<(usize, i64)> = None;
        for (variant, id) in &self.entries {
            let distance = strsim::levenshtein(variant, &needle);
            if distance <= self.max_distance {
                match best {
                    Some((current, _)) if current <= distance => {}
                    _ => best = Some((distance, *id)),
                }
            }
        }
        best.map(|(_, id)| id)
    }
}

/// Cities match exact alias first, then nearest within Levenshtein 2.
pub const CITY_LEVENSHTEIN_CEILING: usize = 2;

/// Genres are shorter strings; one edit is already generous.
pub const GENRE_LEVENSHTEIN_CEILING: usize = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_diacritics_and_noise() {
        assert_eq!(
            normalize("Festival Gnaoua et Musiques du Monde 2025"),
            "gnaoua et musiques du monde"
        );
        assert_eq!(normalize("Fès Fest — 27e Édition"), "fes 27e");
        assert_eq!(normalize("  TANJAzz  2024!!"), "tanjazz");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in [
            "Festival Gnaoua et Musiques du Monde 2025",
            "L'Boulevard des Jeunes Musiciens",
            "Moussem Culturel d'Asilah",
            "",
            "éàçüñ 1999 fest",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn year_tokens_are_removed_but_other_numbers_stay() {
        assert_eq!(normalize("Jazzablanca 2026"), "jazzablanca");
        assert_eq!(normalize("Top 100 DJs"), "top 100 djs");
    }

    #[test]
    fn slugify_keeps_years() {
        assert_eq!(slugify("Festival Gnaoua 2025"), "festival-gnaoua-2025");
        assert_eq!(slugify("  L'Boulevard!  "), "l-boulevard");
    }

    fn city_matcher() -> FuzzyMatcher {
        FuzzyMatcher::new(
            vec![
                ("Essaouira".to_string(), 25),
                ("Mogador".to_string(), 25),
                ("Marrakech".to_string(), 24),
                ("Marrakesh".to_string(), 24),
                ("Fès".to_string(), 10),
                ("Fez".to_string(), 10),
            ],
            CITY_LEVENSHTEIN_CEILING,
        )
    }

    #[test]
    fn city_match_exact_variant_first() {
        let matcher = city_matcher();
        assert_eq!(matcher.lookup("ESSAOUIRA"), Some(25));
        assert_eq!(matcher.lookup("Mogador"), Some(25));
        assert_eq!(matcher.lookup("Fès"), Some(10));
    }

    #[test]
    fn city_match_within_levenshtein_ceiling() {
        let matcher = city_matcher();
        assert_eq!(matcher.lookup("Essaouirra"), Some(25));
        assert_eq!(matcher.lookup("Marakech"), Some(24));
    }

    #[test]
    fn city_match_never_guesses() {
        let matcher = city_matcher();
        assert_eq!(matcher.lookup("Ouarzazate"), None);
        assert_eq!(matcher.lookup(""), None);
    }
}
