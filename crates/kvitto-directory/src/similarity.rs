//! String similarity scoring for location mapping.
//!
//! Pure functions, no I/O. Scores are in `[0, 1]`:
//! exact match 1.0, substring containment 0.9, otherwise a normalized
//! Levenshtein ratio. Comparison is case-insensitive throughout.

use kvitto_core::Address;

/// Scores the similarity of two location names.
///
/// - Exact match (case-insensitive): `1.0`.
/// - One name contained in the other: `0.9` — handles chains that prefix
///   or suffix the city ("Café Aurora Stockholm" vs "Aurora Stockholm").
/// - Otherwise `1 - levenshtein / max_len`.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.9;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    #[allow(clippy::cast_precision_loss)]
    let ratio = levenshtein(&a_chars, &b_chars) as f64 / max_len as f64;
    1.0 - ratio
}

/// Scores the similarity of two addresses.
///
/// Averages postal-code equality, city equality (case-insensitive), and
/// street-line similarity (via [`name_similarity`]), counting only fields
/// present on both sides. Returns `0.0` when no field is comparable.
#[must_use]
pub fn address_similarity(a: &Address, b: &Address) -> f64 {
    let mut total = 0.0;
    let mut compared = 0u32;

    if let (Some(pa), Some(pb)) = (&a.postal_code, &b.postal_code) {
        compared += 1;
        if normalize_postal(pa) == normalize_postal(pb) {
            total += 1.0;
        }
    }
    if let (Some(ca), Some(cb)) = (&a.city, &b.city) {
        compared += 1;
        if ca.trim().eq_ignore_ascii_case(cb.trim()) {
            total += 1.0;
        }
    }
    if let (Some(la), Some(lb)) = (&a.line1, &b.line1) {
        compared += 1;
        total += name_similarity(la, lb);
    }

    if compared == 0 {
        return 0.0;
    }
    total / f64::from(compared)
}

/// Postal codes compare ignoring interior whitespace ("111 51" == "11151").
fn normalize_postal(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Classic two-row Levenshtein distance over char slices.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
