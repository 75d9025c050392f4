//! Orthographic variants of place names.

const ADMIN_SUFFIXES: [&str; 8] = ["市", "縣", "區", "鄉", "鎮", " city", " county", " district"];

/// Trimmed, ASCII-lowercased form used for every comparison.
pub fn fold(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Swaps 台 and 臺 in whichever direction applies.
pub fn swap_tai(name: &str) -> Option<String> {
    if name.contains('台') {
        Some(name.replace('台', "臺"))
    } else if name.contains('臺') {
        Some(name.replace('臺', "台"))
    } else {
        None
    }
}

/// Drops one trailing administrative suffix, keeping at least two characters.
pub fn strip_admin_suffix(name: &str) -> Option<String> {
    ADMIN_SUFFIXES.iter().find_map(|suffix| {
        let stem = name.strip_suffix(suffix)?.trim_end();
        (stem.chars().count() >= 2).then(|| stem.to_string())
    })
}

/// All spellings under which `name` is recognized, folded, most specific first.
pub fn variants(name: &str) -> Vec<String> {
    let base = fold(name);
    let mut out = vec![base.clone()];
    let mut push = |v: String| {
        if !out.contains(&v) {
            out.push(v);
        }
    };
    if let Some(swapped) = swap_tai(&base) {
        push(swapped);
    }
    if let Some(stem) = strip_admin_suffix(&base) {
        let swapped = swap_tai(&stem);
        push(stem);
        if let Some(swapped) = swapped {
            push(swapped);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tai_variants_cover_both_spellings() {
        assert_eq!(variants("臺北市"), vec!["臺北市", "台北市", "臺北", "台北"]);
        assert_eq!(variants("台南"), vec!["台南", "臺南"]);
    }

    #[test]
    fn suffix_is_stripped_only_with_a_two_char_stem() {
        assert_eq!(strip_admin_suffix("信義區"), Some("信義".to_string()));
        assert_eq!(strip_admin_suffix("東區"), None);
        assert_eq!(strip_admin_suffix("taipei city"), Some("taipei".to_string()));
    }

    #[test]
    fn ascii_is_case_folded() {
        assert_eq!(variants("  Xinyi District "), vec!["xinyi district", "xinyi"]);
    }
}
