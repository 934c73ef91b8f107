//! Name rules shared by every kind of scene data

/// Longest name a scene item can carry, in bytes
pub const MAX_NAME_LEN: usize = 63;

/// Cut `name` to at most `max` bytes on a character boundary
fn truncate_to(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Enforce [`MAX_NAME_LEN`], warning when the name had to be shortened
pub fn truncate_name(name: &str) -> String {
    let truncated = truncate_to(name, MAX_NAME_LEN);
    if truncated.len() < name.len() {
        tracing::warn!(
            "Name {} is longer than {} characters and was truncated to {}",
            name,
            MAX_NAME_LEN,
            truncated
        );
    }
    truncated.to_string()
}

/// Split a trailing `.NNN` suffix off a name: `("Mat", Some(1))` for `Mat.001`
pub fn split_numeric_suffix(name: &str) -> (&str, Option<u32>) {
    if let Some((stem, suffix)) = name.rsplit_once('.') {
        if !stem.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = suffix.parse() {
                return (stem, Some(n));
            }
        }
    }
    (name, None)
}

/// First free name derived from `base`: `base`, then `base.001`, `base.002`...
pub fn unique_name(base: &str, exists: impl Fn(&str) -> bool) -> String {
    let base = truncate_name(base);
    if !exists(&base) {
        return base;
    }

    let (stem, _) = split_numeric_suffix(&base);
    let mut n = 1u32;
    loop {
        let suffix = format!(".{:03}", n);
        let candidate = format!(
            "{}{}",
            truncate_to(stem, MAX_NAME_LEN.saturating_sub(suffix.len())),
            suffix
        );
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_unique_suffixes() {
        let mut taken: HashSet<String> = HashSet::new();
        for _ in 0..3 {
            let name = unique_name("Material", |n| taken.contains(n));
            taken.insert(name);
        }
        assert!(taken.contains("Material"));
        assert!(taken.contains("Material.001"));
        assert!(taken.contains("Material.002"));
        assert_eq!(unique_name("Material.001", |n| taken.contains(n)), "Material.003");
    }

    #[test]
    fn test_truncation() {
        let long = "l".repeat(70);
        assert_eq!(truncate_name(&long).len(), MAX_NAME_LEN);
        let taken = truncate_name(&long);
        let second = unique_name(&long, |n| n == taken);
        assert_eq!(second.len(), MAX_NAME_LEN);
        assert!(second.ends_with(".001"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let name = format!("{}é", "a".repeat(62));
        assert_eq!(truncate_name(&name), "a".repeat(62));
    }

    #[test]
    fn test_split_numeric_suffix() {
        assert_eq!(split_numeric_suffix("Mat.001"), ("Mat", Some(1)));
        assert_eq!(split_numeric_suffix("base.link.12"), ("base.link", Some(12)));
        assert_eq!(split_numeric_suffix("Mat.x01"), ("Mat.x01", None));
        assert_eq!(split_numeric_suffix("Mat"), ("Mat", None));
        assert_eq!(split_numeric_suffix(".001"), (".001", None));
    }
}
