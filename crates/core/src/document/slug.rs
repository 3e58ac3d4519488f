//! Slug derivation and collision handling.
//!
//! Slugs must be unique among non-deleted documents of the same type.
//! Uniqueness is resolved at write time by scanning existing slugs,
//! not enforced by a storage constraint.

/// Transliterate a title (or explicit slug) into a URL slug: ASCII
/// fold, lowercase, collapse every non-alphanumeric run to a single
/// hyphen, trim hyphens.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_hyphen = false;
    for ch in input.chars() {
        for c in ascii_fold(ch).chars() {
            if c.is_ascii_alphanumeric() {
                if pending_hyphen && !out.is_empty() {
                    out.push('-');
                }
                pending_hyphen = false;
                out.push(c.to_ascii_lowercase());
            } else {
                pending_hyphen = true;
            }
        }
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

/// Fold common accented Latin characters to their ASCII base. Anything
/// else passes through and is treated as a separator unless it is
/// ASCII alphanumeric.
fn ascii_fold(ch: char) -> String {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "a".into(),
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => "e".into(),
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => "i".into(),
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'ø' | 'Ø' => "o".into(),
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => "u".into(),
        'ý' | 'ÿ' | 'Ý' => "y".into(),
        'ñ' | 'Ñ' => "n".into(),
        'ç' | 'Ç' => "c".into(),
        'ß' => "ss".into(),
        'æ' | 'Æ' => "ae".into(),
        other => other.to_string(),
    }
}

/// Resolve a slug collision by appending `-2`, `-3`, … until the slug
/// is not in `taken` (the slugs of every other live document).
pub fn dedupe<'a, I>(base: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: std::collections::HashSet<&str> = taken.into_iter().collect();
    if !taken.contains(base) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_titles() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Spaces   everywhere  "), "spaces-everywhere");
        assert_eq!(slugify("C'est déjà l'été!"), "c-est-deja-l-ete");
        assert_eq!(slugify("100% Pure"), "100-pure");
    }

    #[test]
    fn empty_title_falls_back() {
        assert_eq!(slugify(""), "untitled");
        assert_eq!(slugify("!!!"), "untitled");
    }

    #[test]
    fn dedupes_with_numeric_suffix() {
        assert_eq!(dedupe("hello-world", []), "hello-world");
        assert_eq!(dedupe("hello-world", ["hello-world"]), "hello-world-2");
        assert_eq!(
            dedupe("hello-world", ["hello-world", "hello-world-2"]),
            "hello-world-3"
        );
    }
}
