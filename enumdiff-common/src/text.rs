//! Vocabulary text normalization
//!
//! Candidate strings proposed by the analysis service and the values of the
//! known-vocabulary catalog pass through the same normalization, so that
//! grouping and catalog matching agree on what "the same value" means.

/// Normalize a vocabulary string for comparison and grouping.
///
/// Steps:
/// 1. Lower-case
/// 2. Transliterate German umlauts (`ä`→`ae`, `ö`→`oe`, `ü`→`ue`, `ß`→`ss`)
///    and strip other Latin diacritics
/// 3. Drop punctuation (hyphens are kept, `/` and `_` become spaces)
/// 4. Trim and collapse runs of whitespace to a single space
pub fn normalize_vocabulary(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());

    for ch in text.chars().flat_map(char::to_lowercase) {
        match fold_char(ch) {
            Folded::One(c) => folded.push(c),
            Folded::Two(a, b) => {
                folded.push(a);
                folded.push(b);
            }
            Folded::Space => folded.push(' '),
            Folded::Drop => {}
        }
    }

    collapse_whitespace(&folded)
}

/// Trim and collapse all whitespace runs to single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

enum Folded {
    One(char),
    Two(char, char),
    Space,
    Drop,
}

fn fold_char(ch: char) -> Folded {
    match ch {
        'ä' => Folded::Two('a', 'e'),
        'ö' => Folded::Two('o', 'e'),
        'ü' => Folded::Two('u', 'e'),
        'ß' => Folded::Two('s', 's'),
        'à' | 'á' | 'â' | 'ã' | 'å' | 'ā' => Folded::One('a'),
        'ç' | 'č' | 'ć' => Folded::One('c'),
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ě' => Folded::One('e'),
        'ì' | 'í' | 'î' | 'ï' | 'ī' => Folded::One('i'),
        'ñ' | 'ń' | 'ň' => Folded::One('n'),
        'ò' | 'ó' | 'ô' | 'õ' | 'ø' | 'ō' => Folded::One('o'),
        'ù' | 'ú' | 'û' | 'ū' | 'ů' => Folded::One('u'),
        'ý' | 'ÿ' => Folded::One('y'),
        'š' | 'ś' => Folded::One('s'),
        'ž' | 'ź' | 'ż' => Folded::One('z'),
        'ř' => Folded::One('r'),
        '-' => Folded::One('-'),
        '/' | '_' => Folded::Space,
        c if c.is_whitespace() => Folded::Space,
        c if c.is_alphanumeric() => Folded::One(c),
        _ => Folded::Drop,
    }
}
