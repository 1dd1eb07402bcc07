//! Canonical comparison keys for policy numbers, broker names and account
//! holders.
//!
//! RULE: This is the only place normalization logic lives. Callers compare
//! keys produced here — they never re-implement any of these rules.
//!
//! All functions are pure, total and idempotent: normalizing an already
//! normalized value returns it unchanged.

/// Normalize an insurer policy number into a matching key.
///
/// Spreadsheet exports render long policy numbers in scientific notation
/// (`"1.2345E+11"`); those are expanded back to plain integers first so the
/// exponent digits are not mistaken for policy digits. Everything that is
/// not a digit is then dropped, and finally *every* zero digit is removed —
/// insurers pad and re-pad policy numbers with zeros in inconsistent
/// places, so only the nonzero digits are stable across sources.
pub fn normalize_policy_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let expanded = expand_scientific(trimmed);
    let source = expanded.as_deref().unwrap_or(trimmed);
    source
        .chars()
        .filter(|c| c.is_ascii_digit() && *c != '0')
        .collect()
}

/// Normalize a free-text broker or advisor name into a matching key:
/// lowercase, umlauts and accents folded to ASCII, punctuation and
/// whitespace dropped entirely.
pub fn normalize_broker_name(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    for ch in raw.chars() {
        fold_char(ch, &mut key);
    }
    key
}

/// Normalize an account holder name into a matching key.
///
/// Parenthetical qualifiers ("Huber, Maria (geb. Schmidt)") are unwrapped:
/// the parentheses and the delimiters inside them disappear but the inner
/// words survive. Remaining punctuation is dropped and whitespace collapses
/// to single spaces so word boundaries stay available for containment
/// scoring.
pub fn normalize_account_holder(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        if ch == '(' || ch == ')' || ch.is_whitespace() || is_delimiter(ch) {
            if !key.is_empty() {
                pending_space = true;
            }
            continue;
        }
        let before = key.len();
        fold_char(ch, &mut key);
        if key.len() > before && pending_space {
            let folded = key.split_off(before);
            key.push(' ');
            key.push_str(&folded);
            pending_space = false;
        }
    }
    key
}

/// Lowercase one character, fold umlauts/accents to ASCII and append the
/// result; anything non-alphanumeric is dropped.
fn fold_char(ch: char, out: &mut String) {
    for lc in ch.to_lowercase() {
        match lc {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'ß' => out.push_str("ss"),
            'á' | 'à' | 'â' | 'å' => out.push('a'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'í' | 'ì' | 'î' | 'ï' => out.push('i'),
            'ó' | 'ò' | 'ô' | 'ø' => out.push('o'),
            'ú' | 'ù' | 'û' => out.push('u'),
            'ç' => out.push('c'),
            'ñ' => out.push('n'),
            c if c.is_alphanumeric() => out.push(c),
            _ => {}
        }
    }
}

/// Punctuation that separates name parts ("Huber, Maria" / "geb. Schmidt").
fn is_delimiter(ch: char) -> bool {
    matches!(ch, ',' | '.' | ';' | '/' | '-' | '&' | '+')
}

/// Expand a spreadsheet scientific-notation rendering of an integer
/// (`"1.2345E+11"`) to its plain digit string. Returns `None` when the
/// input is not such a rendering (including negative exponents, which
/// cannot come from an integer policy number).
fn expand_scientific(raw: &str) -> Option<String> {
    let (mantissa, exp) = raw.split_once(['e', 'E'])?;
    let exp: u32 = exp.strip_prefix('+').unwrap_or(exp).parse().ok()?;
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa, ""),
    };
    if int_part.is_empty()
        || !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let shift = (exp as usize).checked_sub(frac_part.len())?;
    let mut digits = String::with_capacity(int_part.len() + frac_part.len() + shift);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    digits.extend(std::iter::repeat('0').take(shift));
    Some(digits)
}
