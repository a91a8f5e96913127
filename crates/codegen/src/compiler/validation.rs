//! Checks mirroring the downstream graph validator's literal restriction.

/// Whether `fragment` contains list, set, mapping or tuple literal syntax
/// outside of string literals.
///
/// Meant for call expressions and payload declarations; a parenthesis that
/// does not follow a name or a closing bracket opens a tuple or group and
/// counts as container syntax.
pub fn contains_container_literal(fragment: &str) -> bool {
    let chars: Vec<char> = fragment.chars().collect();
    let mut previous: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                i = skip_string(&chars, i);
                previous = Some(c);
                continue;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '[' | '{' => return true,
            '(' => {
                let is_call = previous
                    .map(|p| p == '_' || p == ')' || p == ']' || p.is_alphanumeric())
                    .unwrap_or(false);
                if !is_call {
                    return true;
                }
            }
            _ => {}
        }
        if !c.is_whitespace() {
            previous = Some(c);
        }
        i += 1;
    }
    false
}

/// Index just past the string literal starting at `start`.
fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let triple = chars.len() >= start + 3 && chars[start + 1] == quote && chars[start + 2] == quote;
    let mut i = if triple { start + 3 } else { start + 1 };

    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => {
                if !triple {
                    return i + 1;
                }
                if i + 2 < chars.len() && chars[i + 1] == quote && chars[i + 2] == quote {
                    return i + 3;
                }
                i += 1;
            }
            '\n' if !triple => return i,
            _ => i += 1,
        }
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_calls_are_clean() {
        assert!(!contains_container_literal("add(a=1, b=x)"));
        assert!(!contains_container_literal("log(self.game, f\"{hp} of {total}\")"));
        assert!(!contains_container_literal("clamp(value, float(\"inf\"))"));
    }

    #[test]
    fn test_containers_detected() {
        assert!(contains_container_literal("spawn(points=[1, 2])"));
        assert!(contains_container_literal("spawn(options={\"a\": 1})"));
        assert!(contains_container_literal("spawn((1, 2))"));
    }

    #[test]
    fn test_strings_are_skipped() {
        assert!(!contains_container_literal("say(\"[not a list]\")"));
        assert!(!contains_container_literal("say('{x}', \"\\\"[\")"));
        assert!(!contains_container_literal("PAYLOAD = '''{\n  \"nodes\": []\n}'''"));
    }
}
