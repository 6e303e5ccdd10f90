use serde_json::Value;

/// Parse a model response that should contain a list of strings.
///
/// Accepts a JSON array, a JSON object with one array-valued field, or plain
/// text with one item per line (bullets and numbering removed). Markdown code
/// fences are ignored.
pub fn parse_string_list(raw: &str) -> Vec<String> {
    let body = strip_code_fence(raw.trim());

    if let Some(items) = json_list(body) {
        return items;
    }

    // Models often wrap the JSON in prose; try the first bracketed span.
    if let (Some(start), Some(end)) = (body.find('['), body.rfind(']')) {
        if start < end {
            if let Some(items) = json_list(&body[start..=end]) {
                return items;
            }
        }
    }

    body.lines()
        .map(strip_list_marker)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn json_list(text: &str) -> Option<Vec<String>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let array = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().find_map(|(_, v)| match v {
            Value::Array(items) => Some(items),
            _ => None,
        })?,
        _ => return None,
    };

    Some(
        array
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Object(map) => map
                    .get("name")
                    .or_else(|| map.get("question"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
    )
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn strip_list_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("\u{2022} "))
    {
        return rest;
    }

    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest;
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_array() {
        assert_eq!(
            parse_string_list(r#"["Acme Corp", "Beta Ltd"]"#),
            vec!["Acme Corp", "Beta Ltd"]
        );
    }

    #[test]
    fn test_json_object_and_fence() {
        let raw = "```json\n{\"entities\": [\"Acme\"]}\n```";
        assert_eq!(parse_string_list(raw), vec!["Acme"]);
    }

    #[test]
    fn test_embedded_array_in_prose() {
        let raw = "Here you go: [\"Acme\", \"Beta\"] hope it helps";
        assert_eq!(parse_string_list(raw), vec!["Acme", "Beta"]);
    }

    #[test]
    fn test_numbered_lines() {
        let raw = "1. What is the fee?\n2) Who pays it?\n- Bullet item\n\n";
        assert_eq!(
            parse_string_list(raw),
            vec!["What is the fee?", "Who pays it?", "Bullet item"]
        );
    }
}
