// Condition expression evaluation for `if:` guards on jobs and steps.
//
// Supports the status functions (`success()`, `failure()`, `always()`,
// `cancelled()`), equality and boolean operators, `contains`/`startsWith`/
// `endsWith`, and dot-path context lookups. An expression that references no
// status function is implicitly gated on `success()`.

use flowrun_common::RunResult;

/// Evaluate a condition expression.
///
/// `condition` is the raw `if:` value from the workflow YAML; an empty
/// condition defaults to `success()`. Returns `true` if the guarded job or
/// step should execute.
pub fn evaluate_condition(
    condition: &str,
    job_status: RunResult,
    is_cancelled: bool,
    context: &serde_json::Value,
) -> bool {
    let trimmed = condition.trim();

    if trimmed.is_empty() {
        return job_status.is_succeeded();
    }

    // Strip the outer ${{ }} wrapper if present.
    let expr = if trimmed.starts_with("${{") && trimmed.ends_with("}}") {
        trimmed[3..trimmed.len() - 2].trim()
    } else {
        trimmed
    };

    let lower = expr.to_lowercase();

    // Bare status function calls.
    if lower == "always()" {
        return true;
    }
    if lower == "cancelled()" {
        return is_cancelled;
    }
    if lower == "failure()" {
        return matches!(job_status, RunResult::Failed);
    }
    if lower == "success()" {
        return job_status.is_succeeded();
    }

    if contains_status_function(&lower) {
        return evaluate_compound_condition(expr, job_status, is_cancelled, context);
    }

    // No status function referenced: implicit success() gate.
    if !job_status.is_succeeded() {
        return false;
    }

    evaluate_expression(expr, context)
}

fn contains_status_function(lower: &str) -> bool {
    lower.contains("always()")
        || lower.contains("cancelled()")
        || lower.contains("failure()")
        || lower.contains("success()")
}

/// Evaluate a condition that mixes status functions with other expressions.
fn evaluate_compound_condition(
    expr: &str,
    job_status: RunResult,
    is_cancelled: bool,
    context: &serde_json::Value,
) -> bool {
    let lower = expr.to_lowercase();

    // "<status>() && rest" forms. The remainder is sliced out of the
    // original expression: context keys are case-sensitive, only string
    // comparison is not.
    let prefixed: &[(&str, bool)] = &[
        ("always()", true),
        ("failure()", matches!(job_status, RunResult::Failed)),
        ("cancelled()", is_cancelled),
        ("success()", job_status.is_succeeded()),
    ];
    for (function, status_holds) in prefixed {
        if lower.starts_with(function) {
            let rest = expr[function.len()..].trim();
            if rest.starts_with("||") {
                // "<status>() || rest" is handled by the OR split below.
                break;
            }
            if !status_holds {
                return false;
            }
            if rest.is_empty() {
                return true;
            }
            if let Some(rest) = rest.strip_prefix("&&") {
                return evaluate_expression(rest.trim(), context);
            }
            return true;
        }
    }

    // "!cancelled() && rest" form.
    if lower.contains("!cancelled()") || lower.contains("! cancelled()") {
        if is_cancelled {
            return false;
        }
        let cleaned = replace_ascii_ignore_case(
            &replace_ascii_ignore_case(expr, "! cancelled()", "true"),
            "!cancelled()",
            "true",
        );
        return evaluate_expression(&cleaned, context);
    }

    // OR across alternatives, any of which may be a status function.
    if lower.contains("||") {
        return expr.split("||").any(|part| {
            let part = part.trim();
            match part.to_lowercase().as_str() {
                "always()" => true,
                "failure()" => matches!(job_status, RunResult::Failed),
                "cancelled()" => is_cancelled,
                "success()" => job_status.is_succeeded(),
                _ => evaluate_expression(part, context),
            }
        });
    }

    evaluate_expression(expr, context)
}

/// Evaluate an expression with no status functions against the context.
fn evaluate_expression(expr: &str, context: &serde_json::Value) -> bool {
    let trimmed = expr.trim();

    if trimmed.is_empty() || trimmed == "true" {
        return true;
    }
    if trimmed == "false" {
        return false;
    }

    // Logical operators bind looser than comparisons, so split on them
    // first. `||` is the loosest of all.
    if let Some((left, right)) = split_comparison(trimmed, "||") {
        return evaluate_expression(left, context) || evaluate_expression(right, context);
    }
    if let Some((left, right)) = split_comparison(trimmed, "&&") {
        return evaluate_expression(left, context) && evaluate_expression(right, context);
    }

    if let Some(inner) = trimmed.strip_prefix('!') {
        return !evaluate_expression(inner.trim(), context);
    }

    // Hosted evaluation compares strings case-insensitively.
    if let Some((left, right)) = split_comparison(trimmed, "==") {
        let left = resolve_value(left.trim(), context);
        let right = resolve_value(right.trim(), context);
        return left.eq_ignore_ascii_case(&right);
    }
    if let Some((left, right)) = split_comparison(trimmed, "!=") {
        let left = resolve_value(left.trim(), context);
        let right = resolve_value(right.trim(), context);
        return !left.eq_ignore_ascii_case(&right);
    }

    if let Some(args) = extract_function_args(trimmed, "contains") {
        if let Some((haystack, needle)) = split_function_args(&args) {
            let h = resolve_value(haystack.trim(), context).to_lowercase();
            let n = resolve_value(needle.trim(), context).to_lowercase();
            return h.contains(&n);
        }
    }
    if let Some(args) = extract_function_args(trimmed, "startswith") {
        if let Some((s, prefix)) = split_function_args(&args) {
            let sv = resolve_value(s.trim(), context).to_lowercase();
            let pv = resolve_value(prefix.trim(), context).to_lowercase();
            return sv.starts_with(&pv);
        }
    }
    if let Some(args) = extract_function_args(trimmed, "endswith") {
        if let Some((s, suffix)) = split_function_args(&args) {
            let sv = resolve_value(s.trim(), context).to_lowercase();
            let fv = resolve_value(suffix.trim(), context).to_lowercase();
            return sv.ends_with(&fv);
        }
    }

    // Bare context path: check truthiness of the resolved value.
    is_truthy(&resolve_value(trimmed, context))
}

/// Resolve a literal or context path to its string value.
fn resolve_value(expr: &str, context: &serde_json::Value) -> String {
    let trimmed = expr.trim();

    if (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
        || (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
    {
        return trimmed[1..trimmed.len() - 1].to_string();
    }

    if trimmed.parse::<f64>().is_ok() {
        return trimmed.to_string();
    }

    if trimmed == "true" || trimmed == "false" {
        return trimmed.to_string();
    }

    // Dot-path navigation, with bracket notation for quoted keys.
    let mut current = context;
    for part in trimmed.split('.') {
        if let Some(bracket_start) = part.find('[') {
            let key = &part[..bracket_start];
            if !key.is_empty() {
                current = match current.get(key) {
                    Some(v) => v,
                    None => return String::new(),
                };
            }
            let inner = &part[bracket_start + 1..part.len().saturating_sub(1)];
            let inner = inner.trim_matches('\'').trim_matches('"');
            current = match current.get(inner) {
                Some(v) => v,
                None => return String::new(),
            };
        } else {
            current = match current.get(part) {
                Some(v) => v,
                None => return String::new(),
            };
        }
    }

    match current {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Truthiness rules: empty, `0`, `false`, and `null` are false.
fn is_truthy(value: &str) -> bool {
    !(value.is_empty() || value == "0" || value == "false" || value == "null")
}

/// Replace every occurrence of an ASCII `needle`, ignoring case, keeping the
/// rest of the text untouched.
fn replace_ascii_ignore_case(text: &str, needle: &str, replacement: &str) -> String {
    let bytes = text.as_bytes();
    let pattern = needle.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if i + pattern.len() <= bytes.len()
            && bytes[i..i + pattern.len()].eq_ignore_ascii_case(pattern)
        {
            out.push_str(replacement);
            i += pattern.len();
        } else {
            let ch = text[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

/// Find `op` outside of string literals and split there.
fn split_comparison<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let mut in_string = false;
    let mut string_char = ' ';
    let bytes = expr.as_bytes();
    let op_bytes = op.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_string {
            if c == string_char {
                in_string = false;
            }
        } else if c == '\'' || c == '"' {
            in_string = true;
            string_char = c;
        } else if i + op_bytes.len() <= bytes.len() && &bytes[i..i + op_bytes.len()] == op_bytes {
            return Some((&expr[..i], &expr[i + op.len()..]));
        }
        i += 1;
    }

    None
}

/// Extract the argument text from `funcName(args)`.
fn extract_function_args(expr: &str, func_name: &str) -> Option<String> {
    let lower = expr.to_lowercase();
    let prefix = format!("{}(", func_name);
    if lower.starts_with(&prefix) && expr.ends_with(')') {
        Some(expr[prefix.len()..expr.len() - 1].to_string())
    } else {
        None
    }
}

/// Split function arguments on the first top-level comma.
fn split_function_args(args: &str) -> Option<(String, String)> {
    let mut depth = 0;
    let mut in_string = false;
    let mut string_char = ' ';

    for (i, c) in args.char_indices() {
        if in_string {
            if c == string_char {
                in_string = false;
            }
        } else if c == '\'' || c == '"' {
            in_string = true;
            string_char = c;
        } else if c == '(' {
            depth += 1;
        } else if c == ')' {
            depth -= 1;
        } else if c == ',' && depth == 0 {
            return Some((args[..i].to_string(), args[i + 1..].to_string()));
        }
    }

    None
}
