//! Shell command parsing for security validation.
//!
//! The gate needs two views of a command string: the sequential segments
//! (split at `&&`, `||`, `;`, `|`, `>`, `<`) for test-plan and deny-list
//! matching, and the set of invoked program names (including programs inside
//! `$(...)` and backtick substitutions) for allowlist checks. Parsing is
//! intentionally conservative: anything that cannot be tokenized cleanly
//! yields no commands, which the gate treats as a block.

/// Wrapper programs whose real command is the next argument.
const WRAPPER_COMMANDS: &[&str] = &["sudo", "env", "command", "nohup", "time", "nice", "stdbuf"];

/// Split a command string into sequential segments at shell control
/// operators. Quoted operators are not treated as separators.
#[must_use]
pub fn split_command_segments(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = command.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            '&' | '|' if !in_single && !in_double => {
                // Consume doubled operator (&&, ||); single | also splits.
                if chars.peek() == Some(&c) {
                    chars.next();
                }
                segments.push(current.clone());
                current.clear();
            }
            ';' | '>' | '<' if !in_single && !in_double => {
                segments.push(current.clone());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    segments.push(current);

    segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Extract every invoked program name from a command string.
///
/// Handles pipes, redirections, command substitutions (`$(...)` and
/// backticks), env-var prefixes (`FOO=bar cmd`), and wrapper programs
/// (`sudo`, `env`, ...). Returns an empty vector when the command cannot be
/// parsed; callers must treat that as a failure.
#[must_use]
pub fn extract_commands(command: &str) -> Vec<String> {
    let mut expanded = vec![command.to_string()];
    expanded.extend(extract_substitutions(command));

    let mut programs = Vec::new();
    for chunk in expanded {
        for segment in split_command_segments(&chunk) {
            if let Some(program) = program_of_segment(&segment) {
                if !programs.contains(&program) {
                    programs.push(program);
                }
            }
        }
    }
    programs
}

/// Pull the inner text of `$(...)` and `` `...` `` substitutions.
fn extract_substitutions(command: &str) -> Vec<String> {
    let mut found = Vec::new();
    let bytes = command.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'(' {
            let mut depth = 1;
            let start = i + 2;
            let mut j = start;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth == 0 {
                found.push(command[start..j - 1].to_string());
            }
            i = j;
        } else if bytes[i] == b'`' {
            if let Some(end) = command[i + 1..].find('`') {
                found.push(command[i + 1..i + 1 + end].to_string());
                i += end + 2;
            } else {
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    found
}

/// First program token of a segment, skipping env assignments, wrappers,
/// and leading subshell parentheses.
fn program_of_segment(segment: &str) -> Option<String> {
    let mut tokens = segment.split_whitespace();

    loop {
        let token = tokens.next()?;
        let token = token
            .trim_start_matches(['(', '{'])
            .trim_end_matches([')', '}', ';']);
        if token.is_empty() {
            continue;
        }
        // KEY=value prefixes are environment assignments, not programs.
        if is_env_assignment(token) {
            continue;
        }
        if WRAPPER_COMMANDS.contains(&token) {
            continue;
        }
        // Inner text of substitutions is handled separately.
        if token.starts_with("$(") || token.starts_with('`') {
            return None;
        }
        return Some(token.to_string());
    }
}

fn is_env_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// Find the segment whose program is `cmd`, for validator dispatch.
#[must_use]
pub fn get_command_for_validation(cmd: &str, segments: &[String]) -> Option<String> {
    segments
        .iter()
        .find(|segment| program_of_segment(segment).as_deref() == Some(cmd))
        .cloned()
}
