//! Quoting helpers shared by the kubectl wrapper and the in-sandbox scripts.

/// Single-quote an argument for `sh`, escaping embedded single quotes.
pub fn shell_escape(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    let escaped = arg.replace('\'', "'\\''");
    format!("'{}'", escaped)
}

/// Render a command line for logs and error reports. Only arguments that
/// contain whitespace or quotes are quoted, so the common case stays readable.
pub fn command_line_string(program: &str, args: &[&str]) -> String {
    let mut s = String::from(program);
    for a in args {
        s.push(' ');
        if a.is_empty() || a.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
            s.push_str(&shell_escape(a));
        } else {
            s.push_str(a);
        }
    }
    s
}
