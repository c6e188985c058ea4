/// Result of splitting a declarative script into statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitScript {
    /// Trimmed statements, comments removed, each ending with `;`.
    pub statements: Vec<String>,
    /// Number of bare `;` found between statements.
    pub empty_statements: usize,
    /// Non-blank text after the last `;`.
    pub trailing: Option<String>,
}

/// Split SQL text on `;` outside of quotes and comments.
///
/// `--` and `/* */` comments are dropped. Quoted text ('...', "...",
/// `...`) is kept verbatim, doubled quotes included.
pub fn split_statements(text: &str) -> SplitScript {
    let mut out = SplitScript::default();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                current.push('\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                current.push(' ');
            }
            '\'' | '"' | '`' => {
                current.push(c);
                for quoted in chars.by_ref() {
                    current.push(quoted);
                    if quoted == c {
                        break;
                    }
                }
            }
            ';' => {
                let stmt = current.trim();
                if stmt.is_empty() {
                    out.empty_statements += 1;
                } else {
                    out.statements.push(format!("{stmt};"));
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        out.trailing = Some(rest.to_string());
    }
    out
}

/// Whether a statement manages transactions itself.
pub fn is_transaction_control(statement: &str) -> bool {
    let mut words = statement
        .split(|c: char| c.is_whitespace() || c == ';')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase());

    match words.next().as_deref() {
        Some("BEGIN" | "COMMIT" | "ROLLBACK" | "SAVEPOINT" | "RELEASE") => true,
        // A bare END closes a trigger body.
        Some("END") => words.next().as_deref() == Some("TRANSACTION"),
        _ => false,
    }
}
