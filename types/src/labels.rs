/// Kubernetes label keys the Console reconciler always sets itself; these
/// win over template labels on conflict. Everything else is
/// template-then-console-overlay.
pub const LABEL_CONSOLE_NAME: &str = "console-name";
pub const LABEL_USER: &str = "user";

const MAX_LABEL_LEN: usize = 63;

/// Sanitises a label value: characters outside `[A-Za-z0-9._-]` become `-`,
/// then the result is truncated to 63 characters (the Kubernetes label
/// value length limit).
pub fn sanitise_label_value(value: &str) -> String {
    let sanitised: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    sanitised.chars().take(MAX_LABEL_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_invalid_characters() {
        assert_eq!(sanitise_label_value("alice@example.com"), "alice-example.com");
    }

    #[test]
    fn truncates_to_63() {
        let long = "a".repeat(100);
        assert_eq!(sanitise_label_value(&long).len(), MAX_LABEL_LEN);
    }

    #[test]
    fn leaves_valid_values_untouched() {
        assert_eq!(sanitise_label_value("console-abc123"), "console-abc123");
    }
}
