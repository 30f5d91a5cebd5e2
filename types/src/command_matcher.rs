use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Selects an [`AuthorisationRule`](crate::console_template::AuthorisationRule) by
/// comparing against the resolved command's first argument (the program name).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(tag = "type", content = "value")]
pub enum CommandMatcher {
    /// Matches only when the command's first argument equals this string.
    Exact(String),
    /// Matches any command; used as an explicit catch-all rule.
    Any,
}

impl CommandMatcher {
    pub fn matches(&self, command: &[String]) -> bool {
        match self {
            CommandMatcher::Any => true,
            CommandMatcher::Exact(want) => command.first().is_some_and(|got| got == want),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything() {
        assert!(CommandMatcher::Any.matches(&[]));
        assert!(CommandMatcher::Any.matches(&["bash".to_string()]));
    }

    #[test]
    fn exact_matches_program_name_only() {
        let m = CommandMatcher::Exact("psql".to_string());
        assert!(m.matches(&["psql".to_string(), "-U".to_string()]));
        assert!(!m.matches(&["bash".to_string()]));
        assert!(!m.matches(&[]));
    }
}
