//! Fixed quick-start phrasings. Natural requests like "I'd love a chatbot"
//! deliberately fall through to the conversation.

use regex::Regex;
use std::sync::LazyLock;

use crate::templates::TemplateKind;

static PHRASINGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)generate a new '(?P<kind>\w+)' project",
        r"(?i)initialize with (?P<kind>\w+) template",
        r"(?i)create an? (?P<kind>\w+) for me",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("quick-start phrasing is a valid regex"))
    .collect()
});

/// The raw `<kind>` word captured by the first matching phrasing.
pub fn capture(prompt: &str) -> Option<&str> {
    PHRASINGS
        .iter()
        .find_map(|re| re.captures(prompt))
        .and_then(|c| c.name("kind"))
        .map(|m| m.as_str())
}

/// Template requested by `prompt`, if it is a quick-start command naming a
/// known template.
pub fn parse(prompt: &str) -> Option<TemplateKind> {
    capture(prompt).and_then(TemplateKind::from_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Generate a new 'portfolio' project", Some(TemplateKind::Portfolio))]
    #[case("initialize with ECOMMERCE template please", Some(TemplateKind::Ecommerce))]
    #[case("Create a chatbot for me", Some(TemplateKind::Chatbot))]
    #[case("Could you create a landingpage for me?", Some(TemplateKind::LandingPage))]
    #[case("Create an website for me", Some(TemplateKind::Website))]
    #[case("Create a blog for me", None)]
    #[case("Make the headline bigger", None)]
    #[case("I'd love a chatbot", None)]
    fn grammar(#[case] prompt: &str, #[case] expected: Option<TemplateKind>) {
        assert_eq!(parse(prompt), expected);
    }

    #[test]
    fn captures_unknown_words() {
        assert_eq!(capture("Create a mess for me"), Some("mess"));
    }
}
