//! Deterministic fallback FAQ section
//!
//! If a rendered article is missing an FAQ section, the pipeline appends
//! one derived from the scenario rather than rejecting an otherwise-good
//! article over a formatting slip.

use regex::Regex;

/// Matches `## FAQ` or `## Frequently Asked Questions`, case-insensitive.
pub fn has_faq_section(markdown: &str) -> bool {
    let re = Regex::new(r"(?im)^##\s+(FAQ|Frequently Asked Questions)\b").unwrap();
    re.is_match(markdown)
}

/// Builds 4-5 question/answer pairs derived from persona/pain/goal/value
/// proposition, and appends them as a `## FAQ` section if one is missing.
/// Returns the article unchanged if it already has a matching section.
pub fn ensure_faq_section(
    markdown: &str,
    persona_archetype: &str,
    pain_point_detail: &str,
    goal_focus: &str,
    value_proposition: &str,
) -> String {
    if has_faq_section(markdown) {
        return markdown.to_string();
    }

    let section = build_fallback_faq(persona_archetype, pain_point_detail, goal_focus, value_proposition);
    format!("{}\n\n{}\n", markdown.trim_end(), section)
}

fn build_fallback_faq(
    persona_archetype: &str,
    pain_point_detail: &str,
    goal_focus: &str,
    value_proposition: &str,
) -> String {
    let qas = [
        (
            format!("Who is this guide for?"),
            format!("This is written for a {persona_archetype} dealing with {pain_point_detail}."),
        ),
        (
            format!("What problem does this solve?"),
            format!("It addresses {pain_point_detail} directly, with practical steps you can apply right away."),
        ),
        (
            format!("What should I expect to achieve?"),
            format!("The goal is {goal_focus}, measured by concrete, visible progress."),
        ),
        (
            format!("How does this compare to other approaches?"),
            format!("{value_proposition} sets it apart from more generic alternatives."),
        ),
        (
            format!("Where should I start?"),
            "Start with the first section above and work through it in order.".to_string(),
        ),
    ];

    let mut section = String::from("## FAQ\n\n");
    for (q, a) in qas {
        section.push_str(&format!("**{q}**\n\n{a}\n\n"));
    }
    section.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_existing_faq_header() {
        assert!(has_faq_section("Intro\n\n## FAQ\n\nQ: x\nA: y\n"));
        assert!(has_faq_section("## Frequently Asked Questions\n"));
        assert!(has_faq_section("## faq\n"));
        assert!(!has_faq_section("## Related Reading\n"));
    }

    #[test]
    fn test_ensure_faq_section_appends_when_missing() {
        let body = "# Title\n\nSome article body.";
        let result = ensure_faq_section(body, "beekeeper", "swarming hives", "calmer colonies", "guided training");
        assert!(has_faq_section(&result));
        assert!(result.starts_with(body));
    }

    #[test]
    fn test_ensure_faq_section_is_noop_when_present() {
        let body = "# Title\n\n## FAQ\n\nAlready here.";
        let result = ensure_faq_section(body, "x", "y", "z", "w");
        assert_eq!(result, body);
    }

    #[test]
    fn test_fallback_has_four_to_five_pairs() {
        let section = build_fallback_faq("a", "b", "c", "d");
        let count = section.matches("**").count() / 2;
        assert!((4..=5).contains(&count));
    }
}
