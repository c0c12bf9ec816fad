//! Prompt assembly
//!
//! Two sources feed the persona system prompt: caller-supplied custom
//! parameters (templated below) or the persisted persona document. The turn
//! prompt linearizes the persona block, optional retrieved context, and a
//! window of recent dialogue into a single completion-style prompt ending
//! with an open `Assistant:` line.

use std::collections::HashMap;
use std::fmt::Write as _;

use voicebot_core::conversation::RELEVANT_CONTEXT_PREFIX;
use voicebot_core::{Turn, TurnRole};

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// The spoken-language instruction for a configured language.
///
/// Hindi-family languages get the Hinglish instruction the deployments use.
fn language_instruction(language: Option<&str>) -> String {
    match language {
        Some(lang) if lang.to_lowercase().contains("hi") => {
            "Baat karo Hinglish mein (mix of Hindi and English).".to_string()
        }
        Some(lang) => format!("Speak in {}.", lang),
        None => "Speak in English.".to_string(),
    }
}

/// Build the persona system prompt from caller-supplied custom parameters.
///
/// Recognized keys: `persona_name`, `persona_age`, `tone`, `gender`, `city`,
/// `language`, `documents`, `customer_name`. Missing keys drop their clause.
pub fn build_system_prompt(params: &HashMap<String, String>) -> String {
    let mut intro = String::from("You are ");
    intro.push_str(param(params, "persona_name").unwrap_or("a voice assistant"));

    if let Some(age) = param(params, "persona_age") {
        let _ = write!(intro, ", {} years old", age);
    }

    let descriptor: Vec<&str> = [param(params, "tone"), param(params, "gender")]
        .into_iter()
        .flatten()
        .collect();
    if !descriptor.is_empty() {
        let _ = write!(intro, ", a {}", descriptor.join(" "));
    }
    if let Some(city) = param(params, "city") {
        let _ = write!(intro, " from {}", city);
    }
    intro.push('.');

    let mut prompt = format!(
        "{}\n\n{}\n\n",
        intro,
        language_instruction(param(params, "language"))
    );

    if let Some(documents) = param(params, "documents") {
        let _ = write!(prompt, "Sirf in documents se jawab do:\n{}\n\n", documents);
    }
    if let Some(customer) = param(params, "customer_name") {
        let _ = write!(prompt, "Customer ka naam: {}\n\n", customer);
    }

    prompt.trim_end().to_string()
}

/// Assemble retrieved knowledge chunks into the context block
pub fn context_block(chunks: &[String]) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }
    Some(format!("{}\n{}", RELEVANT_CONTEXT_PREFIX, chunks.join("\n\n")))
}

/// Linearize one turn's prompt: persona block, optional context block, the
/// recent dialogue window, and the open assistant line.
///
/// `prior_turns` must not include the current user utterance; it is appended
/// explicitly at the end.
pub fn build_turn_prompt(
    system: &str,
    context: Option<&str>,
    prior_turns: &[&Turn],
    user_text: &str,
) -> String {
    let mut prompt = String::with_capacity(system.len() + 256);
    prompt.push_str(system.trim());
    prompt.push_str("\n\n");

    if let Some(context) = context {
        prompt.push_str(context.trim());
        prompt.push_str("\n\n");
    }

    for turn in prior_turns {
        match turn.role {
            TurnRole::User => {
                let _ = writeln!(prompt, "User: {}", turn.text);
            }
            TurnRole::Assistant => {
                let _ = writeln!(prompt, "Assistant: {}", turn.text);
            }
            TurnRole::System => {}
        }
    }

    let _ = write!(prompt, "User: {}\nAssistant:", user_text);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_full_template() {
        let prompt = build_system_prompt(&params(&[
            ("persona_name", "Priya"),
            ("persona_age", "28"),
            ("tone", "friendly"),
            ("gender", "woman"),
            ("city", "Mumbai"),
            ("language", "Hindi"),
            ("documents", "Pricing sheet v2"),
            ("customer_name", "Rahul"),
        ]));

        assert!(prompt.starts_with("You are Priya, 28 years old, a friendly woman from Mumbai."));
        assert!(prompt.contains("Baat karo Hinglish mein (mix of Hindi and English)."));
        assert!(prompt.contains("Sirf in documents se jawab do:\nPricing sheet v2"));
        assert!(prompt.contains("Customer ka naam: Rahul"));
    }

    #[test]
    fn test_omitted_fields_drop_clauses() {
        let prompt = build_system_prompt(&params(&[("persona_name", "Priya")]));
        assert!(prompt.starts_with("You are Priya."));
        assert!(!prompt.contains("years old"));
        assert!(!prompt.contains("documents"));
        assert!(!prompt.contains("Customer ka naam"));
        assert!(prompt.contains("Speak in English."));
    }

    #[test]
    fn test_language_instruction() {
        let english = build_system_prompt(&params(&[("language", "Spanish")]));
        assert!(english.contains("Speak in Spanish."));

        // "hi" and "hindi" both select Hinglish, case-insensitively
        let hinglish = build_system_prompt(&params(&[("language", "HI")]));
        assert!(hinglish.contains("Baat karo Hinglish mein"));
    }

    #[test]
    fn test_context_block() {
        assert!(context_block(&[]).is_none());
        let block = context_block(&["chunk a".to_string(), "chunk b".to_string()]).unwrap();
        assert_eq!(block, "Relevant context:\nchunk a\n\nchunk b");
    }

    #[test]
    fn test_turn_prompt_shape() {
        let turns = vec![Turn::user("hello"), Turn::assistant("hi there")];
        let prior: Vec<&Turn> = turns.iter().collect();

        let prompt = build_turn_prompt(
            "You are a bot.",
            Some("Relevant context:\npricing info"),
            &prior,
            "how much?",
        );

        assert!(prompt.starts_with("You are a bot.\n\nRelevant context:\npricing info\n\n"));
        assert!(prompt.contains("User: hello\nAssistant: hi there\n"));
        assert!(prompt.ends_with("User: how much?\nAssistant:"));
    }
}
