//! UI-agnostic chat display types
//!
//! The conversation keeps user and bot messages in two separate sequences.
//! Anything that renders the chat merges them through [`interleave`].

use serde::{Deserialize, Serialize};

/// Who authored an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One display unit of chat text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub sender: Sender,
    pub text: String,
}

impl Utterance {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
        }
    }
}

/// Merge the two message sequences into display order.
///
/// Pairs entries index-wise, the bot entry at `i` always before the user
/// entry at `i`. Indices missing from the shorter sequence are skipped.
pub fn interleave(user_messages: &[String], bot_messages: &[String]) -> Vec<Utterance> {
    let len = user_messages.len().max(bot_messages.len());
    let mut combined = Vec::with_capacity(user_messages.len() + bot_messages.len());

    for i in 0..len {
        if let Some(text) = bot_messages.get(i) {
            combined.push(Utterance::bot(text.as_str()));
        }
        if let Some(text) = user_messages.get(i) {
            combined.push(Utterance::user(text.as_str()));
        }
    }

    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_greeting_only() {
        let combined = interleave(&[], &strings(&["greeting"]));
        assert_eq!(combined, vec![Utterance::bot("greeting")]);
    }

    #[test]
    fn test_both_empty() {
        assert!(interleave(&[], &[]).is_empty());
    }

    #[test]
    fn test_bot_before_user_at_each_index() {
        let user = strings(&["u0", "u1"]);
        let bot = strings(&["b0", "b1"]);
        let combined = interleave(&user, &bot);
        assert_eq!(
            combined,
            vec![
                Utterance::bot("b0"),
                Utterance::user("u0"),
                Utterance::bot("b1"),
                Utterance::user("u1"),
            ]
        );
    }

    #[test]
    fn test_more_user_than_bot() {
        let user = strings(&["u0", "u1", "u2"]);
        let bot = strings(&["b0"]);
        let combined = interleave(&user, &bot);
        assert_eq!(combined.len(), 4);
        assert_eq!(combined[0], Utterance::bot("b0"));
        assert_eq!(combined[3], Utterance::user("u2"));
    }

    #[test]
    fn test_more_bot_than_user() {
        let user = strings(&["u0"]);
        let bot = strings(&["greeting", "reply", "extra"]);
        let combined = interleave(&user, &bot);
        assert_eq!(
            combined,
            vec![
                Utterance::bot("greeting"),
                Utterance::user("u0"),
                Utterance::bot("reply"),
                Utterance::bot("extra"),
            ]
        );
    }

    #[test]
    fn test_empty_text_is_still_emitted() {
        let combined = interleave(&strings(&[""]), &strings(&["greeting"]));
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[1], Utterance::user(""));
    }

    #[test]
    fn test_length_is_sum_of_inputs() {
        for (u, b) in [(0, 0), (0, 3), (4, 1), (2, 2), (5, 7)] {
            let user: Vec<String> = (0..u).map(|i| format!("u{}", i)).collect();
            let bot: Vec<String> = (0..b).map(|i| format!("b{}", i)).collect();
            assert_eq!(interleave(&user, &bot).len(), u + b);
        }
    }

    #[test]
    fn test_repeat_calls_identical() {
        let user = strings(&["hi", "how are you"]);
        let bot = strings(&["greeting", "hello"]);
        assert_eq!(interleave(&user, &bot), interleave(&user, &bot));
    }
}
