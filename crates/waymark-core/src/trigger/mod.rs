//! Decides when a conversation has gathered enough context to generate a
//! roadmap.

use serde::{Deserialize, Serialize};
use waymark_db::models::{Message, MessageRole};

/// Number of user messages after which generation fires without an
/// advisory signal.
pub const USER_MESSAGE_THRESHOLD: usize = 4;

/// What the Generation Service's conversational endpoint thinks about the
/// context gathered so far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvisorySignal {
    pub should_generate_roadmap: bool,
    /// In `[0, 1]`. Informational only.
    pub context_completeness: f64,
}

/// The trigger policy. Pure: fires iff generation has not completed for the
/// session and either enough user messages exist or the advisory signal
/// asks for it.
pub fn should_generate(
    messages: &[Message],
    generation_completed: bool,
    signal: Option<&AdvisorySignal>,
) -> bool {
    if generation_completed {
        return false;
    }
    user_message_count(messages) >= USER_MESSAGE_THRESHOLD
        || signal.is_some_and(|s| s.should_generate_roadmap)
}

pub fn user_message_count(messages: &[Message]) -> usize {
    messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .count()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn msg(role: MessageRole, seq: i32) -> Message {
        Message {
            id: i64::from(seq),
            session_id: Uuid::nil(),
            seq,
            role,
            content: format!("message {seq}"),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    fn conversation(user_messages: usize) -> Vec<Message> {
        let mut out = Vec::new();
        for i in 0..user_messages {
            let seq = out.len() as i32 + 1;
            out.push(msg(MessageRole::User, seq));
            if i + 1 < user_messages {
                out.push(msg(MessageRole::Assistant, seq + 1));
            }
        }
        out
    }

    #[test]
    fn three_user_messages_do_not_fire() {
        assert!(!should_generate(&conversation(3), false, None));
    }

    #[test]
    fn fourth_user_message_fires() {
        let messages = conversation(4);
        assert!(should_generate(&messages, false, None));
    }

    #[test]
    fn does_not_refire_after_claim() {
        let messages = conversation(4);
        assert!(should_generate(&messages, false, None));
        // The orchestrator claims by setting the flag; the same state no
        // longer fires.
        assert!(!should_generate(&messages, true, None));
        assert!(!should_generate(&conversation(9), true, None));
    }

    #[test]
    fn assistant_messages_do_not_count() {
        let mut messages = conversation(2);
        for seq in 10..20 {
            messages.push(msg(MessageRole::Assistant, seq));
            messages.push(msg(MessageRole::System, seq + 100));
        }
        assert_eq!(user_message_count(&messages), 2);
        assert!(!should_generate(&messages, false, None));
    }

    #[test]
    fn advisory_signal_fires_early() {
        let yes = AdvisorySignal {
            should_generate_roadmap: true,
            context_completeness: 0.9,
        };
        let no = AdvisorySignal {
            should_generate_roadmap: false,
            context_completeness: 0.95,
        };
        let messages = conversation(1);

        assert!(should_generate(&messages, false, Some(&yes)));
        assert!(!should_generate(&messages, false, Some(&no)));
        assert!(!should_generate(&messages, true, Some(&yes)));
    }

    #[test]
    fn negative_signal_does_not_block_threshold() {
        let no = AdvisorySignal {
            should_generate_roadmap: false,
            context_completeness: 0.1,
        };
        assert!(should_generate(&conversation(4), false, Some(&no)));
    }
}
