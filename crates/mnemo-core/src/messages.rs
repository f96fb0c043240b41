use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Author of a chat message. Stored rows never carry any other value.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One entry of an OpenAI-style `messages` array.
///
/// `is_summarization` is accepted from clients (`isSummarization`, as a bool
/// or as `0`/`1`) but never forwarded to providers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(
        default,
        skip_serializing,
        rename = "isSummarization",
        alias = "is_summarization",
        deserialize_with = "flag"
    )]
    pub is_summarization: bool,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            is_summarization: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn summarization(mut self) -> Self {
        self.is_summarization = true;
        self
    }
}

/// Last message authored by the user, if any.
pub fn last_user_message(messages: &[ChatMessage]) -> Option<&ChatMessage> {
    messages.iter().rev().find(|m| m.role == Role::User)
}

/// Accepts `true`/`false`, `1`/`0` and `null`.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_and_display() {
        for role in [Role::User, Role::Assistant, Role::System] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("tool".parse::<Role>().is_err());
        assert!("User".parse::<Role>().is_err());
    }

    #[test]
    fn summarization_flag_not_forwarded() {
        let msg = ChatMessage::user("summarize this").summarization();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "summarize this"}));
    }

    #[test]
    fn summarization_flag_accepts_bool_and_int() {
        let a: ChatMessage =
            serde_json::from_str(r#"{"role":"user","content":"x","isSummarization":true}"#)
                .unwrap();
        let b: ChatMessage =
            serde_json::from_str(r#"{"role":"user","content":"x","isSummarization":1}"#).unwrap();
        let c: ChatMessage =
            serde_json::from_str(r#"{"role":"user","content":"x","isSummarization":0}"#).unwrap();
        let d: ChatMessage = serde_json::from_str(r#"{"role":"user","content":"x"}"#).unwrap();
        assert!(a.is_summarization);
        assert!(b.is_summarization);
        assert!(!c.is_summarization);
        assert!(!d.is_summarization);
    }

    #[test]
    fn unknown_role_rejected() {
        let res: Result<ChatMessage, _> = serde_json::from_str(r#"{"role":"tool","content":"x"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn last_user_message_skips_assistant() {
        let messages = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
            ChatMessage::assistant("another"),
        ];
        assert_eq!(last_user_message(&messages).unwrap().content, "second");
        assert!(last_user_message(&[ChatMessage::system("s")]).is_none());
    }
}
