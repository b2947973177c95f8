//! Chat session state. Turns are kept for `/history` only; every query is
//! answered on its own.

use chrono::{DateTime, Local};
use tablesage_core::Intent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Ask(String),
    History,
    Quit,
    Empty,
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => ChatInput::Empty,
            "/quit" | "/exit" => ChatInput::Quit,
            "/history" => ChatInput::History,
            _ => ChatInput::Ask(line.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub asked_at: DateTime<Local>,
    pub question: String,
    pub intent: Intent,
    pub answer: String,
}

#[derive(Debug, Default)]
pub struct ChatSession {
    turns: Vec<Turn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, question: impl Into<String>, intent: Intent, answer: impl Into<String>) {
        self.turns.push(Turn {
            asked_at: Local::now(),
            question: question.into(),
            intent,
            answer: answer.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ChatInput::parse("  /quit "), ChatInput::Quit);
        assert_eq!(ChatInput::parse("/exit"), ChatInput::Quit);
        assert_eq!(ChatInput::parse("/history"), ChatInput::History);
        assert_eq!(ChatInput::parse("   "), ChatInput::Empty);
        assert_eq!(
            ChatInput::parse(" vegan tacos in Austin? "),
            ChatInput::Ask("vegan tacos in Austin?".to_string())
        );
    }

    #[test]
    fn test_turns_keep_order() {
        let mut session = ChatSession::new();
        assert!(session.is_empty());
        session.record("hi", Intent::Fallback, "hello");
        session.record("history of ramen", Intent::HistoricalContext, "ramen...");

        let questions: Vec<&str> = session.turns().iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["hi", "history of ramen"]);
        assert_eq!(session.turns()[1].intent, Intent::HistoricalContext);
    }
}
