use futures_util::StreamExt;
use serde::Serialize;

use super::models::Transcript;
use crate::ai::personality::{PersonalityError, PersonalityRegistry};
use crate::openai::{CompletionInvoker, Message, Role};

/// Shown after the partial reply while it is still streaming.
pub const CURSOR_MARKER: &str = "▌";

/// Committed as the assistant's reply whenever a completion fails.
pub const FALLBACK_REPLY: &str = "Sorry, I encountered an issue. Please try again later.";

/// Lifecycle of a single turn. Starts `Idle` and ends in either
/// `Committed` or `FallbackCommitted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    AwaitingCompletion,
    Streaming,
    Committed,
    Failed,
    FallbackCommitted,
}

/// Display updates emitted while a turn runs.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A fragment arrived. `content` is everything so far and
    /// `display` is `content` plus the cursor marker.
    Partial {
        fragment: String,
        content: String,
        display: String,
    },
    /// The reply finished and was committed as is.
    Complete { content: String },
    /// The completion failed and `content` (the fallback reply) was
    /// committed instead of anything streamed so far.
    Failed { error: String, content: String },
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub state: TurnState,
    pub reply: Message,
}

struct Turn {
    state: TurnState,
}

impl Turn {
    fn new() -> Self {
        Self {
            state: TurnState::Idle,
        }
    }

    fn advance(&mut self, next: TurnState) {
        tracing::debug!("Turn state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Per-session chat context: the transcript plus whichever personality
/// is currently selected. Nothing here is shared between sessions.
#[derive(Debug)]
pub struct ChatSession {
    transcript: Transcript,
    personality_id: String,
}

impl ChatSession {
    pub fn new(personality_id: &str) -> Self {
        Self {
            transcript: Transcript::new(),
            personality_id: personality_id.to_string(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn personality_id(&self) -> &str {
        &self.personality_id
    }

    /// Switch personality for all subsequent turns. Messages already
    /// in the transcript are left alone.
    pub fn select_personality(
        &mut self,
        registry: &PersonalityRegistry,
        id: &str,
    ) -> Result<(), PersonalityError> {
        let personality = registry.lookup(id)?;
        self.personality_id = personality.id.clone();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.transcript.clear();
    }

    /// Runs one turn: records `input`, streams the reply from
    /// `invoker` while reporting progress to `on_event` and commits the
    /// result to the transcript.
    ///
    /// A failed completion never fails the turn. The fallback reply is
    /// committed in its place and partial output is dropped.
    pub async fn run_turn<F>(
        &mut self,
        registry: &PersonalityRegistry,
        invoker: &dyn CompletionInvoker,
        input: &str,
        mut on_event: F,
    ) -> Result<TurnOutcome, PersonalityError>
    where
        F: FnMut(TurnEvent),
    {
        // Resolved before touching the transcript so a bad selection
        // leaves the session unchanged
        let personality = registry.lookup(&self.personality_id)?;
        let mut turn = Turn::new();

        self.transcript.append(Message::new(Role::User, input));
        turn.advance(TurnState::AwaitingCompletion);

        let mut messages = Vec::with_capacity(self.transcript.len() + 1);
        messages.push(Message::new(Role::System, &personality.system_prompt));
        messages.extend(self.transcript.snapshot());

        let mut stream = invoker.invoke(messages);
        let mut buffer = String::new();

        let result = loop {
            match stream.next().await {
                Some(Ok(fragment)) => {
                    if turn.state != TurnState::Streaming {
                        turn.advance(TurnState::Streaming);
                    }
                    buffer.push_str(&fragment);
                    on_event(TurnEvent::Partial {
                        fragment,
                        content: buffer.clone(),
                        display: format!("{}{}", buffer, CURSOR_MARKER),
                    });
                }
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            }
        };

        let reply = match result {
            Ok(()) => {
                if buffer.is_empty() {
                    tracing::warn!("Completion finished without any content");
                }
                on_event(TurnEvent::Complete {
                    content: buffer.clone(),
                });
                let reply = Message::new(Role::Assistant, &buffer);
                self.transcript.append(reply.clone());
                turn.advance(TurnState::Committed);
                reply
            }
            Err(e) => {
                if turn.state == TurnState::AwaitingCompletion {
                    turn.advance(TurnState::Streaming);
                }
                turn.advance(TurnState::Failed);
                tracing::error!(
                    "Completion failed after {} bytes of output: {}",
                    buffer.len(),
                    e
                );
                on_event(TurnEvent::Failed {
                    error: e.to_string(),
                    content: FALLBACK_REPLY.to_string(),
                });
                let reply = Message::new(Role::Assistant, FALLBACK_REPLY);
                self.transcript.append(reply.clone());
                turn.advance(TurnState::FallbackCommitted);
                reply
            }
        };

        Ok(TurnOutcome {
            state: turn.state,
            reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::openai::{CompletionError, FragmentStream};

    #[derive(Clone)]
    enum Step {
        Fragment(&'static str),
        Fail(&'static str),
    }

    /// Replays the same script for every request and records what it
    /// was asked.
    struct ScriptedInvoker {
        script: Vec<Step>,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedInvoker {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<Vec<Message>> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl CompletionInvoker for ScriptedInvoker {
        fn invoke(&self, messages: Vec<Message>) -> FragmentStream {
            self.requests.lock().unwrap().push(messages);
            let items: Vec<Result<String, CompletionError>> = self
                .script
                .iter()
                .map(|step| match step {
                    Step::Fragment(text) => Ok(text.to_string()),
                    Step::Fail(msg) => Err(CompletionError::Api(msg.to_string())),
                })
                .collect();
            Box::pin(futures_util::stream::iter(items))
        }
    }

    fn registry() -> PersonalityRegistry {
        PersonalityRegistry::new().unwrap()
    }

    #[tokio::test]
    async fn test_turn_commits_concatenated_fragments() {
        let registry = registry();
        let invoker = ScriptedInvoker::new(vec![
            Step::Fragment("Hel"),
            Step::Fragment("lo"),
            Step::Fragment("!"),
        ]);
        let mut session = ChatSession::new("Friendly");
        let mut events = Vec::new();

        let outcome = session
            .run_turn(&registry, &invoker, "Hi", |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(outcome.state, TurnState::Committed);
        assert_eq!(outcome.reply, Message::new(Role::Assistant, "Hello!"));
        assert_eq!(
            session.transcript().snapshot(),
            vec![
                Message::new(Role::User, "Hi"),
                Message::new(Role::Assistant, "Hello!"),
            ]
        );

        let displays: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Partial { display, .. } => Some(display.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(displays, vec!["Hel▌", "Hello▌", "Hello!▌"]);
        assert_eq!(
            events[1],
            TurnEvent::Partial {
                fragment: "lo".to_string(),
                content: "Hello".to_string(),
                display: "Hello▌".to_string(),
            }
        );
        assert_eq!(
            events.last(),
            Some(&TurnEvent::Complete {
                content: "Hello!".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_turn_discards_partial_output_on_failure() {
        let registry = registry();
        let invoker = ScriptedInvoker::new(vec![
            Step::Fragment("Par"),
            Step::Fragment("t"),
            Step::Fail("connection reset"),
        ]);
        let mut session = ChatSession::new("Friendly");
        let mut events = Vec::new();

        let outcome = session
            .run_turn(&registry, &invoker, "Hi", |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(outcome.state, TurnState::FallbackCommitted);
        assert_eq!(outcome.reply.content, FALLBACK_REPLY);
        let committed = session.transcript().snapshot();
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[1], Message::new(Role::Assistant, FALLBACK_REPLY));
        assert!(committed.iter().all(|m| m.content != "Part"));

        match events.last() {
            Some(TurnEvent::Failed { error, content }) => {
                assert!(error.contains("connection reset"));
                assert_eq!(content, FALLBACK_REPLY);
            }
            other => panic!("Expected Failed event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_turn_fails_before_first_fragment() {
        let registry = registry();
        let invoker = ScriptedInvoker::new(vec![Step::Fail("401 Unauthorized")]);
        let mut session = ChatSession::new("Professional");
        let mut events = Vec::new();

        let outcome = session
            .run_turn(&registry, &invoker, "Hi", |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(outcome.state, TurnState::FallbackCommitted);
        assert_eq!(events.len(), 1);
        assert_eq!(session.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_transcript_has_two_messages_per_turn() {
        let registry = registry();
        let ok = ScriptedInvoker::new(vec![Step::Fragment("Sure.")]);
        let failing = ScriptedInvoker::new(vec![Step::Fail("boom")]);
        let mut session = ChatSession::new("Friendly");

        let inputs = ["one", "two", "three", "four"];
        for (i, input) in inputs.iter().enumerate() {
            let invoker: &dyn CompletionInvoker = if i % 2 == 0 { &ok } else { &failing };
            session
                .run_turn(&registry, invoker, input, |_| {})
                .await
                .unwrap();
        }

        let messages = session.transcript().snapshot();
        assert_eq!(messages.len(), inputs.len() * 2);
        for (i, input) in inputs.iter().enumerate() {
            assert_eq!(messages[i * 2], Message::new(Role::User, input));
            assert_eq!(messages[i * 2 + 1].role, Role::Assistant);
        }
    }

    #[tokio::test]
    async fn test_request_includes_system_prompt_and_history() {
        let registry = registry();
        let invoker = ScriptedInvoker::new(vec![Step::Fragment("A")]);
        let mut session = ChatSession::new("Friendly");

        session.run_turn(&registry, &invoker, "first", |_| {}).await.unwrap();
        session.run_turn(&registry, &invoker, "second", |_| {}).await.unwrap();

        let requests = invoker.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.len(), 4);
        assert_eq!(second[0].role, Role::System);
        assert_eq!(
            second[0].content,
            registry.lookup("Friendly").unwrap().system_prompt
        );
        assert_eq!(second[1], Message::new(Role::User, "first"));
        assert_eq!(second[2], Message::new(Role::Assistant, "A"));
        assert_eq!(second[3], Message::new(Role::User, "second"));
    }

    #[tokio::test]
    async fn test_personality_change_applies_to_next_turn_only() {
        let registry = registry();
        let invoker = ScriptedInvoker::new(vec![Step::Fragment("Hey!")]);
        let mut session = ChatSession::new("Friendly");

        session.run_turn(&registry, &invoker, "Hi", |_| {}).await.unwrap();
        let before = session.transcript().snapshot();

        session.select_personality(&registry, "Humorous").unwrap();
        assert_eq!(session.personality_id(), "Humorous");
        // Switching alone doesn't touch the transcript
        assert_eq!(session.transcript().snapshot(), before);

        session.run_turn(&registry, &invoker, "Again", |_| {}).await.unwrap();

        let requests = invoker.requests();
        assert_eq!(
            requests[0][0].content,
            registry.lookup("Friendly").unwrap().system_prompt
        );
        assert_eq!(
            requests[1][0].content,
            registry.lookup("Humorous").unwrap().system_prompt
        );
        assert_eq!(&session.transcript().snapshot()[..2], &before[..]);
    }

    #[tokio::test]
    async fn test_select_unknown_personality_keeps_selection() {
        let registry = registry();
        let mut session = ChatSession::new("Professional");
        assert!(session.select_personality(&registry, "Grumpy").is_err());
        assert_eq!(session.personality_id(), "Professional");
    }

    #[tokio::test]
    async fn test_unknown_personality_leaves_transcript_untouched() {
        let registry = registry();
        let invoker = ScriptedInvoker::new(vec![Step::Fragment("A")]);
        let mut session = ChatSession::new("Grumpy");

        let result = session.run_turn(&registry, &invoker, "Hi", |_| {}).await;

        assert!(matches!(result, Err(PersonalityError::NotFound(_))));
        assert!(session.transcript().is_empty());
        assert!(invoker.requests().is_empty());
    }

    #[tokio::test]
    async fn test_reset_then_continue() {
        let registry = registry();
        let invoker = ScriptedInvoker::new(vec![Step::Fragment("A")]);
        let mut session = ChatSession::new("Friendly");

        session.run_turn(&registry, &invoker, "Hi", |_| {}).await.unwrap();
        session.reset();
        assert!(session.transcript().is_empty());

        session.run_turn(&registry, &invoker, "Hi again", |_| {}).await.unwrap();
        // Only the system prompt and the new message are sent
        assert_eq!(invoker.requests()[1].len(), 2);
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn test_turn_event_serialization() {
        let event = TurnEvent::Partial {
            fragment: "lo".to_string(),
            content: "Hello".to_string(),
            display: "Hello▌".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "partial");
        assert_eq!(json["fragment"], "lo");
        assert_eq!(json["content"], "Hello");
        assert_eq!(json["display"], "Hello▌");

        let event = TurnEvent::Failed {
            error: "boom".to_string(),
            content: FALLBACK_REPLY.to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "failed");
    }
}
