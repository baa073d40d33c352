use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::ai::chat::ChatSession;
use crate::ai::{DEFAULT_PERSONALITY, PersonalityRegistry};
use crate::core::AppConfig;
use crate::openai::CompletionInvoker;

/// Sessions untouched for this long are dropped the next time a new
/// session is created.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Upper bound on live sessions. The least recently used idle session
/// makes room for a new one.
pub const MAX_SESSIONS: usize = 1024;

/// A session is locked for the whole duration of a turn so only one
/// reply can be in flight per session.
pub type SharedSession = Arc<Mutex<ChatSession>>;

struct SessionEntry {
    session: SharedSession,
    last_used: Instant,
}

impl SessionEntry {
    // Handlers and turn tasks hold their own clone while they use it
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.session) > 1
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<PersonalityRegistry>,
    pub invoker: Arc<dyn CompletionInvoker>,
    // Keyed by the session ID handed out to each browser
    sessions: HashMap<String, SessionEntry>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: PersonalityRegistry,
        invoker: Arc<dyn CompletionInvoker>,
    ) -> Self {
        Self::with_session_limits(
            config,
            registry,
            invoker,
            SESSION_IDLE_TIMEOUT,
            MAX_SESSIONS,
        )
    }

    pub fn with_session_limits(
        config: AppConfig,
        registry: PersonalityRegistry,
        invoker: Arc<dyn CompletionInvoker>,
        idle_timeout: Duration,
        max_sessions: usize,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            invoker,
            sessions: HashMap::new(),
            idle_timeout,
            max_sessions,
        }
    }

    /// Look up an existing session and mark it as recently used.
    pub fn session(&mut self, id: &str) -> Option<SharedSession> {
        let entry = self.sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    pub fn get_or_create_session(&mut self, id: &str) -> SharedSession {
        if let Some(session) = self.session(id) {
            return session;
        }

        self.evict_sessions();
        tracing::info!("Creating chat session {}", id);
        let session = Arc::new(Mutex::new(ChatSession::new(DEFAULT_PERSONALITY)));
        self.sessions.insert(
            id.to_string(),
            SessionEntry {
                session: Arc::clone(&session),
                last_used: Instant::now(),
            },
        );
        session
    }

    /// Drop idle sessions past the timeout, then the least recently
    /// used ones until there is room for one more. Sessions in use are
    /// never dropped.
    fn evict_sessions(&mut self) {
        let now = Instant::now();
        let idle_timeout = self.idle_timeout;
        let before = self.sessions.len();

        self.sessions
            .retain(|_, entry| entry.in_use() || now.duration_since(entry.last_used) < idle_timeout);

        while self.sessions.len() >= self.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .filter(|(_, entry)| !entry.in_use())
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            let Some(oldest) = oldest else {
                tracing::warn!(
                    "All {} chat sessions are busy, exceeding the session limit",
                    self.sessions.len()
                );
                break;
            };
            self.sessions.remove(&oldest);
        }

        let evicted = before - self.sessions.len();
        if evicted > 0 {
            tracing::info!("Evicted {} chat sessions", evicted);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
