//! Reasoning stage: context-assembling adapter around the opaque agent
//!
//! Final stage of the escalation pipeline. Gathers a bounded context window
//! (top-k personal documents plus recent session history), releases all
//! store locks, then invokes the reasoning agent under a hard timeout and
//! maps its free-form response into the fixed verdict shape. Timeout or a
//! malformed response degrades to `uncertain` at confidence 0.5 instead of
//! failing the request.
//!
//! Verdict synthesis combines the agent's per-message score with the
//! session's accumulated suspicion as `max(agent, session)` — the
//! weighted-max rule — so a thread that already looked dangerous cannot be
//! laundered by one innocuous follow-up message.

use async_trait::async_trait;
use mailguard_core::{EmailRecord, Result, ScanVerdict, StageId, Verdict};
use mailguard_store::{ContextStore, ConversationTracker, Document, SessionView};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default agent call timeout
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default number of documents retrieved into the context window
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;

/// Fingerprints of session history included in the prompt
const SESSION_HISTORY_LIMIT: usize = 5;

/// Characters of each document body included in the prompt
const DOCUMENT_SNIPPET_CHARS: usize = 300;

/// Effective score at or above which the verdict is `threat`
const THREAT_THRESHOLD: f32 = 0.8;

/// Effective score at or above which the verdict is `uncertain`
const UNCERTAIN_THRESHOLD: f32 = 0.4;

/// Trait for the opaque reasoning agent
///
/// The agent receives an assembled prompt and returns free-form text; the
/// stage owns parsing and shaping.
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    /// Generate an analysis for the assembled prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Agent name, for logs and metrics
    fn name(&self) -> &str;
}

/// Parsed fields from the agent's free-form response
#[derive(Debug, Clone, PartialEq)]
pub struct AgentAssessment {
    /// Social-engineering score, 0..=100
    pub score: u8,

    /// Tactics the agent identified
    pub tactics: Vec<String>,
}

/// Reasoning stage adapter
pub struct ReasoningStage {
    agent: Arc<dyn ReasoningAgent>,
    documents: Arc<ContextStore>,
    sessions: Arc<ConversationTracker>,
    timeout: Duration,
    context_window: usize,
}

impl ReasoningStage {
    /// Create a stage around an opaque agent and the shared stores
    pub fn new(
        agent: Arc<dyn ReasoningAgent>,
        documents: Arc<ContextStore>,
        sessions: Arc<ConversationTracker>,
    ) -> Self {
        Self {
            agent,
            documents,
            sessions,
            timeout: DEFAULT_AGENT_TIMEOUT,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    /// Override the agent call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the document context window size
    pub fn with_context_window(mut self, k: usize) -> Self {
        self.context_window = k;
        self
    }

    /// Analyze a record and produce the final verdict
    ///
    /// Touches the conversation session with the record's fingerprint,
    /// raises the accumulated suspicion with the effective score, and
    /// closes the session when the verdict is terminal.
    pub async fn analyze(
        &self,
        record: &EmailRecord,
        user_id: &str,
        thread_id: &str,
    ) -> ScanVerdict {
        // Gather context under short synchronous lock scopes, then release
        // everything before the agent call suspends.
        let session = self
            .sessions
            .touch(user_id, thread_id, &record.fingerprint);
        let topic = format!("{} {}", record.subject, record.sender);
        let documents = self
            .documents
            .query(user_id, &topic, self.context_window);

        let prompt = build_prompt(record, &session, &documents);

        let assessment =
            match tokio::time::timeout(self.timeout, self.agent.generate(&prompt)).await {
                Ok(Ok(response)) => parse_assessment(&response),
                Ok(Err(e)) => {
                    warn!(agent = self.agent.name(), error = %e, "agent call failed");
                    None
                }
                Err(_) => {
                    warn!(agent = self.agent.name(), "agent call timed out");
                    None
                }
            };

        let Some(assessment) = assessment else {
            return ScanVerdict::new(Verdict::Uncertain, 0.5, StageId::Reasoning)
                .with_rationale("reasoning agent unavailable or response unparseable");
        };

        let agent_score = assessment.score as f32 / 100.0;
        let effective = agent_score.max(session.suspicion);

        let updated = self
            .sessions
            .touch_scored(user_id, thread_id, &record.fingerprint, effective);
        debug!(
            agent_score,
            session_suspicion = updated.suspicion,
            "reasoning scores combined"
        );

        let verdict = synthesize_verdict(effective, &assessment);
        if verdict.verdict.is_terminal() {
            self.sessions.close(user_id, thread_id);
        }

        info!(
            verdict = %verdict.verdict,
            confidence = verdict.confidence,
            score = assessment.score,
            "reasoning stage verdict"
        );
        verdict
    }
}

/// Assemble the bounded prompt for the agent
fn build_prompt(record: &EmailRecord, session: &SessionView, documents: &[Document]) -> String {
    let mut prompt = String::with_capacity(2048);

    prompt.push_str(
        "You are an expert detective for email-borne social engineering.\n\
         Rate the likelihood this email is an attack.\n\n",
    );
    prompt.push_str(&format!(
        "EMAIL\nSubject: {}\nFrom: {}\nBody: {}\n\n",
        record.subject, record.sender, record.body
    ));

    if !documents.is_empty() {
        prompt.push_str("USER CONTEXT\n");
        for doc in documents {
            let snippet: String = doc.body.chars().take(DOCUMENT_SNIPPET_CHARS).collect();
            prompt.push_str(&format!("- {} ({}): {}\n", doc.name, doc.doc_type, snippet));
        }
        prompt.push('\n');
    }

    let history: Vec<String> = session
        .fingerprints
        .iter()
        .rev()
        .take(SESSION_HISTORY_LIMIT)
        .map(|f| f.chars().take(12).collect())
        .collect();
    prompt.push_str(&format!(
        "CONVERSATION\nMessages seen in thread: {}\nRecent fingerprints: {}\nAccumulated suspicion: {:.2}\n\n",
        session.fingerprints.len(),
        history.join(", "),
        session.suspicion
    ));

    prompt.push_str(
        "Respond with:\n\
         1. Social Engineering Score (0-100)\n\
         2. Tactics Identified (bulleted list)\n\
         3. Threat assessment\n",
    );
    prompt
}

/// Extract score and tactics from the agent's free-form response
///
/// Tolerates arbitrary prose: takes the first number on a line mentioning
/// "score" (clamped to 100) and dash/star bullets following a line that
/// mentions "tactics". Returns `None` when no score can be found, which the
/// stage treats as a malformed response.
pub fn parse_assessment(response: &str) -> Option<AgentAssessment> {
    let mut score: Option<u8> = None;
    let mut tactics = Vec::new();
    let mut in_tactics = false;

    for line in response.lines() {
        let lower = line.to_lowercase();

        if score.is_none() && lower.contains("score") {
            let digits: String = line
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(n) = digits.parse::<u32>() {
                score = Some(n.min(100) as u8);
            }
        }

        if lower.contains("tactics") {
            in_tactics = true;
            continue;
        }

        if in_tactics {
            let trimmed = line.trim();
            if let Some(item) = trimmed
                .strip_prefix('-')
                .or_else(|| trimmed.strip_prefix('*'))
            {
                let item = item.trim();
                if !item.is_empty() {
                    tactics.push(item.to_string());
                }
            } else if !trimmed.is_empty() {
                in_tactics = false;
            }
        }
    }

    score.map(|score| AgentAssessment { score, tactics })
}

/// Map the effective score onto the fixed verdict shape
fn synthesize_verdict(effective: f32, assessment: &AgentAssessment) -> ScanVerdict {
    let rationale = if assessment.tactics.is_empty() {
        format!("social engineering score {}", assessment.score)
    } else {
        format!(
            "social engineering score {}; tactics: {}",
            assessment.score,
            assessment.tactics.join(", ")
        )
    };

    let (verdict, confidence) = if effective >= THREAT_THRESHOLD {
        (Verdict::Threat, 0.9)
    } else if effective >= UNCERTAIN_THRESHOLD {
        // Scaled toward the threat threshold so closer calls read stronger
        (Verdict::Uncertain, 0.5 + effective / 4.0)
    } else {
        (Verdict::Safe, 0.8)
    };

    ScanVerdict::new(verdict, confidence, StageId::Reasoning).with_rationale(rationale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailguard_core::Error;
    use std::time::SystemTime;

    struct ScriptedAgent {
        response: String,
    }

    #[async_trait]
    impl ReasoningAgent for ScriptedAgent {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.response.clone())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct UnavailableAgent;

    #[async_trait]
    impl ReasoningAgent for UnavailableAgent {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(Error::stage_unavailable("agent backend down"))
        }

        fn name(&self) -> &str {
            "unavailable"
        }
    }

    struct SlowAgent;

    #[async_trait]
    impl ReasoningAgent for SlowAgent {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn record(subject: &str, body: &str) -> EmailRecord {
        EmailRecord {
            sender: "someone@example.com".to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            urls: Vec::new(),
            addresses: Vec::new(),
            phone_numbers: Vec::new(),
            fingerprint: mailguard_core::fingerprint(subject, body),
            received_at: SystemTime::now(),
        }
    }

    fn stage(agent: Arc<dyn ReasoningAgent>) -> ReasoningStage {
        ReasoningStage::new(
            agent,
            Arc::new(ContextStore::new()),
            Arc::new(ConversationTracker::new(Duration::from_secs(3600))),
        )
    }

    #[test]
    fn test_parse_assessment_score_and_tactics() {
        let response = "\
Analysis follows.
1. Social Engineering Score: 85
2. Tactics Identified:
- urgency pressure
- authority impersonation

3. Threat assessment: serious.";

        let a = parse_assessment(response).unwrap();
        assert_eq!(a.score, 85);
        assert_eq!(a.tactics, vec!["urgency pressure", "authority impersonation"]);
    }

    #[test]
    fn test_parse_assessment_clamps_score() {
        let a = parse_assessment("score: 250").unwrap();
        assert_eq!(a.score, 100);
    }

    #[test]
    fn test_parse_assessment_rejects_scoreless_prose() {
        assert!(parse_assessment("I could not analyze this email.").is_none());
    }

    #[tokio::test]
    async fn test_high_score_yields_threat_and_closes_session() {
        let s = stage(Arc::new(ScriptedAgent {
            response: "Score: 90\nTactics:\n- fear".to_string(),
        }));
        let verdict = s.analyze(&record("warning", "pay now"), "u1", "th1").await;

        assert_eq!(verdict.verdict, Verdict::Threat);
        assert_eq!(verdict.confidence, 0.9);
        assert_eq!(verdict.stage, StageId::Reasoning);
        // Terminal verdict closes the session
        assert!(s.sessions.get("u1", "th1").is_none());
        assert_eq!(s.sessions.archived().len(), 1);
    }

    #[tokio::test]
    async fn test_low_score_yields_safe() {
        let s = stage(Arc::new(ScriptedAgent {
            response: "Score: 10".to_string(),
        }));
        let verdict = s.analyze(&record("lunch", "noon works"), "u1", "th1").await;

        assert_eq!(verdict.verdict, Verdict::Safe);
        assert_eq!(verdict.confidence, 0.8);
    }

    #[tokio::test]
    async fn test_mid_score_yields_uncertain_and_keeps_session() {
        let s = stage(Arc::new(ScriptedAgent {
            response: "Score: 55".to_string(),
        }));
        let verdict = s.analyze(&record("offer", "maybe"), "u1", "th1").await;

        assert_eq!(verdict.verdict, Verdict::Uncertain);
        // Non-terminal verdict leaves the session active for follow-ups
        let session = s.sessions.get("u1", "th1").unwrap();
        assert_eq!(session.suspicion, 0.55);
    }

    #[tokio::test]
    async fn test_session_suspicion_dominates_later_low_score() {
        let s = stage(Arc::new(ScriptedAgent {
            response: "Score: 55".to_string(),
        }));
        s.analyze(&record("first", "suspicious ask"), "u1", "th1").await;

        // Second message scores low, but the weighted-max rule holds the
        // thread at its accumulated suspicion.
        let s2 = ReasoningStage::new(
            Arc::new(ScriptedAgent {
                response: "Score: 5".to_string(),
            }),
            Arc::clone(&s.documents),
            Arc::clone(&s.sessions),
        );
        let verdict = s2
            .analyze(&record("followup", "just checking in"), "u1", "th1")
            .await;

        assert_eq!(verdict.verdict, Verdict::Uncertain);
        assert_eq!(s2.sessions.get("u1", "th1").unwrap().suspicion, 0.55);
    }

    #[tokio::test]
    async fn test_agent_failure_degrades_to_uncertain() {
        let s = stage(Arc::new(UnavailableAgent));
        let verdict = s.analyze(&record("hello", "text"), "u1", "th1").await;

        assert_eq!(verdict.verdict, Verdict::Uncertain);
        assert_eq!(verdict.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_agent_timeout_degrades_to_uncertain() {
        let s = stage(Arc::new(SlowAgent)).with_timeout(Duration::from_millis(20));
        let verdict = s.analyze(&record("hello", "text"), "u1", "th1").await;

        assert_eq!(verdict.verdict, Verdict::Uncertain);
        assert_eq!(verdict.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_prompt_includes_documents_and_history() {
        let documents = Arc::new(ContextStore::new());
        documents.put(
            "u1",
            "bank notice",
            "statement available at examplebank",
            "finance",
            vec!["banking".into()],
        );
        let sessions = Arc::new(ConversationTracker::new(Duration::from_secs(3600)));
        let session = sessions.touch("u1", "th1", "abcdef0123456789");
        let docs = documents.query("u1", "bank notice", 5);

        let prompt = build_prompt(&record("bank notice", "your statement"), &session, &docs);
        assert!(prompt.contains("bank notice (finance)"));
        assert!(prompt.contains("abcdef012345"));
        assert!(prompt.contains("Accumulated suspicion"));
    }

    #[test]
    fn test_prompt_handles_multibyte_fingerprints() {
        let sessions = ConversationTracker::new(Duration::from_secs(3600));
        // Truncating this at byte 12 would split a character
        let session = sessions.touch("u1", "th1", "aaaaa日本語テスト");

        let prompt = build_prompt(&record("hi", "text"), &session, &[]);
        assert!(prompt.contains("aaaaa日本語テスト"));
    }
}
