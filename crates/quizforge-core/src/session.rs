//! Live session state machine.
//!
//! Owns the one in-progress test attempt: position, recorded answers,
//! stored gradings, frozen settings, and the countdown. Every mutation
//! is persisted through the `SessionStore` collaborator; statistics
//! failures are logged and swallowed.
//!
//! Lifecycle: Unstarted → Active → Finished, with `reset` abandoning
//! from any state. `start` on an Active controller replaces the prior
//! session, so at most one Active session exists per controller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::dispatcher::{Dispatcher, Evaluation};
use crate::model::{Answer, Question, SessionMode, Settings, SettingsPatch};
use crate::report::{self, TestReport};
use crate::traits::{QuestionSource, SessionStore, StatsEvent, StatsSink};

/// A free-text grading pinned to the exact text it graded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvaluation {
    pub evaluation: Evaluation,
    /// The answer text the grading was computed against. A later edit
    /// of the answer makes this record stale.
    pub graded_text: String,
}

/// The persisted state of one in-progress attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub test_id: String,
    pub mode: SessionMode,
    /// Explicit ordered question-id subset; `None` means the full pool.
    pub subset: Option<Vec<String>>,
    pub position: usize,
    pub answers: HashMap<String, Answer>,
    pub evaluations: HashMap<String, StoredEvaluation>,
    pub started_at: DateTime<Utc>,
    pub time_limit_secs: Option<u64>,
    pub settings: Settings,
    /// Guard so the countdown triggers finish at most once.
    #[serde(default)]
    pub auto_finished: bool,
}

/// Controller lifecycle phase, for UI flow decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unstarted,
    Active,
    Finished,
}

enum State {
    Unstarted,
    Active {
        session: Session,
        /// The active questions in session order (subset resolved).
        questions: Vec<Question>,
    },
    Finished(TestReport),
}

/// The session controller. Exclusively owns the live session.
pub struct SessionController {
    dispatcher: Dispatcher,
    store: Arc<dyn SessionStore>,
    source: Arc<dyn QuestionSource>,
    stats: Arc<dyn StatsSink>,
    pending_settings: SettingsPatch,
    state: State,
}

impl SessionController {
    pub fn new(
        dispatcher: Dispatcher,
        store: Arc<dyn SessionStore>,
        source: Arc<dyn QuestionSource>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            source,
            stats,
            pending_settings: SettingsPatch::default(),
            state: State::Unstarted,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            State::Unstarted => SessionStatus::Unstarted,
            State::Active { .. } => SessionStatus::Active,
            State::Finished(_) => SessionStatus::Finished,
        }
    }

    /// Merge a settings override to be applied at the next `start`.
    /// Only allowed in the configuration phase; a no-op while Active.
    pub fn update_settings(&mut self, patch: SettingsPatch) -> bool {
        if matches!(self.state, State::Active { .. }) {
            return false;
        }
        if let Some(t) = patch.pass_threshold {
            self.pending_settings.pass_threshold = Some(t);
        }
        if let Some(h) = patch.hints_enabled {
            self.pending_settings.hints_enabled = Some(h);
        }
        if let Some(c) = patch.check_after_answer {
            self.pending_settings.check_after_answer = Some(c);
        }
        if let Some(s) = patch.show_incorrect_at_end {
            self.pending_settings.show_incorrect_at_end = Some(s);
        }
        if let Some(s) = patch.strictness {
            self.pending_settings.strictness = Some(s);
        }
        true
    }

    /// Start a new session. Replaces any prior session.
    pub fn start(
        &mut self,
        test_id: &str,
        mode: SessionMode,
        subset: Option<Vec<String>>,
        time_limit_secs: Option<u64>,
        patch: SettingsPatch,
    ) -> anyhow::Result<()> {
        let pool = self.source.questions(test_id)?;
        let questions = resolve_subset(&pool, subset.as_deref());

        let mut settings = patch.apply(
            self.pending_settings
                .apply(Settings::defaults_for(questions.len())),
        );
        settings.clamp_threshold(questions.len());

        let session = Session {
            test_id: test_id.to_string(),
            mode,
            subset,
            position: 0,
            answers: HashMap::new(),
            evaluations: HashMap::new(),
            started_at: Utc::now(),
            time_limit_secs,
            settings,
            auto_finished: false,
        };

        self.persist(&session);
        self.report_stats(&StatsEvent::Started {
            test_id: test_id.to_string(),
            percentage: 0,
        });
        self.state = State::Active { session, questions };
        Ok(())
    }

    /// Restore a persisted session for `test_id`, if one exists.
    ///
    /// Missing, corrupt, or mismatched stored state means no session:
    /// the controller stays Unstarted and the stale entry is cleared.
    pub fn resume(&mut self, test_id: &str) -> bool {
        let Some(mut session) = self.store.load_session() else {
            return false;
        };
        if session.test_id != test_id {
            tracing::debug!(
                stored = %session.test_id,
                requested = %test_id,
                "stored session is for a different test, discarding"
            );
            self.store.clear_session();
            return false;
        }
        let pool = match self.source.questions(test_id) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!("question pool unavailable on resume: {e:#}");
                self.store.clear_session();
                return false;
            }
        };
        let questions = resolve_subset(&pool, session.subset.as_deref());
        if questions.is_empty() {
            self.store.clear_session();
            return false;
        }
        session.position = session.position.min(questions.len() - 1);
        self.state = State::Active { session, questions };
        true
    }

    /// The previously compiled report for `test_id`, if any.
    pub fn stored_result(&self, test_id: &str) -> Option<TestReport> {
        self.store.load_result(test_id)
    }

    // -- Active-only operations -------------------------------------------

    pub fn question_count(&self) -> usize {
        match &self.state {
            State::Active { questions, .. } => questions.len(),
            _ => 0,
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        match &self.state {
            State::Active { session, .. } => Some(session.position),
            _ => None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        match &self.state {
            State::Active { session, questions } => questions.get(session.position),
            _ => None,
        }
    }

    pub fn recorded_answer(&self, question_id: &str) -> Option<&Answer> {
        match &self.state {
            State::Active { session, .. } => session.answers.get(question_id),
            _ => None,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            State::Active { session, .. } => Some(session.started_at),
            _ => None,
        }
    }

    /// Record (or overwrite) the answer for a question. Does not
    /// trigger evaluation. Returns false when no session is active.
    pub fn record_answer(&mut self, question_id: &str, answer: Answer) -> bool {
        let State::Active { session, .. } = &mut self.state else {
            return false;
        };
        session.answers.insert(question_id.to_string(), answer);
        let snapshot = session.clone();
        self.persist(&snapshot);
        true
    }

    /// Jump to `index`, clamped into the active question range.
    pub fn go_to(&mut self, index: usize) {
        let State::Active { session, questions } = &mut self.state else {
            return;
        };
        let clamped = index.min(questions.len().saturating_sub(1));
        if clamped != session.position {
            session.position = clamped;
            let snapshot = session.clone();
            self.persist(&snapshot);
        }
    }

    /// Advance one question; a no-op at the last question.
    pub fn next(&mut self) {
        if let Some(i) = self.current_index() {
            self.go_to(i.saturating_add(1));
        }
    }

    /// Go back one question; a no-op at the first question.
    pub fn prev(&mut self) {
        if let Some(i) = self.current_index() {
            self.go_to(i.saturating_sub(1));
        }
    }

    /// Evaluate the recorded answer for the current question.
    ///
    /// For free-text questions the grading is stored keyed by the exact
    /// graded text; re-evaluating overwrites it (last grading wins).
    /// Returns `None` when no session is active or nothing is recorded.
    pub async fn evaluate_current(&mut self) -> Option<Evaluation> {
        let State::Active { session, questions } = &self.state else {
            return None;
        };
        let question = questions.get(session.position)?.clone();
        let answer = session.answers.get(&question.id)?.clone();
        let settings = session.settings.clone();

        let evaluation = self.dispatcher.evaluate(&question, &answer, &settings).await;

        // Re-borrow: the grading call suspended, but &mut self keeps
        // this session exclusive for the whole call.
        if let State::Active { session, .. } = &mut self.state {
            if question.is_free_text() {
                session.evaluations.insert(
                    question.id.clone(),
                    StoredEvaluation {
                        evaluation: evaluation.clone(),
                        graded_text: answer.text().to_string(),
                    },
                );
                let snapshot = session.clone();
                self.persist(&snapshot);
            }
        }
        Some(evaluation)
    }

    /// Finish the session: compile the report, persist it, clear the
    /// live session. No-op returning `None` when nothing is active.
    pub fn finish(&mut self) -> Option<TestReport> {
        self.finish_at(Utc::now())
    }

    /// `finish` with an explicit finish timestamp.
    pub fn finish_at(&mut self, now: DateTime<Utc>) -> Option<TestReport> {
        let State::Active { session, questions } = &self.state else {
            return None;
        };
        let report = report::compile(session, questions, now);

        if let Err(e) = self.store.save_result(&report.test_id, &report) {
            tracing::warn!("failed to persist report: {e:#}");
        }
        self.store.clear_session();

        self.report_stats(&StatsEvent::Finished {
            test_id: report.test_id.clone(),
            right_answers: report.correct,
            wrong_answers: report.total - report.correct,
            percentage: report.percentage,
            time_taken_secs: report.elapsed_secs,
        });

        self.state = State::Finished(report.clone());
        Some(report)
    }

    /// Abandon everything: live session, cached report, stored state.
    pub fn reset(&mut self) {
        self.store.clear_session();
        self.store.clear_result();
        self.state = State::Unstarted;
    }

    // -- Countdown --------------------------------------------------------

    /// Remaining whole seconds, rounded up; `None` without a time limit.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        let State::Active { session, .. } = &self.state else {
            return None;
        };
        let limit_ms = session.time_limit_secs? as i64 * 1000;
        let elapsed_ms = (now - session.started_at).num_milliseconds();
        let remaining_ms = (limit_ms - elapsed_ms).max(0);
        Some((remaining_ms as u64).div_ceil(1000))
    }

    /// One countdown check. The first tick that observes zero remaining
    /// time finishes the session; the guard flag and the Active-only
    /// check together make later ticks no-ops.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TestReport> {
        let remaining = self.remaining_secs(now)?;
        if remaining > 0 {
            return None;
        }
        if let State::Active { session, .. } = &mut self.state {
            if session.auto_finished {
                return None;
            }
            session.auto_finished = true;
        }
        self.finish_at(now)
    }
}

/// Resolve the active question list: full pool order, or the subset's
/// own order with unknown ids dropped.
fn resolve_subset(pool: &[Question], subset: Option<&[String]>) -> Vec<Question> {
    match subset {
        None => pool.to_vec(),
        Some(ids) => ids
            .iter()
            .filter_map(|id| pool.iter().find(|q| &q.id == id).cloned())
            .collect(),
    }
}

impl SessionController {
    fn persist(&self, session: &Session) {
        if let Err(e) = self.store.save_session(session) {
            tracing::warn!("failed to persist session: {e:#}");
        }
    }

    fn report_stats(&self, event: &StatsEvent) {
        if let Err(e) = self.stats.record(event) {
            tracing::warn!("statistics reporting failed: {e:#}");
        }
    }
}

/// Drive the countdown of a shared controller until the session leaves
/// the Active state. Returns the report if the countdown finished it.
pub async fn run_countdown(
    controller: Arc<Mutex<SessionController>>,
    period: Duration,
) -> Option<TestReport> {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let mut guard = controller.lock().await;
        if guard.status() != SessionStatus::Active {
            return None;
        }
        if guard.remaining_secs(Utc::now()).is_none() {
            // No time limit, nothing to drive.
            return None;
        }
        if let Some(report) = guard.tick(Utc::now()) {
            return Some(report);
        }
    }
}
