//! The budgeted bundle composer: candidate gathering, scoring, mandatory
//! inclusion, and greedy knapsack selection by utility density.

use chrono::{DateTime, Utc};
use rwm_core::{ModelFamily, TokenEstimator};
use rwm_store::{EventKind, Store, TaskStatus};

/// Category of a composed bundle item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// An active task.
    Task,
    /// A logged event.
    Event,
    /// A project fact.
    Fact,
}

impl ItemKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Task => "TASK",
            Self::Event => "EVENT",
            Self::Fact => "FACT",
        }
    }
}

/// A scored candidate before selection.
#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    kind: ItemKind,
    text: String,
    token_cost: u32,
    score: f64,
    mandatory_rank: Option<DateTime<Utc>>,
    event_kind: Option<EventKind>,
}

impl Candidate {
    fn density(&self) -> f64 {
        self.score / (self.token_cost as f64 + 1.0)
    }
}

/// One item picked into the final bundle.
#[derive(Debug, Clone)]
pub struct PickedItem {
    /// The item's pointer ID (task/event ID, or fact key-derived ID).
    pub pointer_id: String,
    /// Category of the picked item.
    pub kind: ItemKind,
    /// Rendered pointer text.
    pub text: String,
    /// Estimated token cost.
    pub token_cost: u32,
}

/// Request parameters for [`compose`].
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    /// Session to scope tasks/events to (facts are unscoped).
    pub session: String,
    /// Token budget for the selection.
    pub budget: u32,
    /// Model family the estimator should target.
    pub family: ModelFamily,
}

/// The structured equivalent of the Now card's text rendering.
#[derive(Debug, Clone)]
pub struct NowCard {
    /// First active task title, or `"No active task"`.
    pub objective: String,
    /// Active task IDs, most recently updated first.
    pub active_task_ids: Vec<String>,
    /// Up to 5 most recent `DECISION` event IDs.
    pub decision_ids: Vec<String>,
    /// Up to 5 most recent `TEST_FAIL` event IDs.
    pub failing_test_ids: Vec<String>,
}

/// Output of [`compose`]: the rendered Now card, the picked pointers, and
/// per-item token metrics.
#[derive(Debug, Clone)]
pub struct ComposeResult {
    /// The full rendered bundle text (Now card + pointers section).
    pub text: String,
    /// Structured form of the Now card.
    pub now: NowCard,
    /// Items selected into the bundle, in pick order.
    pub picked: Vec<PickedItem>,
    /// Sum of `token_cost` across `picked`.
    pub token_estimate: u32,
    /// The budget this bundle was composed under.
    pub budget: u32,
}

fn age_hours(ts: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - ts).num_seconds() as f64 / 3600.0
}

/// Composes a budgeted context bundle from the store's current state.
pub fn compose(
    store: &Store,
    estimator: &dyn TokenEstimator,
    request: &ComposeRequest,
    now: DateTime<Utc>,
) -> ComposeResult {
    let tasks = store.list_active_tasks(&request.session, 20);
    let events = store.list_recent_events(&request.session, 100);
    let facts = store.list_facts();

    let mut candidates = Vec::with_capacity(tasks.len() + events.len() + facts.len());

    for task in &tasks {
        let mut text = format!(
            "TASK {}: {} [{}]",
            task.id,
            task.title,
            task_status_str(task.status)
        );
        if let Some(criteria) = &task.accept_criteria {
            text.push_str(&format!("\nACCEPT: {criteria}"));
        }
        let score = 5.0 + (3.0 - age_hours(task.updated_at, now) * 0.5).max(0.0);
        candidates.push(Candidate {
            id: task.id.clone(),
            kind: ItemKind::Task,
            token_cost: estimator.estimate(&text, request.family),
            score,
            text,
            mandatory_rank: None,
            event_kind: None,
        });
    }

    for event in &events {
        let text = format!(
            "{} {}: {}",
            event_kind_str(event.kind),
            event.id,
            event.summary
        );
        let base = match event.kind {
            EventKind::TestFail | EventKind::Blocker => 4.0,
            EventKind::Decision => 3.5,
            _ => 2.0,
        };
        let score = base + (4.0 - age_hours(event.ts, now)).max(0.0);
        let mandatory_rank = matches!(
            event.kind,
            EventKind::Decision | EventKind::TestFail | EventKind::Blocker
        )
        .then_some(event.ts);
        candidates.push(Candidate {
            id: event.id.clone(),
            kind: ItemKind::Event,
            token_cost: estimator.estimate(&text, request.family),
            score,
            text,
            mandatory_rank,
            event_kind: Some(event.kind),
        });
    }

    for fact in &facts {
        let text = format!("FACT {}={} ({})", fact.key, fact.value, fact.scope.as_str());
        candidates.push(Candidate {
            id: fact.id.clone(),
            kind: ItemKind::Fact,
            token_cost: estimator.estimate(&text, request.family),
            score: 1.5,
            text,
            mandatory_rank: None,
            event_kind: None,
        });
    }

    // Mandatory set: up to 3 most recent DECISION, up to 3 most recent
    // TEST_FAIL|BLOCKER, each group ordered by ts descending.
    let mut decisions: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.event_kind == Some(EventKind::Decision))
        .map(|(i, _)| i)
        .collect();
    decisions.sort_by(|&a, &b| candidates[b].mandatory_rank.cmp(&candidates[a].mandatory_rank));
    decisions.truncate(3);

    let mut fail_or_blocked: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c.event_kind, Some(EventKind::TestFail) | Some(EventKind::Blocker)))
        .map(|(i, _)| i)
        .collect();
    fail_or_blocked.sort_by(|&a, &b| candidates[b].mandatory_rank.cmp(&candidates[a].mandatory_rank));
    fail_or_blocked.truncate(3);

    let mut mandatory_indices: Vec<usize> = decisions.into_iter().chain(fail_or_blocked).collect();
    mandatory_indices.sort_by(|&a, &b| candidates[b].mandatory_rank.cmp(&candidates[a].mandatory_rank));

    let mandatory_set: std::collections::HashSet<usize> = mandatory_indices.iter().copied().collect();

    // Stable sort of non-mandatory items by density descending.
    let mut remainder: Vec<usize> = (0..candidates.len())
        .filter(|i| !mandatory_set.contains(i))
        .collect();
    remainder.sort_by(|&a, &b| {
        candidates[b]
            .density()
            .partial_cmp(&candidates[a].density())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut used: u64 = 0;
    let mut picked_indices = Vec::new();
    let mut picked_set = std::collections::HashSet::new();

    for &i in &mandatory_indices {
        let cost = candidates[i].token_cost as u64;
        if used + cost <= request.budget as u64 {
            used += cost;
            picked_indices.push(i);
            picked_set.insert(i);
        }
    }
    for i in remainder {
        if picked_set.contains(&i) {
            continue;
        }
        let cost = candidates[i].token_cost as u64;
        if used + cost <= request.budget as u64 {
            used += cost;
            picked_indices.push(i);
            picked_set.insert(i);
        }
    }

    let picked: Vec<PickedItem> = picked_indices
        .iter()
        .map(|&i| {
            let c = &candidates[i];
            PickedItem {
                pointer_id: c.id.clone(),
                kind: c.kind,
                text: c.text.clone(),
                token_cost: c.token_cost,
            }
        })
        .collect();

    let token_estimate: u32 = picked.iter().map(|p| p.token_cost).sum();

    let objective = tasks
        .first()
        .map(|t| t.title.clone())
        .unwrap_or_else(|| "No active task".to_string());
    let active_task_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let decision_ids = recent_ids(&events, &[EventKind::Decision], 5);
    let failing_test_ids = recent_ids(&events, &[EventKind::TestFail], 5);

    let mut text = format!(
        "NOW:\n- Objective: {objective}\n- Active: {}\n- Decisions: {}\n- Failing tests: {}\n\nPOINTERS:\n",
        dash_join(&active_task_ids),
        dash_join(&decision_ids),
        dash_join(&failing_test_ids),
    );
    for item in &picked {
        text.push_str(&format!("• {} {}\n", item.kind.as_str(), item.pointer_id));
    }

    ComposeResult {
        text,
        now: NowCard {
            objective,
            active_task_ids,
            decision_ids,
            failing_test_ids,
        },
        picked,
        token_estimate,
        budget: request.budget,
    }
}

fn dash_join(ids: &[String]) -> String {
    if ids.is_empty() {
        "—".to_string()
    } else {
        ids.join(", ")
    }
}

fn recent_ids(events: &[&rwm_store::Event], kinds: &[EventKind], n: usize) -> Vec<String> {
    let mut matching: Vec<&&rwm_store::Event> =
        events.iter().filter(|e| kinds.contains(&e.kind)).collect();
    matching.sort_by_key(|m| std::cmp::Reverse(m.ts));
    matching.truncate(n);
    matching.iter().map(|e| e.id.clone()).collect()
}

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "todo",
        TaskStatus::Doing => "doing",
        TaskStatus::Blocked => "blocked",
        TaskStatus::Done => "done",
        TaskStatus::Review => "review",
    }
}

fn event_kind_str(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Decision => "DECISION",
        EventKind::Assumption => "ASSUMPTION",
        EventKind::Fix => "FIX",
        EventKind::Blocker => "BLOCKER",
        EventKind::Note => "NOTE",
        EventKind::TestFail => "TEST_FAIL",
        EventKind::TestPass => "TEST_PASS",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rwm_core::HeuristicEstimator;
    use rwm_store::{Event, Task};

    fn task(id: &str, session: &str, status: TaskStatus, updated_at: DateTime<Utc>) -> Task {
        Task {
            id: id.to_string(),
            session_id: session.to_string(),
            parent_id: None,
            title: "Ship the thing".to_string(),
            status,
            accept_criteria: None,
            created_at: updated_at,
            updated_at,
        }
    }

    fn event(id: &str, session: &str, kind: EventKind, ts: DateTime<Utc>) -> Event {
        Event {
            id: id.to_string(),
            kind,
            task_id: None,
            session_id: session.to_string(),
            summary: "something happened".to_string(),
            evidence_ids: vec![],
            ts,
        }
    }

    #[test]
    fn respects_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("rwm.db")).unwrap();
        let now = Utc::now();
        for i in 0..10 {
            store
                .upsert_task(task(&format!("T-{i}"), "s@main", TaskStatus::Doing, now))
                .unwrap();
        }
        let estimator = HeuristicEstimator;
        let result = compose(
            &store,
            &estimator,
            &ComposeRequest {
                session: "s@main".to_string(),
                budget: 20,
                family: ModelFamily::Generic,
            },
            now,
        );
        assert!(result.token_estimate <= 20);
    }

    #[test]
    fn mandatory_decisions_are_always_included_when_affordable() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path().join("rwm.db")).unwrap();
        let now = Utc::now();
        store
            .insert_event(event("D-1", "s@main", EventKind::Decision, now))
            .unwrap();
        for i in 0..30 {
            store
                .upsert_fact(rwm_store::Fact {
                    id: format!("F-{i}"),
                    key: format!("k{i}"),
                    value: "v".to_string(),
                    scope: rwm_store::FactScope::Repo,
                })
                .unwrap();
        }
        let estimator = HeuristicEstimator;
        let result = compose(
            &store,
            &estimator,
            &ComposeRequest {
                session: "s@main".to_string(),
                budget: 1000,
                family: ModelFamily::Generic,
            },
            now,
        );
        assert!(result.picked.iter().any(|p| p.pointer_id == "D-1"));
    }

    #[test]
    fn now_card_falls_back_to_placeholders_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("rwm.db")).unwrap();
        let estimator = HeuristicEstimator;
        let result = compose(
            &store,
            &estimator,
            &ComposeRequest {
                session: "s@main".to_string(),
                budget: 500,
                family: ModelFamily::Generic,
            },
            Utc::now(),
        );
        assert!(result.text.contains("No active task"));
        assert!(result.text.contains("- Active: —"));
    }

    proptest::proptest! {
        #[test]
        fn budget_invariant_holds_for_arbitrary_candidate_counts(
            n_tasks in 0usize..15,
            n_events in 0usize..15,
            budget in 0u32..500,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let mut store = Store::open(dir.path().join("rwm.db")).unwrap();
            let now = Utc::now();
            for i in 0..n_tasks {
                store
                    .upsert_task(task(&format!("T-{i}"), "s@main", TaskStatus::Doing, now))
                    .unwrap();
            }
            for i in 0..n_events {
                let kind = match i % 4 {
                    0 => EventKind::Decision,
                    1 => EventKind::TestFail,
                    2 => EventKind::Blocker,
                    _ => EventKind::Note,
                };
                store
                    .insert_event(event(&format!("E-{i}"), "s@main", kind, now))
                    .unwrap();
            }
            let estimator = HeuristicEstimator;
            let result = compose(
                &store,
                &estimator,
                &ComposeRequest {
                    session: "s@main".to_string(),
                    budget,
                    family: ModelFamily::Generic,
                },
                now,
            );
            prop_assert!(result.token_estimate <= budget);
        }
    }
}
