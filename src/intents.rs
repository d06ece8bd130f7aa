use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info, warn};

use crate::config::ListFailurePolicy;
use crate::error::BridgeError;
use crate::provider::{
    AgentClient, NewIntent, PhrasePart, PhraseType, TrainingPhrase, WEBHOOK_STATE_DISABLED,
};

/// One entry of the caller's intent map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentInput {
    pub intent: String,
    #[serde(default)]
    pub training_utterances: Vec<String>,
}

/// The caller's intents keyed by caller-chosen ids, kept in payload order so
/// creation and the report follow what was sent. A repeated id replaces the
/// earlier value in its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentMap {
    entries: Vec<(String, IntentInput)>,
}

impl IntentMap {
    pub fn insert(&mut self, id: String, input: IntentInput) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = input,
            None => self.entries.push((id, input)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IntentInput)> {
        self.entries.iter().map(|(id, input)| (id.as_str(), input))
    }
}

impl FromIterator<(String, IntentInput)> for IntentMap {
    fn from_iter<I: IntoIterator<Item = (String, IntentInput)>>(iter: I) -> Self {
        let mut map = Self::default();
        for (id, input) in iter {
            map.insert(id, input);
        }
        map
    }
}

impl<'de> Deserialize<'de> for IntentMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = IntentMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of intents keyed by id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<IntentMap, A::Error> {
                let mut map = IntentMap::default();
                while let Some((id, input)) = access.next_entry::<String, IntentInput>()? {
                    map.insert(id, input);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    /// Resource name for deletions, display name for creations.
    pub target: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl ItemOutcome {
    fn from_result<T>(target: String, result: Result<T, BridgeError>) -> Self {
        let status = match result {
            Ok(_) => ItemStatus::Succeeded,
            Err(err) => ItemStatus::Failed {
                reason: err.to_string(),
            },
        };
        Self { target, status }
    }

    pub fn succeeded(&self) -> bool {
        self.status == ItemStatus::Succeeded
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub agent_reachable: bool,
    /// Number of pre-existing intents, or `None` when listing failed.
    pub listed: Option<usize>,
    pub deleted: Vec<ItemOutcome>,
    pub created: Vec<ItemOutcome>,
}

impl SyncReport {
    pub fn failure_count(&self) -> usize {
        self.deleted
            .iter()
            .chain(&self.created)
            .filter(|outcome| !outcome.succeeded())
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.listed.is_some() && self.failure_count() == 0
    }
}

pub fn to_provider_intent(input: &IntentInput) -> NewIntent {
    NewIntent {
        display_name: input.intent.clone(),
        webhook_state: WEBHOOK_STATE_DISABLED,
        training_phrases: input
            .training_utterances
            .iter()
            .map(|utterance| TrainingPhrase {
                phrase_type: PhraseType::Unspecified,
                parts: vec![PhrasePart {
                    text: utterance.clone(),
                }],
            })
            .collect(),
    }
}

/// How the remote intent set is brought in line with the desired one.
/// Implementations record every per-item call in `report`.
pub trait ReconcileStrategy: Send + Sync {
    fn reconcile(
        &self,
        client: &AgentClient,
        token: &str,
        desired: &IntentMap,
        report: &mut SyncReport,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

/// Delete every listed intent, then create every desired one. No rollback:
/// a mid-sequence failure can leave the agent with fewer intents than
/// either set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceAll {
    pub list_failure: ListFailurePolicy,
}

impl ReconcileStrategy for ReplaceAll {
    async fn reconcile(
        &self,
        client: &AgentClient,
        token: &str,
        desired: &IntentMap,
        report: &mut SyncReport,
    ) -> Result<(), BridgeError> {
        match client.list_intents(token).await {
            Ok(existing) => {
                report.listed = Some(existing.len());
                for intent in existing {
                    let result = client.delete_intent(token, &intent.name).await;
                    if let Err(err) = &result {
                        warn!(
                            intent = %intent.name,
                            display_name = intent.display_name.as_deref().unwrap_or(""),
                            error = %err,
                            "failed to delete existing intent"
                        );
                    }
                    report
                        .deleted
                        .push(ItemOutcome::from_result(intent.name, result));
                }
            }
            Err(err) => match self.list_failure {
                ListFailurePolicy::Abort => {
                    error!(error = %err, "failed to list existing intents; aborting sync");
                    return Err(err);
                }
                ListFailurePolicy::Continue => {
                    warn!(
                        error = %err,
                        "failed to list existing intents; creating new intents without deleting"
                    );
                }
            },
        }

        for (id, input) in desired.iter() {
            let result = client.create_intent(token, &to_provider_intent(input)).await;
            if let Err(err) = &result {
                warn!(id = %id, intent = %input.intent, error = %err, "failed to create intent");
            }
            report
                .created
                .push(ItemOutcome::from_result(input.intent.clone(), result));
        }
        Ok(())
    }
}

pub struct IntentSyncEngine<S = ReplaceAll> {
    client: AgentClient,
    strategy: S,
}

impl<S: ReconcileStrategy> IntentSyncEngine<S> {
    pub fn new(client: AgentClient, strategy: S) -> Self {
        Self { client, strategy }
    }

    pub async fn replace_intents(
        &self,
        desired: &IntentMap,
        token: &str,
    ) -> Result<SyncReport, BridgeError> {
        let mut report = SyncReport::default();

        // Reachability check only; the descriptor itself is not used.
        match self.client.get_agent(token).await {
            Ok(_) => report.agent_reachable = true,
            Err(err) => warn!(error = %err, "failed to fetch agent descriptor"),
        }

        self.strategy
            .reconcile(&self.client, token, desired, &mut report)
            .await?;

        info!(
            listed = ?report.listed,
            deleted = report.deleted.len(),
            created = report.created.len(),
            failures = report.failure_count(),
            "intent sync finished"
        );
        Ok(report)
    }
}
