//! Per-turn grading state machine.
//!
//! `Validate → AnalyzeTopic → ResolveRelationship → LocateParent → Score →
//! CreateNode → UpdatePath → IntegrityCheck → Commit | Rollback`
//!
//! Analysis, relationship and score each degrade independently to a fallback.
//! Nothing touches the tree until both capabilities have resolved; after that
//! the mutation phase is synchronous and rolls back to an exact snapshot on
//! any integrity failure.

mod navigation;

pub use navigation::{
    backtrack, fan_out, suggestions, NavigationAction, Suggestion, SuggestionSource,
    MAX_SUGGESTIONS,
};

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{
    GuardedAnalyzer, KeywordTopicAnalyzer, LangbaseTopicAnalyzer, Relationship,
    RelationshipContext, RelationshipKind, TopicAnalyzer,
};
use crate::config::{CapabilityConfig, Config};
use crate::error::{AppResult, IntegrityResult, TreeIntegrityError};
use crate::langbase::LangbaseClient;
use crate::scoring::{
    assess_turn, InterviewGradingPolicy, LangbaseScoringStrategy, ScoringContext, ScoringEngine,
    ScoringStrategy, TurnAssessment,
};
use crate::tree::{EngagementLevel, TopicNode, TreeManager, Turn};
use crate::validation::validate_turn;

/// Stages of one turn, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Validate,
    AnalyzeTopic,
    ResolveRelationship,
    LocateParent,
    Score,
    CreateNode,
    UpdatePath,
    IntegrityCheck,
    Commit,
    Rollback,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Validate => "validate",
            TurnStage::AnalyzeTopic => "analyze_topic",
            TurnStage::ResolveRelationship => "resolve_relationship",
            TurnStage::LocateParent => "locate_parent",
            TurnStage::Score => "score",
            TurnStage::CreateNode => "create_node",
            TurnStage::UpdatePath => "update_path",
            TurnStage::IntegrityCheck => "integrity_check",
            TurnStage::Commit => "commit",
            TurnStage::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a turn will land, decided before any mutation.
#[derive(Debug, Clone, PartialEq)]
enum Placement {
    /// Append to an existing node.
    Existing(String),
    /// Create a new root.
    NewRoot,
    /// Create a new child of the given node.
    NewChild(String),
}

/// Result of processing one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Node the turn was attached to.
    pub node_id: String,
    /// Label of that node.
    pub topic: String,
    /// Depth of that node.
    pub depth: usize,
    /// Score given to the turn.
    pub score: f64,
    /// Whether any node was created by this turn.
    pub is_new_branch: bool,
    /// Ids of nodes created by this turn, in creation order.
    pub created_node_ids: Vec<String>,
    /// How the turn was placed.
    pub relationship: RelationshipKind,
    pub engagement: EngagementLevel,
    pub navigation: NavigationAction,
    /// Cursor after the turn, root first.
    pub cursor: Vec<String>,
    /// Label of the node the cursor ends on.
    pub cursor_topic: Option<String>,
    pub suggestions: Vec<Suggestion>,
    /// Whether any capability fell back.
    pub degraded: bool,
    pub degradation_reasons: Vec<String>,
}

/// Drives turns through analysis, scoring and tree mutation.
///
/// Capabilities can be swapped at runtime; a swap affects turns that start
/// after it.
pub struct GradingOrchestrator {
    analyzer: RwLock<Arc<dyn TopicAnalyzer>>,
    strategy: RwLock<Arc<dyn ScoringStrategy>>,
    capabilities: CapabilityConfig,
}

impl GradingOrchestrator {
    pub fn new(
        analyzer: Arc<dyn TopicAnalyzer>,
        strategy: Arc<dyn ScoringStrategy>,
        capabilities: CapabilityConfig,
    ) -> Self {
        Self {
            analyzer: RwLock::new(analyzer),
            strategy: RwLock::new(strategy),
            capabilities,
        }
    }

    /// Orchestrator using the keyword analyzer and the default grading policy.
    pub fn in_process(capabilities: CapabilityConfig) -> Self {
        Self::new(
            Arc::new(KeywordTopicAnalyzer::default()),
            Arc::new(InterviewGradingPolicy::default()),
            capabilities,
        )
    }

    /// Orchestrator for a loaded configuration.
    ///
    /// Uses Langbase pipes when an API key is configured and the pipes can
    /// be installed; otherwise, or when Langbase is unreachable at startup,
    /// falls back to [`GradingOrchestrator::in_process`].
    pub async fn from_config(config: &Config) -> Self {
        let Some(langbase_config) = &config.langbase else {
            info!("Langbase not configured, using in-process topic analysis and grading");
            return Self::in_process(config.capabilities);
        };

        let langbase = match LangbaseClient::new(langbase_config, config.request.clone()) {
            Ok(client) => client,
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to initialize Langbase client, using in-process capabilities"
                );
                return Self::in_process(config.capabilities);
            }
        };

        info!(base_url = %langbase_config.base_url, "Ensuring interview pipes exist...");
        if let Err(e) = langbase.ensure_interview_pipes(&config.pipes).await {
            warn!(error = %e, "Failed to ensure interview pipes, using in-process capabilities");
            return Self::in_process(config.capabilities);
        }

        info!("Langbase-backed topic analysis and grading enabled");
        Self::new(
            Arc::new(LangbaseTopicAnalyzer::new(langbase.clone(), &config.pipes)),
            Arc::new(LangbaseScoringStrategy::new(langbase, &config.pipes)),
            config.capabilities,
        )
    }

    /// Replace the topic analyzer
    pub fn set_topic_analyzer(&self, analyzer: Arc<dyn TopicAnalyzer>) {
        *self.analyzer.write().unwrap_or_else(|e| e.into_inner()) = analyzer;
        info!("Topic analyzer replaced");
    }

    /// Replace the scoring strategy
    pub fn set_scoring_strategy(&self, strategy: Arc<dyn ScoringStrategy>) {
        *self.strategy.write().unwrap_or_else(|e| e.into_inner()) = strategy;
        info!("Scoring strategy replaced");
    }

    fn guarded_analyzer(&self) -> GuardedAnalyzer {
        let inner = self.analyzer.read().unwrap_or_else(|e| e.into_inner()).clone();
        GuardedAnalyzer::new(
            inner,
            Duration::from_millis(self.capabilities.analysis_timeout_ms),
        )
    }

    fn scoring_engine(&self) -> ScoringEngine {
        let inner = self.strategy.read().unwrap_or_else(|e| e.into_inner()).clone();
        ScoringEngine::new(
            inner,
            Duration::from_millis(self.capabilities.scoring_timeout_ms),
        )
    }

    /// Process one turn against a tree.
    ///
    /// Validation and integrity failures are returned as errors and leave
    /// the tree exactly as it was; capability failures are absorbed and
    /// reported through `degraded`.
    pub async fn process_turn(
        &self,
        manager: &mut TreeManager,
        turn: Turn,
    ) -> AppResult<TurnOutcome> {
        let start = Instant::now();
        let session_id = manager.tree().session_id.clone();
        let mut reasons: Vec<String> = Vec::new();

        debug!(session_id = %session_id, stage = %TurnStage::Validate, "Turn stage");
        validate_turn(&turn)?;
        let assessment = assess_turn(&turn);

        debug!(session_id = %session_id, stage = %TurnStage::AnalyzeTopic, "Turn stage");
        let analyzer = self.guarded_analyzer();
        let topics = analyzer.extract_topics(&turn).await;
        reasons.extend(topics.fallback_reason.clone());
        let topics = topics.value;
        let primary = topics
            .first()
            .cloned()
            .unwrap_or_else(|| "General".to_string());

        debug!(
            session_id = %session_id,
            stage = %TurnStage::ResolveRelationship,
            candidate = %primary,
            "Turn stage"
        );
        let context = RelationshipContext::from_tree(manager.tree());
        let relationship = analyzer.determine_relationship(&primary, &context).await;
        reasons.extend(relationship.fallback_reason.clone());
        let relationship = self.apply_confidence_floor(relationship.value, &context, manager);

        debug!(
            session_id = %session_id,
            stage = %TurnStage::LocateParent,
            kind = %relationship.kind,
            "Turn stage"
        );
        let placement = locate_placement(manager, &relationship, &primary)?;
        let (landing_topic, landing_depth) = landing_of(manager, &placement, &primary);

        debug!(
            session_id = %session_id,
            stage = %TurnStage::Score,
            depth = landing_depth,
            "Turn stage"
        );
        let scoring_context = ScoringContext {
            topic: landing_topic,
            depth: landing_depth,
            history: manager.tree().turn_history(),
            assessment: assessment.clone(),
        };
        let score = self.scoring_engine().score(&turn, &scoring_context).await;
        reasons.extend(score.fallback_reason.clone());
        let score = score.value;

        // Mutation phase: synchronous from here, so a cancelled turn never
        // leaves a half-applied tree.
        let snapshot = manager.snapshot();
        let secondary: Vec<String> = topics.iter().skip(1).cloned().collect();
        let applied = apply_turn(
            manager,
            &session_id,
            placement,
            &primary,
            turn,
            score,
            &assessment,
            &secondary,
        );

        let (node_id, created, navigation) = match applied {
            Ok(applied) => applied,
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    stage = %TurnStage::Rollback,
                    error = %e,
                    "Integrity violation, restoring pre-turn tree"
                );
                manager.restore(snapshot);
                return Err(e.into());
            }
        };

        let node = manager
            .tree()
            .node(&node_id)
            .ok_or_else(|| TreeIntegrityError::NodeNotFound {
                node_id: node_id.clone(),
            })?;
        let outcome = TurnOutcome {
            node_id: node_id.clone(),
            topic: node.label.clone(),
            depth: node.depth,
            score,
            is_new_branch: !created.is_empty(),
            created_node_ids: created,
            relationship: relationship.kind,
            engagement: assessment.engagement,
            navigation,
            cursor: manager.current_path().to_vec(),
            cursor_topic: manager.current_topic().map(|n| n.label.clone()),
            suggestions: suggestions(manager),
            degraded: !reasons.is_empty(),
            degradation_reasons: reasons,
        };

        info!(
            session_id = %session_id,
            stage = %TurnStage::Commit,
            node_id = %outcome.node_id,
            score = outcome.score,
            navigation = %outcome.navigation,
            degraded = outcome.degraded,
            latency_ms = start.elapsed().as_millis(),
            "Turn processed"
        );
        Ok(outcome)
    }

    /// Redirect low-confidence proposals to the current node.
    fn apply_confidence_floor(
        &self,
        relationship: Relationship,
        context: &RelationshipContext,
        manager: &TreeManager,
    ) -> Relationship {
        let floor = manager.limits().min_attach_confidence;
        match &context.current {
            Some(current)
                if relationship.confidence < floor
                    && relationship.anchor_node_id.as_deref() != Some(current.id.as_str()) =>
            {
                debug!(
                    kind = %relationship.kind,
                    confidence = relationship.confidence,
                    floor,
                    "Low-confidence placement redirected to current topic"
                );
                Relationship::continuation(current.id.clone(), relationship.confidence)
            }
            _ => relationship,
        }
    }
}

/// Turn a relationship into a concrete placement, applying ceiling demotions.
fn locate_placement(
    manager: &TreeManager,
    relationship: &Relationship,
    primary: &str,
) -> IntegrityResult<Placement> {
    let tree = manager.tree();
    let anchor = relationship
        .anchor_node_id
        .as_deref()
        .and_then(|id| tree.node(id));

    let proposed = match (relationship.kind, anchor) {
        (RelationshipKind::Continuation, Some(node)) => Placement::Existing(node.id.clone()),
        (RelationshipKind::ChildOf, Some(node)) => Placement::NewChild(node.id.clone()),
        (RelationshipKind::SiblingOf, Some(node)) => match &node.parent_id {
            Some(parent) => Placement::NewChild(parent.clone()),
            None => Placement::NewRoot,
        },
        (RelationshipKind::NewRoot, _) => Placement::NewRoot,
        (kind, None) => {
            warn!(kind = %kind, "Anchor node missing, demoting to new root");
            Placement::NewRoot
        }
    };

    // Reuse a same-named node at the target position instead of duplicating it.
    let proposed = match proposed {
        Placement::NewChild(parent) => match manager.find_child_by_label(&parent, primary) {
            Some(existing) => Placement::Existing(existing.id.clone()),
            None => Placement::NewChild(parent),
        },
        Placement::NewRoot => match tree
            .root_ids()
            .iter()
            .filter_map(|id| tree.node(id))
            .find(|r| r.label.eq_ignore_ascii_case(primary))
        {
            Some(existing) => Placement::Existing(existing.id.clone()),
            None => Placement::NewRoot,
        },
        existing => existing,
    };

    let proposed = match proposed {
        Placement::NewChild(parent) => {
            let depth = manager.child_depth(&parent).unwrap_or(usize::MAX);
            if depth > manager.limits().max_depth {
                warn!(
                    parent_id = %parent,
                    depth,
                    max_depth = manager.limits().max_depth,
                    "Depth ceiling reached, demoting to new root"
                );
                Placement::NewRoot
            } else {
                Placement::NewChild(parent)
            }
        }
        other => other,
    };

    match proposed {
        Placement::Existing(_) => Ok(proposed),
        _ if manager.has_capacity() => Ok(proposed),
        _ => match manager.current_topic() {
            Some(current) => {
                warn!(
                    node_id = %current.id,
                    max_nodes = manager.limits().max_nodes,
                    "Size ceiling reached, attaching to current topic"
                );
                Ok(Placement::Existing(current.id.clone()))
            }
            None => Err(TreeIntegrityError::SizeCeilingExceeded {
                count: manager.tree().len() + 1,
                max: manager.limits().max_nodes,
            }),
        },
    }
}

/// Label and depth the turn will land at.
fn landing_of(manager: &TreeManager, placement: &Placement, primary: &str) -> (String, usize) {
    match placement {
        Placement::Existing(id) => manager
            .tree()
            .node(id)
            .map(|n| (n.label.clone(), n.depth))
            .unwrap_or_else(|| (primary.to_string(), 1)),
        Placement::NewRoot => (primary.to_string(), 1),
        Placement::NewChild(parent) => (
            primary.to_string(),
            manager.child_depth(parent).unwrap_or(1),
        ),
    }
}

/// The mutation phase. Any error here is rolled back by the caller.
#[allow(clippy::too_many_arguments)]
fn apply_turn(
    manager: &mut TreeManager,
    session_id: &str,
    placement: Placement,
    primary: &str,
    turn: Turn,
    score: f64,
    assessment: &TurnAssessment,
    secondary_topics: &[String],
) -> IntegrityResult<(String, Vec<String>, NavigationAction)> {
    debug!(session_id = %session_id, stage = %TurnStage::CreateNode, "Turn stage");
    let mut created = Vec::new();
    let new_topics: Vec<String> = if turn.signals.new_topics.is_empty() {
        secondary_topics.to_vec()
    } else {
        turn.signals.new_topics.clone()
    };

    let node_id = match placement {
        Placement::Existing(id) => id,
        Placement::NewRoot => {
            let id = manager.add_node(TopicNode::new(primary), None)?;
            created.push(id.clone());
            id
        }
        Placement::NewChild(parent) => {
            let id = manager.add_node(TopicNode::new(primary), Some(&parent))?;
            created.push(id.clone());
            id
        }
    };
    manager.attach_turn(&node_id, turn, score)?;

    debug!(
        session_id = %session_id,
        stage = %TurnStage::UpdatePath,
        node_id = %node_id,
        "Turn stage"
    );
    if manager.current_topic().map(|n| n.id.as_str()) != Some(node_id.as_str()) {
        manager.move_cursor_to(&node_id)?;
    }
    manager.mark_visited(&node_id)?;

    let navigation = if assessment.exhausted || assessment.engagement == EngagementLevel::Low {
        backtrack(manager, &node_id)?;
        NavigationAction::Backtrack
    } else if assessment.engagement == EngagementLevel::High && !new_topics.is_empty() {
        let children = fan_out(manager, &node_id, &new_topics)?;
        if children.is_empty() {
            NavigationAction::Continue
        } else {
            created.extend(children);
            NavigationAction::Descend
        }
    } else {
        NavigationAction::Continue
    };

    debug!(session_id = %session_id, stage = %TurnStage::IntegrityCheck, "Turn stage");
    manager.verify()?;

    Ok((node_id, created, navigation))
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
