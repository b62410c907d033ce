// investigation-rs/src/orchestrator.rs
// Drives one finding from planner conversation to a classified outcome.
//
// Implementation notes:
// - The running count lives in a watch channel: admission is an atomic
//   check-and-increment, and shutdown waits on the channel reaching zero.
// - Every suspension point (session creation, the planner stream, each fix
//   command, the verification pause and call) races the shutdown signal.
// - Autonomy reaches the planner only through the per-call request.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use safety::{is_blocked_command, redact_sensitive_text, Guardrails};
use shared_types::{AutonomyLevel, Finding, InvestigationOutcome, InvestigationStatus, RiskLevel};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use error_handling::{ShutdownListener, ShutdownSignal};

use crate::config::InvestigationConfig;
use crate::error::{InvestigationError, Result};
use crate::interfaces::{
    ApprovalQueue, AutonomyLevelProvider, CommandExecutor, ExecuteRequest, ExecutorError,
    FindingsStore, FixApproval, FixVerifier, InfrastructureContextProvider, LicenseChecker,
    MetricsCallback, Planner, PlannerError, PlannerEvent, PlannerMessage, VerifyError,
    APPROVAL_TYPE_INVESTIGATION_FIX, FEATURE_AI_AUTOFIX,
};
use crate::model::{Fix, InvestigationSession};
use crate::parser::parse_investigation_summary;
use crate::prompt::build_investigation_prompt;
use crate::store::InvestigationStore;

/// Optional collaborators; all may be swapped after construction.
#[derive(Default, Clone)]
struct Collaborators {
    executor: Option<Arc<dyn CommandExecutor>>,
    verifier: Option<Arc<dyn FixVerifier>>,
    findings: Option<Arc<dyn FindingsStore>>,
    approvals: Option<Arc<dyn ApprovalQueue>>,
    infrastructure: Option<Arc<dyn InfrastructureContextProvider>>,
    autonomy: Option<Arc<dyn AutonomyLevelProvider>>,
    license: Option<Arc<dyn LicenseChecker>>,
    metrics: Option<Arc<dyn MetricsCallback>>,
}

// Holds one running slot; releases it on drop.
struct RunningSlot<'a> {
    running: &'a watch::Sender<usize>,
}

impl Drop for RunningSlot<'_> {
    fn drop(&mut self) {
        self.running.send_modify(|n| *n = n.saturating_sub(1));
        gauge!("investigations_running", *self.running.borrow() as f64);
    }
}

// Aggregates planner events for one conversation.
struct StreamCollector<'a> {
    store: &'a InvestigationStore,
    investigation_id: &'a str,
    max_turns: u32,
    summary: String,
    tools_used: Vec<String>,
    evidence_ids: Vec<String>,
    seen_tools: HashSet<String>,
    seen_ids: HashSet<String>,
    turns: u32,
    stream_error: Option<PlannerError>,
}

impl<'a> StreamCollector<'a> {
    fn new(store: &'a InvestigationStore, investigation_id: &'a str, max_turns: u32) -> Self {
        Self {
            store,
            investigation_id,
            max_turns,
            summary: String::new(),
            tools_used: Vec::new(),
            evidence_ids: Vec::new(),
            seen_tools: HashSet::new(),
            seen_ids: HashSet::new(),
            turns: 0,
            stream_error: None,
        }
    }

    fn record_tool(&mut self, id: String, name: String) {
        if !name.is_empty() && self.seen_tools.insert(name.clone()) {
            self.tools_used.push(name);
        }
        if !id.is_empty() && self.seen_ids.insert(id.clone()) {
            self.evidence_ids.push(id);
        }
    }

    fn observe(&mut self, event: PlannerEvent) {
        match event {
            PlannerEvent::Content { text } => self.summary.push_str(&text),
            PlannerEvent::ToolStart { id, name } => self.record_tool(id, name),
            PlannerEvent::ToolEnd { id, name } => {
                self.record_tool(id, name);
                self.turns = self
                    .store
                    .increment_turn_count(self.investigation_id)
                    .unwrap_or(self.turns + 1);
                if self.turns >= self.max_turns {
                    warn!(
                        investigation_id = %self.investigation_id,
                        turn_count = self.turns,
                        max_turns = self.max_turns,
                        "Investigation hit turn limit"
                    );
                }
            }
            PlannerEvent::Error { message } => {
                self.stream_error = Some(PlannerError::Stream(message));
            }
            PlannerEvent::Done => {}
        }
    }
}

/// Runs bounded planner investigations and acts on their verdicts.
pub struct InvestigationOrchestrator {
    planner: Arc<dyn Planner>,
    store: InvestigationStore,
    guardrails: Arc<Guardrails>,
    config: RwLock<InvestigationConfig>,
    collaborators: RwLock<Collaborators>,
    shutdown: ShutdownSignal,
    running: watch::Sender<usize>,
}

impl std::fmt::Debug for InvestigationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvestigationOrchestrator")
            .field("store", &self.store)
            .field("running", &*self.running.borrow())
            .field("shutting_down", &self.shutdown.is_triggered())
            .finish()
    }
}

impl InvestigationOrchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        store: InvestigationStore,
        guardrails: Arc<Guardrails>,
        config: InvestigationConfig,
    ) -> Self {
        let config = config.normalized();
        guardrails.set_critical_requires_approval(config.critical_requires_approval);
        let (running, _) = watch::channel(0usize);

        Self {
            planner,
            store,
            guardrails,
            config: RwLock::new(config),
            collaborators: RwLock::new(Collaborators::default()),
            shutdown: ShutdownSignal::new(),
            running,
        }
    }

    fn deps(&self) -> RwLockReadGuard<'_, Collaborators> {
        self.collaborators.read().unwrap_or_else(|e| e.into_inner())
    }

    fn deps_mut(&self) -> RwLockWriteGuard<'_, Collaborators> {
        self.collaborators.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_command_executor(&self, executor: Option<Arc<dyn CommandExecutor>>) {
        self.deps_mut().executor = executor;
    }

    pub fn set_fix_verifier(&self, verifier: Option<Arc<dyn FixVerifier>>) {
        self.deps_mut().verifier = verifier;
    }

    pub fn set_findings_store(&self, findings: Option<Arc<dyn FindingsStore>>) {
        self.deps_mut().findings = findings;
    }

    pub fn set_approval_queue(&self, approvals: Option<Arc<dyn ApprovalQueue>>) {
        self.deps_mut().approvals = approvals;
    }

    pub fn set_infrastructure_context_provider(
        &self,
        provider: Option<Arc<dyn InfrastructureContextProvider>>,
    ) {
        self.deps_mut().infrastructure = provider;
    }

    pub fn set_autonomy_level_provider(&self, provider: Option<Arc<dyn AutonomyLevelProvider>>) {
        self.deps_mut().autonomy = provider;
    }

    pub fn set_license_checker(&self, checker: Option<Arc<dyn LicenseChecker>>) {
        self.deps_mut().license = checker;
    }

    pub fn set_metrics_callback(&self, callback: Option<Arc<dyn MetricsCallback>>) {
        self.deps_mut().metrics = callback;
    }

    pub fn store(&self) -> &InvestigationStore {
        &self.store
    }

    pub fn get_config(&self) -> InvestigationConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replaces the configuration. Running investigations keep the values
    /// they started with.
    pub fn set_config(&self, config: InvestigationConfig) {
        let config = config.normalized();
        self.guardrails
            .set_critical_requires_approval(config.critical_requires_approval);
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    pub fn can_start_investigation(&self) -> bool {
        !self.shutdown.is_triggered() && *self.running.borrow() < self.get_config().max_concurrent
    }

    /// Whether `finding` is due for an investigation: autonomy allows it,
    /// none is running, the attempt cap is not reached and the cooldown
    /// (shorter after a timeout) has elapsed.
    pub fn should_investigate(&self, finding: &Finding, level: AutonomyLevel) -> bool {
        if level == AutonomyLevel::Monitor || finding.is_investigation_running() {
            return false;
        }
        let config = self.get_config();
        if finding.investigation_attempts >= config.max_attempts_per_finding {
            return false;
        }
        let Some(last) = finding.last_investigated_at else {
            return true;
        };
        let cooldown = if finding.investigation_outcome == Some(InvestigationOutcome::TimedOut) {
            config.timeout_cooldown
        } else {
            config.cooldown
        };
        match chrono::Duration::from_std(cooldown) {
            Ok(cooldown) => Utc::now() - last >= cooldown,
            Err(_) => false,
        }
    }

    fn try_acquire_slot(&self, max: usize) -> Option<RunningSlot<'_>> {
        let mut acquired = false;
        self.running.send_if_modified(|n| {
            if *n < max {
                *n += 1;
                acquired = true;
                true
            } else {
                false
            }
        });
        if !acquired {
            return None;
        }
        gauge!("investigations_running", *self.running.borrow() as f64);
        Some(RunningSlot {
            running: &self.running,
        })
    }

    fn mirror_finding(&self, finding: &Finding) {
        let findings = self.deps().findings.clone();
        if let Some(findings) = findings {
            if !findings.update(finding) {
                debug!(finding_id = %finding.id, "Findings store did not accept update");
            }
        }
    }

    fn record_outcome(&self, outcome: InvestigationOutcome) {
        counter!("investigation_outcomes_total", 1, "outcome" => outcome.as_str());
        let metrics = self.deps().metrics.clone();
        if let Some(metrics) = metrics {
            metrics.record_investigation_outcome(outcome);
        }
    }

    fn record_verification(&self, result: &'static str) {
        counter!("fix_verifications_total", 1, "result" => result);
        let metrics = self.deps().metrics.clone();
        if let Some(metrics) = metrics {
            metrics.record_fix_verification(result);
        }
    }

    /// Investigates `finding` at `level`, mirroring progress onto it and the
    /// findings store. Returns the final outcome.
    #[instrument(skip(self, finding, level), fields(finding_id = %finding.id, level = %level))]
    pub async fn investigate_finding(
        &self,
        finding: &mut Finding,
        level: AutonomyLevel,
    ) -> Result<InvestigationOutcome> {
        if self.shutdown.is_triggered() {
            return Err(InvestigationError::ShuttingDown);
        }
        let config = self.get_config();
        let _slot = self
            .try_acquire_slot(config.max_concurrent)
            .ok_or(InvestigationError::Capacity(config.max_concurrent))?;
        let mut cancel = self.shutdown.subscribe();

        let autonomous = level.is_autonomous();

        let session_id = tokio::select! {
            created = self.planner.create_session() => {
                created.map_err(InvestigationError::SessionCreate)?
            }
            _ = cancel.triggered() => {
                return Err(InvestigationError::SessionCreate(PlannerError::Cancelled));
            }
        };

        let investigation = self.store.create(&finding.id, &session_id);
        self.store
            .update_status(&investigation.id, InvestigationStatus::Running);

        finding.investigation_session_id = Some(session_id.clone());
        finding.investigation_status = Some(InvestigationStatus::Running);
        finding.investigation_attempts += 1;
        self.mirror_finding(finding);

        let infrastructure = self
            .deps()
            .infrastructure
            .clone()
            .map(|provider| provider.infrastructure_context());
        let prompt = build_investigation_prompt(finding, infrastructure.as_deref());

        let tools_available = self.planner.list_available_tools(&prompt).await;
        if !tools_available.is_empty() {
            if let Some(mut session) = self.store.get(&investigation.id) {
                session.tools_available = tools_available;
                self.store.update(&session);
            }
        }

        info!(
            finding_id = %finding.id,
            session_id = %session_id,
            investigation_id = %investigation.id,
            severity = %finding.severity,
            autonomous,
            "Starting investigation"
        );

        let request = ExecuteRequest {
            prompt,
            session_id,
            max_turns: config.max_turns,
            autonomous_mode: Some(autonomous),
        };
        let summary = match self
            .execute_with_limits(&investigation.id, request, &config, &mut cancel)
            .await
        {
            Ok(summary) => summary,
            Err(err) => {
                self.store.fail(&investigation.id, &err.to_string());
                let outcome = err.is_timeout().then_some(InvestigationOutcome::TimedOut);
                if let Some(outcome) = outcome {
                    self.store.set_outcome(&investigation.id, outcome);
                    finding.investigation_outcome = Some(outcome);
                    self.record_outcome(outcome);
                }
                finding.investigation_status = Some(InvestigationStatus::Failed);
                finding.last_investigated_at = Some(Utc::now());
                self.mirror_finding(finding);

                warn!(
                    finding_id = %finding.id,
                    investigation_id = %investigation.id,
                    error = %err,
                    "Investigation failed"
                );
                return Err(InvestigationError::Failed(err));
            }
        };

        let outcome = self
            .process_result(&investigation, finding, level, &summary, &config, &mut cancel)
            .await;
        Ok(outcome)
    }

    // Streams one planner request under the configured deadline. Returns the
    // concatenated content.
    async fn execute_with_limits(
        &self,
        investigation_id: &str,
        request: ExecuteRequest,
        config: &InvestigationConfig,
        cancel: &mut ShutdownListener,
    ) -> std::result::Result<String, PlannerError> {
        debug!(
            investigation_id = %investigation_id,
            session_id = %request.session_id,
            timeout_secs = config.timeout.as_secs(),
            max_turns = config.max_turns,
            prompt_len = request.prompt.len(),
            "Starting investigation execution with limits"
        );

        let mut collector = StreamCollector::new(&self.store, investigation_id, config.max_turns);
        let mut on_event = |event: PlannerEvent| collector.observe(event);
        let stream = tokio::time::timeout(
            config.timeout,
            self.planner.execute_stream(request, &mut on_event),
        );
        let result = tokio::select! {
            finished = stream => match finished {
                Ok(result) => result,
                Err(_) => Err(PlannerError::DeadlineExceeded),
            },
            _ = cancel.triggered() => Err(PlannerError::Cancelled),
        };

        let StreamCollector {
            summary,
            tools_used,
            evidence_ids,
            stream_error,
            ..
        } = collector;

        if let Some(mut session) = self.store.get(investigation_id) {
            session.tools_used = tools_used;
            session.evidence_ids = evidence_ids;
            if result.is_ok() && stream_error.is_none() {
                session.summary = summary.clone();
            }
            self.store.update(&session);
        }

        result?;
        if let Some(err) = stream_error {
            return Err(err);
        }
        Ok(summary)
    }

    // Closes the session and mirrors the outcome onto the finding.
    fn finish(
        &self,
        investigation: &InvestigationSession,
        finding: &mut Finding,
        outcome: InvestigationOutcome,
        summary: &str,
        fix: Option<Fix>,
    ) -> InvestigationOutcome {
        self.store.complete(&investigation.id, outcome, summary, fix);
        self.record_outcome(outcome);

        finding.investigation_status = Some(InvestigationStatus::Completed);
        finding.investigation_outcome = Some(outcome);
        finding.last_investigated_at = Some(Utc::now());
        self.mirror_finding(finding);

        info!(
            finding_id = %finding.id,
            investigation_id = %investigation.id,
            outcome = %outcome,
            "Investigation completed"
        );
        outcome
    }

    // Autonomy to act on now: the live setting when a provider is wired,
    // with full mode dropped to assisted while locked and auto-fix levels
    // clamped to approval without the licence feature.
    fn effective_autonomy(&self, requested: AutonomyLevel, finding_id: &str) -> AutonomyLevel {
        let deps = self.deps().clone();
        let mut level = requested;

        if let Some(provider) = deps.autonomy {
            level = provider.current_autonomy_level();
            if level == AutonomyLevel::Full && !provider.is_full_mode_unlocked() {
                level = AutonomyLevel::Assisted;
            }
        }

        if let Some(license) = deps.license {
            if matches!(level, AutonomyLevel::Assisted | AutonomyLevel::Full)
                && !license.has_feature(FEATURE_AI_AUTOFIX)
            {
                warn!(finding_id = %finding_id, "Auto-fix not licensed, clamping to approval mode");
                level = AutonomyLevel::Approval;
            }
        }
        level
    }

    async fn process_result(
        &self,
        investigation: &InvestigationSession,
        finding: &mut Finding,
        level: AutonomyLevel,
        summary: &str,
        config: &InvestigationConfig,
        cancel: &mut ShutdownListener,
    ) -> InvestigationOutcome {
        let parsed = parse_investigation_summary(summary);
        let Some(mut fix) = parsed.fix else {
            return self.finish(investigation, finding, parsed.outcome, summary, None);
        };

        if fix.commands.is_empty() {
            warn!(finding_id = %finding.id, "Investigation fix has no commands, marking needs_attention");
            return self.finish(
                investigation,
                finding,
                InvestigationOutcome::NeedsAttention,
                summary,
                Some(fix),
            );
        }

        // Blocked commands never run, approved or not.
        if let Some(blocked) = fix.commands.iter().find(|c| is_blocked_command(c)).cloned() {
            warn!(
                finding_id = %finding.id,
                command = %blocked,
                "Investigation proposed blocked command, forcing needs_attention"
            );
            fix.rationale = format!("{}\n\nBlocked by safety policy: {}", fix.rationale, blocked);
            return self.finish(
                investigation,
                finding,
                InvestigationOutcome::NeedsAttention,
                summary,
                Some(fix),
            );
        }

        let level = self.effective_autonomy(level, &finding.id);

        let mut requires_approval = false;
        let mut risk = RiskLevel::Medium;
        let mut destructive = false;
        for command in &fix.commands {
            requires_approval |= self.guardrails.requires_approval(finding.severity, level, command);
            destructive |= self.guardrails.is_destructive(command);
            risk = risk.max(self.guardrails.classify_risk(command));
        }
        fix.risk_level = risk;
        fix.destructive = destructive;

        let outcome = if requires_approval {
            self.queue_for_approval(investigation, finding, &fix, parsed.outcome)
        } else {
            self.auto_execute(finding, &mut fix, config, cancel).await
        };

        self.finish(investigation, finding, outcome, summary, Some(fix))
    }

    fn queue_for_approval(
        &self,
        investigation: &InvestigationSession,
        finding: &Finding,
        fix: &Fix,
        fallback: InvestigationOutcome,
    ) -> InvestigationOutcome {
        let Some(approvals) = self.deps().approvals.clone() else {
            warn!(finding_id = %finding.id, "No approval queue configured, fix left as queued");
            return fallback;
        };

        let approval = FixApproval {
            id: shared_types::new_id(),
            approval_type: APPROVAL_TYPE_INVESTIGATION_FIX.to_string(),
            finding_id: finding.id.clone(),
            session_id: investigation.session_id.clone(),
            description: fix.description.clone(),
            command: fix.commands.join("\n"),
            target_host: fix.target_host.clone(),
            risk_level: fix.risk_level,
            created_at: Utc::now(),
        };

        match approvals.queue_fix(&approval) {
            Ok(()) => {
                self.store.set_approval_id(&investigation.id, &approval.id);
                info!(
                    finding_id = %finding.id,
                    approval_id = %approval.id,
                    risk_level = %fix.risk_level.as_str(),
                    "Queued fix for approval"
                );
                InvestigationOutcome::FixQueued
            }
            Err(err) => {
                error!(finding_id = %finding.id, error = %err, "Failed to queue fix for approval");
                InvestigationOutcome::NeedsAttention
            }
        }
    }

    async fn auto_execute(
        &self,
        finding: &Finding,
        fix: &mut Fix,
        config: &InvestigationConfig,
        cancel: &mut ShutdownListener,
    ) -> InvestigationOutcome {
        let Some(executor) = self.deps().executor.clone() else {
            warn!(
                finding_id = %finding.id,
                command_count = fix.commands.len(),
                "Autonomous fix allowed but no command executor available, queueing for approval"
            );
            return InvestigationOutcome::FixQueued;
        };

        info!(
            finding_id = %finding.id,
            command_count = fix.commands.len(),
            target_host = %fix.target_host,
            risk_level = %fix.risk_level.as_str(),
            "Auto-executing fix"
        );

        let total = fix.commands.len();
        let mut combined = String::new();
        for (i, command) in fix.commands.iter().enumerate() {
            let result = tokio::select! {
                result = executor.execute_command(command, &fix.target_host) => result,
                _ = cancel.triggered() => Err(ExecutorError(PlannerError::Cancelled.to_string())),
            };

            if !combined.is_empty() {
                combined.push_str("\n\n");
            }
            let _ = writeln!(combined, "Command {}/{}: {}", i + 1, total, command);

            match result {
                Err(err) => {
                    error!(finding_id = %finding.id, command = %command, error = %err, "Auto-executed fix command failed");
                    fix.rationale = format!("{}\n\nAuto-execution failed: {}\n\n{}", fix.rationale, err, combined);
                    return InvestigationOutcome::FixFailed;
                }
                Ok(output) => {
                    let (scrubbed, redacted) = redact_sensitive_text(&output.output);
                    combined.push_str(&scrubbed);
                    if redacted > 0 {
                        let _ = write!(combined, "\n[redacted {} sensitive value(s)]", redacted);
                    }
                    if output.exit_code != 0 {
                        warn!(
                            finding_id = %finding.id,
                            command = %command,
                            exit_code = output.exit_code,
                            "Auto-executed fix command returned non-zero exit code"
                        );
                        fix.rationale = format!(
                            "{}\n\nAuto-execution returned exit code {}\n\n{}",
                            fix.rationale, output.exit_code, combined
                        );
                        return InvestigationOutcome::FixFailed;
                    }
                }
            }
        }

        info!(finding_id = %finding.id, command_count = total, "Auto-executed fix successfully");
        fix.rationale = format!("{}\n\nAuto-executed successfully:\n{}", fix.rationale, combined);

        let verifier = self.deps().verifier.clone();
        match verifier {
            Some(verifier) => self.verify(verifier, finding, fix, config.verification_delay, cancel).await,
            None => InvestigationOutcome::FixExecuted,
        }
    }

    async fn verify(
        &self,
        verifier: Arc<dyn FixVerifier>,
        finding: &Finding,
        fix: &mut Fix,
        delay: Duration,
        cancel: &mut ShutdownListener,
    ) -> InvestigationOutcome {
        let check = async {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            verifier.verify_fix_resolved(finding).await
        };
        let result = tokio::select! {
            result = check => result,
            _ = cancel.triggered() => Err(VerifyError::Unknown(PlannerError::Cancelled.to_string())),
        };

        match result {
            Ok(true) => {
                info!(finding_id = %finding.id, "Fix verified, issue resolved");
                fix.rationale.push_str("\n\nVerification: Issue confirmed resolved.");
                self.record_verification("verified");
                InvestigationOutcome::FixVerified
            }
            Ok(false) => {
                warn!(finding_id = %finding.id, "Fix executed but issue persists");
                fix.rationale.push_str("\n\nVerification: Issue persists after fix execution.");
                self.record_verification("failed");
                InvestigationOutcome::FixVerificationFailed
            }
            Err(err @ VerifyError::Unknown(_)) => {
                warn!(finding_id = %finding.id, error = %err, "Fix verification inconclusive");
                let _ = write!(fix.rationale, "\n\nVerification inconclusive: {err}");
                self.record_verification("unknown");
                InvestigationOutcome::FixVerificationUnknown
            }
            Err(err) => {
                error!(finding_id = %finding.id, error = %err, "Fix verification failed with error");
                let _ = write!(fix.rationale, "\n\nVerification error: {err}");
                self.record_verification("error");
                InvestigationOutcome::FixVerificationFailed
            }
        }
    }

    /// Re-runs an investigation for a stored finding.
    #[instrument(skip(self, level), fields(level = %level))]
    pub async fn reinvestigate_finding(
        &self,
        finding_id: &str,
        level: AutonomyLevel,
    ) -> Result<InvestigationOutcome> {
        let findings = self
            .deps()
            .findings
            .clone()
            .ok_or(InvestigationError::FindingsStoreNotConfigured)?;
        let mut finding = findings
            .get(finding_id)
            .ok_or_else(|| InvestigationError::FindingNotFound(finding_id.to_string()))?;
        if finding.is_investigation_running() {
            return Err(InvestigationError::AlreadyRunning(finding_id.to_string()));
        }
        self.investigate_finding(&mut finding, level).await
    }

    pub fn get_investigation(&self, id: &str) -> Option<InvestigationSession> {
        self.store.get(id)
    }

    /// Latest investigation for a finding.
    pub fn get_investigation_by_finding(&self, finding_id: &str) -> Option<InvestigationSession> {
        self.store.get_latest_by_finding(finding_id)
    }

    pub fn get_running_investigations(&self) -> Vec<InvestigationSession> {
        self.store.get_running()
    }

    /// Investigations currently holding a running slot.
    pub fn get_running_count(&self) -> usize {
        *self.running.borrow()
    }

    pub fn get_fixed_count(&self) -> usize {
        self.store.count_fixed()
    }

    /// Planner transcript of an investigation.
    pub async fn get_investigation_messages(&self, id: &str) -> Result<Vec<PlannerMessage>> {
        let session = self
            .store
            .get(id)
            .ok_or_else(|| InvestigationError::NotFound(id.to_string()))?;
        self.planner
            .get_messages(&session.session_id)
            .await
            .map_err(InvestigationError::Failed)
    }

    /// Removes a finished investigation and its planner session.
    pub async fn discard_investigation(&self, id: &str) -> Result<()> {
        let session = self
            .store
            .get(id)
            .ok_or_else(|| InvestigationError::NotFound(id.to_string()))?;
        if session.is_active() {
            return Err(InvestigationError::AlreadyRunning(session.finding_id));
        }
        self.store.delete(id);
        if let Err(err) = self.planner.delete_session(&session.session_id).await {
            warn!(investigation_id = %id, error = %err, "Failed to delete planner session");
        }
        Ok(())
    }

    /// Age-based cleanup followed by the size cap.
    pub fn cleanup_investigation_store(&self, max_age: Duration, max_sessions: usize) {
        let aged = self.store.cleanup(max_age);
        let evicted = self.store.enforce_size_limit(max_sessions);
        debug!(aged, evicted, "Investigation store cleanup finished");
    }

    /// Refuses new investigations, cancels running ones, flushes the store
    /// and waits up to `timeout` for in-flight work to unwind.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        info!("Investigation orchestrator starting shutdown");
        self.shutdown.trigger();

        if let Err(err) = self.store.force_save() {
            error!(error = %err, "Failed to force-save investigation store during shutdown");
        }

        let mut running = self.running.subscribe();
        let drained = tokio::time::timeout(timeout, running.wait_for(|n| *n == 0))
            .await
            .map(|_| ());
        match drained {
            Ok(()) => {
                info!("All investigations completed");
                Ok(())
            }
            Err(_) => {
                let remaining = *self.running.borrow();
                warn!(remaining, "Shutdown timed out with running investigations");
                Err(InvestigationError::ShutdownTimeout(remaining))
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }
}
