use async_trait::async_trait;
use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::config::{CadenceConfig, RunMode};
use crate::error::CycleError;
use crate::history::{HistoryEntry, RunHistory};
use crate::pipeline::Pipeline;
use crate::{loge, logi, logok, logw};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Generating,
    Assembling,
    Publishing,
    Sleeping,
    Halted,
}

#[async_trait]
pub trait Sleeper: Send {
    async fn sleep(&mut self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Published {
        subject: String,
        platform_id: String,
    },
    Failed {
        subject: Option<String>,
        label: &'static str,
        reason: String,
    },
    RateLimited {
        subject: Option<String>,
        reason: String,
    },
    Halted {
        subject: Option<String>,
        reason: String,
    },
}

impl CycleOutcome {
    fn from_error(subject: Option<&str>, err: CycleError) -> Self {
        let subject = subject.map(str::to_string);
        let label = err.label();
        match err {
            CycleError::Unauthorized(reason) => Self::Halted { subject, reason },
            CycleError::RateLimited(reason) => Self::RateLimited { subject, reason },
            other => Self::Failed {
                subject,
                label,
                reason: other.to_string(),
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Published { .. } => "published",
            Self::Failed { label, .. } => *label,
            Self::RateLimited { .. } => "rate_limited",
            Self::Halted { .. } => "unauthorized",
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::Published { subject, .. } => Some(subject),
            Self::Failed { subject, .. }
            | Self::RateLimited { subject, .. }
            | Self::Halted { subject, .. } => subject.as_deref(),
        }
    }

    fn history_entry(&self) -> HistoryEntry {
        let entry = HistoryEntry::new(self.subject(), self.label());
        match self {
            Self::Published { platform_id, .. } => entry.with_platform_id(platform_id.clone()),
            Self::Failed { reason, .. }
            | Self::RateLimited { reason, .. }
            | Self::Halted { reason, .. } => entry.with_error(reason.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Published,
    Failed,
    Halted,
}

impl LoopExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Published => 0,
            Self::Failed => 1,
            Self::Halted => 2,
        }
    }
}

pub struct ScheduleLoop<P: Pipeline, S: Sleeper> {
    pipeline: P,
    sleeper: S,
    cadence: CadenceConfig,
    mode: RunMode,
    state: LoopState,
    rng: StdRng,
    history: Option<RunHistory>,
    cycle_limit: Option<u64>,
    cycles_run: u64,
}

impl<P: Pipeline, S: Sleeper> ScheduleLoop<P, S> {
    pub fn new(pipeline: P, sleeper: S, cadence: CadenceConfig, mode: RunMode) -> Self {
        Self {
            pipeline,
            sleeper,
            cadence,
            mode,
            state: LoopState::Idle,
            rng: StdRng::from_entropy(),
            history: None,
            cycle_limit: None,
            cycles_run: 0,
        }
    }

    pub fn with_history(mut self, history: Option<RunHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn with_cycle_limit(mut self, limit: Option<u64>) -> Self {
        self.cycle_limit = limit;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            logi(format!("State {:?} -> {:?}", self.state, next));
            self.state = next;
        }
    }

    /// Normal inter-cycle pause: interval shifted by a uniform offset within ±jitter.
    pub fn next_interval(&mut self) -> Duration {
        let base = self.cadence.interval_secs as i64;
        let jitter = self.cadence.jitter_secs as i64;
        let offset = if jitter > 0 {
            self.rng.gen_range(-jitter..=jitter)
        } else {
            0
        };
        Duration::from_secs((base + offset).max(0) as u64)
    }

    fn pause_after(&mut self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::RateLimited { .. } => self.cadence.rate_limit_cooldown(),
            CycleOutcome::Failed { .. } => self.cadence.error_cooldown(),
            CycleOutcome::Published { .. } | CycleOutcome::Halted { .. } => self.next_interval(),
        }
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.transition(LoopState::Generating);
        let plan = match self.pipeline.generate().await {
            Ok(plan) => plan,
            Err(err) => return CycleOutcome::from_error(None, err),
        };

        self.transition(LoopState::Assembling);
        let artifact = match self.pipeline.assemble(&plan).await {
            Ok(artifact) => artifact,
            Err(err) => return CycleOutcome::from_error(Some(&plan.subject), err),
        };

        self.transition(LoopState::Publishing);
        let published = self.pipeline.publish(&plan, &artifact).await;
        match published {
            Ok(result) if result.is_published() => CycleOutcome::Published {
                subject: plan.subject,
                platform_id: result.platform_id,
            },
            Ok(result) => CycleOutcome::Failed {
                subject: Some(plan.subject),
                label: "publish_failed",
                reason: result
                    .error
                    .unwrap_or_else(|| "publisher reported failure".to_string()),
            },
            Err(err) => CycleOutcome::from_error(Some(&plan.subject), err),
        }
    }

    fn report(&self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Published {
                subject,
                platform_id,
            } => logok(format!("Cycle published '{subject}' ({platform_id})")),
            CycleOutcome::RateLimited { reason, .. } => {
                logw(format!("Rate limit hit: {reason}"));
            }
            CycleOutcome::Failed { label, reason, .. } => {
                loge(format!("Cycle failed [{label}]: {reason}"));
            }
            CycleOutcome::Halted { reason, .. } => {
                loge(format!("CRITICAL: invalid credentials ({reason}). STOPPING."));
            }
        }
    }

    async fn record(&self, outcome: &CycleOutcome) {
        if let Some(history) = &self.history {
            if let Err(err) = history.append(&outcome.history_entry()).await {
                logw(format!("Could not append run history: {err:#}"));
            }
        }
    }

    async fn sleep_for(&mut self, pause: Duration, outcome: &CycleOutcome) {
        self.transition(LoopState::Sleeping);
        match outcome {
            CycleOutcome::Published { .. } => {
                let wake = chrono::Duration::from_std(pause)
                    .ok()
                    .map(|d| (Local::now() + d).format("%H:%M").to_string())
                    .unwrap_or_else(|| "?".to_string());
                logi(format!(
                    "Sleeping {} minutes (wakes ~{wake})",
                    pause.as_secs() / 60
                ));
            }
            _ => logi(format!("Cooling down for {} seconds", pause.as_secs())),
        }
        self.sleeper.sleep(pause).await;
        self.transition(LoopState::Idle);
    }

    pub async fn run(&mut self) -> LoopExit {
        loop {
            let outcome = self.run_cycle().await;
            self.cycles_run += 1;
            self.report(&outcome);
            self.record(&outcome).await;

            if matches!(outcome, CycleOutcome::Halted { .. }) {
                self.transition(LoopState::Halted);
                return LoopExit::Halted;
            }

            let exhausted = self.cycle_limit.is_some_and(|n| self.cycles_run >= n);
            if self.mode == RunMode::SingleShot || exhausted {
                self.transition(LoopState::Idle);
                return match outcome {
                    CycleOutcome::Published { .. } => LoopExit::Published,
                    _ => LoopExit::Failed,
                };
            }

            let pause = self.pause_after(&outcome);
            self.sleep_for(pause, &outcome).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Artifact, PublishResult};
    use crate::error::AssetError;
    use crate::plan::{ActionBounds, ContentPlan};
    use crate::topics::Topic;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct RecordingSleeper {
        naps: Vec<Duration>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&mut self, duration: Duration) {
            self.naps.push(duration);
        }
    }

    enum Step {
        Publish,
        GenerateFails(fn() -> CycleError),
        AssembleFails(fn() -> CycleError),
        PublishFails(fn() -> CycleError),
        PublishReportsFailure,
    }

    struct Scripted {
        steps: VecDeque<Step>,
        current: Option<Step>,
        generated: usize,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                current: None,
                generated: 0,
            }
        }
    }

    #[async_trait]
    impl Pipeline for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&mut self) -> Result<ContentPlan, CycleError> {
            self.generated += 1;
            self.current = Some(self.steps.pop_front().unwrap_or(Step::Publish));
            if let Some(Step::GenerateFails(err)) = &self.current {
                return Err(err());
            }
            Ok(ContentPlan::fallback(
                &Topic::new("Everyday Waste", "Glass Bottle"),
                &ActionBounds::default(),
            ))
        }

        async fn assemble(&mut self, _plan: &ContentPlan) -> Result<Artifact, CycleError> {
            if let Some(Step::AssembleFails(err)) = &self.current {
                return Err(err());
            }
            Ok(Artifact::Text("post".into()))
        }

        async fn publish(
            &mut self,
            _plan: &ContentPlan,
            _artifact: &Artifact,
        ) -> Result<PublishResult, CycleError> {
            match &self.current {
                Some(Step::PublishFails(err)) => Err(err()),
                Some(Step::PublishReportsFailure) => Ok(PublishResult::failed("quota")),
                _ => Ok(PublishResult::published("vid-1")),
            }
        }
    }

    fn unauthorized() -> CycleError {
        CycleError::Unauthorized("bad key".into())
    }

    fn rate_limited() -> CycleError {
        CycleError::RateLimited("429".into())
    }

    fn transient() -> CycleError {
        CycleError::Transient(anyhow::anyhow!("socket closed"))
    }

    fn fatal_asset() -> CycleError {
        CycleError::FatalAsset(AssetError::NoVisualSource)
    }

    fn looped(steps: Vec<Step>, limit: u64) -> ScheduleLoop<Scripted, RecordingSleeper> {
        ScheduleLoop::new(
            Scripted::new(steps),
            RecordingSleeper::default(),
            CadenceConfig::default(),
            RunMode::Continuous,
        )
        .with_cycle_limit(Some(limit))
        .with_seed(3)
    }

    #[tokio::test]
    async fn unauthorized_halts_without_further_cycles() {
        for step in [
            Step::GenerateFails(unauthorized),
            Step::PublishFails(unauthorized),
        ] {
            let mut l = looped(vec![step], 10);
            assert_eq!(l.run().await, LoopExit::Halted);
            assert_eq!(l.state(), LoopState::Halted);
            assert_eq!(l.cycles_run(), 1);
            assert_eq!(l.pipeline().generated, 1);
            assert!(l.sleeper().naps.is_empty());
        }
    }

    #[tokio::test]
    async fn rate_limit_sleeps_exactly_the_long_cooldown() {
        let mut l = looped(vec![Step::PublishFails(rate_limited)], 2);
        assert_eq!(l.run().await, LoopExit::Published);
        assert_eq!(l.sleeper().naps, [Duration::from_secs(1800)]);
    }

    #[tokio::test]
    async fn other_failures_use_short_cooldown_and_resume() {
        let mut l = looped(
            vec![
                Step::GenerateFails(transient),
                Step::AssembleFails(fatal_asset),
                Step::PublishReportsFailure,
                Step::Publish,
            ],
            4,
        );
        assert_eq!(l.run().await, LoopExit::Published);
        assert_eq!(l.cycles_run(), 4);
        assert_eq!(l.sleeper().naps, [Duration::from_secs(300); 3]);
    }

    #[tokio::test]
    async fn normal_interval_is_jittered_within_bounds() {
        let mut l = looped(vec![], 6);
        l.run().await;
        assert_eq!(l.sleeper().naps.len(), 5);
        for nap in &l.sleeper().naps {
            let secs = nap.as_secs();
            assert!((12_600 - 900..=12_600 + 900).contains(&secs), "{secs}");
        }
    }

    #[tokio::test]
    async fn single_shot_runs_once_and_reports() {
        let mut ok = ScheduleLoop::new(
            Scripted::new(vec![]),
            RecordingSleeper::default(),
            CadenceConfig::default(),
            RunMode::SingleShot,
        );
        assert_eq!(ok.run().await.exit_code(), 0);
        assert!(ok.sleeper().naps.is_empty());

        let mut failed = ScheduleLoop::new(
            Scripted::new(vec![Step::AssembleFails(fatal_asset)]),
            RecordingSleeper::default(),
            CadenceConfig::default(),
            RunMode::SingleShot,
        );
        assert_eq!(failed.run().await.exit_code(), 1);
        assert_eq!(failed.cycles_run(), 1);
    }

    #[tokio::test]
    async fn outcomes_are_recorded_in_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut l = looped(vec![Step::PublishFails(rate_limited), Step::Publish], 2)
            .with_history(Some(RunHistory::new(&path)));
        l.run().await;

        let entries = RunHistory::new(&path).read_all().await.unwrap();
        let outcomes: Vec<_> = entries.iter().map(|e| e.outcome.as_str()).collect();
        assert_eq!(outcomes, ["rate_limited", "published"]);
        assert_eq!(entries[1].subject.as_deref(), Some("Glass Bottle"));
        assert_eq!(entries[1].platform_id.as_deref(), Some("vid-1"));
    }
}
