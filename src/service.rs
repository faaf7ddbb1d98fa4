use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{info, warn};

use crate::{
    config::ShiftRules,
    export::{ExportRow, ShiftExporter},
    keywords::KeywordPolicy,
    notify::Notifier,
    replies,
    report::{EndTrigger, ShiftReport},
    roles::roles_for,
    scheduler::{self, Notice},
    shift::{
        self, BreakOutcome, EndOutcome, JoinOutcome, PauseOutcome, ReturnOutcome,
        TransferDecision, TransferOutcome, VoiceOutcome,
    },
    speech::{SpeechAnalysis, SpeechAnalyzer},
    storage::ShiftRepository,
    store::ShiftStore,
    transfer::TransferTimers,
    types::{ChatConfig, ChatId, Role, ShiftEvent, ShiftState, UserId},
};

pub struct ShiftService {
    store: ShiftStore,
    repository: Arc<dyn ShiftRepository>,
    exporter: Arc<dyn ShiftExporter>,
    speech: Arc<dyn SpeechAnalyzer>,
    notifier: Arc<dyn Notifier>,
    keywords: KeywordPolicy,
    rules: ShiftRules,
    timers: TransferTimers,
}

impl ShiftService {
    pub fn new(
        store: ShiftStore,
        repository: Arc<dyn ShiftRepository>,
        exporter: Arc<dyn ShiftExporter>,
        speech: Arc<dyn SpeechAnalyzer>,
        notifier: Arc<dyn Notifier>,
        keywords: KeywordPolicy,
        rules: ShiftRules,
    ) -> Self {
        Self {
            store,
            repository,
            exporter,
            speech,
            notifier,
            keywords,
            rules,
            timers: TransferTimers::default(),
        }
    }

    pub fn store(&self) -> &ShiftStore {
        &self.store
    }

    pub fn repository(&self) -> &dyn ShiftRepository {
        self.repository.as_ref()
    }

    pub fn keywords(&self) -> &KeywordPolicy {
        &self.keywords
    }

    pub fn rules(&self) -> &ShiftRules {
        &self.rules
    }

    pub fn speech_enabled(&self) -> bool {
        self.speech.is_enabled()
    }

    pub async fn chat_state(&self, chat_id: ChatId) -> Option<ShiftState> {
        self.store.get(chat_id).await
    }

    pub async fn chat_config(&self, chat_id: ChatId) -> anyhow::Result<ChatConfig> {
        self.apply(chat_id, |state, _| state.config.clone()).await
    }

    pub async fn join(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        name: &str,
        role: Option<Role>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<JoinOutcome> {
        self.apply(chat_id, |state, rules| {
            shift::join(state, user_id, name, role, now, rules)
        })
        .await
    }

    pub async fn record_voice(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        name: &str,
        duration_secs: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<VoiceOutcome> {
        self.apply(chat_id, |state, rules| {
            shift::record_voice(state, user_id, name, duration_secs, now, rules)
        })
        .await
    }

    pub async fn analyze_voice(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        audio: Vec<u8>,
    ) -> anyhow::Result<Option<SpeechAnalysis>> {
        let Some(mut user) = self.store.user_copy(chat_id, user_id).await else {
            return Ok(None);
        };
        let templates = self
            .store
            .with_chat(chat_id, |state| state.config.content_templates.clone())
            .await
            .unwrap_or_default();

        let analysis = self.speech.analyze(audio, &templates).await?;
        user.add_tags(analysis.tags.iter().cloned());

        self.store
            .with_chat(chat_id, |state| {
                if let Some(current) = state.users.get_mut(&user_id) {
                    current.add_tags(user.content_tags);
                }
            })
            .await;

        Ok(Some(analysis))
    }

    pub async fn request_break(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<BreakOutcome> {
        self.apply(chat_id, |state, rules| {
            shift::request_break(state, user_id, now, rules)
        })
        .await
    }

    pub async fn record_return(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ReturnOutcome> {
        self.apply(chat_id, |state, rules| {
            shift::record_return(state, user_id, now, rules)
        })
        .await
    }

    pub async fn start_pause(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<PauseOutcome> {
        self.apply(chat_id, |state, rules| {
            shift::start_pause(state, user_id, now, rules)
        })
        .await
    }

    pub async fn end_pause(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<PauseOutcome> {
        self.apply(chat_id, |state, rules| {
            shift::end_pause(state, user_id, now, rules)
        })
        .await
    }

    pub async fn request_transfer(
        self: &Arc<Self>,
        chat_id: ChatId,
        from_user: UserId,
        to_user: UserId,
        to_name: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TransferOutcome> {
        let outcome = self
            .apply(chat_id, |state, rules| {
                shift::request_transfer(state, from_user, to_user, to_name, now, rules)
            })
            .await?;

        if let TransferOutcome::Requested(pending) = &outcome {
            let service = Arc::clone(self);
            let request_id = pending.id;
            self.timers
                .arm(chat_id, request_id, self.rules.transfer_timeout, async move {
                    service.expire_transfer(chat_id, request_id).await;
                })
                .await;
        }

        Ok(outcome)
    }

    pub async fn accept_transfer(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TransferDecision> {
        let decision = self
            .apply(chat_id, |state, _| shift::accept_transfer(state, user_id, now))
            .await?;
        self.settle_timer(chat_id, &decision).await;
        Ok(decision)
    }

    pub async fn decline_transfer(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TransferDecision> {
        let decision = self
            .apply(chat_id, |state, _| shift::decline_transfer(state, user_id, now))
            .await?;
        self.settle_timer(chat_id, &decision).await;
        Ok(decision)
    }

    async fn settle_timer(&self, chat_id: ChatId, decision: &TransferDecision) {
        let request_id = match decision {
            TransferDecision::Accepted { request_id, .. }
            | TransferDecision::Declined { request_id, .. }
            | TransferDecision::Expired { request_id } => *request_id,
            TransferDecision::NoPending | TransferDecision::NotTarget => return,
        };
        self.timers.cancel(chat_id, request_id).await;
    }

    async fn expire_transfer(&self, chat_id: ChatId, request_id: u64) {
        self.timers.disarm(chat_id, request_id).await;
        let expired = self
            .apply(chat_id, |state, _| {
                shift::expire_transfer(state, request_id, Utc::now())
            })
            .await;

        match expired {
            Ok(Some(pending)) => {
                info!(chat_id, request_id, "transfer request expired");
                self.notify(chat_id, &replies::transfer_expired(&pending)).await;
            }
            Ok(None) => {}
            Err(error) => warn!(?error, chat_id, request_id, "failed to expire transfer"),
        }
    }

    pub async fn end_shift(
        &self,
        chat_id: ChatId,
        now: DateTime<Utc>,
        trigger: EndTrigger,
    ) -> anyhow::Result<EndOutcome> {
        let outcome = self
            .apply(chat_id, |state, _| shift::finish_shift(state, now, trigger))
            .await?;
        if let EndOutcome::Report(report) = &outcome {
            self.publish_report(report).await;
        }
        Ok(outcome)
    }

    pub async fn summary(&self, chat_id: ChatId, now: DateTime<Utc>) -> Option<ShiftReport> {
        self.store
            .with_chat(chat_id, |state| shift::summary(state, now))
            .await
            .flatten()
    }

    pub async fn update_config<F>(&self, chat_id: ChatId, edit: F) -> anyhow::Result<ChatConfig>
    where
        F: FnOnce(&mut ChatConfig) + Send,
    {
        let config = self
            .apply(chat_id, |state, rules| {
                let previous = state.config.goal_override;
                edit(&mut state.config);
                match state.config.goal_override {
                    Some(goal) => {
                        for user in state.users.values_mut() {
                            user.goal = goal;
                        }
                    }
                    None if previous.is_some() => {
                        let day = state
                            .config
                            .local_now(state.started_at.unwrap_or_else(Utc::now))
                            .weekday();
                        let day_roles = roles_for(day, rules);
                        for user in state.users.values_mut() {
                            user.goal = day_roles.goal_for(user.role).unwrap_or_default();
                        }
                    }
                    None => {}
                }
                state.refresh_goal();
                state.config.clone()
            })
            .await?;

        self.repository.save_chat_config(chat_id, &config).await?;
        Ok(config)
    }

    pub async fn tick_all(&self, now: DateTime<Utc>) -> usize {
        let rules = &self.rules;
        let batches = self
            .store
            .with_each_chat(|state| {
                let notices = scheduler::tick(state, now, rules);
                (notices, state.drain_journal())
            })
            .await;

        let mut delivered = 0;
        for (chat_id, (notices, events)) in batches {
            self.persist_events(events).await;
            for notice in notices {
                match &notice {
                    Notice::ShiftEnded(report) => self.publish_report(report).await,
                    Notice::TransferExpired(pending) => {
                        self.timers.cancel(chat_id, pending.id).await;
                    }
                    _ => {}
                }
                self.notify(chat_id, &replies::notice(&notice)).await;
                delivered += 1;
            }
        }
        delivered
    }

    async fn publish_report(&self, report: &ShiftReport) {
        info!(
            chat_id = report.chat_id,
            count = report.count,
            goal = report.goal,
            trigger = ?report.trigger,
            "shift ended"
        );

        if let Err(error) = self.repository.record_report(report).await {
            warn!(?error, chat_id = report.chat_id, "failed to store shift report");
        }

        let row = ExportRow::from_report(report);
        if let Err(error) = self.exporter.export(&row).await {
            warn!(?error, chat_id = report.chat_id, "failed to export shift report");
            self.notify(
                report.chat_id,
                "⚠️ The report could not be exported to the spreadsheet. The shift is still saved.",
            )
            .await;
        }
    }

    async fn notify(&self, chat_id: ChatId, text: &str) {
        if let Err(error) = self.notifier.send_text(chat_id, text).await {
            warn!(?error, chat_id, "failed to deliver notice");
        }
    }

    async fn ensure_chat(&self, chat_id: ChatId) -> anyhow::Result<()> {
        if self.store.contains(chat_id).await {
            return Ok(());
        }
        let config = self
            .repository
            .load_chat_config(chat_id)
            .await?
            .unwrap_or_else(|| self.rules.default_chat_config());
        self.store
            .insert_if_absent(ShiftState::new(chat_id, config))
            .await;
        Ok(())
    }

    async fn apply<R, F>(&self, chat_id: ChatId, op: F) -> anyhow::Result<R>
    where
        F: FnOnce(&mut ShiftState, &ShiftRules) -> R + Send,
        R: Send,
    {
        self.ensure_chat(chat_id).await?;
        let rules = &self.rules;
        let (result, events) = self
            .store
            .with_chat(chat_id, |state| {
                let result = op(state, rules);
                (result, state.drain_journal())
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("chat {chat_id} is missing from the shift store"))?;

        self.persist_events(events).await;
        Ok(result)
    }

    async fn persist_events(&self, events: Vec<ShiftEvent>) {
        for event in events {
            if let Err(error) = self.repository.record_event(event).await {
                warn!(?error, "failed to record shift event");
            }
        }
    }
}
