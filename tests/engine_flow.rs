//! End-to-end tests for the task engine.
//!
//! Each test wires the dispatcher, timeout monitor and invitation ledger over
//! an in-memory database with a recording channel, and drives them with an
//! explicit clock.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;

use trainer_assist::actors::{Actor, ActorRole};
use trainer_assist::channels::{
    ChoiceOption, InboundEvent, MessagingChannel, Notification, NotificationTemplate, Notifier,
};
use trainer_assist::config::{EngineConfig, to_chrono};
use trainer_assist::dispatcher::{DispatchOutcome, DispatchResult, Dispatcher};
use trainer_assist::error::ChannelError;
use trainer_assist::invitations::InvitationLedger;
use trainer_assist::invitations::model::InvitationStatus;
use trainer_assist::monitor::TimeoutMonitor;
use trainer_assist::relationships::RelationshipGraph;
use trainer_assist::relationships::model::ConnectionStatus;
use trainer_assist::store::{Database, LibSqlBackend};
use trainer_assist::tasks::{ActorLocks, StepData, TaskStatus, TaskStore, TaskType};

const TRAINER: &str = "27820000001";
const CLIENT: &str = "27830000002";

/// Records every outbound message body.
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessagingChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_text(&self, actor_key: &str, text: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((actor_key.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_choice(
        &self,
        actor_key: &str,
        text: &str,
        _options: &[ChoiceOption],
    ) -> Result<(), ChannelError> {
        self.send_text(actor_key, text).await
    }
}

struct Engine {
    db: Arc<dyn Database>,
    tasks: TaskStore,
    graph: RelationshipGraph,
    dispatcher: Dispatcher,
    monitor: TimeoutMonitor,
    channel: Arc<RecordingChannel>,
    notifications: mpsc::Receiver<Notification>,
    t0: DateTime<Utc>,
}

impl Engine {
    async fn new() -> Self {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let config = EngineConfig::default();
        let (notifier, notifications) = Notifier::channel(64);
        let graph = RelationshipGraph::new(Arc::clone(&db));
        let ledger = Arc::new(InvitationLedger::new(
            Arc::clone(&db),
            graph.clone(),
            notifier.clone(),
            to_chrono(config.invitation_ttl),
        ));
        let locks = ActorLocks::new();
        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = Dispatcher::new(
            Arc::clone(&db),
            Arc::clone(&ledger),
            Arc::clone(&locks),
            channel.clone(),
            config.clone(),
        );
        let monitor = TimeoutMonitor::new(Arc::clone(&db), locks, ledger, notifier, config);
        Self {
            tasks: TaskStore::new(Arc::clone(&db)),
            db,
            graph,
            dispatcher,
            monitor,
            channel,
            notifications,
            t0: Utc::now(),
        }
    }

    fn at(&self, minutes: i64) -> DateTime<Utc> {
        self.t0 + TimeDelta::minutes(minutes)
    }

    async fn text(&self, key: &str, role: ActorRole, text: &str, minutes: i64) -> DispatchResult {
        self.dispatcher
            .dispatch_at(key, role, &InboundEvent::text(key, text), self.at(minutes))
            .await
    }

    async fn tap(&self, key: &str, role: ActorRole, button_id: &str, minutes: i64) -> DispatchResult {
        self.dispatcher
            .dispatch_at(key, role, &InboundEvent::button(key, button_id), self.at(minutes))
            .await
    }

    async fn next_notification(&mut self) -> Notification {
        self.notifications.try_recv().expect("a queued notification")
    }

    /// Trainer runs add_client for Thabo; returns the invitation token.
    async fn invite_thabo(&mut self, mode: &str) -> String {
        self.text(TRAINER, ActorRole::Initiator, "add client", 0).await;
        self.text(TRAINER, ActorRole::Initiator, "Thabo", 0).await;
        self.text(TRAINER, ActorRole::Initiator, "+27 83 000 0002", 0).await;
        let done = self
            .tap(TRAINER, ActorRole::Initiator, &format!("choice:{mode}"), 0)
            .await;
        if mode == "inviter_supplies_data" {
            assert_eq!(done.outcome, DispatchOutcome::Advanced);
            let done = self.text(TRAINER, ActorRole::Initiator, "thabo@example.com", 0).await;
            assert_eq!(done.outcome, DispatchOutcome::Completed(TaskType::AddClient));
        } else {
            assert_eq!(done.outcome, DispatchOutcome::Completed(TaskType::AddClient));
        }

        let received = self.next_notification().await;
        assert_eq!(received.actor_key, CLIENT);
        assert_eq!(received.template, NotificationTemplate::InvitationReceived);
        received.data["token"].as_str().unwrap().to_string()
    }
}

// ── Registration ────────────────────────────────────────────────────

#[tokio::test]
async fn trainer_registers_end_to_end() {
    let e = Engine::new().await;
    let r = e.text(TRAINER, ActorRole::Initiator, "register", 0).await;
    assert_eq!(r.outcome, DispatchOutcome::Started(TaskType::Registration));

    for answer in ["Sipho Dlamini", "sipho@example.com", "Fit Co"] {
        let r = e.text(TRAINER, ActorRole::Initiator, answer, 1).await;
        assert_eq!(r.outcome, DispatchOutcome::Advanced, "{answer}");
    }
    let r = e.tap(TRAINER, ActorRole::Initiator, "choice:yes", 2).await;
    assert_eq!(r.outcome, DispatchOutcome::Completed(TaskType::Registration));

    let actor = e.db.get_actor(TRAINER).await.unwrap().unwrap();
    assert_eq!(actor.name, "Sipho Dlamini");
    assert_eq!(actor.role, ActorRole::Initiator);
    assert_eq!(actor.business_name.as_deref(), Some("Fit Co"));
    assert!(actor.profile_complete);
    assert!(e.tasks.get_running(TRAINER, ActorRole::Initiator).await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_answer_reprompts_same_step() {
    let e = Engine::new().await;
    e.text(TRAINER, ActorRole::Initiator, "register", 0).await;
    e.text(TRAINER, ActorRole::Initiator, "Sipho", 1).await;

    let r = e.text(TRAINER, ActorRole::Initiator, "not-an-email", 2).await;
    assert_eq!(r.outcome, DispatchOutcome::Reprompted);
    assert!(r.replies[0].body().contains("email"));

    let task = e.tasks.get_running(TRAINER, ActorRole::Initiator).await.unwrap().unwrap();
    assert_eq!(task.step(), "email");
    assert_eq!(task.last_activity_at, e.at(2));
    assert!(!task.reminder_sent);
}

#[tokio::test]
async fn cancel_stops_the_running_task() {
    let e = Engine::new().await;
    e.text(TRAINER, ActorRole::Initiator, "register", 0).await;
    let task = e.tasks.get_running(TRAINER, ActorRole::Initiator).await.unwrap().unwrap();

    let r = e.text(TRAINER, ActorRole::Initiator, "Cancel", 1).await;
    assert_eq!(r.outcome, DispatchOutcome::Cancelled);
    assert_eq!(e.tasks.get(task.id).await.unwrap().status, TaskStatus::Stopped);
}

#[tokio::test]
async fn replies_go_out_through_the_channel() {
    let e = Engine::new().await;
    e.dispatcher
        .handle_event(ActorRole::Initiator, InboundEvent::text(TRAINER, "help"))
        .await;
    let sent = e.channel.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, TRAINER);
}

#[tokio::test]
async fn unknown_text_gets_help() {
    let e = Engine::new().await;
    let r = e.text(TRAINER, ActorRole::Initiator, "what's the weather", 0).await;
    assert_eq!(r.outcome, DispatchOutcome::Unrecognized);
    let r = e.text(TRAINER, ActorRole::Initiator, "help", 0).await;
    assert_eq!(r.outcome, DispatchOutcome::Help);
}

// ── Timeouts ────────────────────────────────────────────────────────

#[tokio::test]
async fn reminder_then_continue() {
    let mut e = Engine::new().await;
    e.text(TRAINER, ActorRole::Initiator, "register", 0).await;

    let summary = e.monitor.run_timeout_sweep(e.at(6)).await;
    assert_eq!(summary.reminded, 1);
    let task = e.tasks.get_running(TRAINER, ActorRole::Initiator).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.reminder_sent);
    assert_eq!(task.last_activity_at, e.at(0));

    let reminder = e.next_notification().await;
    assert_eq!(reminder.template, NotificationTemplate::TaskReminder);
    assert_eq!(reminder.data["task_type"], "registration");

    let r = e.tap(TRAINER, ActorRole::Initiator, "continue_task:registration", 7).await;
    assert_eq!(r.outcome, DispatchOutcome::Continued);
    let task = e.tasks.get_running(TRAINER, ActorRole::Initiator).await.unwrap().unwrap();
    assert_eq!(task.last_activity_at, e.at(7));
    assert_eq!(task.step(), "name");
}

#[tokio::test]
async fn restart_after_reminder_starts_over() {
    let e = Engine::new().await;
    e.text(TRAINER, ActorRole::Initiator, "register", 0).await;
    e.text(TRAINER, ActorRole::Initiator, "Sipho", 1).await;
    e.monitor.run_timeout_sweep(e.at(7)).await;

    let r = e.tap(TRAINER, ActorRole::Initiator, "restart_task:registration", 8).await;
    assert_eq!(r.outcome, DispatchOutcome::Started(TaskType::Registration));
    let task = e.tasks.get_running(TRAINER, ActorRole::Initiator).await.unwrap().unwrap();
    assert_eq!(task.step(), "name");
    assert!(!task.reminder_sent);
}

#[tokio::test]
async fn abandoned_task_resumes_with_identical_step_data() {
    let mut e = Engine::new().await;
    e.text(TRAINER, ActorRole::Initiator, "register", 0).await;
    e.text(TRAINER, ActorRole::Initiator, "Sipho", 1).await;
    let before = e.tasks.get_running(TRAINER, ActorRole::Initiator).await.unwrap().unwrap();

    assert_eq!(e.monitor.run_timeout_sweep(e.at(7)).await.reminded, 1);
    let summary = e.monitor.run_timeout_sweep(e.at(17)).await;
    assert_eq!(summary.abandoned, 1);
    assert_eq!(e.tasks.get(before.id).await.unwrap().status, TaskStatus::Abandoned);

    let snapshot = e
        .db
        .get_abandoned_snapshot(TRAINER, TaskType::Registration)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.step, "email");
    assert_eq!(e.next_notification().await.template, NotificationTemplate::TaskReminder);
    assert_eq!(e.next_notification().await.template, NotificationTemplate::TaskAbandoned);

    let events = e.db.list_events("task_abandoned").await.unwrap();
    assert_eq!(events[0]["reminder_sent"], true);
    assert_eq!(events[0]["last_step"], "email");

    let r = e.text(TRAINER, ActorRole::Initiator, "register", 60).await;
    assert_eq!(r.outcome, DispatchOutcome::ResumeOffered(TaskType::Registration));

    let r = e.tap(TRAINER, ActorRole::Initiator, "resume_task:registration", 61).await;
    assert_eq!(r.outcome, DispatchOutcome::Resumed(TaskType::Registration));
    let resumed = e.tasks.get_running(TRAINER, ActorRole::Initiator).await.unwrap().unwrap();
    assert_ne!(resumed.id, before.id);
    assert_eq!(resumed.step_data, before.step_data);
    assert!(
        e.db.get_abandoned_snapshot(TRAINER, TaskType::Registration)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn start_fresh_discards_the_snapshot() {
    let e = Engine::new().await;
    e.text(TRAINER, ActorRole::Initiator, "register", 0).await;
    e.text(TRAINER, ActorRole::Initiator, "Sipho", 1).await;
    e.monitor.run_timeout_sweep(e.at(20)).await;

    e.text(TRAINER, ActorRole::Initiator, "register", 30).await;
    let r = e.tap(TRAINER, ActorRole::Initiator, "start_fresh:registration", 31).await;
    assert_eq!(r.outcome, DispatchOutcome::Started(TaskType::Registration));
    let task = e.tasks.get_running(TRAINER, ActorRole::Initiator).await.unwrap().unwrap();
    assert_eq!(task.step_data, StepData::initial(TaskType::Registration));
    assert!(
        e.db.get_abandoned_snapshot(TRAINER, TaskType::Registration)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn expired_snapshot_is_not_offered() {
    let e = Engine::new().await;
    e.text(TRAINER, ActorRole::Initiator, "register", 0).await;
    e.text(TRAINER, ActorRole::Initiator, "Sipho", 1).await;
    e.monitor.run_timeout_sweep(e.at(20)).await;

    let r = e.text(TRAINER, ActorRole::Initiator, "register", 26 * 60).await;
    assert_eq!(r.outcome, DispatchOutcome::Started(TaskType::Registration));
    assert!(
        e.db.get_abandoned_snapshot(TRAINER, TaskType::Registration)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn stale_abandon_loses_to_live_update() {
    let e = Engine::new().await;
    e.text(TRAINER, ActorRole::Initiator, "register", 0).await;
    let stale = e.tasks.get_running(TRAINER, ActorRole::Initiator).await.unwrap().unwrap();

    e.text(TRAINER, ActorRole::Initiator, "Sipho", 16).await;
    assert!(!e.tasks.abandon(&stale, e.at(16)).await.unwrap());

    let task = e.tasks.get(stale.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.step(), "email");
}

// ── Invitations ─────────────────────────────────────────────────────

#[tokio::test]
async fn invited_client_accepts_and_completes_profile() {
    let mut e = Engine::new().await;
    let token = e.invite_thabo("invitee_completes_profile").await;
    let invitation = e.db.get_invitation(&token).await.unwrap().unwrap();
    assert_eq!(invitation.status, InvitationStatus::PendingTargetCompletion);
    assert_eq!(invitation.to_contact, CLIENT);

    // Unknown numbers resolve to the initiator role on first contact.
    let r = e
        .tap(CLIENT, ActorRole::Initiator, &format!("accept_invitation:{token}"), 5)
        .await;
    assert_eq!(r.outcome, DispatchOutcome::InvitationAccepted);
    assert_eq!(r.replies.len(), 1);

    let edge = e.graph.edge(TRAINER, CLIENT).await.unwrap().unwrap();
    assert_eq!(edge.connection_status, ConnectionStatus::Active);
    let to_trainer = e.next_notification().await;
    assert_eq!(to_trainer.actor_key, TRAINER);
    assert_eq!(to_trainer.template, NotificationTemplate::InvitationAccepted);
    let to_client = e.next_notification().await;
    assert_eq!(to_client.actor_key, CLIENT);
    assert_eq!(to_client.template, NotificationTemplate::InvitationConnected);

    let task = e.tasks.get_running(CLIENT, ActorRole::Target).await.unwrap().unwrap();
    assert_eq!(task.task_type, TaskType::Registration);
    assert_eq!(task.step(), "email");

    let r = e.text(CLIENT, ActorRole::Target, "skip", 6).await;
    assert_eq!(r.outcome, DispatchOutcome::Advanced);
    let r = e.tap(CLIENT, ActorRole::Target, "choice:yes", 7).await;
    assert_eq!(r.outcome, DispatchOutcome::Completed(TaskType::Registration));

    let client = e.db.get_actor(CLIENT).await.unwrap().unwrap();
    assert_eq!(client.name, "Thabo");
    assert_eq!(client.role, ActorRole::Target);
    assert!(client.profile_complete);

    // A second tap is answered from the stored acceptance.
    let again = e
        .tap(CLIENT, ActorRole::Target, &format!("accept_invitation:{token}"), 8)
        .await;
    assert_eq!(again.outcome, DispatchOutcome::InvitationAccepted);
    assert_eq!(again.replies.len(), 1);
    assert!(again.replies[0].body().contains("already connected"));
    assert!(e.notifications.try_recv().is_err());
}

#[tokio::test]
async fn inviter_supplied_details_create_the_client() {
    let mut e = Engine::new().await;
    let token = e.invite_thabo("inviter_supplies_data").await;

    let r = e
        .tap(CLIENT, ActorRole::Initiator, &format!("accept_invitation:{token}"), 5)
        .await;
    assert_eq!(r.outcome, DispatchOutcome::InvitationAccepted);
    assert!(r.replies.is_empty());
    assert_eq!(e.next_notification().await.template, NotificationTemplate::InvitationAccepted);
    let to_client = e.next_notification().await;
    assert_eq!(to_client.actor_key, CLIENT);
    assert_eq!(to_client.template, NotificationTemplate::InvitationConnected);

    let client = e.db.get_actor(CLIENT).await.unwrap().unwrap();
    assert_eq!(client.email.as_deref(), Some("thabo@example.com"));
    assert!(client.profile_complete);
    assert!(e.tasks.get_running(CLIENT, ActorRole::Target).await.unwrap().is_none());
}

#[tokio::test]
async fn declining_leaves_no_connection() {
    let mut e = Engine::new().await;
    let token = e.invite_thabo("invitee_completes_profile").await;
    let edges_before = e.db.count_edges().await.unwrap();

    let r = e
        .tap(CLIENT, ActorRole::Initiator, &format!("decline_invitation:{token}"), 5)
        .await;
    assert_eq!(r.outcome, DispatchOutcome::InvitationDeclined);

    let invitation = e.db.get_invitation(&token).await.unwrap().unwrap();
    assert_eq!(invitation.status, InvitationStatus::Declined);
    let edge = e.graph.edge(TRAINER, CLIENT).await.unwrap().unwrap();
    assert_eq!(edge.connection_status, ConnectionStatus::Declined);
    assert_eq!(e.db.count_edges().await.unwrap(), edges_before);
    assert!(e.db.get_actor(CLIENT).await.unwrap().is_none());
    assert_eq!(e.next_notification().await.template, NotificationTemplate::InvitationDeclined);
}

#[tokio::test]
async fn only_the_invited_contact_can_accept() {
    let mut e = Engine::new().await;
    let token = e.invite_thabo("invitee_completes_profile").await;

    let r = e
        .tap("27840000009", ActorRole::Initiator, &format!("accept_invitation:{token}"), 5)
        .await;
    assert_eq!(r.outcome, DispatchOutcome::Failed { kind: "invalid_state" });
    let invitation = e.db.get_invitation(&token).await.unwrap().unwrap();
    assert_eq!(invitation.status, InvitationStatus::PendingTargetCompletion);
}

#[tokio::test]
async fn existing_client_is_reported_already_connected() {
    let e = Engine::new().await;
    e.db
        .upsert_actor(&Actor::new(CLIENT, ActorRole::Target, "Thabo"))
        .await
        .unwrap();
    e.graph.activate(TRAINER, CLIENT, e.at(0)).await.unwrap();
    let edges_before = e.db.count_edges().await.unwrap();

    e.text(TRAINER, ActorRole::Initiator, "add client", 1).await;
    e.text(TRAINER, ActorRole::Initiator, "Thabo", 1).await;
    let r = e.text(TRAINER, ActorRole::Initiator, CLIENT, 1).await;
    assert_eq!(r.outcome, DispatchOutcome::Completed(TaskType::AddClient));
    assert!(r.replies[0].body().contains("already your client"));
    assert_eq!(e.db.count_edges().await.unwrap(), edges_before);
}

#[tokio::test]
async fn client_of_several_trainers_is_reported_already_connected() {
    let mut e = Engine::new().await;
    e.db
        .upsert_actor(&Actor::new(CLIENT, ActorRole::Target, "Thabo"))
        .await
        .unwrap();
    e.graph.activate("27820000005", CLIENT, e.at(0)).await.unwrap();
    e.graph.activate(TRAINER, CLIENT, e.at(0)).await.unwrap();

    e.text(TRAINER, ActorRole::Initiator, "add client", 1).await;
    e.text(TRAINER, ActorRole::Initiator, "Thabo", 1).await;
    let r = e.text(TRAINER, ActorRole::Initiator, CLIENT, 1).await;
    assert_eq!(r.outcome, DispatchOutcome::Completed(TaskType::AddClient));
    assert!(r.replies[0].body().contains("already your client"));
    assert!(e.notifications.try_recv().is_err());
    assert_eq!(e.db.expire_invitations(e.at(60 * 24 * 365)).await.unwrap(), 0);
    assert_eq!(e.db.count_edges().await.unwrap(), 2);
}

#[tokio::test]
async fn repeated_add_client_reuses_the_open_invitation() {
    let mut e = Engine::new().await;
    let first = e.invite_thabo("invitee_completes_profile").await;

    e.text(TRAINER, ActorRole::Initiator, "add client", 1).await;
    e.text(TRAINER, ActorRole::Initiator, "Thabo", 1).await;
    e.text(TRAINER, ActorRole::Initiator, CLIENT, 1).await;
    let r = e
        .tap(TRAINER, ActorRole::Initiator, "choice:invitee_completes_profile", 1)
        .await;
    assert_eq!(r.outcome, DispatchOutcome::Completed(TaskType::AddClient));
    assert!(e.notifications.try_recv().is_err());
    assert_eq!(e.db.expire_invitations(e.at(60 * 24 * 365)).await.unwrap(), 1);
    assert_eq!(e.db.get_invitation(&first).await.unwrap().unwrap().status, InvitationStatus::Expired);
}

// ── Roles ───────────────────────────────────────────────────────────

#[tokio::test]
async fn resume_buttons_are_gated_before_touching_state() {
    let e = Engine::new().await;
    e.text(CLIENT, ActorRole::Target, "log habit", 0).await;
    let running = e.tasks.get_running(CLIENT, ActorRole::Target).await.unwrap().unwrap();

    for button in ["restart_task:add_client", "start_fresh:add_client", "resume_task:add_client"] {
        let r = e.tap(CLIENT, ActorRole::Target, button, 1).await;
        assert_eq!(r.outcome, DispatchOutcome::Denied(TaskType::AddClient), "{button}");
    }
    let still = e.tasks.get_running(CLIENT, ActorRole::Target).await.unwrap().unwrap();
    assert_eq!(still.id, running.id);
    assert_eq!(still.status, TaskStatus::Running);
}

#[tokio::test]
async fn task_types_are_gated_by_role() {
    let e = Engine::new().await;
    let r = e.text(CLIENT, ActorRole::Target, "add client", 0).await;
    assert_eq!(r.outcome, DispatchOutcome::Denied(TaskType::AddClient));
    let r = e.text(TRAINER, ActorRole::Initiator, "log habit", 0).await;
    assert_eq!(r.outcome, DispatchOutcome::Denied(TaskType::LogHabit));
    assert!(e.tasks.get_running(CLIENT, ActorRole::Target).await.unwrap().is_none());
}

#[tokio::test]
async fn client_logs_a_habit() {
    let e = Engine::new().await;
    let r = e.text(CLIENT, ActorRole::Target, "log habit", 0).await;
    assert_eq!(r.outcome, DispatchOutcome::Started(TaskType::LogHabit));
    e.tap(CLIENT, ActorRole::Target, "choice:water", 1).await;
    let r = e.text(CLIENT, ActorRole::Target, "2.5", 2).await;
    assert_eq!(r.outcome, DispatchOutcome::Completed(TaskType::LogHabit));

    let logs = e.db.list_habit_logs(CLIENT).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].habit, "water");
    assert_eq!(logs[0].value, 2.5);
}

#[tokio::test]
async fn roles_keep_separate_tasks() {
    let e = Engine::new().await;
    e.text(TRAINER, ActorRole::Initiator, "register", 0).await;
    let r = e.text(TRAINER, ActorRole::Target, "log habit", 0).await;
    assert_eq!(r.outcome, DispatchOutcome::Started(TaskType::LogHabit));
    assert_eq!(e.db.count_running_tasks(TRAINER, ActorRole::Initiator).await.unwrap(), 1);
    assert_eq!(e.db.count_running_tasks(TRAINER, ActorRole::Target).await.unwrap(), 1);
}
