//! `SessionActor` - the session state machine for one client.
//!
//! The actor exclusively owns the lifecycle phase, the participant
//! registry, chat state and media bookkeeping. It multiplexes three inputs:
//!
//! - commands from [`SessionHandle`]
//! - notifications from the collaborators ([`EngineEvent`])
//! - completions of collaborator calls it spawned
//!
//! ```text
//! Idle ──join──▶ Connecting ──ok──▶ InMeeting ◀──connected── Reconnecting
//!  ▲                 │                 │  └──reconnecting(reason)──▲
//!  └──── failure ────┘                 └──── leave / closed ────▶ Closed
//! ```
//!
//! A collaborator call never blocks the mailbox: a pending `join` or an
//! outstanding privilege acknowledgement leaves the actor free to process
//! roster and connection notifications. Notifications that arrive while a
//! join is still connecting are held and replayed over the join roster.

use super::messages::{
    AdminAction, Completion, Reply, SessionMessage, SessionQuery, SessionStatus,
};
use super::metrics::{ActorType, MailboxMonitor};
use crate::chat::{ChatState, ChatTarget};
use crate::config::Config;
use crate::engine::{
    EngineError, EngineEvent, JoinAccepted, JoinRequest, MediaEngine, SessionTransport,
};
use crate::errors::SdkError;
use crate::events::{kinds, ChatPrivilegePayload, EventBus, SharePrivilegePayload};
use crate::media::{MediaCommand, MediaOp, MediaState};
use crate::observability::metrics as sdk_metrics;
use crate::registry::ParticipantRegistry;
use crate::types::{
    ChatMessage, ChatParty, ChatPrivilege, CloseReason, ConnectionState, DependentAssets,
    Participant, SessionInfo, SessionPhase, UserId,
};
use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Maximum display name length in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// Handle to the `SessionActor`.
///
/// Cheap to clone. Every method round-trips through the actor mailbox.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    mailbox: Arc<MailboxMonitor>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("mailbox_depth", &self.mailbox.current_depth())
            .field("is_cancelled", &self.cancel_token.is_cancelled())
            .finish()
    }
}

impl SessionHandle {
    async fn send<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, SdkError> {
        let (tx, rx) = oneshot::channel();

        self.mailbox.record_enqueue();
        if let Err(e) = self.sender.send(build(tx)).await {
            self.mailbox.record_send_failed();
            return Err(SdkError::Internal(format!("channel send failed: {e}")));
        }

        rx.await
            .map_err(|e| SdkError::Internal(format!("response receive failed: {e}")))
    }

    /// Send a fallible command and record its outcome.
    async fn command<T>(
        &self,
        command: &'static str,
        build: impl FnOnce(Reply<T>) -> SessionMessage,
    ) -> Result<T, SdkError> {
        let started = Instant::now();
        let result = match self.send(build).await {
            Ok(inner) => inner,
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.error_code(),
        };
        sdk_metrics::record_command(command, outcome, started.elapsed());
        result
    }

    async fn query<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionQuery,
    ) -> Result<T, SdkError> {
        self.send(|tx| SessionMessage::Query(build(tx))).await
    }

    pub async fn init(&self, locale: String, assets: DependentAssets) -> Result<(), SdkError> {
        self.command("init", |respond_to| SessionMessage::Init {
            locale,
            assets,
            respond_to,
        })
        .await
    }

    /// Join a session. Resolves when the session layer accepts or refuses;
    /// there is no client-side timeout.
    pub async fn join(&self, request: JoinRequest) -> Result<SessionInfo, SdkError> {
        self.command("join", |respond_to| SessionMessage::Join {
            request,
            respond_to,
        })
        .await
    }

    pub async fn leave(&self, end_session: bool) -> Result<(), SdkError> {
        self.command("leave", |respond_to| SessionMessage::Leave {
            end_session,
            respond_to,
        })
        .await
    }

    pub async fn change_name(
        &self,
        display_name: String,
        user_id: Option<UserId>,
    ) -> Result<(), SdkError> {
        self.command("change_name", |respond_to| SessionMessage::ChangeName {
            display_name,
            user_id,
            respond_to,
        })
        .await
    }

    pub async fn admin(&self, action: AdminAction, user_id: UserId) -> Result<(), SdkError> {
        self.command(action.as_str(), |respond_to| SessionMessage::Admin {
            action,
            user_id,
            respond_to,
        })
        .await
    }

    pub async fn send_chat(&self, text: String, target: ChatTarget) -> Result<ChatMessage, SdkError> {
        self.command("send_chat", |respond_to| SessionMessage::SendChat {
            text,
            target,
            respond_to,
        })
        .await
    }

    pub async fn change_chat_privilege(&self, privilege: ChatPrivilege) -> Result<(), SdkError> {
        self.command("change_privilege", |respond_to| {
            SessionMessage::ChangeChatPrivilege {
                privilege,
                respond_to,
            }
        })
        .await
    }

    pub async fn media(&self, command: MediaCommand) -> Result<(), SdkError> {
        self.command(command.op().as_str(), |respond_to| SessionMessage::Media {
            command,
            respond_to,
        })
        .await
    }

    pub async fn status(&self) -> Result<SessionStatus, SdkError> {
        self.query(|respond_to| SessionQuery::Status { respond_to })
            .await
    }

    pub async fn session_info(&self) -> Result<Option<SessionInfo>, SdkError> {
        self.query(|respond_to| SessionQuery::SessionInfo { respond_to })
            .await
    }

    pub async fn current_user(&self) -> Result<Option<Participant>, SdkError> {
        self.query(|respond_to| SessionQuery::CurrentUser { respond_to })
            .await
    }

    pub async fn all_users(&self) -> Result<Vec<Participant>, SdkError> {
        self.query(|respond_to| SessionQuery::AllUsers { respond_to })
            .await
    }

    pub async fn user(&self, user_id: UserId) -> Result<Option<Participant>, SdkError> {
        self.query(|respond_to| SessionQuery::User {
            user_id,
            respond_to,
        })
        .await
    }

    pub async fn host(&self) -> Result<Option<Participant>, SdkError> {
        self.query(|respond_to| SessionQuery::Host { respond_to })
            .await
    }

    pub async fn chat_privilege(&self) -> Result<ChatPrivilege, SdkError> {
        self.query(|respond_to| SessionQuery::ChatPrivilege { respond_to })
            .await
    }

    pub async fn chat_history(&self) -> Result<Vec<ChatMessage>, SdkError> {
        self.query(|respond_to| SessionQuery::ChatHistory { respond_to })
            .await
    }

    pub async fn chat_receivers(&self) -> Result<Vec<ChatParty>, SdkError> {
        self.query(|respond_to| SessionQuery::ChatReceivers { respond_to })
            .await
    }

    pub async fn media_state(&self) -> Result<MediaState, SdkError> {
        self.query(|respond_to| SessionQuery::MediaState { respond_to })
            .await
    }

    /// Cancel the actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Identity of the joined session.
#[derive(Debug)]
struct JoinedSession {
    topic: String,
    session_id: String,
    user_id: UserId,
    password_protected: bool,
}

#[derive(Debug)]
struct PendingPrivilege {
    seq: u64,
    requested: ChatPrivilege,
    respond_to: Reply<()>,
}

/// Reply with an error and log the rejection.
fn reject<T>(respond_to: Reply<T>, operation: &'static str, err: SdkError) {
    debug!(
        target: "sdk.actor.session",
        operation,
        error_code = err.error_code(),
        error = %err,
        "Command rejected"
    );
    let _ = respond_to.send(Err(err));
}

fn validate_display_name(name: &str) -> Result<(), SdkError> {
    if name.trim().is_empty() {
        return Err(SdkError::InvalidParameters(
            "display name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(SdkError::InvalidParameters(format!(
            "display name exceeds {MAX_DISPLAY_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_join(request: &JoinRequest) -> Result<(), SdkError> {
    if request.topic.trim().is_empty() {
        return Err(SdkError::InvalidParameters(
            "topic must not be empty".to_string(),
        ));
    }
    if request.token.expose_secret().trim().is_empty() {
        return Err(SdkError::InvalidParameters(
            "token must not be empty".to_string(),
        ));
    }
    if let Some(password) = &request.password {
        if password.expose_secret().is_empty() {
            return Err(SdkError::InvalidParameters(
                "password must not be empty when provided".to_string(),
            ));
        }
    }
    validate_display_name(&request.user_name)
}

/// The session actor.
pub struct SessionActor {
    receiver: mpsc::Receiver<SessionMessage>,
    engine_events: mpsc::Receiver<EngineEvent>,
    engine_open: bool,
    completions: mpsc::UnboundedReceiver<Completion>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    cancel_token: CancellationToken,
    transport: Arc<dyn SessionTransport>,
    media_engine: Arc<dyn MediaEngine>,
    bus: EventBus,
    mailbox: Arc<MailboxMonitor>,
    privilege_ack_timeout: Duration,

    initialized: bool,
    init_in_progress: bool,
    phase: SessionPhase,
    connection: Option<ConnectionState>,
    join_attempt: u64,
    pending_join: Option<Reply<SessionInfo>>,
    /// Notifications received while `Connecting`, replayed once the join
    /// roster is installed.
    join_backlog: Vec<EngineEvent>,
    session: Option<JoinedSession>,
    registry: ParticipantRegistry,
    chat: ChatState,
    privilege_seq: u64,
    pending_privilege: Option<PendingPrivilege>,
    media: MediaState,
    media_in_flight: HashSet<MediaOp>,
}

impl SessionActor {
    /// Spawn the session actor.
    ///
    /// `cancel_token` should be a child of the client's root token.
    pub fn spawn(
        config: &Config,
        transport: Arc<dyn SessionTransport>,
        media_engine: Arc<dyn MediaEngine>,
        engine_events: mpsc::Receiver<EngineEvent>,
        bus: EventBus,
        cancel_token: CancellationToken,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.command_channel_buffer);
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Session));

        let actor = Self {
            receiver,
            engine_events,
            engine_open: true,
            completions,
            completion_tx,
            cancel_token: cancel_token.clone(),
            transport,
            media_engine,
            bus,
            mailbox: Arc::clone(&mailbox),
            privilege_ack_timeout: config.privilege_ack_timeout,
            initialized: false,
            init_in_progress: false,
            phase: SessionPhase::Idle,
            connection: None,
            join_attempt: 0,
            pending_join: None,
            join_backlog: Vec::new(),
            session: None,
            registry: ParticipantRegistry::new(),
            chat: ChatState::new(config.chat_history_limit),
            privilege_seq: 0,
            pending_privilege: None,
            media: MediaState::default(),
            media_in_flight: HashSet::new(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionHandle {
            sender,
            mailbox,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "sdk.actor.session")]
    async fn run(mut self) {
        info!(target: "sdk.actor.session", "SessionActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sdk.actor.session",
                        phase = %self.phase,
                        "SessionActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue();
                            self.handle_message(message);
                        }
                        None => {
                            info!(
                                target: "sdk.actor.session",
                                "SessionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }

                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion);
                }

                event = self.engine_events.recv(), if self.engine_open => {
                    match event {
                        Some(event) => self.handle_engine_event(event),
                        None => {
                            warn!(
                                target: "sdk.actor.session",
                                "Engine notification channel closed"
                            );
                            self.engine_open = false;
                        }
                    }
                }
            }
        }

        info!(
            target: "sdk.actor.session",
            phase = %self.phase,
            participants = self.registry.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionActor stopped"
        );
    }

    /// Run a collaborator call off the actor and feed its result back.
    fn spawn_call<F>(&self, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let completion = call.await;
            let _ = completions.send(completion);
        });
    }

    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Init {
                locale,
                assets,
                respond_to,
            } => self.handle_init(locale, assets, respond_to),

            SessionMessage::Join {
                request,
                respond_to,
            } => self.handle_join(request, respond_to),

            SessionMessage::Leave {
                end_session,
                respond_to,
            } => {
                let result = self.handle_leave(end_session);
                let _ = respond_to.send(result);
            }

            SessionMessage::ChangeName {
                display_name,
                user_id,
                respond_to,
            } => self.handle_change_name(display_name, user_id, respond_to),

            SessionMessage::Admin {
                action,
                user_id,
                respond_to,
            } => self.handle_admin(action, user_id, respond_to),

            SessionMessage::SendChat {
                text,
                target,
                respond_to,
            } => self.handle_send_chat(&text, target, respond_to),

            SessionMessage::ChangeChatPrivilege {
                privilege,
                respond_to,
            } => self.handle_change_privilege(privilege, respond_to),

            SessionMessage::Media {
                command,
                respond_to,
            } => self.handle_media(command, respond_to),

            SessionMessage::Query(query) => self.handle_query(query),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn handle_init(&mut self, locale: String, assets: DependentAssets, respond_to: Reply<()>) {
        if self.initialized {
            debug!(target: "sdk.actor.session", phase = %self.phase, "Already initialized");
            let _ = respond_to.send(Ok(()));
            return;
        }
        if self.init_in_progress {
            return reject(respond_to, "init", SdkError::DuplicateOperation("init"));
        }
        if locale.trim().is_empty() {
            return reject(
                respond_to,
                "init",
                SdkError::InvalidParameters("locale must not be empty".to_string()),
            );
        }

        self.init_in_progress = true;
        debug!(
            target: "sdk.actor.session",
            locale = %locale,
            assets = %assets,
            "Initializing session layer"
        );

        let transport = Arc::clone(&self.transport);
        self.spawn_call(async move {
            let result = transport.initialize(&locale, &assets).await;
            Completion::Init { result, respond_to }
        });
    }

    fn handle_join(&mut self, request: JoinRequest, respond_to: Reply<SessionInfo>) {
        if !self.initialized {
            return reject(respond_to, "join", SdkError::NotInitialized);
        }
        match self.phase {
            SessionPhase::Idle => {}
            SessionPhase::Connecting | SessionPhase::InMeeting | SessionPhase::Reconnecting => {
                return reject(respond_to, "join", SdkError::DuplicateOperation("join"));
            }
            SessionPhase::Closed => {
                return reject(respond_to, "join", SdkError::invalid_state("join", self.phase));
            }
        }
        if let Err(err) = validate_join(&request) {
            return reject(respond_to, "join", err);
        }

        self.join_attempt += 1;
        let attempt = self.join_attempt;
        self.phase = SessionPhase::Connecting;
        self.pending_join = Some(respond_to);

        info!(
            target: "sdk.actor.session",
            topic = %request.topic,
            attempt,
            "Joining session"
        );

        let topic = request.topic.clone();
        let password_protected = request.password.is_some();
        let transport = Arc::clone(&self.transport);
        self.spawn_call(async move {
            let result = transport.join(request).await;
            Completion::Join {
                attempt,
                result,
                password_protected,
                topic,
            }
        });
    }

    fn handle_leave(&mut self, end_session: bool) -> Result<(), SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        match self.phase {
            SessionPhase::Closed => {
                debug!(target: "sdk.actor.session", "Leave while closed ignored");
                return Ok(());
            }
            SessionPhase::Idle => return Err(SdkError::invalid_state("leave", self.phase)),
            SessionPhase::Connecting | SessionPhase::InMeeting | SessionPhase::Reconnecting => {}
        }

        if end_session && !self.local_participant().is_some_and(|me| me.is_host) {
            return Err(SdkError::InsufficientPrivilege(
                "only the host can end the session".to_string(),
            ));
        }

        if let Some(pending) = self.pending_join.take() {
            let _ = pending.send(Err(SdkError::invalid_state("join", SessionPhase::Closed)));
        }

        info!(target: "sdk.actor.session", end_session, "Leaving session");
        self.close(None);

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.leave(end_session).await {
                warn!(
                    target: "sdk.actor.session",
                    error = %e,
                    "Session layer leave failed"
                );
            }
        });

        Ok(())
    }

    fn on_join_completed(
        &mut self,
        attempt: u64,
        result: Result<JoinAccepted, EngineError>,
        password_protected: bool,
        topic: String,
    ) {
        if attempt != self.join_attempt || self.phase != SessionPhase::Connecting {
            debug!(
                target: "sdk.actor.session",
                attempt,
                phase = %self.phase,
                "Stale join result dropped"
            );
            return;
        }
        let Some(respond_to) = self.pending_join.take() else {
            return;
        };

        match result {
            Ok(accepted) => {
                self.phase = SessionPhase::InMeeting;
                self.registry.reset(accepted.participants);
                if !self.registry.contains(accepted.user_id) {
                    warn!(
                        target: "sdk.actor.session",
                        user_id = %accepted.user_id,
                        "Join roster does not contain the local participant"
                    );
                }
                self.chat.reset(accepted.chat_privilege);
                self.media = MediaState::new(accepted.share_privilege);
                self.media_in_flight.clear();
                self.session = Some(JoinedSession {
                    topic,
                    session_id: accepted.session_id,
                    user_id: accepted.user_id,
                    password_protected,
                });
                sdk_metrics::set_participants(self.registry.len());

                info!(
                    target: "sdk.actor.session",
                    user_id = %accepted.user_id,
                    participants = self.registry.len(),
                    "Joined session"
                );
                self.publish_connection(ConnectionState::Connected);
                self.replay_join_backlog();

                let reply = self
                    .session_info()
                    .ok_or_else(|| SdkError::Internal("session info missing after join".to_string()));
                let _ = respond_to.send(reply);
            }
            Err(err) => {
                self.phase = SessionPhase::Idle;
                self.join_backlog.clear();
                warn!(
                    target: "sdk.actor.session",
                    error = %err,
                    "Join failed"
                );
                let _ = respond_to.send(Err(err.into()));
            }
        }
    }

    fn replay_join_backlog(&mut self) {
        let backlog = std::mem::take(&mut self.join_backlog);
        if !backlog.is_empty() {
            debug!(
                target: "sdk.actor.session",
                count = backlog.len(),
                "Replaying notifications received while connecting"
            );
        }
        for event in backlog {
            self.handle_engine_event(event);
        }
    }

    /// Enter `Closed`, dropping session state.
    fn close(&mut self, reason: Option<CloseReason>) {
        self.phase = SessionPhase::Closed;
        self.join_backlog.clear();
        self.registry.clear();
        self.session = None;
        if let Some(pending) = self.pending_privilege.take() {
            let _ = pending.respond_to.send(Err(SdkError::invalid_state(
                "change_privilege",
                SessionPhase::Closed,
            )));
        }
        sdk_metrics::set_participants(0);
        self.publish_connection(ConnectionState::Closed(reason));
    }

    fn publish_connection(&mut self, state: ConnectionState) {
        self.connection = Some(state);
        sdk_metrics::record_connection_transition(state.as_str());
        debug!(
            target: "sdk.actor.session",
            state = state.as_str(),
            phase = %self.phase,
            "Connection state published"
        );
        self.bus.emit_typed::<kinds::ConnectionChange>(state);
    }

    fn on_connection_changed(&mut self, state: ConnectionState) {
        match (self.phase, state) {
            (
                SessionPhase::InMeeting | SessionPhase::Reconnecting,
                ConnectionState::Reconnecting(reason),
            ) => {
                info!(
                    target: "sdk.actor.session",
                    reason = ?reason,
                    "Session reconnecting"
                );
                self.phase = SessionPhase::Reconnecting;
                self.publish_connection(state);
            }
            (SessionPhase::Reconnecting, ConnectionState::Connected) => {
                info!(target: "sdk.actor.session", "Session reconnected");
                self.phase = SessionPhase::InMeeting;
                self.publish_connection(state);
            }
            (SessionPhase::Connecting, ConnectionState::Closed(reason)) => {
                if let Some(pending) = self.pending_join.take() {
                    let _ = pending.send(Err(SdkError::invalid_state("join", SessionPhase::Closed)));
                }
                self.close(reason);
            }
            (
                SessionPhase::InMeeting | SessionPhase::Reconnecting,
                ConnectionState::Closed(reason),
            ) => {
                info!(
                    target: "sdk.actor.session",
                    reason = ?reason,
                    "Session closed by remote"
                );
                self.close(reason);
            }
            (phase, state) => {
                debug!(
                    target: "sdk.actor.session",
                    phase = %phase,
                    state = state.as_str(),
                    "Connection change ignored"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Roles and administration
    // ------------------------------------------------------------------

    fn in_session(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::InMeeting | SessionPhase::Reconnecting
        )
    }

    fn local_participant(&self) -> Option<&Participant> {
        self.session
            .as_ref()
            .and_then(|session| self.registry.get(session.user_id))
    }

    /// The local participant, if commands are accepted right now.
    fn require_in_meeting(&self, operation: &'static str) -> Result<&Participant, SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        if self.phase != SessionPhase::InMeeting {
            return Err(SdkError::invalid_state(operation, self.phase));
        }
        self.local_participant().ok_or_else(|| {
            SdkError::Internal("local participant missing from roster".to_string())
        })
    }

    fn authorize_rename(&self, name: &str, user_id: Option<UserId>) -> Result<UserId, SdkError> {
        let me = self.require_in_meeting("change_name")?;
        validate_display_name(name)?;

        let target = user_id.unwrap_or(me.user_id);
        if target == me.user_id {
            return Ok(target);
        }
        if !me.is_privileged() {
            return Err(SdkError::InsufficientPrivilege(
                "only host or manager can rename other participants".to_string(),
            ));
        }
        if !self.registry.contains(target) {
            return Err(SdkError::UserNotFound(target));
        }
        Ok(target)
    }

    fn handle_change_name(
        &mut self,
        display_name: String,
        user_id: Option<UserId>,
        respond_to: Reply<()>,
    ) {
        let target = match self.authorize_rename(&display_name, user_id) {
            Ok(target) => target,
            Err(err) => return reject(respond_to, "change_name", err),
        };

        // The roster changes when the session layer reports `user-updated`.
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let result = transport
                .rename(target, &display_name)
                .await
                .map_err(SdkError::from);
            let _ = respond_to.send(result);
        });
    }

    fn authorize_admin(&self, action: AdminAction, target: UserId) -> Result<(), SdkError> {
        let me = self.require_in_meeting(action.as_str())?;

        if target == me.user_id {
            return Err(SdkError::InvalidParameters(format!(
                "{} cannot target the local participant",
                action.as_str()
            )));
        }

        match action {
            AdminAction::RemoveUser if !me.is_privileged() => {
                return Err(SdkError::InsufficientPrivilege(
                    "only host or manager can remove participants".to_string(),
                ));
            }
            AdminAction::MakeHost | AdminAction::MakeManager | AdminAction::RevokeManager
                if !me.is_host =>
            {
                return Err(SdkError::InsufficientPrivilege(
                    "only the host can change roles".to_string(),
                ));
            }
            _ => {}
        }

        let target_participant = self
            .registry
            .get(target)
            .ok_or(SdkError::UserNotFound(target))?;

        match action {
            AdminAction::RemoveUser if target_participant.is_host && !me.is_host => {
                Err(SdkError::InsufficientPrivilege(
                    "a manager cannot remove the host".to_string(),
                ))
            }
            AdminAction::RevokeManager if !target_participant.is_manager => Err(
                SdkError::InvalidParameters(format!("participant {target} is not a manager")),
            ),
            _ => Ok(()),
        }
    }

    fn handle_admin(&mut self, action: AdminAction, user_id: UserId, respond_to: Reply<()>) {
        if let Err(err) = self.authorize_admin(action, user_id) {
            return reject(respond_to, action.as_str(), err);
        }

        info!(
            target: "sdk.actor.session",
            action = action.as_str(),
            user_id = %user_id,
            "Administrative command forwarded"
        );

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let result = match action {
                AdminAction::RemoveUser => transport.remove_user(user_id).await,
                AdminAction::MakeHost => transport.make_host(user_id).await,
                AdminAction::MakeManager => transport.make_manager(user_id).await,
                AdminAction::RevokeManager => transport.revoke_manager(user_id).await,
            };
            let _ = respond_to.send(result.map_err(SdkError::from));
        });
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    fn handle_send_chat(&mut self, text: &str, target: ChatTarget, respond_to: Reply<ChatMessage>) {
        let composed = self
            .require_in_meeting("send_chat")
            .map(|me| me.user_id)
            .and_then(|self_id| self.chat.compose(&self.registry, self_id, target, text));

        let message = match composed {
            Ok(message) => message,
            Err(err) => return reject(respond_to, "send_chat", err),
        };

        debug!(
            target: "sdk.chat",
            message_id = %message.id,
            broadcast = message.is_broadcast(),
            "Sending chat message"
        );

        let transport = Arc::clone(&self.transport);
        self.spawn_call(async move {
            let result = transport.send_chat(&message).await;
            Completion::ChatSent {
                message,
                result,
                respond_to,
            }
        });
    }

    fn on_chat_sent(
        &mut self,
        message: ChatMessage,
        result: Result<(), EngineError>,
        respond_to: Reply<ChatMessage>,
    ) {
        match result {
            Ok(()) => {
                if self.in_session() {
                    self.chat.record(message.clone());
                }
                let _ = respond_to.send(Ok(message));
            }
            Err(err) => {
                warn!(
                    target: "sdk.chat",
                    message_id = %message.id,
                    error = %err,
                    "Chat send failed"
                );
                let _ = respond_to.send(Err(err.into()));
            }
        }
    }

    fn authorize_privilege_change(&self) -> Result<(), SdkError> {
        let me = self.require_in_meeting("change_privilege")?;
        if !me.is_privileged() {
            return Err(SdkError::InsufficientPrivilege(
                "only host or manager can change chat privilege".to_string(),
            ));
        }
        if self.pending_privilege.is_some() {
            return Err(SdkError::DuplicateOperation("change_privilege"));
        }
        Ok(())
    }

    fn handle_change_privilege(&mut self, privilege: ChatPrivilege, respond_to: Reply<()>) {
        if let Err(err) = self.authorize_privilege_change() {
            return reject(respond_to, "change_privilege", err);
        }

        self.privilege_seq += 1;
        let seq = self.privilege_seq;
        self.pending_privilege = Some(PendingPrivilege {
            seq,
            requested: privilege,
            respond_to,
        });

        info!(
            target: "sdk.chat",
            privilege = privilege.code(),
            "Changing chat privilege"
        );

        let transport = Arc::clone(&self.transport);
        self.spawn_call(async move {
            let result = transport.set_chat_privilege(privilege).await;
            Completion::PrivilegePropagated { seq, result }
        });

        let timeout = self.privilege_ack_timeout;
        let cancel_token = self.cancel_token.clone();
        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel_token.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    let _ = completions.send(Completion::PrivilegeAckTimeout { seq });
                }
            }
        });
    }

    fn take_pending_privilege(&mut self, seq: u64) -> Option<PendingPrivilege> {
        if self.pending_privilege.as_ref().is_some_and(|p| p.seq == seq) {
            self.pending_privilege.take()
        } else {
            None
        }
    }

    fn on_chat_privilege_changed(&mut self, privilege: ChatPrivilege) {
        let changed = self.chat.set_privilege(privilege);

        let acknowledged = match self.pending_privilege.take() {
            Some(pending) if pending.requested == privilege => {
                let _ = pending.respond_to.send(Ok(()));
                true
            }
            other => {
                self.pending_privilege = other;
                false
            }
        };

        debug!(
            target: "sdk.chat",
            privilege = privilege.code(),
            changed,
            acknowledged,
            "Chat privilege reported"
        );

        if changed || acknowledged {
            self.bus
                .emit_typed::<kinds::ChatPrivilegeChange>(ChatPrivilegePayload {
                    chat_privilege: privilege,
                });
        }
    }

    // ------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------

    fn handle_media(&mut self, command: MediaCommand, respond_to: Reply<()>) {
        let op = command.op();
        let checked = self.require_in_meeting(op.as_str()).and_then(|me| {
            if self.media_in_flight.contains(&op) {
                return Err(SdkError::DuplicateOperation(op.as_str()));
            }
            self.media
                .check(&command, me, |id| self.registry.contains(id))
        });
        if let Err(err) = checked {
            return reject(respond_to, op.as_str(), err);
        }

        self.media_in_flight.insert(op);
        debug!(
            target: "sdk.media",
            command = op.as_str(),
            "Forwarding media command"
        );

        let engine = Arc::clone(&self.media_engine);
        self.spawn_call(async move {
            let result = match &command {
                MediaCommand::StartAudio => engine.start_audio().await,
                MediaCommand::StopAudio => engine.stop_audio().await,
                MediaCommand::MuteAudio(user_id) => engine.mute_audio(*user_id).await,
                MediaCommand::UnmuteAudio(user_id) => engine.unmute_audio(*user_id).await,
                MediaCommand::StartVideo => engine.start_video().await,
                MediaCommand::StopVideo => engine.stop_video().await,
                MediaCommand::SwitchCamera(device_id) => engine.switch_camera(device_id).await,
                MediaCommand::StartShare => engine.start_share().await,
                MediaCommand::StopShare => engine.stop_share().await,
                MediaCommand::PauseShare => engine.pause_share().await,
                MediaCommand::ResumeShare => engine.resume_share().await,
                MediaCommand::LockShare(privilege) => engine.set_share_privilege(*privilege).await,
            };
            Completion::Media {
                command,
                result,
                respond_to,
            }
        });
    }

    fn on_media_completed(
        &mut self,
        command: MediaCommand,
        result: Result<(), EngineError>,
        respond_to: Reply<()>,
    ) {
        let op = command.op();
        self.media_in_flight.remove(&op);

        match result {
            Ok(()) => {
                if let Some(self_id) = self.session.as_ref().map(|s| s.user_id) {
                    self.media.apply_success(&command, self_id);
                }
                let _ = respond_to.send(Ok(()));
            }
            Err(err) => {
                warn!(
                    target: "sdk.media",
                    command = op.as_str(),
                    error = %err,
                    "Media command failed"
                );
                let _ = respond_to.send(Err(err.into()));
            }
        }
    }

    // ------------------------------------------------------------------
    // Completions and notifications
    // ------------------------------------------------------------------

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Init { result, respond_to } => {
                self.init_in_progress = false;
                match result {
                    Ok(()) => {
                        self.initialized = true;
                        info!(target: "sdk.actor.session", "Session layer initialized");
                        let _ = respond_to.send(Ok(()));
                    }
                    Err(err) => {
                        warn!(
                            target: "sdk.actor.session",
                            error = %err,
                            "Initialization failed"
                        );
                        let _ = respond_to.send(Err(err.into()));
                    }
                }
            }

            Completion::Join {
                attempt,
                result,
                password_protected,
                topic,
            } => self.on_join_completed(attempt, result, password_protected, topic),

            Completion::ChatSent {
                message,
                result,
                respond_to,
            } => self.on_chat_sent(message, result, respond_to),

            Completion::PrivilegePropagated { seq, result } => {
                if let Err(err) = result {
                    if let Some(pending) = self.take_pending_privilege(seq) {
                        warn!(
                            target: "sdk.chat",
                            error = %err,
                            "Chat privilege propagation failed"
                        );
                        let _ = pending.respond_to.send(Err(SdkError::Internal(format!(
                            "chat privilege propagation failed: {err}"
                        ))));
                    }
                }
            }

            Completion::PrivilegeAckTimeout { seq } => {
                if let Some(pending) = self.take_pending_privilege(seq) {
                    warn!(
                        target: "sdk.chat",
                        requested = pending.requested.code(),
                        timeout = ?self.privilege_ack_timeout,
                        "Chat privilege acknowledgement timed out"
                    );
                    let _ = pending
                        .respond_to
                        .send(Err(SdkError::Timeout("change_privilege")));
                }
            }

            Completion::Media {
                command,
                result,
                respond_to,
            } => self.on_media_completed(command, result, respond_to),
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        if let EngineEvent::ConnectionChanged(state) = event {
            return self.on_connection_changed(state);
        }

        // The join result and the notifications arrive on separate channels,
        // so anything seen before the roster snapshot is installed waits.
        if self.phase == SessionPhase::Connecting {
            self.join_backlog.push(event);
            return;
        }

        if !self.in_session() {
            debug!(
                target: "sdk.actor.session",
                event = event.label(),
                phase = %self.phase,
                "Notification outside a session dropped"
            );
            return;
        }

        match event {
            EngineEvent::ConnectionChanged(_) => {}

            EngineEvent::UsersAdded(batch) => {
                let added = self.registry.add_batch(batch);
                sdk_metrics::set_participants(self.registry.len());
                if !added.is_empty() {
                    self.bus.emit_typed::<kinds::UserAdded>(added);
                }
            }
            EngineEvent::UsersRemoved(ids) => {
                let removed = self.registry.remove_batch(&ids);
                sdk_metrics::set_participants(self.registry.len());
                if !removed.is_empty() {
                    self.bus.emit_typed::<kinds::UserRemoved>(removed);
                }
            }
            EngineEvent::UsersUpdated(batch) => {
                let updated = self.registry.update_batch(batch);
                if !updated.is_empty() {
                    self.bus.emit_typed::<kinds::UserUpdated>(updated);
                }
            }

            EngineEvent::ChatReceived(message) => {
                debug!(
                    target: "sdk.chat",
                    message_id = %message.id,
                    sender = %message.sender.user_id,
                    "Chat message received"
                );
                self.chat.record(message.clone());
                self.bus.emit_typed::<kinds::ChatOnMessage>(message);
            }
            EngineEvent::ChatPrivilegeChanged(privilege) => {
                self.on_chat_privilege_changed(privilege);
            }

            EngineEvent::AudioActivity(levels) => {
                let ranked = self.registry.rank_active_speakers(&levels);
                self.bus.emit_typed::<kinds::ActiveSpeakerChange>(ranked);
            }
            EngineEvent::ActiveShareChanged(change) => {
                if let Some(self_id) = self.session.as_ref().map(|s| s.user_id) {
                    self.media.apply_share_change(&change, self_id);
                }
                self.bus.emit_typed::<kinds::ActiveShareChange>(change);
            }
            EngineEvent::SharePrivilegeChanged(privilege) => {
                self.media.share_privilege = privilege;
                self.bus
                    .emit_typed::<kinds::SharePrivilegeChange>(SharePrivilegePayload { privilege });
            }
            EngineEvent::ShareStoppedPassively(reason) => {
                if let Some(self_id) = self.session.as_ref().map(|s| s.user_id) {
                    self.media.apply_passive_stop(self_id);
                }
                info!(
                    target: "sdk.media",
                    reason = ?reason,
                    "Local share stopped passively"
                );
                self.bus.emit_typed::<kinds::PassivelyStopShare>(reason);
            }
            EngineEvent::CurrentAudioChanged(change) => {
                self.media.apply_audio_change(&change);
                self.bus.emit_typed::<kinds::CurrentAudioChange>(change);
            }
            EngineEvent::PeerVideoStateChanged(change) => {
                self.bus.emit_typed::<kinds::PeerVideoStateChange>(change);
            }
            EngineEvent::VideoDimensionChanged(change) => {
                self.bus.emit_typed::<kinds::VideoDimensionChange>(change);
            }
            EngineEvent::HostAskUnmuteAudio(request) => {
                self.bus.emit_typed::<kinds::HostAskUnmuteAudio>(request);
            }
            EngineEvent::MediaSdkChanged(change) => {
                self.bus.emit_typed::<kinds::MediaSdkChange>(change);
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn session_info(&self) -> Option<SessionInfo> {
        let session = self.session.as_ref()?;
        let user_name = self
            .registry
            .get(session.user_id)
            .map(|me| me.display_name.clone())
            .unwrap_or_default();

        Some(SessionInfo {
            topic: session.topic.clone(),
            session_id: session.session_id.clone(),
            user_id: session.user_id,
            user_name,
            password_protected: session.password_protected,
            is_in_meeting: self.phase == SessionPhase::InMeeting,
        })
    }

    fn handle_query(&self, query: SessionQuery) {
        match query {
            SessionQuery::Status { respond_to } => {
                let _ = respond_to.send(SessionStatus {
                    initialized: self.initialized,
                    phase: self.phase,
                    connection: self.connection,
                    participants: self.registry.len(),
                });
            }
            SessionQuery::SessionInfo { respond_to } => {
                let _ = respond_to.send(self.session_info());
            }
            SessionQuery::CurrentUser { respond_to } => {
                let _ = respond_to.send(self.local_participant().cloned());
            }
            SessionQuery::AllUsers { respond_to } => {
                let _ = respond_to.send(self.registry.snapshot());
            }
            SessionQuery::User {
                user_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.registry.get(user_id).cloned());
            }
            SessionQuery::Host { respond_to } => {
                let _ = respond_to.send(self.registry.host().cloned());
            }
            SessionQuery::ChatPrivilege { respond_to } => {
                let _ = respond_to.send(self.chat.privilege());
            }
            SessionQuery::ChatHistory { respond_to } => {
                let _ = respond_to.send(self.chat.history());
            }
            SessionQuery::ChatReceivers { respond_to } => {
                let receivers = match &self.session {
                    Some(session) if self.in_session() => {
                        self.chat.receivers(&self.registry, session.user_id)
                    }
                    _ => Vec::new(),
                };
                let _ = respond_to.send(receivers);
            }
            SessionQuery::MediaState { respond_to } => {
                let _ = respond_to.send(self.media.clone());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::engine_channel;
    use crate::types::SharePrivilege;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use tokio::sync::Notify;

    /// Accepts everything. `join` optionally waits for `release`.
    struct StubEngine {
        hold_join: bool,
        release: Notify,
    }

    impl StubEngine {
        fn new(hold_join: bool) -> Arc<Self> {
            Arc::new(Self {
                hold_join,
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl SessionTransport for StubEngine {
        async fn initialize(&self, _: &str, _: &DependentAssets) -> Result<(), EngineError> {
            Ok(())
        }
        async fn join(&self, _: JoinRequest) -> Result<JoinAccepted, EngineError> {
            if self.hold_join {
                self.release.notified().await;
            }
            let mut me = Participant::new(UserId(1), "Alice");
            me.is_host = true;
            Ok(JoinAccepted {
                session_id: "session-1".to_string(),
                user_id: UserId(1),
                participants: vec![me, Participant::new(UserId(2), "Bob")],
                chat_privilege: ChatPrivilege::All,
                share_privilege: SharePrivilege::Unlocked,
            })
        }
        async fn leave(&self, _: bool) -> Result<(), EngineError> {
            Ok(())
        }
        async fn rename(&self, _: UserId, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn remove_user(&self, _: UserId) -> Result<(), EngineError> {
            Ok(())
        }
        async fn make_host(&self, _: UserId) -> Result<(), EngineError> {
            Ok(())
        }
        async fn make_manager(&self, _: UserId) -> Result<(), EngineError> {
            Ok(())
        }
        async fn revoke_manager(&self, _: UserId) -> Result<(), EngineError> {
            Ok(())
        }
        async fn send_chat(&self, _: &ChatMessage) -> Result<(), EngineError> {
            Ok(())
        }
        async fn set_chat_privilege(&self, _: ChatPrivilege) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[async_trait]
    impl MediaEngine for StubEngine {
        async fn start_audio(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn stop_audio(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn mute_audio(&self, _: UserId) -> Result<(), EngineError> {
            Ok(())
        }
        async fn unmute_audio(&self, _: UserId) -> Result<(), EngineError> {
            Ok(())
        }
        async fn start_video(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn stop_video(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn switch_camera(&self, _: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn start_share(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn stop_share(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn pause_share(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn resume_share(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn set_share_privilege(&self, _: SharePrivilege) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct Fixture {
        handle: SessionHandle,
        engine: Arc<StubEngine>,
        events: mpsc::Sender<EngineEvent>,
        cancel: CancellationToken,
    }

    fn spawn_with(engine: Arc<StubEngine>) -> Fixture {
        let cancel = CancellationToken::new();
        let (bus, _bus_task) = EventBus::spawn(cancel.child_token());
        let (events, engine_events) = engine_channel(16);
        let (handle, _task) = SessionActor::spawn(
            &Config::default(),
            engine.clone(),
            engine.clone(),
            engine_events,
            bus,
            cancel.child_token(),
        );
        Fixture {
            handle,
            engine,
            events,
            cancel,
        }
    }

    fn request(name: &str) -> JoinRequest {
        JoinRequest {
            topic: "standup".to_string(),
            token: SecretString::from("signed-token"),
            user_name: name.to_string(),
            password: None,
        }
    }

    async fn joined() -> Fixture {
        let fixture = spawn_with(StubEngine::new(false));
        fixture
            .handle
            .init("en-US".to_string(), DependentAssets::Global)
            .await
            .unwrap();
        fixture.handle.join(request("Alice")).await.unwrap();
        fixture
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Alice").is_ok());
        assert!(matches!(
            validate_display_name("   "),
            Err(SdkError::InvalidParameters(_))
        ));
        let long = "x".repeat(MAX_DISPLAY_NAME_CHARS + 1);
        assert!(matches!(
            validate_display_name(&long),
            Err(SdkError::InvalidParameters(_))
        ));
        let exact = "é".repeat(MAX_DISPLAY_NAME_CHARS);
        assert!(validate_display_name(&exact).is_ok());
    }

    #[test]
    fn test_validate_join_rejects_empty_fields() {
        let mut no_topic = request("Alice");
        no_topic.topic = String::new();
        assert!(validate_join(&no_topic).is_err());

        let mut no_token = request("Alice");
        no_token.token = SecretString::from("");
        assert!(validate_join(&no_token).is_err());

        let mut empty_password = request("Alice");
        empty_password.password = Some(SecretString::from(""));
        assert!(validate_join(&empty_password).is_err());

        assert!(validate_join(&request("Alice")).is_ok());
    }

    #[tokio::test]
    async fn test_join_before_init_fails() {
        let fixture = spawn_with(StubEngine::new(false));
        let result = fixture.handle.join(request("Alice")).await;
        assert!(matches!(result, Err(SdkError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_init_is_idempotent_while_idle() {
        let fixture = spawn_with(StubEngine::new(false));
        fixture
            .handle
            .init("en-US".to_string(), DependentAssets::Global)
            .await
            .unwrap();
        fixture
            .handle
            .init("en-US".to_string(), DependentAssets::Cdn)
            .await
            .unwrap();
        assert!(fixture.handle.status().await.unwrap().initialized);
    }

    #[tokio::test]
    async fn test_join_populates_session() {
        let fixture = joined().await;

        let status = fixture.handle.status().await.unwrap();
        assert_eq!(status.phase, SessionPhase::InMeeting);
        assert_eq!(status.connection, Some(ConnectionState::Connected));
        assert_eq!(status.participants, 2);

        let info = fixture.handle.session_info().await.unwrap().unwrap();
        assert_eq!(info.topic, "standup");
        assert_eq!(info.user_name, "Alice");
        assert!(info.is_in_meeting);
        assert!(!info.password_protected);

        let me = fixture.handle.current_user().await.unwrap().unwrap();
        assert!(me.is_host);
    }

    #[tokio::test]
    async fn test_second_join_while_connecting_is_duplicate() {
        let fixture = spawn_with(StubEngine::new(true));
        fixture
            .handle
            .init("en-US".to_string(), DependentAssets::Global)
            .await
            .unwrap();

        let first = {
            let handle = fixture.handle.clone();
            tokio::spawn(async move { handle.join(request("Alice")).await })
        };
        // Wait until the first join is in flight.
        while fixture.handle.status().await.unwrap().phase != SessionPhase::Connecting {
            tokio::task::yield_now().await;
        }

        let second = fixture.handle.join(request("Alice")).await;
        assert!(matches!(second, Err(SdkError::DuplicateOperation("join"))));

        fixture.engine.release.notify_one();
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_roster_received_while_connecting_survives_join() {
        let fixture = spawn_with(StubEngine::new(true));
        fixture
            .handle
            .init("en-US".to_string(), DependentAssets::Global)
            .await
            .unwrap();

        let join = {
            let handle = fixture.handle.clone();
            tokio::spawn(async move { handle.join(request("Alice")).await })
        };
        while fixture.handle.status().await.unwrap().phase != SessionPhase::Connecting {
            tokio::task::yield_now().await;
        }

        fixture
            .events
            .send(EngineEvent::UsersAdded(vec![Participant::new(
                UserId(3),
                "Carol",
            )]))
            .await
            .unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        fixture.engine.release.notify_one();
        join.await.unwrap().unwrap();

        let mut ids: Vec<u32> = Vec::new();
        for _ in 0..10 {
            ids = fixture
                .handle
                .all_users()
                .await
                .unwrap()
                .iter()
                .map(|p| p.user_id.0)
                .collect();
            if ids.len() == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_backlog_dropped_when_join_is_abandoned() {
        let fixture = spawn_with(StubEngine::new(true));
        fixture
            .handle
            .init("en-US".to_string(), DependentAssets::Global)
            .await
            .unwrap();

        let join = {
            let handle = fixture.handle.clone();
            tokio::spawn(async move { handle.join(request("Alice")).await })
        };
        while fixture.handle.status().await.unwrap().phase != SessionPhase::Connecting {
            tokio::task::yield_now().await;
        }
        fixture
            .events
            .send(EngineEvent::UsersAdded(vec![Participant::new(
                UserId(3),
                "Carol",
            )]))
            .await
            .unwrap();

        fixture.handle.leave(false).await.unwrap();
        assert!(join.await.unwrap().is_err());
        fixture.engine.release.notify_one();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(fixture.handle.all_users().await.unwrap().is_empty());
        assert_eq!(
            fixture.handle.status().await.unwrap().phase,
            SessionPhase::Closed
        );
    }

    #[tokio::test]
    async fn test_init_after_join_is_noop() {
        let fixture = joined().await;
        fixture
            .handle
            .init("en-US".to_string(), DependentAssets::Global)
            .await
            .unwrap();
        assert_eq!(
            fixture.handle.status().await.unwrap().phase,
            SessionPhase::InMeeting
        );
    }

    #[tokio::test]
    async fn test_leave_from_idle_is_invalid_state() {
        let fixture = spawn_with(StubEngine::new(false));
        fixture
            .handle
            .init("en-US".to_string(), DependentAssets::Global)
            .await
            .unwrap();

        let result = fixture.handle.leave(false).await;
        assert!(matches!(
            result,
            Err(SdkError::InvalidState {
                phase: SessionPhase::Idle,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_leave_twice_is_noop() {
        let fixture = joined().await;
        fixture.handle.leave(false).await.unwrap();
        fixture.handle.leave(false).await.unwrap();

        let status = fixture.handle.status().await.unwrap();
        assert_eq!(status.phase, SessionPhase::Closed);
        assert_eq!(status.participants, 0);
        assert!(fixture.handle.session_info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_admin_cannot_target_self() {
        let fixture = joined().await;
        let result = fixture.handle.admin(AdminAction::RemoveUser, UserId(1)).await;
        assert!(matches!(result, Err(SdkError::InvalidParameters(_))));

        let result = fixture.handle.admin(AdminAction::MakeHost, UserId(99)).await;
        assert!(matches!(result, Err(SdkError::UserNotFound(UserId(99)))));

        let result = fixture
            .handle
            .admin(AdminAction::RevokeManager, UserId(2))
            .await;
        assert!(matches!(result, Err(SdkError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_roster_notifications_ignored_outside_session() {
        let fixture = spawn_with(StubEngine::new(false));
        fixture
            .events
            .send(EngineEvent::UsersAdded(vec![Participant::new(
                UserId(7),
                "Ghost",
            )]))
            .await
            .unwrap();

        // A query round-trip does not order against the notification
        // channel, so poll a few times.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(fixture.handle.all_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_media_command_updates_state() {
        let fixture = joined().await;
        fixture.handle.media(MediaCommand::StartAudio).await.unwrap();
        fixture
            .handle
            .media(MediaCommand::MuteAudio(UserId(1)))
            .await
            .unwrap();

        let state = fixture.handle.media_state().await.unwrap();
        assert!(state.audio_started);
        assert!(state.audio_muted);
    }

    #[tokio::test]
    async fn test_cancel_stops_actor() {
        let fixture = spawn_with(StubEngine::new(false));
        assert!(!fixture.handle.is_cancelled());
        fixture.cancel.cancel();
        assert!(fixture.handle.is_cancelled());
    }
}
