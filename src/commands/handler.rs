//! Command handler implementation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::conversation::{Conversations, Step, validate_phone};
use super::types::{BotCommand, CommandResult};
use crate::session::{BrowserEngine, UserIdentity};
use crate::store::{
    CredentialRecord, CredentialStore, DEFAULT_HASH_COST, PersistenceFailure, hash_secret,
};
use crate::telegram::{RedactionScheduler, mask_phone};
use crate::workflow::{CredentialValidator, PoolError, Prepared, ValidationOutcome, WorkerPool};

const NOT_LOGGED_IN: &str = "You are not logged in. Use /login to log in first.";
const UNKNOWN_INPUT: &str = "Unknown command. Use /start to begin.";
const LAUNCH_FAILED: &str = "Could not start a browser session. Please try again later.";
const SHUTTING_DOWN: &str = "The bot is shutting down. Please try again later.";

/// A text message received from a user.
#[derive(Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub user: UserIdentity,
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
}

impl std::fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The text may be a password.
        f.debug_struct("IncomingMessage")
            .field("user", &self.user)
            .field("chat_id", &self.chat_id)
            .field("message_id", &self.message_id)
            .finish_non_exhaustive()
    }
}

/// Handles bot commands and the login conversation.
pub struct CommandHandler<E: BrowserEngine> {
    validator: Arc<CredentialValidator<E>>,

    /// Bounds concurrent browser work.
    pool: Arc<WorkerPool>,

    store: Arc<dyn CredentialStore>,

    redactions: Arc<RedactionScheduler>,

    conversations: Conversations,

    /// How long a password message stays visible.
    redaction_delay: Duration,

    hash_cost: u32,
}

impl<E: BrowserEngine> CommandHandler<E> {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(
        validator: Arc<CredentialValidator<E>>,
        pool: Arc<WorkerPool>,
        store: Arc<dyn CredentialStore>,
        redactions: Arc<RedactionScheduler>,
        redaction_delay: Duration,
    ) -> Self {
        Self {
            validator,
            pool,
            store,
            redactions,
            conversations: Conversations::new(),
            redaction_delay,
            hash_cost: DEFAULT_HASH_COST,
        }
    }

    /// Sets the bcrypt work factor for stored passwords.
    #[must_use]
    pub const fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Handles one message.
    ///
    /// Returns `None` for slash commands the bot does not know, which are
    /// ignored.
    pub async fn handle(&self, message: &IncomingMessage) -> Option<CommandResult> {
        let result = match BotCommand::parse(&message.text) {
            Some(command) => {
                debug!(user = %message.user, "Handling command: {}", command);
                self.execute(command, message.user).await
            }
            None if BotCommand::is_command_like(&message.text) => {
                debug!(user = %message.user, "Ignoring unknown command");
                return None;
            }
            None => self.handle_text(message).await,
        };

        info!(user = %message.user, "Command result: success={}", result.success);
        Some(result)
    }

    /// Executes a parsed command.
    async fn execute(&self, command: BotCommand, user: UserIdentity) -> CommandResult {
        match command {
            BotCommand::Start => Self::handle_start(),
            BotCommand::Help => Self::handle_help(),
            BotCommand::Login => self.handle_login(user),
            BotCommand::Skip => Self::handle_skip(),
            BotCommand::Balance => self.handle_balance(user).await,
            BotCommand::Logout => self.handle_logout(user).await,
        }
    }

    fn handle_start() -> CommandResult {
        CommandResult::success(
            "Welcome to the BetNudge Bot! 🎉\n\
             I am here to automate your betting experience.\n\
             What would you like to do?\n\
             1. /login - Log in to your betting account.\n\
             2. /skip - Skip login and use limited features.",
        )
    }

    fn handle_help() -> CommandResult {
        let mut lines = vec![
            "I am your Betting Bot. Here are the commands you can use:".to_owned(),
            String::new(),
        ];
        for command in BotCommand::ALL {
            lines.push(format!("  {command} - {}", command.description()));
        }
        CommandResult::success(lines.join("\n"))
    }

    fn handle_skip() -> CommandResult {
        CommandResult::success(
            "You have chosen to skip login. Some features may be limited.\n\
             Use /login at any time to connect your account.",
        )
    }

    fn handle_login(&self, user: UserIdentity) -> CommandResult {
        self.conversations.set_step(user, Step::AwaitingPhone);
        CommandResult::success(format!(
            "Please enter your {} phone number",
            self.validator.provider().name
        ))
    }

    async fn handle_balance(&self, user: UserIdentity) -> CommandResult {
        let Some(phone) = self
            .conversations
            .get(user)
            .and_then(|c| c.logged_in_phone)
        else {
            return CommandResult::error(NOT_LOGGED_IN);
        };

        match self.run_validation(user, phone, None, true).await {
            Ok(outcome) if outcome.success => CommandResult::success(format!(
                "Your updated balance is: {}",
                outcome.balance.unwrap_or_default()
            )),
            Ok(outcome) => CommandResult::error(format!(
                "Could not refresh balance: {}",
                outcome.message_or_default()
            )),
            Err(reply) => CommandResult::error(reply),
        }
    }

    async fn handle_logout(&self, user: UserIdentity) -> CommandResult {
        if !self.conversations.forget(user) {
            return CommandResult::error("You are not logged in.");
        }
        self.validator.registry().release(user).await;
        CommandResult::success("You have been logged out. Your session has been closed.")
    }

    async fn handle_text(&self, message: &IncomingMessage) -> CommandResult {
        let step = self
            .conversations
            .get(message.user)
            .map(|c| c.step)
            .unwrap_or_default();

        match step {
            Step::AwaitingPhone => self.handle_phone(message.user, &message.text),
            Step::AwaitingPassword { phone } => self.handle_password(message, phone).await,
            Step::Idle => CommandResult::error(UNKNOWN_INPUT),
        }
    }

    fn handle_phone(&self, user: UserIdentity, text: &str) -> CommandResult {
        match validate_phone(text) {
            Ok(phone) => {
                debug!(user = %user, phone = %mask_phone(&phone), "Phone number accepted");
                self.conversations
                    .set_step(user, Step::AwaitingPassword { phone });
                CommandResult::success("Please enter your password:")
            }
            Err(reply) => CommandResult::error(reply),
        }
    }

    async fn handle_password(&self, message: &IncomingMessage, phone: String) -> CommandResult {
        let password = message.text.trim().to_owned();
        if password.is_empty() {
            return CommandResult::error("Password cannot be empty. Please try again.");
        }

        // The message is deleted whatever the login outcome.
        self.redactions
            .schedule_redaction(message.chat_id, message.message_id, self.redaction_delay);
        self.conversations.set_step(message.user, Step::Idle);

        let outcome = match self
            .run_validation(message.user, phone.clone(), Some(password.clone()), false)
            .await
        {
            Ok(outcome) => outcome,
            Err(reply) => return CommandResult::error(reply),
        };

        let Some(balance) = outcome.balance.clone().filter(|_| outcome.success) else {
            return CommandResult::error("Incorrect phone number or password.").and_then_say(
                format!("Login failed: {}", outcome.message_or_default()),
            );
        };

        self.conversations.logged_in(message.user, phone.clone());
        if let Err(e) = self.persist(message.user, &phone, &password, &balance).await {
            // The browser already confirmed the login.
            error!(user = %message.user, "Failed to save credentials: {}", e);
        }

        CommandResult::success(format!("Login successful! 🎉\nYour balance is: {balance}"))
            .and_then_say(
                "To check your balance, use the /balance command.\n\
                 To log out, use the /logout command.",
            )
    }

    /// Runs a validation on the worker pool.
    ///
    /// Waiting for the user's own session happens before a worker is taken,
    /// so one user's queued commands never hold workers other users need.
    /// `Err` carries the reply for failures that are not about the
    /// credentials themselves.
    async fn run_validation(
        &self,
        user: UserIdentity,
        phone: String,
        secret: Option<String>,
        refresh_only: bool,
    ) -> Result<ValidationOutcome, &'static str> {
        let validator = Arc::clone(&self.validator);
        let prepare = {
            let validator = Arc::clone(&validator);
            async move {
                validator
                    .prepare(user, &phone, secret.as_deref(), refresh_only)
                    .await
            }
        };
        let drive =
            move |prepared: Prepared<E::Page>| async move { validator.drive(prepared).await };

        match self.pool.submit_staged(prepare, drive).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                error!(user = %user, "Could not start browser session: {}", e);
                Err(LAUNCH_FAILED)
            }
            Err(e @ (PoolError::ShuttingDown | PoolError::Cancelled)) => {
                warn!(user = %user, "Validation not completed: {}", e);
                Err(SHUTTING_DOWN)
            }
            Err(e @ PoolError::Panicked(_)) => {
                error!(user = %user, "Validation crashed: {}", e);
                Err(LAUNCH_FAILED)
            }
        }
    }

    async fn persist(
        &self,
        user: UserIdentity,
        phone: &str,
        password: &str,
        balance: &str,
    ) -> Result<(), PersistenceFailure> {
        let password_hash = hash_secret(password, self.hash_cost).await?;
        let record = CredentialRecord::new(user, phone, password_hash, balance);
        self.store.upsert(&record).await?;
        info!(
            user = %user,
            phone = %mask_phone(phone),
            backend = self.store.backend(),
            "Saved credentials, balance={}",
            balance
        );
        Ok(())
    }
}

impl<E: BrowserEngine> std::fmt::Debug for CommandHandler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("redaction_delay", &self.redaction_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::config::ProviderConfig;
    use crate::session::SessionRegistry;
    use crate::session::testing::FakeEngine;
    use crate::store::{MemoryCredentialStore, verify_secret};
    use crate::telegram::MessageChannel;
    use crate::telegram::testing::RecordingChannel;

    const CHAT: i64 = 500;
    const PHONE: &str = "08012345678";

    /// Store whose writes always fail, as with an unreachable database.
    #[derive(Debug, Default)]
    struct FailingStore {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl CredentialStore for FailingStore {
        async fn upsert(&self, _record: &CredentialRecord) -> Result<(), PersistenceFailure> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(PersistenceFailure::Connect("server selection timeout".to_owned()))
        }

        async fn find_one(
            &self,
            _identity: UserIdentity,
        ) -> Result<Option<CredentialRecord>, PersistenceFailure> {
            Ok(None)
        }

        async fn ping(&self) -> Result<(), PersistenceFailure> {
            Err(PersistenceFailure::Connect("server selection timeout".to_owned()))
        }

        fn backend(&self) -> &'static str {
            "failing"
        }
    }

    struct Harness<S = MemoryCredentialStore> {
        handler: CommandHandler<FakeEngine>,
        store: Arc<S>,
        channel: Arc<RecordingChannel>,
        registry: Arc<SessionRegistry<FakeEngine>>,
        next_message_id: AtomicI32,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_store(Arc::new(MemoryCredentialStore::new()), 2)
        }
    }

    impl<S: CredentialStore + 'static> Harness<S> {
        fn with_store(store: Arc<S>, workers: usize) -> Self {
            let registry = Arc::new(SessionRegistry::new(FakeEngine::new()));
            let validator = Arc::new(CredentialValidator::new(
                Arc::clone(&registry),
                ProviderConfig::default(),
            ));
            let channel = Arc::new(RecordingChannel::new());
            let redactions = Arc::new(RedactionScheduler::new(
                Arc::clone(&channel) as Arc<dyn MessageChannel>
            ));
            let handler = CommandHandler::new(
                validator,
                Arc::new(WorkerPool::new(workers)),
                Arc::clone(&store) as Arc<dyn CredentialStore>,
                redactions,
                Duration::from_secs(40),
            )
            .with_hash_cost(4);

            Self {
                handler,
                store,
                channel,
                registry,
                next_message_id: AtomicI32::new(1),
            }
        }

        async fn say(&self, user: u64, text: &str) -> (i32, Option<CommandResult>) {
            let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
            let message = IncomingMessage {
                user: UserIdentity(user),
                chat_id: CHAT,
                message_id,
                text: text.to_owned(),
            };
            (message_id, self.handler.handle(&message).await)
        }

        async fn reply(&self, user: u64, text: &str) -> CommandResult {
            self.say(user, text).await.1.unwrap()
        }

        async fn login(&self, user: u64, password: &str) -> (i32, CommandResult) {
            self.reply(user, "/login").await;
            self.reply(user, PHONE).await;
            let (id, result) = self.say(user, password).await;
            (id, result.unwrap())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_login_stores_hash_and_redacts() {
        let h = Harness::new();

        let (password_message, result) = h.login(1, "pw").await;
        assert!(result.success);
        assert!(result.text().contains("₦1,000.00"));

        let record = h.store.find_one(UserIdentity(1)).await.unwrap().unwrap();
        assert_eq!(record.phone_number, PHONE);
        assert_eq!(record.balance, "₦1,000.00");
        assert_ne!(record.password_hash, "pw");
        assert!(verify_secret("pw", &record.password_hash));

        tokio::time::sleep(Duration::from_secs(41)).await;
        assert_eq!(h.channel.deleted(), vec![(CHAT, password_message)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_password_writes_nothing() {
        let h = Harness::new();

        let (password_message, result) = h.login(1, "wrong").await;
        assert!(!result.success);
        assert!(result.text().contains("Login failed: Failed to login or fetch balance."));
        assert!(h.store.is_empty());

        tokio::time::sleep(Duration::from_secs(41)).await;
        assert_eq!(h.channel.deleted(), vec![(CHAT, password_message)]);

        // A failed login is not remembered.
        assert_eq!(h.reply(1, "/balance").await.text(), NOT_LOGGED_IN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_refreshes_logged_in_session() {
        let h = Harness::new();
        h.login(1, "pw").await;

        h.registry.engine().set_balance("₦7,250.00");
        let result = h.reply(1, "/balance").await;

        assert!(result.success);
        assert_eq!(result.text(), "Your updated balance is: ₦7,250.00");
        assert_eq!(h.registry.engine().launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_succeeds_when_saving_fails() {
        let h = Harness::with_store(Arc::new(FailingStore::default()), 2);

        let (password_message, result) = h.login(1, "pw").await;
        assert!(result.success);
        assert!(result.text().starts_with("Login successful!"));
        assert_eq!(h.store.attempts.load(Ordering::SeqCst), 1);

        // The login is remembered and the password still gets deleted.
        assert!(h.reply(1, "/balance").await.success);
        tokio::time::sleep(Duration::from_secs(41)).await;
        assert_eq!(h.channel.deleted(), vec![(CHAT, password_message)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_commands_of_one_user_leave_workers_free() {
        let h = Arc::new(Harness::new());
        h.login(1, "pw").await;
        h.reply(2, "/login").await;
        h.reply(2, PHONE).await;
        h.registry.engine().set_op_delay(Duration::from_secs(5));

        // Two refreshes for user 1: the second waits for the first's session.
        let refreshes: Vec<_> = (0..2)
            .map(|_| {
                let h = Arc::clone(&h);
                tokio::spawn(async move { h.reply(1, "/balance").await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let started = Instant::now();
        let result = h.reply(2, "pw").await;
        assert!(result.success);
        // Five page operations of 5s each, with no wait for a worker.
        assert!(started.elapsed() < Duration::from_secs(30));

        for refresh in refreshes {
            assert!(refresh.await.unwrap().success);
        }
    }

    #[tokio::test]
    async fn test_balance_requires_login() {
        let h = Harness::new();
        let result = h.reply(1, "/balance").await;
        assert!(!result.success);
        assert_eq!(h.registry.engine().launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_closes_session() {
        let h = Harness::new();
        h.login(1, "pw").await;
        assert!(h.registry.lookup(UserIdentity(1)).is_some());

        let result = h.reply(1, "/logout").await;
        assert!(result.success);
        assert!(h.registry.lookup(UserIdentity(1)).is_none());
        assert_eq!(h.registry.engine().closed(), 1);

        assert!(!h.reply(1, "/logout").await.success);
    }

    #[tokio::test]
    async fn test_invalid_phone_keeps_waiting() {
        let h = Harness::new();
        h.reply(1, "/login").await;

        let result = h.reply(1, "0801-234").await;
        assert!(!result.success);
        assert!(result.text().contains("digits only"));

        let result = h.reply(1, PHONE).await;
        assert_eq!(result.text(), "Please enter your password:");
    }

    #[tokio::test]
    async fn test_plain_text_outside_conversation() {
        let h = Harness::new();
        assert_eq!(h.reply(1, "hello").await.text(), UNKNOWN_INPUT);
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let h = Harness::new();
        assert!(h.say(1, "/fetch").await.1.is_none());
    }

    #[tokio::test]
    async fn test_start_and_help() {
        let h = Harness::new();
        assert!(h.reply(1, "/start").await.text().contains("/login"));

        let help = h.reply(1, "/help@BetNudgeBot").await.text();
        for command in BotCommand::ALL {
            assert!(help.contains(&command.to_string()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_are_independent() {
        let h = Harness::new();
        h.reply(1, "/login").await;
        h.reply(2, "/login").await;
        h.reply(1, PHONE).await;

        // User 2 is still asked for a phone number.
        let result = h.reply(2, "not a phone").await;
        assert!(result.text().contains("digits only"));

        let result = h.reply(1, "pw").await;
        assert!(result.success);
        assert!(h.registry.lookup(UserIdentity(2)).is_none());
    }

    #[test]
    fn test_incoming_message_debug_hides_text() {
        let message = IncomingMessage {
            user: UserIdentity(1),
            chat_id: CHAT,
            message_id: 3,
            text: "secret-password".to_owned(),
        };
        assert!(!format!("{message:?}").contains("secret-password"));
    }
}
