//! Credential validation and balance refresh.
//!
//! One call drives the identity's browser page through either the login
//! form or the refresh control and reports what the page displayed. Every
//! page operation is bounded by a timeout, so a call always finishes within
//! the provider's time budget.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::outcome::{Interaction, ProbeReport, ValidationFailure, ValidationOutcome};
use crate::config::ProviderConfig;
use crate::session::{
    BrowserEngine, BrowserError, ProviderPage, SessionLaunchError, SessionRegistry,
    SessionReservation, UserIdentity,
};
use crate::telegram::mask_phone;

/// A validation whose input was checked, before any browser work.
#[derive(Debug)]
pub enum Prepared<P: ProviderPage> {
    /// The input was rejected; this is the final outcome.
    Rejected(ValidationOutcome),
    /// The identity's session is reserved for this interaction.
    Reserved(Attempt<P>),
}

/// An interaction holding its identity's session reservation.
pub struct Attempt<P: ProviderPage> {
    interaction: Interaction,
    phone: String,
    secret: String,
    reservation: SessionReservation<P>,
}

impl<P: ProviderPage> std::fmt::Debug for Attempt<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attempt")
            .field("interaction", &self.interaction)
            .field("identity", &self.reservation.identity())
            .finish_non_exhaustive()
    }
}

/// Runs login and refresh interactions against the provider site.
pub struct CredentialValidator<E: BrowserEngine> {
    registry: Arc<SessionRegistry<E>>,
    provider: ProviderConfig,
}

impl<E: BrowserEngine> CredentialValidator<E> {
    #[must_use]
    pub const fn new(registry: Arc<SessionRegistry<E>>, provider: ProviderConfig) -> Self {
        Self { registry, provider }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry<E>> {
        &self.registry
    }

    #[must_use]
    pub const fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Logs in with `phone`/`secret`, or with `refresh_only` re-reads the
    /// balance of an already logged-in session.
    ///
    /// Interaction failures come back as an unsuccessful outcome. Only a
    /// failure to launch the browser is returned as an error.
    pub async fn validate(
        &self,
        identity: UserIdentity,
        phone: &str,
        secret: Option<&str>,
        refresh_only: bool,
    ) -> Result<ValidationOutcome, SessionLaunchError> {
        let prepared = self.prepare(identity, phone, secret, refresh_only).await;
        self.drive(prepared).await
    }

    /// First half of [`validate`](Self::validate): checks the input and
    /// waits for exclusive use of the identity's session.
    ///
    /// Launches nothing, so it can wait without holding a worker.
    pub async fn prepare(
        &self,
        identity: UserIdentity,
        phone: &str,
        secret: Option<&str>,
        refresh_only: bool,
    ) -> Prepared<E::Page> {
        let interaction = if refresh_only {
            Interaction::Refresh
        } else {
            Interaction::Login
        };

        let secret = match (interaction, secret) {
            (Interaction::Login, Some(secret)) if !secret.is_empty() && !phone.is_empty() => secret,
            (Interaction::Login, _) => {
                let missing = if phone.is_empty() { "phone number" } else { "password" };
                let failure = ValidationFailure::MissingInput(missing);
                warn!(user = %identity, "Login rejected: {}", failure);
                return Prepared::Rejected(ValidationOutcome::failure(interaction, &failure));
            }
            (Interaction::Refresh, _) => "",
        };

        let reservation = self.registry.reserve(identity).await;
        Prepared::Reserved(Attempt {
            interaction,
            phone: phone.to_owned(),
            secret: secret.to_owned(),
            reservation,
        })
    }

    /// Second half of [`validate`](Self::validate): launches the browser if
    /// needed and runs the interaction.
    pub async fn drive(
        &self,
        prepared: Prepared<E::Page>,
    ) -> Result<ValidationOutcome, SessionLaunchError> {
        let attempt = match prepared {
            Prepared::Rejected(outcome) => return Ok(outcome),
            Prepared::Reserved(attempt) => attempt,
        };
        let Attempt {
            interaction,
            phone,
            secret,
            reservation,
        } = attempt;

        let lease = self.registry.open(reservation).await?;
        let identity = lease.identity();
        debug!(
            user = %identity,
            session = %lease.session_id(),
            reused = lease.is_reused(),
            phone = %mask_phone(&phone),
            "Starting {}",
            interaction
        );

        let result = match interaction {
            Interaction::Login => self.login(lease.page(), &phone, &secret).await,
            Interaction::Refresh => self.refresh(lease.page()).await,
        };

        match result {
            Ok(balance) => {
                info!(user = %identity, "{} succeeded", interaction);
                Ok(ValidationOutcome::success(balance))
            }
            Err(failure) => {
                warn!(user = %identity, "{} failed: {}", interaction, failure);
                if failure.is_disconnected() {
                    lease.discard().await;
                }
                Ok(ValidationOutcome::failure(interaction, &failure))
            }
        }
    }

    /// Opens the login page and reports which form elements it found.
    ///
    /// Leaves the session in the registry; the caller releases it.
    pub async fn probe(&self, identity: UserIdentity) -> Result<ProbeReport, SessionLaunchError> {
        let lease = self.registry.acquire(identity).await?;
        let page = lease.page();
        let selectors = &self.provider.selectors;
        let mut report = ProbeReport::default();

        let navigation = step(
            "open login page",
            self.provider.timeouts.navigation(),
            page.goto(&self.provider.login_url),
        )
        .await;
        if let Err(failure) = navigation {
            warn!(user = %identity, "Probe failed: {}", failure);
            return Ok(report);
        }

        report.page_loaded = true;
        report.phone_field = self.present(page, &selectors.phone_input).await;
        report.password_field = self.present(page, &selectors.password_input).await;
        report.submit_button = self.present(page, &selectors.submit_button).await;
        Ok(report)
    }

    async fn present(&self, page: &E::Page, selector: &str) -> bool {
        let action = self.provider.timeouts.action();
        match step("find element", action, page.is_present(selector)).await {
            Ok(found) => found,
            Err(failure) => {
                debug!("{}", failure);
                false
            }
        }
    }

    async fn login(
        &self,
        page: &E::Page,
        phone: &str,
        secret: &str,
    ) -> Result<String, ValidationFailure> {
        let selectors = &self.provider.selectors;
        let timeouts = &self.provider.timeouts;

        step("open login page", timeouts.navigation(), page.goto(&self.provider.login_url)).await?;
        step("fill phone", timeouts.action(), page.fill(&selectors.phone_input, phone)).await?;
        step("fill password", timeouts.action(), page.fill(&selectors.password_input, secret))
            .await?;
        step("submit", timeouts.action(), page.click(&selectors.submit_button)).await?;

        let wait = timeouts.balance_wait();
        timeout(wait, self.poll_balance(page))
            .await
            .map_err(|_| ValidationFailure::BalanceNotShown(wait))?
    }

    async fn poll_balance(&self, page: &E::Page) -> Result<String, ValidationFailure> {
        let timeouts = &self.provider.timeouts;
        loop {
            let shown = step(
                "read balance",
                timeouts.action(),
                page.text_of(&self.provider.selectors.balance),
            )
            .await?;
            if let Some(balance) = shown {
                return Ok(balance);
            }
            sleep(timeouts.poll_interval()).await;
        }
    }

    async fn refresh(&self, page: &E::Page) -> Result<String, ValidationFailure> {
        let selectors = &self.provider.selectors;
        let timeouts = &self.provider.timeouts;

        step("click refresh", timeouts.action(), page.click(&selectors.refresh_button)).await?;
        sleep(timeouts.refresh_settle()).await;

        step("read balance", timeouts.action(), page.text_of(&selectors.balance))
            .await?
            .ok_or(ValidationFailure::BalanceMissing)
    }
}

impl<E: BrowserEngine> std::fmt::Debug for CredentialValidator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialValidator")
            .field("provider", &self.provider.name)
            .finish_non_exhaustive()
    }
}

/// Runs one page operation under `limit`.
async fn step<T>(
    name: &'static str,
    limit: Duration,
    operation: impl Future<Output = Result<T, BrowserError>>,
) -> Result<T, ValidationFailure> {
    match timeout(limit, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ValidationFailure::Step { step: name, source }),
        Err(_) => Err(ValidationFailure::Timeout {
            step: name,
            after: limit,
        }),
    }
}
