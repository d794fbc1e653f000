//! Scripted browser engine used by unit tests.
//!
//! `FakePage` behaves like a tiny provider site: a login form that accepts
//! a configured phone/password pair, a balance indicator shown only after a
//! successful login and a refresh control that only exists once logged in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::engine::{BrowserEngine, BrowserError, ProviderPage, SessionLaunchError};
use crate::config::Selectors;

#[derive(Debug, Default)]
struct Counters {
    launches: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fail_next_launch: AtomicBool,
    disconnect_next: AtomicBool,
}

#[derive(Debug)]
struct Site {
    accepted: HashMap<String, String>,
    balance: Mutex<String>,
    selectors: Selectors,
    op_delay: Mutex<Duration>,
    launch_delay: Duration,
    counters: Counters,
}

/// Engine handing out `FakePage`s backed by one shared fake site.
#[derive(Debug, Clone)]
pub(crate) struct FakeEngine {
    site: Arc<Site>,
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        Self {
            site: Arc::new(Site {
                accepted: HashMap::from([("08012345678".to_owned(), "pw".to_owned())]),
                balance: Mutex::new("₦1,000.00".to_owned()),
                selectors: Selectors::default(),
                op_delay: Mutex::new(Duration::ZERO),
                launch_delay: Duration::ZERO,
                counters: Counters::default(),
            }),
        }
    }

    fn rebuild(self, f: impl FnOnce(&mut Site)) -> Self {
        let mut site =
            Arc::try_unwrap(self.site).unwrap_or_else(|_| panic!("engine already shared"));
        f(&mut site);
        Self {
            site: Arc::new(site),
        }
    }

    /// Every page operation takes `delay`, so overlapping drivers are observable.
    pub(crate) fn with_op_delay(self, delay: Duration) -> Self {
        self.set_op_delay(delay);
        self
    }

    /// Changes the page operation delay of every page, including open ones.
    pub(crate) fn set_op_delay(&self, delay: Duration) {
        *self.site.op_delay.lock().unwrap() = delay;
    }

    pub(crate) fn with_launch_delay(self, delay: Duration) -> Self {
        self.rebuild(|site| site.launch_delay = delay)
    }

    pub(crate) fn set_balance(&self, balance: &str) {
        *self.site.balance.lock().unwrap() = balance.to_owned();
    }

    pub(crate) fn fail_next_launch(&self) {
        self.site.counters.fail_next_launch.store(true, Ordering::SeqCst);
    }

    /// The next page operation reports a dead browser connection.
    pub(crate) fn disconnect_next(&self) {
        self.site.counters.disconnect_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn launches(&self) -> usize {
        self.site.counters.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.site.counters.closed.load(Ordering::SeqCst)
    }

    /// Highest number of page operations that ever ran at the same time.
    pub(crate) fn max_concurrent_ops(&self) -> usize {
        self.site.counters.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    type Page = FakePage;

    async fn launch(&self) -> Result<FakePage, SessionLaunchError> {
        if !self.site.launch_delay.is_zero() {
            tokio::time::sleep(self.site.launch_delay).await;
        }
        if self.site.counters.fail_next_launch.swap(false, Ordering::SeqCst) {
            return Err(SessionLaunchError::Launch("no browser executable".to_owned()));
        }
        let page_id = self.site.counters.launches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakePage {
            page_id,
            site: Arc::clone(&self.site),
            state: Mutex::new(PageState::default()),
        })
    }
}

#[derive(Debug, Default)]
struct PageState {
    url: Option<String>,
    fields: HashMap<String, String>,
    logged_in: bool,
}

#[derive(Debug)]
pub(crate) struct FakePage {
    page_id: usize,
    site: Arc<Site>,
    state: Mutex<PageState>,
}

impl FakePage {
    pub(crate) fn page_id(&self) -> usize {
        self.page_id
    }

    async fn op<T>(
        &self,
        f: impl FnOnce(&mut PageState, &Site) -> Result<T, BrowserError>,
    ) -> Result<T, BrowserError> {
        let counters = &self.site.counters;
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = *self.site.op_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = if counters.disconnect_next.swap(false, Ordering::SeqCst) {
            Err(BrowserError::Disconnected("ConnectionClosed".to_owned()))
        } else {
            let mut state = self.state.lock().unwrap();
            f(&mut *state, self.site.as_ref())
        };

        counters.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl ProviderPage for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.op(|state, _| {
            // The fake site logs out whenever the login page is opened.
            state.url = Some(url.to_owned());
            state.fields.clear();
            state.logged_in = false;
            Ok(())
        })
        .await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        self.op(|state, site| {
            let on_form = state.url.is_some() && !state.logged_in;
            let known = selector == site.selectors.phone_input
                || selector == site.selectors.password_input;
            if !(on_form && known) {
                return Err(BrowserError::ElementNotFound(selector.to_owned()));
            }
            state.fields.insert(selector.to_owned(), value.to_owned());
            Ok(())
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.op(|state, site| {
            if selector == site.selectors.submit_button && state.url.is_some() && !state.logged_in {
                let phone = state.fields.get(&site.selectors.phone_input);
                let password = state.fields.get(&site.selectors.password_input);
                if let (Some(phone), Some(password)) = (phone, password) {
                    state.logged_in = site.accepted.get(phone) == Some(password);
                }
                Ok(())
            } else if selector == site.selectors.refresh_button && state.logged_in {
                Ok(())
            } else {
                Err(BrowserError::ElementNotFound(selector.to_owned()))
            }
        })
        .await
    }

    async fn is_present(&self, selector: &str) -> Result<bool, BrowserError> {
        self.op(|state, site| {
            let on_form = state.url.is_some() && !state.logged_in;
            Ok(on_form
                && (selector == site.selectors.phone_input
                    || selector == site.selectors.password_input
                    || selector == site.selectors.submit_button))
        })
        .await
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        self.op(|state, site| {
            if selector == site.selectors.balance && state.logged_in {
                Ok(Some(site.balance.lock().unwrap().clone()))
            } else {
                Ok(None)
            }
        })
        .await
    }

    async fn close(self) {
        self.site.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}
