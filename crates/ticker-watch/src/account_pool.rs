//! Round-robin pool of logged-in accounts and the polling stream built on it.
//!
//! Accounts that fail to log in are dropped for the life of the process. Each
//! cycle issues exactly one request with the current account and then moves to
//! the next one, whatever the outcome, so a rate-limited or failing account
//! never stalls the rotation.

use futures_util::stream::{self, Stream};
use social_client::{
    AccountCredentials, PostBatch, SessionFactory, SocialError, SocialSession,
};
use std::time::Duration;
use tokio::sync::watch;

use crate::error::PoolError;

struct Account {
    username: String,
    session: Box<dyn SocialSession>,
    rate_limit_streak: u32,
}

/// Result of a single fetch cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    Batch(PostBatch),
    Empty { account: String },
    RateLimited { account: String },
    Failed { account: String, error: SocialError },
}

impl CycleOutcome {
    pub fn account(&self) -> &str {
        match self {
            CycleOutcome::Batch(batch) => &batch.account,
            CycleOutcome::Empty { account }
            | CycleOutcome::RateLimited { account }
            | CycleOutcome::Failed { account, .. } => account,
        }
    }
}

pub struct AccountPool {
    pending: Vec<AccountCredentials>,
    accounts: Vec<Account>,
    next_index: usize,
    fetch_delay: Duration,
}

impl AccountPool {
    pub fn new(credentials: Vec<AccountCredentials>, fetch_delay: Duration) -> Result<Self, PoolError> {
        if credentials.is_empty() {
            return Err(PoolError::NoAccountsConfigured);
        }

        Ok(Self {
            pending: credentials,
            accounts: Vec::new(),
            next_index: 0,
            fetch_delay,
        })
    }

    /// Log in every configured account independently. Fails only when none succeed.
    pub async fn initialize_all(&mut self, factory: &dyn SessionFactory) -> Result<usize, PoolError> {
        let pending = std::mem::take(&mut self.pending);
        let attempted = pending.len();
        tracing::info!("Logging into {} configured account(s)...", attempted);

        for (i, credentials) in pending.into_iter().enumerate() {
            tracing::info!("Attempting to log in as account #{} ({})", i + 1, credentials.username);
            match factory.login(&credentials).await {
                Ok(session) => {
                    tracing::info!(
                        "Login successful for account #{} ({})",
                        i + 1,
                        session.username()
                    );
                    self.accounts.push(Account {
                        username: credentials.username,
                        session,
                        rate_limit_streak: 0,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        account = %credentials.username,
                        "Login failed for account #{}, dropping it: {}",
                        i + 1,
                        e
                    );
                }
            }
        }

        if self.accounts.is_empty() {
            return Err(PoolError::NoUsableAccounts { attempted });
        }

        tracing::info!("Successfully initialized {} client(s)", self.accounts.len());
        Ok(self.accounts.len())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Logged-in accounts in rotation order.
    pub fn usernames(&self) -> Vec<&str> {
        self.accounts.iter().map(|a| a.username.as_str()).collect()
    }

    /// Run one fetch with the current account and advance the rotation.
    /// `None` when no account is available.
    pub async fn poll_once(&mut self, target_user_id: &str, page_size: usize) -> Option<CycleOutcome> {
        if self.is_empty() {
            return None;
        }

        let len = self.accounts.len();
        let index = self.next_index % len;
        self.next_index = (index + 1) % len;

        let account = &mut self.accounts[index];
        tracing::debug!("Fetching with account '{}'...", account.username);

        let outcome = match account.session.get_user_posts(target_user_id, page_size).await {
            Ok(posts) => {
                account.rate_limit_streak = 0;
                if posts.is_empty() {
                    CycleOutcome::Empty {
                        account: account.username.clone(),
                    }
                } else {
                    tracing::debug!("'{}' fetched {} post(s)", account.username, posts.len());
                    CycleOutcome::Batch(PostBatch {
                        account: account.username.clone(),
                        posts,
                    })
                }
            }
            Err(e) if e.is_rate_limited() => {
                account.rate_limit_streak += 1;
                tracing::warn!(
                    account = %account.username,
                    streak = account.rate_limit_streak,
                    "Rate limit hit for '{}'. Skipping this turn.",
                    account.username
                );
                CycleOutcome::RateLimited {
                    account: account.username.clone(),
                }
            }
            Err(e) => {
                tracing::warn!(
                    account = %account.username,
                    "Fetch failed for '{}': {}",
                    account.username,
                    e
                );
                CycleOutcome::Failed {
                    account: account.username.clone(),
                    error: e,
                }
            }
        };

        Some(outcome)
    }

    /// Endless, pull-driven stream of non-empty batches.
    ///
    /// The fixed delay is slept between cycles and races `shutdown`; the stream
    /// ends once `shutdown` holds `true` (or its sender is gone) or the pool is empty.
    pub fn fetch_stream(
        self,
        target_user_id: String,
        page_size: usize,
        shutdown: watch::Receiver<bool>,
    ) -> impl Stream<Item = PostBatch> {
        let state = FetchState {
            pool: self,
            target_user_id,
            page_size,
            shutdown,
            first_cycle: true,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if !state.first_cycle {
                    let delay = state.pool.fetch_delay;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = state.shutdown.changed() => {
                            if changed.is_err() {
                                tracing::info!("Shutdown channel closed; stopping fetch loop");
                                return None;
                            }
                        }
                    }
                }
                state.first_cycle = false;

                if *state.shutdown.borrow() {
                    tracing::info!("Fetch loop cancelled");
                    return None;
                }

                match state
                    .pool
                    .poll_once(&state.target_user_id, state.page_size)
                    .await
                {
                    Some(CycleOutcome::Batch(batch)) => return Some((batch, state)),
                    Some(CycleOutcome::Failed { account, error }) => {
                        tracing::trace!("No batch from '{}' this cycle: {}", account, error);
                    }
                    Some(other) => {
                        tracing::trace!("No batch from '{}' this cycle", other.account());
                    }
                    None => {
                        tracing::error!("No accounts left in the pool; stopping fetch loop");
                        return None;
                    }
                }
            }
        })
    }
}

struct FetchState {
    pool: AccountPool,
    target_user_id: String,
    page_size: usize,
    shutdown: watch::Receiver<bool>,
    first_cycle: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use social_client::{Post, SocialResult};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    enum Behavior {
        Posts(Vec<Post>),
        Empty,
        RateLimited,
        Fail,
    }

    struct MockSession {
        username: String,
        behavior: Behavior,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SocialSession for MockSession {
        async fn get_user_posts(&self, _user_id: &str, count: usize) -> SocialResult<Vec<Post>> {
            self.calls.lock().unwrap().push(self.username.clone());
            match &self.behavior {
                Behavior::Posts(posts) => Ok(posts.iter().take(count).cloned().collect()),
                Behavior::Empty => Ok(Vec::new()),
                Behavior::RateLimited => Err(SocialError::RateLimited(self.username.clone())),
                Behavior::Fail => Err(SocialError::Timeout("deadline elapsed".into())),
            }
        }

        fn username(&self) -> &str {
            &self.username
        }
    }

    /// Accounts without a behavior fail to log in.
    struct MockFactory {
        behaviors: HashMap<String, Behavior>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockFactory {
        fn new(behaviors: &[(&str, Behavior)]) -> Self {
            Self {
                behaviors: behaviors
                    .iter()
                    .map(|(name, b)| (name.to_string(), b.clone()))
                    .collect(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionFactory for MockFactory {
        async fn login(
            &self,
            credentials: &AccountCredentials,
        ) -> SocialResult<Box<dyn SocialSession>> {
            match self.behaviors.get(&credentials.username) {
                Some(behavior) => Ok(Box::new(MockSession {
                    username: credentials.username.clone(),
                    behavior: behavior.clone(),
                    calls: self.calls.clone(),
                })),
                None => Err(SocialError::Authentication("bad password".into())),
            }
        }
    }

    fn creds(names: &[&str]) -> Vec<AccountCredentials> {
        names
            .iter()
            .map(|name| AccountCredentials {
                email: format!("{}@example.com", name),
                username: name.to_string(),
                password: "pw".to_string(),
            })
            .collect()
    }

    fn posts(ids: &[&str]) -> Vec<Post> {
        ids.iter().map(|id| Post::new(*id, format!("post {} $TSLA", id))).collect()
    }

    async fn ready_pool(names: &[&str], factory: &MockFactory, delay: Duration) -> AccountPool {
        let mut pool = AccountPool::new(creds(names), delay).unwrap();
        pool.initialize_all(factory).await.unwrap();
        pool
    }

    #[test]
    fn test_no_accounts_configured() {
        assert!(matches!(
            AccountPool::new(Vec::new(), Duration::ZERO),
            Err(PoolError::NoAccountsConfigured)
        ));
    }

    #[tokio::test]
    async fn test_failed_logins_are_dropped() {
        let factory = MockFactory::new(&[("alpha", Behavior::Empty), ("charlie", Behavior::Empty)]);
        let pool = ready_pool(&["alpha", "bravo", "charlie"], &factory, Duration::ZERO).await;

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.usernames(), vec!["alpha", "charlie"]);
    }

    #[tokio::test]
    async fn test_all_logins_failing_is_fatal() {
        let factory = MockFactory::new(&[]);
        let mut pool = AccountPool::new(creds(&["alpha", "bravo"]), Duration::ZERO).unwrap();

        assert!(matches!(
            pool.initialize_all(&factory).await,
            Err(PoolError::NoUsableAccounts { attempted: 2 })
        ));
        assert!(pool.is_empty());
        assert!(pool.poll_once("818071", 20).await.is_none());
    }

    #[tokio::test]
    async fn test_round_robin_visits_each_account_once_per_round() {
        let factory = MockFactory::new(&[
            ("alpha", Behavior::Posts(posts(&["1"]))),
            ("bravo", Behavior::Fail),
            ("charlie", Behavior::RateLimited),
        ]);
        let mut pool = ready_pool(&["alpha", "bravo", "charlie"], &factory, Duration::ZERO).await;

        for _ in 0..6 {
            pool.poll_once("818071", 20).await.unwrap();
        }

        assert_eq!(
            factory.calls(),
            vec!["alpha", "bravo", "charlie", "alpha", "bravo", "charlie"]
        );
    }

    #[tokio::test]
    async fn test_rate_limit_moves_to_next_account() {
        let factory = MockFactory::new(&[
            ("alpha", Behavior::Empty),
            ("bravo", Behavior::RateLimited),
            ("charlie", Behavior::Posts(posts(&["9"]))),
        ]);
        let mut pool = ready_pool(&["alpha", "bravo", "charlie"], &factory, Duration::ZERO).await;

        assert!(matches!(
            pool.poll_once("818071", 20).await,
            Some(CycleOutcome::Empty { .. })
        ));
        let limited = pool.poll_once("818071", 20).await.unwrap();
        assert!(matches!(limited, CycleOutcome::RateLimited { .. }));
        assert_eq!(limited.account(), "bravo");

        let next = pool.poll_once("818071", 20).await.unwrap();
        assert_eq!(next.account(), "charlie");
        assert!(matches!(next, CycleOutcome::Batch(_)));
        // Rate-limited accounts stay in the pool.
        assert_eq!(pool.len(), 3);
    }

    #[tokio::test]
    async fn test_page_size_is_forwarded() {
        let factory = MockFactory::new(&[("alpha", Behavior::Posts(posts(&["1", "2", "3"])))]);
        let mut pool = ready_pool(&["alpha"], &factory, Duration::ZERO).await;

        match pool.poll_once("818071", 2).await {
            Some(CycleOutcome::Batch(batch)) => assert_eq!(batch.posts.len(), 2),
            other => panic!("expected a batch, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_skips_empty_cycles() {
        let factory = MockFactory::new(&[
            ("alpha", Behavior::Empty),
            ("bravo", Behavior::RateLimited),
            ("charlie", Behavior::Posts(posts(&["5"]))),
        ]);
        let pool = ready_pool(&["alpha", "bravo", "charlie"], &factory, Duration::from_secs(60)).await;
        let (_tx, rx) = watch::channel(false);

        let stream = pool.fetch_stream("818071".into(), 20, rx);
        tokio::pin!(stream);

        let started = tokio::time::Instant::now();
        let batch = stream.next().await.unwrap();
        assert_eq!(batch.account, "charlie");
        assert_eq!(batch.posts[0].id, "5");
        // Two delays separate the three cycles.
        assert!(started.elapsed() >= Duration::from_secs(120));
        assert_eq!(factory.calls(), vec!["alpha", "bravo", "charlie"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_stops_on_shutdown() {
        let factory = MockFactory::new(&[("alpha", Behavior::Posts(posts(&["1"])))]);
        let pool = ready_pool(&["alpha"], &factory, Duration::from_secs(60)).await;
        let (tx, rx) = watch::channel(false);

        let stream = pool.fetch_stream("818071".into(), 20, rx);
        tokio::pin!(stream);

        assert!(stream.next().await.is_some());
        tx.send(true).unwrap();
        assert!(stream.next().await.is_none());
        // No request is issued after cancellation.
        assert_eq!(factory.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_stops_when_sender_dropped() {
        let factory = MockFactory::new(&[("alpha", Behavior::Posts(posts(&["1"])))]);
        let pool = ready_pool(&["alpha"], &factory, Duration::from_secs(60)).await;
        let (tx, rx) = watch::channel(false);

        let stream = pool.fetch_stream("818071".into(), 20, rx);
        tokio::pin!(stream);

        assert!(stream.next().await.is_some());
        drop(tx);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_cancelled_before_first_cycle() {
        let factory = MockFactory::new(&[("alpha", Behavior::Posts(posts(&["1"])))]);
        let pool = ready_pool(&["alpha"], &factory, Duration::ZERO).await;
        let (_tx, rx) = watch::channel(true);

        let stream = pool.fetch_stream("818071".into(), 20, rx);
        tokio::pin!(stream);

        assert!(stream.next().await.is_none());
        assert!(factory.calls().is_empty());
    }
}
