//! State machine tests for `AuthSession`, driven through an in-memory secret
//! store and an exchange that counts its calls instead of touching the network.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{Duration, Utc};
use keyfob_core::auth::{
    AuthError, AuthSession, CredentialResolver, ExchangeError, SessionState, Token, TokenCache,
    TokenExchange,
};
use keyfob_core::secrets::{
    store_credential, MemoryStore, SecretError, SecretKey, SecretStore, StoredCredential,
};

const DOMAIN: &str = "api.pixiv.net";
const HOST: &str = "pixiv.net";

#[derive(Clone, Default)]
struct Calls {
    refresh: Rc<Cell<u32>>,
    login: Rc<Cell<u32>>,
    refresh_tokens_seen: Rc<RefCell<Vec<String>>>,
}

impl Calls {
    fn total(&self) -> u32 {
        self.refresh.get() + self.login.get()
    }
}

struct CountingExchange {
    calls: Calls,
    refresh_result: Option<Token>,
    login_result: Option<Token>,
}

impl TokenExchange for CountingExchange {
    fn refresh(&self, refresh_token: &str) -> Result<Token, ExchangeError> {
        self.calls.refresh.set(self.calls.refresh.get() + 1);
        self.calls
            .refresh_tokens_seen
            .borrow_mut()
            .push(refresh_token.to_string());
        self.refresh_result
            .clone()
            .ok_or_else(|| ExchangeError::Rejected("invalid_grant".to_string()))
    }

    fn login(&self, _credential: &StoredCredential) -> Result<Token, ExchangeError> {
        self.calls.login.set(self.calls.login.get() + 1);
        self.login_result
            .clone()
            .ok_or_else(|| ExchangeError::Rejected("bad password".to_string()))
    }
}

/// Token store that reads fine but refuses every write
struct WriteFailingStore(MemoryStore);

impl SecretStore for WriteFailingStore {
    fn name(&self) -> &'static str {
        "write-failing"
    }

    fn store(&self, _key: &SecretKey, _value: &str) -> Result<(), SecretError> {
        Err(SecretError::BackendUnavailable("disk full".to_string()))
    }

    fn get(&self, key: &SecretKey) -> Result<Option<String>, SecretError> {
        self.0.get(key)
    }

    fn clear(&self, key: &SecretKey) -> Result<(), SecretError> {
        self.0.clear(key)
    }
}

/// Backend whose daemon is never reachable
struct UnreachableStore;

impl SecretStore for UnreachableStore {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn store(&self, _key: &SecretKey, _value: &str) -> Result<(), SecretError> {
        Err(SecretError::BackendUnavailable("no daemon".to_string()))
    }

    fn get(&self, _key: &SecretKey) -> Result<Option<String>, SecretError> {
        Err(SecretError::BackendUnavailable("no daemon".to_string()))
    }

    fn clear(&self, _key: &SecretKey) -> Result<(), SecretError> {
        Err(SecretError::BackendUnavailable("no daemon".to_string()))
    }
}

struct Fixture {
    tokens: MemoryStore,
    credentials: MemoryStore,
    calls: Calls,
}

impl Fixture {
    fn new() -> Self {
        Self {
            tokens: MemoryStore::new(),
            credentials: MemoryStore::new(),
            calls: Calls::default(),
        }
    }

    fn with_cached_token(self, token: &Token) -> Self {
        TokenCache::new(Box::new(self.tokens.clone()), DOMAIN)
            .store(token)
            .unwrap();
        self
    }

    fn with_credential(self) -> Self {
        let credential = StoredCredential {
            login: "alice".to_string(),
            secret: "hunter2".to_string(),
            account: None,
        };
        store_credential(&self.credentials, &SecretKey::new("api", HOST), &credential).unwrap();
        self
    }

    fn stored_token(&self) -> Option<Token> {
        TokenCache::new(Box::new(self.tokens.clone()), DOMAIN)
            .load()
            .unwrap()
    }

    /// `var` must be unique per test since the environment is process-wide
    fn session(
        &self,
        var: &str,
        refresh_result: Option<Token>,
        login_result: Option<Token>,
    ) -> AuthSession<CountingExchange> {
        let exchange = CountingExchange {
            calls: self.calls.clone(),
            refresh_result,
            login_result,
        };
        AuthSession::new(
            "Pixiv API",
            HOST,
            TokenCache::new(Box::new(self.tokens.clone()), DOMAIN),
            CredentialResolver::new(Box::new(self.credentials.clone()), "api"),
            exchange,
        )
        .with_force_refresh_var(var)
    }
}

fn token(access: &str, valid_for: Duration) -> Token {
    Token::new(
        access,
        format!("{}-refresh", access),
        Utc::now() + valid_for,
        "4242",
    )
}

#[test]
fn valid_cached_token_is_used_without_network() {
    let cached = token("cached", Duration::hours(1));
    let fixture = Fixture::new().with_cached_token(&cached);
    let mut session = fixture.session("KEYFOB_TEST_FORCE_VALID", None, None);

    let got = session.ensure_authenticated().unwrap().clone();

    assert_eq!(got, cached);
    assert_eq!(fixture.calls.total(), 0);
    assert_eq!(session.state(), &SessionState::Authenticated(cached));
}

#[test]
fn expired_token_is_refreshed_and_persisted() {
    let stale = token("stale", Duration::seconds(-10));
    let fresh = token("fresh", Duration::hours(1));
    let fixture = Fixture::new().with_cached_token(&stale);
    let mut session = fixture.session("KEYFOB_TEST_FORCE_EXPIRED", Some(fresh.clone()), None);

    let got = session.ensure_authenticated().unwrap().clone();

    assert_eq!(got, fresh);
    assert_eq!(fixture.calls.refresh.get(), 1);
    assert_eq!(fixture.calls.login.get(), 0);
    assert_eq!(
        *fixture.calls.refresh_tokens_seen.borrow(),
        vec!["stale-refresh".to_string()]
    );
    assert_eq!(fixture.stored_token(), Some(fresh));
    assert!(session.is_authenticated());
}

#[test]
fn override_forces_refresh_of_unexpired_token() {
    let var = "KEYFOB_TEST_FORCE_OVERRIDE";
    let cached = token("cached", Duration::hours(1));
    let fresh = token("fresh", Duration::hours(2));
    let fixture = Fixture::new().with_cached_token(&cached);
    let mut session = fixture.session(var, Some(fresh.clone()), None);

    std::env::set_var(var, "1");
    let got = session.ensure_authenticated().map(|t| t.clone());
    std::env::remove_var(var);

    assert_eq!(got.unwrap(), fresh);
    assert_eq!(fixture.calls.refresh.get(), 1);
    assert_eq!(fixture.stored_token(), Some(fresh));
}

#[test]
fn override_set_to_false_spelling_is_ignored() {
    let var = "KEYFOB_TEST_FORCE_OFF";
    let cached = token("cached", Duration::hours(1));
    let fixture = Fixture::new().with_cached_token(&cached);
    let mut session = fixture.session(var, None, None);

    std::env::set_var(var, "off");
    let got = session.ensure_authenticated().map(|t| t.clone());
    std::env::remove_var(var);

    assert_eq!(got.unwrap(), cached);
    assert_eq!(fixture.calls.total(), 0);
}

#[test]
fn failed_refresh_falls_back_to_one_login() {
    let stale = token("stale", Duration::seconds(-10));
    let fresh = token("fresh", Duration::hours(1));
    let fixture = Fixture::new().with_cached_token(&stale).with_credential();
    let mut session = fixture.session("KEYFOB_TEST_FORCE_FALLBACK", None, Some(fresh.clone()));

    let got = session.ensure_authenticated().unwrap().clone();

    assert_eq!(got, fresh);
    assert_eq!(fixture.calls.refresh.get(), 1);
    assert_eq!(fixture.calls.login.get(), 1);
    assert_eq!(fixture.stored_token(), Some(fresh));
}

#[test]
fn failed_refresh_keeps_stale_token_cached() {
    let stale = token("stale", Duration::seconds(-10));
    let fixture = Fixture::new().with_cached_token(&stale);
    let mut session = fixture.session("KEYFOB_TEST_FORCE_KEEP_STALE", None, None);

    assert!(session.ensure_authenticated().is_err());
    assert_eq!(fixture.stored_token(), Some(stale));
}

#[test]
fn no_token_uses_credential_without_refresh() {
    let fresh = token("fresh", Duration::hours(1));
    let fixture = Fixture::new().with_credential();
    let mut session = fixture.session("KEYFOB_TEST_FORCE_LOGIN_ONLY", None, Some(fresh.clone()));

    assert_eq!(session.ensure_authenticated().unwrap(), &fresh);
    assert_eq!(fixture.calls.refresh.get(), 0);
    assert_eq!(fixture.calls.login.get(), 1);
}

#[test]
fn nothing_available_exhausts_without_network() {
    let fixture = Fixture::new();
    let mut session = fixture.session("KEYFOB_TEST_FORCE_NOTHING", None, None);

    let err = session.ensure_authenticated().unwrap_err();

    assert!(matches!(
        err,
        AuthError::AllCredentialSourcesExhausted { ref service } if service == "Pixiv API"
    ));
    assert_eq!(fixture.calls.total(), 0);
    assert_eq!(session.state(), &SessionState::LoginFailed);
    assert!(!session.is_authenticated());
}

#[test]
fn failed_session_does_not_retry() {
    let fixture = Fixture::new().with_credential();
    let mut session = fixture.session("KEYFOB_TEST_FORCE_NO_RETRY", None, None);

    assert!(session.ensure_authenticated().unwrap_err().is_exhausted());
    assert!(session.ensure_authenticated().unwrap_err().is_exhausted());

    assert_eq!(fixture.calls.login.get(), 1);
    assert_eq!(session.state(), &SessionState::LoginFailed);
}

#[test]
fn second_call_on_authenticated_session_is_a_noop() {
    let stale = token("stale", Duration::seconds(-10));
    let fresh = token("fresh", Duration::hours(1));
    let fixture = Fixture::new().with_cached_token(&stale);
    let mut session = fixture.session("KEYFOB_TEST_FORCE_TWICE", Some(fresh.clone()), None);

    session.ensure_authenticated().unwrap();
    let again = session.ensure_authenticated().unwrap().clone();

    assert_eq!(again, fresh);
    assert_eq!(fixture.calls.total(), 1);
}

#[test]
fn corrupt_cached_token_is_treated_as_absent() {
    let fresh = token("fresh", Duration::hours(1));
    let fixture = Fixture::new().with_credential();
    fixture
        .tokens
        .store(&SecretKey::new("oauth-token", DOMAIN), "{not json")
        .unwrap();
    let mut session = fixture.session("KEYFOB_TEST_FORCE_CORRUPT", None, Some(fresh.clone()));

    assert_eq!(session.ensure_authenticated().unwrap(), &fresh);
    assert_eq!(fixture.calls.refresh.get(), 0);
    assert_eq!(fixture.stored_token(), Some(fresh));
}

#[test]
fn persist_failure_is_propagated() {
    let stale = token("stale", Duration::seconds(-10));
    let fixture = Fixture::new().with_cached_token(&stale);
    let calls = Calls::default();
    let exchange = CountingExchange {
        calls: calls.clone(),
        refresh_result: Some(token("fresh", Duration::hours(1))),
        login_result: None,
    };
    let mut session = AuthSession::new(
        "Pixiv API",
        HOST,
        TokenCache::new(Box::new(WriteFailingStore(fixture.tokens.clone())), DOMAIN),
        CredentialResolver::new(Box::new(MemoryStore::new()), "api"),
        exchange,
    )
    .with_force_refresh_var("KEYFOB_TEST_FORCE_PERSIST");

    let err = session.ensure_authenticated().unwrap_err();

    assert!(matches!(err, AuthError::Persist(_)));
    assert_eq!(calls.refresh.get(), 1);
    assert_eq!(session.state(), &SessionState::Unauthenticated);
    assert_eq!(fixture.stored_token(), Some(stale));
}

#[test]
fn unreachable_credential_backend_is_an_error_not_exhaustion() {
    let calls = Calls::default();
    let exchange = CountingExchange {
        calls: calls.clone(),
        refresh_result: None,
        login_result: None,
    };
    let mut session = AuthSession::new(
        "Pixiv API",
        HOST,
        TokenCache::new(Box::new(MemoryStore::new()), DOMAIN),
        CredentialResolver::new(Box::new(UnreachableStore), "api"),
        exchange,
    )
    .with_force_refresh_var("KEYFOB_TEST_FORCE_UNREACHABLE");

    let err = session.ensure_authenticated().unwrap_err();

    assert!(matches!(
        err,
        AuthError::Secret(SecretError::BackendUnavailable(_))
    ));
    assert_eq!(calls.total(), 0);
    assert_eq!(session.state(), &SessionState::Unauthenticated);
}
