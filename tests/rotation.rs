//! Issue/exchange behaviour of the rotation engine against in-memory stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use token_rotation::auth::{
    AnomalyNotifier, CredentialPair, RefreshToken, RefreshTokenHasher, SubmittedPair, TokenRotator,
    TokenSigner, ALERT_SUBJECT,
};
use token_rotation::email_client::{Mailer, RecordingMailer, SentEmail};
use token_rotation::error::{AppError, EmailError, StorageError};
use token_rotation::store::{
    MemoryAccountDirectory, MemoryRefreshTokenStore, RefreshTokenStore, RotationOutcome,
    VerificationRecord,
};
use uuid::Uuid;

const SIGNING_KEY: &[u8] = b"integration-test-signing-key-for-hs512-access-tokens";
const USER: &str = "user-1";
const ORIGIN: &str = "203.0.113.5";

pub struct TestEngine {
    pub rotator: TokenRotator,
    pub tokens: MemoryRefreshTokenStore,
    pub accounts: MemoryAccountDirectory,
    pub mailer: RecordingMailer,
}

fn accounts() -> MemoryAccountDirectory {
    MemoryAccountDirectory::new()
        .with_account(USER, "Ivan", "ivan.ivanov@example.com")
        .with_account("user-2", "Maria", "maria215314@example.com")
}

fn build(
    tokens: Arc<dyn RefreshTokenStore>,
    accounts: MemoryAccountDirectory,
    mailer: Arc<dyn Mailer>,
    expiry_seconds: i64,
) -> TokenRotator {
    TokenRotator::new(
        Arc::new(TokenSigner::new(SIGNING_KEY, expiry_seconds, "test")),
        RefreshTokenHasher::new(4),
        tokens,
        Arc::new(accounts),
        AnomalyNotifier::new(mailer),
    )
}

fn engine() -> TestEngine {
    let tokens = MemoryRefreshTokenStore::new();
    let accounts = accounts();
    let mailer = RecordingMailer::new();
    let rotator = build(
        Arc::new(tokens.clone()),
        accounts.clone(),
        Arc::new(mailer.clone()),
        900,
    );

    TestEngine {
        rotator,
        tokens,
        accounts,
        mailer,
    }
}

fn submitted(pair: &CredentialPair) -> SubmittedPair {
    SubmittedPair::from(pair)
}

fn assert_rejected(result: Result<CredentialPair, AppError>) {
    match result {
        Err(e) => assert!(e.is_rejection(), "Expected a rejection, got {:?}", e),
        Ok(_) => panic!("Expected a rejection, got a new pair"),
    }
}

async fn wait_for_mail(mailer: &RecordingMailer, count: usize) -> Vec<SentEmail> {
    for _ in 0..100 {
        let sent = mailer.sent();
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    mailer.sent()
}

// --- End-to-end scenarios ---

#[tokio::test]
async fn issue_then_exchange_returns_a_new_refresh_id() {
    let app = engine();

    let pair = app.rotator.issue(USER, ORIGIN).await.expect("Failed to issue");
    let next = app
        .rotator
        .exchange(&submitted(&pair), ORIGIN)
        .await
        .expect("Failed to exchange");

    assert_ne!(pair.refresh.id(), next.refresh.id());
    assert_ne!(pair.access, next.access);
    assert_eq!(next.refresh.origin(), ORIGIN);
}

#[tokio::test]
async fn reusing_an_exchanged_pair_is_rejected() {
    let app = engine();

    let pair = app.rotator.issue(USER, ORIGIN).await.unwrap();
    app.rotator.exchange(&submitted(&pair), ORIGIN).await.unwrap();

    assert_rejected(app.rotator.exchange(&submitted(&pair), ORIGIN).await);
}

#[tokio::test]
async fn access_token_with_flipped_byte_is_rejected() {
    let app = engine();
    let pair = app.rotator.issue(USER, ORIGIN).await.unwrap();

    let mut bytes = pair.access.clone().into_bytes();
    let index = bytes.len() - 10;
    bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
    let tampered = SubmittedPair {
        access: String::from_utf8(bytes).unwrap(),
        refresh: pair.refresh.encode(),
    };

    assert_rejected(app.rotator.exchange(&tampered, ORIGIN).await);
    // The genuine pair is still live
    assert!(app.tokens.contains(pair.refresh.id()));
}

#[tokio::test]
async fn rotated_chain_keeps_working() {
    let app = engine();
    let mut pair = app.rotator.issue(USER, ORIGIN).await.unwrap();

    for _ in 0..3 {
        pair = app.rotator.exchange(&submitted(&pair), ORIGIN).await.unwrap();
    }

    assert_eq!(app.tokens.len(), 1);
    assert!(app.tokens.contains(pair.refresh.id()));
}

// --- Binding integrity ---

#[tokio::test]
async fn mixing_pairs_of_the_same_user_is_rejected() {
    let app = engine();
    let first = app.rotator.issue(USER, ORIGIN).await.unwrap();
    let second = app.rotator.issue(USER, ORIGIN).await.unwrap();

    let mixed = SubmittedPair {
        access: first.access.clone(),
        refresh: second.refresh.encode(),
    };

    assert_rejected(app.rotator.exchange(&mixed, ORIGIN).await);
    assert!(app.tokens.contains(first.refresh.id()));
    assert!(app.tokens.contains(second.refresh.id()));
}

#[tokio::test]
async fn mixing_pairs_of_different_users_is_rejected() {
    let app = engine();
    let ivan = app.rotator.issue(USER, "192.0.2.1").await.unwrap();
    let maria = app.rotator.issue("user-2", "192.0.2.1").await.unwrap();

    let mixed = SubmittedPair {
        access: ivan.access.clone(),
        refresh: maria.refresh.encode(),
    };

    assert_rejected(app.rotator.exchange(&mixed, "192.0.2.1").await);
}

#[tokio::test]
async fn refresh_with_substituted_origin_is_rejected() {
    let app = engine();
    let pair = app.rotator.issue(USER, "192.0.2.1").await.unwrap();

    let forged = RefreshToken::new(pair.refresh.id(), "192.0.2.2").unwrap();
    let submitted = SubmittedPair {
        access: pair.access.clone(),
        refresh: forged.encode(),
    };

    assert_rejected(app.rotator.exchange(&submitted, "192.0.2.2").await);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn malformed_refresh_encodings_are_rejected() {
    let app = engine();
    let pair = app.rotator.issue(USER, ORIGIN).await.unwrap();

    let candidates = vec![
        "not base64 at all".to_string(),
        STANDARD.encode("no-separator"),
        STANDARD.encode(format!("{}|{}|extra", pair.refresh.id(), ORIGIN)),
        STANDARD.encode(format!("not-a-uuid|{}", ORIGIN)),
    ];

    for refresh in candidates {
        let submitted = SubmittedPair {
            access: pair.access.clone(),
            refresh,
        };
        assert_rejected(app.rotator.exchange(&submitted, ORIGIN).await);
    }
}

#[tokio::test]
async fn expired_access_token_is_rejected() {
    let tokens = MemoryRefreshTokenStore::new();
    let rotator = build(
        Arc::new(tokens.clone()),
        accounts(),
        Arc::new(RecordingMailer::new()),
        -3600,
    );

    let pair = rotator.issue(USER, ORIGIN).await.unwrap();

    assert_rejected(rotator.exchange(&submitted(&pair), ORIGIN).await);
    assert!(tokens.contains(pair.refresh.id()));
}

#[tokio::test]
async fn access_token_expired_seconds_ago_is_rejected() {
    let tokens = MemoryRefreshTokenStore::new();
    let rotator = build(
        Arc::new(tokens.clone()),
        accounts(),
        Arc::new(RecordingMailer::new()),
        -30,
    );

    let pair = rotator.issue(USER, ORIGIN).await.unwrap();

    assert_rejected(rotator.exchange(&submitted(&pair), ORIGIN).await);
    assert!(tokens.contains(pair.refresh.id()));
}

#[tokio::test]
async fn exchange_for_removed_account_is_rejected() {
    let app = engine();
    let pair = app.rotator.issue(USER, ORIGIN).await.unwrap();

    app.accounts.remove(USER);

    assert_rejected(app.rotator.exchange(&submitted(&pair), ORIGIN).await);
}

// --- Origin change alerts ---

#[tokio::test]
async fn exchange_from_new_origin_succeeds_and_alerts_once() {
    let app = engine();
    let pair = app.rotator.issue("user-2", "192.0.2.1").await.unwrap();

    let next = app
        .rotator
        .exchange(&submitted(&pair), "192.0.2.2")
        .await
        .expect("Exchange from a new origin should succeed");

    assert_eq!(next.refresh.origin(), "192.0.2.2");

    let sent = wait_for_mail(&app.mailer, 1).await;
    assert_eq!(sent.len(), 1, "Exactly one alert should be sent");
    assert_eq!(sent[0].recipient, "maria215314@example.com");
    assert_eq!(sent[0].subject, ALERT_SUBJECT);
    assert!(sent[0].body.starts_with("Maria,"));
    assert!(sent[0].body.contains("192.0.2.2"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test]
async fn exchange_from_same_origin_sends_nothing() {
    let app = engine();
    let pair = app.rotator.issue(USER, ORIGIN).await.unwrap();

    app.rotator.exchange(&submitted(&pair), ORIGIN).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(app.mailer.sent().is_empty());
}

struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send_email(&self, _: &str, _: &str, _: &str) -> Result<(), EmailError> {
        Err(EmailError::ServiceUnavailable("smtp relay down".to_string()))
    }
}

#[tokio::test]
async fn mail_failure_does_not_affect_exchange() {
    let tokens = MemoryRefreshTokenStore::new();
    let rotator = build(Arc::new(tokens.clone()), accounts(), Arc::new(FailingMailer), 900);

    let pair = rotator.issue(USER, "192.0.2.1").await.unwrap();
    let next = rotator
        .exchange(&submitted(&pair), "192.0.2.2")
        .await
        .expect("Alert failure must not surface");

    assert!(tokens.contains(next.refresh.id()));
    assert!(!tokens.contains(pair.refresh.id()));
}

// --- Concurrency and storage failures ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_exchanges_of_one_pair_succeed_once() {
    let app = engine();
    let pair = app.rotator.issue(USER, ORIGIN).await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let rotator = app.rotator.clone();
            let request = submitted(&pair);
            tokio::spawn(async move { rotator.exchange(&request, ORIGIN).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.expect("Exchange task panicked") {
            Ok(_) => successes += 1,
            Err(e) => assert!(e.is_rejection(), "Loser should be rejected, got {:?}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(app.tokens.len(), 1);
}

/// Store whose rotation transaction can be made to abort.
struct FlakyStore {
    inner: MemoryRefreshTokenStore,
    fail_rotation: AtomicBool,
}

#[async_trait]
impl RefreshTokenStore for FlakyStore {
    async fn insert(&self, record: &VerificationRecord) -> Result<(), StorageError> {
        self.inner.insert(record).await
    }

    async fn fetch_hash(&self, id: Uuid) -> Result<Option<String>, StorageError> {
        self.inner.fetch_hash(id).await
    }

    async fn rotate(
        &self,
        consumed: Uuid,
        replacement: VerificationRecord,
    ) -> Result<RotationOutcome, StorageError> {
        if self.fail_rotation.load(Ordering::SeqCst) {
            return Err(StorageError::TransactionAborted("connection reset".to_string()));
        }
        self.inner.rotate(consumed, replacement).await
    }
}

#[tokio::test]
async fn failed_rotation_keeps_the_original_pair_usable() {
    let inner = MemoryRefreshTokenStore::new();
    let store = Arc::new(FlakyStore {
        inner: inner.clone(),
        fail_rotation: AtomicBool::new(true),
    });
    let rotator = build(store.clone(), accounts(), Arc::new(RecordingMailer::new()), 900);

    let pair = rotator.issue(USER, ORIGIN).await.unwrap();

    let err = rotator
        .exchange(&submitted(&pair), ORIGIN)
        .await
        .expect_err("Rotation should fail");
    assert!(!err.is_rejection(), "Storage failure is not a rejection");
    assert!(inner.contains(pair.refresh.id()));
    assert_eq!(inner.len(), 1);

    store.fail_rotation.store(false, Ordering::SeqCst);
    rotator
        .exchange(&submitted(&pair), ORIGIN)
        .await
        .expect("Original pair should still be exchangeable");
}

/// Store whose rotation commits only after a delay.
struct SlowStore {
    inner: MemoryRefreshTokenStore,
    delay: Duration,
}

#[async_trait]
impl RefreshTokenStore for SlowStore {
    async fn insert(&self, record: &VerificationRecord) -> Result<(), StorageError> {
        self.inner.insert(record).await
    }

    async fn fetch_hash(&self, id: Uuid) -> Result<Option<String>, StorageError> {
        self.inner.fetch_hash(id).await
    }

    async fn rotate(
        &self,
        consumed: Uuid,
        replacement: VerificationRecord,
    ) -> Result<RotationOutcome, StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.rotate(consumed, replacement).await
    }
}

#[tokio::test]
async fn dropped_exchange_still_commits_and_alerts() {
    let inner = MemoryRefreshTokenStore::new();
    let mailer = RecordingMailer::new();
    let rotator = build(
        Arc::new(SlowStore {
            inner: inner.clone(),
            delay: Duration::from_millis(200),
        }),
        accounts(),
        Arc::new(mailer.clone()),
        900,
    );

    let pair = rotator.issue(USER, "192.0.2.1").await.unwrap();

    // The caller gives up while the rotation is still in flight
    let request = submitted(&pair);
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        rotator.exchange(&request, "192.0.2.2"),
    )
    .await;
    assert!(abandoned.is_err(), "Exchange should still be running");

    let sent = wait_for_mail(&mailer, 1).await;
    assert_eq!(sent.len(), 1, "A committed rotation must send its alert");
    assert_eq!(sent[0].recipient, "ivan.ivanov@example.com");
    assert!(!inner.contains(pair.refresh.id()));
    assert_eq!(inner.len(), 1);
}
