//! Spawns the app on a random port with a store the test controls.
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, OnceLock,
    },
};

use anyhow::Result;
use async_trait::async_trait;
use notifyreg::{
    init_dbg_tracing,
    model::UserRecord,
    store::{self, InsertRowError, MemoryStore, StoreError, UserStore, DUPLICATE_REASON},
    App, AppState,
};
use reqwest::Response;
use serde_json::Value;
use tokio::net::TcpListener;

/// Trying to bind *port 0* will trigger an OS scan for an available port
/// which will then be bound to the application.
const TEST_SOCK_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 0);

/// Set `TEST_LOG` to see the app's tracing output.
fn init_test_subscriber() {
    static SUBSCRIBER: OnceLock<()> = OnceLock::new();
    SUBSCRIBER.get_or_init(|| {
        if std::env::var("TEST_LOG").is_ok() {
            init_dbg_tracing();
        }
    });
}

pub struct TestApp<S = MemoryStore> {
    pub addr: SocketAddr,
    pub http_client: reqwest::Client,
    pub store: Arc<S>,
}

impl TestApp {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(MemoryStore::new()).await
    }
}

impl<S: UserStore + 'static> TestApp<S> {
    /// Serves the app in a separate task, backed by `store`.
    pub async fn spawn_with(store: S) -> Result<Self> {
        init_test_subscriber();

        let store = Arc::new(store);
        let shared: Arc<dyn UserStore> = store.clone();
        let app_state = AppState::new(shared);

        let listener = TcpListener::bind(TEST_SOCK_ADDR).await?;
        let addr = listener.local_addr()?;

        tokio::spawn(notifyreg::serve(App::new(app_state, listener)));

        Ok(TestApp {
            addr,
            http_client: reqwest::Client::new(),
            store,
        })
    }

    pub async fn post_subscribe(&self, body: &Value) -> Result<Response> {
        let res = self
            .http_client
            .post(format!("http://{}/subscribe", self.addr))
            .json(body)
            .send()
            .await?;
        Ok(res)
    }

    pub async fn get_users(&self) -> Result<Response> {
        let res = self
            .http_client
            .get(format!("http://{}/users", self.addr))
            .send()
            .await?;
        Ok(res)
    }
}

/// Extracts the `error` reason from a `{"error": ...}` body.
pub async fn error_reason(res: Response) -> Result<String> {
    let body: Value = res.json().await?;
    let reason = body
        .get("error")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("response body has no error reason: {body}"))?;
    Ok(reason.to_string())
}

/// A store that fails on demand and counts the inserts it was asked to do.
#[derive(Debug, Default)]
pub struct FaultyStore {
    pub fail_count: bool,
    pub fail_list: bool,
    pub reject_insert: bool,
    pub duplicate_insert: bool,
    pub inserts: AtomicUsize,
}

impl FaultyStore {
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn unavailable() -> StoreError {
        StoreError::JobIncomplete {
            job_id: "test_job".to_string(),
        }
    }
}

#[async_trait]
impl UserStore for FaultyStore {
    fn backend(&self) -> &'static str {
        "faulty"
    }

    async fn count_by_user_id(&self, _user_id: &str) -> store::Result<u64> {
        if self.fail_count {
            return Err(Self::unavailable());
        }
        Ok(0)
    }

    async fn insert_record(&self, _record: &UserRecord) -> store::Result<Vec<InsertRowError>> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.duplicate_insert {
            return Ok(vec![InsertRowError::new(
                0,
                DUPLICATE_REASON,
                "user_id already exists",
            )]);
        }
        if self.reject_insert {
            return Ok(vec![InsertRowError::new(0, "invalid", "no such field: foo")]);
        }
        Ok(Vec::new())
    }

    async fn list_all(&self) -> store::Result<Vec<UserRecord>> {
        if self.fail_list {
            return Err(Self::unavailable());
        }
        Ok(Vec::new())
    }
}
