// SPDX-License-Identifier: Apache-2.0

//! The sandboxed script runtime shared by the transformation engine (D) and
//! the alert engine (E) (§4.4, §4.5, §9): a frozen QuickJS context exposing
//! only `msg`, `console`, `JSON`, and a curated read-only `db`, run under a
//! hard wall-clock timeout.

mod errors;
mod json_bridge;
mod store_adapter;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rquickjs::function::Async as AsyncFn;
use rquickjs::{AsyncContext, AsyncRuntime, CatchResultExt, Ctx, Object};
use tracing::{debug, warn};

pub use errors::{SandboxError, guard_select};

/// The curated, read-only query surface a sandboxed script sees as `db`.
/// `transform-engine` and `alert-engine` each provide an implementation
/// backed by `store::Store`; tests use an in-memory fake.
#[async_trait]
pub trait SandboxDb: Send + Sync {
    async fn all(&self, sql: &str) -> Result<Vec<serde_json::Value>, SandboxError>;
    async fn get(&self, sql: &str) -> Result<Option<serde_json::Value>, SandboxError>;
}

/// Per-invocation frozen context: `msg = { topic, brokerId, payload }`.
pub struct ScriptContext {
    pub topic: String,
    pub broker_id: String,
    pub payload: serde_json::Value,
}

/// One sandbox configuration (just the timeout): D uses 2000ms, E uses
/// 1000ms (§5).
#[derive(Clone, Copy, Debug)]
pub struct Sandbox {
    timeout: Duration,
}

impl Sandbox {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run a transform target's code (§4.4). Returns the mutated `msg`'s
    /// `payload` to publish, or `None` if the script returned a null-ish
    /// value (skip).
    pub async fn run_transform(
        &self,
        code: &str,
        ctx: ScriptContext,
        db: Option<Arc<dyn SandboxDb>>,
    ) -> Result<Option<serde_json::Value>, SandboxError> {
        let result = self.run(code, ctx, db).await?;
        Ok(match result {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(false) => None,
            other => Some(other),
        })
    }

    /// Run an alert condition (§4.5). The script must return (or resolve
    /// to) a boolean; anything else is treated as `false`.
    pub async fn run_predicate(
        &self,
        code: &str,
        ctx: ScriptContext,
        db: Option<Arc<dyn SandboxDb>>,
    ) -> Result<bool, SandboxError> {
        let result = self.run(code, ctx, db).await?;
        Ok(matches!(result, serde_json::Value::Bool(true)))
    }

    async fn run(
        &self,
        code: &str,
        script_ctx: ScriptContext,
        db: Option<Arc<dyn SandboxDb>>,
    ) -> Result<serde_json::Value, SandboxError> {
        let runtime = AsyncRuntime::new().map_err(|e| SandboxError::Engine(e.to_string()))?;
        let deadline = Instant::now() + self.timeout;
        runtime
            .set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)))
            .await;

        let context = AsyncContext::full(&runtime)
            .await
            .map_err(|e| SandboxError::Engine(e.to_string()))?;

        let wrapped = format!("(async function() {{\n{code}\n}})()");

        let eval = context.with(|ctx| -> Result<_, SandboxError> {
            install_globals(&ctx, &script_ctx, db).map_err(|e| SandboxError::Engine(e.to_string()))?;
            let promise: rquickjs::Promise = ctx
                .eval(wrapped)
                .catch(&ctx)
                .map_err(|e| SandboxError::Thrown(e.to_string()))?;
            Ok(promise)
        })?;

        let awaited = tokio::time::timeout(self.timeout, async {
            context
                .with(|ctx| {
                    let promise = eval;
                    promise.into_future::<rquickjs::Value>()
                })
                .await
        })
        .await
        .map_err(|_| SandboxError::Timeout(self.timeout))?;

        let value = context
            .with(|ctx| awaited.catch(&ctx).map(|v| json_bridge::js_to_json(&v)))
            .await
            .map_err(|e| SandboxError::Thrown(e.to_string()))?;

        Ok(value)
    }
}

fn install_globals<'js>(
    ctx: &Ctx<'js>,
    script_ctx: &ScriptContext,
    db: Option<Arc<dyn SandboxDb>>,
) -> rquickjs::Result<()> {
    let msg = Object::new(ctx.clone())?;
    msg.set("topic", script_ctx.topic.clone())?;
    msg.set("brokerId", script_ctx.broker_id.clone())?;
    msg.set("payload", json_bridge::json_to_js(ctx, &script_ctx.payload)?)?;
    ctx.globals().set("msg", msg)?;

    let console = Object::new(ctx.clone())?;
    console.set(
        "log",
        rquickjs::Function::new(ctx.clone(), |args: rquickjs::Rest<String>| {
            debug!(target: "sandbox.console", "{}", args.0.join(" "));
        }),
    )?;
    console.set(
        "warn",
        rquickjs::Function::new(ctx.clone(), |args: rquickjs::Rest<String>| {
            warn!(target: "sandbox.console", "{}", args.0.join(" "));
        }),
    )?;
    console.set(
        "error",
        rquickjs::Function::new(ctx.clone(), |args: rquickjs::Rest<String>| {
            warn!(target: "sandbox.console", "{}", args.0.join(" "));
        }),
    )?;
    ctx.globals().set("console", console)?;

    let db_obj = Object::new(ctx.clone())?;
    if let Some(db) = db {
        let db_all = db.clone();
        db_obj.set(
            "all",
            rquickjs::Function::new(
                ctx.clone(),
                AsyncFn(move |sql: String| {
                    let db = db_all.clone();
                    async move { run_guarded_all(db, sql).await }
                }),
            ),
        )?;
        let db_get = db.clone();
        db_obj.set(
            "get",
            rquickjs::Function::new(
                ctx.clone(),
                AsyncFn(move |sql: String| {
                    let db = db_get.clone();
                    async move { run_guarded_get(db, sql).await }
                }),
            ),
        )?;
    }
    ctx.globals().set("db", db_obj)?;

    Ok(())
}

async fn run_guarded_all(
    db: Arc<dyn SandboxDb>,
    sql: String,
) -> rquickjs::Result<Vec<serde_json::Value>> {
    guard_select(&sql).map_err(to_js_error)?;
    db.all(&sql).await.map_err(to_js_error)
}

async fn run_guarded_get(
    db: Arc<dyn SandboxDb>,
    sql: String,
) -> rquickjs::Result<Option<serde_json::Value>> {
    guard_select(&sql).map_err(to_js_error)?;
    db.get(&sql).await.map_err(to_js_error)
}

fn to_js_error(e: SandboxError) -> rquickjs::Error {
    rquickjs::Error::Exception
        .context(e.to_string())
        .unwrap_or(rquickjs::Error::Exception)
}
