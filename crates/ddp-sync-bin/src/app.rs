//! Command implementations.

use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use client_storage::{create_storage, SecureStorage};
use ddp_client::{ClientResult, DdpClient, SubscribeCallbacks};
use ddp_config_and_utils::{Config, Paths};
use ddp_websocket::{WebSocketConfig, WebSocketTransport};
use mirror_store::{FindOptions, Selector};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::Commands;

pub(crate) async fn run(command: Commands, config: Config, paths: Paths) -> anyhow::Result<()> {
    paths.ensure_dirs()?;
    let url = config.endpoint_url()?;
    let storage: Arc<dyn SecureStorage> = Arc::from(create_storage(&paths));

    let (transport, events) = WebSocketTransport::new(WebSocketConfig {
        url: url.to_string(),
        ..Default::default()
    })?;

    let client = DdpClient::new(config, storage);
    client.connect(Rc::new(transport));

    let driver = tokio::task::spawn_local({
        let client = client.clone();
        async move { client.run(events).await }
    });

    let result = match command {
        Commands::Call { method, args } => call(&client, &method, args).await,
        Commands::Watch {
            publication,
            params,
            collection,
        } => watch(&client, &publication, params, &collection).await,
        Commands::Login { user, password } => login(&client, &user, &password).await,
        Commands::Logout => logout(&client).await,
    };

    client.disconnect();
    driver.abort();
    result
}

/// Parse each argument as JSON, falling back to a plain string.
fn parse_args(args: Vec<String>) -> Vec<Value> {
    args.into_iter()
        .map(|arg| serde_json::from_str(&arg).unwrap_or(Value::String(arg)))
        .collect()
}

async fn call(client: &DdpClient, method: &str, args: Vec<String>) -> anyhow::Result<()> {
    let result = client
        .call_async(method, parse_args(args))
        .await
        .with_context(|| format!("method {method} failed"))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn watch(
    client: &DdpClient,
    publication: &str,
    params: Vec<String>,
    collection: &str,
) -> anyhow::Result<()> {
    let name = publication.to_string();
    let subscription = client.subscribe(
        publication,
        parse_args(params),
        SubscribeCallbacks::on_ready(move || info!(publication = %name, "Subscription ready"))
            .with_error(|e| warn!(error = %e, "Subscription failed")),
    );

    let docs = client.collection(collection);
    let printer = client.tracker().autorun(move |_| {
        let snapshot = docs.find(Selector::All, FindOptions::default()).fetch();
        match serde_json::to_string(&snapshot) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Could not encode snapshot"),
        }
    });

    tokio::signal::ctrl_c().await?;
    printer.stop();
    subscription.stop();
    Ok(())
}

/// Bridge a callback-style client operation onto a future.
async fn completion<T: 'static>(
    start: impl FnOnce(Box<dyn FnOnce(ClientResult<T>)>),
) -> anyhow::Result<T> {
    let (tx, rx) = oneshot::channel();
    start(Box::new(move |outcome| {
        let _ = tx.send(outcome);
    }));
    let outcome = rx.await.map_err(|_| anyhow!("client dropped the request"))?;
    Ok(outcome?)
}

async fn login(client: &DdpClient, user: &str, password: &str) -> anyhow::Result<()> {
    let result = completion(|done| client.login_with_password(user, password, None, done)).await?;
    println!("Logged in as {}", result.id);
    Ok(())
}

async fn logout(client: &DdpClient) -> anyhow::Result<()> {
    completion(|done| client.logout(done)).await?;
    println!("Logged out");
    Ok(())
}
