//! CLI subcommands.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::time::{Duration, SystemTime};

use anyhow::{Context, bail};
use clap::Subcommand;
use futures::StreamExt;
use tracing::{debug, info};

use a2a_client::{A2aClient, ConnectOptions, Priority, TaskRequest};
use a2a_identity::IdentityMaterial;

/// Subcommands of the `a2a` binary.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a task to a remote agent and print its response
    Send {
        /// Agent that should handle the task
        #[arg(long)]
        agent_id: String,
        /// Task payload as a JSON object
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Task priority: low, normal, high
        #[arg(long, default_value = "normal")]
        priority: Priority,
    },
    /// Subscribe to a topic and print one event per line
    Stream {
        /// Topic to subscribe to
        topic: String,
    },
    /// Fetch the local workload identity and print it
    Whoami,
}

pub async fn run(target: &str, options: ConnectOptions, command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Send {
            agent_id,
            payload,
            priority,
        } => {
            let request = build_request(agent_id, payload, *priority)?;
            let client = A2aClient::connect(target, options).await?;
            let result = send(&client, request).await;
            client.close().await?;
            result
        }
        Command::Stream { topic } => {
            let client = A2aClient::connect(target, options).await?;
            let result = stream(&client, topic).await;
            client.close().await?;
            result
        }
        Command::Whoami => whoami(&options).await,
    }
}

fn build_request(agent_id: &str, payload: &str, priority: Priority) -> anyhow::Result<TaskRequest> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("--payload is not valid JSON")?;
    Ok(TaskRequest::from_value(agent_id, payload)?.with_priority(priority))
}

async fn send(client: &A2aClient, request: TaskRequest) -> anyhow::Result<()> {
    debug!(agent_id = request.agent_id(), transport = %client.transport_kind(), "Sending task");
    let response = client.send(request).await?;

    let mut out = io::stdout();
    writeln!(out, "{}", serde_json::to_string_pretty(&response)?)?;

    if !response.is_success() {
        bail!(
            "task {} failed: {}",
            response.task_id,
            response.error.as_deref().unwrap_or(&response.status)
        );
    }
    Ok(())
}

async fn stream(client: &A2aClient, topic: &str) -> anyhow::Result<()> {
    let mut events = client.stream(topic).await?;
    info!(topic, transport = %client.transport_kind(), "Subscribed");

    let mut out = io::stdout();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
            event = events.next() => match event {
                Some(event) => writeln!(out, "{}", serde_json::to_string(&event?)?)?,
                None => {
                    info!(topic, "Stream ended by peer");
                    return Ok(());
                }
            },
        }
    }
}

async fn whoami(options: &ConnectOptions) -> anyhow::Result<()> {
    let material = options
        .identity()
        .fetch()
        .await
        .context("failed to fetch workload identity")?;

    let mut out = io::stdout();
    for line in describe_identity(&material, SystemTime::now()) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn describe_identity(material: &IdentityMaterial, now: SystemTime) -> Vec<String> {
    let not_after = material.not_after();
    let expires = not_after
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    let remaining = not_after.duration_since(now).map_or(0, |d| d.as_secs());
    vec![
        format!("SPIFFE ID:    {}", material.spiffe_id()),
        format!("Trust domain: {}", material.spiffe_id().trust_domain()),
        format!("Expires:      {expires} (unix, {remaining}s remaining)"),
        format!("Bundle certs: {}", material.trust_bundle().len()),
    ]
}
