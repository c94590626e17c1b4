//! Command handlers.

use anyhow::{Result, bail};
use medassist_core::{ExecutionError, MedicalResponse};

use crate::bootstrap::CliContext;

pub async fn status(ctx: &CliContext) -> Result<()> {
    let connected = ctx.assistant.check_now().await;
    let snapshot = ctx.assistant.connection().snapshot();
    let info = ctx.assistant.active_endpoint_info();

    if connected {
        let endpoint = info
            .endpoint
            .map_or_else(|| "-".to_string(), |ep| ep.to_string());
        println!("Connected to {endpoint}");
        println!("Model: {}", info.model_name);
        if snapshot.models.is_empty() {
            println!("No models installed.");
        } else {
            println!("Installed models:");
            for model in &snapshot.models {
                println!("  {model}");
            }
        }
        return Ok(());
    }

    println!("No inference service found. Tried:");
    for candidate in ctx.profile.candidates() {
        println!("  {candidate}");
    }
    println!();
    println!("{}", ExecutionError::NotInitialized.guidance());
    bail!("inference service unreachable")
}

pub async fn ask(ctx: &CliContext, question: &str, json: bool) -> Result<()> {
    if !ctx.assistant.check_now().await {
        tracing::warn!("No endpoint answered the health check; trying the last known one");
    }

    match ctx.assistant.generate_medical_response(question).await {
        Ok(response) if json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Ok(response) => {
            print_response(&response);
            Ok(())
        }
        Err(e) => Err(failure_report(e)),
    }
}

/// The error with its guidance on top; `main` prints it once.
fn failure_report(err: ExecutionError) -> anyhow::Error {
    let guidance = err.guidance();
    anyhow::Error::new(err).context(guidance)
}

fn print_response(response: &MedicalResponse) {
    if let Some(action) = response.emergency_action() {
        println!("EMERGENCY: {action}");
        println!();
    }

    println!("{}", response.text);

    if let Some(ref guidance) = response.guidance {
        if !guidance.recommendations.is_empty() {
            println!();
            println!("Recommendations:");
            for item in &guidance.recommendations {
                println!("  - {item}");
            }
        }
        if let Some(ref follow_up) = guidance.follow_up {
            println!();
            println!("{follow_up}");
        }
    }

    println!();
    println!(
        "[{} | {} ms | confidence {:.1}]",
        response.model_name, response.elapsed_ms, response.confidence
    );
}

pub async fn watch(ctx: &CliContext) -> Result<()> {
    let subscription = ctx.assistant.on_connection_change(|state| {
        let endpoint = state
            .active_endpoint
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        if state.connected {
            println!("connected    {endpoint}");
        } else {
            println!("disconnected (last: {endpoint})");
        }
    });

    let connection = ctx.assistant.connection();
    connection.start();
    println!(
        "Checking every {} ms. Press Ctrl-C to stop.",
        ctx.profile.health_check_interval_ms
    );

    let result = tokio::signal::ctrl_c().await;
    connection.pause();
    subscription.unsubscribe();
    result?;
    Ok(())
}

pub fn profile(ctx: &CliContext) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&ctx.profile)?);
    Ok(())
}
