//! CLI bootstrap - the composition root.
//!
//! The only place where the transport, the profile and the assistant service
//! are wired together. Command handlers receive the composed [`CliContext`].

use std::sync::Arc;

use anyhow::{Context, Result};
use medassist_core::{
    AssistantSettings, HostDescriptor, PlatformProfile, resolve_profile, validate_settings,
};
use medassist_runtime::{MedicalAssistant, OllamaTransport};
use tracing::debug;

use crate::parser::Cli;

/// Fully composed application context for CLI commands.
pub struct CliContext {
    pub assistant: MedicalAssistant,
    /// Profile after user overrides.
    pub profile: PlatformProfile,
    pub settings: AssistantSettings,
}

/// Environment settings with command-line flags layered on top.
pub fn load_settings(cli: &Cli) -> Result<AssistantSettings> {
    let mut settings = AssistantSettings::from_env();
    settings.merge(&cli.settings_update());
    validate_settings(&settings).context("Invalid settings")?;
    Ok(settings)
}

pub fn bootstrap(cli: &Cli) -> Result<CliContext> {
    let settings = load_settings(cli)?;

    let host = cli
        .host
        .as_deref()
        .map_or_else(HostDescriptor::current, HostDescriptor::new);
    let profile = resolve_profile(&host).with_overrides(&settings);
    debug!(
        host = host.as_str(),
        os_family = ?profile.os_family,
        candidates = profile.candidates().len(),
        "Resolved platform profile"
    );

    let transport = Arc::new(OllamaTransport::new());
    let assistant = MedicalAssistant::new(transport, profile.clone(), settings.clone());

    Ok(CliContext {
        assistant,
        profile,
        settings,
    })
}
