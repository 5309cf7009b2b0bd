use anyhow::{bail, Context, Result};

use crate::api::ChatBackend;
use crate::config::Config;
use crate::events::ChatModel;
use crate::render::entry_to_text;
use crate::session::{ConfigUpdate, SessionController};
use crate::ui::Theme;

/// Overrides for a one-shot `ask`
#[derive(Debug, Default)]
pub struct AskOptions {
    pub model: Option<ChatModel>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

/// Send one message through the session controller and return the rendered
/// reply. A remote or transport error is returned as `Err`.
pub async fn ask_text<B: ChatBackend + ?Sized>(
    config: &Config,
    backend: &B,
    message: &str,
    options: AskOptions,
) -> Result<String> {
    let mut session = SessionController::from_config(config).with_intent_guessing(false);
    session.update_config(ConfigUpdate {
        model: options.model,
        temperature: options.temperature.map(|t| t.clamp(0.0, 1.0)),
        system_prompt: options.system_prompt,
    });
    session.update_draft(message);

    if session.send(backend).await.is_none() {
        bail!("{}", session.error().unwrap_or("Nothing was sent."));
    }

    let theme = Theme::from_name(&config.ui.theme);
    let reply = session
        .entries()
        .last()
        .context("No reply entry was recorded")?;

    if let Some(error) = session.error() {
        bail!("{}", error);
    }

    Ok(entry_to_text(reply, &theme))
}

pub async fn ask<B: ChatBackend + ?Sized>(
    config: &Config,
    backend: &B,
    message: &str,
    options: AskOptions,
) -> Result<()> {
    let reply = ask_text(config, backend, message, options).await?;
    println!("{}", reply);
    Ok(())
}

pub async fn list_conversations<B: ChatBackend + ?Sized>(backend: &B) -> Result<()> {
    let conversations = backend
        .list_conversations()
        .await
        .context("Failed to fetch conversations")?;

    if conversations.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }

    println!("💬 Conversations:");
    println!("{}", "=".repeat(50));

    for (index, conversation) in conversations.iter().enumerate() {
        let title = if conversation.title.is_empty() {
            "(untitled)"
        } else {
            conversation.title.as_str()
        };
        println!("{:>3}. {}", index + 1, title);
        println!("     id: {}  {}", conversation.id, conversation.timestamp);
    }

    Ok(())
}

pub fn show_config(config: &Config, init: bool) -> Result<()> {
    if init {
        if config.config_path().exists() {
            println!("Config already exists at {}", config.config_path().display());
        } else {
            config.save()?;
            println!("Wrote default config to {}", config.config_path().display());
        }
        return Ok(());
    }

    println!("# {}", config.config_path().display());
    print!("{}", toml::to_string_pretty(config).context("Failed to serialize config")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatResponse;
    use crate::session::tests::FakeBackend;

    #[tokio::test]
    async fn ask_renders_markdown_reply() {
        let backend = FakeBackend::text("**Hi** there");
        let reply = ask_text(&Config::default(), &backend, "Hello", AskOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");
    }

    #[tokio::test]
    async fn ask_applies_overrides() {
        let backend = FakeBackend::text("ok");
        let options = AskOptions {
            model: Some(ChatModel::O1Mini),
            temperature: Some(4.0),
            system_prompt: Some("Be terse.".to_string()),
        };
        ask_text(&Config::default(), &backend, "Hello", options).await.unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].model, ChatModel::O1Mini);
        assert_eq!(seen[0].temperature, 1.0);
        assert_eq!(seen[0].system_prompt, "Be terse.");
    }

    #[tokio::test]
    async fn ask_surfaces_api_errors() {
        let backend = FakeBackend::replying(Ok(ChatResponse {
            error: Some("No message provided".to_string()),
            ..Default::default()
        }));
        let err = ask_text(&Config::default(), &backend, "Hello", AskOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No message provided");
    }

    #[tokio::test]
    async fn ask_rejects_blank_messages() {
        let backend = FakeBackend::text("unused");
        let err = ask_text(&Config::default(), &backend, "   ", AskOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), crate::session::EMPTY_DRAFT_ERROR);
    }
}
