//! Shared Application State
//!
//! `AppState` holds the remote capabilities used by the proxy endpoints and the
//! single in-process story workflow driven by the `/story` endpoints.

use crate::config::Config;
use anyhow::Context;
use std::sync::Arc;
use storybook_core::{
    Credential, IllustrationAdapter, ImageGenerator, RetryingClient, SentenceJudge, StoryConfig,
    StoryWorkflow, ValidationAdapter, illustration::ImagenGenerator, validation::GeminiJudge,
};
use tokio::sync::Mutex;
use tracing::info;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub credential: Credential,
    pub judge: Arc<dyn SentenceJudge>,
    pub generator: Arc<dyn ImageGenerator>,
    pub workflow: Arc<Mutex<StoryWorkflow>>,
}

impl AppState {
    /// Wires a workflow around the given capabilities.
    pub fn new(
        config: Config,
        credential: Credential,
        story: StoryConfig,
        judge: Arc<dyn SentenceJudge>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        let workflow = StoryWorkflow::new(
            Arc::new(story),
            ValidationAdapter::new(judge.clone()),
            IllustrationAdapter::new(generator.clone()),
        );
        Self {
            config: Arc::new(config),
            credential,
            judge,
            generator,
            workflow: Arc::new(Mutex::new(workflow)),
        }
    }

    /// Builds the production state: HTTP clients for both services and the configured story.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let story = load_story(&config)?;
        let credential = Credential::from_env();
        if !credential.is_configured() {
            tracing::warn!(
                "GENERATIVE_API_KEY is not set; generation requests will fail until it is"
            );
        }

        let client = RetryingClient::http().context("Failed to build HTTP client")?;
        let judge = Arc::new(GeminiJudge::new(
            client.clone(),
            config.api_base.clone(),
            config.validation_model.clone(),
            credential.clone(),
        ));
        let generator = Arc::new(ImagenGenerator::new(
            client,
            config.api_base.clone(),
            config.image_model.clone(),
            credential.clone(),
        ));

        Ok(Self::new(config, credential, story, judge, generator))
    }
}

/// Loads the story named by `STORY_PATH`, or the built-in one.
pub fn load_story(config: &Config) -> anyhow::Result<StoryConfig> {
    let story = match &config.story_path {
        Some(path) => {
            let story = StoryConfig::from_json_file(path)
                .with_context(|| format!("Failed to load story from {}", path.display()))?;
            info!(path = %path.display(), title = %story.title, "Loaded story file");
            story
        }
        None => StoryConfig::kind_helper(),
    };
    Ok(story.with_intro_delay(config.intro_delay))
}
