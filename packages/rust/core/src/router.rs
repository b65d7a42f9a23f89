//! Section → generation endpoint routing.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use lessonforge_ai::{ChatClient, TextGenerator};
use lessonforge_shared::{AppConfig, Result, SectionKind};

/// Which endpoint serves each section. Context analysis and any section
/// without a route go to the default endpoint.
#[derive(Clone)]
pub struct ModelRouter {
    default: Arc<dyn TextGenerator>,
    routes: HashMap<SectionKind, Arc<dyn TextGenerator>>,
}

impl ModelRouter {
    /// Route everything to one generator.
    pub fn single(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            default: generator,
            routes: HashMap::new(),
        }
    }

    /// Send `kind` to `generator` instead of the default.
    pub fn route(mut self, kind: SectionKind, generator: Arc<dyn TextGenerator>) -> Self {
        self.routes.insert(kind, generator);
        self
    }

    /// Build HTTP clients for the default endpoint and every
    /// `[[ai.endpoints]]` entry.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let default: Arc<dyn TextGenerator> = Arc::new(ChatClient::new(config.client_config()?)?);
        let mut router = Self::single(default);

        for (client_config, sections) in config.endpoint_configs()? {
            info!(
                endpoint = %client_config.name,
                model = %client_config.model,
                sections = ?sections,
                "routing sections to endpoint"
            );
            let client: Arc<dyn TextGenerator> = Arc::new(ChatClient::new(client_config)?);
            for kind in sections {
                router = router.route(kind, Arc::clone(&client));
            }
        }

        Ok(router)
    }

    pub fn for_context(&self) -> Arc<dyn TextGenerator> {
        Arc::clone(&self.default)
    }

    pub fn for_section(&self, kind: SectionKind) -> Arc<dyn TextGenerator> {
        Arc::clone(self.routes.get(&kind).unwrap_or(&self.default))
    }
}

impl std::fmt::Debug for ModelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes: HashMap<_, _> = self
            .routes
            .iter()
            .map(|(kind, generator)| (kind.as_str(), generator.name().to_string()))
            .collect();
        f.debug_struct("ModelRouter")
            .field("default", &self.default.name())
            .field("routes", &routes)
            .finish()
    }
}
