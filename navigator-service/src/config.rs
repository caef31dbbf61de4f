//! Startup configuration. Read once; nothing reads the environment mid-request.

use std::time::Duration;

use stage_flow::{FlowError, ServiceConfig};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_COMPLETION_URL: &str = "https://api.aimlapi.com";
const DEFAULT_PRIMARY_MODEL: &str = "gpt-4o";
const DEFAULT_FALLBACK_MODEL: &str = "gpt-4o-mini";
const DEFAULT_SEARCH_URL: &str = "https://api.firecrawl.dev";
const DEFAULT_RESEARCH_URL: &str = "https://api.perplexity.ai";
const DEFAULT_RESEARCH_MODEL: &str = "sonar";
const DEFAULT_SPEECH_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL";
const DEFAULT_SPEECH_MODEL: &str = "eleven_multilingual_v2";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Research assistant connection plus the model it should use.
#[derive(Debug, Clone)]
pub struct ResearchSettings {
    pub service: ServiceConfig,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub service: ServiceConfig,
    pub voice_id: String,
    pub model_id: String,
}

/// Everything the navigator needs to talk to its upstream services.
///
/// The completion service is mandatory. Search, research and speech are enabled only when their
/// credential is present.
#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    pub host: String,
    pub port: u16,
    pub completion: ServiceConfig,
    pub primary_model: String,
    /// `None` disables the secondary-model attempt.
    pub fallback_model: Option<String>,
    pub search: Option<ServiceConfig>,
    pub research: Option<ResearchSettings>,
    pub speech: Option<SpeechSettings>,
}

impl NavigatorConfig {
    pub fn from_env() -> Result<Self, FlowError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FlowError> {
        // Blank values count as unset.
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let completion_key = get("AIMLAPI_API_KEY").ok_or_else(|| {
            FlowError::Configuration("AIMLAPI_API_KEY environment variable is required".into())
        })?;

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| invalid("PORT", "a port number", &raw))?,
            None => DEFAULT_PORT,
        };
        let timeout = match get("SERVICE_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| invalid("SERVICE_TIMEOUT_SECS", "a positive number of seconds", &raw))?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        // An explicitly empty FALLBACK_MODEL turns the fallback off.
        let fallback_model = match lookup("FALLBACK_MODEL") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
            None => Some(DEFAULT_FALLBACK_MODEL.to_string()),
        };

        let completion = ServiceConfig::new("completion", or("COMPLETION_BASE_URL", DEFAULT_COMPLETION_URL))
            .with_bearer(completion_key)
            .with_timeout(timeout);

        let search = get("FIRECRAWL_API_KEY").map(|key| {
            ServiceConfig::new("web-search", or("SEARCH_BASE_URL", DEFAULT_SEARCH_URL))
                .with_bearer(key)
                .with_timeout(timeout)
        });

        let research = get("PERPLEXITY_API_KEY").map(|key| ResearchSettings {
            service: ServiceConfig::new("research-assistant", or("RESEARCH_BASE_URL", DEFAULT_RESEARCH_URL))
                .with_bearer(key)
                .with_timeout(timeout),
            model: or("RESEARCH_MODEL", DEFAULT_RESEARCH_MODEL),
        });

        let speech = get("ELEVENLABS_API_KEY").map(|key| SpeechSettings {
            service: ServiceConfig::new("speech", or("SPEECH_BASE_URL", DEFAULT_SPEECH_URL))
                .with_header("xi-api-key", key)
                .with_timeout(timeout),
            voice_id: or("SPEECH_VOICE_ID", DEFAULT_VOICE_ID),
            model_id: or("SPEECH_MODEL_ID", DEFAULT_SPEECH_MODEL),
        });

        Ok(Self {
            host: or("HOST", DEFAULT_HOST),
            port,
            completion,
            primary_model: or("PRIMARY_MODEL", DEFAULT_PRIMARY_MODEL),
            fallback_model,
            search,
            research,
            speech,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(name: &str, expected: &str, value: &str) -> FlowError {
    FlowError::Configuration(format!("{name} must be {expected}, got {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage_flow::Credential;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<NavigatorConfig, FlowError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NavigatorConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn missing_completion_key_fails_fast() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("AIMLAPI_API_KEY"));

        let err = config(&[("AIMLAPI_API_KEY", "   ")]).unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));
    }

    #[test]
    fn defaults_with_only_mandatory_key() {
        let cfg = config(&[("AIMLAPI_API_KEY", "k")]).unwrap();
        assert_eq!(cfg.bind_address(), "0.0.0.0:3000");
        assert_eq!(cfg.primary_model, "gpt-4o");
        assert_eq!(cfg.fallback_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(cfg.completion.base_url, "https://api.aimlapi.com");
        assert_eq!(cfg.completion.timeout, Duration::from_secs(60));
        assert!(matches!(&cfg.completion.credential, Credential::Bearer(k) if k == "k"));
        assert!(cfg.search.is_none());
        assert!(cfg.research.is_none());
        assert!(cfg.speech.is_none());
    }

    #[test]
    fn optional_services_follow_their_credentials() {
        let cfg = config(&[
            ("AIMLAPI_API_KEY", "k"),
            ("FIRECRAWL_API_KEY", "f"),
            ("PERPLEXITY_API_KEY", "p"),
            ("ELEVENLABS_API_KEY", "e"),
            ("RESEARCH_MODEL", "sonar-pro"),
            ("SERVICE_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        let search = cfg.search.unwrap();
        assert_eq!(search.base_url, "https://api.firecrawl.dev");
        assert_eq!(search.timeout, Duration::from_secs(5));
        assert_eq!(cfg.research.unwrap().model, "sonar-pro");

        let speech = cfg.speech.unwrap();
        assert_eq!(speech.voice_id, DEFAULT_VOICE_ID);
        assert!(matches!(
            &speech.service.credential,
            Credential::Header { name, value } if name == "xi-api-key" && value == "e"
        ));
    }

    #[test]
    fn empty_fallback_model_disables_fallback() {
        let cfg = config(&[("AIMLAPI_API_KEY", "k"), ("FALLBACK_MODEL", "")]).unwrap();
        assert!(cfg.fallback_model.is_none());
    }

    #[test]
    fn bad_numbers_are_configuration_errors() {
        assert!(config(&[("AIMLAPI_API_KEY", "k"), ("PORT", "eighty")]).is_err());
        assert!(config(&[("AIMLAPI_API_KEY", "k"), ("SERVICE_TIMEOUT_SECS", "0")]).is_err());
    }
}
