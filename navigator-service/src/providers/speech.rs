//! Text-to-speech (ElevenLabs-style API).

use async_trait::async_trait;
use serde_json::json;
use stage_flow::{ServiceClient, ServiceError};

use crate::config::SpeechSettings;
use crate::speech::SpeechService;

const OUTPUT_FORMAT: &str = "mp3_44100_128";

pub struct TextToSpeech {
    client: ServiceClient,
    settings: SpeechSettings,
}

impl TextToSpeech {
    pub fn new(client: ServiceClient, settings: SpeechSettings) -> Self {
        Self { client, settings }
    }

    fn path(&self) -> String {
        format!(
            "v1/text-to-speech/{}?output_format={OUTPUT_FORMAT}",
            self.settings.voice_id
        )
    }
}

#[async_trait]
impl SpeechService for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        let payload = json!({
            "text": text,
            "model_id": self.settings.model_id,
            "voice_settings": {
                "stability": 0.6,
                "similarity_boost": 0.75,
                "speed": 0.95,
            },
        });
        self.client
            .call_bytes(&self.settings.service, &self.path(), &payload)
            .await
    }
}
