use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "bigmodel";
pub const DEFAULT_UID: &str = "test";

const DEFAULT_SAMPLE_RATE: u32 = 16_000;
const DEFAULT_BITS: u16 = 16;
const DEFAULT_CHANNELS: u16 = 1;

/// Body of the control frame that opens a recognition session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ControlRequest {
    pub user: UserInfo,
    pub audio: AudioParams,
    pub request: RecognitionOptions,
}

impl ControlRequest {
    /// # Errors
    /// Returns an error if the audio descriptor is unusable.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        self.audio.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    pub uid: String,
}

impl Default for UserInfo {
    fn default() -> Self {
        Self {
            uid: DEFAULT_UID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Wav,
    Pcm,
    Mp3,
    Ogg,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Raw,
    Opus,
}

/// Audio format descriptor sent in the control frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioParams {
    pub format: ContainerFormat,
    pub sample_rate: u32,
    pub bits: u16,
    pub channel: u16,
    pub codec: AudioCodec,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            format: ContainerFormat::Wav,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bits: DEFAULT_BITS,
            channel: DEFAULT_CHANNELS,
            codec: AudioCodec::Raw,
        }
    }
}

impl AudioParams {
    /// # Errors
    /// Returns an error for a zero rate, zero channels, or a bit depth that
    /// is not a whole number of bytes.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        if self.sample_rate == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "audio sample_rate must be positive".to_string(),
            ));
        }
        if self.channel == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "audio channel count must be positive".to_string(),
            ));
        }
        if !matches!(self.bits, 8 | 16 | 24 | 32) {
            return Err(crate::error::Error::InvalidConfig(format!(
                "audio bits must be 8, 16, 24 or 32, got {}",
                self.bits
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecognitionOptions {
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_punc: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_itn: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_ddc: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_utterances: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus: Option<Corpus>,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            enable_punc: Some(true),
            enable_itn: None,
            enable_ddc: None,
            show_utterances: None,
            corpus: None,
        }
    }
}

/// Hot-word and correction tables applied server side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Corpus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boosting_table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// JSON body of a full server response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecognitionResponse {
    #[serde(default)]
    pub result: Option<RecognitionResult>,
    #[serde(default)]
    pub audio_info: Option<AudioInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecognitionResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub utterances: Vec<Utterance>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Utterance {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
    /// Whether the server will no longer revise this utterance.
    #[serde(default)]
    pub definite: bool,
    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Word {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AudioInfo {
    /// Audio processed so far, in milliseconds.
    #[serde(default)]
    pub duration: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_control_request_shape() {
        let value = serde_json::to_value(ControlRequest::default()).unwrap();
        assert_eq!(
            value,
            json!({
                "user": { "uid": "test" },
                "audio": {
                    "format": "wav",
                    "sample_rate": 16000,
                    "bits": 16,
                    "channel": 1,
                    "codec": "raw"
                },
                "request": {
                    "model_name": "bigmodel",
                    "enable_punc": true
                }
            })
        );
    }

    #[test]
    fn audio_params_validation() {
        assert!(AudioParams::default().validate().is_ok());
        let bad = AudioParams { bits: 12, ..AudioParams::default() };
        assert!(bad.validate().is_err());
        let silent = AudioParams { channel: 0, ..AudioParams::default() };
        assert!(silent.validate().is_err());
    }

    #[test]
    fn recognition_response_tolerates_missing_fields() {
        let parsed: RecognitionResponse = serde_json::from_value(json!({
            "result": {
                "text": "hello",
                "utterances": [{ "text": "hello", "definite": true }]
            }
        }))
        .unwrap();
        let result = parsed.result.unwrap();
        assert_eq!(result.text, "hello");
        assert!(result.utterances[0].definite);
        assert!(parsed.audio_info.is_none());
    }
}
