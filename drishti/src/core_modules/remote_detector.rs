// THEORY:
// The `RemoteDetector` talks to the external inference service. One cycle is one
// JSON POST: the frame goes out as a JPEG data URI, the threat signals come back
// as a flat JSON object. Everything that can go wrong on the way (encoding,
// transport, HTTP status, body shape) becomes a `DetectionError`; deciding what
// to do about it is the adapter's job, not this module's.

use crate::core_modules::capture::Frame;
use crate::core_modules::detection::{DetectionError, DetectionResult, DetectionService, WeaponTag};
use crate::core_modules::utils::image_helper;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const HEALTH_PATH: &str = "/api/health";

#[derive(Debug, Serialize)]
struct DetectRequest {
    image: String,
}

/// A weapon entry as sent by the service: either a bare tag or a full record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireWeapon {
    Tag(String),
    Entry {
        name: String,
        #[serde(default)]
        confidence: Option<f32>,
        #[serde(default, rename = "box")]
        bbox: Option<[i32; 4]>,
    },
}

impl From<WireWeapon> for WeaponTag {
    fn from(wire: WireWeapon) -> Self {
        match wire {
            WireWeapon::Tag(name) => WeaponTag::named(name),
            WireWeapon::Entry { name, confidence, bbox } => WeaponTag { name, confidence, bbox },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectResponse {
    threat_level: f64,
    people: u32,
    #[serde(default)]
    weapons: Vec<WireWeapon>,
    #[serde(default)]
    violence: bool,
}

impl From<DetectResponse> for DetectionResult {
    fn from(response: DetectResponse) -> Self {
        DetectionResult {
            threat_level: response.threat_level,
            people_count: Some(response.people),
            weapons_detected: response.weapons.into_iter().map(WeaponTag::from).collect(),
            violence_detected: response.violence,
        }
    }
}

/// Which models the service reports as loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModelInventory {
    #[serde(default)]
    pub cnn: bool,
    #[serde(default)]
    pub lstm: bool,
    #[serde(default)]
    pub gender: bool,
    #[serde(default)]
    pub yolo: bool,
    #[serde(default)]
    pub face: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub models_loaded: bool,
    #[serde(default)]
    pub models: ModelInventory,
}

pub struct RemoteDetector {
    client: Client,
    endpoint: Url,
    jpeg_quality: u8,
}

impl RemoteDetector {
    pub fn new(endpoint: &str, jpeg_quality: u8, timeout: Duration) -> Result<Self, DetectionError> {
        let endpoint = Url::parse(endpoint).map_err(|e| DetectionError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DetectionError::Transport)?;
        Ok(Self {
            client,
            endpoint,
            jpeg_quality,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Asks the service whether its models are loaded. The service loads them
    /// lazily, so the first probe can take a while.
    pub async fn health(&self) -> Result<HealthReport, DetectionError> {
        let url = self
            .endpoint
            .join(HEALTH_PATH)
            .map_err(|e| DetectionError::InvalidEndpoint {
                endpoint: self.endpoint.to_string(),
                reason: e.to_string(),
            })?;
        let response = self.client.get(url).send().await.map_err(DetectionError::Transport)?;
        read_json(response).await
    }

    async fn submit(client: Client, endpoint: Url, image: String) -> Result<DetectionResult, DetectionError> {
        let response = client
            .post(endpoint)
            .json(&DetectRequest { image })
            .send()
            .await
            .map_err(DetectionError::Transport)?;
        let body: DetectResponse = read_json(response).await?;
        Ok(body.into())
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, DetectionError> {
    let status = response.status();
    if !status.is_success() {
        return Err(DetectionError::Status { status });
    }
    let bytes = response.bytes().await.map_err(DetectionError::Transport)?;
    serde_json::from_slice(&bytes).map_err(DetectionError::Malformed)
}

impl DetectionService for RemoteDetector {
    fn detect(&self, frame: Frame) -> BoxFuture<'static, Result<DetectionResult, DetectionError>> {
        let image = match image_helper::jpeg_data_uri(&frame.image, self.jpeg_quality) {
            Ok(uri) => uri,
            Err(e) => return future::ready(Err(DetectionError::Encode(e))).boxed(),
        };
        debug!(
            frame = frame.sequence,
            width = frame.width(),
            height = frame.height(),
            bytes = image.len(),
            endpoint = %self.endpoint,
            "submitting frame for detection"
        );
        Self::submit(self.client.clone(), self.endpoint.clone(), image).boxed()
    }
}
