use serde::{Deserialize, Serialize};

use herald_core::campaign::Campaign;
use herald_core::error::{HeraldError, Result};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: u32,
    campaign: &'a Campaign,
}

#[derive(Deserialize)]
struct Envelope {
    format: u32,
    campaign: Campaign,
}

/// Opaque serialized form of a campaign, sufficient to resume it with no
/// other state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(String);

impl Snapshot {
    pub fn capture(campaign: &Campaign) -> Result<Self> {
        let json = serde_json::to_string(&EnvelopeRef {
            format: FORMAT_VERSION,
            campaign,
        })
        .map_err(|e| HeraldError::Snapshot(format!("Failed to serialize campaign: {}", e)))?;
        Ok(Self(json))
    }

    pub fn restore(&self) -> Result<Campaign> {
        let envelope: Envelope = serde_json::from_str(&self.0)
            .map_err(|e| HeraldError::Snapshot(format!("Failed to decode snapshot: {}", e)))?;
        if envelope.format != FORMAT_VERSION {
            return Err(HeraldError::Snapshot(format!(
                "Unsupported snapshot format {} (expected {})",
                envelope.format, FORMAT_VERSION
            )));
        }
        Ok(envelope.campaign)
    }

    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}
