use crate::types::{DigestEnvelope, DigestError, Result};
use async_trait::async_trait;
use interfaces::defs::DeliveryChannel;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

const SUBJECT_TOPICS: usize = 3;

/// `Your News Digest: A, B, C +2 more`
pub fn build_subject<S: AsRef<str>>(topic_names: &[S]) -> String {
    let shown: Vec<&str> = topic_names.iter().take(SUBJECT_TOPICS).map(AsRef::as_ref).collect();
    let mut subject = format!("Your News Digest: {}", shown.join(", "));
    if topic_names.len() > SUBJECT_TOPICS {
        subject.push_str(&format!(" +{} more", topic_names.len() - SUBJECT_TOPICS));
    }
    subject
}

/// Writes each envelope as a JSON file. Used for dry runs; the file stem is the delivery id.
pub struct JsonFileDelivery {
    out_dir: PathBuf,
}

impl JsonFileDelivery {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into() }
    }

    pub async fn write(&self, envelope: &DigestEnvelope) -> Result<String> {
        tokio::fs::create_dir_all(&self.out_dir).await?;

        let stem = format!(
            "digest-{}-{}",
            envelope.body.generated_at.format("%Y%m%d%H%M%S"),
            Uuid::new_v4().simple()
        );
        let path = self.out_dir.join(format!("{}.json", stem));
        let json = serde_json::to_vec_pretty(envelope)?;
        tokio::fs::write(&path, json).await?;

        info!("Wrote digest for {} to {}", envelope.recipient.email, path.display());
        Ok(stem)
    }
}

#[async_trait]
impl DeliveryChannel for JsonFileDelivery {
    async fn deliver(&self, envelope: &DigestEnvelope) -> anyhow::Result<Option<String>> {
        if envelope.recipient.email.trim().is_empty() {
            return Err(DigestError::DeliveryFailed("recipient has no email address".to_string()).into());
        }
        Ok(Some(self.write(envelope).await?))
    }
}
