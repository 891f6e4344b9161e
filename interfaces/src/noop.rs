use anyhow::Result;
use async_trait::async_trait;

use crate::defs::DigestRecord;
use crate::defs::DigestRecorder;

/// Recorder used when no persistence backend is configured.
pub struct NoopRecorder;

#[async_trait]
impl DigestRecorder for NoopRecorder {
    async fn record(&self, _record: &DigestRecord) -> Result<()> {
        // Nothing is kept; the delivery itself is the only trace of the run.
        Ok(())
    }
}
