use num::complex::Complex32;
use tracing::{debug, info, warn};
use wifi_core::error::PhyResult;
use wifi_phy::config_snapshot::ConfigSnapshot;
use wifi_phy::stream_tags::{FrameTags, StreamTag};

/// Longest mask that will be applied to a frame.
pub const MAX_MASK_LENGTH: usize = 100_000;

/// Multiplies the start of every frame with a fixed complex mask.
/// The mask can be swapped from another thread while frames are being processed.
pub struct AmplitudeMask {
    mask: ConfigSnapshot<Option<Vec<Complex32>>>,
}

impl Default for AmplitudeMask {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AmplitudeMask {
    pub fn new(mask: Option<Vec<Complex32>>) -> Self {
        Self {
            mask: ConfigSnapshot::new(mask.map(limit_mask_length)),
        }
    }

    /// Replaces the mask, `None` turns the block into a passthrough.
    pub fn set_mask(&self, mask: Option<Vec<Complex32>>) {
        info!(length = ?mask.as_ref().map(|x| x.len()), "updating amplitude mask");
        self.mask.update(mask.map(limit_mask_length));
    }

    pub fn is_enabled(&self) -> bool {
        self.mask.snapshot().is_some()
    }

    /// Applies the mask to the symbols of one frame and returns how many were scaled.
    /// The frame tags must be present even when the mask is disabled.
    pub fn apply(&self, tags: &[StreamTag], symbols: &mut [Complex32]) -> PhyResult<usize> {
        let frame = FrameTags::from_tags(tags)?;
        let mask = self.mask.snapshot();
        let Some(mask) = mask.as_ref() else {
            return Ok(0);
        };
        let total_scaled = mask.len().min(symbols.len());
        for (y, m) in symbols[..total_scaled].iter_mut().zip(mask.iter()) {
            *y *= *m;
        }
        debug!(psdu_len = frame.psdu_len, encoding = %frame.encoding, total_scaled, "applied amplitude mask");
        Ok(total_scaled)
    }
}

fn limit_mask_length(mut mask: Vec<Complex32>) -> Vec<Complex32> {
    if mask.len() > MAX_MASK_LENGTH {
        warn!("amplitude mask of {} entries truncated to {}", mask.len(), MAX_MASK_LENGTH);
        mask.truncate(MAX_MASK_LENGTH);
    }
    mask
}
