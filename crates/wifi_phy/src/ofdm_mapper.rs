use crate::config_snapshot::ConfigSnapshot;
use crate::data_field::encode_data_field;
use crate::mac_frame::{append_fcs, MacFrame};
use crate::message_queue::MessageQueue;
use crate::stream_tags::{FrameTags, StreamTag};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wifi_core::encoding::Encoding;
use wifi_core::error::{PhyError, PhyResult};
use wifi_core::ofdm_parameters::OfdmParameters;
use wifi_core::tx_parameters::{FrameLimits, TxParameters};

/// Constellation indices for one frame together with the tags for its first item.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub tags: Vec<StreamTag>,
    pub indices: Vec<u8>,
}

/// Turns a PSDU from the MAC into constellation indices.
pub trait FrameEncoder {
    fn encode(&mut self, frame: &MacFrame) -> PhyResult<EncodedFrame>;
}

/// Returns the PSDU with its frame check sequence, appending one when the MAC left it out.
pub fn get_psdu_with_fcs(frame: &MacFrame) -> Vec<u8> {
    let mut psdu = frame.psdu.clone();
    if !frame.crc_included {
        append_fcs(&mut psdu);
    }
    psdu
}

/// 802.11a DATA field encoder for the primary channel.
pub struct OfdmFrameEncoder {
    encoding: Arc<ConfigSnapshot<Encoding>>,
    pub limits: FrameLimits,
}

impl OfdmFrameEncoder {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding: Arc::new(ConfigSnapshot::new(encoding)),
            limits: FrameLimits::default(),
        }
    }

    /// Shared handle so another thread can change the encoding between frames.
    pub fn encoding_handle(&self) -> Arc<ConfigSnapshot<Encoding>> {
        self.encoding.clone()
    }
}

impl FrameEncoder for OfdmFrameEncoder {
    fn encode(&mut self, frame: &MacFrame) -> PhyResult<EncodedFrame> {
        let encoding = *self.encoding.snapshot();
        if !encoding.is_primary() {
            return Err(PhyError::UnsupportedPrimaryEncoding(encoding.into()));
        }
        let psdu = get_psdu_with_fcs(frame);
        let ofdm = OfdmParameters::new(encoding);
        self.limits.check(&TxParameters::new(&ofdm, psdu.len()))?;

        let (_, indices) = encode_data_field(&psdu, &ofdm);
        let tags = FrameTags {
            packet_len: indices.len(),
            psdu_len: psdu.len(),
            encoding,
        };
        Ok(EncodedFrame {
            tags: tags.to_tags(),
            indices,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfdmMapperState {
    /// Waiting on the inbound queue for the next PSDU.
    Idle,
    /// Running the bit chain on the PSDU that was just received.
    Framing,
    /// Copying the constellation indices of the current frame into output buffers.
    Emitting,
    /// The inbound queue was closed and drained.
    Closed,
}

/// A tag placed on an output item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemTag {
    pub offset: usize,
    pub tag: StreamTag,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkOutput {
    pub total_written: usize,
    pub tags: Vec<ItemTag>,
}

/// Pulls PSDUs from a message queue and streams out constellation indices, one frame at a time.
pub struct OfdmMapper<E: FrameEncoder> {
    pub state: OfdmMapperState,
    pub encoder: E,
    queue: Arc<MessageQueue<MacFrame>>,
    pending_message: Option<MacFrame>,
    frame: EncodedFrame,
    frame_offset: usize,
    /// Number of frames fully written out.
    pub total_frames_sent: u32,
    /// Number of frames dropped because they could not be encoded.
    pub total_frames_dropped: u32,
}

impl<E: FrameEncoder> OfdmMapper<E> {
    pub fn new(encoder: E, queue: Arc<MessageQueue<MacFrame>>) -> Self {
        Self {
            state: OfdmMapperState::Idle,
            encoder,
            queue,
            pending_message: None,
            frame: EncodedFrame { tags: vec![], indices: vec![] },
            frame_offset: 0,
            total_frames_sent: 0,
            total_frames_dropped: 0,
        }
    }

    /// Fills the output buffer with indices from at most one frame.
    /// Blocks on the queue only when nothing has been written yet.
    /// Returns `Closed` once the queue has ended and the last frame was written.
    pub fn work(&mut self, buf: &mut [u8]) -> PhyResult<WorkOutput> {
        let mut output = WorkOutput::default();
        while output.total_written < buf.len() {
            match self.state {
                OfdmMapperState::Idle => {
                    if output.total_written > 0 {
                        break;
                    }
                    self.wait_for_message()?;
                },
                OfdmMapperState::Framing => self.run_framing(),
                OfdmMapperState::Emitting => self.emit(&mut buf[output.total_written..], &mut output),
                OfdmMapperState::Closed => {
                    if output.total_written > 0 {
                        break;
                    }
                    return Err(PhyError::Closed);
                },
            }
        }
        Ok(output)
    }

    fn wait_for_message(&mut self) -> PhyResult<()> {
        match self.queue.pop_blocking() {
            Ok(message) => {
                debug!(psdu_size = message.psdu.len(), "mapper received new message");
                self.pending_message = Some(message);
                self.state = OfdmMapperState::Framing;
                Ok(())
            },
            Err(err) => {
                info!("mapper exiting after {} frames", self.total_frames_sent);
                self.state = OfdmMapperState::Closed;
                Err(err)
            },
        }
    }

    fn run_framing(&mut self) {
        self.state = OfdmMapperState::Idle;
        let Some(message) = self.pending_message.take() else {
            return;
        };
        match self.encoder.encode(&message) {
            Ok(frame) => {
                self.frame = frame;
                self.frame_offset = 0;
                self.state = OfdmMapperState::Emitting;
            },
            Err(err) => {
                warn!("dropping frame with {} bytes: {}", message.psdu.len(), err);
                self.total_frames_dropped += 1;
            },
        }
    }

    fn emit(&mut self, buf: &mut [u8], output: &mut WorkOutput) {
        if self.frame_offset == 0 {
            output.tags.extend(self.frame.tags.iter().map(|tag| ItemTag {
                offset: output.total_written,
                tag: *tag,
            }));
        }
        let remain = &self.frame.indices[self.frame_offset..];
        let total_copy = remain.len().min(buf.len());
        buf[..total_copy].copy_from_slice(&remain[..total_copy]);
        self.frame_offset += total_copy;
        output.total_written += total_copy;

        if self.frame_offset == self.frame.indices.len() {
            self.total_frames_sent += 1;
            self.state = OfdmMapperState::Idle;
        }
    }
}
