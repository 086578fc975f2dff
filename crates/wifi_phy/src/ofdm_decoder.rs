use crate::data_field::{decode_data_field, NB_SERVICE_BYTES};
use crate::linear_bucket::LinearBucket;
use crate::mac_frame::{check_fcs, get_sequence_number, FCS_LENGTH};
use crate::slices::span_slice;
use crate::snr::ErrorVectorAccumulator;
use crate::symbol_mapper::demodulate_hard;
use crate::viterbi_decoder::{ViterbiDecoder, ViterbiSettings};
use num::complex::Complex32;
use tracing::{debug, info, warn};
use wifi_core::constellation::Constellation;
use wifi_core::encoding::Encoding;
use wifi_core::error::PhyResult;
use wifi_core::ofdm_parameters::OfdmParameters;
use wifi_core::tx_parameters::{FrameLimits, TxParameters};

/// Frame start metadata recovered from the SIGNAL field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStart {
    pub psdu_len: usize,
    pub encoding: Encoding,
}

/// Marks the sample at `offset` in a buffer as the first subcarrier of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTag {
    pub offset: usize,
    pub frame: FrameStart,
}

#[derive(Debug, Clone)]
pub struct OfdmDecoderSettings {
    pub limits: FrameLimits,
    pub viterbi: ViterbiSettings,
    /// Drop frames that fail the frame check sequence.
    pub is_fcs_check_enabled: bool,
}

impl Default for OfdmDecoderSettings {
    fn default() -> Self {
        Self {
            limits: FrameLimits::default(),
            viterbi: ViterbiSettings::default(),
            is_fcs_check_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfdmDecoderState {
    /// Discarding samples until the next frame start tag.
    WaitingForFrame,
    /// Collecting the data subcarriers of the current frame.
    CopyingSymbols,
}

/// A frame after the bit level receive chain, handed to side channel decoders.
pub struct ReceivedFrame<'a> {
    pub encoding: Encoding,
    pub tx: TxParameters,
    /// Equalised data subcarriers of the whole frame.
    pub symbols: &'a [Complex32],
    /// Descrambled bytes starting with the two SERVICE bytes.
    pub decoded_bytes: &'a [u8],
    pub is_fcs_valid: bool,
}

impl<'a> ReceivedFrame<'a> {
    /// The PSDU including its frame check sequence.
    pub fn psdu(&self) -> &'a [u8] {
        &self.decoded_bytes[span_slice(NB_SERVICE_BYTES, self.tx.psdu_size)]
    }

    pub fn sequence_number(&self) -> Option<u16> {
        get_sequence_number(self.psdu())
    }
}

/// Extracts information hidden in the constellation of received frames.
pub trait SideChannelDecoder: Send {
    fn process_frame(&mut self, frame: &ReceivedFrame<'_>);
}

/// A PSDU that passed the frame check sequence, with the FCS removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    pub psdu: Vec<u8>,
    pub encoding: Encoding,
    /// Error vector SNR against the hard decisions.
    pub snr_db: f32,
}

/// Receive chain for the primary channel.
/// Consumes equalised data subcarriers tagged with frame starts and publishes decoded PSDUs.
pub struct OfdmDecoder {
    pub state: OfdmDecoderState,
    pub settings: OfdmDecoderSettings,
    frame: Option<(FrameStart, TxParameters)>,
    symbols: LinearBucket<Complex32>,
    viterbi: ViterbiDecoder,
    /// Number of frames that passed the frame check sequence.
    pub total_frames_read: u32,
    /// Number of frames dropped because they exceeded the frame limits.
    pub total_frames_too_large: u32,
    /// Number of frames that failed the frame check sequence.
    pub total_frames_checksum_failed: u32,
    /// Number of frames abandoned because a new frame started before they were complete.
    pub total_frames_out_of_order: u32,
    payload_out_callbacks: Vec<Box<dyn FnMut(&DecodedPayload) + Send + Sync + 'static>>,
    symbols_out_callbacks: Vec<Box<dyn FnMut(&[Complex32]) + Send + Sync + 'static>>,
    side_channel_decoders: Vec<Box<dyn SideChannelDecoder>>,
}

impl Default for OfdmDecoder {
    fn default() -> Self {
        Self::new(OfdmDecoderSettings::default())
    }
}

impl OfdmDecoder {
    pub fn new(settings: OfdmDecoderSettings) -> Self {
        let viterbi = ViterbiDecoder::new(settings.viterbi);
        Self {
            state: OfdmDecoderState::WaitingForFrame,
            settings,
            frame: None,
            symbols: LinearBucket::new(0),
            viterbi,
            total_frames_read: 0,
            total_frames_too_large: 0,
            total_frames_checksum_failed: 0,
            total_frames_out_of_order: 0,
            payload_out_callbacks: vec![],
            symbols_out_callbacks: vec![],
            side_channel_decoders: vec![],
        }
    }

    /// Registers a callback for every PSDU that passes the frame check sequence.
    pub fn subscribe_payload_out(&mut self, callback: impl FnMut(&DecodedPayload) + Send + Sync + 'static) {
        self.payload_out_callbacks.push(Box::new(callback));
    }

    /// Registers a callback that receives the data subcarriers of every complete frame.
    pub fn subscribe_symbols_out(&mut self, callback: impl FnMut(&[Complex32]) + Send + Sync + 'static) {
        self.symbols_out_callbacks.push(Box::new(callback));
    }

    /// Side channel decoders run on every complete frame regardless of the frame check sequence.
    pub fn add_side_channel_decoder(&mut self, decoder: Box<dyn SideChannelDecoder>) {
        self.side_channel_decoders.push(decoder);
    }

    /// Consumes data subcarriers. Tag offsets are relative to the start of `buf` and must be ascending.
    pub fn process(&mut self, buf: &[Complex32], tags: &[SymbolTag]) {
        let mut position = 0;
        let mut tags = tags.iter().peekable();
        while position < buf.len() || tags.peek().is_some() {
            if let Some(tag) = tags.next_if(|tag| tag.offset <= position) {
                self.start_frame(tag.frame);
                continue;
            }
            let segment_end = tags.peek().map(|tag| tag.offset.min(buf.len())).unwrap_or(buf.len());
            let segment = &buf[position..segment_end];
            position += match self.state {
                OfdmDecoderState::WaitingForFrame => segment.len(),
                OfdmDecoderState::CopyingSymbols  => self.read_symbols(segment),
            };
            if segment.is_empty() && tags.peek().is_some_and(|tag| tag.offset > buf.len()) {
                warn!("discarding frame start tag beyond the end of the buffer");
                tags.next();
            }
        }
    }

    fn start_frame(&mut self, frame: FrameStart) {
        if self.state == OfdmDecoderState::CopyingSymbols {
            warn!(
                "frame start arrived after {} of {} symbols, abandoning current frame",
                self.symbols.length(), self.symbols.capacity(),
            );
            self.total_frames_out_of_order += 1;
        }
        self.state = OfdmDecoderState::WaitingForFrame;
        self.symbols.reset();

        let ofdm = OfdmParameters::new(frame.encoding);
        let tx = TxParameters::new(&ofdm, frame.psdu_len);
        if let Err(err) = self.settings.limits.check(&tx) {
            warn!("dropping frame: {}", err);
            self.total_frames_too_large += 1;
            return;
        }
        debug!(psdu_len = frame.psdu_len, encoding = %frame.encoding, nb_symbols = tx.nb_symbols, "frame start");

        self.symbols.reset_with_capacity(tx.nb_samples());
        self.frame = Some((frame, tx));
        self.state = OfdmDecoderState::CopyingSymbols;
    }

    fn read_symbols(&mut self, buf: &[Complex32]) -> usize {
        let total_read = self.symbols.consume(buf);
        if self.symbols.is_full() {
            self.state = OfdmDecoderState::WaitingForFrame;
            if let Some((frame, tx)) = self.frame.take() {
                self.decode_frame(frame, tx);
            }
        }
        total_read
    }

    fn decode_frame(&mut self, frame: FrameStart, tx: TxParameters) {
        let ofdm = OfdmParameters::new(frame.encoding);
        let constellation = Constellation::new(frame.encoding);
        let symbols = self.symbols.iter();

        let mut soft_bits = vec![0.0f32; tx.nb_encoded_bits];
        demodulate_hard(&constellation, symbols, &mut soft_bits);
        let decoded_bytes = decode_data_field(&soft_bits, &ofdm, &tx, &mut self.viterbi);

        let mut error_vector = ErrorVectorAccumulator::default();
        for x in symbols {
            error_vector.add(*x, constellation.points[constellation.nearest(*x)]);
        }

        let received = ReceivedFrame {
            encoding: frame.encoding,
            tx,
            symbols,
            decoded_bytes: &decoded_bytes,
            is_fcs_valid: check_fcs(&decoded_bytes[span_slice(NB_SERVICE_BYTES, tx.psdu_size)]).is_ok(),
        };

        for callback in &mut self.symbols_out_callbacks {
            callback(symbols);
        }
        for decoder in &mut self.side_channel_decoders {
            decoder.process_frame(&received);
        }

        if let Err(err) = self.check_psdu(&received) {
            warn!(sequence_number = ?received.sequence_number(), "dropping frame: {}", err);
            self.total_frames_checksum_failed += 1;
            return;
        }

        let psdu = received.psdu();
        let payload = DecodedPayload {
            psdu: psdu[..psdu.len().saturating_sub(FCS_LENGTH)].to_vec(),
            encoding: frame.encoding,
            snr_db: error_vector.snr_db(),
        };
        info!(psdu_len = tx.psdu_size, encoding = %frame.encoding, snr_db = payload.snr_db, "decoded frame");
        for callback in &mut self.payload_out_callbacks {
            callback(&payload);
        }
        self.total_frames_read += 1;
    }

    fn check_psdu(&self, frame: &ReceivedFrame<'_>) -> PhyResult<()> {
        if !self.settings.is_fcs_check_enabled {
            return Ok(());
        }
        check_fcs(frame.psdu())
    }
}
