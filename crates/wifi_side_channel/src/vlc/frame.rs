use super::modulator::VlcModulator;
use num::complex::Complex32;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wifi_core::encoding::Encoding;
use wifi_core::error::{PhyError, PhyResult};
use wifi_core::ofdm_parameters::NB_DATA_CARRIERS;
use wifi_core::tx_parameters::{FrameLimits, TxParameters, NB_SERVICE_BITS, NB_TAIL_BITS};
use wifi_phy::config_snapshot::ConfigSnapshot;
use wifi_phy::convolutional_encoder::convolutional_encode;
use wifi_phy::frame_bits::{pack_bytes_lsb, unpack_bytes_lsb};
use wifi_phy::mac_frame::{check_fcs, get_sequence_number, MacFrame, FCS_LENGTH};
use wifi_phy::ofdm_decoder::DecodedPayload;
use wifi_phy::ofdm_mapper::{get_psdu_with_fcs, EncodedFrame, FrameEncoder};
use wifi_phy::slices::span_slice;
use wifi_phy::stream_tags::{get_vlc_tags, FrameTags, StreamTag};
use wifi_phy::symbol_mapper::to_soft_bit;
use wifi_phy::viterbi_decoder::{ViterbiDecoder, ViterbiSettings};

/// The VLC frame keeps the encoding tag of the primary pipeline so downstream blocks see a valid frame.
pub const VLC_TAG_ENCODING: Encoding = Encoding::Qpsk1_2;

/// Number of uncoded bits for a PSDU of `psdu_len` bytes.
pub fn get_vlc_nb_data_bits(psdu_len: usize) -> usize {
    NB_SERVICE_BITS + 8*psdu_len + NB_TAIL_BITS
}

/// Frame sizes of a VLC frame with `nb_samples` subcarriers, markers included.
/// Lengths that do not fit in a usize are reported as too large.
pub fn get_vlc_tx_parameters(psdu_len: usize, nb_samples: usize) -> PhyResult<TxParameters> {
    let nb_symbols = nb_samples.div_ceil(NB_DATA_CARRIERS);
    let nb_data_bits = psdu_len
        .checked_mul(8)
        .and_then(|x| x.checked_add(NB_SERVICE_BITS + NB_TAIL_BITS));
    let Some((nb_data_bits, nb_encoded_bits)) = nb_data_bits.and_then(|x| Some((x, x.checked_mul(2)?))) else {
        return Err(PhyError::FrameTooLarge { nb_symbols, nb_encoded_bits: usize::MAX });
    };
    Ok(TxParameters {
        psdu_size: psdu_len,
        nb_symbols,
        nb_data_bits,
        nb_pad_bits: 0,
        nb_encoded_bits,
    })
}

/// Lays out the uncoded VLC frame bits.
///
/// # Diagram
/// ```text
/// | SERVICE (16 zeros) | PSDU LSB first | TAIL (6 zeros) |
/// ```
pub fn generate_vlc_bits(psdu: &[u8]) -> Vec<u8> {
    let mut bits = vec![0u8; get_vlc_nb_data_bits(psdu.len())];
    unpack_bytes_lsb(psdu, &mut bits[span_slice(NB_SERVICE_BITS, 8*psdu.len())]);
    bits
}

/// Frame encoder that maps rate 1/2 coded bits straight onto the VLC codebook.
/// There is no scrambler, puncturing or interleaver in this path.
pub struct VlcFrameEncoder {
    modulator: Arc<ConfigSnapshot<VlcModulator>>,
    pub limits: FrameLimits,
}

impl VlcFrameEncoder {
    pub fn new(order: usize) -> PhyResult<Self> {
        // Backup candidates only matter to the receiver.
        let modulator = VlcModulator::new(order, 1)?;
        Ok(Self {
            modulator: Arc::new(ConfigSnapshot::new(modulator)),
            limits: FrameLimits::default(),
        })
    }

    /// Shared handle so another thread can change the constellation between frames.
    pub fn modulator_handle(&self) -> Arc<ConfigSnapshot<VlcModulator>> {
        self.modulator.clone()
    }

    pub fn set_order(&self, order: usize) -> PhyResult<()> {
        self.modulator.update(VlcModulator::new(order, 1)?);
        info!(order, "changed VLC constellation order");
        Ok(())
    }
}

impl FrameEncoder for VlcFrameEncoder {
    fn encode(&mut self, frame: &MacFrame) -> PhyResult<EncodedFrame> {
        let modulator = self.modulator.snapshot();
        let psdu = get_psdu_with_fcs(frame);
        let data_bits = generate_vlc_bits(&psdu);
        let mut coded_bits = vec![0u8; 2*data_bits.len()];
        convolutional_encode(&data_bits, &mut coded_bits);

        let (symbols, nb_pad_bits) = modulator.mapper(&coded_bits)?;
        let nb_samples = modulator.calc_total_symbols(symbols.len())?;
        self.limits.check(&get_vlc_tx_parameters(psdu.len(), nb_samples)?)?;
        debug!(
            psdu_size = psdu.len(), order = modulator.order(), nb_symbols = symbols.len(), nb_pad_bits, nb_samples,
            "encoded VLC frame"
        );

        let mut tags = FrameTags {
            packet_len: symbols.len(),
            psdu_len: psdu.len(),
            encoding: VLC_TAG_ENCODING,
        }.to_tags();
        tags.push(StreamTag::NSymbol(symbols.len()));
        tags.push(StreamTag::NQam(modulator.order()));
        Ok(EncodedFrame {
            tags,
            indices: symbols,
        })
    }
}

/// Turns the symbols of one VLC frame into subcarriers with markers and padding.
/// The order and symbol count are read from the frame tags.
pub fn modulate_frame(tags: &[StreamTag], symbols: &[u8]) -> PhyResult<Vec<Complex32>> {
    let (nb_symbols, order) = get_vlc_tags(tags)?;
    let modulator = VlcModulator::new(order, 1)?;
    let symbols = &symbols[..nb_symbols.min(symbols.len())];
    let mut signal = vec![Complex32::default(); modulator.calc_total_symbols(nb_symbols)?];
    modulator.modulate(symbols, &mut signal);
    Ok(signal)
}

#[derive(Debug, Clone)]
pub struct VlcFrameDecoderSettings {
    /// Number of nearest candidates the marker check may pick from.
    pub nb_backup: usize,
    /// Drop frames that fail the frame check sequence.
    pub is_fcs_check_enabled: bool,
    /// Frames whose tags exceed these limits are rejected before anything is allocated.
    pub limits: FrameLimits,
    pub viterbi: ViterbiSettings,
}

impl Default for VlcFrameDecoderSettings {
    fn default() -> Self {
        Self {
            nb_backup: 2,
            is_fcs_check_enabled: true,
            limits: FrameLimits::default(),
            viterbi: ViterbiSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VlcDecodeReport {
    pub sequence_number: Option<u16>,
    pub order: usize,
    pub nb_symbols: usize,
    pub nb_corrections: usize,
    pub nb_unresolved_groups: usize,
    /// Coded bits that were missing from the demapped stream and decoded as erasures.
    pub nb_erased_bits: usize,
    pub is_fcs_valid: bool,
    pub snr_db: f32,
}

/// Receive chain for VLC frames.
pub struct VlcFrameDecoder {
    pub settings: VlcFrameDecoderSettings,
    modulator: Option<VlcModulator>,
    viterbi: ViterbiDecoder,
    /// Number of frames that passed the frame check sequence.
    pub total_frames_read: u32,
    /// Number of frames that failed the frame check sequence.
    pub total_frames_checksum_failed: u32,
    payload_out_callbacks: Vec<Box<dyn FnMut(&DecodedPayload) + Send + Sync + 'static>>,
}

impl Default for VlcFrameDecoder {
    fn default() -> Self {
        Self::new(VlcFrameDecoderSettings::default())
    }
}

impl VlcFrameDecoder {
    pub fn new(settings: VlcFrameDecoderSettings) -> Self {
        let viterbi = ViterbiDecoder::new(settings.viterbi);
        Self {
            settings,
            modulator: None,
            viterbi,
            total_frames_read: 0,
            total_frames_checksum_failed: 0,
            payload_out_callbacks: vec![],
        }
    }

    pub fn subscribe_payload_out(&mut self, callback: impl FnMut(&DecodedPayload) + Send + Sync + 'static) {
        self.payload_out_callbacks.push(Box::new(callback));
    }

    /// Reuses the modulator tables while the order and backup count stay the same.
    fn get_modulator(&mut self, order: usize) -> PhyResult<&VlcModulator> {
        let nb_backup = self.settings.nb_backup;
        let modulator = match self.modulator.take() {
            Some(x) if x.order() == order && x.nb_backup == nb_backup => x,
            _ => VlcModulator::new(order, nb_backup)?,
        };
        Ok(self.modulator.insert(modulator))
    }

    /// Decodes one frame of received subcarriers, markers included.
    pub fn process_frame(&mut self, tags: &[StreamTag], received: &[Complex32]) -> PhyResult<VlcDecodeReport> {
        let frame = FrameTags::from_tags(tags)?;
        let (nb_symbols, order) = get_vlc_tags(tags)?;
        let limits = self.settings.limits;
        let modulator = self.get_modulator(order)?;

        let nb_samples = modulator.calc_total_symbols(nb_symbols)?;
        let tx = get_vlc_tx_parameters(frame.psdu_len, nb_samples)?;
        if let Err(err) = limits.check(&tx) {
            warn!(psdu_len = frame.psdu_len, nb_symbols, "dropping VLC frame: {}", err);
            return Err(err);
        }

        let nb_samples = nb_samples.min(received.len());
        let mut demodulation = modulator.demodulate(&received[..nb_samples]);
        demodulation.symbols.truncate(nb_symbols);
        let bits = modulator.demapper(&demodulation.symbols);

        let nb_data_bits = tx.nb_data_bits;
        let nb_coded_bits = tx.nb_encoded_bits;
        let nb_erased_bits = nb_coded_bits.saturating_sub(bits.len());
        if nb_erased_bits > 0 {
            warn!(nb_erased_bits, nb_coded_bits, "VLC frame is missing coded bits");
        }
        let soft_bits: Vec<f32> = bits
            .iter()
            .map(|x| to_soft_bit(*x))
            .chain(std::iter::repeat(0.0))
            .take(nb_coded_bits)
            .collect();

        let mut decoded_bits = vec![0u8; nb_data_bits];
        self.viterbi.decode(&soft_bits, &mut decoded_bits);
        let mut psdu = vec![0u8; frame.psdu_len];
        pack_bytes_lsb(&decoded_bits[span_slice(NB_SERVICE_BITS, 8*frame.psdu_len)], &mut psdu);

        let is_fcs_valid = check_fcs(&psdu).is_ok();
        let report = VlcDecodeReport {
            sequence_number: get_sequence_number(&psdu),
            order,
            nb_symbols,
            nb_corrections: demodulation.nb_corrections,
            nb_unresolved_groups: demodulation.nb_unresolved_groups,
            nb_erased_bits,
            is_fcs_valid,
            snr_db: demodulation.snr_db,
        };
        debug!(report = ?report, "decoded VLC frame");

        if self.settings.is_fcs_check_enabled && !is_fcs_valid {
            warn!(sequence_number = ?report.sequence_number, "dropping VLC frame with invalid frame check sequence");
            self.total_frames_checksum_failed += 1;
            return Ok(report);
        }

        let payload = DecodedPayload {
            psdu: psdu[..psdu.len().saturating_sub(FCS_LENGTH)].to_vec(),
            encoding: frame.encoding,
            snr_db: report.snr_db,
        };
        info!(psdu_len = frame.psdu_len, order, snr_db = report.snr_db, "decoded VLC frame");
        for callback in &mut self.payload_out_callbacks {
            callback(&payload);
        }
        self.total_frames_read += 1;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vlc::constellation::SUPPORTED_ORDERS;
    use std::sync::Mutex;
    use wifi_phy::mac_frame::{MacFramer, MacSettings};
    use wifi_phy::message_queue::MessageQueue;
    use wifi_phy::ofdm_mapper::OfdmMapper;

    fn create_frame(msdu: &[u8]) -> MacFrame {
        MacFramer::new(MacSettings::default()).frame(msdu).unwrap()
    }

    fn create_msdu(length: usize) -> Vec<u8> {
        (0..length).map(|i| (i*13 + 5) as u8).collect()
    }

    #[test]
    fn test_vlc_bits_layout() {
        let bits = generate_vlc_bits(&[0x03]);
        assert_eq!(bits.len(), 16 + 8 + 6);
        assert!(bits[..16].iter().all(|x| *x == 0));
        assert_eq!(&bits[16..24], &[1, 1, 0, 0, 0, 0, 0, 0]);
        assert!(bits[24..].iter().all(|x| *x == 0));
    }

    #[test]
    fn test_encoder_tags() {
        let mut encoder = VlcFrameEncoder::new(24).unwrap();
        let frame = encoder.encode(&create_frame(&create_msdu(40))).unwrap();
        let nb_symbols = frame.indices.len();
        assert_eq!(get_vlc_tags(&frame.tags), Ok((nb_symbols, 24)));
        let tags = FrameTags::from_tags(&frame.tags).unwrap();
        assert_eq!(tags, FrameTags { packet_len: nb_symbols, psdu_len: 24 + 40 + 4, encoding: VLC_TAG_ENCODING });
        assert!(frame.indices.iter().all(|x| *x < 24));

        assert_eq!(encoder.modulator_handle().snapshot().order(), 24);
        assert_eq!(encoder.set_order(30), Err(PhyError::UnsupportedVlcOrder(30)));
        encoder.set_order(10).unwrap();
        let frame = encoder.encode(&create_frame(&create_msdu(40))).unwrap();
        assert!(frame.tags.contains(&StreamTag::NQam(10)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut encoder = VlcFrameEncoder::new(10).unwrap();
        encoder.limits = FrameLimits { max_symbols: 10, ..FrameLimits::default() };
        let result = encoder.encode(&create_frame(&create_msdu(200)));
        assert!(matches!(result, Err(PhyError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_round_trip_all_orders() {
        for order in SUPPORTED_ORDERS {
            let payloads = [create_msdu(17), create_msdu(120)];
            let queue = Arc::new(MessageQueue::new());
            for payload in &payloads {
                queue.push(create_frame(payload)).unwrap();
            }
            queue.close();

            let mut mapper = OfdmMapper::new(VlcFrameEncoder::new(order).unwrap(), queue);
            let mut decoder = VlcFrameDecoder::default();
            let received = Arc::new(Mutex::new(vec![]));
            decoder.subscribe_payload_out({
                let received = received.clone();
                move |payload: &DecodedPayload| received.lock().unwrap().push(payload.psdu.clone())
            });

            let mut buf = vec![0u8; 4096];
            while let Ok(output) = mapper.work(&mut buf) {
                let tags: Vec<StreamTag> = output.tags.iter().map(|x| x.tag).collect();
                let signal = modulate_frame(&tags, &buf[..output.total_written]).unwrap();
                assert_eq!(signal.len() % NB_DATA_CARRIERS, 0);
                let report = decoder.process_frame(&tags, &signal).unwrap();
                assert!(report.is_fcs_valid, "order {}", order);
                assert_eq!(report.nb_corrections, 0);
                assert_eq!(report.nb_erased_bits, 0);
                assert_eq!(report.sequence_number, Some(0));
            }

            let received = received.lock().unwrap();
            assert_eq!(received.len(), payloads.len());
            for (psdu, payload) in received.iter().zip(payloads.iter()) {
                assert_eq!(&psdu[24..], &payload[..]);
            }
            assert_eq!(decoder.total_frames_read, 2);
        }
    }

    #[test]
    fn test_truncated_frame_fails_checksum() {
        let mut encoder = VlcFrameEncoder::new(12).unwrap();
        let frame = encoder.encode(&create_frame(&create_msdu(60))).unwrap();
        let signal = modulate_frame(&frame.tags, &frame.indices).unwrap();

        let mut decoder = VlcFrameDecoder::default();
        let report = decoder.process_frame(&frame.tags, &signal[..signal.len()/2]).unwrap();
        assert!(report.nb_erased_bits > 0);
        assert!(!report.is_fcs_valid);
        assert_eq!(decoder.total_frames_checksum_failed, 1);
        assert_eq!(decoder.total_frames_read, 0);
    }

    #[test]
    fn test_missing_vlc_tags() {
        let mut decoder = VlcFrameDecoder::default();
        let tags = FrameTags { packet_len: 48, psdu_len: 10, encoding: VLC_TAG_ENCODING }.to_tags();
        let result = decoder.process_frame(&tags, &[Complex32::default(); 48]);
        assert_eq!(result, Err(PhyError::MissingMetadata { key: "nSymbol", found: 0 }));
    }

    #[test]
    fn test_oversized_tags_rejected() {
        let create_tags = |psdu_len: usize, nb_symbols: usize| {
            let mut tags = FrameTags { packet_len: nb_symbols, psdu_len, encoding: VLC_TAG_ENCODING }.to_tags();
            tags.push(StreamTag::NSymbol(nb_symbols));
            tags.push(StreamTag::NQam(20));
            tags
        };
        let received = [Complex32::default(); 48];
        let mut decoder = VlcFrameDecoder::default();
        for (psdu_len, nb_symbols) in [(10, usize::MAX), (1 << 26, 40), (usize::MAX, 40), (10, 48*600)] {
            let result = decoder.process_frame(&create_tags(psdu_len, nb_symbols), &received);
            assert!(
                matches!(result, Err(PhyError::FrameTooLarge { .. })),
                "psdu_len={} nb_symbols={} gave {:?}", psdu_len, nb_symbols, result,
            );
        }
        assert_eq!(decoder.total_frames_read, 0);
        assert_eq!(decoder.total_frames_checksum_failed, 0);

        // A frame inside the limits still decodes, failing only its checksum
        let report = decoder.process_frame(&create_tags(10, 40), &received).unwrap();
        assert!(!report.is_fcs_valid);
        assert_eq!(decoder.total_frames_checksum_failed, 1);
    }

    #[test]
    fn test_vlc_tx_parameters() {
        let tx = get_vlc_tx_parameters(100, 96).unwrap();
        assert_eq!(tx.nb_symbols, 2);
        assert_eq!(tx.nb_data_bits, get_vlc_nb_data_bits(100));
        assert_eq!(tx.nb_encoded_bits, 2*tx.nb_data_bits);
        assert!(get_vlc_tx_parameters(usize::MAX/8, 48).is_err());
    }
}
