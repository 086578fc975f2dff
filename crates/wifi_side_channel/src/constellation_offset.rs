use crate::bit_errors::{count_bit_errors, BitErrorReport};
use crate::demo_payload::cycle_payload;
use itertools::izip;
use num::complex::Complex32;
use std::f32::consts::{FRAC_PI_4, FRAC_PI_8, PI};
use tracing::{debug, info, warn};
use wifi_core::constellation::{Constellation, PSK8_POINTS};
use wifi_core::encoding::Encoding;
use wifi_core::error::{PhyError, PhyResult};
use wifi_core::ofdm_parameters::OfdmParameters;
use wifi_core::tx_parameters::TxParameters;
use wifi_phy::config_snapshot::ConfigSnapshot;
use wifi_phy::data_field::{decode_data_field, encode_data_field, NB_SERVICE_BYTES};
use wifi_phy::ofdm_decoder::{ReceivedFrame, SideChannelDecoder};
use wifi_phy::slices::span_slice;
use wifi_phy::snr::ErrorVectorAccumulator;
use wifi_phy::stream_tags::{FrameTags, StreamTag};
use wifi_phy::symbol_mapper::{to_soft_bit, unpack_index};
use wifi_phy::viterbi_decoder::ViterbiDecoder;

/// Offset directions for a QPSK side channel, indexed by the two side bits.
pub const QPSK_OFFSETS: [Complex32; 4] = [
    Complex32::new(-1.0, -1.0),
    Complex32::new(-1.0,  1.0),
    Complex32::new( 1.0, -1.0),
    Complex32::new( 1.0,  1.0),
];

/// 8PSK point index for each angular zone, starting with the zone centred on π/4.
const PSK8_ZONE_INDICES: [usize; 8] = [6, 2, 3, 1, 0, 4, 5, 7];

/// Number of side PSDU bytes that fill 27 symbols of the side encoding.
pub fn side_psdu_length(side_encoding: Encoding) -> PhyResult<usize> {
    match side_encoding {
        Encoding::Qpsk1_2 => Ok(159),
        Encoding::Psk8_1_2 => Ok(240),
        _ => Err(PhyError::UnsupportedSideEncoding(side_encoding.into())),
    }
}

pub fn offset_table(side_encoding: Encoding) -> PhyResult<&'static [Complex32]> {
    match side_encoding {
        Encoding::Qpsk1_2 => Ok(&QPSK_OFFSETS),
        Encoding::Psk8_1_2 => Ok(&PSK8_POINTS),
        _ => Err(PhyError::UnsupportedSideEncoding(side_encoding.into())),
    }
}

/// Distance from a primary point to the tip of its offset vector along each axis.
pub fn offset_scale(primary_encoding: Encoding, alpha: f32) -> PhyResult<f32> {
    if !primary_encoding.is_primary() {
        return Err(PhyError::UnsupportedPrimaryEncoding(primary_encoding.into()));
    }
    Ok(Constellation::new(primary_encoding).half_min_distance*alpha)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetSettings {
    /// QPSK 1/2 or 8PSK 1/2.
    pub side_encoding: Encoding,
    /// Offset length as a fraction of half the primary minimum distance.
    pub alpha: f32,
    /// Only primary frames with this many symbols are decoded.
    pub required_symbols: usize,
}

impl Default for OffsetSettings {
    fn default() -> Self {
        Self {
            side_encoding: Encoding::Qpsk1_2,
            alpha: 0.5,
            required_symbols: 27,
        }
    }
}

impl OffsetSettings {
    pub fn validate(&self) -> PhyResult<()> {
        side_psdu_length(self.side_encoding).map(|_| ())
    }
}

/// Side channel symbols that are added to every primary frame.
#[derive(Debug, Clone, PartialEq)]
struct SideFrame {
    settings: OffsetSettings,
    indices: Vec<u8>,
}

impl SideFrame {
    fn new(settings: OffsetSettings, payload: &[u8]) -> PhyResult<Self> {
        let psdu = cycle_payload(payload, side_psdu_length(settings.side_encoding)?);
        let (_, indices) = encode_data_field(&psdu, &OfdmParameters::new(settings.side_encoding));
        Ok(Self { settings, indices })
    }
}

/// Transmit side of the constellation offset scheme.
/// Shifts each primary point by a small vector that carries the side channel bits.
pub struct OffsetEncoder {
    payload: Vec<u8>,
    frame: ConfigSnapshot<SideFrame>,
}

impl OffsetEncoder {
    pub fn new(settings: OffsetSettings, payload: &[u8]) -> PhyResult<Self> {
        Ok(Self {
            payload: payload.to_vec(),
            frame: ConfigSnapshot::new(SideFrame::new(settings, payload)?),
        })
    }

    /// Swaps in new settings, frames already being processed keep the old ones.
    pub fn set_settings(&self, settings: OffsetSettings) -> PhyResult<()> {
        let frame = SideFrame::new(settings, &self.payload)?;
        info!(side_encoding = %settings.side_encoding, alpha = settings.alpha, "updating constellation offset");
        self.frame.update(frame);
        Ok(())
    }

    pub fn settings(&self) -> OffsetSettings {
        self.frame.snapshot().settings
    }

    /// Number of primary symbols the side channel occupies.
    pub fn side_length(&self) -> usize {
        self.frame.snapshot().indices.len()
    }

    /// Adds the side channel to the symbols of one primary frame and returns how many were shifted.
    pub fn apply(&self, tags: &[StreamTag], symbols: &mut [Complex32]) -> PhyResult<usize> {
        let primary = FrameTags::from_tags(tags)?;
        let frame = self.frame.snapshot();
        let scale = offset_scale(primary.encoding, frame.settings.alpha)?;
        let table = offset_table(frame.settings.side_encoding)?;

        let total_shifted = frame.indices.len().min(symbols.len());
        for (y, index) in izip!(symbols[..total_shifted].iter_mut(), frame.indices.iter()) {
            *y += table[*index as usize]*scale;
        }
        debug!(primary_encoding = %primary.encoding, psdu_len = primary.psdu_len, total_shifted, "added constellation offset");
        Ok(total_shifted)
    }
}

/// Removes the primary point from one axis, leaving only the offset component.
fn recenter_axis(x: f32, half_min_distance: f32, max_offset: u32) -> f32 {
    let level = (2*((x.abs()/(2.0*half_min_distance)) as u32) + 1).min(max_offset);
    x.signum()*(x.abs() - (level as f32)*half_min_distance)
}

/// Offset component of a received point. BPSK has no quadrature points so that axis is kept as is.
pub fn recenter(x: Complex32, primary: &Constellation) -> Complex32 {
    let h = primary.half_min_distance;
    let re = recenter_axis(x.re, h, primary.max_offset);
    let im = match primary.encoding {
        Encoding::Bpsk1_2 | Encoding::Bpsk3_4 => x.im,
        _ => recenter_axis(x.im, h, primary.max_offset),
    };
    Complex32::new(re, im)
}

/// Hard decision on a recentred offset, returning its index in the offset table.
pub fn detect_offset(offset: Complex32, side_encoding: Encoding) -> usize {
    match side_encoding {
        Encoding::Psk8_1_2 => {
            let mut angle = offset.im.atan2(offset.re);
            if angle < 0.0 {
                angle += 2.0*PI;
            }
            let zone = if angle < FRAC_PI_8 || angle > 2.0*PI - FRAC_PI_8 {
                7
            } else {
                (((angle - FRAC_PI_8)/FRAC_PI_4) as usize).min(7)
            };
            PSK8_ZONE_INDICES[zone]
        },
        _ => (((offset.re > 0.0) as usize) << 1) | ((offset.im > 0.0) as usize),
    }
}

/// Side channel recovered from one primary frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetReport {
    pub sequence_number: Option<u16>,
    pub side_encoding: Encoding,
    pub side_psdu: Vec<u8>,
    pub side_bit_errors: BitErrorReport,
    /// Error vector against the primary point plus the decided offset.
    pub snr_db: f32,
}

/// Receive side of the constellation offset scheme.
pub struct OffsetDecoder {
    settings: ConfigSnapshot<OffsetSettings>,
    payload: Vec<u8>,
    viterbi: ViterbiDecoder,
    /// Number of frames whose side channel was decoded.
    pub total_frames_decoded: u32,
    /// Number of frames skipped because of their length.
    pub total_frames_skipped: u32,
    report_out_callbacks: Vec<Box<dyn FnMut(&OffsetReport) + Send + Sync + 'static>>,
}

impl OffsetDecoder {
    /// The expected payload is only used for bit error statistics.
    pub fn new(settings: OffsetSettings, expected_payload: &[u8]) -> PhyResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings: ConfigSnapshot::new(settings),
            payload: expected_payload.to_vec(),
            viterbi: ViterbiDecoder::default(),
            total_frames_decoded: 0,
            total_frames_skipped: 0,
            report_out_callbacks: vec![],
        })
    }

    /// Validates and swaps in new settings for the frames that follow.
    pub fn set_settings(&self, settings: OffsetSettings) -> PhyResult<()> {
        settings.validate()?;
        info!(side_encoding = %settings.side_encoding, alpha = settings.alpha, "updating constellation offset decoder");
        self.settings.update(settings);
        Ok(())
    }

    pub fn settings(&self) -> OffsetSettings {
        *self.settings.snapshot()
    }

    pub fn subscribe_report_out(&mut self, callback: impl FnMut(&OffsetReport) + Send + Sync + 'static) {
        self.report_out_callbacks.push(Box::new(callback));
    }

    pub fn decode(&mut self, frame: &ReceivedFrame<'_>, settings: &OffsetSettings) -> PhyResult<OffsetReport> {
        let side_psdu_len = side_psdu_length(settings.side_encoding)?;
        let side_ofdm = OfdmParameters::new(settings.side_encoding);
        let side_tx = TxParameters::new(&side_ofdm, side_psdu_len);
        let nb_samples = side_tx.nb_samples();
        if frame.symbols.len() < nb_samples {
            return Err(PhyError::SideChannelTooShort { required: nb_samples, available: frame.symbols.len() });
        }

        let primary = Constellation::new(frame.encoding);
        let scale = offset_scale(frame.encoding, settings.alpha)?;
        let table = offset_table(settings.side_encoding)?;
        let nb_bpsc = side_ofdm.nb_bpsc;

        let mut soft_bits = vec![0.0f32; nb_samples*nb_bpsc];
        let mut bits = [0u8; 8];
        let bits = &mut bits[..nb_bpsc];
        let mut error_vector = ErrorVectorAccumulator::default();
        for (x, soft) in izip!(&frame.symbols[..nb_samples], soft_bits.chunks_exact_mut(nb_bpsc)) {
            let offset = recenter(*x, &primary);
            let index = detect_offset(offset, settings.side_encoding);
            error_vector.add(*x, (*x - offset) + table[index]*scale);
            unpack_index(index, bits);
            for (bit, y) in bits.iter().zip(soft.iter_mut()) {
                *y = to_soft_bit(*bit);
            }
        }

        let bytes = decode_data_field(&soft_bits, &side_ofdm, &side_tx, &mut self.viterbi);
        let side_psdu = bytes[span_slice(NB_SERVICE_BYTES, side_psdu_len)].to_vec();
        let expected = cycle_payload(&self.payload, side_psdu_len);
        Ok(OffsetReport {
            sequence_number: frame.sequence_number(),
            side_encoding: settings.side_encoding,
            side_bit_errors: count_bit_errors(&side_psdu, &expected),
            side_psdu,
            snr_db: error_vector.snr_db(),
        })
    }
}

impl SideChannelDecoder for OffsetDecoder {
    fn process_frame(&mut self, frame: &ReceivedFrame<'_>) {
        let settings = *self.settings.snapshot();
        if frame.tx.nb_symbols != settings.required_symbols {
            debug!(nb_symbols = frame.tx.nb_symbols, "skipping frame without constellation offset");
            self.total_frames_skipped += 1;
            return;
        }
        let report = match self.decode(frame, &settings) {
            Ok(report) => report,
            Err(err) => {
                warn!("constellation offset decode failed: {}", err);
                return;
            },
        };
        info!(
            encoding = %frame.encoding,
            side_encoding = %report.side_encoding,
            sequence_number = ?report.sequence_number,
            side_ber = report.side_bit_errors.ber(),
            snr_db = report.snr_db,
            "constellation offset frame"
        );
        self.total_frames_decoded += 1;
        for callback in &mut self.report_out_callbacks {
            callback(&report);
        }
    }
}
