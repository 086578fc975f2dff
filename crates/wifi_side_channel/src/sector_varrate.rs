use crate::bit_errors::{count_bit_errors, BitErrorReport};
use crate::demo_payload::cycle_payload;
use num::complex::Complex32;
use std::f32::consts::PI;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wifi_core::encoding::CodeRate;
use wifi_core::error::{PhyError, PhyResult};
use wifi_core::ofdm_parameters::NB_DATA_CARRIERS;
use wifi_core::tx_parameters::{TxParameters, NB_SERVICE_BITS, NB_TAIL_BITS};
use wifi_phy::config_snapshot::ConfigSnapshot;
use wifi_phy::data_field::{decode_coded_bits, encode_data_bits, NB_SERVICE_BYTES};
use wifi_phy::ofdm_decoder::{ReceivedFrame, SideChannelDecoder};
use wifi_phy::slices::{chunk_slice, span_slice};
use wifi_phy::snr::ErrorVectorAccumulator;
use wifi_phy::stream_tags::{FrameTags, StreamTag};
use wifi_phy::symbol_mapper::{to_soft_bit, unpack_index};
use wifi_phy::viterbi_decoder::ViterbiDecoder;

pub const MIN_SECTOR: usize = 2;
pub const MAX_SECTOR: usize = 8;
pub const DEFAULT_OFFSET_GAIN: f32 = 1.0;
const MAX_BITS_PER_GROUP: usize = 32;

/// Mixed radix layout of a group of subcarriers.
/// Subcarrier `k` of a group carries one digit in `[0, sectors[k])` as a point on the unit circle,
/// and the first subcarrier is the most significant digit.
///
/// # Diagram
/// ```text
/// sectors = [3, 3, 2]   weights = [6, 2, 1]   bits_per_group = floor(log2(18)) = 4
///
/// value 13 = 2*6 + 0*2 + 1*1  ->  digits [2, 0, 1]
///           subcarrier 0: exp(j*2π*2/3)
///           subcarrier 1: exp(j*2π*0/3)
///           subcarrier 2: exp(j*2π*1/2)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SectorParameters {
    pub sectors: Vec<usize>,
    pub weights: Vec<u64>,
    pub bits_per_group: usize,
    /// Number of distinct values a group carries, `2^bits_per_group`.
    pub max_value: u64,
    pub offset_gain: f32,
}

impl SectorParameters {
    pub fn new(sectors: &[usize]) -> PhyResult<Self> {
        if sectors.is_empty() {
            return Err(PhyError::InvalidSectorCount("sector vector is empty".to_string()));
        }
        if let Some(sector) = sectors.iter().find(|x| !(MIN_SECTOR..=MAX_SECTOR).contains(*x)) {
            return Err(PhyError::InvalidSectorCount(format!(
                "sector count {} is outside of [{}, {}]", sector, MIN_SECTOR, MAX_SECTOR,
            )));
        }

        let mut weights = vec![1u64; sectors.len()];
        let mut product: u64 = 1;
        for (weight, sector) in weights.iter_mut().zip(sectors.iter()).rev() {
            *weight = product;
            product = product
                .checked_mul(*sector as u64)
                .filter(|x| x.ilog2() as usize <= MAX_BITS_PER_GROUP)
                .ok_or_else(|| PhyError::InvalidSectorCount(format!(
                    "{} subcarriers per group carry more than {} bits", sectors.len(), MAX_BITS_PER_GROUP,
                )))?;
        }
        let bits_per_group = product.ilog2() as usize;

        Ok(Self {
            sectors: sectors.to_vec(),
            weights,
            bits_per_group,
            max_value: 1u64 << bits_per_group,
            offset_gain: DEFAULT_OFFSET_GAIN,
        })
    }

    pub fn nb_subcarriers_per_group(&self) -> usize {
        self.sectors.len()
    }

    /// Groups that fit into a primary frame.
    pub fn nb_groups(&self, nb_symbols: usize) -> usize {
        nb_symbols*NB_DATA_CARRIERS / self.nb_subcarriers_per_group()
    }

    /// Rate 1/2 coded side frame that fills the groups of a primary frame.
    /// Returns `None` when the groups cannot hold a single PSDU byte.
    pub fn side_tx_parameters(&self, nb_symbols: usize) -> Option<TxParameters> {
        let nb_data_bits = self.bits_per_group*self.nb_groups(nb_symbols) / 2;
        let nb_overhead = NB_SERVICE_BITS + NB_TAIL_BITS;
        let psdu_size = nb_data_bits.checked_sub(nb_overhead)? / 8;
        if psdu_size == 0 {
            return None;
        }
        Some(TxParameters {
            psdu_size,
            nb_symbols,
            nb_data_bits,
            nb_pad_bits: nb_data_bits - nb_overhead - 8*psdu_size,
            nb_encoded_bits: 2*nb_data_bits,
        })
    }

    pub fn reference_point(&self, position: usize, digit: usize) -> Complex32 {
        let sector = self.sectors[position] as f32;
        Complex32::from_polar(self.offset_gain, 2.0*PI*(digit as f32)/sector)
    }

    /// Writes the points for one group value.
    pub fn encode_group(&self, value: u64, group_out: &mut [Complex32]) {
        assert!(group_out.len() == self.nb_subcarriers_per_group(), "Group has {} subcarriers but expected {}", group_out.len(), self.nb_subcarriers_per_group());
        for (k, y) in group_out.iter_mut().enumerate() {
            let digit = (value / self.weights[k]) % (self.sectors[k] as u64);
            *y = self.reference_point(k, digit as usize);
        }
    }

    /// Recombines the digits of one group, accumulating the error against the decided points.
    /// The value can exceed `max_value` when the channel corrupts a digit.
    pub fn decode_group(&self, group: &[Complex32], error_vector: &mut ErrorVectorAccumulator) -> u64 {
        assert!(group.len() == self.nb_subcarriers_per_group(), "Group has {} subcarriers but expected {}", group.len(), self.nb_subcarriers_per_group());
        let mut value = 0;
        for (k, x) in group.iter().enumerate() {
            let digit = decode_digit(*x, self.sectors[k]);
            error_vector.add(*x, self.reference_point(k, digit));
            value += (digit as u64)*self.weights[k];
        }
        value
    }
}

/// Sector index of a received point, where sector 0 is centred on the positive real axis.
pub fn decode_digit(x: Complex32, sector: usize) -> usize {
    let width = 2.0*PI/(sector as f32);
    let mut angle = x.im.atan2(x.re);
    if angle < 0.0 {
        angle += 2.0*PI;
    }
    if angle < width/2.0 || angle >= 2.0*PI - width/2.0 {
        return 0;
    }
    let digit = ((angle - width/2.0)/width) as usize + 1;
    if digit >= sector {
        warn!("sector digit {} clamped to {}", digit, sector-1);
        return sector-1;
    }
    digit
}

/// Transmit side of the variable rate sector scheme.
/// The side frame replaces the primary symbols, and symbols past the last group are zeroed.
pub struct SectorEncoder {
    parameters: ConfigSnapshot<SectorParameters>,
    payload: Vec<u8>,
}

impl SectorEncoder {
    pub fn new(sectors: &[usize], payload: &[u8]) -> PhyResult<Self> {
        Ok(Self {
            parameters: ConfigSnapshot::new(SectorParameters::new(sectors)?),
            payload: payload.to_vec(),
        })
    }

    pub fn set_sectors(&self, sectors: &[usize]) -> PhyResult<()> {
        let parameters = SectorParameters::new(sectors)?;
        info!(?sectors, bits_per_group = parameters.bits_per_group, "updating sector vector");
        self.parameters.update(parameters);
        Ok(())
    }

    pub fn parameters(&self) -> Arc<SectorParameters> {
        self.parameters.snapshot()
    }

    /// Embeds the side frame into the symbols of one primary frame and returns the number of groups written.
    /// Frames that are too short for a side frame pass through unchanged.
    pub fn apply(&self, tags: &[StreamTag], symbols: &mut [Complex32]) -> PhyResult<usize> {
        let primary = FrameTags::from_tags(tags)?.tx_parameters();
        let parameters = self.parameters.snapshot();
        let Some(side_tx) = parameters.side_tx_parameters(primary.nb_symbols) else {
            warn!(nb_symbols = primary.nb_symbols, "primary frame too short for a sector side frame");
            return Ok(0);
        };

        let psdu = cycle_payload(&self.payload, side_tx.psdu_size);
        let coded_bits = encode_data_bits(&psdu, CodeRate::Half, &side_tx);

        let nb_sub = parameters.nb_subcarriers_per_group();
        let bits_per_group = parameters.bits_per_group;
        let mut nb_groups = parameters.nb_groups(primary.nb_symbols);
        if nb_groups*nb_sub > symbols.len() {
            warn!("only {} of {} sector groups fit into {} symbols", symbols.len()/nb_sub, nb_groups, symbols.len());
            nb_groups = symbols.len()/nb_sub;
        }

        for g in 0..nb_groups {
            // Bits past the end of the coded frame are zero
            let value = (0..bits_per_group)
                .map(|i| coded_bits.get(g*bits_per_group + i).copied().unwrap_or(0))
                .fold(0u64, |acc, bit| (acc << 1) | (bit as u64));
            parameters.encode_group(value, &mut symbols[chunk_slice(g, nb_sub)]);
        }
        symbols[nb_groups*nb_sub..].fill(Complex32::default());

        debug!(nb_groups, bits_per_group, side_psdu_size = side_tx.psdu_size, "embedded sector side frame");
        Ok(nb_groups)
    }
}

/// Side channel recovered from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorReport {
    pub sequence_number: Option<u16>,
    pub nb_groups: usize,
    pub bits_per_group: usize,
    pub side_psdu: Vec<u8>,
    pub side_bit_errors: BitErrorReport,
    /// Groups whose digits combined into a value outside of `max_value`.
    pub nb_overflows: usize,
    pub snr_db: f32,
}

/// Receive side of the variable rate sector scheme.
pub struct SectorDecoder {
    parameters: ConfigSnapshot<SectorParameters>,
    payload: Vec<u8>,
    viterbi: ViterbiDecoder,
    /// Number of frames whose side channel was decoded.
    pub total_frames_decoded: u32,
    /// Number of groups that decoded to an out of range value.
    pub total_overflows: u32,
    report_out_callbacks: Vec<Box<dyn FnMut(&SectorReport) + Send + Sync + 'static>>,
}

impl SectorDecoder {
    /// The expected payload is only used for bit error statistics.
    pub fn new(sectors: &[usize], expected_payload: &[u8]) -> PhyResult<Self> {
        Ok(Self {
            parameters: ConfigSnapshot::new(SectorParameters::new(sectors)?),
            payload: expected_payload.to_vec(),
            viterbi: ViterbiDecoder::default(),
            total_frames_decoded: 0,
            total_overflows: 0,
            report_out_callbacks: vec![],
        })
    }

    /// Validates and swaps in a new sector vector for the frames that follow.
    pub fn set_sectors(&self, sectors: &[usize]) -> PhyResult<()> {
        let parameters = SectorParameters::new(sectors)?;
        info!(?sectors, bits_per_group = parameters.bits_per_group, "updating sector decoder");
        self.parameters.update(parameters);
        Ok(())
    }

    pub fn parameters(&self) -> Arc<SectorParameters> {
        self.parameters.snapshot()
    }

    pub fn subscribe_report_out(&mut self, callback: impl FnMut(&SectorReport) + Send + Sync + 'static) {
        self.report_out_callbacks.push(Box::new(callback));
    }

    /// Decodes the side frame from the symbols of a frame carrying `nb_symbols` OFDM symbols.
    pub fn decode(&mut self, symbols: &[Complex32], nb_symbols: usize, parameters: &SectorParameters) -> PhyResult<SectorReport> {
        let nb_sub = parameters.nb_subcarriers_per_group();
        let nb_groups = parameters.nb_groups(nb_symbols);
        let Some(side_tx) = parameters.side_tx_parameters(nb_symbols) else {
            return Err(PhyError::SideChannelTooShort {
                required: NB_SERVICE_BITS + NB_TAIL_BITS + 8,
                available: parameters.bits_per_group*nb_groups/2,
            });
        };
        if symbols.len() < nb_groups*nb_sub {
            return Err(PhyError::SideChannelTooShort { required: nb_groups*nb_sub, available: symbols.len() });
        }

        let bits_per_group = parameters.bits_per_group;
        let mut coded_bits = vec![0u8; nb_groups*bits_per_group];
        let mut error_vector = ErrorVectorAccumulator::default();
        let mut nb_overflows = 0;
        for (g, bits) in coded_bits.chunks_exact_mut(bits_per_group).enumerate() {
            let mut value = parameters.decode_group(&symbols[chunk_slice(g, nb_sub)], &mut error_vector);
            if value >= parameters.max_value {
                warn!("sector group {} decoded to {} which exceeds {}", g, value, parameters.max_value-1);
                nb_overflows += 1;
                value &= parameters.max_value-1;
            }
            unpack_index(value as usize, bits);
        }

        let soft_bits: Vec<f32> = coded_bits[..side_tx.nb_encoded_bits].iter().map(|x| to_soft_bit(*x)).collect();
        let bytes = decode_coded_bits(&soft_bits, CodeRate::Half, &side_tx, &mut self.viterbi);
        let side_psdu = bytes[span_slice(NB_SERVICE_BYTES, side_tx.psdu_size)].to_vec();
        let expected = cycle_payload(&self.payload, side_tx.psdu_size);

        Ok(SectorReport {
            sequence_number: None,
            nb_groups,
            bits_per_group,
            side_bit_errors: count_bit_errors(&side_psdu, &expected),
            side_psdu,
            nb_overflows,
            snr_db: error_vector.snr_db(),
        })
    }
}

impl SideChannelDecoder for SectorDecoder {
    fn process_frame(&mut self, frame: &ReceivedFrame<'_>) {
        let parameters = self.parameters.snapshot();
        let mut report = match self.decode(frame.symbols, frame.tx.nb_symbols, &parameters) {
            Ok(report) => report,
            Err(err) => {
                warn!("sector side channel decode failed: {}", err);
                return;
            },
        };
        report.sequence_number = frame.sequence_number();
        info!(
            nb_groups = report.nb_groups,
            bits_per_group = report.bits_per_group,
            nb_overflows = report.nb_overflows,
            side_ber = report.side_bit_errors.ber(),
            snr_db = report.snr_db,
            "sector side channel frame"
        );
        self.total_frames_decoded += 1;
        self.total_overflows += report.nb_overflows as u32;
        for callback in &mut self.report_out_callbacks {
            callback(&report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wifi_core::encoding::Encoding;

    fn create_tags(psdu_len: usize, encoding: Encoding) -> Vec<StreamTag> {
        let tags = FrameTags { packet_len: 0, psdu_len, encoding };
        FrameTags { packet_len: tags.tx_parameters().nb_samples(), ..tags }.to_tags()
    }

    #[test]
    fn test_parameters() {
        let parameters = SectorParameters::new(&[3, 3, 2]).unwrap();
        assert_eq!(parameters.weights, vec![6, 2, 1]);
        assert_eq!(parameters.bits_per_group, 4);
        assert_eq!(parameters.max_value, 16);
        assert_eq!(parameters.nb_groups(27), 432);

        let side_tx = parameters.side_tx_parameters(27).unwrap();
        assert_eq!(side_tx.nb_data_bits, 864);
        assert_eq!(side_tx.psdu_size, 105);
        assert_eq!(side_tx.nb_pad_bits, 2);
        assert_eq!(side_tx.nb_encoded_bits, 1728);
        assert!(SectorParameters::new(&[2, 2]).unwrap().side_tx_parameters(1).is_none());
    }

    #[test]
    fn test_invalid_sectors() {
        assert!(SectorParameters::new(&[]).is_err());
        assert!(SectorParameters::new(&[3, 9]).is_err());
        assert!(SectorParameters::new(&[1]).is_err());
        assert!(SectorParameters::new(&[8; 40]).is_err());
    }

    #[test]
    fn test_digits_round_trip() {
        let parameters = SectorParameters::new(&[3, 5, 2, 7]).unwrap();
        let mut group = vec![Complex32::default(); 4];
        let mut error_vector = ErrorVectorAccumulator::default();
        for value in 0..parameters.max_value {
            parameters.encode_group(value, &mut group);
            assert_eq!(parameters.decode_group(&group, &mut error_vector), value);
        }
        assert!(error_vector.mean_squared_error() < 1e-10);
    }

    #[test]
    fn test_decode_digit_boundaries() {
        // Sector 0 wraps around the positive real axis
        assert_eq!(decode_digit(Complex32::from_polar(1.0, -0.1), 4), 0);
        assert_eq!(decode_digit(Complex32::from_polar(1.0, 0.1), 4), 0);
        assert_eq!(decode_digit(Complex32::from_polar(1.0, PI/4.0 + 0.01), 4), 1);
        assert_eq!(decode_digit(Complex32::from_polar(1.0, PI), 4), 2);
        assert_eq!(decode_digit(Complex32::from_polar(1.0, 7.0*PI/4.0 - 0.01), 4), 3);
    }

    #[test]
    fn test_round_trip() {
        let payload = b"sector side channel";
        let encoder = SectorEncoder::new(&[3, 3, 2], payload).unwrap();
        let mut decoder = SectorDecoder::new(&[3, 3, 2], payload).unwrap();

        let tags = create_tags(200, Encoding::Qpsk1_2);
        let primary = FrameTags::from_tags(&tags).unwrap().tx_parameters();
        let mut symbols = vec![Complex32::new(0.5, 0.5); primary.nb_samples() + 10];
        let nb_groups = encoder.apply(&tags, &mut symbols).unwrap();
        let parameters = encoder.parameters();
        assert_eq!(nb_groups, parameters.nb_groups(primary.nb_symbols));
        assert!(symbols[nb_groups*3..].iter().all(|x| *x == Complex32::default()));

        let report = decoder.decode(&symbols, primary.nb_symbols, &parameters).unwrap();
        let side_tx = parameters.side_tx_parameters(primary.nb_symbols).unwrap();
        assert_eq!(report.side_psdu, cycle_payload(payload, side_tx.psdu_size));
        assert_eq!(report.side_bit_errors.nb_bit_errors, 0);
        assert_eq!(report.nb_overflows, 0);
        assert!(report.snr_db > 60.0);
    }

    #[test]
    fn test_overflow_is_reported() {
        let parameters = SectorParameters::new(&[3, 3, 2]).unwrap();
        let nb_symbols = 5;
        // Digits [2, 2, 1] combine to 17 which does not fit into 4 bits
        let group: Vec<Complex32> = [2, 2, 1].iter().enumerate().map(|(k, d)| parameters.reference_point(k, *d)).collect();
        let symbols: Vec<Complex32> = group.iter().copied().cycle().take(nb_symbols*NB_DATA_CARRIERS).collect();

        let mut decoder = SectorDecoder::new(&[3, 3, 2], b"").unwrap();
        let report = decoder.decode(&symbols, nb_symbols, &parameters).unwrap();
        assert_eq!(report.nb_overflows, parameters.nb_groups(nb_symbols));
    }

    #[test]
    fn test_short_buffer_limits_groups() {
        let encoder = SectorEncoder::new(&[2, 2], b"x").unwrap();
        let tags = create_tags(100, Encoding::Bpsk1_2);
        let mut symbols = vec![Complex32::new(1.0, 0.0); 101];
        assert_eq!(encoder.apply(&tags, &mut symbols), Ok(50));
        assert_eq!(symbols[100], Complex32::default());
    }

    #[test]
    fn test_runtime_sector_change() {
        let encoder = SectorEncoder::new(&[3, 3, 2], b"x").unwrap();
        assert!(encoder.set_sectors(&[9]).is_err());
        assert_eq!(encoder.parameters().weights, vec![6, 2, 1]);
        encoder.set_sectors(&[4, 4]).unwrap();
        assert_eq!(encoder.parameters().weights, vec![4, 1]);

        let decoder = SectorDecoder::new(&[3, 3, 2], b"x").unwrap();
        decoder.set_sectors(&[8, 8]).unwrap();
        assert_eq!(decoder.parameters().bits_per_group, 6);
        assert!(decoder.set_sectors(&[]).is_err());
        assert!(decoder.set_sectors(&[1, 4]).is_err());
        assert_eq!(decoder.parameters().weights, vec![8, 1]);
    }
}
