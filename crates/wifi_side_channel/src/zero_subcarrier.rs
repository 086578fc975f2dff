use crate::bit_errors::{count_bit_errors, BitErrorReport};
use num::complex::Complex32;
use std::sync::Arc;
use tracing::{debug, info};
use wifi_core::constellation::Constellation;
use wifi_core::error::{PhyError, PhyResult};
use wifi_core::ofdm_parameters::NB_DATA_CARRIERS;
use wifi_phy::config_snapshot::ConfigSnapshot;
use wifi_phy::mac_frame::FCS_LENGTH;
use wifi_phy::ofdm_decoder::{ReceivedFrame, SideChannelDecoder};
use wifi_phy::slices::chunk_slice;
use wifi_phy::snr::ErrorVectorAccumulator;

/// Number of symbols covered by the reference zero pattern.
pub const NB_REFERENCE_SYMBOLS: usize = 27;

const MASK_ONE: Complex32 = Complex32::new(1.0, 0.0);
const MASK_ZERO: Complex32 = Complex32::new(0.0, 0.0);

/// Subcarriers that are nulled in the reference pattern for one symbol.
/// Symbol `n` nulls subcarrier `n+2`, and also `n+13` when two zeros are used.
pub fn reference_zero_positions(nb_zeros: usize, symbol_index: usize) -> PhyResult<Vec<usize>> {
    if symbol_index >= NB_REFERENCE_SYMBOLS {
        return Err(PhyError::ReferencePatternExceeded { required: symbol_index+1, available: NB_REFERENCE_SYMBOLS });
    }
    match nb_zeros {
        1 => Ok(vec![symbol_index+2]),
        2 => Ok(vec![symbol_index+2, symbol_index+13]),
        _ => Err(PhyError::UnsupportedZeroCount(nb_zeros)),
    }
}

pub fn reference_mask(nb_zeros: usize, symbol_index: usize) -> PhyResult<Vec<Complex32>> {
    let mut mask = vec![MASK_ONE; NB_DATA_CARRIERS];
    for i in reference_zero_positions(nb_zeros, symbol_index)? {
        mask[i] = MASK_ZERO;
    }
    Ok(mask)
}

/// Amplitude mask that embeds the reference pattern into a frame of 27 symbols.
pub fn create_transmit_mask(nb_zeros: usize) -> PhyResult<Vec<Complex32>> {
    let mut mask = Vec::with_capacity(NB_REFERENCE_SYMBOLS*NB_DATA_CARRIERS);
    for i in 0..NB_REFERENCE_SYMBOLS {
        mask.extend(reference_mask(nb_zeros, i)?);
    }
    Ok(mask)
}

/// Marks the `nb_zeros` weakest subcarriers of a symbol as 0 and every other subcarrier as 1.
/// A partial selection sort picks the weakest entries, equal powers resolve to the earliest remaining position.
pub fn decode_one_symbol(symbol: &[Complex32], nb_zeros: usize) -> Vec<Complex32> {
    assert!(symbol.len() == NB_DATA_CARRIERS, "Expected {} subcarriers but got {}", NB_DATA_CARRIERS, symbol.len());
    assert!(nb_zeros <= NB_DATA_CARRIERS, "Cannot null {} of {} subcarriers", nb_zeros, NB_DATA_CARRIERS);

    let powers: Vec<f32> = symbol.iter().map(|x| x.norm_sqr()).collect();
    let mut indices: Vec<usize> = (0..NB_DATA_CARRIERS).collect();
    for j in 0..nb_zeros {
        let mut best = j;
        for i in (j+1)..NB_DATA_CARRIERS {
            if powers[indices[i]] < powers[indices[best]] {
                best = i;
            }
        }
        indices.swap(j, best);
    }

    let mut mask = vec![MASK_ONE; NB_DATA_CARRIERS];
    for i in &indices[..nb_zeros] {
        mask[*i] = MASK_ZERO;
    }
    mask
}

/// True when a decoded mask matches the reference pattern of its symbol.
pub fn check_side_symbol(mask: &[Complex32], nb_zeros: usize, symbol_index: usize) -> PhyResult<bool> {
    let reference = reference_mask(nb_zeros, symbol_index)?;
    Ok(mask.iter().zip(reference.iter()).all(|(x, y)| x.re == y.re))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroSubcarrierSettings {
    pub nb_zeros: usize,
    /// Frames with any other number of symbols are not checked.
    pub required_symbols: usize,
}

impl Default for ZeroSubcarrierSettings {
    fn default() -> Self {
        Self {
            nb_zeros: 1,
            required_symbols: NB_REFERENCE_SYMBOLS,
        }
    }
}

/// Statistics for one frame carrying the zero subcarrier pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ZeroSubcarrierReport {
    pub sequence_number: Option<u16>,
    pub nb_symbols: usize,
    /// Symbols whose decoded mask differs from the reference.
    pub nb_symbol_errors: usize,
    /// Primary channel bit errors against the expected PSDU, when one was given.
    pub bit_errors: Option<BitErrorReport>,
    /// Nulled subcarriers are measured against zero, the rest against the nearest point.
    pub snr_db: f32,
    pub masks: Vec<Complex32>,
}

/// Receive side of the zero subcarrier scheme, run on every decoded frame.
pub struct ZeroSubcarrierDecoder {
    pub settings: ZeroSubcarrierSettings,
    expected_psdu: Arc<ConfigSnapshot<Option<Vec<u8>>>>,
    /// Number of frames that were checked.
    pub total_frames_checked: u32,
    /// Number of frames skipped because of their length.
    pub total_frames_skipped: u32,
    report_out_callbacks: Vec<Box<dyn FnMut(&ZeroSubcarrierReport) + Send + Sync + 'static>>,
}

impl ZeroSubcarrierDecoder {
    pub fn new(settings: ZeroSubcarrierSettings) -> PhyResult<Self> {
        if settings.nb_zeros != 1 && settings.nb_zeros != 2 {
            return Err(PhyError::UnsupportedZeroCount(settings.nb_zeros));
        }
        if settings.required_symbols > NB_REFERENCE_SYMBOLS {
            return Err(PhyError::ReferencePatternExceeded {
                required: settings.required_symbols,
                available: NB_REFERENCE_SYMBOLS,
            });
        }
        Ok(Self {
            settings,
            expected_psdu: Arc::new(ConfigSnapshot::new(None)),
            total_frames_checked: 0,
            total_frames_skipped: 0,
            report_out_callbacks: vec![],
        })
    }

    /// PSDU without its frame check sequence that the bit error rate is measured against.
    pub fn expected_psdu_handle(&self) -> Arc<ConfigSnapshot<Option<Vec<u8>>>> {
        self.expected_psdu.clone()
    }

    pub fn subscribe_report_out(&mut self, callback: impl FnMut(&ZeroSubcarrierReport) + Send + Sync + 'static) {
        self.report_out_callbacks.push(Box::new(callback));
    }

    /// Checks the symbols of a frame that are covered by the reference pattern.
    pub fn decode(&self, frame: &ReceivedFrame<'_>) -> PhyResult<ZeroSubcarrierReport> {
        let nb_zeros = self.settings.nb_zeros;
        let nb_symbols = frame.tx.nb_symbols;
        let nb_checked = nb_symbols.min(NB_REFERENCE_SYMBOLS);
        let constellation = Constellation::new(frame.encoding);

        let mut masks = Vec::with_capacity(nb_checked*NB_DATA_CARRIERS);
        let mut nb_symbol_errors = 0;
        let mut error_vector = ErrorVectorAccumulator::default();
        for i in 0..nb_checked {
            let symbol = &frame.symbols[chunk_slice(i, NB_DATA_CARRIERS)];
            let mask = decode_one_symbol(symbol, nb_zeros);
            if !check_side_symbol(&mask, nb_zeros, i)? {
                nb_symbol_errors += 1;
            }
            for (x, reference) in symbol.iter().zip(reference_mask(nb_zeros, i)?) {
                if reference == MASK_ZERO {
                    error_vector.add(*x, MASK_ZERO);
                } else {
                    error_vector.add(*x, constellation.points[constellation.nearest(*x)]);
                }
            }
            masks.extend(mask);
        }

        let psdu = frame.psdu();
        let psdu = &psdu[..psdu.len().saturating_sub(FCS_LENGTH)];
        let expected_psdu = self.expected_psdu.snapshot();
        let bit_errors = expected_psdu.as_deref().map(|expected| count_bit_errors(psdu, expected));

        Ok(ZeroSubcarrierReport {
            sequence_number: frame.sequence_number(),
            nb_symbols,
            nb_symbol_errors,
            bit_errors,
            snr_db: error_vector.snr_db(),
            masks,
        })
    }
}

impl SideChannelDecoder for ZeroSubcarrierDecoder {
    fn process_frame(&mut self, frame: &ReceivedFrame<'_>) {
        if frame.tx.nb_symbols != self.settings.required_symbols {
            debug!(nb_symbols = frame.tx.nb_symbols, "skipping zero subcarrier check");
            self.total_frames_skipped += 1;
            return;
        }
        let report = match self.decode(frame) {
            Ok(report) => report,
            Err(err) => {
                debug!("zero subcarrier decode failed: {}", err);
                return;
            },
        };
        info!(
            encoding = %frame.encoding,
            sequence_number = ?report.sequence_number,
            nb_symbols = report.nb_symbols,
            nb_symbol_errors = report.nb_symbol_errors,
            ber = ?report.bit_errors.map(|x| x.ber()),
            snr_db = report.snr_db,
            "zero subcarrier frame"
        );
        self.total_frames_checked += 1;
        for callback in &mut self.report_out_callbacks {
            callback(&report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_weakest_subcarriers_are_zeroed() {
        let mut powers = [5.0f32, 3.0, 8.0, 1.0, 9.0].to_vec();
        powers.extend((5..NB_DATA_CARRIERS).map(|i| 10.0 + i as f32));
        powers[30] = 2.0;
        let symbol: Vec<Complex32> = powers.iter().map(|x| Complex32::new(x.sqrt(), 0.0)).collect();

        let mask = decode_one_symbol(&symbol, 2);
        for (i, x) in mask.iter().enumerate() {
            let expected = if i == 3 || i == 30 { MASK_ZERO } else { MASK_ONE };
            assert_eq!(*x, expected, "subcarrier {}", i);
        }
    }

    #[test]
    fn test_equal_powers_pick_earliest() {
        let mut symbol = vec![Complex32::new(1.0, 0.0); NB_DATA_CARRIERS];
        symbol[7] = Complex32::new(0.1, 0.0);
        symbol[20] = Complex32::new(0.0, 0.1);
        symbol[40] = Complex32::new(-0.1, 0.0);
        let mask = decode_one_symbol(&symbol, 2);
        assert_eq!(mask[7], MASK_ZERO);
        assert_eq!(mask[20], MASK_ZERO);
        assert_eq!(mask[40], MASK_ONE);
    }

    #[test]
    fn test_reference_pattern() {
        assert_eq!(reference_zero_positions(1, 0), Ok(vec![2]));
        assert_eq!(reference_zero_positions(2, 26), Ok(vec![28, 39]));
        assert_eq!(reference_zero_positions(3, 0), Err(PhyError::UnsupportedZeroCount(3)));
        assert_eq!(
            reference_zero_positions(1, NB_REFERENCE_SYMBOLS),
            Err(PhyError::ReferencePatternExceeded { required: 28, available: 27 }),
        );
        assert!(reference_mask(2, 40).is_err());

        let mask = create_transmit_mask(2).unwrap();
        assert_eq!(mask.len(), NB_REFERENCE_SYMBOLS*NB_DATA_CARRIERS);
        assert_eq!(mask.iter().filter(|x| **x == MASK_ZERO).count(), 2*NB_REFERENCE_SYMBOLS);
    }

    #[test]
    fn test_masked_symbol_matches_reference() {
        for nb_zeros in [1, 2] {
            for i in 0..NB_REFERENCE_SYMBOLS {
                let symbol: Vec<Complex32> = reference_mask(nb_zeros, i)
                    .unwrap()
                    .iter()
                    .map(|m| *m*Complex32::new(0.7, -0.7))
                    .collect();
                let mask = decode_one_symbol(&symbol, nb_zeros);
                assert!(check_side_symbol(&mask, nb_zeros, i).unwrap());
                assert!(!check_side_symbol(&mask, nb_zeros, (i+1) % NB_REFERENCE_SYMBOLS).unwrap());
            }
        }
    }

    #[test]
    fn test_rejects_zero_count() {
        let settings = ZeroSubcarrierSettings { nb_zeros: 4, ..ZeroSubcarrierSettings::default() };
        assert_eq!(ZeroSubcarrierDecoder::new(settings).err(), Some(PhyError::UnsupportedZeroCount(4)));
        let settings = ZeroSubcarrierSettings { required_symbols: 28, ..ZeroSubcarrierSettings::default() };
        assert_eq!(
            ZeroSubcarrierDecoder::new(settings).err(),
            Some(PhyError::ReferencePatternExceeded { required: 28, available: NB_REFERENCE_SYMBOLS }),
        );
    }
}
